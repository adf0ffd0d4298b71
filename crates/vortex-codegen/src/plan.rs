//! Expansion and hardware-mapping planner.
//!
//! Derives multi-pass expansion factors per layer and rewrites layers whose
//! operator the hardware cannot execute directly (1×1 streaming kernels,
//! dilated 1-D convolution) into hardware-native equivalents. Substitutes
//! live in a shadow copy; the user-specified [`LayerSpec`] is never touched,
//! so diagnostics always report the original configuration.

use crate::diag::Diagnostics;
use crate::network::{LayerSpec, Network, Operator, Weights};
use tracing::debug;
use vortex_chip::DeviceProfile;

/// Hardware-native substitutes for one layer. Starts as a copy of the
/// user-specified fields and diverges only where the planner rewrites them.
#[derive(Debug, Clone)]
pub struct HwShadow {
    /// Operator actually executed.
    pub operator: Operator,
    /// Input channels after flattening.
    pub in_channels: usize,
    /// Kernel size actually loaded.
    pub kernel_size: [usize; 2],
    /// Padding actually configured.
    pub padding: [usize; 2],
    /// Dilation actually configured.
    pub dilation: [usize; 2],
    /// Input dimensions actually configured.
    pub input_dim: [usize; 2],
    /// Rewritten weights, when a rewrite touched them.
    pub weights: Option<Weights>,
}

/// Planner output for one layer.
#[derive(Debug, Clone)]
pub struct LayerPlan {
    /// Hardware-native substitutes.
    pub hw: HwShadow,
    /// Input dimensions after pooling.
    pub pooled_dim: [usize; 2],
    /// Output dimensions.
    pub output_dim: [usize; 2],
    /// Input expansion passes.
    pub in_expand: usize,
    /// Lanes active per input pass.
    pub in_expand_thresh: usize,
    /// Output expansion passes.
    pub out_expand: usize,
    /// Lanes active per output pass.
    pub out_expand_thresh: usize,
    /// Input expansion rounded for table-calc packing.
    pub in_expand_invol: usize,
    /// Table-calc read-ahead packing required.
    pub tcalc: bool,
    /// Groups carrying input lanes, ascending.
    pub group_map: Vec<usize>,
    /// Groups carrying output lanes, ascending.
    pub output_group_map: Vec<usize>,
    /// Depthwise broadcast read mode (input and output maps identical).
    pub broadcast_mode: bool,
    /// Output banks are non-contiguous; write pointers use per-group local
    /// addressing.
    pub local_source: bool,
    /// TRAM rows needed per lane.
    pub tram_max: usize,
    /// Extra output pixels appended by the dilation emulation.
    pub out_pad: usize,
    /// Leading output bytes to discard after the dilation emulation.
    pub out_ignore: usize,
    /// Kernel slots per participating lane.
    pub kernels_per_lane: usize,
}

/// Planner output for the whole network.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Per-layer plans, indexed by layer id.
    pub layers: Vec<LayerPlan>,
    /// Union of groups used by any layer, ascending.
    pub groups_used: Vec<usize>,
}

/// Derive the hardware mapping for every layer.
///
/// Every violation found is recorded in `diags`; the caller decides whether
/// to proceed. Planning always visits all layers.
#[must_use]
pub fn plan(net: &Network, profile: &DeviceProfile, diags: &mut Diagnostics) -> Plan {
    let mut layers = Vec::with_capacity(net.len());
    for (id, spec) in net.layers.iter().enumerate() {
        layers.push(plan_layer(id, spec, profile, diags));
    }

    let lanes = net.lanes_used();
    let groups_used = groups_of(lanes, profile);
    if !groups_used.contains(&0) {
        diags.error_global("group 0 carries no lanes; the master group must be used");
    }

    Plan { layers, groups_used }
}

fn plan_layer(id: usize, spec: &LayerSpec, profile: &DeviceProfile, diags: &mut Diagnostics) -> LayerPlan {
    let mut hw = HwShadow {
        operator: spec.operator,
        in_channels: spec.in_channels,
        kernel_size: spec.kernel_size,
        padding: spec.padding,
        dilation: spec.dilation,
        input_dim: spec.input_dim,
        weights: None,
    };

    if spec.flatten {
        hw.in_channels = spec.in_channels * spec.input_dim[0] * spec.input_dim[1];
        hw.input_dim = [1, 1];
        hw.kernel_size = [1, 1];
    }

    // Expansion factors from channel counts
    let max_lanes = profile.max_lanes();
    let in_expand = hw.in_channels.div_ceil(max_lanes).max(1);
    let in_expand_thresh = expand_thresh(hw.in_channels, in_expand, profile);
    let out_expand = spec.out_channels.div_ceil(max_lanes).max(1);
    let out_expand_thresh = expand_thresh(spec.out_channels, out_expand, profile);

    // Processor map population must match the per-pass lane count, or the
    // hardware multiplexers desynchronize
    let in_pop = spec.processor_map.count_ones() as usize;
    if in_pop != in_expand_thresh {
        diags.error(
            id,
            format!(
                "input processor map has {in_pop} lane(s) but the expansion threshold is {in_expand_thresh}"
            ),
        );
    }
    let out_pop = spec.output_processor_map.count_ones() as usize;
    if out_pop != out_expand_thresh {
        diags.error(
            id,
            format!(
                "output processor map has {out_pop} lane(s) but the expansion threshold is {out_expand_thresh}"
            ),
        );
    }

    let tcalc = spec.read_ahead && in_expand > 1;
    let in_expand_invol = if tcalc { (in_expand + 3) & !3 } else { in_expand };

    // Hardware-native rewrites
    if spec.streaming
        && spec.operator == Operator::Conv2d
        && hw.kernel_size == [1, 1]
        && profile.streaming_requires_3x3
    {
        emulate_1x1_streaming(id, spec, &mut hw, diags);
    }

    // Transposed convolution runs on the upsampled input; the configured
    // padding is the flipped amount dilation*(kernel-1) - padding
    if spec.operator == Operator::ConvTranspose2d {
        for i in 0..2 {
            let span = hw.dilation[i] * (hw.kernel_size[i] - 1);
            if spec.padding[i] > span {
                diags.error(
                    id,
                    format!(
                        "transposed-convolution padding {} exceeds the kernel span {span}",
                        spec.padding[i]
                    ),
                );
            } else {
                hw.padding[i] = span - spec.padding[i];
            }
        }
        if hw.padding[0] > 2 || hw.padding[1] > 2 {
            diags.error(id, "upsampled padding beyond 2 is not supported");
        }
    }

    let mut out_pad = 0;
    let mut out_ignore = 0;
    if spec.operator == Operator::Conv1d && spec.dilation[0] > 1 {
        emulate_dilation(
            id,
            spec,
            &mut hw,
            out_expand,
            &mut out_pad,
            &mut out_ignore,
            profile,
            diags,
        );
    }

    // Geometry. Windows that do not fit are rejected here, before the
    // subtractive size arithmetic below can wrap
    let mut fits = true;
    for i in 0..2 {
        if spec.pool[i] > 1 {
            let span = (spec.pool[i] - 1) * spec.pool_dilation[i] + 1;
            if span > hw.input_dim[i] {
                diags.error(
                    id,
                    format!(
                        "pooling window spans {span} but the input dimension is {}",
                        hw.input_dim[i]
                    ),
                );
                fits = false;
            }
        }
    }
    let pooled_dim = if fits {
        [
            pooled(hw.input_dim[0], spec.pool[0], spec.pool_stride[0], spec.pool_dilation[0]),
            pooled(hw.input_dim[1], spec.pool[1], spec.pool_stride[1], spec.pool_dilation[1]),
        ]
    } else {
        [1, 1]
    };
    for i in 0..2 {
        let span = hw.dilation[i] * (hw.kernel_size[i] - 1) + 1;
        match hw.operator {
            Operator::Conv1d | Operator::Conv2d => {
                if span > pooled_dim[i] + 2 * hw.padding[i] {
                    diags.error(
                        id,
                        format!(
                            "kernel spans {span} but the padded input dimension is {}",
                            pooled_dim[i] + 2 * hw.padding[i]
                        ),
                    );
                    fits = false;
                }
            }
            Operator::ConvTranspose2d => {
                let upsampled = (pooled_dim[i] - 1) * spec.stride[i] + span + spec.output_padding;
                if upsampled <= 2 * spec.padding[i] {
                    diags.error(
                        id,
                        format!(
                            "padding {} consumes the whole upsampled dimension {upsampled}",
                            spec.padding[i]
                        ),
                    );
                    fits = false;
                }
            }
            Operator::None | Operator::Linear => {}
        }
    }
    let output_dim = if fits {
        output_dim(spec, &hw, pooled_dim)
    } else {
        [1, 1]
    };

    // Group maps and addressing modes
    let group_map = groups_of(spec.processor_map, profile);
    let output_group_map = groups_of(spec.output_processor_map, profile);
    let broadcast_mode = spec.is_depthwise() && spec.processor_map == spec.output_processor_map;
    if spec.is_depthwise() && !broadcast_mode {
        diags.advisory(
            id,
            "depthwise input and output maps differ; falling back to local read mode",
        );
    }
    if spec.is_depthwise() {
        let first = spec.output_processor_map.trailing_zeros() as usize;
        if spec.output_processor_map != 0 && first % profile.lanes_shared != 0 {
            diags.error(
                id,
                format!(
                    "depthwise output map must start on a {}-lane boundary",
                    profile.lanes_shared
                ),
            );
        }
    }
    let local_source = out_expand > 1 && !contiguous_banks(spec.output_processor_map, profile);

    // TRAM budget
    let tram_max = match hw.operator {
        Operator::None => pooled_dim[1],
        Operator::ConvTranspose2d => (pooled_dim[1] - 1) * spec.stride[1] + 1 + 2 * hw.padding[1],
        _ => pooled_dim[1] + 2 * hw.padding[1],
    };
    if tram_max > profile.tram_size {
        diags.error(
            id,
            format!(
                "TRAM needs {tram_max} rows but the device has {}",
                profile.tram_size
            ),
        );
    }

    // Element-wise with multiple input passes needs hardware support
    if spec.operands > 1 && in_expand > 1 && !profile.eltwise_multipass {
        diags.error(
            id,
            "element-wise operands with multi-pass input expansion are not supported on this device",
        );
    }

    // Kernel slots per lane: ungrouped layers hold every output channel's
    // kernel; depthwise lanes hold only their own channel
    let kernels_per_lane = if spec.bypass {
        0
    } else if spec.is_depthwise() {
        out_expand
    } else {
        out_expand * out_expand_thresh
    };

    debug!(
        layer = id,
        in_expand, out_expand, tcalc, broadcast_mode, "planned layer"
    );

    LayerPlan {
        hw,
        pooled_dim,
        output_dim,
        in_expand,
        in_expand_thresh,
        out_expand,
        out_expand_thresh,
        in_expand_invol,
        tcalc,
        group_map,
        output_group_map,
        broadcast_mode,
        local_source,
        tram_max,
        out_pad,
        out_ignore,
        kernels_per_lane,
    }
}

/// Lanes active per expansion pass, rounded up to the shared-lane width when
/// the channel count exceeds one full pass.
fn expand_thresh(channels: usize, expand: usize, profile: &DeviceProfile) -> usize {
    let max_lanes = profile.max_lanes();
    let mut thresh = channels.div_ceil(expand);
    if channels > max_lanes {
        let shared = profile.lanes_shared;
        thresh = thresh.div_ceil(shared) * shared;
    }
    thresh.min(max_lanes)
}

fn pooled(dim: usize, pool: usize, pool_stride: usize, pool_dilation: usize) -> usize {
    if pool <= 1 {
        return dim;
    }
    (dim - (pool - 1) * pool_dilation - 1) / pool_stride + 1
}

fn output_dim(spec: &LayerSpec, hw: &HwShadow, pooled: [usize; 2]) -> [usize; 2] {
    match hw.operator {
        Operator::None => pooled,
        Operator::Linear => [1, 1],
        Operator::ConvTranspose2d => {
            // User-specified padding, not the flipped hardware amount
            let d = |i: usize| {
                (pooled[i] - 1) * spec.stride[i] + hw.dilation[i] * (hw.kernel_size[i] - 1)
                    + spec.output_padding
                    + 1
                    - 2 * spec.padding[i]
            };
            [d(0), d(1)]
        }
        Operator::Conv1d | Operator::Conv2d => {
            let d = |i: usize| {
                (pooled[i] + 2 * hw.padding[i] - hw.dilation[i] * (hw.kernel_size[i] - 1) - 1)
                    / spec.stride[i]
                    + 1
            };
            [d(0), d(1)]
        }
    }
}

/// Streamed 1×1 kernels run on 3×3 streaming hardware: place the weight at
/// the center tap of a zero 3×3 kernel and pad by one on each side.
fn emulate_1x1_streaming(id: usize, spec: &LayerSpec, hw: &mut HwShadow, diags: &mut Diagnostics) {
    hw.kernel_size = [3, 3];
    hw.padding = [1, 1];
    if let Some(w) = &spec.weights {
        let mut data = vec![0i8; w.out_channels * w.in_channels * 9];
        for oc in 0..w.out_channels {
            for ic in 0..w.in_channels {
                data[(oc * w.in_channels + ic) * 9 + 4] = w.kernel(oc, ic)[0];
            }
        }
        hw.weights = Weights::new(data, w.out_channels, w.in_channels, 3, 3);
    }
    diags.notice(
        id,
        "streamed 1\u{d7}1 kernel emulated as 3\u{d7}3 center tap with padding 1",
    );
}

/// Dilated 1-D convolution. If the dilated receptive field fits the native
/// 9-row kernel window, stretch the kernel with zero taps. Otherwise, within
/// the device bound, fold the input so each column holds one dilation step
/// and run an equivalent 3×3 2-D convolution.
#[allow(clippy::too_many_arguments)]
fn emulate_dilation(
    id: usize,
    spec: &LayerSpec,
    hw: &mut HwShadow,
    out_expand: usize,
    out_pad: &mut usize,
    out_ignore: &mut usize,
    profile: &DeviceProfile,
    diags: &mut Diagnostics,
) {
    let k = spec.kernel_size[0];
    let d = spec.dilation[0];
    let span = (k - 1) * d + 1;

    if span <= 9 {
        // Zero-tap stretch within the native window
        hw.kernel_size = [span, 1];
        hw.dilation = [1, 1];
        if let Some(w) = &spec.weights {
            let mut data = vec![0i8; w.out_channels * w.in_channels * span];
            for oc in 0..w.out_channels {
                for ic in 0..w.in_channels {
                    let src = w.kernel(oc, ic);
                    for (t, &v) in src.iter().enumerate() {
                        data[(oc * w.in_channels + ic) * span + t * d] = v;
                    }
                }
            }
            hw.weights = Weights::new(data, w.out_channels, w.in_channels, span, 1);
        }
        diags.notice(id, format!("dilation {d} emulated by zero-tap kernel stretch"));
        return;
    }

    if k > profile.max_dilation_1d_kernel || d > profile.max_dilation_1d {
        diags.error(
            id,
            format!(
                "dilation {d} with kernel length {k} exceeds this device's emulation bound"
            ),
        );
        return;
    }
    if spec.has_pooling() {
        diags.error(id, "dilation emulation cannot be combined with pooling");
    }
    if spec.padding[0] > profile.max_dilation_1d_pad {
        diags.error(
            id,
            format!(
                "dilation emulation supports padding up to {}",
                profile.max_dilation_1d_pad
            ),
        );
    }
    if spec.operands > 1 || spec.bypass || spec.flatten || spec.read_ahead || spec.streaming {
        diags.error(
            id,
            "dilation emulation cannot be combined with element-wise, bypass, flatten, read-ahead or streaming",
        );
    }

    // Fold: each output column advances one dilation step
    let rows = spec.input_dim[0];
    hw.operator = Operator::Conv2d;
    hw.input_dim = [rows.div_ceil(d), d];
    hw.padding = [1, 1];
    hw.dilation = [1, 1];
    hw.kernel_size = [3, 3];

    let out_1d = (rows + 2 * spec.padding[0] - (k - 1) * d - 1) / spec.stride[0] + 1;
    let hw_out = [hw.input_dim[0], hw.input_dim[1]];
    *out_pad = hw_out[0] * hw_out[1] - out_1d;
    *out_ignore = 4 * d * out_expand;
    if spec.out_offset < *out_ignore {
        diags.error(
            id,
            format!(
                "dilation emulation discards the first {} output byte(s); out_offset must be at least that",
                *out_ignore
            ),
        );
    }

    // Rebuild the kernel: taps land in the last column, rows chosen by tap
    // count (1 tap: center row; 2: top rows; 3: all rows)
    if let Some(w) = &spec.weights {
        let rows_for = |count: usize| -> &'static [usize] {
            match count {
                1 => &[1],
                2 => &[0, 1],
                _ => &[0, 1, 2],
            }
        };
        let mut data = vec![0i8; w.out_channels * w.in_channels * 9];
        for oc in 0..w.out_channels {
            for ic in 0..w.in_channels {
                let src = w.kernel(oc, ic);
                for (t, &row) in rows_for(k).iter().enumerate() {
                    data[(oc * w.in_channels + ic) * 9 + row * 3 + 2] = src[t];
                }
            }
        }
        hw.weights = Weights::new(data, w.out_channels, w.in_channels, 3, 3);
    }
    diags.notice(
        id,
        format!("dilation {d} emulated as folded 3\u{d7}3 2-D convolution with padding (1, 1)"),
    );
}

fn groups_of(map: u64, profile: &DeviceProfile) -> Vec<usize> {
    let per_group = profile.lanes_per_group;
    (0..profile.groups)
        .filter(|g| (map >> (g * per_group)) & ((1 << per_group) - 1) != 0)
        .collect()
}

fn contiguous_banks(map: u64, profile: &DeviceProfile) -> bool {
    let banks = profile.data_mem_map(map);
    if banks == 0 {
        return true;
    }
    let shifted = banks >> banks.trailing_zeros();
    (shifted & shifted.wrapping_add(1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Quantization;

    fn profile() -> DeviceProfile {
        DeviceProfile::vtx800()
    }

    fn simple_layer() -> LayerSpec {
        let mut l = LayerSpec::conv2d(1, 4, [8, 8]);
        l.processor_map = 0x1;
        l.output_processor_map = 0xf;
        l.weights = Weights::new(vec![1; 4 * 9], 4, 1, 3, 3);
        l
    }

    #[test]
    fn expansion_of_small_layer_is_single_pass() {
        let net = Network::new(vec![simple_layer()]);
        let mut d = Diagnostics::new(false);
        let plan = plan(&net, &profile(), &mut d);
        let lp = &plan.layers[0];
        assert_eq!(lp.in_expand, 1);
        assert_eq!(lp.in_expand_thresh, 1);
        assert_eq!(lp.out_expand, 1);
        assert_eq!(lp.out_expand_thresh, 4);
        assert!(!d.has_fatal());
    }

    #[test]
    fn expansion_beyond_max_lanes_rounds_to_shared_width() {
        // 100 channels over 64 lanes: 2 passes, 50 per pass, rounded to 52
        let p = profile();
        assert_eq!(expand_thresh(100, 2, &p), 52);
        // Exactly full: one pass of 64
        assert_eq!(expand_thresh(64, 1, &p), 64);
    }

    #[test]
    fn processor_map_population_is_enforced() {
        let mut l = simple_layer();
        l.processor_map = 0x3; // 2 lanes for a 1-channel layer
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let _ = plan(&net, &profile(), &mut d);
        assert!(d.has_fatal());
        assert!(d.items().iter().any(|x| x.message.contains("input processor map")));
    }

    #[test]
    fn output_dims_follow_convolution_arithmetic() {
        let net = Network::new(vec![simple_layer()]);
        let mut d = Diagnostics::new(false);
        let plan = plan(&net, &profile(), &mut d);
        // 8x8, 3x3 kernel, no padding, stride 1 -> 6x6
        assert_eq!(plan.layers[0].output_dim, [6, 6]);
    }

    #[test]
    fn group_zero_must_be_used() {
        let mut l = simple_layer();
        l.processor_map = 1 << 16; // group 1 only
        l.output_processor_map = 0xf << 16;
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let _ = plan(&net, &profile(), &mut d);
        assert!(d.items().iter().any(|x| x.message.contains("group 0")));
    }

    #[test]
    fn small_dilation_stretches_kernel_with_zero_taps() {
        let mut l = simple_layer();
        l.operator = Operator::Conv1d;
        l.input_dim = [32, 1];
        l.kernel_size = [3, 1];
        l.dilation = [3, 1];
        l.weights = Weights::new(vec![7; 4 * 3], 4, 1, 3, 1);
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let plan = plan(&net, &profile(), &mut d);
        let hw = &plan.layers[0].hw;
        // (3-1)*3+1 = 7 taps, originals at 0, 3, 6
        assert_eq!(hw.kernel_size, [7, 1]);
        let w = hw.weights.as_ref().unwrap();
        assert_eq!(w.kernel(0, 0), &[7, 0, 0, 7, 0, 0, 7]);
        assert!(!d.has_fatal());
    }

    #[test]
    fn large_dilation_folds_into_2d_convolution() {
        let mut l = simple_layer();
        l.operator = Operator::Conv1d;
        l.input_dim = [100, 1];
        l.kernel_size = [3, 1];
        l.dilation = [5, 1];
        l.out_offset = 0x2000;
        l.weights = Weights::new(vec![3; 4 * 3], 4, 1, 3, 1);
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let plan = plan(&net, &profile(), &mut d);
        let lp = &plan.layers[0];
        assert_eq!(lp.hw.operator, Operator::Conv2d);
        assert_eq!(lp.hw.kernel_size, [3, 3]);
        assert_eq!(lp.hw.padding, [1, 1]);
        assert_eq!(lp.hw.input_dim, [20, 5]);
        // Original taps relocated to the last column of each row
        let w = lp.hw.weights.as_ref().unwrap();
        assert_eq!(w.kernel(0, 0), &[0, 0, 3, 0, 0, 3, 0, 0, 3]);
        assert!(!d.has_fatal());
        assert!(d.items().iter().any(|x| x.message.contains("folded")));
    }

    #[test]
    fn large_dilation_is_rejected_on_vtx700() {
        let mut l = simple_layer();
        l.operator = Operator::Conv1d;
        l.input_dim = [100, 1];
        l.kernel_size = [3, 1];
        l.dilation = [5, 1];
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let _ = plan(&net, &DeviceProfile::vtx700(), &mut d);
        assert!(d.has_fatal());
    }

    #[test]
    fn transposed_convolution_flips_the_padding() {
        let mut l = simple_layer();
        l.operator = Operator::ConvTranspose2d;
        l.stride = [2, 2];
        l.padding = [1, 1];
        l.output_padding = 1;
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let plan = plan(&net, &profile(), &mut d);
        let lp = &plan.layers[0];
        // Hardware pad is dilation*(kernel-1) - padding = 2 - 1
        assert_eq!(lp.hw.padding, [1, 1]);
        // Output uses the user padding: (8-1)*2 + 2 + 1 + 1 - 2*1 = 16
        assert_eq!(lp.output_dim, [16, 16]);
        assert!(!d.has_fatal());
    }

    #[test]
    fn oversized_pooling_window_is_rejected() {
        let mut l = simple_layer();
        l.input_dim = [2, 2];
        l.pool = [4, 4];
        l.pool_stride = [4, 4];
        l.padding = [1, 1];
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let _ = plan(&net, &profile(), &mut d);
        assert!(d.has_fatal());
        assert!(d.items().iter().any(|x| x.message.contains("pooling window")));
    }

    #[test]
    fn kernel_larger_than_padded_input_is_rejected() {
        let mut l = simple_layer();
        l.input_dim = [2, 2]; // unpadded 3x3 kernel cannot fit
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let _ = plan(&net, &profile(), &mut d);
        assert!(d.has_fatal());
        assert!(d.items().iter().any(|x| x.message.contains("kernel spans")));
    }

    #[test]
    fn streamed_1x1_gets_center_tap_emulation() {
        let mut l = simple_layer();
        l.streaming = true;
        l.kernel_size = [1, 1];
        l.padding = [0, 0];
        l.weights = Weights::new(vec![5; 4], 4, 1, 1, 1);
        l.quantization = Quantization::Bits(8);
        let net = Network::new(vec![l]);
        let mut d = Diagnostics::new(false);
        let plan = plan(&net, &profile(), &mut d);
        let hw = &plan.layers[0].hw;
        assert_eq!(hw.kernel_size, [3, 3]);
        assert_eq!(hw.padding, [1, 1]);
        assert_eq!(hw.weights.as_ref().unwrap().kernel(0, 0)[4], 5);
    }
}
