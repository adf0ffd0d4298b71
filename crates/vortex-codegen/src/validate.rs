//! Capability validation.
//!
//! Checks the parsed network and the run options against the selected
//! [`DeviceProfile`] before any address is computed. Every requested
//! feature maps onto one capability flag; requesting an unsupported feature
//! is fatal. The validator always visits every layer so one run reports
//! every problem.

use crate::config::RunConfig;
use crate::diag::Diagnostics;
use crate::network::{Network, Operator, Quantization};
use vortex_chip::DeviceProfile;

/// FIFO lane restriction: the first four lanes of each group.
const FIFO_MAP_HWC: u64 = 0x000f_000f_000f_000f;
/// FIFO lane restriction for channel-major input: lane 0 of each group.
const FIFO_MAP_CHW: u64 = 0x0001_0001_0001_0001;

/// Validate the network against the device and run options.
pub fn validate(net: &Network, profile: &DeviceProfile, config: &RunConfig, diags: &mut Diagnostics) {
    validate_run_options(net, profile, config, diags);

    if net.len() > profile.max_layers {
        diags.error_global(format!(
            "{} layer(s) requested but the device has {} layer slots",
            net.len(),
            profile.max_layers
        ));
    }

    let stream_layers = net.layers.iter().filter(|l| l.streaming).count();
    if stream_layers > profile.max_stream_layers {
        diags.error_global(format!(
            "{stream_layers} streaming layer(s) requested but the device supports {}",
            profile.max_stream_layers
        ));
    }

    let last_streaming = net
        .layers
        .iter()
        .rposition(|l| l.streaming);

    for (id, spec) in net.layers.iter().enumerate() {
        validate_features(id, spec, net, profile, diags);
        validate_geometry(id, spec, profile, diags);
        validate_shift(id, spec, diags);
        validate_streaming(id, spec, profile, config, last_streaming, diags);

        // Energy notice: the shared-lane fetch wastes slots on ragged counts
        if id > 0 && spec.in_channels % 4 != 0 {
            diags.notice(
                id,
                format!(
                    "{} input channel(s) is not a multiple of 4; lane fetch is underutilized",
                    spec.in_channels
                ),
            );
        }
    }
}

fn validate_run_options(net: &Network, profile: &DeviceProfile, config: &RunConfig, diags: &mut Diagnostics) {
    if config.start_layer > 0 && !profile.start_layer {
        diags.error_global("a nonzero start layer is not supported on this device");
    }
    if config.start_layer >= profile.max_layers {
        diags.error_global(format!(
            "start layer {} exceeds the device's {} layer slots",
            config.start_layer, profile.max_layers
        ));
    }
    if !net.is_empty() && config.start_layer >= net.len() {
        diags.error_global(format!(
            "start layer {} is beyond the last layer {}",
            config.start_layer,
            net.len() - 1
        ));
    }
    if config.start_layer > 0 && config.fifo {
        diags.error_global("the FIFO front end always feeds layer 0; a start layer cannot be used");
    }
    if config.pipeline && !profile.pipeline {
        diags.error_global("pipelined clocking is not supported on this device");
    }
    if config.pll && !profile.pll {
        diags.error_global("the PLL clock source is not supported on this device");
    }
    if config.fifo_go && !profile.fifo_go {
        diags.error_global("FIFO-go autostart is not supported on this device");
    }
    if config.snoop && !profile.snoop {
        diags.error_global("snoop-conditional execution is not supported on this device");
    }
    if config.oneshot && !profile.oneshot {
        diags.error_global("one-shot execution is not supported on this device");
    }
    if net.layers.iter().any(|l| l.streaming) && !config.fifo {
        diags.error_global("streaming layers require the FIFO front end to be enabled");
    }
}

fn validate_features(
    id: usize,
    spec: &crate::network::LayerSpec,
    net: &Network,
    profile: &DeviceProfile,
    diags: &mut Diagnostics,
) {
    if spec.read_ahead && !profile.read_ahead {
        diags.error(id, "streaming read-ahead is not supported on this device");
    }
    if spec.calcx4 && !profile.calcx4 {
        diags.error(id, "the packed\u{d7}4 kernel layout is not supported on this device");
    }
    if spec.quantization == Quantization::Binary {
        if !profile.binary_weights {
            diags.error(id, "binary weights are not supported on this device");
        }
        // The mask encodes sign alone, so every tap must carry one
        if let Some(w) = &spec.weights {
            if w.data.iter().any(|&t| t != 1 && t != -1) {
                diags.error(id, "binary-quantized weights must be exactly +1 or -1");
            }
        }
    }
    if spec.bypass && !profile.kernel_bypass {
        diags.error(id, "kernel bypass is not supported on this device");
    }
    if spec.is_depthwise() {
        if !profile.depthwise {
            diags.error(id, "grouped convolution is not supported on this device");
        }
        if spec.in_channels % spec.conv_groups != 0 || spec.out_channels % spec.conv_groups != 0 {
            diags.error(
                id,
                format!(
                    "channel counts ({}, {}) must divide evenly into {} convolution group(s)",
                    spec.in_channels, spec.out_channels, spec.conv_groups
                ),
            );
        }
        if spec.conv_groups != spec.in_channels || spec.conv_groups != spec.out_channels {
            diags.error(
                id,
                "only depthwise grouping (groups equal to the channel counts) is supported",
            );
        }
    }

    // Layer links beyond simple in-order chaining need the link capability
    let linked = spec
        .next_sequence
        .is_some_and(|n| n != id + 1)
        || !spec.in_sequences.is_empty();
    if linked && !profile.link_layer {
        diags.error(id, "layer chaining (link layer) is not supported on this device");
    }
    if let Some(n) = spec.next_sequence {
        if n >= net.len() {
            diags.error(id, format!("successor layer {n} does not exist"));
        }
    }
    for &p in &spec.in_sequences {
        if p >= net.len() {
            diags.error(id, format!("predecessor layer {p} does not exist"));
        }
    }

    // Multi-pass input with a stride needs dedicated hardware
    let in_expand = spec.in_channels.div_ceil(profile.max_lanes()).max(1);
    if (spec.stride[0] > 1 || spec.stride[1] > 1) && in_expand > 1 && !profile.multipass_stride {
        diags.error(
            id,
            "stride greater than 1 with multi-pass input expansion is not supported on this device",
        );
    }
}

fn validate_geometry(
    id: usize,
    spec: &crate::network::LayerSpec,
    profile: &DeviceProfile,
    diags: &mut Diagnostics,
) {
    if spec.in_channels > profile.max_channels || spec.out_channels > profile.max_channels {
        diags.error(
            id,
            format!(
                "channel counts ({}, {}) exceed the device maximum of {}",
                spec.in_channels, spec.out_channels, profile.max_channels
            ),
        );
    }
    match spec.operator {
        Operator::Conv2d | Operator::ConvTranspose2d => {
            if spec.kernel_size[0] > 3 || spec.kernel_size[1] > 3 {
                diags.error(
                    id,
                    format!(
                        "2-D kernels up to 3\u{d7}3 are supported, not {}\u{d7}{}",
                        spec.kernel_size[0], spec.kernel_size[1]
                    ),
                );
            }
            if spec.padding[0] > 2 || spec.padding[1] > 2 {
                diags.error(id, "2-D padding beyond 2 is not supported");
            }
        }
        Operator::Conv1d => {
            if spec.kernel_size[0] > 9 && spec.dilation[0] <= 1 {
                diags.error(id, "1-D kernels up to 9 taps are supported");
            }
        }
        Operator::None | Operator::Linear => {}
    }
    if spec.operands > 1 && spec.eltwise.is_none() {
        diags.error(id, "multiple operands require an element-wise function");
    }
    if spec.operands > 4 {
        diags.error(id, "at most 4 element-wise operands are supported");
    }
}

/// The hardware applies an implicit shift derived from the quantization
/// width; the remaining explicit shift must land in [-15, 15].
fn validate_shift(id: usize, spec: &crate::network::LayerSpec, diags: &mut Diagnostics) {
    let implicit = 8 - i32::from(spec.quantization.bits());
    let total = i32::from(spec.output_shift) + implicit;
    if !(-15..=15).contains(&total) {
        diags.error(
            id,
            format!(
                "output shift {} (plus implicit quantization shift {implicit}) is outside [-15, 15]",
                spec.output_shift
            ),
        );
    }
}

fn validate_streaming(
    id: usize,
    spec: &crate::network::LayerSpec,
    profile: &DeviceProfile,
    config: &RunConfig,
    last_streaming: Option<usize>,
    diags: &mut Diagnostics,
) {
    if config.fifo && id == 0 {
        let (limit, map) = if spec.channel_major {
            (4, FIFO_MAP_CHW)
        } else {
            (16, FIFO_MAP_HWC)
        };
        if spec.in_channels > limit {
            diags.error(
                id,
                format!(
                    "the FIFO front end feeds at most {limit} channel(s) in this input format"
                ),
            );
        }
        if spec.processor_map & !map != 0 {
            diags.error(
                id,
                "FIFO input lanes are restricted to the FIFO-connected lanes of each group",
            );
        }
    }

    if !spec.streaming {
        return;
    }

    if spec.input_dim[0] * spec.input_dim[1] > profile.frame_size_max {
        diags.error(
            id,
            format!(
                "streamed frame of {} pixel(s) exceeds the device maximum of {}",
                spec.input_dim[0] * spec.input_dim[1],
                profile.frame_size_max
            ),
        );
    }

    // A streaming chain is consumed strictly in layer order
    if last_streaming != Some(id) && spec.next_sequence != Some(id + 1) {
        diags.error(
            id,
            "a streaming layer must be followed immediately by the next layer id",
        );
    }

    if last_streaming == Some(id)
        && spec.padding == [0, 0]
        && !profile.nonpad_final_streaming_ok
    {
        diags.error(
            id,
            "the final streaming layer requires nonzero padding on this device",
        );
    }

    // Streamed data arrives row by row; the successor must exist before the
    // frame completes, so streaming cannot feed a flattened layer
    if spec.flatten {
        diags.error(id, "streaming cannot be combined with flatten");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LayerSpec, Weights};

    fn layer() -> LayerSpec {
        let mut l = LayerSpec::conv2d(1, 4, [8, 8]);
        l.processor_map = 0x1;
        l.output_processor_map = 0xf;
        l.weights = Weights::new(vec![1; 4 * 9], 4, 1, 3, 3);
        l
    }

    fn run(net: &Network, profile: &DeviceProfile, config: &RunConfig) -> Diagnostics {
        let mut d = Diagnostics::new(false);
        validate(net, profile, config, &mut d);
        d
    }

    #[test]
    fn clean_network_passes() {
        let net = Network::new(vec![layer()]);
        let d = run(&net, &DeviceProfile::vtx800(), &RunConfig::default());
        assert!(!d.has_fatal());
    }

    #[test]
    fn unsupported_features_are_fatal_on_vtx700() {
        let mut l = layer();
        l.read_ahead = true;
        l.calcx4 = true;
        l.bypass = true;
        let net = Network::new(vec![l]);
        let d = run(&net, &DeviceProfile::vtx700(), &RunConfig::default());
        assert!(d.fatal_count() >= 3);
    }

    #[test]
    fn all_layers_are_checked_despite_failures() {
        let mut l0 = layer();
        l0.read_ahead = true;
        let mut l1 = layer();
        l1.bypass = true;
        let net = Network::new(vec![l0, l1]);
        let d = run(&net, &DeviceProfile::vtx700(), &RunConfig::default());
        let layers: Vec<_> = d.items().iter().filter_map(|x| x.layer).collect();
        assert!(layers.contains(&0));
        assert!(layers.contains(&1));
    }

    #[test]
    fn shift_range_includes_implicit_quantization_shift() {
        let mut l = layer();
        l.quantization = Quantization::Bits(1);
        l.output_shift = 9; // 9 + implicit 7 = 16, out of range
        let net = Network::new(vec![l]);
        let d = run(&net, &DeviceProfile::vtx800(), &RunConfig::default());
        assert!(d.has_fatal());
        assert!(d.items().iter().any(|x| x.message.contains("implicit")));
    }

    #[test]
    fn streaming_requires_fifo_and_chain_order() {
        let mut l0 = layer();
        l0.streaming = true;
        l0.next_sequence = Some(1);
        l0.padding = [1, 1];
        let mut l1 = layer();
        l1.in_channels = 4;
        l1.processor_map = 0xf;
        l1.streaming = true;
        l1.padding = [1, 1];
        let net = Network::new(vec![l0, l1]);

        let d = run(&net, &DeviceProfile::vtx800(), &RunConfig::default());
        assert!(d.items().iter().any(|x| x.message.contains("FIFO front end")));

        let cfg = RunConfig {
            fifo: true,
            ..RunConfig::default()
        };
        let d = run(&net, &DeviceProfile::vtx800(), &cfg);
        assert!(!d.has_fatal());
    }

    #[test]
    fn final_streaming_layer_padding_rule_is_device_gated() {
        let mut l = layer();
        l.streaming = true;
        l.padding = [0, 0];
        let net = Network::new(vec![l]);
        let cfg = RunConfig {
            fifo: true,
            ..RunConfig::default()
        };

        let d = run(&net, &DeviceProfile::vtx700(), &cfg);
        assert!(d.items().iter().any(|x| x.message.contains("nonzero padding")));

        let d = run(&net, &DeviceProfile::vtx800(), &cfg);
        assert!(!d.items().iter().any(|x| x.message.contains("nonzero padding")));
    }

    #[test]
    fn start_layer_must_name_an_existing_layer_without_fifo() {
        let net = Network::new(vec![layer(), layer()]);
        let p = DeviceProfile::vtx800();

        let cfg = RunConfig {
            start_layer: 2,
            ..RunConfig::default()
        };
        let d = run(&net, &p, &cfg);
        assert!(d.items().iter().any(|x| x.message.contains("beyond the last layer")));

        let cfg = RunConfig {
            start_layer: 1,
            fifo: true,
            ..RunConfig::default()
        };
        let d = run(&net, &p, &cfg);
        assert!(d.items().iter().any(|x| x.message.contains("always feeds layer 0")));
    }

    #[test]
    fn binary_weights_outside_plus_minus_one_are_rejected() {
        let mut l = layer();
        l.quantization = Quantization::Binary;
        l.weights = Weights::new(vec![2; 4 * 9], 4, 1, 3, 3);
        let net = Network::new(vec![l]);
        let d = run(&net, &DeviceProfile::vtx800(), &RunConfig::default());
        assert!(d.items().iter().any(|x| x.message.contains("+1 or -1")));

        let mut l = layer();
        l.quantization = Quantization::Binary;
        l.weights = Weights::new(vec![-1; 4 * 9], 4, 1, 3, 3);
        let net = Network::new(vec![l]);
        let d = run(&net, &DeviceProfile::vtx800(), &RunConfig::default());
        assert!(!d.has_fatal());
    }

    #[test]
    fn fifo_channel_limits() {
        let mut l = layer();
        l.in_channels = 20;
        l.processor_map = (1 << 20) - 1;
        let net = Network::new(vec![l]);
        let cfg = RunConfig {
            fifo: true,
            ..RunConfig::default()
        };
        let d = run(&net, &DeviceProfile::vtx800(), &cfg);
        assert!(d.items().iter().any(|x| x.message.contains("at most 16")));
    }
}
