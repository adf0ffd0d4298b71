//! Per-layer register encoding.
//!
//! For every (layer, group) pair the encoder packs the planned
//! configuration into fixed-width register words and hands them to the
//! emitter. Layers are visited in ascending id order and groups in
//! ascending order within a layer; streaming-buffer intervals are recorded
//! in that same order, so overlap checks only ever see earlier layers.
//!
//! Every intermediate value is range-checked against the device's bit
//! widths; a value that does not fit is a compiler error, not a runtime
//! hardware fault.

use crate::config::RunConfig;
use crate::diag::Diagnostics;
use crate::emit::Emitter;
use crate::error::{CodegenError, Result};
use crate::memory::{BiasMap, KernelMap, StreamInterval, StreamIntervals};
use crate::network::{Activation, LayerSpec, Network, Operator};
use crate::plan::{LayerPlan, Plan};
use tracing::debug;
use vortex_chip::regs::{self, lctl, lctl2, nxtlyr, oned, post};
use vortex_chip::DeviceProfile;

/// Streaming register values for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRegs {
    /// Elements buffered before the pipeline produces valid output.
    pub prefill: usize,
    /// Column-to-column fetch delta.
    pub delta1: usize,
    /// Row-to-row skip delta.
    pub delta2: usize,
    /// Circular-buffer rollover point.
    pub rollover: usize,
}

/// Encodes the planned network into register writes.
#[derive(Debug)]
pub struct Encoder<'a> {
    profile: &'a DeviceProfile,
    config: &'a RunConfig,
}

impl<'a> Encoder<'a> {
    /// Create an encoder for one device and run.
    #[must_use]
    pub const fn new(profile: &'a DeviceProfile, config: &'a RunConfig) -> Self {
        Self { profile, config }
    }

    /// Emit the configuration registers for every layer and group.
    ///
    /// # Errors
    ///
    /// Returns a fatal error on the first register field overflow or sink
    /// I/O failure; earlier passes have already validated everything else.
    pub fn configure(
        &self,
        net: &Network,
        plan: &Plan,
        kernels: &KernelMap,
        bias: &BiasMap,
        emitter: &mut Emitter<'_>,
        intervals: &mut StreamIntervals,
        diags: &mut Diagnostics,
    ) -> Result<()> {
        let first_streaming = net.layers.iter().position(|l| l.streaming);
        for (id, spec) in net.layers.iter().enumerate() {
            let lp = &plan.layers[id];
            for &group in &plan.groups_used {
                self.configure_layer_group(
                    id,
                    spec,
                    lp,
                    group,
                    kernels,
                    bias,
                    first_streaming,
                    emitter,
                    intervals,
                    diags,
                )?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn configure_layer_group(
        &self,
        id: usize,
        spec: &LayerSpec,
        lp: &LayerPlan,
        group: usize,
        kernels: &KernelMap,
        bias: &BiasMap,
        first_streaming: Option<usize>,
        emitter: &mut Emitter<'_>,
        intervals: &mut StreamIntervals,
        diags: &mut Diagnostics,
    ) -> Result<()> {
        let p = self.profile;
        let hw = &lp.hw;
        let [rows, cols] = hw.input_dim;
        let [krows, kcols] = hw.kernel_size;
        let pad = hw.padding;
        let pool = spec.pool;
        let pstride = spec.pool_stride;
        let pdil = spec.pool_dilation;

        // Successor link
        let next = match spec.next_sequence {
            Some(n) => self.check_bits(id, "next layer", n as i64, 7)?,
            None => nxtlyr::STOP,
        };
        emitter.write_lreg(group, id, regs::LREG_NXTLYR, next, "next layer")?;

        // Row/column counts. Two formula families: legacy explicit
        // stop/pad counters, or the combined pooling-difference encoding.
        let rcnt = self.count_reg(id, "row count", rows, pad[0], pool[0], pstride[0], pdil[0])?;
        emitter.write_lreg(group, id, regs::LREG_RCNT, rcnt, "rows")?;
        let ccnt = self.count_reg(id, "column count", cols, pad[1], pool[1], pstride[1], pdil[1])?;
        emitter.write_lreg(group, id, regs::LREG_CCNT, ccnt, "columns")?;

        // Pooling counters with dilation increment
        let prcnt = self.pool_reg(id, "pooling rows", pool[0], pdil[0])?;
        emitter.write_lreg(group, id, regs::LREG_PRCNT, prcnt, "pooling rows")?;
        let pccnt = self.pool_reg(id, "pooling columns", pool[1], pdil[1])?;
        emitter.write_lreg(group, id, regs::LREG_PCCNT, pccnt, "pooling columns")?;

        // Stride, with the multi-pass term scaled by operands and expansion
        let mut stride_val = self.check_bits(id, "stride", (spec.stride[0] - 1) as i64, 4)?;
        if lp.in_expand > 1 && p.multipass_stride {
            let mp = spec.stride[0] * lp.in_expand_invol * spec.operands;
            stride_val |= self.check_bits(id, "multi-pass stride", mp as i64, 8)? << p.mp_stride_offs;
        }
        emitter.write_lreg(group, id, regs::LREG_STRIDE, stride_val, "stride")?;

        // Write pointers
        let wptr = self.write_pointer(id, spec, lp)?;
        emitter.write_lreg(group, id, regs::LREG_WPTR_BASE, wptr, "write pointer")?;

        let toffs = self.check_bits(id, "write gap", spec.write_gap as i64, p.max_wptrinc_bits)?;
        emitter.write_lreg(group, id, regs::LREG_WPTR_TOFFS, toffs, "write timeslot offset")?;

        let pass_step = (lp.output_dim[0] * lp.output_dim[1] + lp.out_pad) * (spec.write_gap + 1);
        let moffs = if lp.out_expand > 1 {
            self.check_bits(id, "mask pass offset", pass_step as i64, p.max_ptr_bits)?
        } else {
            0
        };
        emitter.write_lreg(group, id, regs::LREG_WPTR_MOFFS, moffs, "write mask offset")?;

        let choffs = if spec.output_width == 32 {
            self.check_bits(id, "channel offset", pass_step as i64, p.max_ptr_bits)?
        } else {
            0
        };
        emitter.write_lreg(group, id, regs::LREG_WPTR_CHOFFS, choffs, "write channel offset")?;

        let rptr = self.check_bits(id, "read pointer", (spec.in_offset / 4) as i64, p.max_ptr_bits)?;
        emitter.write_lreg(group, id, regs::LREG_RPTR_BASE, rptr, "read pointer")?;

        // Layer control
        let mut ctl = lctl::SLAVE_LOAD;
        if spec.channel_major {
            ctl |= lctl::CHAN_MAJOR;
        }
        if spec.has_pooling() {
            ctl |= lctl::POOL_ENA;
            if spec.pool_max {
                ctl |= lctl::POOL_MAX;
            }
        }
        if spec.output_width == 32 {
            ctl |= lctl::WIDE;
        }
        if spec.is_depthwise() && lp.broadcast_mode {
            ctl |= lctl::BCAST;
        }
        if spec.bypass {
            ctl |= lctl::BYPASS;
        }
        if Some(&group) == lp.group_map.first() {
            // The lowest participating group drives the others
            ctl |= lctl::MASTER;
            for &g in &lp.group_map[1..] {
                ctl |= 1 << (lctl::SRC_SHIFT + g as u32);
            }
        }
        emitter.write_lreg(group, id, regs::LREG_LCTL, ctl, "layer control")?;

        // Second control word: read-ahead and kernel prime counts
        if p.read_ahead {
            let mut ctl2 = 0;
            if spec.read_ahead {
                ctl2 |= lctl2::RD_AHEAD;
            }
            if lp.tcalc {
                ctl2 |= lctl2::TCALC;
            }
            if !spec.bypass && hw.operator != Operator::None {
                ctl2 |= ((krows - 1) as u32) << lctl2::RPRIME_SHIFT;
                ctl2 |= ((kcols - 1) as u32) << lctl2::CPRIME_SHIFT;
            }
            emitter.write_lreg(group, id, regs::LREG_LCTL2, ctl2, "layer control 2")?;
        }

        // Mask offsets: start and end in quantization units
        if !spec.bypass && kernels.count[id] > 0 {
            let quant = usize::from(spec.quantization.bits());
            let start = kernels.offs[id] * 8;
            let end = start + (kernels.count[id] - 1) * quant;
            self.check_bits(id, "mask start", start as i64, p.max_mcnt_bits)?;
            self.check_bits(id, "mask end", end as i64, p.max_mcnt_bits)?;
            if p.new_streaming {
                emitter.write_lreg(group, id, regs::LREG_MCNT1, start as u32, "mask start")?;
                emitter.write_lreg(group, id, regs::LREG_MCNT2, end as u32, "mask end")?;
            } else {
                let val = (start as u32) | (end as u32) << 16;
                emitter.write_lreg(group, id, regs::LREG_MCNT, val, "mask offset/count")?;
            }
        }

        // Output channel count
        let ochan = if spec.bypass {
            spec.out_channels - 1
        } else if spec.is_depthwise() {
            lp.out_expand - 1
        } else if kernels.count[id] > 0 {
            kernels.count[id] - 1
        } else {
            lp.out_expand_thresh.saturating_sub(1)
        };
        let ochan = self.check_bits(id, "output channels", ochan as i64, 10)?;
        emitter.write_lreg(group, id, regs::LREG_OCHAN, ochan, "output channels")?;

        // 1-D / element-wise / timeslot control
        let tscnt = tscnt_max(spec, lp, self.profile);
        let mut oned_val = (tscnt as u32) << oned::TSCNT_SHIFT;
        if hw.operator == Operator::Conv1d {
            oned_val |= oned::ONED_ENA | ((krows - 1) as u32) << oned::WIDTH_SHIFT;
        }
        if let Some(op) = spec.eltwise {
            oned_val |= oned::EWISE_ENA
                | op.selector() << oned::EWISE_FUNC_SHIFT
                | ((spec.operands - 1) as u32) << oned::OPERANDS_SHIFT;
            if spec.pool_first {
                oned_val |= oned::PREPOOL;
            }
        }
        emitter.write_lreg(group, id, regs::LREG_ONED, oned_val, "one-dimensional control")?;

        // TRAM pointer bound
        let tptr = if hw.operator == Operator::None {
            0
        } else {
            self.check_bits(id, "TRAM pointer", (lp.tram_max - 1) as i64, p.max_tptr_bits)?
        };
        emitter.write_lreg(group, id, regs::LREG_TPTR, tptr, "TRAM max")?;

        // Post-processing word
        let mut post_val = 0u32;
        let shift = i32::from(spec.output_shift) + (8 - i32::from(spec.quantization.bits()));
        post_val |= (shift.unsigned_abs() & 0xf) << post::SHIFT_SHIFT;
        if shift < 0 {
            post_val |= post::SHIFT_LEFT;
        }
        if let Some(Some(alloc)) = bias.layers.get(id) {
            let offs = if alloc.broadcast {
                alloc.slots[0].1
            } else {
                alloc
                    .slots
                    .iter()
                    .find(|(g, _)| *g == group)
                    .map_or(0, |(_, o)| *o)
            };
            post_val |= post::BIAS_ENA | (offs as u32) << post::BIAS_OFFS_SHIFT;
        }
        post_val |= match spec.activation {
            Activation::None => 0,
            Activation::Relu => 1 << post::ACT_SHIFT,
            Activation::Abs => 2 << post::ACT_SHIFT,
        };
        if spec.flatten {
            post_val |= post::FLATTEN;
        }
        if spec.is_depthwise() {
            post_val |= post::DW;
        }
        if spec.calcx4 {
            post_val |= post::XPMP;
        }
        if lp.tcalc {
            post_val |= post::TCALC;
        }
        if spec.read_ahead {
            post_val |= post::RD_AHEAD;
        }
        emitter.write_lreg(group, id, regs::LREG_POST, post_val, "post processing")?;

        // Lane enables: this group's slice plus one master lane per shared
        // bank
        let slice = ((spec.processor_map >> (group * p.lanes_per_group))
            & ((1 << p.lanes_per_group) - 1)) as u32;
        let mut master = 0u32;
        let shared_mask = (1u32 << p.lanes_shared) - 1;
        for bank in 0..(p.lanes_per_group / p.lanes_shared) {
            let chunk = (slice >> (bank * p.lanes_shared)) & shared_mask;
            if chunk != 0 {
                master |= (chunk & chunk.wrapping_neg()) << (bank * p.lanes_shared);
            }
        }
        emitter.write_lreg(group, id, regs::LREG_ENA, slice | master << 16, "lane enable")?;

        // Streaming registers
        if spec.streaming {
            let sr = self.stream_regs(spec, lp, first_streaming == Some(id));
            let prefill =
                self.check_bits(id, "stream prefill", sr.prefill as i64, p.max_isval_bits)?;
            emitter.write_lreg(group, id, regs::LREG_STREAM1, prefill, "stream prefill")?;
            let d1 = self.check_bits(id, "stream delta 1", sr.delta1 as i64, p.max_dsval1_bits)?;
            let d2 = self.check_bits(id, "stream delta 2", sr.delta2 as i64, p.max_dsval2_bits)?;
            emitter.write_lreg(
                group,
                id,
                regs::LREG_STREAM2,
                d1 | d2 << p.max_dsval1_bits,
                "stream deltas",
            )?;
            let rollover =
                self.check_bits(id, "stream rollover", sr.rollover as i64, p.max_fbuf_bits)?;
            emitter.write_lreg(group, id, regs::LREG_FMAX, rollover, "stream rollover")?;

            if first_streaming == Some(id) {
                let frame = rows * cols;
                let ifrm = self.check_bits(id, "input frame size", frame as i64, p.max_ifrm_bits)?;
                emitter.write_lreg(group, id, regs::LREG_IFRM, ifrm, "input frame size")?;
            }

            // Record the circular buffer claim once per layer, in layer
            // order, so overlap advisories only reference earlier layers
            if Some(&group) == lp.group_map.first() {
                intervals.record(
                    id,
                    StreamInterval {
                        start: spec.in_offset,
                        end: spec.in_offset + sr.rollover * 4,
                        banks: p.data_mem_map(spec.processor_map),
                    },
                    diags,
                );
            }
        }

        debug!(layer = id, group, "configured");
        Ok(())
    }

    /// Base output write pointer. With per-group local sourcing the pointer
    /// additionally selects the destination instance: the first output
    /// lane's shared-bank index times the instance width. Not exercised by
    /// any hardware run to date; pinned by `local_source_pointer_formula`.
    fn write_pointer(&self, id: usize, spec: &LayerSpec, lp: &LayerPlan) -> Result<u32> {
        let p = self.profile;
        let mut wptr = (spec.out_offset / 4) as i64;
        if lp.local_source {
            let first_lane = spec.output_processor_map.trailing_zeros() as usize;
            wptr += ((first_lane & !(p.lanes_shared - 1)) * p.instance_width) as i64;
        }
        self.check_bits(id, "write pointer", wptr, p.max_ptr_bits)
    }

    /// Row/column count register; both formula families.
    fn count_reg(
        &self,
        id: usize,
        field: &'static str,
        dim: usize,
        pad: usize,
        pool: usize,
        pool_stride: usize,
        pool_dilation: usize,
    ) -> Result<u32> {
        let p = self.profile;
        let count = dim - 1 + 2 * pad;
        let count = self.check_bits(id, field, count as i64, p.max_cnt_bits)?;
        if p.new_streaming {
            let diff = (pool - 1) * pool_dilation + pool_stride;
            let diff = self.check_bits(id, field, diff as i64, p.max_cnt_bits)?;
            let mut val = count | diff << p.cnt_diff_offs;
            if pad > 0 {
                val |= 1 << p.pad_ena_offs | (pad as u32) << p.pad_cnt_offs;
            }
            Ok(val)
        } else {
            Ok(count | (pad as u32) << p.pad_cnt_offs)
        }
    }

    fn pool_reg(
        &self,
        id: usize,
        field: &'static str,
        pool: usize,
        pool_dilation: usize,
    ) -> Result<u32> {
        let p = self.profile;
        let count = (pool - 1) * pool_dilation;
        let mut val = self.check_bits(id, field, count as i64, p.max_cnt_bits)?;
        if p.new_streaming && pool_dilation > 1 {
            val |= ((pool_dilation - 1) as u32) << p.cnt_inc_offs;
        }
        Ok(val)
    }

    /// Streaming rollover/prefill/delta arithmetic. Both families compute a
    /// prefill and two deltas from the pooling window, stride, dilation and
    /// input geometry; the family is selected by the device capability.
    #[must_use]
    pub fn stream_regs(&self, spec: &LayerSpec, lp: &LayerPlan, first: bool) -> StreamRegs {
        let hw = &lp.hw;
        let cols = hw.input_dim[1];
        let [krows, kcols] = hw.kernel_size;
        let pad = hw.padding;
        let pool = spec.pool;
        let pstride = spec.pool_stride;
        let pdil = spec.pool_dilation;
        let padded_cols = cols + 2 * pad[1];

        if self.profile.new_streaming {
            let row_inc = (pool[0] * pdil[0]).max(pstride[0]);
            let col_inc = (pool[1] * pdil[1]).max(pstride[1]);
            let prefill = padded_cols * (krows - 1) + kcols + col_inc - 1;
            let mut delta1 = pstride[1].max(spec.stride[1]) * spec.operands;
            if spec.channel_major {
                delta1 = delta1.div_ceil(4);
            }
            delta1 = delta1 - 1 + usize::from(self.config.pipeline);
            let delta2 = (row_inc - 1) * padded_cols + pad[1] + col_inc - 1;
            let mut rollover = if first {
                prefill + col_inc
            } else {
                prefill + (lp.in_expand - 1) * (row_inc * padded_cols + pad[0] + col_inc) + col_inc
            };
            rollover = rollover.div_ceil(lp.in_expand) * lp.in_expand;
            if spec.channel_major {
                rollover = rollover.div_ceil(4);
            }
            StreamRegs {
                prefill,
                delta1,
                delta2,
                rollover,
            }
        } else {
            let prefill = padded_cols * (krows - 1 + pool[0] - 1) + kcols - 1 + pool[1];
            let delta1 = pstride[1] * spec.operands;
            let delta2 = (pstride[0] - 1) * padded_cols + pool[1] * spec.operands;
            let mut rollover =
                prefill + (pool[0] - 1) * padded_cols + spec.stride[0].max(pstride[0]).max(pool[0]);
            rollover = rollover.div_ceil(lp.in_expand) * lp.in_expand;
            StreamRegs {
                prefill,
                delta1,
                delta2,
                rollover,
            }
        }
    }

    fn check_bits(&self, layer: usize, field: &'static str, value: i64, bits: u32) -> Result<u32> {
        if value < 0 || value >= 1 << bits {
            return Err(CodegenError::field_overflow(layer, field, value, bits));
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        Ok(value as u32)
    }
}

/// Output multiplex timeslots: passthrough layers multiplex whole shared
/// banks; depthwise layers need one slot per shared lane unless broadcast
/// mode lets every lane read its own bank.
fn tscnt_max(spec: &LayerSpec, lp: &LayerPlan, profile: &DeviceProfile) -> usize {
    if spec.operator == Operator::None {
        lp.out_expand_thresh.div_ceil(profile.lanes_shared) - 1
    } else if spec.is_depthwise() {
        if lp.broadcast_mode {
            0
        } else {
            profile.lanes_shared - 1
        }
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkKind;
    use crate::memory::{allocate_bias, allocate_kernels};
    use crate::network::Weights;
    use crate::plan;
    use crate::sink::InstructionSink;

    fn layer() -> LayerSpec {
        let mut l = LayerSpec::conv2d(1, 4, [8, 8]);
        l.processor_map = 0x1;
        l.output_processor_map = 0xf;
        l.weights = Weights::new(vec![1; 4 * 9], 4, 1, 3, 3);
        l
    }

    fn encode(net: &Network, profile: &DeviceProfile, config: &RunConfig) -> Result<Diagnostics> {
        let mut d = Diagnostics::new(config.permissive);
        let p = plan::plan(net, profile, &mut d);
        let km = allocate_kernels(net, &p, profile, &mut d);
        let bm = allocate_bias(net, &p, profile, &mut d);
        let sink = InstructionSink::new(SinkKind::Debug, Box::new(Vec::new()));
        let mut em = Emitter::new(profile, config, sink);
        let mut iv = StreamIntervals::new();
        let enc = Encoder::new(profile, config);
        enc.configure(net, &p, &km, &bm, &mut em, &mut iv, &mut d)?;
        Ok(d)
    }

    #[test]
    fn simple_layer_encodes_cleanly() {
        let net = Network::new(vec![layer()]);
        let cfg = RunConfig::default();
        let d = encode(&net, &DeviceProfile::vtx700(), &cfg).unwrap();
        assert!(!d.has_fatal());
    }

    #[test]
    fn pooling_fields_are_zero_without_pooling() {
        let profile = DeviceProfile::vtx700();
        let cfg = RunConfig::default();
        let enc = Encoder::new(&profile, &cfg);
        assert_eq!(enc.pool_reg(0, "pooling rows", 1, 1).unwrap(), 0);
        // Legacy row count for an 8-row input without padding
        assert_eq!(enc.count_reg(0, "rows", 8, 0, 1, 1, 1).unwrap(), 7);
    }

    #[test]
    fn count_reg_families_differ() {
        let cfg = RunConfig::default();
        let legacy = DeviceProfile::vtx700();
        let enc = Encoder::new(&legacy, &cfg);
        // Legacy: pad in the dedicated counter field
        let v = enc.count_reg(0, "rows", 8, 1, 2, 2, 1).unwrap();
        assert_eq!(v, (8 - 1 + 2) | 1 << legacy.pad_cnt_offs);

        let new = DeviceProfile::vtx800();
        let enc = Encoder::new(&new, &cfg);
        // New family: pooling difference plus pad enable
        let v = enc.count_reg(0, "rows", 8, 1, 2, 2, 1).unwrap();
        assert_eq!(
            v,
            (8 - 1 + 2) | 3 << new.cnt_diff_offs | 1 << new.pad_ena_offs | 1 << new.pad_cnt_offs
        );
    }

    #[test]
    fn field_overflow_is_a_fatal_error() {
        let profile = DeviceProfile::vtx700();
        let cfg = RunConfig::default();
        let enc = Encoder::new(&profile, &cfg);
        // 2048 rows exceed the 10-bit row counter
        let err = enc.count_reg(3, "row count", 2048, 0, 1, 1, 1).unwrap_err();
        match err {
            CodegenError::FieldOverflow { layer, bits, .. } => {
                assert_eq!(layer, 3);
                assert_eq!(bits, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn local_source_pointer_formula() {
        // Pinning test for the per-group local write pointer: lanes
        // starting at 20 land in instance slice 20 & !3 = 20
        let mut l = layer();
        l.in_channels = 4;
        l.out_channels = 80; // 2 output passes
        l.processor_map = 0xf;
        // Banks 5 and 8..16: non-contiguous, 40 lanes
        l.output_processor_map = (0xf << 20) | (0xffff_ffff_u64 << 32);
        l.out_offset = 0x40;
        l.weights = Weights::new(vec![1; 80 * 4 * 9], 80, 4, 3, 3);
        let net = Network::new(vec![l]);
        let profile = DeviceProfile::vtx700();
        let mut d = Diagnostics::new(false);
        let p = plan::plan(&net, &profile, &mut d);
        assert!(p.layers[0].local_source);
        let cfg = RunConfig::default();
        let enc = Encoder::new(&profile, &cfg);
        let wptr = enc.write_pointer(0, &net.layers[0], &p.layers[0]).unwrap();
        // 0x40/4 + 20 * 2048
        assert_eq!(wptr as usize, 16 + 20 * profile.instance_width);
    }

    #[test]
    fn stream_regs_legacy_family() {
        let mut l = layer();
        l.streaming = true;
        l.padding = [1, 1];
        l.pool = [2, 2];
        l.pool_stride = [2, 2];
        let net = Network::new(vec![l]);
        let profile = DeviceProfile::vtx700();
        let cfg = RunConfig::default();
        let mut d = Diagnostics::new(false);
        let p = plan::plan(&net, &profile, &mut d);
        let enc = Encoder::new(&profile, &cfg);
        let sr = enc.stream_regs(&net.layers[0], &p.layers[0], true);
        // padded cols 10; (3-1 + 2-1) * 10 + 3-1 + 2 = 34
        assert_eq!(sr.prefill, 34);
        assert_eq!(sr.delta1, 2);
        assert_eq!(sr.delta2, 1 * 10 + 2);
        // 34 + 1*10 + max(1,2,2) = 46, single pass
        assert_eq!(sr.rollover, 46);
    }

    #[test]
    fn stream_regs_new_family() {
        let mut l = layer();
        l.streaming = true;
        l.padding = [1, 1];
        let net = Network::new(vec![l]);
        let profile = DeviceProfile::vtx800();
        let cfg = RunConfig::default();
        let mut d = Diagnostics::new(false);
        let p = plan::plan(&net, &profile, &mut d);
        let enc = Encoder::new(&profile, &cfg);
        let sr = enc.stream_regs(&net.layers[0], &p.layers[0], true);
        // padded cols 10; 10*2 + 3 + 0 = 23
        assert_eq!(sr.prefill, 23);
        assert_eq!(sr.delta1, 0);
        assert_eq!(sr.delta2, 1);
        assert_eq!(sr.rollover, 24);
    }

    #[test]
    fn streaming_layers_record_buffer_intervals() {
        let mut l0 = layer();
        l0.streaming = true;
        l0.padding = [1, 1];
        l0.next_sequence = Some(1);
        l0.out_offset = 0x4000;
        let mut l1 = layer();
        l1.in_channels = 4;
        l1.processor_map = 0xf;
        l1.streaming = true;
        l1.padding = [1, 1];
        l1.in_offset = 0x10; // overlaps layer 0's circular buffer
        let net = Network::new(vec![l0, l1]);
        let cfg = RunConfig::permissive();
        let d = encode(&net, &DeviceProfile::vtx700(), &cfg).unwrap();
        assert!(d
            .items()
            .iter()
            .any(|x| x.message.contains("streaming buffer")));
    }
}
