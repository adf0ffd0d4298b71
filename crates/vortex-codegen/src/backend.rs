//! Top-level generation: validate, plan, allocate, emit.
//!
//! `generate()` runs the full pipeline over one network and one device and
//! renders the register program into the caller's sink. Layers are
//! processed in ascending id order throughout; every pass that allocates
//! or checks addresses depends on that order.

use crate::config::{RunConfig, SinkKind};
use crate::diag::{Diagnostic, Diagnostics};
use crate::emit::{Emitter, WordRun};
use crate::encode::Encoder;
use crate::error::{CodegenError, Result};
use crate::memory::{
    allocate_bias, allocate_kernels, check_data_capacity, BiasMap, KernelMap, StreamIntervals,
};
use crate::network::{LayerSpec, Network, Quantization};
use crate::plan::{self, Plan};
use crate::simulate::{LayerSimulator, Tensor};
use crate::sink::InstructionSink;
use crate::validate;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{debug, info};
use vortex_chip::regs::{self, ctl, sram};
use vortex_chip::DeviceProfile;

/// Summary of one completed generation run.
#[derive(Debug)]
pub struct GenerateReport {
    /// Layers emitted.
    pub layers: usize,
    /// Register/memory writes issued.
    pub writes: u64,
    /// Read-backs issued.
    pub reads: u64,
    /// Estimated bus-access time for the whole program, in milliseconds.
    pub access_time_ms: f64,
    /// Expected-output words kept in the verify table.
    pub verify_words: usize,
    /// Everything the run reported, fatal or not.
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile one network into a register program.
///
/// `input` is the sample frame loaded into data memory (or streamed through
/// the FIFO); `simulator` produces the expected output for the verify
/// table. Either may be omitted, which skips the corresponding artifact
/// section.
///
/// # Errors
///
/// Returns [`CodegenError::Rejected`] when validation or planning raised
/// fatal diagnostics, and propagates field-overflow, capacity, simulator
/// and sink I/O errors from the later passes.
pub fn generate(
    net: &Network,
    profile: &DeviceProfile,
    config: &RunConfig,
    input: Option<&Tensor>,
    simulator: Option<&dyn LayerSimulator>,
    out: Box<dyn Write>,
) -> Result<GenerateReport> {
    generate_with_api(net, profile, config, input, simulator, out, None)
}

/// [`generate`] with an optional secondary "API" output handle. Top-level
/// artifacts route the expected-output table and the check function to it;
/// other artifact kinds ignore the split.
///
/// # Errors
///
/// As [`generate`].
pub fn generate_with_api(
    net: &Network,
    profile: &DeviceProfile,
    config: &RunConfig,
    input: Option<&Tensor>,
    simulator: Option<&dyn LayerSimulator>,
    out: Box<dyn Write>,
    api: Option<Box<dyn Write>>,
) -> Result<GenerateReport> {
    let mut diags = Diagnostics::new(config.permissive);
    if net.is_empty() {
        diags.error_global("network has no layers");
    }

    validate::validate(net, profile, config, &mut diags);
    let plan = plan::plan(net, profile, &mut diags);
    diags.check()?;

    let kernels = allocate_kernels(net, &plan, profile, &mut diags);
    let bias = allocate_bias(net, &plan, profile, &mut diags);
    check_data_capacity(net, &plan, profile, &mut diags);
    diags.check()?;

    // Top-level artifacts render kernels and the sample input as static
    // side tables consumed by bulk copies; other kinds write every word
    let rows = kernel_rows(net, &plan, &kernels);
    let kernel_table = if config.sink == SinkKind::TopLevel {
        kernel_runs(&rows, profile)
    } else {
        Vec::new()
    };
    let input_table = match input {
        Some(frame) if config.sink == SinkKind::TopLevel && !config.fifo => {
            input_runs(net, profile, config, frame)
        }
        _ => Vec::new(),
    };

    let sink = match api {
        Some(api) => InstructionSink::with_api(config.sink, out, api),
        None => InstructionSink::new(config.sink, out),
    };
    let mut emitter = Emitter::new(profile, config, sink);
    emitter.header(&input_table, &kernel_table)?;

    emit_init(net, &plan, profile, config, &mut emitter, &mut diags)?;
    if kernel_table.is_empty() {
        load_kernels(&rows, &mut emitter, &mut diags)?;
    } else {
        emitter.copy_words("kernels", &kernel_table)?;
    }
    load_bias(net, &bias, &mut emitter, &mut diags)?;

    let encoder = Encoder::new(profile, config);
    let mut intervals = StreamIntervals::new();
    encoder.configure(net, &plan, &kernels, &bias, &mut emitter, &mut intervals, &mut diags)?;
    diags.check()?;

    if config.fifo {
        emit_fifo_setup(config, &mut emitter)?;
    }
    if let Some(frame) = input {
        if input_table.is_empty() {
            load_input(net, profile, config, frame, &mut emitter, &mut diags)?;
        } else {
            emitter.copy_words("input", &input_table)?;
        }
    }
    emit_enable(net, &plan, config, &mut emitter)?;

    let mut verify_words = 0;
    if config.verify_output {
        if let (Some(frame), Some(sim)) = (input, simulator) {
            let expected = simulate_network(net, sim, frame, config.start_layer)?;
            emit_verify(net, &plan, profile, &expected, &mut emitter)?;
            verify_words = emitter.finalize_verify()?;
        }
    }
    emitter.finish()?;
    diags.check()?;

    info!(
        layers = net.len(),
        writes = emitter.writes(),
        verify_words,
        "generation complete"
    );
    Ok(GenerateReport {
        layers: net.len(),
        writes: emitter.writes(),
        reads: emitter.reads(),
        access_time_ms: emitter.access_time_ms(),
        verify_words,
        diagnostics: diags.into_items(),
    })
}

/// Global bring-up: optional SRAM clear pass, voltage/timing control,
/// highest layer slot, optional Tornado RAM zero fill.
fn emit_init(
    net: &Network,
    plan: &Plan,
    profile: &DeviceProfile,
    config: &RunConfig,
    emitter: &mut Emitter<'_>,
    diags: &mut Diagnostics,
) -> Result<()> {
    for &g in &plan.groups_used {
        // Stop the state machine; clocks stay on for register access
        emitter.write_ctl(
            g,
            regs::REG_CTL,
            ctl::CLK_EN | 1 << ctl::RDY_SEL_SHIFT,
            "stop state machine",
        )?;
        if profile.require_reg_clear {
            emitter.write_ctl(g, regs::REG_SRAM_TEST, sram::BIST_RUN, "SRAM clear")?;
            emitter.wait(
                regs::ctl_addr(profile, g, regs::REG_SRAM_TEST),
                sram::BIST_DONE,
                sram::BIST_DONE,
            )?;
        }
        emitter.write_ctl(g, regs::REG_SRAM, sram::DEFAULT, "SRAM control")?;
        // Final layer slot in the low byte, first executed slot above it
        #[allow(clippy::cast_possible_truncation)]
        let lcnt = (net.len() - 1) as u32 | (config.start_layer as u32) << 8;
        emitter.write_ctl(g, regs::REG_LCNT_MAX, lcnt, "layer count")?;
        if config.init_tram {
            for p in 0..profile.lanes_per_group {
                let lane = g * profile.lanes_per_group + p;
                for offs in 0..profile.tram_size {
                    emitter.write_tram(diags, 0, lane, offs, 0)?;
                }
            }
        }
    }
    Ok(())
}

/// One packed mask row bound for a lane's kernel memory.
struct KernelRow {
    layer: usize,
    lane: usize,
    row: usize,
    taps: [u8; 9],
    calcx4: Option<(usize, usize)>,
}

/// Resolve every layer's kernels into packed per-lane mask rows.
///
/// Lane slots are output-channel-major: slot `o` of a lane holds the
/// kernel for output channel `o` against the lane's input channel.
/// Depthwise lanes hold one kernel per expansion pass for their own
/// channel. Sub-8-bit quantization packs taps bitwise into 9-byte rows.
fn kernel_rows(net: &Network, plan: &Plan, kernels: &KernelMap) -> Vec<KernelRow> {
    let mut out = Vec::new();
    for (id, spec) in net.layers.iter().enumerate() {
        let lp = &plan.layers[id];
        if lp.kernels_per_lane == 0 {
            continue;
        }
        let Some(w) = &spec.weights else {
            continue;
        };
        for (pos, lane) in lanes_of(spec.processor_map).enumerate() {
            let mut slots = Vec::with_capacity(lp.kernels_per_lane);
            for slot in 0..lp.kernels_per_lane {
                let (oc, ic) = if spec.is_depthwise() {
                    (slot * lp.out_expand_thresh + pos, 0)
                } else {
                    (slot, pos)
                };
                let mut taps = [0i8; 9];
                if oc < w.out_channels && ic < w.in_channels {
                    let k = w.kernel(oc, ic);
                    taps[..k.len()].copy_from_slice(k);
                }
                slots.push(taps);
            }
            let rows = pack_rows(&slots, spec.quantization);
            let calcx4 = spec.calcx4.then_some((kernels.offs[id], kernels.len[id]));
            for (r, taps) in rows.into_iter().enumerate() {
                out.push(KernelRow {
                    layer: id,
                    lane,
                    row: kernels.offs[id] + r,
                    taps,
                    calcx4,
                });
            }
        }
        debug!(layer = id, "kernels resolved");
    }
    out
}

fn load_kernels(rows: &[KernelRow], emitter: &mut Emitter<'_>, diags: &mut Diagnostics) -> Result<()> {
    for r in rows {
        emitter.write_kern(diags, r.layer, r.lane, r.row, &r.taps, r.calcx4)?;
    }
    Ok(())
}

/// Collapse the mask rows into contiguous word runs for the weight side
/// table. Consecutive rows of one lane are 16 bytes apart, so unremapped
/// allocations merge into a single run per lane.
fn kernel_runs(rows: &[KernelRow], profile: &DeviceProfile) -> Vec<WordRun> {
    let mut words: BTreeMap<u32, [u32; 4]> = BTreeMap::new();
    for r in rows {
        let phys = match r.calcx4 {
            Some((offs, count)) => profile.calcx4_index(r.row, offs, count),
            None => r.row,
        };
        let addr = regs::kern_addr(profile, r.lane, phys);
        words.insert(addr, kern_words(&r.taps));
    }
    let mut runs: Vec<WordRun> = Vec::new();
    for (addr, w) in words {
        match runs.last_mut() {
            Some(run) if addr == run.addr + 4 * run.words.len() as u32 => run.words.extend(w),
            _ => runs.push(WordRun {
                addr,
                words: w.to_vec(),
            }),
        }
    }
    runs
}

/// The four bus words of one mask row: three data words and the execute
/// word at `+12`.
fn kern_words(taps: &[u8; 9]) -> [u32; 4] {
    [
        u32::from(taps[0]),
        u32::from(taps[1]) << 24 | u32::from(taps[2]) << 16 | u32::from(taps[3]) << 8 | u32::from(taps[4]),
        u32::from(taps[5]) << 24 | u32::from(taps[6]) << 16 | u32::from(taps[7]) << 8 | u32::from(taps[8]),
        0,
    ]
}

/// Pack kernel slots into 9-byte mask rows. 8-bit taps map one slot per
/// row; narrower taps concatenate most-significant-bit first. Binary taps
/// encode sign alone: +1 as bit 1, -1 as bit 0.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn pack_rows(slots: &[[i8; 9]], quant: Quantization) -> Vec<[u8; 9]> {
    if quant == Quantization::Bits(8) {
        return slots.iter().map(|s| s.map(|t| t as u8)).collect();
    }
    let bits = u32::from(quant.bits());
    let mut bytes = Vec::with_capacity(slots.len() * 9 * bits as usize / 8 + 1);
    let mut acc = 0u16;
    let mut nbits = 0;
    for slot in slots {
        for &t in slot {
            let v = match quant {
                Quantization::Binary => u8::from(t > 0),
                Quantization::Bits(_) => (t as u8) & ((1u16 << bits) - 1) as u8,
            };
            acc = acc << bits | u16::from(v);
            nbits += bits;
            if nbits >= 8 {
                nbits -= 8;
                bytes.push((acc >> nbits) as u8);
            }
        }
    }
    if nbits > 0 {
        bytes.push((acc << (8 - nbits)) as u8);
    }
    let mut rows = Vec::with_capacity(bytes.len().div_ceil(9));
    for chunk in bytes.chunks(9) {
        let mut row = [0u8; 9];
        row[..chunk.len()].copy_from_slice(chunk);
        rows.push(row);
    }
    rows
}

fn load_bias(
    net: &Network,
    bias: &BiasMap,
    emitter: &mut Emitter<'_>,
    diags: &mut Diagnostics,
) -> Result<()> {
    for (id, spec) in net.layers.iter().enumerate() {
        let (Some(values), Some(Some(alloc))) = (&spec.bias, bias.layers.get(id)) else {
            continue;
        };
        for &(group, offs) in &alloc.slots {
            for (i, &b) in values.iter().enumerate() {
                emitter.write_bias(diags, id, group, offs + i, b)?;
            }
        }
    }
    Ok(())
}

fn emit_fifo_setup(config: &RunConfig, emitter: &mut Emitter<'_>) -> Result<()> {
    // Enable all four channel slots; the threshold keeps the watermark
    // interrupt quiet during bulk loads
    let mut fctl = 0xf;
    if config.fast_fifo {
        fctl |= 1 << 4;
    }
    emitter.write_fifo_ctl(regs::FIFO_CTL, fctl, "FIFO control")?;
    emitter.write_fifo_ctl(regs::FIFO_THRES, 0x40, "FIFO threshold")?;
    Ok(())
}

/// Load the sample frame into the first executed layer's lanes. FIFO runs
/// push one word per shared bank per pixel; direct loads go through the
/// byte placements of [`input_bytes`].
fn load_input(
    net: &Network,
    profile: &DeviceProfile,
    config: &RunConfig,
    frame: &Tensor,
    emitter: &mut Emitter<'_>,
    diags: &mut Diagnostics,
) -> Result<()> {
    let id = config.start_layer;
    let Some(spec) = net.layers.get(id) else {
        return Ok(());
    };

    if config.fifo {
        let lanes: Vec<usize> = lanes_of(spec.processor_map).collect();
        let pixels = frame.rows * frame.cols;
        let mut groups: Vec<usize> = lanes.iter().map(|l| l / profile.lanes_per_group).collect();
        groups.dedup();
        for pixel in 0..pixels {
            let (r, c) = (pixel / frame.cols, pixel % frame.cols);
            for &g in &groups {
                let mut word = 0u32;
                for (ch, &lane) in lanes.iter().enumerate() {
                    if lane / profile.lanes_per_group == g && ch < frame.channels {
                        #[allow(clippy::cast_sign_loss)]
                        let b = (frame.get(ch, r, c).clamp(-128, 127) as i8) as u8;
                        word |= u32::from(b) << (8 * (lane % profile.lanes_shared));
                    }
                }
                emitter.write_fifo_data(g, word)?;
            }
        }
        return Ok(());
    }

    for (addr, b) in input_bytes(spec, profile, frame) {
        emitter.write_data_byte(diags, id, addr, b)?;
    }
    emitter.flush_data(diags, id)?;
    Ok(())
}

/// Byte placements of a direct sample load. Each channel byte lands in its
/// lane's byte slot so consecutive lanes of a bank pack into single word
/// writes.
#[allow(clippy::cast_sign_loss)]
fn input_bytes(spec: &LayerSpec, profile: &DeviceProfile, frame: &Tensor) -> Vec<(u32, u8)> {
    let lanes: Vec<usize> = lanes_of(spec.processor_map).collect();
    let pixels = frame.rows * frame.cols;
    let mut out = Vec::new();

    if spec.channel_major {
        for (ch, &lane) in lanes.iter().enumerate() {
            if ch >= frame.channels {
                break;
            }
            for pixel in 0..pixels {
                let (r, c) = (pixel / frame.cols, pixel % frame.cols);
                let b = (frame.get(ch, r, c).clamp(-128, 127) as i8) as u8;
                out.push((regs::data_addr(profile, lane, spec.in_offset + pixel), b));
            }
        }
    } else {
        for pixel in 0..pixels {
            let (r, c) = (pixel / frame.cols, pixel % frame.cols);
            for (ch, &lane) in lanes.iter().enumerate() {
                if ch >= frame.channels {
                    break;
                }
                let b = (frame.get(ch, r, c).clamp(-128, 127) as i8) as u8;
                let addr = regs::data_addr(
                    profile,
                    lane,
                    spec.in_offset + pixel * 4 + lane % profile.lanes_shared,
                );
                out.push((addr, b));
            }
        }
    }
    out
}

/// Merge the byte placements into word runs for the sample-input side
/// table. Bytes of one word fold together; +4-adjacent words join runs.
fn input_runs(
    net: &Network,
    profile: &DeviceProfile,
    config: &RunConfig,
    frame: &Tensor,
) -> Vec<WordRun> {
    let Some(spec) = net.layers.get(config.start_layer) else {
        return Vec::new();
    };
    let mut words: BTreeMap<u32, u32> = BTreeMap::new();
    for (addr, b) in input_bytes(spec, profile, frame) {
        *words.entry(addr & !3).or_insert(0) |= u32::from(b) << (8 * (addr & 3));
    }
    let mut runs: Vec<WordRun> = Vec::new();
    for (addr, w) in words {
        match runs.last_mut() {
            Some(run) if addr == run.addr + 4 * run.words.len() as u32 => run.words.push(w),
            _ => runs.push(WordRun {
                addr,
                words: vec![w],
            }),
        }
    }
    runs
}

/// Final control-register sequence: slave groups first, then the master
/// group with the external-sync source, so the whole device starts on the
/// master's enable write.
fn emit_enable(
    net: &Network,
    plan: &Plan,
    config: &RunConfig,
    emitter: &mut Emitter<'_>,
) -> Result<()> {
    let streaming = net.layers.iter().any(|l| l.streaming);
    let mut base = ctl::CLK_EN | 1 << ctl::RDY_SEL_SHIFT;
    if streaming {
        base |= ctl::STREAM_ENA;
        if config.fifo {
            base |= ctl::FIFO_ENA;
        }
        if config.fifo_go {
            base |= ctl::FIFO_GO;
        }
    }
    if config.oneshot {
        base |= ctl::ONESHOT;
    }
    if config.pipeline {
        base |= ctl::PIPELINE_ENA;
    }
    if config.pll {
        base |= ctl::PLL_ENA;
    }
    if config.snoop {
        base |= ctl::SNOOP_ENA;
    }

    let master = plan.groups_used.first().copied().unwrap_or(0);
    for &g in &plan.groups_used {
        if g != master {
            emitter.write_ctl(g, regs::REG_CTL, base | ctl::ENA, "group enable")?;
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    let sync = (master as u32) << ctl::EXT_SYNC_SHIFT;
    emitter.write_ctl(
        master,
        regs::REG_CTL,
        base | ctl::ENA | ctl::MASTER | sync,
        "master enable",
    )?;
    Ok(())
}

/// Run the reference model from the first executed layer onward. Layers
/// with explicit input sequences read the concatenated outputs of those
/// layers; everyone else reads the previous layer (or the sample frame).
fn simulate_network(
    net: &Network,
    sim: &dyn LayerSimulator,
    frame: &Tensor,
    start: usize,
) -> Result<Tensor> {
    let mut outputs: Vec<Option<Tensor>> = vec![None; net.len()];
    for (id, spec) in net.layers.iter().enumerate().skip(start) {
        let feed = if spec.in_sequences.is_empty() {
            if id == start {
                frame.clone()
            } else {
                take_output(&outputs, id - 1, id)?
            }
        } else {
            let mut parts = Vec::with_capacity(spec.in_sequences.len());
            for &src in &spec.in_sequences {
                parts.push(take_output(&outputs, src, id)?);
            }
            concat_channels(&parts, id)?
        };
        outputs[id] = Some(sim.layer_output(id, spec, &feed)?);
    }
    take_output(&outputs, net.len() - 1, net.len() - 1)
}

fn take_output(outputs: &[Option<Tensor>], src: usize, layer: usize) -> Result<Tensor> {
    outputs
        .get(src)
        .and_then(Option::clone)
        .ok_or_else(|| CodegenError::simulator(layer, format!("layer {src} has no output yet")))
}

fn concat_channels(parts: &[Tensor], layer: usize) -> Result<Tensor> {
    let first = parts
        .first()
        .ok_or_else(|| CodegenError::simulator(layer, "empty input sequence"))?;
    let mut out = Tensor {
        channels: 0,
        rows: first.rows,
        cols: first.cols,
        data: Vec::new(),
    };
    for p in parts {
        if p.rows != first.rows || p.cols != first.cols {
            return Err(CodegenError::simulator(
                layer,
                "input sequence dimensions do not match",
            ));
        }
        out.channels += p.channels;
        out.data.extend_from_slice(&p.data);
    }
    Ok(out)
}

/// Map the expected output tensor onto data-memory words and queue them
/// for the verify table. Channel `c` lands in the `c % thresh`-th output
/// lane during expansion pass `c / thresh`; each pass advances the write
/// pointer by the planned per-pass step.
fn emit_verify(
    net: &Network,
    plan: &Plan,
    profile: &DeviceProfile,
    expected: &Tensor,
    emitter: &mut Emitter<'_>,
) -> Result<()> {
    let id = net.len() - 1;
    let spec = &net.layers[id];
    let lp = &plan.layers[id];
    let lanes: Vec<usize> = lanes_of(spec.output_processor_map).collect();
    let pixels = expected.rows * expected.cols;
    let pass_step = (lp.output_dim[0] * lp.output_dim[1] + lp.out_pad) * (spec.write_gap + 1);
    let wide = spec.output_width == 32;

    // addr -> (value, mask), byte lanes merged per word
    let mut words: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
    for ch in 0..expected.channels {
        let pass = ch / lp.out_expand_thresh;
        let Some(&lane) = lanes.get(ch % lp.out_expand_thresh) else {
            continue;
        };
        for pixel in 0..pixels {
            let (r, c) = (pixel / expected.cols, pixel % expected.cols);
            let v = expected.get(ch, r, c);
            let offs =
                spec.out_offset + lp.out_ignore + (pass * pass_step + pixel * (spec.write_gap + 1)) * 4;
            let addr = regs::data_addr(profile, lane, offs);
            if wide {
                #[allow(clippy::cast_sign_loss)]
                words.insert(addr, (v as u32, u32::MAX));
            } else {
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let b = u32::from((v.clamp(-128, 127) as i8) as u8);
                let shift = 8 * (lane % profile.lanes_shared) as u32;
                let e = words.entry(addr).or_insert((0, 0));
                e.0 |= b << shift;
                e.1 |= 0xff << shift;
            }
        }
    }
    for (addr, (value, mask)) in words {
        emitter.verify_word(addr, value, mask, "expected output")?;
    }
    Ok(())
}

fn lanes_of(map: u64) -> impl Iterator<Item = usize> {
    (0..64).filter(move |l| map & (1 << l) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkKind;
    use crate::network::{LayerSpec, Weights};
    use crate::simulate::FixedPointSimulator;

    fn layer() -> LayerSpec {
        let mut l = LayerSpec::conv2d(1, 4, [8, 8]);
        l.processor_map = 0x1;
        l.output_processor_map = 0xf;
        l.weights = Weights::new(vec![1; 4 * 9], 4, 1, 3, 3);
        l
    }

    #[test]
    fn pack_rows_eight_bit_is_one_slot_per_row() {
        let slots = vec![[1i8; 9], [2i8; 9]];
        let rows = pack_rows(&slots, Quantization::Bits(8));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], [1u8; 9]);
    }

    #[test]
    fn pack_rows_four_bit_halves_the_rows() {
        let slots = vec![[0x3i8; 9], [0x5i8; 9]];
        let rows = pack_rows(&slots, Quantization::Bits(4));
        // 18 taps * 4 bits = 9 bytes
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], 0x33);
        assert_eq!(rows[0][4], 0x35);
        assert_eq!(rows[0][8], 0x55);
    }

    #[test]
    fn pack_rows_matches_allocator_budget() {
        // The allocator budgets ceil(count * quant / 8) rows per lane
        let grid = [
            (1usize, Quantization::Bits(8)),
            (4, Quantization::Bits(8)),
            (3, Quantization::Bits(4)),
            (7, Quantization::Bits(2)),
            (5, Quantization::Binary),
        ];
        for (count, quant) in grid {
            let slots = vec![[1i8; 9]; count];
            let budget = (count * usize::from(quant.bits())).div_ceil(8);
            assert_eq!(pack_rows(&slots, quant).len(), budget);
        }
    }

    #[test]
    fn pack_rows_binary_keeps_weight_sign() {
        let plus = pack_rows(&[[1i8; 9]], Quantization::Binary);
        let minus = pack_rows(&[[-1i8; 9]], Quantization::Binary);
        assert_ne!(plus, minus);
        // +1 taps set their bits most-significant first, -1 taps clear them
        assert_eq!(plus[0][0], 0xff);
        assert_eq!(plus[0][1], 0x80);
        assert_eq!(minus[0][0], 0x00);
        assert_eq!(minus[0][1], 0x00);
    }

    #[test]
    fn generate_runs_end_to_end() {
        let net = Network::new(vec![layer()]);
        let cfg = RunConfig::default();
        let frame = Tensor::zeros(1, 8, 8);
        let report = generate(
            &net,
            &DeviceProfile::vtx700(),
            &cfg,
            Some(&frame),
            Some(&FixedPointSimulator),
            Box::new(Vec::new()),
        )
        .unwrap();
        assert_eq!(report.layers, 1);
        assert!(report.writes > 0);
    }

    #[test]
    fn init_tram_zeroes_every_cell_of_the_used_group() {
        let net = Network::new(vec![layer()]);
        let profile = DeviceProfile::vtx700();
        let plain = RunConfig::default();
        let mut cleared = RunConfig::default();
        cleared.init_tram = true;

        let base = generate(&net, &profile, &plain, None, None, Box::new(Vec::new()))
            .unwrap()
            .writes;
        let with_tram = generate(&net, &profile, &cleared, None, None, Box::new(Vec::new()))
            .unwrap()
            .writes;
        let cells = (profile.lanes_per_group * profile.tram_size) as u64;
        assert_eq!(with_tram - base, cells);
    }

    #[test]
    fn rejected_network_returns_rejected() {
        let mut l = layer();
        l.processor_map = 0; // no lanes
        let net = Network::new(vec![l]);
        let cfg = RunConfig::default();
        let err = generate(
            &net,
            &DeviceProfile::vtx700(),
            &cfg,
            None,
            None,
            Box::new(Vec::new()),
        )
        .unwrap_err();
        assert!(matches!(err, CodegenError::Rejected { .. }));
    }

    #[test]
    fn simulate_network_follows_in_sequences() {
        let mut l0 = layer();
        l0.next_sequence = Some(1);
        let mut l1 = LayerSpec::conv2d(4, 2, [8, 8]);
        l1.processor_map = 0xf;
        l1.output_processor_map = 0x3;
        l1.in_sequences = vec![0];
        l1.weights = Weights::new(vec![0; 2 * 4 * 9], 2, 4, 3, 3);
        let net = Network::new(vec![l0, l1]);
        let frame = Tensor::zeros(1, 8, 8);
        let out = simulate_network(&net, &FixedPointSimulator, &frame, 0).unwrap();
        assert_eq!(out.channels, 2);
        // Two unpadded 3x3 convolutions: 8 -> 6 -> 4
        assert_eq!(out.rows, 4);
    }
}
