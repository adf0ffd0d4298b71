//! Operation emission.
//!
//! [`Emitter`] sits between the register encoder and the instruction sink.
//! It owns the per-run overwrite tracker, the byte packer in front of all
//! data-memory writes, and the deferred verify table. Zero-valued register
//! writes are skipped unless the run forces them.

use crate::config::RunConfig;
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::memory::AddressSpaceTracker;
use crate::sink::{compact_verify, InstructionSink, VerifyEntry};
use tracing::{debug, info};
use vortex_chip::{regs, DeviceProfile};

/// A contiguous run of 32-bit words destined for one absolute address.
/// Side tables render one static array per run, consumed by a bulk copy
/// inside the load function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordRun {
    /// First word address of the run.
    pub addr: u32,
    /// Word values at `addr`, `addr + 4`, ...
    pub words: Vec<u32>,
}

/// Little-endian 4-byte accumulator keyed by a rolling byte address.
#[derive(Debug, Clone, Copy)]
struct Packer {
    /// Word-aligned flush target.
    base: u32,
    /// Next expected byte address.
    next: u32,
    word: u32,
    pending: bool,
}

/// Emits operations for one generation run.
#[derive(Debug)]
pub struct Emitter<'a> {
    profile: &'a DeviceProfile,
    config: &'a RunConfig,
    sink: InstructionSink,
    tracker: AddressSpaceTracker,
    packer: Option<Packer>,
    verify: Vec<VerifyEntry>,
}

impl<'a> Emitter<'a> {
    /// Create an emitter over an owned sink.
    #[must_use]
    pub fn new(profile: &'a DeviceProfile, config: &'a RunConfig, sink: InstructionSink) -> Self {
        Self {
            profile,
            config,
            sink,
            tracker: AddressSpaceTracker::new(),
            packer: None,
            verify: Vec::new(),
        }
    }

    /// The overwrite tracker.
    #[must_use]
    pub const fn tracker(&self) -> &AddressSpaceTracker {
        &self.tracker
    }

    /// Emit the artifact preamble: includes and defines, the side-table
    /// definitions (sample input and weight constants, when present) with
    /// the `memcpy32` helper that consumes them, then the load-function
    /// opening.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn header(&mut self, input: &[WordRun], kernels: &[WordRun]) -> Result<()> {
        self.sink.line("// Generated register program")?;
        self.sink.line("#include <stdint.h>")?;
        self.sink.line("#define CNN_OK 0")?;
        self.sink.line("#define CNN_FAIL (-1)")?;
        if !input.is_empty() || !kernels.is_empty() {
            self.sink.line("")?;
            self.sink
                .line("static void memcpy32(volatile uint32_t *dst, const uint32_t *src, int n)")?;
            self.sink.line("{")?;
            self.sink.line("  while (n-- > 0)")?;
            self.sink.line("    *dst++ = *src++;")?;
            self.sink.line("}")?;
            self.side_table("kernels", kernels)?;
            self.side_table("input", input)?;
        }
        self.sink.line("")?;
        self.sink.line("int cnn_load(void)")?;
        self.sink.line("{")?;
        Ok(())
    }

    fn side_table(&mut self, name: &str, runs: &[WordRun]) -> Result<()> {
        for (i, run) in runs.iter().enumerate() {
            self.sink.line("")?;
            self.sink
                .line(&format!("// {} word(s) for 0x{:08x}", run.words.len(), run.addr))?;
            self.sink
                .line(&format!("static const uint32_t {name}_{i}[] = {{"))?;
            for chunk in run.words.chunks(4) {
                let mut row = String::from(" ");
                for w in chunk {
                    row.push_str(&format!(" 0x{w:08x},"));
                }
                self.sink.line(&row)?;
            }
            self.sink.line("};")?;
        }
        Ok(())
    }

    /// Emit the bulk copies consuming a side table, in run order.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn copy_words(&mut self, name: &str, runs: &[WordRun]) -> Result<()> {
        for (i, run) in runs.iter().enumerate() {
            self.sink.line(&format!(
                "  memcpy32((uint32_t *) 0x{:08x}, {name}_{i}, {});",
                run.addr,
                run.words.len()
            ))?;
            self.sink.add_writes(run.words.len() as u64);
        }
        Ok(())
    }

    /// Emit the artifact postamble and flush the sink. Logs the bus-time
    /// estimate for the whole program.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn finish(&mut self) -> Result<()> {
        self.sink.line("  return CNN_OK;")?;
        self.sink.line("}")?;
        self.sink.flush()?;
        info!(
            writes = self.sink.writes(),
            reads = self.sink.reads(),
            "estimated bus time {:.3} ms",
            self.sink.access_time_ms()
        );
        Ok(())
    }

    /// Write a global control register. Zero values are skipped unless the
    /// run writes zero registers.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_ctl(&mut self, group: usize, reg: usize, value: u32, comment: &str) -> Result<()> {
        if value == 0 && !self.config.write_zero_regs {
            return Ok(());
        }
        let addr = regs::ctl_addr(self.profile, group, reg);
        let comment = zero_marked(value, comment);
        self.sink
            .write(addr, value, &comment, None, false, self.config.verify_writes)?;
        Ok(())
    }

    /// Write a per-layer register. Zero values are skipped unless the run
    /// writes zero registers.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_lreg(
        &mut self,
        group: usize,
        layer: usize,
        reg: usize,
        value: u32,
        comment: &str,
    ) -> Result<()> {
        if value == 0 && !self.config.write_zero_regs {
            return Ok(());
        }
        let addr = regs::lreg_addr(self.profile, group, layer, reg);
        let comment = zero_marked(value, format!("L{layer}: {comment}").as_str());
        self.sink
            .write(addr, value, &comment, None, false, self.config.verify_writes)?;
        Ok(())
    }

    /// Write a FIFO control register.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_fifo_ctl(&mut self, reg: usize, value: u32, comment: &str) -> Result<()> {
        if value == 0 && !self.config.write_zero_regs {
            return Ok(());
        }
        let addr = regs::fifo_addr(self.profile, reg);
        self.sink
            .write(addr, value, comment, None, false, self.config.verify_writes)?;
        Ok(())
    }

    /// Push one data word into a FIFO slot (streamed input).
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_fifo_data(&mut self, slot: usize, value: u32) -> Result<()> {
        let stat = regs::fifo_addr(self.profile, regs::FIFO_STAT);
        let wr = regs::fifo_addr(self.profile, regs::FIFO_WR + slot);
        self.sink
            .write(wr, value, "", Some((slot, stat, wr)), self.config.fast_fifo, false)?;
        Ok(())
    }

    /// Write one 9-byte kernel row into a lane's mask memory: three data
    /// words followed by the execute word at `+12`.
    ///
    /// In packed×4 mode the logical row is remapped through the quarter-bank
    /// interleave of the layer's allocation (`offs`, `count`).
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_kern(
        &mut self,
        diags: &mut Diagnostics,
        layer: usize,
        lane: usize,
        row: usize,
        taps: &[u8; 9],
        calcx4: Option<(usize, usize)>,
    ) -> Result<()> {
        let phys = match calcx4 {
            Some((offs, count)) => self.profile.calcx4_index(row, offs, count),
            None => row,
        };
        let addr = regs::kern_addr(self.profile, lane, phys);
        let words = [
            u32::from(taps[0]),
            u32::from(taps[1]) << 24 | u32::from(taps[2]) << 16 | u32::from(taps[3]) << 8 | u32::from(taps[4]),
            u32::from(taps[5]) << 24 | u32::from(taps[6]) << 16 | u32::from(taps[7]) << 8 | u32::from(taps[8]),
        ];
        for (i, w) in words.into_iter().enumerate() {
            self.write_mem(
                diags,
                layer,
                addr + 4 * i as u32,
                w,
                &format!("L{layer}: lane {lane} kernel row {row}"),
            )?;
        }
        // Execute the staged row
        self.write_mem(diags, layer, addr + 12, 0, "")?;
        Ok(())
    }

    /// Write one bias byte cell.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_bias(
        &mut self,
        diags: &mut Diagnostics,
        layer: usize,
        group: usize,
        offs: usize,
        value: i8,
    ) -> Result<()> {
        let addr = regs::bias_addr(self.profile, group, offs);
        #[allow(clippy::cast_sign_loss)]
        let v = u32::from(value as u8);
        self.write_mem(diags, layer, addr, v, &format!("L{layer}: bias[{offs}]"))
    }

    /// Write one TRAM cell.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_tram(
        &mut self,
        diags: &mut Diagnostics,
        layer: usize,
        lane: usize,
        offs: usize,
        value: u32,
    ) -> Result<()> {
        let addr = regs::tram_addr(self.profile, lane, offs);
        self.write_mem(diags, layer, addr, value, &format!("L{layer}: TRAM[{offs}]"))
    }

    /// Queue one data byte through the packer. Accumulates up to 4 bytes in
    /// little-endian order; a full word or a non-contiguous address flushes.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn write_data_byte(
        &mut self,
        diags: &mut Diagnostics,
        layer: usize,
        addr: u32,
        value: u8,
    ) -> Result<()> {
        if let Some(p) = self.packer {
            if addr != p.next || addr & !3 != p.base {
                self.flush_data(diags, layer)?;
            }
        }
        let p = self.packer.get_or_insert(Packer {
            base: addr & !3,
            next: addr,
            word: 0,
            pending: false,
        });
        p.word |= u32::from(value) << (8 * (addr & 3));
        p.next = addr + 1;
        p.pending = true;
        if p.next & 3 == 0 {
            // Word complete
            self.flush_data(diags, layer)?;
        }
        Ok(())
    }

    /// Flush any partial packed word (zero-padded).
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn flush_data(&mut self, diags: &mut Diagnostics, layer: usize) -> Result<()> {
        if let Some(p) = self.packer.take() {
            if p.pending {
                self.write_mem(diags, layer, p.base, p.word, "")?;
            }
        }
        Ok(())
    }

    fn write_mem(
        &mut self,
        diags: &mut Diagnostics,
        layer: usize,
        addr: u32,
        value: u32,
        comment: &str,
    ) -> Result<()> {
        if self.tracker.mark(addr) && !self.config.overwrite_ok {
            diags.advisory(layer, format!("address {addr:#010x} was already written in this run"));
        }
        self.sink.write(addr, value, comment, None, false, false)?;
        Ok(())
    }

    /// Verify one word. Collected into the deferred table when compact
    /// emission is requested, otherwise rendered immediately.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn verify_word(&mut self, addr: u32, value: u32, mask: u32, comment: &str) -> Result<()> {
        if self.config.compact_output {
            self.verify.push(VerifyEntry {
                addr,
                mask,
                value: value & mask,
            });
            return Ok(());
        }
        self.sink.verify(addr, value & mask, mask, comment)?;
        Ok(())
    }

    /// Busy-wait on a register.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn wait(&mut self, addr: u32, mask: u32, value: u32) -> Result<()> {
        self.sink.wait(addr, mask, value)?;
        Ok(())
    }

    /// Render the deferred verify table: sorted, run-length compacted, one
    /// compact lookup table plus a generic check loop.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the sink.
    pub fn finalize_verify(&mut self) -> Result<usize> {
        if self.verify.is_empty() {
            return Ok(0);
        }
        let blocks = compact_verify(&self.verify, self.config.max_verify_count);
        let total: usize = blocks.iter().map(|b| b.values.len()).sum();
        debug!(
            entries = self.verify.len(),
            blocks = blocks.len(),
            kept = total,
            "compacted verify table"
        );

        // The check function is part of the API surface; it follows the
        // split when one is configured
        self.sink.line_api("")?;
        self.sink.line_api("static const uint32_t sample_output[] = {")?;
        for b in &blocks {
            let mut row = format!(
                "  0x{:08x}, 0x{:08x}, 0x{:08x},",
                b.start,
                b.mask,
                b.values.len()
            );
            for v in &b.values {
                row.push_str(&format!(" 0x{v:08x},"));
            }
            self.sink.line_api(&row)?;
        }
        self.sink.line_api("  0x00000000,")?;
        self.sink.line_api("};")?;
        self.sink.line_api("")?;
        self.sink.line_api("int cnn_check_output(void)")?;
        self.sink.line_api("{")?;
        self.sink.line_api("  const uint32_t *ptr = sample_output;")?;
        self.sink.line_api("  while (*ptr != 0) {")?;
        self.sink.line_api("    uint32_t addr = *ptr++;")?;
        self.sink.line_api("    uint32_t mask = *ptr++;")?;
        self.sink.line_api("    uint32_t n = *ptr++;")?;
        self.sink.line_api("    while (n-- > 0) {")?;
        self.sink
            .line_api("      if ((*((volatile uint32_t *) addr) & mask) != *ptr++) return CNN_FAIL;")?;
        self.sink.line_api("      addr += 4;")?;
        self.sink.line_api("    }")?;
        self.sink.line_api("  }")?;
        self.sink.line_api("  return CNN_OK;")?;
        self.sink.line_api("}")?;

        // Non-source artifacts still record every expected value
        if !matches!(self.sink.kind(), crate::config::SinkKind::TopLevel) {
            for b in &blocks {
                for e in b.expand() {
                    self.sink.verify(e.addr, e.value, e.mask, "")?;
                }
            }
        }
        Ok(total)
    }

    /// Writes issued so far.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.sink.writes()
    }

    /// Reads issued so far.
    #[must_use]
    pub const fn reads(&self) -> u64 {
        self.sink.reads()
    }

    /// Estimated total bus-access time in milliseconds.
    #[must_use]
    pub fn access_time_ms(&self) -> f64 {
        self.sink.access_time_ms()
    }
}

fn zero_marked(value: u32, comment: &str) -> String {
    // Forced zero writes are marked so diffs against a default run read well
    if value == 0 {
        format!("{comment} *")
    } else {
        comment.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkKind;

    fn emitter<'a>(profile: &'a DeviceProfile, config: &'a RunConfig) -> Emitter<'a> {
        let sink = InstructionSink::new(SinkKind::Debug, Box::new(Vec::new()));
        Emitter::new(profile, config, sink)
    }

    #[test]
    fn packer_flushes_once_per_word() {
        let p = DeviceProfile::vtx700();
        let c = RunConfig::default();
        let mut d = Diagnostics::new(false);
        let mut em = emitter(&p, &c);
        for i in 0..8u32 {
            em.write_data_byte(&mut d, 0, 0x5020_0000 + i, i as u8).unwrap();
        }
        // Two complete little-endian words, no tracker violation
        assert_eq!(em.writes(), 2);
        assert!(em.tracker().written(0x5020_0000));
        assert!(em.tracker().written(0x5020_0004));
        assert!(d.items().is_empty());
    }

    #[test]
    fn non_contiguous_byte_forces_partial_flush() {
        let p = DeviceProfile::vtx700();
        let c = RunConfig::default();
        let mut d = Diagnostics::new(false);
        let mut em = emitter(&p, &c);
        em.write_data_byte(&mut d, 0, 0x5020_0000, 0x11).unwrap();
        em.write_data_byte(&mut d, 0, 0x5020_0001, 0x22).unwrap();
        // Jump mid-accumulation: the partial word flushes zero-padded
        em.write_data_byte(&mut d, 0, 0x5020_0010, 0x33).unwrap();
        assert_eq!(em.writes(), 1);
        em.flush_data(&mut d, 0).unwrap();
        assert_eq!(em.writes(), 2);
        assert!(em.tracker().written(0x5020_0000));
        assert!(em.tracker().written(0x5020_0010));
    }

    #[test]
    fn rewrites_raise_an_advisory() {
        let p = DeviceProfile::vtx700();
        let c = RunConfig::default();
        let mut d = Diagnostics::new(true);
        let mut em = emitter(&p, &c);
        em.write_bias(&mut d, 0, 0, 0, 1).unwrap();
        em.write_bias(&mut d, 0, 0, 0, 2).unwrap();
        assert_eq!(d.items().len(), 1);
    }

    #[test]
    fn overwrite_ok_suppresses_the_advisory() {
        let p = DeviceProfile::vtx700();
        let c = RunConfig {
            overwrite_ok: true,
            ..RunConfig::default()
        };
        let mut d = Diagnostics::new(false);
        let mut em = emitter(&p, &c);
        em.write_bias(&mut d, 0, 0, 0, 1).unwrap();
        em.write_bias(&mut d, 0, 0, 0, 2).unwrap();
        assert!(d.items().is_empty());
    }

    #[test]
    fn zero_registers_are_skipped_by_default() {
        let p = DeviceProfile::vtx700();
        let c = RunConfig::default();
        let mut em = emitter(&p, &c);
        em.write_lreg(0, 0, regs::LREG_PRCNT, 0, "pooling rows").unwrap();
        assert_eq!(em.writes(), 0);

        let force = RunConfig {
            write_zero_regs: true,
            ..RunConfig::default()
        };
        let mut em = emitter(&p, &force);
        em.write_lreg(0, 0, regs::LREG_PRCNT, 0, "pooling rows").unwrap();
        assert_eq!(em.writes(), 1);
    }

    #[test]
    fn kernel_row_takes_four_writes() {
        let p = DeviceProfile::vtx700();
        let c = RunConfig::default();
        let mut d = Diagnostics::new(false);
        let mut em = emitter(&p, &c);
        em.write_kern(&mut d, 0, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8, 9], None)
            .unwrap();
        assert_eq!(em.writes(), 4);
    }
}
