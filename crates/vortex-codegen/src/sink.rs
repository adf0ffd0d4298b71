//! Instruction sink: renders the (address, value) operation stream into one
//! physical artifact.
//!
//! The sink is a closed set of variants selected once per run. It owns the
//! output handle it was given and flushes it on drop, so the artifact is
//! complete on every exit path including early aborts. Run-scoped write and
//! read counters feed the bus-access time estimate reported at the end of
//! generation.

use crate::config::SinkKind;
use std::io::{self, Write};

/// APB bus write latency, nanoseconds.
const WRITE_TIME_NS: u64 = 280;
/// APB bus read latency, nanoseconds.
const READ_TIME_NS: u64 = 230;

/// One deferred verification entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyEntry {
    /// Absolute word address.
    pub addr: u32,
    /// Compare mask.
    pub mask: u32,
    /// Expected value (already masked).
    pub value: u32,
}

/// The polymorphic artifact writer.
pub struct InstructionSink {
    kind: SinkKind,
    out: Box<dyn Write>,
    /// Secondary "API" handle for top-level artifacts; receives the
    /// check-function split when configured.
    api: Option<Box<dyn Write>>,
    /// Block-level file offset, in words.
    foffs: u32,
    writes: u64,
    reads: u64,
}

impl std::fmt::Debug for InstructionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionSink")
            .field("kind", &self.kind)
            .field("writes", &self.writes)
            .field("reads", &self.reads)
            .finish_non_exhaustive()
    }
}

impl InstructionSink {
    /// Create a sink over an owned output handle.
    #[must_use]
    pub fn new(kind: SinkKind, out: Box<dyn Write>) -> Self {
        Self {
            kind,
            out,
            api: None,
            foffs: 0,
            writes: 0,
            reads: 0,
        }
    }

    /// Create a sink with a secondary API output handle. Only top-level
    /// artifacts use it; other kinds ignore the split.
    #[must_use]
    pub fn with_api(kind: SinkKind, out: Box<dyn Write>, api: Box<dyn Write>) -> Self {
        Self {
            kind,
            out,
            api: Some(api),
            foffs: 0,
            writes: 0,
            reads: 0,
        }
    }

    /// Account `n` bus writes issued outside the per-word path (bulk
    /// copies rendered as `memcpy32` statements).
    pub fn add_writes(&mut self, n: u64) {
        self.writes += n;
    }

    /// Artifact kind.
    #[must_use]
    pub const fn kind(&self) -> SinkKind {
        self.kind
    }

    /// Register writes issued so far.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Register reads issued so far (verify and wait operations).
    #[must_use]
    pub const fn reads(&self) -> u64 {
        self.reads
    }

    /// Estimated total bus-access time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn access_time_ms(&self) -> f64 {
        (WRITE_TIME_NS * self.writes + READ_TIME_NS * self.reads) as f64 / 1e6
    }

    /// Emit one register write.
    ///
    /// `fifo` selects the FIFO write path on top-level artifacts: the write
    /// goes to FIFO slot `c` behind a busy-wait poll on the FIFO status bit
    /// (suppressed by `no_wait`). `verify_after` appends a read-back check.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the output handle.
    pub fn write(
        &mut self,
        addr: u32,
        value: u32,
        comment: &str,
        fifo: Option<(usize, u32, u32)>,
        no_wait: bool,
        verify_after: bool,
    ) -> io::Result<()> {
        self.writes += 1;
        match self.kind {
            SinkKind::BlockLevel => {
                writeln!(self.out, "@{:04x} {:08x}", self.foffs, addr)?;
                writeln!(self.out, "@{:04x} {:08x}", self.foffs + 1, value)?;
                self.foffs += 2;
            }
            SinkKind::TopLevel => {
                if let Some((slot, stat_addr, wr_addr)) = fifo {
                    if !no_wait {
                        writeln!(
                            self.out,
                            "  while ((*((volatile uint32_t *) 0x{stat_addr:08x}) & {}) != 0);",
                            1u32 << slot
                        )?;
                    }
                    let comment = fmt_comment(comment);
                    writeln!(
                        self.out,
                        "  *((volatile uint32_t *) 0x{wr_addr:08x}) = 0x{value:08x};{comment}"
                    )?;
                } else {
                    let comment = fmt_comment(comment);
                    writeln!(
                        self.out,
                        "  *((volatile uint32_t *) 0x{addr:08x}) = 0x{value:08x};{comment}"
                    )?;
                }
                if verify_after {
                    self.reads += 1;
                    writeln!(
                        self.out,
                        "  if (*((volatile uint32_t *) 0x{addr:08x}) != 0x{value:08x}) return CNN_FAIL;"
                    )?;
                }
            }
            SinkKind::Debug => {}
        }
        Ok(())
    }

    /// Emit one immediate verification.
    ///
    /// Block-level artifacts degrade this to the same two-line form as a
    /// write (validity is asserted at generation time only); the debug
    /// artifact dumps just the expected value.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the output handle.
    pub fn verify(&mut self, addr: u32, value: u32, mask: u32, comment: &str) -> io::Result<()> {
        self.reads += 1;
        match self.kind {
            SinkKind::BlockLevel => {
                writeln!(self.out, "@{:04x} {:08x}", self.foffs, addr)?;
                writeln!(self.out, "@{:04x} {:08x}", self.foffs + 1, value)?;
                self.foffs += 2;
            }
            SinkKind::TopLevel => {
                let comment = fmt_comment(comment);
                if mask == u32::MAX {
                    writeln!(
                        self.out,
                        "  if (*((volatile uint32_t *) 0x{addr:08x}) != 0x{value:08x}) return CNN_FAIL;{comment}"
                    )?;
                } else {
                    writeln!(
                        self.out,
                        "  if ((*((volatile uint32_t *) 0x{addr:08x}) & 0x{mask:08x}) != 0x{value:08x}) return CNN_FAIL;{comment}"
                    )?;
                }
            }
            SinkKind::Debug => {
                writeln!(self.out, "{value:08x}")?;
            }
        }
        Ok(())
    }

    /// Emit a busy-wait until `(mem[addr] & mask) == value`.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the output handle.
    pub fn wait(&mut self, addr: u32, mask: u32, value: u32) -> io::Result<()> {
        self.reads += 1;
        match self.kind {
            SinkKind::BlockLevel => {
                writeln!(self.out, "@{:04x} {:08x}", self.foffs, addr)?;
                writeln!(self.out, "@{:04x} {:08x}", self.foffs + 1, value)?;
                self.foffs += 2;
            }
            SinkKind::TopLevel => {
                writeln!(
                    self.out,
                    "  while ((*((volatile uint32_t *) 0x{addr:08x}) & 0x{mask:08x}) != 0x{value:08x});"
                )?;
            }
            SinkKind::Debug => {}
        }
        Ok(())
    }

    /// Emit a raw source line (top-level framing, tables, function bodies).
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the output handle.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        if self.kind == SinkKind::TopLevel {
            writeln!(self.out, "{text}")?;
        }
        Ok(())
    }

    /// Emit a raw source line on the API split, falling back to the main
    /// handle when no split is configured.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the output handle.
    pub fn line_api(&mut self, text: &str) -> io::Result<()> {
        if self.kind == SinkKind::TopLevel {
            match &mut self.api {
                Some(api) => writeln!(api, "{text}")?,
                None => writeln!(self.out, "{text}")?,
            }
        }
        Ok(())
    }

    /// Flush the owned handles.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the output handles.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        if let Some(api) = &mut self.api {
            api.flush()?;
        }
        Ok(())
    }
}

impl Drop for InstructionSink {
    fn drop(&mut self) {
        // Completion on every exit path, including fatal aborts
        let _ = self.out.flush();
        if let Some(api) = &mut self.api {
            let _ = api.flush();
        }
    }
}

fn fmt_comment(comment: &str) -> String {
    if comment.is_empty() {
        String::new()
    } else {
        format!(" // {comment}")
    }
}

/// Sort entries by `(mask, address)` and run-length compact them: runs with
/// one mask and strictly +4-incrementing addresses merge into one block
/// `(start, mask, count, values...)`. An optional cap truncates the number
/// of compacted values. The result feeds a generic runtime check loop; a
/// zero word terminates the table.
#[must_use]
pub fn compact_verify(entries: &[VerifyEntry], max_count: Option<usize>) -> Vec<CompactBlock> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| (e.mask, e.addr));

    let mut blocks: Vec<CompactBlock> = Vec::new();
    let mut kept = 0usize;
    for e in sorted {
        if let Some(cap) = max_count {
            if kept >= cap {
                break;
            }
        }
        kept += 1;
        if let Some(last) = blocks.last_mut() {
            if last.mask == e.mask && e.addr == last.start + 4 * last.values.len() as u32 {
                last.values.push(e.value);
                continue;
            }
        }
        blocks.push(CompactBlock {
            start: e.addr,
            mask: e.mask,
            values: vec![e.value],
        });
    }
    blocks
}

/// One compacted verify run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactBlock {
    /// First word address of the run.
    pub start: u32,
    /// Compare mask shared by the run.
    pub mask: u32,
    /// Expected values at `start`, `start + 4`, ...
    pub values: Vec<u32>,
}

impl CompactBlock {
    /// Expand the block back into individual entries.
    #[must_use]
    pub fn expand(&self) -> Vec<VerifyEntry> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &value)| VerifyEntry {
                addr: self.start + 4 * i as u32,
                mask: self.mask,
                value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    fn e(addr: u32, mask: u32, value: u32) -> VerifyEntry {
        VerifyEntry { addr, mask, value }
    }

    /// Cloneable writer so a test can read back what the owned sink wrote.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn block_level_emits_two_lines_per_operation() {
        let buf = SharedBuf::default();
        let mut sink = InstructionSink::new(SinkKind::BlockLevel, Box::new(buf.clone()));
        sink.write(0x5010_0000, 0xdead_beef, "", None, false, false)
            .unwrap();
        sink.verify(0x5010_0004, 0x1234_5678, u32::MAX, "").unwrap();
        drop(sink);
        assert_eq!(
            buf.text(),
            "@0000 50100000\n@0001 deadbeef\n@0002 50100004\n@0003 12345678\n"
        );
    }

    #[test]
    fn top_level_emits_pointer_statements() {
        let buf = SharedBuf::default();
        let mut sink = InstructionSink::new(SinkKind::TopLevel, Box::new(buf.clone()));
        sink.write(0x5010_0000, 1, "enable", None, false, false).unwrap();
        sink.wait(0x5010_0000, 0x1, 0).unwrap();
        drop(sink);
        let text = buf.text();
        assert!(text.contains("*((volatile uint32_t *) 0x50100000) = 0x00000001; // enable"));
        assert!(text.contains("while ((*((volatile uint32_t *) 0x50100000) & 0x00000001) != 0x00000000);"));
    }

    #[test]
    fn api_split_routes_lines_to_the_secondary_handle() {
        let main = SharedBuf::default();
        let api = SharedBuf::default();
        let mut sink =
            InstructionSink::with_api(SinkKind::TopLevel, Box::new(main.clone()), Box::new(api.clone()));
        sink.line("int cnn_load(void)").unwrap();
        sink.line_api("int cnn_check_output(void)").unwrap();
        drop(sink);
        assert!(main.text().contains("cnn_load"));
        assert!(!main.text().contains("cnn_check_output"));
        assert!(api.text().contains("cnn_check_output"));
    }

    #[test]
    fn api_lines_fall_back_to_the_main_handle() {
        let main = SharedBuf::default();
        let mut sink = InstructionSink::new(SinkKind::TopLevel, Box::new(main.clone()));
        sink.line_api("int cnn_check_output(void)").unwrap();
        drop(sink);
        assert!(main.text().contains("cnn_check_output"));
    }

    #[test]
    fn debug_sink_dumps_expected_values_only() {
        let buf = SharedBuf::default();
        let mut sink = InstructionSink::new(SinkKind::Debug, Box::new(buf.clone()));
        sink.write(0x5010_0000, 1, "", None, false, false).unwrap();
        sink.verify(0x5010_0000, 0xcafe_f00d, u32::MAX, "").unwrap();
        drop(sink);
        assert_eq!(buf.text(), "cafef00d\n");
    }

    #[test]
    fn access_time_counts_writes_and_reads() {
        let mut sink = InstructionSink::new(SinkKind::Debug, Box::new(Vec::new()));
        for _ in 0..1000 {
            sink.write(0, 0, "", None, false, false).unwrap();
        }
        for _ in 0..500 {
            sink.verify(0, 0, u32::MAX, "").unwrap();
        }
        let expected = (280.0 * 1000.0 + 230.0 * 500.0) / 1e6;
        assert!((sink.access_time_ms() - expected).abs() < 1e-9);
    }

    #[test]
    fn compaction_merges_strided_runs() {
        let entries = vec![
            e(0x108, 0xffff_ffff, 3),
            e(0x100, 0xffff_ffff, 1),
            e(0x104, 0xffff_ffff, 2),
            e(0x200, 0x0000_00ff, 9),
        ];
        let blocks = compact_verify(&entries, None);
        assert_eq!(blocks.len(), 2);
        // Partial-mask block sorts first
        assert_eq!(blocks[0].mask, 0xff);
        assert_eq!(blocks[1].start, 0x100);
        assert_eq!(blocks[1].values, vec![1, 2, 3]);
    }

    #[test]
    fn compaction_breaks_on_address_gap_and_mask_change() {
        let entries = vec![
            e(0x100, 0xffff_ffff, 1),
            e(0x104, 0xffff_ffff, 2),
            e(0x10c, 0xffff_ffff, 4), // gap
            e(0x110, 0x0000_ffff, 5), // mask change
        ];
        let blocks = compact_verify(&entries, None);
        assert_eq!(blocks.len(), 3);
    }

    #[test]
    fn compaction_is_lossless() {
        let entries = vec![
            e(0x300, 0xff, 7),
            e(0x100, u32::MAX, 1),
            e(0x108, u32::MAX, 3),
            e(0x104, u32::MAX, 2),
            e(0x2fc, 0xff, 6),
        ];
        let blocks = compact_verify(&entries, None);
        let mut expanded: Vec<VerifyEntry> = blocks.iter().flat_map(CompactBlock::expand).collect();
        let mut original = entries;
        original.sort_by_key(|x| (x.mask, x.addr));
        expanded.sort_by_key(|x| (x.mask, x.addr));
        assert_eq!(expanded, original);
    }

    #[test]
    fn compaction_cap_truncates_entries() {
        let entries: Vec<_> = (0..10).map(|i| e(0x100 + 4 * i, u32::MAX, i)).collect();
        let blocks = compact_verify(&entries, Some(4));
        let total: usize = blocks.iter().map(|b| b.values.len()).sum();
        assert_eq!(total, 4);
    }
}
