//! Run configuration.
//!
//! Global options for one generation run. Everything here is orthogonal to
//! the network description itself: artifact selection, validation strictness,
//! and the device-level run modes (FIFO, pipeline, one-shot) that apply to
//! the whole program rather than a single layer.

/// Which artifact the instruction sink renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkKind {
    /// Simulation memory image: two `@offset value` lines per operation.
    BlockLevel,
    /// Inline C-like register-access statements.
    #[default]
    TopLevel,
    /// Expected-value dump only, for memory-content inspection.
    Debug,
}

/// Options for one generation run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Artifact kind.
    pub sink: SinkKind,
    /// First layer slot to execute.
    pub start_layer: usize,
    /// Enable the FIFO front end.
    pub fifo: bool,
    /// FIFO-go autostart.
    pub fifo_go: bool,
    /// Pipelined clocking.
    pub pipeline: bool,
    /// PLL clock source.
    pub pll: bool,
    /// One-shot execution.
    pub oneshot: bool,
    /// Conditional "snoop" execution.
    pub snoop: bool,
    /// Downgrade advisories to warnings and keep going.
    pub permissive: bool,
    /// Tolerate output ranges that overwrite still-needed input data.
    pub overwrite_ok: bool,
    /// Emit a read-back check after every register write (top-level only).
    pub verify_writes: bool,
    /// Emit writes even for zero-valued registers.
    pub write_zero_regs: bool,
    /// Verify the final output against the reference simulator.
    pub verify_output: bool,
    /// Collect verify entries into one compacted table instead of inline
    /// conditionals.
    pub compact_output: bool,
    /// Cap on compacted verify values; `None` keeps everything.
    pub max_verify_count: Option<usize>,
    /// Skip the busy-wait poll before FIFO writes.
    pub fast_fifo: bool,
    /// Zero the Tornado RAM of every used group before execution.
    pub init_tram: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            start_layer: 0,
            fifo: false,
            fifo_go: false,
            pipeline: false,
            pll: false,
            oneshot: false,
            snoop: false,
            permissive: false,
            overwrite_ok: false,
            verify_writes: false,
            write_zero_regs: false,
            verify_output: true,
            compact_output: true,
            max_verify_count: None,
            fast_fifo: false,
            init_tram: false,
        }
    }
}

impl RunConfig {
    /// Permissive configuration: advisories warn instead of failing.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }
}
