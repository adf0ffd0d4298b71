//! Register file layout and APB address math.
//!
//! Every group carries one block of global control registers followed by a
//! per-layer register file. Layer registers are laid out register-major:
//! all layer slots of one register index are contiguous, so the address of
//! `(reg, layer)` is `cnn_base + 0x1000 + 4 * (reg * max_layers + layer)`.

use crate::profile::DeviceProfile;

// ── Global control registers (word index from the group's register base) ─────

/// Main control: enable, clock, master select, external source.
pub const REG_CTL: usize = 0;
/// SRAM voltage/timing control.
pub const REG_SRAM: usize = 1;
/// Highest layer slot to execute.
pub const REG_LCNT_MAX: usize = 2;
/// SRAM BIST control (register-clear pre-pass).
pub const REG_SRAM_TEST: usize = 3;

// ── FIFO registers (word index from the FIFO block base) ─────────────────────

/// FIFO control.
pub const FIFO_CTL: usize = 0;
/// FIFO watermark thresholds.
pub const FIFO_THRES: usize = 1;
/// FIFO write port (one per channel slot, 4 slots).
pub const FIFO_WR: usize = 4;
/// FIFO status (polled by top-level artifacts before FIFO writes).
pub const FIFO_STAT: usize = 8;

// ── Per-layer registers (register index within the layer register file) ──────

/// Row count / padding.
pub const LREG_RCNT: usize = 0;
/// Column count / padding.
pub const LREG_CCNT: usize = 1;
/// 1-D control: kernel width, timeslots, element-wise function.
pub const LREG_ONED: usize = 2;
/// Pooling row count / dilation increment.
pub const LREG_PRCNT: usize = 3;
/// Pooling column count / dilation increment.
pub const LREG_PCCNT: usize = 4;
/// Convolution stride / multi-pass stride.
pub const LREG_STRIDE: usize = 5;
/// Write pointer base.
pub const LREG_WPTR_BASE: usize = 6;
/// Write pointer timeslot offset.
pub const LREG_WPTR_TOFFS: usize = 7;
/// Write pointer multi-pass (mask) offset.
pub const LREG_WPTR_MOFFS: usize = 8;
/// Write pointer channel offset (wide output).
pub const LREG_WPTR_CHOFFS: usize = 9;
/// Read pointer base.
pub const LREG_RPTR_BASE: usize = 10;
/// Layer control.
pub const LREG_LCTL: usize = 11;
/// Mask offset/count (legacy combined form).
pub const LREG_MCNT: usize = 12;
/// TRAM pointer maximum.
pub const LREG_TPTR: usize = 13;
/// Lane enable / master lane select.
pub const LREG_ENA: usize = 14;
/// Post-processing: shift, bias, activation, mode bits.
pub const LREG_POST: usize = 15;
/// Streaming start (prefill).
pub const LREG_STREAM1: usize = 16;
/// Streaming deltas.
pub const LREG_STREAM2: usize = 17;
/// Streaming rollover (frame buffer maximum).
pub const LREG_FMAX: usize = 18;
/// Input frame size (streamed first layer).
pub const LREG_IFRM: usize = 19;
/// Layer control 2: read-ahead, kernel prime counts (VTX800).
pub const LREG_LCTL2: usize = 20;
/// Mask offset start (VTX800 split form).
pub const LREG_MCNT1: usize = 21;
/// Mask offset end (VTX800 split form).
pub const LREG_MCNT2: usize = 22;
/// Output channel count.
pub const LREG_OCHAN: usize = 23;
/// Next-layer link / stop.
pub const LREG_NXTLYR: usize = 24;

/// Layer register file stride between register indices, in layer slots.
/// Matches the largest `max_layers` across variants so both parts share one
/// layout.
pub const LREG_STRIDE_SLOTS: usize = 128;

// ── Control register bits ────────────────────────────────────────────────────

/// `REG_CTL` bit definitions.
pub mod ctl {
    /// Start/enable the group state machine.
    pub const ENA: u32 = 1 << 0;
    /// SRAM ready-select wait states (2 bits).
    pub const RDY_SEL_SHIFT: u32 = 1;
    /// Gate the group clock.
    pub const CLK_EN: u32 = 1 << 3;
    /// Streaming mode.
    pub const STREAM_ENA: u32 = 1 << 4;
    /// FIFO front end.
    pub const FIFO_ENA: u32 = 1 << 5;
    /// One-shot (single layer step) mode.
    pub const ONESHOT: u32 = 1 << 8;
    /// External-source group select (2 bits).
    pub const EXT_SYNC_SHIFT: u32 = 9;
    /// This group drives the others.
    pub const MASTER: u32 = 1 << 11;
    /// Snoop-conditional execution.
    pub const SNOOP_ENA: u32 = 1 << 12;
    /// PLL clock source.
    pub const PLL_ENA: u32 = 1 << 13;
    /// Pipeline clocking.
    pub const PIPELINE_ENA: u32 = 1 << 14;
    /// FIFO-go autostart.
    pub const FIFO_GO: u32 = 1 << 15;
}

/// `REG_SRAM` values.
pub mod sram {
    /// Nominal voltage/timing control word.
    pub const DEFAULT: u32 = 0x0000_040E;
    /// BIST run bit for `REG_SRAM_TEST`.
    pub const BIST_RUN: u32 = 1 << 0;
    /// BIST completion status.
    pub const BIST_DONE: u32 = 1 << 1;
}

// ── Layer register bits ──────────────────────────────────────────────────────

/// `LREG_LCTL` bit definitions.
pub mod lctl {
    /// Slave SRAM load (always set on active layers).
    pub const SLAVE_LOAD: u32 = 1 << 5;
    /// Channel-major (planar) input format.
    pub const CHAN_MAJOR: u32 = 1 << 6;
    /// Pooling enable.
    pub const POOL_ENA: u32 = 1 << 7;
    /// Max pooling (unset = average).
    pub const POOL_MAX: u32 = 1 << 8;
    /// Master group for this layer.
    pub const MASTER: u32 = 1 << 11;
    /// Parallel source-group enables (4 bits, one per group).
    pub const SRC_SHIFT: u32 = 12;
    /// 32-bit wide output.
    pub const WIDE: u32 = 1 << 16;
    /// Depthwise broadcast read mode.
    pub const BCAST: u32 = 1 << 29;
    /// Kernel bypass.
    pub const BYPASS: u32 = 1 << 30;
}

/// `LREG_LCTL2` bit definitions (VTX800).
pub mod lctl2 {
    /// Streaming read-ahead.
    pub const RD_AHEAD: u32 = 1 << 0;
    /// Table-calc packing for multi-pass read-ahead.
    pub const TCALC: u32 = 1 << 1;
    /// Kernel row prime count (3 bits).
    pub const RPRIME_SHIFT: u32 = 4;
    /// Kernel column prime count (3 bits).
    pub const CPRIME_SHIFT: u32 = 8;
}

/// `LREG_ONED` bit definitions.
pub mod oned {
    /// 1-D kernel width minus one (4 bits).
    pub const WIDTH_SHIFT: u32 = 0;
    /// Output multiplex timeslot count (4 bits).
    pub const TSCNT_SHIFT: u32 = 4;
    /// 1-D processing enable.
    pub const ONED_ENA: u32 = 1 << 12;
    /// Element-wise enable.
    pub const EWISE_ENA: u32 = 1 << 13;
    /// Element-wise function (2 bits: add, sub, xor, or).
    pub const EWISE_FUNC_SHIFT: u32 = 14;
    /// Pool the operands before combining.
    pub const PREPOOL: u32 = 1 << 16;
    /// Operand count minus one (2 bits).
    pub const OPERANDS_SHIFT: u32 = 17;
}

/// `LREG_POST` bit definitions.
pub mod post {
    /// Output shift magnitude (4 bits).
    pub const SHIFT_SHIFT: u32 = 0;
    /// Shift direction: set = left (multiply).
    pub const SHIFT_LEFT: u32 = 1 << 4;
    /// Bias bank offset (11 bits).
    pub const BIAS_OFFS_SHIFT: u32 = 5;
    /// Bias enable.
    pub const BIAS_ENA: u32 = 1 << 16;
    /// Activation selector (2 bits: none, ReLU, abs).
    pub const ACT_SHIFT: u32 = 17;
    /// Flatten to 1-D.
    pub const FLATTEN: u32 = 1 << 19;
    /// One-pad timeslot enable.
    pub const TS_ENA: u32 = 1 << 20;
    /// Depthwise convolution.
    pub const DW: u32 = 1 << 21;
    /// Packed×4 kernel fetch.
    pub const XPMP: u32 = 1 << 22;
    /// Table-calc mode.
    pub const TCALC: u32 = 1 << 23;
    /// Read-ahead mode.
    pub const RD_AHEAD: u32 = 1 << 24;
}

/// `LREG_NXTLYR` bit definitions.
pub mod nxtlyr {
    /// Stop after this layer (no successor).
    pub const STOP: u32 = 1 << 7;
}

// ── Address math ─────────────────────────────────────────────────────────────

/// Absolute address of a global control register.
#[must_use]
pub fn ctl_addr(p: &DeviceProfile, group: usize, reg: usize) -> u32 {
    p.apb_base + p.group_offs * group as u32 + p.cnn_base + ((reg as u32) << 2)
}

/// Absolute address of a per-layer register.
#[must_use]
pub fn lreg_addr(p: &DeviceProfile, group: usize, layer: usize, reg: usize) -> u32 {
    p.apb_base
        + p.group_offs * group as u32
        + p.cnn_base
        + 0x1000
        + 4 * (reg * LREG_STRIDE_SLOTS + layer) as u32
}

/// Absolute address of a FIFO register.
#[must_use]
pub fn fifo_addr(p: &DeviceProfile, reg: usize) -> u32 {
    p.apb_base + p.fifo_base + ((reg as u32) << 2)
}

/// Absolute address of a mask-memory row for one lane. Rows are 128-bit
/// aligned (16-byte stride); a row write takes three data words plus an
/// execute word at `+12`.
#[must_use]
pub fn kern_addr(p: &DeviceProfile, lane: usize, row: usize) -> u32 {
    let group = (lane / p.lanes_per_group) as u32;
    let lane_in_group = (lane % p.lanes_per_group) as u32;
    p.apb_base
        + p.group_offs * group
        + p.mram_base
        + lane_in_group * p.mram_lane_stride
        + (row as u32) * 16
}

/// Absolute address of a bias byte cell within a group's bias bank.
#[must_use]
pub fn bias_addr(p: &DeviceProfile, group: usize, offs: usize) -> u32 {
    p.apb_base + p.group_offs * group as u32 + p.bram_base + ((offs as u32) << 2)
}

/// Absolute address of a TRAM cell for one lane.
#[must_use]
pub fn tram_addr(p: &DeviceProfile, lane: usize, offs: usize) -> u32 {
    let group = (lane / p.lanes_per_group) as u32;
    let lane_in_group = (lane % p.lanes_per_group) as u32;
    p.apb_base
        + p.group_offs * group
        + p.tram_base
        + (lane_in_group * p.tram_lane_stride + offs as u32) * 4
}

/// Absolute byte address within the data memory of the shared bank holding
/// `lane`. `byte_offs` counts from the start of that bank.
#[must_use]
pub fn data_addr(p: &DeviceProfile, lane: usize, byte_offs: usize) -> u32 {
    let group = (lane / p.lanes_per_group) as u32;
    let bank_in_group = ((lane % p.lanes_per_group) / p.lanes_shared) as u32;
    p.apb_base
        + p.group_offs * group
        + p.sram_base
        + bank_in_group * p.data_mem_bytes() as u32
        + byte_offs as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_registers_do_not_collide() {
        let p = DeviceProfile::vtx700();
        let a = lreg_addr(&p, 0, 0, LREG_RCNT);
        let b = lreg_addr(&p, 0, 1, LREG_RCNT);
        let c = lreg_addr(&p, 0, 0, LREG_CCNT);
        assert_eq!(b - a, 4);
        assert_eq!(c - a, 4 * LREG_STRIDE_SLOTS as u32);
    }

    #[test]
    fn group_strides_apply_everywhere() {
        let p = DeviceProfile::vtx800();
        assert_eq!(
            ctl_addr(&p, 1, REG_CTL) - ctl_addr(&p, 0, REG_CTL),
            p.group_offs
        );
        assert_eq!(kern_addr(&p, 16, 0) - kern_addr(&p, 0, 0), p.group_offs);
        assert_eq!(tram_addr(&p, 16, 0) - tram_addr(&p, 0, 0), p.group_offs);
    }

    #[test]
    fn kernel_rows_are_16_byte_aligned() {
        let p = DeviceProfile::vtx700();
        assert_eq!(kern_addr(&p, 0, 1) - kern_addr(&p, 0, 0), 16);
        assert_eq!(kern_addr(&p, 1, 0) - kern_addr(&p, 0, 0), p.mram_lane_stride);
    }

    #[test]
    fn data_banks_are_shared_by_four_lanes() {
        let p = DeviceProfile::vtx700();
        assert_eq!(data_addr(&p, 0, 0), data_addr(&p, 3, 0));
        assert_eq!(
            data_addr(&p, 4, 0) - data_addr(&p, 0, 0),
            p.data_mem_bytes() as u32
        );
    }
}
