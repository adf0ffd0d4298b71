//! Device capability and geometry tables.
//!
//! One [`DeviceProfile`] instance exists per device variant and is read-only
//! for the whole compilation run. Every generation difference between VTX700
//! and VTX800 is an explicit field here; compiler passes branch on these
//! fields, never on the variant enum directly.

/// Vortex device variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceVariant {
    /// VTX700 — first-generation part. Legacy streaming register arithmetic,
    /// no packed×4 kernel layout, no read-ahead.
    Vtx700,

    /// VTX800 — second-generation part. New streaming arithmetic (difference
    /// counters), packed×4, read-ahead, pipelined clocking.
    Vtx800,
}

impl DeviceVariant {
    /// Parse a variant from its marketing name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "vtx700" | "700" => Some(Self::Vtx700),
            "vtx800" | "800" => Some(Self::Vtx800),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vtx700 => write!(f, "VTX700"),
            Self::Vtx800 => write!(f, "VTX800"),
        }
    }
}

/// Immutable capability/geometry table for one device variant.
///
/// Field groups: lane geometry, memory geometry, APB address map, register
/// bitfield placement, register bit widths (for range checks), and boolean
/// capability flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Which variant this table describes.
    pub variant: DeviceVariant,

    // ── Lane geometry ────────────────────────────────────────────────────

    /// Processing groups on the die.
    pub groups: usize,
    /// Parallel lanes per group.
    pub lanes_per_group: usize,
    /// Lanes sharing one data-memory bank and one write timeslot set.
    pub lanes_shared: usize,
    /// Hardware layer slots.
    pub max_layers: usize,
    /// Layers that may stream concurrently from the FIFO front end.
    pub max_stream_layers: usize,
    /// Maximum concurrent channels a single layer may carry.
    pub max_channels: usize,

    // ── Memory geometry ──────────────────────────────────────────────────

    /// Mask-memory rows per lane below the packed×4 region split.
    pub mask_width_small: usize,
    /// Total mask-memory rows per lane.
    pub mask_width_large: usize,
    /// 32-bit words per physical data-memory instance.
    pub instance_width: usize,
    /// Bias bytes per group.
    pub bias_size: usize,
    /// TRAM rows per lane.
    pub tram_size: usize,
    /// Maximum streamed input frame, in pixels.
    pub frame_size_max: usize,

    // ── APB address map ──────────────────────────────────────────────────

    /// APB aperture base address.
    pub apb_base: u32,
    /// Address stride between groups.
    pub group_offs: u32,
    /// Control/layer register block, relative to the group base.
    pub cnn_base: u32,
    /// Mask (kernel) memory, relative to the group base.
    pub mram_base: u32,
    /// Bias memory, relative to the group base.
    pub bram_base: u32,
    /// TRAM, relative to the group base.
    pub tram_base: u32,
    /// Data memory, relative to the group base.
    pub sram_base: u32,
    /// FIFO register block, relative to the APB base.
    pub fifo_base: u32,
    /// Byte stride between per-lane mask memories.
    pub mram_lane_stride: u32,
    /// Word stride between per-lane TRAM apertures.
    pub tram_lane_stride: u32,

    // ── Register bitfield placement ──────────────────────────────────────

    /// Padding count position in the row/column count registers (legacy
    /// stop/pad family).
    pub pad_cnt_offs: u32,
    /// "Difference to next pooling fetch" position (new family only).
    pub cnt_diff_offs: u32,
    /// Pad-enable bit position (new family only).
    pub pad_ena_offs: u32,
    /// Pooling-dilation increment position in the pooling count registers.
    pub cnt_inc_offs: u32,
    /// Multi-pass stride term position in the stride register.
    pub mp_stride_offs: u32,
    /// Instance-select shift in the write-pointer base register.
    pub write_ptr_shift: u32,

    // ── Register bit widths (range checks) ───────────────────────────────

    /// Row/column active-count width.
    pub max_cnt_bits: u32,
    /// Read/write pointer width.
    pub max_ptr_bits: u32,
    /// Streaming start (prefill) width.
    pub max_isval_bits: u32,
    /// Streaming delta-1 width.
    pub max_dsval1_bits: u32,
    /// Streaming delta-2 width.
    pub max_dsval2_bits: u32,
    /// Rollover (frame-buffer) width.
    pub max_fbuf_bits: u32,
    /// Input frame size width.
    pub max_ifrm_bits: u32,
    /// Write-pointer timeslot increment width.
    pub max_wptrinc_bits: u32,
    /// TRAM pointer width.
    pub max_tptr_bits: u32,
    /// Mask offset width.
    pub max_mcnt_bits: u32,

    // ── Capability flags ─────────────────────────────────────────────────

    /// Generation may begin at a nonzero layer slot.
    pub start_layer: bool,
    /// Arbitrary layer chaining (`next_sequence` / `in_sequences` rewiring).
    pub link_layer: bool,
    /// Streaming read-ahead.
    pub read_ahead: bool,
    /// Pipelined high-speed clocking.
    pub pipeline: bool,
    /// Packed×4 kernel memory layout.
    pub calcx4: bool,
    /// Binary (±1) weights.
    pub binary_weights: bool,
    /// Depthwise / grouped convolution.
    pub depthwise: bool,
    /// Kernel bypass (identity weights).
    pub kernel_bypass: bool,
    /// One-shot (single-layer-step) execution.
    pub oneshot: bool,
    /// PLL clock source.
    pub pll: bool,
    /// FIFO-go autostart.
    pub fifo_go: bool,
    /// Conditional "snoop" execution.
    pub snoop: bool,
    /// Stride greater than one combined with multi-pass input expansion.
    pub multipass_stride: bool,
    /// Element-wise operands combined with multi-pass input expansion.
    pub eltwise_multipass: bool,
    /// New streaming register arithmetic (difference counters). When false
    /// the legacy stop/pad stream formulas apply.
    pub new_streaming: bool,
    /// Streaming hardware computes 3×3 only; 1×1 streamed kernels must be
    /// emulated by center-tap substitution.
    pub streaming_requires_3x3: bool,
    /// The final layer of a streaming chain may use zero padding.
    pub nonpad_final_streaming_ok: bool,
    /// All registers must be cleared before configuration (power-on state
    /// is undefined on this part).
    pub require_reg_clear: bool,
    /// Longest 1-D kernel accepted by the 2-D dilation emulation. Zero
    /// disables the emulation entirely.
    pub max_dilation_1d_kernel: usize,
    /// Largest 1-D dilation accepted by the 2-D emulation.
    pub max_dilation_1d: usize,
    /// Largest 1-D padding accepted by the 2-D emulation.
    pub max_dilation_1d_pad: usize,
}

impl DeviceProfile {
    /// VTX700 capability table.
    #[must_use]
    pub const fn vtx700() -> Self {
        Self {
            variant: DeviceVariant::Vtx700,
            groups: 4,
            lanes_per_group: 16,
            lanes_shared: 4,
            max_layers: 32,
            max_stream_layers: 8,
            max_channels: 512,
            mask_width_small: 768,
            mask_width_large: 768,
            instance_width: 2048,
            bias_size: 512,
            tram_size: 3072,
            frame_size_max: 1 << 20,
            apb_base: 0x5000_0000,
            group_offs: 0x0040_0000,
            cnn_base: 0x0010_0000,
            mram_base: 0x0018_0000,
            bram_base: 0x0008_0000,
            tram_base: 0x001C_0000,
            sram_base: 0x0020_0000,
            fifo_base: 0x0000_2000,
            mram_lane_stride: 0x4000,
            tram_lane_stride: 4096,
            pad_cnt_offs: 16,
            cnt_diff_offs: 0, // no difference counters on this part
            pad_ena_offs: 0,
            cnt_inc_offs: 0,
            mp_stride_offs: 0,
            write_ptr_shift: 13,
            max_cnt_bits: 10,
            max_ptr_bits: 17,
            max_isval_bits: 14,
            max_dsval1_bits: 5,
            max_dsval2_bits: 12,
            max_fbuf_bits: 17,
            max_ifrm_bits: 20,
            max_wptrinc_bits: 14,
            max_tptr_bits: 14,
            max_mcnt_bits: 16,
            start_layer: false,
            link_layer: false,
            read_ahead: false,
            pipeline: false,
            calcx4: false,
            binary_weights: false,
            depthwise: true,
            kernel_bypass: false,
            oneshot: false,
            pll: false,
            fifo_go: false,
            snoop: false,
            multipass_stride: false,
            eltwise_multipass: false,
            new_streaming: false,
            streaming_requires_3x3: true,
            nonpad_final_streaming_ok: false,
            require_reg_clear: false,
            max_dilation_1d_kernel: 0,
            max_dilation_1d: 1,
            max_dilation_1d_pad: 0,
        }
    }

    /// VTX800 capability table.
    #[must_use]
    pub const fn vtx800() -> Self {
        Self {
            variant: DeviceVariant::Vtx800,
            groups: 4,
            lanes_per_group: 16,
            lanes_shared: 4,
            max_layers: 128,
            max_stream_layers: 8,
            max_channels: 1024,
            mask_width_small: 768,
            mask_width_large: 1280,
            instance_width: 2560,
            bias_size: 1024,
            tram_size: 4096,
            frame_size_max: 1 << 21,
            apb_base: 0x5100_0000,
            group_offs: 0x0040_0000,
            cnn_base: 0x0010_0000,
            mram_base: 0x0018_0000,
            bram_base: 0x0008_0000,
            tram_base: 0x001C_0000,
            sram_base: 0x0020_0000,
            fifo_base: 0x0000_2000,
            mram_lane_stride: 0x8000,
            tram_lane_stride: 8192,
            pad_cnt_offs: 29,
            cnt_diff_offs: 16,
            pad_ena_offs: 28,
            cnt_inc_offs: 12,
            mp_stride_offs: 8,
            write_ptr_shift: 14,
            max_cnt_bits: 11,
            max_ptr_bits: 18,
            max_isval_bits: 16,
            max_dsval1_bits: 5,
            max_dsval2_bits: 13,
            max_fbuf_bits: 18,
            max_ifrm_bits: 21,
            max_wptrinc_bits: 15,
            max_tptr_bits: 15,
            max_mcnt_bits: 17,
            start_layer: true,
            link_layer: true,
            read_ahead: true,
            pipeline: true,
            calcx4: true,
            binary_weights: true,
            depthwise: true,
            kernel_bypass: true,
            oneshot: true,
            pll: true,
            fifo_go: true,
            snoop: true,
            multipass_stride: true,
            eltwise_multipass: true,
            new_streaming: true,
            streaming_requires_3x3: true,
            nonpad_final_streaming_ok: true,
            require_reg_clear: true,
            max_dilation_1d_kernel: 3,
            max_dilation_1d: 32,
            max_dilation_1d_pad: 2,
        }
    }

    /// Look up the table for a variant.
    #[must_use]
    pub const fn for_variant(variant: DeviceVariant) -> Self {
        match variant {
            DeviceVariant::Vtx700 => Self::vtx700(),
            DeviceVariant::Vtx800 => Self::vtx800(),
        }
    }

    /// Total lanes across all groups.
    #[must_use]
    pub const fn max_lanes(&self) -> usize {
        self.groups * self.lanes_per_group
    }

    /// Data-memory capacity of one shared-lane bank, in bytes.
    #[must_use]
    pub const fn data_mem_bytes(&self) -> usize {
        self.instance_width * self.lanes_shared * 4
    }

    /// Physical data-memory instance (within a shared bank) holding a byte
    /// offset.
    #[must_use]
    pub const fn data_instance_from_offs(&self, byte_offs: usize) -> usize {
        byte_offs / (self.instance_width * 4)
    }

    /// Bitmask of shared data-memory banks touched by a processor map.
    /// One bit per bank, `groups * lanes_per_group / lanes_shared` bits.
    #[must_use]
    pub fn data_mem_map(&self, processor_map: u64) -> u16 {
        let mut banks = 0u16;
        for lane in 0..self.max_lanes() {
            if processor_map & (1 << lane) != 0 {
                banks |= 1 << (lane / self.lanes_shared);
            }
        }
        banks
    }

    /// Remap a logical kernel row index to its physical row in packed×4
    /// layout. Four consecutive logical indices interleave across the four
    /// quarter-banks of the region (small or large) holding the layer's
    /// allocation at `start` spanning `count` rows.
    #[must_use]
    pub fn calcx4_index(&self, idx: usize, start: usize, count: usize) -> usize {
        let quarter = count.div_ceil(4);
        let (mem, rem) = ((idx - start) / quarter, (idx - start) % quarter);
        if start < self.mask_width_small {
            mem * (self.mask_width_small / 4) + rem + start / 4
        } else {
            let rel_start = start - self.mask_width_small;
            self.mask_width_small
                + mem * ((self.mask_width_large - self.mask_width_small) / 4)
                + rem
                + rel_start / 4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_parse() {
        assert_eq!(DeviceVariant::from_name("vtx700"), Some(DeviceVariant::Vtx700));
        assert_eq!(DeviceVariant::from_name("VTX800"), Some(DeviceVariant::Vtx800));
        assert_eq!(DeviceVariant::from_name("vtx900"), None);
    }

    #[test]
    fn geometry_is_consistent() {
        for p in [DeviceProfile::vtx700(), DeviceProfile::vtx800()] {
            assert_eq!(p.max_lanes(), 64);
            assert_eq!(p.lanes_per_group % p.lanes_shared, 0);
            assert!(p.mask_width_small <= p.mask_width_large);
            // Quarter-bank interleave requires divisibility by 4
            assert_eq!(p.mask_width_small % 4, 0);
            assert_eq!((p.mask_width_large - p.mask_width_small) % 4, 0);
        }
    }

    #[test]
    fn data_mem_map_marks_shared_banks() {
        let p = DeviceProfile::vtx700();
        // Lanes 0..4 share bank 0; lane 4 is bank 1; lane 16 is bank 4
        assert_eq!(p.data_mem_map(0x0000_0000_0000_000f), 0b1);
        assert_eq!(p.data_mem_map(0x0000_0000_0000_0010), 0b10);
        assert_eq!(p.data_mem_map(0x0000_0000_0001_0001), 0b1_0001);
    }

    #[test]
    fn calcx4_interleaves_quarters() {
        let p = DeviceProfile::vtx800();
        // 8 rows starting at 0: quarter stride 2, quarter banks of 192 rows
        assert_eq!(p.calcx4_index(0, 0, 8), 0);
        assert_eq!(p.calcx4_index(1, 0, 8), 1);
        assert_eq!(p.calcx4_index(2, 0, 8), 192);
        assert_eq!(p.calcx4_index(4, 0, 8), 384);
        assert_eq!(p.calcx4_index(7, 0, 8), 577);
    }

    #[test]
    fn calcx4_large_region_offsets_past_split() {
        let p = DeviceProfile::vtx800();
        let idx = p.calcx4_index(768, 768, 4);
        assert_eq!(idx, 768);
        // Second logical row lands one quarter-bank (128 rows) further
        assert_eq!(p.calcx4_index(769, 768, 4), 768 + 128);
    }
}
