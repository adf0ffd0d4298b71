//! Memory and address compilation.
//!
//! Kernel (mask memory) and bias allocation in layer order, data-memory
//! capacity checks, the per-run overwrite tracker, and streaming-buffer
//! overlap detection. Allocation visits layers in ascending id order; a
//! layer's addresses depend on what earlier layers already claimed, so the
//! order is part of the contract.

use crate::diag::Diagnostics;
use crate::network::Network;
use crate::plan::Plan;
use std::collections::HashSet;
use tracing::debug;
use vortex_chip::DeviceProfile;

/// Tracks every 32-bit word written during one run. Re-writes are reported
/// as diagnostics, never silently dropped — this is a reporting aid, not a
/// correctness gate.
#[derive(Debug, Default)]
pub struct AddressSpaceTracker {
    words: HashSet<u32>,
}

impl AddressSpaceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a word address as written. Returns true if it was already
    /// written during this run.
    pub fn mark(&mut self, addr: u32) -> bool {
        !self.words.insert(addr >> 2)
    }

    /// Whether a word address has been written during this run.
    #[must_use]
    pub fn written(&self, addr: u32) -> bool {
        self.words.contains(&(addr >> 2))
    }
}

/// Data-memory interval claimed by one streaming layer's circular buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInterval {
    /// First byte offset, inclusive.
    pub start: usize,
    /// Last byte offset, inclusive.
    pub end: usize,
    /// Shared-bank bitmask from [`DeviceProfile::data_mem_map`].
    pub banks: u16,
}

impl StreamInterval {
    /// Closed-interval overlap on at least one shared physical bank.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.banks & other.banks != 0 && self.start <= other.end && other.start <= self.end
    }
}

/// Accumulated streaming buffer intervals, in layer-processing order.
/// New intervals are compared against every previously recorded one.
#[derive(Debug, Default)]
pub struct StreamIntervals {
    recorded: Vec<(usize, StreamInterval)>,
}

impl StreamIntervals {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a layer's interval, raising an advisory for every earlier
    /// interval it overlaps on a shared bank.
    pub fn record(&mut self, layer: usize, interval: StreamInterval, diags: &mut Diagnostics) {
        for (earlier, prior) in &self.recorded {
            if prior.overlaps(&interval) {
                diags.advisory(
                    layer,
                    format!(
                        "streaming buffer {:#06x}..={:#06x} overlaps layer {earlier}'s buffer {:#06x}..={:#06x} on a shared memory bank",
                        interval.start, interval.end, prior.start, prior.end
                    ),
                );
            }
        }
        self.recorded.push((layer, interval));
    }
}

/// Per-layer kernel memory allocation, in mask rows.
#[derive(Debug, Clone)]
pub struct KernelMap {
    /// First row per layer.
    pub offs: Vec<usize>,
    /// Rows claimed per layer.
    pub len: Vec<usize>,
    /// Kernel slots per participating lane per layer.
    pub count: Vec<usize>,
}

/// Allocate mask-memory rows for every layer, first-fit in layer order.
/// Each participating lane advances by the same row count; a layer starts
/// at the highest fill level among its lanes so all lanes share one offset.
#[must_use]
pub fn allocate_kernels(
    net: &Network,
    plan: &Plan,
    profile: &DeviceProfile,
    diags: &mut Diagnostics,
) -> KernelMap {
    let mut fill = vec![0usize; profile.max_lanes()];
    let mut offs = Vec::with_capacity(net.len());
    let mut len = Vec::with_capacity(net.len());
    let mut count = Vec::with_capacity(net.len());

    for (id, spec) in net.layers.iter().enumerate() {
        let lp = &plan.layers[id];
        if lp.kernels_per_lane == 0 {
            offs.push(0);
            len.push(0);
            count.push(0);
            continue;
        }

        let quant = usize::from(spec.quantization.bits());
        let rows = (lp.kernels_per_lane * quant).div_ceil(8);

        let lanes: Vec<usize> = (0..profile.max_lanes())
            .filter(|l| spec.processor_map & (1 << l) != 0)
            .collect();
        let mut start = lanes.iter().map(|&l| fill[l]).max().unwrap_or(0);
        if spec.calcx4 {
            // Packed×4 interleave needs a 4-row-aligned start
            start = (start + 3) & !3;
        }

        if start + rows > profile.mask_width_large {
            diags.error(
                id,
                format!(
                    "kernel memory needs rows {start}..{} but each lane has {}",
                    start + rows,
                    profile.mask_width_large
                ),
            );
        }
        for &l in &lanes {
            fill[l] = start + rows;
        }

        debug!(layer = id, start, rows, "allocated kernel rows");
        offs.push(start);
        len.push(rows);
        count.push(lp.kernels_per_lane);
    }

    KernelMap { offs, len, count }
}

/// One layer's bias placement: byte offset per participating group.
#[derive(Debug, Clone, Default)]
pub struct BiasAlloc {
    /// `(group, offset)` pairs; one entry in broadcast mode, one per group
    /// in local or depthwise mode.
    pub slots: Vec<(usize, usize)>,
    /// A single bank serves every group.
    pub broadcast: bool,
}

/// Per-layer bias allocations, indexed by layer id.
#[derive(Debug, Clone)]
pub struct BiasMap {
    /// Allocation per layer; `None` when the layer has no bias.
    pub layers: Vec<Option<BiasAlloc>>,
}

/// Allocate bias bank bytes for every biased layer.
///
/// Broadcast mode applies when all output groups expose an identical lane
/// slice, letting one group's bank serve the rest; otherwise each group
/// receives its own copy (local mode, a performance Notice). Depthwise
/// copies are 4-aligned so the broadcast fetch stays in step with the
/// shared-lane groups.
#[must_use]
pub fn allocate_bias(
    net: &Network,
    plan: &Plan,
    profile: &DeviceProfile,
    diags: &mut Diagnostics,
) -> BiasMap {
    let mut fill = vec![0usize; profile.groups];
    let mut layers = Vec::with_capacity(net.len());

    for (id, spec) in net.layers.iter().enumerate() {
        let Some(bias) = &spec.bias else {
            layers.push(None);
            continue;
        };
        let lp = &plan.layers[id];
        let groups = &lp.output_group_map;
        if groups.is_empty() {
            layers.push(None);
            continue;
        }

        let need = bias.len();
        let mut alloc = BiasAlloc::default();

        if spec.is_depthwise() {
            // Every group holds its own slice, 4-aligned
            for &g in groups {
                let start = (fill[g] + 3) & !3;
                check_bias_fit(id, g, start, need, profile, diags);
                alloc.slots.push((g, start));
                fill[g] = start + need;
            }
        } else if let Some(pinned) = spec.bias_group {
            if !groups.contains(&pinned) {
                diags.error(
                    id,
                    format!("bias group {pinned} carries no output lanes for this layer"),
                );
            }
            let start = fill[pinned];
            check_bias_fit(id, pinned, start, need, profile, diags);
            alloc.slots.push((pinned, start));
            alloc.broadcast = true;
            fill[pinned] = start + need;
        } else if uniform_group_slices(spec.output_processor_map, groups, profile) {
            // One bank serves all groups: pick the least-filled
            let g = *groups
                .iter()
                .min_by_key(|&&g| fill[g])
                .unwrap_or(&groups[0]);
            let start = fill[g];
            check_bias_fit(id, g, start, need, profile, diags);
            alloc.slots.push((g, start));
            alloc.broadcast = true;
            fill[g] = start + need;
        } else {
            diags.notice(
                id,
                "output lane slices differ across groups; bias falls back to local mode (one copy per group)",
            );
            for &g in groups {
                let start = fill[g];
                check_bias_fit(id, g, start, need, profile, diags);
                alloc.slots.push((g, start));
                fill[g] = start + need;
            }
        }

        layers.push(Some(alloc));
    }

    BiasMap { layers }
}

fn check_bias_fit(
    layer: usize,
    group: usize,
    start: usize,
    need: usize,
    profile: &DeviceProfile,
    diags: &mut Diagnostics,
) {
    if start + need > profile.bias_size {
        diags.error(
            layer,
            format!(
                "bias bank {group} needs bytes {start}..{} but holds {}",
                start + need,
                profile.bias_size
            ),
        );
    }
}

fn uniform_group_slices(map: u64, groups: &[usize], profile: &DeviceProfile) -> bool {
    let per_group = profile.lanes_per_group;
    let mask = (1u64 << per_group) - 1;
    let mut slices = groups
        .iter()
        .map(|&g| (map >> (g * per_group)) & mask);
    let Some(first) = slices.next() else {
        return true;
    };
    slices.all(|s| s == first)
}

/// Check both data-memory sizing formulas for every layer. Streaming input
/// is exempt from the full-frame check because only the active window rows
/// occupy memory at once.
pub fn check_data_capacity(
    net: &Network,
    plan: &Plan,
    profile: &DeviceProfile,
    diags: &mut Diagnostics,
) {
    let capacity = profile.data_mem_bytes();
    for (id, spec) in net.layers.iter().enumerate() {
        let lp = &plan.layers[id];

        if !spec.streaming {
            let per_pixel = if spec.channel_major { 1 } else { 4 };
            let in_size =
                lp.hw.input_dim[0] * lp.hw.input_dim[1] * lp.in_expand * spec.operands * per_pixel;
            if in_size + spec.in_offset > capacity {
                diags.error(
                    id,
                    format!(
                        "input needs {in_size} byte(s) at offset {:#x} but the bank holds {capacity}",
                        spec.in_offset
                    ),
                );
            }
        }

        let out_size = (lp.output_dim[0] * lp.output_dim[1] + lp.out_pad)
            * lp.out_expand
            * 4
            * usize::from(spec.output_width)
            / 8;
        if out_size + spec.out_offset > capacity {
            diags.error(
                id,
                format!(
                    "output needs {out_size} byte(s) at offset {:#x} but the bank holds {capacity}",
                    spec.out_offset
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LayerSpec, Weights};
    use crate::plan;

    fn layer() -> LayerSpec {
        let mut l = LayerSpec::conv2d(1, 4, [8, 8]);
        l.processor_map = 0x1;
        l.output_processor_map = 0xf;
        l.weights = Weights::new(vec![1; 4 * 9], 4, 1, 3, 3);
        l
    }

    fn planned(net: &Network) -> (Plan, Diagnostics) {
        let mut d = Diagnostics::new(false);
        let p = plan::plan(net, &DeviceProfile::vtx800(), &mut d);
        (p, d)
    }

    #[test]
    fn tracker_reports_rewrites_only() {
        let mut t = AddressSpaceTracker::new();
        assert!(!t.mark(0x5000_0000));
        assert!(t.mark(0x5000_0000));
        assert!(!t.mark(0x5000_0004));
        assert!(t.written(0x5000_0000));
    }

    #[test]
    fn stream_overlap_on_shared_bank_is_advisory() {
        let mut d = Diagnostics::new(true);
        let mut iv = StreamIntervals::new();
        iv.record(0, StreamInterval { start: 0x00, end: 0x10, banks: 0b1 }, &mut d);
        iv.record(1, StreamInterval { start: 0x08, end: 0x18, banks: 0b1 }, &mut d);
        assert_eq!(d.items().len(), 1);
    }

    #[test]
    fn disjoint_banks_do_not_overlap() {
        let mut d = Diagnostics::new(true);
        let mut iv = StreamIntervals::new();
        iv.record(0, StreamInterval { start: 0x00, end: 0x10, banks: 0b01 }, &mut d);
        iv.record(1, StreamInterval { start: 0x20, end: 0x30, banks: 0b10 }, &mut d);
        // Disjoint offsets and different banks
        assert!(d.items().is_empty());
        // Same offsets but a different bank is also clean
        iv.record(2, StreamInterval { start: 0x00, end: 0x10, banks: 0b100 }, &mut d);
        assert!(d.items().is_empty());
    }

    #[test]
    fn kernel_rows_accumulate_per_lane() {
        let mut l0 = layer();
        l0.next_sequence = Some(1);
        let mut l1 = LayerSpec::conv2d(4, 8, [6, 6]);
        l1.processor_map = 0xf;
        l1.output_processor_map = 0xff;
        l1.weights = Weights::new(vec![1; 8 * 4 * 9], 8, 4, 3, 3);
        let net = Network::new(vec![l0, l1]);
        let (p, mut d) = planned(&net);
        let km = allocate_kernels(&net, &p, &DeviceProfile::vtx800(), &mut d);
        // Layer 0: 4 kernels on lane 0. Layer 1 shares lane 0, so it starts
        // after layer 0's rows even though lanes 1..3 are empty.
        assert_eq!(km.offs[0], 0);
        assert_eq!(km.len[0], 4);
        assert_eq!(km.offs[1], 4);
        assert_eq!(km.len[1], 8);
        assert!(!d.has_fatal());
    }

    #[test]
    fn kernel_capacity_is_enforced() {
        let mut l = layer();
        // 1280 rows fit exactly; one more layer overflows
        l.out_channels = 1280;
        l.output_processor_map = u64::MAX;
        l.weights = Weights::new(vec![1; 1280 * 9], 1280, 1, 3, 3);
        let mut l2 = LayerSpec::conv2d(1, 4, [8, 8]);
        l2.processor_map = 0x1;
        l2.output_processor_map = 0xf;
        l2.weights = Weights::new(vec![1; 4 * 9], 4, 1, 3, 3);
        let net = Network::new(vec![l, l2]);
        let mut d = Diagnostics::new(true);
        let p = plan::plan(&net, &DeviceProfile::vtx800(), &mut d);
        let mut d2 = Diagnostics::new(false);
        let _ = allocate_kernels(&net, &p, &DeviceProfile::vtx800(), &mut d2);
        assert!(d2.items().iter().any(|x| x.message.contains("kernel memory")));
    }

    #[test]
    fn bias_broadcast_uses_one_bank() {
        let mut l = layer();
        l.bias = Some(vec![1, 2, 3, 4]);
        let net = Network::new(vec![l]);
        let (p, mut d) = planned(&net);
        let bm = allocate_bias(&net, &p, &DeviceProfile::vtx800(), &mut d);
        let alloc = bm.layers[0].as_ref().unwrap();
        assert!(alloc.broadcast);
        assert_eq!(alloc.slots, vec![(0, 0)]);
    }

    #[test]
    fn bias_local_mode_copies_per_group_with_notice() {
        let mut l = layer();
        l.out_channels = 20;
        // Groups 0 and 1 with different lane slices
        l.output_processor_map = 0xffff | (0xf << 16);
        l.bias = Some(vec![0; 20]);
        let net = Network::new(vec![l]);
        let (p, mut d) = planned(&net);
        let before = d.items().len();
        let bm = allocate_bias(&net, &p, &DeviceProfile::vtx800(), &mut d);
        let alloc = bm.layers[0].as_ref().unwrap();
        assert!(!alloc.broadcast);
        assert_eq!(alloc.slots.len(), 2);
        assert!(d.items()[before..].iter().any(|x| x.message.contains("local mode")));
    }

    #[test]
    fn data_capacity_threshold() {
        let p = DeviceProfile::vtx800();
        // 80x128 output exactly fills the 40960-byte bank at offset 0
        let mut l = layer();
        l.input_dim = [82, 130];
        l.channel_major = true; // planar input stays within the bank
        let net = Network::new(vec![l]);
        let (pl, mut d) = planned(&net);
        check_data_capacity(&net, &pl, &p, &mut d);
        assert!(!d.has_fatal());

        // Any nonzero offset pushes it over
        let mut l2 = layer();
        l2.input_dim = [82, 130];
        l2.channel_major = true;
        l2.out_offset = 4;
        let net2 = Network::new(vec![l2]);
        let (pl2, mut d2) = planned(&net2);
        check_data_capacity(&net2, &pl2, &p, &mut d2);
        assert!(d2.has_fatal());
    }
}
