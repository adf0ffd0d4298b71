//! Network description.
//!
//! A network is an ordered array of per-layer records; the layer id is the
//! array index. Cross-layer references (`next_sequence`, `in_sequences`)
//! are layer ids. The record holds the user-specified values only — the
//! planner keeps hardware-native substitutes in its own shadow copy so the
//! original configuration stays available for diagnostics.

/// Layer operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Passthrough (pooling/element-wise only).
    None,
    /// 1-D convolution.
    Conv1d,
    /// 2-D convolution.
    Conv2d,
    /// 2-D transposed convolution (upsampling).
    ConvTranspose2d,
    /// Fully connected.
    Linear,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "Passthrough"),
            Self::Conv1d => write!(f, "Conv1d"),
            Self::Conv2d => write!(f, "Conv2d"),
            Self::ConvTranspose2d => write!(f, "ConvTranspose2d"),
            Self::Linear => write!(f, "Linear"),
        }
    }
}

/// Post-convolution activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// No activation.
    None,
    /// Rectified linear unit.
    Relu,
    /// Absolute value.
    Abs,
}

/// Element-wise combination of multiple operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EltwiseOp {
    /// Element-wise addition.
    Add,
    /// Element-wise subtraction.
    Sub,
    /// Element-wise exclusive or.
    Xor,
    /// Element-wise or.
    Or,
}

impl EltwiseOp {
    /// Hardware function selector.
    #[must_use]
    pub const fn selector(self) -> u32 {
        match self {
            Self::Add => 0,
            Self::Sub => 1,
            Self::Xor => 2,
            Self::Or => 3,
        }
    }
}

/// Weight quantization width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantization {
    /// Signed weights with the given bit count (1, 2, 4 or 8).
    Bits(u8),
    /// Binary ±1 weights.
    Binary,
}

impl Quantization {
    /// Storage bits per weight.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits(b) => b,
            Self::Binary => 1,
        }
    }
}

/// Quantized weight tensor for one layer, laid out
/// `[out_channel][in_channel][row][col]`.
#[derive(Debug, Clone)]
pub struct Weights {
    /// Flattened weight values.
    pub data: Vec<i8>,
    /// Output channels.
    pub out_channels: usize,
    /// Input channels (per convolution group).
    pub in_channels: usize,
    /// Kernel rows.
    pub rows: usize,
    /// Kernel columns.
    pub cols: usize,
}

impl Weights {
    /// Create a weight tensor, checking the element count.
    #[must_use]
    pub fn new(data: Vec<i8>, out_channels: usize, in_channels: usize, rows: usize, cols: usize) -> Option<Self> {
        if data.len() != out_channels * in_channels * rows * cols {
            return None;
        }
        Some(Self {
            data,
            out_channels,
            in_channels,
            rows,
            cols,
        })
    }

    /// One kernel as a slice, `rows * cols` values.
    #[must_use]
    pub fn kernel(&self, out_ch: usize, in_ch: usize) -> &[i8] {
        let k = self.rows * self.cols;
        let base = (out_ch * self.in_channels + in_ch) * k;
        &self.data[base..base + k]
    }
}

/// One layer of the network, fully user-specified.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    /// Operator kind.
    pub operator: Operator,
    /// Input channels.
    pub in_channels: usize,
    /// Output channels.
    pub out_channels: usize,
    /// Input rows × columns (columns = 1 for 1-D data).
    pub input_dim: [usize; 2],
    /// Kernel rows × columns.
    pub kernel_size: [usize; 2],
    /// Convolution stride.
    pub stride: [usize; 2],
    /// Convolution padding.
    pub padding: [usize; 2],
    /// Convolution dilation.
    pub dilation: [usize; 2],
    /// Extra output rows appended by transposed convolution.
    pub output_padding: usize,
    /// Pooling window (1×1 = no pooling).
    pub pool: [usize; 2],
    /// Pooling stride.
    pub pool_stride: [usize; 2],
    /// Pooling dilation.
    pub pool_dilation: [usize; 2],
    /// Max pooling (false = average).
    pub pool_max: bool,
    /// Activation function.
    pub activation: Activation,
    /// Weight quantization.
    pub quantization: Quantization,
    /// Output shift, applied after the implicit quantization shift.
    pub output_shift: i8,
    /// Output data width in bits (8 or 32).
    pub output_width: u8,
    /// Input processor map: one bit per lane across all groups.
    pub processor_map: u64,
    /// Output processor map.
    pub output_processor_map: u64,
    /// Input byte offset within the data-memory bank.
    pub in_offset: usize,
    /// Output byte offset within the data-memory bank.
    pub out_offset: usize,
    /// Extra words skipped between written output pixels.
    pub write_gap: usize,
    /// Successor layer id; `None` terminates the chain.
    pub next_sequence: Option<usize>,
    /// Predecessor layer ids; empty means the previous layer in id order.
    pub in_sequences: Vec<usize>,
    /// Operand count; greater than 1 selects element-wise combination.
    pub operands: usize,
    /// Element-wise function when `operands > 1`.
    pub eltwise: Option<EltwiseOp>,
    /// Pool operands before combining them.
    pub pool_first: bool,
    /// Flatten the input to 1-D before a linear operator.
    pub flatten: bool,
    /// Kernel bypass: feed data through without weights.
    pub bypass: bool,
    /// Stream input rows from the FIFO front end.
    pub streaming: bool,
    /// Channel-major (planar) input format.
    pub channel_major: bool,
    /// Streaming read-ahead.
    pub read_ahead: bool,
    /// Packed×4 kernel layout.
    pub calcx4: bool,
    /// Convolution groups; equal to the channel count for depthwise.
    pub conv_groups: usize,
    /// Pinned bias bank group, if any.
    pub bias_group: Option<usize>,
    /// Quantized weights, absent for bypass/passthrough layers.
    pub weights: Option<Weights>,
    /// Per-output-channel bias values.
    pub bias: Option<Vec<i8>>,
}

impl LayerSpec {
    /// A plain 2-D convolution layer with unit stride and no extras.
    /// Intended as a starting point; adjust fields as needed.
    #[must_use]
    pub fn conv2d(in_channels: usize, out_channels: usize, input_dim: [usize; 2]) -> Self {
        Self {
            operator: Operator::Conv2d,
            in_channels,
            out_channels,
            input_dim,
            kernel_size: [3, 3],
            stride: [1, 1],
            padding: [0, 0],
            dilation: [1, 1],
            output_padding: 0,
            pool: [1, 1],
            pool_stride: [1, 1],
            pool_dilation: [1, 1],
            pool_max: false,
            activation: Activation::None,
            quantization: Quantization::Bits(8),
            output_shift: 0,
            output_width: 8,
            processor_map: 0,
            output_processor_map: 0,
            in_offset: 0,
            out_offset: 0,
            write_gap: 0,
            next_sequence: None,
            in_sequences: Vec::new(),
            operands: 1,
            eltwise: None,
            pool_first: false,
            flatten: false,
            bypass: false,
            streaming: false,
            channel_major: false,
            read_ahead: false,
            calcx4: false,
            conv_groups: 1,
            bias_group: None,
            weights: None,
            bias: None,
        }
    }

    /// Whether this layer runs a depthwise/grouped convolution.
    #[must_use]
    pub const fn is_depthwise(&self) -> bool {
        self.conv_groups > 1
    }

    /// Whether pooling is active.
    #[must_use]
    pub const fn has_pooling(&self) -> bool {
        self.pool[0] > 1 || self.pool[1] > 1
    }
}

/// Ordered layer array; the index is the layer id.
#[derive(Debug, Clone, Default)]
pub struct Network {
    /// Layers in id order.
    pub layers: Vec<LayerSpec>,
}

impl Network {
    /// Create a network from a layer array.
    #[must_use]
    pub fn new(layers: Vec<LayerSpec>) -> Self {
        Self { layers }
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the network has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// The layer ids feeding layer `id`: its `in_sequences` if set, else
    /// the previous layer in id order (none for layer 0).
    #[must_use]
    pub fn predecessors(&self, id: usize) -> Vec<usize> {
        let layer = &self.layers[id];
        if layer.in_sequences.is_empty() {
            if id == 0 {
                Vec::new()
            } else {
                vec![id - 1]
            }
        } else {
            layer.in_sequences.clone()
        }
    }

    /// Union of all lanes used by any layer (input or output side).
    #[must_use]
    pub fn lanes_used(&self) -> u64 {
        self.layers
            .iter()
            .fold(0, |acc, l| acc | l.processor_map | l.output_processor_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_shape_is_checked() {
        assert!(Weights::new(vec![0; 9], 1, 1, 3, 3).is_some());
        assert!(Weights::new(vec![0; 8], 1, 1, 3, 3).is_none());
    }

    #[test]
    fn kernel_slicing() {
        let data: Vec<i8> = (0..18).collect();
        let w = Weights::new(data, 2, 1, 3, 3).unwrap();
        assert_eq!(w.kernel(0, 0)[0], 0);
        assert_eq!(w.kernel(1, 0)[0], 9);
    }

    #[test]
    fn default_predecessor_is_previous_layer() {
        let mut net = Network::new(vec![
            LayerSpec::conv2d(1, 4, [8, 8]),
            LayerSpec::conv2d(4, 8, [6, 6]),
        ]);
        assert_eq!(net.predecessors(0), Vec::<usize>::new());
        assert_eq!(net.predecessors(1), vec![0]);

        net.layers[1].in_sequences = vec![0];
        assert_eq!(net.predecessors(1), vec![0]);
    }
}
