//! Reference inference, used to derive expected-output verify data.
//!
//! The simulator is a seam: generation only needs *some* per-layer pure
//! function producing the values the accelerator is expected to write
//! back. [`FixedPointSimulator`] mirrors the device arithmetic closely
//! enough for verify tables — integer accumulation, bias add, output
//! shift, activation, clamp to the output width. Callers with their own
//! golden model implement [`LayerSimulator`] instead.

use crate::error::{CodegenError, Result};
use crate::network::{Activation, EltwiseOp, LayerSpec, Operator};

/// Channel-major integer tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    /// Number of channels.
    pub channels: usize,
    /// Rows per channel.
    pub rows: usize,
    /// Columns per row.
    pub cols: usize,
    /// `channels * rows * cols` values, channel-major.
    pub data: Vec<i32>,
}

impl Tensor {
    /// Zero-filled tensor.
    #[must_use]
    pub fn zeros(channels: usize, rows: usize, cols: usize) -> Self {
        Self {
            channels,
            rows,
            cols,
            data: vec![0; channels * rows * cols],
        }
    }

    /// Build from existing data; `None` when the element count is wrong.
    #[must_use]
    pub fn new(channels: usize, rows: usize, cols: usize, data: Vec<i32>) -> Option<Self> {
        (data.len() == channels * rows * cols).then_some(Self {
            channels,
            rows,
            cols,
            data,
        })
    }

    /// Value at `(channel, row, col)`.
    #[must_use]
    pub fn get(&self, c: usize, r: usize, col: usize) -> i32 {
        self.data[(c * self.rows + r) * self.cols + col]
    }

    /// Set the value at `(channel, row, col)`.
    pub fn set(&mut self, c: usize, r: usize, col: usize, v: i32) {
        self.data[(c * self.rows + r) * self.cols + col] = v;
    }

    /// Value at `(channel, row, col)`, zero outside the tensor. Padding
    /// reads use this.
    #[must_use]
    pub fn get_padded(&self, c: usize, r: isize, col: isize) -> i32 {
        if r < 0 || col < 0 {
            return 0;
        }
        #[allow(clippy::cast_sign_loss)]
        let (r, col) = (r as usize, col as usize);
        if r >= self.rows || col >= self.cols {
            0
        } else {
            self.get(c, r, col)
        }
    }
}

/// Per-layer golden model.
pub trait LayerSimulator {
    /// Compute one layer's output from its input.
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Simulator`] when the layer cannot be
    /// simulated (shape mismatch, missing weights).
    fn layer_output(&self, id: usize, spec: &LayerSpec, input: &Tensor) -> Result<Tensor>;
}

/// Integer reference model of the accelerator datapath.
///
/// Order of operations per layer: element-wise combine and pooling (in
/// the order selected by `pool_first`), the operator itself, bias add,
/// output shift (implicit quantization shift plus the explicit per-layer
/// shift), activation, clamp. 32-bit wide output skips the shift and
/// clamp stages, matching the device's raw-accumulator write-back.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedPointSimulator;

impl LayerSimulator for FixedPointSimulator {
    fn layer_output(&self, id: usize, spec: &LayerSpec, input: &Tensor) -> Result<Tensor> {
        if input.channels != spec.in_channels * spec.operands {
            return Err(CodegenError::simulator(
                id,
                format!(
                    "input has {} channel(s), layer expects {}",
                    input.channels,
                    spec.in_channels * spec.operands
                ),
            ));
        }

        let mut t = input.clone();
        if spec.pool_first {
            t = pool(&t, spec);
            t = eltwise(&t, spec);
        } else {
            t = eltwise(&t, spec);
            t = pool(&t, spec);
        }

        let mut out = match spec.operator {
            Operator::None => t,
            Operator::Conv2d | Operator::Conv1d => conv(id, spec, &t)?,
            Operator::ConvTranspose2d => conv(id, spec, &upsample(&t, spec))?,
            Operator::Linear => linear(id, spec, &t)?,
        };

        let shift = i32::from(spec.output_shift) + (8 - i32::from(spec.quantization.bits()));
        for v in &mut out.data {
            let mut x = *v;
            if spec.operator != Operator::None {
                // Requantize the 8-bit-product accumulator
                x >>= 7;
                if spec.output_width != 32 {
                    x = apply_shift(x, shift);
                }
            }
            x = match spec.activation {
                Activation::None => x,
                Activation::Relu => x.max(0),
                Activation::Abs => x.abs(),
            };
            if spec.output_width != 32 {
                x = x.clamp(-128, 127);
            }
            *v = x;
        }

        if spec.flatten {
            out = Tensor {
                channels: out.channels * out.rows * out.cols,
                rows: 1,
                cols: 1,
                data: out.data,
            };
        }
        Ok(out)
    }
}

fn apply_shift(x: i32, shift: i32) -> i32 {
    if shift >= 0 {
        x << shift.min(15)
    } else {
        x >> (-shift).min(15)
    }
}

fn eltwise(t: &Tensor, spec: &LayerSpec) -> Tensor {
    let Some(op) = spec.eltwise else {
        return t.clone();
    };
    let ch = t.channels / spec.operands;
    let plane = t.rows * t.cols;
    let mut out = Tensor::zeros(ch, t.rows, t.cols);
    for c in 0..ch {
        for i in 0..plane {
            let mut acc = t.data[c * plane + i];
            for operand in 1..spec.operands {
                let v = t.data[(operand * ch + c) * plane + i];
                acc = match op {
                    EltwiseOp::Add => acc + v,
                    EltwiseOp::Sub => acc - v,
                    EltwiseOp::Xor => acc ^ v,
                    EltwiseOp::Or => acc | v,
                };
            }
            out.data[c * plane + i] = acc;
        }
    }
    out
}

fn pool(t: &Tensor, spec: &LayerSpec) -> Tensor {
    if !spec.has_pooling() {
        return t.clone();
    }
    let [pr, pc] = spec.pool;
    let [sr, sc] = spec.pool_stride;
    let [dr, dc] = spec.pool_dilation;
    let span_r = (pr - 1) * dr + 1;
    let span_c = (pc - 1) * dc + 1;
    let rows = (t.rows - span_r) / sr + 1;
    let cols = (t.cols - span_c) / sc + 1;
    let mut out = Tensor::zeros(t.channels, rows, cols);
    for c in 0..t.channels {
        for r in 0..rows {
            for col in 0..cols {
                let mut acc = if spec.pool_max { i32::MIN } else { 0 };
                for wr in 0..pr {
                    for wc in 0..pc {
                        let v = t.get(c, r * sr + wr * dr, col * sc + wc * dc);
                        acc = if spec.pool_max { acc.max(v) } else { acc + v };
                    }
                }
                if !spec.pool_max {
                    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                    let count = (pr * pc) as i32;
                    acc = acc.div_euclid(count);
                }
                out.set(c, r, col, acc);
            }
        }
    }
    out
}

/// Zero-insertion upsampling for fractionally strided convolution.
fn upsample(t: &Tensor, spec: &LayerSpec) -> Tensor {
    let s = spec.stride[0].max(1);
    let rows = (t.rows - 1) * s + 1 + spec.output_padding;
    let cols = (t.cols - 1) * s + 1 + spec.output_padding;
    let mut out = Tensor::zeros(t.channels, rows, cols);
    for c in 0..t.channels {
        for r in 0..t.rows {
            for col in 0..t.cols {
                out.set(c, r * s, col * s, t.get(c, r, col));
            }
        }
    }
    out
}

#[allow(clippy::cast_possible_wrap)]
fn conv(id: usize, spec: &LayerSpec, t: &Tensor) -> Result<Tensor> {
    let weights = weights_for(id, spec)?;
    let [kr, kc] = spec.kernel_size;
    let [dr, dc] = spec.dilation;
    let (stride, pad) = if spec.operator == Operator::ConvTranspose2d {
        // Upsampling already applied; pad with the flipped amount
        (
            [1, 1],
            [
                dr * (kr - 1) - spec.padding[0],
                dc * (kc - 1) - spec.padding[1],
            ],
        )
    } else {
        (spec.stride, spec.padding)
    };
    let span_r = (kr - 1) * dr + 1;
    let span_c = (kc - 1) * dc + 1;
    let rows = (t.rows + 2 * pad[0] - span_r) / stride[0] + 1;
    let cols = (t.cols + 2 * pad[1] - span_c) / stride[1] + 1;
    let group_in = spec.in_channels / spec.conv_groups;
    let group_out = spec.out_channels / spec.conv_groups;

    let mut out = Tensor::zeros(spec.out_channels, rows, cols);
    for oc in 0..spec.out_channels {
        let g = oc / group_out;
        let bias = bias_for(spec, oc);
        for r in 0..rows {
            for col in 0..cols {
                let mut acc = bias;
                for ic in 0..group_in {
                    let taps = weights.kernel(oc, ic);
                    for wr in 0..kr {
                        for wc in 0..kc {
                            let ir = (r * stride[0] + wr * dr) as isize - pad[0] as isize;
                            let icol = (col * stride[1] + wc * dc) as isize - pad[1] as isize;
                            let x = t.get_padded(g * group_in + ic, ir, icol);
                            acc += i32::from(taps[wr * kc + wc]) * x;
                        }
                    }
                }
                out.set(oc, r, col, acc);
            }
        }
    }
    Ok(out)
}

fn linear(id: usize, spec: &LayerSpec, t: &Tensor) -> Result<Tensor> {
    let weights = weights_for(id, spec)?;
    if t.data.len() != spec.in_channels {
        return Err(CodegenError::simulator(
            id,
            format!(
                "linear layer expects {} input element(s), tensor has {}",
                spec.in_channels,
                t.data.len()
            ),
        ));
    }
    let mut out = Tensor::zeros(spec.out_channels, 1, 1);
    for oc in 0..spec.out_channels {
        let mut acc = bias_for(spec, oc);
        for (ic, x) in t.data.iter().enumerate() {
            acc += i32::from(weights.kernel(oc, ic)[0]) * x;
        }
        out.data[oc] = acc;
    }
    Ok(out)
}

fn weights_for<'a>(id: usize, spec: &'a LayerSpec) -> Result<&'a crate::network::Weights> {
    spec.weights
        .as_ref()
        .ok_or_else(|| CodegenError::simulator(id, "layer has no weights"))
}

/// Bias enters the accumulator pre-scaled to the product magnitude.
fn bias_for(spec: &LayerSpec, oc: usize) -> i32 {
    spec.bias
        .as_ref()
        .and_then(|b| b.get(oc))
        .map_or(0, |&b| i32::from(b) << 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{LayerSpec, Quantization, Weights};

    fn identity_layer() -> LayerSpec {
        // 3x3 kernel with a single center tap of 64: with the implicit
        // shift it halves the input
        let mut taps = vec![0i8; 9];
        taps[4] = 64;
        let mut l = LayerSpec::conv2d(1, 1, [4, 4]);
        l.padding = [1, 1];
        l.weights = Weights::new(taps, 1, 1, 3, 3);
        l
    }

    #[test]
    fn center_tap_conv_scales_input() {
        let l = identity_layer();
        let input = Tensor::new(1, 4, 4, (0..16).map(|v| v * 8).collect()).unwrap();
        let out = FixedPointSimulator.layer_output(0, &l, &input).unwrap();
        assert_eq!(out.rows, 4);
        // 64 * x >> 7 = x / 2
        assert_eq!(out.get(0, 1, 1), 8 * 5 / 2);
    }

    #[test]
    fn relu_clamps_negative_output() {
        let mut l = identity_layer();
        l.activation = Activation::Relu;
        let input = Tensor::new(1, 4, 4, vec![-100; 16]).unwrap();
        let out = FixedPointSimulator.layer_output(0, &l, &input).unwrap();
        assert!(out.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn max_pool_before_conv() {
        let mut l = identity_layer();
        l.pool = [2, 2];
        l.pool_stride = [2, 2];
        l.pool_max = true;
        let input = Tensor::new(1, 4, 4, (0..16).collect()).unwrap();
        let out = FixedPointSimulator.layer_output(0, &l, &input).unwrap();
        assert_eq!(out.rows, 2);
        // Pool picks 5, 7, 13, 15; center tap halves them
        assert_eq!(out.get(0, 0, 0), 2);
        assert_eq!(out.get(0, 1, 1), 7);
    }

    #[test]
    fn output_shift_scales_up() {
        let mut l = identity_layer();
        l.output_shift = 1;
        let input = Tensor::new(1, 4, 4, vec![10; 16]).unwrap();
        let out = FixedPointSimulator.layer_output(0, &l, &input).unwrap();
        assert_eq!(out.get(0, 1, 1), 10); // halved then doubled
    }

    #[test]
    fn four_bit_weights_shift_implicitly() {
        let mut taps = vec![0i8; 9];
        taps[4] = 4; // 4-bit weight, value 4
        let mut l = identity_layer();
        l.weights = Weights::new(taps, 1, 1, 3, 3);
        l.quantization = Quantization::Bits(4);
        let input = Tensor::new(1, 4, 4, vec![64; 16]).unwrap();
        let out = FixedPointSimulator.layer_output(0, &l, &input).unwrap();
        // 4 * 64 >> 7 = 2, then the implicit shift of 8-4 scales it to 32
        assert_eq!(out.get(0, 2, 2), 32);
    }

    #[test]
    fn bias_is_prescaled() {
        let mut l = identity_layer();
        l.bias = Some(vec![3]);
        let input = Tensor::new(1, 4, 4, vec![0; 16]).unwrap();
        let out = FixedPointSimulator.layer_output(0, &l, &input).unwrap();
        assert!(out.data.iter().all(|&v| v == 3));
    }

    #[test]
    fn eltwise_add_combines_operand_slices() {
        let mut l = LayerSpec::conv2d(1, 1, [2, 2]);
        l.operator = Operator::None;
        l.operands = 2;
        l.eltwise = Some(EltwiseOp::Add);
        let input = Tensor::new(2, 2, 2, vec![1, 2, 3, 4, 10, 20, 30, 40]).unwrap();
        let out = FixedPointSimulator.layer_output(0, &l, &input).unwrap();
        assert_eq!(out.data, vec![11, 22, 33, 44]);
    }

    #[test]
    fn channel_mismatch_is_a_simulator_error() {
        let l = identity_layer();
        let input = Tensor::zeros(2, 4, 4);
        let err = FixedPointSimulator.layer_output(5, &l, &input).unwrap_err();
        assert!(matches!(err, CodegenError::Simulator { layer: 5, .. }));
    }
}
