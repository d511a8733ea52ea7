//! Convolution and max-pool layers.
//!
//! A layer knows the shape of the tensor it consumes and owns the tensor it
//! produces. The model hands each layer its predecessor's output at forward
//! time, so no layer ever holds a reference into another one.

use ndarray::{Array4, Axis};
use crate::common::{Activation, FigError, Result, Tensor};

/// Layer tag as stored at the start of every model-file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Convolution,
    MaxPool,
}

impl LayerKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(LayerKind::Convolution),
            1 => Some(LayerKind::MaxPool),
            _ => None,
        }
    }

    pub fn tag(&self) -> u32 {
        match self {
            LayerKind::Convolution => 0,
            LayerKind::MaxPool => 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl Padding {
    pub fn new(top: u32, left: u32, bottom: u32, right: u32) -> Self {
        Self { top, left, bottom, right }
    }

    pub fn uniform(p: u32) -> Self {
        Self::new(p, p, p, p)
    }
}

/// Kernel size, stride and padding shared by both layer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub kernel_w: u32,
    pub kernel_h: u32,
    pub stride_x: u32,
    pub stride_y: u32,
    pub padding: Padding,
}

impl Window {
    pub fn new(kernel_w: u32, kernel_h: u32, stride_x: u32, stride_y: u32, padding: Padding) -> Self {
        Self { kernel_w, kernel_h, stride_x, stride_y, padding }
    }

    /// Square kernel, equal strides, uniform padding.
    pub fn square(kernel: u32, stride: u32, padding: u32) -> Self {
        Self::new(kernel, kernel, stride, stride, Padding::uniform(padding))
    }

    /// Zero stride on an axis means "step by the kernel size".
    pub fn with_default_stride(mut self) -> Self {
        if self.stride_x == 0 {
            self.stride_x = self.kernel_w;
        }
        if self.stride_y == 0 {
            self.stride_y = self.kernel_h;
        }
        self
    }

    /// Output `(width, height)` for an input of `in_w x in_h`.
    pub fn output_size(&self, in_w: u32, in_h: u32) -> Result<(u32, u32)> {
        let w = output_size(in_w, self.kernel_w, self.padding.left, self.padding.right, self.stride_x);
        let h = output_size(in_h, self.kernel_h, self.padding.top, self.padding.bottom, self.stride_y);
        match (w, h) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(FigError::format(format!(
                "window {:?} does not fit a {}x{} input",
                self, in_w, in_h
            ))),
        }
    }

    /// Input coordinate hit by `out * stride + k - pad_before`, if it lies in `[0, dim)`.
    #[inline(always)]
    fn source(out: usize, stride: u32, k: u32, pad_before: u32, dim: usize) -> Option<usize> {
        let src = (out as i64) * stride as i64 + k as i64 - pad_before as i64;
        if src < 0 || src >= dim as i64 {
            None
        } else {
            Some(src as usize)
        }
    }
}

/// `(in - kernel + pad_before + pad_after) / stride + 1`, or `None` when the
/// stride or kernel is zero or the window does not fit in the padded input.
pub fn output_size(in_size: u32, kernel: u32, pad_before: u32, pad_after: u32, stride: u32) -> Option<u32> {
    if stride == 0 || kernel == 0 {
        return None;
    }
    let span = in_size as i64 - kernel as i64 + pad_before as i64 + pad_after as i64;
    if span < 0 {
        return None;
    }
    u32::try_from(span / stride as i64 + 1).ok()
}

/// Running statistics and affine parameters folded into a convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNorm {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
    pub running_mean: Vec<f32>,
    pub running_var: Vec<f32>,
}

impl BatchNorm {
    pub const EPSILON: f32 = 1e-5;

    pub fn new(gamma: Vec<f32>, beta: Vec<f32>, running_mean: Vec<f32>, running_var: Vec<f32>) -> Self {
        Self { gamma, beta, running_mean, running_var }
    }

    fn check_len(&self, channels: usize) -> Result<()> {
        let lens = [
            ("gamma", self.gamma.len()),
            ("beta", self.beta.len()),
            ("running_mean", self.running_mean.len()),
            ("running_var", self.running_var.len()),
        ];
        for (name, len) in lens {
            if len != channels {
                return Err(FigError::format(format!(
                    "batchnorm {} has {} values, layer has {} output channels",
                    name, len, channels
                )));
            }
        }
        Ok(())
    }

    #[inline(always)]
    fn apply(&self, c: usize, v: f32) -> f32 {
        let v = (v - self.running_mean[c]) / (self.running_var[c] + Self::EPSILON).sqrt();
        v * self.gamma[c] + self.beta[c]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conv {
    in_channels: u32,
    out_channels: u32,
    window: Window,
    /// `[out_c, kernel_h, kernel_w, in_c]`
    weight: Array4<f32>,
    bias: Vec<f32>,
}

impl Conv {
    /// `weight` is the flat `out_c * kernel_h * kernel_w * in_c` array, `bias` has `out_c` values.
    pub fn new(in_channels: u32, out_channels: u32, window: Window, weight: Vec<f32>, bias: Vec<f32>) -> Result<Self> {
        let expected = Self::weight_len(in_channels, out_channels, &window)
            .ok_or_else(|| FigError::format("convolution weight size overflows"))?;
        if weight.len() != expected {
            return Err(FigError::format(format!(
                "convolution declares {} weights, {}x{}x{}x{} kernel needs {}",
                weight.len(), out_channels, window.kernel_h, window.kernel_w, in_channels, expected
            )));
        }
        if bias.len() != out_channels as usize {
            return Err(FigError::format(format!(
                "convolution declares {} biases for {} output channels",
                bias.len(), out_channels
            )));
        }

        let weight = Array4::from_shape_vec(
            (
                out_channels as usize,
                window.kernel_h as usize,
                window.kernel_w as usize,
                in_channels as usize,
            ),
            weight,
        )
        .map_err(|e| FigError::format(e.to_string()))?;

        Ok(Self { in_channels, out_channels, window, weight, bias })
    }

    pub fn weight_len(in_channels: u32, out_channels: u32, window: &Window) -> Option<usize> {
        (out_channels as usize)
            .checked_mul(window.kernel_h as usize)?
            .checked_mul(window.kernel_w as usize)?
            .checked_mul(in_channels as usize)
    }

    pub fn in_channels(&self) -> u32 {
        self.in_channels
    }

    pub fn out_channels(&self) -> u32 {
        self.out_channels
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn weight(&self) -> &Array4<f32> {
        &self.weight
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    fn forward(&self, input: &Tensor, output: &mut Tensor, batch_norm: Option<&BatchNorm>, activation: Activation) {
        let w = &self.window;
        let src = input.view();
        let (in_h, in_w, in_c) = src.dim();
        let mut dst = output.view_mut();
        let (out_h, out_w, out_c) = dst.dim();

        for oc in 0..out_c {
            let kernel = self.weight.index_axis(Axis(0), oc);
            for y in 0..out_h {
                for x in 0..out_w {
                    let mut accum = 0.0f32;
                    for ky in 0..w.kernel_h {
                        let Some(src_y) = Window::source(y, w.stride_y, ky, w.padding.top, in_h) else {
                            continue;
                        };
                        for kx in 0..w.kernel_w {
                            let Some(src_x) = Window::source(x, w.stride_x, kx, w.padding.left, in_w) else {
                                continue;
                            };
                            for ic in 0..in_c {
                                accum += kernel[[ky as usize, kx as usize, ic]] * src[[src_y, src_x, ic]];
                            }
                        }
                    }

                    let mut v = accum + self.bias[oc];
                    if let Some(bn) = batch_norm {
                        v = bn.apply(oc, v);
                    }
                    dst[[y, x, oc]] = activation.apply(v);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaxPool {
    window: Window,
}

impl MaxPool {
    pub fn new(window: Window) -> Self {
        Self { window: window.with_default_stride() }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn forward(&self, input: &Tensor, output: &mut Tensor) {
        let w = &self.window;
        let src = input.view();
        let (in_h, in_w, _) = src.dim();
        let mut dst = output.view_mut();
        let (out_h, out_w, channels) = dst.dim();

        for c in 0..channels {
            for y in 0..out_h {
                for x in 0..out_w {
                    let mut max = f32::NEG_INFINITY;
                    for ky in 0..w.kernel_h {
                        let Some(src_y) = Window::source(y, w.stride_y, ky, w.padding.top, in_h) else {
                            continue;
                        };
                        for kx in 0..w.kernel_w {
                            let Some(src_x) = Window::source(x, w.stride_x, kx, w.padding.left, in_w) else {
                                continue;
                            };
                            let v = src[[src_y, src_x, c]];
                            if v > max {
                                max = v;
                            }
                        }
                    }
                    dst[[y, x, c]] = max;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerOp {
    Conv(Conv),
    MaxPool(MaxPool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    activation: Activation,
    batch_norm: Option<BatchNorm>,
    op: LayerOp,
    input_shape: (u32, u32, u32),
    output: Tensor,
}

impl Layer {
    /// Builds a convolution consuming tensors of `input_shape` (`width, height, channels`).
    pub fn conv(input_shape: (u32, u32, u32), activation: Activation, conv: Conv,
                batch_norm: Option<BatchNorm>) -> Result<Self> {
        let (in_w, in_h, in_c) = input_shape;
        if conv.in_channels != in_c {
            return Err(FigError::format(format!(
                "convolution expects {} input channels, previous tensor has {}",
                conv.in_channels, in_c
            )));
        }
        if let Some(bn) = &batch_norm {
            bn.check_len(conv.out_channels as usize)?;
        }

        let (out_w, out_h) = conv.window.output_size(in_w, in_h)?;
        let output = Tensor::new(out_w, out_h, conv.out_channels)?;

        Ok(Self {
            activation,
            batch_norm,
            op: LayerOp::Conv(conv),
            input_shape,
            output,
        })
    }

    pub fn max_pool(input_shape: (u32, u32, u32), pool: MaxPool) -> Result<Self> {
        let (in_w, in_h, in_c) = input_shape;
        let (out_w, out_h) = pool.window.output_size(in_w, in_h)?;
        let output = Tensor::new(out_w, out_h, in_c)?;

        Ok(Self {
            activation: Activation::None,
            batch_norm: None,
            op: LayerOp::MaxPool(pool),
            input_shape,
            output,
        })
    }

    /// Recomputes the whole output tensor from `input`.
    pub fn forward(&mut self, input: &Tensor) -> Result<()> {
        if input.shape() != self.input_shape {
            return Err(FigError::format(format!(
                "layer built for a {:?} input was given {:?}",
                self.input_shape, input.shape()
            )));
        }

        match &self.op {
            LayerOp::Conv(conv) => {
                conv.forward(input, &mut self.output, self.batch_norm.as_ref(), self.activation)
            }
            LayerOp::MaxPool(pool) => pool.forward(input, &mut self.output),
        }
        Ok(())
    }

    pub fn kind(&self) -> LayerKind {
        match self.op {
            LayerOp::Conv(_) => LayerKind::Convolution,
            LayerOp::MaxPool(_) => LayerKind::MaxPool,
        }
    }

    pub fn op(&self) -> &LayerOp {
        &self.op
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn batch_norm(&self) -> Option<&BatchNorm> {
        self.batch_norm.as_ref()
    }

    pub fn input_shape(&self) -> (u32, u32, u32) {
        self.input_shape
    }

    pub fn output(&self) -> &Tensor {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: u32, h: u32, c: u32) -> Tensor {
        let data = (0..w * h * c).map(|i| i as f32 * 0.25 - 3.0).collect();
        Tensor::from_vec(w, h, c, data).unwrap()
    }

    #[test]
    fn output_size_matches_formula() {
        for in_size in 1..12u32 {
            for kernel in 1..=in_size.min(5) {
                for pad_before in 0..3 {
                    for pad_after in 0..3 {
                        for stride in 1..4 {
                            let expected = (in_size - kernel + pad_before + pad_after) / stride + 1;
                            assert_eq!(
                                output_size(in_size, kernel, pad_before, pad_after, stride),
                                Some(expected)
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn output_size_rejects_degenerate_windows() {
        assert_eq!(output_size(4, 3, 0, 0, 0), None);
        assert_eq!(output_size(4, 0, 0, 0, 1), None);
        assert_eq!(output_size(2, 5, 1, 1, 1), None);
        assert_eq!(output_size(2, 5, 2, 1, 1), Some(1));
    }

    #[test]
    fn identity_1x1_conv_reproduces_input() {
        let input = ramp(5, 4, 1);
        let conv = Conv::new(1, 1, Window::square(1, 1, 0), vec![1.0], vec![0.0]).unwrap();
        let mut layer = Layer::conv(input.shape(), Activation::None, conv, None).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output(), &input);
    }

    #[test]
    fn identity_1x1_conv_with_channels_reproduces_input() {
        let input = ramp(3, 3, 3);
        let mut weight = vec![0.0; 9];
        for c in 0..3 {
            weight[c * 3 + c] = 1.0;
        }
        let conv = Conv::new(3, 3, Window::square(1, 1, 0), weight, vec![0.0; 3]).unwrap();
        let mut layer = Layer::conv(input.shape(), Activation::None, conv, None).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output().as_slice(), input.as_slice());
    }

    #[test]
    fn unit_maxpool_is_identity() {
        let input = ramp(4, 3, 2);
        let mut layer = Layer::max_pool(input.shape(), MaxPool::new(Window::square(1, 1, 0))).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output(), &input);
    }

    #[test]
    fn neutral_batchnorm_is_near_identity() {
        let input = ramp(3, 2, 1);
        let conv = Conv::new(1, 1, Window::square(1, 1, 0), vec![1.0], vec![0.0]).unwrap();
        let bn = BatchNorm::new(vec![1.0], vec![0.0], vec![0.0], vec![1.0 - BatchNorm::EPSILON]);
        let mut layer = Layer::conv(input.shape(), Activation::None, conv, Some(bn)).unwrap();
        layer.forward(&input).unwrap();
        for (a, b) in layer.output().as_slice().iter().zip(input.as_slice()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn conv_3x3_zero_pads_the_border() {
        // All-ones 3x3 kernel over an all-ones 3x3 image counts the in-range taps.
        let input = Tensor::from_vec(3, 3, 1, vec![1.0; 9]).unwrap();
        let conv = Conv::new(1, 1, Window::square(3, 1, 1), vec![1.0; 9], vec![0.5]).unwrap();
        let mut layer = Layer::conv(input.shape(), Activation::None, conv, None).unwrap();
        layer.forward(&input).unwrap();
        let out = layer.output();
        assert_eq!(out.shape(), (3, 3, 1));
        assert_eq!(out.get(0, 0, 0).unwrap(), 4.5);
        assert_eq!(out.get(1, 0, 0).unwrap(), 6.5);
        assert_eq!(out.get(1, 1, 0).unwrap(), 9.5);
        assert_eq!(out.get(2, 2, 0).unwrap(), 4.5);
    }

    #[test]
    fn conv_weight_layout_is_ky_kx_ic() {
        // 2x1 kernel over 2 input channels: weight[(ky*kw + kx)*in_c + ic].
        let input = Tensor::from_vec(2, 1, 2, vec![1.0, 10.0, 100.0, 1000.0]).unwrap();
        let window = Window::new(2, 1, 1, 1, Padding::default());
        let conv = Conv::new(2, 1, window, vec![1.0, 2.0, 3.0, 4.0], vec![0.0]).unwrap();
        let mut layer = Layer::conv(input.shape(), Activation::None, conv, None).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output().shape(), (1, 1, 1));
        assert_eq!(layer.output().get(0, 0, 0).unwrap(), 1.0 + 20.0 + 300.0 + 4000.0);
    }

    #[test]
    fn strided_conv_with_left_padding_only() {
        // src = 2 * out + k - 2 over [1, 2, 3, 4, 5], taps weighted 1, 10, 100.
        let input = Tensor::from_vec(5, 1, 1, vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let window = Window::new(3, 1, 2, 1, Padding::new(0, 2, 0, 0));
        let conv = Conv::new(1, 1, window, vec![1.0, 10.0, 100.0], vec![0.0]).unwrap();
        let mut layer = Layer::conv(input.shape(), Activation::None, conv, None).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output().shape(), (3, 1, 1));
        assert_eq!(layer.output().as_slice(), &[100.0, 321.0, 543.0]);
    }

    #[test]
    fn strided_conv_with_top_padding_only() {
        // src = 2 * out + k - 1 over the column [1, 2, 3, 4], taps weighted 1, 10.
        let input = Tensor::from_vec(1, 4, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let window = Window::new(1, 2, 1, 2, Padding::new(1, 0, 0, 0));
        let conv = Conv::new(1, 1, window, vec![1.0, 10.0], vec![0.5]).unwrap();
        let mut layer = Layer::conv(input.shape(), Activation::None, conv, None).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output().shape(), (1, 2, 1));
        assert_eq!(layer.output().as_slice(), &[10.5, 32.5]);
    }

    #[test]
    fn relu_clamps_negatives() {
        let input = Tensor::from_vec(2, 1, 1, vec![-2.0, 3.0]).unwrap();
        let conv = Conv::new(1, 1, Window::square(1, 1, 0), vec![1.0], vec![0.0]).unwrap();
        let mut layer = Layer::conv(input.shape(), Activation::ReLU, conv, None).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output().as_slice(), &[0.0, 3.0]);
    }

    #[test]
    fn maxpool_2x2_picks_window_max() {
        let input = Tensor::from_vec(4, 2, 1, vec![1.0, 5.0, 2.0, 0.0, 3.0, -1.0, 7.0, 4.0]).unwrap();
        let pool = MaxPool::new(Window::new(2, 2, 0, 0, Padding::default()));
        assert_eq!(pool.window().stride_x, 2);
        assert_eq!(pool.window().stride_y, 2);
        let mut layer = Layer::max_pool(input.shape(), pool).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output().shape(), (2, 1, 1));
        assert_eq!(layer.output().as_slice(), &[5.0, 7.0]);
    }

    #[test]
    fn maxpool_window_entirely_in_padding_is_negative_infinity() {
        let input = Tensor::from_vec(1, 1, 1, vec![3.0]).unwrap();
        let pool = MaxPool::new(Window::new(1, 1, 1, 1, Padding::new(0, 2, 0, 0)));
        let mut layer = Layer::max_pool(input.shape(), pool).unwrap();
        layer.forward(&input).unwrap();
        assert_eq!(layer.output().shape(), (3, 1, 1));
        assert_eq!(layer.output().get(0, 0, 0).unwrap(), f32::NEG_INFINITY);
        assert_eq!(layer.output().get(2, 0, 0).unwrap(), 3.0);
    }

    #[test]
    fn mismatched_weight_length_is_rejected() {
        let err = Conv::new(2, 4, Window::square(3, 1, 1), vec![0.0; 10], vec![0.0; 4]).unwrap_err();
        assert!(matches!(err, FigError::Format(_)));
        let err = Conv::new(1, 2, Window::square(1, 1, 0), vec![0.0; 2], vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, FigError::Format(_)));
    }

    #[test]
    fn channel_mismatch_with_input_is_rejected() {
        let conv = Conv::new(3, 1, Window::square(1, 1, 0), vec![0.0; 3], vec![0.0]).unwrap();
        assert!(Layer::conv((4, 4, 1), Activation::None, conv, None).is_err());
    }

    #[test]
    fn forward_rejects_wrong_input_shape() {
        let conv = Conv::new(1, 1, Window::square(1, 1, 0), vec![1.0], vec![0.0]).unwrap();
        let mut layer = Layer::conv((2, 2, 1), Activation::None, conv, None).unwrap();
        let wrong = Tensor::new(3, 2, 1).unwrap();
        assert!(matches!(layer.forward(&wrong), Err(FigError::Format(_))));
    }

    #[test]
    fn forward_recomputes_every_call() {
        let conv = Conv::new(1, 1, Window::square(1, 1, 0), vec![2.0], vec![0.0]).unwrap();
        let mut layer = Layer::conv((1, 1, 1), Activation::None, conv, None).unwrap();
        layer.forward(&Tensor::from_vec(1, 1, 1, vec![1.0]).unwrap()).unwrap();
        assert_eq!(layer.output().as_slice(), &[2.0]);
        layer.forward(&Tensor::from_vec(1, 1, 1, vec![-4.0]).unwrap()).unwrap();
        assert_eq!(layer.output().as_slice(), &[-8.0]);
    }
}
