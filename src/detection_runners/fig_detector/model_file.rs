//! Reader and writer for the binary FIG model format.
//!
//! # File Format
//!
//! Everything is little-endian with no alignment padding:
//! 1. **Magic**: `FIG` (3 bytes)
//! 2. Zero or more **records**, each starting with a `u32` layer tag:
//!    - `0` Convolution: a 56-byte header (`activation: i32`, `batchnorm: i32`,
//!      then `in_channels, out_channels, kernel_w, kernel_h, stride_x, stride_y,
//!      padding_top, padding_left, padding_bottom, padding_right, weight_size,
//!      bias_size` as `u32`), a 16-byte batch-norm header when `batchnorm != 0`
//!      (`gamma_size, beta_size, running_mean_size, running_var_size`), then the
//!      weight, bias and (optionally) gamma, beta, running mean and running
//!      variance arrays of `f32`.
//!    - `1` MaxPool: a 32-byte header (`kernel_w, kernel_h, stride_x, stride_y,
//!      padding_top, padding_left, padding_bottom, padding_right`).
//!
//! End of file exactly at a record boundary ends the model. Any other short
//! read is a truncation error and no model is returned.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::common::{Activation, FigError, Result, Tensor};
use crate::detection_runners::fig_detector::layers::{BatchNorm, Conv, Layer, LayerKind, LayerOp, MaxPool, Padding, Window};
use crate::detection_runners::fig_detector::model::Model;

/// Magic bytes identifying a model file.
pub const FIG_MAGIC: [u8; 3] = *b"FIG";

/// Cursor over the in-memory file that turns short reads into [`FigError::Truncated`].
struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.offset == self.bytes.len()
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(n).filter(|end| *end <= self.bytes.len());
        match end {
            Some(end) => {
                let chunk = &self.bytes[self.offset..end];
                self.offset = end;
                Ok(chunk)
            }
            None => Err(FigError::Truncated { offset: self.offset, context }),
        }
    }

    fn u32(&mut self, context: &'static str) -> Result<u32> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self, context: &'static str) -> Result<i32> {
        let b = self.take(4, context)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32_array(&mut self, len: u32, context: &'static str) -> Result<Vec<f32>> {
        let len = len as usize;
        let n_bytes = len
            .checked_mul(4)
            .ok_or_else(|| FigError::format(format!("{} length {} is too large", context, len)))?;
        let raw = self.take(n_bytes, context)?;

        let mut values = Vec::new();
        values
            .try_reserve_exact(len)
            .map_err(|_| FigError::Allocation { elements: len })?;
        values.extend(
            raw.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        Ok(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConvRecord {
    activation: i32,
    batchnorm: i32,
    in_channels: u32,
    out_channels: u32,
    kernel_w: u32,
    kernel_h: u32,
    stride_x: u32,
    stride_y: u32,
    padding_top: u32,
    padding_left: u32,
    padding_bottom: u32,
    padding_right: u32,
    weight_size: u32,
    bias_size: u32,
}

impl ConvRecord {
    const CONTEXT: &'static str = "convolution header";

    fn read_from(r: &mut ByteReader) -> Result<Self> {
        // Read the whole header up front so a short header reports one offset.
        let mut r = ByteReader::new(r.take(56, Self::CONTEXT)?);
        Ok(Self {
            activation: r.i32(Self::CONTEXT)?,
            batchnorm: r.i32(Self::CONTEXT)?,
            in_channels: r.u32(Self::CONTEXT)?,
            out_channels: r.u32(Self::CONTEXT)?,
            kernel_w: r.u32(Self::CONTEXT)?,
            kernel_h: r.u32(Self::CONTEXT)?,
            stride_x: r.u32(Self::CONTEXT)?,
            stride_y: r.u32(Self::CONTEXT)?,
            padding_top: r.u32(Self::CONTEXT)?,
            padding_left: r.u32(Self::CONTEXT)?,
            padding_bottom: r.u32(Self::CONTEXT)?,
            padding_right: r.u32(Self::CONTEXT)?,
            weight_size: r.u32(Self::CONTEXT)?,
            bias_size: r.u32(Self::CONTEXT)?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.activation.to_le_bytes())?;
        w.write_all(&self.batchnorm.to_le_bytes())?;
        for v in [
            self.in_channels, self.out_channels,
            self.kernel_w, self.kernel_h,
            self.stride_x, self.stride_y,
            self.padding_top, self.padding_left, self.padding_bottom, self.padding_right,
            self.weight_size, self.bias_size,
        ] {
            w.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    fn window(&self) -> Window {
        Window::new(
            self.kernel_w, self.kernel_h,
            self.stride_x, self.stride_y,
            Padding::new(self.padding_top, self.padding_left, self.padding_bottom, self.padding_right),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchNormRecord {
    gamma_size: u32,
    beta_size: u32,
    running_mean_size: u32,
    running_var_size: u32,
}

impl BatchNormRecord {
    const CONTEXT: &'static str = "batchnorm header";

    fn read_from(r: &mut ByteReader) -> Result<Self> {
        let mut r = ByteReader::new(r.take(16, Self::CONTEXT)?);
        Ok(Self {
            gamma_size: r.u32(Self::CONTEXT)?,
            beta_size: r.u32(Self::CONTEXT)?,
            running_mean_size: r.u32(Self::CONTEXT)?,
            running_var_size: r.u32(Self::CONTEXT)?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for v in [self.gamma_size, self.beta_size, self.running_mean_size, self.running_var_size] {
            w.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MaxPoolRecord {
    kernel_w: u32,
    kernel_h: u32,
    stride_x: u32,
    stride_y: u32,
    padding_top: u32,
    padding_left: u32,
    padding_bottom: u32,
    padding_right: u32,
}

impl MaxPoolRecord {
    const CONTEXT: &'static str = "maxpool header";

    fn read_from(r: &mut ByteReader) -> Result<Self> {
        let mut r = ByteReader::new(r.take(32, Self::CONTEXT)?);
        Ok(Self {
            kernel_w: r.u32(Self::CONTEXT)?,
            kernel_h: r.u32(Self::CONTEXT)?,
            stride_x: r.u32(Self::CONTEXT)?,
            stride_y: r.u32(Self::CONTEXT)?,
            padding_top: r.u32(Self::CONTEXT)?,
            padding_left: r.u32(Self::CONTEXT)?,
            padding_bottom: r.u32(Self::CONTEXT)?,
            padding_right: r.u32(Self::CONTEXT)?,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for v in [
            self.kernel_w, self.kernel_h,
            self.stride_x, self.stride_y,
            self.padding_top, self.padding_left, self.padding_bottom, self.padding_right,
        ] {
            w.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    fn from_window(w: &Window) -> Self {
        Self {
            kernel_w: w.kernel_w,
            kernel_h: w.kernel_h,
            stride_x: w.stride_x,
            stride_y: w.stride_y,
            padding_top: w.padding.top,
            padding_left: w.padding.left,
            padding_bottom: w.padding.bottom,
            padding_right: w.padding.right,
        }
    }
}

/// Loads the model at `path`, building its layer chain for tensors shaped like `input`.
pub fn load_model(path: impl AsRef<Path>, input: &Tensor) -> Result<Model> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| FigError::File {
        path: path.to_path_buf(),
        source,
    })?;

    let model = parse_model(&bytes, input.shape())?;
    log::info!(
        "Loaded {:?} | Layers: {} | Input: {:?} | Output: {:?}",
        path, model.len(), model.input_shape(), model.output_shape()
    );
    Ok(model)
}

/// Parses an in-memory model file. All-or-nothing: any error discards the partial chain.
pub fn parse_model(bytes: &[u8], input_shape: (u32, u32, u32)) -> Result<Model> {
    let mut r = ByteReader::new(bytes);

    let magic = r.take(FIG_MAGIC.len(), "magic")?;
    if magic != FIG_MAGIC {
        return Err(FigError::format(format!("unknown file format (magic {:?})", magic)));
    }

    let mut model = Model::with_input_shape(input_shape);
    while !r.is_at_end() {
        let record_offset = r.offset;
        let tag = r.u32("layer tag")?;
        let layer = match LayerKind::from_tag(tag) {
            Some(LayerKind::Convolution) => read_conv(&mut r, model.current_shape())?,
            Some(LayerKind::MaxPool) => read_max_pool(&mut r, model.current_shape())?,
            None => {
                return Err(FigError::format(format!(
                    "unknown layer kind {} at byte {}",
                    tag, record_offset
                )))
            }
        };
        log::debug!(
            "layer {} | {:?} | {} | {:?} -> {:?}",
            model.len(), layer.kind(), layer.activation(), layer.input_shape(), layer.output().shape()
        );
        model.add_layer(layer)?;
    }

    Ok(model)
}

fn read_conv(r: &mut ByteReader, input_shape: (u32, u32, u32)) -> Result<Layer> {
    let record = ConvRecord::read_from(r)?;
    let bn_record = match record.batchnorm {
        0 => None,
        _ => Some(BatchNormRecord::read_from(r)?),
    };

    let activation = Activation::from_code(record.activation)
        .ok_or_else(|| FigError::format(format!("unknown activation {}", record.activation)))?;

    // Check declared sizes against the declared shape before allocating anything.
    let window = record.window();
    let expected = Conv::weight_len(record.in_channels, record.out_channels, &window);
    if expected != Some(record.weight_size as usize) {
        return Err(FigError::format(format!(
            "convolution declares {} weights for a {}x{}x{}x{} kernel",
            record.weight_size, record.out_channels, record.kernel_h, record.kernel_w, record.in_channels
        )));
    }
    if record.bias_size != record.out_channels {
        return Err(FigError::format(format!(
            "convolution declares {} biases for {} output channels",
            record.bias_size, record.out_channels
        )));
    }
    if let Some(bn) = &bn_record {
        let sizes = [bn.gamma_size, bn.beta_size, bn.running_mean_size, bn.running_var_size];
        if sizes.iter().any(|s| *s != record.out_channels) {
            return Err(FigError::format(format!(
                "batchnorm declares sizes {:?} for {} output channels",
                sizes, record.out_channels
            )));
        }
    }

    let weight = r.f32_array(record.weight_size, "convolution weights")?;
    let bias = r.f32_array(record.bias_size, "convolution bias")?;
    let batch_norm = match bn_record {
        Some(bn) => Some(BatchNorm::new(
            r.f32_array(bn.gamma_size, "batchnorm gamma")?,
            r.f32_array(bn.beta_size, "batchnorm beta")?,
            r.f32_array(bn.running_mean_size, "batchnorm running mean")?,
            r.f32_array(bn.running_var_size, "batchnorm running variance")?,
        )),
        None => None,
    };

    let conv = Conv::new(record.in_channels, record.out_channels, window, weight, bias)?;
    Layer::conv(input_shape, activation, conv, batch_norm)
}

fn read_max_pool(r: &mut ByteReader, input_shape: (u32, u32, u32)) -> Result<Layer> {
    let record = MaxPoolRecord::read_from(r)?;
    let window = Window::new(
        record.kernel_w, record.kernel_h,
        record.stride_x, record.stride_y,
        Padding::new(record.padding_top, record.padding_left, record.padding_bottom, record.padding_right),
    );
    Layer::max_pool(input_shape, MaxPool::new(window))
}

/// Serializes `model` in the format [`parse_model`] reads.
pub fn write_model<W: Write>(model: &Model, w: &mut W) -> std::io::Result<()> {
    w.write_all(&FIG_MAGIC)?;
    for layer in model.layers() {
        w.write_all(&layer.kind().tag().to_le_bytes())?;
        match layer.op() {
            LayerOp::Conv(conv) => write_conv(layer, conv, w)?,
            LayerOp::MaxPool(pool) => MaxPoolRecord::from_window(pool.window()).write_to(w)?,
        }
    }
    Ok(())
}

fn write_conv<W: Write>(layer: &Layer, conv: &Conv, w: &mut W) -> std::io::Result<()> {
    let window = conv.window();
    let bn = layer.batch_norm();
    let record = ConvRecord {
        activation: layer.activation().code(),
        batchnorm: bn.is_some() as i32,
        in_channels: conv.in_channels(),
        out_channels: conv.out_channels(),
        kernel_w: window.kernel_w,
        kernel_h: window.kernel_h,
        stride_x: window.stride_x,
        stride_y: window.stride_y,
        padding_top: window.padding.top,
        padding_left: window.padding.left,
        padding_bottom: window.padding.bottom,
        padding_right: window.padding.right,
        weight_size: conv.weight().len() as u32,
        bias_size: conv.bias().len() as u32,
    };
    record.write_to(w)?;

    if let Some(bn) = bn {
        BatchNormRecord {
            gamma_size: bn.gamma.len() as u32,
            beta_size: bn.beta.len() as u32,
            running_mean_size: bn.running_mean.len() as u32,
            running_var_size: bn.running_var.len() as u32,
        }
        .write_to(w)?;
    }

    write_f32s(w, conv.weight().iter())?;
    write_f32s(w, conv.bias().iter())?;
    if let Some(bn) = bn {
        for array in [&bn.gamma, &bn.beta, &bn.running_mean, &bn.running_var] {
            write_f32s(w, array.iter())?;
        }
    }
    Ok(())
}

fn write_f32s<'a, W: Write>(w: &mut W, values: impl Iterator<Item = &'a f32>) -> std::io::Result<()> {
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Writes `model` to a file at `path`.
pub fn save_model(model: &Model, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let to_file_error = |source| FigError::File { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(to_file_error)?;
    let mut writer = BufWriter::new(file);
    write_model(model, &mut writer).map_err(to_file_error)?;
    writer.flush().map_err(to_file_error)
}

/// Serializes `model` into a byte vector.
pub fn model_to_bytes(model: &Model) -> Vec<u8> {
    let mut bytes = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_model(model, &mut bytes);
    bytes
}
