//! Functions to turn photographs into model input tensors.

use std::path::Path;
use anyhow::{bail, Result};
use fast_image_resize::{
    images::Image as FirImage,
    pixels::PixelType,
    FilterType, ResizeAlg, ResizeOptions, Resizer,
};
use image::{ImageError, RgbImage};
use serde::{Deserialize, Serialize};
use crate::common::{FigError, Tensor};

/// Order in which the three colour channels are written into the tensor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    Rgb,
    #[default] Bgr,
}

/// Decodes the file at `path` into an RGB8 image.
pub fn load_image(path: impl AsRef<Path>) -> crate::common::Result<RgbImage> {
    let path = path.as_ref();
    match image::open(path) {
        Ok(image) => Ok(image.to_rgb8()),
        Err(ImageError::IoError(source)) => Err(FigError::File { path: path.to_path_buf(), source }),
        Err(source) => Err(FigError::Image { path: path.to_path_buf(), source }),
    }
}

/// Bilinear resize to `width x height`.
pub fn resize_image(image: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }

    let src = FirImage::from_vec_u8(image.width(), image.height(), image.as_raw().clone(), PixelType::U8x3)?;
    let mut dst = FirImage::new(width, height, PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    let mut resizer = Resizer::new();
    resizer.resize(&src, &mut dst, &options)?;

    match RgbImage::from_raw(width, height, dst.into_vec()) {
        Some(resized) => Ok(resized),
        None => bail!("Resized buffer does not hold {}x{} RGB pixels", width, height),
    }
}

/// Writes `image` into `tensor` as `value / 255` per channel, in `order`.
pub fn to_tensor(image: &RgbImage, tensor: &mut Tensor, order: ChannelOrder) -> Result<()> {
    let (w, h) = image.dimensions();
    if tensor.shape() != (w, h, 3) {
        bail!("Expected a {}x{}x3 tensor for a {}x{} image, got {:?}", w, h, w, h, tensor.shape());
    }

    let dst = tensor.as_slice_mut();
    for (i, px) in image.as_raw().chunks_exact(3).enumerate() {
        let (r, g, b) = (px[0], px[1], px[2]);
        let out = &mut dst[3 * i..3 * i + 3];
        let ordered = match order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        for (o, v) in out.iter_mut().zip(ordered) {
            *o = v as f32 / 255.0;
        }
    }
    Ok(())
}

/// Resizes `image` to the tensor's width and height, then normalizes it in.
pub fn preprocess(image: &RgbImage, tensor: &mut Tensor, order: ChannelOrder) -> Result<()> {
    let resized = resize_image(image, tensor.width(), tensor.height())?;
    to_tensor(&resized, tensor, order)
}
