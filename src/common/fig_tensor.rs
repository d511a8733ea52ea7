use ndarray::{Array3, ArrayView3, ArrayViewMut3};
use crate::common::{FigError, Result};

/// Dense `width x height x channels` f32 buffer with channels interleaved.
///
/// Element `(x, y, c)` lives at flat offset `channels * (y * width + x) + c`,
/// which is the standard row-major layout of an ndarray shaped
/// `[height, width, channels]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Array3<f32>,
    width: u32,
    height: u32,
    channels: u32,
}

impl Tensor {
    /// Largest tensor that will be allocated (1 GiB of f32). Bigger shapes are
    /// an AllocationError before any memory is touched.
    pub const MAX_ELEMENTS: usize = 1 << 28;

    /// Allocates a zero-filled tensor.
    pub fn new(width: u32, height: u32, channels: u32) -> Result<Self> {
        let elements = Self::element_count(width, height, channels)?;

        let mut buffer: Vec<f32> = Vec::new();
        buffer
            .try_reserve_exact(elements)
            .map_err(|_| FigError::Allocation { elements })?;
        buffer.resize(elements, 0.0);

        Self::from_vec(width, height, channels, buffer)
    }

    /// Wraps an existing channel-last buffer. The length must match the shape exactly.
    pub fn from_vec(width: u32, height: u32, channels: u32, data: Vec<f32>) -> Result<Self> {
        let elements = Self::element_count(width, height, channels)?;
        if data.len() != elements {
            return Err(FigError::format(format!(
                "tensor {}x{}x{} needs {} values, got {}",
                width, height, channels, elements, data.len()
            )));
        }

        let data = Array3::from_shape_vec(
            (height as usize, width as usize, channels as usize),
            data,
        )
        .map_err(|e| FigError::format(e.to_string()))?;

        Ok(Self { data, width, height, channels })
    }

    fn element_count(width: u32, height: u32, channels: u32) -> Result<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .filter(|n| *n <= Self::MAX_ELEMENTS)
            .ok_or_else(|| FigError::Allocation {
                elements: (width as u128 * height as u128 * channels as u128)
                    .try_into()
                    .unwrap_or(usize::MAX),
            })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Returns `(width, height, channels)`.
    pub fn shape(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.channels)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat offset of `(x, y, c)`, or an IndexError when any coordinate is out of range.
    pub fn offset_of(&self, x: u32, y: u32, c: u32) -> Result<usize> {
        if x >= self.width || y >= self.height || c >= self.channels {
            return Err(FigError::Index(format!(
                "({}, {}, {}) outside tensor {}x{}x{}",
                x, y, c, self.width, self.height, self.channels
            )));
        }
        Ok(self.channels as usize * (y as usize * self.width as usize + x as usize) + c as usize)
    }

    pub fn get(&self, x: u32, y: u32, c: u32) -> Result<f32> {
        self.offset_of(x, y, c)?;
        Ok(self.data[[y as usize, x as usize, c as usize]])
    }

    pub fn set(&mut self, x: u32, y: u32, c: u32, value: f32) -> Result<()> {
        self.offset_of(x, y, c)?;
        self.data[[y as usize, x as usize, c as usize]] = value;
        Ok(())
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// View indexed `[y, x, c]`.
    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut3<'_, f32> {
        self.data.view_mut()
    }

    /// Flat channel-last data. Tensors are always built in standard layout.
    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice().unwrap_or(&[])
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        self.data.as_slice_mut().unwrap_or(&mut [])
    }
}
