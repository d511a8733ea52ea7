//! Error type shared by the tensor, layer, model and model-file code.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FigError {
    /// Backing storage for a tensor or weight array could not be obtained.
    #[error("failed allocating memory for {elements} f32 values")]
    Allocation {
        elements: usize,
    },

    /// A model or image file is missing or unreadable.
    #[error("failed opening file {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An image file was read but could not be decoded.
    #[error("failed decoding image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Bad magic, unknown layer tag, or a shape that does not add up.
    #[error("invalid model format: {0}")]
    Format(String),

    /// The byte stream ended inside a header or an array.
    #[error("file ended unexpectedly at byte {offset} while reading {context}")]
    Truncated {
        offset: usize,
        context: &'static str,
    },

    /// Tensor or layer-list access out of range.
    #[error("index out of bounds: {0}")]
    Index(String),

    /// `output()` called on a model without layers.
    #[error("model has no layers")]
    EmptyModel,
}

impl FigError {
    pub fn format(msg: impl Into<String>) -> Self {
        FigError::Format(msg.into())
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, FigError::Truncated { .. })
    }
}

pub type Result<T, E = FigError> = std::result::Result<T, E>;
