mod activation;
mod fig_detection;
mod fig_error;
mod fig_tensor;

pub use activation::*;
pub use fig_detection::*;
pub use fig_error::*;
pub use fig_tensor::*;
