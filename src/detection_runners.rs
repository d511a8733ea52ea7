pub mod inference_process;
pub mod fig_detector;

pub use fig_detector::*;
