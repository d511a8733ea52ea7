mod utils;
pub mod data;
pub mod detection_runners;
pub mod common;

use std::time::Instant;
use image::DynamicImage;
use crate::common::Detection;
use crate::data::ConfigFig;
use crate::detection_runners::inference_process::InferenceProcess;

pub use crate::common::{Activation, FigError, Result, Tensor};
pub use crate::detection_runners::decoder::decode_detections;
pub use crate::detection_runners::model_file::{load_model, parse_model, save_model, write_model};
pub use crate::detection_runners::{FigDetector, LayerList, Model};

pub fn init_detector(config: &ConfigFig) -> anyhow::Result<FigDetector> {
    log::info!("Initializing FIG detector from {}", config.weights_path);
    FigDetector::new(config.clone())
}

pub fn run_detection(detector: &mut FigDetector, image: &DynamicImage, threshold: f32) -> anyhow::Result<Vec<Detection>> {
    let now = Instant::now();
    let profile = detector.config().profile;

    let detections = detector.forward(image, threshold, profile)?;

    log::debug!("Processing time: {:?} | Detections: {}", now.elapsed(), detections.len());

    Ok(detections)
}
