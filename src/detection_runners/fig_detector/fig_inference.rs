use anyhow::Result;
use image::DynamicImage;

use crate::common::{Detection, Tensor};
use crate::data::{ConfigFig, TimeCalc};
use crate::detection_runners::fig_detector::decoder::decode_detections;
use crate::detection_runners::fig_detector::image_ops;
use crate::detection_runners::fig_detector::model::Model;
use crate::detection_runners::fig_detector::model_file::load_model;
use crate::detection_runners::inference_process::InferenceProcess;

/// Photograph-in, detections-out wrapper around a [`Model`] and its input tensor.
#[derive(Debug)]
pub struct FigDetector {
    config: ConfigFig,
    input: Tensor,
    model: Model,
    profile: bool,
    pub infer_time: TimeCalc,
    pub layer_time: TimeCalc,
}

impl InferenceProcess for FigDetector {
    type Input = DynamicImage;

    fn new(config: ConfigFig) -> Result<Self> {
        let input = Tensor::new(config.model_width, config.model_height, config.channels)?;
        let model = load_model(&config.weights_path, &input)?;
        Self::from_parts(config, input, model)
    }

    fn preprocess(&mut self, x: &Self::Input) -> Result<()> {
        image_ops::preprocess(&x.to_rgb8(), &mut self.input, self.config.channel_order)
    }

    fn inference(&mut self) -> Result<()> {
        let now = std::time::Instant::now();
        if self.profile {
            self.model.forward_profiled(&self.input, &mut self.layer_time)?;
        } else {
            self.model.forward(&self.input)?;
        }
        self.infer_time.add_or_push(0, now.elapsed());
        Ok(())
    }

    fn postprocess(&self, threshold: f32) -> Result<Vec<Detection>> {
        Ok(decode_detections(self.model.output()?, threshold)?)
    }
}

impl FigDetector {
    /// Wraps an already built model. The input tensor must match the model's input shape.
    pub fn from_parts(config: ConfigFig, input: Tensor, model: Model) -> Result<Self> {
        if input.shape() != model.input_shape() {
            anyhow::bail!(
                "Input tensor {:?} does not match the model input {:?}",
                input.shape(), model.input_shape()
            );
        }
        if model.is_empty() {
            anyhow::bail!("Model {:?} has no layers", config.weights_path);
        }

        log::info!("FIG detector ready\n{}", config.to_string());
        Ok(Self {
            profile: config.profile,
            config,
            input,
            model,
            infer_time: TimeCalc::default(),
            layer_time: TimeCalc::default(),
        })
    }

    pub fn config(&self) -> &ConfigFig {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn input(&self) -> &Tensor {
        &self.input
    }

    /// Lets callers that do their own preprocessing fill the input tensor directly.
    pub fn input_mut(&mut self) -> &mut Tensor {
        &mut self.input
    }

    pub fn print_time(&self) {
        log::info!(
            "Inference runs: {} | Avg: {:.2?} | Total: {:.2?}",
            self.infer_time.n(), self.infer_time.avg(), self.infer_time.total()
        );
        for (i, _) in self.layer_time.ts().iter().enumerate() {
            if let Some(avg) = self.layer_time.avg_i(i) {
                log::info!("  layer {i}: avg {avg:.2?}");
            }
        }
    }
}
