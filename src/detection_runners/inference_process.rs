use std::time::Instant;
use crate::common::Detection;
use crate::data::ConfigFig;
use crate::utils;

pub trait InferenceProcess: Sized {
    type Input; // DynamicImage

    /// Creates a new instance of the model with the given options.
    fn new(config: ConfigFig) -> anyhow::Result<Self>;

    /// Pre-process the input into the model's input tensor.
    fn preprocess(&mut self, x: &Self::Input) -> anyhow::Result<()>;

    /// Executes the model on the preprocessed input.
    fn inference(&mut self) -> anyhow::Result<()>;

    /// Post-process the model's output.
    fn postprocess(&self, threshold: f32) -> anyhow::Result<Vec<Detection>>;

    /// Executes the full pipeline.
    fn run(&mut self, x: &Self::Input, threshold: f32) -> anyhow::Result<Vec<Detection>> {
        self.preprocess(x)?;
        self.inference()?;
        self.postprocess(threshold)
    }

    /// Executes the full pipeline, tracing each stage.
    fn forward(&mut self, x: &Self::Input, threshold: f32, profile: bool) -> anyhow::Result<Vec<Detection>> {
        let detect_time = Instant::now();
        let mut _detect_elapsed = detect_time.elapsed();

        self.preprocess(x)?;
        let t_pre = detect_time.elapsed() - _detect_elapsed;
        _detect_elapsed = utils::trace("TIME", "Preprocessing input", detect_time, _detect_elapsed);

        self.inference()?;
        let t_exe = detect_time.elapsed() - _detect_elapsed;
        _detect_elapsed = utils::trace("TIME", "Detection run", detect_time, _detect_elapsed);

        let ys = self.postprocess(threshold)?;
        let t_post = detect_time.elapsed() - _detect_elapsed;
        utils::trace("TIME", "Postprocessing", detect_time, _detect_elapsed);

        if profile {
            log::info!("> Preprocess: {t_pre:?} | Inference: {t_exe:?} | Postprocess: {t_post:?}");
        }

        Ok(ys)
    }
}
