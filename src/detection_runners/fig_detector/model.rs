use std::time::Instant;
use crate::common::{FigError, Result, Tensor};
use crate::data::TimeCalc;
use crate::detection_runners::fig_detector::layer_list::LayerList;
use crate::detection_runners::fig_detector::layers::Layer;

/// A linear chain of layers built for one input shape.
///
/// The input tensor stays with the caller and is lent to [`Model::forward`];
/// the model owns every layer and, through them, every intermediate tensor.
#[derive(Debug, Clone)]
pub struct Model {
    layers: LayerList,
    input_shape: (u32, u32, u32),
}

impl Model {
    /// Empty model that will consume tensors shaped like `input`.
    pub fn new(input: &Tensor) -> Self {
        Self::with_input_shape(input.shape())
    }

    pub fn with_input_shape(input_shape: (u32, u32, u32)) -> Self {
        Self {
            layers: LayerList::new(),
            input_shape,
        }
    }

    /// Shape the next appended layer must consume: the last output, or the model input.
    pub fn current_shape(&self) -> (u32, u32, u32) {
        match self.layers.tail() {
            Some(layer) => layer.output().shape(),
            None => self.input_shape,
        }
    }

    /// Appends `layer` to the chain. Its input shape must match the current tail.
    pub fn add_layer(&mut self, layer: Layer) -> Result<()> {
        let expected = self.current_shape();
        if layer.input_shape() != expected {
            return Err(FigError::format(format!(
                "layer {} consumes {:?}, chain produces {:?}",
                self.layers.len(), layer.input_shape(), expected
            )));
        }
        self.layers.append(layer);
        Ok(())
    }

    /// Runs every layer in order. Layer `i` reads layer `i - 1`'s output, layer 0 reads `input`.
    pub fn forward(&mut self, input: &Tensor) -> Result<()> {
        self.run(input, None)
    }

    /// Same as [`Model::forward`], recording each layer's duration into `times`.
    pub fn forward_profiled(&mut self, input: &Tensor, times: &mut TimeCalc) -> Result<()> {
        self.run(input, Some(times))
    }

    fn run(&mut self, input: &Tensor, mut times: Option<&mut TimeCalc>) -> Result<()> {
        if input.shape() != self.input_shape {
            return Err(FigError::format(format!(
                "model built for a {:?} input was given {:?}",
                self.input_shape, input.shape()
            )));
        }

        let layers = self.layers.as_mut_slice();
        for i in 0..layers.len() {
            let (done, rest) = layers.split_at_mut(i);
            let src = match done.last() {
                Some(prev) => prev.output(),
                None => input,
            };

            let now = Instant::now();
            rest[0].forward(src)?;

            if let Some(times) = times.as_deref_mut() {
                let elapsed = now.elapsed();
                log::trace!("layer {} ({:?}) | {:.2?}", i, rest[0].kind(), elapsed);
                times.add_or_push(i, elapsed);
            }
        }
        Ok(())
    }

    /// Output of the last layer.
    pub fn output(&self) -> Result<&Tensor> {
        self.layers.tail().map(|l| l.output()).ok_or(FigError::EmptyModel)
    }

    pub fn layers(&self) -> &LayerList {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn input_shape(&self) -> (u32, u32, u32) {
        self.input_shape
    }

    pub fn output_shape(&self) -> Option<(u32, u32, u32)> {
        self.layers.tail().map(|l| l.output().shape())
    }
}
