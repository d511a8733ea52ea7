use crate::common::{FigError, Result};
use crate::detection_runners::fig_detector::layers::Layer;

/// Ordered, owning sequence of layers. Dropping the list drops every layer
/// together with its output tensor and parameter arrays.
#[derive(Debug, Default, Clone)]
pub struct LayerList {
    layers: Vec<Layer>,
}

impl LayerList {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn append(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Inserts before the layer currently at `index`; `index == len` appends.
    pub fn insert(&mut self, index: usize, layer: Layer) -> Result<()> {
        if index > self.layers.len() {
            return Err(self.out_of_range(index));
        }
        self.layers.insert(index, layer);
        Ok(())
    }

    pub fn at(&self, index: usize) -> Result<&Layer> {
        self.layers.get(index).ok_or_else(|| self.out_of_range(index))
    }

    pub fn remove(&mut self, index: usize) -> Result<Layer> {
        if index >= self.layers.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.layers.remove(index))
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn head(&self) -> Option<&Layer> {
        self.layers.first()
    }

    pub fn tail(&self) -> Option<&Layer> {
        self.layers.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Layer> {
        self.layers.iter()
    }

    /// Mutable access for the forward pass, which needs each layer's
    /// predecessor (read) next to the layer itself (write).
    pub(crate) fn as_mut_slice(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    fn out_of_range(&self, index: usize) -> FigError {
        FigError::Index(format!("layer {} of a {}-layer list", index, self.layers.len()))
    }
}

impl<'a> IntoIterator for &'a LayerList {
    type Item = &'a Layer;
    type IntoIter = std::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}
