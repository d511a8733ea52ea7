mod fig_inference;
mod layer_list;
mod model;
pub mod decoder;
pub mod image_ops;
pub mod layers;
pub mod model_file;

pub use fig_inference::*;
pub use layer_list::LayerList;
pub use model::Model;
