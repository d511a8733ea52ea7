#![allow(dead_code)]

use std::path::PathBuf;
use fig_detect::detection_runners::layers::{BatchNorm, Conv, Layer, MaxPool, Window};
use fig_detect::{Activation, Model};

pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fig_detect_{}_{}.fig", name, std::process::id()))
}

/// 8x8x3 (BGR) -> 1x1 conv to 6 channels -> 2x2 maxpool -> 4x4x6 grid.
///
/// The object logit is `20 * red - 10`, so red pixels become confident
/// detections and everything else falls far below 0.5.
pub fn red_finder() -> Model {
    let mut model = Model::with_input_shape((8, 8, 3));

    let mut weight = vec![0.0; 6 * 3];
    weight[5 * 3 + 2] = 20.0;
    let bias = vec![0.0, 0.0, 0.0, 0.0, 0.0, -10.0];
    let conv = Conv::new(3, 6, Window::square(1, 1, 0), weight, bias).unwrap();
    let neutral = BatchNorm::new(vec![1.0; 6], vec![0.0; 6], vec![0.0; 6], vec![1.0 - BatchNorm::EPSILON; 6]);
    model.add_layer(Layer::conv(model.current_shape(), Activation::None, conv, Some(neutral)).unwrap()).unwrap();

    let pool = MaxPool::new(Window::square(2, 0, 0));
    model.add_layer(Layer::max_pool(model.current_shape(), pool).unwrap()).unwrap();
    model
}
