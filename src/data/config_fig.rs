//! Options for building a detector.

use std::path::Path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::detection_runners::fig_detector::image_ops::ChannelOrder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFig {
    pub weights_path: String,
    pub model_width: u32,
    pub model_height: u32,
    pub channels: u32,
    pub conf_threshold: f32,
    pub channel_order: ChannelOrder,
    pub profile: bool,
}

impl Default for ConfigFig {
    fn default() -> Self {
        Self {
            weights_path: String::new(),
            model_width: 320,
            model_height: 320,
            channels: 3,
            conf_threshold: 0.1,
            channel_order: ChannelOrder::Bgr,
            profile: false,
        }
    }
}

impl ConfigFig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Reads a JSON config; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    pub fn with_weights(mut self, weights_path: &str) -> Self {
        self.weights_path = weights_path.to_string();
        self
    }

    pub fn with_model_size(mut self, width: u32, height: u32) -> Self {
        self.model_width = width;
        self.model_height = height;
        self
    }

    pub fn with_channels(mut self, n: u32) -> Self {
        self.channels = n;
        self
    }

    pub fn with_confidence(mut self, x: f32) -> Self {
        self.conf_threshold = x;
        self
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn to_string(&self) -> String {
        format!("Weights File Path: {}\n\
        Model Input Resolution: {}x{}x{}\n\
        Channel Order: {:?}\n\
        Detection Threshold: {}",
                self.weights_path, self.model_width, self.model_height, self.channels,
                self.channel_order, self.conf_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let c = ConfigFig::new()
            .with_weights("model.fig")
            .with_model_size(160, 128)
            .with_confidence(0.4)
            .with_channel_order(ChannelOrder::Rgb);
        assert_eq!(c.weights_path, "model.fig");
        assert_eq!((c.model_width, c.model_height, c.channels), (160, 128, 3));
        assert_eq!(c.conf_threshold, 0.4);
        assert_eq!(c.channel_order, ChannelOrder::Rgb);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: ConfigFig = serde_json::from_str(r#"{ "weights_path": "a.fig", "model_width": 64 }"#).unwrap();
        assert_eq!(c.weights_path, "a.fig");
        assert_eq!(c.model_width, 64);
        assert_eq!(c.model_height, 320);
        assert_eq!(c.channel_order, ChannelOrder::Bgr);
    }

    #[test]
    fn loads_from_a_json_file() {
        let path = std::env::temp_dir().join(format!("fig_detect_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{
            "weights_path": "models/face.fig",
            "model_width": 160,
            "model_height": 120,
            "conf_threshold": 0.35,
            "channel_order": "Rgb",
            "profile": true
        }"#).unwrap();

        let c = ConfigFig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(c.weights_path, "models/face.fig");
        assert_eq!((c.model_width, c.model_height, c.channels), (160, 120, 3));
        assert_eq!(c.conf_threshold, 0.35);
        assert_eq!(c.channel_order, ChannelOrder::Rgb);
        assert!(c.profile);
    }

    #[test]
    fn missing_or_malformed_json_file_fails() {
        assert!(ConfigFig::from_json_file("/nonexistent/fig_config.json").is_err());

        let path = std::env::temp_dir().join(format!("fig_detect_bad_config_{}.json", std::process::id()));
        std::fs::write(&path, "{ \"model_width\": \"wide\" }").unwrap();
        let result = ConfigFig::from_json_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
