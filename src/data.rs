mod config_fig;
mod time_calc;

pub use config_fig::ConfigFig;
pub use time_calc::TimeCalc;

pub use crate::detection_runners::fig_detector::image_ops::ChannelOrder;
