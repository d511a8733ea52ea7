//! Runs a FIG model over one photograph and prints the detections.
//!
//! ```text
//! cargo run --example run -- <model.fig> <image.jpg> [annotated_out.jpg]
//! ```

use anyhow::{bail, Result};
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use fig_detect::data::ConfigFig;
use fig_detect::detection_runners::image_ops;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <model.fig> <image> [annotated_out]", args[0]);
    }

    let config = ConfigFig::new()
        .with_weights(&args[1])
        .with_profile(true);
    let mut detector = fig_detect::init_detector(&config)?;

    let image = DynamicImage::ImageRgb8(image_ops::load_image(&args[2])?);
    let detections = fig_detect::run_detection(&mut detector, &image, config.conf_threshold)?;

    for d in &detections {
        d.print_detection();
    }
    println!("Number of detections: {}", detections.len());
    println!("{}", serde_json::to_string_pretty(&detections)?);
    detector.print_time();

    if let Some(out_path) = args.get(3) {
        let mut img = image.to_rgb8();
        let (img_w, img_h) = img.dimensions();
        for d in &detections {
            let (x, y, w, h) = d.as_xy_wh_i32(img_w, img_h);
            let rect = Rect::at(x, y).of_size(w.max(1) as u32, h.max(1) as u32);
            draw_hollow_rect_mut(&mut img, rect, Rgb([0, 255, 0]));
        }
        img.save(out_path)?;
    }

    Ok(())
}
