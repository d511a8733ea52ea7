extern crate fig_detect;

mod common_model;

use image::{DynamicImage, Rgb, RgbImage};
use fig_detect::data::ConfigFig;
use fig_detect::detection_runners::inference_process::InferenceProcess;

fn red_quadrant_image() -> DynamicImage {
    let mut img = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
    for y in 0..16 {
        for x in 0..16 {
            img.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    DynamicImage::ImageRgb8(img)
}

fn detector(name: &str) -> fig_detect::FigDetector {
    let path = common_model::temp_path(name);
    fig_detect::save_model(&common_model::red_finder(), &path).unwrap();

    let config = ConfigFig::new()
        .with_weights(path.to_str().unwrap())
        .with_model_size(8, 8)
        .with_confidence(0.5);
    let detector = fig_detect::init_detector(&config).unwrap();
    std::fs::remove_file(&path).ok();
    detector
}

#[test]
fn detection() {
    let mut det = detector("detection");
    assert_eq!(det.model().len(), 2);
    assert_eq!(det.model().output_shape(), Some((4, 4, 6)));

    let result = fig_detect::run_detection(&mut det, &red_quadrant_image(), 0.5).unwrap();
    assert_eq!(result.len(), 4);

    let mut centers: Vec<(f32, f32)> = result.iter().map(|d| (d.xc, d.yc)).collect();
    centers.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let expected = [(0.125, 0.125), (0.125, 0.375), (0.375, 0.125), (0.375, 0.375)];
    for ((x, y), (ex, ey)) in centers.iter().zip(expected) {
        assert!((x - ex).abs() < 1e-6 && (y - ey).abs() < 1e-6, "({x}, {y})");
    }

    for d in &result {
        assert!(d.confidence > 0.99);
        assert!((d.width - 0.04).abs() < 1e-6);
        assert!((d.height - 0.04).abs() < 1e-6);
    }
    assert!(result.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn no_detections() {
    let mut det = detector("no_detections");
    let blank = DynamicImage::ImageRgb8(RgbImage::new(32, 32));

    for _ in 0..3 {
        let result = fig_detect::run_detection(&mut det, &blank, 0.5).unwrap();
        assert_eq!(result.len(), 0);
    }
    assert_eq!(det.infer_time.n(), 3);
}

#[test]
fn repeated_runs_overwrite_previous_results() {
    let mut det = detector("repeated");
    let first = det.run(&red_quadrant_image(), 0.5).unwrap();
    let blank = DynamicImage::ImageRgb8(RgbImage::new(32, 32));
    let second = det.run(&blank, 0.5).unwrap();
    let third = det.run(&red_quadrant_image(), 0.5).unwrap();

    assert_eq!(first.len(), 4);
    assert!(second.is_empty());
    assert_eq!(first, third);
}

#[test]
fn missing_weights_fail_to_initialize() {
    let config = ConfigFig::new().with_weights("/nonexistent/model.fig").with_model_size(8, 8);
    let err = fig_detect::init_detector(&config).unwrap_err();
    let fig = err.downcast_ref::<fig_detect::FigError>().unwrap();
    assert!(matches!(fig, fig_detect::FigError::File { .. }));
}
