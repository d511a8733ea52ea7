//! Anchor-grid decoding of the final model tensor.
//!
//! Every cell of the `grid_width x grid_height` output carries four box
//! regressions followed by a two-logit objectness pair. Cells below the
//! confidence threshold are dropped; the rest are ranked by confidence.
//! Overlapping boxes are all kept, there is no suppression step.

use crate::common::{Detection, FigError, Result, Tensor};

/// Width and height of the fixed anchor box, in normalized units.
pub const ANCHOR_SIZE: f32 = 0.04;
const CENTER_SCALE: f32 = 0.1;
const SIZE_SCALE: f32 = 0.2;

/// Channels each cell needs: `x, y, w, h, background logit, object logit`.
pub const CELL_CHANNELS: u32 = 6;

pub fn decode_detections(tensor: &Tensor, confidence_threshold: f32) -> Result<Vec<Detection>> {
    if tensor.channels() < CELL_CHANNELS {
        log::warn!(
            "decoder needs {} channels per cell, tensor has {}",
            CELL_CHANNELS, tensor.channels()
        );
        return Err(FigError::format(format!(
            "detection tensor has {} channels, need at least {}",
            tensor.channels(), CELL_CHANNELS
        )));
    }

    let view = tensor.view();
    let (grid_h, grid_w, _) = view.dim();
    let mut detections = Vec::new();

    for y in 0..grid_h {
        for x in 0..grid_w {
            let cell = view.slice(ndarray::s![y, x, ..]);

            // exp(c5) / (exp(c4) + exp(c5)), written so large logits cannot overflow.
            let confidence = 1.0 / (1.0 + (cell[4] - cell[5]).exp());
            if confidence.is_nan() || confidence < confidence_threshold {
                continue;
            }

            let anchor_x = (x as f32 + 0.5) / grid_w as f32;
            let anchor_y = (y as f32 + 0.5) / grid_h as f32;

            detections.push(Detection {
                xc: anchor_x + CENTER_SCALE * ANCHOR_SIZE * cell[0],
                yc: anchor_y + CENTER_SCALE * ANCHOR_SIZE * cell[1],
                width: ANCHOR_SIZE * (SIZE_SCALE * cell[2]).exp(),
                height: ANCHOR_SIZE * (SIZE_SCALE * cell[3]).exp(),
                confidence,
            });
        }
    }

    detections.sort_by(|d1, d2| d2.confidence.total_cmp(&d1.confidence));
    log::trace!("decoded {} detections from a {}x{} grid", detections.len(), grid_w, grid_h);

    Ok(detections)
}
