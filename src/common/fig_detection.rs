use serde::{Deserialize, Serialize};

/// One decoded box. Coordinates are normalized to the model input (0..1).
#[derive(Default, Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Detection {
    pub xc: f32,
    pub yc: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(xc: f32, yc: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            xc,
            yc,
            width,
            height,
            confidence,
        }
    }

    /// Sets the box using `(cx, cy, w, h)`.
    pub fn with_cxcy_wh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.xc = cx;
        self.yc = cy;
        self.width = w;
        self.height = h;
        self
    }

    pub fn with_confidence(mut self, conf: f32) -> Self {
        self.confidence = conf;
        self
    }

    /// Returns the minimum x-coordinate of the box.
    pub fn x_min(&self) -> f32 {
        self.xc - self.width / 2.
    }

    /// Returns the minimum y-coordinate of the box.
    pub fn y_min(&self) -> f32 {
        self.yc - self.height / 2.
    }

    /// Returns the maximum x-coordinate of the box.
    pub fn x_max(&self) -> f32 {
        self.xc + self.width / 2.
    }

    /// Returns the maximum y-coordinate of the box.
    pub fn y_max(&self) -> f32 {
        self.yc + self.height / 2.
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Returns the box coordinates as `(x1, y1, x2, y2)`.
    pub fn xy1_xy2(&self) -> (f32, f32, f32, f32) {
        (self.x_min(), self.y_min(), self.x_max(), self.y_max())
    }

    /// Top-left corner and size in pixels of an `img_width x img_height` image.
    pub fn as_xy_wh_i32(&self, img_width: u32, img_height: u32) -> (i32, i32, i32, i32) {
        let (sx, sy) = (img_width as f32, img_height as f32);
        ((self.x_min() * sx).round() as i32,
         (self.y_min() * sy).round() as i32,
         (self.width * sx).round() as i32,
         (self.height * sy).round() as i32)
    }

    pub fn print_detection(&self) {
        println!(
            "{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:e}",
            self.xc, self.yc, self.width, self.height, self.confidence
        );
    }
}
