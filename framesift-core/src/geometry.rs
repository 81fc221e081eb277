//! Bounding box coordinate schemes and crop geometry

use serde::{Deserialize, Serialize};

/// Axis-aligned box in absolute pixel coordinates, stored in center form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Center x
    pub cx: f32,
    /// Center y
    pub cy: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self { cx, cy, width, height }
    }

    /// Build from corner form (top-left, bottom-right).
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            cx: (x1 + x2) / 2.0,
            cy: (y1 + y2) / 2.0,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Center form `[cx, cy, w, h]`.
    pub fn xywh(&self) -> [f32; 4] {
        [self.cx, self.cy, self.width, self.height]
    }

    /// Corner form `[x1, y1, x2, y2]`.
    pub fn xyxy(&self) -> [f32; 4] {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        [self.cx - half_w, self.cy - half_h, self.cx + half_w, self.cy + half_h]
    }

    /// Center form normalized by the frame size. Returns zeros for an empty frame.
    pub fn xywhn(&self, frame_width: u32, frame_height: u32) -> [f32; 4] {
        if frame_width == 0 || frame_height == 0 {
            return [0.0; 4];
        }
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        [self.cx / fw, self.cy / fh, self.width / fw, self.height / fh]
    }

    /// Corner form normalized by the frame size. Returns zeros for an empty frame.
    pub fn xyxyn(&self, frame_width: u32, frame_height: u32) -> [f32; 4] {
        if frame_width == 0 || frame_height == 0 {
            return [0.0; 4];
        }
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let [x1, y1, x2, y2] = self.xyxy();
        [x1 / fw, y1 / fh, x2 / fw, y2 / fh]
    }

    pub fn area(&self) -> f32 {
        if self.width <= 0.0 || self.height <= 0.0 {
            0.0
        } else {
            self.width * self.height
        }
    }

    pub fn is_finite(&self) -> bool {
        self.cx.is_finite() && self.cy.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Intersection over union of two boxes, 0.0 for degenerate input.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        if !self.is_finite() || !other.is_finite() {
            return 0.0;
        }

        let [ax1, ay1, ax2, ay2] = self.xyxy();
        let [bx1, by1, bx2, by2] = other.xyxy();

        let inter_w = ax2.min(bx2) - ax1.max(bx1);
        let inter_h = ay2.min(by2) - ay1.max(by1);
        if inter_w <= 0.0 || inter_h <= 0.0 {
            return 0.0;
        }

        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }

        (inter / union).clamp(0.0, 1.0)
    }

    /// Grow the box around its center by independent width and height factors.
    pub fn expand(&self, width_factor: f32, height_factor: f32) -> Self {
        Self {
            cx: self.cx,
            cy: self.cy,
            width: self.width * width_factor,
            height: self.height * height_factor,
        }
    }

    /// Expand, clamp to the frame and snap outward to whole pixels.
    ///
    /// Returns `None` when the box is degenerate, lies entirely outside the
    /// frame, or clamps down to zero area.
    pub fn crop_region(
        &self,
        width_factor: f32,
        height_factor: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<CropRect> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        if !self.is_finite() || !width_factor.is_finite() || !height_factor.is_finite() {
            return None;
        }
        if self.width <= 0.0 || self.height <= 0.0 || width_factor <= 0.0 || height_factor <= 0.0 {
            return None;
        }

        let expanded = self.expand(width_factor, height_factor);
        let [x1, y1, x2, y2] = expanded.xyxy();

        let (x1, x2) = clamp_span(x1 as f64, x2 as f64, frame_width)?;
        let (y1, y2) = clamp_span(y1 as f64, y2 as f64, frame_height)?;

        Some(CropRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

/// Clamp `[lo, hi]` into `[0, limit]` with outward rounding. `None` if empty.
fn clamp_span(lo: f64, hi: f64, limit: u32) -> Option<(u32, u32)> {
    let limit_f = limit as f64;
    let lo = lo.max(0.0).floor();
    let hi = hi.min(limit_f).ceil().min(limit_f);
    if hi <= lo {
        return None;
    }
    Some((lo as u32, hi as u32))
}

/// Pixel rectangle inside a frame, produced by [`BoundingBox::crop_region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn x2(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn y2(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// True when the rectangle has positive area and fits inside `frame_width` x `frame_height`.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.width > 0 && self.height > 0 && self.x2() <= frame_width && self.y2() <= frame_height
    }
}
