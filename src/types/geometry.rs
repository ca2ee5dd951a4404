//! Page geometry in point units, origin at the page's top-left corner

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle with `x0 <= x1` and `y0 <= y1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    /// Builds a rectangle from two corners in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x0: x1.min(x2),
            y0: y1.min(y2),
            x1: x1.max(x2),
            y1: y1.max(y2),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// A rectangle without area (or with NaN coordinates) covers nothing.
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Overlap of two rectangles; empty when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }
}

/// One caller-supplied rectangle to redact on one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedactionZone {
    pub page_index: usize,
    pub rect: Rect,
}

impl RedactionZone {
    pub fn new(page_index: usize, rect: Rect) -> Self {
        Self { page_index, rect }
    }

    /// Clips the zone to the page rectangle. `None` when nothing is left.
    pub fn clip_to(&self, page_rect: &Rect) -> Option<Rect> {
        let clipped = self.rect.intersect(page_rect);
        if clipped.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }
}
