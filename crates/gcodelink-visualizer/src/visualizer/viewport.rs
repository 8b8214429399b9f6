//! Shared viewport helpers for 2D toolpath drawing.

use gcodelink_core::Position;
use serde::{Deserialize, Serialize};

/// Fraction of the span added on each side of a toolpath.
pub const BOUNDS_PADDING: f64 = 0.1;

/// Span used for an axis whose extent is zero.
pub const FALLBACK_SPAN: f64 = 10.0;

/// Final XY bounds of a toolpath in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for PathBounds {
    /// The 100 mm square shown when there is nothing to draw
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 100.0,
            min_y: 0.0,
            max_y: 100.0,
        }
    }
}

impl PathBounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, pos: &Position) -> bool {
        pos.x >= self.min_x && pos.x <= self.max_x && pos.y >= self.min_y && pos.y <= self.max_y
    }

    /// Grow to cover `pos`
    pub fn including(self, pos: &Position) -> Self {
        Self {
            min_x: self.min_x.min(pos.x),
            max_x: self.max_x.max(pos.x),
            min_y: self.min_y.min(pos.y),
            max_y: self.max_y.max(pos.y),
        }
    }
}

/// Bounding box accumulator used while walking toolpaths.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new()
    }
}

impl Bounds {
    pub fn new() -> Self {
        Self {
            min_x: f64::MAX,
            max_x: f64::MIN,
            min_y: f64::MAX,
            max_y: f64::MIN,
        }
    }

    pub fn update(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.max_x.is_finite()
            && self.min_y.is_finite()
            && self.max_y.is_finite()
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Pad each axis by `padding_factor` of its span
    ///
    /// A zero span is padded as if it were [`FALLBACK_SPAN`] wide. An empty
    /// accumulator yields the default 100 mm square.
    pub fn finalize_with_padding(self, padding_factor: f64) -> PathBounds {
        if !self.is_valid() {
            return PathBounds::default();
        }

        let span = |min: f64, max: f64| {
            let span = max - min;
            if span > 0.0 {
                span
            } else {
                FALLBACK_SPAN
            }
        };
        let padding_x = span(self.min_x, self.max_x) * padding_factor;
        let padding_y = span(self.min_y, self.max_y) * padding_factor;

        PathBounds {
            min_x: self.min_x - padding_x,
            max_x: self.max_x + padding_x,
            min_y: self.min_y - padding_y,
            max_y: self.max_y + padding_y,
        }
    }
}

/// Maps world XY onto a square canvas, Y growing downwards
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenMapping {
    bounds: PathBounds,
    canvas: f64,
    padding: f64,
    scale: f64,
}

impl ScreenMapping {
    /// Fit `bounds` into a `canvas` x `canvas` area with `padding` pixels on each side
    pub fn new(bounds: PathBounds, canvas: f64, padding: f64) -> Self {
        let usable = (canvas - 2.0 * padding).max(1.0);
        let extent = bounds.width().max(bounds.height());
        let scale = if extent > 0.0 { usable / extent } else { 1.0 };
        Self {
            bounds,
            canvas,
            padding,
            scale,
        }
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn to_screen(&self, pos: &Position) -> (f64, f64) {
        let x = self.padding + (pos.x - self.bounds.min_x) * self.scale;
        let y = self.canvas - self.padding - (pos.y - self.bounds.min_y) * self.scale;
        (x, y)
    }

    pub fn to_world(&self, x: f64, y: f64) -> (f64, f64) {
        let wx = (x - self.padding) / self.scale + self.bounds.min_x;
        let wy = (self.canvas - self.padding - y) / self.scale + self.bounds.min_y;
        (wx, wy)
    }
}
