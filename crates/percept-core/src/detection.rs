//! Detections supplied by the external 2D detector.

use serde::{Deserialize, Serialize};

use crate::math::Real;

/// Axis-aligned bounding box in pixel coordinates, `(x, y) = (column, row)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: Real,
    pub ymin: Real,
    pub xmax: Real,
    pub ymax: Real,
}

impl BBox {
    pub fn new(xmin: Real, ymin: Real, xmax: Real, ymax: Real) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn contains(&self, x: Real, y: Real) -> bool {
        self.xmin <= x && x <= self.xmax && self.ymin <= y && y <= self.ymax
    }

    pub fn center(&self) -> (Real, Real) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Grow the box by `pad` pixels on every side.
    pub fn padded(&self, pad: Real) -> BBox {
        BBox {
            xmin: self.xmin - pad,
            ymin: self.ymin - pad,
            xmax: self.xmax + pad,
            ymax: self.ymax + pad,
        }
    }
}

/// One detection from the external 2D detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: Real,
    pub label: String,
}
