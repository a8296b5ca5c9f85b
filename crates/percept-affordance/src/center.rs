//! Center-pixel selection inside a detection bounding box.

use percept_core::{BBox, DepthMap, Real};
use serde::{Deserialize, Serialize};

/// How to pick the representative pixel of an affordance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterPolicy {
    /// Midpoint of the bounding box.
    #[default]
    Centroid,
    /// Valid pixel of minimal depth inside the box. Robust when the
    /// affordance protrudes toward the camera, e.g. a handle.
    NearestSurface,
}

/// Representative pixel `(x, y)` of `bbox` under `policy`.
///
/// Returns `None` when `NearestSurface` finds no valid depth inside the box
/// or the box lies outside the map.
pub fn compute_center_pixel(
    depth: &DepthMap,
    bbox: &BBox,
    policy: CenterPolicy,
) -> Option<(usize, usize)> {
    match policy {
        CenterPolicy::Centroid => {
            let (cx, cy) = bbox.center();
            if cx < 0.0 || cy < 0.0 {
                return None;
            }
            let (x, y) = (cx as usize, cy as usize);
            (x < depth.width && y < depth.height).then_some((x, y))
        }
        CenterPolicy::NearestSurface => {
            let x0 = bbox.xmin.max(0.0) as usize;
            let y0 = bbox.ymin.max(0.0) as usize;
            let x1 = (bbox.xmax as usize).min(depth.width.saturating_sub(1));
            let y1 = (bbox.ymax as usize).min(depth.height.saturating_sub(1));

            let mut best: Option<(usize, usize, u16)> = None;
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let Some(raw) = depth.get(x, y) else { continue };
                    if raw == 0 {
                        continue;
                    }
                    if best.is_none_or(|(_, _, b)| raw < b) {
                        best = Some((x, y, raw));
                    }
                }
            }
            best.map(|(x, y, _)| (x, y))
        }
    }
}

// Keeps the bbox-to-pixel convention in one place for the refinement path.
pub(crate) fn bbox_around(x: Real, y: Real, pad: Real) -> BBox {
    BBox::new(x - pad, y - pad, x + pad, y + pad)
}
