//! Unordered 3D point sets.

use crate::math::{Iso3, Pt3};

/// An unordered set of 3D points, all expressed in the same frame.
///
/// The cloud itself does not know its frame; callers track that through the
/// [`FrameRegistry`](crate::FrameRegistry) names they fuse and transform with.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    pub points: Vec<Pt3>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<Pt3>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Return a copy with every point mapped through `transform`.
    pub fn transformed(&self, transform: &Iso3) -> PointCloud {
        PointCloud {
            points: self.points.iter().map(|p| transform * p).collect(),
        }
    }

    /// Apply `transform` to every point in place.
    pub fn transform(&mut self, transform: &Iso3) {
        for p in &mut self.points {
            *p = transform * *p;
        }
    }

    /// Union with another cloud (no deduplication).
    pub fn extend(&mut self, other: PointCloud) {
        self.points.extend(other.points);
    }

    /// Select the points whose mask entry is `keep`.
    ///
    /// `mask` must have one entry per point.
    pub fn select(&self, mask: &[bool], keep: bool) -> PointCloud {
        debug_assert_eq!(mask.len(), self.points.len());
        PointCloud {
            points: self
                .points
                .iter()
                .zip(mask)
                .filter(|(_, &m)| m == keep)
                .map(|(p, _)| *p)
                .collect(),
        }
    }
}
