//! Tag detections and the external detector interface.

use percept_core::{GrayImage, Pt2, Real};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum FiducialError {
    #[error("tag {0} not detected in any view")]
    NoTagDetected(u32),
    #[error("pose solve is degenerate: {0}")]
    DegenerateSolve(&'static str),
    #[error("color and depth captures disagree: {0} color views, {1} depth views")]
    ViewCountMismatch(usize, usize),
}

/// One decoded tag in a single image.
///
/// Corner order follows the detector convention: counter-clockwise starting
/// at the corner that maps to tag-frame `(-s/2, -s/2)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TagDetection {
    pub tag_id: u32,
    pub center: Pt2,
    pub corners: [Pt2; 4],
    /// Detector-reported confidence that the tag decoded correctly.
    pub decision_margin: Real,
}

/// External tag detector collaborator.
///
/// Implementations wrap whatever detector the deployment uses; this crate
/// only consumes the detections.
pub trait TagDetector {
    fn detect(&self, image: &GrayImage) -> Vec<TagDetection>;
}
