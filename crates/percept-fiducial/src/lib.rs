//! Fiducial-marker localization.
//!
//! The 2D tag detector is an external collaborator behind the
//! [`TagDetector`] trait; this crate owns the geometry: solving the
//! camera-to-tag pose from detected corners and picking the best detection
//! across camera views.

mod localizer;
mod solve;
mod types;

pub use localizer::{detect_best, FiducialConfig};
pub use solve::{solve_tag_pose, tag_object_points};
pub use types::{FiducialError, TagDetection, TagDetector};
