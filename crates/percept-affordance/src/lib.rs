//! Affordance pose estimation.
//!
//! Turns 2D detections of manipulable elements (handles, switches) plus
//! depth data into 3D poses with an estimated motion axis: the normal of
//! the backing panel, signed toward the robot. Repeated observations are
//! consolidated by density clustering and refined with outlier rejection.

mod center;
mod cluster;
mod estimator;
mod plane;
mod project;
mod refine;

pub use center::{compute_center_pixel, CenterPolicy};
pub use cluster::{cluster_poses, ClusterConfig};
pub use estimator::{estimate_pose, filter_poses_by_height, AffordanceError, EstimateConfig};
pub use plane::{fit_plane, PlaneFitConfig};
pub use project::{frame_to_pixel, pixel_to_frame};
pub use refine::{refine, RefineConfig};
