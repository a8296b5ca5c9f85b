//! Core types for the spatial-perception pipeline.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete sensor client or 2D detector; captures and
//! detections arrive as plain values from external collaborators.

mod camera;
mod cloud;
mod detection;
mod frames;
mod logger;
mod math;
mod pose;

pub use camera::{
    CameraIntrinsics, CaptureError, ColorCapture, DepthCapture, DepthInterpolation, DepthMap,
    GrayImage, SensorMeta,
};
pub use cloud::PointCloud;
pub use detection::{BBox, Detection};
pub use frames::{FrameError, FrameRegistry, BODY_FRAME, ODOM_FRAME};
pub use logger::init_with_level;
pub use math::{from_homogeneous, to_homogeneous, Iso3, Mat3, Mat4, Pt2, Pt3, Real, Vec2, Vec3};
pub use pose::{average_poses, Pose3D};
