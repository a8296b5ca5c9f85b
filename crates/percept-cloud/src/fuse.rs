//! Multi-camera depth fusion.

use log::debug;
use percept_core::{
    CaptureError, DepthCapture, FrameError, FrameRegistry, Iso3, PointCloud, BODY_FRAME,
};

#[derive(thiserror::Error, Debug)]
pub enum FuseError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Unproject every valid pixel of one capture into the frame given by
/// `frame_tform_camera`.
fn unproject_capture(capture: &DepthCapture, frame_tform_camera: &Iso3) -> PointCloud {
    let mut points = Vec::new();
    for y in 0..capture.depth.height {
        for x in 0..capture.depth.width {
            if let Some(p) = capture.unproject(x, y) {
                points.push(frame_tform_camera * p);
            }
        }
    }
    debug!(
        "unprojected {} points from '{}'",
        points.len(),
        capture.meta.source
    );
    PointCloud::from_points(points)
}

/// Fuse depth captures into a single cloud in the robot body frame.
///
/// Uses only the extrinsics stored on each capture; no registry needed.
pub fn fuse_in_body(captures: &[DepthCapture]) -> Result<PointCloud, FuseError> {
    let mut fused = PointCloud::new();
    for capture in captures {
        capture.validate()?;
        fused.extend(unproject_capture(capture, &capture.meta.body_tform_camera));
    }
    Ok(fused)
}

/// Fuse depth captures into a single cloud in `target_frame`.
///
/// Each capture's points are unprojected with its intrinsics and depth
/// scale, carried into the body frame through the capture extrinsics, then
/// into `target_frame` through the registry. Point count grows linearly
/// with capture count and resolution; callers control capture volume.
pub fn fuse(
    captures: &[DepthCapture],
    target_frame: &str,
    registry: &FrameRegistry,
) -> Result<PointCloud, FuseError> {
    let target_tform_body = registry.lookup(BODY_FRAME, target_frame)?;
    let mut fused = PointCloud::new();
    for capture in captures {
        capture.validate()?;
        let target_tform_camera = target_tform_body * capture.meta.body_tform_camera;
        fused.extend(unproject_capture(capture, &target_tform_camera));
    }
    Ok(fused)
}
