//! 3D affordance pose from a 2D detection plus depth.

use log::debug;
use percept_cloud::{fuse_in_body, FuseError};
use percept_core::{
    BBox, CaptureError, DepthCapture, DepthInterpolation, FrameError, FrameRegistry, Pose3D, Real,
    Vec2, Vec3,
};
use serde::{Deserialize, Serialize};

use crate::center::{compute_center_pixel, CenterPolicy};
use crate::plane::{fit_plane, PlaneFitConfig};
use crate::project::{frame_tform_camera, pixel_to_frame};

#[derive(thiserror::Error, Debug)]
pub enum AffordanceError {
    #[error("no valid depth near pixel ({x:.1}, {y:.1})")]
    NoValidDepth { x: Real, y: Real },
    #[error("bounding box holds no usable center pixel")]
    NoCenterPixel,
    #[error("no panel points between the inner and outer regions")]
    NoPanelPoints,
    #[error("{found} points for a plane fit, need at least {needed}")]
    TooFewPoints { found: usize, needed: usize },
    #[error("panel points are near-collinear, plane orientation unconstrained")]
    DegeneratePlane,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Fuse(#[from] FuseError),
}

/// Configuration for [`estimate_pose`].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EstimateConfig {
    pub center_policy: CenterPolicy,
    pub plane: PlaneFitConfig,
    pub interpolation: DepthInterpolation,
}

/// Unit normal of the panel surrounding a detection, oriented away from
/// the viewpoint at `body_position`.
///
/// The panel is sampled from depth pixels whose projection falls inside
/// `outer` but outside `inner`, so the affordance itself (which may
/// protrude) never biases the fit.
pub(crate) fn panel_normal(
    inner: &BBox,
    outer: &BBox,
    capture: &DepthCapture,
    target_frame: Option<&str>,
    registry: &FrameRegistry,
    body_position: &Vec3,
    config: &PlaneFitConfig,
) -> Result<Vec3, AffordanceError> {
    let frame_tform_camera = frame_tform_camera(capture, target_frame, registry)?;
    let frame_tform_body = frame_tform_camera * capture.meta.body_tform_camera.inverse();
    let camera_tform_frame = frame_tform_camera.inverse();

    let cloud = fuse_in_body(std::slice::from_ref(capture))?.transformed(&frame_tform_body);
    let surround: Vec<_> = cloud
        .points
        .into_iter()
        .filter(|p| {
            capture
                .meta
                .intrinsics
                .project(&(camera_tform_frame * p))
                .is_some_and(|px| outer.contains(px.x, px.y) && !inner.contains(px.x, px.y))
        })
        .collect();
    if surround.is_empty() {
        return Err(AffordanceError::NoPanelPoints);
    }
    debug!("panel fit over {} surround points", surround.len());

    let (centroid, mut normal) = fit_plane(&surround, config)?;
    if (centroid.coords - body_position).dot(&normal) < 0.0 {
        normal = -normal;
    }
    Ok(normal)
}

/// Estimate the 3D pose of a detected affordance.
///
/// The position is the detection's representative pixel unprojected into
/// `target_frame` (`None` for the camera frame). The orientation points
/// the pose's forward axis along the surrounding panel's normal, oriented
/// away from `body_position` so that it doubles as the pressing/pushing
/// direction. `body_position` must be expressed in the same frame.
pub fn estimate_pose(
    inner: &BBox,
    outer: &BBox,
    capture: &DepthCapture,
    target_frame: Option<&str>,
    registry: &FrameRegistry,
    body_position: &Vec3,
    config: &EstimateConfig,
) -> Result<Pose3D, AffordanceError> {
    capture.validate()?;

    let (cx, cy) = compute_center_pixel(&capture.depth, inner, config.center_policy)
        .ok_or(AffordanceError::NoCenterPixel)?;
    let center = pixel_to_frame(
        capture,
        Vec2::new(cx as Real, cy as Real),
        target_frame,
        registry,
        &config.interpolation,
    )?;

    let normal = panel_normal(
        inner,
        outer,
        capture,
        target_frame,
        registry,
        body_position,
        &config.plane,
    )?;
    Ok(Pose3D::from_direction(center.coords, normal))
}

/// Drop poses whose height lies outside `[min_z, max_z]`.
///
/// Heights are read off the pose positions, so the poses must be expressed
/// in a gravity-aligned frame.
pub fn filter_poses_by_height(poses: &[Pose3D], min_z: Real, max_z: Real) -> Vec<Pose3D> {
    let kept: Vec<Pose3D> = poses
        .iter()
        .filter(|p| p.position.z >= min_z && p.position.z <= max_z)
        .copied()
        .collect();
    if kept.len() < poses.len() {
        debug!(
            "height filter [{min_z}, {max_z}] dropped {} of {} poses",
            poses.len() - kept.len(),
            poses.len()
        );
    }
    kept
}
