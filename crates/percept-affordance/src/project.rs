//! Pixel/frame projection helpers.

use percept_core::{
    DepthCapture, DepthInterpolation, FrameRegistry, Iso3, Pt2, Pt3, Vec2, BODY_FRAME,
};

use crate::estimator::AffordanceError;

/// `frame_tform_camera` for a capture; `None` means the camera frame itself.
pub(crate) fn frame_tform_camera(
    capture: &DepthCapture,
    frame: Option<&str>,
    registry: &FrameRegistry,
) -> Result<Iso3, AffordanceError> {
    match frame {
        None => Ok(Iso3::identity()),
        Some(frame) => {
            let frame_tform_body = registry.lookup(BODY_FRAME, frame)?;
            Ok(frame_tform_body * capture.meta.body_tform_camera)
        }
    }
}

/// Unproject a (possibly fractional) pixel into 3D coordinates of `frame`.
///
/// Invalid depth at the pixel is interpolated from the valid neighbourhood;
/// too little support fails with [`AffordanceError::NoValidDepth`] rather
/// than fabricating a point.
pub fn pixel_to_frame(
    capture: &DepthCapture,
    px: Vec2,
    frame: Option<&str>,
    registry: &FrameRegistry,
    interpolation: &DepthInterpolation,
) -> Result<Pt3, AffordanceError> {
    let depth = capture
        .depth_at_interpolated(px, interpolation)
        .ok_or(AffordanceError::NoValidDepth { x: px.x, y: px.y })?;
    let p_camera = Pt3::from(capture.meta.intrinsics.back_project(px) * depth);
    Ok(frame_tform_camera(capture, frame, registry)? * p_camera)
}

/// Project a 3D point in `frame` back onto the capture's image plane.
///
/// Returns `None` for points at or behind the camera.
pub fn frame_to_pixel(
    capture: &DepthCapture,
    point: &Pt3,
    frame: Option<&str>,
    registry: &FrameRegistry,
) -> Result<Option<Pt2>, AffordanceError> {
    let camera_tform_frame = frame_tform_camera(capture, frame, registry)?.inverse();
    Ok(capture.meta.intrinsics.project(&(camera_tform_frame * point)))
}
