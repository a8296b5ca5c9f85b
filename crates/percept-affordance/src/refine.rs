//! Outlier-rejecting refinement of a tracked affordance pose.

use log::warn;
use percept_core::{DepthCapture, Detection, FrameRegistry, Pose3D, Pt3, Real, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::center::{bbox_around, compute_center_pixel};
use crate::estimator::{estimate_pose, panel_normal, AffordanceError, EstimateConfig};
use crate::project::{frame_to_pixel, pixel_to_frame};

/// Configuration for [`refine`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RefineConfig {
    /// A detection whose 3D center lies farther than this (metres) from the
    /// tracked pose is treated as a false positive.
    pub discard_threshold: Real,
    /// Pixel padding of the panel region sampled around the target when
    /// re-fitting orientation.
    pub surround_padding: Real,
    pub estimate: EstimateConfig,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            discard_threshold: 0.1,
            surround_padding: 40.0,
            estimate: EstimateConfig::default(),
        }
    }
}

fn detection_center(
    detection: &Detection,
    capture: &DepthCapture,
    target_frame: Option<&str>,
    registry: &FrameRegistry,
    config: &RefineConfig,
) -> Option<Pt3> {
    let (cx, cy) =
        compute_center_pixel(&capture.depth, &detection.bbox, config.estimate.center_policy)?;
    pixel_to_frame(
        capture,
        Vec2::new(cx as Real, cy as Real),
        target_frame,
        registry,
        &config.estimate.interpolation,
    )
    .map_err(|err| warn!("skipping '{}' detection: {err}", detection.label))
    .ok()
}

/// Refit the orientation of `previous` from the panel around its position,
/// keeping the position untouched.
fn reorient_in_place(
    previous: &Pose3D,
    capture: &DepthCapture,
    target_frame: Option<&str>,
    registry: &FrameRegistry,
    body_position: &Vec3,
    config: &RefineConfig,
) -> Result<Pose3D, AffordanceError> {
    let anchor = Pt3::from(previous.position);
    let Some(px) = frame_to_pixel(capture, &anchor, target_frame, registry)? else {
        warn!("tracked pose projects behind the camera, keeping previous orientation");
        return Ok(*previous);
    };
    let inner = bbox_around(px.x, px.y, 0.0);
    let outer = bbox_around(px.x, px.y, config.surround_padding);
    match panel_normal(
        &inner,
        &outer,
        capture,
        target_frame,
        registry,
        body_position,
        &config.estimate.plane,
    ) {
        Ok(normal) => Ok(Pose3D::from_direction(previous.position, normal)),
        Err(err @ AffordanceError::Frame(_)) => Err(err),
        Err(err) => {
            warn!("orientation refit failed ({err}), keeping previous orientation");
            Ok(*previous)
        }
    }
}

/// Improve a tracked pose against a fresh set of detections.
///
/// Returns the updated pose and a `discarded` flag. `discarded=true` means
/// the detections did not corroborate the tracked position this round; the
/// caller decides how many consecutive discards it tolerates.
///
/// - No detections (or none with usable depth) keeps `previous` as is.
/// - With several detections, the one whose 3D center is nearest to
///   `previous` wins, disambiguating visually similar neighbours.
/// - A winner farther than `discard_threshold` is a false positive: the
///   position is kept and only the orientation is refit from the panel
///   around it.
pub fn refine(
    detections: &[Detection],
    previous: &Pose3D,
    capture: &DepthCapture,
    target_frame: Option<&str>,
    registry: &FrameRegistry,
    body_position: &Vec3,
    config: &RefineConfig,
) -> Result<(Pose3D, bool), AffordanceError> {
    if detections.is_empty() {
        warn!("no detections this round, keeping tracked pose");
        return Ok((*previous, true));
    }
    capture.validate()?;

    let centers: Vec<(usize, Pt3)> = detections
        .iter()
        .enumerate()
        .filter_map(|(i, d)| {
            detection_center(d, capture, target_frame, registry, config).map(|c| (i, c))
        })
        .collect();
    let Some((best, center)) = centers.into_iter().min_by(|(_, a), (_, b)| {
        (a.coords - previous.position)
            .norm()
            .total_cmp(&(b.coords - previous.position).norm())
    }) else {
        warn!("no detection with usable depth this round, keeping tracked pose");
        return Ok((*previous, true));
    };

    let distance = (center.coords - previous.position).norm();
    if distance > config.discard_threshold {
        warn!(
            "nearest detection is {distance:.3} m from the tracked pose \
             (threshold {}), discarding",
            config.discard_threshold
        );
        let pose = reorient_in_place(
            previous,
            capture,
            target_frame,
            registry,
            body_position,
            config,
        )?;
        return Ok((pose, true));
    }

    let bbox = detections[best].bbox;
    let pose = estimate_pose(
        &bbox,
        &bbox.padded(config.surround_padding),
        capture,
        target_frame,
        registry,
        body_position,
        &config.estimate,
    )?;
    Ok((pose, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use percept_core::{BBox, CameraIntrinsics, DepthMap, Iso3, SensorMeta};

    fn wall_capture() -> DepthCapture {
        DepthCapture {
            depth: DepthMap {
                width: 64,
                height: 64,
                data: vec![2000u16; 64 * 64],
            },
            depth_scale: 1000.0,
            meta: SensorMeta {
                source: "hand_depth".into(),
                intrinsics: CameraIntrinsics {
                    fx: 80.0,
                    fy: 80.0,
                    cx: 32.0,
                    cy: 32.0,
                },
                body_tform_camera: Iso3::identity(),
            },
        }
    }

    fn detection(bbox: BBox) -> Detection {
        Detection {
            bbox,
            confidence: 0.9,
            label: "handle".into(),
        }
    }

    fn tracked() -> Pose3D {
        Pose3D::new(
            Vec3::new(0.0, 0.0, 2.0),
            UnitQuaternion::from_euler_angles(0.0, -0.4, 0.1),
        )
    }

    #[test]
    fn no_detections_keep_the_tracked_pose() {
        let registry = FrameRegistry::new();
        let previous = tracked();
        let (pose, discarded) = refine(
            &[],
            &previous,
            &wall_capture(),
            None,
            &registry,
            &Vec3::zeros(),
            &RefineConfig::default(),
        )
        .unwrap();
        assert!(discarded);
        assert_eq!(pose.position, previous.position);
        assert_eq!(pose.rotation, previous.rotation);
    }

    #[test]
    fn far_detection_is_discarded_and_position_preserved() {
        let registry = FrameRegistry::new();
        let previous = tracked();
        // Center pixel (58, 32) sits 0.65 m off the tracked position.
        let (pose, discarded) = refine(
            &[detection(BBox::new(54.0, 28.0, 62.0, 36.0))],
            &previous,
            &wall_capture(),
            None,
            &registry,
            &Vec3::zeros(),
            &RefineConfig::default(),
        )
        .unwrap();
        assert!(discarded);
        assert_eq!(pose.position, previous.position);
        // Orientation is refit from the wall around the tracked position.
        assert_relative_eq!(pose.forward(), Vec3::z(), epsilon = 1e-9);
    }

    #[test]
    fn nearby_detection_is_accepted_and_refit() {
        let registry = FrameRegistry::new();
        let previous = tracked();
        let (pose, discarded) = refine(
            &[detection(BBox::new(28.0, 28.0, 38.0, 38.0))],
            &previous,
            &wall_capture(),
            None,
            &registry,
            &Vec3::zeros(),
            &RefineConfig {
                surround_padding: 12.0,
                ..RefineConfig::default()
            },
        )
        .unwrap();
        assert!(!discarded);
        assert_relative_eq!(pose.position.z, 2.0, epsilon = 1e-9);
        assert_relative_eq!(pose.forward(), Vec3::z(), epsilon = 1e-9);
    }

    #[test]
    fn nearest_of_several_detections_wins() {
        let registry = FrameRegistry::new();
        let previous = tracked();
        let near = BBox::new(29.0, 29.0, 37.0, 37.0);
        let far = BBox::new(50.0, 28.0, 62.0, 36.0);
        let (pose, discarded) = refine(
            &[detection(far), detection(near)],
            &previous,
            &wall_capture(),
            None,
            &registry,
            &Vec3::zeros(),
            &RefineConfig {
                surround_padding: 12.0,
                ..RefineConfig::default()
            },
        )
        .unwrap();
        assert!(!discarded);
        assert!(pose.position.x.abs() < 0.1);
    }

    #[test]
    fn detections_without_depth_support_keep_the_tracked_pose() {
        let mut capture = wall_capture();
        capture.depth.data.fill(0);
        let registry = FrameRegistry::new();
        let previous = tracked();
        let (pose, discarded) = refine(
            &[detection(BBox::new(28.0, 28.0, 38.0, 38.0))],
            &previous,
            &capture,
            None,
            &registry,
            &Vec3::zeros(),
            &RefineConfig::default(),
        )
        .unwrap();
        assert!(discarded);
        assert_eq!(pose.position, previous.position);
    }
}
