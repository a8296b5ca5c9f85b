//! Best-detection selection across camera views and body-frame conversion.

use log::{debug, warn};
use nalgebra::{Rotation3, UnitQuaternion};
use percept_core::{
    ColorCapture, DepthCapture, DepthInterpolation, Iso3, Mat3, Pt3, Real, Vec2,
};
use serde::{Deserialize, Serialize};

use crate::solve::solve_tag_pose;
use crate::types::{FiducialError, TagDetection, TagDetector};

/// Configuration for fiducial localization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FiducialConfig {
    /// Tag to localize against.
    pub tag_id: u32,
    /// Physical side length of the tag square, metres.
    pub tag_size: Real,
    /// Fixed rotation reconciling the tag-plane axis convention with the
    /// robot body convention. A hand-tuned, deployment-specific constant;
    /// treated as data, never derived.
    pub calibration_rotation: Mat3,
    /// Depth interpolation used when seeding the solve from a depth map.
    pub interpolation: DepthInterpolation,
}

impl Default for FiducialConfig {
    fn default() -> Self {
        Self {
            tag_id: 0,
            tag_size: 0.146,
            calibration_rotation: Mat3::new(
                0.0, 1.0, 0.0, //
                0.0, 0.0, -1.0, //
                -1.0, 0.0, 0.0,
            ),
            interpolation: DepthInterpolation::default(),
        }
    }
}

struct Candidate {
    view: usize,
    detection: TagDetection,
}

/// Detect the configured tag across all views and solve its pose.
///
/// All color views are scanned and the detections of `config.tag_id` are
/// ranked by decision margin globally, not per view. When color and depth
/// captures share identical resolution, the solve is seeded with the
/// unprojected center depth and a homography-derived rotation. A solve
/// failure on one candidate is logged and the next-best candidate is tried;
/// only exhaustion is fatal.
///
/// Returns `fiducial_tform_body`: the robot body pose in the tag frame.
pub fn detect_best(
    detector: &dyn TagDetector,
    color_captures: &[ColorCapture],
    depth_captures: &[DepthCapture],
    config: &FiducialConfig,
) -> Result<Iso3, FiducialError> {
    if color_captures.len() != depth_captures.len() {
        return Err(FiducialError::ViewCountMismatch(
            color_captures.len(),
            depth_captures.len(),
        ));
    }

    let same_resolution = color_captures.iter().zip(depth_captures).all(|(c, d)| {
        c.image.width == d.depth.width && c.image.height == d.depth.height
    });

    let mut candidates: Vec<Candidate> = Vec::new();
    for (view, capture) in color_captures.iter().enumerate() {
        for detection in detector.detect(&capture.image) {
            if detection.tag_id != config.tag_id {
                continue;
            }
            candidates.push(Candidate { view, detection });
        }
    }
    if candidates.is_empty() {
        return Err(FiducialError::NoTagDetected(config.tag_id));
    }
    candidates.sort_by(|a, b| {
        b.detection
            .decision_margin
            .total_cmp(&a.detection.decision_margin)
    });

    let mut last_err = FiducialError::NoTagDetected(config.tag_id);
    for candidate in &candidates {
        match solve_candidate(candidate, color_captures, depth_captures, same_resolution, config) {
            Ok(pose) => return Ok(pose),
            Err(err) => {
                warn!(
                    "tag {} solve failed in view {} (margin {:.1}): {err}",
                    config.tag_id, candidate.view, candidate.detection.decision_margin
                );
                last_err = err;
            }
        }
    }
    Err(last_err)
}

fn solve_candidate(
    candidate: &Candidate,
    color_captures: &[ColorCapture],
    depth_captures: &[DepthCapture],
    same_resolution: bool,
    config: &FiducialConfig,
) -> Result<Iso3, FiducialError> {
    let color = &color_captures[candidate.view];
    let depth = &depth_captures[candidate.view];
    let detection = &candidate.detection;
    let intrinsics = &color.meta.intrinsics;

    // Seed the solve from the depth map when the resolutions line up.
    let seed = if same_resolution {
        seed_from_depth(detection, depth, config)
    } else {
        None
    };
    debug!(
        "solving tag {} in view {} ({}), seeded: {}",
        detection.tag_id,
        candidate.view,
        color.meta.source,
        seed.is_some()
    );

    let camera_tform_tag = solve_tag_pose(
        intrinsics,
        &detection.corners,
        detection.center,
        config.tag_size,
        seed,
    )?;

    let body_tform_tag = color.meta.body_tform_camera * camera_tform_tag;
    // Reconcile the tag-plane axis convention with the body convention.
    let corrected = body_tform_tag.rotation.to_rotation_matrix().into_inner()
        * config.calibration_rotation;
    let body_tform_fiducial = Iso3::from_parts(
        body_tform_tag.translation,
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(corrected)),
    );

    Ok(body_tform_fiducial.inverse())
}

/// Initial pose guess: translation from the unprojected center depth,
/// rotation from the homography decomposition of an unseeded solve.
fn seed_from_depth(
    detection: &TagDetection,
    depth: &DepthCapture,
    config: &FiducialConfig,
) -> Option<Iso3> {
    let center_px = Vec2::new(detection.center.x, detection.center.y);
    let d = depth.depth_at_interpolated(center_px, &config.interpolation)?;
    let center_3d: Pt3 = Pt3::from(depth.meta.intrinsics.back_project(center_px) * d);

    let unseeded = solve_tag_pose(
        &depth.meta.intrinsics,
        &detection.corners,
        detection.center,
        config.tag_size,
        None,
    )
    .ok()?;

    Some(Iso3::from_parts(center_3d.coords.into(), unseeded.rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solve::tag_object_points;
    use approx::assert_relative_eq;
    use percept_core::{CameraIntrinsics, DepthMap, GrayImage, Pt2, SensorMeta};

    struct FixedDetector {
        per_view: Vec<Vec<TagDetection>>,
        calls: std::cell::Cell<usize>,
    }

    impl TagDetector for FixedDetector {
        fn detect(&self, _image: &GrayImage) -> Vec<TagDetection> {
            let view = self.calls.get();
            self.calls.set(view + 1);
            self.per_view.get(view).cloned().unwrap_or_default()
        }
    }

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 520.0,
            fy: 520.0,
            cx: 320.0,
            cy: 240.0,
        }
    }

    fn meta(source: &str) -> SensorMeta {
        SensorMeta {
            source: source.into(),
            intrinsics: intrinsics(),
            body_tform_camera: Iso3::identity(),
        }
    }

    fn empty_views(n: usize) -> (Vec<ColorCapture>, Vec<DepthCapture>) {
        let color = (0..n)
            .map(|i| ColorCapture {
                image: GrayImage {
                    width: 640,
                    height: 480,
                    data: vec![0; 640 * 480],
                },
                meta: meta(&format!("cam{i}")),
            })
            .collect();
        let depth = (0..n)
            .map(|i| DepthCapture {
                depth: DepthMap {
                    width: 640,
                    height: 480,
                    data: vec![0; 640 * 480],
                },
                depth_scale: 1000.0,
                meta: meta(&format!("depth{i}")),
            })
            .collect();
        (color, depth)
    }

    fn detection_for_pose(pose: &Iso3, tag_id: u32, margin: Real) -> TagDetection {
        let k = intrinsics();
        let object = tag_object_points(0.146);
        let project = |p: &Pt3| {
            let pc = pose * p;
            Pt2::new(k.fx * pc.x / pc.z + k.cx, k.fy * pc.y / pc.z + k.cy)
        };
        TagDetection {
            tag_id,
            center: project(&object[4]),
            corners: [
                project(&object[0]),
                project(&object[1]),
                project(&object[2]),
                project(&object[3]),
            ],
            decision_margin: margin,
        }
    }

    #[test]
    fn no_detection_in_any_view_is_an_error() {
        let (color, depth) = empty_views(3);
        let detector = FixedDetector {
            per_view: vec![vec![], vec![], vec![]],
            calls: std::cell::Cell::new(0),
        };
        let config = FiducialConfig {
            tag_id: 7,
            ..FiducialConfig::default()
        };
        let err = detect_best(&detector, &color, &depth, &config).unwrap_err();
        assert!(matches!(err, FiducialError::NoTagDetected(7)));
    }

    #[test]
    fn picks_globally_best_margin_and_recovers_pose() {
        let truth = Iso3::from_parts(
            nalgebra::Translation3::new(0.1, 0.0, 2.0),
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
        );
        let decoy = Iso3::from_parts(
            nalgebra::Translation3::new(-0.4, 0.2, 3.0),
            UnitQuaternion::from_euler_angles(0.0, 0.1, 0.0),
        );

        let (color, depth) = empty_views(2);
        // The higher-margin detection sits in the second view.
        let detector = FixedDetector {
            per_view: vec![
                vec![detection_for_pose(&decoy, 3, 20.0)],
                vec![detection_for_pose(&truth, 3, 80.0)],
            ],
            calls: std::cell::Cell::new(0),
        };
        let config = FiducialConfig {
            tag_id: 3,
            calibration_rotation: Mat3::identity(),
            ..FiducialConfig::default()
        };

        let fiducial_tform_body = detect_best(&detector, &color, &depth, &config).unwrap();
        let expected = truth.inverse();
        assert_relative_eq!(
            fiducial_tform_body.translation.vector,
            expected.translation.vector,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            fiducial_tform_body.rotation.angle_to(&expected.rotation),
            0.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn calibration_rotation_is_applied_to_orientation_only() {
        let truth = Iso3::from_parts(
            nalgebra::Translation3::new(0.0, 0.0, 1.5),
            UnitQuaternion::identity(),
        );
        let (color, depth) = empty_views(1);
        let detector = FixedDetector {
            per_view: vec![vec![detection_for_pose(&truth, 0, 50.0)]],
            calls: std::cell::Cell::new(0),
        };
        let config = FiducialConfig::default();

        let fiducial_tform_body = detect_best(&detector, &color, &depth, &config).unwrap();
        // body_tform_fiducial keeps the solved translation.
        let body_tform_fiducial = fiducial_tform_body.inverse();
        assert_relative_eq!(
            body_tform_fiducial.translation.vector,
            truth.translation.vector,
            epsilon = 1e-6
        );
        let expected_rot = UnitQuaternion::from_rotation_matrix(
            &Rotation3::from_matrix_unchecked(config.calibration_rotation),
        );
        assert_relative_eq!(
            body_tform_fiducial.rotation.angle_to(&expected_rot),
            0.0,
            epsilon = 1e-6
        );
    }
}
