//! Localization against a pre-scanned reference map.
//!
//! The map frame is anchored by a fiducial tag: the reference cloud is
//! expressed relative to the tag as scanned. Initial localization solves the
//! tag pose, predicts the live cloud in the tag frame and lets ICP close the
//! remaining gap; relocalization skips the tag and seeds ICP from the
//! current (possibly drifted) frame estimate instead.

use std::path::PathBuf;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use percept_cloud::{align, fuse_in_body, read_ply, AlignError, FuseError, IcpConfig, PlyError};
use percept_core::{
    ColorCapture, DepthCapture, FrameError, FrameRegistry, Iso3, Pt3, BODY_FRAME,
};
use percept_fiducial::{detect_best, FiducialConfig, FiducialError, TagDetector};

/// Failure reported by the sensing collaborator.
#[derive(thiserror::Error, Debug)]
#[error("sensing failed: {0}")]
pub struct SensorError(pub String);

#[derive(thiserror::Error, Debug)]
pub enum LocalizeError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Fiducial(#[from] FiducialError),
    #[error(transparent)]
    Fuse(#[from] FuseError),
    #[error(transparent)]
    Ply(#[from] PlyError),
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("frame '{0}' is not registered; run initial localization first")]
    NotLocalized(String),
}

/// Hardware seam: everything the workflows need from the robot.
///
/// Implementations own the camera and odometry clients; the workflows never
/// touch hardware directly, which keeps them testable against mocks.
pub trait Sensing {
    /// Grayscale captures from all cameras.
    fn color_views(&mut self) -> Result<Vec<ColorCapture>, SensorError>;

    /// Depth captures from all cameras.
    fn depth_views(&mut self) -> Result<Vec<DepthCapture>, SensorError>;

    /// Aim the articulated sensor at a body-frame point and capture one
    /// framed color/depth pair from that vantage.
    fn gaze_capture(&mut self, target: &Pt3)
        -> Result<(ColorCapture, DepthCapture), SensorError>;

    /// Current body pose in odometry.
    fn odom_tform_body(&mut self) -> Result<Iso3, SensorError>;
}

/// Configuration for [`localize`] and [`relocalize`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalizeConfig {
    /// Name the map frame is registered under.
    pub frame_name: String,
    /// Pre-scanned reference cloud (ascii PLY), expressed in the map frame.
    pub reference_path: PathBuf,
    pub fiducial: FiducialConfig,
    pub icp: IcpConfig,
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            frame_name: "map".into(),
            reference_path: "scene.ply".into(),
            fiducial: FiducialConfig::default(),
            icp: IcpConfig::default(),
        }
    }
}

/// Initial localization.
///
/// Detects the fiducial across all views, aims the articulated sensor at
/// the predicted tag position for a better-framed second detection, fuses a
/// surrounding cloud, predicts it in the tag frame and aligns it via ICP
/// against the reference cloud. On success the body frame and the map frame
/// are registered (`overwrite = false` for the map: localizing twice into
/// the same session is a caller bug) and `odom_tform_map` is returned.
///
/// Every failure is fatal here; an unverified map frame is never registered.
pub fn localize(
    sensing: &mut dyn Sensing,
    detector: &dyn TagDetector,
    registry: &FrameRegistry,
    config: &LocalizeConfig,
) -> Result<Iso3, LocalizeError> {
    let color = sensing.color_views()?;
    let depth = sensing.depth_views()?;
    let coarse = detect_best(detector, &color, &depth, &config.fiducial)?;

    // Second, better-framed detection from the predicted tag position.
    let target: Pt3 = coarse.inverse().translation.vector.into();
    debug!(
        "gazing at predicted tag position ({:.2}, {:.2}, {:.2})",
        target.x, target.y, target.z
    );
    let (gaze_color, gaze_depth) = sensing.gaze_capture(&target)?;
    let fiducial_tform_body = detect_best(
        detector,
        std::slice::from_ref(&gaze_color),
        std::slice::from_ref(&gaze_depth),
        &config.fiducial,
    )?;

    let live = fuse_in_body(&sensing.depth_views()?)?;
    let prediction = live.transformed(&fiducial_tform_body);
    let reference = read_ply(&config.reference_path)?;
    debug!(
        "aligning {} live points against {} reference points",
        prediction.len(),
        reference.len()
    );
    let correction = align(&reference, &prediction, &config.icp)?;

    let map_tform_body = correction * fiducial_tform_body;
    let odom_tform_body = sensing.odom_tform_body()?;
    let odom_tform_map = odom_tform_body * map_tform_body.inverse();

    registry.add_frame(BODY_FRAME, odom_tform_body, true)?;
    registry.add_frame(&config.frame_name, odom_tform_map, false)?;
    info!("registered frame '{}' from fiducial + icp", config.frame_name);
    Ok(odom_tform_map)
}

/// Relocalization against an already-registered map frame.
///
/// Skips the fiducial: the current frame estimate seeds ICP. On success the
/// frame is overwritten atomically and `Ok(true)` is returned. An alignment
/// failure is non-fatal: the previous transform stays untouched and the
/// outcome is `Ok(false)` — a drifted-but-verified frame beats an
/// unverified correction. Sensing and I/O failures remain errors.
pub fn relocalize(
    sensing: &mut dyn Sensing,
    registry: &FrameRegistry,
    config: &LocalizeConfig,
) -> Result<bool, LocalizeError> {
    if !registry.contains(&config.frame_name) {
        return Err(LocalizeError::NotLocalized(config.frame_name.clone()));
    }

    let odom_tform_body = sensing.odom_tform_body()?;
    registry.add_frame(BODY_FRAME, odom_tform_body, true)?;
    let map_tform_body = registry.lookup(BODY_FRAME, &config.frame_name)?;

    let live = fuse_in_body(&sensing.depth_views()?)?;
    let prediction = live.transformed(&map_tform_body);
    let reference = read_ply(&config.reference_path)?;

    match align(&reference, &prediction, &config.icp) {
        Ok(correction) => {
            let odom_tform_map = odom_tform_body * (correction * map_tform_body).inverse();
            registry.add_frame(&config.frame_name, odom_tform_map, true)?;
            info!("frame '{}' relocalized", config.frame_name);
            Ok(true)
        }
        Err(err) => {
            warn!(
                "relocalization of '{}' failed ({err}), keeping previous estimate",
                config.frame_name
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json() {
        let config = LocalizeConfig {
            frame_name: "warehouse".into(),
            ..LocalizeConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: LocalizeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.frame_name, "warehouse");
        assert_eq!(back.reference_path, config.reference_path);
        assert_eq!(back.icp.max_iterations, config.icp.max_iterations);
    }
}
