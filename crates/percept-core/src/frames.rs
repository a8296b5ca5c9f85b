//! Named coordinate frames.
//!
//! Every registered frame stores its rigid transform relative to a fixed
//! root frame (`root_tform_frame`), so any two frames compose transitively
//! through the root. The registry supports concurrent readers against a
//! single writer; an overwrite replaces the transform atomically, so a
//! concurrent `lookup` sees either the old or the new value, never a mix.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use log::debug;

use crate::math::{Iso3, Vec3};

/// Fixed root frame the robot's odometry is expressed in.
pub const ODOM_FRAME: &str = "odom";
/// Robot body frame. Registered per localization pass from the current
/// odometry estimate.
pub const BODY_FRAME: &str = "body";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame '{0}' is already registered")]
    FrameExists(String),
    #[error("unknown frame '{0}'")]
    UnknownFrame(String),
}

/// Registry of named frames relative to a fixed root.
///
/// The root frame itself is always registered with the identity transform.
pub struct FrameRegistry {
    root: String,
    frames: RwLock<HashMap<String, Iso3>>,
}

impl FrameRegistry {
    /// Registry whose root frame is [`ODOM_FRAME`].
    pub fn new() -> Self {
        Self::with_root(ODOM_FRAME)
    }

    pub fn with_root(root: &str) -> Self {
        let mut frames = HashMap::new();
        frames.insert(root.to_owned(), Iso3::identity());
        Self {
            root: root.to_owned(),
            frames: RwLock::new(frames),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Register `root_tform_frame` under `name`.
    ///
    /// Fails with [`FrameError::FrameExists`] when the name is taken and
    /// `overwrite` is false. The replacement is all-or-nothing.
    pub fn add_frame(
        &self,
        name: &str,
        root_tform_frame: Iso3,
        overwrite: bool,
    ) -> Result<(), FrameError> {
        let mut frames = self
            .frames
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if frames.contains_key(name) && !overwrite {
            return Err(FrameError::FrameExists(name.to_owned()));
        }
        debug!("registering frame '{name}' (overwrite={overwrite})");
        frames.insert(name.to_owned(), root_tform_frame);
        Ok(())
    }

    /// Transform mapping `from`-frame coordinates into `to`-frame
    /// coordinates: `to_tform_from = inv(root_tform_to) * root_tform_from`.
    pub fn lookup(&self, from: &str, to: &str) -> Result<Iso3, FrameError> {
        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        let root_tform_from = frames
            .get(from)
            .ok_or_else(|| FrameError::UnknownFrame(from.to_owned()))?;
        let root_tform_to = frames
            .get(to)
            .ok_or_else(|| FrameError::UnknownFrame(to.to_owned()))?;
        Ok(root_tform_to.inverse() * root_tform_from)
    }

    /// Root-relative transform of a single frame.
    pub fn resolve(&self, name: &str) -> Result<Iso3, FrameError> {
        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        frames
            .get(name)
            .copied()
            .ok_or_else(|| FrameError::UnknownFrame(name.to_owned()))
    }

    /// Position of the robot body origin expressed in `frame`.
    ///
    /// Convenience for viewpoint-dependent computations such as orienting
    /// a surface normal toward or away from the robot.
    pub fn body_position_in(&self, frame: &str) -> Result<Vec3, FrameError> {
        Ok(self.lookup(BODY_FRAME, frame)?.translation.vector)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::new()
    }
}
