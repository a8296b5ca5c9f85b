//! High-level facade crate for the `percept-*` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying perception crates
//! - the localization/relocalization workflows that compose them into a
//!   running pipeline against a pre-scanned reference cloud
//!
//! ## Quickstart
//!
//! ```no_run
//! use percept::localize::{localize, LocalizeConfig, Sensing};
//! use percept::core::FrameRegistry;
//! use percept::fiducial::TagDetector;
//!
//! # fn run(sensing: &mut dyn Sensing, detector: &dyn TagDetector)
//! #     -> Result<(), percept::localize::LocalizeError> {
//! let registry = FrameRegistry::new();
//! let config = LocalizeConfig::default();
//! let odom_tform_map = localize(sensing, detector, &registry, &config)?;
//! println!("localized: {odom_tform_map}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `percept::core`: shared geometry (poses, frames, captures, clouds).
//! - `percept::fiducial`: tag detection interface and square-tag pose solve.
//! - `percept::cloud`: depth fusion, reference-cloud I/O, ICP alignment.
//! - `percept::affordance`: affordance poses, clustering, refinement.
//! - `percept::localize`: the composed (re)localization workflows.

pub use percept_affordance as affordance;
pub use percept_cloud as cloud;
pub use percept_core as core;
pub use percept_fiducial as fiducial;

pub mod localize;

pub use localize::{localize, relocalize, LocalizeConfig, LocalizeError, SensorError, Sensing};
