//! Point-to-point ICP alignment.
//!
//! Refines a coarse pose estimate by aligning a live cloud to a stored
//! reference cloud. The moving cloud must already be coarsely aligned
//! (within the correspondence capture radius); ICP only converges locally,
//! which is why fiducial localization always precedes it.

use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use percept_core::{Iso3, Mat3, PointCloud, Pt3, Real, Vec3};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum AlignError {
    #[error("icp did not converge within {0} iterations")]
    NotConverged(usize),
    #[error("{found} correspondences within threshold, need at least {needed}")]
    TooFewCorrespondences { found: usize, needed: usize },
    #[error("cannot align an empty point cloud")]
    EmptyCloud,
    #[error("rigid fit failed: {0}")]
    FitFailed(&'static str),
}

/// Configuration for ICP.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IcpConfig {
    /// Maximum number of ICP iterations.
    pub max_iterations: usize,
    /// Correspondences farther than this (metres) are discarded, for
    /// robustness against partial overlap.
    pub distance_threshold: Real,
    /// Convergence criterion: stop once the incremental motion (translation
    /// norm plus rotation angle) of one iteration drops below this.
    pub convergence_epsilon: Real,
    /// Minimal number of surviving correspondences per iteration.
    pub min_correspondences: usize,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            distance_threshold: 0.10,
            convergence_epsilon: 1e-6,
            min_correspondences: 10,
        }
    }
}

/// Least-squares rigid transform mapping `src` points onto `dst` points
/// (Kabsch: SVD rotation alignment, then translation).
fn rigid_fit(src: &[Pt3], dst: &[Pt3]) -> Result<Iso3, AlignError> {
    let n = src.len() as Real;
    let mut c_src = Vec3::zeros();
    let mut c_dst = Vec3::zeros();
    for (s, d) in src.iter().zip(dst) {
        c_src += s.coords;
        c_dst += d.coords;
    }
    c_src /= n;
    c_dst /= n;

    let mut h = Mat3::zeros();
    for (s, d) in src.iter().zip(dst) {
        h += (d.coords - c_dst) * (s.coords - c_src).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(AlignError::FitFailed("svd"))?;
    let v_t = svd.v_t.ok_or(AlignError::FitFailed("svd"))?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }

    let t = c_dst - r * c_src;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

/// Align `moving` to `reference` and return the accumulated transform
/// mapping `moving`'s frame into `reference`'s frame.
///
/// Each iteration finds nearest-point correspondences in the reference
/// (discarding pairs beyond `distance_threshold`), fits the least-squares
/// rigid transform, and applies it. Exhausting `max_iterations` without
/// meeting the convergence criterion is an error: an unverified transform is
/// never returned.
pub fn align(
    reference: &PointCloud,
    moving: &PointCloud,
    config: &IcpConfig,
) -> Result<Iso3, AlignError> {
    if reference.is_empty() || moving.is_empty() {
        return Err(AlignError::EmptyCloud);
    }

    let coords: Vec<[Real; 3]> = reference.points.iter().map(|p| [p.x, p.y, p.z]).collect();
    let tree: KdTree<Real, 3> = (&coords).into();
    let threshold_sq = config.distance_threshold * config.distance_threshold;

    let mut current: Vec<Pt3> = moving.points.clone();
    let mut total = Iso3::identity();

    for iteration in 0..config.max_iterations {
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for p in &current {
            let nearest = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
            if nearest.distance <= threshold_sq {
                src.push(*p);
                dst.push(reference.points[nearest.item as usize]);
            }
        }
        if src.len() < config.min_correspondences {
            return Err(AlignError::TooFewCorrespondences {
                found: src.len(),
                needed: config.min_correspondences,
            });
        }

        let delta = rigid_fit(&src, &dst)?;
        for p in &mut current {
            *p = delta * *p;
        }
        total = delta * total;

        let motion = delta.translation.vector.norm() + delta.rotation.angle();
        if motion < config.convergence_epsilon {
            debug!(
                "icp converged after {} iterations ({} correspondences)",
                iteration + 1,
                src.len()
            );
            return Ok(total);
        }
    }

    Err(AlignError::NotConverged(config.max_iterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic scattered cloud with full 3D structure.
    fn structured_cloud(n: usize) -> PointCloud {
        let mut points = Vec::with_capacity(n);
        let mut state = 0x2545f4914f6cdd1du64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as Real / (1u64 << 53) as Real
        };
        for _ in 0..n {
            points.push(Pt3::new(
                next() * 2.0 - 1.0,
                next() * 2.0 - 1.0,
                next() * 2.0 - 1.0,
            ));
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn self_alignment_is_identity() {
        let cloud = structured_cloud(200);
        let t = align(&cloud, &cloud, &IcpConfig::default()).unwrap();
        assert_relative_eq!(t.translation.vector.norm(), 0.0, epsilon = 1e-3);
        assert_relative_eq!(t.rotation.angle(), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn recovers_small_offset() {
        let reference = structured_cloud(300);
        let offset = Iso3::from_parts(
            Translation3::new(0.04, -0.03, 0.02),
            UnitQuaternion::from_euler_angles(0.02, -0.01, 0.03),
        );
        let moving = reference.transformed(&offset);

        let recovered = align(&reference, &moving, &IcpConfig::default()).unwrap();
        let expected = offset.inverse();
        assert_relative_eq!(
            recovered.translation.vector,
            expected.translation.vector,
            epsilon = 1e-3
        );
        assert_relative_eq!(
            recovered.rotation.angle_to(&expected.rotation),
            0.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn disjoint_clouds_have_too_few_correspondences() {
        let reference = structured_cloud(100);
        let far = Iso3::from_parts(
            Translation3::new(100.0, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let moving = reference.transformed(&far);
        let err = align(&reference, &moving, &IcpConfig::default()).unwrap_err();
        assert!(matches!(err, AlignError::TooFewCorrespondences { .. }));
    }

    #[test]
    fn exhausted_iterations_report_not_converged() {
        let reference = structured_cloud(100);
        let config = IcpConfig {
            max_iterations: 2,
            convergence_epsilon: 0.0, // unreachable on purpose
            ..IcpConfig::default()
        };
        let err = align(&reference, &reference.clone(), &config).unwrap_err();
        assert!(matches!(err, AlignError::NotConverged(2)));
    }

    #[test]
    fn empty_cloud_is_rejected() {
        let cloud = structured_cloud(10);
        assert!(matches!(
            align(&cloud, &PointCloud::new(), &IcpConfig::default()),
            Err(AlignError::EmptyCloud)
        ));
    }
}
