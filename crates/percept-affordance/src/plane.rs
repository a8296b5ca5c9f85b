//! Least-squares plane fitting.

use log::debug;
use nalgebra::SymmetricEigen;
use percept_core::{Mat3, Pt3, Real, Vec3};
use serde::{Deserialize, Serialize};

use crate::estimator::AffordanceError;

/// Configuration for [`fit_plane`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PlaneFitConfig {
    /// Points farther than this (metres) from the first-pass plane are
    /// dropped before the refit.
    pub distance_threshold: Real,
    /// Minimal number of points required for a fit.
    pub min_points: usize,
}

impl Default for PlaneFitConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 0.04,
            min_points: 10,
        }
    }
}

fn eigen_normal(points: &[Pt3]) -> Result<(Pt3, Vec3), AffordanceError> {
    let n = points.len() as Real;
    let mut centroid = Vec3::zeros();
    for p in points {
        centroid += p.coords;
    }
    centroid /= n;

    let mut cov = Mat3::zeros();
    for p in points {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(cov);
    let mut min_idx = 0;
    let mut mid = Real::MAX;
    for i in 0..3 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    for i in 0..3 {
        if i != min_idx {
            mid = mid.min(eigen.eigenvalues[i]);
        }
    }
    // All points (near) collinear: the plane orientation is unconstrained.
    if mid <= 1e-12 * n {
        return Err(AffordanceError::DegeneratePlane);
    }

    let normal = eigen.eigenvectors.column(min_idx).normalize();
    Ok((Pt3::from(centroid), normal))
}

/// Fit a plane to `points` and return `(centroid, unit normal)`.
///
/// Two passes: an eigen fit over all points, then a refit over the inliers
/// within `distance_threshold` of the first plane. The normal's sign is
/// arbitrary; callers orient it against a viewpoint.
pub fn fit_plane(points: &[Pt3], config: &PlaneFitConfig) -> Result<(Pt3, Vec3), AffordanceError> {
    if points.len() < config.min_points {
        return Err(AffordanceError::TooFewPoints {
            found: points.len(),
            needed: config.min_points,
        });
    }

    let (centroid, normal) = eigen_normal(points)?;

    let inliers: Vec<Pt3> = points
        .iter()
        .filter(|p| (p.coords - centroid.coords).dot(&normal).abs() <= config.distance_threshold)
        .copied()
        .collect();
    if inliers.len() < config.min_points {
        return Err(AffordanceError::TooFewPoints {
            found: inliers.len(),
            needed: config.min_points,
        });
    }
    debug!(
        "plane fit kept {}/{} inliers within {} m",
        inliers.len(),
        points.len(),
        config.distance_threshold
    );

    eigen_normal(&inliers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_on_plane(normal: Vec3, offset: Real) -> Vec<Pt3> {
        // Orthonormal in-plane basis.
        let n = normal.normalize();
        let seed = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
        let u = n.cross(&seed).normalize();
        let v = n.cross(&u);

        let mut points = Vec::new();
        for i in -5i32..=5 {
            for j in -5i32..=5 {
                let p = n * offset + u * (i as Real * 0.05) + v * (j as Real * 0.05);
                points.push(Pt3::from(p));
            }
        }
        points
    }

    #[test]
    fn recovers_tilted_plane_normal() {
        let normal = Vec3::new(1.0, 0.5, -0.25).normalize();
        let points = grid_on_plane(normal, 1.3);
        let (centroid, fitted) = fit_plane(&points, &PlaneFitConfig::default()).unwrap();
        assert_relative_eq!(fitted.dot(&normal).abs(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(centroid.coords.dot(&normal), 1.3, epsilon = 1e-9);
    }

    #[test]
    fn refit_ignores_off_plane_outliers() {
        let normal = Vec3::z();
        let mut points = grid_on_plane(normal, 0.0);
        for i in 0..8 {
            points.push(Pt3::new(0.01 * i as Real, 0.0, 0.5 + 0.1 * i as Real));
        }
        let (_, fitted) = fit_plane(&points, &PlaneFitConfig::default()).unwrap();
        assert_relative_eq!(fitted.dot(&normal).abs(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn too_few_points_is_an_error() {
        let points = vec![Pt3::origin(); 3];
        let err = fit_plane(&points, &PlaneFitConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            AffordanceError::TooFewPoints { found: 3, needed: 10 }
        ));
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let points: Vec<Pt3> = (0..20)
            .map(|i| Pt3::new(i as Real * 0.01, 0.0, 0.0))
            .collect();
        let err = fit_plane(&points, &PlaneFitConfig::default()).unwrap_err();
        assert!(matches!(err, AffordanceError::DegeneratePlane));
    }
}
