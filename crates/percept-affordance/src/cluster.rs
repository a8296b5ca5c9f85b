//! Density clustering of repeated pose observations.

use log::debug;
use percept_core::{average_poses, Pose3D, Real};
use serde::{Deserialize, Serialize};

/// Configuration for [`cluster_poses`] (DBSCAN over pose positions).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Neighbourhood radius in metres.
    pub eps: Real,
    /// Minimal neighbourhood size (the point itself included) for a core
    /// point. Observations that never reach this density are noise.
    pub min_samples: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: 0.1,
            min_samples: 2,
        }
    }
}

const UNVISITED: usize = usize::MAX;
const NOISE: usize = usize::MAX - 1;

fn neighbours(poses: &[Pose3D], i: usize, eps: Real) -> Vec<usize> {
    (0..poses.len())
        .filter(|&j| poses[i].distance_to(&poses[j]) <= eps)
        .collect()
}

/// Consolidate repeated observations of the same affordances.
///
/// Positions are clustered with DBSCAN; each cluster is reduced to one
/// representative pose by [`average_poses`]. Observations labelled noise
/// are dropped, which is the point: a spurious detection seen once does
/// not survive clustering. Representatives come out in order of cluster
/// discovery.
pub fn cluster_poses(poses: &[Pose3D], config: &ClusterConfig) -> Vec<Pose3D> {
    let mut labels = vec![UNVISITED; poses.len()];
    let mut n_clusters = 0;

    for i in 0..poses.len() {
        if labels[i] != UNVISITED {
            continue;
        }
        let seeds = neighbours(poses, i, config.eps);
        if seeds.len() < config.min_samples {
            labels[i] = NOISE;
            continue;
        }

        let cluster = n_clusters;
        n_clusters += 1;
        labels[i] = cluster;

        let mut queue = seeds;
        while let Some(j) = queue.pop() {
            if labels[j] == NOISE {
                labels[j] = cluster; // border point
            }
            if labels[j] != UNVISITED {
                continue;
            }
            labels[j] = cluster;
            let reach = neighbours(poses, j, config.eps);
            if reach.len() >= config.min_samples {
                queue.extend(reach);
            }
        }
    }

    let noise = labels.iter().filter(|&&l| l == NOISE).count();
    debug!(
        "clustered {} poses into {} clusters, {} noise",
        poses.len(),
        n_clusters,
        noise
    );

    (0..n_clusters)
        .filter_map(|c| {
            let members: Vec<Pose3D> = poses
                .iter()
                .zip(&labels)
                .filter(|(_, &l)| l == c)
                .map(|(p, _)| *p)
                .collect();
            average_poses(&members)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use percept_core::Vec3;

    fn at(x: Real, y: Real, z: Real) -> Pose3D {
        Pose3D::new(Vec3::new(x, y, z), UnitQuaternion::identity())
    }

    #[test]
    fn nearby_observations_merge_and_noise_is_dropped() {
        let poses = [
            at(1.0, 0.0, 0.5),
            at(1.02, 0.0, 0.5),
            at(5.0, 5.0, 0.5), // lone spurious detection
        ];
        let reps = cluster_poses(&poses, &ClusterConfig::default());
        assert_eq!(reps.len(), 1);
        assert_relative_eq!(reps[0].position, Vec3::new(1.01, 0.0, 0.5), epsilon = 1e-12);
    }

    #[test]
    fn separated_groups_stay_separate() {
        let poses = [
            at(0.0, 0.0, 0.0),
            at(0.05, 0.0, 0.0),
            at(2.0, 0.0, 0.0),
            at(2.05, 0.0, 0.0),
            at(2.02, 0.03, 0.0),
        ];
        let reps = cluster_poses(&poses, &ClusterConfig::default());
        assert_eq!(reps.len(), 2);
        assert!(reps[0].position.x < 1.0);
        assert!(reps[1].position.x > 1.0);
    }

    #[test]
    fn chained_neighbours_form_one_cluster() {
        // Pairwise gaps below eps, endpoints far apart.
        let poses: Vec<Pose3D> = (0..6).map(|i| at(0.08 * i as Real, 0.0, 0.0)).collect();
        let reps = cluster_poses(&poses, &ClusterConfig::default());
        assert_eq!(reps.len(), 1);
    }

    #[test]
    fn empty_input_gives_no_clusters() {
        assert!(cluster_poses(&[], &ClusterConfig::default()).is_empty());
    }
}
