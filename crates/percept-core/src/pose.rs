//! Rigid 3D poses.
//!
//! A [`Pose3D`] is a position plus an orientation. The orientation convention
//! follows the robot body frame: the *forward* axis is +X, so a pose built
//! with [`Pose3D::from_direction`] points its +X axis along the given
//! direction (used for affordance normals and approach directions).

use nalgebra::{Matrix4x1, Rotation3, SymmetricEigen, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::math::{Iso3, Mat3, Mat4, Pt3, Real, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose3D {
    pub position: Vec3,
    pub rotation: UnitQuaternion<Real>,
}

impl Pose3D {
    pub fn new(position: Vec3, rotation: UnitQuaternion<Real>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at `position` with identity orientation.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at `position` whose forward (+X) axis points along `direction`.
    ///
    /// The remaining axes are chosen so that +Z stays as close to world-up as
    /// the direction allows; for a near-vertical direction the +Y axis is
    /// used as the reference instead.
    pub fn from_direction(position: Vec3, direction: Vec3) -> Self {
        let x = direction.normalize();
        let up = Vec3::z();
        let reference = if x.dot(&up).abs() > 0.999 {
            Vec3::y()
        } else {
            up
        };
        let y = reference.cross(&x).normalize();
        let z = x.cross(&y);
        let rot = Mat3::from_columns(&[x, y, z]);
        Self {
            position,
            rotation: UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot)),
        }
    }

    pub fn from_iso(iso: &Iso3) -> Self {
        Self {
            position: iso.translation.vector,
            rotation: iso.rotation,
        }
    }

    pub fn to_iso(&self) -> Iso3 {
        Iso3::from_parts(Translation3::from(self.position), self.rotation)
    }

    pub fn from_matrix(m: &Mat4) -> Self {
        let rot = m.fixed_view::<3, 3>(0, 0).into_owned();
        let t = m.fixed_view::<3, 1>(0, 3).into_owned();
        Self {
            position: t,
            rotation: UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot)),
        }
    }

    pub fn as_matrix(&self) -> Mat4 {
        self.to_iso().to_homogeneous()
    }

    /// Composition `self ∘ other` (apply `other` first, then `self`).
    pub fn compose(&self, other: &Pose3D) -> Pose3D {
        Self::from_iso(&(self.to_iso() * other.to_iso()))
    }

    pub fn inverse(&self) -> Pose3D {
        Self::from_iso(&self.to_iso().inverse())
    }

    /// Map a point expressed in this pose's frame into the parent frame.
    pub fn apply(&self, p: &Pt3) -> Pt3 {
        self.to_iso() * p
    }

    /// Euclidean distance between the positions of two poses.
    pub fn distance_to(&self, other: &Pose3D) -> Real {
        (self.position - other.position).norm()
    }

    /// Forward (+X) axis of this pose's orientation.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::x()
    }
}

/// Average a set of poses.
///
/// Positions are averaged arithmetically. Orientations are averaged as the
/// dominant eigenvector of the sum of quaternion outer products (Markley
/// averaging), with each quaternion sign-aligned to the first member so that
/// antipodal representations do not cancel. Returns `None` for an empty set.
pub fn average_poses(poses: &[Pose3D]) -> Option<Pose3D> {
    if poses.is_empty() {
        return None;
    }

    let n = poses.len() as Real;
    let mut position = Vec3::zeros();
    for pose in poses {
        position += pose.position;
    }
    position /= n;

    let reference = poses[0].rotation.coords;
    let mut outer = Mat4::zeros();
    for pose in poses {
        let mut q = pose.rotation.coords;
        if q.dot(&reference) < 0.0 {
            q = -q;
        }
        let q4 = Matrix4x1::new(q.x, q.y, q.z, q.w);
        outer += q4 * q4.transpose();
    }

    let eig = SymmetricEigen::new(outer);
    let mut best = 0;
    for i in 1..4 {
        if eig.eigenvalues[i] > eig.eigenvalues[best] {
            best = i;
        }
    }
    let v = eig.eigenvectors.column(best);
    let rotation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
        v[3], v[0], v[1], v[2],
    ));

    Some(Pose3D { position, rotation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn compose_with_inverse_is_identity() {
        let pose = Pose3D::new(
            Vec3::new(1.0, -2.0, 0.5),
            UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
        );
        let id = pose.compose(&pose.inverse());
        assert_relative_eq!(id.position.norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(id.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn from_direction_points_forward() {
        let dir = Vec3::new(0.0, 0.0, -1.0);
        let pose = Pose3D::from_direction(Vec3::zeros(), dir);
        assert_relative_eq!(pose.forward(), dir, epsilon = 1e-12);

        let dir = Vec3::new(1.0, 2.0, 3.0);
        let pose = Pose3D::from_direction(Vec3::zeros(), dir);
        assert_relative_eq!(pose.forward(), dir.normalize(), epsilon = 1e-12);
    }

    #[test]
    fn average_of_identical_poses_is_unchanged() {
        let pose = Pose3D::new(
            Vec3::new(0.5, 0.5, 1.0),
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
        );
        let avg = average_poses(&[pose, pose, pose]).unwrap();
        assert_relative_eq!(avg.position, pose.position, epsilon = 1e-9);
        assert_relative_eq!(avg.rotation.angle_to(&pose.rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn average_handles_antipodal_quaternions() {
        let rot = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.4);
        let flipped = UnitQuaternion::from_quaternion(-rot.into_inner());
        let a = Pose3D::new(Vec3::zeros(), rot);
        let b = Pose3D::new(Vec3::new(1.0, 0.0, 0.0), flipped);
        let avg = average_poses(&[a, b]).unwrap();
        assert_relative_eq!(avg.rotation.angle_to(&rot), 0.0, epsilon = 1e-9);
        assert_relative_eq!(avg.position.x, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn average_of_empty_set_is_none() {
        assert!(average_poses(&[]).is_none());
    }
}
