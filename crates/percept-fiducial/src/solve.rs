//! Square-tag pose solving.
//!
//! The tag's physical geometry is a square of known side length on the
//! `Z = 0` plane of its own frame, with the center at the origin. The solve
//! minimizes reprojection error of the four corners plus the center against
//! the detected 2D points, starting from either a caller-supplied seed or a
//! homography decomposition.

use nalgebra::{
    Matrix2x3, Matrix3, Matrix3x6, Matrix6, Rotation3, SMatrix, Translation3, UnitQuaternion,
    Vector2, Vector6,
};
use percept_core::{CameraIntrinsics, Iso3, Mat3, Pt2, Pt3, Real, Vec3};

use crate::types::FiducialError;

const GN_MAX_ITERATIONS: usize = 25;
const GN_STEP_EPSILON: Real = 1e-12;

/// Physical tag points in the tag frame, matching the detector corner order,
/// with the center appended.
pub fn tag_object_points(tag_size: Real) -> [Pt3; 5] {
    let h = tag_size / 2.0;
    [
        Pt3::new(-h, -h, 0.0),
        Pt3::new(h, -h, 0.0),
        Pt3::new(h, h, 0.0),
        Pt3::new(-h, h, 0.0),
        Pt3::new(0.0, 0.0, 0.0),
    ]
}

/// Plane-to-image homography from the four tag corners (DLT).
///
/// Maps tag-plane coordinates `(X, Y)` in metres to pixels. Solved as the
/// smallest eigenvector of `AᵀA`; `None` when the corner configuration is
/// degenerate.
fn homography_from_corners(object: &[Pt3; 5], image: &[Pt2; 5]) -> Option<Mat3> {
    let mut a = SMatrix::<Real, 8, 9>::zeros();
    for i in 0..4 {
        let (xw, yw) = (object[i].x, object[i].y);
        let (u, v) = (image[i].x, image[i].y);
        let r0 = 2 * i;
        let r1 = 2 * i + 1;
        a[(r0, 0)] = xw;
        a[(r0, 1)] = yw;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * xw;
        a[(r0, 7)] = -u * yw;
        a[(r0, 8)] = -u;
        a[(r1, 3)] = xw;
        a[(r1, 4)] = yw;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * xw;
        a[(r1, 7)] = -v * yw;
        a[(r1, 8)] = -v;
    }

    let ata = a.transpose() * a;
    let eig = ata.symmetric_eigen();
    let mut smallest = 0;
    for i in 1..9 {
        if eig.eigenvalues[i] < eig.eigenvalues[smallest] {
            smallest = i;
        }
    }
    let h = eig.eigenvectors.column(smallest);
    let hmtx = Mat3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    if hmtx[(2, 2)].abs() < 1e-12 {
        return None;
    }
    Some(hmtx / hmtx[(2, 2)])
}

/// Decompose a plane-induced homography into `camera_tform_tag` given
/// intrinsics, assuming the tag lies on `Z = 0` in its own frame.
///
/// The first two rotation columns come from `K⁻¹H`; the rotation is
/// projected onto SO(3) and the translation scaled accordingly.
fn pose_from_homography(k: &Mat3, h: &Mat3) -> Result<Iso3, FiducialError> {
    let k_inv = k
        .try_inverse()
        .ok_or(FiducialError::DegenerateSolve("intrinsics not invertible"))?;

    let h1 = k_inv * h.column(0);
    let h2 = k_inv * h.column(1);
    let h3 = k_inv * h.column(2);

    let norm1 = h1.norm();
    let norm2 = h2.norm();
    if norm1 <= 1e-12 || norm2 <= 1e-12 {
        return Err(FiducialError::DegenerateSolve("homography column collapse"));
    }
    let lambda = 2.0 / (norm1 + norm2);

    let mut r1 = h1 * lambda;
    let mut r2 = h2 * lambda;
    let mut t: Vec3 = h3 * lambda;
    // The tag must be in front of the camera.
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-9 {
        return Err(FiducialError::DegenerateSolve("homography is rank deficient"));
    }

    let mut r_mat = Matrix3::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3).
    let svd = r_mat.svd(true, true);
    let u = svd
        .u
        .ok_or(FiducialError::DegenerateSolve("svd failed on rotation"))?;
    let v_t = svd
        .v_t
        .ok_or(FiducialError::DegenerateSolve("svd failed on rotation"))?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r_orth = u_fix * v_t;
    }

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

fn skew(v: &Vec3) -> Matrix3<Real> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Gauss–Newton refinement of `camera_tform_tag` over the reprojection error
/// of all correspondences, with a left-multiplicative SE(3) update.
fn refine_pose(
    intrinsics: &CameraIntrinsics,
    object: &[Pt3],
    image: &[Pt2],
    init: Iso3,
) -> Result<Iso3, FiducialError> {
    let mut pose = init;
    for _ in 0..GN_MAX_ITERATIONS {
        let mut jtj = Matrix6::<Real>::zeros();
        let mut jtr = Vector6::<Real>::zeros();

        for (po, px) in object.iter().zip(image.iter()) {
            let pc = pose * po;
            if pc.z <= 1e-9 {
                return Err(FiducialError::DegenerateSolve("tag point behind camera"));
            }
            let inv_z = 1.0 / pc.z;
            let u = intrinsics.fx * pc.x * inv_z + intrinsics.cx;
            let v = intrinsics.fy * pc.y * inv_z + intrinsics.cy;
            let residual = Vector2::new(u - px.x, v - px.y);

            let d_px = Matrix2x3::new(
                intrinsics.fx * inv_z,
                0.0,
                -intrinsics.fx * pc.x * inv_z * inv_z,
                0.0,
                intrinsics.fy * inv_z,
                -intrinsics.fy * pc.y * inv_z * inv_z,
            );
            let mut d_pc = Matrix3x6::<Real>::zeros();
            d_pc.fixed_view_mut::<3, 3>(0, 0)
                .copy_from(&Matrix3::identity());
            d_pc.fixed_view_mut::<3, 3>(0, 3)
                .copy_from(&(-skew(&pc.coords)));
            let j = d_px * d_pc;

            jtj += j.transpose() * j;
            jtr += j.transpose() * residual;
        }

        let delta = jtj
            .cholesky()
            .ok_or(FiducialError::DegenerateSolve("normal equations singular"))?
            .solve(&(-jtr));

        let dt = Vec3::new(delta[0], delta[1], delta[2]);
        let dw = Vec3::new(delta[3], delta[4], delta[5]);
        let dr = UnitQuaternion::from_scaled_axis(dw);
        pose = Iso3::from_parts(
            Translation3::from(dr * pose.translation.vector + dt),
            dr * pose.rotation,
        );

        if delta.norm() < GN_STEP_EPSILON {
            break;
        }
    }
    Ok(pose)
}

/// Solve `camera_tform_tag` for a square tag of side `tag_size` from its
/// detected corners and center.
///
/// `seed` provides the initial estimate when available (e.g. translation
/// unprojected from a registered depth map); otherwise the solve starts from
/// a homography decomposition of the corner correspondences.
pub fn solve_tag_pose(
    intrinsics: &CameraIntrinsics,
    corners: &[Pt2; 4],
    center: Pt2,
    tag_size: Real,
    seed: Option<Iso3>,
) -> Result<Iso3, FiducialError> {
    let object = tag_object_points(tag_size);
    let image = [corners[0], corners[1], corners[2], corners[3], center];

    let init = match seed {
        Some(seed) => seed,
        None => {
            let h = homography_from_corners(&object, &image)
                .ok_or(FiducialError::DegenerateSolve("corner configuration"))?;
            pose_from_homography(&intrinsics.k_matrix(), &h)?
        }
    };

    refine_pose(intrinsics, &object, &image, init)
}
