//! Target-to-camera poses.

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transform from the target frame into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Axis-angle rotation (radians).
    pub rotation: Vector3<f64>,
    /// Translation in millimetres.
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::from_scaled_axis(self.rotation)
    }

    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation_matrix() * p + self.translation
    }

    /// Angle of the relative rotation between two poses, in radians.
    ///
    /// Uses `atan2`, which stays accurate for nearly identical rotations.
    pub fn angle_to(&self, other: &Pose) -> f64 {
        let rel = self.rotation_matrix().rotation_to(&other.rotation_matrix());
        let m = rel.matrix();
        let axis = Vector3::new(
            m[(2, 1)] - m[(1, 2)],
            m[(0, 2)] - m[(2, 0)],
            m[(1, 0)] - m[(0, 1)],
        );
        let sin = 0.5 * axis.norm();
        let cos = 0.5 * (m.trace() - 1.0);
        sin.atan2(cos)
    }

    /// Decompose a plane-induced homography (target `Z = 0` → pixels) into
    /// a pose, given the camera matrix `k`.
    ///
    /// The rotation is projected onto SO(3); the target is placed in front
    /// of the camera. Returns `None` for degenerate input.
    pub fn from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<Pose> {
        let k_inv = k.try_inverse()?;
        let a1 = k_inv * h.column(0);
        let a2 = k_inv * h.column(1);
        let a3 = k_inv * h.column(2);

        let (n1, n2) = (a1.norm(), a2.norm());
        if n1 <= 1e-12 || n2 <= 1e-12 {
            return None;
        }
        let lambda = 2.0 / (n1 + n2);

        let mut r1 = a1 * lambda;
        let mut r2 = a2 * lambda;
        let mut t = a3 * lambda;
        if t.z < 0.0 {
            r1 = -r1;
            r2 = -r2;
            t = -t;
        }
        let r3 = r1.cross(&r2);
        if r3.norm() <= 1e-12 {
            return None;
        }

        let r = Matrix3::from_columns(&[r1, r2, r3]);
        let svd = r.svd(true, true);
        let (u, v_t) = (svd.u?, svd.v_t?);
        let mut r_orth = u * v_t;
        if r_orth.determinant() < 0.0 {
            let mut u_fix = u;
            u_fix.column_mut(2).neg_mut();
            r_orth = u_fix * v_t;
        }
        if !r_orth.iter().chain(t.iter()).all(|v| v.is_finite()) {
            return None;
        }

        let rot = Rotation3::from_matrix_unchecked(r_orth);
        Some(Pose::new(rot.scaled_axis(), t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn homography(k: &Matrix3<f64>, pose: &Pose) -> Matrix3<f64> {
        let r = pose.rotation_matrix();
        let rm = r.matrix();
        let m = Matrix3::from_columns(&[
            rm.column(0).into_owned(),
            rm.column(1).into_owned(),
            pose.translation,
        ]);
        k * m
    }

    #[test]
    fn recovers_pose_from_exact_homography() {
        let k = Matrix3::new(800.0, 0.0, 320.0, 0.0, 790.0, 240.0, 0.0, 0.0, 1.0);
        let truth = Pose::new(
            Vector3::new(0.2, -0.3, 0.1),
            Vector3::new(-60.0, -40.0, 550.0),
        );
        // Arbitrary scale and sign must not matter.
        let h = homography(&k, &truth) * -0.004;
        let est = Pose::from_homography(&k, &h).expect("pose");
        assert_relative_eq!(est.rotation, truth.rotation, epsilon = 1e-9);
        assert_relative_eq!(est.translation, truth.translation, epsilon = 1e-6);
        assert!(est.angle_to(&truth) < 1e-9);
    }

    #[test]
    fn angle_between_poses() {
        let a = Pose::new(Vector3::zeros(), Vector3::zeros());
        let b = Pose::new(Vector3::new(0.0, 0.25, 0.0), Vector3::zeros());
        assert_relative_eq!(a.angle_to(&b), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn angle_to_self_is_near_zero() {
        let p = Pose::new(Vector3::new(0.1, 0.2, 0.0), Vector3::new(0.0, 0.0, 500.0));
        assert!(p.angle_to(&p) < 1e-12);
    }

    #[test]
    fn angle_near_half_turn() {
        let a = Pose::new(Vector3::zeros(), Vector3::zeros());
        let b = Pose::new(Vector3::new(0.0, 0.0, 3.0), Vector3::zeros());
        assert_relative_eq!(a.angle_to(&b), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn rank_deficient_homography_is_rejected() {
        let k = Matrix3::identity();
        let h = Matrix3::new(1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!(Pose::from_homography(&k, &h).is_none());
    }
}
