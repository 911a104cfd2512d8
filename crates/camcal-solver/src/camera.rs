//! Pinhole intrinsics and the radial-tangential lens model.

use crate::{Pose, SolverError};
use camcal_core::ImageSize;
use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics without skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Principal point at the pixel-grid centre of `size`.
    pub fn image_centre(size: ImageSize) -> Point2<f64> {
        Point2::new(
            (size.width as f64 - 1.0) * 0.5,
            (size.height as f64 - 1.0) * 0.5,
        )
    }

    /// Camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }
}

/// Number of distortion coefficients estimated, in the order
/// `[k1, k2, p1, p2, k3, k4, k5, k6]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum DistortionModel {
    /// `k1, k2, p1, p2`.
    Radial2Tangential,
    /// `k1, k2, p1, p2, k3`.
    #[default]
    Radial3Tangential,
    /// Rational model, `k1, k2, p1, p2, k3, k4, k5, k6`.
    Rational,
}

impl DistortionModel {
    pub fn coefficient_count(self) -> usize {
        match self {
            DistortionModel::Radial2Tangential => 4,
            DistortionModel::Radial3Tangential => 5,
            DistortionModel::Rational => 8,
        }
    }
}

impl TryFrom<usize> for DistortionModel {
    type Error = SolverError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        match n {
            4 => Ok(DistortionModel::Radial2Tangential),
            5 => Ok(DistortionModel::Radial3Tangential),
            8 => Ok(DistortionModel::Rational),
            other => Err(SolverError::UnsupportedDistortion(other)),
        }
    }
}

impl From<DistortionModel> for usize {
    fn from(model: DistortionModel) -> Self {
        model.coefficient_count()
    }
}

/// Apply lens distortion to a normalized image point.
///
/// Missing trailing coefficients are treated as zero.
pub fn distort(coeffs: &[f64], p: Point2<f64>) -> Point2<f64> {
    let k = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
    let (k1, k2, p1, p2, k3) = (k(0), k(1), k(2), k(3), k(4));
    let (k4, k5, k6) = (k(5), k(6), k(7));

    let (x, y) = (p.x, p.y);
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);

    Point2::new(
        x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
        y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
    )
}

/// Project a target-frame point into the image.
///
/// Returns `None` for points at or behind the camera plane.
pub fn project(
    intrinsics: &Intrinsics,
    distortion: &[f64],
    pose: &Pose,
    object: &Point3<f64>,
) -> Option<Point2<f64>> {
    let pc = pose.transform(object);
    if pc.z <= 1e-9 {
        return None;
    }
    let d = distort(distortion, Point2::new(pc.x / pc.z, pc.y / pc.z));
    Some(Point2::new(
        intrinsics.fx * d.x + intrinsics.cx,
        intrinsics.fy * d.y + intrinsics.cy,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn zero_coefficients_leave_points_unchanged() {
        let p = Point2::new(0.3, -0.2);
        assert_eq!(distort(&[0.0; 5], p), p);
        assert_eq!(distort(&[], p), p);
    }

    #[test]
    fn radial_term_scales_with_radius() {
        let p = Point2::new(0.5, 0.0);
        let d = distort(&[0.1, 0.0, 0.0, 0.0, 0.0], p);
        assert_relative_eq!(d.x, 0.5 * (1.0 + 0.1 * 0.25), epsilon = 1e-12);
        assert_relative_eq!(d.y, 0.0);
    }

    #[test]
    fn rational_denominator_cancels_matching_numerator() {
        let p = Point2::new(0.2, 0.1);
        let d = distort(&[0.05, 0.0, 0.0, 0.0, 0.0, 0.05, 0.0, 0.0], p);
        assert_relative_eq!(d.x, p.x, epsilon = 1e-12);
        assert_relative_eq!(d.y, p.y, epsilon = 1e-12);
    }

    #[test]
    fn projects_through_the_principal_point() {
        let k = Intrinsics::new(800.0, 780.0, 320.0, 240.0);
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 500.0));
        let on_axis = project(&k, &[], &pose, &Point3::origin()).expect("in front");
        assert_relative_eq!(on_axis.x, 320.0);
        assert_relative_eq!(on_axis.y, 240.0);

        let off = project(&k, &[], &pose, &Point3::new(50.0, -25.0, 0.0)).expect("in front");
        assert_relative_eq!(off.x, 320.0 + 800.0 * 0.1, epsilon = 1e-9);
        assert_relative_eq!(off.y, 240.0 - 780.0 * 0.05, epsilon = 1e-9);

        let behind = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -10.0));
        assert!(project(&k, &[], &behind, &Point3::origin()).is_none());
    }

    #[test]
    fn distortion_model_lengths_round_trip_through_serde() {
        let m: DistortionModel = serde_json::from_str("8").expect("parse");
        assert_eq!(m, DistortionModel::Rational);
        assert_eq!(serde_json::to_string(&DistortionModel::default()).expect("json"), "5");
        assert!(serde_json::from_str::<DistortionModel>("6").is_err());
    }
}
