//! Closed-form intrinsics from plane homographies.
//!
//! Both estimators work on homographies pre-multiplied by a pixel
//! normalizer (principal point guess at the origin, pixel scale divided by
//! the mean image side), which keeps the linear systems well conditioned.

use crate::Intrinsics;
use camcal_core::{null_vector, ImageSize};
use nalgebra::{DMatrix, DVector, Matrix3, Point2, SVector};

fn normalizer(size: ImageSize, centre: Point2<f64>) -> (Matrix3<f64>, f64) {
    let f0 = 0.5 * (size.width + size.height) as f64;
    let t = Matrix3::new(
        1.0 / f0,
        0.0,
        -centre.x / f0,
        0.0,
        1.0 / f0,
        -centre.y / f0,
        0.0,
        0.0,
        1.0,
    );
    (t, f0)
}

fn normalized(homographies: &[Matrix3<f64>], t: &Matrix3<f64>) -> Vec<Matrix3<f64>> {
    homographies
        .iter()
        .map(|h| t * h)
        .filter_map(|h| {
            let n = h.norm();
            (n.is_finite() && n > 0.0).then(|| h / n)
        })
        .collect()
}

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed form with a free principal point. Skew is estimated but
/// dropped.
///
/// Needs at least three views with distinct orientations; returns `None`
/// when the system is rank deficient or yields a non-physical camera.
pub fn zhang_intrinsics(homographies: &[Matrix3<f64>], size: ImageSize) -> Option<Intrinsics> {
    let (t, f0) = normalizer(size, Intrinsics::image_centre(size));
    let hs = normalized(homographies, &t);
    if hs.len() < 3 {
        return None;
    }

    let mut v = DMatrix::<f64>::zeros(2 * hs.len(), 6);
    for (k, h) in hs.iter().enumerate() {
        v.row_mut(2 * k).copy_from(&v_ij(h, 0, 1).transpose());
        v.row_mut(2 * k + 1)
            .copy_from(&(v_ij(h, 0, 0) - v_ij(h, 1, 1)).transpose());
    }
    let mut b = null_vector(v)?;
    if b[0] < 0.0 {
        b.neg_mut();
    }
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    if b11 <= 0.0 || denom <= 1e-6 * (b11 * b11 + b22 * b22) {
        return None;
    }
    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda <= 0.0 {
        return None;
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let centre = Intrinsics::image_centre(size);
    let k = Intrinsics::new(
        f0 * alpha,
        f0 * beta,
        f0 * u0 + centre.x,
        f0 * v0 + centre.y,
    );
    k.is_valid().then_some(k)
}

/// Focal lengths with the principal point held at `centre`.
///
/// With `B = diag(a, b, 1)` for the centred camera, each view gives two
/// linear equations in `a = 1/fx²` and `b = 1/fy²`. One tilted view is
/// enough; fronto-parallel views carry no focal information and yield
/// `None`.
pub fn centred_intrinsics(
    homographies: &[Matrix3<f64>],
    size: ImageSize,
    centre: Point2<f64>,
) -> Option<Intrinsics> {
    let (t, f0) = normalizer(size, centre);
    let hs = normalized(homographies, &t);
    if hs.is_empty() {
        return None;
    }

    let mut a = DMatrix::<f64>::zeros(2 * hs.len(), 2);
    let mut rhs = DVector::<f64>::zeros(2 * hs.len());
    for (k, h) in hs.iter().enumerate() {
        a[(2 * k, 0)] = h[(0, 0)] * h[(0, 1)];
        a[(2 * k, 1)] = h[(1, 0)] * h[(1, 1)];
        rhs[2 * k] = -h[(2, 0)] * h[(2, 1)];

        a[(2 * k + 1, 0)] = h[(0, 0)] * h[(0, 0)] - h[(0, 1)] * h[(0, 1)];
        a[(2 * k + 1, 1)] = h[(1, 0)] * h[(1, 0)] - h[(1, 1)] * h[(1, 1)];
        rhs[2 * k + 1] = -(h[(2, 0)] * h[(2, 0)] - h[(2, 1)] * h[(2, 1)]);
    }

    let ata = a.tr_mul(&a);
    let atb = a.tr_mul(&rhs);
    let sol = ata.cholesky()?.solve(&atb);
    let (fa, fb) = (sol[0], sol[1]);
    if !(fa.is_finite() && fb.is_finite()) || fa <= 0.0 || fb <= 0.0 {
        return None;
    }

    let k = Intrinsics::new(f0 / fa.sqrt(), f0 / fb.sqrt(), centre.x, centre.y);
    k.is_valid().then_some(k)
}
