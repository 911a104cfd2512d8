use std::f32::consts::{FRAC_PI_2, PI};

/// Absolute difference between two angles (radians), in `[0, π]`.
pub fn angle_diff_abs(a: f32, b: f32) -> f32 {
    let two_pi = 2.0 * PI;
    let mut diff = (b - a).rem_euclid(two_pi);
    if diff >= PI {
        diff -= two_pi;
    }
    diff.abs()
}

/// Whether two undirected axes (angles mod π) are orthogonal within `tolerance`.
pub fn is_orthogonal(reference_angle: f32, other_angle: f32, tolerance: f32) -> bool {
    let diff = angle_diff_abs(reference_angle, other_angle);
    let axis_diff = diff.min(PI - diff);
    (FRAC_PI_2 - axis_diff).abs() <= tolerance.abs()
}

/// Angle between an undirected axis (mod π) and a directed vector angle,
/// in `[0, π/2]`.
pub fn axis_vec_diff(axis_angle: f32, vec_angle: f32) -> f32 {
    let diff = angle_diff_abs(axis_angle, vec_angle);
    diff.min(PI - diff)
}

/// Wrap an angle into `[0, π)`.
pub fn wrap_pi(angle: f32) -> f32 {
    let a = angle.rem_euclid(PI);
    if a >= PI {
        0.0
    } else {
        a
    }
}
