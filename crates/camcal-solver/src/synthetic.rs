//! Synthetic planar views for tests and demos.

use crate::camera::project;
use crate::{Intrinsics, Pose};
use camcal_core::{Correspondence, ImageSize, TargetConfig, ViewObservation};
use nalgebra::{Point3, Rotation3, Vector3};

/// Pose that puts `target_point` on the optical axis at `distance`, with
/// the target tilted about the camera x and y axes.
pub fn look_at_pose(target_point: Point3<f64>, tilt_x: f64, tilt_y: f64, distance: f64) -> Pose {
    let r = Rotation3::from_axis_angle(&Vector3::x_axis(), tilt_x)
        * Rotation3::from_axis_angle(&Vector3::y_axis(), tilt_y);
    let t = Vector3::new(0.0, 0.0, distance) - r * target_point.coords;
    Pose::new(r.scaled_axis(), t)
}

/// Centre of the target's inner-corner grid.
pub fn target_centre(target: &TargetConfig) -> Point3<f64> {
    let s = target.square_size_mm;
    Point3::new(
        0.5 * (target.inner_corners_x.saturating_sub(1)) as f64 * s,
        0.5 * (target.inner_corners_y.saturating_sub(1)) as f64 * s,
        0.0,
    )
}

/// Project every reference point of `target` that lands inside `size`.
pub fn project_view(
    source: impl Into<String>,
    target: &TargetConfig,
    intrinsics: &Intrinsics,
    distortion: &[f64],
    pose: &Pose,
    size: ImageSize,
) -> ViewObservation {
    let correspondences = (0..target.point_count() as u32)
        .filter_map(|id| {
            let object = target.reference_point(id)?;
            let image = project(intrinsics, distortion, pose, &object)?;
            let inside = image.x >= 0.0
                && image.y >= 0.0
                && image.x <= size.width.saturating_sub(1) as f64
                && image.y <= size.height.saturating_sub(1) as f64;
            inside.then_some(Correspondence { id, object, image })
        })
        .collect();
    ViewObservation {
        source: source.into(),
        image_size: size,
        correspondences,
    }
}

/// Tilts `(about x, about y)` in radians for `n` views: a ring of
/// orientations whose magnitude alternates between `max_tilt` and half of it.
pub fn tilt_schedule(n: usize, max_tilt: f64) -> Vec<(f64, f64)> {
    (0..n)
        .map(|i| {
            let phase = i as f64 * std::f64::consts::TAU / n.max(1) as f64;
            let mag = if i % 2 == 0 { max_tilt } else { 0.5 * max_tilt };
            (mag * phase.cos(), mag * phase.sin())
        })
        .collect()
}
