use camcal_core::{CalibrationSession, ImageSize, TargetConfig, ViewObservation};
use camcal_solver::synthetic::{look_at_pose, project_view, target_centre, tilt_schedule};
use camcal_solver::{solve, DistortionModel, Intrinsics, SolverError, SolverOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

fn target() -> TargetConfig {
    TargetConfig::chessboard(9, 6, 25.0).expect("target")
}

fn session(k: &Intrinsics, distortion: &[f64], n: usize, noise_px: f64) -> CalibrationSession {
    let target = target();
    let centre = target_centre(&target);
    let mut rng = StdRng::seed_from_u64(7);
    let views = tilt_schedule(n, 25f64.to_radians())
        .into_iter()
        .enumerate()
        .map(|(i, (tx, ty))| {
            let pose = look_at_pose(centre, tx, ty, 560.0 + 10.0 * i as f64);
            let mut view = project_view(format!("view_{i:02}"), &target, k, distortion, &pose, SIZE);
            if noise_px > 0.0 {
                for c in &mut view.correspondences {
                    c.image.x += rng.random_range(-noise_px..noise_px);
                    c.image.y += rng.random_range(-noise_px..noise_px);
                }
            }
            view
        })
        .collect::<Vec<ViewObservation>>();
    CalibrationSession {
        image_size: SIZE,
        views,
    }
}

fn truth() -> Intrinsics {
    Intrinsics::new(800.0, 800.0, 319.5, 239.5)
}

#[test]
fn noisy_views_recover_the_camera() {
    let s = session(&truth(), &[-0.05, 0.01, 0.0, 0.0, 0.0], 12, 0.25);
    assert!(s.views.iter().all(|v| v.len() == 54));

    let out = solve(&s, &SolverOptions::default()).expect("calibration");
    let k = out.intrinsics;
    assert!((k.fx - 800.0).abs() < 8.0, "fx {}", k.fx);
    assert!((k.fy - 800.0).abs() < 8.0, "fy {}", k.fy);
    assert_eq!((k.cx, k.cy), (319.5, 239.5));
    assert!(out.rms < 0.5, "rms {}", out.rms);
    assert_eq!(out.distortion.len(), 5);
    assert_eq!(out.per_view_rms.len(), 12);
    assert_eq!(out.poses.len(), 12);
    assert!(out.dropped_views.is_empty());
    assert!(out.per_view_rms.iter().all(|r| *r < 0.5));
}

#[test]
fn radial_distortion_is_recovered_without_k3() {
    // k1 and k3 trade off under noise; the four-coefficient model pins k1.
    let s = session(&truth(), &[-0.05, 0.01, 0.0, 0.0], 12, 0.05);
    let opts = SolverOptions {
        distortion: DistortionModel::Radial2Tangential,
        ..SolverOptions::default()
    };
    let out = solve(&s, &opts).expect("calibration");
    assert_eq!(out.distortion.len(), 4);
    assert!((out.distortion[0] + 0.05).abs() < 0.01, "k1 {}", out.distortion[0]);
    assert!(out.distortion[2].abs() < 2e-3, "p1 {}", out.distortion[2]);
    assert!((out.intrinsics.fx - 800.0).abs() < 2.0, "fx {}", out.intrinsics.fx);
}

#[test]
fn identical_input_gives_identical_output() {
    let s = session(&truth(), &[], 10, 0.2);
    let a = solve(&s, &SolverOptions::default()).expect("first run");
    let b = solve(&s, &SolverOptions::default()).expect("second run");
    assert_eq!(a, b);
}

#[test]
fn free_principal_point_is_recovered() {
    let k_true = Intrinsics::new(810.0, 795.0, 326.0, 236.0);
    let s = session(&k_true, &[-0.08, 0.02, 0.0, 0.0, 0.0], 12, 0.0);
    let opts = SolverOptions {
        fix_principal_point: false,
        ..SolverOptions::default()
    };
    let out = solve(&s, &opts).expect("calibration");
    let k = out.intrinsics;
    assert!((k.fx - k_true.fx).abs() < 0.5, "fx {}", k.fx);
    assert!((k.fy - k_true.fy).abs() < 0.5, "fy {}", k.fy);
    assert!((k.cx - k_true.cx).abs() < 0.5, "cx {}", k.cx);
    assert!((k.cy - k_true.cy).abs() < 0.5, "cy {}", k.cy);
    assert!(out.rms < 1e-3, "rms {}", out.rms);
}

#[test]
fn rational_model_reports_eight_coefficients() {
    let s = session(&truth(), &[], 10, 0.1);
    let opts = SolverOptions {
        distortion: DistortionModel::Rational,
        ..SolverOptions::default()
    };
    let out = solve(&s, &opts).expect("calibration");
    assert_eq!(out.distortion.len(), 8);
    assert!((out.intrinsics.fx - 800.0).abs() < 8.0);
}

#[test]
fn identical_poses_are_rejected() {
    let target = target();
    let pose = look_at_pose(target_centre(&target), 0.3, 0.2, 600.0);
    let view = project_view("same", &target, &truth(), &[], &pose, SIZE);
    let s = CalibrationSession {
        image_size: SIZE,
        views: vec![view; 10],
    };
    match solve(&s, &SolverOptions::default()) {
        Err(SolverError::Divergence(reason)) => assert!(reason.contains("rotation"), "{reason}"),
        other => panic!("expected divergence, got {other:?}"),
    }
}

#[test]
fn single_view_is_not_enough() {
    let s = session(&truth(), &[], 1, 0.0);
    assert_eq!(
        solve(&s, &SolverOptions::default()).unwrap_err(),
        SolverError::NotEnoughViews {
            found: 1,
            required: 2
        }
    );
}

#[test]
fn views_without_enough_points_are_dropped() {
    let mut s = session(&truth(), &[], 6, 0.1);
    s.views[2].correspondences.truncate(3);
    let out = solve(&s, &SolverOptions::default()).expect("calibration");
    assert_eq!(out.dropped_views, vec!["view_02".to_string()]);
    assert_eq!(out.poses.len(), 5);
    assert!(!out.view_sources.contains(&"view_02".to_string()));
}
