//! Full calibration of a session: seed, gate, refine, validate.

use crate::camera::DistortionModel;
use crate::linear::{centred_intrinsics, zhang_intrinsics};
use crate::lm::{levenberg_marquardt, NllsProblem, SolveOptions, Termination};
use crate::problem::{ParamLayout, PlanarCalibrationProblem, PoseProblem};
use crate::{Intrinsics, Pose, SolverError};
use camcal_core::{estimate_homography, CalibrationSession, ViewObservation};
use log::{debug, info, warn};
use nalgebra::{DMatrix, Matrix3, Point2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Hold the principal point at the image centre.
    pub fix_principal_point: bool,
    pub distortion: DistortionModel,
    /// Smallest largest-pairwise rotation between view poses, in degrees.
    pub min_rotation_spread_deg: f64,
    /// Smallest accepted eigenvalue ratio of the scaled normal matrix.
    pub min_condition_ratio: f64,
    pub lm: SolveOptions,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            fix_principal_point: true,
            distortion: DistortionModel::default(),
            min_rotation_spread_deg: 1.0,
            min_condition_ratio: 1e-12,
            lm: SolveOptions::default(),
        }
    }
}

/// Refined camera model and its per-view breakdown.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutput {
    pub intrinsics: Intrinsics,
    /// `[k1, k2, p1, p2, k3, ...]`, as many as the distortion model has.
    pub distortion: Vec<f64>,
    /// Root-mean-square reprojection error over all points, in pixels.
    pub rms: f64,
    /// Sources of the views that took part, in session order.
    pub view_sources: Vec<String>,
    pub per_view_rms: Vec<f64>,
    pub poses: Vec<Pose>,
    pub iterations: usize,
    pub termination: Termination,
    /// Sources of views dropped before refinement.
    pub dropped_views: Vec<String>,
}

struct SeededView<'a> {
    view: &'a ViewObservation,
    homography: Matrix3<f64>,
}

/// Calibrate the camera from every view of `session`.
///
/// Views whose homography or initial pose cannot be computed are dropped
/// and reported. The result is deterministic for a given session.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        level = "info",
        skip(session, opts),
        fields(views = session.views.len(), points = session.total_points())
    )
)]
pub fn solve(
    session: &CalibrationSession,
    opts: &SolverOptions,
) -> Result<CalibrationOutput, SolverError> {
    const MIN_VIEWS: usize = 2;
    // Below this mean squared residual a seed counts as already optimal.
    const STALL_COST_PER_ROW: f64 = 1e-12;

    let size = session.image_size;
    if size.width == 0 || size.height == 0 {
        return Err(SolverError::EmptyImage);
    }
    if session.views.len() < MIN_VIEWS {
        return Err(SolverError::NotEnoughViews {
            found: session.views.len(),
            required: MIN_VIEWS,
        });
    }

    let mut dropped = Vec::new();
    let mut seeded = Vec::with_capacity(session.views.len());
    for view in &session.views {
        match view_homography(view) {
            Some(h) => seeded.push(SeededView {
                view,
                homography: h,
            }),
            None => {
                warn!("{}: no homography, view dropped", view.source);
                dropped.push(view.source.clone());
            }
        }
    }

    let centre = Intrinsics::image_centre(size);
    let hs: Vec<Matrix3<f64>> = seeded.iter().map(|s| s.homography).collect();
    let seed = if opts.fix_principal_point {
        centred_intrinsics(&hs, size, centre)
    } else {
        zhang_intrinsics(&hs, size)
            .filter(|k| principal_point_inside(k, size))
            .or_else(|| {
                debug!("free principal point seed unavailable, using image centre");
                centred_intrinsics(&hs, size, centre)
            })
    }
    .ok_or(SolverError::Seed)?;
    debug!(
        "seed intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        seed.fx, seed.fy, seed.cx, seed.cy
    );

    let k = seed.matrix();
    let mut views = Vec::with_capacity(seeded.len());
    let mut poses = Vec::with_capacity(seeded.len());
    for s in &seeded {
        match Pose::from_homography(&k, &s.homography) {
            Some(pose) => {
                views.push(s.view.clone());
                poses.push(pose);
            }
            None => {
                warn!("{}: no initial pose, view dropped", s.view.source);
                dropped.push(s.view.source.clone());
            }
        }
    }
    if views.len() < MIN_VIEWS {
        return Err(SolverError::NotEnoughViews {
            found: views.len(),
            required: MIN_VIEWS,
        });
    }

    let spread = rotation_spread_deg(&poses);
    if spread < opts.min_rotation_spread_deg {
        return Err(SolverError::Divergence(format!(
            "views span only {spread:.2}° of rotation, need at least {:.2}°",
            opts.min_rotation_spread_deg
        )));
    }

    let n_dist = opts.distortion.coefficient_count();
    let zero_dist = vec![0.0; n_dist];
    for (view, pose) in views.iter().zip(poses.iter_mut()) {
        let problem = PoseProblem::new(view, seed, &zero_dist);
        let (x, report) = levenberg_marquardt(&problem, PoseProblem::pack(pose), &opts.lm);
        if report.final_cost < report.initial_cost {
            *pose = PoseProblem::unpack(&x);
        }
    }

    let layout = ParamLayout {
        free_principal_point: !opts.fix_principal_point,
        distortion_len: n_dist,
        views: views.len(),
    };
    let problem = PlanarCalibrationProblem::new(&views, layout, centre);
    let x0 = layout.pack(&seed, &zero_dist, &poses);
    let (x, report) = levenberg_marquardt(&problem, x0, &opts.lm);
    debug!(
        "joint refinement: {} evaluations, cost {:.4e} -> {:.4e}, {:?}",
        report.iterations, report.initial_cost, report.final_cost, report.termination
    );

    match report.termination {
        Termination::NonFinite => {
            return Err(SolverError::Divergence(
                "non-finite residuals at the initial estimate".into(),
            ))
        }
        Termination::Stagnated
            if !report.improved()
                && report.final_cost > STALL_COST_PER_ROW * problem.num_residuals() as f64 =>
        {
            return Err(SolverError::Divergence(
                "no refinement step reduced the reprojection error".into(),
            ))
        }
        Termination::MaxIterations => {
            warn!(
                "refinement stopped after {} evaluations without meeting tolerances",
                report.iterations
            );
        }
        _ => {}
    }

    let intrinsics = layout.intrinsics(&x, centre);
    let distortion = layout.distortion(&x).to_vec();
    if !intrinsics.is_valid() || !x.iter().all(|v| v.is_finite()) {
        return Err(SolverError::Divergence(format!(
            "refined camera is not physical (fx={}, fy={})",
            intrinsics.fx, intrinsics.fy
        )));
    }

    let ratio = condition_ratio(&problem.jacobian(&x), &layout);
    if ratio < opts.min_condition_ratio {
        return Err(SolverError::Divergence(format!(
            "ill-conditioned problem (eigenvalue ratio {ratio:.3e})"
        )));
    }

    let r = problem.residuals(&x);
    let n_points = r.len() / 2;
    let rms = (r.norm_squared() / n_points.max(1) as f64).sqrt();
    if !rms.is_finite() {
        return Err(SolverError::Divergence("non-finite reprojection error".into()));
    }
    let per_view_rms = problem.per_view_rms(&x);
    let poses = (0..views.len()).map(|v| layout.pose(&x, v)).collect();

    info!(
        "calibrated {} views ({} points): fx={:.3} fy={:.3} cx={:.3} cy={:.3} rms={:.4}px",
        views.len(),
        n_points,
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        rms
    );

    Ok(CalibrationOutput {
        intrinsics,
        distortion,
        rms,
        view_sources: views.iter().map(|v| v.source.clone()).collect(),
        per_view_rms,
        poses,
        iterations: report.iterations,
        termination: report.termination,
        dropped_views: dropped,
    })
}

fn view_homography(view: &ViewObservation) -> Option<Matrix3<f64>> {
    let src: Vec<Point2<f64>> = view
        .object_points()
        .map(|p| Point2::new(p.x, p.y))
        .collect();
    let dst: Vec<Point2<f64>> = view.image_points().copied().collect();
    estimate_homography(&src, &dst).map(|h| h.h)
}

fn principal_point_inside(k: &Intrinsics, size: camcal_core::ImageSize) -> bool {
    k.cx >= 0.0 && k.cy >= 0.0 && k.cx < size.width as f64 && k.cy < size.height as f64
}

/// Largest relative rotation between any two poses, in degrees.
pub fn rotation_spread_deg(poses: &[Pose]) -> f64 {
    let mut best = 0.0f64;
    for (i, a) in poses.iter().enumerate() {
        for b in &poses[i + 1..] {
            best = best.max(a.angle_to(b));
        }
    }
    best.to_degrees()
}

/// Smallest over largest eigenvalue of the Jacobi-scaled `JᵀJ` restricted
/// to intrinsic and pose parameters.
///
/// Distortion columns are left out: the rational model's numerator and
/// denominator terms are collinear near zero distortion.
fn condition_ratio(j: &DMatrix<f64>, layout: &ParamLayout) -> f64 {
    let keep: Vec<usize> = (0..layout.intrinsics_len())
        .chain(layout.pose_offset(0)..layout.len())
        .collect();
    let sub = j.select_columns(keep.iter());
    let jtj = sub.tr_mul(&sub);
    let n = jtj.nrows();
    let mut scaled = jtj.clone();
    for r in 0..n {
        for c in 0..n {
            let d = (jtj[(r, r)] * jtj[(c, c)]).sqrt();
            scaled[(r, c)] = if d > 0.0 { jtj[(r, c)] / d } else { 0.0 };
        }
    }
    let eig = scaled.symmetric_eigen();
    let max = eig.eigenvalues.max();
    let min = eig.eigenvalues.min();
    if !(max.is_finite() && max > 0.0) {
        return 0.0;
    }
    (min / max).max(0.0)
}
