//! Reprojection least-squares problems over planar views.

use crate::camera::project;
use crate::lm::{diff_step, NllsProblem};
use crate::{Intrinsics, Pose};
use camcal_core::ViewObservation;
use nalgebra::{DMatrix, DVector, Point2, Vector3};

/// Parameter vector layout of the joint problem:
/// `[fx, fy, (cx, cy), distortion..., (rvec, tvec) per view]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamLayout {
    pub free_principal_point: bool,
    pub distortion_len: usize,
    pub views: usize,
}

impl ParamLayout {
    pub fn intrinsics_len(&self) -> usize {
        if self.free_principal_point {
            4
        } else {
            2
        }
    }

    /// Parameters shared by every view.
    pub fn shared_len(&self) -> usize {
        self.intrinsics_len() + self.distortion_len
    }

    pub fn pose_offset(&self, view: usize) -> usize {
        self.shared_len() + 6 * view
    }

    pub fn len(&self) -> usize {
        self.pose_offset(self.views)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pack(
        &self,
        intrinsics: &Intrinsics,
        distortion: &[f64],
        poses: &[Pose],
    ) -> DVector<f64> {
        let mut x = DVector::zeros(self.len());
        x[0] = intrinsics.fx;
        x[1] = intrinsics.fy;
        if self.free_principal_point {
            x[2] = intrinsics.cx;
            x[3] = intrinsics.cy;
        }
        let d0 = self.intrinsics_len();
        for (i, v) in distortion.iter().take(self.distortion_len).enumerate() {
            x[d0 + i] = *v;
        }
        for (v, pose) in poses.iter().take(self.views).enumerate() {
            let o = self.pose_offset(v);
            x.rows_mut(o, 3).copy_from(&pose.rotation);
            x.rows_mut(o + 3, 3).copy_from(&pose.translation);
        }
        x
    }

    /// Intrinsics from `x`; a fixed principal point comes from `centre`.
    pub fn intrinsics(&self, x: &DVector<f64>, centre: Point2<f64>) -> Intrinsics {
        if self.free_principal_point {
            Intrinsics::new(x[0], x[1], x[2], x[3])
        } else {
            Intrinsics::new(x[0], x[1], centre.x, centre.y)
        }
    }

    pub fn distortion<'a>(&self, x: &'a DVector<f64>) -> &'a [f64] {
        let d0 = self.intrinsics_len();
        &x.as_slice()[d0..d0 + self.distortion_len]
    }

    pub fn pose(&self, x: &DVector<f64>, view: usize) -> Pose {
        pose_at(x, self.pose_offset(view))
    }
}

fn pose_at(x: &DVector<f64>, o: usize) -> Pose {
    Pose::new(
        Vector3::new(x[o], x[o + 1], x[o + 2]),
        Vector3::new(x[o + 3], x[o + 4], x[o + 5]),
    )
}

/// Write `projected - observed` for every correspondence of `view` into
/// `out` (two rows per point). Points behind the camera give NaN.
pub(crate) fn view_residuals(
    view: &ViewObservation,
    intrinsics: &Intrinsics,
    distortion: &[f64],
    pose: &Pose,
    out: &mut [f64],
) {
    for (c, r) in view.correspondences.iter().zip(out.chunks_exact_mut(2)) {
        match project(intrinsics, distortion, pose, &c.object) {
            Some(p) => {
                r[0] = p.x - c.image.x;
                r[1] = p.y - c.image.y;
            }
            None => {
                r[0] = f64::NAN;
                r[1] = f64::NAN;
            }
        }
    }
}

/// Joint refinement of intrinsics, distortion and all view poses.
pub struct PlanarCalibrationProblem<'a> {
    views: &'a [ViewObservation],
    layout: ParamLayout,
    centre: Point2<f64>,
    /// First residual row of each view, plus the total.
    row_offsets: Vec<usize>,
}

impl<'a> PlanarCalibrationProblem<'a> {
    pub fn new(views: &'a [ViewObservation], layout: ParamLayout, centre: Point2<f64>) -> Self {
        let mut row_offsets = Vec::with_capacity(views.len() + 1);
        let mut acc = 0usize;
        row_offsets.push(acc);
        for v in views {
            acc += 2 * v.len();
            row_offsets.push(acc);
        }
        Self {
            views,
            layout,
            centre,
            row_offsets,
        }
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    fn rows(&self, view: usize) -> std::ops::Range<usize> {
        self.row_offsets[view]..self.row_offsets[view + 1]
    }

    fn fill_view(&self, x: &DVector<f64>, view: usize, out: &mut [f64]) {
        let k = self.layout.intrinsics(x, self.centre);
        let d = self.layout.distortion(x);
        view_residuals(&self.views[view], &k, d, &self.layout.pose(x, view), out);
    }

    /// RMS reprojection error of each view at `x`.
    pub fn per_view_rms(&self, x: &DVector<f64>) -> Vec<f64> {
        let r = self.residuals(x);
        (0..self.views.len())
            .map(|v| {
                let rows = self.rows(v);
                let n = rows.len() / 2;
                let ss: f64 = r.as_slice()[rows].iter().map(|e| e * e).sum();
                if n == 0 {
                    0.0
                } else {
                    (ss / n as f64).sqrt()
                }
            })
            .collect()
    }
}

impl NllsProblem for PlanarCalibrationProblem<'_> {
    fn num_params(&self) -> usize {
        self.layout.len()
    }

    fn num_residuals(&self) -> usize {
        self.row_offsets.last().copied().unwrap_or(0)
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut r = DVector::zeros(self.num_residuals());
        for v in 0..self.views.len() {
            let rows = self.rows(v);
            self.fill_view(x, v, &mut r.as_mut_slice()[rows]);
        }
        r
    }

    /// Central differences. Shared parameters touch every row; a pose
    /// parameter only touches its own view's rows.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let m = self.num_residuals();
        let mut j = DMatrix::zeros(m, self.layout.len());
        let mut xp = x.clone();

        for p in 0..self.layout.shared_len() {
            let h = diff_step(x[p]);
            xp[p] = x[p] + h;
            let rp = self.residuals(&xp);
            xp[p] = x[p] - h;
            let rm = self.residuals(&xp);
            xp[p] = x[p];
            j.set_column(p, &((rp - rm) / (2.0 * h)));
        }

        for v in 0..self.views.len() {
            let rows = self.rows(v);
            let n = rows.len();
            let (mut rp, mut rm) = (vec![0.0; n], vec![0.0; n]);
            let o = self.layout.pose_offset(v);
            for p in o..o + 6 {
                let h = diff_step(x[p]);
                xp[p] = x[p] + h;
                self.fill_view(&xp, v, &mut rp);
                xp[p] = x[p] - h;
                self.fill_view(&xp, v, &mut rm);
                xp[p] = x[p];
                for (i, row) in rows.clone().enumerate() {
                    j[(row, p)] = (rp[i] - rm[i]) / (2.0 * h);
                }
            }
        }
        j
    }
}

/// Pose of one view with the camera held fixed.
pub struct PoseProblem<'a> {
    view: &'a ViewObservation,
    intrinsics: Intrinsics,
    distortion: &'a [f64],
}

impl<'a> PoseProblem<'a> {
    pub fn new(view: &'a ViewObservation, intrinsics: Intrinsics, distortion: &'a [f64]) -> Self {
        Self {
            view,
            intrinsics,
            distortion,
        }
    }

    pub fn pack(pose: &Pose) -> DVector<f64> {
        let mut x = DVector::zeros(6);
        x.rows_mut(0, 3).copy_from(&pose.rotation);
        x.rows_mut(3, 3).copy_from(&pose.translation);
        x
    }

    pub fn unpack(x: &DVector<f64>) -> Pose {
        pose_at(x, 0)
    }
}

impl NllsProblem for PoseProblem<'_> {
    fn num_params(&self) -> usize {
        6
    }

    fn num_residuals(&self) -> usize {
        2 * self.view.len()
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut r = DVector::zeros(self.num_residuals());
        view_residuals(
            self.view,
            &self.intrinsics,
            self.distortion,
            &pose_at(x, 0),
            r.as_mut_slice(),
        );
        r
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(self.num_residuals(), 6);
        let mut xp = x.clone();
        for p in 0..6 {
            let h = diff_step(x[p]);
            xp[p] = x[p] + h;
            let rp = self.residuals(&xp);
            xp[p] = x[p] - h;
            let rm = self.residuals(&xp);
            xp[p] = x[p];
            j.set_column(p, &((rp - rm) / (2.0 * h)));
        }
        j
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use camcal_core::{Correspondence, ImageSize};
    use nalgebra::Point3;

    fn view(k: &Intrinsics, pose: &Pose) -> ViewObservation {
        let correspondences = (0..12u32)
            .map(|id| {
                let object = Point3::new((id % 4) as f64 * 20.0, (id / 4) as f64 * 20.0, 0.0);
                let image = project(k, &[], pose, &object).expect("visible");
                Correspondence { id, object, image }
            })
            .collect();
        ViewObservation {
            source: "synthetic".into(),
            image_size: ImageSize::new(640, 480),
            correspondences,
        }
    }

    #[test]
    fn layout_offsets() {
        let fixed = ParamLayout {
            free_principal_point: false,
            distortion_len: 5,
            views: 3,
        };
        assert_eq!(fixed.shared_len(), 7);
        assert_eq!(fixed.pose_offset(1), 13);
        assert_eq!(fixed.len(), 25);

        let free = ParamLayout {
            free_principal_point: true,
            ..fixed
        };
        assert_eq!(free.len(), 27);
    }

    #[test]
    fn pack_and_unpack_agree() {
        let layout = ParamLayout {
            free_principal_point: true,
            distortion_len: 4,
            views: 2,
        };
        let k = Intrinsics::new(800.0, 810.0, 320.0, 240.0);
        let poses = [
            Pose::new(Vector3::new(0.1, 0.2, 0.3), Vector3::new(1.0, 2.0, 3.0)),
            Pose::new(Vector3::new(-0.1, 0.0, 0.0), Vector3::new(4.0, 5.0, 6.0)),
        ];
        let x = layout.pack(&k, &[0.1, -0.02, 0.001, 0.0], &poses);
        assert_eq!(layout.intrinsics(&x, Point2::origin()), k);
        assert_eq!(layout.distortion(&x), &[0.1, -0.02, 0.001, 0.0]);
        assert_eq!(layout.pose(&x, 1), poses[1]);
    }

    #[test]
    fn residuals_vanish_at_the_truth_and_jacobian_is_blockwise() {
        let k = Intrinsics::new(800.0, 800.0, 319.5, 239.5);
        let poses = [
            Pose::new(Vector3::new(0.2, 0.0, 0.0), Vector3::new(-30.0, -20.0, 500.0)),
            Pose::new(Vector3::new(0.0, -0.2, 0.1), Vector3::new(-30.0, -20.0, 520.0)),
        ];
        let views: Vec<_> = poses.iter().map(|p| view(&k, p)).collect();
        let layout = ParamLayout {
            free_principal_point: false,
            distortion_len: 5,
            views: 2,
        };
        let problem = PlanarCalibrationProblem::new(&views, layout, Point2::new(319.5, 239.5));
        let x = layout.pack(&k, &[0.0; 5], &poses);
        assert!(problem.residuals(&x).amax() < 1e-9);

        let j = problem.jacobian(&x);
        assert_eq!(j.shape(), (48, layout.len()));
        // View 0 rows do not depend on view 1's pose.
        let o1 = layout.pose_offset(1);
        for row in 0..24 {
            for col in o1..o1 + 6 {
                assert_eq!(j[(row, col)], 0.0);
            }
        }
        // d(u)/d(fx) equals the normalized x coordinate.
        let pc = poses[0].transform(&views[0].correspondences[5].object);
        assert_relative_eq!(j[(10, 0)], pc.x / pc.z, epsilon = 1e-6);
    }
}
