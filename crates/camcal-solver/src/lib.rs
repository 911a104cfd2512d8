//! Planar-target camera calibration.
//!
//! Given a [`CalibrationSession`](camcal_core::CalibrationSession) of
//! reference-point/image-point correspondences, [`solve`]:
//!
//! 1. fits one homography per view,
//! 2. seeds the focal lengths (and optionally the principal point) in
//!    closed form, then every view pose from its homography,
//! 3. rejects sessions whose views barely differ in orientation,
//! 4. jointly refines intrinsics, distortion and poses with
//!    Levenberg-Marquardt on the reprojection error,
//! 5. validates the result and reports RMS errors.
//!
//! ```no_run
//! use camcal_core::CalibrationSession;
//! use camcal_solver::{solve, SolverOptions};
//!
//! # fn run(session: &CalibrationSession) -> Result<(), camcal_solver::SolverError> {
//! let out = solve(session, &SolverOptions::default())?;
//! println!("fx={} fy={} rms={}", out.intrinsics.fx, out.intrinsics.fy, out.rms);
//! # Ok(())
//! # }
//! ```

mod calibrate;
mod camera;
mod error;
pub mod linear;
pub mod lm;
mod pose;
pub mod problem;
pub mod synthetic;

pub use calibrate::{rotation_spread_deg, solve, CalibrationOutput, SolverOptions};
pub use camera::{distort, project, DistortionModel, Intrinsics};
pub use error::SolverError;
pub use lm::{SolveOptions, SolveReport, Termination};
pub use pose::Pose;
