//! Camera calibration engine.
//!
//! This crate ties the `camcal-*` workspace together:
//! - per-image correspondence extraction for chessboard and ChArUco targets
//! - aggregation of views with a configurable minimum view count
//! - the intrinsics and distortion solve, with a flat result record
//!
//! ## Quickstart
//!
//! ```no_run
//! use camcal::{CalibrationEngine, CalibrationRequest, EngineConfig};
//! use camcal::core::TargetConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let target = TargetConfig::chessboard(9, 6, 25.0)?;
//! let engine = CalibrationEngine::new(EngineConfig::default());
//! let request = CalibrationRequest::new(vec!["view_00.png", "view_01.png"], &target);
//! let report = engine.calibrate(&request);
//! println!("{}", serde_json::to_string_pretty(&report.record())?);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `camcal::core`: images, homographies, targets, correspondences.
//! - `camcal::chessboard`: ChESS corners and chessboard grid recovery.
//! - `camcal::aruco`: dictionaries and the built-in marker recognizer.
//! - `camcal::charuco`: ChArUco board layout and corner interpolation.
//! - `camcal::solver`: linear seeding and Levenberg–Marquardt refinement.
//! - `camcal::synthetic`: rendered target images for tests and demos.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod loader;
pub mod report;
pub mod synthetic;

pub use camcal_aruco as aruco;
pub use camcal_charuco as charuco;
pub use camcal_chessboard as chessboard;
pub use camcal_core as core;
pub use camcal_solver as solver;

pub use aggregate::{aggregate, Aggregation, ExtractionSummary, SkippedImage, ViewAggregator};
pub use config::{CalibrationRequest, ConfigIoError, EngineConfig};
pub use engine::CalibrationEngine;
pub use error::{CalibrationError, SkipReason};
pub use extract::{ExtractionOutcome, TargetExtractor};
pub use loader::{FsImageLoader, ImageLoadError, ImageLoader};
pub use report::{CalibrationRecord, CalibrationReport, CalibrationResult, RunDiagnostics};
