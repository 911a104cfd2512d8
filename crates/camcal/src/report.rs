//! Run outcomes as plain data.

use crate::aggregate::{ExtractionSummary, SkippedImage};
use crate::error::CalibrationError;
use camcal_solver::{CalibrationOutput, Intrinsics, Termination};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationResult {
    pub success: bool,
    pub intrinsics: Option<Intrinsics>,
    pub distortion: Option<Vec<f64>>,
    pub rms_reprojection_error: Option<f64>,
    pub error_message: Option<String>,
}

impl CalibrationResult {
    pub fn succeeded(output: &CalibrationOutput) -> Self {
        Self {
            success: true,
            intrinsics: Some(output.intrinsics),
            distortion: Some(output.distortion.clone()),
            rms_reprojection_error: Some(output.rms),
            error_message: None,
        }
    }

    pub fn failed(err: &CalibrationError) -> Self {
        Self {
            success: false,
            intrinsics: None,
            distortion: None,
            rms_reprojection_error: None,
            error_message: Some(err.to_string()),
        }
    }

    /// Flat wire form.
    pub fn to_record(&self) -> CalibrationRecord {
        let k = self.intrinsics.unwrap_or(Intrinsics::new(0.0, 0.0, 0.0, 0.0));
        CalibrationRecord {
            success: self.success,
            fx: k.fx,
            fy: k.fy,
            cx: k.cx,
            cy: k.cy,
            distortion_coefficients: self.distortion.clone().unwrap_or_default(),
            rms_error: self.rms_reprojection_error.unwrap_or(0.0),
            error_message: self.error_message.clone(),
        }
    }
}

/// Flat JSON record returned to callers. Numbers are zero and the
/// coefficient list empty on failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRecord {
    pub success: bool,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion_coefficients: Vec<f64>,
    pub rms_error: f64,
    pub error_message: Option<String>,
}

/// Where a run's views went and how the solve ended.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub extraction: ExtractionSummary,
    /// `(source, reason)` for every skipped image, in input order.
    pub skipped: Vec<(String, String)>,
    /// Views the solver could not seed.
    pub solver_dropped_views: Vec<String>,
    /// `(source, rms)` for every view in the solve.
    pub per_view_rms: Vec<(String, f64)>,
    pub iterations: Option<usize>,
    pub termination: Option<Termination>,
}

impl RunDiagnostics {
    pub fn from_extraction(summary: ExtractionSummary, skipped: &[SkippedImage]) -> Self {
        Self {
            extraction: summary,
            skipped: skipped
                .iter()
                .map(|s| (s.source.clone(), s.reason.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn record_solve(&mut self, output: &CalibrationOutput) {
        self.solver_dropped_views = output.dropped_views.clone();
        self.per_view_rms = output
            .view_sources
            .iter()
            .cloned()
            .zip(output.per_view_rms.iter().copied())
            .collect();
        self.iterations = Some(output.iterations);
        self.termination = Some(output.termination);
    }
}

/// What the engine returns: the result plus run diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationReport {
    pub result: CalibrationResult,
    pub diagnostics: RunDiagnostics,
}

impl CalibrationReport {
    pub fn failure(err: &CalibrationError, diagnostics: RunDiagnostics) -> Self {
        Self {
            result: CalibrationResult::failed(err),
            diagnostics,
        }
    }

    pub fn record(&self) -> CalibrationRecord {
        self.result.to_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_record_is_zeroed_with_a_message() {
        let err = CalibrationError::InsufficientViews {
            found: 3,
            required: 10,
        };
        let record = CalibrationResult::failed(&err).to_record();
        assert!(!record.success);
        assert_eq!((record.fx, record.fy, record.cx, record.cy), (0.0, 0.0, 0.0, 0.0));
        assert!(record.distortion_coefficients.is_empty());
        assert_eq!(record.rms_error, 0.0);
        assert_eq!(
            record.error_message.as_deref(),
            Some("not enough valid views: found 3, need at least 10")
        );
    }

    #[test]
    fn record_serialises_with_documented_field_names() {
        let record = CalibrationRecord {
            success: true,
            fx: 800.0,
            fy: 801.0,
            cx: 319.5,
            cy: 239.5,
            distortion_coefficients: vec![0.1, -0.2, 0.0, 0.0, 0.01],
            rms_error: 0.2,
            error_message: None,
        };
        let value = serde_json::to_value(&record).expect("json");
        let obj = value.as_object().expect("object");
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "cx",
                "cy",
                "distortionCoefficients",
                "errorMessage",
                "fx",
                "fy",
                "rmsError",
                "success"
            ]
        );
        assert!(obj["errorMessage"].is_null());
    }
}
