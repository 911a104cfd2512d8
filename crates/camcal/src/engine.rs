//! End-to-end calibration runs.

use crate::aggregate::{aggregate, Aggregation};
use crate::config::{CalibrationRequest, EngineConfig};
use crate::error::CalibrationError;
use crate::extract::{ExtractionOutcome, TargetExtractor};
use crate::loader::{FsImageLoader, ImageLoader};
use crate::report::{CalibrationReport, CalibrationResult, RunDiagnostics};
use camcal_aruco::MarkerRecognizer;
use camcal_core::{TargetConfig, TargetConfigRecord};
use camcal_solver::solve;
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runs calibrations with one configuration. Holds no per-run state, so
/// a single engine can serve any number of sequential or concurrent calls.
pub struct CalibrationEngine {
    config: EngineConfig,
    loader: Arc<dyn ImageLoader>,
    recognizer: Option<Arc<dyn MarkerRecognizer>>,
}

impl CalibrationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loader: Arc::new(FsImageLoader),
            recognizer: None,
        }
    }

    /// Replace the file-system image loader.
    pub fn with_loader(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Replace the built-in ArUco marker recognizer.
    pub fn with_recognizer(mut self, recognizer: impl MarkerRecognizer + 'static) -> Self {
        self.recognizer = Some(Arc::new(recognizer));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Calibrate from the images of `request`. Every failure is reported
    /// in the returned result; this never panics on bad input.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "info", skip(self, request), fields(images = request.image_paths.len()))
    )]
    pub fn calibrate(&self, request: &CalibrationRequest) -> CalibrationReport {
        let mut diagnostics = RunDiagnostics::default();
        match self.run(request, &mut diagnostics) {
            Ok(result) => CalibrationReport {
                result,
                diagnostics,
            },
            Err(err) => {
                warn!("calibration failed: {err}");
                CalibrationReport::failure(&err, diagnostics)
            }
        }
    }

    fn run(
        &self,
        request: &CalibrationRequest,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<CalibrationResult, CalibrationError> {
        let target = TargetConfig::try_from(request.target_config.clone())?;
        let extractor = self.extractor(&target)?;
        let required = request
            .min_views_override
            .unwrap_or_else(|| self.config.min_views(target.kind));
        info!(
            "calibrating {} target {}x{} from {} images (need {} views)",
            target.kind.as_str(),
            target.inner_corners_x,
            target.inner_corners_y,
            request.image_paths.len(),
            required
        );

        let outcomes = self.extract_all(&extractor, &request.image_paths);
        let Aggregation {
            summary,
            skipped,
            session,
        } = aggregate(outcomes, required);
        *diagnostics = RunDiagnostics::from_extraction(summary, &skipped);
        let session = session?;

        let output = solve(&session, &self.config.solver)?;
        diagnostics.record_solve(&output);
        Ok(CalibrationResult::succeeded(&output))
    }

    fn extractor(&self, target: &TargetConfig) -> Result<TargetExtractor, CalibrationError> {
        TargetExtractor::new(target, &self.config, self.recognizer.clone())
    }

    /// Extract every path; output order matches `paths`.
    fn extract_all(&self, extractor: &TargetExtractor, paths: &[PathBuf]) -> Vec<ExtractionOutcome> {
        let loader = self.loader.as_ref();
        if self.config.parallel {
            paths
                .par_iter()
                .map(|p| extractor.extract_path(loader, p))
                .collect()
        } else {
            paths
                .iter()
                .map(|p| extractor.extract_path(loader, p))
                .collect()
        }
    }

    /// Whether `target` is found in the image at `path`.
    pub fn detect_target(
        &self,
        target: &TargetConfigRecord,
        path: &Path,
    ) -> Result<bool, CalibrationError> {
        let target = TargetConfig::try_from(target.clone())?;
        let extractor = self.extractor(&target)?;
        let outcome = extractor.extract_path(self.loader.as_ref(), path);
        info!(
            "{}: target {}",
            outcome.source(),
            if matches!(outcome, ExtractionOutcome::Extracted(_)) {
                "found"
            } else {
                "not found"
            }
        );
        Ok(matches!(outcome, ExtractionOutcome::Extracted(_)))
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
