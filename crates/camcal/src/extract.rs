//! Per-image correspondence extraction.

use crate::config::EngineConfig;
use crate::error::{CalibrationError, SkipReason};
use crate::loader::ImageLoader;
use camcal_aruco::{Dictionary, MarkerRecognizer, QuadMarkerRecognizer};
use camcal_charuco::{CharucoBoard, CharucoDetector};
use camcal_chessboard::ChessboardDetector;
use camcal_core::{
    Correspondence, DictionaryId, GrayImageView, TargetConfig, TargetConfigError, TargetKind,
    ViewObservation,
};
use log::debug;
use nalgebra::Point2;
use std::path::Path;
use std::sync::Arc;

/// Result of processing one image.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtractionOutcome {
    Extracted(ViewObservation),
    Skipped { source: String, reason: SkipReason },
}

impl ExtractionOutcome {
    pub fn source(&self) -> &str {
        match self {
            ExtractionOutcome::Extracted(view) => &view.source,
            ExtractionOutcome::Skipped { source, .. } => source,
        }
    }
}

/// Target-specific extractor, selected by [`TargetKind`].
pub enum TargetExtractor {
    Chessboard {
        target: TargetConfig,
        detector: ChessboardDetector,
    },
    Charuco {
        target: TargetConfig,
        detector: CharucoDetector,
        recognizer: Arc<dyn MarkerRecognizer>,
    },
}

impl TargetExtractor {
    /// Build the extractor for `target`. ChArUco targets resolve their
    /// dictionary here, so a missing code table fails before any image work.
    /// `recognizer` replaces the built-in marker recognizer.
    pub fn new(
        target: &TargetConfig,
        config: &EngineConfig,
        recognizer: Option<Arc<dyn MarkerRecognizer>>,
    ) -> Result<Self, CalibrationError> {
        target.validate()?;
        match target.kind {
            TargetKind::Chessboard => Ok(TargetExtractor::Chessboard {
                target: target.clone(),
                detector: ChessboardDetector::new(config.chessboard.clone()),
            }),
            TargetKind::Charuco => {
                let id: DictionaryId = target
                    .dictionary_id
                    .ok_or(TargetConfigError::MissingDictionary)?;
                let dictionary = Dictionary::resolve(id, config.dictionary_path.as_deref())?;
                let board = CharucoBoard::new(target, &dictionary)?;
                let recognizer = recognizer.unwrap_or_else(|| {
                    Arc::new(QuadMarkerRecognizer::new(config.aruco.clone()))
                });
                Ok(TargetExtractor::Charuco {
                    target: target.clone(),
                    detector: CharucoDetector::new(board, dictionary, config.charuco.clone()),
                    recognizer,
                })
            }
        }
    }

    pub fn target(&self) -> &TargetConfig {
        match self {
            TargetExtractor::Chessboard { target, .. } | TargetExtractor::Charuco { target, .. } => {
                target
            }
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.target().kind
    }

    /// Correspondences of one image, sorted by point identity, or `None`
    /// when the target is not found.
    pub fn extract(&self, source: &str, img: &GrayImageView<'_>) -> Option<ViewObservation> {
        let target = self.target();
        let points: Vec<(u32, Point2<f32>)> = match self {
            TargetExtractor::Chessboard { detector, .. } => {
                let det = detector.detect(img, target.inner_corners_x, target.inner_corners_y)?;
                det.corners
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| (i as u32, p))
                    .collect()
            }
            TargetExtractor::Charuco {
                detector,
                recognizer,
                ..
            } => match detector.detect(img, recognizer.as_ref()) {
                Ok(det) => det.corners.into_iter().map(|c| (c.id, c.position)).collect(),
                Err(err) => {
                    debug!("{source}: {err}");
                    return None;
                }
            },
        };

        let correspondences = points
            .into_iter()
            .filter_map(|(id, p)| {
                Some(Correspondence {
                    id,
                    object: target.reference_point(id)?,
                    image: Point2::new(p.x as f64, p.y as f64),
                })
            })
            .collect();
        Some(ViewObservation {
            source: source.to_string(),
            image_size: img.size(),
            correspondences,
        })
    }

    /// Load `path` through `loader` and extract it.
    pub fn extract_path(&self, loader: &dyn ImageLoader, path: &Path) -> ExtractionOutcome {
        let source = path.display().to_string();
        let img = match loader.load(path) {
            Ok(img) => img,
            Err(err) => {
                return ExtractionOutcome::Skipped {
                    source,
                    reason: SkipReason::ImageDecodeFailure(err.to_string()),
                }
            }
        };
        match self.extract(&source, &img.view()) {
            Some(view) => ExtractionOutcome::Extracted(view),
            None => ExtractionOutcome::Skipped {
                source,
                reason: SkipReason::TargetNotFound,
            },
        }
    }
}
