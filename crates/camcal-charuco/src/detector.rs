use crate::board::CharucoBoard;
use crate::interpolate::{predict_corners, CornerPrediction};
use crate::params::CharucoParams;
use camcal_aruco::{DetectedMarker, Dictionary, MarkerRecognizer};
use camcal_core::{refine_corner, GrayImageView, SubpixParams};
use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Errors returned by the ChArUco detector.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CharucoDetectError {
    #[error("no board markers decoded")]
    NoMarkers,
    #[error("only {found} ChArUco corners identified, need at least {required}")]
    TooFewCorners { found: usize, required: usize },
}

/// One identified inner corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharucoCorner {
    /// Stable point identity on the target.
    pub id: u32,
    pub position: Point2<f32>,
}

/// Markers and identified corners of one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharucoDetection {
    pub markers: Vec<DetectedMarker>,
    /// Sorted by id.
    pub corners: Vec<CharucoCorner>,
}

/// Identifies ChArUco inner corners through the markers around them.
#[derive(Clone, Debug)]
pub struct CharucoDetector {
    board: CharucoBoard,
    dictionary: Dictionary,
    params: CharucoParams,
}

impl CharucoDetector {
    pub fn new(board: CharucoBoard, dictionary: Dictionary, params: CharucoParams) -> Self {
        Self {
            board,
            dictionary,
            params,
        }
    }

    #[inline]
    pub fn board(&self) -> &CharucoBoard {
        &self.board
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    #[inline]
    pub fn params(&self) -> &CharucoParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, img, recognizer),
            fields(width = img.width, height = img.height)
        )
    )]
    pub fn detect(
        &self,
        img: &GrayImageView<'_>,
        recognizer: &dyn MarkerRecognizer,
    ) -> Result<CharucoDetection, CharucoDetectError> {
        let markers: Vec<DetectedMarker> = recognizer
            .recognize(img, &self.dictionary)
            .into_iter()
            .filter(|m| (m.id as usize) < self.board.marker_count())
            .collect();
        if markers.is_empty() {
            return Err(CharucoDetectError::NoMarkers);
        }

        let corners = self.corners_from_markers(img, &markers);
        if corners.len() < self.params.min_corners {
            return Err(CharucoDetectError::TooFewCorners {
                found: corners.len(),
                required: self.params.min_corners,
            });
        }

        info!(
            "charuco: {} markers, {} corners identified",
            markers.len(),
            corners.len()
        );
        Ok(CharucoDetection { markers, corners })
    }

    /// Predict, refine and validate the corners around `markers`.
    pub fn corners_from_markers(
        &self,
        img: &GrayImageView<'_>,
        markers: &[DetectedMarker],
    ) -> Vec<CharucoCorner> {
        let predictions = predict_corners(&self.board, markers);
        let total = predictions.len();
        let corners: Vec<CharucoCorner> = predictions
            .into_iter()
            .filter_map(|pred| self.refine_prediction(img, &pred))
            .collect();
        debug!("charuco: {} of {} predicted corners kept", corners.len(), total);
        corners
    }

    fn refine_prediction(
        &self,
        img: &GrayImageView<'_>,
        pred: &CornerPrediction,
    ) -> Option<CharucoCorner> {
        let p = &self.params;
        if pred.spread_px > p.max_prediction_spread_rel * pred.square_px {
            debug!("corner {}: markers disagree by {:.2}px", pred.id, pred.spread_px);
            return None;
        }

        let s = self.board.square_size_mm() as f32;
        let m = self.board.marker_size_mm() as f32;
        let margin_px = pred.square_px * (s - m) / (2.0 * s);
        let max_hw = p.subpix.half_window.max(2);
        let half_window =
            ((p.window_margin_frac * margin_px).floor().max(0.0) as usize).clamp(2, max_hw);

        let border = (half_window + 2) as f32;
        let pos = pred.position;
        if pos.x < border
            || pos.y < border
            || pos.x >= img.width as f32 - border
            || pos.y >= img.height as f32 - border
        {
            return None;
        }

        let subpix = SubpixParams {
            half_window,
            ..p.subpix.clone()
        };
        let refined = refine_corner(img, pos, &subpix);
        if (refined - pos).norm() > p.max_shift_rel * pred.square_px {
            debug!("corner {}: refinement drifted", pred.id);
            return None;
        }
        Some(CharucoCorner {
            id: pred.id,
            position: refined,
        })
    }
}
