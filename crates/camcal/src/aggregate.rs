//! Gating of extracted views into a calibration session.

use crate::error::{CalibrationError, SkipReason};
use crate::extract::ExtractionOutcome;
use camcal_core::{CalibrationSession, ImageSize, ViewObservation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// An image that contributed no view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedImage {
    pub source: String,
    pub reason: SkipReason,
}

/// Extraction counts of one run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub attempted: usize,
    pub accepted: usize,
    pub decode_failures: usize,
    pub target_not_found: usize,
    pub size_inconsistent: usize,
}

/// What the view-count gate produced for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregation {
    pub summary: ExtractionSummary,
    /// Images that contributed no view, in input order.
    pub skipped: Vec<SkippedImage>,
    pub session: Result<CalibrationSession, CalibrationError>,
}

/// Collects extraction outcomes in input order.
///
/// The first accepted view fixes the session image size; later views with
/// other dimensions are skipped.
#[derive(Clone, Debug)]
pub struct ViewAggregator {
    required: usize,
    image_size: Option<ImageSize>,
    views: Vec<ViewObservation>,
    skipped: Vec<SkippedImage>,
    summary: ExtractionSummary,
}

impl ViewAggregator {
    pub fn new(required: usize) -> Self {
        Self {
            required,
            image_size: None,
            views: Vec::new(),
            skipped: Vec::new(),
            summary: ExtractionSummary::default(),
        }
    }

    pub fn push(&mut self, outcome: ExtractionOutcome) {
        self.summary.attempted += 1;
        match outcome {
            ExtractionOutcome::Extracted(view) => {
                let expected = *self.image_size.get_or_insert(view.image_size);
                if view.image_size != expected {
                    warn!(
                        "{}: image is {}, session images are {}; view skipped",
                        view.source, view.image_size, expected
                    );
                    self.skip(
                        view.source,
                        SkipReason::ImageSizeInconsistent {
                            expected,
                            actual: view.image_size,
                        },
                    );
                    return;
                }
                debug!("{}: {} correspondences", view.source, view.len());
                self.summary.accepted += 1;
                self.views.push(view);
            }
            ExtractionOutcome::Skipped { source, reason } => {
                debug!("{source}: skipped ({reason})");
                self.skip(source, reason);
            }
        }
    }

    fn skip(&mut self, source: String, reason: SkipReason) {
        match reason {
            SkipReason::ImageDecodeFailure(_) => self.summary.decode_failures += 1,
            SkipReason::TargetNotFound => self.summary.target_not_found += 1,
            SkipReason::ImageSizeInconsistent { .. } => self.summary.size_inconsistent += 1,
        }
        self.skipped.push(SkippedImage { source, reason });
    }

    pub fn summary(&self) -> &ExtractionSummary {
        &self.summary
    }

    pub fn skipped(&self) -> &[SkippedImage] {
        &self.skipped
    }

    /// Apply the view-count gate.
    pub fn finish(self) -> Aggregation {
        let summary = self.summary;
        let found = self.views.len();
        let session = match self.image_size {
            None => Err(CalibrationError::NoTargetDetected {
                attempted: summary.attempted,
            }),
            Some(_) if found < self.required => Err(CalibrationError::InsufficientViews {
                found,
                required: self.required,
            }),
            Some(image_size) => Ok(CalibrationSession {
                image_size,
                views: self.views,
            }),
        };
        Aggregation {
            summary,
            skipped: self.skipped,
            session,
        }
    }
}

/// Aggregate `outcomes` against a minimum of `required` views.
pub fn aggregate(
    outcomes: impl IntoIterator<Item = ExtractionOutcome>,
    required: usize,
) -> Aggregation {
    let mut agg = ViewAggregator::new(required);
    for outcome in outcomes {
        agg.push(outcome);
    }
    agg.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(source: &str, w: usize, h: usize) -> ExtractionOutcome {
        ExtractionOutcome::Extracted(ViewObservation {
            source: source.to_string(),
            image_size: ImageSize::new(w, h),
            correspondences: Vec::new(),
        })
    }

    fn not_found(source: &str) -> ExtractionOutcome {
        ExtractionOutcome::Skipped {
            source: source.to_string(),
            reason: SkipReason::TargetNotFound,
        }
    }

    #[test]
    fn too_few_views_reports_both_counts() {
        let outcomes = (0..9).map(|i| view(&format!("img{i}"), 640, 480));
        let Aggregation {
            summary, session, ..
        } = aggregate(outcomes, 10);
        let err = session.unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientViews {
                found: 9,
                required: 10
            }
        );
        let msg = err.to_string();
        assert!(msg.contains('9') && msg.contains("10"), "{msg}");
        assert_eq!(summary.accepted, 9);
    }

    #[test]
    fn no_views_is_a_distinct_error() {
        let agg = aggregate((0..4).map(|i| not_found(&format!("img{i}"))), 10);
        let err = agg.session.unwrap_err();
        assert_eq!(err, CalibrationError::NoTargetDetected { attempted: 4 });
        assert!(err.to_string().contains("no calibration target detected"));
        assert_eq!(agg.summary.target_not_found, 4);
        assert_eq!(agg.skipped.len(), 4);
        assert!(agg.skipped.iter().all(|s| s.reason == SkipReason::TargetNotFound));
    }

    #[test]
    fn first_view_fixes_the_image_size() {
        let mut agg = ViewAggregator::new(2);
        agg.push(not_found("a"));
        agg.push(view("b", 640, 480));
        agg.push(view("c", 800, 600));
        agg.push(view("d", 640, 480));
        assert_eq!(agg.skipped().len(), 2);
        assert_eq!(
            agg.skipped()[1].reason,
            SkipReason::ImageSizeInconsistent {
                expected: ImageSize::new(640, 480),
                actual: ImageSize::new(800, 600),
            }
        );
        let Aggregation {
            summary,
            skipped,
            session,
        } = agg.finish();
        let session = session.expect("session");
        let skipped: Vec<&str> = skipped.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(skipped, ["a", "c"]);
        assert_eq!(session.image_size, ImageSize::new(640, 480));
        let sources: Vec<&str> = session.views.iter().map(|v| v.source.as_str()).collect();
        assert_eq!(sources, ["b", "d"]);
        assert_eq!(
            summary,
            ExtractionSummary {
                attempted: 4,
                accepted: 2,
                decode_failures: 0,
                target_not_found: 1,
                size_inconsistent: 1,
            }
        );
    }
}
