use camcal_core::SubpixParams;
use serde::{Deserialize, Serialize};

/// Configuration for marker-driven corner identification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharucoParams {
    /// A view is accepted only with at least this many identified corners.
    pub min_corners: usize,
    /// Predictions of one corner from different markers must agree within
    /// this fraction of a square side.
    pub max_prediction_spread_rel: f32,
    /// Refined corners moving further than this fraction of a square side
    /// from their prediction are dropped.
    pub max_shift_rel: f32,
    /// Refinement half-window as a fraction of the white margin around markers.
    pub window_margin_frac: f32,
    /// Iteration and convergence settings; `half_window` is derived per view
    /// and clamped to `2..=subpix.half_window`.
    pub subpix: SubpixParams,
}

impl Default for CharucoParams {
    fn default() -> Self {
        Self {
            min_corners: 5,
            max_prediction_spread_rel: 0.25,
            max_shift_rel: 0.25,
            window_margin_frac: 0.8,
            subpix: SubpixParams::default(),
        }
    }
}
