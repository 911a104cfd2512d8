use camcal_core::SubpixParams;
use serde::{Deserialize, Serialize};

/// ChESS corner response settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessResponseParams {
    /// Radius of the 16-sample ring, pixels. Squares should be at least
    /// twice this size in the image.
    pub ring_radius: u32,
    /// Keep maxima above this fraction of the strongest response.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius, pixels.
    pub nms_radius: u32,
    /// Upper bound on candidates handed to the grid search.
    pub max_corners: usize,
}

impl Default for ChessResponseParams {
    fn default() -> Self {
        Self {
            ring_radius: 5,
            threshold_rel: 0.15,
            nms_radius: 3,
            max_corners: 4096,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    pub k_neighbors: usize,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 600.0,
            k_neighbors: 8,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Parameters of the chessboard extractor.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    pub response: ChessResponseParams,
    pub graph: GridGraphParams,
    /// Defaults to an 11×11 window, 30 iterations, 0.001 px.
    pub subpix: SubpixParams,
}
