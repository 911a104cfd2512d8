use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Chessboard corner candidate in image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub position: Point2<f32>,
    /// Direction of the diagonal through the bright squares, radians mod π.
    pub orientation: f32,
    /// Detector response; larger is more corner-like.
    pub strength: f32,
}
