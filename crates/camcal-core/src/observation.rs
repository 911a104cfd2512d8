//! Per-view point correspondences and the session that collects them.

use crate::{ImageSize, ReferencePoint3D};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One reference point paired with its observed image location.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Stable point identity (`row * inner_corners_x + col`).
    pub id: u32,
    pub object: ReferencePoint3D,
    pub image: Point2<f64>,
}

/// Correspondences extracted from a single image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewObservation {
    /// Where the view came from (usually the image path).
    pub source: String,
    pub image_size: ImageSize,
    pub correspondences: Vec<Correspondence>,
}

impl ViewObservation {
    #[inline]
    pub fn len(&self) -> usize {
        self.correspondences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.correspondences.is_empty()
    }

    pub fn object_points(&self) -> impl Iterator<Item = &ReferencePoint3D> + '_ {
        self.correspondences.iter().map(|c| &c.object)
    }

    pub fn image_points(&self) -> impl Iterator<Item = &Point2<f64>> + '_ {
        self.correspondences.iter().map(|c| &c.image)
    }
}

/// Accepted views of one calibration run; all share `image_size`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    pub image_size: ImageSize,
    pub views: Vec<ViewObservation>,
}

impl CalibrationSession {
    pub fn total_points(&self) -> usize {
        self.views.iter().map(ViewObservation::len).sum()
    }
}
