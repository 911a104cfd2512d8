//! Calibration target description and its reference geometry.
//!
//! Reference points are laid out row-major on the target plane: inner corner
//! `(row i, column j)` sits at `(j * square, i * square, 0)` millimetres and
//! carries the identity `i * inner_corners_x + j`.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Target-local 3D point in millimetres; `z` is always zero.
pub type ReferencePoint3D = Point3<f64>;

/// Default marker side relative to the square side for ChArUco boards.
pub const DEFAULT_MARKER_SIZE_REL: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Chessboard,
    #[serde(alias = "ChArUco")]
    Charuco,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Chessboard => "chessboard",
            TargetKind::Charuco => "charuco",
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = TargetConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chessboard" | "checkerboard" => Ok(TargetKind::Chessboard),
            "charuco" => Ok(TargetKind::Charuco),
            _ => Err(TargetConfigError::UnsupportedKind(s.to_string())),
        }
    }
}

/// ArUco dictionary selector.
///
/// Predefined ids name the OpenCV tables; their codes are supplied at run
/// time. `Generated` dictionaries are produced deterministically in-process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DictionaryId {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_4X4_250")]
    Dict4x4_250,
    #[serde(rename = "DICT_4X4_1000")]
    Dict4x4_1000,
    #[serde(rename = "DICT_5X5_50")]
    Dict5x5_50,
    #[serde(rename = "DICT_5X5_100")]
    Dict5x5_100,
    #[serde(rename = "DICT_5X5_250")]
    Dict5x5_250,
    #[serde(rename = "DICT_5X5_1000")]
    Dict5x5_1000,
    #[serde(rename = "DICT_6X6_50")]
    Dict6x6_50,
    #[serde(rename = "DICT_6X6_100")]
    Dict6x6_100,
    #[serde(rename = "DICT_6X6_250")]
    Dict6x6_250,
    #[serde(rename = "DICT_6X6_1000")]
    Dict6x6_1000,
    #[serde(rename = "DICT_7X7_50")]
    Dict7x7_50,
    #[serde(rename = "DICT_7X7_100")]
    Dict7x7_100,
    #[serde(rename = "DICT_7X7_250")]
    Dict7x7_250,
    #[serde(rename = "DICT_7X7_1000")]
    Dict7x7_1000,
    #[serde(rename = "generated", rename_all = "camelCase")]
    Generated {
        marker_size: usize,
        markers: usize,
        min_distance: u8,
    },
}

impl DictionaryId {
    /// `(marker_size, marker_count)` of the dictionary.
    pub fn shape(&self) -> (usize, usize) {
        use DictionaryId::*;
        match *self {
            Dict4x4_50 => (4, 50),
            Dict4x4_100 => (4, 100),
            Dict4x4_250 => (4, 250),
            Dict4x4_1000 => (4, 1000),
            Dict5x5_50 => (5, 50),
            Dict5x5_100 => (5, 100),
            Dict5x5_250 => (5, 250),
            Dict5x5_1000 => (5, 1000),
            Dict6x6_50 => (6, 50),
            Dict6x6_100 => (6, 100),
            Dict6x6_250 => (6, 250),
            Dict6x6_1000 => (6, 1000),
            Dict7x7_50 => (7, 50),
            Dict7x7_100 => (7, 100),
            Dict7x7_250 => (7, 250),
            Dict7x7_1000 => (7, 1000),
            Generated {
                marker_size,
                markers,
                ..
            } => (marker_size, markers),
        }
    }

    pub fn marker_size(&self) -> usize {
        self.shape().0
    }

    /// Canonical name, e.g. `DICT_4X4_50`.
    pub fn name(&self) -> String {
        match *self {
            DictionaryId::Generated {
                marker_size,
                markers,
                min_distance,
            } => format!("GENERATED_{marker_size}X{marker_size}_{markers}_D{min_distance}"),
            _ => {
                let (n, count) = self.shape();
                format!("DICT_{n}X{n}_{count}")
            }
        }
    }
}

/// Validation errors for a target description.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TargetConfigError {
    #[error("unsupported target type '{0}'")]
    UnsupportedKind(String),
    #[error("inner corner counts must both be greater than 1 (got {x}x{y})")]
    InvalidInnerCorners { x: u32, y: u32 },
    #[error("square size must be a positive number of millimetres (got {0})")]
    InvalidSquareSize(f64),
    #[error("marker size must be in (0, {square}) mm (got {marker})")]
    InvalidMarkerSize { marker: f64, square: f64 },
    #[error("a ChArUco target requires a dictionaryId")]
    MissingDictionary,
    #[error("dictionary {0} uses more than 64 bits per marker")]
    UnsupportedDictionary(String),
}

/// Wire form of a target description, as supplied by callers.
///
/// `kind` is kept as free text so that unknown target types can be reported
/// as such instead of as a parse error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfigRecord {
    pub kind: String,
    pub inner_corners_x: u32,
    pub inner_corners_y: u32,
    #[serde(rename = "squareSizeMM")]
    pub square_size_mm: f64,
    #[serde(rename = "markerSizeMM", default, skip_serializing_if = "Option::is_none")]
    pub marker_size_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_id: Option<DictionaryId>,
}

/// Validated target description.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetConfig {
    pub kind: TargetKind,
    pub inner_corners_x: u32,
    pub inner_corners_y: u32,
    pub square_size_mm: f64,
    /// Marker side for ChArUco targets; `None` for chessboards.
    pub marker_size_mm: Option<f64>,
    pub dictionary_id: Option<DictionaryId>,
}

impl TargetConfig {
    /// Plain chessboard with the given inner corner counts.
    pub fn chessboard(
        inner_corners_x: u32,
        inner_corners_y: u32,
        square_size_mm: f64,
    ) -> Result<Self, TargetConfigError> {
        let cfg = Self {
            kind: TargetKind::Chessboard,
            inner_corners_x,
            inner_corners_y,
            square_size_mm,
            marker_size_mm: None,
            dictionary_id: None,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// ChArUco board; `marker_size_mm` defaults to 0.8 of the square.
    pub fn charuco(
        inner_corners_x: u32,
        inner_corners_y: u32,
        square_size_mm: f64,
        marker_size_mm: Option<f64>,
        dictionary_id: DictionaryId,
    ) -> Result<Self, TargetConfigError> {
        let cfg = Self {
            kind: TargetKind::Charuco,
            inner_corners_x,
            inner_corners_y,
            square_size_mm,
            marker_size_mm: Some(
                marker_size_mm.unwrap_or(square_size_mm * DEFAULT_MARKER_SIZE_REL),
            ),
            dictionary_id: Some(dictionary_id),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), TargetConfigError> {
        if self.inner_corners_x < 2 || self.inner_corners_y < 2 {
            return Err(TargetConfigError::InvalidInnerCorners {
                x: self.inner_corners_x,
                y: self.inner_corners_y,
            });
        }
        if !self.square_size_mm.is_finite() || self.square_size_mm <= 0.0 {
            return Err(TargetConfigError::InvalidSquareSize(self.square_size_mm));
        }
        if self.kind == TargetKind::Charuco {
            let dict = self
                .dictionary_id
                .ok_or(TargetConfigError::MissingDictionary)?;
            if dict.marker_size() == 0 || dict.marker_size() > 8 {
                return Err(TargetConfigError::UnsupportedDictionary(dict.name()));
            }
            let marker = self.marker_size_mm.unwrap_or(f64::NAN);
            if !marker.is_finite() || marker <= 0.0 || marker >= self.square_size_mm {
                return Err(TargetConfigError::InvalidMarkerSize {
                    marker,
                    square: self.square_size_mm,
                });
            }
        }
        Ok(())
    }

    /// Number of inner corners on the target.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.inner_corners_x as usize * self.inner_corners_y as usize
    }

    /// Stable identity of inner corner `(row, col)`.
    pub fn point_identity(&self, row: u32, col: u32) -> Option<u32> {
        if row >= self.inner_corners_y || col >= self.inner_corners_x {
            return None;
        }
        Some(row * self.inner_corners_x + col)
    }

    /// `(row, col)` of a point identity.
    pub fn grid_position(&self, id: u32) -> Option<(u32, u32)> {
        if id as usize >= self.point_count() {
            return None;
        }
        Some((id / self.inner_corners_x, id % self.inner_corners_x))
    }

    /// Reference point for a point identity.
    pub fn reference_point(&self, id: u32) -> Option<ReferencePoint3D> {
        let (row, col) = self.grid_position(id)?;
        Some(Point3::new(
            col as f64 * self.square_size_mm,
            row as f64 * self.square_size_mm,
            0.0,
        ))
    }
}

/// All reference points of the target in row-major order.
pub fn generate_reference_points(config: &TargetConfig) -> Vec<ReferencePoint3D> {
    let s = config.square_size_mm;
    (0..config.inner_corners_y)
        .flat_map(|i| {
            (0..config.inner_corners_x).map(move |j| Point3::new(j as f64 * s, i as f64 * s, 0.0))
        })
        .collect()
}

impl TryFrom<TargetConfigRecord> for TargetConfig {
    type Error = TargetConfigError;

    fn try_from(record: TargetConfigRecord) -> Result<Self, Self::Error> {
        let kind: TargetKind = record.kind.parse()?;
        let marker_size_mm = match kind {
            TargetKind::Chessboard => None,
            TargetKind::Charuco => Some(
                record
                    .marker_size_mm
                    .unwrap_or(record.square_size_mm * DEFAULT_MARKER_SIZE_REL),
            ),
        };
        let cfg = Self {
            kind,
            inner_corners_x: record.inner_corners_x,
            inner_corners_y: record.inner_corners_y,
            square_size_mm: record.square_size_mm,
            marker_size_mm,
            dictionary_id: record.dictionary_id,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl From<&TargetConfig> for TargetConfigRecord {
    fn from(cfg: &TargetConfig) -> Self {
        Self {
            kind: cfg.kind.as_str().to_string(),
            inner_corners_x: cfg.inner_corners_x,
            inner_corners_y: cfg.inner_corners_y,
            square_size_mm: cfg.square_size_mm,
            marker_size_mm: cfg.marker_size_mm,
            dictionary_id: cfg.dictionary_id,
        }
    }
}
