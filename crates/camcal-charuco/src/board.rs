//! Board layout helpers for ChArUco.
//!
//! Board-plane coordinates are millimetres in the target frame, whose
//! origin is inner corner `(row 0, col 0)`. The board therefore spans
//! `[-s, X·s] × [-s, Y·s]` for square size `s` and `X × Y` inner corners.

use camcal_aruco::Dictionary;
use camcal_core::{TargetConfig, TargetConfigError, TargetKind};
use nalgebra::Point2;

/// Board construction errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CharucoBoardError {
    #[error("target is a {0}, not a ChArUco board")]
    NotCharuco(&'static str),
    #[error(transparent)]
    Target(#[from] TargetConfigError),
    #[error("dictionary has no codes")]
    EmptyDictionary,
    #[error("board uses {board}x{board} markers, dictionary '{name}' has {dictionary}x{dictionary}")]
    MarkerSizeMismatch {
        name: String,
        board: usize,
        dictionary: usize,
    },
    #[error("board needs {needed} markers, dictionary has {available}")]
    NotEnoughDictionaryCodes { needed: usize, available: usize },
}

/// Validated ChArUco layout in the OpenCV convention: top-left square
/// black, markers on white squares, ids row-major over those squares.
#[derive(Clone, Debug)]
pub struct CharucoBoard {
    target: TargetConfig,
    squares_x: u32,
    squares_y: u32,
    marker_positions: Vec<(u32, u32)>,
}

impl CharucoBoard {
    pub fn new(target: &TargetConfig, dictionary: &Dictionary) -> Result<Self, CharucoBoardError> {
        if target.kind != TargetKind::Charuco {
            return Err(CharucoBoardError::NotCharuco(target.kind.as_str()));
        }
        target.validate()?;
        if dictionary.is_empty() {
            return Err(CharucoBoardError::EmptyDictionary);
        }
        if let Some(id) = target.dictionary_id {
            if id.marker_size() != dictionary.marker_size {
                return Err(CharucoBoardError::MarkerSizeMismatch {
                    name: dictionary.name.clone(),
                    board: id.marker_size(),
                    dictionary: dictionary.marker_size,
                });
            }
        }

        let squares_x = target.inner_corners_x + 1;
        let squares_y = target.inner_corners_y + 1;
        let marker_positions = open_cv_charuco_marker_positions(squares_x, squares_y);

        let needed = marker_positions.len();
        let available = dictionary.len();
        if available < needed {
            return Err(CharucoBoardError::NotEnoughDictionaryCodes { needed, available });
        }

        Ok(Self {
            target: target.clone(),
            squares_x,
            squares_y,
            marker_positions,
        })
    }

    #[inline]
    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    /// Square counts `(x, y)`.
    #[inline]
    pub fn squares(&self) -> (u32, u32) {
        (self.squares_x, self.squares_y)
    }

    #[inline]
    pub fn square_size_mm(&self) -> f64 {
        self.target.square_size_mm
    }

    #[inline]
    pub fn marker_size_mm(&self) -> f64 {
        self.target
            .marker_size_mm
            .unwrap_or(self.target.square_size_mm * camcal_core::DEFAULT_MARKER_SIZE_REL)
    }

    #[inline]
    pub fn marker_count(&self) -> usize {
        self.marker_positions.len()
    }

    /// Square `(sx, sy)` holding marker `id`.
    #[inline]
    pub fn marker_cell(&self, id: u32) -> Option<(u32, u32)> {
        self.marker_positions.get(id as usize).copied()
    }

    /// Marker corners on the board plane, in the marker's TL, TR, BR, BL order.
    pub fn marker_corners_mm(&self, id: u32) -> Option<[Point2<f64>; 4]> {
        let (sx, sy) = self.marker_cell(id)?;
        let s = self.square_size_mm();
        let m = self.marker_size_mm();
        let off = 0.5 * (s - m);
        let x0 = (sx as f64 - 1.0) * s + off;
        let y0 = (sy as f64 - 1.0) * s + off;
        Some([
            Point2::new(x0, y0),
            Point2::new(x0 + m, y0),
            Point2::new(x0 + m, y0 + m),
            Point2::new(x0, y0 + m),
        ])
    }

    /// Inner corner ids at the four corners of marker `id`'s square
    /// (TL, TR, BR, BL). Squares on the board edge have fewer.
    pub fn marker_surrounding_corners(&self, id: u32) -> [Option<u32>; 4] {
        let Some((sx, sy)) = self.marker_cell(id) else {
            return [None; 4];
        };
        let at = |bx: u32, by: u32| {
            let col = bx.checked_sub(1)?;
            let row = by.checked_sub(1)?;
            self.target.point_identity(row, col)
        };
        [at(sx, sy), at(sx + 1, sy), at(sx + 1, sy + 1), at(sx, sy + 1)]
    }

    /// Board-plane position of an inner corner.
    pub fn corner_position_mm(&self, id: u32) -> Option<Point2<f64>> {
        self.target.reference_point(id).map(|p| Point2::new(p.x, p.y))
    }

    /// Whether square `(sx, sy)` is black.
    #[inline]
    pub fn is_black_square(sx: u32, sy: u32) -> bool {
        (sx + sy) % 2 == 0
    }
}

fn open_cv_charuco_marker_positions(squares_x: u32, squares_y: u32) -> Vec<(u32, u32)> {
    (0..squares_y)
        .flat_map(|sy| (0..squares_x).map(move |sx| (sx, sy)))
        .filter(|&(sx, sy)| !CharucoBoard::is_black_square(sx, sy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use camcal_core::DictionaryId;

    fn board() -> CharucoBoard {
        // 6 × 5 squares, like a 5 × 4 inner-corner target.
        let id = DictionaryId::Generated {
            marker_size: 4,
            markers: 20,
            min_distance: 3,
        };
        let target = TargetConfig::charuco(5, 4, 30.0, Some(24.0), id).expect("target");
        let dict = Dictionary::generate(4, 20, 3).expect("dictionary");
        CharucoBoard::new(&target, &dict).expect("board")
    }

    #[test]
    fn markers_fill_white_squares_row_major() {
        let b = board();
        assert_eq!(b.squares(), (6, 5));
        assert_eq!(b.marker_count(), 15);
        assert_eq!(b.marker_cell(0), Some((1, 0)));
        assert_eq!(b.marker_cell(3), Some((0, 1)));
        assert_eq!(b.marker_cell(4), Some((2, 1)));
        assert_eq!(b.marker_cell(15), None);
    }

    #[test]
    fn surrounding_corners_follow_square_corners() {
        let b = board();
        assert_eq!(b.marker_surrounding_corners(4), [Some(1), Some(2), Some(7), Some(6)]);
        // Top-edge marker only touches the first corner row.
        assert_eq!(b.marker_surrounding_corners(0), [None, None, Some(1), Some(0)]);
    }

    #[test]
    fn marker_is_centred_in_its_square() {
        let b = board();
        let c = b.marker_corners_mm(4).expect("marker 4");
        // Square (2, 1) spans [30, 60] × [0, 30] in the target frame.
        assert_relative_eq!(c[0].x, 33.0);
        assert_relative_eq!(c[0].y, 3.0);
        assert_relative_eq!(c[2].x, 57.0);
        assert_relative_eq!(c[2].y, 27.0);
    }

    #[test]
    fn small_dictionary_is_rejected() {
        let id = DictionaryId::Generated {
            marker_size: 4,
            markers: 10,
            min_distance: 3,
        };
        let target = TargetConfig::charuco(5, 4, 30.0, None, id).expect("target");
        let dict = Dictionary::generate(4, 10, 3).expect("dictionary");
        assert_eq!(
            CharucoBoard::new(&target, &dict).unwrap_err(),
            CharucoBoardError::NotEnoughDictionaryCodes {
                needed: 15,
                available: 10
            }
        );
    }
}
