//! Inner-corner prediction from decoded markers.

use crate::board::CharucoBoard;
use camcal_aruco::DetectedMarker;
use camcal_core::homography_from_4pt;
use nalgebra::Point2;
use std::collections::BTreeMap;

/// Image position of one inner corner predicted from nearby markers.
#[derive(Clone, Debug, PartialEq)]
pub struct CornerPrediction {
    pub id: u32,
    /// Mean of the individual marker predictions.
    pub position: Point2<f32>,
    /// Number of markers that contributed.
    pub support: usize,
    /// Largest distance of an individual prediction from the mean.
    pub spread_px: f32,
    /// Local square side in pixels, from the contributing markers.
    pub square_px: f32,
}

/// Predict every inner corner adjacent to a marker in `markers`.
///
/// Each marker's board-plane corners and image quad define a local
/// homography that maps the surrounding inner corners into the image.
/// Markers with ids outside the board are ignored. Output is sorted by id.
pub fn predict_corners(board: &CharucoBoard, markers: &[DetectedMarker]) -> Vec<CornerPrediction> {
    let ratio = (board.square_size_mm() / board.marker_size_mm()) as f32;
    let mut acc: BTreeMap<u32, Vec<(Point2<f32>, f32)>> = BTreeMap::new();

    for marker in markers {
        let Some(mm) = board.marker_corners_mm(marker.id) else {
            continue;
        };
        let src = mm.map(|p| Point2::new(p.x as f32, p.y as f32));
        let Some(h) = homography_from_4pt(&src, &marker.corners) else {
            continue;
        };
        let q = &marker.corners;
        let side_px = (0..4).map(|k| (q[(k + 1) % 4] - q[k]).norm()).sum::<f32>() / 4.0;

        for id in board.marker_surrounding_corners(marker.id).into_iter().flatten() {
            let Some(p) = board.corner_position_mm(id) else {
                continue;
            };
            let pred = h.apply(Point2::new(p.x as f32, p.y as f32));
            if pred.x.is_finite() && pred.y.is_finite() {
                acc.entry(id).or_default().push((pred, side_px * ratio));
            }
        }
    }

    acc.into_iter()
        .map(|(id, preds)| {
            let n = preds.len() as f32;
            let mean = preds
                .iter()
                .fold(Point2::origin(), |m: Point2<f32>, (p, _)| m + p.coords / n);
            let spread_px = preds
                .iter()
                .map(|(p, _)| (p - mean).norm())
                .fold(0.0f32, f32::max);
            CornerPrediction {
                id,
                position: mean,
                support: preds.len(),
                spread_px,
                square_px: preds.iter().map(|(_, s)| s).sum::<f32>() / n,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_aruco::Dictionary;
    use camcal_core::{DictionaryId, Homography, TargetConfig};

    fn board() -> CharucoBoard {
        let id = DictionaryId::Generated {
            marker_size: 4,
            markers: 20,
            min_distance: 3,
        };
        let target = TargetConfig::charuco(5, 4, 30.0, Some(24.0), id).expect("target");
        let dict = Dictionary::generate(4, 20, 3).expect("dictionary");
        CharucoBoard::new(&target, &dict).expect("board")
    }

    fn board_to_image() -> Homography {
        Homography::from_array([
            [2.1, 0.15, 140.0],
            [-0.1, 1.9, 90.0],
            [0.0004, 0.0002, 1.0],
        ])
    }

    fn observed(board: &CharucoBoard, h: &Homography, id: u32) -> DetectedMarker {
        let mm = board.marker_corners_mm(id).expect("marker");
        DetectedMarker {
            id,
            corners: mm.map(|p| h.apply(Point2::new(p.x as f32, p.y as f32))),
            rotation: 0,
            hamming: 0,
            score: 1.0,
        }
    }

    #[test]
    fn predictions_match_the_board_homography() {
        let b = board();
        let h = board_to_image();
        let markers: Vec<_> = (0..b.marker_count() as u32)
            .map(|id| observed(&b, &h, id))
            .collect();
        let preds = predict_corners(&b, &markers);
        assert_eq!(preds.len(), b.target().point_count());
        for p in &preds {
            let mm = b.corner_position_mm(p.id).expect("corner");
            let truth = h.apply(Point2::new(mm.x as f32, mm.y as f32));
            assert!((p.position - truth).norm() < 1e-2, "corner {}", p.id);
            assert_eq!(p.support, 2);
            assert!(p.spread_px < 1e-2);
            assert!(p.square_px > 50.0 && p.square_px < 80.0);
        }
    }

    #[test]
    fn single_marker_predicts_only_its_neighbours() {
        let b = board();
        let h = board_to_image();
        let preds = predict_corners(&b, &[observed(&b, &h, 4)]);
        let ids: Vec<u32> = preds.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 6, 7]);
        assert!(preds.iter().all(|p| p.support == 1));
    }

    #[test]
    fn markers_outside_the_board_are_ignored() {
        let b = board();
        let h = board_to_image();
        let mut foreign = observed(&b, &h, 4);
        foreign.id = 17;
        assert!(predict_corners(&b, &[foreign]).is_empty());
    }
}
