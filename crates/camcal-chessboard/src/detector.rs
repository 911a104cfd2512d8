use crate::gridgraph::{
    assign_grid_coordinates, connected_components, estimate_grid_axis, GridGraph,
};
use crate::params::ChessboardParams;
use crate::response::detect_corners;
use camcal_core::{refine_corners, Corner, GrayImageView};
use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A complete inner-corner grid, row-major (`row * cols + col`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChessboardDetection {
    pub cols: u32,
    pub rows: u32,
    pub corners: Vec<Point2<f32>>,
}

/// Locates the full inner-corner grid of a chessboard with known size.
pub struct ChessboardDetector {
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Find all `cols × rows` inner corners and refine them to sub-pixel
    /// accuracy. Partial grids yield `None`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, img),
            fields(width = img.width, height = img.height)
        )
    )]
    pub fn detect(
        &self,
        img: &GrayImageView<'_>,
        cols: u32,
        rows: u32,
    ) -> Option<ChessboardDetection> {
        let candidates = detect_corners(img, &self.params.response);
        let mut corners = self.detect_from_corners(&candidates, cols, rows)?;
        refine_corners(img, &mut corners, &self.params.subpix);
        info!("chessboard {}x{} found", cols, rows);
        Some(ChessboardDetection {
            cols,
            rows,
            corners,
        })
    }

    /// Grid search over precomputed candidates; positions are not refined.
    pub fn detect_from_corners(
        &self,
        candidates: &[Corner],
        cols: u32,
        rows: u32,
    ) -> Option<Vec<Point2<f32>>> {
        let expected = cols as usize * rows as usize;
        if candidates.len() < expected {
            debug!(
                "only {} corner candidates for a {}x{} grid",
                candidates.len(),
                cols,
                rows
            );
            return None;
        }

        let axis = estimate_grid_axis(candidates).unwrap_or(0.0);
        let graph = GridGraph::new(candidates, &self.params.graph, axis);
        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        for component in components.iter().filter(|c| c.len() == expected) {
            let Some(coords) = assign_grid_coordinates(&graph, component) else {
                debug!(
                    "component of {} corners has conflicting coordinates",
                    component.len()
                );
                continue;
            };
            if let Some(order) = row_major_order(&coords, cols, rows) {
                return Some(order.into_iter().map(|n| candidates[n].position).collect());
            }
        }

        debug!(
            "no complete {}x{} grid among {} components (largest {})",
            cols,
            rows,
            components.len(),
            components.first().map_or(0, Vec::len)
        );
        None
    }
}

/// Map BFS coordinates onto a `cols × rows` row-major node order.
///
/// A grid found in the transposed orientation is turned by 90°, which keeps
/// the image handedness of the row/column axes.
fn row_major_order(coords: &[(usize, i32, i32)], cols: u32, rows: u32) -> Option<Vec<usize>> {
    let min_i = coords.iter().map(|c| c.1).min()?;
    let max_i = coords.iter().map(|c| c.1).max()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let max_j = coords.iter().map(|c| c.2).max()?;
    let found_cols = (max_i - min_i + 1) as u32;
    let found_rows = (max_j - min_j + 1) as u32;

    let (cols_us, rows_us) = (cols as usize, rows as usize);
    let mut order = vec![usize::MAX; cols_us * rows_us];
    for &(node, i, j) in coords {
        let (c, r) = ((i - min_i) as usize, (j - min_j) as usize);
        let (col, row) = if (found_cols, found_rows) == (cols, rows) {
            (c, r)
        } else if (found_cols, found_rows) == (rows, cols) {
            (found_rows as usize - 1 - r, c)
        } else {
            return None;
        };
        order[row * cols_us + col] = node;
    }

    if order.iter().any(|&n| n == usize::MAX) {
        return None;
    }
    Some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    fn grid_corners(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        let mut out = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                out.push(Corner {
                    position: Point2::new(50.0 + i as f32 * spacing, 40.0 + j as f32 * spacing),
                    orientation: if (i + j) % 2 == 0 {
                        FRAC_PI_4
                    } else {
                        3.0 * FRAC_PI_4
                    },
                    strength: 1.0,
                });
            }
        }
        out
    }

    #[test]
    fn orders_complete_grid_row_major() {
        let corners = grid_corners(5, 3, 20.0);
        let detector = ChessboardDetector::new(ChessboardParams::default());
        let ordered = detector.detect_from_corners(&corners, 5, 3).expect("grid");
        assert_eq!(ordered.len(), 15);
        assert_eq!(ordered[0], Point2::new(50.0, 40.0));
        assert_eq!(ordered[1], Point2::new(70.0, 40.0));
        assert_eq!(ordered[5], Point2::new(50.0, 60.0));
    }

    #[test]
    fn transposed_grid_is_rotated_into_place() {
        // Image shows 3 columns × 5 rows while the target is 5 × 3.
        let corners = grid_corners(3, 5, 20.0);
        let detector = ChessboardDetector::new(ChessboardParams::default());
        let ordered = detector.detect_from_corners(&corners, 5, 3).expect("grid");
        assert_eq!(ordered.len(), 15);
        // Consecutive points along a row are one grid step apart.
        for row in 0..3 {
            for col in 0..4 {
                let d = ordered[row * 5 + col + 1] - ordered[row * 5 + col];
                assert!((d.norm() - 20.0).abs() < 1e-4);
            }
        }
        // Column index runs along -y (upwards) after the quarter turn.
        let step = ordered[1] - ordered[0];
        assert!(step.y < 0.0 && step.x.abs() < 1e-4);
    }

    #[test]
    fn partial_grid_is_rejected() {
        let mut corners = grid_corners(5, 3, 20.0);
        corners.remove(7);
        let detector = ChessboardDetector::new(ChessboardParams::default());
        assert!(detector.detect_from_corners(&corners, 5, 3).is_none());
    }
}
