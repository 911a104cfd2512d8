//! Chessboard inner-corner extraction.
//!
//! Pipeline: ChESS corner response with non-maximum suppression, a
//! kd-tree neighbour graph constrained by corner orientations, integer grid
//! coordinates by breadth-first search, and sub-pixel refinement. Only a
//! complete `cols × rows` grid counts as a detection.
//!
//! ```no_run
//! use camcal_chessboard::{ChessboardDetector, ChessboardParams};
//! use camcal_core::GrayImage;
//!
//! let img = GrayImage::filled(640, 480, 0);
//! let detector = ChessboardDetector::new(ChessboardParams::default());
//! if let Some(board) = detector.detect(&img.view(), 9, 6) {
//!     println!("first corner at {:?}", board.corners[0]);
//! }
//! ```

mod detector;
mod geom;
mod gridgraph;
mod params;
mod response;

pub use detector::{ChessboardDetection, ChessboardDetector};
pub use gridgraph::{
    assign_grid_coordinates, connected_components, estimate_grid_axis, GridGraph,
    NeighborDirection, NodeNeighbor,
};
pub use params::{ChessResponseParams, ChessboardParams, GridGraphParams};
pub use response::{chess_response, detect_corners, ResponseMap};
