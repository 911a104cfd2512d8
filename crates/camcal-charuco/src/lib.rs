//! ChArUco corner identification.
//!
//! Markers are found by a [`camcal_aruco::MarkerRecognizer`]; each decoded
//! marker predicts the inner chessboard corners of its square through a
//! local homography, and the predictions are refined to sub-pixel accuracy.
//! Every corner keeps its stable target identity, so partially visible
//! boards still yield usable views.
//!
//! ```no_run
//! use camcal_aruco::{Dictionary, QuadMarkerRecognizer};
//! use camcal_charuco::{CharucoBoard, CharucoDetector, CharucoParams};
//! use camcal_core::{DictionaryId, GrayImage, TargetConfig};
//!
//! let id = DictionaryId::Generated { marker_size: 4, markers: 50, min_distance: 3 };
//! let target = TargetConfig::charuco(9, 6, 30.0, None, id).unwrap();
//! let dict = Dictionary::resolve(id, None).unwrap();
//! let board = CharucoBoard::new(&target, &dict).unwrap();
//! let detector = CharucoDetector::new(board, dict, CharucoParams::default());
//!
//! let img = GrayImage::filled(640, 480, 255);
//! match detector.detect(&img.view(), &QuadMarkerRecognizer::default()) {
//!     Ok(det) => println!("{} corners", det.corners.len()),
//!     Err(e) => println!("no board: {e}"),
//! }
//! ```

mod board;
mod detector;
mod interpolate;
mod params;

pub use board::{CharucoBoard, CharucoBoardError};
pub use detector::{CharucoCorner, CharucoDetectError, CharucoDetection, CharucoDetector};
pub use interpolate::{predict_corners, CornerPrediction};
pub use params::CharucoParams;
