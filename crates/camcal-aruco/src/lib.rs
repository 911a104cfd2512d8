//! ArUco marker dictionaries and recognition.
//!
//! This crate provides:
//! - dictionaries as packed `u64` codes, loaded from JSON tables or
//!   generated deterministically in-process,
//! - matching of observed codes against a dictionary over all four rotations,
//! - [`QuadMarkerRecognizer`], which finds markers in a full grayscale image
//!   (adaptive threshold, dark components, quad fitting, cell decoding).
//!
//! Other recognisers can be plugged in through [`MarkerRecognizer`].

mod decode;
mod dictionary;
mod matcher;
mod quad;
mod recognizer;
mod threshold;

pub use dictionary::{Dictionary, DictionaryError};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use recognizer::{ArucoParams, DetectedMarker, MarkerRecognizer, QuadMarkerRecognizer};
