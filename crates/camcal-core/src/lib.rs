//! Core types shared by the camcal crates.
//!
//! This crate is small and purely geometric: grayscale image views,
//! homography estimation, sub-pixel corner refinement, the calibration
//! target model, and the correspondence/session containers handed from the
//! extractors to the solver. It does not decode image files.

mod corner;
mod homography;
mod image;
mod logger;
mod observation;
mod subpix;
mod target;

pub use corner::Corner;
pub use homography::{estimate_homography, homography_from_4pt, null_vector, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, ImageSize};
pub use observation::{CalibrationSession, Correspondence, ViewObservation};
pub use subpix::{refine_corner, refine_corners, SubpixParams};
pub use target::{
    generate_reference_points, DictionaryId, ReferencePoint3D, TargetConfig, TargetConfigError,
    TargetConfigRecord, TargetKind, DEFAULT_MARKER_SIZE_REL,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, parse_level, LOG_ENV};
