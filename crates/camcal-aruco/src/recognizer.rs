//! Marker recognition on full images.

use crate::decode::decode_quad;
use crate::quad::{dark_components, quad_corners};
use crate::threshold::{adaptive_dark_mask, auto_window};
use crate::{Dictionary, Matcher};
use camcal_core::GrayImageView;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One recognised marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    /// Image corners in the marker's own TL, TR, BR, BL order.
    pub corners: [Point2<f32>; 4],
    pub rotation: u8,
    pub hamming: u8,
    /// Border score scaled by the Hamming penalty, in `[0, 1]`.
    pub score: f32,
}

/// Finds dictionary markers in a grayscale image.
///
/// Implementations must be usable from several extraction threads at once.
pub trait MarkerRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImageView<'_>, dictionary: &Dictionary) -> Vec<DetectedMarker>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArucoParams {
    /// Side of the local-mean window; `None` picks one from the image size.
    pub threshold_window: Option<usize>,
    /// A pixel is dark when it is this far below its local mean.
    pub threshold_offset: f32,
    /// Smallest accepted marker side in pixels.
    pub min_marker_side_px: f32,
    /// Candidates whose bounding box covers more of the image are ignored.
    pub max_area_frac: f32,
    /// Marker border width in cells.
    pub border_bits: usize,
    /// Require border-black ratio >= this.
    pub min_border_score: f32,
    /// Hamming budget; `None` uses the dictionary's correction capacity.
    pub max_hamming: Option<u8>,
}

impl Default for ArucoParams {
    fn default() -> Self {
        Self {
            threshold_window: None,
            threshold_offset: 7.0,
            min_marker_side_px: 12.0,
            max_area_frac: 0.95,
            border_bits: 1,
            min_border_score: 0.85,
            max_hamming: None,
        }
    }
}

/// Threshold → components → quads → cell decoding → dictionary lookup.
#[derive(Clone, Debug, Default)]
pub struct QuadMarkerRecognizer {
    params: ArucoParams,
}

impl QuadMarkerRecognizer {
    pub fn new(params: ArucoParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ArucoParams {
        &self.params
    }
}

impl MarkerRecognizer for QuadMarkerRecognizer {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "debug",
            skip(self, image, dictionary),
            fields(width = image.width, height = image.height, dict = %dictionary.name)
        )
    )]
    fn recognize(&self, image: &GrayImageView<'_>, dictionary: &Dictionary) -> Vec<DetectedMarker> {
        let p = &self.params;
        let (w, h) = (image.width, image.height);
        if w == 0 || h == 0 || dictionary.is_empty() {
            return Vec::new();
        }

        let window = p.threshold_window.unwrap_or_else(|| auto_window(w, h));
        let mask = adaptive_dark_mask(image, window, p.threshold_offset);
        let components = dark_components(&mask, w, h);
        let matcher = Matcher::new(
            dictionary,
            p.max_hamming.unwrap_or(dictionary.max_correction_bits),
        );
        let bits = matcher.bit_count().max(1) as f32;
        let max_area = p.max_area_frac * (w * h) as f32;

        let mut quads = 0usize;
        let mut markers = Vec::new();
        for comp in &components {
            let (bw, bh) = comp.bbox_size();
            if (bw.min(bh) as f32) < p.min_marker_side_px
                || (bw as f32 * bh as f32) > max_area
                || comp.touches_border(w, h)
            {
                continue;
            }
            let Some(quad) = quad_corners(&comp.pixels, p.min_marker_side_px) else {
                continue;
            };
            quads += 1;
            let Some(obs) = decode_quad(
                image,
                &quad,
                dictionary.marker_size,
                p.border_bits,
                p.min_border_score,
            ) else {
                continue;
            };
            let Some(m) = matcher.match_code(obs.code) else {
                continue;
            };

            let rot = m.rotation as usize;
            markers.push(DetectedMarker {
                id: m.id,
                corners: std::array::from_fn(|k| quad[(k + rot) % 4]),
                rotation: m.rotation,
                hamming: m.hamming,
                score: (obs.border_score * (1.0 - m.hamming as f32 / bits)).clamp(0.0, 1.0),
            });
        }

        let markers = dedup_by_id_keep_best(markers);
        debug!(
            "{} dark components, {} quads, {} markers ({})",
            components.len(),
            quads,
            markers.len(),
            dictionary.name
        );
        markers
    }
}

/// Keep the highest-scoring detection per id; output sorted by id.
fn dedup_by_id_keep_best(mut dets: Vec<DetectedMarker>) -> Vec<DetectedMarker> {
    dets.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut seen = HashSet::new();
    dets.retain(|d| seen.insert(d.id));
    dets.sort_by_key(|d| d.id);
    dets
}
