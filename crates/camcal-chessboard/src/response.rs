//! ChESS chessboard-corner response.
//!
//! For each pixel, 16 samples on a ring are compared: opposite samples of
//! an X junction agree and quarter-turn samples disagree, while edges make
//! opposite samples disagree. The response is
//! `sum - diff - 16 * |ring mean - centre mean|`, positive only at
//! junction-like points.

use crate::geom::wrap_pi;
use crate::params::ChessResponseParams;
use camcal_core::{Corner, GrayImageView};
use nalgebra::Point2;

const RING: usize = 16;

/// Dense response map, row-major, same size as the input image.
#[derive(Clone, Debug)]
pub struct ResponseMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ResponseMap {
    #[inline]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

/// Integer ring offsets at 22.5° steps; opposite entries are exact negatives.
fn ring_offsets(radius: u32) -> [(i32, i32); RING] {
    let r = radius as f32;
    std::array::from_fn(|k| {
        let theta = k as f32 * std::f32::consts::TAU / RING as f32;
        ((r * theta.cos()).round() as i32, (r * theta.sin()).round() as i32)
    })
}

#[inline]
fn ring_samples(
    img: &GrayImageView<'_>,
    offsets: &[(i32, i32); RING],
    x: usize,
    y: usize,
) -> [f32; RING] {
    std::array::from_fn(|k| {
        let (dx, dy) = offsets[k];
        let idx = (y as i32 + dy) as usize * img.width + (x as i32 + dx) as usize;
        img.data[idx] as f32
    })
}

/// Compute the ChESS response for every pixel far enough from the border.
pub fn chess_response(img: &GrayImageView<'_>, radius: u32) -> ResponseMap {
    let (w, h) = (img.width, img.height);
    let mut data = vec![0.0f32; w * h];
    let border = radius as usize + 1;
    if w <= 2 * border || h <= 2 * border {
        return ResponseMap {
            width: w,
            height: h,
            data,
        };
    }

    let offsets = ring_offsets(radius);
    for y in border..h - border {
        for x in border..w - border {
            let s = ring_samples(img, &offsets, x, y);

            let mut sum_resp = 0.0;
            for n in 0..4 {
                sum_resp += ((s[n] + s[n + 8]) - (s[n + 4] + s[n + 12])).abs();
            }
            let mut diff_resp = 0.0;
            for n in 0..8 {
                diff_resp += (s[n] - s[n + 8]).abs();
            }
            let ring_mean = s.iter().sum::<f32>() / RING as f32;
            let c = y * w + x;
            let centre_mean = (img.data[c] as f32
                + img.data[c - 1] as f32
                + img.data[c + 1] as f32
                + img.data[c - w] as f32
                + img.data[c + w] as f32)
                / 5.0;

            data[c] = sum_resp - diff_resp - 16.0 * (ring_mean - centre_mean).abs();
        }
    }

    ResponseMap {
        width: w,
        height: h,
        data,
    }
}

/// Orientation of the bright diagonal from the second ring harmonic.
fn corner_orientation(samples: &[f32; RING], offsets: &[(i32, i32); RING]) -> f32 {
    let (mut c2, mut s2) = (0.0f32, 0.0f32);
    for (v, &(dx, dy)) in samples.iter().zip(offsets) {
        let theta = (dy as f32).atan2(dx as f32);
        c2 += v * (2.0 * theta).cos();
        s2 += v * (2.0 * theta).sin();
    }
    wrap_pi(0.5 * s2.atan2(c2))
}

fn is_local_max(map: &ResponseMap, x: usize, y: usize, radius: usize) -> bool {
    let v = map.at(x, y);
    let idx = y * map.width + x;
    let y0 = y.saturating_sub(radius);
    let y1 = (y + radius).min(map.height - 1);
    let x0 = x.saturating_sub(radius);
    let x1 = (x + radius).min(map.width - 1);
    for yy in y0..=y1 {
        for xx in x0..=x1 {
            let other = map.at(xx, yy);
            let other_idx = yy * map.width + xx;
            // Ties go to the earlier pixel so plateaus yield a single peak.
            if other > v || (other == v && other_idx < idx) {
                return false;
            }
        }
    }
    true
}

/// Response-weighted centroid over the 3×3 neighbourhood of a peak.
fn peak_centroid(map: &ResponseMap, x: usize, y: usize) -> Point2<f32> {
    let (mut sw, mut sx, mut sy) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            let xx = (x as i32 + dx) as usize;
            let yy = (y as i32 + dy) as usize;
            let w = map.at(xx, yy).max(0.0);
            sw += w;
            sx += w * xx as f32;
            sy += w * yy as f32;
        }
    }
    if sw > 0.0 {
        Point2::new(sx / sw, sy / sw)
    } else {
        Point2::new(x as f32, y as f32)
    }
}

/// Detect corner candidates, strongest first.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        level = "debug",
        skip(img, params),
        fields(width = img.width, height = img.height)
    )
)]
pub fn detect_corners(img: &GrayImageView<'_>, params: &ChessResponseParams) -> Vec<Corner> {
    let map = chess_response(img, params.ring_radius);
    let max_resp = map.data.iter().copied().fold(0.0f32, f32::max);
    if max_resp <= 0.0 {
        return Vec::new();
    }
    let threshold = params.threshold_rel.max(0.0) * max_resp;
    let border = params.ring_radius as usize + 2;
    let nms = params.nms_radius.max(1) as usize;
    let offsets = ring_offsets(params.ring_radius);

    let mut corners = Vec::new();
    if map.width <= 2 * border || map.height <= 2 * border {
        return corners;
    }
    for y in border..map.height - border {
        for x in border..map.width - border {
            let v = map.at(x, y);
            if v <= threshold || !is_local_max(&map, x, y, nms) {
                continue;
            }
            let samples = ring_samples(img, &offsets, x, y);
            corners.push(Corner {
                position: peak_centroid(&map, x, y),
                orientation: corner_orientation(&samples, &offsets),
                strength: v,
            });
        }
    }

    corners.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    corners.truncate(params.max_corners);
    log::debug!(
        "ChESS: {} candidates above {:.1} (max response {:.1})",
        corners.len(),
        threshold,
        max_resp
    );
    corners
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;
    use std::f32::consts::FRAC_PI_4;

    /// Axis-aligned checker of `square` pixels, bright squares at even parity.
    fn checker(size: usize, square: usize, phase: usize) -> GrayImage {
        let mut img = GrayImage::filled(size, size, 0);
        for y in 0..size {
            for x in 0..size {
                let bright = ((x + phase) / square + (y + phase) / square) % 2 == 0;
                img.data[y * size + x] = if bright { 220 } else { 30 };
            }
        }
        img
    }

    #[test]
    fn ring_offsets_are_point_symmetric() {
        let off = ring_offsets(5);
        for k in 0..8 {
            assert_eq!(off[k].0, -off[k + 8].0);
            assert_eq!(off[k].1, -off[k + 8].1);
        }
    }

    #[test]
    fn finds_junctions_of_a_checker() {
        let img = checker(100, 20, 0);
        let corners = detect_corners(&img.view(), &ChessResponseParams::default());
        // Inner junctions at multiples of 20 (pixel edges fall at 19.5 | 20).
        let inner: Vec<_> = corners
            .iter()
            .filter(|c| c.position.x > 10.0 && c.position.x < 90.0)
            .filter(|c| c.position.y > 10.0 && c.position.y < 90.0)
            .collect();
        assert_eq!(inner.len(), 16, "got {:?}", corners);
        for c in inner {
            let gx = (c.position.x / 20.0).round() * 20.0 - 0.5;
            let gy = (c.position.y / 20.0).round() * 20.0 - 0.5;
            assert!((c.position.x - gx).abs() <= 1.0);
            assert!((c.position.y - gy).abs() <= 1.0);
        }
    }

    #[test]
    fn orientation_follows_bright_diagonal() {
        let img = checker(100, 20, 0);
        let corners = detect_corners(&img.view(), &ChessResponseParams::default());
        let c = corners
            .iter()
            .find(|c| (c.position.x - 39.5).abs() < 1.5 && (c.position.y - 39.5).abs() < 1.5)
            .expect("corner at (40, 40)");
        // Squares (1,1) and (2,2) are bright: the bright diagonal runs at 45°.
        assert!((c.orientation - FRAC_PI_4).abs() < 0.2, "{}", c.orientation);
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::filled(64, 64, 90);
        assert!(detect_corners(&img.view(), &ChessResponseParams::default()).is_empty());
    }
}
