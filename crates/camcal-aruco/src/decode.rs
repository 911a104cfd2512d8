//! Cell-grid sampling and bit decoding of a marker quad.

use crate::threshold::otsu_threshold_from_samples;
use camcal_core::{homography_from_4pt, GrayImageView, Homography};
use nalgebra::Point2;

/// Cell samples spanning fewer grey levels than this carry no marker.
const MIN_CONTRAST: u8 = 20;

/// Bits read from one quad, before dictionary matching.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MarkerObservation {
    /// Inner bits, row-major in the quad frame, black = 1.
    pub code: u64,
    /// Fraction of border cells read as black.
    pub border_score: f32,
    /// Whether polarity was inverted to maximise the border score.
    pub inverted: bool,
}

/// Sample positions in the canonical quad frame, where the marker spans
/// `[0, cells]²` with one unit per cell.
struct SampleGrid {
    cells: usize,
    points: Vec<Point2<f32>>,
    threshold_points: Vec<Point2<f32>>,
}

impl SampleGrid {
    fn new(cells: usize) -> Self {
        let points = (0..cells)
            .flat_map(|cy| {
                (0..cells).map(move |cx| Point2::new(cx as f32 + 0.5, cy as f32 + 0.5))
            })
            .collect();
        Self {
            cells,
            points,
            threshold_points: build_threshold_points(cells),
        }
    }
}

/// Decode the marker inside `quad` (corners clockwise, `quad[0]` taken as
/// the frame's top-left).
pub(crate) fn decode_quad(
    img: &GrayImageView<'_>,
    quad: &[Point2<f32>; 4],
    bits: usize,
    border: usize,
    min_border_score: f32,
) -> Option<MarkerObservation> {
    if bits == 0 || bits * bits > 64 {
        return None;
    }
    let cells = bits + 2 * border;
    let c = cells as f32;
    let frame = [
        Point2::new(0.0, 0.0),
        Point2::new(c, 0.0),
        Point2::new(c, c),
        Point2::new(0.0, c),
    ];
    let h = homography_from_4pt(&frame, quad)?;
    let grid = SampleGrid::new(cells);
    decode_warped(img, &h, &grid, bits, border, min_border_score)
}

fn decode_warped(
    img: &GrayImageView<'_>,
    h: &Homography,
    grid: &SampleGrid,
    bits: usize,
    border: usize,
    min_border_score: f32,
) -> Option<MarkerObservation> {
    let samples = grid
        .points
        .iter()
        .map(|p| {
            let q = h.apply(*p);
            sample_mean_3x3(img, q.x, q.y)
        })
        .collect::<Option<Vec<u8>>>()?;

    let thr_samples: Vec<u8> = grid
        .threshold_points
        .iter()
        .filter_map(|p| {
            let q = h.apply(*p);
            sample_mean_3x3(img, q.x, q.y)
        })
        .collect();

    decode_samples(
        &samples,
        &thr_samples,
        grid.cells,
        bits,
        border,
        min_border_score,
    )
}

fn decode_samples(
    samples: &[u8],
    thr_samples: &[u8],
    cells: usize,
    bits: usize,
    border: usize,
    min_border_score: f32,
) -> Option<MarkerObservation> {
    if samples.len() != cells * cells {
        return None;
    }
    let lo = samples.iter().copied().min().unwrap_or(0);
    let hi = samples.iter().copied().max().unwrap_or(0);
    if hi.saturating_sub(lo) < MIN_CONTRAST {
        return None;
    }

    let thr = if thr_samples.is_empty() {
        otsu_threshold_from_samples(samples)
    } else {
        otsu_threshold_from_samples(thr_samples)
    };

    let mut best: Option<MarkerObservation> = None;
    for inverted in [false, true] {
        let (mut border_ok, mut border_total) = (0u32, 0u32);
        let mut code = 0u64;

        for cy in 0..cells {
            for cx in 0..cells {
                let is_black = (samples[cy * cells + cx] < thr) != inverted;
                let is_border = border > 0
                    && (cx < border
                        || cy < border
                        || cx + border >= cells
                        || cy + border >= cells);
                if is_border {
                    border_total += 1;
                    border_ok += is_black as u32;
                } else if is_black {
                    code |= 1u64 << ((cy - border) * bits + (cx - border));
                }
            }
        }

        let border_score = if border > 0 {
            border_ok as f32 / border_total.max(1) as f32
        } else {
            1.0
        };
        if border_score < min_border_score {
            continue;
        }
        if best.is_none_or(|b| border_score > b.border_score) {
            best = Some(MarkerObservation {
                code,
                border_score,
                inverted,
            });
        }
    }

    best
}

/// Threshold sample positions on a grid three times finer than the cells.
fn build_threshold_points(cells: usize) -> Vec<Point2<f32>> {
    const THRESH_SUBDIV: usize = 3;
    let grid = cells * THRESH_SUBDIV;
    let step = cells as f32 / grid as f32;
    (0..grid)
        .flat_map(|ty| {
            (0..grid).map(move |tx| {
                Point2::new((tx as f32 + 0.5) * step, (ty as f32 + 0.5) * step)
            })
        })
        .collect()
}

fn sample_mean_3x3(img: &GrayImageView<'_>, x: f32, y: f32) -> Option<u8> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let ix = x.round() as i64;
    let iy = y.round() as i64;
    if ix < 1 || iy < 1 || ix + 1 >= img.width as i64 || iy + 1 >= img.height as i64 {
        return None;
    }

    let (ix, iy) = (ix as usize, iy as usize);
    let mut sum = 0u32;
    for yy in iy - 1..=iy + 1 {
        for xx in ix - 1..=ix + 1 {
            sum += img.data[yy * img.width + xx] as u32;
        }
    }
    Some((sum / 9) as u8)
}
