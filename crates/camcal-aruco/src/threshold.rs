//! Thresholding for quad search and cell decoding.

use camcal_core::GrayImageView;
use rayon::prelude::*;

/// Compute Otsu threshold from a set of sample intensities.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let mut hist = [0u32; 256];
    let (mut min_v, mut max_v) = (255u8, 0u8);
    for &v in samples {
        hist[v as usize] += 1;
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let (mut sum_b, mut w_b) = (0f64, 0f64);
    let mut best_var = -1f64;
    let mut best_t = 127u8;
    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    // Pixels strictly below the returned value are dark.
    best_t.saturating_add(1)
}

/// Odd local-mean window for an image: a fifteenth of the long side, at least 15.
pub(crate) fn auto_window(width: usize, height: usize) -> usize {
    let w = (width.max(height) / 15).max(15);
    w | 1
}

/// Binary mask (`1` = dark) of pixels darker than their local mean minus `offset`.
///
/// The mean is taken over a `window × window` box clipped to the image,
/// computed from an integral image; rows are thresholded in parallel.
pub(crate) fn adaptive_dark_mask(img: &GrayImageView<'_>, window: usize, offset: f32) -> Vec<u8> {
    let (w, h) = (img.width, img.height);
    let stride = w + 1;
    let mut integral = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.data[y * w + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let half = window.max(3) / 2;
    let mut mask = vec![0u8; w * h];
    mask.par_chunks_mut(w.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let y0 = y.saturating_sub(half);
            let y1 = (y + half + 1).min(h);
            for (x, out) in row.iter_mut().enumerate() {
                let x0 = x.saturating_sub(half);
                let x1 = (x + half + 1).min(w);
                let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                    - integral[y0 * stride + x1]
                    - integral[y1 * stride + x0];
                let mean = sum as f32 / ((x1 - x0) * (y1 - y0)) as f32;
                if (img.data[y * w + x] as f32) < mean - offset {
                    *out = 1;
                }
            }
        });
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;

    #[test]
    fn otsu_separates_two_clusters() {
        let mut samples = vec![20u8; 50];
        samples.extend([22u8, 25, 200, 205]);
        samples.extend(vec![210u8; 50]);
        let t = otsu_threshold_from_samples(&samples);
        assert!(t > 25 && t <= 200, "threshold {t}");
    }

    #[test]
    fn window_is_odd_and_bounded() {
        assert_eq!(auto_window(100, 80), 15);
        assert_eq!(auto_window(640, 480), 43);
        assert_eq!(auto_window(1920, 1080) % 2, 1);
    }

    #[test]
    fn dark_square_edge_is_marked() {
        let mut img = GrayImage::filled(60, 60, 230);
        for y in 20..40 {
            for x in 20..40 {
                img.data[y * 60 + x] = 10;
            }
        }
        let mask = adaptive_dark_mask(&img.view(), 15, 7.0);
        assert_eq!(mask[21 * 60 + 21], 1);
        assert_eq!(mask[30 * 60 + 20], 1);
        assert_eq!(mask[5 * 60 + 5], 0);
        assert_eq!(mask[30 * 60 + 45], 0);
    }
}
