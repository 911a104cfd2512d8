//! Iterative sub-pixel corner refinement.
//!
//! Every image gradient `g` sampled at `p` near a saddle point `q` satisfies
//! `gᵀ(p - q) ≈ 0`. Accumulating `G = Σ w g gᵀ` and `b = Σ w g gᵀ p` over a
//! window and solving `G q = b` moves the estimate onto the saddle; the step
//! is repeated until it falls below `epsilon`.

use crate::{sample_bilinear, GrayImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubpixParams {
    /// Half side of the search window; 5 gives an 11×11 window.
    pub half_window: usize,
    pub max_iters: usize,
    /// Stop once an update moves the corner by less than this many pixels.
    pub epsilon: f32,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 0.001,
        }
    }
}

/// Refine one corner. The initial guess is returned unchanged when the
/// window leaves the image, the system is singular, or the estimate drifts
/// outside the window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    initial: Point2<f32>,
    params: &SubpixParams,
) -> Point2<f32> {
    let hw = params.half_window.max(1) as i32;
    let margin = hw as f32 + 2.0;
    let inside = |p: Point2<f32>| {
        p.x >= margin
            && p.y >= margin
            && p.x < img.width as f32 - margin
            && p.y < img.height as f32 - margin
    };
    if !inside(initial) {
        return initial;
    }

    let side = (2 * hw + 1) as usize;
    let inv_hw2 = 1.0 / (hw * hw) as f64;
    let mut weights = Vec::with_capacity(side * side);
    for dy in -hw..=hw {
        for dx in -hw..=hw {
            weights.push((-((dx * dx + dy * dy) as f64) * inv_hw2).exp());
        }
    }

    let eps2 = (params.epsilon as f64).powi(2);
    let mut c = Point2::new(initial.x as f64, initial.y as f64);

    for _ in 0..params.max_iters {
        let (mut a, mut b, mut cc, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        let mut k = 0;
        for dy in -hw..=hw {
            for dx in -hw..=hw {
                let px = (c.x + dx as f64) as f32;
                let py = (c.y + dy as f64) as f32;
                let gx = 0.5
                    * (sample_bilinear(img, px + 1.0, py) - sample_bilinear(img, px - 1.0, py))
                        as f64;
                let gy = 0.5
                    * (sample_bilinear(img, px, py + 1.0) - sample_bilinear(img, px, py - 1.0))
                        as f64;
                let w = weights[k];
                k += 1;

                let gxx = gx * gx * w;
                let gxy = gx * gy * w;
                let gyy = gy * gy * w;
                a += gxx;
                b += gxy;
                cc += gyy;
                bb1 += gxx * dx as f64 + gxy * dy as f64;
                bb2 += gxy * dx as f64 + gyy * dy as f64;
            }
        }

        let det = a * cc - b * b;
        if det.abs() <= f64::EPSILON * (a * cc).abs().max(1.0) {
            break;
        }
        let ox = (cc * bb1 - b * bb2) / det;
        let oy = (a * bb2 - b * bb1) / det;
        c = Point2::new(c.x + ox, c.y + oy);

        let drifted = (c.x - initial.x as f64).abs() > hw as f64
            || (c.y - initial.y as f64).abs() > hw as f64;
        if drifted || !c.x.is_finite() || !c.y.is_finite() {
            return initial;
        }
        if ox * ox + oy * oy < eps2 {
            break;
        }
    }

    let refined = Point2::new(c.x as f32, c.y as f32);
    if inside(refined) {
        refined
    } else {
        initial
    }
}

/// Refine a batch of corners in place.
pub fn refine_corners(img: &GrayImageView<'_>, corners: &mut [Point2<f32>], params: &SubpixParams) {
    for p in corners.iter_mut() {
        *p = refine_corner(img, *p, params);
    }
}
