//! Synthetic target images for tests and demos.
//!
//! Rendering back-projects every pixel through the inverse board-to-image
//! homography and supersamples 3×3, so edges are anti-aliased and corner
//! positions are exact in expectation. Lens distortion is not rendered.

use camcal_aruco::Dictionary;
use camcal_charuco::CharucoBoard;
use camcal_core::{GrayImage, Homography, ImageSize, TargetConfig, TargetKind};
use camcal_solver::{Intrinsics, Pose};
use nalgebra::{Matrix3, Point2};

const BLACK: f64 = 20.0;
const WHITE: f64 = 235.0;
const BACKGROUND: f64 = 100.0;

/// Board plane (millimetres, `z = 0`) to pixels for a pinhole camera.
pub fn board_homography(intrinsics: &Intrinsics, pose: &Pose) -> Homography {
    let r = pose.rotation_matrix();
    let rm = r.matrix();
    let m = Matrix3::from_columns(&[
        rm.column(0).into_owned(),
        rm.column(1).into_owned(),
        pose.translation,
    ]);
    Homography::new(intrinsics.matrix() * m)
}

/// Marker codes indexed by square, for ChArUco boards.
struct MarkerLayout {
    squares_x: u32,
    bits: usize,
    marker_mm: f64,
    offset_mm: f64,
    codes: Vec<Option<u64>>,
}

impl MarkerLayout {
    fn new(board: &CharucoBoard, dictionary: &Dictionary) -> Self {
        let (sx, sy) = board.squares();
        let mut codes = vec![None; (sx * sy) as usize];
        for id in 0..board.marker_count() as u32 {
            if let (Some((cx, cy)), Some(code)) = (board.marker_cell(id), dictionary.code(id)) {
                codes[(cy * sx + cx) as usize] = Some(code);
            }
        }
        Self {
            squares_x: sx,
            bits: dictionary.marker_size,
            marker_mm: board.marker_size_mm(),
            offset_mm: 0.5 * (board.square_size_mm() - board.marker_size_mm()),
            codes,
        }
    }

    /// Whether the marker in square `(sq_x, sq_y)` is black at local
    /// square coordinates `(u, v)` in millimetres.
    fn is_black(&self, sq_x: u32, sq_y: u32, u: f64, v: f64) -> Option<bool> {
        let code = self.codes.get((sq_y * self.squares_x + sq_x) as usize).copied()??;
        let (mu, mv) = (u - self.offset_mm, v - self.offset_mm);
        if mu < 0.0 || mv < 0.0 || mu >= self.marker_mm || mv >= self.marker_mm {
            return None;
        }
        let cells = self.bits + 2;
        let cx = ((mu / self.marker_mm) * cells as f64) as usize;
        let cy = ((mv / self.marker_mm) * cells as f64) as usize;
        if cx == 0 || cy == 0 || cx == cells - 1 || cy == cells - 1 {
            return Some(true);
        }
        let bit = (cy - 1) * self.bits + (cx - 1);
        Some((code >> bit) & 1 == 1)
    }
}

fn board_intensity(target: &TargetConfig, markers: Option<&MarkerLayout>, p: Point2<f64>) -> f64 {
    let s = target.square_size_mm;
    let (nx, ny) = (target.inner_corners_x as f64, target.inner_corners_y as f64);
    // One white square of margin around the printed squares.
    if p.x < -2.0 * s || p.y < -2.0 * s || p.x >= (nx + 1.0) * s || p.y >= (ny + 1.0) * s {
        return BACKGROUND;
    }
    if p.x < -s || p.y < -s || p.x >= nx * s || p.y >= ny * s {
        return WHITE;
    }
    let fx = (p.x / s).floor();
    let fy = (p.y / s).floor();
    let (sq_x, sq_y) = ((fx + 1.0) as u32, (fy + 1.0) as u32);
    if CharucoBoard::is_black_square(sq_x, sq_y) {
        return BLACK;
    }
    let local = (p.x - fx * s, p.y - fy * s);
    match markers.and_then(|m| m.is_black(sq_x, sq_y, local.0, local.1)) {
        Some(true) => BLACK,
        _ => WHITE,
    }
}

/// Render `target` seen through `board_to_image` into an image of `size`.
///
/// ChArUco targets need the dictionary that supplies their marker codes.
/// Returns `None` for a singular homography or an unusable board.
pub fn render_target(
    target: &TargetConfig,
    dictionary: Option<&Dictionary>,
    board_to_image: &Homography,
    size: ImageSize,
) -> Option<GrayImage> {
    let inv = board_to_image.inverse()?;
    let markers = match (target.kind, dictionary) {
        (TargetKind::Charuco, Some(dict)) => {
            let board = CharucoBoard::new(target, dict).ok()?;
            Some(MarkerLayout::new(&board, dict))
        }
        (TargetKind::Charuco, None) => return None,
        (TargetKind::Chessboard, _) => None,
    };

    const OFFSETS: [f64; 3] = [-1.0 / 3.0, 0.0, 1.0 / 3.0];
    let mut img = GrayImage::filled(size.width, size.height, BACKGROUND as u8);
    for y in 0..size.height {
        for x in 0..size.width {
            let mut acc = 0.0;
            for dy in OFFSETS {
                for dx in OFFSETS {
                    let b = inv.apply_f64(Point2::new(x as f64 + dx, y as f64 + dy));
                    acc += if b.x.is_finite() && b.y.is_finite() {
                        board_intensity(target, markers.as_ref(), b)
                    } else {
                        BACKGROUND
                    };
                }
            }
            img.data[y * size.width + x] = (acc / 9.0).round().clamp(0.0, 255.0) as u8;
        }
    }
    Some(img)
}

/// Render `target` for a pinhole camera at `pose`.
pub fn render_view(
    target: &TargetConfig,
    dictionary: Option<&Dictionary>,
    intrinsics: &Intrinsics,
    pose: &Pose,
    size: ImageSize,
) -> Option<GrayImage> {
    render_target(target, dictionary, &board_homography(intrinsics, pose), size)
}
