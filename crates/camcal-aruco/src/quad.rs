//! Dark connected components and their quadrilateral outlines.

use nalgebra::{Point2, Vector2};
use std::collections::VecDeque;

/// One 8-connected component of the dark mask.
#[derive(Clone, Debug)]
pub(crate) struct DarkComponent {
    pub pixels: Vec<(u32, u32)>,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl DarkComponent {
    #[inline]
    pub fn bbox_size(&self) -> (u32, u32) {
        (self.max_x - self.min_x + 1, self.max_y - self.min_y + 1)
    }

    /// Whether the component reaches the outermost pixel row or column.
    pub fn touches_border(&self, width: usize, height: usize) -> bool {
        self.min_x == 0
            || self.min_y == 0
            || self.max_x as usize + 1 >= width
            || self.max_y as usize + 1 >= height
    }
}

/// Label 8-connected components of `mask` (non-zero = foreground).
pub(crate) fn dark_components(mask: &[u8], width: usize, height: usize) -> Vec<DarkComponent> {
    const NEIGH: [(i32, i32); 8] = [
        (1, 0),
        (-1, 0),
        (0, 1),
        (0, -1),
        (1, 1),
        (1, -1),
        (-1, 1),
        (-1, -1),
    ];

    let mut visited = vec![false; mask.len()];
    let mut out = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if mask[start] == 0 || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);

        let (sx, sy) = ((start % width) as u32, (start / width) as u32);
        let mut comp = DarkComponent {
            pixels: Vec::new(),
            min_x: sx,
            min_y: sy,
            max_x: sx,
            max_y: sy,
        };

        while let Some(idx) = queue.pop_front() {
            let (x, y) = ((idx % width) as i32, (idx / width) as i32);
            comp.pixels.push((x as u32, y as u32));
            comp.min_x = comp.min_x.min(x as u32);
            comp.min_y = comp.min_y.min(y as u32);
            comp.max_x = comp.max_x.max(x as u32);
            comp.max_y = comp.max_y.max(y as u32);

            for (dx, dy) in NEIGH {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let nidx = ny as usize * width + nx as usize;
                if mask[nidx] != 0 && !visited[nidx] {
                    visited[nidx] = true;
                    queue.push_back(nidx);
                }
            }
        }
        out.push(comp);
    }
    out
}

fn cross(o: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> f32 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Four outline corners of a roughly quadrilateral pixel set.
///
/// Corners are the extreme points of the set: the pixel farthest from the
/// centroid, the pixel farthest from that one, and the two pixels farthest
/// on either side of the diagonal they span. The result is ordered
/// clockwise in image coordinates (y down), starting anywhere. `None` when
/// the points do not span a convex quad with sides of at least `min_side`.
pub(crate) fn quad_corners(pixels: &[(u32, u32)], min_side: f32) -> Option<[Point2<f32>; 4]> {
    if pixels.len() < 8 {
        return None;
    }
    let pts = || pixels.iter().map(|&(x, y)| Point2::new(x as f32, y as f32));
    let n = pixels.len() as f32;
    let centroid = pts().fold(Point2::origin(), |acc: Point2<f32>, p| {
        acc + p.coords / n
    });

    let farthest_from = |q: Point2<f32>| {
        pts().max_by(|a, b| (a - q).norm_squared().total_cmp(&(b - q).norm_squared()))
    };
    let p0 = farthest_from(centroid)?;
    let p2 = farthest_from(p0)?;

    let side = |p: &Point2<f32>| cross(p0, p2, *p);
    let p1 = pts().max_by(|a, b| side(a).total_cmp(&side(b)))?;
    let p3 = pts().min_by(|a, b| side(a).total_cmp(&side(b)))?;
    let diag = (p2 - p0).norm();
    if diag < min_side || side(&p1) < 0.25 * min_side * diag || -side(&p3) < 0.25 * min_side * diag
    {
        return None;
    }

    let mut quad = [p0, p1, p2, p3];
    let angle = |p: &Point2<f32>| {
        let d: Vector2<f32> = p - centroid;
        d.y.atan2(d.x)
    };
    quad.sort_by(|a, b| angle(a).total_cmp(&angle(b)));

    if !is_convex(&quad) {
        return None;
    }
    for k in 0..4 {
        if (quad[(k + 1) % 4] - quad[k]).norm() < min_side {
            return None;
        }
    }
    Some(quad)
}

/// Strict convexity with clockwise (image-space) winding.
pub(crate) fn is_convex(quad: &[Point2<f32>; 4]) -> bool {
    (0..4).all(|k| cross(quad[k], quad[(k + 1) % 4], quad[(k + 2) % 4]) > 0.0)
}
