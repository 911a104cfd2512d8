use crate::geom::{angle_diff_abs, axis_vec_diff, is_orthogonal};
use crate::params::GridGraphParams;
use camcal_core::Corner;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    /// Grid step `(di, dj)` along this direction.
    fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Estimate the grid `u` axis angle (radians, in `(-π/4, π/4]`).
///
/// Corner orientations follow the bright diagonals, which alternate by 90°
/// between neighbours; their fourth harmonic is shared by every corner. The
/// grid axes sit 45° away from the diagonals. Returns `None` when the
/// orientations do not agree.
pub fn estimate_grid_axis(corners: &[Corner]) -> Option<f32> {
    let (mut c4, mut s4, mut total) = (0.0f32, 0.0f32, 0.0f32);
    for c in corners {
        let w = c.strength.max(0.0);
        c4 += w * (4.0 * c.orientation).cos();
        s4 += w * (4.0 * c.orientation).sin();
        total += w;
    }
    if total <= 0.0 || (c4 * c4 + s4 * s4).sqrt() < 0.3 * total {
        return None;
    }
    let diagonal = 0.25 * s4.atan2(c4);
    let mut axis = diagonal + FRAC_PI_4;
    while axis > FRAC_PI_4 {
        axis -= FRAC_PI_2;
    }
    while axis <= -FRAC_PI_4 {
        axis += FRAC_PI_2;
    }
    Some(axis)
}

/// Classify an edge against the grid axes `u = axis`, `v = axis + π/2`.
fn direction_on_axes(vec_to_neighbor: &Vector2<f32>, axis: f32) -> NeighborDirection {
    let u = Vector2::new(axis.cos(), axis.sin());
    let v = Vector2::new(-axis.sin(), axis.cos());
    let pu = vec_to_neighbor.dot(&u);
    let pv = vec_to_neighbor.dot(&v);
    if pu.abs() > pv.abs() {
        if pu >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if pv >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    axis: f32,
) -> Option<NodeNeighbor> {
    let tol = params.orientation_tolerance_deg.to_radians();

    // Adjacent junctions have their bright diagonals swapped.
    if !is_orthogonal(corner.orientation, neighbor.orientation, tol) {
        return None;
    }

    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    // The edge runs along a grid line, 45° from both diagonals.
    let edge_angle = vec_to_neighbor.y.atan2(vec_to_neighbor.x);
    let score_corner = (axis_vec_diff(corner.orientation, edge_angle) - FRAC_PI_4).abs();
    let score_neighbor = (axis_vec_diff(neighbor.orientation, edge_angle) - FRAC_PI_4).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    let score_orientation =
        (FRAC_PI_2 - angle_diff_abs(corner.orientation, neighbor.orientation)).abs();

    Some(NodeNeighbor {
        direction: direction_on_axes(&vec_to_neighbor, axis),
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor + score_orientation,
    })
}

/// Keep at most one neighbor per direction: lowest score, then shortest edge.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = match candidate.direction {
            NeighborDirection::Right => &mut best[0],
            NeighborDirection::Left => &mut best[1],
            NeighborDirection::Up => &mut best[2],
            NeighborDirection::Down => &mut best[3],
        };
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// 4-connected neighbourhood graph over corner candidates.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams, axis: f32) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }

        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();

        let mut neighbors = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let candidates = tree
                .nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1)
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params, axis))
                .collect();
            neighbors.push(select_neighbors(candidates));
        }

        let mut graph = Self { neighbors };
        graph.keep_mutual_edges();
        graph
    }

    /// Drop edges that are not confirmed from the other side with the
    /// opposite direction.
    fn keep_mutual_edges(&mut self) {
        let confirmed: Vec<Vec<bool>> = self
            .neighbors
            .iter()
            .enumerate()
            .map(|(node, list)| {
                list.iter()
                    .map(|n| {
                        let back = n.direction.opposite();
                        self.neighbors[n.index]
                            .iter()
                            .any(|m| m.index == node && m.direction == back)
                    })
                    .collect()
            })
            .collect();

        for (list, keep) in self.neighbors.iter_mut().zip(confirmed) {
            let mut keep = keep.into_iter();
            list.retain(|_| keep.next().unwrap_or(false));
        }
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// Breadth-first integer coordinates `(node, i, j)` for a component.
///
/// Returns `None` when two paths disagree about a node's coordinates or two
/// nodes claim the same cell.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let start = *component.first()?;
    let mut coords_of: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
    let mut node_at: HashMap<(i32, i32), usize> = HashMap::with_capacity(component.len());
    let mut queue = VecDeque::new();

    coords_of.insert(start, (0, 0));
    node_at.insert((0, 0), start);
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = coords_of[&node];
        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            let cell = (i + di, j + dj);
            match coords_of.get(&neighbor.index) {
                Some(&existing) if existing != cell => return None,
                Some(_) => {}
                None => {
                    if node_at.insert(cell, neighbor.index).is_some() {
                        return None;
                    }
                    coords_of.insert(neighbor.index, cell);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    let mut out: Vec<(usize, i32, i32)> = coords_of
        .into_iter()
        .map(|(n, (i, j))| (n, i, j))
        .collect();
    out.sort_unstable_by_key(|&(_, i, j)| (j, i));
    Some(out)
}
