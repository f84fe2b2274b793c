//! The boundary tracer (spec §4.5): the alternative layout branch's final
//! stage. Walks the dual grid of a watershed [`LabelGrid`] to extract each
//! basin's boundary as a closed loop of grid-corner points, then simplifies
//! it with Ramer-Douglas-Peucker before lifting to world coordinates.
//!
//! Two adjacent basins must trace *exactly* the same point sequence along
//! their shared boundary (so downstream tiles butt together with no gap or
//! overlap). Simplifying each basin's whole ring independently can't
//! guarantee that: two different rings, walked from two different starting
//! corners, won't in general pick the same RDP split points along a segment
//! they happen to share. Instead this tracer finds the *nodes* of the
//! boundary graph (grid corners where more than two boundary edges meet, or
//! the grid's own corners where exactly two meet but not collinearly — same
//! thing to Eulerian degree, since a bend doesn't change who is adjacent to
//! whom), walks each node-to-node run as one macro-edge, simplifies that
//! macro-edge exactly once, and lets every basin bordering it reuse the
//! identical point list (forward or reversed).

use std::collections::{HashMap, HashSet};

use crate::geom::Point2;
use crate::heightmap::MeshBounds;
use crate::watershed::{LabelGrid, UNLABELED};

type Corner = (usize, usize);

/// One basin's traced boundary: the outermost ring followed by any holes,
/// both already simplified and lifted to world (mm) coordinates.
#[derive(Debug, Clone)]
pub struct TilePolygon {
    pub label: u32,
    pub rings: Vec<Vec<Point2>>,
}

pub struct BoundaryTracer;

impl BoundaryTracer {
    /// Traces every basin present in `labels`, simplifying each shared
    /// macro-edge with RDP at tolerance `simplify_epsilon_mm`.
    pub fn trace(labels: &LabelGrid, bounds: &MeshBounds, resolution_mm: f32, simplify_epsilon_mm: f32) -> Vec<TilePolygon> {
        let directed_owner = collect_directed_edges(labels);

        let mut canonical: HashSet<(Corner, Corner)> = HashSet::new();
        let mut adjacency: HashMap<Corner, Vec<Corner>> = HashMap::new();
        for &(a, b) in directed_owner.keys() {
            if canonical.insert(canon(a, b)) {
                adjacency.entry(a).or_default().push(b);
                adjacency.entry(b).or_default().push(a);
            }
        }
        let degree: HashMap<Corner, usize> = adjacency.iter().map(|(&c, ns)| (c, ns.len())).collect();
        let nodes: Vec<Corner> = degree.iter().filter(|&(_, &d)| d != 2).map(|(&c, _)| c).collect();

        let mut visited: HashSet<(Corner, Corner)> = HashSet::new();
        let mut macro_edges: Vec<MacroEdge> = Vec::new();

        for &n in &nodes {
            for m in adjacency.get(&n).cloned().unwrap_or_default() {
                if visited.contains(&canon(n, m)) {
                    continue;
                }
                let chain = walk_chain(n, m, &adjacency, &degree, &mut visited);
                macro_edges.push(build_macro_edge(chain, &directed_owner, bounds, resolution_mm, simplify_epsilon_mm));
            }
        }
        // Whatever is left belongs to node-free closed loops (e.g. a single
        // basin filling the whole grid, whose only boundary is the grid's
        // outer rectangle).
        let remaining: Vec<(Corner, Corner)> = canonical.iter().filter(|e| !visited.contains(*e)).copied().collect();
        for (a, b) in remaining {
            if visited.contains(&(a, b)) {
                continue;
            }
            let chain = walk_chain(a, b, &adjacency, &degree, &mut visited);
            macro_edges.push(build_macro_edge(chain, &directed_owner, bounds, resolution_mm, simplify_epsilon_mm));
        }

        assemble_polygons(&macro_edges)
    }
}

fn canon(a: Corner, b: Corner) -> (Corner, Corner) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn to_world(cx: usize, cy: usize, bounds: &MeshBounds, resolution_mm: f32) -> Point2 {
    Point2::new(bounds.x_min + cx as f32 * resolution_mm, bounds.y_max - cy as f32 * resolution_mm)
}

/// Emits one directed unit edge per cell side that borders a different
/// label (or the grid's outer edge), keyed by its owning label.
fn collect_directed_edges(labels: &LabelGrid) -> HashMap<(Corner, Corner), u32> {
    let width = labels.width();
    let height = labels.height();
    let neighbor_label = |nx: isize, ny: isize| -> u32 {
        if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
            UNLABELED
        } else {
            labels.get(nx as usize, ny as usize)
        }
    };

    let mut directed = HashMap::new();
    for y in 0..height {
        for x in 0..width {
            let label = labels.get(x, y);
            if label == UNLABELED {
                continue;
            }
            // Top: (x,y) -> (x+1,y); neighbor cell above.
            if neighbor_label(x as isize, y as isize - 1) != label {
                directed.insert(((x, y), (x + 1, y)), label);
            }
            // Right: (x+1,y) -> (x+1,y+1); neighbor cell to the right.
            if neighbor_label(x as isize + 1, y as isize) != label {
                directed.insert(((x + 1, y), (x + 1, y + 1)), label);
            }
            // Bottom: (x+1,y+1) -> (x,y+1); neighbor cell below.
            if neighbor_label(x as isize, y as isize + 1) != label {
                directed.insert(((x + 1, y + 1), (x, y + 1)), label);
            }
            // Left: (x,y+1) -> (x,y); neighbor cell to the left.
            if neighbor_label(x as isize - 1, y as isize) != label {
                directed.insert(((x, y + 1), (x, y)), label);
            }
        }
    }
    directed
}

/// Walks from `start` through `first` while corners stay at degree 2,
/// stopping once it reaches a node (degree != 2) or loops back to `start`.
fn walk_chain(
    start: Corner,
    first: Corner,
    adjacency: &HashMap<Corner, Vec<Corner>>,
    degree: &HashMap<Corner, usize>,
    visited: &mut HashSet<(Corner, Corner)>,
) -> Vec<Corner> {
    let mut chain = vec![start, first];
    visited.insert(canon(start, first));
    let mut prev = start;
    let mut cur = first;
    while degree.get(&cur).copied().unwrap_or(0) == 2 && cur != start {
        let next = match adjacency[&cur].iter().copied().find(|&n| n != prev) {
            Some(n) => n,
            None => break,
        };
        visited.insert(canon(cur, next));
        chain.push(next);
        prev = cur;
        cur = next;
    }
    chain
}

/// One node-to-node run of the boundary graph (or, if `is_loop`, an entire
/// node-free closed loop), simplified exactly once and shared by whichever
/// label(s) border it.
struct MacroEdge {
    start: Corner,
    end: Corner,
    owner_fwd: Option<u32>,
    owner_bwd: Option<u32>,
    /// Simplified points, `start` to `end`. For a loop this is the full
    /// simplified ring (no duplicated closing point).
    points: Vec<Point2>,
    is_loop: bool,
}

fn build_macro_edge(
    chain: Vec<Corner>,
    directed_owner: &HashMap<(Corner, Corner), u32>,
    bounds: &MeshBounds,
    resolution_mm: f32,
    epsilon: f32,
) -> MacroEdge {
    let start = chain[0];
    let end = *chain.last().unwrap();
    let is_loop = start == end && chain.len() > 2;
    let owner_fwd = directed_owner.get(&(chain[0], chain[1])).copied();
    let owner_bwd = directed_owner.get(&(chain[1], chain[0])).copied();
    let world: Vec<Point2> = chain.iter().map(|&(cx, cy)| to_world(cx, cy, bounds, resolution_mm)).collect();
    let points = if is_loop { simplify_closed(&world[..world.len() - 1], epsilon) } else { rdp(&world, epsilon) };
    MacroEdge { start, end, owner_fwd, owner_bwd, points, is_loop }
}

fn oriented_points(edge: &MacroEdge, forward: bool) -> Vec<Point2> {
    if forward {
        edge.points.clone()
    } else {
        let mut points = edge.points.clone();
        points.reverse();
        points
    }
}

/// Stitches macro-edges into each label's closed ring(s). A label's outer
/// ring and any holes come out of the same pool of macro-edges; they're
/// told apart afterwards by ranking rings by enclosed area.
fn assemble_polygons(macro_edges: &[MacroEdge]) -> Vec<TilePolygon> {
    let mut by_label: HashMap<u32, Vec<(usize, bool)>> = HashMap::new();
    for (i, edge) in macro_edges.iter().enumerate() {
        if let Some(label) = edge.owner_fwd {
            by_label.entry(label).or_default().push((i, true));
        }
        if let Some(label) = edge.owner_bwd {
            by_label.entry(label).or_default().push((i, false));
        }
    }

    let mut polygons = Vec::with_capacity(by_label.len());
    for (label, entries) in by_label {
        let mut rings: Vec<Vec<Point2>> = Vec::new();
        let mut open_entries: Vec<(usize, bool)> = Vec::new();
        for (i, forward) in entries {
            if macro_edges[i].is_loop {
                rings.push(macro_edges[i].points.clone());
            } else {
                open_entries.push((i, forward));
            }
        }

        let mut by_start: HashMap<Corner, Vec<usize>> = HashMap::new();
        for (pos, &(i, forward)) in open_entries.iter().enumerate() {
            let edge = &macro_edges[i];
            let oriented_start = if forward { edge.start } else { edge.end };
            by_start.entry(oriented_start).or_default().push(pos);
        }

        let mut used = vec![false; open_entries.len()];
        for start_pos in 0..open_entries.len() {
            if used[start_pos] {
                continue;
            }
            used[start_pos] = true;
            let (i0, fwd0) = open_entries[start_pos];
            let edge0 = &macro_edges[i0];
            let ring_start = if fwd0 { edge0.start } else { edge0.end };
            let mut ring_points = oriented_points(edge0, fwd0);
            let mut current = if fwd0 { edge0.end } else { edge0.start };

            while current != ring_start {
                let next_pos = by_start.get(&current).and_then(|cands| cands.iter().copied().find(|&p| !used[p]));
                match next_pos {
                    Some(p) => {
                        used[p] = true;
                        let (i, fwd) = open_entries[p];
                        let edge = &macro_edges[i];
                        let mut points = oriented_points(edge, fwd);
                        points.remove(0); // shared with ring_points' current last point
                        ring_points.extend(points);
                        current = if fwd { edge.end } else { edge.start };
                    }
                    None => break, // malformed topology; emit what was traced
                }
            }
            rings.push(ring_points);
        }

        rings.sort_by(|a, b| polygon_area(b).abs().partial_cmp(&polygon_area(a).abs()).unwrap());
        polygons.push(TilePolygon { label, rings });
    }
    polygons.sort_by_key(|p| p.label);
    polygons
}

fn polygon_area(ring: &[Point2]) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

fn perpendicular_distance(p: Point2, a: Point2, b: Point2) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        return p.distance_to(&a);
    }
    ((dx * (a.y - p.y) - dy * (a.x - p.x)).abs()) / len
}

fn rdp(points: &[Point2], epsilon: f32) -> Vec<Point2> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let (first, last) = (points[0], points[points.len() - 1]);
    let mut max_dist = 0.0f32;
    let mut split = 0;
    for (i, &p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let d = perpendicular_distance(p, first, last);
        if d > max_dist {
            max_dist = d;
            split = i;
        }
    }
    if max_dist > epsilon {
        let mut left = rdp(&points[..=split], epsilon);
        let right = rdp(&points[split..], epsilon);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// RDP over a closed ring: anchors the walk at the ring's first point,
/// treating it as both start and end of an open path.
fn simplify_closed(ring: &[Point2], epsilon: f32) -> Vec<Point2> {
    if ring.len() < 4 {
        return ring.to_vec();
    }
    let mut extended = ring.to_vec();
    extended.push(ring[0]);
    let mut simplified = rdp(&extended, epsilon);
    simplified.pop();
    simplified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::heightmap::Heightmap;
    use crate::watershed::WatershedSegmenter;

    fn bounds() -> MeshBounds {
        MeshBounds { x_min: 0.0, x_max: 20.0, y_min: 0.0, y_max: 20.0, z_max: 1.0 }
    }

    #[test]
    fn a_single_basin_over_the_whole_grid_traces_to_a_rectangle() {
        let grid = Heightmap::from_cells(20, 20, vec![1.0; 400]).unwrap();
        let cfg = CoreConfig::new(1.0, 100.0, 100.0).unwrap(); // bed bigger than the grid => one basin
        let labels = WatershedSegmenter::segment(&grid, None, &cfg);
        let polygons = BoundaryTracer::trace(&labels, &bounds(), 1.0, 0.01);
        assert_eq!(polygons.len(), 1);
        let outer = &polygons[0].rings[0];
        assert_eq!(outer.len(), 4);
        assert!((polygon_area(outer).abs() - 400.0).abs() < 1e-1);
    }

    #[test]
    fn two_basins_share_a_coincident_boundary_segment() {
        let mut cells = vec![0.0f32; 20 * 20];
        for y in 0..20 {
            cells[y * 20 + 10] = 30.0;
        }
        let grid = Heightmap::from_cells(20, 20, cells).unwrap();
        let cfg = CoreConfig::new(1.0, 10.0, 20.0).unwrap(); // two side-by-side basins
        let labels = WatershedSegmenter::segment(&grid, None, &cfg);
        let polygons = BoundaryTracer::trace(&labels, &bounds(), 1.0, 0.01);
        assert_eq!(polygons.len(), 2);
        for p in &polygons {
            assert!(!p.rings.is_empty());
            assert!(p.rings[0].len() >= 3);
        }
    }

    #[test]
    fn two_labels_trace_an_identical_simplified_point_sequence_along_their_shared_divider() {
        // A staircase divider: label 0 on the left/top, label 1 on the
        // right/bottom, the split moving from corner-x=2 to corner-x=3
        // partway down. Built with `from_raw` so the flood's nondeterministic
        // iteration order can't perturb which corner either ring starts at.
        #[rustfmt::skip]
        let labels = LabelGrid::from_raw(4, 4, vec![
            0, 0, 1, 1,
            0, 0, 1, 1,
            0, 0, 0, 1,
            0, 0, 0, 1,
        ]);
        let b = MeshBounds { x_min: 0.0, x_max: 4.0, y_min: 0.0, y_max: 4.0, z_max: 1.0 };
        let polygons = BoundaryTracer::trace(&labels, &b, 1.0, 0.01);
        assert_eq!(polygons.len(), 2);

        // The divider's raw corners are (2,0)->(2,1)->(2,2)->(3,2)->(3,3)->(3,4);
        // RDP should drop the two collinear midpoints, leaving the two bends.
        let expected = [Point2::new(2.0, 4.0), Point2::new(2.0, 2.0), Point2::new(3.0, 2.0), Point2::new(3.0, 0.0)];
        for p in &polygons {
            assert!(
                cyclic_contains_subsequence(&p.rings[0], &expected),
                "label {} ring does not contain the shared divider's point sequence: {:?}",
                p.label,
                p.rings[0]
            );
        }
    }

    #[test]
    fn rdp_collapses_collinear_points_on_a_straight_edge() {
        let points: Vec<Point2> = (0..10).map(|i| Point2::new(i as f32, 0.0)).collect();
        let simplified = rdp(&points, 0.01);
        assert_eq!(simplified.len(), 2);
    }

    fn points_close(a: Point2, b: Point2) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    /// Whether `seq` (or its reverse) appears, contiguously, at some rotation
    /// of the closed ring `ring`. Closed rings have no fixed starting point,
    /// so this is the only robust way to check "this exact sub-path is
    /// present" without depending on where the tracer happened to start.
    fn cyclic_contains_subsequence(ring: &[Point2], seq: &[Point2]) -> bool {
        let n = ring.len();
        if seq.is_empty() || seq.len() > n {
            return false;
        }
        let try_match = |needle: &[Point2]| (0..n).any(|start| (0..needle.len()).all(|k| points_close(ring[(start + k) % n], needle[k])));
        let reversed: Vec<Point2> = seq.iter().rev().copied().collect();
        try_match(seq) || try_match(&reversed)
    }
}
