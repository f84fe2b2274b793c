//! Cap reconstruction (spec §4.3.4): turns the loose cut segments collected
//! along one cut path into closed loops, unrolls each loop into an
//! arc-length/height plane, and ear-clips it into cap triangles.

use std::collections::HashMap;

use crate::config::CoreConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::geom::{Point3, Triangle3};

type NodeKey = (i64, i64, i64);

fn quantize(v: f32, quantum: f32) -> i64 {
    (v / quantum).round() as i64
}

fn snapped_point(p: Point3, quantum: f32) -> Point3 {
    Point3::new(
        quantize(p.x, quantum) as f32 * quantum,
        quantize(p.y, quantum) as f32 * quantum,
        quantize(p.z, quantum) as f32 * quantum,
    )
}

/// Reconstructs and triangulates caps along a single cut, reporting any
/// chain that failed to close as a diagnostic rather than a hard error
/// (spec §4.3.6).
pub struct CapReconstructor<'a> {
    config: &'a CoreConfig,
    diagnostics: &'a DiagnosticSink,
}

impl<'a> CapReconstructor<'a> {
    pub fn new(config: &'a CoreConfig, diagnostics: &'a DiagnosticSink) -> Self {
        Self { config, diagnostics }
    }

    /// Builds closed loops from the undirected multigraph of segments, then
    /// ear-clips each into cap triangles. Open chains and loops shorter than
    /// three vertices are dropped; the former emits an [`DiagnosticKind::OpenLoop`].
    pub fn reconstruct(&self, cut_id: &str, segments: &[(Point3, Point3)]) -> Vec<Triangle3> {
        let loops = self.find_loops(cut_id, segments);
        loops.iter().flat_map(|l| triangulate_loop(l)).collect()
    }

    fn find_loops(&self, cut_id: &str, segments: &[(Point3, Point3)]) -> Vec<Vec<Point3>> {
        let quantum = self.config.snap_quantum_mm;
        let mut rep_point: HashMap<NodeKey, Point3> = HashMap::new();
        let mut adjacency: HashMap<NodeKey, Vec<usize>> = HashMap::new();
        let mut edges: Vec<(NodeKey, NodeKey)> = Vec::new();

        for &(p, q) in segments {
            let kp = quantized_key(p, quantum);
            let kq = quantized_key(q, quantum);
            rep_point.entry(kp).or_insert_with(|| snapped_point(p, quantum));
            rep_point.entry(kq).or_insert_with(|| snapped_point(q, quantum));
            let idx = edges.len();
            edges.push((kp, kq));
            adjacency.entry(kp).or_default().push(idx);
            adjacency.entry(kq).or_default().push(idx);
        }

        let mut used = vec![false; edges.len()];
        let mut loops = Vec::new();

        for start in 0..edges.len() {
            if used[start] {
                continue;
            }
            used[start] = true;
            let (a, b) = edges[start];
            let mut chain: std::collections::VecDeque<NodeKey> = std::collections::VecDeque::new();
            chain.push_back(a);
            chain.push_back(b);

            let mut closed = extend_forward(&mut chain, &edges, &adjacency, &mut used);
            if !closed {
                closed = extend_backward(&mut chain, &edges, &adjacency, &mut used);
            }

            if closed {
                chain.pop_back();
                let points: Vec<Point3> = chain.iter().map(|k| rep_point[k]).collect();
                if points.len() >= 3 {
                    loops.push(points);
                }
            } else {
                self.diagnostics.emit(
                    Diagnostic::new(
                        DiagnosticKind::OpenLoop,
                        format!("cap chain of {} segments failed to close", chain.len().saturating_sub(1)),
                    )
                    .with_cut_id(cut_id),
                );
            }
        }

        loops
    }
}

fn extend_forward(
    chain: &mut std::collections::VecDeque<NodeKey>,
    edges: &[(NodeKey, NodeKey)],
    adjacency: &HashMap<NodeKey, Vec<usize>>,
    used: &mut [bool],
) -> bool {
    loop {
        let tail = *chain.back().unwrap();
        let head = *chain.front().unwrap();
        if tail == head && chain.len() > 2 {
            return true;
        }
        match next_unused_edge(tail, adjacency, used) {
            Some(edge_idx) => {
                used[edge_idx] = true;
                let other = other_endpoint(edges[edge_idx], tail);
                chain.push_back(other);
            }
            None => return false,
        }
    }
}

fn extend_backward(
    chain: &mut std::collections::VecDeque<NodeKey>,
    edges: &[(NodeKey, NodeKey)],
    adjacency: &HashMap<NodeKey, Vec<usize>>,
    used: &mut [bool],
) -> bool {
    loop {
        let head = *chain.front().unwrap();
        let tail = *chain.back().unwrap();
        if head == tail && chain.len() > 2 {
            return true;
        }
        match next_unused_edge(head, adjacency, used) {
            Some(edge_idx) => {
                used[edge_idx] = true;
                let other = other_endpoint(edges[edge_idx], head);
                chain.push_front(other);
            }
            None => return false,
        }
    }
}

fn next_unused_edge(node: NodeKey, adjacency: &HashMap<NodeKey, Vec<usize>>, used: &[bool]) -> Option<usize> {
    adjacency.get(&node).and_then(|incident| incident.iter().copied().find(|&idx| !used[idx]))
}

fn other_endpoint(edge: (NodeKey, NodeKey), from: NodeKey) -> NodeKey {
    if edge.0 == from {
        edge.1
    } else {
        edge.0
    }
}

fn quantized_key(p: Point3, quantum: f32) -> NodeKey {
    (quantize(p.x, quantum), quantize(p.y, quantum), quantize(p.z, quantum))
}

/// Unrolls a closed loop into `(arc length, z)` and ear-clips it, lifting
/// the resulting triangles back to the loop's original 3D points.
fn triangulate_loop(loop_points: &[Point3]) -> Vec<Triangle3> {
    let plane = parameterize(loop_points);
    let indices = ear_clip(&plane);
    indices
        .into_iter()
        .map(|[a, b, c]| Triangle3::new(loop_points[a], loop_points[b], loop_points[c]))
        .collect()
}

fn parameterize(loop_points: &[Point3]) -> Vec<(f32, f32)> {
    let mut u = 0.0f32;
    let mut out = Vec::with_capacity(loop_points.len());
    out.push((0.0, loop_points[0].z));
    for i in 1..loop_points.len() {
        let prev = loop_points[i - 1];
        let cur = loop_points[i];
        let dx = cur.x - prev.x;
        let dy = cur.y - prev.y;
        u += (dx * dx + dy * dy).sqrt();
        out.push((u, cur.z));
    }
    out
}

fn polygon_signed_area(poly: &[(f32, f32)]) -> f32 {
    let mut sum = 0.0;
    for i in 0..poly.len() {
        let (x0, y0) = poly[i];
        let (x1, y1) = poly[(i + 1) % poly.len()];
        sum += x0 * y1 - x1 * y0;
    }
    sum * 0.5
}

fn point_in_triangle(p: (f32, f32), a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> bool {
    let sign = |p1: (f32, f32), p2: (f32, f32), p3: (f32, f32)| -> f32 {
        (p1.0 - p3.0) * (p2.1 - p3.1) - (p2.0 - p3.0) * (p1.1 - p3.1)
    };
    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn is_ear(poly: &[(f32, f32)], indices: &[usize], pos: usize) -> bool {
    let n = indices.len();
    let prev = indices[(pos + n - 1) % n];
    let cur = indices[pos];
    let next = indices[(pos + 1) % n];
    let (a, b, c) = (poly[prev], poly[cur], poly[next]);
    let cross = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
    if cross <= 0.0 {
        return false;
    }
    for &idx in indices {
        if idx == prev || idx == cur || idx == next {
            continue;
        }
        if point_in_triangle(poly[idx], a, b, c) {
            return false;
        }
    }
    true
}

/// Classic O(n^2) ear clipping. `poly` is assumed simple (non-self-intersecting);
/// curvature from the regression fit can make it non-convex but real cap
/// loops from a single cut rarely self-intersect.
fn ear_clip(poly: &[(f32, f32)]) -> Vec<[usize; 3]> {
    let n = poly.len();
    if n < 3 {
        return Vec::new();
    }
    let mut indices: Vec<usize> = (0..n).collect();
    if polygon_signed_area(poly) < 0.0 {
        indices.reverse();
    }

    let mut triangles = Vec::with_capacity(n.saturating_sub(2));
    while indices.len() > 3 {
        let mut found = false;
        for pos in 0..indices.len() {
            if is_ear(poly, &indices, pos) {
                let n = indices.len();
                let prev = indices[(pos + n - 1) % n];
                let cur = indices[pos];
                let next = indices[(pos + 1) % n];
                triangles.push([prev, cur, next]);
                indices.remove(pos);
                found = true;
                break;
            }
        }
        if !found {
            // Degenerate polygon (collinear run, numerical noise); stop
            // rather than loop forever, keeping whatever was triangulated.
            break;
        }
    }
    if indices.len() == 3 {
        triangles.push([indices[0], indices[1], indices[2]]);
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CoreConfig {
        CoreConfig::new(1.0, 200.0, 200.0).unwrap()
    }

    #[test]
    fn a_closed_square_reconstructs_into_two_triangles() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(4.0, 0.0, 0.0);
        let c = Point3::new(4.0, 4.0, 0.0);
        let d = Point3::new(0.0, 4.0, 0.0);
        let segments = vec![(a, b), (b, c), (c, d), (d, a)];
        let diagnostics = DiagnosticSink::new();
        let cfg = config();
        let reconstructor = CapReconstructor::new(&cfg, &diagnostics);
        let triangles = reconstructor.reconstruct("v0", &segments);
        assert_eq!(triangles.len(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn an_open_chain_is_reported_without_producing_triangles() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(4.0, 0.0, 0.0);
        let c = Point3::new(4.0, 4.0, 0.0);
        let segments = vec![(a, b), (b, c)];
        let diagnostics = DiagnosticSink::new();
        let cfg = config();
        let reconstructor = CapReconstructor::new(&cfg, &diagnostics);
        let triangles = reconstructor.reconstruct("v0", &segments);
        assert!(triangles.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn snapping_absorbs_small_numerical_noise_between_segment_endpoints() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(4.0, 0.0, 0.0);
        let b_noisy = Point3::new(4.0009, 0.0009, 0.0);
        let c = Point3::new(4.0, 4.0, 0.0);
        let d = Point3::new(0.0, 4.0, 0.0);
        let segments = vec![(a, b), (b_noisy, c), (c, d), (d, a)];
        let diagnostics = DiagnosticSink::new();
        let cfg = config();
        let reconstructor = CapReconstructor::new(&cfg, &diagnostics);
        let triangles = reconstructor.reconstruct("v0", &segments);
        assert_eq!(triangles.len(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn ear_clip_triangulates_a_convex_pentagon() {
        let poly = vec![(0.0, 0.0), (2.0, 0.0), (3.0, 1.5), (1.0, 3.0), (-1.0, 1.5)];
        let triangles = ear_clip(&poly);
        assert_eq!(triangles.len(), 3);
    }
}
