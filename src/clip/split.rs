//! Triangle-vs-line splitting (spec §4.3.3): classifies a triangle's three
//! vertices against a [`LocalLine`] and, when it straddles, cuts it into a
//! negative-side and a positive-side polygon, each fan-triangulated.

use crate::clip::cut_path::LocalLine;
use crate::geom::{lerp3, Point2, Triangle3};

/// Where a triangle sits relative to a local line, with `epsilon` as the
/// on-line tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Every vertex is on the non-negative side (or on the line).
    AllNonNegative,
    /// Every vertex is on the non-positive side (or on the line).
    AllNonPositive,
    /// At least one vertex strictly on each side.
    Mixed,
}

/// Classifies a triangle against `line`. A triangle with every vertex
/// exactly on the line (a degenerate, edge-on case) is deterministically
/// reported as [`Classification::AllNonPositive`].
pub fn classify(tri: &Triangle3, line: &LocalLine, epsilon: f32) -> Classification {
    let vals = signed_values(tri, line);
    let all_nonneg = vals.iter().all(|&v| v >= -epsilon);
    let all_nonpos = vals.iter().all(|&v| v <= epsilon);
    if all_nonpos {
        Classification::AllNonPositive
    } else if all_nonneg {
        Classification::AllNonNegative
    } else {
        Classification::Mixed
    }
}

fn signed_values(tri: &Triangle3, line: &LocalLine) -> [f32; 3] {
    [
        line.signed_value(Point2::new(tri.vertices[0].x, tri.vertices[0].y)),
        line.signed_value(Point2::new(tri.vertices[1].x, tri.vertices[1].y)),
        line.signed_value(Point2::new(tri.vertices[2].x, tri.vertices[2].y)),
    ]
}

/// Result of splitting a straddling triangle: each side's fragments
/// (fan-triangulated from at most a quad) plus the single segment of the cut
/// line that actually crossed the triangle.
pub struct SplitResult {
    pub negative_side: Vec<Triangle3>,
    pub positive_side: Vec<Triangle3>,
    pub cut_segment: Option<(crate::geom::Point3, crate::geom::Point3)>,
}

/// Splits a triangle against `line`. Callers should only reach for this once
/// [`classify`] has reported [`Classification::Mixed`].
pub fn split_triangle(tri: &Triangle3, line: &LocalLine, epsilon: f32) -> SplitResult {
    let verts = tri.vertices;
    let vals = signed_values(tri, line);
    let mut negative = Vec::with_capacity(4);
    let mut positive = Vec::with_capacity(4);
    let mut crossings = Vec::with_capacity(2);

    for i in 0..3 {
        let cur = verts[i];
        let cur_val = vals[i];
        let next = verts[(i + 1) % 3];
        let next_val = vals[(i + 1) % 3];

        if cur_val > epsilon {
            positive.push(cur);
        } else if cur_val < -epsilon {
            negative.push(cur);
        } else {
            positive.push(cur);
            negative.push(cur);
        }

        let cur_sign = sign(cur_val, epsilon);
        let next_sign = sign(next_val, epsilon);
        if cur_sign != 0 && next_sign != 0 && cur_sign != next_sign {
            let t = cur_val / (cur_val - next_val);
            let crossing = lerp3(cur, next, t);
            positive.push(crossing);
            negative.push(crossing);
            crossings.push(crossing);
        }
    }

    let cut_segment = if crossings.len() == 2 {
        Some((crossings[0], crossings[1]))
    } else {
        None
    };

    SplitResult {
        negative_side: fan_triangulate(&negative),
        positive_side: fan_triangulate(&positive),
        cut_segment,
    }
}

fn sign(v: f32, epsilon: f32) -> i32 {
    if v > epsilon {
        1
    } else if v < -epsilon {
        -1
    } else {
        0
    }
}

fn fan_triangulate(poly: &[crate::geom::Point3]) -> Vec<Triangle3> {
    if poly.len() < 3 {
        return Vec::new();
    }
    (1..poly.len() - 1).map(|i| Triangle3::new(poly[0], poly[i], poly[i + 1])).collect()
}
