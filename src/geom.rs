//! Shared geometry primitives (spec §4.6), used by both the streaming
//! clipper and the boundary tracer.
//!
//! Point types follow the teacher's `utils::geometry::{Point2D, Point3D}`
//! shape (plain `f32` fields, `Copy`, a `distance_to` helper) rather than
//! pulling in a vector-math crate: the pipeline only ever needs a handful
//! of free functions over these, not a full linear-algebra surface.

use serde::{Deserialize, Serialize};

/// A point in the 2D heightmap/world plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A point in mesh space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(&self, other: &Point3) -> Point3 {
        Point3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn cross(&self, other: &Point3) -> Point3 {
        Point3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn dot(&self, other: &Point3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }
}

/// A triangle in mesh space.
#[derive(Debug, Clone, Copy)]
pub struct Triangle3 {
    pub vertices: [Point3; 3],
}

impl Triangle3 {
    pub fn new(a: Point3, b: Point3, c: Point3) -> Self {
        Self { vertices: [a, b, c] }
    }

    /// Unnormalized normal (twice the signed area vector); zero for a
    /// degenerate triangle.
    pub fn normal(&self) -> Point3 {
        let e1 = self.vertices[1].sub(&self.vertices[0]);
        let e2 = self.vertices[2].sub(&self.vertices[0]);
        e1.cross(&e2)
    }

    /// 3D surface area.
    pub fn area(&self) -> f32 {
        self.normal().length() * 0.5
    }

    /// Area of the triangle projected onto the XY plane (signed, then
    /// taken absolute — callers comparing against §8 invariant 4 want the
    /// unsigned footprint area regardless of winding).
    pub fn projected_xy_area(&self) -> f32 {
        let [a, b, c] = self.vertices;
        (0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))).abs()
    }

    pub fn longest_edge_length(&self) -> f32 {
        let [a, b, c] = self.vertices;
        let ab = a.sub(&b).length();
        let bc = b.sub(&c).length();
        let ca = c.sub(&a).length();
        ab.max(bc).max(ca)
    }

    pub fn is_degenerate(&self, epsilon: f32) -> bool {
        if self.vertices.iter().any(|v| v.x.is_nan() || v.y.is_nan() || v.z.is_nan()) {
            return true;
        }
        self.area() <= epsilon
    }

    /// The same triangle with its winding flipped (swaps the last two
    /// vertices), used when a cap fragment is re-emitted to the tile on the
    /// opposite side of its cut.
    pub fn reversed(&self) -> Triangle3 {
        Triangle3::new(self.vertices[0], self.vertices[2], self.vertices[1])
    }

    /// Mid-edge bisection into four congruent sub-triangles sharing edge
    /// midpoints (spec §4.6).
    pub fn subdivide(&self) -> [Triangle3; 4] {
        let [a, b, c] = self.vertices;
        let mab = midpoint(a, b);
        let mbc = midpoint(b, c);
        let mca = midpoint(c, a);
        [
            Triangle3::new(a, mab, mca),
            Triangle3::new(mab, b, mbc),
            Triangle3::new(mca, mbc, c),
            Triangle3::new(mab, mbc, mca),
        ]
    }
}

pub fn midpoint(a: Point3, b: Point3) -> Point3 {
    Point3::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5, (a.z + b.z) * 0.5)
}

/// Linear interpolation between two 3D points, component-wise.
pub fn lerp3(a: Point3, b: Point3, t: f32) -> Point3 {
    Point3::new(
        a.x + (b.x - a.x) * t,
        a.y + (b.y - a.y) * t,
        a.z + (b.z - a.z) * t,
    )
}

/// Signed side of `p` with respect to the oriented segment `a -> b`.
/// Positive = left, negative = right, zero = collinear.
pub fn signed_side(a: Point2, b: Point2, p: Point2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Intersection of two 2D segments `(p0, p1)` and `(p2, p3)`.
///
/// Returns `None` for parallel (including collinear) segments. Otherwise
/// returns the intersection point along with both segment parameters; the
/// caller is responsible for checking whether those parameters fall in
/// `[0, 1]` to know whether the segments actually overlap.
pub fn segment_intersection(
    p0: Point2,
    p1: Point2,
    p2: Point2,
    p3: Point2,
) -> Option<(Point2, f32, f32)> {
    let d1x = p1.x - p0.x;
    let d1y = p1.y - p0.y;
    let d2x = p3.x - p2.x;
    let d2y = p3.y - p2.y;

    let denom = d1x * d2y - d1y * d2x;
    if denom.abs() < 1e-12 {
        return None;
    }

    let dx = p2.x - p0.x;
    let dy = p2.y - p0.y;

    let t = (dx * d2y - dy * d2x) / denom;
    let u = (dx * d1y - dy * d1x) / denom;

    let point = Point2::new(p0.x + t * d1x, p0.y + t * d1y);
    Some((point, t, u))
}
