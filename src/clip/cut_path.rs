//! Cut paths (spec §4.3.2): the seams produced by [`crate::seam::SeamFinder`],
//! converted to world units and equipped with a per-triangle local line fit
//! so the clipper can slice against a smoothly-varying curve instead of a
//! single straight line.

use crate::geom::Point2;
use crate::heightmap::MeshBounds;
use crate::seam::Seam;

/// Which family a cut path belongs to. A vertical cut has one point per
/// heightmap row and separates tile columns; a horizontal cut has one point
/// per column and separates tile rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

/// A seam lifted into world (mm) coordinates, plus the bounds used for cheap
/// rejection when routing a triangle that doesn't come near it.
#[derive(Debug, Clone)]
pub struct CutPath {
    pub id: String,
    pub axis: Axis,
    pub points: Vec<Point2>,
    /// Min/max of the path's wandering coordinate (X for a vertical cut, Y
    /// for a horizontal one) — the "minor axis" extent used for the O(1)
    /// rejection test in spec §4.3.1.
    pub minor_min: f32,
    pub minor_max: f32,
}

impl CutPath {
    /// Builds a cut path from a grid-space seam, flipping Y and scaling by
    /// the heightmap resolution to recover world coordinates.
    pub fn from_seam(id: impl Into<String>, axis: Axis, seam: &Seam, bounds: &MeshBounds, resolution_mm: f32) -> Self {
        let points: Vec<Point2> = seam
            .points
            .iter()
            .map(|&(gx, gy)| {
                let world_x = bounds.x_min + gx as f32 * resolution_mm;
                let world_y = bounds.y_max - gy as f32 * resolution_mm;
                Point2::new(world_x, world_y)
            })
            .collect();
        let minor = |p: &Point2| match axis {
            Axis::Vertical => p.x,
            Axis::Horizontal => p.y,
        };
        let minor_min = points.iter().map(minor).fold(f32::INFINITY, f32::min);
        let minor_max = points.iter().map(minor).fold(f32::NEG_INFINITY, f32::max);
        Self { id: id.into(), axis, points, minor_min, minor_max }
    }

    /// Average of the coordinate used to order distinct cuts within a family
    /// (X for vertical cuts, ascending left to right; Y for horizontal cuts,
    /// descending so that the first cut is the topmost band, matching the
    /// heightmap's row-0-is-max-Y convention).
    pub fn average_minor(&self) -> f32 {
        let minor = |p: &Point2| match self.axis {
            Axis::Vertical => p.x,
            Axis::Horizontal => p.y,
        };
        self.points.iter().map(minor).sum::<f32>() / self.points.len().max(1) as f32
    }

    /// Fits a local line to the portion of this path near a triangle's
    /// extent along the path's independent coordinate (Y for a vertical
    /// cut's `x = a + b*y`, X for a horizontal cut's `y = a + b*x`), with a
    /// 1mm margin on either side. Falls back to the single path segment
    /// straddling `centroid` when fewer than two points fall in range.
    pub fn local_line(&self, indep_lo: f32, indep_hi: f32, margin: f32, centroid: Point2) -> LocalLine {
        let lo = indep_lo - margin;
        let hi = indep_hi + margin;
        let coord_of = |p: &Point2| match self.axis {
            Axis::Vertical => p.y,
            Axis::Horizontal => p.x,
        };
        let relevant: Vec<Point2> = self
            .points
            .iter()
            .copied()
            .filter(|p| {
                let c = coord_of(p);
                c >= lo && c <= hi
            })
            .collect();
        if relevant.len() >= 2 {
            LocalLine::least_squares(&relevant, self.axis)
        } else {
            self.segment_straddling(centroid)
        }
    }

    fn segment_straddling(&self, centroid: Point2) -> LocalLine {
        let coord_of = |p: &Point2| match self.axis {
            Axis::Vertical => p.y,
            Axis::Horizontal => p.x,
        };
        let target = coord_of(&centroid);
        if self.points.len() < 2 {
            let only = self.points.first().copied().unwrap_or(Point2::new(0.0, 0.0));
            return LocalLine::least_squares(&[only, only], self.axis);
        }
        let mut chosen = 0;
        let mut straddled = false;
        for w in 0..self.points.len() - 1 {
            let c0 = coord_of(&self.points[w]) - target;
            let c1 = coord_of(&self.points[w + 1]) - target;
            if c0 * c1 <= 0.0 {
                chosen = w;
                straddled = true;
                break;
            }
        }
        if !straddled {
            let first = coord_of(&self.points[0]);
            let last = coord_of(&self.points[self.points.len() - 1]);
            chosen = if (target - first).abs() <= (target - last).abs() {
                0
            } else {
                self.points.len() - 2
            };
        }
        LocalLine::least_squares(&self.points[chosen..=chosen + 1], self.axis)
    }
}

/// A local slicing line, represented as `dependent = a + b * independent`
/// (X as a function of Y for vertical cuts, Y as a function of X for
/// horizontal cuts) so classification is a single multiply-add rather than a
/// general 2D line intersection.
#[derive(Debug, Clone, Copy)]
pub struct LocalLine {
    pub axis: Axis,
    pub a: f32,
    pub b: f32,
}

impl LocalLine {
    /// Signed distance of `p` from the line along the dependent axis:
    /// positive means "right" of a vertical cut (greater X) or "above" a
    /// horizontal cut (greater Y).
    pub fn signed_value(&self, p: Point2) -> f32 {
        match self.axis {
            Axis::Vertical => p.x - (self.a + self.b * p.y),
            Axis::Horizontal => p.y - (self.a + self.b * p.x),
        }
    }

    fn least_squares(points: &[Point2], axis: Axis) -> LocalLine {
        let (independent, dependent): (Vec<f32>, Vec<f32>) = match axis {
            Axis::Vertical => (points.iter().map(|p| p.y).collect(), points.iter().map(|p| p.x).collect()),
            Axis::Horizontal => (points.iter().map(|p| p.x).collect(), points.iter().map(|p| p.y).collect()),
        };
        let n = independent.len() as f32;
        let mean_x = independent.iter().sum::<f32>() / n;
        let mean_y = dependent.iter().sum::<f32>() / n;
        let mut cov = 0.0f32;
        let mut var = 0.0f32;
        for i in 0..independent.len() {
            let dx = independent[i] - mean_x;
            cov += dx * (dependent[i] - mean_y);
            var += dx * dx;
        }
        let (a, b) = if var > 1e-9 {
            let b = cov / var;
            (mean_y - b * mean_x, b)
        } else {
            (mean_y, 0.0)
        };
        LocalLine { axis, a, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seam::Seam;

    fn bounds() -> MeshBounds {
        MeshBounds { x_min: 0.0, x_max: 100.0, y_min: 0.0, y_max: 100.0, z_max: 10.0 }
    }

    #[test]
    fn from_seam_flips_y_and_scales_by_resolution() {
        let seam = Seam { points: vec![(2, 0), (2, 1), (3, 2)], used_fallback: false };
        let path = CutPath::from_seam("v0", Axis::Vertical, &seam, &bounds(), 2.0);
        assert_eq!(path.points[0], Point2::new(4.0, 100.0));
        assert_eq!(path.points[1], Point2::new(4.0, 98.0));
        assert_eq!(path.points[2], Point2::new(6.0, 96.0));
    }

    #[test]
    fn local_line_fits_a_straight_vertical_path_exactly() {
        let seam = Seam { points: (0..10).map(|y| (5usize, y)).collect(), used_fallback: false };
        let path = CutPath::from_seam("v0", Axis::Vertical, &seam, &bounds(), 1.0);
        let line = path.local_line(90.0, 100.0, 1.0, Point2::new(5.0, 95.0));
        for p in &path.points {
            assert!((line.signed_value(*p)).abs() < 1e-3);
        }
    }

    #[test]
    fn falls_back_to_a_segment_when_range_is_sparse() {
        let seam = Seam { points: vec![(0, 0), (5, 50)], used_fallback: false };
        let path = CutPath::from_seam("v0", Axis::Vertical, &seam, &bounds(), 1.0);
        let line = path.local_line(49.0, 49.0, 1.0, Point2::new(5.0, 50.0));
        assert!(line.signed_value(Point2::new(5.0, 50.0)).abs() < 1e-3);
    }
}
