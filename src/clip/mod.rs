//! The streaming triangle clipper (spec §4.3): the size-dominant stage of
//! the tiled layout branch. Reads the source mesh once, adaptively
//! tessellates oversized triangles, recursively slices each piece against
//! the vertical then horizontal cut families, and reassembles the holes left
//! behind along each cut into cap triangles re-emitted to both neighboring
//! tiles.

pub mod cap;
pub mod cut_path;
pub mod sink;
pub mod split;

use std::collections::HashMap;

use crate::config::CoreConfig;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::error::Result;
use crate::geom::{Point2, Point3, Triangle3};
use crate::mesh::MeshReader;

pub use cap::CapReconstructor;
pub use cut_path::{Axis, CutPath, LocalLine};
pub use sink::{FileTileSink, InMemoryTileSink, TileId, TileSink};
pub use split::{classify, split_triangle, Classification};

/// Summary counters returned once a clip run has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClipperStats {
    pub triangles_read: u64,
    pub dropped_degenerate: u64,
    pub cap_triangles: u64,
}

/// Routes every triangle of a source mesh into per-tile fragments against a
/// fixed set of vertical and horizontal cut paths.
///
/// `vertical_cuts` must be sorted by increasing [`CutPath::average_minor`]
/// (left to right); `horizontal_cuts` must be sorted by decreasing
/// [`CutPath::average_minor`] (top to bottom), matching the heightmap's
/// row-0-is-max-Y convention. Both preconditions are the caller's
/// responsibility — [`crate::pipeline::Pipeline`] constructs them in this
/// order already.
pub struct StreamingClipper<'a> {
    config: &'a CoreConfig,
    vertical_cuts: Vec<CutPath>,
    horizontal_cuts: Vec<CutPath>,
    diagnostics: &'a DiagnosticSink,
    cut_segments: HashMap<String, Vec<(Point3, Point3)>>,
    stats: ClipperStats,
}

impl<'a> StreamingClipper<'a> {
    pub fn new(
        config: &'a CoreConfig,
        vertical_cuts: Vec<CutPath>,
        horizontal_cuts: Vec<CutPath>,
        diagnostics: &'a DiagnosticSink,
    ) -> Self {
        Self {
            config,
            vertical_cuts,
            horizontal_cuts,
            diagnostics,
            cut_segments: HashMap::new(),
            stats: ClipperStats::default(),
        }
    }

    /// Streams `reader`'s triangles through tessellation and routing, then
    /// reconstructs and emits every cut's cap. Returns summary counters.
    pub fn run<R: std::io::Read>(mut self, reader: R, sink: &mut impl TileSink) -> Result<ClipperStats> {
        let mut mesh_reader = MeshReader::open(reader)?;
        while let Some(raw) = mesh_reader.next_triangle()? {
            self.stats.triangles_read += 1;
            let tri = raw.as_triangle3();
            if tri.is_degenerate(self.config.epsilon) {
                self.stats.dropped_degenerate += 1;
                self.diagnostics.emit(Diagnostic::new(DiagnosticKind::DroppedDegenerate, "source triangle has near-zero area"));
                continue;
            }
            self.route_triangle(tri, sink)?;
        }
        self.emit_caps(sink)?;
        Ok(self.stats)
    }

    fn route_triangle(&mut self, tri: Triangle3, sink: &mut impl TileSink) -> Result<()> {
        for piece in tessellate(tri, self.config) {
            let mut by_column = Vec::new();
            self.slice_vertical_only(piece, 0, true, &mut by_column);
            for (sub, col) in by_column {
                let mut by_row = Vec::new();
                self.slice_horizontal_only(sub, 0, true, &mut by_row);
                for (frag, row) in by_row {
                    self.emit_fragment(frag, (row, col), sink)?;
                }
            }
        }
        Ok(())
    }

    /// Slices `tri` against the vertical cut family starting at index `i`,
    /// collecting `(fragment, col)` pairs. Columns increase with X, matching
    /// `vertical_cuts`'s sort order. `record` controls whether new straddle
    /// segments are added to `cut_segments`: `false` when re-routing a cap
    /// triangle across the orthogonal family, since that pass is purely
    /// assigning tiles and must not manufacture a second cap for a cut
    /// that's already been reconstructed.
    fn slice_vertical_only(&mut self, tri: Triangle3, i: usize, record: bool, out: &mut Vec<(Triangle3, u32)>) {
        if i >= self.vertical_cuts.len() {
            out.push((tri, i as u32));
            return;
        }
        let (min_x, max_x, min_y, max_y) = xy_extent(&tri);
        let cut = &self.vertical_cuts[i];
        let eps = self.config.epsilon;

        if max_x < cut.minor_min - eps {
            out.push((tri, i as u32));
            return;
        }
        if min_x > cut.minor_max + eps {
            self.slice_vertical_only(tri, i + 1, record, out);
            return;
        }

        let line = cut.local_line(min_y, max_y, 1.0, centroid2(&tri));
        match classify(&tri, &line, eps) {
            Classification::AllNonPositive => out.push((tri, i as u32)),
            Classification::AllNonNegative => self.slice_vertical_only(tri, i + 1, record, out),
            Classification::Mixed => {
                let result = split_triangle(&tri, &line, eps);
                if record {
                    if let Some(seg) = result.cut_segment {
                        self.cut_segments.entry(cut.id.clone()).or_default().push(seg);
                    }
                }
                for left in result.negative_side {
                    out.push((left, i as u32));
                }
                for right in result.positive_side {
                    self.slice_vertical_only(right, i + 1, record, out);
                }
            }
        }
    }

    /// Slices `tri` against the horizontal cut family starting at index `j`,
    /// collecting `(fragment, row)` pairs. `horizontal_cuts[0]` is the
    /// topmost band; row indices increase moving down (decreasing Y). See
    /// [`StreamingClipper::slice_vertical_only`] for what `record` means.
    fn slice_horizontal_only(&mut self, tri: Triangle3, j: usize, record: bool, out: &mut Vec<(Triangle3, u32)>) {
        if j >= self.horizontal_cuts.len() {
            out.push((tri, j as u32));
            return;
        }
        let (min_x, max_x, min_y, max_y) = xy_extent(&tri);
        let cut = &self.horizontal_cuts[j];
        let eps = self.config.epsilon;

        if min_y > cut.minor_max + eps {
            out.push((tri, j as u32));
            return;
        }
        if max_y < cut.minor_min - eps {
            self.slice_horizontal_only(tri, j + 1, record, out);
            return;
        }

        let line = cut.local_line(min_x, max_x, 1.0, centroid2(&tri));
        match classify(&tri, &line, eps) {
            Classification::AllNonNegative => out.push((tri, j as u32)),
            Classification::AllNonPositive => self.slice_horizontal_only(tri, j + 1, record, out),
            Classification::Mixed => {
                let result = split_triangle(&tri, &line, eps);
                if record {
                    if let Some(seg) = result.cut_segment {
                        self.cut_segments.entry(cut.id.clone()).or_default().push(seg);
                    }
                }
                for above in result.positive_side {
                    out.push((above, j as u32));
                }
                for below in result.negative_side {
                    self.slice_horizontal_only(below, j + 1, record, out);
                }
            }
        }
    }

    fn emit_fragment(&mut self, tri: Triangle3, tile: TileId, sink: &mut impl TileSink) -> Result<()> {
        if tri.is_degenerate(self.config.epsilon) {
            self.stats.dropped_degenerate += 1;
            self.diagnostics.emit(
                Diagnostic::new(DiagnosticKind::DroppedDegenerate, "fragment degenerated during slicing").with_tile_id(tile.0, tile.1),
            );
            return Ok(());
        }
        sink.emit(tile, &tri)
    }

    fn emit_caps(&mut self, sink: &mut impl TileSink) -> Result<()> {
        let cut_segments = std::mem::take(&mut self.cut_segments);
        for (cut_id, segments) in cut_segments {
            let (axis, index) = self.cut_index(&cut_id);
            let reconstructor = CapReconstructor::new(self.config, self.diagnostics);
            let cap_triangles = reconstructor.reconstruct(&cut_id, &segments);
            self.stats.cap_triangles += cap_triangles.len() as u64;
            for tri in cap_triangles {
                match axis {
                    Axis::Vertical => self.emit_cap_across_vertical(tri, index, sink)?,
                    Axis::Horizontal => self.emit_cap_across_horizontal(tri, index, sink)?,
                }
            }
        }
        Ok(())
    }

    fn cut_index(&self, cut_id: &str) -> (Axis, usize) {
        if let Some(i) = self.vertical_cuts.iter().position(|c| c.id == cut_id) {
            return (Axis::Vertical, i);
        }
        let j = self.horizontal_cuts.iter().position(|c| c.id == cut_id).expect("cut segment belongs to a known cut");
        (Axis::Horizontal, j)
    }

    /// Re-emits a cap triangle straddling vertical cut `index` to the
    /// column-`index` tile (original winding) and the column-`index + 1`
    /// tile (reversed winding), routing each copy through horizontal
    /// slicing to land on the correct row.
    fn emit_cap_across_vertical(&mut self, tri: Triangle3, index: usize, sink: &mut impl TileSink) -> Result<()> {
        let mut low_rows = Vec::new();
        self.slice_horizontal_only(tri, 0, false, &mut low_rows);
        for (frag, row) in low_rows {
            self.emit_fragment(frag, (row, index as u32), sink)?;
        }
        let mut high_rows = Vec::new();
        self.slice_horizontal_only(tri.reversed(), 0, false, &mut high_rows);
        for (frag, row) in high_rows {
            self.emit_fragment(frag, (row, (index + 1) as u32), sink)?;
        }
        Ok(())
    }

    /// Re-emits a cap triangle straddling horizontal cut `index` to the
    /// row-`index` tile (original winding) and the row-`index + 1` tile
    /// (reversed winding), routing each copy through vertical slicing to
    /// land on the correct column.
    fn emit_cap_across_horizontal(&mut self, tri: Triangle3, index: usize, sink: &mut impl TileSink) -> Result<()> {
        let mut low_cols = Vec::new();
        self.slice_vertical_only(tri, 0, false, &mut low_cols);
        for (frag, col) in low_cols {
            self.emit_fragment(frag, (index as u32, col), sink)?;
        }
        let mut high_cols = Vec::new();
        self.slice_vertical_only(tri.reversed(), 0, false, &mut high_cols);
        for (frag, col) in high_cols {
            self.emit_fragment(frag, ((index + 1) as u32, col), sink)?;
        }
        Ok(())
    }
}

/// Recursively bisects `tri` until every edge is at most `split_threshold_mm`
/// or `max_tessellation_depth` is reached (spec §4.3.1).
fn tessellate(tri: Triangle3, config: &CoreConfig) -> Vec<Triangle3> {
    fn go(tri: Triangle3, depth: u32, config: &CoreConfig, out: &mut Vec<Triangle3>) {
        if depth >= config.max_tessellation_depth || tri.longest_edge_length() <= config.split_threshold_mm {
            out.push(tri);
            return;
        }
        for sub in tri.subdivide() {
            go(sub, depth + 1, config, out);
        }
    }
    let mut out = Vec::new();
    go(tri, 0, config, &mut out);
    out
}

fn xy_extent(tri: &Triangle3) -> (f32, f32, f32, f32) {
    let xs = tri.vertices.map(|v| v.x);
    let ys = tri.vertices.map(|v| v.y);
    (
        xs.iter().cloned().fold(f32::INFINITY, f32::min),
        xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
        ys.iter().cloned().fold(f32::INFINITY, f32::min),
        ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
    )
}

fn centroid2(tri: &Triangle3) -> Point2 {
    let [a, b, c] = tri.vertices;
    Point2::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0)
}
