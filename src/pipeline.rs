//! Top-level orchestration (spec §5): wires the stages together according
//! to `config.layout_mode`. The shipped pipeline is strictly serial — one
//! stage completes before the next begins — matching the teacher's
//! `main.rs` driver, which runs `MeshLoader -> LayerGenerator -> ValveMapper
//! -> PathOptimizer -> GCodeGenerator` the same way. `CoreConfig.worker_threads`
//! is carried for a future pipelined executor but nothing here spawns a
//! thread.

use std::path::Path;

use tracing::info;

use crate::boundary::{BoundaryTracer, TilePolygon};
use crate::clip::cut_path::Axis;
use crate::clip::{CutPath, FileTileSink, StreamingClipper};
use crate::config::{CoreConfig, LayoutMode};
use crate::diagnostics::DiagnosticSink;
use crate::error::Result;
use crate::heightmap::{Heightmap, HeightmapBuilder, MeshBounds};
use crate::mask::{GuideMask, MaskList};
use crate::seam::SeamFinder;
use crate::watershed::WatershedSegmenter;

/// What a pipeline run produced, depending on `config.layout_mode`.
pub enum PipelineOutput {
    Tiled { tile_counts: std::collections::HashMap<(u32, u32), u32> },
    Watershed { polygons: Vec<TilePolygon> },
}

pub struct Pipeline<'a> {
    config: &'a CoreConfig,
    diagnostics: &'a DiagnosticSink,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a CoreConfig, diagnostics: &'a DiagnosticSink) -> Self {
        Self { config, diagnostics }
    }

    /// Runs the full pipeline against a mesh container on disk, dispatching
    /// to the tiled or watershed branch per `config.layout_mode`.
    ///
    /// `output_dir` is only used by the tiled branch (one container file per
    /// tile); `vertical_masks`/`horizontal_masks` optionally restrict each
    /// cut's seam search, one entry per cut, longer lists truncated and
    /// shorter ones treated as all-`None`. `watershed_mask` is only used by
    /// the watershed branch, as the guide-barrier mask passed straight
    /// through to [`WatershedSegmenter::segment`].
    pub fn run(
        &self,
        mesh_path: &Path,
        output_dir: &Path,
        vertical_masks: &MaskList,
        horizontal_masks: &MaskList,
        watershed_mask: Option<&GuideMask>,
    ) -> Result<PipelineOutput> {
        match self.config.layout_mode {
            LayoutMode::Tiled => {
                let counts = self.run_tiled(mesh_path, output_dir, vertical_masks, horizontal_masks)?;
                Ok(PipelineOutput::Tiled { tile_counts: counts })
            }
            LayoutMode::Watershed => {
                let polygons = self.run_watershed(mesh_path, watershed_mask)?;
                Ok(PipelineOutput::Watershed { polygons })
            }
        }
    }

    fn run_tiled(
        &self,
        mesh_path: &Path,
        output_dir: &Path,
        vertical_masks: &MaskList,
        horizontal_masks: &MaskList,
    ) -> Result<std::collections::HashMap<(u32, u32), u32>> {
        let (grid, bounds) = HeightmapBuilder::build(open_seekable(mesh_path)?, self.config)?;
        info!(width = grid.width(), height = grid.height(), "heightmap built");

        let vertical_cuts = self.find_vertical_cuts(&grid, &bounds, vertical_masks);
        let horizontal_cuts = self.find_horizontal_cuts(&grid, &bounds, horizontal_masks);
        info!(vertical = vertical_cuts.len(), horizontal = horizontal_cuts.len(), "seams found");

        std::fs::create_dir_all(output_dir)?;
        let clipper = StreamingClipper::new(self.config, vertical_cuts, horizontal_cuts, self.diagnostics);
        let mut sink = FileTileSink::new(output_dir.to_path_buf());
        let stats = match clipper.run(open_seekable(mesh_path)?, &mut sink) {
            Ok(stats) => stats,
            Err(err) => {
                // Fatal error partway through the streaming pass: abort
                // rather than leave half-written tile files behind (§5, §7).
                sink.abort();
                return Err(err);
            }
        };
        info!(triangles_read = stats.triangles_read, dropped = stats.dropped_degenerate, caps = stats.cap_triangles, "clip complete");
        sink.finish()
    }

    fn run_watershed(&self, mesh_path: &Path, mask: Option<&GuideMask>) -> Result<Vec<TilePolygon>> {
        let (grid, bounds) = HeightmapBuilder::build(open_seekable(mesh_path)?, self.config)?;
        let labels = WatershedSegmenter::segment(&grid, mask, self.config);
        let simplify_epsilon = self.config.resolution_mm;
        Ok(BoundaryTracer::trace(&labels, &bounds, self.config.resolution_mm, simplify_epsilon))
    }

    fn tile_cells(&self) -> (usize, usize) {
        let tile_w = ((self.config.bed_width_mm / self.config.resolution_mm).round() as usize).max(1);
        let tile_h = ((self.config.bed_height_mm / self.config.resolution_mm).round() as usize).max(1);
        (tile_w, tile_h)
    }

    fn find_vertical_cuts(&self, grid: &Heightmap, bounds: &MeshBounds, masks: &MaskList) -> Vec<CutPath> {
        let (tile_w, _) = self.tile_cells();
        let columns = grid.width().div_ceil(tile_w).max(1);
        let mut cuts = Vec::with_capacity(columns.saturating_sub(1));
        for i in 0..columns.saturating_sub(1) {
            let nominal = (i + 1) * tile_w;
            let window = tile_w / 2;
            let x_start = nominal.saturating_sub(window);
            let x_end = (nominal + window).min(grid.width() - 1);
            let mask = masks.get(i).and_then(|m| m.as_ref());
            let seam = SeamFinder::find_vertical(grid, mask, x_start, x_end, self.diagnostics);
            cuts.push(CutPath::from_seam(format!("v{i}"), Axis::Vertical, &seam, bounds, self.config.resolution_mm));
        }
        cuts.sort_by(|a, b| a.average_minor().partial_cmp(&b.average_minor()).unwrap());
        cuts
    }

    fn find_horizontal_cuts(&self, grid: &Heightmap, bounds: &MeshBounds, masks: &MaskList) -> Vec<CutPath> {
        let (_, tile_h) = self.tile_cells();
        let rows = grid.height().div_ceil(tile_h).max(1);
        let mut cuts = Vec::with_capacity(rows.saturating_sub(1));
        for i in 0..rows.saturating_sub(1) {
            let nominal = (i + 1) * tile_h;
            let window = tile_h / 2;
            let y_start = nominal.saturating_sub(window);
            let y_end = (nominal + window).min(grid.height() - 1);
            let mask = masks.get(i).and_then(|m| m.as_ref());
            let seam = SeamFinder::find_horizontal(grid, mask, y_start, y_end, self.diagnostics);
            cuts.push(CutPath::from_seam(format!("h{i}"), Axis::Horizontal, &seam, bounds, self.config.resolution_mm));
        }
        // Topmost band (largest average Y) first, matching the heightmap's
        // row-0-is-max-Y convention the clipper's horizontal routing relies on.
        cuts.sort_by(|a, b| b.average_minor().partial_cmp(&a.average_minor()).unwrap());
        cuts
    }
}

/// Each stage opens its own fresh handle on `mesh_path` rather than sharing
/// one `Read + Seek` stream across stages — the heightmap pass and the clip
/// pass both want to start at byte 0, and re-opening the file is simpler
/// than threading a rewind through both.
fn open_seekable(path: &Path) -> Result<std::io::BufReader<std::fs::File>> {
    Ok(std::io::BufReader::new(std::fs::File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Point3, Triangle3};
    use crate::mesh::MeshWriter;

    fn write_ramp_mesh(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = MeshWriter::new(std::io::BufWriter::new(file), [0u8; 80]).unwrap();
        // Two side-by-side quads forming a 40x20 plate, with a ridge down the middle.
        for x in 0..4 {
            let x0 = x as f32 * 10.0;
            let x1 = x0 + 10.0;
            let z = if x < 2 { 1.0 } else { 3.0 };
            let a = Point3::new(x0, 0.0, z);
            let b = Point3::new(x1, 0.0, z);
            let c = Point3::new(x1, 20.0, z);
            let d = Point3::new(x0, 20.0, z);
            writer.write_triangle(&Triangle3::new(a, b, c)).unwrap();
            writer.write_triangle(&Triangle3::new(a, c, d)).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn watershed_branch_produces_at_least_one_polygon() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = dir.path().join("mesh.bin");
        write_ramp_mesh(&mesh_path);

        let mut cfg = CoreConfig::new(2.0, 25.0, 25.0).unwrap();
        cfg.layout_mode = LayoutMode::Watershed;
        let diagnostics = DiagnosticSink::new();
        let pipeline = Pipeline::new(&cfg, &diagnostics);
        let output = pipeline.run(&mesh_path, dir.path(), &Vec::new(), &Vec::new(), None).unwrap();
        match output {
            PipelineOutput::Watershed { polygons } => assert!(!polygons.is_empty()),
            _ => panic!("expected the watershed branch"),
        }
    }

    #[test]
    fn watershed_branch_honors_a_supplied_guide_mask() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = dir.path().join("mesh.bin");
        write_ramp_mesh(&mesh_path);

        // Bed sized for two side-by-side seeds (columns 5 and 15 of the
        // 20-cell-wide heightmap), well clear of the ramp's own ridge at
        // column ~10 so a clean split at that ridge can't be mistaken for
        // the mask taking effect.
        let mut cfg = CoreConfig::new(2.0, 20.0, 50.0).unwrap();
        cfg.layout_mode = LayoutMode::Watershed;
        let diagnostics = DiagnosticSink::new();
        let pipeline = Pipeline::new(&cfg, &diagnostics);

        // Full-height barrier at column 8, between the two seeds. Since it's
        // the only route between the seeds' halves, every free-cost cell left
        // of it can only be reached from the left seed and vice versa, so
        // the resulting boundary must sit exactly at this column if (and
        // only if) the mask actually reached `WatershedSegmenter::segment`.
        let mut mask = crate::mask::GuideMask::allow_all(20, 10);
        for y in 0..10 {
            mask.set(8, y, false);
        }
        let barred = pipeline.run(&mesh_path, dir.path(), &Vec::new(), &Vec::new(), Some(&mask)).unwrap();
        let PipelineOutput::Watershed { polygons } = barred else {
            panic!("expected the watershed branch")
        };
        assert_eq!(polygons.len(), 2);

        let left = polygons.iter().find(|p| p.label == 0).expect("left seed's label");
        let right = polygons.iter().find(|p| p.label == 1).expect("right seed's label");
        assert!(
            left.rings[0].iter().all(|p| p.x <= 18.0 + 1e-3),
            "left basin crossed the masked barrier column: {:?}",
            left.rings[0]
        );
        assert!(
            right.rings[0].iter().all(|p| p.x >= 16.0 - 1e-3),
            "right basin crossed the masked barrier column: {:?}",
            right.rings[0]
        );
    }

    #[test]
    fn tile_cells_reflect_bed_size_and_resolution() {
        let cfg = CoreConfig::new(0.5, 100.0, 50.0).unwrap();
        let diagnostics = DiagnosticSink::new();
        let pipeline = Pipeline::new(&cfg, &diagnostics);
        assert_eq!(pipeline.tile_cells(), (200, 100));
    }

    #[test]
    fn tiled_branch_writes_one_container_per_column() {
        let dir = tempfile::tempdir().unwrap();
        let mesh_path = dir.path().join("mesh.bin");
        write_ramp_mesh(&mesh_path);

        let mut cfg = CoreConfig::new(2.0, 20.0, 20.0).unwrap();
        cfg.split_threshold_mm = 100.0; // the plate's triangles are larger than default but we don't need tessellation here
        let out_dir = dir.path().join("tiles");
        let diagnostics = DiagnosticSink::new();
        let pipeline = Pipeline::new(&cfg, &diagnostics);
        let output = pipeline.run(&mesh_path, &out_dir, &Vec::new(), &Vec::new()).unwrap();
        match output {
            PipelineOutput::Tiled { tile_counts } => {
                assert!(!tile_counts.is_empty());
                assert!(tile_counts.values().all(|&c| c > 0));
            }
            _ => panic!("expected the tiled branch"),
        }
    }
}
