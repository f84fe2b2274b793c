//! Explicit configuration threaded through every pipeline stage.
//!
//! Per the "Global state" design note, the core carries no module-level
//! flags: every stage takes a `&CoreConfig` parameter instead. This mirrors
//! `config_types::PrinterConfig` in the teacher crate, including its
//! TOML-file load/save convenience methods — nothing in the pipeline
//! requires such a file to exist.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HueSlicerError, Result};

/// Which alternative layout branch a [`crate::pipeline::Pipeline`] run takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutMode {
    /// Heightmap → seam finder → streaming clipper → per-tile STL streams.
    Tiled,
    /// Heightmap → watershed segmenter → boundary tracer → 2D tile polygons.
    Watershed,
}

/// Configuration shared by every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Heightmap resolution in mm/pixel. Must be > 0.
    pub resolution_mm: f32,

    /// Longest-edge threshold (mm) above which the clipper tessellates a
    /// triangle before slicing it (§4.3.1).
    pub split_threshold_mm: f32,

    /// Maximum recursive tessellation depth (§4.3.1).
    pub max_tessellation_depth: u32,

    /// Geometric tolerance used by the triangle/line classifier (§4.3.3).
    pub epsilon: f32,

    /// Vertex-snapping quantum (mm) used by cap loop reconstruction (§4.3.4).
    pub snap_quantum_mm: f32,

    /// Additive gradient penalty applied to guide-masked cells in the
    /// watershed branch (§4.4).
    pub barrier_penalty: f32,

    /// Printer bed width (mm), used to seed watershed tiles.
    pub bed_width_mm: f32,

    /// Printer bed height (mm), used to seed watershed tiles.
    pub bed_height_mm: f32,

    /// Which alternative branch to run.
    pub layout_mode: LayoutMode,

    /// Worker thread count for a future pipelined executor (§5). The serial
    /// pipeline shipped today does not spawn threads; this field exists so
    /// a later executor has a place to read the setting from, matching the
    /// teacher's `SlicerConfig.worker_threads` which is likewise unused by
    /// simpler code paths.
    pub worker_threads: usize,
}

impl CoreConfig {
    /// Builds a config from the caller-chosen grid resolution and bed size;
    /// the remaining fields take the defaults named throughout §4.
    pub fn new(resolution_mm: f32, bed_width_mm: f32, bed_height_mm: f32) -> Result<Self> {
        if resolution_mm <= 0.0 {
            return Err(HueSlicerError::InvalidArgument(format!(
                "resolution must be > 0, got {resolution_mm}"
            )));
        }
        Ok(Self {
            resolution_mm,
            split_threshold_mm: 5.0,
            max_tessellation_depth: 3,
            epsilon: 1e-5,
            snap_quantum_mm: 0.01,
            barrier_penalty: 1000.0,
            bed_width_mm,
            bed_height_mm,
            layout_mode: LayoutMode::Tiled,
            worker_threads: num_cpus::get(),
        })
    }

    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&contents)
            .map_err(|e| HueSlicerError::FormatError(format!("invalid config TOML: {e}")))
    }

    /// Saves configuration to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| HueSlicerError::Other(anyhow::anyhow!("failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_resolution() {
        assert!(CoreConfig::new(0.0, 200.0, 200.0).is_err());
        assert!(CoreConfig::new(-1.0, 200.0, 200.0).is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = CoreConfig::new(0.5, 220.0, 220.0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.toml");
        cfg.to_file(&path).unwrap();
        let loaded = CoreConfig::from_file(&path).unwrap();
        assert_eq!(loaded.resolution_mm, cfg.resolution_mm);
        assert_eq!(loaded.bed_width_mm, cfg.bed_width_mm);
        assert_eq!(loaded.layout_mode, cfg.layout_mode);
    }
}
