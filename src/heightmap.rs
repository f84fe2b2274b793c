//! Heightmap extraction (spec §4.1): projects a 3D mesh onto a dense 2D
//! Z-buffer grid in a single two-pass scan of the container, without ever
//! materializing the mesh as a structured form.

use std::io::{Read, Seek};

use tracing::debug;

use crate::config::CoreConfig;
use crate::error::{HueSlicerError, Result};
use crate::mesh::MeshReader;

/// World-space bounding box discovered during pass 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
    pub z_max: f32,
}

/// A dense `width x height` Z-buffer grid. Row 0 is the maximum world Y
/// (image-top convention); column 0 is the minimum world X.
#[derive(Debug, Clone)]
pub struct Heightmap {
    width: usize,
    height: usize,
    cells: Vec<f32>,
}

impl Heightmap {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0.0; width * height],
        }
    }

    /// Builds a heightmap directly from pre-computed cell values, row-major
    /// (row 0 = max world Y), for callers that already have a grid (tests,
    /// or a heightmap loaded from an external source).
    pub fn from_cells(width: usize, height: usize, cells: Vec<f32>) -> Result<Self> {
        if cells.len() != width * height {
            return Err(HueSlicerError::InvalidArgument(format!(
                "expected {} cells for a {width}x{height} grid, got {}",
                width * height,
                cells.len()
            )));
        }
        Ok(Self { width, height, cells })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.cells[y * self.width + x]
    }

    fn set(&mut self, x: usize, y: usize, value: f32) {
        self.cells[y * self.width + x] = value;
    }

    fn max_inplace(&mut self, x: usize, y: usize, value: f32) {
        let idx = y * self.width + x;
        if value > self.cells[idx] {
            self.cells[idx] = value;
        }
    }

    /// One pass that fills each zero cell with the mean of its positive
    /// 4-neighbors, reading from the pre-fill values only (spec §4.1 /
    /// Open Question 9.1: whether a multi-pass fill was intended is
    /// ambiguous in the source; this implementation follows the letter of
    /// the spec and uses only original values, never an already-filled
    /// neighbor).
    fn fill_zeros_one_pass(&mut self) {
        let original = self.cells.clone();
        let w = self.width as isize;
        let h = self.height as isize;
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                if original[idx] != 0.0 {
                    continue;
                }
                let mut sum = 0.0f32;
                let mut n = 0u32;
                for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let nv = original[(ny * w + nx) as usize];
                    if nv > 0.0 {
                        sum += nv;
                        n += 1;
                    }
                }
                if n > 0 {
                    self.cells[idx] = sum / n as f32;
                }
            }
        }
    }
}

pub struct HeightmapBuilder;

impl HeightmapBuilder {
    /// Builds a heightmap from a rewindable byte stream over the triangle
    /// mesh container, per spec §4.1's two-pass algorithm.
    pub fn build<R: Read + Seek>(
        reader: R,
        config: &CoreConfig,
    ) -> Result<(Heightmap, MeshBounds)> {
        if config.resolution_mm <= 0.0 {
            return Err(HueSlicerError::InvalidArgument(format!(
                "resolution must be > 0, got {}",
                config.resolution_mm
            )));
        }
        let r = config.resolution_mm;
        let mut mesh_reader = MeshReader::open(reader)?;

        // Pass 1: running bounds over every vertex.
        let mut x_min = f32::INFINITY;
        let mut x_max = f32::NEG_INFINITY;
        let mut y_min = f32::INFINITY;
        let mut y_max = f32::NEG_INFINITY;
        let mut z_max = f32::NEG_INFINITY;

        while let Some(tri) = mesh_reader.next_triangle()? {
            for v in &tri.vertices {
                x_min = x_min.min(v.x);
                x_max = x_max.max(v.x);
                y_min = y_min.min(v.y);
                y_max = y_max.max(v.y);
                z_max = z_max.max(v.z);
            }
        }

        if !x_min.is_finite() {
            return Err(HueSlicerError::FormatError("mesh has no triangles".into()));
        }
        if z_max < 0.0 {
            z_max = 0.0;
        }

        let width = (((x_max - x_min) / r).ceil() as usize).max(1);
        let height = (((y_max - y_min) / r).ceil() as usize).max(1);
        debug!(width, height, r, "heightmap dimensions computed from pass 1");

        // Pass 2: rasterize every vertex's highest Z into its footprint cell.
        mesh_reader.rewind_to_records()?;
        let mut grid = Heightmap::new(width, height);
        while let Some(tri) = mesh_reader.next_triangle()? {
            for v in &tri.vertices {
                let gx = (((v.x - x_min) / r).floor() as isize).clamp(0, width as isize - 1) as usize;
                let gy = (((y_max - v.y) / r).floor() as isize).clamp(0, height as isize - 1) as usize;
                grid.max_inplace(gx, gy, v.z.max(0.0));
            }
        }

        grid.fill_zeros_one_pass();

        Ok((
            grid,
            MeshBounds {
                x_min,
                x_max,
                y_min,
                y_max,
                z_max,
            },
        ))
    }
}
