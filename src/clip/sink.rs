//! Tile output sinks (spec §4.3.5, §5): the clipper never holds more than
//! one open writer's worth of state per tile, matching the teacher's
//! `GCodeWriter`'s one-file-descriptor-per-output-stream discipline.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use crate::error::Result;
use crate::geom::Triangle3;
use crate::mesh::MeshWriter;

/// A tile's grid coordinates, `(row, col)`.
pub type TileId = (u32, u32);

/// Where finished triangle fragments go as the clipper emits them.
pub trait TileSink {
    fn emit(&mut self, tile: TileId, triangle: &Triangle3) -> Result<()>;
}

/// Writes each tile to its own container file under `base_dir`, opening the
/// file lazily on first emission and rewriting its count only once, on
/// [`FileTileSink::finish`].
pub struct FileTileSink {
    base_dir: PathBuf,
    writers: HashMap<TileId, MeshWriter<BufWriter<File>>>,
}

impl FileTileSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), writers: HashMap::new() }
    }

    fn path_for(&self, tile: TileId) -> PathBuf {
        tile_path(&self.base_dir, tile)
    }

    /// Closes every open tile writer, rewriting its final triangle count.
    /// Returns the triangle count written per tile.
    ///
    /// If any writer fails to close, the whole run is treated as fatally
    /// aborted (spec §5, §7): every tile file this sink ever opened —
    /// including ones that closed successfully earlier in this same call —
    /// is deleted rather than left behind half-written.
    pub fn finish(self) -> Result<HashMap<TileId, u32>> {
        let base_dir = self.base_dir;
        let all_paths: Vec<PathBuf> =
            self.writers.keys().map(|&t| tile_path(&base_dir, t)).collect();
        let mut counts = HashMap::with_capacity(self.writers.len());
        for (tile, writer) in self.writers {
            let count = writer.triangles_written();
            if let Err(err) = writer.close() {
                for path in &all_paths {
                    let _ = std::fs::remove_file(path);
                }
                return Err(err);
            }
            counts.insert(tile, count);
        }
        Ok(counts)
    }

    /// Aborts the run before `finish` is reached: drops every open writer
    /// and deletes its partial file, leaving no half-written tile behind.
    pub fn abort(self) {
        let base_dir = self.base_dir;
        for (tile, writer) in self.writers {
            drop(writer);
            let _ = std::fs::remove_file(tile_path(&base_dir, tile));
        }
    }
}

fn tile_path(base_dir: &std::path::Path, tile: TileId) -> PathBuf {
    base_dir.join(format!("tile_{:04}_{:04}.bin", tile.0, tile.1))
}

impl TileSink for FileTileSink {
    fn emit(&mut self, tile: TileId, triangle: &Triangle3) -> Result<()> {
        if !self.writers.contains_key(&tile) {
            let path = self.path_for(tile);
            let writer = MeshWriter::create_path(path, [0u8; 80])?;
            self.writers.insert(tile, writer);
        }
        self.writers.get_mut(&tile).expect("just inserted").write_triangle(triangle)
    }
}

/// Collects fragments per tile in memory, for tests and for the handful of
/// small meshes where writing intermediate files isn't worth the syscalls.
#[derive(Debug, Default)]
pub struct InMemoryTileSink {
    pub tiles: HashMap<TileId, Vec<Triangle3>>,
}

impl InMemoryTileSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileSink for InMemoryTileSink {
    fn emit(&mut self, tile: TileId, triangle: &Triangle3) -> Result<()> {
        self.tiles.entry(tile).or_default().push(*triangle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point3;

    fn tri() -> Triangle3 {
        Triangle3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0))
    }

    #[test]
    fn finish_writes_and_counts_every_tile() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileTileSink::new(dir.path().to_path_buf());
        sink.emit((0, 0), &tri()).unwrap();
        sink.emit((0, 1), &tri()).unwrap();
        let counts = sink.finish().unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&(0, 0)], 1);
        assert!(dir.path().join("tile_0000_0000.bin").exists());
    }

    #[test]
    fn abort_deletes_every_partial_tile_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileTileSink::new(dir.path().to_path_buf());
        sink.emit((0, 0), &tri()).unwrap();
        sink.emit((1, 0), &tri()).unwrap();
        let path_a = dir.path().join("tile_0000_0000.bin");
        let path_b = dir.path().join("tile_0001_0000.bin");
        assert!(path_a.exists());
        assert!(path_b.exists());

        sink.abort();
        assert!(!path_a.exists());
        assert!(!path_b.exists());
    }
}
