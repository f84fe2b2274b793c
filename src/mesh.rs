//! The binary triangle-mesh container (spec §3, §6): an 80-byte opaque
//! header, a little-endian `u32` triangle count, then one 50-byte record per
//! triangle (12-byte normal, three 12-byte vertices, a 2-byte attribute).
//!
//! Hand-rolled with `byteorder` rather than a generic STL crate, the same
//! way the teacher's `HG4DWriter` hand-rolls the `.hg4d` container: the
//! streaming clipper needs to open a tile stream, write records as they're
//! produced, and only rewrite the 4-byte count once the final value is
//! known on close — no off-the-shelf STL reader/writer exposes that.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{HueSlicerError, Result};
use crate::geom::{Point3, Triangle3};

pub const HEADER_LEN: u64 = 80;
pub const RECORD_LEN: u64 = 50;

/// A triangle as read from or about to be written to the container: its
/// stored normal plus its three vertices. The normal is not trusted for
/// geometric computation (callers recompute it from vertex order when it
/// matters) but is preserved on round-trip by [`MeshWriter`] callers that
/// choose to pass it through.
#[derive(Debug, Clone, Copy)]
pub struct RawTriangle {
    pub normal: Point3,
    pub vertices: [Point3; 3],
}

impl RawTriangle {
    pub fn as_triangle3(&self) -> Triangle3 {
        Triangle3::new(self.vertices[0], self.vertices[1], self.vertices[2])
    }
}

fn read_point(r: &mut impl Read) -> std::io::Result<Point3> {
    let x = r.read_f32::<LittleEndian>()?;
    let y = r.read_f32::<LittleEndian>()?;
    let z = r.read_f32::<LittleEndian>()?;
    Ok(Point3::new(x, y, z))
}

fn write_point(w: &mut impl Write, p: Point3) -> std::io::Result<()> {
    w.write_f32::<LittleEndian>(p.x)?;
    w.write_f32::<LittleEndian>(p.y)?;
    w.write_f32::<LittleEndian>(p.z)?;
    Ok(())
}

/// Streaming reader over the container format.
///
/// Construction parses the header and count; [`MeshReader::next_triangle`]
/// (or the `Iterator` impl) then yields one [`RawTriangle`] per call without
/// ever materializing the full triangle list.
pub struct MeshReader<R> {
    reader: R,
    count: u32,
    read: u32,
}

impl<R: Read> MeshReader<R> {
    /// Parses the header and count, leaving the stream positioned at the
    /// first triangle record.
    pub fn open(mut reader: R) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN as usize];
        reader
            .read_exact(&mut header)
            .map_err(|_| HueSlicerError::FormatError("container shorter than 80-byte header".into()))?;
        let count = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| HueSlicerError::FormatError("truncated triangle count".into()))?;
        Ok(Self { reader, count, read: 0 })
    }

    pub fn triangle_count(&self) -> u32 {
        self.count
    }

    /// Reads the next triangle record, or `None` once `count` have been
    /// read. A stream that runs out of bytes before `count` is reached is a
    /// [`HueSlicerError::FormatError`] per spec §7.
    pub fn next_triangle(&mut self) -> Result<Option<RawTriangle>> {
        if self.read >= self.count {
            return Ok(None);
        }
        let normal = read_point(&mut self.reader)
            .map_err(|_| HueSlicerError::FormatError("truncated triangle record".into()))?;
        let mut vertices = [Point3::new(0.0, 0.0, 0.0); 3];
        for v in vertices.iter_mut() {
            *v = read_point(&mut self.reader)
                .map_err(|_| HueSlicerError::FormatError("truncated triangle record".into()))?;
        }
        self.reader
            .read_u16::<LittleEndian>()
            .map_err(|_| HueSlicerError::FormatError("truncated triangle attribute".into()))?;
        self.read += 1;
        Ok(Some(RawTriangle { normal, vertices }))
    }
}

impl<R: Read + Seek> MeshReader<R> {
    /// Rewinds to the first triangle record, for a second pass over the
    /// same stream (§4.1's two-pass heightmap scan).
    pub fn rewind_to_records(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(HEADER_LEN + 4))?;
        self.read = 0;
        Ok(())
    }
}

impl<R: Read> Iterator for MeshReader<R> {
    type Item = Result<RawTriangle>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_triangle() {
            Ok(Some(t)) => Some(Ok(t)),
            Ok(None) => None,
            Err(e) => {
                // Stop yielding after the first error so callers using the
                // iterator adaptor don't spin on a broken stream.
                self.count = self.read;
                Some(Err(e))
            }
        }
    }
}

impl MeshReader<BufReader<File>> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open(BufReader::new(file))
    }
}

/// Streaming writer over the container format: the header and a
/// placeholder count are written immediately, triangles are appended as
/// they're produced, and the real count is patched in on [`MeshWriter::close`].
pub struct MeshWriter<W> {
    writer: W,
    count: u32,
}

impl<W: Write + Seek> MeshWriter<W> {
    /// Opens a writer, immediately emitting `header` followed by a
    /// placeholder triangle count.
    pub fn new(mut writer: W, header: [u8; HEADER_LEN as usize]) -> Result<Self> {
        writer.write_all(&header)?;
        writer.write_u32::<LittleEndian>(0)?;
        Ok(Self { writer, count: 0 })
    }

    /// Appends one triangle record, recomputing its normal from the vertex
    /// order rather than trusting any input normal (spec §4.3.1 step 4).
    pub fn write_triangle(&mut self, triangle: &Triangle3) -> Result<()> {
        let normal = triangle.normal();
        let normal = normalize(normal);
        write_point(&mut self.writer, normal)?;
        for v in &triangle.vertices {
            write_point(&mut self.writer, *v)?;
        }
        self.writer.write_u16::<LittleEndian>(0)?;
        self.count += 1;
        Ok(())
    }

    pub fn triangles_written(&self) -> u32 {
        self.count
    }

    /// Flushes remaining data, rewrites the header's triangle count, and
    /// returns the underlying writer.
    pub fn close(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer.seek(SeekFrom::Start(HEADER_LEN))?;
        self.writer.write_u32::<LittleEndian>(self.count)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl MeshWriter<BufWriter<File>> {
    /// Creates a new tile stream at `path`, truncating any existing file.
    pub fn create_path<P: AsRef<Path>>(path: P, header: [u8; HEADER_LEN as usize]) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), header)
    }
}

fn normalize(p: Point3) -> Point3 {
    let len = p.length();
    if len <= 1e-20 {
        Point3::new(0.0, 0.0, 0.0)
    } else {
        Point3::new(p.x / len, p.y / len, p.z / len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_triangle(z: f32) -> Triangle3 {
        Triangle3::new(
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(0.0, 1.0, z),
        )
    }

    #[test]
    fn round_trips_triangle_list() {
        let buf = Cursor::new(Vec::new());
        let mut writer = MeshWriter::new(buf, [0u8; 80]).unwrap();
        writer.write_triangle(&sample_triangle(1.0)).unwrap();
        writer.write_triangle(&sample_triangle(2.0)).unwrap();
        let buf = writer.close().unwrap();

        let bytes = buf.into_inner();
        assert_eq!(
            bytes.len() as u64,
            HEADER_LEN + 4 + 2 * RECORD_LEN
        );

        let mut reader = MeshReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.triangle_count(), 2);
        let t0 = reader.next_triangle().unwrap().unwrap();
        assert_eq!(t0.vertices[2].z, 1.0);
        let t1 = reader.next_triangle().unwrap().unwrap();
        assert_eq!(t1.vertices[2].z, 2.0);
        assert!(reader.next_triangle().unwrap().is_none());
    }

    #[test]
    fn truncated_record_is_a_format_error() {
        let mut bytes = vec![0u8; HEADER_LEN as usize];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 10]); // much shorter than a 50-byte record
        let mut reader = MeshReader::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.next_triangle(),
            Err(HueSlicerError::FormatError(_))
        ));
    }

    #[test]
    fn header_too_short_is_a_format_error() {
        let bytes = vec![0u8; 10];
        assert!(matches!(
            MeshReader::open(Cursor::new(bytes)),
            Err(HueSlicerError::FormatError(_))
        ));
    }

    #[test]
    fn rewind_allows_a_second_pass() {
        let buf = Cursor::new(Vec::new());
        let mut writer = MeshWriter::new(buf, [0u8; 80]).unwrap();
        writer.write_triangle(&sample_triangle(5.0)).unwrap();
        let bytes = writer.close().unwrap().into_inner();

        let mut reader = MeshReader::open(Cursor::new(bytes)).unwrap();
        reader.next_triangle().unwrap();
        assert!(reader.next_triangle().unwrap().is_none());
        reader.rewind_to_records().unwrap();
        let t = reader.next_triangle().unwrap().unwrap();
        assert_eq!(t.vertices[0].z, 5.0);
    }
}
