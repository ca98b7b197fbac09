// ByteStream - little-endian binary reading/writing over an owned buffer,
// plus the tagged-chunk framing used by the world file formats.
//
// Chunk framing is [u32 tag][u32 size][size bytes]; tags are stored reversed
// on disk ("REVM" for MVER).  Unknown tags are skipped, truncation is
// reported as Corrupt.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::math::{BoundingBox, Vec3};
use crate::{Error, Result};

/// Build the logical u32 value of a 4-character chunk tag.
pub const fn tag(name: &[u8; 4]) -> u32 {
    u32::from_le_bytes([name[0], name[1], name[2], name[3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub tag: u32,
    pub size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ByteStream {
    data: Vec<u8>,
    read_pos: usize,
    context: String,
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing buffer for reading.  `context` names the source in
    /// error messages, typically the file path.
    pub fn wrap(data: Vec<u8>, context: impl Into<String>) -> Self {
        ByteStream {
            data,
            read_pos: 0,
            context: context.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(self.truncated());
        }
        self.read_pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.seek(self.read_pos + count)
    }

    fn truncated(&self) -> Error {
        Error::corrupt(format!("{}: truncated", self.context))
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        if self.read_pos + count > self.data.len() {
            return Err(self.truncated());
        }
        let slice = &self.data[self.read_pos..self.read_pos + count];
        self.read_pos += count;
        Ok(slice)
    }

    // ---- Read operations ----

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut cursor = Cursor::new(self.take(2)?);
        Ok(cursor.read_u16::<LittleEndian>()?)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let mut cursor = Cursor::new(self.take(2)?);
        Ok(cursor.read_i16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut cursor = Cursor::new(self.take(4)?);
        Ok(cursor.read_u32::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut cursor = Cursor::new(self.take(4)?);
        Ok(cursor.read_i32::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut cursor = Cursor::new(self.take(8)?);
        Ok(cursor.read_u64::<LittleEndian>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut cursor = Cursor::new(self.take(4)?);
        Ok(cursor.read_f32::<LittleEndian>()?)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Read a fixed-size, null-padded string field.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&bytes[..end]).to_string())
    }

    /// Read a null-terminated string.
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.read_pos;
        while self.read_pos < self.data.len() && self.data[self.read_pos] != 0 {
            self.read_pos += 1;
        }
        if self.read_pos >= self.data.len() {
            return Err(self.truncated());
        }
        let s = String::from_utf8_lossy(&self.data[start..self.read_pos]).to_string();
        self.read_pos += 1;
        Ok(s)
    }

    // ---- Chunk framing ----

    /// Read the next chunk header.  Returns None at a clean end of stream; a
    /// partial header or a body overrunning the buffer is Corrupt.
    pub fn read_chunk_header(&mut self) -> Result<Option<ChunkHeader>> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        if self.remaining() < 8 {
            return Err(self.truncated());
        }

        let raw = self.take(4)?;
        let tag = u32::from_le_bytes([raw[3], raw[2], raw[1], raw[0]]);
        let size = self.read_u32()? as usize;

        if self.remaining() < size {
            return Err(Error::corrupt(format!(
                "{}: chunk {:08x} overruns file",
                self.context, tag
            )));
        }

        Ok(Some(ChunkHeader { tag, size }))
    }

    /// Scan forward for a specific chunk, skipping unknown tags.  Leaves the
    /// read position at the start of the chunk body.
    pub fn find_chunk(&mut self, wanted: u32) -> Result<Option<usize>> {
        while let Some(header) = self.read_chunk_header()? {
            if header.tag == wanted {
                return Ok(Some(header.size));
            }
            self.skip(header.size)?;
        }
        Ok(None)
    }

    // ---- Write operations (append) ----

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, val: u8) {
        self.data.push(val);
    }

    pub fn write_u16(&mut self, val: u16) {
        self.data.write_u16::<LittleEndian>(val).unwrap();
    }

    pub fn write_u32(&mut self, val: u32) {
        self.data.write_u32::<LittleEndian>(val).unwrap();
    }

    pub fn write_i32(&mut self, val: i32) {
        self.data.write_i32::<LittleEndian>(val).unwrap();
    }

    pub fn write_u64(&mut self, val: u64) {
        self.data.write_u64::<LittleEndian>(val).unwrap();
    }

    pub fn write_f32(&mut self, val: f32) {
        self.data.write_f32::<LittleEndian>(val).unwrap();
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_bounds(&mut self, bounds: &BoundingBox) {
        self.write_vec3(bounds.min);
        self.write_vec3(bounds.max);
    }

    pub fn read_bounds(&mut self) -> Result<BoundingBox> {
        let min = self.read_vec3()?;
        let max = self.read_vec3()?;
        Ok(BoundingBox::new(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MVER: u32 = tag(b"MVER");
    const MAIN: u32 = tag(b"MAIN");

    fn chunked(parts: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, body) in parts {
            out.extend_from_slice(&[name[3], name[2], name[1], name[0]]);
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(body);
        }
        out
    }

    #[test]
    fn test_read_write_round_trip() {
        let mut stream = ByteStream::new();
        stream.write_u32(0xDEADBEEF);
        stream.write_f32(1.5);
        stream.write_u64(1 << 40);

        let mut reader = ByteStream::wrap(stream.into_inner(), "test");
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_u64().unwrap(), 1 << 40);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let data = chunked(&[
            (b"MVER", &18u32.to_le_bytes()),
            (b"XXXX", &[0u8; 12]),
            (b"MAIN", &[7u8, 0, 0, 0]),
        ]);

        let mut stream = ByteStream::wrap(data, "test");
        let size = stream.find_chunk(MVER).unwrap().unwrap();
        assert_eq!(size, 4);
        assert_eq!(stream.read_u32().unwrap(), 18);

        let size = stream.find_chunk(MAIN).unwrap().unwrap();
        assert_eq!(size, 4);
        assert_eq!(stream.read_u32().unwrap(), 7);
    }

    #[test]
    fn test_truncated_chunk_is_corrupt() {
        let mut data = chunked(&[(b"MVER", &18u32.to_le_bytes())]);
        data.push(b'R'); // stray partial header
        let mut stream = ByteStream::wrap(data, "test");
        assert!(stream.find_chunk(MVER).unwrap().is_some());
        stream.skip(4).unwrap();
        assert!(matches!(stream.read_chunk_header(), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_chunk_body_overrun_is_corrupt() {
        let mut data = Vec::new();
        data.extend_from_slice(b"REVM");
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 4]); // far short of 100
        let mut stream = ByteStream::wrap(data, "test");
        assert!(matches!(stream.read_chunk_header(), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_cstring() {
        let mut stream = ByteStream::new();
        stream.append(b"doodad\\tree.m2\0more");
        let mut reader = ByteStream::wrap(stream.into_inner(), "test");
        assert_eq!(reader.read_cstring().unwrap(), "doodad\\tree.m2");
    }
}
