//! Sequential fixed-layout reader and writer over byte buffers.
//!
//! All on-disk level formats are little-endian and tightly packed, so the
//! reader only needs typed scalar reads at a moving offset. A read that would
//! run past the payload is a [`Error::BufferUnderrun`]; writes always succeed
//! and grow the buffer.

use byteorder::{ByteOrder, LittleEndian};
use glam::{Vec3, Vec4};

use xrlevel_core::{Error, Result};

/// Cursor over a borrowed payload
#[derive(Debug, Clone)]
pub struct PackedReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PackedReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Current read offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume `len` raw bytes
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::BufferUnderrun {
                offset: self.offset,
                requested: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn vec3(&mut self) -> Result<Vec3> {
        let mut values = [0.0f32; 3];
        LittleEndian::read_f32_into(self.take(12)?, &mut values);
        Ok(Vec3::from_array(values))
    }

    pub fn vec4(&mut self) -> Result<Vec4> {
        let mut values = [0.0f32; 4];
        LittleEndian::read_f32_into(self.take(16)?, &mut values);
        Ok(Vec4::from_array(values))
    }

    /// NUL-terminated string; the terminator is consumed but not returned
    pub fn cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.offset.min(self.data.len())..];
        let end = rest.iter().position(|&b| b == 0).ok_or(Error::BufferUnderrun {
            offset: self.offset,
            requested: rest.len() + 1,
            available: rest.len(),
        })?;
        let bytes = self.take(end + 1)?;
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Fixed-length byte string with trailing NULs removed
    pub fn fixed_string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Growable little-endian writer
#[derive(Debug, Clone, Default)]
pub struct PackedWriter {
    buf: Vec<u8>,
}

impl PackedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn zeros(&mut self, len: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + len, 0);
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let mut raw = [0u8; 2];
        LittleEndian::write_u16(&mut raw, value);
        self.bytes(&raw)
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let mut raw = [0u8; 4];
        LittleEndian::write_u32(&mut raw, value);
        self.bytes(&raw)
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        let mut raw = [0u8; 4];
        LittleEndian::write_i32(&mut raw, value);
        self.bytes(&raw)
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        let mut raw = [0u8; 4];
        LittleEndian::write_f32(&mut raw, value);
        self.bytes(&raw)
    }

    pub fn vec3(&mut self, value: Vec3) -> &mut Self {
        let mut raw = [0u8; 12];
        LittleEndian::write_f32_into(&value.to_array(), &mut raw);
        self.bytes(&raw)
    }

    pub fn vec4(&mut self, value: Vec4) -> &mut Self {
        let mut raw = [0u8; 16];
        LittleEndian::write_f32_into(&value.to_array(), &mut raw);
        self.bytes(&raw)
    }

    pub fn cstring(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes()).u8(0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_reads_advance() {
        let data = [0x0E, 0x00, 0x03, 0x00, 0x78, 0x56, 0x34, 0x12];
        let mut reader = PackedReader::new(&data);

        assert_eq!(reader.u16().unwrap(), 14);
        assert_eq!(reader.u16().unwrap(), 3);
        assert_eq!(reader.offset(), 4);
        assert_eq!(reader.u32().unwrap(), 0x1234_5678);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_underrun_reports_position() {
        let data = [1, 2, 3];
        let mut reader = PackedReader::new(&data);
        reader.u8().unwrap();

        match reader.u32() {
            Err(Error::BufferUnderrun { offset, requested, available }) => {
                assert_eq!(offset, 1);
                assert_eq!(requested, 4);
                assert_eq!(available, 2);
            }
            other => panic!("Expected BufferUnderrun, got {other:?}"),
        }
        // A failed read leaves the cursor where it was
        assert_eq!(reader.offset(), 1);
    }

    #[test]
    fn test_writer_layout_matches_reader() {
        let mut writer = PackedWriter::new();
        writer
            .u16(9)
            .u16(0)
            .f32(1.5)
            .vec3(Vec3::new(1.0, 2.0, 3.0))
            .cstring("effects\\glow")
            .i32(-1);

        let bytes = writer.into_inner();
        let mut reader = PackedReader::new(&bytes);
        assert_eq!(reader.u16().unwrap(), 9);
        assert_eq!(reader.u16().unwrap(), 0);
        assert_eq!(reader.f32().unwrap(), 1.5);
        assert_eq!(reader.vec3().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(reader.cstring().unwrap(), "effects\\glow");
        assert_eq!(reader.i32().unwrap(), -1);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_unterminated_cstring_is_underrun() {
        let data = *b"abc";
        let mut reader = PackedReader::new(&data);
        assert!(matches!(reader.cstring(), Err(Error::BufferUnderrun { .. })));
    }

    #[test]
    fn test_fixed_string_trims_nuls() {
        let mut data = b"light".to_vec();
        data.resize(16, 0);
        let mut reader = PackedReader::new(&data);
        assert_eq!(reader.fixed_string(16).unwrap(), "light");
        assert!(reader.is_exhausted());
    }
}
