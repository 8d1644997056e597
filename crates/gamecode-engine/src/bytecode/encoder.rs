//! Binary reading and writing primitives for the container format.
//!
//! All integers are little-endian; names are u8-length-prefixed byte
//! strings. The writer grows a plain buffer; the reader tracks its offset so
//! decode errors can report where a segment went wrong.

use thiserror::Error;

/// Errors that can occur while decoding container bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Ran past the end of the buffer.
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEnd(usize),

    /// A name was not valid UTF-8.
    #[error("invalid UTF-8 in name at offset {0}")]
    InvalidUtf8(usize),

    /// A name longer than 255 bytes cannot be length-prefixed.
    #[error("name too long to encode: {0} bytes")]
    NameTooLong(usize),

    /// A value tag with no known payload layout; nothing after it can be
    /// framed.
    #[error("invalid value tag {tag} at offset {offset}")]
    InvalidTag {
        /// The unrecognized tag byte.
        tag: u8,
        /// Offset the tag was read at.
        offset: usize,
    },
}

/// Little-endian byte writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Current length of the buffer.
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Emit one byte.
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a u16.
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a u32.
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an i32.
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a u64.
    pub fn emit_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit raw bytes.
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Emit a u8-length-prefixed name.
    pub fn emit_name(&mut self, name: &str) -> Result<(), DecodeError> {
        let bytes = name.as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(DecodeError::NameTooLong(bytes.len()));
        }
        self.emit_u8(bytes.len() as u8);
        self.emit_bytes(bytes);
        Ok(())
    }
}

/// Little-endian byte reader over a borrowed buffer.
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over a buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// True while there are bytes left.
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Skip `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        if self.position + count > self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        self.position += count;
        Ok(())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.position >= self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let value = self.buffer[self.position];
        self.position += 1;
        Ok(value)
    }

    /// Read a u16.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_array::<2>()?;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Read a u32.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_array::<4>()?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Read an i32.
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let bytes = self.read_array::<4>()?;
        Ok(i32::from_le_bytes(bytes))
    }

    /// Read a u64.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_array::<8>()?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if self.position + count > self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let bytes = &self.buffer[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    /// Read a u8-length-prefixed name.
    pub fn read_name(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u8()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.position + N > self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buffer[self.position..self.position + N]);
        self.position += N;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        let mut w = ByteWriter::new();
        w.emit_u8(0x42);
        w.emit_u16(0x1234);
        w.emit_u32(0xABCD_EF01);
        w.emit_u64(0x0102_0304_0506_0708);
        w.emit_name("hello").unwrap();

        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0x42);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xABCD_EF01);
        assert_eq!(r.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(r.read_name().unwrap(), "hello");
        assert!(!r.has_more());
    }

    #[test]
    fn little_endian_layout() {
        let mut w = ByteWriter::new();
        w.emit_u16(0x1234);
        assert_eq!(w.buffer(), &[0x34, 0x12]);
    }

    #[test]
    fn reader_reports_offset_on_truncation() {
        let bytes = [0x01u8, 0x02];
        let mut r = ByteReader::new(&bytes);
        r.read_u8().unwrap();
        match r.read_u32() {
            Err(DecodeError::UnexpectedEnd(offset)) => assert_eq!(offset, 1),
            other => panic!("expected truncation error, got {:?}", other),
        }
    }

    #[test]
    fn oversized_name_is_rejected() {
        let mut w = ByteWriter::new();
        let long = "x".repeat(300);
        assert!(matches!(w.emit_name(&long), Err(DecodeError::NameTooLong(300))));
    }
}
