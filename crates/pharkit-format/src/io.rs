//! Primitive little-endian I/O with stream position tracking

use crate::error::{PharError, PharResult};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Reader wrapper that counts every byte consumed.
///
/// Payload offsets are taken from this counter so the parser never needs
/// to query the underlying stream for its position.
#[derive(Debug)]
pub struct PositionReader<R> {
    inner: R,
    position: u64,
}

impl<R> PositionReader<R> {
    /// Wrap a reader positioned at offset 0
    pub fn new(inner: R) -> Self {
        Self::with_position(inner, 0)
    }

    /// Wrap a reader that is already at `position`
    pub fn with_position(inner: R, position: u64) -> Self {
        Self { inner, position }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Unwrap the reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> PositionReader<R> {
    /// Read exactly `len` bytes.
    ///
    /// Reads through `take` so a corrupt length cannot force a huge
    /// allocation before the stream runs dry.
    pub fn read_bytes(&mut self, len: usize) -> PharResult<Vec<u8>> {
        let start = self.position;
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        let read = self.by_ref().take(len as u64).read_to_end(&mut buf)?;
        if read < len {
            return Err(PharError::TruncatedInput {
                offset: start,
                needed: (len - read) as u64,
            });
        }
        Ok(buf)
    }

    /// Read one byte, `None` at end of stream
    pub fn read_byte(&mut self) -> PharResult<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read a fixed-size array
    pub fn read_array<const N: usize>(&mut self) -> PharResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Read a 4-byte little-endian `u32`
    pub fn read_u32le(&mut self) -> PharResult<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Read a `u32` length followed by that many bytes.
    ///
    /// Lengths above `limit` are reported as truncation: no archive that
    /// passed the manifest size check can legitimately contain them.
    pub fn read_prefixed(&mut self, limit: usize) -> PharResult<Vec<u8>> {
        let start = self.position;
        let len = self.read_u32le()? as usize;
        if len > limit {
            return Err(PharError::TruncatedInput {
                offset: start,
                needed: len as u64,
            });
        }
        self.read_bytes(len)
    }

    /// Consume everything left in the stream
    pub fn read_remaining(&mut self) -> PharResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read> Read for PositionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Seek> Seek for PositionReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

/// Little-endian write helpers for any writer
pub trait WriteInt {
    /// Write a 4-byte little-endian `u32`
    fn write_u32le(&mut self, value: u32) -> io::Result<()>;

    /// Write a `u32` length followed by the bytes
    fn write_prefixed(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl<W: Write + ?Sized> WriteInt for W {
    fn write_u32le(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    fn write_prefixed(&mut self, bytes: &[u8]) -> io::Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("field of {} bytes does not fit a u32 length", bytes.len()),
            )
        })?;
        self.write_u32le(len)?;
        self.write_all(bytes)
    }
}

/// Writer wrapper that counts bytes written
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W> CountingWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
