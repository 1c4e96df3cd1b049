//! Executable preamble that precedes the manifest

use crate::error::{PharError, PharResult};
use crate::io::PositionReader;
use std::io::{Read, Seek, SeekFrom};
use tracing::trace;

/// Marker that ends the executable part of a stub
pub const HALT_COMPILER: &[u8] = b"__HALT_COMPILER();";

/// Stub written when none is configured
pub const DEFAULT_STUB: &[u8] = b"<?php\n__HALT_COMPILER(); ?>\n";

/// Leading bytes of an archive, up to and including the halt marker line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    code: Vec<u8>,
}

impl Stub {
    /// Create a stub from source code.
    ///
    /// The code must contain `__HALT_COMPILER();`. A trailing newline is
    /// appended when the code does not end with one.
    pub fn new(code: impl Into<Vec<u8>>) -> PharResult<Self> {
        let mut code = code.into();
        if find(&code, HALT_COMPILER).is_none() {
            return Err(PharError::MissingStubTerminator);
        }
        if !matches!(code.last(), Some(b'\n' | b'\r')) {
            code.push(b'\n');
        }
        Ok(Self { code })
    }

    /// Read a stub from the start of an archive.
    ///
    /// Consumes bytes through the halt marker, an optional ` ?>` and an
    /// optional `\r\n` or `\n`. The bytes are kept exactly as read.
    pub fn read<R: Read + Seek>(reader: &mut PositionReader<R>) -> PharResult<Self> {
        let mut code = Vec::new();
        loop {
            match reader.read_byte()? {
                Some(b) => code.push(b),
                None => return Err(PharError::MissingStubTerminator),
            }
            if code.ends_with(HALT_COMPILER) {
                break;
            }
        }

        // Optional " ?>" after the marker; rewind if it is not there
        let mark = code.len();
        let mark_pos = reader.position();
        while peek(reader)? == Some(b' ') {
            reader.read_byte()?;
            code.push(b' ');
        }
        if reader.read_byte()? == Some(b'?') && reader.read_byte()? == Some(b'>') {
            code.extend_from_slice(b"?>");
        } else {
            code.truncate(mark);
            reader.seek(SeekFrom::Start(mark_pos))?;
        }
        read_line_end(reader, &mut code)?;

        trace!("stub ends at offset {}", reader.position());
        Ok(Self { code })
    }

    /// Stub bytes as written to disk
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether the stub is empty (never true for a valid stub)
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl Default for Stub {
    fn default() -> Self {
        Self {
            code: DEFAULT_STUB.to_vec(),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn peek<R: Read + Seek>(reader: &mut PositionReader<R>) -> PharResult<Option<u8>> {
    let b = reader.read_byte()?;
    if b.is_some() {
        reader.seek(SeekFrom::Current(-1))?;
    }
    Ok(b)
}

fn read_line_end<R: Read + Seek>(reader: &mut PositionReader<R>, code: &mut Vec<u8>) -> PharResult<()> {
    match peek(reader)? {
        Some(b'\n') => {
            reader.read_byte()?;
            code.push(b'\n');
        }
        Some(b'\r') => {
            reader.read_byte()?;
            if peek(reader)? == Some(b'\n') {
                reader.read_byte()?;
                code.extend_from_slice(b"\r\n");
            } else {
                reader.seek(SeekFrom::Current(-1))?;
            }
        }
        _ => {}
    }
    Ok(())
}
