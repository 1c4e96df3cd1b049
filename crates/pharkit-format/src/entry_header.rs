//! Per-entry manifest record

use crate::compression::{CompressionKind, ENTRY_COMPRESSION_MASK};
use crate::error::{PharError, PharResult};
use crate::io::{PositionReader, WriteInt};
use binrw::{BinRead, BinWrite};
use std::io::{Cursor, Read, Seek};

/// Fixed numeric block between an entry's name and its metadata (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
struct EntryRecord {
    uncompressed_size: u32,
    mod_time: u32,
    compressed_size: u32,
    crc32: u32,
    flags: u32,
}

/// Manifest record describing one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Path inside the archive, `/`-separated; directories end with `/`
    pub name: String,
    /// Size of the decompressed payload
    pub uncompressed_size: u32,
    /// Modification time, unix seconds
    pub mod_time: u32,
    /// Size of the payload as stored
    pub compressed_size: u32,
    /// CRC32 of the decompressed payload
    pub crc32: u32,
    /// Compression the stored payload uses
    pub compression: CompressionKind,
    /// Flag bits outside the compression mask (permission bits and such)
    pub extra_flags: u32,
    /// Opaque per-entry metadata
    pub metadata: Vec<u8>,
}

impl EntryHeader {
    /// Header for a file built from its uncompressed bytes.
    ///
    /// `compressed_size` starts equal to the uncompressed size and is
    /// replaced once the payload is compressed for writing.
    pub fn from_source_bytes(
        name: impl Into<String>,
        bytes: &[u8],
        compression: CompressionKind,
        mod_time: u32,
    ) -> PharResult<Self> {
        let size = u32::try_from(bytes.len()).map_err(|_| {
            PharError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("entry of {} bytes exceeds the 4 GiB format limit", bytes.len()),
            ))
        })?;
        Ok(Self {
            name: name.into(),
            uncompressed_size: size,
            mod_time,
            compressed_size: size,
            crc32: crc32fast::hash(bytes),
            compression,
            extra_flags: 0,
            metadata: Vec::new(),
        })
    }

    /// Header for a directory; the name gains a trailing `/` if missing
    pub fn directory(name: impl Into<String>, mod_time: u32) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            uncompressed_size: 0,
            mod_time,
            compressed_size: 0,
            crc32: 0,
            compression: CompressionKind::None,
            extra_flags: 0,
            metadata: Vec::new(),
        }
    }

    /// Whether this header names a directory
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Full flags word as written
    pub fn flags(&self) -> u32 {
        (self.extra_flags & !ENTRY_COMPRESSION_MASK) | self.compression.flag()
    }

    /// Read one record; variable-length fields longer than `limit` are rejected
    pub fn read<R: Read + Seek>(reader: &mut PositionReader<R>, limit: usize) -> PharResult<Self> {
        let name = String::from_utf8(reader.read_prefixed(limit)?)?;
        let record = EntryRecord::read(reader)?;
        let compression = CompressionKind::from_flags(record.flags)?;
        let metadata = reader.read_prefixed(limit)?;

        Ok(Self {
            name,
            uncompressed_size: record.uncompressed_size,
            mod_time: record.mod_time,
            compressed_size: record.compressed_size,
            crc32: record.crc32,
            compression,
            extra_flags: record.flags & !ENTRY_COMPRESSION_MASK,
            metadata,
        })
    }

    /// Append the record to `out`
    pub fn write(&self, out: &mut Cursor<Vec<u8>>) -> PharResult<()> {
        out.write_prefixed(self.name.as_bytes())?;
        EntryRecord {
            uncompressed_size: self.uncompressed_size,
            mod_time: self.mod_time,
            compressed_size: self.compressed_size,
            crc32: self.crc32,
            flags: self.flags(),
        }
        .write(out)?;
        out.write_prefixed(&self.metadata)?;
        Ok(())
    }

    /// Bytes this record occupies in the manifest
    pub fn encoded_len(&self) -> usize {
        4 + self.name.len() + 20 + 4 + self.metadata.len()
    }
}

/// Normalize an entry name.
///
/// Backslashes become `/`, leading `/` and `.` or empty components are
/// dropped, a trailing `/` is kept. Names that end up empty or contain a
/// `..` component are rejected.
pub fn normalize_name(name: &str) -> PharResult<String> {
    let unified = name.replace('\\', "/");
    let is_dir = unified.ends_with('/');

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(PharError::InvalidEntryName(name.to_string())),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(PharError::InvalidEntryName(name.to_string()));
    }

    let mut normalized = parts.join("/");
    if is_dir {
        normalized.push('/');
    }
    Ok(normalized)
}
