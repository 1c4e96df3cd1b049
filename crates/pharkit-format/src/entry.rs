//! Archive entries and their payloads

use crate::compression::CompressionKind;
use crate::entry_header::EntryHeader;
use crate::error::{PharError, PharResult};
use crate::io::PositionReader;
use parking_lot::Mutex;
use std::io::{Read, Seek, SeekFrom};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Seekable byte source an archive reads stored payloads from
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Backing source shared by all stored entries of one archive
pub type SharedSource = Mutex<Box<dyn ReadSeek>>;

/// Where an entry's bytes live
#[derive(Debug)]
pub enum Payload {
    /// Uncompressed bytes held in memory
    Owned(Vec<u8>),
    /// Compressed bytes inside the backing source
    Stored {
        /// Absolute offset of the stored bytes
        offset: u64,
        /// Stored (compressed) length
        length: u64,
        /// Compression the stored bytes were written with
        kind: CompressionKind,
        /// Decompressed bytes, filled on first access
        cache: OnceLock<Vec<u8>>,
    },
}

/// One file or directory in an archive
#[derive(Debug)]
pub struct Entry {
    /// Manifest record
    pub header: EntryHeader,
    payload: Payload,
}

impl Entry {
    /// Entry whose uncompressed bytes are held in memory
    pub fn from_bytes(header: EntryHeader, bytes: Vec<u8>) -> Self {
        Self {
            header,
            payload: Payload::Owned(bytes),
        }
    }

    /// Entry whose payload sits at `offset` in the backing source
    pub fn stored(header: EntryHeader, offset: u64) -> Self {
        let length = u64::from(header.compressed_size);
        let kind = header.compression;
        Self {
            header,
            payload: Payload::Stored {
                offset,
                length,
                kind,
                cache: OnceLock::new(),
            },
        }
    }

    /// Path inside the archive
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Whether this is a directory entry
    pub fn is_directory(&self) -> bool {
        self.header.is_directory()
    }

    /// Payload offset in the backing source, for stored entries
    pub fn offset(&self) -> Option<u64> {
        match &self.payload {
            Payload::Stored { offset, .. } => Some(*offset),
            Payload::Owned(_) => None,
        }
    }

    /// Payload representation
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Whether the decompressed bytes are available without I/O
    pub fn is_loaded(&self) -> bool {
        match &self.payload {
            Payload::Owned(_) => true,
            Payload::Stored { cache, .. } => cache.get().is_some(),
        }
    }

    /// Change the compression used the next time the archive is written
    pub fn set_compression(&mut self, kind: CompressionKind) {
        if !self.is_directory() {
            self.header.compression = kind;
        }
    }

    /// Decompressed bytes of the entry.
    ///
    /// Stored entries are read from `source` once, decompressed, checked
    /// against the header CRC when `verify_crc` is set, and cached.
    /// Directories yield an empty slice without touching the source.
    pub fn materialize(&self, source: Option<&SharedSource>, verify_crc: bool) -> PharResult<&[u8]> {
        let (offset, length, kind, cache) = match &self.payload {
            Payload::Owned(bytes) => return Ok(bytes.as_slice()),
            Payload::Stored {
                offset,
                length,
                kind,
                cache,
            } => (*offset, *length, *kind, cache),
        };

        if self.is_directory() {
            return Ok(&[]);
        }
        if let Some(bytes) = cache.get() {
            return Ok(bytes.as_slice());
        }

        let bytes = if length == 0 {
            Vec::new()
        } else {
            let raw = read_stored(self.name(), source, offset, length)?;
            kind.decompress(&raw, self.header.uncompressed_size as usize)
                .map_err(|e| self.attach_name(e))?
        };
        if bytes.len() != self.header.uncompressed_size as usize {
            return Err(PharError::CorruptPayload {
                name: self.name().to_string(),
                reason: format!(
                    "payload is {} bytes, header says {}",
                    bytes.len(),
                    self.header.uncompressed_size
                ),
            });
        }

        if verify_crc {
            let actual = crc32fast::hash(&bytes);
            if actual != self.header.crc32 {
                return Err(PharError::ChecksumMismatch {
                    name: self.name().to_string(),
                    expected: self.header.crc32,
                    actual,
                });
            }
        }

        debug!(
            "materialized '{}': {length} stored bytes -> {} ({kind})",
            self.name(),
            bytes.len()
        );
        Ok(cache.get_or_init(|| bytes).as_slice())
    }

    /// Bytes to write as this entry's payload under its current compression.
    ///
    /// A stored payload whose compression is unchanged is copied verbatim;
    /// anything else is (re)compressed from the decompressed bytes.
    pub fn encoded_payload(&self, source: Option<&SharedSource>, verify_crc: bool) -> PharResult<Vec<u8>> {
        if self.is_directory() {
            return Ok(Vec::new());
        }
        let target = self.header.compression;
        match &self.payload {
            Payload::Stored {
                offset,
                length,
                kind,
                ..
            } if *kind == target => {
                trace!("copying {length} stored bytes of '{}'", self.name());
                read_stored(self.name(), source, *offset, *length)
            }
            _ => {
                let raw = self.materialize(source, verify_crc)?;
                target.compress(raw).map_err(|e| self.attach_name(e))
            }
        }
    }

    fn attach_name(&self, err: PharError) -> PharError {
        match err {
            PharError::CorruptPayload { reason, .. } => PharError::CorruptPayload {
                name: self.name().to_string(),
                reason,
            },
            other => other,
        }
    }
}

fn read_stored(
    name: &str,
    source: Option<&SharedSource>,
    offset: u64,
    length: u64,
) -> PharResult<Vec<u8>> {
    if length == 0 {
        return Ok(Vec::new());
    }
    let source = source.ok_or_else(|| PharError::NoBackingSource(name.to_string()))?;
    let mut guard = source.lock();
    guard.seek(SeekFrom::Start(offset))?;
    let mut reader = PositionReader::with_position(&mut *guard, offset);
    let len = usize::try_from(length).map_err(|_| PharError::CorruptPayload {
        name: name.to_string(),
        reason: format!("stored length {length} does not fit in memory"),
    })?;
    reader.read_bytes(len)
}
