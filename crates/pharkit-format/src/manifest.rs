//! Global manifest: version, flags, alias, metadata and entry headers
//!
//! The manifest length field counts every byte after itself through the
//! last entry header, so the offset of the first payload is known as soon
//! as the field is read. Writing is two-pass: entry headers are serialized
//! into a buffer first so the length can be emitted ahead of them.

use crate::compression::CompressionKind;
use crate::entry_header::EntryHeader;
use crate::error::{ParseStage, PharError, PharResult};
use crate::io::{PositionReader, WriteInt};
use crate::version::Version;
use binrw::{BinRead, BinWrite};
use std::io::{Cursor, Read, Seek, Write};
use tracing::{debug, trace};

/// Global flag bit: a signature trailer follows the payloads
pub const SIGNATURE_FLAG: u32 = 0x0001_0000;

/// Largest manifest accepted on read or produced on write
pub const MAX_MANIFEST_SIZE: usize = 1024 * 1024;

/// Fixed bytes counted by the length field besides alias, metadata and headers:
/// file count, version, flags, alias length
const FIXED_LEN: usize = 4 + 2 + 4 + 4;

/// Smallest possible entry header: empty name, numeric block, empty metadata
const MIN_ENTRY_HEADER_LEN: u64 = 4 + 20 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
struct ManifestFixed {
    file_count: u32,
    version: [u8; 2],
    flags: u32,
}

/// Parsed or to-be-written manifest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    /// Archive API version
    pub version: Version,
    /// Global flags as read; recomputed on write
    pub flags: u32,
    /// Archive alias
    pub alias: String,
    /// Opaque archive metadata
    pub metadata: Vec<u8>,
    /// Entry headers in on-disk order
    pub entries: Vec<EntryHeader>,
}

impl Manifest {
    /// Read the manifest that starts right after the stub.
    ///
    /// Returns the manifest and the absolute offset of the first payload.
    pub fn read<R: Read + Seek>(
        reader: &mut PositionReader<R>,
        max_size: usize,
    ) -> PharResult<(Self, u64)> {
        let stage = |e: PharError| e.in_stage(ParseStage::Manifest);

        let manifest_start = reader.position();
        let stored_len = reader.read_u32le().map_err(stage)?;
        if stored_len as usize > max_size {
            return Err(PharError::ManifestTooLarge {
                size: stored_len as usize,
                limit: max_size,
            });
        }
        let data_start = reader.position() + u64::from(stored_len);

        let fixed = ManifestFixed::read(reader)
            .map_err(PharError::from)
            .map_err(stage)?;
        if stored_len == 0 || fixed.file_count == 0 {
            return Err(PharError::EmptyArchive {
                manifest_length: stored_len,
                file_count: fixed.file_count,
            });
        }

        let version = Version::from_nibbles(fixed.version);
        let alias = String::from_utf8(reader.read_prefixed(max_size).map_err(stage)?)?;
        let metadata = reader.read_prefixed(max_size).map_err(stage)?;
        debug!(
            "manifest at {manifest_start}: {} bytes, {} entries, version {version}, flags 0x{:08X}",
            stored_len, fixed.file_count, fixed.flags
        );

        let room = data_start.saturating_sub(reader.position());
        if u64::from(fixed.file_count) * MIN_ENTRY_HEADER_LEN > room {
            return Err(PharError::TruncatedArchive {
                stage: ParseStage::EntryHeaders,
                reason: format!(
                    "{} entries cannot fit in the {room} manifest bytes left",
                    fixed.file_count
                ),
            });
        }

        let mut entries = Vec::with_capacity(fixed.file_count as usize);
        for index in 0..fixed.file_count {
            let header = EntryHeader::read(reader, max_size)
                .map_err(|e| e.in_stage(ParseStage::EntryHeaders))?;
            trace!("entry header {index}: {}", header.name);
            entries.push(header);
        }

        if reader.position() != data_start {
            return Err(PharError::TruncatedArchive {
                stage: ParseStage::EntryHeaders,
                reason: format!(
                    "manifest length puts payloads at offset {data_start}, headers end at {}",
                    reader.position()
                ),
            });
        }

        Ok((
            Self {
                version,
                flags: fixed.flags,
                alias,
                metadata,
                entries,
            },
            data_start,
        ))
    }

    /// Global flags for the current entry set
    pub fn compute_flags(&self, signed: bool) -> u32 {
        let signature = if signed { SIGNATURE_FLAG } else { 0 };
        signature | compression_flags(self.entries.iter().map(|h| h.compression))
    }

    /// Whether the flags read from disk announce a signature trailer
    pub fn has_signature_flag(&self) -> bool {
        self.flags & SIGNATURE_FLAG != 0
    }

    /// Value of the manifest length field for the current contents
    pub fn stored_length(&self) -> usize {
        FIXED_LEN
            + self.alias.len()
            + 4
            + self.metadata.len()
            + self.entries.iter().map(EntryHeader::encoded_len).sum::<usize>()
    }

    /// Write the manifest; returns the number of bytes written
    pub fn write<W: Write + ?Sized>(&self, out: &mut W, signed: bool) -> PharResult<u64> {
        // First pass: entry headers
        let mut headers = Cursor::new(Vec::new());
        for header in &self.entries {
            header.write(&mut headers)?;
        }
        let headers = headers.into_inner();

        let stored_len = FIXED_LEN + self.alias.len() + 4 + self.metadata.len() + headers.len();
        if stored_len > MAX_MANIFEST_SIZE {
            return Err(PharError::ManifestTooLarge {
                size: stored_len,
                limit: MAX_MANIFEST_SIZE,
            });
        }
        let file_count = u32::try_from(self.entries.len()).map_err(|_| PharError::ManifestTooLarge {
            size: stored_len,
            limit: MAX_MANIFEST_SIZE,
        })?;

        // Second pass: length, fixed block, alias, metadata, headers
        let mut buf = Cursor::new(Vec::with_capacity(4 + stored_len));
        buf.write_u32le(stored_len as u32)?;
        ManifestFixed {
            file_count,
            version: self.version.to_nibbles(),
            flags: self.compute_flags(signed),
        }
        .write(&mut buf)?;
        buf.write_prefixed(self.alias.as_bytes())?;
        buf.write_prefixed(&self.metadata)?;
        buf.write_all(&headers)?;

        let buf = buf.into_inner();
        out.write_all(&buf)?;
        debug!("wrote manifest: {} bytes, {file_count} entries", buf.len());
        Ok(buf.len() as u64)
    }
}

/// OR of the flag bits of every kind in use
pub fn compression_flags(kinds: impl IntoIterator<Item = CompressionKind>) -> u32 {
    kinds.into_iter().fold(0, |acc, kind| acc | kind.flag())
}
