//! Per-entry compression framing
//!
//! PHAR stores deflate payloads as a bare DEFLATE body: no zlib header, no
//! adler32 trailer, no gzip envelope. The entry header already carries the
//! uncompressed size and CRC32, so the payload is inflated in raw mode and
//! checked against those fields. Bzip2 payloads are complete bzip2 streams.

use crate::error::{PharError, PharResult};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Mask selecting the compression bits of an entry flags word
pub const ENTRY_COMPRESSION_MASK: u32 = 0x0000_F000;

/// Compression applied to one entry's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionKind {
    /// Stored as-is
    #[default]
    None,
    /// Raw DEFLATE body
    Deflate,
    /// Full bzip2 stream
    Bzip2,
}

type CompressFn = fn(&[u8]) -> PharResult<Vec<u8>>;
type DecompressFn = fn(&[u8], usize) -> PharResult<Vec<u8>>;

struct Codec {
    compress: CompressFn,
    decompress: DecompressFn,
}

const STORE: Codec = Codec {
    compress: store_compress,
    decompress: store_decompress,
};

const DEFLATE: Codec = Codec {
    compress: deflate_compress,
    decompress: deflate_decompress,
};

const BZIP2: Codec = Codec {
    compress: bzip2_compress,
    decompress: bzip2_decompress,
};

impl CompressionKind {
    /// All kinds, in flag order
    pub const ALL: [Self; 3] = [Self::None, Self::Deflate, Self::Bzip2];

    /// Flag bits for this kind
    pub const fn flag(self) -> u32 {
        match self {
            Self::None => 0x0000_0000,
            Self::Deflate => 0x0000_1000,
            Self::Bzip2 => 0x0000_2000,
        }
    }

    /// Decode the compression bits of a flags word.
    ///
    /// Only [`ENTRY_COMPRESSION_MASK`] is considered; other bits are ignored.
    pub fn from_flags(flags: u32) -> PharResult<Self> {
        match flags & ENTRY_COMPRESSION_MASK {
            0x0000_0000 => Ok(Self::None),
            0x0000_1000 => Ok(Self::Deflate),
            0x0000_2000 => Ok(Self::Bzip2),
            _ => Err(PharError::UnsupportedCompressionKind(flags)),
        }
    }

    /// Lower-case name as used on the command line
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
            Self::Bzip2 => "bzip2",
        }
    }

    const fn codec(self) -> &'static Codec {
        match self {
            Self::None => &STORE,
            Self::Deflate => &DEFLATE,
            Self::Bzip2 => &BZIP2,
        }
    }

    /// Compress `data` for storage
    pub fn compress(self, data: &[u8]) -> PharResult<Vec<u8>> {
        (self.codec().compress)(data)
    }

    /// Decompress a stored payload that must expand to exactly `expected_size` bytes
    pub fn decompress(self, data: &[u8], expected_size: usize) -> PharResult<Vec<u8>> {
        (self.codec().decompress)(data, expected_size)
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "store" => Ok(Self::None),
            "deflate" | "zlib" | "gz" | "gzip" => Ok(Self::Deflate),
            "bzip2" | "bz2" | "bzip" => Ok(Self::Bzip2),
            other => Err(format!("unknown compression kind: {other}")),
        }
    }
}

/// Compress bytes with the given kind
pub fn compress(kind: CompressionKind, data: &[u8]) -> PharResult<Vec<u8>> {
    kind.compress(data)
}

/// Decompress bytes with the given kind, expecting `expected_size` output bytes
pub fn decompress(kind: CompressionKind, data: &[u8], expected_size: usize) -> PharResult<Vec<u8>> {
    kind.decompress(data, expected_size)
}

fn corrupt(reason: impl Into<String>) -> PharError {
    PharError::CorruptPayload {
        name: String::new(),
        reason: reason.into(),
    }
}

fn check_size(out: Vec<u8>, expected_size: usize) -> PharResult<Vec<u8>> {
    match out.len() {
        n if n == expected_size => Ok(out),
        n if n > expected_size => Err(corrupt(format!(
            "expands past the declared {expected_size} bytes"
        ))),
        n => Err(corrupt(format!(
            "expanded to {n} bytes, header says {expected_size}"
        ))),
    }
}

fn store_compress(data: &[u8]) -> PharResult<Vec<u8>> {
    Ok(data.to_vec())
}

fn store_decompress(data: &[u8], expected_size: usize) -> PharResult<Vec<u8>> {
    check_size(data.to_vec(), expected_size)
}

fn deflate_compress(data: &[u8]) -> PharResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Read at most `expected_size + 1` bytes so an overlong stream is caught
/// without inflating all of it. The size comes from the entry header, so
/// only a bounded amount is reserved up front.
fn bounded_read<R: Read>(decoder: R, expected_size: usize, codec: &str) -> PharResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size.min(64 * 1024));
    decoder
        .take(expected_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| corrupt(format!("{codec} decompression failed: {e}")))?;
    check_size(out, expected_size)
}

fn deflate_decompress(data: &[u8], expected_size: usize) -> PharResult<Vec<u8>> {
    bounded_read(DeflateDecoder::new(data), expected_size, "deflate")
}

fn bzip2_compress(data: &[u8]) -> PharResult<Vec<u8>> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn bzip2_decompress(data: &[u8], expected_size: usize) -> PharResult<Vec<u8>> {
    bounded_read(bzip2::read::BzDecoder::new(data), expected_size, "bzip2")
}
