//! PHAR error types

use std::fmt;
use thiserror::Error;

/// Stage of the archive parser, carried by truncation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// Scanning the stub for its terminator
    Stub,
    /// Reading the fixed manifest fields, alias and metadata
    Manifest,
    /// Reading per-entry manifest records
    EntryHeaders,
    /// Checking that every payload slice is present
    Payloads,
    /// Reading the signature trailer
    Signature,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stub => "stub",
            Self::Manifest => "manifest",
            Self::EntryHeaders => "entry headers",
            Self::Payloads => "payloads",
            Self::Signature => "signature",
        };
        f.write_str(name)
    }
}

/// PHAR-specific error type
#[derive(Debug, Error)]
pub enum PharError {
    /// The stream ended before a fixed-size field could be read
    #[error("truncated input at offset {offset}: needed {needed} more bytes")]
    TruncatedInput {
        /// Stream offset where the read started
        offset: u64,
        /// Bytes the read required
        needed: u64,
    },

    /// The archive ended before the structure described by its manifest
    #[error("truncated archive while reading {stage}: {reason}")]
    TruncatedArchive {
        /// Parser stage that hit the inconsistency
        stage: ParseStage,
        /// What was missing
        reason: String,
    },

    /// No `__HALT_COMPILER();` terminator found in the stub
    #[error("stub is missing the __HALT_COMPILER(); terminator")]
    MissingStubTerminator,

    /// Manifest declares zero files or has zero length
    #[error("archive manifest is empty (length {manifest_length}, files {file_count})")]
    EmptyArchive {
        /// Stored manifest length
        manifest_length: u32,
        /// Stored file count
        file_count: u32,
    },

    /// Version string or nibbles out of range
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Compression bits that map to no known kind
    #[error("unsupported compression flags: 0x{0:08X}")]
    UnsupportedCompressionKind(u32),

    /// Payload failed to decompress or had the wrong size
    #[error("corrupt payload for '{name}': {reason}")]
    CorruptPayload {
        /// Entry name (empty when decompressing outside an entry)
        name: String,
        /// Failure detail
        reason: String,
    },

    /// CRC32 of decompressed bytes does not match the entry header
    #[error("crc32 mismatch for '{name}': expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Entry name
        name: String,
        /// CRC stored in the header
        expected: u32,
        /// CRC of the decompressed bytes
        actual: u32,
    },

    /// Manifest exceeds the size ceiling
    #[error("manifest too large: {size} bytes exceeds limit of {limit}")]
    ManifestTooLarge {
        /// Manifest length in bytes
        size: usize,
        /// Configured ceiling
        limit: usize,
    },

    /// Signature flag maps to no known algorithm
    #[error("unknown signature algorithm flag: 0x{0:08X}")]
    UnknownSignatureAlgorithm(u32),

    /// Trailer does not end with `GBMB`
    #[error("bad signature magic: expected \"GBMB\", got {0:02X?}")]
    BadSignatureMagic([u8; 4]),

    /// Recomputed digest differs from the stored one
    #[error("signature mismatch: expected {expected}, got {actual}")]
    SignatureMismatch {
        /// Stored digest (hex)
        expected: String,
        /// Recomputed digest (hex)
        actual: String,
    },

    /// Archive carries no signature trailer
    #[error("archive has no signature")]
    MissingSignature,

    /// Entry name is empty, absolute or escapes the archive root
    #[error("invalid entry name: '{0}'")]
    InvalidEntryName(String),

    /// Entry lookup failed
    #[error("entry not found: '{0}'")]
    EntryNotFound(String),

    /// An entry with the same name already exists
    #[error("duplicate entry: '{0}'")]
    DuplicateEntry(String),

    /// `archive!/entry` address could not be split
    #[error("invalid phar path: {0}")]
    InvalidPath(String),

    /// Stored entry requested from an archive that has no backing source
    #[error("entry '{0}' refers to stored data but the archive has no backing source")]
    NoBackingSource(String),

    /// Name, alias or stub bytes are not UTF-8
    #[error("invalid string encoding: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PharError {
    /// Attach a parser stage to a short read.
    ///
    /// Short reads inside a stage become `TruncatedArchive`; every other
    /// error passes through unchanged.
    #[must_use]
    pub fn in_stage(self, stage: ParseStage) -> Self {
        match self {
            Self::TruncatedInput { offset, needed } => Self::TruncatedArchive {
                stage,
                reason: format!("stream ended at offset {offset} ({needed} bytes short)"),
            },
            Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Self::TruncatedArchive {
                    stage,
                    reason: e.to_string(),
                }
            }
            other => other,
        }
    }

    /// Whether the error means the input ended too early
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Self::TruncatedInput { .. } | Self::TruncatedArchive { .. }
        )
    }
}

impl From<binrw::Error> for PharError {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::Io(e) => Self::Io(e),
            other if other.is_eof() => Self::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                other.to_string(),
            )),
            other => Self::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// Result type for PHAR operations
pub type PharResult<T> = Result<T, PharError>;
