//! PHAR archive parser and builder
//!
#![allow(clippy::cast_possible_truncation)] // Format fields are u32 by definition
#![allow(clippy::doc_markdown)] // PHAR terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::missing_const_for_fn)] // Stable API surface
#![allow(clippy::redundant_closure_for_method_calls)] // Iterator chains
//! This crate reads and writes PHAR archives: a stub, a manifest describing
//! every entry, the entry payloads (stored, raw deflate or bzip2) and a
//! whole-file signature trailer.
//!
//! # Layout
//!
//! ```text
//! [stub ... __HALT_COMPILER(); ?>\n]
//! [manifest length][file count][version][flags][alias][metadata]
//! [entry header] * file count
//! [payload] * file count
//! [digest][algorithm flag]["GBMB"]
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pharkit_format::{CompressionKind, PharArchive};
//!
//! let mut archive = PharArchive::create("app.phar");
//! archive.add_entry("index.php", b"<?php echo 'hi';".to_vec(), CompressionKind::Deflate)?;
//! archive.save("app.phar")?;
//!
//! let archive = PharArchive::open("app.phar")?;
//! assert!(archive.verify_signature()?);
//! assert_eq!(archive.read_entry("index.php")?, b"<?php echo 'hi';");
//! # Ok::<(), pharkit_format::PharError>(())
//! ```
//!
//! # Design Principles
//!
//! - **Lazy payloads**: parsed entries point into the source and are read on demand
//! - **Derived manifest**: lengths and flags are recomputed on every write
//! - **Round-Trip Guarantee**: an unmodified parsed archive re-serializes byte for byte

#![warn(missing_docs)]

/// Parser and writer for whole archives
pub mod archive;
pub mod compression;
pub mod entry;
pub mod entry_header;
pub mod error;
pub mod io;
pub mod manifest;
pub mod path;
pub mod signature;
pub mod stub;
pub mod version;
mod walk;

pub use archive::{PharArchive, ReadOptions};
pub use compression::CompressionKind;
pub use entry::{Entry, Payload};
pub use entry_header::EntryHeader;
pub use error::{ParseStage, PharError, PharResult};
pub use manifest::Manifest;
pub use path::{PharPath, open_entry};
pub use signature::{Signature, SignatureAlgorithm};
pub use stub::Stub;
pub use version::Version;
