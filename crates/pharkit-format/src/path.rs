//! `archive!/entry` addresses

use crate::archive::{PharArchive, ReadOptions};
use crate::error::{PharError, PharResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// URL scheme accepted in front of an address
pub const SCHEME: &str = "phar://";

/// Separator between the archive path and the entry name
pub const SEPARATOR: &str = "!/";

/// Archive file plus an optional entry inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PharPath {
    archive: PathBuf,
    entry: Option<String>,
}

impl PharPath {
    /// Split `phar://a.phar!/x/y` or `a.phar!/x/y`.
    ///
    /// Nothing after `!/` addresses the archive root.
    pub fn parse(address: &str) -> PharResult<Self> {
        let rest = address.strip_prefix(SCHEME).unwrap_or(address);
        let (archive, entry) = rest
            .split_once(SEPARATOR)
            .ok_or_else(|| PharError::InvalidPath(format!("'{address}' has no '{SEPARATOR}'")))?;
        if archive.is_empty() {
            return Err(PharError::InvalidPath(format!(
                "'{address}' names no archive"
            )));
        }

        let entry = entry.trim_end_matches('/');
        Ok(Self {
            archive: PathBuf::from(archive),
            entry: (!entry.is_empty()).then(|| entry.to_string()),
        })
    }

    /// Archive file
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Entry name, `None` for the archive root
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Open the archive and return the entry's bytes
    pub fn open_entry(&self) -> PharResult<Vec<u8>> {
        self.open_entry_with(ReadOptions::default())
    }

    /// Open the archive with explicit options and return the entry's bytes
    pub fn open_entry_with(&self, options: ReadOptions) -> PharResult<Vec<u8>> {
        let entry = self
            .entry
            .as_deref()
            .ok_or_else(|| PharError::InvalidPath(format!("{self} addresses no entry")))?;
        let archive = PharArchive::open_with(&self.archive, options)?;
        Ok(archive.read_entry(entry)?.to_vec())
    }
}

impl fmt::Display for PharPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}{}{SEPARATOR}{}",
            self.archive.display(),
            self.entry.as_deref().unwrap_or("")
        )
    }
}

impl FromStr for PharPath {
    type Err = PharError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Open `address` and return the addressed entry's bytes
pub fn open_entry(address: &str) -> PharResult<Vec<u8>> {
    PharPath::parse(address)?.open_entry()
}
