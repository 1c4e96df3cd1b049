//! Build archive contents from a directory tree

use crate::archive::PharArchive;
use crate::compression::CompressionKind;
use crate::error::{PharError, PharResult};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};
use walkdir::WalkDir;

impl PharArchive {
    /// Add every file below `root`, named relative to it.
    ///
    /// Files are visited in sorted order and compressed with `compression`.
    /// Empty directories become directory entries. Symbolic links are
    /// skipped. Returns the number of entries added.
    pub fn add_directory_tree(
        &mut self,
        root: impl AsRef<Path>,
        compression: CompressionKind,
    ) -> PharResult<usize> {
        let root = root.as_ref();
        debug!("adding directory tree {}", root.display());
        if !fs::metadata(root)?.is_dir() {
            return Err(PharError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            )));
        }

        let mut added = 0;
        for item in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let item = item.map_err(std::io::Error::from)?;
            let relative = item
                .path()
                .strip_prefix(root)
                .map_err(|_| PharError::InvalidEntryName(item.path().display().to_string()))?;
            let name = entry_name(relative)?;
            let file_type = item.file_type();
            let metadata = item.metadata().map_err(std::io::Error::from)?;
            let mod_time = unix_seconds(metadata.modified().ok());

            if file_type.is_dir() {
                if fs::read_dir(item.path())?.next().is_none()
                    && self.add_directory_at(&name, mod_time)?
                {
                    trace!("empty directory '{name}/'");
                    added += 1;
                }
            } else if file_type.is_file() {
                let bytes = fs::read(item.path())?;
                trace!("file '{name}' ({} bytes)", bytes.len());
                self.add_entry_at(&name, bytes, compression, mod_time)?;
                added += 1;
            } else {
                debug!("skipping {}: not a regular file", item.path().display());
            }
        }

        debug!("added {added} entries from {}", root.display());
        Ok(added)
    }
}

fn entry_name(relative: &Path) -> PharResult<String> {
    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| PharError::InvalidEntryName(relative.display().to_string()))
        })
        .collect::<PharResult<Vec<_>>>()?;
    Ok(parts.join("/"))
}

fn unix_seconds(time: Option<SystemTime>) -> u32 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
}
