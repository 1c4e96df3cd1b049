//! Command handlers

pub mod add;
pub mod cat;
pub mod create;
pub mod extract;
pub mod info;
pub mod list;
pub mod rm;
pub mod verify;

use anyhow::Context;
use pharkit_format::PharArchive;
use std::path::Path;

/// Open an archive, attaching the path to any error
pub(crate) fn open_archive(path: &Path) -> anyhow::Result<PharArchive> {
    PharArchive::open(path).with_context(|| format!("failed to open archive {}", path.display()))
}

/// Write an archive back to `path`, attaching the path to any error
pub(crate) fn save_archive(archive: &PharArchive, path: &Path) -> anyhow::Result<()> {
    archive
        .save(path)
        .with_context(|| format!("failed to write archive {}", path.display()))
}
