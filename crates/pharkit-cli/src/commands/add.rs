use crate::{
    CommandContext,
    commands::{open_archive, save_archive},
    output::{format_success, print_json},
};
use anyhow::Context;
use pharkit_format::CompressionKind;
use serde::Serialize;
use std::path::Path;
use std::time::UNIX_EPOCH;

#[derive(Debug, Serialize)]
struct AddSummary {
    archive: String,
    name: String,
    size: usize,
    compression: String,
}

pub fn handle(
    path: &Path,
    file: &Path,
    name: &str,
    compression: CompressionKind,
    ctx: CommandContext,
) -> anyhow::Result<()> {
    let mut archive = open_archive(path)?;
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mod_time = std::fs::metadata(file)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX));
    let size = bytes.len();

    archive
        .add_entry_at(name, bytes, compression, mod_time)
        .with_context(|| format!("failed to add '{name}'"))?;
    save_archive(&archive, path)?;

    let summary = AddSummary {
        archive: path.display().to_string(),
        name: name.to_string(),
        size,
        compression: compression.to_string(),
    };
    if ctx.format.is_json() {
        return print_json(&summary, ctx.format);
    }
    println!(
        "{}",
        format_success(
            &format!("Added '{}' ({size} bytes, {})", summary.name, summary.compression),
            &ctx.style
        )
    );
    Ok(())
}
