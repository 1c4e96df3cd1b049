use crate::{
    CommandContext,
    commands::open_archive,
    output::{format_success, print_json},
};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct ExtractSummary {
    archive: String,
    destination: String,
    files: usize,
}

pub fn handle(path: &Path, dir: &Path, ctx: CommandContext) -> anyhow::Result<()> {
    let archive = open_archive(path)?;
    let files = archive
        .extract_to(dir)
        .with_context(|| format!("failed to extract into {}", dir.display()))?;

    let summary = ExtractSummary {
        archive: path.display().to_string(),
        destination: dir.display().to_string(),
        files,
    };
    if ctx.format.is_json() {
        return print_json(&summary, ctx.format);
    }
    println!(
        "{}",
        format_success(
            &format!("Extracted {files} files to {}", summary.destination),
            &ctx.style
        )
    );
    Ok(())
}
