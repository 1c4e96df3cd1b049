use crate::{
    CommandContext,
    commands::{open_archive, save_archive},
    output::{format_success, print_json},
};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct RemoveSummary {
    archive: String,
    removed: usize,
}

pub fn handle(path: &Path, name: &str, prefix: bool, ctx: CommandContext) -> anyhow::Result<()> {
    let mut archive = open_archive(path)?;
    let removed = if prefix {
        archive.remove_prefix(name)
    } else {
        archive
            .remove_entry(name)
            .with_context(|| format!("failed to remove '{name}'"))?;
        1
    };
    if removed == 0 {
        anyhow::bail!("no entries start with '{name}'");
    }
    save_archive(&archive, path)?;

    let summary = RemoveSummary {
        archive: path.display().to_string(),
        removed,
    };
    if ctx.format.is_json() {
        return print_json(&summary, ctx.format);
    }
    println!(
        "{}",
        format_success(&format!("Removed {removed} entries"), &ctx.style)
    );
    Ok(())
}
