use crate::{
    CommandContext,
    commands::save_archive,
    output::{format_success, print_json},
};
use anyhow::Context;
use pharkit_format::{CompressionKind, PharArchive, SignatureAlgorithm, Stub};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Arguments of `pharkit create`
#[derive(Debug, Clone)]
pub struct CreateArgs {
    /// Directory to pack
    pub dir: PathBuf,
    /// Output archive file
    pub output: PathBuf,
    /// Compression for file entries
    pub compression: CompressionKind,
    /// Signature algorithm
    pub signature: SignatureAlgorithm,
    /// Stub source file
    pub stub: Option<PathBuf>,
    /// Alias override
    pub alias: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSummary {
    output: String,
    entries: usize,
    compression: String,
    signature: String,
}

pub fn handle(args: &CreateArgs, ctx: CommandContext) -> anyhow::Result<()> {
    let mut archive = PharArchive::create(&args.output);
    if let Some(alias) = &args.alias {
        archive.set_alias(alias.as_str());
    }
    if let Some(stub_path) = &args.stub {
        let code = std::fs::read(stub_path)
            .with_context(|| format!("failed to read stub {}", stub_path.display()))?;
        archive.set_stub(
            Stub::new(code).with_context(|| format!("invalid stub {}", stub_path.display()))?,
        );
    }
    archive.set_signature_algorithm(Some(args.signature));

    let added = archive
        .add_directory_tree(&args.dir, args.compression)
        .with_context(|| format!("failed to pack {}", args.dir.display()))?;
    if added == 0 {
        anyhow::bail!("{} contains nothing to pack", args.dir.display());
    }
    info!("packed {added} entries from {}", args.dir.display());

    save_archive(&archive, &args.output)?;

    let summary = CreateSummary {
        output: args.output.display().to_string(),
        entries: archive.len(),
        compression: args.compression.to_string(),
        signature: args.signature.to_string(),
    };
    if ctx.format.is_json() {
        return print_json(&summary, ctx.format);
    }
    println!(
        "{}",
        format_success(
            &format!(
                "Created {} with {} entries ({}, {})",
                summary.output, summary.entries, summary.compression, summary.signature
            ),
            &ctx.style
        )
    );
    Ok(())
}
