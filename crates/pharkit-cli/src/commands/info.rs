use crate::{
    CommandContext,
    commands::open_archive,
    output::{format_key_value, format_size, print_json, print_section_header},
};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct SignatureSummary {
    algorithm: String,
    digest: String,
    valid_magic: bool,
}

#[derive(Debug, Serialize)]
struct ArchiveSummary {
    path: String,
    version: String,
    alias: String,
    entries: usize,
    files: usize,
    directories: usize,
    uncompressed_bytes: u64,
    stored_bytes: u64,
    manifest_flags: String,
    stub_bytes: usize,
    metadata_bytes: usize,
    signature: Option<SignatureSummary>,
}

pub fn handle(path: &Path, ctx: CommandContext) -> anyhow::Result<()> {
    let archive = open_archive(path)?;
    let directories = archive.entries().iter().filter(|e| e.is_directory()).count();

    let summary = ArchiveSummary {
        path: path.display().to_string(),
        version: archive.version().to_string(),
        alias: archive.alias().to_string(),
        entries: archive.len(),
        files: archive.len() - directories,
        directories,
        uncompressed_bytes: archive
            .entries()
            .iter()
            .map(|e| u64::from(e.header.uncompressed_size))
            .sum(),
        stored_bytes: archive
            .entries()
            .iter()
            .map(|e| u64::from(e.header.compressed_size))
            .sum(),
        manifest_flags: format!("0x{:08X}", archive.manifest_flags()),
        stub_bytes: archive.stub().len(),
        metadata_bytes: archive.metadata().len(),
        signature: archive.signature().map(|s| SignatureSummary {
            algorithm: s.algorithm.to_string(),
            digest: s.hex_digest(),
            valid_magic: s.has_valid_magic(),
        }),
    };

    if ctx.format.is_json() {
        return print_json(&summary, ctx.format);
    }

    let style = &ctx.style;
    print_section_header(&format!("PHAR archive {}", summary.path), style);
    println!("{}", format_key_value("Version", &summary.version, style));
    println!("{}", format_key_value("Alias", &summary.alias, style));
    println!(
        "{}",
        format_key_value(
            "Entries",
            &format!(
                "{} ({} files, {} directories)",
                summary.entries, summary.files, summary.directories
            ),
            style
        )
    );
    println!(
        "{}",
        format_key_value(
            "Contents",
            &format!(
                "{} ({} stored)",
                format_size(summary.uncompressed_bytes),
                format_size(summary.stored_bytes)
            ),
            style
        )
    );
    println!("{}", format_key_value("Flags", &summary.manifest_flags, style));
    println!("{}", format_key_value("Stub", &format_size(summary.stub_bytes as u64), style));
    println!(
        "{}",
        format_key_value("Metadata", &format_size(summary.metadata_bytes as u64), style)
    );
    match &summary.signature {
        Some(sig) => {
            println!("{}", format_key_value("Signature", &sig.algorithm, style));
            println!("{}", format_key_value("Digest", &sig.digest, style));
            if !sig.valid_magic {
                println!("{}", format_key_value("Magic", "invalid (expected GBMB)", style));
            }
        }
        None => println!("{}", format_key_value("Signature", "none", style)),
    }
    Ok(())
}
