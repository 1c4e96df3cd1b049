use crate::{
    CommandContext,
    commands::open_archive,
    output::{create_table, header_cell, numeric_cell, print_json, regular_cell},
};
use pharkit_format::PharArchive;
use serde::Serialize;
use std::path::Path;

/// One row of `pharkit list`
#[derive(Debug, Serialize)]
pub struct EntryRow {
    /// Entry name
    pub name: String,
    /// Uncompressed size
    pub size: u32,
    /// Stored size
    pub stored_size: u32,
    /// Compression kind
    pub compression: String,
    /// CRC32 as hex
    pub crc32: String,
    /// Modification time, unix seconds
    pub mod_time: u32,
    /// Whether the entry is a directory
    pub directory: bool,
}

/// Rows for every entry under `prefix`
pub fn entry_rows(archive: &PharArchive, prefix: &str) -> Vec<EntryRow> {
    archive
        .entries()
        .iter()
        .filter(|e| e.name().starts_with(prefix))
        .map(|e| EntryRow {
            name: e.name().to_string(),
            size: e.header.uncompressed_size,
            stored_size: e.header.compressed_size,
            compression: e.header.compression.to_string(),
            crc32: format!("{:08x}", e.header.crc32),
            mod_time: e.header.mod_time,
            directory: e.is_directory(),
        })
        .collect()
}

pub fn handle(path: &Path, prefix: &str, ctx: CommandContext) -> anyhow::Result<()> {
    let archive = open_archive(path)?;
    let rows = entry_rows(&archive, prefix);

    if ctx.format.is_json() {
        return print_json(&rows, ctx.format);
    }

    let style = &ctx.style;
    let mut table = create_table(style);
    table.set_header(vec![
        header_cell("Name", style),
        header_cell("Size", style),
        header_cell("Stored", style),
        header_cell("Compression", style),
        header_cell("CRC32", style),
    ]);
    for row in &rows {
        table.add_row(vec![
            regular_cell(&row.name),
            numeric_cell(&row.size.to_string()),
            numeric_cell(&row.stored_size.to_string()),
            regular_cell(&row.compression),
            regular_cell(&row.crc32),
        ]);
    }
    println!("{table}");
    Ok(())
}
