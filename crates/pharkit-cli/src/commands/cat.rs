use crate::commands::open_archive;
use anyhow::Context;
use pharkit_format::PharPath;
use std::io::Write;
use std::path::Path;

pub fn handle(target: &str, entry: Option<&str>) -> anyhow::Result<()> {
    let data = match entry {
        Some(name) => {
            let archive = open_archive(Path::new(target))?;
            archive
                .read_entry(name)
                .with_context(|| format!("failed to read '{name}' from {target}"))?
                .to_vec()
        }
        None => {
            let address = PharPath::parse(target)?;
            address
                .open_entry()
                .with_context(|| format!("failed to read {address}"))?
        }
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}
