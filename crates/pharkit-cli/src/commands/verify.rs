use crate::{
    CommandContext,
    commands::open_archive,
    output::{format_error, format_success, print_json},
};
use anyhow::Context;
use pharkit_format::PharError;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct VerifyResult {
    archive: String,
    algorithm: String,
    digest: String,
    valid: bool,
}

pub fn handle(path: &Path, ctx: CommandContext) -> anyhow::Result<()> {
    let archive = open_archive(path)?;
    let Some(signature) = archive.signature() else {
        anyhow::bail!("{} has no signature", path.display());
    };
    let mismatch = match archive.check_signature() {
        Ok(()) => None,
        Err(err @ PharError::SignatureMismatch { .. }) => Some(err),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to verify {}", path.display()));
        }
    };
    let valid = mismatch.is_none();

    let result = VerifyResult {
        archive: path.display().to_string(),
        algorithm: signature.algorithm.to_string(),
        digest: signature.hex_digest(),
        valid,
    };
    if ctx.format.is_json() {
        print_json(&result, ctx.format)?;
    } else if valid {
        println!(
            "{}",
            format_success(&format!("{} signature OK: {}", result.algorithm, result.digest), &ctx.style)
        );
    } else {
        println!(
            "{}",
            format_error(&format!("{} signature MISMATCH", result.algorithm), &ctx.style)
        );
    }

    if let Some(err) = mismatch {
        return Err(err)
            .with_context(|| format!("signature of {} does not match its contents", path.display()));
    }
    Ok(())
}
