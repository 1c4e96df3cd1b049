//! pharkit CLI library
//!
//! This library provides the command handlers behind the `pharkit` binary.

pub mod commands;
pub mod output;

pub use crate::commands::{
    add::handle as handle_add, cat::handle as handle_cat, create::handle as handle_create,
    extract::handle as handle_extract, info::handle as handle_info, list::handle as handle_list,
    rm::handle as handle_rm, verify::handle as handle_verify,
};

use clap::Subcommand;
use pharkit_format::{CompressionKind, SignatureAlgorithm};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List entries of an archive
    List {
        /// Archive file
        archive: PathBuf,

        /// Only show entries whose name starts with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,
    },

    /// Show manifest and signature details
    Info {
        /// Archive file
        archive: PathBuf,
    },

    /// Write one entry to stdout
    Cat {
        /// Archive file, or an `archive.phar!/entry` address
        target: String,

        /// Entry name when TARGET is a plain archive path
        entry: Option<String>,
    },

    /// Extract every entry into a directory
    Extract {
        /// Archive file
        archive: PathBuf,

        /// Destination directory
        dir: PathBuf,
    },

    /// Build an archive from a directory tree
    Create {
        /// Directory to pack
        dir: PathBuf,

        /// Output archive file
        #[arg(short, long)]
        output: PathBuf,

        /// Compression for file entries (none, deflate, bzip2)
        #[arg(short, long, env = "PHARKIT_COMPRESSION", default_value = "none")]
        compression: CompressionKind,

        /// Signature algorithm (md5, sha1, sha256, sha512)
        #[arg(short, long, env = "PHARKIT_SIGNATURE", default_value = "sha1")]
        signature: SignatureAlgorithm,

        /// File holding the stub code
        #[arg(long)]
        stub: Option<PathBuf>,

        /// Archive alias (defaults to the output file name)
        #[arg(long)]
        alias: Option<String>,
    },

    /// Check the signature trailer against the archive contents
    Verify {
        /// Archive file
        archive: PathBuf,
    },

    /// Add a file to an existing archive
    Add {
        /// Archive file
        archive: PathBuf,

        /// File to add
        file: PathBuf,

        /// Entry name inside the archive
        #[arg(short, long)]
        name: String,

        /// Compression for the new entry
        #[arg(short, long, env = "PHARKIT_COMPRESSION", default_value = "none")]
        compression: CompressionKind,
    },

    /// Remove entries from an archive
    Rm {
        /// Archive file
        archive: PathBuf,

        /// Entry name, or prefix with --prefix
        name: String,

        /// Remove every entry starting with NAME
        #[arg(long)]
        prefix: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl OutputFormat {
    /// Whether the format is one of the JSON variants
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}

/// Context for command execution
#[derive(Clone, Copy, Debug)]
pub struct CommandContext {
    /// Output format
    pub format: OutputFormat,
    /// Terminal styling
    pub style: output::OutputStyle,
}

/// Dispatch a parsed command
pub fn run(command: Commands, ctx: CommandContext) -> anyhow::Result<()> {
    match command {
        Commands::List { archive, prefix } => handle_list(&archive, &prefix, ctx),
        Commands::Info { archive } => handle_info(&archive, ctx),
        Commands::Cat { target, entry } => handle_cat(&target, entry.as_deref()),
        Commands::Extract { archive, dir } => handle_extract(&archive, &dir, ctx),
        Commands::Create {
            dir,
            output,
            compression,
            signature,
            stub,
            alias,
        } => handle_create(
            &commands::create::CreateArgs {
                dir,
                output,
                compression,
                signature,
                stub,
                alias,
            },
            ctx,
        ),
        Commands::Verify { archive } => handle_verify(&archive, ctx),
        Commands::Add {
            archive,
            file,
            name,
            compression,
        } => handle_add(&archive, &file, &name, compression, ctx),
        Commands::Rm {
            archive,
            name,
            prefix,
        } => handle_rm(&archive, &name, prefix, ctx),
    }
}
