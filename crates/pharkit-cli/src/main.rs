use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use pharkit_cli::{CommandContext, Commands, OutputFormat, output::OutputStyle};

#[derive(Parser)]
#[command(
    name = "pharkit",
    about = "Inspect, extract and build PHAR archives",
    version,
    author,
    long_about = "A command-line tool for PHAR archives: list and read entries, check signatures, extract to disk and pack directories into signed archives."
)]
struct Cli {
    /// Set the logging level (RUST_LOG overrides it)
    #[arg(
        short,
        long,
        value_enum,
        env = "PHARKIT_LOG",
        default_value = "warn",
        global = true
    )]
    log_level: LogLevel,

    /// Output format
    #[arg(short = 'f', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `cat` output stays clean
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(Level::from(cli.log_level)).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let style = if cli.no_color {
        OutputStyle::new().no_color()
    } else {
        OutputStyle::new()
    };

    pharkit_cli::run(
        cli.command,
        CommandContext {
            format: cli.format,
            style,
        },
    )
}
