//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Live object directory
#[derive(Parser, Debug)]
#[command(
    name = "livedir",
    version = env!("CARGO_PKG_VERSION"),
    about = "Registry of live objects with staleness tracking and file watches",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  livedir init\n  livedir run case.toml\n  livedir watch case.toml --interval-ms 200\n  livedir simulate --ranks 3 --fail-rank 2"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .livedir/settings.toml with default values
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// List the quantity types a case can use
    Types,

    /// Load a case and print every quantity
    Run {
        /// Case file (TOML with [objects.<name>] blocks)
        case: PathBuf,
    },

    /// Load a case and re-evaluate it whenever a watched file changes
    Watch {
        /// Case file (TOML with [objects.<name>] blocks)
        case: PathBuf,

        /// Poll interval (overrides watch.poll_interval_ms)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,

        /// Stop after this many polls
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
    },

    /// Run a case on a simulated group of processes
    #[command(
        after_help = "Every rank loads the case and takes part in a gather and a broadcast.\nWith --fail-rank, that rank asks for an unknown quantity type; the whole\ngroup then exits with status 1."
    )]
    Simulate {
        /// Number of ranks
        #[arg(long, default_value = "3")]
        ranks: usize,

        /// Rank that fails while loading
        #[arg(long)]
        fail_rank: Option<usize>,

        /// Case file; a built-in case is used when omitted
        case: Option<PathBuf>,
    },
}
