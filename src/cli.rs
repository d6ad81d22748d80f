use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tsm_config::DirectoryKind;

#[derive(Parser)]
#[command(name = "tsm", version)]
#[command(about = "Clean manifest packages and deliver them to a primary and a mirror directory", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the ledger, audit log and remembered directories
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Output directory for cleaned packages
    #[arg(long, global = true)]
    pub primary: Option<PathBuf>,

    /// Mirror directory, fed from the primary directory
    #[arg(long, global = true)]
    pub mirror: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less logging (-q warnings, -qq errors only)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Process the given archives once
    Process {
        /// Archive paths; surrounding quotes and braces are ignored
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Poll a directory for new archives until interrupted (Ctrl-C)
    Watch {
        /// Directory to watch (defaults to the configured watch directory)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Seconds between scans
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Inspect or change the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration and resolved directories
    Show,

    /// Remember a directory for future runs
    Set {
        kind: Kind,
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Kind {
    Primary,
    Mirror,
    Watch,
}

impl From<Kind> for DirectoryKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Primary => Self::Primary,
            Kind::Mirror => Self::Mirror,
            Kind::Watch => Self::Watch,
        }
    }
}
