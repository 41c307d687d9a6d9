use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use skillgate_core::RunMode;

#[derive(Debug, Parser)]
#[command(
    name = "skillgate",
    version,
    about = "Security, quality and routing gate for submitted skill bundles"
)]
pub struct Args {
    /// Library root holding the intake, library and quarantine folders
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Config file (defaults to <root>/skillgate.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Optional git commit hash for tool metadata
    #[arg(long, global = true)]
    pub commit: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan, gate and route every bundle in the intake area
    Route(RunFlags),

    /// Run the security scanner in intake or sweep mode
    Scan {
        #[arg(long, value_enum, default_value_t = ScanMode::Intake)]
        mode: ScanMode,

        #[command(flatten)]
        flags: RunFlags,
    },

    /// List supported categories in priority order
    Taxonomy,
}

#[derive(Debug, clap::Args)]
pub struct RunFlags {
    /// Compute and report outcomes without moving anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write the JSON report to a file instead of stdout
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScanMode {
    /// Full intake pipeline over newly submitted bundles
    Intake,
    /// Re-scan sorted bundles that changed since they were last concluded
    OnChange,
    /// Re-scan every sorted bundle
    Scheduled,
}

impl From<ScanMode> for RunMode {
    fn from(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Intake => RunMode::Intake,
            ScanMode::OnChange => RunMode::OnChangeSweep,
            ScanMode::Scheduled => RunMode::ScheduledSweep,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
