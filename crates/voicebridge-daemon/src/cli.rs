use std::path::PathBuf;

use clap::Parser;

/// voicebridge: relay voice chat between groups that share a secret.
#[derive(Parser, Debug)]
#[command(name = "voicebridge", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Registry file with `[[registration]]` tables.
    #[arg(short, long)]
    pub registry: Option<PathBuf>,

    /// Log directive override (e.g. "voicebridge=debug").
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print the effective config as JSON and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Read JSON control commands from stdin, one per line.
    #[arg(long)]
    pub stdin_control: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
