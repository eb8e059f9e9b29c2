//! Uses clap to define the CLI interface declaratively.
use std::path::PathBuf;

use clap::Parser;
use evpoll::BackendKind;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// watch configuration (TOML, or YAML with a .yaml/.yml extension)
    #[arg(short, default_value = "evpoll.toml", long, value_name = "FILE")]
    pub config: PathBuf,

    /// override the backend named in the configuration
    #[arg(short, long, value_name = "poll|epoll")]
    pub backend: Option<BackendKind>,

    /// stop after this many passes, 0 runs forever
    #[arg(short = 'n', long)]
    pub iterations: Option<u64>,

    /// print ready descriptors as JSON lines
    #[arg(long)]
    pub json: bool,

    /// override the configured log level
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<log::LevelFilter>,
}
