use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chartsync")]
#[command(about = "Mirror Helm charts into an artifact repository", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every chart in the manifest and publish it
    Sync(SyncArgs),
    /// Print the download URL of every chart without fetching it
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    /// Chart manifest (YAML)
    #[arg(short = 'f', long = "config")]
    pub manifest: PathBuf,

    /// Number of parallel workers
    #[arg(short = 'w', long = "worker")]
    pub workers: Option<usize>,

    /// Extra download attempts after a transport failure
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// HTTP timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Only sync this chart
    #[arg(short, long)]
    pub chart: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Chart manifest (YAML)
    #[arg(short = 'f', long = "config")]
    pub manifest: PathBuf,

    /// Only resolve this chart
    #[arg(short, long)]
    pub chart: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub debug: bool,
}
