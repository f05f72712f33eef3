use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "carton",
    about = "carton — content-addressed, deduplicating bundle store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store directory (blobs and refs live here).
    #[arg(short, long, global = true, default_value = ".carton")]
    pub store: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Snapshot a directory into a bundle and print the root locator
    Create(CreateArgs),
    /// Extract a locator or ref into a directory
    Extract(ExtractArgs),
    /// Print a bundle's header: tables, packet sizes, compression ratio
    Inspect(InspectArgs),
    /// List refs
    Refs(RefsArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    /// Directory to snapshot.
    pub input: PathBuf,

    /// Publish the root under this ref name (create or update).
    #[arg(short, long)]
    pub r#ref: Option<String>,

    /// Target chunk size in bytes (min/max derived as 1/4 and 4x).
    #[arg(long)]
    pub target_chunk_size: Option<u32>,
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Root locator (`<bundle-hex>:<index>`) or ref name.
    pub target: String,

    /// Output directory.
    pub output: PathBuf,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Bundle id (hex) or locator.
    pub target: String,
}

#[derive(Args)]
pub struct RefsArgs {
    /// Only list refs starting with this prefix.
    pub prefix: Option<String>,
}
