use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hkv", about = "Hash-keyed embedded key/value store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with store settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Treat keys that differ only in case as different keys
    #[arg(long, global = true)]
    pub case_sensitive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a text value under a key
    Set(SetArgs),
    /// Print the value stored under a key
    Get(KeyArgs),
    /// Remove a key
    Remove(KeyArgs),
    /// Show record and index counters
    Stats(StoreArgs),
    /// List every record in the archive
    Dump(DumpArgs),
    /// Check the key hash against its reference value
    VerifyHash,
    /// Copy archive records into another store
    Backup(BackupArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    /// Store path; the extension is ignored
    pub db: PathBuf,
}

#[derive(Args)]
pub struct SetArgs {
    pub db: PathBuf,
    pub key: String,
    pub value: String,
}

#[derive(Args)]
pub struct KeyArgs {
    pub db: PathBuf,
    pub key: String,
}

#[derive(Args)]
pub struct DumpArgs {
    pub db: PathBuf,
    /// Stop after this many records
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct BackupArgs {
    pub db: PathBuf,
    /// Target store path
    pub target: PathBuf,
    /// First record number to copy
    #[arg(long, default_value = "0")]
    pub from: u32,
}
