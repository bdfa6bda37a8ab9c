//! CLI argument parsing for blobsync

use crate::config::Config;
use crate::error::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// blobsync - rsync-style delta synchronization against block-blob storage
#[derive(Parser, Debug)]
#[command(name = "blobsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file path
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend to talk to
    #[arg(long, value_enum, default_value_t = Backend::Local, global = true)]
    pub backend: Backend,

    /// Root directory of the local backend [default: from config, else "."]
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Block size for signatures and staged chunks (e.g. 10000, 64K, 4M)
    #[arg(long, global = true, value_parser = parse_block_size)]
    pub block_size: Option<usize>,

    /// Number of parallel transfers (0 = auto, 1 = sequential)
    #[arg(short = 'j', long, global = true)]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Directory tree on the local filesystem
    Local,
    /// Azure Blob Storage (AZURE_STORAGE_ACCOUNT / AZURE_STORAGE_ACCESS_KEY)
    Azure,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a local file, sending only blocks the remote object lacks
    Upload(TransferArgs),

    /// Download an object, fetching only blocks the local file lacks
    Download(TransferArgs),

    /// Generate a signature file for a local file
    Sign(SignArgs),

    /// Report what an upload of one local file over another would transfer
    Compare(CompareArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the upload and download commands
#[derive(Parser, Debug)]
pub struct TransferArgs {
    /// Local file
    pub file: PathBuf,

    /// Container holding the object
    #[arg(long)]
    pub container: String,

    /// Object name [default: the local file name]
    #[arg(long)]
    pub blob: Option<String>,
}

impl TransferArgs {
    /// Object name, defaulting to the local file name
    pub fn object_name(&self) -> Option<String> {
        self.blob.clone().or_else(|| {
            self.file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
    }
}

/// Arguments for the sign command
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// File to generate a signature for
    pub file: PathBuf,

    /// Output signature file path (default: <file>.sig)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the compare command
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// File the signature is built from
    pub baseline: PathBuf,

    /// File searched against the baseline signature
    pub updated: PathBuf,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show the configuration file path
    #[arg(long)]
    pub path: bool,

    /// Create default configuration file
    #[arg(long)]
    pub init: bool,
}

impl Cli {
    /// Load the config file, then apply command-line overrides
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        // CLI args override config file
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(ref root) = self.root {
            config.storage_root = Some(root.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_block_size(s: &str) -> std::result::Result<usize, String> {
    let size = Config::parse_size(s).map_err(|e| e.to_string())?;
    match usize::try_from(size) {
        Ok(0) => Err("block size must be greater than zero".to_string()),
        Ok(size) => Ok(size),
        Err(_) => Err(format!("block size too large: {}", s)),
    }
}
