//! blobsync - rsync-style delta synchronization against block-blob storage

use anyhow::Context;
use blobsync::cli::{Backend, Cli, Commands, ConfigArgs, TransferArgs};
use blobsync::config::Config;
use blobsync::format;
use blobsync::storage::StorageBackend;
use blobsync::sync;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json);

    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Received Ctrl+C, shutting down...");
            anyhow::bail!("interrupted")
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Upload(ref args) => {
            let config = cli.to_config()?;
            let store = open_store(cli.backend, &config)?;
            let object = object_name(args)?;

            tracing::info!(
                file = %args.file.display(),
                container = %args.container,
                object = %object,
                backend = store.name(),
                "Starting upload"
            );

            let started = Instant::now();
            let result = sync::upload(&args.file, &args.container, &object, &store, &config).await?;
            println!("{}", format::format_upload(&result, started.elapsed()));
        }

        Commands::Download(ref args) => {
            let config = cli.to_config()?;
            let store = open_store(cli.backend, &config)?;
            let object = object_name(args)?;

            tracing::info!(
                file = %args.file.display(),
                container = %args.container,
                object = %object,
                backend = store.name(),
                "Starting download"
            );

            let started = Instant::now();
            let result = sync::download(&args.file, &args.container, &object, &store, &config).await?;
            println!("{}", format::format_download(&result, started.elapsed()));
        }

        Commands::Sign(ref args) => {
            let config = cli.to_config()?;
            tracing::info!(file = %args.file.display(), "Generating signature");

            let (output, sig) = sync::sign_file(&args.file, args.output.as_deref(), &config)?;
            println!(
                "{} ({}, {})",
                output.display(),
                format::format_size(sig.file_size),
                format::format_count(sig.block_count() as u64, "block", "blocks")
            );
        }

        Commands::Compare(ref args) => {
            let config = cli.to_config()?;
            let report = sync::compare_files(&args.baseline, &args.updated, &config)?;
            println!("{}", format::format_compare(&report));
        }

        Commands::Config(ref args) => {
            handle_config_command(&cli, args)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("blobsync=info"),
        1 => EnvFilter::new("blobsync=debug"),
        2 => EnvFilter::new("blobsync=trace"),
        _ => EnvFilter::new("trace"),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn open_store(backend: Backend, config: &Config) -> anyhow::Result<StorageBackend> {
    match backend {
        Backend::Local => {
            let root = config
                .storage_root
                .clone()
                .unwrap_or_else(|| PathBuf::from("."));
            Ok(StorageBackend::local(root))
        }
        Backend::Azure => StorageBackend::azure(config.account.clone()).context("connecting to Azure Blob Storage"),
    }
}

fn object_name(args: &TransferArgs) -> anyhow::Result<String> {
    args.object_name()
        .with_context(|| format!("cannot derive an object name from {}", args.file.display()))
}

fn handle_config_command(cli: &Cli, args: &ConfigArgs) -> anyhow::Result<()> {
    if args.path {
        match Config::default_config_path() {
            Ok(path) => println!("{}", path.display()),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else if args.init {
        let config = Config::default();
        config.save()?;
        println!(
            "Created default configuration at {}",
            Config::default_config_path()?.display()
        );
    } else {
        // Show current config
        let config = cli.to_config()?;
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
