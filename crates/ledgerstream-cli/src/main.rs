//! ledgerstream CLI (ledgerctl)
//!
//! Command-line tool for reading exported ledgers from an object store.
//!
//! ## Quick Start
//!
//! ```bash
//! # Stream ledgers 1000..=2000 from S3
//! ledgerctl --url s3://ledger-exports/pubnet fetch --from 1000 --to 2000
//!
//! # Follow the tip of an unbounded range, stopping after 50 ledgers
//! ledgerctl fetch --from 5000000 --limit 50 --output json
//!
//! # Which object holds a ledger?
//! ledgerctl key 123456
//!
//! # Show the schema recorded in the datastore manifest
//! ledgerctl schema
//!
//! # Write the manifest for a new datastore
//! ledgerctl publish
//! ```
//!
//! ## Configuration
//!
//! Settings are read from a TOML file (`--config`, default `ledgerctl.toml`).
//! The datastore URL may also come from `--url` or `LEDGERSTREAM_URL`.
//! Logging is controlled with `RUST_LOG`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledgerstream_backend::{BufferedStorageBackend, LedgerBackend};
use ledgerstream_core::{Ledger, Range};
use ledgerstream_storage::{publish_config, DataStore};
use std::path::PathBuf;
use std::sync::Arc;

mod config;

use config::{Config, OutputFormat};

#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(about = "Read exported ledgers from object storage", long_about = None)]
struct Cli {
    /// Config file
    #[arg(
        short,
        long,
        env = "LEDGERCTL_CONFIG",
        default_value = "ledgerctl.toml"
    )]
    config: PathBuf,

    /// Datastore URL, overriding the config file
    #[arg(short, long, env = "LEDGERSTREAM_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read ledgers in order
    Fetch {
        /// First ledger to read
        #[arg(short, long)]
        from: u32,
        /// Last ledger to read (omit to follow new ledgers)
        #[arg(short, long)]
        to: Option<u32>,
        /// Stop after this many ledgers
        #[arg(short, long)]
        limit: Option<u64>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
        /// Print Prometheus metrics to stderr when done
        #[arg(long)]
        metrics: bool,
    },
    /// Print the object key holding a ledger
    Key {
        /// Ledger sequence
        sequence: u32,
    },
    /// Print the schema the datastore is read with
    Schema,
    /// Write the datastore manifest if it is missing
    Publish,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config, cli.url.as_deref())?;

    match cli.command {
        Commands::Fetch {
            from,
            to,
            limit,
            output,
            metrics,
        } => {
            if metrics {
                ledgerstream_observability::init_metrics();
            }
            let range = match to {
                Some(to) => Range::bounded(from, to)?,
                None => Range::unbounded(from),
            };
            handle_fetch(&config, range, limit, output).await?;
            if metrics {
                eprint!("{}", ledgerstream_observability::gather_text()?);
            }
        }
        Commands::Key { sequence } => {
            let store = open_datastore(&config).await?;
            println!("{}", store.schema().object_key(sequence));
        }
        Commands::Schema => {
            let store = open_datastore(&config).await?;
            println!("{}", serde_json::to_string_pretty(store.schema())?);
        }
        Commands::Publish => {
            let store = config
                .datastore
                .connect()
                .context("Failed to connect to datastore")?;
            let (manifest, created) = publish_config(&store, &config.datastore).await?;
            if created {
                println!("Created manifest:");
            } else {
                println!("Manifest already present:");
            }
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
    }

    Ok(())
}

async fn open_datastore(config: &Config) -> Result<Arc<dyn DataStore>> {
    let store = config
        .datastore
        .open()
        .await
        .with_context(|| format!("Failed to open datastore {}", config.datastore.url))?;
    Ok(Arc::new(store))
}

/// Stream ledgers of `range` to stdout until the range or `limit` is exhausted
/// or Ctrl-C is pressed.
async fn handle_fetch(
    config: &Config,
    range: Range,
    limit: Option<u64>,
    output: OutputFormat,
) -> Result<()> {
    let store = open_datastore(config).await?;
    let backend = BufferedStorageBackend::new(config.buffer.clone(), store)?;
    backend.prepare_range(range).await?;

    let last = range.to().map_or(u32::MAX as u64, |to| to as u64);
    let count = limit.unwrap_or(u64::MAX).min(last - range.from() as u64 + 1);

    let result = tokio::select! {
        result = read_ledgers(&backend, range.from(), count, output) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, closing backend");
            Ok(())
        }
    };

    backend.close().await?;
    result
}

async fn read_ledgers(
    backend: &BufferedStorageBackend,
    from: u32,
    count: u64,
    output: OutputFormat,
) -> Result<()> {
    for offset in 0..count {
        let sequence = from + offset as u32;
        let ledger = backend
            .get_ledger(sequence)
            .await
            .with_context(|| format!("Failed to read ledger {}", sequence))?;
        print_ledger(&ledger, output)?;
    }
    Ok(())
}

fn print_ledger(ledger: &Ledger, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => println!("{}\t{} bytes", ledger.sequence, ledger.payload.len()),
        OutputFormat::Json => {
            let line = serde_json::json!({
                "sequence": ledger.sequence,
                "size": ledger.payload.len(),
            });
            println!("{}", line);
        }
    }
    Ok(())
}
