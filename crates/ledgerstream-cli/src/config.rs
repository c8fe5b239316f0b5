//! Configuration management for ledgerctl
//!
//! ```toml
//! [datastore]
//! url = "s3://ledger-exports/pubnet"
//!
//! [datastore.options]
//! aws_region = "us-east-1"
//!
//! [buffer]
//! buffer_size = 200
//! num_workers = 10
//! ```

use anyhow::{Context, Result};
use ledgerstream_backend::BufferedStorageBackendConfig;
use ledgerstream_storage::DataStoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where the ledgers are read from
    pub datastore: DataStoreConfig,

    /// Prefetch settings
    #[serde(default)]
    pub buffer: BufferedStorageBackendConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Load config from `path`, falling back to defaults when it does not exist.
    ///
    /// `url` replaces the datastore URL from the file.
    pub fn load(path: &Path, url: Option<&str>) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<Config>(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            Config::default()
        };

        if let Some(url) = url {
            config.datastore.url = url.to_string();
        }

        anyhow::ensure!(
            !config.datastore.url.is_empty(),
            "No datastore URL: set [datastore].url in {} or pass --url",
            path.display()
        );

        Ok(config)
    }
}
