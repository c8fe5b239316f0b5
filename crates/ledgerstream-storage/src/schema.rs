//! Object Key Schema
//!
//! Ledgers are exported in files of `ledgers_per_file` consecutive ledgers,
//! and files are grouped into partition directories of `files_per_partition`
//! files. Every boundary is aligned to a multiple of its size.
//!
//! ## Key Layout
//!
//! ```text
//! FFFFFFFF--0-63999/FFFFFFFC--3.lbat
//! └──── partition ─┘└──── file ───┘
//! ```
//!
//! Each component starts with `u32::MAX - start` in upper-case hex, so newer
//! ledgers sort lexicographically before older ones. The partition directory
//! is omitted when `files_per_partition` is 1, and the `-end` suffix of the
//! file name is omitted when a file holds a single ledger.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Extension used when neither the configuration nor the datastore names one
pub const DEFAULT_FILE_EXTENSION: &str = "lbat";

/// How ledger sequences map onto datastore objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreSchema {
    /// Ledgers stored in each object (default: 1)
    #[serde(default = "default_ledgers_per_file")]
    pub ledgers_per_file: u32,

    /// Objects grouped under one partition directory (default: 64000)
    #[serde(default = "default_files_per_partition")]
    pub files_per_partition: u32,

    /// File extension, without the leading dot (default: "lbat")
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl Default for DataStoreSchema {
    fn default() -> Self {
        Self {
            ledgers_per_file: default_ledgers_per_file(),
            files_per_partition: default_files_per_partition(),
            file_extension: default_file_extension(),
        }
    }
}

fn default_ledgers_per_file() -> u32 {
    1
}

fn default_files_per_partition() -> u32 {
    64000
}

fn default_file_extension() -> String {
    DEFAULT_FILE_EXTENSION.to_string()
}

impl DataStoreSchema {
    pub fn new(ledgers_per_file: u32, files_per_partition: u32) -> Self {
        Self {
            ledgers_per_file,
            files_per_partition,
            file_extension: default_file_extension(),
        }
    }

    pub fn with_file_extension(mut self, extension: impl Into<String>) -> Self {
        self.file_extension = extension.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledgers_per_file == 0 {
            return Err(Error::InvalidSchema(
                "ledgers_per_file must be greater than 0".to_string(),
            ));
        }
        if self.files_per_partition == 0 {
            return Err(Error::InvalidSchema(
                "files_per_partition must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// First sequence stored in the object holding `sequence`.
    pub fn start_boundary(&self, sequence: u32) -> u32 {
        let lpf = self.ledgers_per_file.max(1);
        (sequence / lpf) * lpf
    }

    /// Last sequence stored in the object holding `sequence`.
    pub fn end_boundary(&self, sequence: u32) -> u32 {
        self.start_boundary(sequence)
            .saturating_add(self.ledgers_per_file.max(1) - 1)
    }

    /// Object key for the file holding `sequence`.
    pub fn object_key(&self, sequence: u32) -> String {
        let file_start = self.start_boundary(sequence);
        let file_end = self.end_boundary(sequence);

        let mut key = String::new();

        if self.files_per_partition > 1 {
            let partition_size =
                self.ledgers_per_file.max(1) as u64 * self.files_per_partition as u64;
            let partition_start = (sequence as u64 / partition_size) * partition_size;
            let partition_end = (partition_start + partition_size - 1).min(u32::MAX as u64);
            key.push_str(&format!(
                "{:08X}--{}-{}/",
                u32::MAX - partition_start as u32,
                partition_start,
                partition_end
            ));
        }

        key.push_str(&format!("{:08X}--{}", u32::MAX - file_start, file_start));
        if file_start != file_end {
            key.push_str(&format!("-{}", file_end));
        }
        if !self.file_extension.is_empty() {
            key.push('.');
            key.push_str(&self.file_extension);
        }

        key
    }
}
