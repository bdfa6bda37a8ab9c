//! Configuration management for blobsync

use crate::delta::SearchOptions;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::transfer::TransferOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default block size for signatures and staged chunks
pub const DEFAULT_BLOCK_SIZE: usize = 10_000;

/// Default number of parallel jobs (0 = auto)
pub const DEFAULT_JOBS: usize = 0;

/// Default bound on queued chunks
pub const DEFAULT_QUEUE_DEPTH: usize = 100;

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ==================== Block Layout ====================

    /// Block size for signature generation and staging
    pub block_size: usize,

    // ==================== Search Heuristics ====================

    /// Ranges at most this long are only scanned when exactly one block long
    pub search_min_range_len: u64,

    /// Block sizes at most this large are only tried against exact-length ranges
    pub search_min_block_size: usize,

    /// Download searches ignore block sizes at most this large
    pub download_min_block_size: usize,

    // ==================== Transfer ====================

    /// Number of parallel transfer workers (0 = auto-detect CPU count, 1 = sequential)
    pub jobs: usize,

    /// Bound on chunks queued for workers
    pub queue_depth: usize,

    /// Maximum retries for failed store requests
    pub max_retries: u32,

    /// Retry delay base in milliseconds
    pub retry_delay_ms: u64,

    // ==================== Naming ====================

    /// Suffix of the reconstructed file before it replaces the original
    pub staging_suffix: String,

    /// Suffix of the signature object stored next to each object
    pub signature_suffix: String,

    /// Also write the downloaded object's signature next to the local file
    pub local_signature: bool,

    // ==================== Storage ====================

    /// Root directory of the local backend
    pub storage_root: Option<PathBuf>,

    /// Azure storage account (falls back to AZURE_STORAGE_ACCOUNT)
    pub account: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,

            search_min_range_len: 1000,
            search_min_block_size: 100,
            download_min_block_size: 100,

            jobs: DEFAULT_JOBS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_retries: 3,
            retry_delay_ms: 1000,

            staging_suffix: ".new".to_string(),
            signature_suffix: ".sig".to_string(),
            local_signature: false,

            storage_root: None,
            account: None,
        }
    }
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io("reading config", e))?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("creating config dir", e))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("serializing config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| Error::io("writing config", e))?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("blobsync").join("config.toml"))
            .ok_or_else(|| Error::config("could not determine config directory"))
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::config("block_size must be greater than zero"));
        }
        if self.queue_depth == 0 {
            return Err(Error::config("queue_depth must be greater than zero"));
        }
        if self.staging_suffix.is_empty() || self.signature_suffix.is_empty() {
            return Err(Error::config("staging_suffix and signature_suffix must not be empty"));
        }
        Ok(())
    }

    /// Get the effective number of jobs (resolves 0 to CPU count)
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }

    /// Search heuristics for the delta engine
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            min_range_len: self.search_min_range_len,
            min_block_size: self.search_min_block_size,
            download_min_block_size: self.download_min_block_size,
        }
    }

    /// Worker pool settings for a transfer session
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.block_size,
            workers: self.effective_jobs(),
            queue_depth: self.queue_depth,
            retry: RetryConfig::from(self),
        }
    }

    /// Parse a size string like "100", "100K", "10M" into bytes
    pub fn parse_size(s: &str) -> Result<u64> {
        let s = s.trim().to_uppercase();
        if s.is_empty() {
            return Ok(0);
        }

        let units: [(&str, u64); 8] = [
            ("KB", 1024),
            ("MB", 1024 * 1024),
            ("GB", 1024 * 1024 * 1024),
            ("TB", 1024 * 1024 * 1024 * 1024),
            ("K", 1024),
            ("M", 1024 * 1024),
            ("G", 1024 * 1024 * 1024),
            ("T", 1024 * 1024 * 1024 * 1024),
        ];

        let (num_part, multiplier) = units
            .iter()
            .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|n| (n, *mult)))
            .unwrap_or((s.as_str(), 1));

        let num: u64 = num_part
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("invalid size value: {}", s)))?;

        num.checked_mul(multiplier)
            .ok_or_else(|| Error::config(format!("size value too large: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.block_size, 10_000);
        assert_eq!(config.jobs, 0);
        assert_eq!(config.staging_suffix, ".new");
        assert_eq!(config.signature_suffix, ".sig");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_jobs() {
        let mut config = Config::default();
        assert!(config.effective_jobs() > 0);

        config.jobs = 4;
        assert_eq!(config.effective_jobs(), 4);
        assert_eq!(config.transfer_options().workers, 4);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "block_size = 4096\njobs = 1\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.search_min_range_len, 1000);
        assert_eq!(config.search_options().download_min_block_size, 100);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = Config {
            block_size: 2048,
            local_signature: true,
            storage_root: Some(PathBuf::from("/srv/blobs")),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "block_size = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(Config::parse_size("10000").unwrap(), 10_000);
        assert_eq!(Config::parse_size("64k").unwrap(), 64 * 1024);
        assert_eq!(Config::parse_size("4MB").unwrap(), 4 * 1024 * 1024);
        assert!(Config::parse_size("ten").is_err());
    }
}
