//! Configuration management for the block scanner.
//!
//! Supports loading from environment variables, config files, and CLI arguments.

use serde::{Deserialize, Serialize};
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ledger RPC settings
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Concurrency settings for the block scan
    #[serde(default)]
    pub scan: ScanConfig,

    /// Where and how per-block artifacts are written
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Client-side request quota. Unlimited when absent.
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_second: None,
        }
    }
}

impl RpcConfig {
    pub fn quota(&self) -> Option<NonZeroU32> {
        self.requests_per_second.and_then(NonZeroU32::new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum number of blocks being fetched at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum number of transaction detail requests in flight per block
    #[serde(default = "default_transaction_fanout")]
    pub transaction_fanout: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            transaction_fanout: default_transaction_fanout(),
        }
    }
}

impl ScanConfig {
    /// Validate scan configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be > 0");
        }
        if self.transaction_fanout == 0 {
            anyhow::bail!("transaction_fanout must be > 0");
        }
        Ok(())
    }

    pub fn concurrency_limit(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.concurrency).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn fanout_limit(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.transaction_fanout).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
        }
    }
}

/// Encoding of the per-block artifacts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON array of records
    #[default]
    Json,
    /// Zstd-compressed Parquet table
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Parquet => "parquet",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "json" => Some(OutputFormat::Json),
            "parquet" => Some(OutputFormat::Parquet),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

// Default value functions
fn default_rpc_url() -> String {
    "https://eth.llamarpc.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    5
}

fn default_transaction_fanout() -> usize {
    16
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            scan: ScanConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a TOML config file with environment overrides
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = ::toml::from_str(&contents)?;

        // Environment variables override file settings
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LEDGER_RPC_URL") {
            self.rpc.url = url;
        }
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.url.trim().is_empty() {
            anyhow::bail!("rpc.url must not be empty");
        }
        self.scan.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.scan.concurrency, 5);
        assert_eq!(config.scan.transaction_fanout, 16);
        assert_eq!(config.output.dir, PathBuf::from("output"));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.rpc.quota().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [scan]
            concurrency = 2

            [output]
            format = "parquet"
            "#,
        )
        .unwrap();
        assert_eq!(config.scan.concurrency, 2);
        assert_eq!(config.scan.transaction_fanout, 16);
        assert_eq!(config.output.format, OutputFormat::Parquet);
        assert_eq!(config.rpc.url, "https://eth.llamarpc.com");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = PipelineConfig::default();
        config.scan.concurrency = 0;
        assert!(config.validate().is_err());

        config.scan.concurrency = 1;
        config.scan.transaction_fanout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_quota_means_unlimited() {
        let rpc = RpcConfig {
            requests_per_second: Some(0),
            ..RpcConfig::default()
        };
        assert!(rpc.quota().is_none());
    }

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::from_extension("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_extension("parquet"), Some(OutputFormat::Parquet));
        assert_eq!(OutputFormat::from_extension("csv"), None);
        assert_eq!(OutputFormat::Parquet.to_string(), "parquet");
    }
}
