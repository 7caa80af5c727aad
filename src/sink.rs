//! Per-block artifact persistence.
//!
//! Every block is written to its own file named `tx_block_<number>.<ext>`
//! inside the output directory. The name is derived from the block number the
//! result carries, never from the order results arrive in.
//!
//! Writes go to a hidden temporary file first and are renamed into place, so
//! an artifact either exists complete or not at all.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use alloy_primitives::U256;
use async_trait::async_trait;
use polars::prelude::*;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::OutputFormat;
use crate::schemas::{BlockNumber, BlockResult, TransactionRecord};

const ARTIFACT_PREFIX: &str = "tx_block_";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Destination for completed blocks.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Durably store one block. Returns where it was written.
    async fn persist(&self, block: BlockResult) -> Result<PathBuf, SinkError>;
}

/// Writes one file per block into a directory.
pub struct BlockFileSink {
    dir: PathBuf,
    format: OutputFormat,
    dir_ready: OnceCell<()>,
}

impl BlockFileSink {
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            dir_ready: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn artifact_path(&self, number: BlockNumber) -> PathBuf {
        self.dir.join(artifact_name(number, self.format))
    }

    /// Create the output directory once; concurrent callers wait on the first.
    async fn ensure_dir(&self) -> Result<(), SinkError> {
        self.dir_ready
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.dir).await?;
                debug!("Output directory ready: {:?}", self.dir);
                Ok::<(), SinkError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResultSink for BlockFileSink {
    async fn persist(&self, block: BlockResult) -> Result<PathBuf, SinkError> {
        self.ensure_dir().await?;

        let name = artifact_name(block.number, self.format);
        let path = self.dir.join(&name);
        let tmp_path = self.dir.join(format!(".{}.tmp", name));
        let format = self.format;

        let dest = path.clone();
        tokio::task::spawn_blocking(move || {
            write_atomically(&block.transactions, format, &tmp_path, &dest)
        })
        .await??;

        Ok(path)
    }
}

/// File name for a block's artifact.
pub fn artifact_name(number: BlockNumber, format: OutputFormat) -> String {
    format!("{}{}.{}", ARTIFACT_PREFIX, number, format.extension())
}

/// Inverse of [`artifact_name`]. Only canonical decimal names are accepted.
pub fn parse_artifact_name(name: &str) -> Option<(BlockNumber, OutputFormat)> {
    let rest = name.strip_prefix(ARTIFACT_PREFIX)?;
    let (digits, ext) = rest.rsplit_once('.')?;
    let format = OutputFormat::from_extension(ext)?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    let number = U256::from_str_radix(digits, 10).ok()?;
    Some((number, format))
}

/// An artifact found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub number: BlockNumber,
    pub format: OutputFormat,
    pub path: PathBuf,
}

/// List all block artifacts in `dir`, sorted by block number.
pub fn scan_artifacts(dir: &Path) -> Result<Vec<Artifact>, SinkError> {
    let mut artifacts: Vec<Artifact> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let (number, format) = parse_artifact_name(name.to_str()?)?;
            Some(Artifact {
                number,
                format,
                path: entry.path(),
            })
        })
        .collect();
    artifacts.sort_by(|a, b| {
        a.number
            .cmp(&b.number)
            .then_with(|| a.format.extension().cmp(&b.format.extension()))
    });
    Ok(artifacts)
}

fn write_atomically(
    records: &[TransactionRecord],
    format: OutputFormat,
    tmp_path: &Path,
    dest: &Path,
) -> Result<(), SinkError> {
    let result = (|| -> Result<(), SinkError> {
        let mut writer = BufWriter::new(File::create(tmp_path)?);
        encode_records(records, format, &mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        std::fs::rename(tmp_path, dest)?;
        Ok(())
    })();

    if result.is_err() {
        if let Err(e) = std::fs::remove_file(tmp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove temporary file {:?}: {}", tmp_path, e);
            }
        }
    }
    result
}

fn encode_records<W: Write>(
    records: &[TransactionRecord],
    format: OutputFormat,
    writer: &mut W,
) -> Result<(), SinkError> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, records)?;
        }
        OutputFormat::Parquet => {
            let mut df = records_frame(records)?;
            ParquetWriter::new(writer)
                .with_compression(ParquetCompression::Zstd(None))
                .finish(&mut df)?;
        }
    }
    Ok(())
}

fn records_frame(records: &[TransactionRecord]) -> Result<DataFrame, PolarsError> {
    let hashes: Vec<&str> = records.iter().map(|r| r.hash.as_str()).collect();
    let senders: Vec<&str> = records.iter().map(|r| r.from.as_str()).collect();
    let inputs: Vec<&str> = records.iter().map(|r| r.input.as_str()).collect();
    let nonces: Vec<&str> = records.iter().map(|r| r.nonce.as_str()).collect();

    DataFrame::new(vec![
        Column::new("hash".into(), hashes),
        Column::new("from".into(), senders),
        Column::new("input".into(), inputs),
        Column::new("nonce".into(), nonces),
    ])
}

/// Read records back from an artifact.
pub fn read_artifact(path: &Path) -> Result<Vec<TransactionRecord>, SinkError> {
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(OutputFormat::from_extension)
        .unwrap_or(OutputFormat::Json);

    match format {
        OutputFormat::Json => {
            let file = File::open(path)?;
            Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
        }
        OutputFormat::Parquet => {
            let file = File::open(path)?;
            let df = ParquetReader::new(file).finish()?;

            let hashes = df.column("hash")?.str()?;
            let senders = df.column("from")?.str()?;
            let inputs = df.column("input")?.str()?;
            let nonces = df.column("nonce")?.str()?;

            let mut result = Vec::with_capacity(df.height());
            for i in 0..df.height() {
                result.push(TransactionRecord {
                    hash: hashes.get(i).unwrap_or_default().to_string(),
                    from: senders.get(i).unwrap_or_default().to_string(),
                    input: inputs.get(i).unwrap_or_default().to_string(),
                    nonce: nonces.get(i).unwrap_or_default().to_string(),
                });
            }
            Ok(result)
        }
    }
}
