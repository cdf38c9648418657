use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::fs;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::encoder::{EncodeError, FormatEncoder, ImageEncoder};
use super::format::FormatTag;
use crate::config::ConversionConfig;
use crate::storage::{StorageError, UploadStore, part_path};

/// Conditions under which no output can be produced at all
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("source file is missing or unreadable: {0}")]
    SourceMissing(PathBuf),

    #[error("output directory unavailable: {0}")]
    OutputDir(#[source] StorageError),
}

/// One successfully encoded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedArtifact {
    pub format: FormatTag,
    pub file_name: String,
    pub path: PathBuf,
    pub public_path: String,
    pub size: u64,
}

/// Outcome of converting one upload.
///
/// A format appears in exactly one of the two maps. Only formats in
/// `artifacts` have a file on disk.
#[derive(Debug, Default)]
pub struct ConversionResult {
    pub artifacts: BTreeMap<FormatTag, ConvertedArtifact>,
    pub failures: BTreeMap<FormatTag, String>,
}

impl ConversionResult {
    /// True when no target format succeeded
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Paths of every produced artifact
    pub fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.values().map(|a| a.path.clone()).collect()
    }
}

/// Drives a [`FormatEncoder`] over every target format in parallel
#[derive(Clone)]
pub struct Converter {
    encoder: Arc<dyn FormatEncoder>,
    store: UploadStore,
    encode_timeout: Duration,
}

impl Converter {
    pub fn new(encoder: Arc<dyn FormatEncoder>, store: UploadStore, encode_timeout: Duration) -> Self {
        Self {
            encoder,
            store,
            encode_timeout,
        }
    }

    pub fn from_config(store: UploadStore, config: &ConversionConfig) -> Self {
        Self::new(
            Arc::new(ImageEncoder::from_config(config)),
            store,
            config.encode_timeout.as_duration(),
        )
    }

    pub fn targets(&self) -> &'static [FormatTag] {
        &FormatTag::ALL
    }

    /// Convert `source` into every target format as `<stem>-converted.<ext>`.
    ///
    /// Returns once every branch has finished. A failing format never fails
    /// the call; only a missing source or an unusable output directory does.
    pub async fn convert(&self, source: &Path, stem: &str) -> Result<ConversionResult, ConversionError> {
        match fs::metadata(source).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return Err(ConversionError::SourceMissing(source.to_path_buf())),
        }

        self.store.ensure_dir().await.map_err(ConversionError::OutputDir)?;

        let mut branches = JoinSet::new();
        for &format in self.targets() {
            let file_name = format.artifact_name(stem);
            let branch = Branch {
                encoder: Arc::clone(&self.encoder),
                source: source.to_path_buf(),
                dest: self.store.root().join(&file_name),
                timeout: self.encode_timeout,
                format,
            };
            let public_path = self.store.public_path(&file_name);

            branches.spawn(async move {
                let outcome = branch.run().await.map(|size| ConvertedArtifact {
                    format,
                    file_name,
                    path: branch.dest,
                    public_path,
                    size,
                });
                (format, outcome)
            });
        }

        let mut result = ConversionResult::default();
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((format, Ok(artifact))) => {
                    debug!(%format, size = artifact.size, "Format converted");
                    result.artifacts.insert(format, artifact);
                }
                Ok((format, Err(err))) => {
                    warn!(%format, source = %source.display(), error = %err, "Format conversion failed");
                    result.failures.insert(format, err.to_string());
                }
                Err(err) => {
                    warn!(error = %err, "Conversion branch aborted");
                }
            }
        }

        // A branch that died without reporting still counts as failed
        for &format in self.targets() {
            if !result.artifacts.contains_key(&format) && !result.failures.contains_key(&format) {
                discard(&self.store.root().join(format.artifact_name(stem))).await;
                result.failures.insert(format, "conversion aborted".to_string());
            }
        }

        info!(
            source = %source.display(),
            succeeded = result.artifacts.len(),
            failed = result.failures.len(),
            "Conversion finished"
        );

        Ok(result)
    }
}

struct Branch {
    encoder: Arc<dyn FormatEncoder>,
    source: PathBuf,
    dest: PathBuf,
    timeout: Duration,
    format: FormatTag,
}

impl Branch {
    /// Encode within the timeout, then write through a `.part` file and
    /// return the final size.
    ///
    /// Only the encode is bounded. Once bytes exist the write runs to
    /// completion, so a timeout can never race a pending write or rename.
    async fn run(&self) -> Result<u64, EncodeError> {
        let bytes = tokio::time::timeout(self.timeout, self.encoder.encode(&self.source, self.format))
            .await
            .map_err(|_| EncodeError::Timeout(self.timeout))??;
        if bytes.is_empty() {
            return Err(EncodeError::EmptyOutput(self.format));
        }

        let tmp = part_path(&self.dest);
        let outcome = self.write_artifact(&tmp, &bytes).await;

        if outcome.is_err() {
            discard(&tmp).await;
            discard(&self.dest).await;
        }

        outcome
    }

    async fn write_artifact(&self, tmp: &Path, bytes: &[u8]) -> Result<u64, EncodeError> {
        fs::write(tmp, bytes).await?;
        fs::rename(tmp, &self.dest).await?;

        Ok(fs::metadata(&self.dest).await?.len())
    }
}

async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed unfinished artifact"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "Failed to remove unfinished artifact"),
    }
}
