//! Save directory scanning.
//!
//! Lists a single save directory, decodes every recognized save file one at
//! a time and reports the records the caller does not know yet. Files are
//! decoded sequentially so we never hold more than one handle on files the
//! game may be writing.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::decoder::{DecodeError, SaveDecoder};
use crate::types::{DecodeFailure, SaveId, SaveMetadata, SaveRecord, ScanResult};

/// Structural scan failures. Per-file problems never end up here.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Cannot list save directory {path}: {source}")]
    ListFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How often and how long to wait when a save is locked by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first locked failure.
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Scans a save directory through a [`SaveDecoder`].
#[derive(Clone)]
pub struct SaveScanner {
    decoder: Arc<dyn SaveDecoder>,
    /// Lowercase extensions without the leading dot.
    extensions: Vec<String>,
    retry: RetryPolicy,
}

impl SaveScanner {
    pub fn new<I, S>(decoder: Arc<dyn SaveDecoder>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            decoder,
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether `path` carries one of the recognized save extensions.
    pub fn is_candidate(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Scan `directory` and collect saves for which `is_known` returns false.
    ///
    /// A missing directory is an empty listing. Decode failures are collected
    /// in [`ScanResult::failures`] and never abort the pass.
    pub async fn scan<F>(&self, directory: &Path, is_known: F) -> Result<ScanResult, ScanError>
    where
        F: Fn(&SaveId) -> bool,
    {
        let candidates = self.list_candidates(directory).await?;
        crate::debug_event!(
            "scanner",
            "listing",
            "{} candidates in {}",
            candidates.len(),
            directory.display()
        );

        let mut result = ScanResult::default();

        for path in candidates {
            let Some(id) = SaveId::from_path(&path) else {
                continue;
            };

            match self.decode_with_retry(&path).await {
                Ok(metadata) => {
                    if !is_known(&id) {
                        crate::debug_event!("scanner", "new save", "{id}");
                        result.new_records.push(SaveRecord::new(id, path, metadata));
                    }
                }
                Err(e) => {
                    tracing::warn!("[scanner] failed to read {}: {e}", path.display());
                    result.failures.push(DecodeFailure {
                        file_name: id.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        crate::log_event!(
            "scanner",
            "scanned",
            "{} new, {} failed in {}",
            result.new_records.len(),
            result.failures.len(),
            directory.display()
        );

        Ok(result)
    }

    async fn list_candidates(&self, directory: &Path) -> Result<Vec<PathBuf>, ScanError> {
        let list_failed = |source: io::Error| ScanError::ListFailed {
            path: directory.to_path_buf(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // The game creates the directory on first save.
                crate::debug_event!("scanner", "missing directory", "{}", directory.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(list_failed(e)),
        };

        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(list_failed)? {
            let path = entry.path();
            if !self.is_candidate(&path) {
                continue;
            }
            // Entries can vanish between listing and stat; skip those.
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => continue,
                Ok(_) => candidates.push(path),
                Err(_) => continue,
            }
        }

        candidates.sort();
        Ok(candidates)
    }

    async fn decode_with_retry(&self, path: &Path) -> Result<SaveMetadata, DecodeError> {
        let mut attempt = 0;
        loop {
            match self.decoder.decode(path).await {
                Err(e) if e.is_locked() && attempt < self.retry.retries => {
                    attempt += 1;
                    crate::debug_event!(
                        "scanner",
                        "locked, retrying",
                        "{} (attempt {attempt})",
                        path.display()
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                other => return other,
            }
        }
    }
}
