//! Download history ledger
//!
//! A content-addressed record of finished artifacts. Before every part attempt the
//! executor asks the ledger whether the part is already on disk:
//!
//! - [`LedgerLookup::Complete`] - the recorded file exists at (at least) its recorded size
//! - [`LedgerLookup::Partial`] - the file exists but is smaller than recorded, so the
//!   transfer resumes from the bytes already present
//! - [`LedgerLookup::Absent`] - never recorded, or the recorded file is gone (the entry is
//!   purged and the pruned ledger persisted before returning)
//!
//! The ledger is one JSON object on disk, rewritten atomically on every mutation.

use crate::error::{Error, Result};
use crate::types::MediaInfo;
use crate::utils::{file_size, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One finished artifact
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Video the part belongs to
    pub source_id: String,
    /// 1-based part index
    pub part: u32,
    /// Raw (unfiltered) title the key was computed from
    pub title: String,
    /// Final location of the artifact
    pub path: PathBuf,
    /// Size of the artifact when it was recorded
    pub size: u64,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Uploader display name
    #[serde(default)]
    pub uploader: Option<String>,
    /// Upload date (`YYYYMMDD`)
    #[serde(default)]
    pub upload_date: Option<String>,
    /// When the entry was written
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// New entry for a finished part, stamped with the current time
    pub fn new(
        source_id: impl Into<String>,
        part: u32,
        title: impl Into<String>,
        path: impl Into<PathBuf>,
        size: u64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            part,
            title: title.into(),
            path: path.into(),
            size,
            duration: None,
            uploader: None,
            upload_date: None,
            recorded_at: Utc::now(),
        }
    }

    /// Copy duration, uploader and upload date from remote metadata
    pub fn with_media(mut self, info: &MediaInfo) -> Self {
        self.duration = info.duration;
        self.uploader = info.uploader.clone();
        self.upload_date = info.upload_date.clone();
        self
    }

    /// Ledger key of this entry
    pub fn key(&self) -> String {
        HistoryLedger::key(&self.source_id, self.part, &self.title)
    }
}

/// Result of a ledger lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerLookup {
    /// Nothing usable on disk
    Absent,
    /// Artifact finished and intact
    Complete(PathBuf),
    /// Artifact present but shorter than recorded
    Partial {
        /// The truncated artifact
        path: PathBuf,
        /// Bytes currently on disk
        size: u64,
        /// Bytes recorded when the artifact was finished
        expected: u64,
    },
}

/// Durable, content-addressed record of finished artifacts
pub struct HistoryLedger {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, HistoryEntry>>,
}

impl HistoryLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened download history");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Stable key for a part: lowercase hex MD5 of `"{source_id}_p{part}_{title}"`
    pub fn key(source_id: &str, part: u32, title: &str) -> String {
        format!(
            "{:x}",
            md5::compute(format!("{source_id}_p{part}_{title}").as_bytes())
        )
    }

    /// Check whether the artifact recorded under `key` is still usable
    ///
    /// An entry whose file has disappeared is removed and the ledger persisted before
    /// `Absent` is returned, so the same key is never reported as cached again.
    pub async fn lookup(&self, key: &str) -> Result<LedgerLookup> {
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get(key) else {
            return Ok(LedgerLookup::Absent);
        };

        let Some(actual) = file_size(&entry.path).await else {
            tracing::info!(
                key,
                path = %entry.path.display(),
                "Recorded artifact is gone, purging history entry"
            );
            entries.remove(key);
            write_json_atomic(&self.path, &*entries).await?;
            return Ok(LedgerLookup::Absent);
        };

        match check_integrity(entry, actual) {
            Ok(()) => Ok(LedgerLookup::Complete(entry.path.clone())),
            Err(Error::IntegrityMismatch {
                path,
                expected,
                actual,
            }) => {
                tracing::info!(
                    key,
                    path = %path.display(),
                    expected,
                    actual,
                    "Recorded artifact is truncated, will resume"
                );
                Ok(LedgerLookup::Partial {
                    path,
                    size: actual,
                    expected,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Insert or replace the entry for a finished part
    pub async fn record(&self, entry: HistoryEntry) -> Result<()> {
        let key = entry.key();
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.clone(), entry);

        if let Err(e) = write_json_atomic(&self.path, &*entries).await {
            match previous {
                Some(prev) => entries.insert(key, prev),
                None => entries.remove(&key),
            };
            return Err(e);
        }

        tracing::debug!(key = %key, "Recorded download history entry");
        Ok(())
    }

    /// Entry stored under `key`, without checking the file system
    pub async fn get(&self, key: &str) -> Option<HistoryEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Number of recorded entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the ledger has no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

fn check_integrity(entry: &HistoryEntry, actual: u64) -> Result<()> {
    if actual < entry.size {
        return Err(Error::IntegrityMismatch {
            path: entry.path.clone(),
            expected: entry.size,
            actual,
        });
    }
    Ok(())
}
