//! Shared test helpers: fake capabilities and downloader construction.

use crate::config::Config;
use crate::downloader::AudioDownloader;
use crate::error::{Error, Result};
use crate::media::{AcquireRequest, AcquiredArtifact, AudioTags, MediaSource, TagWriter};
use crate::types::{CollectionItem, MediaInfo, PartLocator};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Scripted media source.
///
/// Videos have a configurable page count; collections a fixed member list. Transfers
/// write `artifact_size` bytes named after the part title, or append the missing bytes
/// when resuming.
pub(crate) struct FakeSource {
    parts: HashMap<String, u32>,
    collections: HashMap<(String, String), Vec<CollectionItem>>,
    failures: Mutex<HashMap<(String, u32), u32>>,
    permanent: HashSet<(String, u32)>,
    thumbnail: Option<String>,
    stall: bool,
    progress_steps: Vec<f32>,
    artifact_size: u64,
    attempts: Mutex<Vec<PartLocator>>,
    requests: Mutex<Vec<AcquireRequest>>,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self {
            parts: HashMap::new(),
            collections: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            permanent: HashSet::new(),
            thumbnail: None,
            stall: false,
            progress_steps: vec![25.0, 50.0, 75.0],
            artifact_size: 64,
            attempts: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeSource {
    pub(crate) fn with_parts(mut self, video_id: &str, parts: u32) -> Self {
        self.parts.insert(video_id.to_string(), parts);
        self
    }

    pub(crate) fn with_collection(mut self, owner: &str, season: &str, members: &[(&str, &str)]) -> Self {
        let items = members
            .iter()
            .map(|(video_id, title)| CollectionItem {
                video_id: video_id.to_string(),
                title: title.to_string(),
            })
            .collect();
        self.collections
            .insert((owner.to_string(), season.to_string()), items);
        self
    }

    /// The next `times` transfers of the part fail with a transient error
    pub(crate) fn fail_times(self, video_id: &str, page: u32, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((video_id.to_string(), page), times);
        self
    }

    /// Every transfer of the part fails with a non-retryable error
    pub(crate) fn fail_permanently(mut self, video_id: &str, page: u32) -> Self {
        self.permanent.insert((video_id.to_string(), page));
        self
    }

    pub(crate) fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    /// Transfers never finish
    pub(crate) fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    pub(crate) fn with_progress(mut self, steps: &[f32]) -> Self {
        self.progress_steps = steps.to_vec();
        self
    }

    /// Every transfer attempt, in order
    pub(crate) fn attempts(&self) -> Vec<PartLocator> {
        self.attempts.lock().unwrap().clone()
    }

    /// Every acquisition request, in order
    pub(crate) fn requests(&self) -> Vec<AcquireRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Metadata title of a part
    fn part_title(video_id: &str, page: u32) -> String {
        format!("{video_id} P{page}")
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn count_parts(&self, video_id: &str) -> Result<u32> {
        Ok(self.parts.get(video_id).copied().unwrap_or(1))
    }

    async fn list_collection(&self, owner_id: &str, season_id: &str) -> Result<Vec<CollectionItem>> {
        self.collections
            .get(&(owner_id.to_string(), season_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::ExternalTool(format!("no collection {owner_id}/{season_id}")))
    }

    async fn fetch_metadata(&self, locator: &PartLocator) -> Result<MediaInfo> {
        Ok(MediaInfo {
            title: Self::part_title(&locator.video_id, locator.page),
            thumbnail: self.thumbnail.clone(),
            duration: Some(60.0),
            uploader: Some("uploader".to_string()),
            upload_date: Some("20240102".to_string()),
        })
    }

    async fn acquire(
        &self,
        request: &AcquireRequest,
        progress: mpsc::Sender<f32>,
    ) -> Result<AcquiredArtifact> {
        let key = (request.locator.video_id.clone(), request.locator.page);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(request.locator.clone());
            attempts.iter().filter(|l| **l == request.locator).count()
        };
        self.requests.lock().unwrap().push(request.clone());

        if self.permanent.contains(&key) {
            return Err(Error::ExternalTool(format!(
                "unsupported media {} p{}",
                key.0, key.1
            )));
        }
        let should_fail = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(Error::TransientTransfer(format!(
                "connection reset on attempt {attempt}"
            )));
        }
        if self.stall {
            std::future::pending::<()>().await;
        }

        for step in &self.progress_steps {
            if progress.send(*step).await.is_err() {
                break;
            }
        }

        match &request.resume_from {
            Some(resume) => {
                let missing = resume.expected.saturating_sub(resume.offset);
                let mut file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(&resume.path)
                    .await?;
                file.write_all(&vec![1u8; missing as usize]).await?;
                file.flush().await?;
                Ok(AcquiredArtifact {
                    path: resume.path.clone(),
                    bytes_transferred: missing,
                })
            }
            None => {
                let path = request.output_dir.join(format!("{}.mp3", request.title));
                tokio::fs::write(&path, vec![0u8; self.artifact_size as usize]).await?;
                Ok(AcquiredArtifact {
                    path,
                    bytes_transferred: self.artifact_size,
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// One recorded `write_tags` call
#[derive(Debug, Clone)]
pub(crate) struct TagCall {
    pub(crate) path: PathBuf,
    pub(crate) tags: AudioTags,
    pub(crate) had_cover: bool,
}

/// Tag writer that records its calls
#[derive(Default)]
pub(crate) struct RecordingTagWriter {
    calls: Mutex<Vec<TagCall>>,
    lose_files: Mutex<u32>,
}

impl RecordingTagWriter {
    pub(crate) fn calls(&self) -> Vec<TagCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The next `times` calls delete the file they were given and still report success
    pub(crate) fn lose_next(&self, times: u32) {
        *self.lose_files.lock().unwrap() = times;
    }
}

#[async_trait]
impl TagWriter for RecordingTagWriter {
    async fn write_tags(&self, path: &Path, tags: &AudioTags, cover: Option<&[u8]>) -> Result<()> {
        self.calls.lock().unwrap().push(TagCall {
            path: path.to_path_buf(),
            tags: tags.clone(),
            had_cover: cover.is_some(),
        });

        let lose = {
            let mut remaining = self.lose_files.lock().unwrap();
            let lose = *remaining > 0;
            *remaining = remaining.saturating_sub(1);
            lose
        };
        if lose {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Config rooted in `root` with millisecond backoff and polling
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.persistence.task_state_path = root.join("download_tasks").join("active_tasks.json");
    config.persistence.history_path = root.join("download_history").join("history.json");
    config.executor.backoff_base = Duration::from_millis(1);
    config.executor.artifact_timeout = Duration::from_millis(200);
    config.executor.poll_interval = Duration::from_millis(10);
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.jitter = false;
    config.tools.search_path = false;
    config
}

/// Everything a downloader test needs to inspect afterwards
pub(crate) struct TestDownloader {
    pub(crate) downloader: AudioDownloader,
    pub(crate) source: Arc<FakeSource>,
    pub(crate) writer: Arc<RecordingTagWriter>,
    /// Keeps the temp directory alive
    pub(crate) temp_dir: tempfile::TempDir,
}

/// Helper to create a test AudioDownloader backed by `source` and a recording tag writer.
pub(crate) async fn create_test_downloader(source: FakeSource) -> TestDownloader {
    create_test_downloader_with(source, |_| {}).await
}

/// Like [`create_test_downloader`], with a hook to adjust the config first
pub(crate) async fn create_test_downloader_with(
    source: FakeSource,
    adjust: impl FnOnce(&mut Config),
) -> TestDownloader {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    adjust(&mut config);

    let source = Arc::new(source);
    let writer = Arc::new(RecordingTagWriter::default());
    let downloader = AudioDownloader::with_capabilities(config, source.clone(), writer.clone())
        .await
        .unwrap();

    TestDownloader {
        downloader,
        source,
        writer,
        temp_dir,
    }
}
