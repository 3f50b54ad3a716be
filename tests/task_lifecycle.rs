//! End-to-end task lifecycle through the public API, with scripted capabilities.

use async_trait::async_trait;
use bili_audio_dl::{
    AcquireRequest, AcquiredArtifact, AudioDownloader, AudioTags, CollectionItem, Config, Error,
    Event, HistoryLedger, MediaInfo, MediaSource, PartLocator, ProgressStatus, Result, TagWriter,
    TaskId, TaskSpec, TaskState,
};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A two-part video plus a three-member collection
struct ScriptedPlatform {
    flaky_failures: AtomicU32,
    transfers: Mutex<Vec<PartLocator>>,
}

impl ScriptedPlatform {
    fn new(flaky_failures: u32) -> Self {
        Self {
            flaky_failures: AtomicU32::new(flaky_failures),
            transfers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaSource for ScriptedPlatform {
    async fn count_parts(&self, _video_id: &str) -> Result<u32> {
        Ok(2)
    }

    async fn list_collection(&self, _owner: &str, _season: &str) -> Result<Vec<CollectionItem>> {
        Ok(["Chapter 1", "Chapter 2", "Chapter 3"]
            .iter()
            .enumerate()
            .map(|(i, title)| CollectionItem {
                video_id: format!("BVch{}", i + 1),
                title: title.to_string(),
            })
            .collect())
    }

    async fn fetch_metadata(&self, locator: &PartLocator) -> Result<MediaInfo> {
        Ok(MediaInfo {
            title: format!("【HD】 Lecture   {}", locator.page),
            uploader: Some("Prof".to_string()),
            ..MediaInfo::default()
        })
    }

    async fn acquire(
        &self,
        request: &AcquireRequest,
        progress: mpsc::Sender<f32>,
    ) -> Result<AcquiredArtifact> {
        self.transfers.lock().unwrap().push(request.locator.clone());

        let remaining = self.flaky_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.flaky_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::TransientTransfer("peer went away".to_string()));
        }

        for pct in [30.0, 60.0, 90.0] {
            progress.send(pct).await.ok();
        }
        let path = request
            .output_dir
            .join(format!("{}.mp3", request.title.replace(' ', "_")));
        tokio::fs::write(&path, b"ID3 fake audio").await?;
        Ok(AcquiredArtifact {
            path,
            bytes_transferred: 14,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct CountingTagWriter {
    tagged: Mutex<Vec<(String, AudioTags)>>,
}

#[async_trait]
impl TagWriter for CountingTagWriter {
    async fn write_tags(&self, path: &Path, tags: &AudioTags, _cover: Option<&[u8]>) -> Result<()> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.tagged.lock().unwrap().push((name, tags.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("audio");
    config.persistence.task_state_path = root.join("state").join("tasks.json");
    config.persistence.history_path = root.join("state").join("history.json");
    config.executor.backoff_base = Duration::from_millis(1);
    config.executor.artifact_timeout = Duration::from_millis(200);
    config.executor.poll_interval = Duration::from_millis(10);
    config.tools.search_path = false;
    config.title_filter.remove_chars = vec!["【".to_string(), "】".to_string()];
    config.title_filter.remove_words = vec!["HD".to_string()];
    config
}

async fn wait_terminal(downloader: &AudioDownloader, id: &TaskId) -> TaskState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = downloader.get_status(id).await.unwrap();
            if status.status.is_terminal() {
                return status.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not finish in time")
}

#[tokio::test]
async fn video_task_completes_and_second_run_skips_everything() {
    let temp = tempfile::tempdir().unwrap();
    let platform = Arc::new(ScriptedPlatform::new(1));
    let writer = Arc::new(CountingTagWriter::default());
    let downloader =
        AudioDownloader::with_capabilities(config(temp.path()), platform.clone(), writer.clone())
            .await
            .unwrap();
    let mut events = downloader.subscribe();

    let first = downloader
        .create_task(TaskSpec::video("BVlec", "course").with_rename(true))
        .await
        .unwrap();
    assert_eq!(wait_terminal(&downloader, &first).await, TaskState::Completed);

    let status = downloader.get_status(&first).await.unwrap();
    assert_eq!(status.progress, 100.0);
    assert_eq!(status.title, "Lecture 1");

    let course = temp.path().join("audio").join("course");
    assert!(course.join("course-1.mp3").exists());
    assert!(course.join("course-2.mp3").exists());
    // One flaky failure, then one transfer per part
    assert_eq!(platform.transfers.lock().unwrap().len(), 3);

    let tagged = writer.tagged.lock().unwrap().clone();
    assert_eq!(tagged.len(), 2);
    assert_eq!(tagged[0].0, "course-1.mp3");
    assert_eq!(tagged[0].1.title, "【HD】 Lecture   1");
    assert_eq!(tagged[0].1.album.as_deref(), Some("Lecture 1"));
    assert_eq!(tagged[0].1.artist.as_deref(), Some("Prof"));

    let second = downloader
        .create_task(TaskSpec::video("BVlec", "course").with_rename(true))
        .await
        .unwrap();
    assert_eq!(wait_terminal(&downloader, &second).await, TaskState::Completed);
    assert_eq!(platform.transfers.lock().unwrap().len(), 3);

    let mut second_run = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::Progress(p) = event
            && p.task_id == second
        {
            second_run.push(p.status);
        }
    }
    assert_eq!(second_run, vec![ProgressStatus::Skip, ProgressStatus::Skip]);

    downloader.shutdown().await.unwrap();
}

#[tokio::test]
async fn collection_task_tracks_members_and_records_history() {
    let temp = tempfile::tempdir().unwrap();
    let downloader = AudioDownloader::with_capabilities(
        config(temp.path()),
        Arc::new(ScriptedPlatform::new(0)),
        Arc::new(CountingTagWriter::default()),
    )
    .await
    .unwrap();

    let id = downloader
        .create_task(TaskSpec::collection("99", "12", "novel"))
        .await
        .unwrap();
    assert_eq!(wait_terminal(&downloader, &id).await, TaskState::Completed);

    let task = downloader.get_task(&id).await.unwrap();
    assert!(id.as_str().starts_with("collection_99_12_"));
    assert_eq!(task.child_count, Some(3));
    assert!(task.titles_remaining.is_empty());
    assert_eq!(task.title, "Chapter 1");

    assert_eq!(downloader.history.len().await, 3);
    let key = HistoryLedger::key("BVch2", 1, "Chapter 2");
    let entry = downloader.history.get(&key).await.unwrap();
    assert!(entry.path.ends_with("novel/Chapter_2.mp3"));
    assert_eq!(entry.size, 14);

    assert_eq!(downloader.cleanup(0).await.unwrap(), 1);
    assert!(downloader.latest().await.is_none());

    downloader.shutdown().await.unwrap();
}
