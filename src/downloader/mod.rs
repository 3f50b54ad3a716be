//! Core downloader implementation split into focused submodules.
//!
//! The `AudioDownloader` struct and its methods are organized by domain:
//! - [`tasks`] - Task submission and status queries
//! - [`task_processor`] - Admission queue dispatch onto the worker pool
//! - [`lifecycle`] - Shutdown coordination
//! - [`executor`] - Core task execution

mod executor;
mod lifecycle;
mod task_processor;
mod tasks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::{Mutex, Semaphore, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::cover::CoverCompositor;
use crate::error::{Error, Result};
use crate::history::HistoryLedger;
use crate::media::{
    FfmpegTagWriter, MediaSource, MetadataEmbedder, NoOpTagWriter, TagWriter, YtDlpSource,
};
use crate::registry::TaskRegistry;
use crate::types::{Event, TaskId};

use executor::TaskContext;

/// Admission queue and worker pool state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Sending half of the bounded admission queue
    pub(crate) admission_tx: mpsc::Sender<TaskId>,
    /// Semaphore limiting concurrently executing tasks (respects max_concurrent_tasks)
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Executing tasks and their abort tokens
    pub(crate) active_tasks: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    /// Flag to indicate whether new tasks are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Stops the dispatcher
    pub(crate) shutdown: CancellationToken,
}

/// External capabilities shared by every executor
#[derive(Clone)]
pub(crate) struct Capabilities {
    /// Discovery, metadata and transfer
    pub(crate) source: Arc<dyn MediaSource>,
    /// Tag writing (with artifact polling)
    pub(crate) embedder: MetadataEmbedder,
    /// Thumbnail fetch and cover compositing
    pub(crate) cover: Arc<CoverCompositor>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct AudioDownloader {
    /// Task registry (public for integration tests to inspect task state)
    pub registry: Arc<TaskRegistry>,
    /// Download history ledger
    pub history: Arc<HistoryLedger>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// External capabilities
    pub(crate) capabilities: Capabilities,
    /// Admission queue and worker pool state
    pub(crate) queue_state: QueueState,
}

impl AudioDownloader {
    /// Create a new AudioDownloader using the CLI tools
    ///
    /// This initializes all core components:
    /// - Creates the download root
    /// - Locates `yt-dlp` (required) and `ffmpeg` (optional, tags are skipped without it)
    /// - Loads the task registry and history ledger
    /// - Starts the task processor
    pub async fn new(config: Config) -> Result<Self> {
        let source: Arc<dyn MediaSource> = Arc::new(YtDlpSource::from_config(&config)?);

        let writer: Arc<dyn TagWriter> = match FfmpegTagWriter::from_config(&config) {
            Some(writer) => Arc::new(writer),
            None => {
                tracing::warn!("ffmpeg not found, audio files will not be tagged");
                Arc::new(NoOpTagWriter)
            }
        };

        Self::with_capabilities(config, source, writer).await
    }

    /// Create a downloader with explicit capability implementations
    pub async fn with_capabilities(
        config: Config,
        source: Arc<dyn MediaSource>,
        writer: Arc<dyn TagWriter>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(config.download_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir().display(),
                        e
                    ),
                ))
            })?;

        let registry = TaskRegistry::load(&config.persistence.task_state_path).await?;
        let history = HistoryLedger::open(&config.persistence.history_path).await?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let (admission_tx, admission_rx) =
            mpsc::channel(config.download.admission_queue_capacity.max(1));

        let capabilities = Capabilities {
            embedder: MetadataEmbedder::new(writer.clone(), &config.executor),
            cover: Arc::new(CoverCompositor::new(&config)?),
            source,
        };

        tracing::info!(
            media_source = capabilities.source.name(),
            tag_writer = writer.name(),
            max_concurrent_tasks = config.download.max_concurrent_tasks,
            "Downloader capabilities initialized"
        );

        let queue_state = QueueState {
            admission_tx,
            concurrent_limit: Arc::new(Semaphore::new(config.download.max_concurrent_tasks.max(1))),
            active_tasks: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
        };

        let downloader = Self {
            registry: Arc::new(registry),
            history: Arc::new(history),
            event_tx,
            config: Arc::new(config),
            capabilities,
            queue_state,
        };

        downloader.start_task_processor(admission_rx);
        Ok(downloader)
    }

    /// Subscribe to task events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bili_audio_dl::{AudioDownloader, Config, Event};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = AudioDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::Progress(p) = event {
    ///                 println!("{} part {}: {:.1}%", p.task_id, p.part, p.progress);
    ///             }
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Build the executor context for one task run
    pub(crate) fn task_context(&self, id: TaskId) -> TaskContext {
        TaskContext {
            id,
            registry: Arc::clone(&self.registry),
            history: Arc::clone(&self.history),
            source: Arc::clone(&self.capabilities.source),
            embedder: self.capabilities.embedder.clone(),
            cover: Arc::clone(&self.capabilities.cover),
            event_tx: self.event_tx.clone(),
            config: Arc::clone(&self.config),
        }
    }
}
