//! Task context: shared state handed to one executor run.

use std::sync::Arc;

use crate::config::Config;
use crate::cover::CoverCompositor;
use crate::history::HistoryLedger;
use crate::media::{MediaSource, MetadataEmbedder};
use crate::registry::TaskRegistry;
use crate::types::{Event, ProgressEvent, ProgressStatus, TaskId};

/// Shared context for a single task run, reducing parameter passing between helpers.
pub(crate) struct TaskContext {
    pub(crate) id: TaskId,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) history: Arc<HistoryLedger>,
    pub(crate) source: Arc<dyn MediaSource>,
    pub(crate) embedder: MetadataEmbedder,
    pub(crate) cover: Arc<CoverCompositor>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) config: Arc<Config>,
}

impl TaskContext {
    /// Send an event to subscribers; dropped when nobody listens.
    pub(super) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Send a per-part progress event.
    pub(super) fn emit_part(
        &self,
        part: u32,
        status: ProgressStatus,
        progress: f32,
        title: Option<&str>,
        message: Option<String>,
    ) {
        self.emit(Event::Progress(ProgressEvent {
            task_id: self.id.clone(),
            part,
            status,
            progress,
            title: title.map(str::to_string),
            message,
        }));
    }

    /// Mark the task failed and emit the failure event.
    pub(super) async fn mark_failed(&self, error: &str) {
        if let Err(e) = self.registry.mark_failed(&self.id, error).await {
            tracing::error!(task_id = %self.id, error = %e, "Failed to persist task failure");
        }
        self.emit(Event::TaskFailed {
            id: self.id.clone(),
            error: error.to_string(),
        });
    }

    /// Mark the task completed and emit the completion event.
    pub(super) async fn mark_completed(&self) {
        if let Err(e) = self.registry.mark_completed(&self.id).await {
            tracing::error!(task_id = %self.id, error = %e, "Failed to persist task completion");
            return;
        }
        self.emit(Event::TaskCompleted {
            id: self.id.clone(),
        });
    }
}
