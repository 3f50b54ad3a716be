//! Core types for bili-audio-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a task
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Registered, waiting for a worker
    Pending,
    /// A worker is executing the task
    Running,
    /// All parts finished or skipped
    Completed,
    /// Error budget exhausted or non-retryable error
    Failed,
}

impl TaskState {
    /// Whether the state is terminal (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Whether `self -> next` is a legal transition
    ///
    /// Only `pending -> running -> {completed, failed}` is allowed.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a task acquires
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSource {
    /// A single (possibly multi-part) video
    Video {
        /// Platform video identifier (e.g. `BV1xx411c7mD`)
        video_id: String,
    },
    /// A creator's collection (season) of videos
    Collection {
        /// Owner (uploader) identifier
        owner_id: String,
        /// Season identifier
        season_id: String,
    },
}

impl TaskSource {
    /// Short label used in task identifiers and logs
    pub fn label(&self) -> String {
        match self {
            TaskSource::Video { video_id } => video_id.clone(),
            TaskSource::Collection {
                owner_id,
                season_id,
            } => format!("collection_{owner_id}_{season_id}"),
        }
    }
}

/// Submission parameters for a new task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// What to acquire
    pub source: TaskSource,
    /// Output directory, relative to the configured download root
    pub output_dir: String,
    /// Rename finished files to `{output_dir}-{part}.{ext}`
    #[serde(default)]
    pub rename: bool,
}

impl TaskSpec {
    /// Spec for a single video
    pub fn video(video_id: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            source: TaskSource::Video {
                video_id: video_id.into(),
            },
            output_dir: output_dir.into(),
            rename: false,
        }
    }

    /// Spec for a collection
    pub fn collection(
        owner_id: impl Into<String>,
        season_id: impl Into<String>,
        output_dir: impl Into<String>,
    ) -> Self {
        Self {
            source: TaskSource::Collection {
                owner_id: owner_id.into(),
                season_id: season_id.into(),
            },
            output_dir: output_dir.into(),
            rename: false,
        }
    }

    /// Builder-style rename flag
    pub fn with_rename(mut self, rename: bool) -> Self {
        self.rename = rename;
        self
    }
}

/// A task as stored in the registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// What the task acquires
    pub source: TaskSource,
    /// Output directory, relative to the download root
    pub output_dir: String,
    /// Rename finished files
    pub rename: bool,
    /// Current state
    pub status: TaskState,
    /// Overall progress, 0.0 to 100.0
    pub progress: f32,
    /// Filtered display title
    #[serde(default)]
    pub title: String,
    /// Last error message (set when the task fails)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of collection members (collections only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_count: Option<u32>,
    /// Titles of collection members not yet finished (collections only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub titles_remaining: Vec<String>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was last mutated
    pub last_update: DateTime<Utc>,
}

impl Task {
    /// Status snapshot for callers polling the task
    pub fn status_view(&self) -> TaskStatusView {
        TaskStatusView {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            title: self.title.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            last_update: self.last_update,
        }
    }
}

/// Status of a task as returned by status queries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusView {
    /// Task identifier
    pub id: TaskId,
    /// Current state
    pub status: TaskState,
    /// Overall progress, 0.0 to 100.0
    pub progress: f32,
    /// Filtered display title
    pub title: String,
    /// Error message for failed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub last_update: DateTime<Utc>,
}

/// Kind of a progress event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Transfer progress for the current part
    Progress,
    /// Part already present in the history ledger
    Skip,
    /// Part finished and recorded
    Success,
    /// Part attempt failed
    Error,
}

/// Progress of one part of a task, expressed as overall task progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Task the event belongs to
    pub task_id: TaskId,
    /// 1-based part index
    pub part: u32,
    /// Event kind
    pub status: ProgressStatus,
    /// Overall task progress, 0.0 to 100.0
    pub progress: f32,
    /// Raw title of the part, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human readable message (file name, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Event emitted during task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task registered and queued for a worker
    TaskQueued {
        /// Task ID
        id: TaskId,
    },

    /// A worker picked up the task
    TaskStarted {
        /// Task ID
        id: TaskId,
        /// Number of parts resolved for the task
        total_parts: u32,
    },

    /// Per-part progress
    Progress(ProgressEvent),

    /// Task finished successfully
    TaskCompleted {
        /// Task ID
        id: TaskId,
    },

    /// Task failed terminally
    TaskFailed {
        /// Task ID
        id: TaskId,
        /// Last error message
        error: String,
    },

    /// Downloader is shutting down
    Shutdown,
}

/// Location of one part on the platform
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartLocator {
    /// Video the part belongs to
    pub video_id: String,
    /// 1-based page of that video
    pub page: u32,
}

/// Member of a collection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    /// Video identifier of the member
    pub video_id: String,
    /// Raw title of the member
    pub title: String,
}

/// Remote metadata of a part
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Raw title
    pub title: String,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Uploader display name
    #[serde(default)]
    pub uploader: Option<String>,
    /// Upload date as reported by the platform (`YYYYMMDD`)
    #[serde(default)]
    pub upload_date: Option<String>,
}
