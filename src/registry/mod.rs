//! Task registry
//!
//! Owns every task the downloader knows about and mirrors the whole set into one JSON
//! file after each mutation, so a restart observes the last persisted state. Tasks are
//! created by submissions and afterwards mutated only by the executor running them.
//!
//! In-flight work is not resumed after a restart: tasks found `pending` or `running` on
//! load are reported as stale and left as they are.

use crate::error::{Error, Result};
use crate::types::{Task, TaskId, TaskSource, TaskSpec, TaskState};
use crate::utils::{validate_output_dir, validate_platform_id, write_json_atomic};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Persisted set of tasks
pub struct TaskRegistry {
    path: PathBuf,
    tasks: Mutex<BTreeMap<TaskId, Task>>,
    next_seq: AtomicU64,
}

impl TaskRegistry {
    /// Load the registry from `path`; a missing file yields an empty registry
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tasks: BTreeMap<TaskId, Task> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        for task in tasks.values().filter(|t| !t.status.is_terminal()) {
            tracing::warn!(
                task_id = %task.id,
                status = %task.status,
                "Task was interrupted by a previous shutdown and will not be resumed"
            );
        }

        tracing::debug!(path = %path.display(), tasks = tasks.len(), "Loaded task registry");
        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Validate a submission and register it as a `pending` task
    pub async fn create(&self, spec: TaskSpec) -> Result<Task> {
        validate_spec(&spec)?;

        let mut tasks = self.tasks.lock().await;
        let id = loop {
            let candidate = self.generate_id(&spec.source);
            if !tasks.contains_key(&candidate) {
                break candidate;
            }
        };

        let now = Utc::now();
        let task = Task {
            id: id.clone(),
            source: spec.source,
            output_dir: spec.output_dir.trim().to_string(),
            rename: spec.rename,
            status: TaskState::Pending,
            progress: 0.0,
            title: String::new(),
            error: None,
            child_count: None,
            titles_remaining: Vec::new(),
            created_at: now,
            last_update: now,
        };

        tasks.insert(id.clone(), task.clone());
        if let Err(e) = write_json_atomic(&self.path, &*tasks).await {
            tasks.remove(&id);
            return Err(e);
        }

        tracing::info!(task_id = %id, output_dir = %task.output_dir, "Task created");
        Ok(task)
    }

    fn generate_id(&self, source: &TaskSource) -> TaskId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        TaskId(format!("{}_{stamp}_{seq}", source.label()))
    }

    /// Task with the given id
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.lock().await.get(id).cloned()
    }

    /// All tasks, oldest first
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.lock().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Most recently created task
    pub async fn latest(&self) -> Option<Task> {
        self.tasks
            .lock()
            .await
            .values()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned()
    }

    /// Remove terminal tasks last updated more than `max_age_hours` ago
    ///
    /// `cleanup(0)` removes every terminal task. Returns the number removed.
    pub async fn cleanup(&self, max_age_hours: u64) -> Result<usize> {
        let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX);
        let cutoff = chrono::Duration::try_hours(hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let mut tasks = self.tasks.lock().await;
        let expired: Vec<TaskId> = tasks
            .values()
            .filter(|t| t.status.is_terminal() && t.last_update <= cutoff)
            .map(|t| t.id.clone())
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let mut removed = Vec::with_capacity(expired.len());
        for id in &expired {
            if let Some(task) = tasks.remove(id) {
                removed.push(task);
            }
        }

        if let Err(e) = write_json_atomic(&self.path, &*tasks).await {
            for task in removed {
                tasks.insert(task.id.clone(), task);
            }
            return Err(e);
        }

        tracing::info!(removed = expired.len(), max_age_hours, "Cleaned up finished tasks");
        Ok(expired.len())
    }

    /// `pending -> running`
    pub async fn mark_running(&self, id: &TaskId) -> Result<Task> {
        self.mutate(id, |task| transition(task, TaskState::Running))
            .await
    }

    /// Raise the task's progress; lower values are ignored
    ///
    /// Returns the stored progress after the update. Only running tasks move.
    pub async fn update_progress(&self, id: &TaskId, progress: f32) -> Result<f32> {
        let progress = progress.clamp(0.0, 100.0);
        {
            let tasks = self.tasks.lock().await;
            let task = tasks
                .get(id)
                .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
            if task.status != TaskState::Running || progress <= task.progress {
                return Ok(task.progress);
            }
        }

        let task = self
            .mutate(id, |task| {
                if task.status == TaskState::Running && progress > task.progress {
                    task.progress = progress;
                }
                Ok(())
            })
            .await?;
        Ok(task.progress)
    }

    /// Set the filtered display title
    pub async fn set_title(&self, id: &TaskId, title: impl Into<String>) -> Result<Task> {
        let title = title.into();
        self.mutate(id, |task| {
            task.title = title;
            Ok(())
        })
        .await
    }

    /// Record the members of a collection task
    pub async fn set_children(&self, id: &TaskId, titles: Vec<String>) -> Result<Task> {
        self.mutate(id, |task| {
            task.child_count = Some(u32::try_from(titles.len()).unwrap_or(u32::MAX));
            task.titles_remaining = titles;
            Ok(())
        })
        .await
    }

    /// Drop one finished member title from a collection task
    pub async fn complete_child(&self, id: &TaskId, title: &str) -> Result<Task> {
        self.mutate(id, |task| {
            if let Some(pos) = task.titles_remaining.iter().position(|t| t == title) {
                task.titles_remaining.remove(pos);
            }
            Ok(())
        })
        .await
    }

    /// `running -> completed`, progress 100
    pub async fn mark_completed(&self, id: &TaskId) -> Result<Task> {
        self.mutate(id, |task| {
            transition(task, TaskState::Completed)?;
            task.progress = 100.0;
            task.error = None;
            Ok(())
        })
        .await
    }

    /// `running -> failed`, keeping `error` as the task's message
    pub async fn mark_failed(&self, id: &TaskId, error: impl Into<String>) -> Result<Task> {
        let error = error.into();
        self.mutate(id, |task| {
            transition(task, TaskState::Failed)?;
            task.error = Some(error);
            Ok(())
        })
        .await
    }

    /// Apply `f` to a copy of the task and commit it only once persisted
    async fn mutate<F>(&self, id: &TaskId, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) -> Result<()>,
    {
        let mut tasks = self.tasks.lock().await;
        let current = tasks
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

        let mut updated = current.clone();
        f(&mut updated)?;
        updated.last_update = Utc::now();

        let previous = tasks.insert(id.clone(), updated.clone());
        if let Err(e) = write_json_atomic(&self.path, &*tasks).await {
            if let Some(prev) = previous {
                tasks.insert(id.clone(), prev);
            }
            return Err(e);
        }
        Ok(updated)
    }
}

fn transition(task: &mut Task, next: TaskState) -> Result<()> {
    if !task.status.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            id: task.id.clone(),
            from: task.status,
            to: next,
        });
    }
    task.status = next;
    Ok(())
}

fn validate_spec(spec: &TaskSpec) -> Result<()> {
    match &spec.source {
        TaskSource::Video { video_id } => validate_platform_id("video_id", video_id)?,
        TaskSource::Collection {
            owner_id,
            season_id,
        } => {
            validate_platform_id("owner_id", owner_id)?;
            validate_platform_id("season_id", season_id)?;
        }
    }
    validate_output_dir(&spec.output_dir)
}
