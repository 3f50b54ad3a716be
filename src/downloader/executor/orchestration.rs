//! Task orchestration -- top-level lifecycle for a single task.

use crate::error::{Error, Result};
use crate::retry::{IsRetryable, linear_backoff};
use crate::types::{Event, PartLocator, ProgressStatus, TaskSource};

use super::context::TaskContext;
use super::part::{PartJob, PartOutcome, run_part};
use super::progress::ProgressAggregator;

/// Job-wide error counter shared by every part of a task.
pub(crate) struct ErrorBudget {
    max_errors: u32,
    errors: u32,
}

impl ErrorBudget {
    pub(crate) fn new(max_errors: u32) -> Self {
        Self {
            max_errors: max_errors.max(1),
            errors: 0,
        }
    }

    pub(crate) fn errors(&self) -> u32 {
        self.errors
    }

    /// Count `error` and wait out the backoff, or give up.
    ///
    /// Non-retryable errors are returned unchanged. Once the count reaches the budget
    /// the task is over and [`Error::Fatal`] is returned with the last message.
    pub(crate) async fn absorb(&mut self, ctx: &TaskContext, error: Error) -> Result<()> {
        if !error.is_retryable() {
            return Err(error);
        }

        self.errors += 1;
        if self.errors >= self.max_errors {
            return Err(Error::Fatal {
                id: ctx.id.clone(),
                errors: self.errors,
                last_error: error.to_string(),
            });
        }

        let delay = linear_backoff(ctx.config.executor.backoff_base, self.errors);
        tracing::warn!(
            task_id = %ctx.id,
            error = %error,
            errors = self.errors,
            max_errors = self.max_errors,
            delay_ms = delay.as_millis(),
            "Task error, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

/// Core task runner -- drives one task from `pending` to a terminal state.
///
/// Phases:
/// 1. Transition to `running`
/// 2. Resolve the parts (page count or collection listing)
/// 3. Run every part in order under the task's error budget
/// 4. Mark the task `completed` (or `failed` with the last error)
pub(crate) async fn run_task(ctx: TaskContext) {
    match execute(&ctx).await {
        Ok(()) => {
            tracing::info!(task_id = %ctx.id, "Task completed");
            ctx.mark_completed().await;
        }
        Err(Error::Fatal {
            errors, last_error, ..
        }) => {
            tracing::error!(task_id = %ctx.id, errors, error = %last_error, "Task error budget exhausted");
            ctx.mark_failed(&last_error).await;
        }
        Err(Error::InvalidTransition { from, to, .. }) => {
            // Someone else owns the task; leave its state alone
            tracing::warn!(task_id = %ctx.id, %from, %to, "Task is not runnable");
        }
        Err(e) => {
            tracing::error!(task_id = %ctx.id, error = %e, "Task failed");
            ctx.mark_failed(&e.to_string()).await;
        }
    }
}

async fn execute(ctx: &TaskContext) -> Result<()> {
    let task = ctx.registry.mark_running(&ctx.id).await?;
    let mut budget = ErrorBudget::new(ctx.config.executor.max_errors);

    let jobs = resolve_parts(ctx, &task.source, &mut budget).await?;
    let total_parts = u32::try_from(jobs.len()).unwrap_or(u32::MAX);

    if let TaskSource::Collection { .. } = task.source {
        let titles = jobs
            .iter()
            .filter_map(|j| j.listed_title.clone())
            .collect();
        ctx.registry.set_children(&ctx.id, titles).await?;
    }

    ctx.emit(Event::TaskStarted {
        id: ctx.id.clone(),
        total_parts,
    });
    tracing::info!(task_id = %ctx.id, total_parts, "Task started");

    let mut aggregator = ProgressAggregator::new(total_parts);
    for job in &jobs {
        loop {
            match run_part(ctx, &mut aggregator, job).await {
                Ok(outcome) => {
                    if let PartOutcome::Skipped(_) | PartOutcome::Finished(_) = outcome
                        && let Some(title) = &job.listed_title
                    {
                        ctx.registry.complete_child(&ctx.id, title).await?;
                    }
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %ctx.id,
                        part = job.index,
                        error = %e,
                        "Part attempt failed"
                    );
                    ctx.emit_part(
                        job.index,
                        ProgressStatus::Error,
                        aggregator.current(),
                        job.listed_title.as_deref(),
                        Some(e.to_string()),
                    );
                    budget.absorb(ctx, e).await?;
                }
            }
        }
    }

    if budget.errors() > 0 {
        tracing::info!(task_id = %ctx.id, errors = budget.errors(), "Task recovered from errors");
    }
    Ok(())
}

/// Turn a task source into its ordered list of parts.
async fn resolve_parts(
    ctx: &TaskContext,
    source: &TaskSource,
    budget: &mut ErrorBudget,
) -> Result<Vec<PartJob>> {
    match source {
        TaskSource::Video { video_id } => {
            let count = loop {
                match ctx.source.count_parts(video_id).await {
                    Ok(count) => break count.max(1),
                    Err(e) => budget.absorb(ctx, e).await?,
                }
            };
            Ok((1..=count)
                .map(|page| PartJob {
                    index: page,
                    locator: PartLocator {
                        video_id: video_id.clone(),
                        page,
                    },
                    listed_title: None,
                })
                .collect())
        }
        TaskSource::Collection {
            owner_id,
            season_id,
        } => {
            let items = loop {
                match ctx.source.list_collection(owner_id, season_id).await {
                    Ok(items) => break items,
                    Err(e) => budget.absorb(ctx, e).await?,
                }
            };
            Ok(items
                .into_iter()
                .zip(1u32..)
                .map(|(item, index)| PartJob {
                    index,
                    locator: PartLocator {
                        video_id: item.video_id,
                        page: 1,
                    },
                    listed_title: Some(item.title),
                })
                .collect())
        }
    }
}
