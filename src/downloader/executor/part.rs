//! Single part attempt -- metadata, dedup check, acquisition.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::history::{HistoryLedger, LedgerLookup};
use crate::media::{AcquireRequest, ResumePoint};
use crate::types::{PartLocator, ProgressStatus};
use crate::utils::display_name;

use super::context::TaskContext;
use super::finishing::finish_part;
use super::progress::ProgressAggregator;

/// One unit of work inside a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartJob {
    /// 1-based position in the task
    pub(crate) index: u32,
    /// Where the part lives on the platform
    pub(crate) locator: PartLocator,
    /// Title known before metadata is fetched (collection members)
    pub(crate) listed_title: Option<String>,
}

/// How a part attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PartOutcome {
    /// Already complete in the history ledger
    Skipped(PathBuf),
    /// Acquired and finished
    Finished(PathBuf),
}

/// Run one attempt of `job`.
///
/// Errors are returned to the caller, which decides whether the part is retried
/// under the task's error budget.
pub(crate) async fn run_part(
    ctx: &TaskContext,
    aggregator: &mut ProgressAggregator,
    job: &PartJob,
) -> Result<PartOutcome> {
    let info = ctx.source.fetch_metadata(&job.locator).await?;
    let raw_title = match &job.listed_title {
        Some(title) if !title.is_empty() => title.clone(),
        _ => info.title.clone(),
    };

    if let Some(task) = ctx.registry.get(&ctx.id).await
        && task.title.is_empty()
    {
        let display = ctx.config.title_filter.apply(&raw_title);
        if !display.is_empty() {
            ctx.registry.set_title(&ctx.id, display).await?;
        }
    }

    let key = HistoryLedger::key(&job.locator.video_id, job.locator.page, &raw_title);
    let resume_from = match ctx.history.lookup(&key).await? {
        LedgerLookup::Complete(path) => {
            tracing::info!(
                task_id = %ctx.id,
                part = job.index,
                path = %path.display(),
                "Part already downloaded, skipping"
            );
            let overall = aggregator.overall(job.index, 100.0);
            aggregator
                .publish(
                    ctx,
                    job.index,
                    ProgressStatus::Skip,
                    overall,
                    Some(&raw_title),
                    Some(display_name(&path)),
                )
                .await;
            return Ok(PartOutcome::Skipped(path));
        }
        LedgerLookup::Partial {
            path,
            size,
            expected,
        } => Some(ResumePoint {
            path,
            offset: size,
            expected,
        }),
        LedgerLookup::Absent => None,
    };

    let task = ctx
        .registry
        .get(&ctx.id)
        .await
        .ok_or_else(|| crate::Error::TaskNotFound(ctx.id.clone()))?;
    let output_dir = ctx.config.download_dir().join(&task.output_dir);
    tokio::fs::create_dir_all(&output_dir).await?;

    let request = AcquireRequest {
        locator: job.locator.clone(),
        title: raw_title.clone(),
        output_dir,
        resume_from,
    };

    tracing::info!(
        task_id = %ctx.id,
        part = job.index,
        video_id = %job.locator.video_id,
        page = job.locator.page,
        resume = request.resume_from.is_some(),
        "Acquiring part"
    );

    let (progress_tx, progress_rx) =
        mpsc::channel(ctx.config.executor.progress_channel_capacity.max(1));
    let (acquired, last) = futures::future::join(
        ctx.source.acquire(&request, progress_tx),
        aggregator.drain(ctx, job.index, Some(&raw_title), progress_rx),
    )
    .await;
    let artifact = acquired?;

    tracing::debug!(
        task_id = %ctx.id,
        part = job.index,
        bytes = artifact.bytes_transferred,
        path = %artifact.path.display(),
        "Part transfer finished"
    );

    let final_path = finish_part(ctx, &task, job, &info, &raw_title, artifact).await?;

    aggregator
        .complete_part(ctx, job.index, Some(&raw_title), last)
        .await;
    let overall = aggregator.overall(job.index, 100.0);
    aggregator
        .publish(
            ctx,
            job.index,
            ProgressStatus::Success,
            overall,
            Some(&raw_title),
            Some(display_name(&final_path)),
        )
        .await;

    Ok(PartOutcome::Finished(final_path))
}
