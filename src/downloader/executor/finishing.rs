//! Part finishing -- cover, rename, tags, history, cleanup.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::history::HistoryEntry;
use crate::media::{AcquiredArtifact, AudioTags};
use crate::types::{MediaInfo, Task};
use crate::utils::{file_size, remove_intermediates, wait_for_readable};

use super::context::TaskContext;
use super::part::PartJob;

/// Finish an acquired artifact and record it.
///
/// Steps run in a fixed order: wait for the file, build the cover, rename, embed tags
/// (always after the rename), append to the history ledger, delete intermediates.
/// Returns the final artifact path.
pub(super) async fn finish_part(
    ctx: &TaskContext,
    task: &Task,
    job: &PartJob,
    info: &MediaInfo,
    raw_title: &str,
    artifact: AcquiredArtifact,
) -> Result<PathBuf> {
    let executor = &ctx.config.executor;
    wait_for_readable(&artifact.path, executor.artifact_timeout, executor.poll_interval).await?;

    let cover = match info.thumbnail.as_deref() {
        Some(url) if !url.is_empty() => ctx.cover.fetch_and_compose(url).await,
        _ => None,
    };

    let final_path = if task.rename {
        let target = rename_target(
            &ctx.config.download_dir().join(&task.output_dir),
            &task.output_dir,
            job.index,
            &artifact.path,
            &ctx.config.download.audio_format,
        );
        if target != artifact.path {
            tokio::fs::rename(&artifact.path, &target).await?;
            tracing::debug!(
                task_id = %ctx.id,
                from = %artifact.path.display(),
                to = %target.display(),
                "Renamed artifact"
            );
        }
        target
    } else {
        artifact.path.clone()
    };

    let tags = AudioTags {
        title: raw_title.to_string(),
        artist: info.uploader.clone(),
        album: Some(album_name(task)),
        date: info.upload_date.clone(),
    };
    ctx.embedder
        .embed(&final_path, &tags, cover.as_deref())
        .await?;

    let size = file_size(&final_path)
        .await
        .ok_or_else(|| Error::ArtifactMissing {
            path: final_path.clone(),
            waited_secs: 0,
        })?;
    ctx.history
        .record(
            HistoryEntry::new(
                &job.locator.video_id,
                job.locator.page,
                raw_title,
                &final_path,
                size,
            )
            .with_media(info),
        )
        .await?;

    let removed = remove_intermediates(
        &artifact.path.with_extension(""),
        &ctx.config.download.intermediate_suffixes,
        &final_path,
    )
    .await;

    tracing::info!(
        task_id = %ctx.id,
        part = job.index,
        path = %final_path.display(),
        size,
        cover = cover.is_some(),
        intermediates_removed = removed,
        "Part finished"
    );
    Ok(final_path)
}

/// `{dir}/{last component of output_dir}-{index}.{ext}`
pub(crate) fn rename_target(
    dir: &Path,
    output_dir: &str,
    index: u32,
    artifact: &Path,
    default_ext: &str,
) -> PathBuf {
    let base = Path::new(output_dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| output_dir.to_string());
    let ext = artifact
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| default_ext.to_string());
    dir.join(format!("{base}-{index}.{ext}"))
}

/// Album tag: the task's display title, or the output directory's name
pub(crate) fn album_name(task: &Task) -> String {
    if !task.title.is_empty() {
        return task.title.clone();
    }
    Path::new(&task.output_dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| task.output_dir.clone())
}
