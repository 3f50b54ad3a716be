//! Progress aggregation -- part-local percentages to task-wide progress.

use tokio::sync::mpsc;

use crate::types::ProgressStatus;

use super::context::TaskContext;

/// Task-wide progress for `part` (1-based) at `part_percent` of `total_parts`
///
/// `((part - 1) * 100 + part_percent) / total_parts`, clamped to 0..=100.
pub(crate) fn overall_progress(part: u32, part_percent: f32, total_parts: u32) -> f32 {
    if total_parts == 0 {
        return 100.0;
    }
    let done = part.saturating_sub(1) as f32 * 100.0;
    ((done + part_percent.clamp(0.0, 100.0)) / total_parts as f32).clamp(0.0, 100.0)
}

/// Converts per-part progress into task progress and publishes it.
///
/// One aggregator lives for the whole task run; parts are fed to it strictly in order.
pub(crate) struct ProgressAggregator {
    total_parts: u32,
    current: f32,
}

impl ProgressAggregator {
    pub(crate) fn new(total_parts: u32) -> Self {
        Self {
            total_parts,
            current: 0.0,
        }
    }

    /// Highest task-wide progress published so far
    pub(crate) fn current(&self) -> f32 {
        self.current
    }

    pub(crate) fn overall(&self, part: u32, part_percent: f32) -> f32 {
        overall_progress(part, part_percent, self.total_parts)
    }

    /// Consume part-local percentages until the sender is dropped.
    ///
    /// Values are clamped to 0..=100 and anything not above the previous value for this
    /// part is dropped. Returns the last accepted part-local value.
    pub(crate) async fn drain(
        &mut self,
        ctx: &TaskContext,
        part: u32,
        title: Option<&str>,
        mut rx: mpsc::Receiver<f32>,
    ) -> Option<f32> {
        let mut last: Option<f32> = None;
        while let Some(value) = rx.recv().await {
            if !value.is_finite() {
                continue;
            }
            let value = value.clamp(0.0, 100.0);
            if last.is_some_and(|prev| value <= prev) {
                continue;
            }
            last = Some(value);

            let overall = self.overall(part, value);
            self.publish(ctx, part, ProgressStatus::Progress, overall, title, None)
                .await;
        }
        last
    }

    /// Publish the end-of-part 100% event unless the stream already reached it.
    pub(crate) async fn complete_part(
        &mut self,
        ctx: &TaskContext,
        part: u32,
        title: Option<&str>,
        last: Option<f32>,
    ) {
        if last.is_some_and(|v| v >= 100.0) {
            return;
        }
        let overall = self.overall(part, 100.0);
        self.publish(ctx, part, ProgressStatus::Progress, overall, title, None)
            .await;
    }

    /// Record `overall` in the registry and emit a progress event with it.
    ///
    /// The registry keeps the maximum, so the emitted value never goes backwards.
    pub(crate) async fn publish(
        &mut self,
        ctx: &TaskContext,
        part: u32,
        status: ProgressStatus,
        overall: f32,
        title: Option<&str>,
        message: Option<String>,
    ) {
        let overall = overall.max(self.current);
        self.current = match ctx.registry.update_progress(&ctx.id, overall).await {
            Ok(stored) => stored.max(overall),
            Err(e) => {
                tracing::warn!(task_id = %ctx.id, part, error = %e, "Failed to persist progress");
                overall
            }
        };
        ctx.emit_part(part, status, self.current, title, message);
    }
}
