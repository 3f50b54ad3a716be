//! Downloader-level tests: submission, dispatch and shutdown.

use super::*;
use crate::downloader::test_helpers::{
    FakeSource, TestDownloader, create_test_downloader, create_test_downloader_with,
};
use crate::types::{TaskSpec, TaskState};
use std::time::Duration;

mod lifecycle;
mod task_processor;

/// Poll until the task reaches `state`, panicking after a few seconds
async fn wait_for_state(downloader: &AudioDownloader, id: &TaskId, state: TaskState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = downloader.get_status(id).await.unwrap();
        if status.status == state {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} stuck in {} waiting for {state}",
            status.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until `check` holds, panicking after a few seconds
async fn wait_until(what: &str, mut check: impl AsyncFnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
