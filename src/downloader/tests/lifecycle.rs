use super::*;
use crate::types::Event;

#[tokio::test]
async fn shutdown_aborts_running_tasks_and_rejects_new_ones() {
    let TestDownloader {
        downloader, source, ..
    } = create_test_downloader(FakeSource::default().stalled()).await;
    let mut events = downloader.subscribe();

    let id = downloader
        .create_task(TaskSpec::video("BV1", "out"))
        .await
        .unwrap();
    wait_until("transfer to start", async || !source.attempts().is_empty()).await;

    downloader.shutdown().await.unwrap();

    assert!(downloader.queue_state.active_tasks.lock().await.is_empty());
    // Aborted tasks are left as they were
    let status = downloader.get_status(&id).await.unwrap();
    assert_eq!(status.status, TaskState::Running);

    let err = downloader
        .create_task(TaskSpec::video("BV2", "out"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));

    let mut saw_shutdown = false;
    while let Ok(event) = events.try_recv() {
        saw_shutdown |= matches!(event, Event::Shutdown);
    }
    assert!(saw_shutdown);
}

#[tokio::test]
async fn shutdown_with_nothing_running_is_immediate() {
    let TestDownloader { downloader, .. } = create_test_downloader(FakeSource::default()).await;

    tokio::time::timeout(Duration::from_secs(1), downloader.shutdown())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn registry_survives_restart() {
    let TestDownloader {
        downloader,
        temp_dir,
        ..
    } = create_test_downloader(FakeSource::default()).await;

    let id = downloader
        .create_task(TaskSpec::video("BV1", "out"))
        .await
        .unwrap();
    wait_for_state(&downloader, &id, TaskState::Completed).await;
    downloader.shutdown().await.unwrap();

    let config = crate::downloader::test_helpers::test_config(temp_dir.path());
    let restarted = AudioDownloader::with_capabilities(
        config,
        std::sync::Arc::new(FakeSource::default()),
        std::sync::Arc::new(crate::media::NoOpTagWriter),
    )
    .await
    .unwrap();

    let status = restarted.get_status(&id).await.unwrap();
    assert_eq!(status.status, TaskState::Completed);
    assert_eq!(restarted.history.len().await, 1);
}
