use super::*;

#[tokio::test]
async fn concurrent_tasks_are_capped_by_the_pool() {
    let source = FakeSource::default().stalled();
    let TestDownloader {
        downloader, source, ..
    } = create_test_downloader_with(source, |c| c.download.max_concurrent_tasks = 2).await;

    let mut ids = Vec::new();
    for video in ["BVa", "BVb", "BVc"] {
        ids.push(
            downloader
                .create_task(TaskSpec::video(video, "out"))
                .await
                .unwrap(),
        );
    }

    wait_until("two transfers", async || source.attempts().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(source.attempts().len(), 2);
    assert_eq!(downloader.queue_state.active_tasks.lock().await.len(), 2);
    let third = downloader.get_status(&ids[2]).await.unwrap();
    assert_eq!(third.status, TaskState::Pending);

    downloader.shutdown().await.unwrap();
}

#[tokio::test]
async fn full_admission_queue_rejects_without_registering() {
    let TestDownloader { downloader, .. } = create_test_downloader_with(FakeSource::default(), |c| {
        c.download.max_concurrent_tasks = 1;
        c.download.admission_queue_capacity = 1;
    })
    .await;

    // Hold the only worker slot so the dispatcher parks after taking one task
    let _slot = downloader
        .queue_state
        .concurrent_limit
        .clone()
        .acquire_owned()
        .await
        .unwrap();

    downloader
        .create_task(TaskSpec::video("BV1", "out"))
        .await
        .unwrap();
    let tx = downloader.queue_state.admission_tx.clone();
    wait_until("dispatcher to take the first task", async || tx.capacity() == 1).await;

    downloader
        .create_task(TaskSpec::video("BV2", "out"))
        .await
        .unwrap();
    let err = downloader
        .create_task(TaskSpec::video("BV3", "out"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::QueueFull { capacity: 1 }));
    assert_eq!(downloader.list().await.len(), 2);
}

#[tokio::test]
async fn failing_task_does_not_affect_its_neighbour() {
    let source = FakeSource::default().fail_permanently("BVbad", 1);
    let TestDownloader { downloader, .. } = create_test_downloader(source).await;

    let bad = downloader
        .create_task(TaskSpec::video("BVbad", "out"))
        .await
        .unwrap();
    let good = downloader
        .create_task(TaskSpec::video("BVgood", "out"))
        .await
        .unwrap();

    wait_for_state(&downloader, &bad, TaskState::Failed).await;
    wait_for_state(&downloader, &good, TaskState::Completed).await;
    wait_until("executors to deregister", async || {
        downloader.queue_state.active_tasks.lock().await.is_empty()
    })
    .await;
}
