use super::*;

#[tokio::test]
async fn test_wait_idle_returns_immediately_when_nothing_queued() {
    let h = create_test_downloader(test_settings());

    assert!(h.downloader.is_idle());
    tokio::time::timeout(Duration::from_secs(1), h.downloader.wait_idle())
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_and_queued_jobs() {
    let settings = Settings {
        concurrency_limit: 1,
        ..test_settings()
    };
    let h = create_test_downloader(settings);

    let handles = h
        .downloader
        .enqueue(vec![job("a"), job("b")])
        .unwrap();

    h.downloader.shutdown().await.unwrap();

    assert!(h.downloader.is_idle());
    assert!(!h.downloader.is_accepting());
    assert_eq!(h.contexts.open_order(), vec!["a", "b"]);
    for handle in handles {
        assert!(handle.outcome().await.is_completed());
    }
}

#[tokio::test(start_paused = true)]
async fn test_requests_after_shutdown_are_rejected() {
    let h = create_test_downloader(test_settings());
    h.downloader.shutdown().await.unwrap();

    assert!(matches!(
        h.downloader.enqueue(vec![job("late")]),
        Err(Error::ShuttingDown)
    ));
    assert!(matches!(
        h.downloader.enqueue_reported(job("late")),
        Err(Error::ShuttingDown)
    ));

    let url = url::Url::parse("https://cdn.example/late.jpg").unwrap();
    let err = h
        .downloader
        .queue_single_asset(
            crate::types::AssetData::Location(url),
            PathBuf::from("late.jpg"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
    assert_eq!(h.fetcher.requests.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn test_dispatch_without_runtime_leaves_jobs_queued() {
    let h = create_test_downloader(test_settings());

    h.downloader.enqueue(vec![job("a")]).unwrap();

    assert_eq!(h.downloader.stats().queued, 1);
    assert!(!h.downloader.is_idle());
}
