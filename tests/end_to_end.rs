//! End-to-end tests: queued chapters fetched over HTTP and written to disk
//!
//! A local wiremock server plays the image host; rendering contexts are
//! fakes that expose pre-built page lists.

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chapter_dl::{Command, CommandResponse, Event, JobOutcome, OutputMode, Settings};
use common::{chapter_job, collect_events_until, create_downloader, fast_settings, serve_chapter};
use std::io::Read;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_individual_pages_land_in_chapter_folders() {
    let server = MockServer::start().await;
    serve_chapter(&server, "ch1", 3).await;
    serve_chapter(&server, "ch2", 3).await;
    let (downloader, temp_dir) = create_downloader(fast_settings(), 3);

    let handles = downloader
        .enqueue(vec![chapter_job(&server, "ch1"), chapter_job(&server, "ch2")])
        .unwrap();
    for handle in handles {
        match handle.outcome().await {
            JobOutcome::Completed(output) => {
                assert_eq!((output.assets_saved, output.assets_failed), (3, 0));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    for chapter in ["ch1", "ch2"] {
        let dir = temp_dir.path().join("Series").join(chapter);
        for page in ["001.jpeg", "002.jpeg", "003.jpeg"] {
            assert!(dir.join(page).is_file(), "missing {chapter}/{page}");
        }
    }
}

#[tokio::test]
async fn test_missing_page_is_counted_and_others_saved() {
    let server = MockServer::start().await;
    serve_chapter(&server, "ch1", 2).await;
    // Page index 2 is not served: wiremock answers 404 on every attempt
    let (downloader, temp_dir) = create_downloader(fast_settings(), 3);

    let handle = downloader
        .enqueue(vec![chapter_job(&server, "ch1")])
        .unwrap()
        .remove(0);

    match handle.outcome().await {
        JobOutcome::Completed(output) => {
            assert_eq!((output.assets_saved, output.assets_failed), (2, 1));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let dir = temp_dir.path().join("Series").join("ch1");
    assert!(dir.join("002.jpeg").is_file());
    assert!(!dir.join("003.jpeg").exists());

    let misses = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/img/ch1/2.jpg")
        .count();
    // First attempt plus the default three retries
    assert_eq!(misses, 4);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/ch1/0.jpg"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    serve_chapter(&server, "ch1", 1).await;
    let (downloader, temp_dir) = create_downloader(fast_settings(), 1);

    let handle = downloader
        .enqueue(vec![chapter_job(&server, "ch1")])
        .unwrap()
        .remove(0);

    match handle.outcome().await {
        JobOutcome::Completed(output) => assert_eq!(output.assets_saved, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(temp_dir.path().join("Series/ch1/001.jpeg").is_file());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_comic_archive_written_to_disk() {
    let server = MockServer::start().await;
    serve_chapter(&server, "ch9", 4).await;
    let settings = Settings {
        output_mode: OutputMode::ComicArchive,
        ..fast_settings()
    };
    let (downloader, temp_dir) = create_downloader(settings, 4);

    let handle = downloader
        .enqueue(vec![chapter_job(&server, "ch9")])
        .unwrap()
        .remove(0);

    let artifact = match handle.outcome().await {
        JobOutcome::Completed(output) => output.artifact.unwrap(),
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(artifact, temp_dir.path().join("Series - ch9.cbz"));

    let file = std::fs::File::open(&artifact).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    for page in ["001.jpeg", "002.jpeg", "003.jpeg", "004.jpeg", "ComicInfo.xml"] {
        assert!(names.iter().any(|n| n == page), "missing {page}");
    }

    let mut info = String::new();
    archive
        .by_name("ComicInfo.xml")
        .unwrap()
        .read_to_string(&mut info)
        .unwrap();
    assert!(info.contains("<Series>Series</Series>"));
    assert!(info.contains("<PageCount>4</PageCount>"));
}

#[tokio::test]
async fn test_pdf_rendered_through_auxiliary_context() {
    let server = MockServer::start().await;
    serve_chapter(&server, "ch3", 2).await;
    let settings = Settings {
        output_mode: OutputMode::PdfDocument,
        ..fast_settings()
    };
    let (downloader, temp_dir) = create_downloader(settings, 2);

    let handle = downloader
        .enqueue(vec![chapter_job(&server, "ch3")])
        .unwrap()
        .remove(0);

    assert!(handle.outcome().await.is_completed());
    let pdf = std::fs::read(temp_dir.path().join("Series - ch3.pdf")).unwrap();
    assert_eq!(pdf, b"PDF ch3 2");
}

#[tokio::test]
async fn test_json_commands_drive_the_queue() {
    let server = MockServer::start().await;
    serve_chapter(&server, "ch5", 1).await;
    let (downloader, temp_dir) = create_downloader(fast_settings(), 1);
    let mut rx = downloader.subscribe();

    let json = format!(
        r#"{{"action":"enqueueJobs","jobs":[{{"source_location":"{}/read/ch5","unit_name":"ch5","parent_collection_name":"Series"}}]}}"#,
        server.uri()
    );
    let command: Command = serde_json::from_str(&json).unwrap();
    let response = downloader.handle_command(command).await.unwrap();
    let CommandResponse::Enqueued { job_ids } = response else {
        panic!("unexpected response: {response:?}");
    };
    assert_eq!(job_ids.len(), 1);

    let events = collect_events_until(&mut rx, Duration::from_secs(10), |e| {
        matches!(e, Event::QueueDrained)
    })
    .await;
    assert!(events.iter().any(
        |e| matches!(e, Event::JobComplete { id, .. } if *id == job_ids[0])
    ));
    assert!(temp_dir.path().join("Series/ch5/001.jpeg").is_file());
}

#[tokio::test]
async fn test_shutdown_finishes_queued_work() {
    let server = MockServer::start().await;
    for chapter in ["a", "b", "c"] {
        serve_chapter(&server, chapter, 2).await;
    }
    let settings = Settings {
        concurrency_limit: 1,
        ..fast_settings()
    };
    let (downloader, temp_dir) = create_downloader(settings, 2);

    downloader
        .enqueue(["a", "b", "c"].iter().map(|c| chapter_job(&server, c)).collect())
        .unwrap();
    downloader.shutdown().await.unwrap();

    for chapter in ["a", "b", "c"] {
        assert!(temp_dir.path().join("Series").join(chapter).join("002.jpeg").is_file());
    }
    assert!(downloader.enqueue(vec![chapter_job(&server, "d")]).is_err());
}
