//! End-to-end runs of the session driver against a fake optimisation service
//! bound to sockets in a temporary directory.

mod common;

use common::{eventually, media_files, printed_report, session_driver, settings, Behaviour, FakeService};
use optimise_cli::driver::{BatchOptions, SessionOutcome};
use optimise_cli::error::ClientError;
use optimise_cli::model::{StopRequest, WorkItem};
use optimise_cli::output::OutputLine;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn synchronous_batch_reports_every_item() {
    let sockets = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    let service = FakeService::start(sockets.path(), Behaviour::Complete);
    let items = media_files(&files, 3);

    let (driver, mut rx) = session_driver(sockets.path(), settings(false, Duration::from_secs(5)));
    let outcome = driver
        .run(items.clone(), &BatchOptions::default(), futures::future::pending())
        .await
        .unwrap();

    let SessionOutcome::Completed(report) = outcome else {
        panic!("expected a completed session, got {outcome:?}");
    };
    assert_eq!(report.done.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(printed_report(&mut rx), report);

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].items, items);
    assert!(requests[0].hide_floating_result);
    assert!(service.stops().is_empty());
}

#[tokio::test]
async fn fire_and_forget_sends_one_request_and_returns() {
    let sockets = tempfile::tempdir().unwrap();
    let service = FakeService::start(sockets.path(), Behaviour::AckOnly);
    let items: Vec<WorkItem> = (0..5)
        .map(|i| WorkItem::remote(format!("https://example.com/{i}.jpg")))
        .collect();

    let (driver, mut rx) = session_driver(sockets.path(), settings(true, Duration::from_secs(5)));
    let outcome = driver
        .run(items.clone(), &BatchOptions::default(), futures::future::pending())
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Queued { count: 5 }));

    eventually(|| !service.requests().is_empty()).await;
    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].items, items);
    while let Ok(line) = rx.try_recv() {
        assert!(!matches!(line, OutputLine::Stdout(_)), "no report in async mode");
    }
}

#[tokio::test]
async fn interrupt_sends_exactly_one_stop_for_the_whole_batch() {
    let sockets = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::start(sockets.path(), Behaviour::AckOnly));
    let items = media_files(&files, 3);

    let watcher = service.clone();
    let interrupt = async move {
        eventually(|| !watcher.requests().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    };

    let (driver, mut rx) = session_driver(sockets.path(), settings(false, Duration::from_secs(30)));
    let outcome = driver
        .run(items.clone(), &BatchOptions::default(), interrupt)
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Cancelled { stopped: 3 }));

    // Whatever was drawn before the interrupt is already queued; nothing new
    // may be drawn afterwards, and the display must be released.
    while rx.try_recv().is_ok() {}
    tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(line) = rx.recv().await {
            assert!(!matches!(line, OutputLine::Frame(_)), "frame drawn after interrupt");
            assert!(!matches!(line, OutputLine::Stdout(_)), "report printed after interrupt");
        }
    })
    .await
    .expect("display released after interrupt");

    eventually(|| !service.stops().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let expected: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    assert_eq!(
        service.stops(),
        vec![StopRequest {
            ids: expected,
            remove: false
        }]
    );
}

#[tokio::test]
async fn rejected_items_are_reported_as_failures() {
    let sockets = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    let _service = FakeService::start(sockets.path(), Behaviour::RejectFirst);
    let items = media_files(&files, 2);

    let (driver, _rx) = session_driver(sockets.path(), settings(false, Duration::from_secs(5)));
    let outcome = driver
        .run(items.clone(), &BatchOptions::default(), futures::future::pending())
        .await
        .unwrap();

    let SessionOutcome::Completed(report) = outcome else {
        panic!("expected a completed session, got {outcome:?}");
    };
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].for_item, items[0]);
    assert_eq!(report.done.len(), 1);
    assert_eq!(report.done[0].for_item, items[1]);
}

#[tokio::test]
async fn missing_acknowledgement_is_an_optimisation_error() {
    let sockets = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    let _service = FakeService::start(sockets.path(), Behaviour::Silent);

    let (driver, _rx) = session_driver(sockets.path(), settings(false, Duration::from_secs(5)));
    let err = driver
        .run(media_files(&files, 1), &BatchOptions::default(), futures::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Optimisation));
    assert_eq!(err.exit_code(), 5);
}

#[tokio::test]
async fn unreachable_service_fails_fast() {
    let sockets = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();

    let (driver, _rx) = session_driver(sockets.path(), settings(false, Duration::from_secs(5)));
    let err = driver
        .run(media_files(&files, 1), &BatchOptions::default(), futures::future::pending())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn wait_timeout_prints_a_partial_report() {
    let sockets = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    let _service = FakeService::start(sockets.path(), Behaviour::AckOnly);
    let items = media_files(&files, 2);

    let (driver, mut rx) = session_driver(sockets.path(), settings(false, Duration::from_millis(300)));
    let err = driver
        .run(items.clone(), &BatchOptions::default(), futures::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Incomplete { pending: 2, total: 2 }));
    assert_eq!(err.exit_code(), 6);

    let report = printed_report(&mut rx);
    assert!(report.done.is_empty());
    assert_eq!(report.pending, items);
}
