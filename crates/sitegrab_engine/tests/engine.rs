use std::time::Duration;

use sitegrab_engine::{EngineConfig, EngineEvent, EngineHandle, Job, JobOutcome};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn collect_until_done(engine: &EngineHandle) -> Vec<EngineEvent> {
    engine_logging::initialize_for_tests();
    let mut events = Vec::new();
    for _ in 0..200 {
        while let Some(event) = engine.try_recv() {
            let done = matches!(event, EngineEvent::JobCompleted { .. });
            events.push(event);
            if done {
                return events;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job did not complete: {events:?}");
}

#[tokio::test]
async fn download_job_reports_start_progress_and_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("some notes", "text/plain"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let engine = EngineHandle::new(EngineConfig::default_with_output(temp.path().to_path_buf()));
    engine.enqueue(
        1,
        Job::Download {
            url: format!("{}/notes.txt", server.uri()),
            output_name: None,
        },
    );

    let events = collect_until_done(&engine).await;
    let EngineEvent::Started { job_id, status, .. } = &events[0] else {
        panic!("first event should be Started: {events:?}");
    };
    assert_eq!(*job_id, 1);
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::Progress(progress) if progress.downloaded == 10
    )));

    let Some(EngineEvent::JobCompleted { result, .. }) = events.last() else {
        unreachable!();
    };
    match result {
        Ok(JobOutcome::Downloaded { path, bytes, .. }) => {
            assert_eq!(*bytes, 10);
            assert_eq!(path, &temp.path().join("notes.txt"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(status.status_code(), Some(200));
}

#[tokio::test]
async fn failed_job_reports_the_failure_kind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let engine = EngineHandle::new(EngineConfig::default_with_output(temp.path().to_path_buf()));
    engine.enqueue(
        9,
        Job::Download {
            url: format!("{}/missing", server.uri()),
            output_name: None,
        },
    );

    let events = collect_until_done(&engine).await;
    let Some(EngineEvent::JobCompleted { job_id, result }) = events.last() else {
        unreachable!();
    };
    assert_eq!(*job_id, 9);
    let err = result.as_ref().unwrap_err();
    assert_eq!(err.kind, sitegrab_engine::FailureKind::StatusNotAllowed(404));
    assert!(!temp.path().join("missing").exists());
}
