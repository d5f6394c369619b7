use super::*;
use crate::config::FileCollisionAction;
use crate::session::{Session, SubscriptionTier};
use crate::types::Identity;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    workflow: ConversionWorkflow,
    events: broadcast::Receiver<Event>,
    download_dir: PathBuf,
    _temp_dir: TempDir,
}

fn harness_for(base_url: &str) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let download_dir = temp_dir.path().join("downloads");
    let config = Config {
        api_base_url: base_url.to_string(),
        download: crate::config::DownloadConfig {
            download_dir: download_dir.clone(),
            file_collision: FileCollisionAction::Rename,
        },
        ..Default::default()
    };
    let (event_tx, events) = broadcast::channel(64);
    Harness {
        workflow: ConversionWorkflow::from_config(&config, event_tx).unwrap(),
        events,
        download_dir,
        _temp_dir: temp_dir,
    }
}

fn session() -> Session {
    Session {
        identity: Identity::new("user-1", "alice@example.com"),
        tier: SubscriptionTier::Free,
    }
}

fn jan() -> PendingFile {
    PendingFile::new("jan.pdf", b"%PDF-1.7 jan".to_vec(), "application/pdf")
}

async fn mount(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/convert"))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn wait_for_state(workflow: &ConversionWorkflow, expected: WorkflowState) {
    for _ in 0..500 {
        if workflow.state().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("workflow never reached {expected:?}");
}

fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn expect_resolved(step: SubmitStep) -> ConversionOutcome {
    match step {
        SubmitStep::Resolved(outcome) => outcome,
        other => panic!("expected resolved step, got {other:?}"),
    }
}

#[tokio::test]
async fn starts_idle_with_csv() {
    let h = harness_for("http://127.0.0.1:9");
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert_eq!(h.workflow.format().await, TargetFormat::Csv);
    assert!(h.workflow.pending_file().await.is_none());
    assert!(!h.workflow.can_submit().await);
}

#[tokio::test]
async fn success_without_signals_saves_file() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_bytes(b"!Type:Bank\n".to_vec()),
    )
    .await;
    let mut h = harness_for(&server.uri());

    h.workflow.select_file(jan()).await.unwrap();
    h.workflow.set_format(TargetFormat::Qbo).await.unwrap();
    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    let saved = h.download_dir.join("Vsync-jan.qbo");
    assert_eq!(
        outcome,
        ConversionOutcome::Success {
            bytes: b"!Type:Bank\n".to_vec(),
            filename: "Vsync-jan.qbo".into(),
            saved_to: Some(saved.clone()),
        }
    );
    assert_eq!(std::fs::read(&saved).unwrap(), b"!Type:Bank\n");
    assert_eq!(h.workflow.state().await, WorkflowState::Resolved);
    assert!(h.workflow.pending_file().await.is_none());
    assert!(h.workflow.reconciliation().await.is_none());

    let events = drain(&mut h.events);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, Event::ConfirmationRequired { .. })),
        "no confirmation pause expected: {events:?}"
    );
    assert!(matches!(
        events.last(),
        Some(Event::ConversionSucceeded { filename, .. }) if filename == "Vsync-jan.qbo"
    ));
}

#[tokio::test]
async fn mt940_is_saved_with_sta_extension() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_bytes(b":20:STMT".to_vec())).await;
    let h = harness_for(&server.uri());

    h.workflow.select_file(jan()).await.unwrap();
    h.workflow.set_format(TargetFormat::Mt940).await.unwrap();
    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    match outcome {
        ConversionOutcome::Success { filename, .. } => assert_eq!(filename, "Vsync-jan.sta"),
        other => panic!("expected success, got {other:?}"),
    }
    assert!(h.download_dir.join("Vsync-jan.sta").exists());
}

#[tokio::test]
async fn submit_without_file_is_rejected_before_io() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let h = harness_for(&server.uri());

    let result = h.workflow.submit(&session()).await;

    assert!(matches!(
        result,
        Err(Error::Caller(CallerError::NoFileSelected))
    ));
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
}

#[tokio::test]
async fn declined_fraud_warning_keeps_selection_and_skips_body() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .insert_header("x-fraud-warning", "Totals edited after issue")
            .insert_header("x-reconciliation-status", "IMBALANCE: 3.00")
            .set_body_bytes(b"converted".to_vec()),
    )
    .await;
    let mut h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();
    h.workflow.set_format(TargetFormat::Ofx).await.unwrap();

    let step = h.workflow.submit(&session()).await.unwrap();
    assert_eq!(
        step,
        SubmitStep::ConfirmationRequired {
            warning: "Totals edited after issue".into()
        }
    );
    assert_eq!(h.workflow.state().await, WorkflowState::AwaitingConfirmation);
    assert_eq!(
        h.workflow.pending_warning().await.as_deref(),
        Some("Totals edited after issue")
    );

    let outcome = h.workflow.decline().await.unwrap();

    assert_eq!(outcome, ConversionOutcome::SecurityDeclined);
    assert_eq!(h.workflow.state().await, WorkflowState::FileSelected);
    assert_eq!(h.workflow.pending_file().await, Some(jan()));
    assert_eq!(h.workflow.format().await, TargetFormat::Ofx);
    assert_eq!(
        h.workflow.last_outcome().await,
        Some(ConversionOutcome::SecurityDeclined)
    );
    // Reconciliation is only read after the warning is acknowledged.
    assert!(h.workflow.reconciliation().await.is_none());
    assert!(!h.download_dir.exists());

    let events = drain(&mut h.events);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, Event::ReconciliationReported { .. }))
    );
    assert!(matches!(events.last(), Some(Event::SecurityDeclined)));
}

#[tokio::test]
async fn confirmed_fraud_warning_delivers_file() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .insert_header("x-fraud-warning", "Font mismatch on page 2")
            .insert_header("x-reconciliation-status", "BALANCED")
            .set_body_bytes(b"{\"rows\":[]}".to_vec()),
    )
    .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();
    h.workflow.set_format(TargetFormat::Json).await.unwrap();

    assert!(matches!(
        h.workflow.submit(&session()).await.unwrap(),
        SubmitStep::ConfirmationRequired { .. }
    ));
    let outcome = h.workflow.confirm().await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(
        h.workflow.reconciliation().await,
        Some(Reconciliation::Balanced)
    );
    assert!(h.download_dir.join("Vsync-jan.json").exists());
    assert_eq!(h.workflow.pending_warning().await, None);
}

#[tokio::test]
async fn imbalance_value_is_reported_verbatim_on_success() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .insert_header("x-reconciliation-status", "IMBALANCE: 12.50")
            .set_body_bytes(b"a,b".to_vec()),
    )
    .await;
    let mut h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    assert!(outcome.is_success(), "imbalance must not block the download");
    let reconciliation = h.workflow.reconciliation().await.unwrap();
    assert_eq!(reconciliation.value(), Some("12.50"));
    assert!(drain(&mut h.events).iter().any(|e| matches!(
        e,
        Event::ReconciliationReported { reconciliation: Reconciliation::Imbalance(v) } if v == "12.50"
    )));
}

#[tokio::test]
async fn server_rejection_is_verbatim_and_keeps_reconciliation() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(400)
            .insert_header("x-reconciliation-status", "BALANCED")
            .set_body_string("Bad file"),
    )
    .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    assert_eq!(outcome, ConversionOutcome::ServerRejected("Bad file".into()));
    assert_eq!(
        h.workflow.reconciliation().await,
        Some(Reconciliation::Balanced)
    );
    assert_eq!(h.workflow.state().await, WorkflowState::Resolved);
    assert_eq!(h.workflow.pending_file().await, Some(jan()));
    assert!(h.workflow.can_submit().await);
}

#[tokio::test]
async fn empty_rejection_body_gets_default_message() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(500)).await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    assert_eq!(
        outcome,
        ConversionOutcome::ServerRejected("Conversion failed.".into())
    );
}

#[tokio::test]
async fn whitespace_rejection_body_is_kept_verbatim() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(400).set_body_string("  \n")).await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    assert_eq!(outcome, ConversionOutcome::ServerRejected("  \n".into()));
}

#[tokio::test]
async fn transport_failure_is_network_failed_and_resubmittable() {
    // Nothing listens on the discard port.
    let mut h = harness_for("http://127.0.0.1:9");
    h.workflow.select_file(jan()).await.unwrap();

    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    assert!(matches!(outcome, ConversionOutcome::NetworkFailed(_)));
    assert_eq!(h.workflow.state().await, WorkflowState::Resolved);
    assert_eq!(h.workflow.pending_file().await, Some(jan()));
    assert!(h.workflow.can_submit().await);
    assert!(matches!(
        drain(&mut h.events).last(),
        Some(Event::ConversionNetworkFailed { .. })
    ));
}

#[tokio::test]
async fn second_submission_while_in_flight_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"slow".to_vec())
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let first = {
        let workflow = h.workflow.clone();
        tokio::spawn(async move { workflow.submit(&session()).await })
    };
    wait_for_state(&h.workflow, WorkflowState::Submitting).await;

    let second = h.workflow.submit(&session()).await;
    assert!(matches!(
        second,
        Err(Error::Caller(CallerError::SubmissionInFlight))
    ));
    assert!(!h.workflow.can_submit().await);

    let outcome = expect_resolved(first.await.unwrap().unwrap());
    assert!(outcome.is_success());
}

#[tokio::test]
async fn controls_are_locked_while_submitting() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_delay(Duration::from_millis(300)),
    )
    .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let first = {
        let workflow = h.workflow.clone();
        tokio::spawn(async move { workflow.submit(&session()).await })
    };
    wait_for_state(&h.workflow, WorkflowState::Submitting).await;

    assert!(matches!(
        h.workflow.set_format(TargetFormat::Iif).await,
        Err(Error::Caller(CallerError::ControlsLocked))
    ));
    assert!(matches!(
        h.workflow.select_file(jan()).await,
        Err(Error::Caller(CallerError::ControlsLocked))
    ));

    first.await.unwrap().unwrap();
    assert_eq!(h.workflow.format().await, TargetFormat::Csv);
}

#[tokio::test]
async fn paused_workflow_rejects_other_calls() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).insert_header("x-fraud-warning", "Edited PDF"),
    )
    .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();
    h.workflow.submit(&session()).await.unwrap();

    assert!(matches!(
        h.workflow.submit(&session()).await,
        Err(Error::Caller(CallerError::ConfirmationPending))
    ));
    assert!(matches!(
        h.workflow.select_file(jan()).await,
        Err(Error::Caller(CallerError::ControlsLocked))
    ));
    assert_eq!(h.workflow.state().await, WorkflowState::AwaitingConfirmation);
}

#[tokio::test]
async fn confirm_and_decline_require_a_pause() {
    let h = harness_for("http://127.0.0.1:9");
    h.workflow.select_file(jan()).await.unwrap();

    assert!(matches!(
        h.workflow.confirm().await,
        Err(Error::Caller(CallerError::NoConfirmationPending))
    ));
    assert!(matches!(
        h.workflow.decline().await,
        Err(Error::Caller(CallerError::NoConfirmationPending))
    ));
    assert_eq!(h.workflow.state().await, WorkflowState::FileSelected);
}

#[tokio::test]
async fn format_change_after_failure_clears_outcome() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(422)
            .insert_header("x-reconciliation-status", "IMBALANCE: 1.00")
            .set_body_string("Unreadable scan"),
    )
    .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();
    h.workflow.submit(&session()).await.unwrap();

    h.workflow.set_format(TargetFormat::Bai2).await.unwrap();

    assert_eq!(h.workflow.state().await, WorkflowState::FileSelected);
    assert!(h.workflow.last_outcome().await.is_none());
    assert!(h.workflow.reconciliation().await.is_none());
    assert_eq!(h.workflow.pending_file().await, Some(jan()));
}

#[tokio::test]
async fn reselecting_replaces_pending_file_and_keeps_format() {
    let h = harness_for("http://127.0.0.1:9");
    h.workflow.set_format(TargetFormat::Excel).await.unwrap();
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);

    h.workflow.select_file(jan()).await.unwrap();
    let feb = PendingFile::new("feb.png", vec![0x89, b'P', b'N', b'G'], "image/png");
    h.workflow.select_file(feb.clone()).await.unwrap();

    assert_eq!(h.workflow.pending_file().await, Some(feb));
    assert_eq!(h.workflow.format().await, TargetFormat::Excel);
    assert_eq!(h.workflow.state().await, WorkflowState::FileSelected);
}

#[tokio::test]
async fn success_returns_to_idle_on_next_selection() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_bytes(b"x".to_vec())).await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();
    h.workflow.submit(&session()).await.unwrap();

    assert!(matches!(
        h.workflow.submit(&session()).await,
        Err(Error::Caller(CallerError::NoFileSelected))
    ));

    h.workflow.select_file(jan()).await.unwrap();
    assert!(h.workflow.last_outcome().await.is_none());
    assert_eq!(h.workflow.state().await, WorkflowState::FileSelected);
}

#[tokio::test]
async fn reset_during_flight_discards_late_outcome() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .set_body_bytes(b"late".to_vec())
            .set_delay(Duration::from_millis(200)),
    )
    .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let first = {
        let workflow = h.workflow.clone();
        tokio::spawn(async move { workflow.submit(&session()).await })
    };
    wait_for_state(&h.workflow, WorkflowState::Submitting).await;
    h.workflow.reset().await;
    first.await.unwrap().unwrap();

    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert!(h.workflow.last_outcome().await.is_none());
    assert!(h.workflow.pending_file().await.is_none());
    assert!(!h.download_dir.join("Vsync-jan.csv").exists());
}

#[tokio::test]
async fn submit_stays_locked_until_orphaned_request_finishes() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .set_body_bytes(b"late".to_vec())
            .set_delay(Duration::from_millis(300)),
    )
    .await;
    let h = harness_for(&server.uri());
    h.workflow.select_file(jan()).await.unwrap();

    let orphaned = {
        let workflow = h.workflow.clone();
        tokio::spawn(async move { workflow.submit(&session()).await })
    };
    wait_for_state(&h.workflow, WorkflowState::Submitting).await;
    h.workflow.reset().await;

    h.workflow.select_file(jan()).await.unwrap();
    assert!(!h.workflow.can_submit().await);
    assert!(matches!(
        h.workflow.submit(&session()).await,
        Err(Error::Caller(CallerError::SubmissionInFlight))
    ));

    orphaned.await.unwrap().unwrap();
    assert!(h.workflow.can_submit().await);
    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());
    assert!(outcome.is_success());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn save_failure_still_reports_success() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_bytes(b"x".to_vec())).await;
    let h = harness_for(&server.uri());
    // A regular file where the download directory should be.
    std::fs::create_dir_all(h.download_dir.parent().unwrap()).unwrap();
    std::fs::write(&h.download_dir, b"not a dir").unwrap();
    h.workflow.select_file(jan()).await.unwrap();

    let outcome = expect_resolved(h.workflow.submit(&session()).await.unwrap());

    match outcome {
        ConversionOutcome::Success {
            filename, saved_to, ..
        } => {
            assert_eq!(filename, "Vsync-jan.csv");
            assert_eq!(saved_to, None);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn select_file_from_path_reads_name_and_mime() {
    let h = harness_for("http://127.0.0.1:9");
    let dir = TempDir::new().unwrap();
    let statement = dir.path().join("march.xlsx");
    std::fs::write(&statement, b"PK\x03\x04").unwrap();

    h.workflow.select_file_from_path(&statement).await.unwrap();

    let file = h.workflow.pending_file().await.unwrap();
    assert_eq!(file.display_name, "march.xlsx");
    assert_eq!(file.bytes, b"PK\x03\x04");
    assert_eq!(
        file.mime_type,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );

    let missing = h
        .workflow
        .select_file_from_path(&dir.path().join("missing.pdf"))
        .await;
    assert!(matches!(missing, Err(Error::Io(_))));
    assert_eq!(h.workflow.pending_file().await, Some(file));
}
