mod common;

use common::*;
use phasegate::api::{MockConfirmer, MockNotifier};
use phasegate::error::EngineError;
use phasegate::types::{Decision, TransitionOutcome};

#[tokio::test]
async fn standard_user_blocked_by_incomplete_tasks() {
    let backend = abc_backend().with_records(vec![record(1, 1, 101, "S", "N")]);
    let notifier = MockNotifier::new();
    let mut engine = engine(&backend, &notifier, MockConfirmer::new(vec![]), STANDARD_ROLE).await;

    let err = engine.request_transition(2).await.unwrap_err();
    assert!(matches!(err, EngineError::PriorPhaseIncomplete(ref name) if name == "A"));
    assert_eq!(engine.active_phase().unwrap().id, 1);
}

#[tokio::test]
async fn standard_user_blocked_until_notification_confirmed() {
    // Every task complete, but the supervisor mail was never sent.
    let backend = abc_backend().with_records(vec![
        record(1, 1, 101, "S", "N"),
        record(2, 1, 102, "S", "N"),
    ]);
    let notifier = MockNotifier::new();
    let mut engine = engine(&backend, &notifier, MockConfirmer::new(vec![]), STANDARD_ROLE).await;

    let err = engine.request_transition(2).await.unwrap_err();
    assert!(matches!(err, EngineError::NotificationNotConfirmed(_)));
    assert!(err.to_string().contains("Envía el correo"), "got: {}", err);

    // Nothing moved: phase pointer and external state are untouched.
    assert_eq!(engine.active_phase().unwrap().id, 1);
    assert_eq!(backend.stored_product_state(PRODUCT), Some(10));
}

#[tokio::test]
async fn supervisor_overrides_gates_after_confirmation() {
    let backend = abc_backend(); // no records at all: incomplete + unvalidated
    let notifier = MockNotifier::new();
    let mut engine = engine(
        &backend,
        &notifier,
        MockConfirmer::accepting_all(),
        SUPERVISOR_ROLE,
    )
    .await;

    let outcome = engine.request_transition(2).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Moved);
    assert_eq!(engine.active_phase().unwrap().id, 2);
}

#[tokio::test]
async fn supervisor_decline_cancels_advance() {
    let backend = abc_backend();
    let notifier = MockNotifier::new();
    let mut engine = engine(
        &backend,
        &notifier,
        MockConfirmer::new(vec![Decision::Declined]),
        SUPERVISOR_ROLE,
    )
    .await;

    let err = engine.request_transition(2).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(engine.active_phase().unwrap().id, 1);
}

#[tokio::test]
async fn regression_requires_supervisor() {
    let backend = abc_backend().with_product_state(PRODUCT, 20); // active phase B
    let notifier = MockNotifier::new();
    let mut engine = engine(
        &backend,
        &notifier,
        MockConfirmer::accepting_all(),
        STANDARD_ROLE,
    )
    .await;
    assert_eq!(engine.active_phase().unwrap().id, 2);

    let err = engine.request_transition(1).await.unwrap_err();
    assert!(matches!(err, EngineError::PrivilegeDenied(_)));
    assert_eq!(engine.active_phase().unwrap().id, 2);
}

#[tokio::test]
async fn regression_resets_destination_phase_records() {
    let backend = abc_backend()
        .with_product_state(PRODUCT, 20)
        .with_records(vec![
            record(1, 1, 101, "S", "S"),
            record(2, 1, 102, "S", "S"),
        ]);
    let notifier = MockNotifier::new();
    let mut engine = engine(
        &backend,
        &notifier,
        MockConfirmer::accepting_all(),
        SUPERVISOR_ROLE,
    )
    .await;

    let outcome = engine.request_transition(1).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Moved);
    assert_eq!(engine.active_phase().unwrap().id, 1);

    // Compensating reset: both flags negative on every destination record.
    for stored in backend
        .records_snapshot()
        .iter()
        .filter(|r| r.phase_id == 1)
    {
        assert_eq!(stored.flag("completada"), Some("N"));
        assert_eq!(stored.flag("validadaSupervisor"), Some("N"));
    }
}

#[tokio::test]
async fn regression_creates_missing_records_during_reset() {
    // Task 102 never got a record; the reset materializes one, all-negative.
    let backend = abc_backend()
        .with_product_state(PRODUCT, 20)
        .with_records(vec![record(1, 1, 101, "S", "S")]);
    let notifier = MockNotifier::new();
    let mut engine = engine(
        &backend,
        &notifier,
        MockConfirmer::accepting_all(),
        SUPERVISOR_ROLE,
    )
    .await;

    engine.request_transition(1).await.unwrap();

    let snapshot = backend.records_snapshot();
    let created = snapshot
        .iter()
        .find(|r| r.task_id == 102)
        .expect("reset should create the missing record");
    assert_eq!(created.flag("completada"), Some("N"));
    assert_eq!(created.flag("validadaSupervisor"), Some("N"));
}

#[tokio::test]
async fn declined_regression_changes_nothing() {
    let backend = abc_backend()
        .with_product_state(PRODUCT, 20)
        .with_records(vec![record(1, 1, 101, "S", "S")]);
    let notifier = MockNotifier::new();
    let mut engine = engine(
        &backend,
        &notifier,
        MockConfirmer::new(vec![Decision::Declined]),
        SUPERVISOR_ROLE,
    )
    .await;

    let err = engine.request_transition(1).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(engine.active_phase().unwrap().id, 2);
    assert_eq!(backend.record_update_count(), 0);
    assert_eq!(
        backend.records_snapshot()[0].flag("completada"),
        Some("S")
    );
}

#[tokio::test]
async fn unknown_phase_is_rejected() {
    let backend = abc_backend();
    let notifier = MockNotifier::new();
    let mut engine = engine(&backend, &notifier, MockConfirmer::new(vec![]), STANDARD_ROLE).await;

    let err = engine.request_transition(99).await.unwrap_err();
    assert!(matches!(err, EngineError::PhaseNotFound(99)));
}

#[tokio::test]
async fn same_phase_is_a_noop() {
    let backend = abc_backend();
    let notifier = MockNotifier::new();
    let mut engine = engine(&backend, &notifier, MockConfirmer::new(vec![]), STANDARD_ROLE).await;

    let outcome = engine.request_transition(1).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::NoOp);
}

#[tokio::test]
async fn missing_view_capability_is_a_noop() {
    let backend = abc_backend().deny_action("ver");
    let notifier = MockNotifier::new();
    let mut engine = engine(&backend, &notifier, MockConfirmer::new(vec![]), STANDARD_ROLE).await;

    let outcome = engine.request_transition(2).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::NoOp);
    assert_eq!(engine.active_phase().unwrap().id, 1);
}

#[tokio::test]
async fn remote_failure_during_gate_check_aborts_cleanly() {
    let backend = abc_backend().fail_record_reads();
    let notifier = MockNotifier::new();
    let mut engine = engine(&backend, &notifier, MockConfirmer::new(vec![]), STANDARD_ROLE).await;

    let err = engine.request_transition(2).await.unwrap_err();
    assert!(err.is_remote());
    assert_eq!(engine.active_phase().unwrap().id, 1);
}
