mod common;

use std::collections::HashMap;

use common::*;
use phasegate::api::MockBackend;
use phasegate::config::FlagConfig;
use phasegate::flags::FlagKeys;
use phasegate::gates;

fn keys() -> FlagKeys {
    FlagKeys::from_config(&FlagConfig::default()).unwrap()
}

#[tokio::test]
async fn completion_gate_is_vacuously_true_without_tasks() {
    let backend = MockBackend::new();
    assert!(gates::is_phase_fully_completed(&backend, &keys(), PRODUCT, 5)
        .await
        .unwrap());
}

#[tokio::test]
async fn completion_gate_requires_every_task_to_join_affirmatively() {
    // One of two tasks has an affirmative record; the other has none at all.
    let backend = abc_backend().with_records(vec![record(1, 1, 101, "S", "N")]);
    assert!(!gates::is_phase_fully_completed(&backend, &keys(), PRODUCT, 1)
        .await
        .unwrap());
    assert_eq!(
        gates::count_pending_tasks(&backend, &keys(), PRODUCT, 1)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn validation_gate_is_never_vacuously_true() {
    let backend = abc_backend(); // zero records for phase 1
    assert!(!gates::is_phase_validated(&backend, &keys(), PRODUCT, 1)
        .await
        .unwrap());
}

#[tokio::test]
async fn validation_gate_holds_when_every_record_is_validated() {
    // Validation is independent of completion.
    let backend = abc_backend().with_records(vec![
        record(1, 1, 101, "S", "S"),
        record(2, 1, 102, "N", "S"),
    ]);
    assert!(gates::is_phase_validated(&backend, &keys(), PRODUCT, 1)
        .await
        .unwrap());
}

#[tokio::test]
async fn reconcile_replaces_the_cache_with_the_remote_truth() {
    let backend = abc_backend().with_records(vec![
        record(1, 1, 101, "S", "S"),
        record(2, 1, 102, "S", "S"),
    ]);

    let mut cache = HashMap::new(); // stale: remote has two validated records
    let validated = gates::reconcile_validation(&backend, &keys(), PRODUCT, 1, &mut cache)
        .await
        .unwrap();

    assert!(validated);
    assert_eq!(cache.len(), 2);
    assert!(gates::cached_validation(&cache, &keys()));
}
