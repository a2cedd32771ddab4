#![allow(dead_code)]

use phasegate::api::{MockBackend, MockConfirmer, MockNotifier};
use phasegate::config::PhasegateConfig;
use phasegate::engine::PhaseEngine;
use phasegate::types::{ExternalState, Phase, PhaseTask, Role, TaskRecord};

pub const PRODUCT: i64 = 7;
pub const STANDARD_ROLE: i64 = 1;
pub const SUPERVISOR_ROLE: i64 = 2;

pub fn phase(id: i64, name: &str) -> Phase {
    Phase {
        id,
        code: None,
        name: Some(name.to_string()),
    }
}

pub fn task(id: i64, phase_id: i64, name: &str) -> PhaseTask {
    PhaseTask {
        id,
        phase_id,
        name: name.to_string(),
    }
}

pub fn record(
    id: i64,
    phase_id: i64,
    task_id: i64,
    completed: &str,
    validated: &str,
) -> TaskRecord {
    let mut record = TaskRecord::new(PRODUCT, phase_id, task_id);
    record.id = id;
    record.set_flag("completada", completed);
    record.set_flag("validadaSupervisor", validated);
    record
}

pub fn standard_role() -> Role {
    Role {
        id: STANDARD_ROLE,
        name: "Operario".to_string(),
        active: true,
    }
}

pub fn supervisor_role() -> Role {
    Role {
        id: SUPERVISOR_ROLE,
        name: "Supervisor de planta".to_string(),
        active: true,
    }
}

/// Catalog A -> B -> C with ids 1, 2, 3.
pub fn abc_catalog() -> Vec<Phase> {
    vec![phase(1, "A"), phase(2, "B"), phase(3, "C")]
}

/// External states matching the A/B/C catalog by name, ids 10, 20, 30.
pub fn abc_states() -> Vec<ExternalState> {
    vec![
        ExternalState {
            id: 10,
            name: "A".to_string(),
            code: None,
        },
        ExternalState {
            id: 20,
            name: "B".to_string(),
            code: None,
        },
        ExternalState {
            id: 30,
            name: "C".to_string(),
            code: None,
        },
    ]
}

/// Backend for the reference scenario: product 7 sits in phase A, which has
/// two tasks; both roles are registered.
pub fn abc_backend() -> MockBackend {
    MockBackend::new()
        .with_phases(abc_catalog())
        .with_tasks(1, vec![task(101, 1, "Medir"), task(102, 1, "Cortar")])
        .with_states(abc_states())
        .with_product_state(PRODUCT, 10)
        .with_role(standard_role())
        .with_role(supervisor_role())
}

pub async fn engine<'a>(
    backend: &'a MockBackend,
    notifier: &'a MockNotifier,
    confirmer: MockConfirmer,
    role_id: i64,
) -> PhaseEngine<&'a MockBackend, &'a MockNotifier, MockConfirmer> {
    PhaseEngine::load(
        PhasegateConfig::default(),
        backend,
        notifier,
        confirmer,
        PRODUCT,
        role_id,
    )
    .await
    .expect("engine should load")
}
