use std::collections::HashMap;

use crate::catalog;
use crate::flags::FlagKeys;
use crate::types::{ExternalState, NotificationIntent, Phase, PhaseTask, TaskRecord};

/// What the dispatcher should do for the active phase.
#[derive(Debug)]
pub enum IntentOutcome {
    /// Dispatch this intent.
    Ready(NotificationIntent),
    /// The active phase is the last one; nothing to dispatch.
    TerminalPhase,
    /// No external state corresponds to the next phase; fail closed.
    StateNotFound(String),
}

/// Build the dispatch intent for the active phase: the completed task names,
/// the catalog's next phase, and the external state matched to it.
pub fn build_intent(
    phase: &Phase,
    next_phase: Option<&Phase>,
    tasks: &[PhaseTask],
    records: &HashMap<i64, TaskRecord>,
    states: &[ExternalState],
    keys: &FlagKeys,
) -> IntentOutcome {
    let Some(next_phase) = next_phase else {
        return IntentOutcome::TerminalPhase;
    };

    let Some(matched) = catalog::match_external_state(states, next_phase) else {
        return IntentOutcome::StateNotFound(next_phase.label());
    };

    let completed_task_names = tasks
        .iter()
        .filter(|task| keys.is_completed(records.get(&task.id)))
        .map(|task| task.name.clone())
        .collect();

    IntentOutcome::Ready(NotificationIntent {
        phase: phase.clone(),
        next_phase: next_phase.clone(),
        completed_task_names,
        matched_state: matched.clone(),
    })
}

pub fn compose_subject(prefix: &str, intent: &NotificationIntent) -> String {
    format!(
        "{} Fase '{}' completada: validación requerida",
        prefix,
        intent.phase.label()
    )
}

pub fn compose_body(product_id: i64, intent: &NotificationIntent) -> String {
    let task_lines = if intent.completed_task_names.is_empty() {
        "  (sin tareas)".to_string()
    } else {
        intent
            .completed_task_names
            .iter()
            .map(|name| format!("  - {}", name))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "El producto {} ha completado la fase '{}'.\n\nTareas completadas:\n{}\n\n\
         Al confirmar, el producto pasará al estado '{}' (fase '{}').",
        product_id,
        intent.phase.label(),
        task_lines,
        intent.matched_state.name,
        intent.next_phase.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlagConfig;

    fn keys() -> FlagKeys {
        FlagKeys::from_config(&FlagConfig::default()).unwrap()
    }

    fn phase(id: i64, name: &str) -> Phase {
        Phase {
            id,
            code: None,
            name: Some(name.to_string()),
        }
    }

    fn task(id: i64, phase_id: i64, name: &str) -> PhaseTask {
        PhaseTask {
            id,
            phase_id,
            name: name.to_string(),
        }
    }

    fn completed_record(task_id: i64) -> TaskRecord {
        let mut record = TaskRecord::new(1, 1, task_id);
        record.set_flag("completada", "S");
        record
    }

    #[test]
    fn terminal_phase_produces_no_intent() {
        let outcome = build_intent(
            &phase(3, "Cierre"),
            None,
            &[],
            &HashMap::new(),
            &[],
            &keys(),
        );
        assert!(matches!(outcome, IntentOutcome::TerminalPhase));
    }

    #[test]
    fn missing_state_fails_closed() {
        let outcome = build_intent(
            &phase(1, "Inicio"),
            Some(&phase(2, "Diseño")),
            &[],
            &HashMap::new(),
            &[], // no external states at all
            &keys(),
        );
        match outcome {
            IntentOutcome::StateNotFound(name) => assert_eq!(name, "Diseño"),
            other => panic!("expected StateNotFound, got {:?}", other),
        }
    }

    #[test]
    fn intent_lists_only_completed_tasks() {
        let tasks = vec![task(10, 1, "Medir"), task(11, 1, "Cortar")];
        let mut records = HashMap::new();
        records.insert(10, completed_record(10));
        let states = vec![ExternalState {
            id: 2,
            name: "Diseño".to_string(),
            code: None,
        }];

        let outcome = build_intent(
            &phase(1, "Inicio"),
            Some(&phase(2, "Diseño")),
            &tasks,
            &records,
            &states,
            &keys(),
        );
        match outcome {
            IntentOutcome::Ready(intent) => {
                assert_eq!(intent.completed_task_names, vec!["Medir".to_string()]);
                assert_eq!(intent.matched_state.id, 2);
                let body = compose_body(7, &intent);
                assert!(body.contains("producto 7"));
                assert!(body.contains("- Medir"));
                assert!(body.contains("'Diseño'"));
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }
}
