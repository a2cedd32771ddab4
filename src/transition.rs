use crate::error::EngineError;
use crate::types::Phase;

/// Direction of a requested phase change, by catalog index comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Advance,
    Regress,
    Stay,
}

pub fn direction(current: usize, target: usize) -> Direction {
    match target.cmp(&current) {
        std::cmp::Ordering::Greater => Direction::Advance,
        std::cmp::Ordering::Less => Direction::Regress,
        std::cmp::Ordering::Equal => Direction::Stay,
    }
}

/// Gate evaluation for one phase earlier than the advance target.
/// Rows are produced (and consumed) strictly in catalog order.
#[derive(Clone, Debug, PartialEq)]
pub struct GateReport {
    pub phase_id: i64,
    pub phase_name: String,
    /// Completion gate: every task of the phase has an affirmative record.
    pub completed: bool,
    /// Tasks still lacking an affirmative completion record.
    pub pending: usize,
    /// Supervisor notification confirmed: remote validation gate holds AND
    /// the local confirmed flag is set.
    pub notified: bool,
}

/// Outcome of planning an advance over the prior phases' gate reports.
#[derive(Debug)]
pub enum AdvanceDecision {
    /// All gates hold; move without prompting.
    Proceed,
    /// Supervisor override path: pending items to confirm before moving.
    NeedsConfirmation(Vec<String>),
    /// A gate blocks the caller; no state change.
    Blocked(EngineError),
}

/// Decide whether an advance may proceed, given gate reports for every phase
/// strictly before the target, in catalog order.
///
/// This is a pure function — no I/O, no async, trivially testable.
///
/// A non-supervisor is blocked by the FIRST failing gate; later reports are
/// not consulted (and the engine never needs to fetch them). A supervisor
/// accumulates a note per failing gate and is asked to confirm the override.
pub fn plan_advance(reports: &[GateReport], is_supervisor: bool) -> AdvanceDecision {
    let mut notes: Vec<String> = Vec::new();

    for report in reports {
        if !report.completed {
            if !is_supervisor {
                return AdvanceDecision::Blocked(EngineError::PriorPhaseIncomplete(
                    report.phase_name.clone(),
                ));
            }
            notes.push(format!(
                "Fase '{}': {} tarea(s) sin completar",
                report.phase_name, report.pending
            ));
        }

        if !report.notified {
            if !is_supervisor {
                return AdvanceDecision::Blocked(EngineError::NotificationNotConfirmed(
                    report.phase_name.clone(),
                ));
            }
            notes.push(format!(
                "Fase '{}': notificación al supervisor sin confirmar",
                report.phase_name
            ));
        }
    }

    if notes.is_empty() {
        AdvanceDecision::Proceed
    } else {
        AdvanceDecision::NeedsConfirmation(notes)
    }
}

/// Confirmation text for a regression, naming both phases and the reset
/// consequence on the destination.
pub fn regression_prompt(from: &Phase, to: &Phase) -> String {
    format!(
        "Vas a retroceder de la fase '{}' a la fase '{}'. Se reiniciarán todas \
         las tareas y validaciones de la fase '{}'. ¿Continuar?",
        from.label(),
        to.label(),
        to.label()
    )
}

/// Confirmation text for a supervisor advancing past failing gates.
pub fn advance_prompt(target: &Phase, notes: &[String]) -> String {
    format!(
        "Avanzar a la fase '{}' con elementos pendientes:\n{}\n¿Continuar?",
        target.label(),
        notes
            .iter()
            .map(|n| format!("  - {}", n))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, completed: bool, pending: usize, notified: bool) -> GateReport {
        GateReport {
            phase_id: 1,
            phase_name: name.to_string(),
            completed,
            pending,
            notified,
        }
    }

    #[test]
    fn all_gates_holding_proceeds_without_prompt() {
        let reports = vec![report("A", true, 0, true), report("B", true, 0, true)];
        assert!(matches!(
            plan_advance(&reports, false),
            AdvanceDecision::Proceed
        ));
        assert!(matches!(
            plan_advance(&reports, true),
            AdvanceDecision::Proceed
        ));
    }

    #[test]
    fn non_supervisor_blocked_by_first_incomplete_phase() {
        let reports = vec![
            report("A", true, 0, true),
            report("B", false, 2, false),
            report("C", false, 5, false),
        ];
        match plan_advance(&reports, false) {
            AdvanceDecision::Blocked(EngineError::PriorPhaseIncomplete(name)) => {
                assert_eq!(name, "B");
            }
            other => panic!("expected PriorPhaseIncomplete, got {:?}", other),
        }
    }

    #[test]
    fn non_supervisor_blocked_by_unconfirmed_notification() {
        let reports = vec![report("A", true, 0, false)];
        match plan_advance(&reports, false) {
            AdvanceDecision::Blocked(EngineError::NotificationNotConfirmed(name)) => {
                assert_eq!(name, "A");
            }
            other => panic!("expected NotificationNotConfirmed, got {:?}", other),
        }
    }

    #[test]
    fn supervisor_accumulates_notes_across_all_prior_phases() {
        let reports = vec![
            report("A", false, 1, false),
            report("B", true, 0, true),
            report("C", true, 0, false),
        ];
        match plan_advance(&reports, true) {
            AdvanceDecision::NeedsConfirmation(notes) => {
                // A contributes two notes (incomplete + unconfirmed), C one.
                assert_eq!(notes.len(), 3);
                assert!(notes[0].contains("'A'"));
                assert!(notes[0].contains("1 tarea(s)"));
                assert!(notes[2].contains("'C'"));
            }
            other => panic!("expected NeedsConfirmation, got {:?}", other),
        }
    }

    #[test]
    fn direction_compares_catalog_indices() {
        assert_eq!(direction(1, 2), Direction::Advance);
        assert_eq!(direction(2, 0), Direction::Regress);
        assert_eq!(direction(1, 1), Direction::Stay);
    }

    #[test]
    fn regression_prompt_names_both_phases_and_consequence() {
        let from = Phase {
            id: 2,
            code: None,
            name: Some("Diseño".to_string()),
        };
        let to = Phase {
            id: 1,
            code: None,
            name: Some("Inicio".to_string()),
        };
        let prompt = regression_prompt(&from, &to);
        assert!(prompt.contains("'Diseño'"));
        assert!(prompt.contains("'Inicio'"));
        assert!(prompt.contains("reiniciarán"));
    }
}
