use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Catalog types ---

/// One stage of a product's lifecycle. Catalog position defines the legal
/// progression order; the engine never mutates phases.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Phase {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "codigo")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "nombre")]
    pub name: Option<String>,
}

impl Phase {
    /// Human-readable label: name, falling back to code, falling back to id.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.code.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A unit of work belonging to exactly one phase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PhaseTask {
    pub id: i64,
    #[serde(rename = "faseId")]
    pub phase_id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
}

/// The product's status in the surrounding system, distinct from but mapped
/// to phases by the name/code heuristic in `catalog`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExternalState {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "codigo")]
    pub code: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Role {
    pub id: i64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(default, rename = "activo")]
    pub active: bool,
}

// --- Mutable join entity ---

/// Per (product, phase, task) record carrying the completion and validation
/// flags. The backend does not fix the flag key names, so they stay in
/// `extra` and are located through `flags::FlagKeys`. Absence of a record is
/// equivalent to "not completed, not validated".
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "productoId")]
    pub product_id: i64,
    #[serde(rename = "faseId")]
    pub phase_id: i64,
    #[serde(rename = "tareaFaseId")]
    pub task_id: i64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "usuarioAsignadoId"
    )]
    pub assigned_user_id: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "fechaCreacion"
    )]
    pub created: Option<DateTime<Utc>>,
    /// Backend-named flag fields (and anything else we do not model).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// Fresh record for (product, phase, task) with no flags set.
    pub fn new(product_id: i64, phase_id: i64, task_id: i64) -> Self {
        TaskRecord {
            id: 0,
            product_id,
            phase_id,
            task_id,
            assigned_user_id: None,
            created: None,
            extra: Map::new(),
        }
    }

    pub fn flag(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn set_flag(&mut self, key: &str, value: &str) {
        self.extra
            .insert(key.to_string(), Value::String(value.to_string()));
    }
}

// --- Capabilities ---

/// Actions checked against the task-record resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    View,
    Update,
    Create,
    Delete,
}

impl Capability {
    /// Wire name of the action in the permission API.
    pub fn action(&self) -> &'static str {
        match self {
            Capability::View => "ver",
            Capability::Update => "actualizar",
            Capability::Create => "crear",
            Capability::Delete => "eliminar",
        }
    }
}

/// Resolved capability set for the current user, loaded once per session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Capabilities {
    pub can_view: bool,
    pub can_update: bool,
    pub can_create: bool,
    pub can_delete: bool,
    pub is_supervisor: bool,
}

// --- Confirmation ---

/// Outcome of a human-in-the-loop confirmation prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Declined,
}

// --- Notification ---

/// Ephemeral dispatch intent built when the active phase is complete and the
/// supervisor notification has not been confirmed yet. Consumed by the
/// dispatcher and discarded after send confirmation or cancellation.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationIntent {
    pub phase: Phase,
    pub next_phase: Phase,
    pub completed_task_names: Vec<String>,
    pub matched_state: ExternalState,
}

/// Result of a transition request that did not error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Active phase now points at the target.
    Moved,
    /// Nothing to do: same phase, or the caller lacks view/update capability.
    NoOp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_label_prefers_name_then_code_then_id() {
        let full = Phase {
            id: 3,
            code: Some("DIS".to_string()),
            name: Some("Diseño".to_string()),
        };
        assert_eq!(full.label(), "Diseño");

        let code_only = Phase {
            id: 3,
            code: Some("DIS".to_string()),
            name: None,
        };
        assert_eq!(code_only.label(), "DIS");

        let bare = Phase {
            id: 3,
            code: None,
            name: None,
        };
        assert_eq!(bare.label(), "3");
    }

    #[test]
    fn task_record_round_trips_backend_field_names() {
        let json = r#"{
            "id": 7,
            "productoId": 11,
            "faseId": 2,
            "tareaFaseId": 5,
            "completada": "S",
            "validadaSupervisor": "N"
        }"#;
        let record: TaskRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.product_id, 11);
        assert_eq!(record.task_id, 5);
        assert_eq!(record.flag("completada"), Some("S"));
        assert_eq!(record.flag("validadaSupervisor"), Some("N"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["productoId"], 11);
        assert_eq!(back["completada"], "S");
    }

    #[test]
    fn set_flag_overwrites_existing_value() {
        let mut record = TaskRecord::new(1, 2, 3);
        record.set_flag("completada", "N");
        record.set_flag("completada", "S");
        assert_eq!(record.flag("completada"), Some("S"));
    }
}
