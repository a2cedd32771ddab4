use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;

use crate::error::ApiError;
use crate::types::{Decision, ExternalState, Phase, PhaseTask, Role, TaskRecord};

// --- Trait seams ---

/// Read/write access to the admin REST backend. Enables mocking in engine
/// tests; the real implementation is `rest::RestBackend`.
pub trait Backend: Send + Sync {
    fn list_phases(&self) -> impl Future<Output = Result<Vec<Phase>, ApiError>> + Send;

    fn list_phase_tasks(
        &self,
        phase_id: i64,
    ) -> impl Future<Output = Result<Vec<PhaseTask>, ApiError>> + Send;

    fn list_task_records(
        &self,
        product_id: i64,
        phase_id: i64,
    ) -> impl Future<Output = Result<Vec<TaskRecord>, ApiError>> + Send;

    /// Create a record; returns the stored copy (with its assigned id).
    fn create_task_record(
        &self,
        record: &TaskRecord,
    ) -> impl Future<Output = Result<TaskRecord, ApiError>> + Send;

    fn update_task_record(
        &self,
        record: &TaskRecord,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn list_external_states(
        &self,
    ) -> impl Future<Output = Result<Vec<ExternalState>, ApiError>> + Send;

    /// The product's current external state id, if any is set.
    fn product_state_id(
        &self,
        product_id: i64,
    ) -> impl Future<Output = Result<Option<i64>, ApiError>> + Send;

    fn update_product_state(
        &self,
        product_id: i64,
        state_id: i64,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn role(&self, role_id: i64) -> impl Future<Output = Result<Role, ApiError>> + Send;

    fn has_permission(
        &self,
        resource: &str,
        action: &str,
    ) -> impl Future<Output = Result<bool, ApiError>> + Send;
}

/// Hand-off of a composed message to an external channel. Only hand-off
/// success is tracked; delivery is not the engine's concern.
pub trait Notifier: Send + Sync {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Human-in-the-loop prompts. Confirmations are the engine's explicit
/// suspension points; declining is always safe.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, message: &str) -> impl Future<Output = Decision> + Send;

    /// Pick one of several configured recipients. `None` aborts the dispatch.
    fn choose_recipient(
        &self,
        recipients: &[String],
    ) -> impl Future<Output = Option<usize>> + Send;
}

// --- Shared-reference delegation ---
//
// Lets a caller hand the engine `&backend` while keeping the original for
// later inspection (the mocks rely on this in tests).

impl<B: Backend> Backend for &B {
    fn list_phases(&self) -> impl Future<Output = Result<Vec<Phase>, ApiError>> + Send {
        (**self).list_phases()
    }

    fn list_phase_tasks(
        &self,
        phase_id: i64,
    ) -> impl Future<Output = Result<Vec<PhaseTask>, ApiError>> + Send {
        (**self).list_phase_tasks(phase_id)
    }

    fn list_task_records(
        &self,
        product_id: i64,
        phase_id: i64,
    ) -> impl Future<Output = Result<Vec<TaskRecord>, ApiError>> + Send {
        (**self).list_task_records(product_id, phase_id)
    }

    fn create_task_record(
        &self,
        record: &TaskRecord,
    ) -> impl Future<Output = Result<TaskRecord, ApiError>> + Send {
        (**self).create_task_record(record)
    }

    fn update_task_record(
        &self,
        record: &TaskRecord,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).update_task_record(record)
    }

    fn list_external_states(
        &self,
    ) -> impl Future<Output = Result<Vec<ExternalState>, ApiError>> + Send {
        (**self).list_external_states()
    }

    fn product_state_id(
        &self,
        product_id: i64,
    ) -> impl Future<Output = Result<Option<i64>, ApiError>> + Send {
        (**self).product_state_id(product_id)
    }

    fn update_product_state(
        &self,
        product_id: i64,
        state_id: i64,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).update_product_state(product_id, state_id)
    }

    fn role(&self, role_id: i64) -> impl Future<Output = Result<Role, ApiError>> + Send {
        (**self).role(role_id)
    }

    fn has_permission(
        &self,
        resource: &str,
        action: &str,
    ) -> impl Future<Output = Result<bool, ApiError>> + Send {
        (**self).has_permission(resource, action)
    }
}

impl<N: Notifier> Notifier for &N {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).send(recipient, subject, body)
    }
}

impl<C: Confirmer> Confirmer for &C {
    fn confirm(&self, message: &str) -> impl Future<Output = Decision> + Send {
        (**self).confirm(message)
    }

    fn choose_recipient(
        &self,
        recipients: &[String],
    ) -> impl Future<Output = Option<usize>> + Send {
        (**self).choose_recipient(recipients)
    }
}

// --- Mock backend ---

/// In-memory backend for engine tests.
///
/// Uses `std::sync::Mutex` (not tokio's) because operations are fast map
/// lookups with no I/O under the lock.
#[derive(Default)]
pub struct MockBackend {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    phases: Vec<Phase>,
    tasks: HashMap<i64, Vec<PhaseTask>>,
    records: Vec<TaskRecord>,
    states: Vec<ExternalState>,
    product_states: HashMap<i64, i64>,
    roles: HashMap<i64, Role>,
    denied_actions: HashSet<String>,
    next_record_id: i64,
    fail_records: bool,
    fail_record_writes: bool,
    fail_state_update: bool,
    record_updates: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phases(self, phases: Vec<Phase>) -> Self {
        self.inner.lock().unwrap().phases = phases;
        self
    }

    pub fn with_tasks(self, phase_id: i64, tasks: Vec<PhaseTask>) -> Self {
        self.inner.lock().unwrap().tasks.insert(phase_id, tasks);
        self
    }

    pub fn with_records(self, records: Vec<TaskRecord>) -> Self {
        {
            let mut state = self.inner.lock().unwrap();
            state.next_record_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
            state.records = records;
        }
        self
    }

    pub fn with_states(self, states: Vec<ExternalState>) -> Self {
        self.inner.lock().unwrap().states = states;
        self
    }

    pub fn with_product_state(self, product_id: i64, state_id: i64) -> Self {
        self.inner
            .lock()
            .unwrap()
            .product_states
            .insert(product_id, state_id);
        self
    }

    pub fn with_role(self, role: Role) -> Self {
        self.inner.lock().unwrap().roles.insert(role.id, role);
        self
    }

    /// Deny a permission action ("ver", "actualizar", ...). All actions are
    /// granted unless denied.
    pub fn deny_action(self, action: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .denied_actions
            .insert(action.to_string());
        self
    }

    /// Make task-record reads fail with a simulated outage.
    pub fn fail_record_reads(self) -> Self {
        self.inner.lock().unwrap().fail_records = true;
        self
    }

    /// Make task-record create/update fail with a simulated outage.
    pub fn fail_record_writes(self) -> Self {
        self.inner.lock().unwrap().fail_record_writes = true;
        self
    }

    /// Toggle record write failures mid-test.
    pub fn set_record_write_failures(&self, fail: bool) {
        self.inner.lock().unwrap().fail_record_writes = fail;
    }

    /// Make the product external-state update fail.
    pub fn fail_state_update(self) -> Self {
        self.inner.lock().unwrap().fail_state_update = true;
        self
    }

    /// Current snapshot of all task records (test assertions).
    pub fn records_snapshot(&self) -> Vec<TaskRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    /// The product's stored external state id (test assertions).
    pub fn stored_product_state(&self, product_id: i64) -> Option<i64> {
        self.inner
            .lock()
            .unwrap()
            .product_states
            .get(&product_id)
            .copied()
    }

    /// How many record updates the backend has seen (test assertions).
    pub fn record_update_count(&self) -> u32 {
        self.inner.lock().unwrap().record_updates
    }
}

impl Backend for MockBackend {
    async fn list_phases(&self) -> Result<Vec<Phase>, ApiError> {
        Ok(self.inner.lock().unwrap().phases.clone())
    }

    async fn list_phase_tasks(&self, phase_id: i64) -> Result<Vec<PhaseTask>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .tasks
            .get(&phase_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_task_records(
        &self,
        product_id: i64,
        phase_id: i64,
    ) -> Result<Vec<TaskRecord>, ApiError> {
        let state = self.inner.lock().unwrap();
        if state.fail_records {
            return Err(ApiError::Unavailable("record read".to_string()));
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.product_id == product_id && r.phase_id == phase_id)
            .cloned()
            .collect())
    }

    async fn create_task_record(&self, record: &TaskRecord) -> Result<TaskRecord, ApiError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_record_writes {
            return Err(ApiError::Unavailable("record create".to_string()));
        }
        let mut stored = record.clone();
        state.next_record_id += 1;
        stored.id = state.next_record_id;
        state.records.push(stored.clone());
        Ok(stored)
    }

    async fn update_task_record(&self, record: &TaskRecord) -> Result<(), ApiError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_record_writes {
            return Err(ApiError::Unavailable("record update".to_string()));
        }
        state.record_updates += 1;
        match state.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(ApiError::Status {
                endpoint: "producto-tarea-fase".to_string(),
                status: 404,
            }),
        }
    }

    async fn list_external_states(&self) -> Result<Vec<ExternalState>, ApiError> {
        Ok(self.inner.lock().unwrap().states.clone())
    }

    async fn product_state_id(&self, product_id: i64) -> Result<Option<i64>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .product_states
            .get(&product_id)
            .copied())
    }

    async fn update_product_state(&self, product_id: i64, state_id: i64) -> Result<(), ApiError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_state_update {
            return Err(ApiError::Unavailable("product state update".to_string()));
        }
        state.product_states.insert(product_id, state_id);
        Ok(())
    }

    async fn role(&self, role_id: i64) -> Result<Role, ApiError> {
        self.inner
            .lock()
            .unwrap()
            .roles
            .get(&role_id)
            .cloned()
            .ok_or(ApiError::Status {
                endpoint: "roles".to_string(),
                status: 404,
            })
    }

    async fn has_permission(&self, _resource: &str, action: &str) -> Result<bool, ApiError> {
        Ok(!self.inner.lock().unwrap().denied_actions.contains(action))
    }
}

// --- Mock notifier ---

/// Notifier that records hand-offs instead of sending anything.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        MockNotifier {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// (recipient, subject) pairs handed off so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), ApiError> {
        if self.fail {
            return Err(ApiError::Unavailable("notify".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

// --- Mock confirmer ---

/// Confirmer returning a scripted sequence of decisions.
///
/// Each `confirm` call consumes the next decision in order; running out of
/// script declines, so an unexpected extra prompt fails the test loudly.
pub struct MockConfirmer {
    decisions: Mutex<Vec<Decision>>,
    recipient_choice: Option<usize>,
}

impl MockConfirmer {
    pub fn new(decisions: Vec<Decision>) -> Self {
        let mut reversed = decisions;
        reversed.reverse();
        MockConfirmer {
            decisions: Mutex::new(reversed),
            recipient_choice: Some(0),
        }
    }

    pub fn accepting_all() -> Self {
        MockConfirmer {
            decisions: Mutex::new(vec![Decision::Accepted; 8]),
            recipient_choice: Some(0),
        }
    }

    pub fn with_recipient_choice(mut self, choice: Option<usize>) -> Self {
        self.recipient_choice = choice;
        self
    }
}

impl Confirmer for MockConfirmer {
    async fn confirm(&self, _message: &str) -> Decision {
        self.decisions
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Decision::Declined)
    }

    async fn choose_recipient(&self, recipients: &[String]) -> Option<usize> {
        self.recipient_choice.filter(|i| *i < recipients.len())
    }
}
