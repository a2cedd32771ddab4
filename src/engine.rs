use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::{Backend, Confirmer, Notifier};
use crate::catalog;
use crate::config::PhasegateConfig;
use crate::error::EngineError;
use crate::flags::FlagKeys;
use crate::gates;
use crate::notify::{self, IntentOutcome};
use crate::transition::{self, AdvanceDecision, Direction, GateReport};
use crate::types::{
    Capabilities, Capability, Decision, Phase, PhaseTask, TaskRecord, TransitionOutcome,
};
use crate::{log_debug, log_info, log_warn};

/// The phase transition engine for one product.
///
/// Holds the phase catalog, the active-phase pointer, and the record cache
/// for the active phase. All mutation goes through `request_transition`,
/// `send_supervisor_notification`, and `toggle_task_completion`; every
/// operation is serialized by `&mut self` plus an in-flight guard that is
/// released even when the operation's future is dropped mid-await, and
/// every failure leaves the active phase unchanged.
pub struct PhaseEngine<B, N, C> {
    config: PhasegateConfig,
    keys: FlagKeys,
    backend: B,
    notifier: N,
    confirmer: C,
    product_id: i64,
    phases: Vec<Phase>,
    active: usize,
    /// Record cache for the active phase, keyed by task id. Gating decisions
    /// always reconcile against a fresh remote read; this is for display and
    /// for the dispatcher's "currently loaded" record set.
    records: HashMap<i64, TaskRecord>,
    tasks: Vec<PhaseTask>,
    /// Phases whose supervisor notification was confirmed this session.
    confirmed: HashSet<i64>,
    busy: Arc<AtomicBool>,
    last_error: Option<String>,
    caps: Capabilities,
    on_state_changed: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl<B, N, C> std::fmt::Debug for PhaseEngine<B, N, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseEngine")
            .field("product_id", &self.product_id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl<B: Backend, N: Notifier, C: Confirmer> PhaseEngine<B, N, C> {
    /// Build an engine for `product_id`, acting as the user holding
    /// `role_id`.
    ///
    /// Loads the catalog, capabilities, and the product's active phase.
    /// Catalog and record loading fail open (reported, not fatal); only a
    /// broken flag configuration is a construction error.
    pub async fn load(
        config: PhasegateConfig,
        backend: B,
        notifier: N,
        confirmer: C,
        product_id: i64,
        role_id: i64,
    ) -> Result<Self, String> {
        let keys = FlagKeys::from_config(&config.flags)?;
        if config.notifications.supervisor_recipients.is_empty() {
            return Err("notifications.supervisor_recipients must not be empty".to_string());
        }

        let caps = load_capabilities(&backend, &config, role_id).await;
        let phases = catalog::load_phases(&backend).await;

        let state_name = current_state_name(&backend, product_id).await;
        let active = catalog::resolve_active_phase(&phases, state_name.as_deref());

        let mut engine = PhaseEngine {
            config,
            keys,
            backend,
            notifier,
            confirmer,
            product_id,
            phases,
            active,
            records: HashMap::new(),
            tasks: Vec::new(),
            confirmed: HashSet::new(),
            busy: Arc::new(AtomicBool::new(false)),
            last_error: None,
            caps,
            on_state_changed: None,
        };
        engine.reload_active_phase().await;
        Ok(engine)
    }

    // --- Read-only state ---

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn active_phase(&self) -> Option<&Phase> {
        self.phases.get(self.active)
    }

    pub fn active_tasks(&self) -> &[PhaseTask] {
        &self.tasks
    }

    pub fn records(&self) -> &HashMap<i64, TaskRecord> {
        &self.records
    }

    /// Completion of one active-phase task, from the cache.
    pub fn task_completed(&self, task_id: i64) -> bool {
        self.keys.is_completed(self.records.get(&task_id))
    }

    /// Cached view of the active phase's validation gate. Display only;
    /// gating always reconciles against the backend.
    pub fn validation_cached(&self) -> bool {
        gates::cached_validation(&self.records, &self.keys)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Register the hook invoked with the new state's display name after a
    /// successful dispatch.
    pub fn on_state_changed(&mut self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.on_state_changed = Some(Box::new(hook));
    }

    // --- Transitions ---

    /// Request a move of the active phase to `target_phase_id` (any phase in
    /// the catalog, not only adjacent ones).
    pub async fn request_transition(
        &mut self,
        target_phase_id: i64,
    ) -> Result<TransitionOutcome, EngineError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let result = self.transition_inner(target_phase_id).await;
        self.record_outcome(&result);
        result
    }

    async fn transition_inner(
        &mut self,
        target_phase_id: i64,
    ) -> Result<TransitionOutcome, EngineError> {
        if !self.caps.can_view || !self.caps.can_update {
            log_debug!("transition ignored: missing view/update capability");
            return Ok(TransitionOutcome::NoOp);
        }
        if self
            .active_phase()
            .is_some_and(|p| p.id == target_phase_id)
        {
            return Ok(TransitionOutcome::NoOp);
        }

        let target = self
            .phases
            .iter()
            .position(|p| p.id == target_phase_id)
            .ok_or(EngineError::PhaseNotFound(target_phase_id))?;

        match transition::direction(self.active, target) {
            Direction::Stay => Ok(TransitionOutcome::NoOp),
            Direction::Regress => self.regress(target).await,
            Direction::Advance => self.advance(target).await,
        }
    }

    /// Regression branch: supervisor-only, confirmed, and always resets the
    /// destination phase before moving the pointer.
    async fn regress(&mut self, target: usize) -> Result<TransitionOutcome, EngineError> {
        if !self.caps.is_supervisor {
            return Err(EngineError::PrivilegeDenied(
                "retroceder a una fase anterior".to_string(),
            ));
        }

        let prompt = transition::regression_prompt(&self.phases[self.active], &self.phases[target]);
        if self.confirmer.confirm(&prompt).await == Decision::Declined {
            return Err(EngineError::Cancelled);
        }

        let destination = self.phases[target].clone();
        self.reset_phase(&destination).await?;
        self.confirmed.remove(&destination.id);
        self.active = target;
        self.reload_active_phase().await;

        log_info!(
            "[producto {}] fase activa retrocedida a '{}'",
            self.product_id,
            destination.label()
        );
        Ok(TransitionOutcome::Moved)
    }

    /// Set every task record of `phase` to not-complete/not-validated,
    /// creating records where none exist.
    ///
    /// At-least-effort: each record is attempted independently and a failure
    /// on one does not abort the others. Only the initial reads abort (no
    /// mutation has happened yet at that point).
    async fn reset_phase(&mut self, phase: &Phase) -> Result<(), EngineError> {
        let tasks = self.backend.list_phase_tasks(phase.id).await?;
        let existing = gates::phase_records(&self.backend, self.product_id, phase.id).await?;

        for task in &tasks {
            let result = match existing.get(&task.id) {
                Some(record) => {
                    let mut updated = record.clone();
                    let completion = self.keys.completion_key(Some(&updated)).to_string();
                    let validation = self.keys.validation_key(Some(&updated)).to_string();
                    updated.set_flag(&completion, self.keys.negative());
                    updated.set_flag(&validation, self.keys.negative());
                    self.backend.update_task_record(&updated).await
                }
                None => {
                    let mut fresh = TaskRecord::new(self.product_id, phase.id, task.id);
                    fresh.set_flag(self.keys.completion_key(None), self.keys.negative());
                    fresh.set_flag(self.keys.validation_key(None), self.keys.negative());
                    self.backend.create_task_record(&fresh).await.map(|_| ())
                }
            };
            if let Err(e) = result {
                log_warn!(
                    "Warning: no se pudo reiniciar la tarea {} de la fase '{}': {}",
                    task.id,
                    phase.label(),
                    e
                );
            }
        }
        Ok(())
    }

    /// Advance branch: evaluate every phase before the target, in catalog
    /// order, stopping at the first gate that blocks a non-supervisor.
    async fn advance(&mut self, target: usize) -> Result<TransitionOutcome, EngineError> {
        let is_supervisor = self.caps.is_supervisor;
        let mut reports: Vec<GateReport> = Vec::new();

        for idx in 0..target {
            let phase = self.phases[idx].clone();
            let pending = gates::count_pending_tasks(
                &self.backend,
                &self.keys,
                self.product_id,
                phase.id,
            )
            .await?;

            // Notification is confirmed only when the session flag is set
            // AND the remote validation gate still holds (remote wins).
            let notified = if self.confirmed.contains(&phase.id) {
                gates::is_phase_validated(&self.backend, &self.keys, self.product_id, phase.id)
                    .await?
            } else {
                false
            };

            reports.push(GateReport {
                phase_id: phase.id,
                phase_name: phase.label(),
                completed: pending == 0,
                pending,
                notified,
            });

            // First blocking failure halts evaluation: later phases are
            // never fetched for a non-supervisor.
            if let AdvanceDecision::Blocked(e) = transition::plan_advance(&reports, is_supervisor)
            {
                return Err(e);
            }
        }

        match transition::plan_advance(&reports, is_supervisor) {
            AdvanceDecision::Blocked(e) => return Err(e),
            AdvanceDecision::NeedsConfirmation(notes) => {
                let prompt = transition::advance_prompt(&self.phases[target], &notes);
                if self.confirmer.confirm(&prompt).await == Decision::Declined {
                    return Err(EngineError::Cancelled);
                }
            }
            AdvanceDecision::Proceed => {}
        }

        self.active = target;
        self.reload_active_phase().await;
        log_info!(
            "[producto {}] fase activa avanzada a '{}'",
            self.product_id,
            self.phases[target].label()
        );
        Ok(TransitionOutcome::Moved)
    }

    // --- Notification dispatch ---

    /// Dispatch the supervisor notification for the active phase.
    ///
    /// No-op (with a notice) when `phase_id` is not the active phase, when
    /// the active phase is terminal, or when the notification was already
    /// confirmed and validated. On confirmed hand-off: product external
    /// state update first, then validation flags, then the confirmed flag
    /// and the state-changed hook.
    pub async fn send_supervisor_notification(
        &mut self,
        phase_id: i64,
    ) -> Result<(), EngineError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let result = self.dispatch_inner(phase_id).await;
        self.record_outcome(&result);
        result
    }

    async fn dispatch_inner(&mut self, phase_id: i64) -> Result<(), EngineError> {
        let Some(phase) = self.active_phase().cloned() else {
            return Ok(());
        };
        if phase.id != phase_id {
            log_info!(
                "La notificación solo aplica a la fase activa ('{}')",
                phase.label()
            );
            return Ok(());
        }

        // Reconcile the validation gate; the remote result replaces the cache.
        let validated = gates::reconcile_validation(
            &self.backend,
            &self.keys,
            self.product_id,
            phase.id,
            &mut self.records,
        )
        .await?;
        if validated && self.confirmed.contains(&phase.id) {
            log_info!(
                "La notificación de la fase '{}' ya fue enviada y validada",
                phase.label()
            );
            return Ok(());
        }

        let tasks = self.backend.list_phase_tasks(phase.id).await?;
        let states = self.backend.list_external_states().await?;
        let next_phase = self.phases.get(self.active + 1);

        let intent = match notify::build_intent(
            &phase,
            next_phase,
            &tasks,
            &self.records,
            &states,
            &self.keys,
        ) {
            IntentOutcome::TerminalPhase => {
                log_info!(
                    "'{}' es la última fase; no hay notificación que enviar",
                    phase.label()
                );
                return Ok(());
            }
            IntentOutcome::StateNotFound(name) => {
                return Err(EngineError::StateNotFound(name));
            }
            IntentOutcome::Ready(intent) => intent,
        };

        // Non-empty by construction: `load` rejects an empty recipient list.
        let recipients = &self.config.notifications.supervisor_recipients;
        let recipient = if recipients.len() == 1 {
            recipients[0].clone()
        } else {
            let choice = self.confirmer.choose_recipient(recipients).await;
            match choice.and_then(|index| recipients.get(index)) {
                Some(chosen) => chosen.clone(),
                None => return Err(EngineError::Cancelled),
            }
        };

        let subject = notify::compose_subject(&self.config.notifications.subject_prefix, &intent);
        let body = notify::compose_body(self.product_id, &intent);
        self.notifier.send(&recipient, &subject, &body).await?;

        // External state first: validation flags are only marked once the
        // product's status change went through.
        self.backend
            .update_product_state(self.product_id, intent.matched_state.id)
            .await?;

        self.mark_all_validated().await;
        self.confirmed.insert(phase.id);

        if let Some(hook) = &self.on_state_changed {
            hook(&intent.matched_state.name);
        }

        log_info!(
            "[producto {}] notificación enviada a {}; nuevo estado '{}'",
            self.product_id,
            recipient,
            intent.matched_state.name
        );
        Ok(())
    }

    /// Mark every currently loaded record's validation flag affirmative,
    /// remotely per record and in the cache. Per-record failures are logged
    /// and skipped; the cache is only updated on remote success.
    async fn mark_all_validated(&mut self) {
        let task_ids: Vec<i64> = self.records.keys().copied().collect();
        for task_id in task_ids {
            let Some(record) = self.records.get(&task_id) else {
                continue;
            };
            let mut updated = record.clone();
            let key = self.keys.validation_key(Some(&updated)).to_string();
            updated.set_flag(&key, self.keys.affirmative());

            match self.backend.update_task_record(&updated).await {
                Ok(()) => {
                    self.records.insert(task_id, updated);
                }
                Err(e) => {
                    log_warn!(
                        "Warning: no se pudo validar el registro de la tarea {}: {}",
                        task_id,
                        e
                    );
                }
            }
        }
    }

    // --- Task completion ---

    /// Flip the completion flag of the active phase's record for `task_id`,
    /// creating the record on first toggle. Returns the new completed state.
    pub async fn toggle_task_completion(&mut self, task_id: i64) -> Result<bool, EngineError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let result = self.toggle_inner(task_id).await;
        self.record_outcome(&result);
        result
    }

    async fn toggle_inner(&mut self, task_id: i64) -> Result<bool, EngineError> {
        if !self.caps.can_update {
            return Err(EngineError::PrivilegeDenied(
                "actualizar tareas".to_string(),
            ));
        }
        if !self.tasks.iter().any(|t| t.id == task_id) {
            return Err(EngineError::TaskNotFound(task_id));
        }

        let phase_id = self.active_phase().map(|p| p.id).unwrap_or_default();

        match self.records.get(&task_id) {
            Some(record) => {
                let now_completed = !self.keys.is_completed(Some(record));
                let mut updated = record.clone();
                let key = self.keys.completion_key(Some(&updated)).to_string();
                let value = if now_completed {
                    self.keys.affirmative().to_string()
                } else {
                    self.keys.negative().to_string()
                };
                updated.set_flag(&key, &value);
                self.backend.update_task_record(&updated).await?;
                self.records.insert(task_id, updated);
                Ok(now_completed)
            }
            None => {
                if !self.caps.can_create {
                    return Err(EngineError::PrivilegeDenied(
                        "crear registros de tarea".to_string(),
                    ));
                }
                let mut fresh = TaskRecord::new(self.product_id, phase_id, task_id);
                fresh.set_flag(self.keys.completion_key(None), self.keys.affirmative());
                fresh.set_flag(self.keys.validation_key(None), self.keys.negative());
                let stored = self.backend.create_task_record(&fresh).await?;
                self.records.insert(task_id, stored);
                Ok(true)
            }
        }
    }

    // --- Internals ---

    /// Refresh the task list and record cache for the active phase.
    /// Best-effort: a failure leaves empty collections and a warning; the
    /// next gating decision re-reads from the backend anyway.
    async fn reload_active_phase(&mut self) {
        let Some(phase_id) = self.active_phase().map(|p| p.id) else {
            self.tasks.clear();
            self.records.clear();
            return;
        };

        match self.backend.list_phase_tasks(phase_id).await {
            Ok(tasks) => self.tasks = tasks,
            Err(e) => {
                log_warn!("Warning: no se pudieron cargar las tareas: {}", e);
                self.tasks.clear();
            }
        }
        match gates::phase_records(&self.backend, self.product_id, phase_id).await {
            Ok(records) => self.records = records,
            Err(e) => {
                log_warn!("Warning: no se pudieron cargar los registros: {}", e);
                self.records.clear();
            }
        }
    }

    /// Single current error message: set on failure, cleared on success.
    fn record_outcome<T>(&mut self, result: &Result<T, EngineError>) {
        match result {
            Ok(_) => self.last_error = None,
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }
}

/// In-flight marker for the engine's operations. Acquiring while another
/// guard is alive yields `Busy`; dropping the guard always releases the
/// flag, including when the operation's future is dropped at a suspension
/// point, so an abandoned operation can simply be retried.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, EngineError> {
        if flag.swap(true, Ordering::Acquire) {
            return Err(EngineError::Busy);
        }
        Ok(BusyGuard(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn load_capabilities(
    backend: &impl Backend,
    config: &PhasegateConfig,
    role_id: i64,
) -> Capabilities {
    let resource = config.backend.record_resource.as_str();

    let is_supervisor = match backend.role(role_id).await {
        Ok(role) => {
            let name = role.name.to_lowercase();
            role.active
                && config
                    .roles
                    .supervisor_markers
                    .iter()
                    .any(|marker| name.contains(&marker.to_lowercase()))
        }
        Err(e) => {
            log_warn!("Warning: fallo al consultar el rol {}: {}", role_id, e);
            false
        }
    };

    Capabilities {
        can_view: check_permission(backend, resource, Capability::View).await,
        can_update: check_permission(backend, resource, Capability::Update).await,
        can_create: check_permission(backend, resource, Capability::Create).await,
        can_delete: check_permission(backend, resource, Capability::Delete).await,
        is_supervisor,
    }
}

/// Permission probes fail closed: a backend error denies the capability.
async fn check_permission(backend: &impl Backend, resource: &str, cap: Capability) -> bool {
    match backend.has_permission(resource, cap.action()).await {
        Ok(granted) => granted,
        Err(e) => {
            log_warn!(
                "Warning: fallo al comprobar permisos ({}): {}",
                cap.action(),
                e
            );
            false
        }
    }
}

async fn current_state_name(backend: &impl Backend, product_id: i64) -> Option<String> {
    let state_id = match backend.product_state_id(product_id).await {
        Ok(id) => id?,
        Err(e) => {
            log_warn!("Warning: no se pudo leer el estado del producto: {}", e);
            return None;
        }
    };
    match backend.list_external_states().await {
        Ok(states) => states.into_iter().find(|s| s.id == state_id).map(|s| s.name),
        Err(e) => {
            log_warn!("Warning: no se pudo leer el catálogo de estados: {}", e);
            None
        }
    }
}
