/// Transport-level failure talking to the admin REST backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("could not decode response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },

    /// Used by scripted test backends to simulate an outage.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Engine error taxonomy.
///
/// Categories:
/// - Lookup: requested phase/state does not exist
/// - Privilege: caller's role or permissions are insufficient
/// - Precondition: an earlier phase blocks the requested transition
/// - Remote: backend read/write failed mid-operation, nothing was changed
/// - Cancelled: the human declined a confirmation prompt
/// - Busy: another engine operation is still in flight
///
/// Every variant is recoverable: the active phase is left unchanged and the
/// same request can simply be retried. Display strings are the user-facing
/// messages of the surrounding product, hence Spanish.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("La fase solicitada no existe en el catálogo (id {0})")]
    PhaseNotFound(i64),

    #[error("No se encontró un estado que corresponda a la fase '{0}'")]
    StateNotFound(String),

    #[error("La tarea {0} no pertenece a la fase activa")]
    TaskNotFound(i64),

    #[error("Se requiere rol de supervisor para {0}")]
    PrivilegeDenied(String),

    #[error("La fase '{0}' tiene tareas pendientes; complétalas antes de avanzar")]
    PriorPhaseIncomplete(String),

    #[error("Envía el correo al supervisor de la fase '{0}' antes de avanzar")]
    NotificationNotConfirmed(String),

    #[error("Error de comunicación con el servidor: {0}")]
    Remote(#[from] ApiError),

    #[error("Operación cancelada por el usuario")]
    Cancelled,

    #[error("Hay otra operación en curso; espera a que termine")]
    Busy,
}

impl EngineError {
    /// True when the failure came from the backend rather than a rule check.
    pub fn is_remote(&self) -> bool {
        matches!(self, EngineError::Remote(_))
    }

    /// True for failures that gate the transition on the current data:
    /// retrying without changing task state will fail again.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EngineError::PriorPhaseIncomplete(_) | EngineError::NotificationNotConfirmed(_)
        )
    }

    /// True when the request never reached a gate check (cancel/overlap).
    pub fn is_aborted(&self) -> bool {
        matches!(self, EngineError::Cancelled | EngineError::Busy)
    }
}
