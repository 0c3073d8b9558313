use thiserror::Error;

/// Evento de caída confirmada. Se crea al pasar a CONFIRMED y se conserva
/// mientras dure la ventana de deduplicación.
#[derive(Debug, Clone, PartialEq)]
pub struct FallEvent {
    pub event_id: String,
    pub confirmed_at: f64,
    pub last_notified_at: f64,
    pub notification_count: u32,
}

impl FallEvent {
    pub fn new(confirmed_at: f64) -> Self {
        Self {
            event_id: format!("evt_{}", confirmed_at.floor() as i64),
            confirmed_at,
            last_notified_at: confirmed_at,
            notification_count: 1,
        }
    }
}

/// Desenlace de una sospecha de caída
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspicionOutcome {
    Pending,
    Confirmed,
    Cleared,
}

impl SuspicionOutcome {
    /// Etiqueta usada en nombres de archivo y registros
    pub fn label(&self) -> &'static str {
        match self {
            SuspicionOutcome::Pending => "pending",
            SuspicionOutcome::Confirmed => "confirmed",
            SuspicionOutcome::Cleared => "cleared",
        }
    }
}

/// Sospecha de caída. Vive desde NORMAL→SUSPECTED hasta que se resuelve
/// (confirmada o descartada).
#[derive(Debug, Clone, PartialEq)]
pub struct SuspectedEvent {
    pub suspected_id: String,
    pub suspected_at: f64,
    pub outcome: SuspicionOutcome,
    pub outcome_at: Option<f64>,
}

impl SuspectedEvent {
    pub fn new(suspected_at: f64) -> Self {
        Self {
            suspected_id: format!("sus_{}", suspected_at.floor() as i64),
            suspected_at,
            outcome: SuspicionOutcome::Pending,
            outcome_at: None,
        }
    }
}

/// Falla de un observador. Se registra y se aísla: nunca detiene el
/// despacho ni altera la máquina de estados.
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("event store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("notification transport error: {0}")]
    Transport(String),

    #[error("clip write error: {0}")]
    Clip(String),

    #[error("{0}")]
    Other(String),
}

/// Observador de eventos confirmados: recibe cada confirmación (incluidas
/// las re-notificaciones) y la recuperación.
pub trait FallObserver: Send {
    fn on_fall_confirmed(&mut self, event: &FallEvent) -> Result<(), ObserverError>;
    fn on_fall_recovered(&mut self, event: &FallEvent) -> Result<(), ObserverError>;
}

/// Observador de sospechas: recibe la entrada a SUSPECTED y exactamente una
/// resolución por sospecha (descartada o confirmada).
pub trait SuspectedObserver: Send {
    fn on_fall_suspected(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError>;
    fn on_suspicion_cleared(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError>;
    fn on_fall_confirmed_update(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError>;
}
