use tracing::{error, warn};

use crate::events::{
    FallEvent, FallObserver, SuspectedEvent, SuspectedObserver, SuspicionOutcome,
};

/// Estados de la máquina de antirrebote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallState {
    /// Sin señal de caída
    Normal,
    /// Señal de caída presente, esperando que persista delay_sec
    Suspected,
    /// Caída confirmada y vigente
    Confirmed,
}

/// Parámetros temporales de la máquina
#[derive(Debug, Clone, Copy)]
pub struct DelayConfirmParams {
    /// Segundos continuos en SUSPECTED antes de confirmar
    pub delay_sec: f64,
    /// Ventana tras una confirmación dentro de la cual una nueva
    /// confirmación se pliega al evento vigente (sin re-disparar)
    pub same_event_window: f64,
    /// Cadencia de re-notificación mientras la caída persiste
    pub re_notify_interval: f64,
}

impl Default for DelayConfirmParams {
    fn default() -> Self {
        Self {
            delay_sec: 3.0,
            same_event_window: 60.0,
            re_notify_interval: 120.0,
        }
    }
}

/// Máquina de estados que convierte la señal ruidosa `(caído, t)` en un
/// ciclo de vida limpio de eventos.
///
/// NORMAL → SUSPECTED al primer frame caído; SUSPECTED → NORMAL si la señal
/// desaparece antes de `delay_sec`; SUSPECTED → CONFIRMED si persiste.
/// En CONFIRMED re-notifica cada `re_notify_interval` y vuelve a NORMAL
/// cuando la persona se levanta.
///
/// Dos conjuntos de observadores disjuntos: los de caídas reciben
/// confirmación y recuperación; los de sospechas reciben la entrada a
/// SUSPECTED y su resolución. El despacho es síncrono y en orden de
/// registro; la falla de un observador se registra y no interrumpe a los
/// demás.
pub struct DelayConfirm {
    params: DelayConfirmParams,
    state: FallState,
    suspected_since: Option<f64>,
    current_event: Option<FallEvent>,
    suspected_event: Option<SuspectedEvent>,
    fall_observers: Vec<Box<dyn FallObserver>>,
    suspected_observers: Vec<Box<dyn SuspectedObserver>>,
}

impl DelayConfirm {
    pub fn new(params: DelayConfirmParams) -> Self {
        Self {
            params,
            state: FallState::Normal,
            suspected_since: None,
            current_event: None,
            suspected_event: None,
            fall_observers: Vec::new(),
            suspected_observers: Vec::new(),
        }
    }

    /// Registro de observadores: solo durante la construcción del sistema
    pub fn add_fall_observer(&mut self, observer: Box<dyn FallObserver>) {
        self.fall_observers.push(observer);
    }

    pub fn add_suspected_observer(&mut self, observer: Box<dyn SuspectedObserver>) {
        self.suspected_observers.push(observer);
    }

    pub fn state(&self) -> FallState {
        self.state
    }

    /// Evento confirmado vigente (si lo hay)
    pub fn current_event(&self) -> Option<&FallEvent> {
        self.current_event.as_ref()
    }

    /// Avanza la máquina un tick con la clasificación del frame actual.
    /// Devuelve el estado resultante. Nunca falla: los errores de los
    /// observadores quedan aislados en el despacho.
    pub fn update(&mut self, fallen: bool, timestamp: f64) -> FallState {
        match self.state {
            FallState::Normal => {
                if fallen {
                    self.enter_suspected(timestamp);
                }
            }
            FallState::Suspected => {
                if !fallen {
                    self.clear_suspicion(timestamp);
                } else if timestamp - self.suspected_since.unwrap_or(timestamp)
                    >= self.params.delay_sec
                {
                    self.confirm_fall(timestamp);
                }
            }
            FallState::Confirmed => {
                if !fallen {
                    self.recover(timestamp);
                } else {
                    self.check_re_notify(timestamp);
                }
            }
        }

        self.state
    }

    fn enter_suspected(&mut self, timestamp: f64) {
        self.state = FallState::Suspected;
        self.suspected_since = Some(timestamp);

        let event = SuspectedEvent::new(timestamp);
        for observer in self.suspected_observers.iter_mut() {
            if let Err(e) = observer.on_fall_suspected(&event) {
                error!(suspected_id = %event.suspected_id, "suspected observer failed: {e}");
            }
        }
        self.suspected_event = Some(event);
    }

    fn clear_suspicion(&mut self, timestamp: f64) {
        self.state = FallState::Normal;
        self.suspected_since = None;

        if let Some(mut event) = self.suspected_event.take() {
            event.outcome = SuspicionOutcome::Cleared;
            event.outcome_at = Some(timestamp);
            for observer in self.suspected_observers.iter_mut() {
                if let Err(e) = observer.on_suspicion_cleared(&event) {
                    error!(suspected_id = %event.suspected_id, "suspected observer failed: {e}");
                }
            }
        }
    }

    fn confirm_fall(&mut self, timestamp: f64) {
        self.state = FallState::Confirmed;
        self.suspected_since = None;

        // La sospecha queda resuelta pase lo que pase con la deduplicación
        let resolved = self.suspected_event.take().map(|mut event| {
            event.outcome = SuspicionOutcome::Confirmed;
            event.outcome_at = Some(timestamp);
            event
        });

        let merged = match self.current_event.as_ref() {
            Some(current) => {
                timestamp - current.confirmed_at < self.params.same_event_window
            }
            None => false,
        };

        if !merged {
            let event = FallEvent::new(timestamp);
            for observer in self.fall_observers.iter_mut() {
                if let Err(e) = observer.on_fall_confirmed(&event) {
                    error!(event_id = %event.event_id, "fall observer failed: {e}");
                }
            }
            self.current_event = Some(event);
        }

        // Los observadores de sospecha conocen el desenlace en ambos casos
        if let Some(event) = resolved {
            for observer in self.suspected_observers.iter_mut() {
                if let Err(e) = observer.on_fall_confirmed_update(&event) {
                    error!(suspected_id = %event.suspected_id, "suspected observer failed: {e}");
                }
            }
        } else {
            warn!("confirmed without a live suspected event");
        }
    }

    fn check_re_notify(&mut self, timestamp: f64) {
        let due = match self.current_event.as_ref() {
            Some(event) => {
                timestamp - event.last_notified_at >= self.params.re_notify_interval
            }
            None => false,
        };
        if !due {
            return;
        }

        if let Some(event) = self.current_event.as_mut() {
            event.last_notified_at = timestamp;
            event.notification_count += 1;
        }
        if let Some(event) = self.current_event.as_ref() {
            for observer in self.fall_observers.iter_mut() {
                if let Err(e) = observer.on_fall_confirmed(event) {
                    error!(event_id = %event.event_id, "fall observer failed: {e}");
                }
            }
        }
    }

    fn recover(&mut self, _timestamp: f64) {
        self.state = FallState::Normal;
        self.suspected_since = None;
        self.suspected_event = None;

        // El evento se conserva tras la recuperación: una confirmación
        // dentro de same_event_window se pliega a él en vez de re-disparar.
        if let Some(event) = self.current_event.as_ref() {
            for observer in self.fall_observers.iter_mut() {
                if let Err(e) = observer.on_fall_recovered(event) {
                    error!(event_id = %event.event_id, "fall observer failed: {e}");
                }
            }
        }
    }
}
