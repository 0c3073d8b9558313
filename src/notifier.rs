use std::collections::VecDeque;

use chrono::{Local, TimeZone};
use tracing::{info, warn};

use crate::events::{FallEvent, FallObserver, ObserverError};

/// Mensaje push hacia el cuidador
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub event_id: String,
    pub text: String,
}

/// Transporte del mensaje (LINE, Telegram, webhook...). La implementación
/// concreta vive fuera del núcleo.
pub trait PushTransport: Send {
    fn send(&mut self, message: &PushMessage) -> Result<(), String>;
}

fn human_time(epoch_secs: f64) -> String {
    match Local.timestamp_opt(epoch_secs as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => format!("{epoch_secs:.0}"),
    }
}

/// Observador de caídas que arma el mensaje de alerta y lo entrega al
/// transporte. Si el envío falla el mensaje queda en una cola de
/// pendientes; `retry_pending` la drena de adelante hacia atrás y se
/// detiene en la primera falla.
pub struct Notifier {
    transport: Box<dyn PushTransport>,
    enabled: bool,
    pending: VecDeque<PushMessage>,
}

impl Notifier {
    pub fn new(transport: Box<dyn PushTransport>, enabled: bool) -> Self {
        Self {
            transport,
            enabled,
            pending: VecDeque::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn deliver(&mut self, message: PushMessage) {
        match self.transport.send(&message) {
            Ok(()) => info!(event_id = %message.event_id, "notification sent"),
            Err(e) => {
                warn!(event_id = %message.event_id, "notification failed: {e}");
                self.pending.push_back(message);
            }
        }
    }

    /// Reintenta los mensajes encolados; al primer fallo se detiene y los
    /// restantes esperan al próximo intento
    pub fn retry_pending(&mut self) {
        while let Some(message) = self.pending.front() {
            if self.transport.send(message).is_err() {
                break;
            }
            info!(event_id = %message.event_id, "queued notification sent");
            self.pending.pop_front();
        }
    }
}

impl FallObserver for Notifier {
    fn on_fall_confirmed(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        if !self.enabled {
            return Ok(());
        }

        let text = format!(
            "🚨 ¡Alerta de caída!\nEvento: {}\nHora: {}\nNotificación #{}",
            event.event_id,
            human_time(event.confirmed_at),
            event.notification_count
        );
        self.deliver(PushMessage {
            event_id: event.event_id.clone(),
            text,
        });
        // La falla de transporte queda encolada, no es un error del despacho
        Ok(())
    }

    fn on_fall_recovered(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        if !self.enabled {
            return Ok(());
        }

        let text = format!(
            "✅ Persona recuperada\nEvento: {}\nHora: {}",
            event.event_id,
            human_time(event.confirmed_at)
        );
        self.deliver(PushMessage {
            event_id: event.event_id.clone(),
            text,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeTransport {
        sent: Arc<Mutex<Vec<PushMessage>>>,
        failing: Arc<Mutex<bool>>,
    }

    impl PushTransport for FakeTransport {
        fn send(&mut self, message: &PushMessage) -> Result<(), String> {
            if *self.failing.lock().unwrap() {
                return Err("transport down".to_string());
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn event(count: u32) -> FallEvent {
        FallEvent {
            event_id: "evt_3".to_string(),
            confirmed_at: 1700000000.0,
            last_notified_at: 1700000000.0,
            notification_count: count,
        }
    }

    #[test]
    fn confirm_sends_message_with_count() {
        let transport = FakeTransport::default();
        let mut notifier = Notifier::new(Box::new(transport.clone()), true);

        notifier.on_fall_confirmed(&event(2)).unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("evt_3"));
        assert!(sent[0].text.contains("#2"));
    }

    #[test]
    fn disabled_notifier_stays_silent() {
        let transport = FakeTransport::default();
        let mut notifier = Notifier::new(Box::new(transport.clone()), false);

        notifier.on_fall_confirmed(&event(1)).unwrap();
        notifier.on_fall_recovered(&event(1)).unwrap();

        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_sends_queue_and_drain_on_retry() {
        let transport = FakeTransport::default();
        *transport.failing.lock().unwrap() = true;
        let mut notifier = Notifier::new(Box::new(transport.clone()), true);

        notifier.on_fall_confirmed(&event(1)).unwrap();
        notifier.on_fall_confirmed(&event(2)).unwrap();
        assert_eq!(notifier.pending_count(), 2);

        // Transporte sigue caído: el reintento no pierde mensajes
        notifier.retry_pending();
        assert_eq!(notifier.pending_count(), 2);

        *transport.failing.lock().unwrap() = false;
        notifier.retry_pending();
        assert_eq!(notifier.pending_count(), 0);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }
}
