use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

/// Temporizador de un solo disparo, cancelable.
///
/// Se usa para la escritura diferida de clips: al confirmarse una caída se
/// agenda la consulta al buffer para `clip_after_sec` segundos después, de
/// modo que el clip incluya lo que pasó tras el evento. En el apagado los
/// temporizadores pendientes se cancelan y su acción no se ejecuta.
pub struct OneShotTimer {
    cancel_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    /// Agenda `action` para dentro de `delay`. La acción corre en su propio
    /// hilo, nunca en el hilo que agenda.
    pub fn schedule<F>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("oneshot-timer".to_string())
            .spawn(move || match cancel_rx.recv_timeout(delay) {
                // Venció el plazo sin cancelación: disparar
                Err(RecvTimeoutError::Timeout) => action(),
                // Cancelado o el dueño soltó el canal antes de tiempo
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            })
            .expect("failed to spawn timer thread");

        Self {
            cancel_tx,
            handle: Some(handle),
        }
    }

    /// Cancela el disparo si aún no ocurrió
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    /// ¿El hilo del temporizador ya terminó (disparado o cancelado)?
    pub fn is_done(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    /// Espera a que el temporizador termine (tras disparo o cancelación)
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        // Soltar el timer sin cancelar dejaría un hilo disparando a ciegas
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
