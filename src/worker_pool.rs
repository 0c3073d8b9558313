use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool acotado de hilos trabajadores para el trabajo pesado que no puede
/// correr en el hilo de detección (inferencia de pose, escritura a disco).
///
/// La cola de envío es acotada: si los trabajadores van saturados, `submit`
/// bloquea brevemente al llamador en vez de descartar trabajo en silencio.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Crea `size` trabajadores con una cola de `queue_cap` trabajos
    pub fn new(size: usize, queue_cap: usize) -> Self {
        let (tx, rx) = bounded::<Job>(queue_cap.max(1));

        let workers = (0..size.max(1))
            .map(|idx| {
                let rx = rx.clone();
                thread::Builder::new()
                    .name(format!("worker-{idx}"))
                    .spawn(move || {
                        // El hilo termina cuando el canal se cierra y se vacía
                        while let Ok(job) = rx.recv() {
                            job();
                        }
                        debug!("worker {idx} stopped");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Encola un trabajo. Bloquea si la cola está llena; devuelve false solo
    /// si el pool ya fue apagado.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.tx.as_ref() {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Cierra la cola, drena los trabajos pendientes y espera a los hilos
    pub fn shutdown(&mut self) {
        // Soltar el sender cierra el canal; los workers drenan lo encolado
        self.tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn runs_submitted_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(2, 8);

        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn shutdown_drains_queued_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(1, 16);

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new(1, 4);
        pool.shutdown();
        assert!(!pool.submit(|| {}));
    }
}
