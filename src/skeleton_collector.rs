use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::events::{ObserverError, SuspectedEvent, SuspectedObserver};
use crate::rolling_buffer::RollingBuffer;
use crate::skeleton_extractor::SkeletonExtractor;
use crate::worker_pool::WorkerPool;

/// Parámetros del recolector de esqueletos
#[derive(Debug, Clone)]
pub struct CollectorParams {
    pub output_dir: PathBuf,
    pub enabled: bool,
    pub max_workers: usize,
    pub clip_before_sec: f64,
    pub clip_after_sec: f64,
    pub fps: f64,
}

impl Default for CollectorParams {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/skeletons"),
            enabled: true,
            max_workers: 2,
            clip_before_sec: 5.0,
            clip_after_sec: 5.0,
            fps: 15.0,
        }
    }
}

/// Recolector de esqueletos: observador de sospechas que convierte cada
/// sospecha resuelta en una muestra de entrenamiento etiquetada.
///
/// Protocolo:
/// 1. Al entrar en sospecha solo se anota el evento; no se extrae nada.
/// 2. Al resolverse (descartada o confirmada) el tramo de frames se copia
///    del buffer EN EL HILO QUE NOTIFICA, antes de devolver el control a
///    la máquina de estados: el buffer es una ventana deslizante y un
///    sistema ocupado puede desalojar esos frames antes de que un hilo de
///    fondo alcance a tomarlos.
/// 3. La inferencia de pose y la escritura del JSON sí van al pool de
///    trabajadores.
///
/// El archivo final se llama `{suspected_id}_{confirmed|cleared}.json`.
pub struct SkeletonCollector {
    params: CollectorParams,
    buffer: Arc<RollingBuffer>,
    extractor: Arc<Mutex<SkeletonExtractor>>,
    pool: Mutex<WorkerPool>,
    pending: Mutex<HashMap<String, SuspectedEvent>>,
    extraction_count: AtomicUsize,
}

impl SkeletonCollector {
    pub fn new(
        buffer: Arc<RollingBuffer>,
        extractor: SkeletonExtractor,
        params: CollectorParams,
    ) -> Self {
        // Cola del doble de trabajadores: si se llena, el envío bloquea al
        // llamador brevemente en vez de descartar la muestra
        let pool = WorkerPool::new(params.max_workers, params.max_workers * 2);
        Self {
            params,
            buffer,
            extractor: Arc::new(Mutex::new(extractor)),
            pool: Mutex::new(pool),
            pending: Mutex::new(HashMap::new()),
            extraction_count: AtomicUsize::new(0),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Extracciones despachadas al pool desde el arranque
    pub fn extraction_count(&self) -> usize {
        self.extraction_count.load(Ordering::SeqCst)
    }

    fn record(&self, event: &SuspectedEvent) {
        if !self.params.enabled {
            return;
        }
        info!(suspected_id = %event.suspected_id, "suspected event recorded");
        self.pending
            .lock()
            .unwrap()
            .insert(event.suspected_id.clone(), event.clone());
    }

    fn resolve(&self, event: &SuspectedEvent) {
        if !self.params.enabled {
            return;
        }
        if self
            .pending
            .lock()
            .unwrap()
            .remove(&event.suspected_id)
            .is_none()
        {
            return;
        }

        // Copia inmediata, bajo el lock del buffer, en el hilo de la
        // notificación. Después de esto los frames son nuestros.
        let frames = self.buffer.get_clip(
            event.suspected_at,
            self.params.clip_before_sec,
            self.params.clip_after_sec,
        );

        if frames.is_empty() {
            warn!(suspected_id = %event.suspected_id, "no frames available, sample skipped");
            return;
        }

        self.extraction_count.fetch_add(1, Ordering::SeqCst);
        info!(
            suspected_id = %event.suspected_id,
            outcome = event.outcome.label(),
            frames = frames.len(),
            "extracting skeleton sample"
        );

        let extractor = Arc::clone(&self.extractor);
        let output_dir = self.params.output_dir.clone();
        let fps = self.params.fps;
        let event = event.clone();

        let submitted = self.pool.lock().unwrap().submit(move || {
            let sequence = extractor
                .lock()
                .unwrap()
                .extract(&frames, &event.suspected_id, fps);

            let filename = format!("{}_{}.json", event.suspected_id, event.outcome.label());
            let path = output_dir.join(filename);
            match sequence.to_json(&path) {
                Ok(()) => info!(path = %path.display(), "skeleton sample saved"),
                Err(e) => warn!(suspected_id = %event.suspected_id, "failed to save sample: {e}"),
            }
        });

        if !submitted {
            warn!("collector pool already shut down, sample dropped");
        }
    }

    /// Espera a que terminen las extracciones en vuelo y drena la cola
    pub fn shutdown(&self) {
        self.pool.lock().unwrap().shutdown();
    }
}

impl SuspectedObserver for Arc<SkeletonCollector> {
    fn on_fall_suspected(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        self.record(event);
        Ok(())
    }

    fn on_suspicion_cleared(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        self.resolve(event);
        Ok(())
    }

    fn on_fall_confirmed_update(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        self.resolve(event);
        Ok(())
    }
}
