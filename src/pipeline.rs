use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info, warn};

use crate::camera::{FrameSource, SourceError};
use crate::clip_recorder::ClipRecorder;
use crate::config::Config;
use crate::delay_confirm::{DelayConfirm, DelayConfirmParams, FallState};
use crate::detector::Detector;
use crate::event_logger::EventLogger;
use crate::events::{FallEvent, FallObserver, ObserverError};
use crate::keypoint_smoother::SmootherParams;
use crate::notifier::{Notifier, PushTransport};
use crate::rolling_buffer::RollingBuffer;
use crate::rule_engine::{BboxRule, PoseRule, PoseRuleParams, RuleEngine};
use crate::skeleton_collector::{CollectorParams, SkeletonCollector};
use crate::skeleton_extractor::SkeletonExtractor;
use crate::timer::OneShotTimer;

/// Observador de caídas que agenda la escritura diferida del clip.
///
/// El clip cubre [confirmed_at - before, confirmed_at + after]: la mitad
/// posterior todavía no existe al confirmarse el evento, así que la
/// consulta al buffer se difiere `after` segundos con un temporizador de
/// un disparo. En el apagado los temporizadores pendientes se cancelan y
/// esos clips no se escriben.
pub struct ClipScheduler {
    buffer: Arc<RollingBuffer>,
    recorder: Arc<Mutex<ClipRecorder>>,
    logger: Arc<EventLogger>,
    clip_before_sec: f64,
    clip_after_sec: f64,
    timers: Mutex<Vec<OneShotTimer>>,
}

impl ClipScheduler {
    pub fn new(
        buffer: Arc<RollingBuffer>,
        recorder: ClipRecorder,
        logger: Arc<EventLogger>,
        clip_before_sec: f64,
        clip_after_sec: f64,
    ) -> Self {
        Self {
            buffer,
            recorder: Arc::new(Mutex::new(recorder)),
            logger,
            clip_before_sec,
            clip_after_sec,
            timers: Mutex::new(Vec::new()),
        }
    }

    fn schedule(&self, event: &FallEvent) {
        let buffer = Arc::clone(&self.buffer);
        let recorder = Arc::clone(&self.recorder);
        let logger = Arc::clone(&self.logger);
        let event_id = event.event_id.clone();
        let event_time = event.confirmed_at;
        let before = self.clip_before_sec;
        let after = self.clip_after_sec;

        let timer = OneShotTimer::schedule(Duration::from_secs_f64(after), move || {
            let frames = buffer.get_clip(event_time, before, after);
            match recorder.lock().unwrap().save(&frames, &event_id) {
                Ok(path) => {
                    if let Err(e) = logger.update_clip_path(&event_id, &path.to_string_lossy()) {
                        warn!(event_id = %event_id, "failed to record clip path: {e}");
                    }
                }
                // El clip se pierde pero el evento ya quedó registrado;
                // clip_path permanece nulo
                Err(e) => warn!(event_id = %event_id, "clip write failed: {e}"),
            }
        });

        let mut timers = self.timers.lock().unwrap();
        timers.retain(|t| !t.is_done());
        timers.push(timer);
    }

    /// Cancela los temporizadores pendientes (apagado)
    pub fn cancel_all(&self) {
        self.timers.lock().unwrap().clear();
    }

    pub fn pending_timers(&self) -> usize {
        let mut timers = self.timers.lock().unwrap();
        timers.retain(|t| !t.is_done());
        timers.len()
    }
}

impl FallObserver for Arc<ClipScheduler> {
    fn on_fall_confirmed(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        // Solo la primera notificación del evento produce clip; las
        // re-notificaciones no regraban
        if event.notification_count == 1 {
            self.schedule(event);
        }
        Ok(())
    }

    fn on_fall_recovered(&mut self, _event: &FallEvent) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Piezas externas que el orquestador recibe ya construidas: el detector
/// del lazo principal, el detector de pose del recolector (si se quiere
/// recolección), el transporte de notificaciones y el codificador de clips.
pub struct PipelineParts {
    pub detector: Box<dyn Detector>,
    pub collector_detector: Option<Box<dyn Detector>>,
    pub transport: Box<dyn PushTransport>,
    pub encoder: Box<dyn crate::clip_recorder::ClipEncoder>,
}

/// Orquestador del sistema: la bomba por frame.
///
/// Por cada frame: detectar → clasificar con la regla → empujar al buffer
/// → avanzar la máquina de estados. Los observadores registrados en la
/// máquina hacen el resto (bitácora, notificación, clip diferido,
/// recolección de esqueletos).
pub struct Pipeline {
    rule_engine: RuleEngine,
    detector: Box<dyn Detector>,
    buffer: Arc<RollingBuffer>,
    machine: DelayConfirm,
    logger: Arc<EventLogger>,
    scheduler: Arc<ClipScheduler>,
    collector: Option<Arc<SkeletonCollector>>,
    stop: Arc<AtomicBool>,
    started: Instant,
}

impl Pipeline {
    pub fn build(config: &Config, parts: PipelineParts) -> Result<Self> {
        let buffer = Arc::new(RollingBuffer::new(
            config.recording.buffer_seconds,
            config.camera.fps,
        ));

        let logger = Arc::new(EventLogger::open(&config.db_path)?);

        let rule_engine = if config.detection.use_pose {
            let smoothing = config.detection.enable_smoothing.then(|| SmootherParams {
                min_cutoff: config.detection.smoothing_min_cutoff,
                beta: config.detection.smoothing_beta,
                ..SmootherParams::default()
            });
            RuleEngine::Pose(PoseRule::new(
                PoseRuleParams {
                    torso_angle_threshold: config.analysis.fall_threshold,
                    ..PoseRuleParams::default()
                },
                smoothing,
            ))
        } else {
            RuleEngine::Bbox(BboxRule::new(config.analysis.fall_threshold))
        };

        let mut machine = DelayConfirm::new(DelayConfirmParams {
            delay_sec: config.analysis.delay_sec,
            same_event_window: config.analysis.same_event_window,
            re_notify_interval: config.analysis.re_notify_interval,
        });

        // Orden de registro = orden de notificación: primero la bitácora,
        // luego la alerta, al final el clip
        machine.add_fall_observer(Box::new(Arc::clone(&logger)));
        machine.add_fall_observer(Box::new(Notifier::new(
            parts.transport,
            config.notification.enabled,
        )));

        let recorder = ClipRecorder::new(
            parts.encoder,
            config.recording.clips_dir.clone(),
            config.camera.fps,
        );
        let scheduler = Arc::new(ClipScheduler::new(
            Arc::clone(&buffer),
            recorder,
            Arc::clone(&logger),
            config.recording.clip_before_sec,
            config.recording.clip_after_sec,
        ));
        machine.add_fall_observer(Box::new(Arc::clone(&scheduler)));

        let collector = match (
            config.lifecycle.auto_skeleton_extract,
            parts.collector_detector,
        ) {
            (true, Some(detector)) => {
                let extractor = SkeletonExtractor::new(
                    detector,
                    "yolo-pose",
                    &config.detection.pose_model,
                    "11",
                );
                let collector = Arc::new(SkeletonCollector::new(
                    Arc::clone(&buffer),
                    extractor,
                    CollectorParams {
                        output_dir: config.lifecycle.skeleton_output_dir.clone(),
                        enabled: true,
                        max_workers: config.lifecycle.skeleton_workers,
                        clip_before_sec: config.recording.clip_before_sec,
                        clip_after_sec: config.recording.clip_after_sec,
                        fps: config.camera.fps,
                    },
                ));
                machine.add_suspected_observer(Box::new(Arc::clone(&collector)));
                Some(collector)
            }
            (true, None) => {
                warn!("skeleton collection requested but no pose detector provided");
                None
            }
            _ => None,
        };

        Ok(Self {
            rule_engine,
            detector: parts.detector,
            buffer,
            machine,
            logger,
            scheduler,
            collector,
            stop: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
        })
    }

    /// Bandera de parada compartible con el manejador de señales
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> FallState {
        self.machine.state()
    }

    pub fn buffer(&self) -> &Arc<RollingBuffer> {
        &self.buffer
    }

    pub fn logger(&self) -> &Arc<EventLogger> {
        &self.logger
    }

    pub fn pending_clip_timers(&self) -> usize {
        self.scheduler.pending_timers()
    }

    /// Procesa un frame ya leído con su marca de tiempo monotónica.
    /// Una falla del detector cuenta como frame sin sujeto y no detiene
    /// el lazo.
    pub fn process_frame(&mut self, pixels: crate::types::Pixels, timestamp: f64) -> FallState {
        let subject = match self.detector.detect(&pixels) {
            Ok(subject) => subject,
            Err(e) => {
                error!("detector failed, treating frame as empty: {e}");
                None
            }
        };

        let fallen = self.rule_engine.is_fallen(subject.as_ref(), timestamp);

        self.buffer
            .push(crate::types::Frame::new(timestamp, pixels));

        self.machine.update(fallen, timestamp)
    }

    /// Lazo principal: corre hasta el fin del stream, una falla fatal de la
    /// fuente o la bandera de parada. Siempre apaga ordenadamente.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<()> {
        info!(fps = source.fps(), "fall detection pipeline started");

        let outcome = loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, leaving detection loop");
                break Ok(());
            }

            let pixels = match source.read() {
                Ok(Some(pixels)) => pixels,
                // Falla transitoria: el frame se pierde y seguimos
                Ok(None) => continue,
                Err(SourceError::EndOfStream) => {
                    info!("frame source ended");
                    break Ok(());
                }
                Err(e) => {
                    error!("fatal source error: {e}");
                    break Err(anyhow::Error::from(e));
                }
            };

            let timestamp = self.started.elapsed().as_secs_f64();
            self.process_frame(pixels, timestamp);
        };

        self.shutdown();
        outcome
    }

    /// Apagado ordenado: cancela los clips diferidos pendientes y espera a
    /// que el recolector termine las extracciones en vuelo
    pub fn shutdown(&mut self) {
        self.scheduler.cancel_all();
        if let Some(collector) = self.collector.as_ref() {
            collector.shutdown();
        }
        info!("pipeline shut down");
    }
}
