/*
Centinela - Detección de caídas en tiempo real para el hogar

Sistema de monitoreo que:
1. Lee frames de video crudo BGR24 por stdin (decodificados por ffmpeg)
2. Clasifica cada frame con un modelo YOLO (caja o pose) + reglas geométricas
3. Confirma caídas con una máquina de antirrebote de tres estados
4. Al confirmar: registra en SQLite, notifica, graba el clip y recolecta
   esqueletos para entrenamiento

Para compilar y ejecutar:
cargo build --release
ffmpeg -i /dev/video0 -f rawvideo -pix_fmt bgr24 - | ./target/release/centinela config.json

Sin argumentos corre el modo demo (señal simulada, sin modelos ni cámara).
*/

use std::env;

use anyhow::{Context, Result};
use tracing::info;

use centinela::camera::{RawVideoSource, RetryingSource};
use centinela::clip_recorder::FfmpegEncoder;
use centinela::config::Config;
use centinela::delay_confirm::{DelayConfirm, DelayConfirmParams, FallState};
use centinela::detector::{Detector, OnnxBboxDetector, OnnxPoseDetector};
use centinela::events::{FallEvent, FallObserver, ObserverError, SuspectedEvent, SuspectedObserver};
use centinela::notifier::{PushMessage, PushTransport};
use centinela::pipeline::{Pipeline, PipelineParts};

/// Transporte de notificaciones por omisión: imprime la alerta en consola.
/// El integrador lo reemplaza por su canal real (LINE, Telegram, webhook).
struct ConsoleTransport;

impl PushTransport for ConsoleTransport {
    fn send(&mut self, message: &PushMessage) -> Result<(), String> {
        println!("📨 {}", message.text.replace('\n', " | "));
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("👁️  Centinela - Detección de Caídas\n");

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("🔧 Modo: DEMO - señal simulada\n");
        return demo_mode();
    }

    let config = Config::load(&args[1])?;
    println!("🔧 Modo: detección en vivo");
    println!(
        "📷 Fuente: stdin crudo BGR24 {}x{} @ {} fps",
        config.camera.resolution[0], config.camera.resolution[1], config.camera.fps
    );
    println!(
        "🧠 Modelo: {}\n",
        if config.detection.use_pose {
            &config.detection.pose_model
        } else {
            &config.detection.model
        }
    );

    // Detector del lazo principal según el modo configurado
    let detector: Box<dyn Detector> = if config.detection.use_pose {
        Box::new(
            OnnxPoseDetector::new(&config.detection.pose_model, config.detection.confidence)
                .context("No se pudo cargar el modelo de pose")?,
        )
    } else {
        Box::new(
            OnnxBboxDetector::new(&config.detection.model, config.detection.confidence)
                .context("No se pudo cargar el modelo de detección")?,
        )
    };

    // El recolector siempre extrae pose, aunque el lazo use cajas
    let collector_detector: Option<Box<dyn Detector>> = if config.lifecycle.auto_skeleton_extract
    {
        Some(Box::new(
            OnnxPoseDetector::new(&config.detection.pose_model, config.detection.confidence)
                .context("No se pudo cargar el modelo de pose del recolector")?,
        ))
    } else {
        None
    };

    let mut pipeline = Pipeline::build(
        &config,
        PipelineParts {
            detector,
            collector_detector,
            transport: Box::new(ConsoleTransport),
            encoder: Box::new(FfmpegEncoder::default()),
        },
    )?;

    // Ctrl-C mata al ffmpeg que alimenta stdin; el EOF resultante saca al
    // lazo por EndOfStream y el apagado es ordenado. La bandera de
    // Pipeline::stop_handle() queda para integraciones embebidas.
    let raw = RawVideoSource::new(
        std::io::stdin(),
        config.camera.resolution[0],
        config.camera.resolution[1],
        config.camera.fps,
    );
    let mut source = RetryingSource::new(raw, config.camera.source.clone(), config.camera.max_retries);

    info!("starting detection loop");
    pipeline.run(&mut source)
}

/// Observador de consola para el modo demo
struct ConsolePrinter;

impl FallObserver for ConsolePrinter {
    fn on_fall_confirmed(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        println!(
            "│ 🚨 CONFIRMADA │ {:>8} │ t={:>6.1}s │ aviso #{} │",
            event.event_id, event.confirmed_at, event.notification_count
        );
        Ok(())
    }

    fn on_fall_recovered(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        println!("│ ✅ RECUPERADA │ {:>8} │", event.event_id);
        Ok(())
    }
}

impl SuspectedObserver for ConsolePrinter {
    fn on_fall_suspected(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        println!(
            "│ ⚠️  SOSPECHA   │ {:>8} │ t={:>6.1}s │",
            event.suspected_id, event.suspected_at
        );
        Ok(())
    }

    fn on_suspicion_cleared(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        println!("│ 💨 DESCARTADA │ {:>8} │", event.suspected_id);
        Ok(())
    }

    fn on_fall_confirmed_update(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        println!("│ 🏷️  ETIQUETADA │ {:>8} │ desenlace: {} │", event.suspected_id, event.outcome.label());
        Ok(())
    }
}

/// Modo demo: reproduce una sesión sintética contra la máquina de estados.
/// Una falsa alarma corta, una caída sostenida con recuperación y una
/// recaída dentro de la ventana de deduplicación.
fn demo_mode() -> Result<()> {
    let mut machine = DelayConfirm::new(DelayConfirmParams::default());
    machine.add_fall_observer(Box::new(ConsolePrinter));
    machine.add_suspected_observer(Box::new(ConsolePrinter));

    println!("┌───────────────────────────────────────────────────┐");

    let fps = 15.0;
    let fallen_at = |t: f64| -> bool {
        // Falsa alarma de 1 s en t=3, caída sostenida de 20 a 35 s,
        // recaída en t=45 dentro de la ventana de deduplicación
        (3.0..4.0).contains(&t) || (20.0..35.0).contains(&t) || (45.0..55.0).contains(&t)
    };

    let mut state = FallState::Normal;
    let ticks = (60.0 * fps) as usize;
    for i in 0..ticks {
        let t = i as f64 / fps;
        state = machine.update(fallen_at(t), t);
    }

    println!("└───────────────────────────────────────────────────┘");
    println!("\nEstado final: {state:?}");
    Ok(())
}
