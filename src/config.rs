use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuración de la fuente de video
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub source: String,
    pub fps: f64,
    pub resolution: [u32; 2],
    pub max_retries: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            fps: 15.0,
            resolution: [640, 480],
            max_retries: 3,
        }
    }
}

/// Configuración del detector
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Modelo de cajas (modo bbox)
    pub model: String,
    /// Modelo de pose (modo pose)
    pub pose_model: String,
    pub confidence: f32,
    pub use_pose: bool,
    pub enable_smoothing: bool,
    pub smoothing_min_cutoff: f32,
    pub smoothing_beta: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model: "yolo11s.onnx".to_string(),
            pose_model: "yolo11s-pose.onnx".to_string(),
            confidence: 0.5,
            use_pose: false,
            enable_smoothing: true,
            smoothing_min_cutoff: 1.0,
            smoothing_beta: 0.007,
        }
    }
}

/// Umbrales del análisis de caídas
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Umbral de la regla activa: relación alto/ancho en modo bbox, grados
    /// de inclinación del torso en modo pose
    pub fall_threshold: f32,
    pub delay_sec: f64,
    pub same_event_window: f64,
    pub re_notify_interval: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fall_threshold: 1.3,
            delay_sec: 3.0,
            same_event_window: 60.0,
            re_notify_interval: 120.0,
        }
    }
}

/// Configuración del buffer y los clips
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Ancho de la ventana del buffer. Debe cubrir
    /// delay_sec + clip_before_sec + clip_after_sec más un margen.
    pub buffer_seconds: f64,
    pub clip_before_sec: f64,
    pub clip_after_sec: f64,
    pub clips_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 15.0,
            clip_before_sec: 5.0,
            clip_after_sec: 5.0,
            clips_dir: PathBuf::from("data/clips"),
        }
    }
}

/// Notificaciones push
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Recolección de muestras de esqueleto
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub auto_skeleton_extract: bool,
    pub skeleton_output_dir: PathBuf,
    pub skeleton_workers: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            auto_skeleton_extract: false,
            skeleton_output_dir: PathBuf::from("data/skeletons"),
            skeleton_workers: 2,
        }
    }
}

/// Configuración completa del sistema
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub analysis: AnalysisConfig,
    pub recording: RecordingConfig,
    pub notification: NotificationConfig,
    pub lifecycle: LifecycleConfig,
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            analysis: AnalysisConfig::default(),
            recording: RecordingConfig::default(),
            notification: NotificationConfig::default(),
            lifecycle: LifecycleConfig::default(),
            db_path: PathBuf::from("data/eventos.db"),
        }
    }
}

impl Config {
    /// Carga desde un archivo JSON; las claves ausentes toman su valor por
    /// omisión
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("No se pudo abrir la configuración {path:?}"))?;
        let config: Config = serde_json::from_reader(file)
            .with_context(|| format!("Configuración inválida en {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// El buffer debe alcanzar para confirmar el evento y extraer el clip
    /// completo hacia ambos lados
    pub fn validate(&self) -> Result<()> {
        let needed = self.analysis.delay_sec
            + self.recording.clip_before_sec
            + self.recording.clip_after_sec;
        anyhow::ensure!(
            self.recording.buffer_seconds >= needed,
            "recording.buffer_seconds = {} no cubre delay + clip_before + clip_after = {}",
            self.recording.buffer_seconds,
            needed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_consistent() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.analysis.delay_sec, 3.0);
        assert_eq!(config.recording.buffer_seconds, 15.0);
        assert!(!config.detection.use_pose);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"detection": {{"use_pose": true}}, "analysis": {{"fall_threshold": 60.0}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert!(config.detection.use_pose);
        assert_eq!(config.analysis.fall_threshold, 60.0);
        assert_eq!(config.analysis.delay_sec, 3.0);
    }

    #[test]
    fn undersized_buffer_is_rejected() {
        let config = Config {
            recording: RecordingConfig {
                buffer_seconds: 5.0,
                ..RecordingConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
