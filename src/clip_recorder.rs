use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::Frame;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("empty clip for event {0}")]
    EmptyClip(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codificador de video MP4. La codificación real (FFmpeg, GStreamer) vive
/// fuera del núcleo; el contrato es frames adentro, archivo afuera.
pub trait ClipEncoder: Send {
    fn encode(&mut self, frames: &[Frame], fps: f64, output: &Path) -> Result<(), ClipError>;
}

/// Grabador de clips: nombra el archivo, delega la codificación y devuelve
/// la ruta escrita para que quede registrada en la bitácora de eventos.
pub struct ClipRecorder {
    encoder: Box<dyn ClipEncoder>,
    output_dir: PathBuf,
    fps: f64,
}

impl ClipRecorder {
    pub fn new(encoder: Box<dyn ClipEncoder>, output_dir: impl Into<PathBuf>, fps: f64) -> Self {
        Self {
            encoder,
            output_dir: output_dir.into(),
            fps,
        }
    }

    /// `{yyyymmdd_hhmmss}_{event_id}.mp4`: único mientras no se confirmen
    /// dos eventos distintos en el mismo segundo, que la ventana de
    /// deduplicación ya impide
    fn clip_filename(event_id: &str) -> String {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        format!("{stamp}_{event_id}.mp4")
    }

    /// Codifica el clip y devuelve la ruta escrita
    pub fn save(&mut self, frames: &[Frame], event_id: &str) -> Result<PathBuf, ClipError> {
        if frames.is_empty() {
            warn!(event_id, "no frames available for clip");
            return Err(ClipError::EmptyClip(event_id.to_string()));
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let output = self.output_dir.join(Self::clip_filename(event_id));

        self.encoder.encode(frames, self.fps, &output)?;
        info!(event_id, path = %output.display(), frames = frames.len(), "clip saved");
        Ok(output)
    }
}

/// Codificador que delega en un `ffmpeg` externo: recibe los frames crudos
/// por stdin y produce el MP4. El binario de ffmpeg es parte del entorno,
/// no del sistema.
pub struct FfmpegEncoder {
    ffmpeg_path: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl ClipEncoder for FfmpegEncoder {
    fn encode(&mut self, frames: &[Frame], fps: f64, output: &Path) -> Result<(), ClipError> {
        use std::io::Write;
        use std::process::{Command, Stdio};

        let first = frames
            .first()
            .ok_or_else(|| ClipError::Encoder("no frames".to_string()))?;
        let size = format!("{}x{}", first.pixels.width(), first.pixels.height());

        let mut child = Command::new(&self.ffmpeg_path)
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "bgr24",
                "-s",
                &size,
                "-r",
                &format!("{fps}"),
                "-i",
                "-",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ClipError::Encoder(format!("failed to spawn ffmpeg: {e}")))?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| ClipError::Encoder("ffmpeg stdin unavailable".to_string()))?;
            for frame in frames {
                stdin.write_all(frame.pixels.data())?;
            }
        }

        let status = child
            .wait()
            .map_err(|e| ClipError::Encoder(format!("ffmpeg wait failed: {e}")))?;
        if !status.success() {
            return Err(ClipError::Encoder(format!(
                "ffmpeg exited with {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pixels;
    use std::sync::{Arc, Mutex};

    /// Codificador falso que escribe un archivo vacío y registra la llamada
    #[derive(Clone, Default)]
    struct FakeEncoder {
        calls: Arc<Mutex<Vec<(usize, PathBuf)>>>,
    }

    impl ClipEncoder for FakeEncoder {
        fn encode(&mut self, frames: &[Frame], _fps: f64, output: &Path) -> Result<(), ClipError> {
            std::fs::write(output, b"").map_err(ClipError::Io)?;
            self.calls
                .lock()
                .unwrap()
                .push((frames.len(), output.to_path_buf()));
            Ok(())
        }
    }

    fn frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame::new(i as f64 / 15.0, Pixels::new(2, 2, vec![0u8; 12])))
            .collect()
    }

    #[test]
    fn save_names_file_with_event_id() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::default();
        let mut recorder = ClipRecorder::new(Box::new(encoder.clone()), dir.path(), 15.0);

        let path = recorder.save(&frames(30), "evt_3").unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_evt_3.mp4"));
        assert_eq!(encoder.calls.lock().unwrap()[0].0, 30);
    }

    #[test]
    fn empty_clip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder =
            ClipRecorder::new(Box::new(FakeEncoder::default()), dir.path(), 15.0);
        assert!(matches!(
            recorder.save(&[], "evt_1"),
            Err(ClipError::EmptyClip(_))
        ));
    }
}
