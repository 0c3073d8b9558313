use ort::session::Session;
use thiserror::Error;
use tracing::info;

use crate::types::{BBox, Pixels, Skeleton, Subject, NUM_KEYPOINTS};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("ONNX Runtime error: {0}")]
    Onnx(#[from] ort::Error),

    #[error("unexpected output shape {0:?}")]
    OutputShape(Vec<i64>),

    #[error("missing ONNX {kind}")]
    MissingIo { kind: &'static str },
}

/// Detector de personas sobre un frame. A lo sumo un sujeto por frame:
/// el sistema monitorea a una sola persona.
pub trait Detector: Send {
    fn detect(&mut self, pixels: &Pixels) -> Result<Option<Subject>, DetectorError>;
}

/// Lado de entrada de los modelos YOLO
const INPUT_SIZE: usize = 640;
/// Canales por anclaje en la salida de pose: 4 caja + 1 confianza + 17×3
const POSE_CHANNELS: usize = 4 + 1 + NUM_KEYPOINTS * 3;

/// Transformación letterbox aplicada antes de la inferencia, necesaria para
/// devolver las coordenadas al espacio de la imagen original
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Reescala con muestreo bilineal a un cuadrado INPUT_SIZE×INPUT_SIZE
/// preservando proporciones (bordes rellenos en gris neutro) y produce el
/// tensor NCHW [1, 3, 640, 640] en RGB normalizado a [0, 1].
fn letterbox_chw(pixels: &Pixels) -> (Vec<f32>, Letterbox) {
    let src_w = pixels.width() as usize;
    let src_h = pixels.height() as usize;
    let data = pixels.data();

    let scale = (INPUT_SIZE as f32 / src_w as f32).min(INPUT_SIZE as f32 / src_h as f32);
    let new_w = ((src_w as f32 * scale).round() as usize).max(1);
    let new_h = ((src_h as f32 * scale).round() as usize).max(1);
    let pad_x = ((INPUT_SIZE - new_w) / 2) as f32;
    let pad_y = ((INPUT_SIZE - new_h) / 2) as f32;

    let mut chw = vec![114.0 / 255.0; 3 * INPUT_SIZE * INPUT_SIZE];

    for dy in 0..new_h {
        // Coordenada fuente continua del centro del píxel destino
        let sy = ((dy as f32 + 0.5) / scale - 0.5).clamp(0.0, (src_h - 1) as f32);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;

        for dx in 0..new_w {
            let sx = ((dx as f32 + 0.5) / scale - 0.5).clamp(0.0, (src_w - 1) as f32);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;

            let out_y = dy + pad_y as usize;
            let out_x = dx + pad_x as usize;

            // Entrada BGR, salida RGB: canal 0 del tensor = B de la imagen
            for c in 0..3 {
                let p00 = data[(y0 * src_w + x0) * 3 + c] as f32;
                let p01 = data[(y0 * src_w + x1) * 3 + c] as f32;
                let p10 = data[(y1 * src_w + x0) * 3 + c] as f32;
                let p11 = data[(y1 * src_w + x1) * 3 + c] as f32;
                let value = p00 * (1.0 - fx) * (1.0 - fy)
                    + p01 * fx * (1.0 - fy)
                    + p10 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                let channel = 2 - c; // BGR → RGB
                chw[channel * INPUT_SIZE * INPUT_SIZE + out_y * INPUT_SIZE + out_x] =
                    value / 255.0;
            }
        }
    }

    (
        chw,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

fn session_io_names(session: &Session) -> Result<(String, String), DetectorError> {
    let input_name = session
        .inputs()
        .first()
        .map(|input| input.name().to_string())
        .ok_or(DetectorError::MissingIo { kind: "input" })?;
    let output_name = session
        .outputs()
        .first()
        .map(|output| output.name().to_string())
        .ok_or(DetectorError::MissingIo { kind: "output" })?;
    Ok((input_name, output_name))
}

/// Detector de pose YOLO (salida [1, 56, N]): caja + confianza + 17
/// keypoints por anclaje. Devuelve el esqueleto del anclaje más confiable.
pub struct OnnxPoseDetector {
    session: Session,
    input_name: String,
    output_name: String,
    confidence: f32,
}

impl OnnxPoseDetector {
    pub fn new(model_path: &str, confidence: f32) -> Result<Self, DetectorError> {
        let session = Session::builder()?.commit_from_file(model_path)?;
        let (input_name, output_name) = session_io_names(&session)?;

        info!(model = model_path, input = %input_name, output = %output_name,
              "pose model loaded");

        Ok(Self {
            session,
            input_name,
            output_name,
            confidence,
        })
    }
}

impl Detector for OnnxPoseDetector {
    fn detect(&mut self, pixels: &Pixels) -> Result<Option<Subject>, DetectorError> {
        let (chw, letterbox) = letterbox_chw(pixels);

        let shape = vec![1_usize, 3, INPUT_SIZE, INPUT_SIZE];
        let input_value = ort::value::Value::from_array((shape, chw))?;

        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => &input_value,
        ])?;

        let (out_shape, out_data) =
            outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let dims: Vec<i64> = out_shape.iter().copied().collect();
        if dims.len() != 3 || dims[1] as usize != POSE_CHANNELS {
            return Err(DetectorError::OutputShape(dims));
        }
        let anchors = dims[2] as usize;

        // Anclaje con mayor confianza de persona
        let mut best_idx = None;
        let mut best_conf = self.confidence;
        for j in 0..anchors {
            let conf = out_data[4 * anchors + j];
            if conf >= best_conf {
                best_conf = conf;
                best_idx = Some(j);
            }
        }

        let j = match best_idx {
            Some(j) => j,
            None => return Ok(None),
        };

        let mut keypoints = [[0.0f32; 3]; NUM_KEYPOINTS];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            let x = out_data[(5 + 3 * k) * anchors + j];
            let y = out_data[(5 + 3 * k + 1) * anchors + j];
            let visibility = out_data[(5 + 3 * k + 2) * anchors + j];
            *kp = [
                (x - letterbox.pad_x) / letterbox.scale,
                (y - letterbox.pad_y) / letterbox.scale,
                visibility,
            ];
        }

        Ok(Some(Subject::Skeleton(Skeleton::new(keypoints))))
    }
}

/// Detector de cajas YOLO (salida [1, 4+clases, N]); solo interesa la
/// clase persona (índice 0 en COCO).
pub struct OnnxBboxDetector {
    session: Session,
    input_name: String,
    output_name: String,
    confidence: f32,
}

impl OnnxBboxDetector {
    pub fn new(model_path: &str, confidence: f32) -> Result<Self, DetectorError> {
        let session = Session::builder()?.commit_from_file(model_path)?;
        let (input_name, output_name) = session_io_names(&session)?;

        info!(model = model_path, input = %input_name, output = %output_name,
              "bbox model loaded");

        Ok(Self {
            session,
            input_name,
            output_name,
            confidence,
        })
    }
}

impl Detector for OnnxBboxDetector {
    fn detect(&mut self, pixels: &Pixels) -> Result<Option<Subject>, DetectorError> {
        let (chw, letterbox) = letterbox_chw(pixels);

        let shape = vec![1_usize, 3, INPUT_SIZE, INPUT_SIZE];
        let input_value = ort::value::Value::from_array((shape, chw))?;

        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => &input_value,
        ])?;

        let (out_shape, out_data) =
            outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        let dims: Vec<i64> = out_shape.iter().copied().collect();
        if dims.len() != 3 || (dims[1] as usize) < 5 {
            return Err(DetectorError::OutputShape(dims));
        }
        let anchors = dims[2] as usize;

        let mut best = None;
        let mut best_conf = self.confidence;
        for j in 0..anchors {
            // Puntaje de la clase persona
            let conf = out_data[4 * anchors + j];
            if conf >= best_conf {
                best_conf = conf;
                best = Some(j);
            }
        }

        let j = match best {
            Some(j) => j,
            None => return Ok(None),
        };

        let cx = (out_data[j] - letterbox.pad_x) / letterbox.scale;
        let cy = (out_data[anchors + j] - letterbox.pad_y) / letterbox.scale;
        let w = out_data[2 * anchors + j] / letterbox.scale;
        let h = out_data[3 * anchors + j] / letterbox.scale;

        Ok(Some(Subject::Bbox(BBox {
            x: (cx - w / 2.0).round() as i32,
            y: (cy - h / 2.0).round() as i32,
            width: w.round() as i32,
            height: h.round() as i32,
            confidence: best_conf,
        })))
    }
}
