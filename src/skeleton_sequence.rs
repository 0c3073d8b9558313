use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Skeleton, COCO17_KEYPOINT_NAMES, NUM_KEYPOINTS};

/// Identificación del motor que produjo la secuencia
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorMetadata {
    pub engine: String,
    pub model: String,
    pub version: String,
}

/// Metadatos de una secuencia de esqueletos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceMetadata {
    pub event_id: String,
    /// Instante de extracción, ISO-8601
    pub timestamp: String,
    pub source_video: String,
    pub duration_sec: f64,
    pub fps: f64,
    pub total_frames: usize,
    pub extractor: ExtractorMetadata,
}

/// Rasgos geométricos derivados de un frame, útiles como features de
/// entrenamiento sin recomputar el esqueleto
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub torso_angle: f32,
    pub aspect_ratio: f32,
    pub center_of_mass: (f32, f32),
}

/// Un frame de la secuencia: keypoints normalizados a [0, 1] indexados por
/// nombre COCO-17
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceFrame {
    pub frame_index: usize,
    pub timestamp: f64,
    pub keypoints: BTreeMap<String, [f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_features: Option<DerivedFeatures>,
}

impl SequenceFrame {
    /// Construye un frame normalizando las coordenadas del esqueleto por las
    /// dimensiones de la imagen fuente.
    pub fn from_skeleton(
        skeleton: &Skeleton,
        frame_index: usize,
        timestamp: f64,
        width: u32,
        height: u32,
    ) -> Self {
        let mut keypoints = BTreeMap::new();
        for i in 0..NUM_KEYPOINTS {
            let [x, y, visibility] = skeleton.keypoints[i];
            let x_norm = if width > 0 { x / width as f32 } else { 0.0 };
            let y_norm = if height > 0 { y / height as f32 } else { 0.0 };
            keypoints.insert(
                COCO17_KEYPOINT_NAMES[i].to_string(),
                [x_norm, y_norm, visibility],
            );
        }

        // Caja implícita de los puntos visibles, para el aspect ratio
        let mut min_x = f32::MAX;
        let mut max_x = f32::MIN;
        let mut min_y = f32::MAX;
        let mut max_y = f32::MIN;
        let mut any_visible = false;
        for [x, y, visibility] in skeleton.keypoints {
            if visibility > 0.3 {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                any_visible = true;
            }
        }
        let aspect_ratio = if any_visible && max_x > min_x {
            (max_y - min_y) / (max_x - min_x)
        } else {
            0.0
        };

        let (hx, hy) = skeleton.hip_center();
        let derived = DerivedFeatures {
            torso_angle: skeleton.torso_angle(),
            aspect_ratio,
            center_of_mass: (
                if width > 0 { hx / width as f32 } else { 0.5 },
                if height > 0 { hy / height as f32 } else { 0.5 },
            ),
        };

        Self {
            frame_index,
            timestamp,
            keypoints,
            derived_features: Some(derived),
        }
    }
}

/// Secuencia de esqueletos etiquetada, lista para serializar a JSON.
/// Es la muestra de entrenamiento que deja cada sospecha resuelta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkeletonSequence {
    pub metadata: SequenceMetadata,
    pub keypoint_format: String,
    pub sequence: Vec<SequenceFrame>,
    pub version: String,
}

impl SkeletonSequence {
    pub const KEYPOINT_FORMAT: &'static str = "coco17";
    pub const VERSION: &'static str = "1.0";

    pub fn new(metadata: SequenceMetadata, sequence: Vec<SequenceFrame>) -> Self {
        Self {
            metadata,
            keypoint_format: Self::KEYPOINT_FORMAT.to_string(),
            sequence,
            version: Self::VERSION.to_string(),
        }
    }

    /// Escribe la secuencia como JSON con indentación
    pub fn to_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(std::io::Error::other)?;
        Ok(())
    }
}
