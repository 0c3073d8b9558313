use chrono::Local;
use tracing::warn;

use crate::detector::Detector;
use crate::skeleton_sequence::{
    ExtractorMetadata, SequenceFrame, SequenceMetadata, SkeletonSequence,
};
use crate::types::{Frame, Subject};

/// Extrae una secuencia de esqueletos de un tramo de frames ya capturado.
///
/// Corre en los hilos trabajadores del recolector, nunca en el hilo de
/// detección: la inferencia sobre ~150 frames toma segundos.
pub struct SkeletonExtractor {
    detector: Box<dyn Detector>,
    engine: String,
    model: String,
    version: String,
}

impl SkeletonExtractor {
    pub fn new(
        detector: Box<dyn Detector>,
        engine: impl Into<String>,
        model: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            engine: engine.into(),
            model: model.into(),
            version: version.into(),
        }
    }

    /// Corre el detector de pose sobre cada frame y arma la secuencia con
    /// coordenadas normalizadas. Los frames sin persona se omiten.
    pub fn extract(&mut self, frames: &[Frame], event_id: &str, fps: f64) -> SkeletonSequence {
        let duration_sec = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) if frames.len() > 1 => last.timestamp - first.timestamp,
            _ => 0.0,
        };

        let metadata = SequenceMetadata {
            event_id: event_id.to_string(),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            source_video: "memory".to_string(),
            duration_sec,
            fps,
            total_frames: frames.len(),
            extractor: ExtractorMetadata {
                engine: self.engine.clone(),
                model: self.model.clone(),
                version: self.version.clone(),
            },
        };

        let mut sequence = Vec::new();
        for (idx, frame) in frames.iter().enumerate() {
            match self.detector.detect(&frame.pixels) {
                Ok(Some(Subject::Skeleton(skeleton))) => {
                    sequence.push(SequenceFrame::from_skeleton(
                        &skeleton,
                        idx,
                        frame.timestamp,
                        frame.pixels.width(),
                        frame.pixels.height(),
                    ));
                }
                // Frame sin persona o con detección de caja: se omite
                Ok(_) => {}
                Err(e) => {
                    warn!(event_id, frame = idx, "pose inference failed: {e}");
                }
            }
        }

        SkeletonSequence::new(metadata, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;
    use crate::types::{KeypointIndex, Pixels, Skeleton, NUM_KEYPOINTS};

    /// Detector falso que alterna persona / frame vacío
    struct Alternating {
        tick: usize,
    }

    impl Detector for Alternating {
        fn detect(&mut self, _pixels: &Pixels) -> Result<Option<Subject>, DetectorError> {
            self.tick += 1;
            if self.tick % 2 == 0 {
                return Ok(None);
            }
            let mut kps = [[0.0f32; 3]; NUM_KEYPOINTS];
            kps[KeypointIndex::LeftShoulder as usize] = [100.0, 100.0, 0.9];
            kps[KeypointIndex::RightShoulder as usize] = [120.0, 100.0, 0.9];
            kps[KeypointIndex::LeftHip as usize] = [102.0, 200.0, 0.9];
            kps[KeypointIndex::RightHip as usize] = [118.0, 200.0, 0.9];
            Ok(Some(Subject::Skeleton(Skeleton::new(kps))))
        }
    }

    fn frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame::new(i as f64 / 15.0, Pixels::new(4, 4, vec![0u8; 48])))
            .collect()
    }

    #[test]
    fn skips_frames_without_person() {
        let mut extractor = SkeletonExtractor::new(
            Box::new(Alternating { tick: 0 }),
            "yolo-pose",
            "test.onnx",
            "11",
        );

        let sequence = extractor.extract(&frames(10), "sus_1", 15.0);

        assert_eq!(sequence.metadata.total_frames, 10);
        assert_eq!(sequence.sequence.len(), 5);
        assert_eq!(sequence.metadata.event_id, "sus_1");
        assert_eq!(sequence.keypoint_format, "coco17");
    }

    #[test]
    fn empty_slice_yields_empty_sequence() {
        let mut extractor = SkeletonExtractor::new(
            Box::new(Alternating { tick: 0 }),
            "yolo-pose",
            "test.onnx",
            "11",
        );

        let sequence = extractor.extract(&[], "sus_2", 15.0);
        assert_eq!(sequence.metadata.duration_sec, 0.0);
        assert!(sequence.sequence.is_empty());
    }
}
