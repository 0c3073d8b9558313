use std::collections::VecDeque;
use std::sync::Mutex;

use crate::types::Frame;

/// Buffer circular de los últimos `buffer_seconds` segundos de video.
///
/// Un solo productor (el lazo de detección) y varios lectores concurrentes
/// (recolector de esqueletos, grabador de clips). Todo acceso pasa por un
/// único lock; `get_clip` copia los frames hacia afuera para que el lector
/// procese sin retener el lock. La copia es barata: los píxeles van por
/// handle compartido.
pub struct RollingBuffer {
    frames: Mutex<VecDeque<Frame>>,
    max_frames: usize,
}

impl RollingBuffer {
    /// Capacidad en frames: ⌈buffer_seconds · fps⌉
    pub fn new(buffer_seconds: f64, fps: f64) -> Self {
        let max_frames = (buffer_seconds * fps).ceil().max(1.0) as usize;
        Self {
            frames: Mutex::new(VecDeque::with_capacity(max_frames)),
            max_frames,
        }
    }

    /// Añade un frame; si el buffer está lleno descarta el más viejo
    pub fn push(&self, frame: Frame) {
        let mut frames = self.frames.lock().unwrap();
        frames.push_back(frame);
        if frames.len() > self.max_frames {
            frames.pop_front();
        }
    }

    /// Extrae una copia de los frames con timestamp en
    /// [event_time - before_sec, event_time + after_sec], en orden temporal.
    /// El lado posterior es "lo que haya": si el evento es reciente, los
    /// frames futuros todavía no existen.
    pub fn get_clip(&self, event_time: f64, before_sec: f64, after_sec: f64) -> Vec<Frame> {
        let start_time = event_time - before_sec;
        let end_time = event_time + after_sec;

        let frames = self.frames.lock().unwrap();
        frames
            .iter()
            .filter(|f| f.timestamp >= start_time && f.timestamp <= end_time)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.frames.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pixels;

    fn frame_at(timestamp: f64) -> Frame {
        Frame::new(timestamp, Pixels::new(2, 2, vec![0u8; 12]))
    }

    #[test]
    fn capacity_is_ceiling_of_seconds_times_fps() {
        let buffer = RollingBuffer::new(15.0, 15.0);
        assert_eq!(buffer.capacity(), 225);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let buffer = RollingBuffer::new(1.0, 10.0);

        for i in 0..25 {
            buffer.push(frame_at(i as f64 / 10.0));
        }

        assert_eq!(buffer.len(), 10);
        // Quedan los frames 15..24
        let clip = buffer.get_clip(2.0, 10.0, 10.0);
        assert_eq!(clip.first().unwrap().timestamp, 1.5);
        assert_eq!(clip.last().unwrap().timestamp, 2.4);
    }

    #[test]
    fn clip_is_time_bounded_and_ordered() {
        let buffer = RollingBuffer::new(20.0, 15.0);
        for i in 0..150 {
            buffer.push(frame_at(i as f64 / 15.0));
        }

        let clip = buffer.get_clip(5.0, 2.0, 2.0);
        assert!(!clip.is_empty());
        for pair in clip.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        assert!(clip.first().unwrap().timestamp >= 3.0);
        assert!(clip.last().unwrap().timestamp <= 7.0);
    }

    #[test]
    fn forward_side_is_best_effort() {
        let buffer = RollingBuffer::new(20.0, 15.0);
        for i in 0..=75 {
            buffer.push(frame_at(i as f64 / 15.0));
        }

        // Evento en el presente: aún no hay frames futuros
        let clip = buffer.get_clip(5.0, 2.0, 5.0);
        assert!(clip.last().unwrap().timestamp <= 5.0);
        assert!(clip.first().unwrap().timestamp >= 3.0);
    }

    #[test]
    fn pushed_frame_is_retrievable_until_evicted() {
        let buffer = RollingBuffer::new(2.0, 5.0);
        buffer.push(frame_at(1.0));

        let clip = buffer.get_clip(1.0, 0.5, 0.5);
        assert_eq!(clip.len(), 1);
        assert_eq!(clip[0].timestamp, 1.0);

        // Tras llenar el buffer con frames posteriores, el frame se desaloja
        for i in 0..10 {
            buffer.push(frame_at(2.0 + i as f64 / 5.0));
        }
        assert!(buffer.get_clip(1.0, 0.5, 0.5).is_empty());
    }

    #[test]
    fn clear_empties_buffer() {
        let buffer = RollingBuffer::new(5.0, 15.0);
        buffer.push(frame_at(0.0));
        buffer.push(frame_at(0.1));
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn concurrent_readers_see_consistent_snapshots() {
        use std::sync::Arc;
        use std::thread;

        let buffer = Arc::new(RollingBuffer::new(10.0, 15.0));
        let writer = Arc::clone(&buffer);

        let handle = thread::spawn(move || {
            for i in 0..150 {
                writer.push(frame_at(i as f64 / 15.0));
            }
        });

        for _ in 0..50 {
            let clip = buffer.get_clip(5.0, 5.0, 5.0);
            for pair in clip.windows(2) {
                assert!(pair[0].timestamp < pair[1].timestamp);
            }
        }

        handle.join().unwrap();
    }
}
