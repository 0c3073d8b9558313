use std::sync::Arc;

/// Un punto clave detectado: [x, y, visibilidad]
pub type KeypointData = [f32; 3];

/// Número de keypoints del formato COCO (YOLO pose)
pub const NUM_KEYPOINTS: usize = 17;

/// Nombres canónicos de los 17 keypoints COCO, en orden de índice
pub const COCO17_KEYPOINT_NAMES: [&str; NUM_KEYPOINTS] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Índices COCO-17
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

/// Imagen BGR de 8 bits compartida por referencia.
/// Clonarla solo copia el handle, no los píxeles.
#[derive(Debug, Clone)]
pub struct Pixels {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl Pixels {
    /// Crea una imagen desde un buffer BGR plano (height * width * 3 bytes)
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * 3);
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Frame con marca de tiempo monotónica en segundos
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: f64,
    pub pixels: Pixels,
}

impl Frame {
    pub fn new(timestamp: f64, pixels: Pixels) -> Self {
        Self { timestamp, pixels }
    }
}

/// Caja delimitadora de una persona detectada (píxeles de la imagen fuente)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl BBox {
    /// Relación alto/ancho. Una persona de pie es alta y angosta (ratio > 1),
    /// una persona tendida es baja y ancha (ratio < 1).
    pub fn aspect_ratio(&self) -> f32 {
        if self.width == 0 {
            return 0.0;
        }
        self.height as f32 / self.width as f32
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

/// Esqueleto de 17 keypoints COCO producido por el detector de pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Skeleton {
    pub keypoints: [KeypointData; NUM_KEYPOINTS],
}

impl Skeleton {
    pub fn new(keypoints: [KeypointData; NUM_KEYPOINTS]) -> Self {
        Self { keypoints }
    }

    /// (x, y, visibilidad) de un keypoint específico
    pub fn point(&self, index: KeypointIndex) -> KeypointData {
        self.keypoints[index as usize]
    }

    pub fn left_shoulder(&self) -> KeypointData {
        self.point(KeypointIndex::LeftShoulder)
    }

    pub fn right_shoulder(&self) -> KeypointData {
        self.point(KeypointIndex::RightShoulder)
    }

    pub fn left_hip(&self) -> KeypointData {
        self.point(KeypointIndex::LeftHip)
    }

    pub fn right_hip(&self) -> KeypointData {
        self.point(KeypointIndex::RightHip)
    }

    /// Punto medio entre los hombros
    pub fn shoulder_center(&self) -> (f32, f32) {
        let ls = self.left_shoulder();
        let rs = self.right_shoulder();
        ((ls[0] + rs[0]) / 2.0, (ls[1] + rs[1]) / 2.0)
    }

    /// Punto medio entre las caderas
    pub fn hip_center(&self) -> (f32, f32) {
        let lh = self.left_hip();
        let rh = self.right_hip();
        ((lh[0] + rh[0]) / 2.0, (lh[1] + rh[1]) / 2.0)
    }

    /// Ángulo del torso respecto a la vertical, en grados.
    /// 0° = de pie, 90° = horizontal. En coordenadas de imagen el eje y
    /// apunta hacia abajo, por eso se toman ambas componentes en valor
    /// absoluto: el resultado queda en [0, 90].
    pub fn torso_angle(&self) -> f32 {
        let (sx, sy) = self.shoulder_center();
        let (hx, hy) = self.hip_center();

        let dx = sx - hx;
        let dy = sy - hy;

        dx.abs().atan2(dy.abs()).to_degrees()
    }
}

/// Resultado de una detección sobre un frame: caja o esqueleto
#[derive(Debug, Clone)]
pub enum Subject {
    Bbox(BBox),
    Skeleton(Skeleton),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_standing_vs_fallen() {
        let standing = BBox {
            x: 0,
            y: 0,
            width: 100,
            height: 200,
            confidence: 0.9,
        };
        let fallen = BBox {
            x: 0,
            y: 0,
            width: 200,
            height: 100,
            confidence: 0.9,
        };
        assert!(standing.aspect_ratio() > 1.0);
        assert!(fallen.aspect_ratio() < 1.0);
    }

    #[test]
    fn aspect_ratio_zero_width_is_zero() {
        let degenerate = BBox {
            x: 0,
            y: 0,
            width: 0,
            height: 50,
            confidence: 0.5,
        };
        assert_eq!(degenerate.aspect_ratio(), 0.0);
    }

    #[test]
    fn torso_angle_upright_is_near_zero() {
        // Torso vertical: hombros arriba, caderas abajo
        let mut kps = [[0.0f32; 3]; NUM_KEYPOINTS];
        kps[KeypointIndex::LeftShoulder as usize] = [90.0, 100.0, 0.9];
        kps[KeypointIndex::RightShoulder as usize] = [110.0, 100.0, 0.9];
        kps[KeypointIndex::LeftHip as usize] = [92.0, 200.0, 0.9];
        kps[KeypointIndex::RightHip as usize] = [108.0, 200.0, 0.9];
        let skeleton = Skeleton::new(kps);
        assert!(skeleton.torso_angle() < 15.0);
    }

    #[test]
    fn torso_angle_horizontal_is_near_ninety() {
        // Persona tendida: hombros y caderas a la misma altura
        let mut kps = [[0.0f32; 3]; NUM_KEYPOINTS];
        kps[KeypointIndex::LeftShoulder as usize] = [100.0, 150.0, 0.9];
        kps[KeypointIndex::RightShoulder as usize] = [100.0, 170.0, 0.9];
        kps[KeypointIndex::LeftHip as usize] = [250.0, 152.0, 0.9];
        kps[KeypointIndex::RightHip as usize] = [250.0, 168.0, 0.9];
        let skeleton = Skeleton::new(kps);
        assert!(skeleton.torso_angle() > 75.0);
    }

    #[test]
    fn pixels_clone_shares_payload() {
        let pixels = Pixels::new(2, 2, vec![0u8; 12]);
        let copy = pixels.clone();
        assert_eq!(copy.data().as_ptr(), pixels.data().as_ptr());
    }
}
