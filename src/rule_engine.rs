use crate::keypoint_smoother::{KeypointSmoother, SmootherParams};
use crate::types::{BBox, Skeleton, Subject};

/// Regla geométrica por caja delimitadora: una persona caída produce una
/// caja más ancha que alta.
#[derive(Debug, Clone, Copy)]
pub struct BboxRule {
    /// Umbral de relación alto/ancho; por debajo se considera caída (estricto)
    pub fall_threshold: f32,
}

impl Default for BboxRule {
    fn default() -> Self {
        Self {
            fall_threshold: 1.3,
        }
    }
}

impl BboxRule {
    pub fn new(fall_threshold: f32) -> Self {
        Self { fall_threshold }
    }

    pub fn is_fallen(&self, bbox: Option<&BBox>) -> bool {
        match bbox {
            Some(bbox) => bbox.aspect_ratio() < self.fall_threshold,
            None => false,
        }
    }
}

/// Parámetros de la regla por pose
#[derive(Debug, Clone, Copy)]
pub struct PoseRuleParams {
    /// Ángulo del torso (grados desde la vertical) a partir del cual se
    /// considera caída
    pub torso_angle_threshold: f32,
    /// Visibilidad mínima exigida a hombros y caderas
    pub min_visibility: f32,
}

impl Default for PoseRuleParams {
    fn default() -> Self {
        Self {
            torso_angle_threshold: 60.0,
            min_visibility: 0.3,
        }
    }
}

/// Regla geométrica por esqueleto: evalúa el ángulo del torso.
/// Con suavizado activo, filtra los keypoints antes de medir.
pub struct PoseRule {
    params: PoseRuleParams,
    smoother: Option<KeypointSmoother>,
}

impl PoseRule {
    pub fn new(params: PoseRuleParams, smoothing: Option<SmootherParams>) -> Self {
        Self {
            params,
            smoother: smoothing.map(KeypointSmoother::new),
        }
    }

    /// Los cuatro puntos del torso deben verse; con menos no hay medición
    /// confiable del ángulo.
    fn has_valid_torso(&self, skeleton: &Skeleton) -> bool {
        let required = [
            skeleton.left_shoulder(),
            skeleton.right_shoulder(),
            skeleton.left_hip(),
            skeleton.right_hip(),
        ];
        required.iter().all(|kp| kp[2] >= self.params.min_visibility)
    }

    pub fn is_fallen(&mut self, skeleton: Option<&Skeleton>, timestamp: f64) -> bool {
        let skeleton = match skeleton {
            Some(skeleton) => skeleton,
            None => return false,
        };

        let evaluated = match self.smoother.as_mut() {
            Some(smoother) => smoother.smooth(skeleton, timestamp),
            None => *skeleton,
        };

        if !self.has_valid_torso(&evaluated) {
            return false;
        }

        evaluated.torso_angle() >= self.params.torso_angle_threshold
    }

    /// Confianza de caída en [0, 1] derivada del ángulo del torso:
    /// bajo 30° la persona está de pie, entre 30° y 60° agachada o sentada,
    /// sobre 60° probablemente en el suelo.
    pub fn fall_confidence(&self, skeleton: Option<&Skeleton>) -> f32 {
        let skeleton = match skeleton {
            Some(skeleton) => skeleton,
            None => return 0.0,
        };

        if !self.has_valid_torso(skeleton) {
            return 0.0;
        }

        let angle = skeleton.torso_angle();
        if angle < 30.0 {
            0.0
        } else if angle < 60.0 {
            (angle - 30.0) / 60.0
        } else {
            0.5 + ((angle - 60.0) / 60.0).min(0.5)
        }
    }

    /// Reinicia el suavizador (fin de seguimiento)
    pub fn reset(&mut self) {
        if let Some(smoother) = self.smoother.as_mut() {
            smoother.reset();
        }
    }
}

/// Motor de reglas del sistema: una de las dos variantes geométricas.
/// Sin lógica temporal; el antirrebote vive en la máquina de estados.
pub enum RuleEngine {
    Bbox(BboxRule),
    Pose(PoseRule),
}

impl RuleEngine {
    /// Evalúa la detección del frame actual. Un sujeto del tipo que la
    /// variante no entiende cuenta como ausencia de sujeto.
    pub fn is_fallen(&mut self, subject: Option<&Subject>, timestamp: f64) -> bool {
        match self {
            RuleEngine::Bbox(rule) => {
                let bbox = match subject {
                    Some(Subject::Bbox(bbox)) => Some(bbox),
                    _ => None,
                };
                rule.is_fallen(bbox)
            }
            RuleEngine::Pose(rule) => {
                let skeleton = match subject {
                    Some(Subject::Skeleton(skeleton)) => Some(skeleton),
                    _ => None,
                };
                rule.is_fallen(skeleton, timestamp)
            }
        }
    }
}
