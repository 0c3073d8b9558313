use crate::one_euro::{OneEuroFilter, OneEuroParams};
use crate::types::{Skeleton, NUM_KEYPOINTS};

/// Parámetros del suavizador de keypoints
#[derive(Debug, Clone, Copy)]
pub struct SmootherParams {
    pub min_cutoff: f32,
    pub beta: f32,
    pub d_cutoff: f32,
    /// Visibilidad mínima para suavizar; por debajo el filtro se reinicia
    /// y el valor crudo pasa sin tocar.
    pub visibility_threshold: f32,
}

impl Default for SmootherParams {
    fn default() -> Self {
        Self {
            min_cutoff: 1.0,
            beta: 0.007,
            d_cutoff: 1.0,
            visibility_threshold: 0.3,
        }
    }
}

/// Suavizador temporal de los 17 keypoints COCO.
///
/// Mantiene un par de filtros One-Euro (x, y) por keypoint, 34 en total.
/// Cuando la visibilidad de un punto cae bajo el umbral, sus filtros se
/// reinician: si no se hiciera, un punto que reaparece quedaría anclado a
/// la posición donde se vio por última vez.
pub struct KeypointSmoother {
    params: SmootherParams,
    filters_x: Vec<OneEuroFilter>,
    filters_y: Vec<OneEuroFilter>,
    initialized: [bool; NUM_KEYPOINTS],
}

impl KeypointSmoother {
    pub fn new(params: SmootherParams) -> Self {
        let one_euro = OneEuroParams {
            min_cutoff: params.min_cutoff,
            beta: params.beta,
            d_cutoff: params.d_cutoff,
        };
        Self {
            params,
            filters_x: (0..NUM_KEYPOINTS)
                .map(|_| OneEuroFilter::new(one_euro))
                .collect(),
            filters_y: (0..NUM_KEYPOINTS)
                .map(|_| OneEuroFilter::new(one_euro))
                .collect(),
            initialized: [false; NUM_KEYPOINTS],
        }
    }

    /// Devuelve un esqueleto nuevo con las coordenadas suavizadas.
    /// La visibilidad pasa sin modificar.
    pub fn smooth(&mut self, skeleton: &Skeleton, timestamp: f64) -> Skeleton {
        let mut keypoints = skeleton.keypoints;

        for i in 0..NUM_KEYPOINTS {
            let [x, y, visibility] = skeleton.keypoints[i];

            if visibility < self.params.visibility_threshold {
                if self.initialized[i] {
                    self.filters_x[i].reset();
                    self.filters_y[i].reset();
                    self.initialized[i] = false;
                }
                continue;
            }

            let sx = self.filters_x[i].filter(x, timestamp);
            let sy = self.filters_y[i].filter(y, timestamp);
            self.initialized[i] = true;

            keypoints[i] = [sx, sy, visibility];
        }

        Skeleton::new(keypoints)
    }

    /// Reinicia todos los filtros (fin de una sesión de seguimiento)
    pub fn reset(&mut self) {
        for i in 0..NUM_KEYPOINTS {
            self.filters_x[i].reset();
            self.filters_y[i].reset();
        }
        self.initialized = [false; NUM_KEYPOINTS];
    }
}
