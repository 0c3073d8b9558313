use std::f64::consts::PI;

/// Filtro pasa-bajas de suavizado exponencial simple
#[derive(Debug, Clone, Default)]
pub struct LowPassFilter {
    initialized: bool,
    raw_value: f32,
    stored_value: f32,
}

impl LowPassFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Último valor crudo recibido (sin filtrar)
    pub fn last_raw_value(&self) -> f32 {
        self.raw_value
    }

    /// Aplica el filtro con el alpha dado (0 = máximo suavizado, 1 = sin suavizar)
    pub fn filter(&mut self, value: f32, alpha: f32) -> f32 {
        self.raw_value = value;
        if self.initialized {
            self.stored_value = alpha * value + (1.0 - alpha) * self.stored_value;
        } else {
            self.stored_value = value;
            self.initialized = true;
        }
        self.stored_value
    }

    pub fn reset(&mut self) {
        self.initialized = false;
        self.raw_value = 0.0;
        self.stored_value = 0.0;
    }
}

/// Parámetros del filtro One-Euro
#[derive(Debug, Clone, Copy)]
pub struct OneEuroParams {
    /// Frecuencia de corte mínima en Hz. Más baja = más suavizado.
    pub min_cutoff: f32,
    /// Coeficiente de velocidad. Más alto = menos suavizado en movimiento rápido.
    pub beta: f32,
    /// Frecuencia de corte del derivador en Hz.
    pub d_cutoff: f32,
}

impl Default for OneEuroParams {
    fn default() -> Self {
        Self {
            min_cutoff: 1.0,
            beta: 0.007,
            d_cutoff: 1.0,
        }
    }
}

/// Filtro One-Euro: pasa-bajas adaptativo cuya frecuencia de corte crece con
/// la velocidad observada de la señal. Señal lenta → suavizado fuerte; señal
/// rápida → corte alto y por tanto poca latencia.
///
/// Casiez, Roussel y Vogel, "1€ Filter" (CHI 2012).
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    params: OneEuroParams,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    last_timestamp: Option<f64>,
}

// dt no positivo (timestamps repetidos o fuera de orden) se fuerza a este
// mínimo en lugar de dividir por cero.
const MIN_DT: f64 = 1e-6;

impl OneEuroFilter {
    pub fn new(params: OneEuroParams) -> Self {
        // Cortes no positivos degenerarían tau; se fuerzan a un mínimo
        let params = OneEuroParams {
            min_cutoff: params.min_cutoff.max(f32::EPSILON),
            beta: params.beta,
            d_cutoff: params.d_cutoff.max(f32::EPSILON),
        };
        Self {
            params,
            x_filter: LowPassFilter::new(),
            dx_filter: LowPassFilter::new(),
            last_timestamp: None,
        }
    }

    fn smoothing_factor(dt: f64, cutoff: f32) -> f32 {
        let tau = 1.0 / (2.0 * PI * cutoff as f64);
        (1.0 / (1.0 + tau / dt)) as f32
    }

    /// Filtra una muestra tomada en el instante `timestamp` (segundos).
    /// La primera muestra inicializa el estado y se devuelve sin cambios.
    pub fn filter(&mut self, value: f32, timestamp: f64) -> f32 {
        let last = match self.last_timestamp {
            Some(last) => last,
            None => {
                self.last_timestamp = Some(timestamp);
                self.dx_filter.filter(0.0, 1.0);
                return self.x_filter.filter(value, 1.0);
            }
        };

        let dt = (timestamp - last).max(MIN_DT);
        self.last_timestamp = Some(timestamp);

        // Derivada numérica respecto al último valor crudo
        let dx = ((value - self.x_filter.last_raw_value()) as f64 / dt) as f32;
        let alpha_d = Self::smoothing_factor(dt, self.params.d_cutoff);
        let dx_hat = self.dx_filter.filter(dx, alpha_d);

        // Corte adaptativo: a más velocidad, menos suavizado
        let cutoff = self.params.min_cutoff + self.params.beta * dx_hat.abs();
        let alpha = Self::smoothing_factor(dt, cutoff);
        self.x_filter.filter(value, alpha)
    }

    /// Olvida todo el estado; la próxima muestra será tratada como la primera
    pub fn reset(&mut self) {
        self.x_filter.reset();
        self.dx_filter.reset();
        self.last_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variance(values: &[f32]) -> f32 {
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32
    }

    #[test]
    fn first_sample_passes_through() {
        let mut filter = OneEuroFilter::new(OneEuroParams::default());
        assert_eq!(filter.filter(100.0, 0.0), 100.0);
    }

    #[test]
    fn smooths_noisy_stationary_signal() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(42);
        let mut filter = OneEuroFilter::new(OneEuroParams {
            beta: 0.0,
            ..OneEuroParams::default()
        });

        let noisy: Vec<f32> = (0..60)
            .map(|_| 100.0 + rng.gen_range(-5.0..5.0))
            .collect();
        let filtered: Vec<f32> = noisy
            .iter()
            .enumerate()
            .map(|(i, &v)| filter.filter(v, i as f64 * 0.033))
            .collect();

        assert!(variance(&filtered[1..]) < variance(&noisy[1..]));
    }

    #[test]
    fn beta_reduces_lag_on_fast_motion() {
        let mut with_beta = OneEuroFilter::new(OneEuroParams {
            beta: 0.5,
            ..OneEuroParams::default()
        });
        let mut without_beta = OneEuroFilter::new(OneEuroParams {
            beta: 0.0,
            ..OneEuroParams::default()
        });

        // Escalón de 100 → 200
        let mut last_with = 0.0;
        let mut last_without = 0.0;
        for i in 0..20 {
            let value = if i < 10 { 100.0 } else { 200.0 };
            let t = i as f64 * 0.033;
            last_with = with_beta.filter(value, t);
            last_without = without_beta.filter(value, t);
        }

        assert!(last_with > last_without);
    }

    #[test]
    fn converges_to_constant_without_overshoot() {
        let mut filter = OneEuroFilter::new(OneEuroParams::default());
        filter.filter(0.0, 0.0);

        let mut out = 0.0;
        for i in 1..300 {
            out = filter.filter(50.0, i as f64 * 0.033);
            // Se acerca desde abajo, nunca sobrepasa la constante
            assert!(out <= 50.0 + 1e-4);
        }
        assert!((out - 50.0).abs() < 1e-3);
    }

    #[test]
    fn output_stays_within_input_bounds() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut filter = OneEuroFilter::new(OneEuroParams::default());

        for i in 0..200 {
            let value = rng.gen_range(-30.0..30.0f32);
            let out = filter.filter(value, i as f64 / 15.0);
            assert!((-30.0..=30.0).contains(&out));
        }
    }

    #[test]
    fn reset_forgets_history() {
        let mut filter = OneEuroFilter::new(OneEuroParams::default());
        filter.filter(100.0, 0.0);
        filter.filter(101.0, 0.033);

        filter.reset();
        assert_eq!(filter.filter(50.0, 1.0), 50.0);
    }

    #[test]
    fn non_increasing_timestamp_does_not_panic() {
        let mut filter = OneEuroFilter::new(OneEuroParams::default());
        filter.filter(100.0, 1.0);
        let out = filter.filter(105.0, 1.0);
        assert!(out.is_finite());
        let out = filter.filter(105.0, 0.5);
        assert!(out.is_finite());
    }
}
