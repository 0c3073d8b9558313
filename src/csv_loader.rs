use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use csv::ReaderBuilder;

/// Una muestra de la señal clasificada: instante y veredicto de la regla
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSample {
    pub timestamp: f64,
    pub fallen: bool,
}

/// Carga una traza de señal desde un CSV en el formato
/// `timestamp,fallen` ordenado por timestamp. `fallen` acepta 0/1 o
/// true/false. Sirve para reproducir sesiones grabadas contra la máquina
/// de estados al calibrar umbrales.
pub fn load_signal_trace(path: impl AsRef<Path>) -> Result<Vec<SignalSample>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {path:?}"))?;

    let mut samples = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {path:?}", row_idx + 1))?;
        if record.len() < 2 {
            bail!("La fila {} no tiene 2 columnas", row_idx + 1);
        }

        let timestamp: f64 = record[0]
            .trim()
            .parse()
            .with_context(|| format!("timestamp inválido en fila {}", row_idx + 1))?;

        let fallen = match record[1].trim() {
            "0" | "false" => false,
            "1" | "true" => true,
            other => bail!("fallen inválido '{}' en fila {}", other, row_idx + 1),
        };

        samples.push(SignalSample { timestamp, fallen });
    }

    if samples.is_empty() {
        return Err(anyhow!("El CSV {path:?} no contiene muestras"));
    }

    for pair in samples.windows(2) {
        ensure!(
            pair[0].timestamp <= pair[1].timestamp,
            "Timestamps fuera de orden: {} después de {}",
            pair[1].timestamp,
            pair[0].timestamp
        );
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn loads_well_formed_trace() {
        let file = write_csv("timestamp,fallen\n0.0,0\n0.5,1\n1.0,true\n");
        let samples = load_signal_trace(file.path()).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(!samples[0].fallen);
        assert!(samples[1].fallen);
        assert!(samples[2].fallen);
    }

    #[test]
    fn rejects_out_of_order_timestamps() {
        let file = write_csv("timestamp,fallen\n1.0,0\n0.5,1\n");
        assert!(load_signal_trace(file.path()).is_err());
    }

    #[test]
    fn rejects_empty_trace() {
        let file = write_csv("timestamp,fallen\n");
        assert!(load_signal_trace(file.path()).is_err());
    }

    #[test]
    fn rejects_bad_flag() {
        let file = write_csv("timestamp,fallen\n0.0,maybe\n");
        assert!(load_signal_trace(file.path()).is_err());
    }
}
