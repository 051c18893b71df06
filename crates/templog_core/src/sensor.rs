//! Contrato do sensor consumido pelo loop de leitura.
//!
//! O hardware fica atrás de [`SensorSource`]; adaptadores concretos (IIO,
//! componentes do host, simulado) vivem no binário.

use std::path::PathBuf;

/// Erros de leitura do sensor. Nenhum deles é fatal para o loop.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// Valor abaixo de zero: o sensor sinaliza que não há amostra válida.
    #[error("Sensor não pronto (valor bruto {raw})")]
    NotReady { raw: f64 },

    #[error("Valor não finito do sensor: {0}")]
    InvalidData(f64),

    #[error("Erro de I/O em {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Valor ilegível em {}: {value:?}", .path.display())]
    Parse { path: PathBuf, value: String },

    #[error("Sensor não encontrado: {0}")]
    NotFound(String),
}

impl SensorError {
    /// `true` quando o ciclo deve ser pulado sem alarde.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, SensorError::NotReady { .. })
    }
}

/// Fonte de temperatura.
///
/// Implementações fornecem apenas [`read_raw`](SensorSource::read_raw); a
/// regra de prontidão fica no método provido
/// [`read_current_value`](SensorSource::read_current_value).
pub trait SensorSource {
    /// Valor atual em °C, antes da regra de prontidão.
    fn read_raw(&mut self) -> Result<f64, SensorError>;

    /// Valor atual em °C, ou [`SensorError::NotReady`] se o valor bruto for
    /// negativo.
    fn read_current_value(&mut self) -> Result<f64, SensorError> {
        classify_raw(self.read_raw()?)
    }

    /// Descrição curta para logs e banner.
    fn describe(&self) -> String;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read_raw(&mut self) -> Result<f64, SensorError> {
        (**self).read_raw()
    }

    fn read_current_value(&mut self) -> Result<f64, SensorError> {
        (**self).read_current_value()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Aplica a regra de prontidão a um valor bruto.
///
/// Qualquer valor abaixo de zero é tratado como "não pronto", mesmo que
/// pudesse ser uma temperatura legítima abaixo de 0 °C.
pub fn classify_raw(raw: f64) -> Result<f64, SensorError> {
    if !raw.is_finite() {
        return Err(SensorError::InvalidData(raw));
    }
    if raw < 0.0 {
        return Err(SensorError::NotReady { raw });
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    impl SensorSource for Fixed {
        fn read_raw(&mut self) -> Result<f64, SensorError> {
            Ok(self.0)
        }

        fn describe(&self) -> String {
            "fixo".into()
        }
    }

    #[test]
    fn negative_raw_is_not_ready() {
        let err = Fixed(-5.0).read_current_value().unwrap_err();
        assert!(err.is_not_ready());
        assert!(matches!(err, SensorError::NotReady { raw } if raw == -5.0));
    }

    #[test]
    fn zero_and_positive_pass_through() {
        assert_eq!(Fixed(0.0).read_current_value().unwrap(), 0.0);
        assert_eq!(Fixed(21.25).read_current_value().unwrap(), 21.25);
    }

    #[test]
    fn non_finite_is_invalid() {
        assert!(matches!(
            classify_raw(f64::NAN),
            Err(SensorError::InvalidData(_))
        ));
        let err = classify_raw(f64::INFINITY).unwrap_err();
        assert!(!err.is_not_ready());
    }

    #[test]
    fn boxed_source_keeps_rule() {
        let mut boxed: Box<dyn SensorSource> = Box::new(Fixed(-0.5));
        assert!(boxed.read_current_value().unwrap_err().is_not_ready());
        assert_eq!(boxed.describe(), "fixo");
    }
}
