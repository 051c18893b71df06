//! Configuração unificada via TOML.
//!
//! Um único `config.toml` com as seções `[storage]`, `[poll]` e `[sensor]`.
//! Todas as seções usam `#[serde(default)]`, então um arquivo parcial basta.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Limites aceitos para o intervalo entre leituras (segundos).
const MIN_INTERVAL_SECS: f64 = 0.05;
const MAX_INTERVAL_SECS: f64 = 86_400.0;

/// Erros de configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao ler {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao salvar {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuração inválida: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Onde e quanto guardar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Arquivo SQLite do log
    pub path: PathBuf,
    /// Máximo de leituras mantidas
    pub capacity: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("temperature.db"),
            capacity: 1_000_000,
        }
    }
}

/// Cadência do loop de leitura.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Intervalo entre leituras em segundos
    pub interval_secs: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 1.0 }
    }
}

impl PollConfig {
    /// Intervalo como [`Duration`]. Valores fora do domínio caem no padrão.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs).unwrap_or(Duration::from_secs(1))
    }
}

/// Origem das leituras.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Canal de temperatura IIO do kernel (sonda RTD)
    #[default]
    Iio,
    /// Maior temperatura entre os componentes do host (sysinfo)
    Host,
    /// Senoide determinística, para testes sem hardware
    Simulated,
}

/// Configuração do sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub kind: SensorKind,
    /// Diretório do dispositivo IIO (contém `in_temp_raw`)
    pub iio_device: PathBuf,
    /// Substring do label procurada nos componentes do host
    pub host_label: String,
    /// Centro da senoide simulada (°C)
    pub simulated_base: f64,
    /// Amplitude da senoide simulada (°C)
    pub simulated_amplitude: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            kind: SensorKind::Iio,
            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            host_label: "cpu".into(),
            simulated_base: 21.0,
            simulated_amplitude: 0.5,
        }
    }
}

/// Configuração raiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub poll: PollConfig,
    pub sensor: SensorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente ⇒ configuração padrão. Arquivo ilegível ou inválido ⇒
    /// erro (não queremos gravar com capacidade/caminho inesperados).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{} não existe, usando configuração padrão", path.display());
            return Ok(AppConfig::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<AppConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração carregada de {}", path.display());
        Ok(config)
    }

    /// [`load`](Self::load) seguido de [`validate`](Self::validate).
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }
        Ok(config)
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.storage.path.as_os_str().is_empty() {
            errors.push("Caminho do armazenamento não pode ser vazio".into());
        }
        if self.storage.capacity == 0 {
            errors.push("Capacidade do log deve ser ao menos 1".into());
        }
        let interval = self.poll.interval_secs;
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval) {
            errors.push(format!(
                "Intervalo de leitura inválido: {interval} ({MIN_INTERVAL_SECS}–{MAX_INTERVAL_SECS})"
            ));
        }
        if self.sensor.kind == SensorKind::Simulated
            && !(self.sensor.simulated_base.is_finite()
                && self.sensor.simulated_amplitude.is_finite())
        {
            errors.push("Parâmetros do sensor simulado devem ser finitos".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
        assert_eq!(config.poll.interval(), Duration::from_secs(1));
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.storage.capacity, parsed.storage.capacity);
        assert_eq!(config.sensor.kind, parsed.sensor.kind);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[storage]
capacity = 3

[sensor]
kind = "simulated"
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.storage.capacity, 3);
        assert_eq!(config.sensor.kind, SensorKind::Simulated);
        // Outros campos devem ter valor padrão
        assert_eq!(config.storage.path, PathBuf::from("temperature.db"));
        assert_eq!(config.poll.interval_secs, 1.0);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AppConfig::default();
        config.storage.capacity = 0;
        config.poll.interval_secs = 0.0;
        let errors = config.validate();
        assert_eq!(errors.len(), 2, "{errors:?}");

        config.poll.interval_secs = f64::NAN;
        assert_eq!(config.validate().len(), 2);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nao_existe.toml")).unwrap();
        assert_eq!(config.storage.capacity, 1_000_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\ncapacity = ").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn save_then_load_validated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.storage.capacity = 42;
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load_validated(&path).unwrap().storage.capacity, 42);

        config.storage.capacity = 0;
        config.save(&path).unwrap();
        assert!(matches!(
            AppConfig::load_validated(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
