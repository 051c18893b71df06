//! # Templog Core
//!
//! Crate compartilhada com o log de temperatura com retenção limitada
//! (SQLite), o contrato do sensor, os tipos de domínio e a configuração
//! TOML do sistema Templog.
//!
//! ## Módulos
//! - [`types`] – `Reading`, relógio monotônico e formato de timestamp
//! - [`log`] – `BoundedTemperatureLog`: append transacional + retenção
//! - [`sensor`] – Trait `SensorSource` e regra de "não pronto"
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod log;
pub mod sensor;
pub mod config;

// Re-exports convenientes
pub use types::{MonotonicClock, Reading};
pub use log::{BoundedTemperatureLog, LogStats, StorageError};
pub use sensor::{SensorError, SensorSource};
pub use config::{AppConfig, ConfigError, SensorConfig, SensorKind};
