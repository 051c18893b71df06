//! Adaptadores de sensor.
//!
//! - `IioRtdSensor` — canal de temperatura IIO exposto pelo driver do
//!   conversor RTD (`/sys/bus/iio/devices/iio:deviceN`)
//! - `HostSensor` — `sysinfo` Components, para placas sem sonda
//! - `SimulatedSensor` — senoide determinística para dry-runs

use std::path::{Path, PathBuf};
use sysinfo::Components;
use templog_core::config::{SensorConfig, SensorKind};
use templog_core::sensor::{SensorError, SensorSource};
use tracing::{debug, info};

/// Acima disso o label do sysinfo é lixo, não temperatura.
const HOST_TEMP_CEILING: f32 = 150.0;

/// Constrói o sensor descrito na configuração.
pub fn build_sensor(config: &SensorConfig) -> Result<Box<dyn SensorSource>, SensorError> {
    let sensor: Box<dyn SensorSource> = match config.kind {
        SensorKind::Iio => Box::new(IioRtdSensor::new(&config.iio_device)?),
        SensorKind::Host => Box::new(HostSensor::new(&config.host_label)),
        SensorKind::Simulated => Box::new(SimulatedSensor::new(
            config.simulated_base,
            config.simulated_amplitude,
        )),
    };
    info!("✓ Sensor: {}", sensor.describe());
    Ok(sensor)
}

// ──────────────────────────────────────────────
// IIO (RTD)
// ──────────────────────────────────────────────

/// Canal `in_temp` de um dispositivo IIO.
///
/// °C = (`in_temp_raw` + `in_temp_offset`) × `in_temp_scale` / 1000.
/// `offset` e `scale` são opcionais (0 e 1).
pub struct IioRtdSensor {
    device: PathBuf,
}

impl IioRtdSensor {
    pub fn new(device: &Path) -> Result<Self, SensorError> {
        if !device.join("in_temp_raw").is_file() {
            return Err(SensorError::NotFound(format!(
                "{} (sem in_temp_raw)",
                device.display()
            )));
        }
        Ok(Self {
            device: device.to_path_buf(),
        })
    }

    fn attribute(&self, name: &str) -> Result<Option<f64>, SensorError> {
        let path = self.device.join(name);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SensorError::Io { path, source }),
        };
        let value = text.trim();
        value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SensorError::Parse {
                path: path.clone(),
                value: value.to_string(),
            })
    }
}

impl SensorSource for IioRtdSensor {
    fn read_raw(&mut self) -> Result<f64, SensorError> {
        let raw = self.attribute("in_temp_raw")?.ok_or_else(|| {
            SensorError::NotFound(format!("{}/in_temp_raw", self.device.display()))
        })?;
        let offset = self.attribute("in_temp_offset")?.unwrap_or(0.0);
        let scale = self.attribute("in_temp_scale")?.unwrap_or(1.0);
        let celsius = (raw + offset) * scale / 1000.0;
        debug!("IIO raw={raw} offset={offset} scale={scale} → {celsius:.3}°C");
        Ok(celsius)
    }

    fn describe(&self) -> String {
        format!("IIO {}", self.device.display())
    }
}

// ──────────────────────────────────────────────
// Host (sysinfo)
// ──────────────────────────────────────────────

/// Maior temperatura entre os componentes cujo label contém `label`.
pub struct HostSensor {
    components: Components,
    label: String,
}

impl HostSensor {
    pub fn new(label: &str) -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
            label: label.to_lowercase(),
        }
    }
}

impl SensorSource for HostSensor {
    fn read_raw(&mut self) -> Result<f64, SensorError> {
        self.components.refresh(true);

        let mut hottest: Option<f32> = None;
        for comp in self.components.iter() {
            if !comp.label().to_lowercase().contains(&self.label) {
                continue;
            }
            if let Some(t) = comp.temperature() {
                if t < HOST_TEMP_CEILING && hottest.is_none_or(|h| t > h) {
                    hottest = Some(t);
                }
            }
        }

        hottest
            .map(f64::from)
            .ok_or_else(|| SensorError::NotFound(format!("componente \"{}\"", self.label)))
    }

    fn describe(&self) -> String {
        format!(
            "host sysinfo \"{}\" ({} componentes)",
            self.label,
            self.components.list().len()
        )
    }
}

// ──────────────────────────────────────────────
// Simulado
// ──────────────────────────────────────────────

/// `base + amplitude·sin(0.1·n)`, n = número da leitura.
pub struct SimulatedSensor {
    base: f64,
    amplitude: f64,
    step: u64,
}

impl SimulatedSensor {
    pub fn new(base: f64, amplitude: f64) -> Self {
        Self {
            base,
            amplitude,
            step: 0,
        }
    }
}

impl SensorSource for SimulatedSensor {
    fn read_raw(&mut self) -> Result<f64, SensorError> {
        let value = self.base + self.amplitude * (self.step as f64 * 0.1).sin();
        self.step += 1;
        Ok(value)
    }

    fn describe(&self) -> String {
        format!("simulado {:.1}±{:.1}°C", self.base, self.amplitude)
    }
}
