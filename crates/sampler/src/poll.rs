//! Loop de leitura: sensor → log → espera, até o cancelamento.
//!
//! Cada ciclo é estritamente sequencial. O `append` é síncrono e nunca é
//! interrompido no meio; o cancelamento é observado antes de cada ciclo e
//! durante a espera entre ciclos.

use std::time::Duration;
use templog_core::log::BoundedTemperatureLog;
use templog_core::sensor::SensorSource;
use templog_core::types::{MonotonicClock, Reading};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Resultado de um ciclo.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Leitura gravada; `evicted` leituras antigas descartadas
    Appended { reading: Reading, evicted: usize },
    /// Sensor sinalizou "não pronto": ciclo pulado
    NotReady,
    /// Falha de leitura do sensor: ciclo pulado
    SensorFault,
    /// Falha de gravação: log inalterado, tenta de novo no próximo ciclo
    WriteFailed,
}

/// Contadores acumulados do loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub cycles: u64,
    pub appended: u64,
    pub evicted: u64,
    pub not_ready: u64,
    pub sensor_errors: u64,
    pub write_errors: u64,
}

pub struct PollLoop<S> {
    sensor: S,
    log: BoundedTemperatureLog,
    clock: MonotonicClock,
    interval: Duration,
    started: Instant,
    summary: PollSummary,
}

impl<S: SensorSource> PollLoop<S> {
    pub fn new(
        sensor: S,
        log: BoundedTemperatureLog,
        clock: MonotonicClock,
        interval: Duration,
    ) -> Self {
        Self {
            sensor,
            log,
            clock,
            interval,
            started: Instant::now(),
            summary: PollSummary::default(),
        }
    }

    /// Executa um ciclo completo (sem a espera).
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.summary.cycles += 1;

        let celsius = match self.sensor.read_current_value() {
            Ok(celsius) => celsius,
            Err(e) if e.is_not_ready() => {
                debug!("Ciclo {}: {e}", self.summary.cycles);
                self.summary.not_ready += 1;
                return CycleOutcome::NotReady;
            }
            Err(e) => {
                warn!("Falha ao ler sensor: {e}");
                self.summary.sensor_errors += 1;
                return CycleOutcome::SensorFault;
            }
        };

        let reading = self.clock.stamp(celsius);
        match self.log.append(&reading) {
            Ok(evicted) => {
                self.summary.appended += 1;
                self.summary.evicted += evicted as u64;
                CycleOutcome::Appended { reading, evicted }
            }
            Err(e) => {
                error!("Erro ao gravar leitura ({celsius:.3}°C): {e}");
                self.summary.write_errors += 1;
                CycleOutcome::WriteFailed
            }
        }
    }

    /// Roda até `shutdown` ser cancelado.
    ///
    /// O cancelamento encerra o loop normalmente; não é um erro.
    pub async fn run(&mut self, shutdown: CancellationToken) -> PollSummary {
        info!(
            "Loop iniciado: {} a cada {:.2}s",
            self.sensor.describe(),
            self.interval.as_secs_f64()
        );

        while !shutdown.is_cancelled() {
            let cycle_start = Instant::now();
            if let CycleOutcome::Appended { reading, evicted } = self.run_cycle() {
                println!("{}", progress_line(self.started.elapsed(), reading.celsius));
                if evicted > 0 {
                    debug!("Retenção: {evicted} leituras antigas removidas");
                }
            }

            // Dormir pelo tempo restante do intervalo
            let remaining = self.interval.saturating_sub(cycle_start.elapsed());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        info!("Loop encerrado após {} ciclos", self.summary.cycles);
        self.summary
    }

    pub fn log(&self) -> &BoundedTemperatureLog {
        &self.log
    }

    /// Devolve o log para que o chamador possa fechá-lo.
    pub fn into_log(self) -> BoundedTemperatureLog {
        self.log
    }
}

/// `"<segundos desde o início>s, <temperatura>°C"`
pub fn progress_line(elapsed: Duration, celsius: f64) -> String {
    format!("{:.1}s, {:.3}°C", elapsed.as_secs_f64(), celsius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::VecDeque;
    use templog_core::sensor::SensorError;

    /// Sensor roteirizado; cancela o token quando o roteiro acaba.
    struct Scripted {
        script: VecDeque<f64>,
        shutdown: CancellationToken,
    }

    impl Scripted {
        fn new(values: &[f64], shutdown: &CancellationToken) -> Self {
            Self {
                script: values.iter().copied().collect(),
                shutdown: shutdown.clone(),
            }
        }
    }

    impl SensorSource for Scripted {
        fn read_raw(&mut self) -> Result<f64, SensorError> {
            match self.script.pop_front() {
                Some(v) if v.is_nan() => Err(SensorError::NotFound("roteiro".into())),
                Some(v) => {
                    if self.script.is_empty() {
                        self.shutdown.cancel();
                    }
                    Ok(v)
                }
                None => {
                    self.shutdown.cancel();
                    Err(SensorError::NotReady { raw: -1.0 })
                }
            }
        }

        fn describe(&self) -> String {
            "roteiro".into()
        }
    }

    fn counting_clock() -> MonotonicClock {
        let mut secs = 0;
        MonotonicClock::with_source(move || {
            secs += 1;
            DateTime::from_timestamp(secs, 0).unwrap()
        })
    }

    fn new_loop(sensor: Scripted, capacity: u64) -> PollLoop<Scripted> {
        let log = BoundedTemperatureLog::open_in_memory(capacity).unwrap();
        PollLoop::new(sensor, log, counting_clock(), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_cycles_are_skipped() {
        let shutdown = CancellationToken::new();
        let sensor = Scripted::new(&[20.0, -5.0, 21.0, -0.1, 22.0], &shutdown);
        let mut poll = new_loop(sensor, 10);

        let summary = poll.run(shutdown).await;

        assert_eq!(summary.cycles, 5);
        assert_eq!(summary.appended, 3);
        assert_eq!(summary.not_ready, 2);
        let values: Vec<f64> = poll
            .log()
            .readings()
            .unwrap()
            .iter()
            .map(|r| r.celsius)
            .collect();
        assert_eq!(values, vec![20.0, 21.0, 22.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_faults_do_not_stop_the_loop() {
        let shutdown = CancellationToken::new();
        let sensor = Scripted::new(&[f64::NAN, 19.0], &shutdown);
        let mut poll = new_loop(sensor, 10);

        let summary = poll.run(shutdown).await;

        assert_eq!(summary.sensor_errors, 1);
        assert_eq!(summary.appended, 1);
        assert_eq!(poll.into_log().count().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_holds_across_cycles() {
        let shutdown = CancellationToken::new();
        let sensor = Scripted::new(&[20.0, 20.5, 21.0, 21.2], &shutdown);
        let mut poll = new_loop(sensor, 3);

        let summary = poll.run(shutdown).await;

        assert_eq!(summary.evicted, 1);
        let kept: Vec<(i64, f64)> = poll
            .log()
            .readings()
            .unwrap()
            .iter()
            .map(|r| (r.timestamp.timestamp(), r.celsius))
            .collect();
        assert_eq!(kept, vec![(2, 20.5), (3, 21.0), (4, 21.2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_runs_nothing() {
        let shutdown = CancellationToken::new();
        let sensor = Scripted::new(&[20.0], &shutdown);
        shutdown.cancel();
        let mut poll = new_loop(sensor, 3);

        let summary = poll.run(shutdown).await;

        assert_eq!(summary, PollSummary::default());
        assert_eq!(poll.log().count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_sleep_stops_promptly() {
        let shutdown = CancellationToken::new();
        let sensor = Scripted::new(&[20.0; 100], &shutdown);
        let mut poll = new_loop(sensor, 100);

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            canceller.cancel();
        });

        let begin = Instant::now();
        let summary = poll.run(shutdown).await;

        // Ciclos em t=0, 1 e 2; o cancelamento chega em t=2.5 durante a espera.
        assert_eq!(summary.cycles, 3);
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_millis(2_500) && elapsed < Duration::from_secs(3));
        assert_eq!(poll.log().count().unwrap(), 3);
    }

    #[test]
    fn progress_line_format() {
        assert_eq!(
            progress_line(Duration::from_millis(12_340), 21.5),
            "12.3s, 21.500°C"
        );
    }
}
