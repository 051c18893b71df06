//! # Templog Sampler
//!
//! Lê a sonda RTD em intervalo fixo e grava cada leitura no log SQLite com
//! retenção limitada, até receber Ctrl+C / SIGTERM.
//!
//! ## Uso
//! ```bash
//! templog                           # run com ./config.toml ao lado do binário
//! templog --config /etc/templog.toml run
//! templog tail -n 20                # últimas 20 leituras
//! templog init-config               # grava o config padrão
//! ```

mod poll;
mod sources;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use poll::PollLoop;
use std::path::{Path, PathBuf};
use templog_core::config::AppConfig;
use templog_core::log::BoundedTemperatureLog;
use templog_core::types::{MonotonicClock, TIMESTAMP_FORMAT};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "templog",
    version,
    about = "Registra temperaturas de uma sonda RTD em um log SQLite limitado"
)]
struct Cli {
    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logs em nível debug (RUST_LOG tem precedência)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lê o sensor e grava até ser interrompido (padrão)
    Run,
    /// Mostra as leituras mais recentes
    Tail {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Grava o config padrão
    InitConfig {
        /// Sobrescreve um arquivo existente
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Logging ──
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config_path).await,
        Command::Tail { count } => tail(&config_path, count),
        Command::InitConfig { force } => init_config(&config_path, force),
    }
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    // ── Carregar config ──
    let config = AppConfig::load_validated(config_path)?;

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    // ── Log ──
    let log = BoundedTemperatureLog::open(&config.storage.path, config.storage.capacity)
        .context("Falha ao abrir o log de temperatura")?;
    let stats = log.stats()?;

    let mut clock = MonotonicClock::system();
    if let Some(newest) = stats.newest {
        clock = clock.resume_after(newest);
    }

    // ── Sensor ──
    let sensor = sources::build_sensor(&config.sensor).context("Falha ao inicializar o sensor")?;

    // ── Sinais ──
    let shutdown = CancellationToken::new();
    install_shutdown_handler(shutdown.clone())?;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🌡  TEMPLOG – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Sensor:     {}", sensor.describe());
    println!("  Log:        {}", config.storage.path.display());
    println!("  Capacidade: {} ({} gravadas)", stats.capacity, stats.count);
    println!("  Intervalo:  {:.1}s", config.poll.interval_secs);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut poll = PollLoop::new(sensor, log, clock, config.poll.interval());
    let summary = poll.run(shutdown).await;

    info!(
        "Resumo: {} ciclos, {} gravadas, {} descartadas, {} não prontas, {} falhas de sensor, {} falhas de gravação",
        summary.cycles,
        summary.appended,
        summary.evicted,
        summary.not_ready,
        summary.sensor_errors,
        summary.write_errors
    );
    info!("Log com {} leituras", poll.log().count()?);

    poll.into_log().close()?;
    info!("Encerrado.");
    Ok(())
}

fn tail(config_path: &Path, count: usize) -> anyhow::Result<()> {
    let config = AppConfig::load_validated(config_path)?;
    let log =
        BoundedTemperatureLog::open_read_only(&config.storage.path, config.storage.capacity)
            .context("Log de temperatura não encontrado (rode `templog run` antes)")?;

    for reading in log.latest(count)? {
        println!(
            "{}, {:.3}",
            reading.timestamp.format(TIMESTAMP_FORMAT),
            reading.celsius
        );
    }

    let stats = log.stats()?;
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!(
            "── {}/{} leituras de {} a {}",
            stats.count,
            stats.capacity,
            oldest.format(TIMESTAMP_FORMAT),
            newest.format(TIMESTAMP_FORMAT)
        );
    } else {
        println!("── log vazio");
    }

    log.close()?;
    Ok(())
}

fn init_config(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!("{} já existe (use --force para sobrescrever)", config_path.display());
    }
    AppConfig::default().save(config_path)?;
    println!("Config padrão gravado em {}", config_path.display());
    Ok(())
}

/// O que fazer ao receber um sinal de término.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalAction {
    /// Primeiro sinal: encerra o loop normalmente
    Shutdown,
    /// Sinal repetido com o encerramento já pedido: sai na hora
    ForceExit,
}

fn on_signal(name: &str, shutdown: &CancellationToken) -> SignalAction {
    if shutdown.is_cancelled() {
        warn!("{name} recebido de novo, saindo sem fechar o log");
        return SignalAction::ForceExit;
    }
    info!("{name} recebido, encerrando... (repita para forçar)");
    shutdown.cancel();
    SignalAction::Shutdown
}

/// Cancela `shutdown` no primeiro Ctrl+C ou SIGTERM; o segundo sinal encerra
/// o processo imediatamente.
///
/// Os handlers são registrados aqui, antes do loop, para que o sinal nunca
/// caia na ação padrão (matar o processo) durante um `append`. A tarefa roda
/// num worker do runtime, então continua atendendo sinais mesmo com o loop
/// preso numa leitura de sensor.
fn install_shutdown_handler(shutdown: CancellationToken) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt =
            signal(SignalKind::interrupt()).context("Falha ao instalar handler de SIGINT")?;
        let mut terminate =
            signal(SignalKind::terminate()).context("Falha ao instalar handler de SIGTERM")?;

        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    Some(()) = interrupt.recv() => "SIGINT",
                    Some(()) = terminate.recv() => "SIGTERM",
                    else => break,
                };
                if on_signal(name, &shutdown) == SignalAction::ForceExit {
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Falha ao escutar Ctrl+C: {e}");
                    shutdown.cancel();
                    break;
                }
                if on_signal("Ctrl+C", &shutdown) == SignalAction::ForceExit {
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        });
    }

    Ok(())
}

/// 128 + SIGINT
const FORCED_EXIT_CODE: i32 = 130;
