//! Log de temperatura com retenção limitada, persistido em SQLite.
//!
//! Uma única tabela `temperature(timestamp, temp)`. Cada [`append`] roda em
//! uma transação que insere a leitura e, na mesma unidade atômica, remove as
//! leituras mais antigas que excedem a capacidade configurada.
//!
//! ```text
//! append(r) ─► BEGIN IMMEDIATE
//!              INSERT r
//!              enforce_capacity  (COUNT > cap ⇒ DELETE das COUNT-cap mais antigas)
//!              COMMIT            (qualquer erro ⇒ ROLLBACK)
//! ```
//!
//! Ordenação de retenção: `timestamp DESC, rowid DESC`. Em empate de
//! timestamp, a leitura inserida por último é mantida.
//!
//! [`append`]: BoundedTemperatureLog::append

use crate::types::{Reading, format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, Params, Transaction, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Schema idempotente.
///
/// Versões antigas do schema podavam a tabela com um trigger `rowcount`
/// disparado antes de cada INSERT; ele é removido para que a poda aconteça
/// só dentro de `append`.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS temperature (
        timestamp TEXT NOT NULL,
        temp      REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS temperature_timestamp_idx ON temperature (timestamp);
    DROP TRIGGER IF EXISTS rowcount;
";

/// Espera máxima por um lock de outro processo abrindo o mesmo arquivo.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Erros do log.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// O arquivo (ou seu diretório) não pôde ser criado/aberto. Fatal na partida.
    #[error("Armazenamento indisponível em {}: {source}", .path.display())]
    Unavailable {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Capacidade inválida: {0} (mínimo 1)")]
    InvalidCapacity(u64),

    /// Falha ao gravar. O log permanece no último estado confirmado.
    #[error("Erro de gravação: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("Erro de leitura: {0}")]
    Read(#[source] rusqlite::Error),

    #[error("Linha {row} corrompida: {reason}")]
    Corrupt { row: i64, reason: String },

    #[error("Erro ao fechar o banco: {0}")]
    Close(#[source] rusqlite::Error),
}

/// Estatísticas do log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogStats {
    /// Leituras armazenadas
    pub count: u64,
    /// Capacidade configurada
    pub capacity: u64,
    /// Timestamp mais antigo (se houver leituras)
    pub oldest: Option<DateTime<Utc>>,
    /// Timestamp mais recente (se houver leituras)
    pub newest: Option<DateTime<Utc>>,
}

/// Log de temperatura persistente com capacidade máxima.
///
/// Dono exclusivo da conexão. O `Drop` fecha a conexão em qualquer caminho
/// de saída; [`close`](Self::close) faz o mesmo reportando erros.
pub struct BoundedTemperatureLog {
    conn: Connection,
    capacity: u64,
    path: PathBuf,
}

impl BoundedTemperatureLog {
    /// Abre (ou cria) o log em `path`.
    ///
    /// Pode ser chamado repetidamente sobre o mesmo arquivo: nunca apaga
    /// dados existentes nem duplica objetos do schema.
    pub fn open(path: impl AsRef<Path>, capacity: u64) -> Result<Self, StorageError> {
        let path = path.as_ref();
        check_capacity(capacity)?;

        let unavailable = |source: Box<dyn std::error::Error + Send + Sync>| {
            StorageError::Unavailable {
                path: path.to_path_buf(),
                source,
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.into()))?;
        }

        let conn = Connection::open(path).map_err(|e| unavailable(e.into()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| unavailable(e.into()))?;

        // WAL + synchronous=FULL: todo COMMIT retornado está em disco.
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| unavailable(e.into()))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| unavailable(e.into()))?;
        debug!("journal_mode = {mode}");

        let log = Self::init(conn, capacity, path.to_path_buf())?;
        info!(
            "Log aberto em {} ({} leituras, capacidade {})",
            path.display(),
            log.count()?,
            capacity
        );
        Ok(log)
    }

    /// Abre um log existente só para leitura.
    ///
    /// Não cria arquivo, diretório nem schema, e não altera o `journal_mode`.
    /// `append` falha com [`StorageError::Write`].
    pub fn open_read_only(path: impl AsRef<Path>, capacity: u64) -> Result<Self, StorageError> {
        let path = path.as_ref();
        check_capacity(capacity)?;

        let unavailable = |source: Box<dyn std::error::Error + Send + Sync>| {
            StorageError::Unavailable {
                path: path.to_path_buf(),
                source,
            }
        };

        if !path.is_file() {
            return Err(unavailable(
                std::io::Error::new(std::io::ErrorKind::NotFound, "log inexistente").into(),
            ));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| unavailable(e.into()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| unavailable(e.into()))?;

        debug!("Log aberto só para leitura: {}", path.display());
        Ok(Self {
            conn,
            capacity,
            path: path.to_path_buf(),
        })
    }

    /// Log em memória, com o mesmo schema. Útil para testes e dry-runs.
    pub fn open_in_memory(capacity: u64) -> Result<Self, StorageError> {
        check_capacity(capacity)?;
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Unavailable {
            path: PathBuf::from(":memory:"),
            source: e.into(),
        })?;
        Self::init(conn, capacity, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, capacity: u64, path: PathBuf) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Unavailable {
                path: path.clone(),
                source: e.into(),
            })?;
        Ok(Self {
            conn,
            capacity,
            path,
        })
    }

    /// Insere `reading` como a leitura mais nova e aplica a retenção.
    ///
    /// Tudo-ou-nada: em caso de erro nenhuma linha é inserida nem removida.
    /// Retorna quantas leituras antigas foram descartadas.
    pub fn append(&mut self, reading: &Reading) -> Result<usize, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::Write)?;

        tx.execute(
            "INSERT INTO temperature (timestamp, temp) VALUES (?1, ?2)",
            params![format_timestamp(&reading.timestamp), reading.celsius],
        )
        .map_err(StorageError::Write)?;

        let evicted = enforce_capacity(&tx, self.capacity).map_err(StorageError::Write)?;
        tx.commit().map_err(StorageError::Write)?;
        Ok(evicted)
    }

    /// Número de leituras armazenadas.
    pub fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM temperature", [], |row| row.get(0))
            .map_err(StorageError::Read)?;
        Ok(count.max(0) as u64)
    }

    /// Todas as leituras, da mais antiga para a mais nova.
    pub fn readings(&self) -> Result<Vec<Reading>, StorageError> {
        self.query_readings(
            "SELECT rowid, timestamp, temp FROM temperature
             ORDER BY timestamp ASC, rowid ASC",
            [],
        )
    }

    /// As `n` leituras mais recentes, da mais antiga para a mais nova.
    pub fn latest(&self, n: usize) -> Result<Vec<Reading>, StorageError> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let mut readings = self.query_readings(
            "SELECT rowid, timestamp, temp FROM temperature
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?1",
            params![limit],
        )?;
        readings.reverse();
        Ok(readings)
    }

    /// Contagem e intervalo de tempo coberto.
    ///
    /// Um timestamp ilegível na ponta mais antiga ou mais nova é reportado
    /// como [`StorageError::Corrupt`], igual a [`readings`](Self::readings).
    pub fn stats(&self) -> Result<LogStats, StorageError> {
        let oldest = self
            .query_readings(
                "SELECT rowid, timestamp, temp FROM temperature
                 ORDER BY timestamp ASC, rowid ASC
                 LIMIT 1",
                [],
            )?
            .pop();
        let newest = self.latest(1)?.pop();

        Ok(LogStats {
            count: self.count()?,
            capacity: self.capacity,
            oldest: oldest.map(|r| r.timestamp),
            newest: newest.map(|r| r.timestamp),
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fecha a conexão. Commits anteriores já estão em disco.
    pub fn close(self) -> Result<(), StorageError> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| StorageError::Close(e))?;
        debug!("Log fechado: {}", path.display());
        Ok(())
    }

    fn query_readings<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Reading>, StorageError> {
        let mut stmt = self.conn.prepare(sql).map_err(StorageError::Read)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            })
            .map_err(StorageError::Read)?;

        let mut readings = Vec::new();
        for row in rows {
            let (rowid, text, celsius) = row.map_err(StorageError::Read)?;
            let timestamp = parse_timestamp(&text).ok_or_else(|| StorageError::Corrupt {
                row: rowid,
                reason: format!("timestamp inválido {text:?}"),
            })?;
            readings.push(Reading::new(timestamp, celsius));
        }
        Ok(readings)
    }
}

/// Remove as leituras excedentes dentro de `tx`.
///
/// Mantém as `capacity` leituras mais recentes (`timestamp DESC, rowid DESC`)
/// apagando só as `count - capacity` mais antigas, pela ordem inversa e
/// pelo índice de `timestamp`. Não faz nada se a contagem já cabe na
/// capacidade. Retorna o número de linhas removidas.
pub fn enforce_capacity(tx: &Transaction<'_>, capacity: u64) -> rusqlite::Result<usize> {
    let count: i64 = tx.query_row("SELECT COUNT(*) FROM temperature", [], |row| row.get(0))?;
    let keep = i64::try_from(capacity).unwrap_or(i64::MAX);
    if count <= keep {
        return Ok(0);
    }

    tx.execute(
        "DELETE FROM temperature WHERE rowid IN (
             SELECT rowid FROM temperature
             ORDER BY timestamp ASC, rowid ASC
             LIMIT ?1
         )",
        params![count - keep],
    )
}

fn check_capacity(capacity: u64) -> Result<(), StorageError> {
    if capacity == 0 {
        return Err(StorageError::InvalidCapacity(capacity));
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
