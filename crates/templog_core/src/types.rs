//! Tipos de domínio: leitura de temperatura e relógio monotônico.
//!
//! Timestamps são sempre UTC. O formato persistido tem largura fixa para
//! que a ordem lexicográfica do SQLite seja igual à ordem cronológica.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Formato de escrita do timestamp (`YYYY-MM-DD HH:MM:SS.ffffff`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Formato de leitura. A fração é opcional: linhas gravadas com
/// granularidade de segundo (`YYYY-MM-DD HH:MM:SS`) também são aceitas.
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ──────────────────────────────────────────────
// Reading
// ──────────────────────────────────────────────

/// Uma amostra de temperatura com carimbo de tempo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Instante da amostra (UTC)
    pub timestamp: DateTime<Utc>,
    /// Temperatura (°C)
    pub celsius: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, celsius: f64) -> Self {
        Self { timestamp, celsius }
    }

    /// Leitura em `secs` segundos após a época Unix.
    pub fn at_secs(secs: i64, celsius: f64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default(), celsius)
    }
}

/// Formata um timestamp no formato persistido.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Interpreta um timestamp persistido. `None` se o texto não for válido.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), PARSE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

// ──────────────────────────────────────────────
// Relógio
// ──────────────────────────────────────────────

type TimeSource = Box<dyn FnMut() -> DateTime<Utc> + Send>;

/// Relógio de parede que nunca volta no tempo.
///
/// Se o relógio do sistema recuar (ajuste de NTP, RTC sem bateria), o último
/// instante emitido é repetido até o relógio alcançá-lo.
pub struct MonotonicClock {
    source: TimeSource,
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    /// Relógio baseado em [`Utc::now`].
    pub fn system() -> Self {
        Self::with_source(Utc::now)
    }

    /// Relógio com fonte de tempo injetada (testes, replays).
    pub fn with_source<F>(source: F) -> Self
    where
        F: FnMut() -> DateTime<Utc> + Send + 'static,
    {
        Self {
            source: Box::new(source),
            last: None,
        }
    }

    /// Garante que nenhum instante anterior a `last` será emitido.
    ///
    /// Usado na partida com o timestamp mais recente já gravado.
    pub fn resume_after(mut self, last: DateTime<Utc>) -> Self {
        self.last = Some(self.last.map_or(last, |prev| prev.max(last)));
        self
    }

    /// Próximo instante, não-decrescente em relação ao anterior.
    pub fn now(&mut self) -> DateTime<Utc> {
        let now = (self.source)();
        let now = match self.last {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last = Some(now);
        now
    }

    /// Carimba um valor com o próximo instante.
    pub fn stamp(&mut self, celsius: f64) -> Reading {
        Reading::new(self.now(), celsius)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn scripted(secs: &[i64]) -> MonotonicClock {
        let mut queue: VecDeque<i64> = secs.iter().copied().collect();
        MonotonicClock::with_source(move || {
            let s = queue.pop_front().unwrap_or(0);
            DateTime::from_timestamp(s, 0).unwrap()
        })
    }

    #[test]
    fn clock_never_steps_back() {
        let mut clock = scripted(&[10, 12, 11, 5, 13]);
        let stamps: Vec<i64> = (0..5).map(|_| clock.now().timestamp()).collect();
        assert_eq!(stamps, vec![10, 12, 12, 12, 13]);
    }

    #[test]
    fn resume_after_holds_back_earlier_wall_clock() {
        let last = DateTime::from_timestamp(100, 0).unwrap();
        let mut clock = scripted(&[50, 150]).resume_after(last);
        assert_eq!(clock.now().timestamp(), 100);
        assert_eq!(clock.now().timestamp(), 150);
    }

    #[test]
    fn stamp_carries_value() {
        let mut clock = scripted(&[42]);
        let r = clock.stamp(21.5);
        assert_eq!(r, Reading::at_secs(42, 21.5));
    }

    #[test]
    fn timestamp_text_sorts_chronologically() {
        let a = DateTime::from_timestamp(1_700_000_000, 5_000).unwrap();
        let b = DateTime::from_timestamp(1_700_000_000, 900_000_000).unwrap();
        let c = DateTime::from_timestamp(1_700_000_001, 0).unwrap();
        let (ta, tb, tc) = (format_timestamp(&a), format_timestamp(&b), format_timestamp(&c));
        assert_eq!(ta.len(), tc.len());
        assert!(ta < tb && tb < tc);
        assert_eq!(parse_timestamp(&tb), Some(b));
    }

    #[test]
    fn parses_second_granularity_rows() {
        let ts = parse_timestamp("2021-03-04 05:06:07").unwrap();
        assert_eq!(format_timestamp(&ts), "2021-03-04 05:06:07.000000");
        assert!(parse_timestamp("ontem").is_none());
    }
}
