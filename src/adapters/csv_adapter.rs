//! CSV price bar adapter.
//!
//! Files are named `<symbol>_<timeframe>.csv` under a base directory and carry
//! a header row `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339
//! or `YYYY-MM-DD HH:MM:SS` in UTC.

use crate::domain::error::TacalcError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::bar_port::PriceBarPort;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

fn bad_row(line: u64, reason: impl std::fmt::Display) -> TacalcError {
    TacalcError::InvalidBar {
        reason: format!("CSV line {}: {}", line, reason),
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn number(record: &csv::StringRecord, idx: usize, name: &str, line: u64) -> Result<f64, TacalcError> {
    let raw = record
        .get(idx)
        .ok_or_else(|| bad_row(line, format!("missing {} column", name)))?;
    raw.trim()
        .parse()
        .map_err(|e| bad_row(line, format!("invalid {} value '{}': {}", name, raw, e)))
}

/// Read and validate every bar in `path`, sorted by timestamp.
pub fn read_bars(path: &Path, symbol: &str, timeframe: &str) -> Result<Vec<PriceBar>, TacalcError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| TacalcError::InvalidBar {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut bars = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| TacalcError::InvalidBar {
            reason: format!("CSV parse error in {}: {}", path.display(), e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let ts_str = record
            .get(0)
            .ok_or_else(|| bad_row(line, "missing timestamp column"))?;
        let timestamp = parse_timestamp(ts_str.trim())
            .ok_or_else(|| bad_row(line, format!("invalid timestamp '{}'", ts_str)))?;

        let bar = PriceBar {
            symbol: symbol.to_string(),
            timestamp,
            timeframe: timeframe.to_string(),
            open: number(&record, 1, "open", line)?,
            high: number(&record, 2, "high", line)?,
            low: number(&record, 3, "low", line)?,
            close: number(&record, 4, "close", line)?,
            volume: number(&record, 5, "volume", line)?,
        };
        bar.validate()?;
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    tracing::debug!(path = %path.display(), count = bars.len(), "bars read from CSV");
    Ok(bars)
}

impl PriceBarPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<PriceBar>, TacalcError> {
        let path = self.csv_path(symbol, timeframe);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut bars = read_bars(&path, symbol, timeframe)?;
        let skip = bars.len().saturating_sub(limit);
        Ok(bars.split_off(skip))
    }
}
