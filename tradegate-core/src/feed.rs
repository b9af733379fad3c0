//! Bar feed: CSV loading and ordering checks.
//!
//! Expected columns: `timestamp,open,high,low,close,volume`. Timestamps may
//! be `YYYY-MM-DD HH:MM:SS`, RFC 3339-style `YYYY-MM-DDTHH:MM:SS`, or a bare
//! date (midnight).

use crate::domain::Bar;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("failed to read bars from {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: unparseable timestamp {value:?}")]
    Timestamp { row: usize, value: String },
    #[error("bar {index} at {timestamp} is not after the previous bar at {previous}")]
    OutOfOrder {
        index: usize,
        timestamp: NaiveDateTime,
        previous: NaiveDateTime,
    },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Read bars from any CSV reader; `path` only labels errors.
pub fn read_bars<R: std::io::Read>(reader: R, path: &Path) -> Result<Vec<Bar>, FeedError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (row, record) in rdr.deserialize::<CsvRow>().enumerate() {
        let record = record.map_err(|source| FeedError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| FeedError::Timestamp {
            row: row + 1,
            value: record.timestamp.clone(),
        })?;
        let bar = Bar {
            index: bars.len(),
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        };
        if !bar.is_sane() {
            warn!(row = row + 1, %timestamp, "bar fails OHLC sanity check");
        }
        bars.push(bar);
    }
    check_order(&bars)?;
    Ok(bars)
}

pub fn load_csv(path: &Path) -> Result<Vec<Bar>, FeedError> {
    let file = std::fs::File::open(path).map_err(|e| FeedError::Csv {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    read_bars(file, path)
}

/// Timestamps must strictly increase.
pub fn check_order(bars: &[Bar]) -> Result<(), FeedError> {
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(FeedError::OutOfOrder {
                index: pair[1].index,
                timestamp: pair[1].timestamp,
                previous: pair[0].timestamp,
            });
        }
    }
    Ok(())
}
