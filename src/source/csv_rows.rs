// =============================================================================
// CSV row source
// =============================================================================
//
// Mechanical decoding only: headers are matched case-insensitively against
// the known OHLCV/time/symbol synonyms, every other column rides along as
// an indicator column. Cells decode to numbers where they can; what a
// non-finite or absent value *means* is the engine's call, not ours.

use std::path::Path;

use tracing::debug;

use crate::engine::bar_table::RawBarRow;
use crate::engine::clock::RawTimestamp;
use crate::engine::error::EngineError;
use crate::engine::trade_mapper::RawTradeRow;

const TIME_COLUMNS: &[&str] = &["time", "timestamp", "date", "datetime", "t"];
const OPEN_COLUMNS: &[&str] = &["open", "o"];
const HIGH_COLUMNS: &[&str] = &["high", "h"];
const LOW_COLUMNS: &[&str] = &["low", "l"];
const CLOSE_COLUMNS: &[&str] = &["close", "c", "last"];
const VOLUME_COLUMNS: &[&str] = &["volume", "vol", "v"];
const SYMBOL_COLUMNS: &[&str] = &["symbol", "instrument", "contract", "ticker"];

/// Where each role lives in the header, resolved once per file.
struct ColumnRoles {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
    symbol: Option<usize>,
    /// `(index, original column name)` for every indicator column.
    indicators: Vec<(usize, String)>,
}

impl ColumnRoles {
    fn resolve(path: &Path, headers: &[String]) -> Result<Self, EngineError> {
        let find = |synonyms: &[&str]| -> Option<usize> {
            headers
                .iter()
                .position(|h| synonyms.iter().any(|s| h.eq_ignore_ascii_case(s)))
        };

        let required = |synonyms: &[&str], role: &str| -> Result<usize, EngineError> {
            find(synonyms).ok_or_else(|| {
                EngineError::source(
                    path.display().to_string(),
                    format!("no {role} column among headers {headers:?}"),
                )
            })
        };

        let time = required(TIME_COLUMNS, "time")?;
        let open = required(OPEN_COLUMNS, "open")?;
        let high = required(HIGH_COLUMNS, "high")?;
        let low = required(LOW_COLUMNS, "low")?;
        let close = required(CLOSE_COLUMNS, "close")?;
        let volume = find(VOLUME_COLUMNS);
        let symbol = find(SYMBOL_COLUMNS);

        let mut claimed = vec![time, open, high, low, close];
        claimed.extend(volume);
        claimed.extend(symbol);

        let indicators = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| !claimed.contains(idx))
            .map(|(idx, name)| (idx, name.clone()))
            .collect();

        Ok(Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            symbol,
            indicators,
        })
    }
}

/// Read the wide-format bar file for `contract`.
///
/// Rows carrying a symbol column that names a different instrument are
/// filtered out; files without a symbol column belong entirely to the
/// contract they are named after.
pub fn read_bar_rows(path: &Path, contract: &str) -> Result<Vec<RawBarRow>, EngineError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| EngineError::source(path.display().to_string(), e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EngineError::source(path.display().to_string(), e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let roles = ColumnRoles::resolve(path, &headers)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| EngineError::source(path.display().to_string(), e))?;
        let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

        if let Some(symbol_idx) = roles.symbol {
            let symbol = cell(symbol_idx);
            if !symbol.is_empty() && !symbol.eq_ignore_ascii_case(contract) {
                continue;
            }
        }

        let indicators = roles
            .indicators
            .iter()
            .map(|(idx, name)| (name.clone(), numeric_cell(cell(*idx)).unwrap_or(f64::NAN)))
            .collect();

        rows.push(RawBarRow {
            time: RawTimestamp::from_field(cell(roles.time)),
            open: numeric_cell(cell(roles.open)).unwrap_or(f64::NAN),
            high: numeric_cell(cell(roles.high)).unwrap_or(f64::NAN),
            low: numeric_cell(cell(roles.low)).unwrap_or(f64::NAN),
            close: numeric_cell(cell(roles.close)).unwrap_or(f64::NAN),
            volume: roles.volume.and_then(|idx| numeric_cell(cell(idx))),
            indicators,
        });
    }

    debug!(path = %path.display(), rows = rows.len(), "bar rows read");
    Ok(rows)
}

/// Read a trade log as `(headers, records)`. Column meaning is resolved
/// later by the trade mapper's synonym table.
pub fn read_trade_rows(path: &Path) -> Result<(Vec<String>, Vec<RawTradeRow>), EngineError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| EngineError::source(path.display().to_string(), e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EngineError::source(path.display().to_string(), e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| EngineError::source(path.display().to_string(), e))?;
        let row: RawTradeRow = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.trim().to_string()))
            .collect();
        rows.push(row);
    }

    debug!(path = %path.display(), rows = rows.len(), "trade rows read");
    Ok((headers, rows))
}

/// Decode one numeric cell. Empty cells are absent; anything unparseable
/// decodes as NaN so the engine's missing-value policy decides its fate.
fn numeric_cell(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.parse::<f64>().unwrap_or(f64::NAN))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_fixture(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("trade-review-csv-tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_bars_with_indicator_columns() {
        let path = write_fixture(
            "bars_basic.csv",
            "time,open,high,low,close,volume,ema_9,rsi_14\n\
             1729771800,71.22,71.32,71.21,71.25,120,71.20,55.1\n\
             1729772100,71.25,71.28,71.12,71.22,98,,48.7\n",
        );
        let rows = read_bar_rows(&path, "CLZ4_ohlcv1m").unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].time, RawTimestamp::Numeric(1_729_771_800));
        assert!((rows[0].open - 71.22).abs() < f64::EPSILON);
        assert_eq!(rows[0].volume, Some(120.0));
        assert_eq!(rows[0].indicators.len(), 2);
        assert_eq!(rows[0].indicators[0].0, "ema_9");

        // The blank ema_9 cell arrives as NaN for the engine to drop.
        assert!(rows[1].indicators[0].1.is_nan());
        assert!((rows[1].indicators[1].1 - 48.7).abs() < f64::EPSILON);
    }

    #[test]
    fn header_synonyms_resolve_case_insensitively() {
        let path = write_fixture(
            "bars_synonyms.csv",
            "Timestamp,O,H,L,C,Vol\n2024-10-24 12:10:00,71.22,71.32,71.21,71.25,120\n",
        );
        let rows = read_bar_rows(&path, "CLZ4_ohlcv1m").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].time,
            RawTimestamp::Text("2024-10-24 12:10:00".to_string())
        );
        assert_eq!(rows[0].volume, Some(120.0));
        assert!(rows[0].indicators.is_empty());
    }

    #[test]
    fn symbol_column_filters_foreign_rows() {
        let path = write_fixture(
            "bars_symbol.csv",
            "symbol,time,open,high,low,close\n\
             CLZ4_ohlcv1m,0,1,2,0.5,1.5\n\
             ESH5_ohlcv5m,60,10,20,5,15\n\
             clz4_OHLCV1M,60,1,2,0.5,1.5\n",
        );
        let rows = read_bar_rows(&path, "CLZ4_ohlcv1m").unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn missing_required_column_is_a_source_error() {
        let path = write_fixture("bars_noclose.csv", "time,open,high,low\n0,1,2,0.5\n");
        let err = read_bar_rows(&path, "CLZ4_ohlcv1m").unwrap_err();
        assert!(matches!(err, EngineError::Source { .. }));
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn unparseable_ohlc_cell_arrives_as_nan() {
        let path = write_fixture(
            "bars_garbage.csv",
            "time,open,high,low,close\n0,1.0,oops,0.5,1.5\n",
        );
        let rows = read_bar_rows(&path, "CLZ4_ohlcv1m").unwrap();
        assert!(rows[0].high.is_nan());
    }

    #[test]
    fn reads_trade_rows_with_headers() {
        let path = write_fixture(
            "trades_basic.csv",
            "trade_id,side,entry_time,entry_price,exit_time,exit_price\n\
             T1,long,1729771800,71.25,1729772400,71.40\n",
        );
        let (headers, rows) = read_trade_rows(&path).unwrap();
        assert_eq!(headers.len(), 6);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("trade_id").map(String::as_str), Some("T1"));
        assert_eq!(rows[0].get("side").map(String::as_str), Some("long"));
    }
}
