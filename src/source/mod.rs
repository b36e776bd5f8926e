// =============================================================================
// Row sources — where raw rows come from
// =============================================================================
//
// The engine consumes iterables of raw rows; this module supplies them.
// Dataset layout under the data directory:
//
//   <contract>.csv            bars + indicator columns, wide format
//   <contract>.trades.csv     trade-execution records (optional)
//
// Container decoding stays here; normalization policy lives in the engine.

pub mod csv_rows;

use std::path::{Path, PathBuf};

/// Suffix that marks a CSV file as a trade log rather than a bar dataset.
const TRADES_SUFFIX: &str = ".trades.csv";

/// The source files backing one contract.
#[derive(Debug, Clone)]
pub struct ContractSource {
    pub contract: String,
    pub bars_path: PathBuf,
    pub trades_path: Option<PathBuf>,
}

/// Locate the source files for `contract`, if its bar dataset exists.
pub fn locate(data_dir: &Path, contract: &str) -> Option<ContractSource> {
    let bars_path = data_dir.join(format!("{contract}.csv"));
    if !bars_path.is_file() {
        return None;
    }
    let trades_path = Some(data_dir.join(format!("{contract}{TRADES_SUFFIX}")))
        .filter(|p| p.is_file());
    Some(ContractSource {
        contract: contract.to_string(),
        bars_path,
        trades_path,
    })
}

/// Scan the data directory for contracts (every `*.csv` that is not a
/// trade log). Sorted for stable listings; unreadable directories yield an
/// empty list rather than an error, since discovery backs a listing
/// endpoint where absence is representable.
pub fn discover(data_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(data_dir) else {
        return Vec::new();
    };

    let mut contracts: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TRADES_SUFFIX) {
                return None;
            }
            name.strip_suffix(".csv").map(|stem| stem.to_string())
        })
        .collect();
    contracts.sort();
    contracts
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trade-review-source-{name}"));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn discover_lists_bar_datasets_only() {
        let dir = scratch_dir("discover");
        std::fs::write(dir.join("CLZ4_ohlcv1m.csv"), "time\n").unwrap();
        std::fs::write(dir.join("CLZ4_ohlcv1m.trades.csv"), "id\n").unwrap();
        std::fs::write(dir.join("ESH5_ohlcv5m.csv"), "time\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "not a dataset").unwrap();

        assert_eq!(discover(&dir), vec!["CLZ4_ohlcv1m", "ESH5_ohlcv5m"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn discover_handles_missing_directory() {
        let dir = std::env::temp_dir().join("trade-review-source-missing");
        std::fs::remove_dir_all(&dir).ok();
        assert!(discover(&dir).is_empty());
    }

    #[test]
    fn locate_finds_optional_trade_log() {
        let dir = scratch_dir("locate");
        std::fs::write(dir.join("CLZ4_ohlcv1m.csv"), "time\n").unwrap();

        let source = locate(&dir, "CLZ4_ohlcv1m").unwrap();
        assert!(source.trades_path.is_none());

        std::fs::write(dir.join("CLZ4_ohlcv1m.trades.csv"), "id\n").unwrap();
        let source = locate(&dir, "CLZ4_ohlcv1m").unwrap();
        assert!(source.trades_path.is_some());

        assert!(locate(&dir, "UNKNOWN").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
