// =============================================================================
// Dataset cache — memoized ingestion keyed by contract + source fingerprint
// =============================================================================
//
// The engine is read-only and stateless across requests; this cache is the
// single shared mutable resource. Each contract maps to one slot holding
// the fingerprint it was built from. Builds are at-most-once per
// fingerprint: concurrent requesters for the same key block on the
// in-flight build instead of duplicating the parse, while different
// contracts build in parallel (per-key cells, no global build lock).
//
// Failed builds are memoized too — a broken file stays broken until it
// changes, and any change to the file alters the fingerprint and triggers
// a fresh ingestion.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::engine::error::EngineError;
use crate::engine::query::Dataset;

pub type SharedDataset = Arc<Dataset>;
type BuildResult = Result<SharedDataset, EngineError>;

struct CacheSlot {
    fingerprint: String,
    cell: Arc<OnceLock<BuildResult>>,
}

/// Keyed dataset cache. Cheap to share behind `Arc`; all methods take
/// `&self`.
#[derive(Default)]
pub struct DatasetCache {
    slots: RwLock<HashMap<String, CacheSlot>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the dataset for `contract`, building it with `build` if the
    /// cache holds nothing for `fingerprint` yet.
    ///
    /// The map lock is only held to locate or replace the slot; the build
    /// itself runs under the slot's own cell so other contracts are never
    /// blocked behind it.
    pub fn get_or_build(
        &self,
        contract: &str,
        fingerprint: &str,
        build: impl FnOnce() -> BuildResult,
    ) -> BuildResult {
        let cell = {
            let slots = self.slots.read();
            match slots.get(contract) {
                Some(slot) if slot.fingerprint == fingerprint => Some(slot.cell.clone()),
                _ => None,
            }
        };

        let cell = match cell {
            Some(cell) => cell,
            None => {
                let mut slots = self.slots.write();
                // Double-check under the write lock: another request may
                // have installed the slot between the two lock scopes.
                match slots.get(contract) {
                    Some(slot) if slot.fingerprint == fingerprint => slot.cell.clone(),
                    _ => {
                        debug!(contract = %contract, fingerprint = %fingerprint, "dataset cache miss");
                        let cell = Arc::new(OnceLock::new());
                        slots.insert(
                            contract.to_string(),
                            CacheSlot {
                                fingerprint: fingerprint.to_string(),
                                cell: cell.clone(),
                            },
                        );
                        cell
                    }
                }
            }
        };

        cell.get_or_init(build).clone()
    }
}

/// Fingerprint a set of source files by path, length and mtime. Any edit,
/// truncation or replacement of a file changes the digest and invalidates
/// the cached dataset built from it.
pub fn source_fingerprint(paths: &[&Path]) -> Result<String, EngineError> {
    let mut hasher = Sha256::new();
    for path in paths {
        let meta = std::fs::metadata(path)
            .map_err(|e| EngineError::source(path.display().to_string(), e))?;
        let mtime = meta
            .modified()
            .map_err(|e| EngineError::source(path.display().to_string(), e))?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        hasher.update(path.display().to_string().as_bytes());
        hasher.update(meta.len().to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bar_table::{BarTable, IndicatorStyle};
    use crate::engine::trade_mapper::MappedTrades;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_dataset() -> SharedDataset {
        let table = BarTable::build(
            "CLZ4_ohlcv1m",
            Vec::new(),
            chrono_tz::UTC,
            IndicatorStyle::infer,
        )
        .unwrap();
        Arc::new(Dataset {
            table,
            trades: MappedTrades::default(),
        })
    }

    #[test]
    fn build_runs_once_per_fingerprint() {
        let cache = DatasetCache::new();
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = cache.get_or_build("CLZ4_ohlcv1m", "fp-1", || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(empty_dataset())
            });
            assert!(result.is_ok());
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn changed_fingerprint_rebuilds() {
        let cache = DatasetCache::new();
        let builds = AtomicUsize::new(0);
        let build = || {
            cache.get_or_build("CLZ4_ohlcv1m", "fp-1", || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(empty_dataset())
            })
        };
        build().unwrap();
        build().unwrap();

        cache
            .get_or_build("CLZ4_ohlcv1m", "fp-2", || {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(empty_dataset())
            })
            .unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_builds_are_memoized_until_the_source_changes() {
        let cache = DatasetCache::new();
        let builds = AtomicUsize::new(0);

        for _ in 0..2 {
            let result = cache.get_or_build("CLZ4_ohlcv1m", "fp-1", || {
                builds.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::MalformedBar {
                    row: 3,
                    reason: "non-finite close value".to_string(),
                })
            });
            assert!(result.is_err());
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // New fingerprint, fresh attempt.
        let result = cache.get_or_build("CLZ4_ohlcv1m", "fp-2", || {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(empty_dataset())
        });
        assert!(result.is_ok());
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn contracts_cache_independently() {
        let cache = DatasetCache::new();
        cache
            .get_or_build("A", "fp-a", || Ok(empty_dataset()))
            .unwrap();
        cache
            .get_or_build("B", "fp-b", || Ok(empty_dataset()))
            .unwrap();

        let slots = cache.slots.read();
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn fingerprint_tracks_file_changes() {
        let dir = std::env::temp_dir().join("trade-review-fingerprint-test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("bars.csv");

        std::fs::write(&file, "time,open,high,low,close\n").unwrap();
        let first = source_fingerprint(&[&file]).unwrap();

        std::fs::write(&file, "time,open,high,low,close\n1,2,3,1,2\n").unwrap();
        let second = source_fingerprint(&[&file]).unwrap();

        assert_ne!(first, second);
        std::fs::remove_dir_all(&dir).ok();
    }
}
