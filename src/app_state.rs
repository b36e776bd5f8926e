// =============================================================================
// Central Application State — Trade Review Backend
// =============================================================================
//
// Small by design: the backend is read-only, so shared state is just the
// startup configuration plus the memoized dataset cache. Request handlers
// hold an `Arc<AppState>` and everything they serve is derived on demand
// from immutable, cached datasets.

use std::sync::Arc;

use tracing::info;

use crate::engine::bar_table::BarTable;
use crate::engine::cache::{self, DatasetCache, SharedDataset};
use crate::engine::error::EngineError;
use crate::engine::query::{Dataset, ValidationSettings};
use crate::engine::trade_mapper::{self, MappedTrades};
use crate::runtime_config::RuntimeConfig;
use crate::source::{self, csv_rows, ContractSource};

/// Shared application state for all request handlers.
pub struct AppState {
    pub config: RuntimeConfig,
    datasets: DatasetCache,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            datasets: DatasetCache::new(),
        })
    }

    /// Validation tolerances derived from configuration.
    pub fn validation_settings(&self) -> ValidationSettings {
        ValidationSettings {
            max_skew_secs: self.config.max_skew_secs,
            price_epsilon: self.config.price_epsilon,
        }
    }

    /// Contracts available in the data directory.
    pub fn contracts(&self) -> Vec<String> {
        source::discover(&self.config.data_dir)
    }

    /// The dataset for `contract`, ingesting it on first access and on any
    /// change to its source files. Blocking: call from a blocking context.
    pub fn load_dataset(&self, contract: &str) -> Result<SharedDataset, EngineError> {
        let files = source::locate(&self.config.data_dir, contract)
            .ok_or_else(|| EngineError::UnknownContract(contract.to_string()))?;

        let mut paths = vec![files.bars_path.as_path()];
        if let Some(trades) = &files.trades_path {
            paths.push(trades.as_path());
        }
        let fingerprint = cache::source_fingerprint(&paths)?;

        self.datasets
            .get_or_build(contract, &fingerprint, || self.ingest(&files))
    }

    /// One full ingestion pass over a contract's source files.
    fn ingest(&self, files: &ContractSource) -> Result<SharedDataset, EngineError> {
        let source_tz = self.config.source_tz();

        let rows = csv_rows::read_bar_rows(&files.bars_path, &files.contract)?;
        let table = BarTable::build(&files.contract, rows, source_tz, |id| {
            self.config.indicator_style(id)
        })?;

        let trades = match &files.trades_path {
            Some(path) => {
                let (headers, rows) = csv_rows::read_trade_rows(path)?;
                trade_mapper::map_trades(
                    &headers,
                    &rows,
                    &self.config.trade_columns,
                    self.config.collapse_mode,
                    source_tz,
                )
            }
            None => MappedTrades::default(),
        };

        info!(
            contract = %files.contract,
            bars = table.bars().len(),
            indicators = table.series().len(),
            trades = trades.trades.len(),
            skipped_trades = trades.skipped.len(),
            duplicate_timestamps = table.meta().duplicate_timestamps,
            "dataset ingested"
        );

        Ok(Arc::new(Dataset { table, trades }))
    }
}
