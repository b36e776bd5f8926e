// =============================================================================
// Range Query Service — range-scoped views over one ingested dataset
// =============================================================================
//
// Every accessor slices the sorted, immutable dataset by binary search; a
// one-day query over a multi-year table touches only the rows it returns.
// Empty ranges yield empty collections; absence of data is representable
// and is not an error.

use serde::Serialize;

use crate::engine::bar_table::{Bar, BarTable, IndicatorSeries};
use crate::engine::trade_mapper::{MappedTrades, SkipReason, Trade};
use crate::engine::validator;

/// Everything ingested for one contract: the bar timeline, its projected
/// indicator series and the mapped (still unflagged) trades. Immutable
/// after ingestion; shared across requests behind `Arc`.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub table: BarTable,
    pub trades: MappedTrades,
}

/// Validation tolerances applied when serving trades.
#[derive(Debug, Clone, Copy)]
pub struct ValidationSettings {
    /// Override for the skew tolerance; `None` infers half the median bar
    /// interval from the table itself.
    pub max_skew_secs: Option<i64>,
    /// Slack added around `[low, high]` in the price-plausibility check.
    pub price_epsilon: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_skew_secs: None,
            price_epsilon: 0.0,
        }
    }
}

/// Per-reason count of skipped trade records, for contract metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SkipCount {
    pub reason: SkipReason,
    pub count: usize,
}

/// Summary of one contract's dataset, served before any range query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractMeta {
    pub contract: String,
    pub bar_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    pub available_indicator_ids: Vec<String>,
    pub trade_count: usize,
    pub duplicate_timestamps: usize,
    pub dropped_indicator_points: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_trades: Vec<SkipCount>,
}

impl Dataset {
    /// Dataset summary: counts, time bounds, indicator ids and what
    /// ingestion dropped.
    pub fn meta(&self) -> ContractMeta {
        let mut skipped: Vec<SkipCount> = Vec::new();
        for entry in &self.trades.skipped {
            match skipped.iter_mut().find(|s| s.reason == entry.reason) {
                Some(existing) => existing.count += 1,
                None => skipped.push(SkipCount {
                    reason: entry.reason,
                    count: 1,
                }),
            }
        }
        skipped.sort_by_key(|s| s.reason);

        ContractMeta {
            contract: self.table.contract().to_string(),
            bar_count: self.table.bars().len(),
            start_time: self.table.start_time(),
            end_time: self.table.end_time(),
            available_indicator_ids: self
                .table
                .series()
                .iter()
                .map(|s| s.id.clone())
                .collect(),
            trade_count: self.trades.trades.len(),
            duplicate_timestamps: self.table.meta().duplicate_timestamps,
            dropped_indicator_points: self.table.meta().dropped_indicator_points,
            skipped_trades: skipped,
        }
    }

    /// Bars inside `[start, end]` inclusive.
    pub fn bars_in(&self, start: i64, end: i64) -> Vec<Bar> {
        self.table.range(start, end).to_vec()
    }

    /// Every indicator series restricted to `[start, end]` inclusive.
    /// Series that have no points in the range are still listed (empty),
    /// so the consumer can keep pane layout stable across panning.
    pub fn series_in(&self, start: i64, end: i64) -> Vec<IndicatorSeries> {
        self.table
            .series()
            .iter()
            .map(|series| {
                let lo = series.points.partition_point(|p| p.time < start);
                let hi = series.points.partition_point(|p| p.time <= end);
                IndicatorSeries {
                    id: series.id.clone(),
                    display_name: series.display_name.clone(),
                    kind: series.kind,
                    pane: series.pane.clone(),
                    points: series.points[lo..hi].to_vec(),
                }
            })
            .collect()
    }

    /// Trades with either leg inside `[start, end]` inclusive, each carrying
    /// freshly computed diagnostic flags. Flags are recomputed on every
    /// query from the immutable table, so they can never go stale.
    pub fn trades_in(&self, start: i64, end: i64, settings: ValidationSettings) -> Vec<Trade> {
        let max_skew = settings
            .max_skew_secs
            .unwrap_or_else(|| validator::default_max_skew(&self.table));

        self.trades
            .trades
            .iter()
            .filter(|t| {
                let entry_in = t.entry_time >= start && t.entry_time <= end;
                let exit_in = t.exit_time >= start && t.exit_time <= end;
                entry_in || exit_in
            })
            .map(|t| {
                let mut trade = t.clone();
                trade.flags = validator::validate(t, &self.table, max_skew, settings.price_epsilon);
                trade
            })
            .collect()
    }
}
