// =============================================================================
// Bar Table + Indicator Projector — the authoritative timeline per contract
// =============================================================================
//
// Built together in one ingestion pass, because bars and indicator columns
// share the same per-row timestamp normalization. The finished table is
// immutable: sorted ascending by canonical time, unique per timestamp, with
// every indicator column projected into its own gap-tolerant series.
//
// Missing-value policy:
//   * a non-finite indicator value at T is omitted: no point at T, no
//     placeholder, all other timestamps untouched;
//   * a non-finite OHLCV value is a hard `MalformedBar` error and aborts
//     the whole table, since a candle cannot render with a gap inside it.

use std::collections::{BTreeMap, HashMap};

use chrono_tz::Tz;
use serde::Serialize;

use crate::engine::clock::{self, RawTimestamp};
use crate::engine::error::EngineError;
use crate::types::SeriesKind;

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// One OHLCV observation at one canonical timestamp (UTC epoch seconds,
/// bar-open convention).
#[derive(Debug, Clone, Serialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// One point of an indicator series. `value` is always finite.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SeriesPoint {
    pub time: i64,
    pub value: f64,
}

/// One named scalar series logically aligned to the bar timeline. Point
/// times are always a subset of the table's times: gaps are allowed,
/// invented points are not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSeries {
    pub id: String,
    pub display_name: String,
    pub kind: SeriesKind,
    pub pane: String,
    pub points: Vec<SeriesPoint>,
}

/// Presentation hints for one indicator column: how the chart should label
/// and place it. Rendering hints only, no computational meaning.
#[derive(Debug, Clone)]
pub struct IndicatorStyle {
    pub display_name: String,
    pub kind: SeriesKind,
    pub pane: String,
}

/// Overlay-style indicator id prefixes that belong on the price pane.
const OVERLAY_PREFIXES: &[&str] = &[
    "ema", "sma", "wma", "vwap", "bb_", "bollinger", "keltner", "psar", "supertrend",
];

impl IndicatorStyle {
    /// Derive default presentation from the column id alone. Config-level
    /// overrides are applied on top by the caller.
    pub fn infer(id: &str) -> Self {
        let lower = id.to_ascii_lowercase();
        let overlay = OVERLAY_PREFIXES.iter().any(|p| lower.starts_with(p));
        let histogram = lower.contains("hist") || lower.starts_with("vol");
        Self {
            display_name: id.replace('_', " ").to_uppercase(),
            kind: if histogram {
                SeriesKind::Histogram
            } else {
                SeriesKind::Line
            },
            pane: if overlay {
                "price".to_string()
            } else {
                id.to_string()
            },
        }
    }
}

/// Counters describing what ingestion had to resolve or drop. Surfaced in
/// contract metadata, never raised as errors.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestMeta {
    /// Rows whose canonical timestamp collided with an earlier row for the
    /// same contract (last-seen row won).
    pub duplicate_timestamps: usize,
    /// Indicator values omitted because they were non-finite at their
    /// timestamp.
    pub dropped_indicator_points: usize,
}

/// A raw ingestion row as handed over by a row source. Numeric fields are
/// already lexically decoded; this module applies the normalization and
/// missing-value policies.
#[derive(Debug, Clone)]
pub struct RawBarRow {
    pub time: RawTimestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    /// Indicator column values in source column order. Non-finite values
    /// mark gaps.
    pub indicators: Vec<(String, f64)>,
}

// ---------------------------------------------------------------------------
// BarTable
// ---------------------------------------------------------------------------

/// Sorted, time-indexed OHLCV rows for one contract plus the indicator
/// series projected from the same pass. Immutable once built.
#[derive(Debug, Clone)]
pub struct BarTable {
    contract: String,
    bars: Vec<Bar>,
    series: Vec<IndicatorSeries>,
    meta: IngestMeta,
}

impl BarTable {
    /// Build the table and its indicator series from raw rows.
    ///
    /// Rows need not arrive sorted. Duplicate canonical timestamps keep the
    /// last-seen row (bar and indicator values alike) and are counted in
    /// [`IngestMeta`]. `style_for` resolves presentation hints per
    /// indicator column id.
    pub fn build(
        contract: &str,
        rows: impl IntoIterator<Item = RawBarRow>,
        source_tz: Tz,
        style_for: impl Fn(&str) -> IndicatorStyle,
    ) -> Result<Self, EngineError> {
        let mut by_time: BTreeMap<i64, (Bar, HashMap<String, f64>)> = BTreeMap::new();
        let mut column_order: Vec<String> = Vec::new();
        let mut meta = IngestMeta::default();

        for (row_idx, row) in rows.into_iter().enumerate() {
            let time = clock::canonical_time(&row.time, source_tz)?;

            check_finite(row_idx, "open", row.open)?;
            check_finite(row_idx, "high", row.high)?;
            check_finite(row_idx, "low", row.low)?;
            check_finite(row_idx, "close", row.close)?;
            if let Some(v) = row.volume {
                check_finite(row_idx, "volume", v)?;
            }

            let mut indicator_values = HashMap::with_capacity(row.indicators.len());
            for (id, value) in &row.indicators {
                if !column_order.iter().any(|c| c == id) {
                    column_order.push(id.clone());
                }
                indicator_values.insert(id.clone(), *value);
            }

            let bar = Bar {
                time,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            };

            if by_time.insert(time, (bar, indicator_values)).is_some() {
                meta.duplicate_timestamps += 1;
            }
        }

        // Projection over the deduplicated timeline: one series per column,
        // finite points only, in source column order.
        let mut series = Vec::with_capacity(column_order.len());
        for id in &column_order {
            let mut points = Vec::new();
            for (time, (_, values)) in &by_time {
                match values.get(id) {
                    Some(v) if v.is_finite() => points.push(SeriesPoint {
                        time: *time,
                        value: *v,
                    }),
                    Some(_) => meta.dropped_indicator_points += 1,
                    None => {}
                }
            }
            let style = style_for(id);
            series.push(IndicatorSeries {
                id: id.clone(),
                display_name: style.display_name,
                kind: style.kind,
                pane: style.pane,
                points,
            });
        }

        let bars = by_time.into_values().map(|(bar, _)| bar).collect();

        Ok(Self {
            contract: contract.to_string(),
            bars,
            series,
            meta,
        })
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn series(&self) -> &[IndicatorSeries] {
        &self.series
    }

    pub fn meta(&self) -> IngestMeta {
        self.meta
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// First canonical timestamp, if any bars exist.
    pub fn start_time(&self) -> Option<i64> {
        self.bars.first().map(|b| b.time)
    }

    /// Last canonical timestamp, if any bars exist.
    pub fn end_time(&self) -> Option<i64> {
        self.bars.last().map(|b| b.time)
    }

    /// Bars inside `[start, end]` inclusive, as a contiguous slice of the
    /// sorted table.
    pub fn range(&self, start: i64, end: i64) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.time < start);
        let hi = self.bars.partition_point(|b| b.time <= end);
        &self.bars[lo..hi]
    }

    /// The bar whose open time is closest to `t`. Ties prefer the bar at or
    /// before `t` — the bar that was active when the event occurred.
    pub fn nearest_bar(&self, t: i64) -> Option<&Bar> {
        if self.bars.is_empty() {
            return None;
        }
        let after = self.bars.partition_point(|b| b.time <= t);
        if after == 0 {
            return self.bars.first();
        }
        if after == self.bars.len() {
            return self.bars.last();
        }
        let floor = &self.bars[after - 1];
        let ceil = &self.bars[after];
        if (t - floor.time) <= (ceil.time - t) {
            Some(floor)
        } else {
            Some(ceil)
        }
    }

    /// Median delta between consecutive bar times — the inferred bar
    /// interval. `None` for tables with fewer than two bars.
    pub fn median_interval(&self) -> Option<i64> {
        if self.bars.len() < 2 {
            return None;
        }
        let mut deltas: Vec<i64> = self
            .bars
            .windows(2)
            .map(|pair| pair[1].time - pair[0].time)
            .collect();
        deltas.sort_unstable();
        Some(deltas[(deltas.len() - 1) / 2])
    }
}

fn check_finite(row: usize, field: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::MalformedBar {
            row,
            reason: format!("non-finite {field} value"),
        })
    }
}
