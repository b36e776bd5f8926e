// =============================================================================
// Trade Mapper — arbitrary trade-record layouts into one canonical shape
// =============================================================================
//
// Exporters disagree about everything: column names, side vocabulary, how
// many rows one round trip occupies. The mapper resolves a declarative
// synonym table against the actual header once, then maps each record
// mechanically. One bad row never invalidates the batch — it is skipped
// with a recorded reason.

use std::collections::HashMap;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::clock::{self, RawTimestamp};
use crate::types::{CollapseMode, DiagnosticFlag, Side};

// ---------------------------------------------------------------------------
// Canonical trade
// ---------------------------------------------------------------------------

/// One round-trip execution normalized from arbitrary source columns.
///
/// `flags` is filled by the alignment validator at query time; the stored
/// dataset keeps it empty so diagnostics can never go stale.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub side: Side,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    pub entry_time: i64,
    pub entry_price: f64,
    pub exit_time: i64,
    pub exit_price: f64,
    /// Passed through from the source when present, never computed here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub flags: Vec<DiagnosticFlag>,
}

/// Why a trade record (or multi-leg group) was skipped during mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    MissingEntryTime,
    MissingEntryPrice,
    MissingSide,
    UnknownSide,
    UnparseableTime,
    UnparseablePrice,
    MissingExitLeg,
    MultiLeg,
    ExitBeforeEntry,
}

/// One skipped record with its position in the source.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedTrade {
    pub row: usize,
    pub reason: SkipReason,
}

/// Mapper output: the canonical trades plus everything that was dropped.
#[derive(Debug, Clone, Default)]
pub struct MappedTrades {
    pub trades: Vec<Trade>,
    pub skipped: Vec<SkippedTrade>,
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Declarative synonym table: for each canonical trade field, the column
/// names different exporters use, in preference order. Matching is
/// case-insensitive and resolved once per ingestion against the actual
/// header, never per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub id: Vec<String>,
    pub side: Vec<String>,
    pub quantity: Vec<String>,
    pub entry_time: Vec<String>,
    pub entry_price: Vec<String>,
    pub exit_time: Vec<String>,
    pub exit_price: Vec<String>,
    pub pnl: Vec<String>,
    pub tags: Vec<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        fn cols(names: &[&str]) -> Vec<String> {
            names.iter().map(|s| s.to_string()).collect()
        }
        Self {
            id: cols(&["id", "trade_id", "tid"]),
            side: cols(&["side", "direction", "type", "position"]),
            quantity: cols(&["quantity", "qty", "size", "contracts", "shares"]),
            entry_time: cols(&["entry_time", "open_time", "t_in", "time_in", "entry"]),
            entry_price: cols(&["entry_price", "open_price", "p_in", "price_in", "entry_px"]),
            exit_time: cols(&["exit_time", "close_time", "t_out", "time_out", "exit"]),
            exit_price: cols(&["exit_price", "close_price", "p_out", "price_out", "exit_px"]),
            pnl: cols(&["pnl", "profit", "net_pnl", "pl"]),
            tags: cols(&["tags", "labels", "notes"]),
        }
    }
}

/// A raw trade record: column name to raw cell text, as read from the
/// source. Blank cells are equivalent to absent columns.
pub type RawTradeRow = HashMap<String, String>;

/// The synonym table resolved against one concrete header. Holds the actual
/// header spelling for each mapped field.
#[derive(Debug, Clone, Default)]
struct ResolvedColumns {
    id: Option<String>,
    side: Option<String>,
    quantity: Option<String>,
    entry_time: Option<String>,
    entry_price: Option<String>,
    exit_time: Option<String>,
    exit_price: Option<String>,
    pnl: Option<String>,
    tags: Option<String>,
}

impl ResolvedColumns {
    fn resolve(map: &ColumnMap, headers: &[String]) -> Self {
        let find = |synonyms: &[String]| -> Option<String> {
            synonyms
                .iter()
                .find_map(|wanted| headers.iter().find(|h| h.eq_ignore_ascii_case(wanted)))
                .cloned()
        };
        Self {
            id: find(&map.id),
            side: find(&map.side),
            quantity: find(&map.quantity),
            entry_time: find(&map.entry_time),
            entry_price: find(&map.entry_price),
            exit_time: find(&map.exit_time),
            exit_price: find(&map.exit_price),
            pnl: find(&map.pnl),
            tags: find(&map.tags),
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// One mapped record before multi-leg collapse.
#[derive(Debug, Clone)]
struct MappedRecord {
    row: usize,
    source_id: Option<String>,
    side: Side,
    quantity: Option<f64>,
    entry_time: i64,
    entry_price: f64,
    exit_time: Option<i64>,
    exit_price: Option<f64>,
    pnl: Option<f64>,
    tags: Vec<String>,
}

/// Map raw trade records to canonical [`Trade`] values.
///
/// Records sharing a source id are collapsed to one round trip per
/// `mode`. Records without an id column stand alone and get a generated
/// one. This function never fails: every malformed record is skipped with
/// a reason instead.
pub fn map_trades(
    headers: &[String],
    rows: &[RawTradeRow],
    map: &ColumnMap,
    mode: CollapseMode,
    source_tz: Tz,
) -> MappedTrades {
    let columns = ResolvedColumns::resolve(map, headers);
    let mut out = MappedTrades::default();

    // Phase 1: per-row mapping with local recovery.
    let mut records: Vec<MappedRecord> = Vec::with_capacity(rows.len());
    for (row_idx, row) in rows.iter().enumerate() {
        match map_record(row_idx, row, &columns, source_tz) {
            Ok(record) => records.push(record),
            Err(reason) => out.skipped.push(SkippedTrade {
                row: row_idx,
                reason,
            }),
        }
    }

    // Phase 2: group legs by source id, preserving first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<MappedRecord>> = HashMap::new();
    for record in records {
        let key = record
            .source_id
            .clone()
            .unwrap_or_else(|| format!("row-{}", record.row));
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(record);
    }

    // Phase 3: collapse each group to one round trip.
    for key in order {
        let group = groups.remove(&key).unwrap_or_default();
        match collapse_group(&key, group, mode) {
            Ok(trade) => out.trades.push(trade),
            Err(skip) => out.skipped.push(skip),
        }
    }

    out.trades.sort_by_key(|t| t.entry_time);
    out
}

/// Map one record, or say why it cannot be mapped.
fn map_record(
    row_idx: usize,
    row: &RawTradeRow,
    columns: &ResolvedColumns,
    source_tz: Tz,
) -> Result<MappedRecord, SkipReason> {
    let cell = |column: &Option<String>| -> Option<&str> {
        column
            .as_deref()
            .and_then(|name| row.get(name))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let entry_time_raw = cell(&columns.entry_time).ok_or(SkipReason::MissingEntryTime)?;
    let entry_price_raw = cell(&columns.entry_price).ok_or(SkipReason::MissingEntryPrice)?;
    let side_raw = cell(&columns.side).ok_or(SkipReason::MissingSide)?;

    let side = Side::parse(side_raw).ok_or(SkipReason::UnknownSide)?;

    let entry_time = clock::canonical_time(&RawTimestamp::from_field(entry_time_raw), source_tz)
        .map_err(|_| SkipReason::UnparseableTime)?;
    let entry_price = parse_finite(entry_price_raw).ok_or(SkipReason::UnparseablePrice)?;

    let exit_time = match cell(&columns.exit_time) {
        Some(raw) => Some(
            clock::canonical_time(&RawTimestamp::from_field(raw), source_tz)
                .map_err(|_| SkipReason::UnparseableTime)?,
        ),
        None => None,
    };
    let exit_price = match cell(&columns.exit_price) {
        Some(raw) => Some(parse_finite(raw).ok_or(SkipReason::UnparseablePrice)?),
        None => None,
    };

    // Optional numeric fields degrade to absent rather than skipping.
    let quantity = cell(&columns.quantity).and_then(parse_finite);
    let pnl = cell(&columns.pnl).and_then(parse_finite);

    let tags = cell(&columns.tags)
        .map(|raw| {
            raw.split([',', ';'])
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(MappedRecord {
        row: row_idx,
        source_id: cell(&columns.id).map(|s| s.to_string()),
        side,
        quantity,
        entry_time,
        entry_price,
        exit_time,
        exit_price,
        pnl,
        tags,
    })
}

/// Collapse the legs of one logical trade into a single round trip.
///
/// The entry comes from the earliest-entry leg, the exit from the latest
/// exit seen across the group. Quantity follows the entry leg; pnl is
/// summed only when every leg carries one; tags are unioned.
fn collapse_group(
    key: &str,
    mut group: Vec<MappedRecord>,
    mode: CollapseMode,
) -> Result<Trade, SkippedTrade> {
    group.sort_by_key(|r| r.entry_time);
    let first_row = group.first().map(|r| r.row).unwrap_or(0);

    if group.len() > 1 && mode == CollapseMode::SkipIncomplete {
        // Under skip-incomplete, a group is only acceptable when it is one
        // complete row; partial fills are dropped whole.
        return Err(SkippedTrade {
            row: first_row,
            reason: SkipReason::MultiLeg,
        });
    }

    let entry = match group.first() {
        Some(entry) => entry.clone(),
        None => {
            return Err(SkippedTrade {
                row: first_row,
                reason: SkipReason::MissingEntryTime,
            })
        }
    };

    let exit = group
        .iter()
        .filter_map(|r| match (r.exit_time, r.exit_price) {
            (Some(t), Some(p)) => Some((t, p)),
            _ => None,
        })
        .max_by_key(|(t, _)| *t);

    let (exit_time, exit_price) = match exit {
        Some(leg) => leg,
        None => match mode {
            // Never closed: synthesize a zero-length round trip at entry.
            CollapseMode::FirstEntryLastExit => (entry.entry_time, entry.entry_price),
            CollapseMode::SkipIncomplete => {
                return Err(SkippedTrade {
                    row: first_row,
                    reason: SkipReason::MissingExitLeg,
                })
            }
        },
    };

    if exit_time < entry.entry_time {
        return Err(SkippedTrade {
            row: first_row,
            reason: SkipReason::ExitBeforeEntry,
        });
    }

    let pnl = if group.iter().all(|r| r.pnl.is_some()) {
        Some(group.iter().filter_map(|r| r.pnl).sum())
    } else {
        None
    };

    let mut tags: Vec<String> = Vec::new();
    for record in &group {
        for tag in &record.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
    }

    let id = if entry.source_id.is_some() {
        key.to_string()
    } else {
        Uuid::new_v4().to_string()
    };

    Ok(Trade {
        id,
        side: entry.side,
        quantity: entry.quantity,
        entry_time: entry.entry_time,
        entry_price: entry.entry_price,
        exit_time,
        exit_price,
        pnl,
        tags,
        flags: Vec::new(),
    })
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> Tz {
        chrono_tz::UTC
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(pairs: &[(&str, &str)]) -> RawTradeRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn map_default(headers_: &[&str], rows: &[RawTradeRow]) -> MappedTrades {
        map_trades(
            &headers(headers_),
            rows,
            &ColumnMap::default(),
            CollapseMode::FirstEntryLastExit,
            utc(),
        )
    }

    #[test]
    fn maps_a_complete_record_under_synonym_headers() {
        let h = ["t_in", "p_in", "Side", "t_out", "p_out", "qty", "pnl"];
        let rows = vec![row(&[
            ("t_in", "1729771800"),
            ("p_in", "71.25"),
            ("Side", "BUY"),
            ("t_out", "1729772400"),
            ("p_out", "71.40"),
            ("qty", "2"),
            ("pnl", "0.30"),
        ])];
        let out = map_default(&h, &rows);
        assert!(out.skipped.is_empty());
        assert_eq!(out.trades.len(), 1);

        let trade = &out.trades[0];
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.entry_time, 1_729_771_800);
        assert_eq!(trade.exit_time, 1_729_772_400);
        assert!((trade.entry_price - 71.25).abs() < f64::EPSILON);
        assert_eq!(trade.quantity, Some(2.0));
        assert_eq!(trade.pnl, Some(0.30));
        assert!(trade.flags.is_empty());
    }

    #[test]
    fn missing_entry_price_skips_with_reason() {
        let h = ["entry_time", "side", "exit_time", "exit_price"];
        let rows = vec![row(&[
            ("entry_time", "1729771800"),
            ("side", "long"),
            ("exit_time", "1729772400"),
            ("exit_price", "71.40"),
        ])];
        let out = map_default(&h, &rows);
        assert!(out.trades.is_empty());
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reason, SkipReason::MissingEntryPrice);
    }

    #[test]
    fn unknown_side_skips_but_later_rows_survive() {
        let h = ["entry_time", "entry_price", "side"];
        let rows = vec![
            row(&[
                ("entry_time", "1729771800"),
                ("entry_price", "71.25"),
                ("side", "straddle"),
            ]),
            row(&[
                ("entry_time", "1729772100"),
                ("entry_price", "71.30"),
                ("side", "short"),
            ]),
        ];
        let out = map_default(&h, &rows);
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].side, Side::Short);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reason, SkipReason::UnknownSide);
    }

    #[test]
    fn missing_exit_synthesizes_round_trip_by_default() {
        let h = ["entry_time", "entry_price", "side"];
        let rows = vec![row(&[
            ("entry_time", "1729771800"),
            ("entry_price", "71.25"),
            ("side", "long"),
        ])];
        let out = map_default(&h, &rows);
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].exit_time, out.trades[0].entry_time);
        assert!((out.trades[0].exit_price - out.trades[0].entry_price).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_exit_is_skipped_under_skip_incomplete() {
        let h = ["entry_time", "entry_price", "side"];
        let rows = vec![row(&[
            ("entry_time", "1729771800"),
            ("entry_price", "71.25"),
            ("side", "long"),
        ])];
        let out = map_trades(
            &headers(&h),
            &rows,
            &ColumnMap::default(),
            CollapseMode::SkipIncomplete,
            utc(),
        );
        assert!(out.trades.is_empty());
        assert_eq!(out.skipped[0].reason, SkipReason::MissingExitLeg);
    }

    #[test]
    fn multi_leg_group_collapses_to_first_entry_last_exit() {
        let h = ["trade_id", "entry_time", "entry_price", "side", "exit_time", "exit_price", "pnl"];
        let rows = vec![
            row(&[
                ("trade_id", "T1"),
                ("entry_time", "100"),
                ("entry_price", "71.00"),
                ("side", "long"),
                ("exit_time", "160"),
                ("exit_price", "71.10"),
                ("pnl", "0.10"),
            ]),
            row(&[
                ("trade_id", "T1"),
                ("entry_time", "130"),
                ("entry_price", "71.05"),
                ("side", "long"),
                ("exit_time", "220"),
                ("exit_price", "71.30"),
                ("pnl", "0.25"),
            ]),
        ];
        let out = map_default(&h, &rows);
        assert_eq!(out.trades.len(), 1);

        let trade = &out.trades[0];
        assert_eq!(trade.id, "T1");
        assert_eq!(trade.entry_time, 100);
        assert!((trade.entry_price - 71.00).abs() < f64::EPSILON);
        assert_eq!(trade.exit_time, 220);
        assert!((trade.exit_price - 71.30).abs() < f64::EPSILON);
        assert!((trade.pnl.unwrap() - 0.35).abs() < 1e-9);
    }

    #[test]
    fn exit_before_entry_is_skipped_not_corrupted() {
        let h = ["entry_time", "entry_price", "side", "exit_time", "exit_price"];
        let rows = vec![row(&[
            ("entry_time", "1729772400"),
            ("entry_price", "71.25"),
            ("side", "long"),
            ("exit_time", "1729771800"),
            ("exit_price", "71.40"),
        ])];
        let out = map_default(&h, &rows);
        assert!(out.trades.is_empty());
        assert_eq!(out.skipped[0].reason, SkipReason::ExitBeforeEntry);
    }

    #[test]
    fn millisecond_trade_times_are_normalized() {
        let h = ["entry_time", "entry_price", "side"];
        let rows = vec![row(&[
            ("entry_time", "1729771800123"),
            ("entry_price", "71.25"),
            ("side", "long"),
        ])];
        let out = map_default(&h, &rows);
        assert_eq!(out.trades[0].entry_time, 1_729_771_800);
    }

    #[test]
    fn tags_split_and_deduplicate() {
        let h = ["entry_time", "entry_price", "side", "tags"];
        let rows = vec![row(&[
            ("entry_time", "100"),
            ("entry_price", "71.0"),
            ("side", "long"),
            ("tags", "breakout, news;breakout"),
        ])];
        let out = map_default(&h, &rows);
        assert_eq!(out.trades[0].tags, vec!["breakout", "news"]);
    }
}
