// =============================================================================
// Shared types used across the trade review engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a round-trip trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Parse a raw side token case-insensitively. Accepts the aliases that
    /// common backtest exporters emit alongside the canonical names.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" | "b" | "l" => Some(Self::Long),
            "short" | "sell" | "s" => Some(Self::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Rendering hint for an indicator series. Carries no computational meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Line,
    Histogram,
}

impl Default for SeriesKind {
    fn default() -> Self {
        Self::Line
    }
}

/// Non-fatal data-quality diagnostic attached to a trade by the alignment
/// validator. Flags are data, never exceptions: a flagged trade is still
/// served in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticFlag {
    /// The trade timestamp is further from its nearest bar than the skew
    /// tolerance allows.
    TimeSkew,
    /// An execution price falls outside the `[low - ε, high + ε]` band of
    /// the nearest bar.
    PriceOutOfRange,
}

impl std::fmt::Display for DiagnosticFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeSkew => write!(f, "TIME_SKEW"),
            Self::PriceOutOfRange => write!(f, "PRICE_OUT_OF_RANGE"),
        }
    }
}

/// How trade records with more or fewer legs than one entry plus one exit
/// are reduced to a single round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollapseMode {
    /// Collapse multi-leg groups into first entry / last exit; synthesize a
    /// zero-length exit for records that never closed.
    FirstEntryLastExit,
    /// Skip any record or group that does not carry both legs.
    SkipIncomplete,
}

impl Default for CollapseMode {
    fn default() -> Self {
        Self::FirstEntryLastExit
    }
}

impl std::fmt::Display for CollapseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstEntryLastExit => write!(f, "first-entry-last-exit"),
            Self::SkipIncomplete => write!(f, "skip-incomplete"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parsing_accepts_common_aliases() {
        assert_eq!(Side::parse("LONG"), Some(Side::Long));
        assert_eq!(Side::parse(" Buy "), Some(Side::Long));
        assert_eq!(Side::parse("sell"), Some(Side::Short));
        assert_eq!(Side::parse("S"), Some(Side::Short));
        assert_eq!(Side::parse("hedge"), None);
        assert_eq!(Side::parse(""), None);
    }

    #[test]
    fn flag_serialises_screaming_snake() {
        let json = serde_json::to_string(&DiagnosticFlag::PriceOutOfRange).unwrap();
        assert_eq!(json, "\"PRICE_OUT_OF_RANGE\"");
        let json = serde_json::to_string(&DiagnosticFlag::TimeSkew).unwrap();
        assert_eq!(json, "\"TIME_SKEW\"");
    }

    #[test]
    fn collapse_mode_round_trips_kebab_case() {
        let json = serde_json::to_string(&CollapseMode::FirstEntryLastExit).unwrap();
        assert_eq!(json, "\"first-entry-last-exit\"");
        let mode: CollapseMode = serde_json::from_str("\"skip-incomplete\"").unwrap();
        assert_eq!(mode, CollapseMode::SkipIncomplete);
    }
}
