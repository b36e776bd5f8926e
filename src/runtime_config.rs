// =============================================================================
// Runtime Configuration — engine tolerances and data layout
// =============================================================================
//
// The backend is read-only, so configuration is too: loaded once at
// startup from an optional JSON file, with environment overrides for the
// paths that differ between dev machines. Every field carries a serde
// default so an older or partial config file always loads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::bar_table::IndicatorStyle;
use crate::engine::trade_mapper::ColumnMap;
use crate::types::{CollapseMode, SeriesKind};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_source_timezone() -> String {
    "UTC".to_string()
}

fn default_price_epsilon() -> f64 {
    0.0
}

// =============================================================================
// Indicator style overrides
// =============================================================================

/// Per-column overrides for the inferred indicator presentation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorStyleOverride {
    pub display_name: Option<String>,
    pub kind: Option<SeriesKind>,
    pub pane: Option<String>,
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the trade review backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory holding `<contract>.csv` / `<contract>.trades.csv` files.
    pub data_dir: PathBuf,

    /// Listen address for the HTTP server.
    pub bind: String,

    /// Origin allowed by CORS — the dev frontend.
    pub cors_origin: String,

    /// IANA timezone the source files' naive timestamps are anchored in.
    pub source_timezone: String,

    /// Skew tolerance in seconds for trade alignment. Unset means half the
    /// bar interval inferred from each dataset.
    pub max_skew_secs: Option<i64>,

    /// Slack around `[low, high]` in the price-plausibility check, to
    /// absorb legitimate slippage-adjusted fills.
    pub price_epsilon: f64,

    /// How multi-leg or incomplete trade records are collapsed.
    pub collapse_mode: CollapseMode,

    /// Synonym table for trade-log columns.
    pub trade_columns: ColumnMap,

    /// Presentation overrides keyed by indicator column id.
    pub indicator_styles: HashMap<String, IndicatorStyleOverride>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind: default_bind(),
            cors_origin: default_cors_origin(),
            source_timezone: default_source_timezone(),
            max_skew_secs: None,
            price_epsilon: default_price_epsilon(),
            collapse_mode: CollapseMode::default(),
            trade_columns: ColumnMap::default(),
            indicator_styles: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            data_dir = %config.data_dir.display(),
            source_timezone = %config.source_timezone,
            collapse_mode = %config.collapse_mode,
            "config loaded"
        );

        Ok(config)
    }

    /// The declared source timezone, falling back to UTC when the name is
    /// not a known IANA zone.
    pub fn source_tz(&self) -> Tz {
        match self.source_timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    timezone = %self.source_timezone,
                    "unknown source timezone, falling back to UTC"
                );
                chrono_tz::UTC
            }
        }
    }

    /// Presentation for one indicator column: inferred defaults with any
    /// configured override applied on top.
    pub fn indicator_style(&self, id: &str) -> IndicatorStyle {
        let mut style = IndicatorStyle::infer(id);
        if let Some(over) = self.indicator_styles.get(id) {
            if let Some(name) = &over.display_name {
                style.display_name = name.clone();
            }
            if let Some(kind) = over.kind {
                style.kind = kind;
            }
            if let Some(pane) = &over.pane {
                style.pane = pane.clone();
            }
        }
        style
    }
}
