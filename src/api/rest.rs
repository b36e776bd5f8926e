// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Thin transport over the query engine. Every endpoint is GET and
// read-only; there is deliberately no authentication. Range parameters
// accept either UTC epoch seconds or YYYY-MM-DD dates (a date maps to the
// first or last second of that day depending on which bound it is).
//
// Structural problems become HTTP errors; data-quality findings never do —
// they ride inside successful payloads as flags, gaps and skip counts.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app_state::AppState;
use crate::engine::bar_table::{Bar, IndicatorSeries};
use crate::engine::cache::SharedDataset;
use crate::engine::clock::{self, RawTimestamp};
use crate::engine::error::EngineError;
use crate::engine::query::ContractMeta;
use crate::engine::trade_mapper::Trade;

// =============================================================================
// Router construction
// =============================================================================

/// Build the HTTP router and wire all endpoint handlers.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/contracts", get(contracts))
        .route("/meta", get(meta))
        .route("/bars", get(bars))
        .route("/series", get(series))
        .route("/trades", get(trades))
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

/// JSON error body shared by all failing endpoints.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub message: String,
}

/// Transport-level error: an engine failure mapped onto an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unprocessable(String),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::UnknownContract(_) => Self::NotFound(err.to_string()),
            EngineError::InvalidRangeBound(_) => Self::BadRequest(err.to_string()),
            // The request was fine; the artifact on disk is not.
            EngineError::MalformedTimestamp { .. } | EngineError::MalformedBar { .. } => {
                Self::Unprocessable(err.to_string())
            }
            EngineError::Source { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Internal(msg) => {
                // Log the detail, keep the response generic.
                error!(message = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ApiErrorResponse { message })).into_response()
    }
}

// =============================================================================
// Query parameters
// =============================================================================

/// Common query parameters for the data endpoints.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub contract: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl RangeQuery {
    fn contract(&self) -> Result<&str, ApiError> {
        self.contract
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing 'contract' parameter".to_string()))
    }

    /// Inclusive range, defaulting to everything when a bound is absent.
    fn bounds(&self) -> Result<(i64, i64), ApiError> {
        let start = parse_bound(self.start.as_deref(), false)?.unwrap_or(i64::MIN);
        let end = parse_bound(self.end.as_deref(), true)?.unwrap_or(i64::MAX);
        Ok((start, end))
    }
}

/// Parse one range bound: epoch seconds (or milliseconds, normalized like
/// every other timestamp) or a YYYY-MM-DD date. Dates cover whole days, so
/// the end bound maps to 23:59:59.
fn parse_bound(value: Option<&str>, end_of_day: bool) -> Result<Option<i64>, EngineError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let RawTimestamp::Numeric(v) = RawTimestamp::from_field(trimmed) {
        let seconds = clock::canonical_time(&RawTimestamp::Numeric(v), chrono_tz::UTC)
            .map_err(|_| EngineError::InvalidRangeBound(trimmed.to_string()))?;
        return Ok(Some(seconds));
    }

    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidRangeBound(trimmed.to_string()))?;
    let (h, m, s) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
    let naive = date
        .and_hms_opt(h, m, s)
        .ok_or_else(|| EngineError::InvalidRangeBound(trimmed.to_string()))?;
    Ok(Some(naive.and_utc().timestamp()))
}

/// Resolve the dataset off the async runtime; ingestion reads files.
async fn dataset_for(state: &Arc<AppState>, contract: &str) -> Result<SharedDataset, ApiError> {
    let state = state.clone();
    let contract = contract.to_string();
    tokio::task::spawn_blocking(move || state.load_dataset(&contract))
        .await
        .map_err(|e| ApiError::Internal(format!("ingestion task failed: {e}")))?
        .map_err(ApiError::from)
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Liveness probe used by frontend boot-time checks.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
struct ContractsResponse {
    contracts: Vec<String>,
}

/// Contracts discovered in the data directory.
async fn contracts(State(state): State<Arc<AppState>>) -> Json<ContractsResponse> {
    Json(ContractsResponse {
        contracts: state.contracts(),
    })
}

/// Dataset summary for one contract.
async fn meta(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<ContractMeta>, ApiError> {
    let dataset = dataset_for(&state, query.contract()?).await?;
    Ok(Json(dataset.meta()))
}

#[derive(Debug, Serialize)]
struct BarsResponse {
    candles: Vec<Bar>,
}

/// Candlestick bars filtered by contract and range.
async fn bars(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<BarsResponse>, ApiError> {
    let contract = query.contract()?;
    let (start, end) = query.bounds()?;
    let dataset = dataset_for(&state, contract).await?;
    Ok(Json(BarsResponse {
        candles: dataset.bars_in(start, end),
    }))
}

#[derive(Debug, Serialize)]
struct SeriesResponse {
    series: Vec<IndicatorSeries>,
}

/// Indicator series filtered by contract and range.
async fn series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let contract = query.contract()?;
    let (start, end) = query.bounds()?;
    let dataset = dataset_for(&state, contract).await?;
    Ok(Json(SeriesResponse {
        series: dataset.series_in(start, end),
    }))
}

#[derive(Debug, Serialize)]
struct TradesResponse {
    trades: Vec<Trade>,
}

/// Trades filtered by contract and range, each carrying fresh diagnostic
/// flags.
async fn trades(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<TradesResponse>, ApiError> {
    let contract = query.contract()?;
    let (start, end) = query.bounds()?;
    let dataset = dataset_for(&state, contract).await?;
    Ok(Json(TradesResponse {
        trades: dataset.trades_in(start, end, state.validation_settings()),
    }))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_second_bounds_pass_through() {
        assert_eq!(
            parse_bound(Some("1729771800"), false).unwrap(),
            Some(1_729_771_800)
        );
    }

    #[test]
    fn millisecond_bounds_normalize() {
        assert_eq!(
            parse_bound(Some("1729771800123"), true).unwrap(),
            Some(1_729_771_800)
        );
    }

    #[test]
    fn date_bounds_cover_the_whole_day() {
        let start = parse_bound(Some("2024-10-24"), false).unwrap().unwrap();
        let end = parse_bound(Some("2024-10-24"), true).unwrap().unwrap();
        assert_eq!(start, 1_729_728_000);
        assert_eq!(end, start + 86_399);
    }

    #[test]
    fn absent_or_blank_bounds_are_open() {
        assert_eq!(parse_bound(None, false).unwrap(), None);
        assert_eq!(parse_bound(Some("  "), false).unwrap(), None);
    }

    #[test]
    fn malformed_bounds_are_rejected() {
        let err = parse_bound(Some("10/24/2024"), false).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRangeBound(_)));
    }

    #[test]
    fn engine_errors_map_to_expected_statuses() {
        let not_found: ApiError = EngineError::UnknownContract("X".into()).into();
        assert!(matches!(not_found, ApiError::NotFound(_)));

        let bad_request: ApiError = EngineError::InvalidRangeBound("x".into()).into();
        assert!(matches!(bad_request, ApiError::BadRequest(_)));

        let unprocessable: ApiError = EngineError::MalformedBar {
            row: 1,
            reason: "non-finite open value".into(),
        }
        .into();
        assert!(matches!(unprocessable, ApiError::Unprocessable(_)));

        let internal: ApiError = EngineError::source("bars.csv", "permission denied").into();
        assert!(matches!(internal, ApiError::Internal(_)));
    }
}
