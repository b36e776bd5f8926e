// =============================================================================
// Normalization & Alignment Engine
// =============================================================================
//
// Turns heterogeneous backtest artifacts (wide-format bars with precomputed
// indicator columns, and trade-execution records) into canonical,
// time-aligned models for chart rendering. Pure and read-only: source data
// is never mutated, missing values are never invented, and a misaligned
// trade is annotated rather than rejected.
//
// Pipeline: raw rows -> canonical clock -> bar table + indicator projector
// -> trade mapper -> alignment validator -> range query service.

pub mod bar_table;
pub mod cache;
pub mod clock;
pub mod error;
pub mod query;
pub mod trade_mapper;
pub mod validator;
