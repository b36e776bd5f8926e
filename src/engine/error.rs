use thiserror::Error;

/// Structural failures of the normalization engine.
///
/// Only conditions that make a result untrustworthy live here: unparseable
/// timestamps, broken OHLCV rows, unknown contracts, malformed requests and
/// unreadable source files. Data-quality conditions (time skew, implausible
/// prices, skipped trade rows, indicator gaps) are never errors; they are
/// carried as flags or omissions inside an otherwise successful result.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A source timestamp could not be interpreted under any supported
    /// encoding (integer seconds, integer milliseconds, calendar text).
    #[error("malformed timestamp '{value}': {reason}")]
    MalformedTimestamp { value: String, reason: String },

    /// An OHLCV field was non-finite or unparseable. The whole table for
    /// that contract is aborted; a broken timeline cannot be partially
    /// trusted.
    #[error("malformed bar in row {row}: {reason}")]
    MalformedBar { row: usize, reason: String },

    /// The requested contract has no dataset in the data directory.
    #[error("unknown contract '{0}'")]
    UnknownContract(String),

    /// A range bound was neither epoch seconds nor a YYYY-MM-DD date.
    #[error("invalid range bound '{0}'; expected epoch seconds or YYYY-MM-DD")]
    InvalidRangeBound(String),

    /// Reading or decoding a source artifact failed.
    #[error("source error for '{path}': {message}")]
    Source { path: String, message: String },
}

impl EngineError {
    /// Shorthand for source-file failures.
    pub fn source(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Source {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
