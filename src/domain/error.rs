//! Domain error types.

use super::trade::TradeId;

/// Top-level error type for tradelog.
#[derive(Debug, thiserror::Error)]
pub enum TradelogError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("trade {trade_id}: {reason}")]
    InvalidState { trade_id: TradeId, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("import error on line {line}: {reason}")]
    Import { line: u64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradelogError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        TradelogError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(trade_id: TradeId, reason: impl Into<String>) -> Self {
        TradelogError::InvalidState {
            trade_id,
            reason: reason.into(),
        }
    }
}

impl From<&TradelogError> for std::process::ExitCode {
    fn from(err: &TradelogError) -> Self {
        let code: u8 = match err {
            TradelogError::Io(_) => 1,
            TradelogError::ConfigParse { .. }
            | TradelogError::ConfigMissing { .. }
            | TradelogError::ConfigInvalid { .. } => 2,
            TradelogError::Database { .. } | TradelogError::DatabaseQuery { .. } => 3,
            TradelogError::Validation { .. } | TradelogError::Import { .. } => 4,
            TradelogError::InvalidState { .. } => 5,
            TradelogError::NotFound { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
