//! Configuration validation.
//!
//! Checks every recognised key before a store is opened, so bad values are
//! reported against the config file rather than as database errors.

use crate::domain::error::TradelogError;
use crate::ports::config_port::{parse_bool, ConfigPort};

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    validate_sqlite_path(config)?;
    validate_pool_size(config)?;
    validate_busy_timeout(config)?;
    validate_journal(config)?;
    Ok(())
}

fn validate_sqlite_path(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    config.require_string("sqlite", "path").map(|_| ())
}

fn validate_pool_size(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    if let Some(raw) = config.get_string("sqlite", "pool_size") {
        match raw.trim().parse::<i64>() {
            Ok(n) if (1..=u32::MAX as i64).contains(&n) => {}
            _ => {
                return Err(TradelogError::ConfigInvalid {
                    section: "sqlite".to_string(),
                    key: "pool_size".to_string(),
                    reason: format!("pool_size must be a positive integer, got '{raw}'"),
                });
            }
        }
    }
    Ok(())
}

fn validate_busy_timeout(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    if let Some(raw) = config.get_string("sqlite", "busy_timeout_ms") {
        match raw.trim().parse::<i64>() {
            Ok(n) if n >= 0 => {}
            _ => {
                return Err(TradelogError::ConfigInvalid {
                    section: "sqlite".to_string(),
                    key: "busy_timeout_ms".to_string(),
                    reason: format!("busy_timeout_ms must be a non-negative integer, got '{raw}'"),
                });
            }
        }
    }
    Ok(())
}

fn validate_journal(config: &dyn ConfigPort) -> Result<(), TradelogError> {
    if let Some(raw) = config.get_string("journal", "require_exit_after_entry") {
        if parse_bool(&raw).is_none() {
            return Err(TradelogError::ConfigInvalid {
                section: "journal".to_string(),
                key: "require_exit_after_entry".to_string(),
                reason: format!("expected a boolean, got '{raw}'"),
            });
        }
    }
    Ok(())
}
