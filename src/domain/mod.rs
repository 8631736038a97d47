//! Core domain types and logic.

pub mod closer;
pub mod config_validation;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod portfolio;
pub mod trade;
