//! Portfolios and status partitioning of their trades.

use serde::Serialize;

use super::error::TradelogError;
use super::trade::{PortfolioId, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub name: String,
    pub description: Option<String>,
    pub initial_balance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPortfolio {
    pub name: String,
    pub description: Option<String>,
    pub initial_balance: f64,
}

impl NewPortfolio {
    pub fn new(name: impl Into<String>) -> Self {
        NewPortfolio {
            name: name.into(),
            description: None,
            initial_balance: 0.0,
        }
    }

    pub fn validate(self) -> Result<NewPortfolio, TradelogError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(TradelogError::validation("name", "must not be empty"));
        }
        if !self.initial_balance.is_finite() || self.initial_balance < 0.0 {
            return Err(TradelogError::validation(
                "initial_balance",
                "must be a finite, non-negative amount",
            ));
        }
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Ok(NewPortfolio {
            name,
            description,
            initial_balance: self.initial_balance,
        })
    }
}

/// Partial edit of a portfolio. `None` leaves a field unchanged; an empty
/// description clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub initial_balance: Option<f64>,
}

impl PortfolioUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.initial_balance.is_none()
    }

    /// Merge onto `current` and validate the result like a new portfolio.
    pub fn apply(&self, current: &Portfolio) -> Result<Portfolio, TradelogError> {
        let merged = NewPortfolio {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            description: match &self.description {
                Some(d) => Some(d.clone()),
                None => current.description.clone(),
            },
            initial_balance: self.initial_balance.unwrap_or(current.initial_balance),
        }
        .validate()?;

        Ok(Portfolio {
            id: current.id,
            name: merged.name,
            description: merged.description,
            initial_balance: merged.initial_balance,
        })
    }
}

/// Split trades into open and closed sets, keeping input order in each.
pub fn partition_by_status(trades: Vec<TradeRecord>) -> (Vec<TradeRecord>, Vec<TradeRecord>) {
    trades.into_iter().partition(TradeRecord::is_open)
}
