//! Trade persistence port trait.

use crate::domain::error::TradelogError;
use crate::domain::portfolio::{NewPortfolio, Portfolio, PortfolioUpdate};
use crate::domain::trade::{Exit, NewTrade, PortfolioId, TradeId, TradeRecord, TradeStatus};

pub trait TradeStore {
    fn create_portfolio(&self, portfolio: &NewPortfolio) -> Result<Portfolio, TradelogError>;

    fn get_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, TradelogError>;

    fn list_portfolios(&self) -> Result<Vec<Portfolio>, TradelogError>;

    /// Apply a partial edit, see [`PortfolioUpdate::apply`]. `NotFound` if absent.
    fn update_portfolio(
        &self,
        id: PortfolioId,
        update: &PortfolioUpdate,
    ) -> Result<Portfolio, TradelogError>;

    /// Delete a portfolio together with its trades. Returns `false` if absent.
    fn delete_portfolio(&self, id: PortfolioId) -> Result<bool, TradelogError>;

    /// Validate and persist a new open trade, assigning its id.
    fn insert_trade(&self, trade: &NewTrade) -> Result<TradeRecord, TradelogError>;

    /// Insert several trades, each optionally with a precomputed exit,
    /// atomically: either every trade is written or none is.
    fn insert_batch(
        &self,
        trades: &[(NewTrade, Option<Exit>)],
    ) -> Result<Vec<TradeRecord>, TradelogError>;

    fn get_trade(&self, id: TradeId) -> Result<Option<TradeRecord>, TradelogError>;

    /// Trades of a portfolio in creation order, optionally filtered by status.
    fn list_trades(
        &self,
        portfolio_id: PortfolioId,
        status: Option<TradeStatus>,
    ) -> Result<Vec<TradeRecord>, TradelogError>;

    /// Persist the exit snapshot of a trade closed in memory.
    ///
    /// The stored row must still be open; the check and the write happen
    /// atomically, so of two racing closes exactly one succeeds and the
    /// other gets `InvalidState`.
    fn save_closed(&self, trade: &TradeRecord) -> Result<(), TradelogError>;

    /// Replace notes and/or tags, see [`TradeRecord::annotate`].
    fn update_annotations(
        &self,
        id: TradeId,
        notes: Option<String>,
        tags: Option<String>,
    ) -> Result<TradeRecord, TradelogError>;

    fn delete_trade(&self, id: TradeId) -> Result<bool, TradelogError>;
}
