//! Trade journal use cases over a [`TradeStore`].

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::closer::PositionCloser;
use super::error::TradelogError;
use super::metrics::{PortfolioStats, SymbolStats};
use super::portfolio::{partition_by_status, Portfolio, PortfolioUpdate};
use super::trade::{NewTrade, PortfolioId, TradeId, TradeRecord};
use crate::ports::trade_store::TradeStore;

/// One trade read from an external journal, optionally already exited.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub line: u64,
    pub trade: NewTrade,
    pub exit: Option<(f64, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub opened: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioReport {
    pub portfolio: Portfolio,
    pub open_trades: Vec<TradeRecord>,
    pub stats: PortfolioStats,
    pub by_symbol: Vec<SymbolStats>,
}

pub fn require_portfolio(
    store: &dyn TradeStore,
    portfolio_id: PortfolioId,
) -> Result<Portfolio, TradelogError> {
    store
        .get_portfolio(portfolio_id)?
        .ok_or(TradelogError::NotFound {
            entity: "portfolio",
            id: portfolio_id,
        })
}

pub fn update_portfolio(
    store: &dyn TradeStore,
    portfolio_id: PortfolioId,
    update: &PortfolioUpdate,
) -> Result<Portfolio, TradelogError> {
    if update.is_empty() {
        return Err(TradelogError::validation(
            "portfolio",
            "nothing to update: give a name, description or initial balance",
        ));
    }
    store.update_portfolio(portfolio_id, update)
}

pub fn require_trade(store: &dyn TradeStore, trade_id: TradeId) -> Result<TradeRecord, TradelogError> {
    store.get_trade(trade_id)?.ok_or(TradelogError::NotFound {
        entity: "trade",
        id: trade_id,
    })
}

pub fn open_trade(store: &dyn TradeStore, trade: NewTrade) -> Result<TradeRecord, TradelogError> {
    let trade = store.insert_trade(&trade)?;
    info!(
        trade_id = trade.id(),
        symbol = trade.symbol(),
        direction = %trade.direction(),
        "opened trade"
    );
    Ok(trade)
}

/// Close a stored trade and persist the result.
///
/// The store only accepts the write if the trade is still open, so a close
/// racing with this one makes exactly one of them fail with `InvalidState`.
pub fn close_trade(
    store: &dyn TradeStore,
    closer: &PositionCloser,
    trade_id: TradeId,
    exit_price: f64,
    exit_time: DateTime<Utc>,
) -> Result<TradeRecord, TradelogError> {
    let mut trade = require_trade(store, trade_id)?;
    closer.close(&mut trade, exit_price, exit_time)?;
    store.save_closed(&trade)?;
    Ok(trade)
}

pub fn annotate_trade(
    store: &dyn TradeStore,
    trade_id: TradeId,
    notes: Option<String>,
    tags: Option<String>,
) -> Result<TradeRecord, TradelogError> {
    store.update_annotations(trade_id, notes, tags)
}

pub fn delete_trade(store: &dyn TradeStore, trade_id: TradeId) -> Result<(), TradelogError> {
    if store.delete_trade(trade_id)? {
        Ok(())
    } else {
        Err(TradelogError::NotFound {
            entity: "trade",
            id: trade_id,
        })
    }
}

/// Record imported trades, closing those that carry an exit.
///
/// Every row is opened and closed in memory first, so a bad row is reported
/// with its line number. The checked trades are then written in one batch.
pub fn import_trades(
    store: &dyn TradeStore,
    closer: &PositionCloser,
    portfolio_id: PortfolioId,
    rows: Vec<ImportRow>,
) -> Result<ImportSummary, TradelogError> {
    require_portfolio(store, portfolio_id)?;

    let mut batch = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut checked =
            TradeRecord::open(0, row.trade.clone()).map_err(|e| import_err(row, e))?;
        if let Some((price, time)) = row.exit {
            closer
                .close(&mut checked, price, time)
                .map_err(|e| import_err(row, e))?;
        }
        batch.push((row.trade.clone(), checked.exit().cloned()));
    }

    let trades = store.insert_batch(&batch)?;
    let summary = ImportSummary {
        opened: trades.len(),
        closed: trades.iter().filter(|t| t.is_closed()).count(),
    };

    info!(
        portfolio_id,
        opened = summary.opened,
        closed = summary.closed,
        "imported trades"
    );
    Ok(summary)
}

fn import_err(row: &ImportRow, err: TradelogError) -> TradelogError {
    TradelogError::Import {
        line: row.line,
        reason: err.to_string(),
    }
}

/// Load a portfolio's trades and derive its statistics.
pub fn portfolio_report(
    store: &dyn TradeStore,
    portfolio_id: PortfolioId,
) -> Result<PortfolioReport, TradelogError> {
    let portfolio = require_portfolio(store, portfolio_id)?;
    let trades = store.list_trades(portfolio_id, None)?;
    let (open_trades, closed_trades) = partition_by_status(trades);
    debug!(
        portfolio_id,
        open = open_trades.len(),
        closed = closed_trades.len(),
        "computing portfolio statistics"
    );

    let stats = PortfolioStats::summarize(&closed_trades)?;
    let by_symbol = SymbolStats::by_symbol(&closed_trades)?;

    Ok(PortfolioReport {
        portfolio,
        open_trades,
        stats,
        by_symbol,
    })
}
