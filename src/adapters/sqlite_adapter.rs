//! SQLite trade store.

use crate::domain::error::TradelogError;
use crate::domain::portfolio::{NewPortfolio, Portfolio, PortfolioUpdate};
use crate::domain::trade::{
    Direction, Exit, NewTrade, PortfolioId, TradeId, TradeRecord, TradeState, TradeStatus,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::trade_store::TradeStore;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_POOL_SIZE: i64 = 4;
pub const DEFAULT_BUSY_TIMEOUT_MS: i64 = 5_000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS portfolios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    initial_balance REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    portfolio_id INTEGER NOT NULL REFERENCES portfolios(id) ON DELETE CASCADE,
    symbol TEXT NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('long', 'short')),
    status TEXT NOT NULL CHECK (status IN ('open', 'closed')),
    quantity REAL NOT NULL CHECK (quantity > 0),
    entry_price REAL NOT NULL CHECK (entry_price > 0),
    entry_time TEXT NOT NULL,
    exit_price REAL,
    exit_time TEXT,
    profit_loss REAL,
    profit_loss_percent REAL,
    notes TEXT,
    tags TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    CHECK (
        (status = 'open' AND exit_price IS NULL AND exit_time IS NULL
            AND profit_loss IS NULL AND profit_loss_percent IS NULL)
        OR
        (status = 'closed' AND exit_price IS NOT NULL AND exit_time IS NOT NULL
            AND profit_loss IS NOT NULL AND profit_loss_percent IS NOT NULL)
    )
);
CREATE INDEX IF NOT EXISTS idx_trades_portfolio ON trades(portfolio_id);
CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol);";

const TRADE_COLUMNS: &str = "id, portfolio_id, symbol, direction, status, quantity, entry_price, \
     entry_time, exit_price, exit_time, profit_loss, profit_loss_percent, notes, tags";

pub struct SqliteTradeStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteTradeStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradelogError> {
        let db_path = config.require_string("sqlite", "path")?;

        let pool_size = config.get_int("sqlite", "pool_size", DEFAULT_POOL_SIZE);
        let pool_size = u32::try_from(pool_size)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| TradelogError::ConfigInvalid {
                section: "sqlite".into(),
                key: "pool_size".into(),
                reason: "pool_size must be a positive integer".into(),
            })?;

        let busy_timeout = config.get_int("sqlite", "busy_timeout_ms", DEFAULT_BUSY_TIMEOUT_MS);
        let busy_timeout = u64::try_from(busy_timeout).map_err(|_| TradelogError::ConfigInvalid {
            section: "sqlite".into(),
            key: "busy_timeout_ms".into(),
            reason: "busy_timeout_ms must be non-negative".into(),
        })?;

        debug!(path = %db_path, pool_size, busy_timeout, "opening sqlite store");
        let manager = with_connection_setup(SqliteConnectionManager::file(&db_path), busy_timeout);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TradelogError> {
        let manager = with_connection_setup(
            SqliteConnectionManager::memory(),
            DEFAULT_BUSY_TIMEOUT_MS as u64,
        );
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), TradelogError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).map_err(query_err)?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TradelogError> {
        self.pool.get().map_err(pool_err)
    }
}

fn with_connection_setup(
    manager: SqliteConnectionManager,
    busy_timeout_ms: u64,
) -> SqliteConnectionManager {
    manager.with_init(move |conn| {
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    })
}

fn pool_err(e: r2d2::Error) -> TradelogError {
    TradelogError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> TradelogError {
    TradelogError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn parse_time(id: TradeId, column: &str, value: &str) -> Result<DateTime<Utc>, TradelogError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TradelogError::DatabaseQuery {
            reason: format!("trade {id}: bad {column} '{value}': {e}"),
        })
}

fn portfolio_from_row(row: &Row<'_>) -> rusqlite::Result<Portfolio> {
    Ok(Portfolio {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        initial_balance: row.get(3)?,
    })
}

/// Raw column values of a `trades` row.
struct TradeRow {
    id: TradeId,
    portfolio_id: PortfolioId,
    symbol: String,
    direction: String,
    status: String,
    quantity: f64,
    entry_price: f64,
    entry_time: String,
    exit_price: Option<f64>,
    exit_time: Option<String>,
    profit_loss: Option<f64>,
    profit_loss_percent: Option<f64>,
    notes: Option<String>,
    tags: Option<String>,
}

impl TradeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(TradeRow {
            id: row.get(0)?,
            portfolio_id: row.get(1)?,
            symbol: row.get(2)?,
            direction: row.get(3)?,
            status: row.get(4)?,
            quantity: row.get(5)?,
            entry_price: row.get(6)?,
            entry_time: row.get(7)?,
            exit_price: row.get(8)?,
            exit_time: row.get(9)?,
            profit_loss: row.get(10)?,
            profit_loss_percent: row.get(11)?,
            notes: row.get(12)?,
            tags: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<TradeRecord, TradelogError> {
        let id = self.id;
        let corrupt = |e: TradelogError| TradelogError::DatabaseQuery {
            reason: format!("trade {id}: {e}"),
        };

        let direction: Direction = self.direction.parse().map_err(corrupt)?;
        let status: TradeStatus = self.status.parse().map_err(corrupt)?;
        let entry_time = parse_time(id, "entry_time", &self.entry_time)?;

        let state = match (
            status,
            self.exit_price,
            self.exit_time,
            self.profit_loss,
            self.profit_loss_percent,
        ) {
            (TradeStatus::Open, None, None, None, None) => TradeState::Open,
            (TradeStatus::Closed, Some(price), Some(time), Some(pnl), Some(pct)) => {
                let time = parse_time(id, "exit_time", &time)?;
                TradeState::Closed(Exit::restore(price, time, pnl, pct).map_err(corrupt)?)
            }
            _ => {
                return Err(TradelogError::DatabaseQuery {
                    reason: format!("trade {id}: exit columns inconsistent with status {status}"),
                });
            }
        };

        let new = NewTrade {
            portfolio_id: self.portfolio_id,
            symbol: self.symbol,
            direction,
            quantity: self.quantity,
            entry_price: self.entry_price,
            entry_time,
            notes: self.notes,
            tags: self.tags,
        };
        TradeRecord::restore(id, new, state).map_err(corrupt)
    }
}

fn fetch_trade(conn: &Connection, id: TradeId) -> Result<Option<TradeRecord>, TradelogError> {
    let query = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1");
    let row = conn
        .query_row(&query, params![id], TradeRow::from_row)
        .optional()
        .map_err(query_err)?;
    row.map(TradeRow::into_record).transpose()
}

fn fetch_portfolio(conn: &Connection, id: PortfolioId) -> Result<Option<Portfolio>, TradelogError> {
    conn.query_row(
        "SELECT id, name, description, initial_balance FROM portfolios WHERE id = ?1",
        params![id],
        portfolio_from_row,
    )
    .optional()
    .map_err(query_err)
}

/// Validate and insert one trade, already closed when `exit` is given.
fn insert_row(
    conn: &Connection,
    trade: &NewTrade,
    exit: Option<&Exit>,
) -> Result<TradeRecord, TradelogError> {
    let trade = trade.clone().validate()?;
    if !portfolio_exists(conn, trade.portfolio_id)? {
        return Err(TradelogError::NotFound {
            entity: "portfolio",
            id: trade.portfolio_id,
        });
    }

    let status = if exit.is_some() {
        TradeStatus::Closed
    } else {
        TradeStatus::Open
    };
    conn.execute(
        "INSERT INTO trades (portfolio_id, symbol, direction, status, quantity, entry_price,
                             entry_time, exit_price, exit_time, profit_loss,
                             profit_loss_percent, notes, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            trade.portfolio_id,
            trade.symbol,
            trade.direction.as_str(),
            status.as_str(),
            trade.quantity,
            trade.entry_price,
            format_time(trade.entry_time),
            exit.map(Exit::price),
            exit.map(|e| format_time(e.time())),
            exit.map(Exit::profit_loss),
            exit.map(Exit::profit_loss_percent),
            trade.notes,
            trade.tags,
            format_time(Utc::now())
        ],
    )
    .map_err(query_err)?;

    let id = conn.last_insert_rowid();
    debug!(trade_id = id, symbol = %trade.symbol, %status, "inserted trade");
    let mut record = TradeRecord::open(id, trade)?;
    if let Some(exit) = exit {
        record.mark_closed(exit.clone());
    }
    Ok(record)
}

fn portfolio_exists(conn: &Connection, id: PortfolioId) -> Result<bool, TradelogError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM portfolios WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(query_err)?;
    Ok(found.is_some())
}

impl TradeStore for SqliteTradeStore {
    fn create_portfolio(&self, portfolio: &NewPortfolio) -> Result<Portfolio, TradelogError> {
        let portfolio = portfolio.clone().validate()?;
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO portfolios (name, description, initial_balance, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                portfolio.name,
                portfolio.description,
                portfolio.initial_balance,
                format_time(Utc::now())
            ],
        )
        .map_err(query_err)?;

        let id = conn.last_insert_rowid();
        info!(portfolio_id = id, name = %portfolio.name, "created portfolio");
        Ok(Portfolio {
            id,
            name: portfolio.name,
            description: portfolio.description,
            initial_balance: portfolio.initial_balance,
        })
    }

    fn get_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, TradelogError> {
        let conn = self.conn()?;
        fetch_portfolio(&conn, id)
    }

    fn update_portfolio(
        &self,
        id: PortfolioId,
        update: &PortfolioUpdate,
    ) -> Result<Portfolio, TradelogError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let current = fetch_portfolio(&tx, id)?.ok_or(TradelogError::NotFound {
            entity: "portfolio",
            id,
        })?;
        let updated = update.apply(&current)?;

        tx.execute(
            "UPDATE portfolios SET name = ?1, description = ?2, initial_balance = ?3
             WHERE id = ?4",
            params![
                updated.name,
                updated.description,
                updated.initial_balance,
                id
            ],
        )
        .map_err(query_err)?;
        tx.commit().map_err(query_err)?;

        info!(portfolio_id = id, "updated portfolio");
        Ok(updated)
    }

    fn list_portfolios(&self) -> Result<Vec<Portfolio>, TradelogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, description, initial_balance FROM portfolios ORDER BY id")
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], portfolio_from_row)
            .map_err(query_err)?;

        let mut portfolios = Vec::new();
        for row in rows {
            portfolios.push(row.map_err(query_err)?);
        }
        Ok(portfolios)
    }

    fn delete_portfolio(&self, id: PortfolioId) -> Result<bool, TradelogError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM portfolios WHERE id = ?1", params![id])
            .map_err(query_err)?;
        if deleted > 0 {
            info!(portfolio_id = id, "deleted portfolio");
        }
        Ok(deleted > 0)
    }

    fn insert_trade(&self, trade: &NewTrade) -> Result<TradeRecord, TradelogError> {
        let conn = self.conn()?;
        insert_row(&conn, trade, None)
    }

    fn insert_batch(
        &self,
        trades: &[(NewTrade, Option<Exit>)],
    ) -> Result<Vec<TradeRecord>, TradelogError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let mut records = Vec::with_capacity(trades.len());
        for (trade, exit) in trades {
            records.push(insert_row(&tx, trade, exit.as_ref())?);
        }
        tx.commit().map_err(query_err)?;

        debug!(count = records.len(), "inserted trade batch");
        Ok(records)
    }

    fn get_trade(&self, id: TradeId) -> Result<Option<TradeRecord>, TradelogError> {
        let conn = self.conn()?;
        fetch_trade(&conn, id)
    }

    fn list_trades(
        &self,
        portfolio_id: PortfolioId,
        status: Option<TradeStatus>,
    ) -> Result<Vec<TradeRecord>, TradelogError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE portfolio_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY id ASC"
        );

        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![portfolio_id, status.map(TradeStatus::as_str)],
                TradeRow::from_row,
            )
            .map_err(query_err)?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(query_err)?.into_record()?);
        }
        Ok(trades)
    }

    fn save_closed(&self, trade: &TradeRecord) -> Result<(), TradelogError> {
        let exit = trade.exit().ok_or_else(|| {
            TradelogError::invalid_state(trade.id(), "cannot persist an open trade as closed")
        })?;
        let conn = self.conn()?;

        let updated = conn
            .execute(
                "UPDATE trades
                 SET status = 'closed', exit_price = ?1, exit_time = ?2,
                     profit_loss = ?3, profit_loss_percent = ?4, updated_at = ?5
                 WHERE id = ?6 AND status = 'open'",
                params![
                    exit.price(),
                    format_time(exit.time()),
                    exit.profit_loss(),
                    exit.profit_loss_percent(),
                    format_time(Utc::now()),
                    trade.id()
                ],
            )
            .map_err(query_err)?;

        if updated == 1 {
            info!(
                trade_id = trade.id(),
                profit_loss = exit.profit_loss(),
                "closed trade"
            );
            return Ok(());
        }

        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM trades WHERE id = ?1",
                params![trade.id()],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;

        match status {
            None => Err(TradelogError::NotFound {
                entity: "trade",
                id: trade.id(),
            }),
            Some(_) => {
                warn!(trade_id = trade.id(), "close rejected: trade already closed");
                Err(TradelogError::invalid_state(
                    trade.id(),
                    "trade is already closed",
                ))
            }
        }
    }

    fn update_annotations(
        &self,
        id: TradeId,
        notes: Option<String>,
        tags: Option<String>,
    ) -> Result<TradeRecord, TradelogError> {
        let mut conn = self.conn()?;
        // Immediate so a concurrent annotate cannot interleave between the
        // read and the write.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let mut trade = fetch_trade(&tx, id)?.ok_or(TradelogError::NotFound {
            entity: "trade",
            id,
        })?;
        trade.annotate(notes, tags);

        tx.execute(
            "UPDATE trades SET notes = ?1, tags = ?2, updated_at = ?3 WHERE id = ?4",
            params![trade.notes(), trade.tags(), format_time(Utc::now()), id],
        )
        .map_err(query_err)?;
        tx.commit().map_err(query_err)?;

        Ok(trade)
    }

    fn delete_trade(&self, id: TradeId) -> Result<bool, TradelogError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM trades WHERE id = ?1", params![id])
            .map_err(query_err)?;
        if deleted > 0 {
            info!(trade_id = id, "deleted trade");
        }
        Ok(deleted > 0)
    }
}
