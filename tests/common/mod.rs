#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::io::Write;
use tradelog::domain::portfolio::NewPortfolio;
use tradelog::domain::trade::{Direction, NewTrade, PortfolioId};

#[cfg(feature = "sqlite")]
use tradelog::adapters::sqlite_adapter::SqliteTradeStore;
#[cfg(feature = "sqlite")]
use tradelog::domain::portfolio::Portfolio;
#[cfg(feature = "sqlite")]
use tradelog::ports::trade_store::TradeStore;

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn new_trade(
    portfolio_id: PortfolioId,
    symbol: &str,
    direction: Direction,
    quantity: f64,
    entry_price: f64,
) -> NewTrade {
    NewTrade {
        portfolio_id,
        symbol: symbol.to_string(),
        direction,
        quantity,
        entry_price,
        entry_time: at(4, 14),
        notes: None,
        tags: None,
    }
}

pub fn named_portfolio(name: &str) -> NewPortfolio {
    NewPortfolio {
        name: name.to_string(),
        description: None,
        initial_balance: 25_000.0,
    }
}

#[cfg(feature = "sqlite")]
pub fn memory_store() -> (SqliteTradeStore, Portfolio) {
    let store = SqliteTradeStore::in_memory().unwrap();
    store.initialize_schema().unwrap();
    let portfolio = store.create_portfolio(&named_portfolio("Main")).unwrap();
    (store, portfolio)
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// INI pointing at a database file inside `dir`.
pub fn ini_for_db(dir: &std::path::Path, extra: &str) -> String {
    format!(
        "[sqlite]\npath = {}\npool_size = 4\nbusy_timeout_ms = 5000\n{extra}",
        dir.join("journal.db").display()
    )
}
