//! CSV trade import.
//!
//! Expected header: `symbol,direction,quantity,entry_price,entry_time`, with
//! optional `exit_price,exit_time,notes,tags` columns. A row with both exit
//! columns filled describes a trade that is closed on import.

use crate::domain::error::TradelogError;
use crate::domain::ledger::ImportRow;
use crate::domain::trade::{parse_timestamp, Direction, NewTrade, PortfolioId};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CsvTradeRow {
    symbol: String,
    direction: String,
    quantity: f64,
    entry_price: f64,
    entry_time: String,
    #[serde(default)]
    exit_price: Option<f64>,
    #[serde(default)]
    exit_time: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

impl CsvTradeRow {
    fn into_import_row(
        self,
        line: u64,
        portfolio_id: PortfolioId,
    ) -> Result<ImportRow, TradelogError> {
        let direction: Direction = self.direction.parse()?;
        let entry_time = parse_timestamp("entry_time", &self.entry_time)?;

        let exit_time = self.exit_time.filter(|t| !t.trim().is_empty());
        let exit = match (self.exit_price, exit_time) {
            (Some(price), Some(time)) => Some((price, parse_timestamp("exit_time", &time)?)),
            (None, None) => None,
            _ => {
                return Err(TradelogError::validation(
                    "exit_price",
                    "exit_price and exit_time must be given together",
                ));
            }
        };

        Ok(ImportRow {
            line,
            trade: NewTrade {
                portfolio_id,
                symbol: self.symbol,
                direction,
                quantity: self.quantity,
                entry_price: self.entry_price,
                entry_time,
                notes: self.notes,
                tags: self.tags,
            },
            exit,
        })
    }
}

pub fn read_trades_from_path(
    path: &Path,
    portfolio_id: PortfolioId,
) -> Result<Vec<ImportRow>, TradelogError> {
    let file = File::open(path).map_err(|e| TradelogError::Import {
        line: 0,
        reason: format!("failed to open {}: {}", path.display(), e),
    })?;
    read_trades(file, portfolio_id)
}

/// Parse every row, failing on the first bad one with its 1-based line number.
pub fn read_trades<R: Read>(
    reader: R,
    portfolio_id: PortfolioId,
) -> Result<Vec<ImportRow>, TradelogError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| TradelogError::Import {
            line: 1,
            reason: format!("CSV header error: {}", e),
        })?
        .clone();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| TradelogError::Import {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: format!("CSV parse error: {}", e),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let row: CsvTradeRow = record
            .deserialize(Some(&headers))
            .map_err(|e| TradelogError::Import {
                line,
                reason: e.to_string(),
            })?;
        let row = row
            .into_import_row(line, portfolio_id)
            .map_err(|e| TradelogError::Import {
                line,
                reason: e.to_string(),
            })?;
        rows.push(row);
    }

    Ok(rows)
}
