//! Trade records and their open/closed lifecycle state.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::TradelogError;

pub type TradeId = i64;
pub type PortfolioId = i64;

/// Position direction. The profit/loss sign rule is keyed off this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// Realised profit/loss of a round trip in this direction.
    pub fn profit_loss(self, entry_price: f64, exit_price: f64, quantity: f64) -> f64 {
        match self {
            Direction::Long => (exit_price - entry_price) * quantity,
            Direction::Short => (entry_price - exit_price) * quantity,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = TradelogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(TradelogError::validation(
                "direction",
                format!("expected 'long' or 'short', got '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = TradelogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(TradeStatus::Open),
            "closed" => Ok(TradeStatus::Closed),
            other => Err(TradelogError::validation(
                "status",
                format!("expected 'open' or 'closed', got '{other}'"),
            )),
        }
    }
}

/// Exit snapshot taken when a trade is closed.
///
/// Only [`PositionCloser`](super::closer::PositionCloser) computes these
/// values; storage adapters may restore a previously computed snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Exit {
    price: f64,
    time: DateTime<Utc>,
    profit_loss: f64,
    profit_loss_percent: f64,
}

impl Exit {
    pub(crate) fn compute(
        direction: Direction,
        entry_price: f64,
        quantity: f64,
        price: f64,
        time: DateTime<Utc>,
    ) -> Self {
        let profit_loss = direction.profit_loss(entry_price, price, quantity);
        let profit_loss_percent = profit_loss / (entry_price * quantity) * 100.0;
        Exit {
            price,
            time,
            profit_loss,
            profit_loss_percent,
        }
    }

    pub(crate) fn restore(
        price: f64,
        time: DateTime<Utc>,
        profit_loss: f64,
        profit_loss_percent: f64,
    ) -> Result<Self, TradelogError> {
        require_positive("exit_price", price)?;
        if !profit_loss.is_finite() || !profit_loss_percent.is_finite() {
            return Err(TradelogError::validation(
                "profit_loss",
                "stored profit/loss is not a finite number",
            ));
        }
        Ok(Exit {
            price,
            time,
            profit_loss,
            profit_loss_percent,
        })
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn profit_loss(&self) -> f64 {
        self.profit_loss
    }

    pub fn profit_loss_percent(&self) -> f64 {
        self.profit_loss_percent
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeState {
    Open,
    Closed(Exit),
}

/// Input for recording a new open trade.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub portfolio_id: PortfolioId,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub notes: Option<String>,
    pub tags: Option<String>,
}

impl NewTrade {
    /// Check the creation invariants and normalize the symbol and free text.
    pub fn validate(self) -> Result<NewTrade, TradelogError> {
        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(TradelogError::validation("symbol", "must not be empty"));
        }
        require_positive("quantity", self.quantity)?;
        require_positive("entry_price", self.entry_price)?;

        Ok(NewTrade {
            symbol,
            notes: normalize_text(self.notes),
            tags: normalize_text(self.tags),
            ..self
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    id: TradeId,
    portfolio_id: PortfolioId,
    symbol: String,
    direction: Direction,
    quantity: f64,
    entry_price: f64,
    entry_time: DateTime<Utc>,
    state: TradeState,
    notes: Option<String>,
    tags: Option<String>,
}

impl TradeRecord {
    /// Build an open trade with the given identity from validated input.
    pub fn open(id: TradeId, new: NewTrade) -> Result<Self, TradelogError> {
        let new = new.validate()?;
        Ok(TradeRecord {
            id,
            portfolio_id: new.portfolio_id,
            symbol: new.symbol,
            direction: new.direction,
            quantity: new.quantity,
            entry_price: new.entry_price,
            entry_time: new.entry_time,
            state: TradeState::Open,
            notes: new.notes,
            tags: new.tags,
        })
    }

    pub(crate) fn restore(
        id: TradeId,
        new: NewTrade,
        state: TradeState,
    ) -> Result<Self, TradelogError> {
        let mut trade = Self::open(id, new)?;
        trade.state = state;
        Ok(trade)
    }

    pub(crate) fn mark_closed(&mut self, exit: Exit) {
        self.state = TradeState::Closed(exit);
    }

    pub fn id(&self) -> TradeId {
        self.id
    }

    pub fn portfolio_id(&self) -> PortfolioId {
        self.portfolio_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn state(&self) -> &TradeState {
        &self.state
    }

    pub fn status(&self) -> TradeStatus {
        match self.state {
            TradeState::Open => TradeStatus::Open,
            TradeState::Closed(_) => TradeStatus::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status() == TradeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status() == TradeStatus::Closed
    }

    pub fn exit(&self) -> Option<&Exit> {
        match &self.state {
            TradeState::Open => None,
            TradeState::Closed(exit) => Some(exit),
        }
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.exit().map(Exit::price)
    }

    pub fn exit_time(&self) -> Option<DateTime<Utc>> {
        self.exit().map(Exit::time)
    }

    pub fn profit_loss(&self) -> Option<f64> {
        self.exit().map(Exit::profit_loss)
    }

    pub fn profit_loss_percent(&self) -> Option<f64> {
        self.exit().map(Exit::profit_loss_percent)
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn tags(&self) -> Option<&str> {
        self.tags.as_deref()
    }

    /// Comma-separated tags, trimmed, with empty entries dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace notes and/or tags. `None` leaves a field untouched; an empty
    /// string clears it. Allowed in either status.
    pub fn annotate(&mut self, notes: Option<String>, tags: Option<String>) {
        if let Some(notes) = notes {
            self.notes = normalize_text(Some(notes));
        }
        if let Some(tags) = tags {
            self.tags = normalize_text(Some(tags));
        }
    }
}

pub(crate) fn require_positive(field: &str, value: f64) -> Result<(), TradelogError> {
    if !value.is_finite() {
        return Err(TradelogError::validation(field, "must be a finite number"));
    }
    if value <= 0.0 {
        return Err(TradelogError::validation(
            field,
            format!("must be positive, got {value}"),
        ));
    }
    Ok(())
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, TradelogError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }
    Err(TradelogError::validation(
        field,
        format!("unrecognised timestamp '{value}' (expected RFC 3339 or YYYY-MM-DD)"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_new_trade() -> NewTrade {
        NewTrade {
            portfolio_id: 1,
            symbol: " aapl ".into(),
            direction: Direction::Long,
            quantity: 10.0,
            entry_price: 100.0,
            entry_time: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
            notes: Some("  breakout  ".into()),
            tags: Some("   ".into()),
        }
    }

    #[test]
    fn open_normalizes_symbol_and_text() {
        let trade = TradeRecord::open(1, sample_new_trade()).unwrap();
        assert_eq!(trade.symbol(), "AAPL");
        assert_eq!(trade.notes(), Some("breakout"));
        assert_eq!(trade.tags(), None);
        assert_eq!(trade.status(), TradeStatus::Open);
        assert!(trade.exit().is_none());
        assert!(trade.profit_loss().is_none());
    }

    #[test]
    fn empty_symbol_rejected() {
        let new = NewTrade {
            symbol: "   ".into(),
            ..sample_new_trade()
        };
        let err = TradeRecord::open(1, new).unwrap_err();
        assert!(matches!(err, TradelogError::Validation { field, .. } if field == "symbol"));
    }

    #[test]
    fn non_positive_quantity_rejected() {
        for quantity in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let new = NewTrade {
                quantity,
                ..sample_new_trade()
            };
            let err = new.validate().unwrap_err();
            assert!(
                matches!(err, TradelogError::Validation { ref field, .. } if field == "quantity"),
                "quantity {quantity} gave {err}"
            );
        }
    }

    #[test]
    fn non_positive_entry_price_rejected() {
        let new = NewTrade {
            entry_price: 0.0,
            ..sample_new_trade()
        };
        let err = new.validate().unwrap_err();
        assert!(matches!(err, TradelogError::Validation { field, .. } if field == "entry_price"));
    }

    #[test]
    fn direction_formula_table() {
        assert!((Direction::Long.profit_loss(100.0, 120.0, 10.0) - 200.0).abs() < f64::EPSILON);
        assert!((Direction::Short.profit_loss(100.0, 80.0, 5.0) - 100.0).abs() < f64::EPSILON);
        assert!((Direction::Long.profit_loss(100.0, 80.0, 5.0) + 100.0).abs() < f64::EPSILON);
        assert!((Direction::Short.profit_loss(100.0, 120.0, 10.0) + 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn direction_and_status_parse() {
        assert_eq!("LONG".parse::<Direction>().unwrap(), Direction::Long);
        assert_eq!(" short".parse::<Direction>().unwrap(), Direction::Short);
        assert!("buy".parse::<Direction>().is_err());
        assert_eq!("Closed".parse::<TradeStatus>().unwrap(), TradeStatus::Closed);
        assert!("pending".parse::<TradeStatus>().is_err());
    }

    #[test]
    fn tag_list_splits_and_trims() {
        let new = NewTrade {
            tags: Some("swing, earnings,,  gap ".into()),
            ..sample_new_trade()
        };
        let trade = TradeRecord::open(1, new).unwrap();
        assert_eq!(trade.tag_list(), vec!["swing", "earnings", "gap"]);
    }

    #[test]
    fn annotate_replaces_and_clears() {
        let mut trade = TradeRecord::open(1, sample_new_trade()).unwrap();
        trade.annotate(None, Some("momentum".into()));
        assert_eq!(trade.notes(), Some("breakout"));
        assert_eq!(trade.tags(), Some("momentum"));

        trade.annotate(Some(String::new()), None);
        assert_eq!(trade.notes(), None);
        assert_eq!(trade.tags(), Some("momentum"));
    }

    #[test]
    fn parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(
            parse_timestamp("t", "2024-03-01T14:30:00Z").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("t", "2024-03-01T16:30:00+02:00").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("t", "2024-03-01 14:30:00").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("t", "2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("entry_time", "yesterday").unwrap_err();
        assert!(matches!(err, TradelogError::Validation { field, .. } if field == "entry_time"));
    }

    #[test]
    fn restore_rejects_bad_exit_snapshot() {
        let time = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        assert!(Exit::restore(0.0, time, 0.0, 0.0).is_err());
        assert!(Exit::restore(10.0, time, f64::NAN, 0.0).is_err());
        assert!(Exit::restore(10.0, time, 5.0, 1.0).is_ok());
    }
}
