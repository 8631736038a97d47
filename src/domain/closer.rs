//! Open-to-closed transition of a trade.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::error::TradelogError;
use super::trade::{require_positive, Exit, TradeRecord};

/// Closes open trades and snapshots their realised profit/loss.
///
/// By default an exit may be timestamped before the entry, matching how
/// journals back-fill trades. `require_exit_after_entry` turns that into a
/// validation error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionCloser {
    pub require_exit_after_entry: bool,
}

impl PositionCloser {
    pub fn strict() -> Self {
        PositionCloser {
            require_exit_after_entry: true,
        }
    }

    /// Close `trade` at `exit_price`. On error the trade is left untouched.
    pub fn close<'a>(
        &self,
        trade: &'a mut TradeRecord,
        exit_price: f64,
        exit_time: DateTime<Utc>,
    ) -> Result<&'a TradeRecord, TradelogError> {
        if trade.is_closed() {
            return Err(TradelogError::invalid_state(
                trade.id(),
                "trade is already closed",
            ));
        }
        require_positive("exit_price", exit_price)?;
        if self.require_exit_after_entry && exit_time < trade.entry_time() {
            return Err(TradelogError::validation(
                "exit_time",
                format!(
                    "exit {} is before entry {}",
                    exit_time.to_rfc3339(),
                    trade.entry_time().to_rfc3339()
                ),
            ));
        }

        let exit = Exit::compute(
            trade.direction(),
            trade.entry_price(),
            trade.quantity(),
            exit_price,
            exit_time,
        );
        if !exit.profit_loss().is_finite() || !exit.profit_loss_percent().is_finite() {
            return Err(TradelogError::validation(
                "exit_price",
                format!("profit/loss at {exit_price} is not representable"),
            ));
        }
        debug!(
            trade_id = trade.id(),
            profit_loss = exit.profit_loss(),
            "closing trade"
        );
        trade.mark_closed(exit);
        Ok(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::{Direction, NewTrade, TradeStatus};
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 15, 0, 0).unwrap()
    }

    fn open_trade(direction: Direction, entry_price: f64, quantity: f64) -> TradeRecord {
        TradeRecord::open(
            42,
            NewTrade {
                portfolio_id: 1,
                symbol: "MSFT".into(),
                direction,
                quantity,
                entry_price,
                entry_time: ts(10),
                notes: None,
                tags: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn long_profit() {
        let mut trade = open_trade(Direction::Long, 100.0, 10.0);
        let closed = PositionCloser::default()
            .close(&mut trade, 120.0, ts(12))
            .unwrap();

        assert_eq!(closed.status(), TradeStatus::Closed);
        assert_relative_eq!(closed.profit_loss().unwrap(), 200.0);
        assert_relative_eq!(closed.profit_loss_percent().unwrap(), 20.0);
        assert_relative_eq!(closed.exit_price().unwrap(), 120.0);
        assert_eq!(closed.exit_time(), Some(ts(12)));
    }

    #[test]
    fn short_profit() {
        let mut trade = open_trade(Direction::Short, 100.0, 5.0);
        let closed = PositionCloser::default()
            .close(&mut trade, 80.0, ts(12))
            .unwrap();

        assert_relative_eq!(closed.profit_loss().unwrap(), 100.0);
        assert_relative_eq!(closed.profit_loss_percent().unwrap(), 20.0);
    }

    #[test]
    fn long_loss_is_negative() {
        let mut trade = open_trade(Direction::Long, 50.0, 4.0);
        PositionCloser::default()
            .close(&mut trade, 45.0, ts(12))
            .unwrap();

        assert_relative_eq!(trade.profit_loss().unwrap(), -20.0);
        assert_relative_eq!(trade.profit_loss_percent().unwrap(), -10.0);
    }

    #[test]
    fn short_loss_is_negative() {
        let mut trade = open_trade(Direction::Short, 50.0, 4.0);
        PositionCloser::default()
            .close(&mut trade, 55.0, ts(12))
            .unwrap();

        assert_relative_eq!(trade.profit_loss().unwrap(), -20.0);
        assert_relative_eq!(trade.profit_loss_percent().unwrap(), -10.0);
    }

    #[test]
    fn flat_exit_is_zero() {
        let mut trade = open_trade(Direction::Long, 50.0, 4.0);
        PositionCloser::default()
            .close(&mut trade, 50.0, ts(12))
            .unwrap();
        assert_eq!(trade.profit_loss(), Some(0.0));
        assert_eq!(trade.profit_loss_percent(), Some(0.0));
    }

    #[test]
    fn second_close_fails_without_mutation() {
        let closer = PositionCloser::default();
        let mut trade = open_trade(Direction::Long, 100.0, 10.0);
        closer.close(&mut trade, 120.0, ts(12)).unwrap();
        let before = trade.clone();

        let err = closer.close(&mut trade, 90.0, ts(14)).unwrap_err();

        assert!(matches!(err, TradelogError::InvalidState { trade_id: 42, .. }));
        assert_eq!(trade, before);
        assert_relative_eq!(trade.exit_price().unwrap(), 120.0);
        assert_relative_eq!(trade.profit_loss().unwrap(), 200.0);
    }

    #[test]
    fn closed_check_precedes_price_check() {
        let closer = PositionCloser::default();
        let mut trade = open_trade(Direction::Long, 100.0, 10.0);
        closer.close(&mut trade, 120.0, ts(12)).unwrap();

        let err = closer.close(&mut trade, -1.0, ts(14)).unwrap_err();
        assert!(matches!(err, TradelogError::InvalidState { .. }));
    }

    #[test]
    fn non_positive_exit_price_rejected() {
        let closer = PositionCloser::default();
        for price in [0.0, -3.0, f64::NAN] {
            let mut trade = open_trade(Direction::Long, 100.0, 10.0);
            let err = closer.close(&mut trade, price, ts(12)).unwrap_err();
            assert!(
                matches!(err, TradelogError::Validation { ref field, .. } if field == "exit_price")
            );
            assert!(trade.is_open());
        }
    }

    #[test]
    fn overflowing_profit_loss_rejected() {
        let mut trade = open_trade(Direction::Long, 1e300, 1e10);
        let err = PositionCloser::default()
            .close(&mut trade, 2e300, ts(12))
            .unwrap_err();
        assert!(
            matches!(err, TradelogError::Validation { ref field, .. } if field == "exit_price")
        );
        assert!(trade.is_open());
        assert_eq!(trade.profit_loss(), None);
    }

    #[test]
    fn exit_before_entry_allowed_by_default() {
        let mut trade = open_trade(Direction::Long, 100.0, 10.0);
        PositionCloser::default()
            .close(&mut trade, 110.0, ts(1))
            .unwrap();
        assert!(trade.is_closed());
    }

    #[test]
    fn exit_before_entry_rejected_when_strict() {
        let mut trade = open_trade(Direction::Long, 100.0, 10.0);
        let err = PositionCloser::strict()
            .close(&mut trade, 110.0, ts(1))
            .unwrap_err();
        assert!(matches!(err, TradelogError::Validation { field, .. } if field == "exit_time"));
        assert!(trade.is_open());
    }

    #[test]
    fn exit_at_entry_time_allowed_when_strict() {
        let mut trade = open_trade(Direction::Short, 100.0, 10.0);
        PositionCloser::strict()
            .close(&mut trade, 90.0, ts(10))
            .unwrap();
        assert_relative_eq!(trade.profit_loss().unwrap(), 100.0);
    }
}
