//! Performance statistics over closed trades.
//!
//! A trade with `profit_loss > 0` is a win; everything else, including a
//! flat exit, is a loss.

use serde::Serialize;

use super::error::TradelogError;
use super::trade::{TradeId, TradeRecord};

/// Gross profit over gross loss, or `Undefined` when the loss sum is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitFactor {
    Ratio(f64),
    Undefined,
}

impl ProfitFactor {
    pub fn ratio(self) -> Option<f64> {
        match self {
            ProfitFactor::Ratio(r) => Some(r),
            ProfitFactor::Undefined => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeExtreme {
    pub id: TradeId,
    pub symbol: String,
    pub profit_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioStats {
    pub total_trades: usize,
    pub total_profit_loss: f64,
    pub win_rate: f64,
    pub average_profit_loss: f64,
    pub total_wins: usize,
    pub total_losses: usize,
    pub average_win: f64,
    pub average_loss: f64,
    pub profit_factor: ProfitFactor,
    pub best_trade: Option<TradeExtreme>,
    pub worst_trade: Option<TradeExtreme>,
}

impl PortfolioStats {
    /// Summarize a set of closed trades. Any open trade in the input is
    /// rejected; callers filter by status first.
    pub fn summarize(trades: &[TradeRecord]) -> Result<Self, TradelogError> {
        let mut total_profit_loss = 0.0_f64;
        let mut total_wins = 0usize;
        let mut total_losses = 0usize;
        let mut win_sum = 0.0_f64;
        let mut loss_sum = 0.0_f64;
        let mut best: Option<&TradeRecord> = None;
        let mut worst: Option<&TradeRecord> = None;

        for trade in trades {
            let pnl = closed_profit_loss(trade)?;
            total_profit_loss += pnl;
            if pnl > 0.0 {
                total_wins += 1;
                win_sum += pnl;
            } else {
                total_losses += 1;
                loss_sum += pnl;
            }

            // Strict comparisons keep the first trade on ties.
            if best.is_none_or(|b| pnl > realised(b)) {
                best = Some(trade);
            }
            if worst.is_none_or(|w| pnl < realised(w)) {
                worst = Some(trade);
            }
        }

        let total_trades = trades.len();
        let profit_factor = if loss_sum != 0.0 {
            ProfitFactor::Ratio(win_sum / loss_sum.abs())
        } else {
            ProfitFactor::Undefined
        };

        Ok(PortfolioStats {
            total_trades,
            total_profit_loss,
            win_rate: percentage(total_wins, total_trades),
            average_profit_loss: mean(total_profit_loss, total_trades),
            total_wins,
            total_losses,
            average_win: mean(win_sum, total_wins),
            average_loss: mean(loss_sum, total_losses),
            profit_factor,
            best_trade: best.map(extreme),
            worst_trade: worst.map(extreme),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub total_trades: usize,
    pub total_profit_loss: f64,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
}

impl SymbolStats {
    /// Per-symbol breakdown in first-seen order of the input.
    pub fn by_symbol(trades: &[TradeRecord]) -> Result<Vec<Self>, TradelogError> {
        let mut groups: Vec<SymbolStats> = Vec::new();

        for trade in trades {
            let pnl = closed_profit_loss(trade)?;
            let index = match groups.iter().position(|g| g.symbol == trade.symbol()) {
                Some(i) => i,
                None => {
                    groups.push(SymbolStats {
                        symbol: trade.symbol().to_string(),
                        total_trades: 0,
                        total_profit_loss: 0.0,
                        wins: 0,
                        losses: 0,
                        win_rate: 0.0,
                    });
                    groups.len() - 1
                }
            };

            let group = &mut groups[index];
            group.total_trades += 1;
            group.total_profit_loss += pnl;
            if pnl > 0.0 {
                group.wins += 1;
            } else {
                group.losses += 1;
            }
        }

        for group in &mut groups {
            group.win_rate = percentage(group.wins, group.total_trades);
        }

        Ok(groups)
    }
}

fn closed_profit_loss(trade: &TradeRecord) -> Result<f64, TradelogError> {
    trade.profit_loss().ok_or_else(|| {
        TradelogError::invalid_state(trade.id(), "open trade passed to closed-trade statistics")
    })
}

fn realised(trade: &TradeRecord) -> f64 {
    trade.profit_loss().unwrap_or(0.0)
}

fn extreme(trade: &TradeRecord) -> TradeExtreme {
    TradeExtreme {
        id: trade.id(),
        symbol: trade.symbol().to_string(),
        profit_loss: realised(trade),
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count > 0 { sum / count as f64 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::closer::PositionCloser;
    use crate::domain::trade::{Direction, NewTrade};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    /// Closed long trade of one share whose P&L equals `pnl`.
    fn make_trade(id: i64, symbol: &str, pnl: f64) -> TradeRecord {
        let entry = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut trade = TradeRecord::open(
            id,
            NewTrade {
                portfolio_id: 1,
                symbol: symbol.into(),
                direction: Direction::Long,
                quantity: 1.0,
                entry_price: 1_000.0,
                entry_time: entry,
                notes: None,
                tags: None,
            },
        )
        .unwrap();
        PositionCloser::default()
            .close(&mut trade, 1_000.0 + pnl, entry + Duration::days(3))
            .unwrap();
        trade
    }

    fn make_open(id: i64) -> TradeRecord {
        TradeRecord::open(
            id,
            NewTrade {
                portfolio_id: 1,
                symbol: "OPEN".into(),
                direction: Direction::Short,
                quantity: 1.0,
                entry_price: 10.0,
                entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                notes: None,
                tags: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn summary_three_trade_scenario() {
        let trades = vec![
            make_trade(1, "AAPL", 200.0),
            make_trade(2, "AAPL", -50.0),
            make_trade(3, "TSLA", 100.0),
        ];
        let stats = PortfolioStats::summarize(&trades).unwrap();

        assert_eq!(stats.total_trades, 3);
        assert_relative_eq!(stats.total_profit_loss, 250.0);
        assert_eq!(stats.total_wins, 2);
        assert_eq!(stats.total_losses, 1);
        assert_relative_eq!(stats.win_rate, 200.0 / 3.0);
        assert_relative_eq!(stats.average_profit_loss, 250.0 / 3.0);
        assert_relative_eq!(stats.average_win, 150.0);
        assert_relative_eq!(stats.average_loss, -50.0);
        assert_eq!(stats.profit_factor, ProfitFactor::Ratio(6.0));
    }

    #[test]
    fn summary_empty_set() {
        let stats = PortfolioStats::summarize(&[]).unwrap();
        assert_eq!(stats.total_trades, 0);
        assert!((stats.win_rate - 0.0).abs() < f64::EPSILON);
        assert!((stats.average_profit_loss - 0.0).abs() < f64::EPSILON);
        assert!((stats.average_win - 0.0).abs() < f64::EPSILON);
        assert!((stats.average_loss - 0.0).abs() < f64::EPSILON);
        assert_eq!(stats.profit_factor, ProfitFactor::Undefined);
        assert!(stats.best_trade.is_none());
        assert!(stats.worst_trade.is_none());
    }

    #[test]
    fn zero_profit_counts_as_loss() {
        let trades = vec![make_trade(1, "AAPL", 100.0), make_trade(2, "AAPL", 0.0)];
        let stats = PortfolioStats::summarize(&trades).unwrap();

        assert_eq!(stats.total_wins, 1);
        assert_eq!(stats.total_losses, 1);
        assert_relative_eq!(stats.win_rate, 50.0);
        assert_relative_eq!(stats.average_loss, 0.0);
        // The only loss nets to zero, so the ratio has no denominator.
        assert_eq!(stats.profit_factor, ProfitFactor::Undefined);
    }

    #[test]
    fn all_wins_profit_factor_undefined() {
        let trades = vec![make_trade(1, "A", 10.0), make_trade(2, "B", 20.0)];
        let stats = PortfolioStats::summarize(&trades).unwrap();
        assert_eq!(stats.total_losses, 0);
        assert_eq!(stats.profit_factor, ProfitFactor::Undefined);
        assert_eq!(stats.profit_factor.ratio(), None);
        assert_relative_eq!(stats.win_rate, 100.0);
    }

    #[test]
    fn all_losses_profit_factor_zero() {
        let trades = vec![make_trade(1, "A", -10.0), make_trade(2, "B", -30.0)];
        let stats = PortfolioStats::summarize(&trades).unwrap();
        assert_eq!(stats.profit_factor, ProfitFactor::Ratio(0.0));
        assert_relative_eq!(stats.average_loss, -20.0);
        assert_relative_eq!(stats.average_win, 0.0);
    }

    #[test]
    fn best_and_worst_keep_first_on_ties() {
        let trades = vec![
            make_trade(1, "A", 50.0),
            make_trade(2, "B", 80.0),
            make_trade(3, "C", 80.0),
            make_trade(4, "D", -40.0),
            make_trade(5, "E", -40.0),
        ];
        let stats = PortfolioStats::summarize(&trades).unwrap();

        let best = stats.best_trade.unwrap();
        assert_eq!(best.id, 2);
        assert_eq!(best.symbol, "B");
        assert_relative_eq!(best.profit_loss, 80.0);
        assert_eq!(stats.worst_trade.unwrap().id, 4);
    }

    #[test]
    fn open_trade_rejected() {
        let trades = vec![make_trade(1, "A", 5.0), make_open(9)];
        let err = PortfolioStats::summarize(&trades).unwrap_err();
        assert!(matches!(err, TradelogError::InvalidState { trade_id: 9, .. }));

        let err = SymbolStats::by_symbol(&trades).unwrap_err();
        assert!(matches!(err, TradelogError::InvalidState { trade_id: 9, .. }));
    }

    #[test]
    fn summary_is_order_independent() {
        let mut trades = vec![
            make_trade(1, "A", 12.5),
            make_trade(2, "B", -7.25),
            make_trade(3, "C", 3.0),
        ];
        let forward = PortfolioStats::summarize(&trades).unwrap();
        trades.reverse();
        let backward = PortfolioStats::summarize(&trades).unwrap();

        assert_eq!(forward.total_wins, backward.total_wins);
        assert_relative_eq!(forward.total_profit_loss, backward.total_profit_loss);
        assert_eq!(forward.profit_factor, backward.profit_factor);
    }

    #[test]
    fn by_symbol_groups_first_seen() {
        let trades = vec![
            make_trade(1, "AAPL", 200.0),
            make_trade(2, "TSLA", 100.0),
            make_trade(3, "AAPL", -50.0),
        ];
        let groups = SymbolStats::by_symbol(&trades).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].symbol, "AAPL");
        assert_eq!(groups[0].total_trades, 2);
        assert_relative_eq!(groups[0].total_profit_loss, 150.0);
        assert_eq!(groups[0].wins, 1);
        assert_eq!(groups[0].losses, 1);
        assert_relative_eq!(groups[0].win_rate, 50.0);

        assert_eq!(groups[1].symbol, "TSLA");
        assert_eq!(groups[1].total_trades, 1);
        assert_relative_eq!(groups[1].total_profit_loss, 100.0);
        assert_eq!(groups[1].wins, 1);
        assert_eq!(groups[1].losses, 0);
        assert_relative_eq!(groups[1].win_rate, 100.0);

        let summed: f64 = groups.iter().map(|g| g.total_profit_loss).sum();
        let total = PortfolioStats::summarize(&trades).unwrap().total_profit_loss;
        assert_relative_eq!(summed, total);
    }

    #[test]
    fn by_symbol_empty() {
        assert!(SymbolStats::by_symbol(&[]).unwrap().is_empty());
    }

    #[test]
    fn profit_factor_serializes_distinctly() {
        assert_eq!(
            serde_json::to_string(&ProfitFactor::Ratio(6.0)).unwrap(),
            r#"{"ratio":6.0}"#
        );
        assert_eq!(
            serde_json::to_string(&ProfitFactor::Undefined).unwrap(),
            r#""undefined""#
        );
    }

    proptest! {
        #[test]
        fn win_loss_counts_partition_total(pnls in prop::collection::vec(-500i32..500, 0..40)) {
            let trades: Vec<TradeRecord> = pnls
                .iter()
                .enumerate()
                .map(|(i, &p)| make_trade(i as i64, if i % 2 == 0 { "EVEN" } else { "ODD" }, p as f64))
                .collect();
            let stats = PortfolioStats::summarize(&trades).unwrap();

            prop_assert_eq!(stats.total_wins + stats.total_losses, stats.total_trades);
            prop_assert!((0.0..=100.0).contains(&stats.win_rate));
            prop_assert_eq!(stats.total_wins, pnls.iter().filter(|&&p| p > 0).count());

            let groups = SymbolStats::by_symbol(&trades).unwrap();
            let grouped_trades: usize = groups.iter().map(|g| g.total_trades).sum();
            let grouped_wins: usize = groups.iter().map(|g| g.wins).sum();
            prop_assert_eq!(grouped_trades, stats.total_trades);
            prop_assert_eq!(grouped_wins, stats.total_wins);
            for g in &groups {
                prop_assert!((0.0..=100.0).contains(&g.win_rate));
            }
        }
    }
}
