// Trading strategy module
pub mod catalog;

use crate::models::{SimulationSettings, TradeSide};

pub use catalog::{strategy_catalog, strategy_by_id};

pub const DEFAULT_STOP_LOSS_PCT: f64 = 3.0;
pub const DEFAULT_TAKE_PROFIT_PCT: f64 = 5.0;

/// Strategy rule selected by a simulation's `strategyId`
///
/// Each rule maps the percentage price change since the last trade to a side.
/// Ids outside the catalog fall back to alternating sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyKind {
    /// 1: buy dips deeper than 2%
    MeanReversion,
    /// 2: follow the direction of the last move
    Momentum,
    /// 3: exit on stop loss / take profit, otherwise alternate
    Oscillator { stop_loss_pct: f64, take_profit_pct: f64 },
    /// 4: buy when the move exceeds +1%
    MovingAverageCrossover,
    /// Unknown id
    Alternating,
}

impl StrategyKind {
    pub fn from_id(strategy_id: u32, settings: &SimulationSettings) -> Self {
        match strategy_id {
            1 => StrategyKind::MeanReversion,
            2 => StrategyKind::Momentum,
            3 => StrategyKind::Oscillator {
                stop_loss_pct: settings.stop_loss.unwrap_or(DEFAULT_STOP_LOSS_PCT),
                take_profit_pct: settings.take_profit.unwrap_or(DEFAULT_TAKE_PROFIT_PCT),
            },
            4 => StrategyKind::MovingAverageCrossover,
            _ => StrategyKind::Alternating,
        }
    }

    /// Pick a side for a non-initial trade
    ///
    /// # Arguments
    /// * `price_change_pct` - Change of the current price against the last trade price, in percent
    /// * `last_side` - Side of the most recent trade
    pub fn decide(&self, price_change_pct: f64, last_side: TradeSide) -> TradeSide {
        match *self {
            StrategyKind::MeanReversion => {
                if price_change_pct < -2.0 {
                    TradeSide::Buy
                } else {
                    TradeSide::Sell
                }
            }
            StrategyKind::Momentum => {
                if price_change_pct > 0.0 {
                    TradeSide::Buy
                } else {
                    TradeSide::Sell
                }
            }
            StrategyKind::Oscillator {
                stop_loss_pct,
                take_profit_pct,
            } => {
                if price_change_pct <= -stop_loss_pct || price_change_pct >= take_profit_pct {
                    TradeSide::Sell
                } else {
                    last_side.opposite()
                }
            }
            StrategyKind::MovingAverageCrossover => {
                if price_change_pct > 1.0 {
                    TradeSide::Buy
                } else {
                    TradeSide::Sell
                }
            }
            StrategyKind::Alternating => last_side.opposite(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TradeSide::{Buy, Sell};

    const CHANGES: [f64; 5] = [-5.0, -2.0, 0.0, 1.0, 5.0];

    fn decisions(kind: StrategyKind, last_side: TradeSide) -> Vec<TradeSide> {
        CHANGES.iter().map(|c| kind.decide(*c, last_side)).collect()
    }

    #[test]
    fn test_mean_reversion_table() {
        let kind = StrategyKind::from_id(1, &SimulationSettings::default());
        assert_eq!(decisions(kind, Buy), vec![Buy, Sell, Sell, Sell, Sell]);
        assert_eq!(decisions(kind, Sell), vec![Buy, Sell, Sell, Sell, Sell]);
    }

    #[test]
    fn test_momentum_table() {
        let kind = StrategyKind::from_id(2, &SimulationSettings::default());
        assert_eq!(decisions(kind, Buy), vec![Sell, Sell, Sell, Buy, Buy]);
    }

    #[test]
    fn test_oscillator_table() {
        let kind = StrategyKind::from_id(3, &SimulationSettings::default());
        // -5 hits the 3% stop loss, +5 hits the 5% take profit, the rest alternate
        assert_eq!(decisions(kind, Buy), vec![Sell, Sell, Sell, Sell, Sell]);
        assert_eq!(decisions(kind, Sell), vec![Sell, Buy, Buy, Buy, Sell]);
    }

    #[test]
    fn test_oscillator_uses_simulation_thresholds() {
        let settings = SimulationSettings {
            stop_loss: Some(1.5),
            take_profit: Some(0.5),
            risk_level: None,
        };
        let kind = StrategyKind::from_id(3, &settings);
        assert_eq!(
            kind,
            StrategyKind::Oscillator {
                stop_loss_pct: 1.5,
                take_profit_pct: 0.5
            }
        );
        assert_eq!(kind.decide(-2.0, Sell), Sell);
        assert_eq!(kind.decide(1.0, Sell), Sell);
        assert_eq!(kind.decide(0.0, Sell), Buy);
    }

    #[test]
    fn test_moving_average_crossover_table() {
        let kind = StrategyKind::from_id(4, &SimulationSettings::default());
        assert_eq!(decisions(kind, Sell), vec![Sell, Sell, Sell, Sell, Buy]);
    }

    #[test]
    fn test_unknown_id_alternates() {
        let kind = StrategyKind::from_id(42, &SimulationSettings::default());
        assert_eq!(kind, StrategyKind::Alternating);
        assert_eq!(decisions(kind, Buy), vec![Sell; 5]);
        assert_eq!(decisions(kind, Sell), vec![Buy; 5]);
    }
}
