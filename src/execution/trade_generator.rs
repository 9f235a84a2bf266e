use serde::Serialize;

use crate::models::{MarketData, NewTrade, Simulation, Trade, TradeSide, TradeStatus};
use crate::strategy::StrategyKind;

/// Notional per generated trade when nothing else is configured
pub const DEFAULT_TRADE_NOTIONAL: f64 = 7500.0;

/// Why the proposed side differs from the one requested or decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideReason {
    /// A sell was wanted but no shares are held
    NoSharesHeld,
}

/// Record of a side flip applied to a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SideOverride {
    pub requested: TradeSide,
    pub applied: TradeSide,
    pub reason: OverrideReason,
}

/// Output of the trade decision: the trade to persist and any override that happened
#[derive(Debug, Clone, PartialEq)]
pub struct TradeProposal {
    pub trade: NewTrade,
    pub price_change_pct: f64,
    pub side_override: Option<SideOverride>,
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Shares currently held according to a trade list (any order)
pub fn held_quantity(trades: &[Trade]) -> f64 {
    trades.iter().fold(0.0, |held, t| match t.side {
        TradeSide::Buy => held + t.quantity,
        TradeSide::Sell => held - t.quantity,
    })
}

/// Decide the next trade for a simulation
///
/// # Arguments
/// * `simulation` - Simulation the trade belongs to (strategy id and settings)
/// * `market` - Latest snapshot; its close is the execution price
/// * `previous_trades` - Existing trades, newest first
/// * `forced_side` - Side requested by a manual trigger, used verbatim
/// * `notional` - Fixed trade size in currency units
///
/// Never fails. A sell with nothing to sell becomes a buy and the proposal says so.
pub fn propose_trade(
    simulation: &Simulation,
    market: &MarketData,
    previous_trades: &[Trade],
    forced_side: Option<TradeSide>,
    notional: f64,
) -> TradeProposal {
    let current_price = market.close;

    let last_trade = previous_trades.first();
    let last_price = last_trade.map(|t| t.price).unwrap_or(0.0);
    let price_change_pct = if last_price != 0.0 {
        (current_price - last_price) / last_price * 100.0
    } else {
        0.0
    };

    let requested = match (forced_side, last_trade) {
        (Some(side), _) => side,
        // An initial position has to exist before anything can be sold
        (None, None) => TradeSide::Buy,
        (None, Some(last)) => StrategyKind::from_id(simulation.strategy_id, &simulation.settings)
            .decide(price_change_pct, last.side),
    };

    let full_quantity = quantity_for(notional, current_price);
    let mut side = requested;
    let mut quantity = full_quantity;
    let mut side_override = None;

    if side == TradeSide::Sell {
        let available = round2(held_quantity(previous_trades));
        quantity = quantity.min(available);

        if quantity <= 0.0 {
            side = TradeSide::Buy;
            quantity = full_quantity;
            side_override = Some(SideOverride {
                requested,
                applied: TradeSide::Buy,
                reason: OverrideReason::NoSharesHeld,
            });
        }
    }

    TradeProposal {
        trade: NewTrade {
            simulation_id: simulation.id,
            side,
            price: current_price,
            quantity,
            amount: round2(quantity * current_price),
            status: TradeStatus::Completed,
        },
        price_change_pct,
        side_override,
    }
}

fn quantity_for(notional: f64, price: f64) -> f64 {
    if price > 0.0 && price.is_finite() {
        round2(notional / price)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataSource, DurationBucket, SimulationSettings, SimulationStatus};
    use chrono::{Duration, Utc};

    fn simulation(strategy_id: u32) -> Simulation {
        Simulation {
            id: 1,
            user_id: 1,
            symbol_id: 1,
            strategy_id,
            investment: 7500.0,
            timeperiod: DurationBucket::SixHours,
            interval: "1h".to_string(),
            settings: SimulationSettings::default(),
            start_time: Utc::now(),
            end_time: None,
            status: SimulationStatus::Active,
            profit_loss: 0.0,
            profit_loss_percentage: 0.0,
            total_trades: 0,
            successful_trades: 0,
            version: 0,
            last_tick_at: None,
        }
    }

    fn market(close: f64) -> MarketData {
        MarketData {
            id: 1,
            symbol_id: 1,
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
            source: DataSource::Fallback,
        }
    }

    /// Build a newest-first history from (side, price, quantity), given oldest first
    fn history(entries: &[(TradeSide, f64, f64)]) -> Vec<Trade> {
        let start = Utc::now() - Duration::hours(entries.len() as i64 * 2);
        let mut trades: Vec<Trade> = entries
            .iter()
            .enumerate()
            .map(|(i, (side, price, quantity))| Trade {
                id: i as u64 + 1,
                simulation_id: 1,
                side: *side,
                price: *price,
                quantity: *quantity,
                amount: round2(price * quantity),
                timestamp: start + Duration::hours(i as i64 * 2),
                status: TradeStatus::Completed,
            })
            .collect();
        trades.reverse();
        trades
    }

    #[test]
    fn test_first_trade_is_buy_for_every_strategy() {
        for strategy_id in [1, 2, 3, 4, 99] {
            let proposal = propose_trade(
                &simulation(strategy_id),
                &market(100.0),
                &[],
                None,
                DEFAULT_TRADE_NOTIONAL,
            );
            assert_eq!(proposal.trade.side, TradeSide::Buy, "strategy {}", strategy_id);
            assert_eq!(proposal.trade.quantity, 75.0);
            assert_eq!(proposal.trade.amount, 7500.0);
            assert!(proposal.side_override.is_none());
        }
    }

    #[test]
    fn test_quantity_rounded_to_cents() {
        let proposal = propose_trade(&simulation(1), &market(98.0), &[], None, 7500.0);
        assert_eq!(proposal.trade.quantity, 76.53);
        assert_eq!(proposal.trade.amount, 7499.94);
    }

    #[test]
    fn test_mean_reversion_buys_the_dip() {
        let prev = history(&[(TradeSide::Buy, 100.0, 75.0)]);
        let proposal = propose_trade(&simulation(1), &market(98.5), &prev, None, 7500.0);

        assert!((proposal.price_change_pct + 1.5).abs() < 1e-9);
        assert_eq!(proposal.trade.side, TradeSide::Sell);

        let proposal = propose_trade(&simulation(1), &market(97.9), &prev, None, 7500.0);
        assert!((proposal.price_change_pct + 2.1).abs() < 1e-9);
        assert_eq!(proposal.trade.side, TradeSide::Buy);

        // Strict threshold: 100 -> 98 is exactly -2% and sells, not the buy the
        // two-buy walkthrough expects; that walkthrough is reproduced with 97.9
        let proposal = propose_trade(&simulation(1), &market(98.0), &prev, None, 7500.0);
        assert_eq!(proposal.price_change_pct, -2.0);
        assert_eq!(proposal.trade.side, TradeSide::Sell);
    }

    #[test]
    fn test_sell_is_clamped_to_held_shares() {
        let prev = history(&[(TradeSide::Buy, 100.0, 10.0)]);
        let proposal = propose_trade(&simulation(2), &market(99.0), &prev, None, 7500.0);

        assert_eq!(proposal.trade.side, TradeSide::Sell);
        assert_eq!(proposal.trade.quantity, 10.0);
        assert_eq!(proposal.trade.amount, 990.0);
    }

    #[test]
    fn test_sell_without_shares_becomes_flagged_buy() {
        let prev = history(&[(TradeSide::Buy, 100.0, 75.0), (TradeSide::Sell, 100.0, 75.0)]);
        let proposal = propose_trade(
            &simulation(1),
            &market(100.0),
            &prev,
            Some(TradeSide::Sell),
            7500.0,
        );

        assert_eq!(proposal.trade.side, TradeSide::Buy);
        assert_eq!(proposal.trade.quantity, 75.0);
        assert_eq!(
            proposal.side_override,
            Some(SideOverride {
                requested: TradeSide::Sell,
                applied: TradeSide::Buy,
                reason: OverrideReason::NoSharesHeld,
            })
        );
    }

    #[test]
    fn test_forced_side_is_used_verbatim() {
        let prev = history(&[(TradeSide::Buy, 100.0, 75.0)]);
        // Momentum would sell on a drop; the manual trigger wins
        let proposal = propose_trade(
            &simulation(2),
            &market(90.0),
            &prev,
            Some(TradeSide::Buy),
            7500.0,
        );
        assert_eq!(proposal.trade.side, TradeSide::Buy);
    }

    #[test]
    fn test_oscillator_stop_loss_forces_sell() {
        let mut sim = simulation(3);
        sim.settings.stop_loss = Some(3.0);
        // Last trade was a sell, so alternation alone would buy
        let prev = history(&[(TradeSide::Buy, 100.0, 150.0), (TradeSide::Sell, 100.0, 75.0)]);

        let proposal = propose_trade(&sim, &market(96.0), &prev, None, 7500.0);
        assert!((proposal.price_change_pct + 4.0).abs() < 1e-9);
        assert_eq!(proposal.trade.side, TradeSide::Sell);
        assert!(proposal.side_override.is_none());
    }

    #[test]
    fn test_never_sells_more_than_held() {
        // Walk a price path and feed every proposal back into the history
        let prices = [100.0, 97.0, 104.0, 103.0, 90.0, 91.0, 120.0, 80.0, 80.0, 81.0];

        for strategy_id in [1, 2, 3, 4, 7] {
            let sim = simulation(strategy_id);
            let mut trades: Vec<Trade> = Vec::new();

            for (i, price) in prices.iter().enumerate() {
                let proposal = propose_trade(&sim, &market(*price), &trades, None, 7500.0);
                let t = proposal.trade;
                trades.insert(
                    0,
                    Trade {
                        id: i as u64 + 1,
                        simulation_id: t.simulation_id,
                        side: t.side,
                        price: t.price,
                        quantity: t.quantity,
                        amount: t.amount,
                        timestamp: Utc::now(),
                        status: t.status,
                    },
                );
                assert!(
                    held_quantity(&trades) > -1e-9,
                    "strategy {} went short at step {}",
                    strategy_id,
                    i
                );
            }
        }
    }

    #[test]
    fn test_zero_price_does_not_panic() {
        let proposal = propose_trade(&simulation(1), &market(0.0), &[], None, 7500.0);
        assert_eq!(proposal.trade.quantity, 0.0);
        assert_eq!(proposal.trade.amount, 0.0);
    }
}
