use serde::{Deserialize, Serialize};

use crate::models::{Trade, TradeSide};

/// Aggregate position and P&L for one simulation
///
/// Derived from the full trade list and the latest close. Recomputing from the same
/// inputs always yields the same values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub total_invested: f64,
    pub total_shares: f64,
    pub current_value: f64,
    pub profit_loss: f64,
    pub profit_loss_percentage: f64,
    pub total_trades: u32,
    /// Sells executed above the price of the most recent preceding buy
    pub successful_trades: u32,
}

impl Ledger {
    /// Fold a chronological (oldest first) trade list
    pub fn from_trades(trades: &[Trade], latest_close: f64) -> Self {
        let mut total_invested = 0.0;
        let mut total_shares = 0.0;
        let mut successful_trades = 0;
        let mut last_buy_price: Option<f64> = None;

        for trade in trades {
            match trade.side {
                TradeSide::Buy => {
                    total_invested += trade.amount;
                    total_shares += trade.quantity;
                    last_buy_price = Some(trade.price);
                }
                TradeSide::Sell => {
                    total_invested -= trade.amount;
                    total_shares -= trade.quantity;
                    if last_buy_price.is_some_and(|buy| trade.price > buy) {
                        successful_trades += 1;
                    }
                }
            }
        }

        let current_value = total_shares * latest_close;
        let profit_loss = current_value - total_invested;

        // Nothing (net) invested: report 0% instead of dividing by zero
        let profit_loss_percentage = if total_invested > 0.0 {
            profit_loss / total_invested * 100.0
        } else {
            0.0
        };

        Self {
            total_invested,
            total_shares,
            current_value,
            profit_loss,
            profit_loss_percentage,
            total_trades: trades.len() as u32,
            successful_trades,
        }
    }

    /// Share of trades counted as successful, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.successful_trades as f64 / self.total_trades as f64 * 100.0
    }
}
