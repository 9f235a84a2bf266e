use crate::models::Strategy;
use std::sync::OnceLock;

static CATALOG: OnceLock<Vec<Strategy>> = OnceLock::new();

/// The fixed strategy catalog, ids 1 through 4
pub fn strategy_catalog() -> &'static [Strategy] {
    CATALOG.get_or_init(|| {
        vec![
            entry(
                1,
                "Mean Reversion",
                "Assumes prices eventually move back towards their average. Trades when the \
                 price deviates too far from the mean, expecting it to revert.",
                "65% - 75%",
                "Ranging/Sideways markets",
                "Medium",
            ),
            entry(
                2,
                "Momentum Trading",
                "Follows existing market trends. Buys assets that have been rising and sells \
                 those that have been declining.",
                "60% - 70%",
                "Trending markets",
                "High",
            ),
            entry(
                3,
                "RSI Strategy",
                "Uses overbought and oversold conditions. Exits on stop loss or take profit \
                 and otherwise alternates between entries and exits.",
                "65% - 70%",
                "Volatile markets",
                "Medium",
            ),
            entry(
                4,
                "Moving Average Crossover",
                "Buys when the short-term trend moves above the long-term trend and sells \
                 when it falls below.",
                "55% - 65%",
                "Trending markets",
                "Medium",
            ),
        ]
    })
}

pub fn strategy_by_id(id: u32) -> Option<&'static Strategy> {
    strategy_catalog().iter().find(|s| s.id == id)
}

fn entry(
    id: u32,
    name: &str,
    description: &str,
    success_rate: &str,
    best_market_condition: &str,
    risk_rating: &str,
) -> Strategy {
    Strategy {
        id,
        name: name.to_string(),
        description: description.to_string(),
        time_frame: "Hourly data, 2-hour trades".to_string(),
        success_rate: success_rate.to_string(),
        best_market_condition: best_market_condition.to_string(),
        risk_rating: risk_rating.to_string(),
    }
}
