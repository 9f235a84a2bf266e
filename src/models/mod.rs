use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A tradable instrument known to the registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Symbol {
    pub id: u64,
    pub name: String,
    pub symbol: String,
    pub exchange: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: Option<String>,
}

/// Payload for registering a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSymbol {
    pub name: String,
    pub symbol: String,
    pub exchange: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: Option<String>,
}

impl NewSymbol {
    /// Defaults used when a code is registered without upstream metadata
    pub fn from_code(code: &str) -> Self {
        Self {
            name: code.to_string(),
            symbol: code.to_uppercase(),
            exchange: "NSE/BSE".to_string(),
            kind: "Equity".to_string(),
            description: None,
        }
    }
}

/// Which upstream produced a market data snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataSource {
    #[serde(rename = "Alpha Vantage")]
    AlphaVantage,
    #[serde(rename = "Yahoo Finance")]
    YahooFinance,
    #[serde(rename = "fallback")]
    Fallback,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::AlphaVantage => write!(f, "Alpha Vantage"),
            DataSource::YahooFinance => write!(f, "Yahoo Finance"),
            DataSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// OHLCV bar as returned by a quote provider, before it is stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub source: DataSource,
}

/// Stored market data observation for a symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketData {
    pub id: u64,
    pub symbol_id: u64,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub source: DataSource,
}

/// Read-only strategy catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub time_frame: String,
    pub success_rate: String,
    pub best_market_condition: String,
    pub risk_rating: String,
}

/// Trade side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn opposite(self) -> Self {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for TradeSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(Error::Validation(format!("unknown trade type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Completed,
}

/// Synthetic trade generated for a simulation. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u64,
    pub simulation_id: u64,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub status: TradeStatus,
}

/// Trade that has been decided on but not persisted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub simulation_id: u64,
    pub side: TradeSide,
    pub price: f64,
    pub quantity: f64,
    pub amount: f64,
    pub status: TradeStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    Active,
    Completed,
    Cancelled,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationStatus::Active => write!(f, "active"),
            SimulationStatus::Completed => write!(f, "completed"),
            SimulationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Fixed set of simulation lengths offered to users
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DurationBucket {
    #[serde(rename = "6 Hours")]
    SixHours,
    #[serde(rename = "12 Hours")]
    TwelveHours,
    #[serde(rename = "24 Hours")]
    TwentyFourHours,
    #[serde(rename = "3 Days")]
    ThreeDays,
    #[serde(rename = "1 Week")]
    OneWeek,
    #[serde(rename = "2 Weeks")]
    TwoWeeks,
}

impl DurationBucket {
    pub const ALL: [DurationBucket; 6] = [
        DurationBucket::SixHours,
        DurationBucket::TwelveHours,
        DurationBucket::TwentyFourHours,
        DurationBucket::ThreeDays,
        DurationBucket::OneWeek,
        DurationBucket::TwoWeeks,
    ];

    pub fn duration(self) -> Duration {
        match self {
            DurationBucket::SixHours => Duration::hours(6),
            DurationBucket::TwelveHours => Duration::hours(12),
            DurationBucket::TwentyFourHours => Duration::hours(24),
            DurationBucket::ThreeDays => Duration::days(3),
            DurationBucket::OneWeek => Duration::days(7),
            DurationBucket::TwoWeeks => Duration::days(14),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DurationBucket::SixHours => "6 Hours",
            DurationBucket::TwelveHours => "12 Hours",
            DurationBucket::TwentyFourHours => "24 Hours",
            DurationBucket::ThreeDays => "3 Days",
            DurationBucket::OneWeek => "1 Week",
            DurationBucket::TwoWeeks => "2 Weeks",
        }
    }
}

impl fmt::Display for DurationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DurationBucket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DurationBucket::ALL
            .into_iter()
            .find(|b| b.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown time period '{}'", s)))
    }
}

/// Per-simulation strategy knobs (percentages)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSettings {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_level: Option<String>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            stop_loss: None,
            take_profit: None,
            risk_level: Some("Medium".to_string()),
        }
    }
}

/// A user-configured, time-boxed paper trading run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub id: u64,
    pub user_id: u64,
    pub symbol_id: u64,
    pub strategy_id: u32,
    pub investment: f64,
    pub timeperiod: DurationBucket,
    pub interval: String,
    pub settings: SimulationSettings,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SimulationStatus,
    pub profit_loss: f64,
    pub profit_loss_percentage: f64,
    pub total_trades: u32,
    pub successful_trades: u32,
    pub version: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl Simulation {
    pub fn is_active(&self) -> bool {
        self.status == SimulationStatus::Active
    }

    /// Move out of `active`, stamping `end_time`. Terminal states never transition again.
    pub fn transition(&mut self, to: SimulationStatus, at: DateTime<Utc>) -> crate::Result<()> {
        if !self.is_active() || to == SimulationStatus::Active {
            return Err(Error::SimulationInactive {
                id: self.id,
                status: self.status,
            });
        }

        self.status = to;
        self.end_time = Some(at);
        Ok(())
    }

    /// Elapsed share of the configured duration, capped at 100
    pub fn progress(&self, now: DateTime<Utc>) -> u8 {
        let total = self.timeperiod.duration().num_seconds().max(1);
        let elapsed = (now - self.start_time).num_seconds().max(0);
        ((elapsed * 100 / total).min(100)) as u8
    }
}

/// Request to start a simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSimulation {
    pub user_id: u64,
    pub symbol_id: u64,
    pub strategy_id: u32,
    pub investment: f64,
    pub timeperiod: String,
    pub interval: String,
    #[serde(default)]
    pub settings: SimulationSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_simulation() -> Simulation {
        Simulation {
            id: 1,
            user_id: 1,
            symbol_id: 1,
            strategy_id: 1,
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

    #[test]
    fn test_simulation_json_field_names() {
        let json = serde_json::to_value(sample_simulation()).unwrap();

        for field in [
            "id",
            "userId",
            "symbolId",
            "strategyId",
            "investment",
            "startTime",
            "endTime",
            "status",
            "timeperiod",
            "interval",
            "profitLoss",
            "profitLossPercentage",
            "totalTrades",
            "successfulTrades",
        ] {
            assert!(json.get(field).is_some(), "missing field {}", field);
        }
        assert_eq!(json["timeperiod"], "6 Hours");
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_trade_serializes_type_field() {
        let trade = Trade {
            id: 3,
            simulation_id: 1,
            side: TradeSide::Sell,
            price: 100.0,
            quantity: 1.5,
            amount: 150.0,
            timestamp: Utc::now(),
            status: TradeStatus::Completed,
        };

        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["type"], "sell");
        assert_eq!(json["simulationId"], 1);
        assert_eq!(json["status"], "completed");
    }

    #[test]
    fn test_duration_bucket_parse() {
        assert_eq!("24 Hours".parse::<DurationBucket>().unwrap(), DurationBucket::TwentyFourHours);
        assert_eq!("2 weeks".parse::<DurationBucket>().unwrap(), DurationBucket::TwoWeeks);
        assert!("5 Minutes".parse::<DurationBucket>().is_err());
        assert_eq!(DurationBucket::ThreeDays.duration(), Duration::hours(72));
    }

    #[test]
    fn test_transition_stamps_end_time_once() {
        let mut sim = sample_simulation();
        let now = Utc::now();

        sim.transition(SimulationStatus::Cancelled, now).unwrap();
        assert_eq!(sim.status, SimulationStatus::Cancelled);
        assert_eq!(sim.end_time, Some(now));

        // Terminal states have no further transitions
        assert!(sim.transition(SimulationStatus::Completed, now).is_err());
        assert_eq!(sim.status, SimulationStatus::Cancelled);
    }

    #[test]
    fn test_progress_is_capped() {
        let mut sim = sample_simulation();
        sim.start_time = Utc::now() - Duration::hours(3);
        let progress = sim.progress(Utc::now());
        assert!((49..=50).contains(&progress));

        sim.start_time = Utc::now() - Duration::days(2);
        assert_eq!(sim.progress(Utc::now()), 100);
    }

    #[test]
    fn test_trade_side_parse() {
        assert_eq!("BUY".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert!("hold".parse::<TradeSide>().is_err());
        assert_eq!(TradeSide::Buy.opposite(), TradeSide::Sell);
    }
}
