use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::execution::trade_generator::DEFAULT_TRADE_NOTIONAL;
use crate::strategy::{DEFAULT_STOP_LOSS_PCT, DEFAULT_TAKE_PROFIT_PCT};

pub const DEFAULT_CONFIG_PATH: &str = "config/papertrader.toml";
const ENV_PREFIX: &str = "PAPERTRADER";

/// Application configuration
///
/// Layered: built-in defaults, then an optional TOML file, then
/// `PAPERTRADER__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub market: MarketConfig,
    pub trading: TradingConfig,
    pub logging: LoggingConfig,
    /// Symbols refreshed even when no simulation watches them
    #[serde(default)]
    pub watchlist: Vec<String>,
    /// Simulations created at startup by `run`
    #[serde(default)]
    pub simulations: Vec<SeedSimulation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Trade cycle period (cron `0 */2 * * *`)
    pub trade_interval_secs: u64,
    /// Market data refresh period
    pub market_refresh_secs: u64,
    /// Upper bound on one simulation's processing inside a tick
    pub simulation_timeout_secs: u64,
    /// Snapshots older than this are pruned
    pub retention_hours: u64,
    /// Prune every N refresh ticks
    pub prune_every_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trade_interval_secs: 2 * 60 * 60,
            market_refresh_secs: 5 * 60,
            simulation_timeout_secs: 30,
            retention_hours: 48,
            prune_every_ticks: 12,
        }
    }
}

impl SchedulerConfig {
    pub fn trade_interval(&self) -> Duration {
        Duration::from_secs(self.trade_interval_secs)
    }

    pub fn market_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.market_refresh_secs)
    }

    pub fn simulation_timeout(&self) -> Duration {
        Duration::from_secs(self.simulation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub alpha_vantage_api_key: String,
    pub alpha_vantage_base_url: String,
    /// Appended to the symbol for Alpha Vantage quotes, e.g. `.BSE`
    pub alpha_vantage_suffix: String,
    /// Free tier allows 5 calls per minute
    pub alpha_vantage_requests_per_minute: u32,
    pub yahoo_base_url: String,
    /// Appended to the symbol for Yahoo quotes, e.g. `.NS`
    pub yahoo_suffix: String,
    pub request_timeout_secs: u64,
    /// Generate a random-walk snapshot when every upstream fails
    pub synthetic_fallback: bool,
    /// Starting price for symbols with no history at all
    pub synthetic_base_price: f64,
    pub synthetic_seed: Option<u64>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            alpha_vantage_api_key: "demo".to_string(),
            alpha_vantage_base_url: "https://www.alphavantage.co".to_string(),
            alpha_vantage_suffix: ".BSE".to_string(),
            alpha_vantage_requests_per_minute: 5,
            yahoo_base_url: "https://query1.finance.yahoo.com".to_string(),
            yahoo_suffix: ".NS".to_string(),
            request_timeout_secs: 10,
            synthetic_fallback: false,
            synthetic_base_price: 100.0,
            synthetic_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Fixed notional of every generated trade
    pub trade_notional: f64,
    pub default_stop_loss_pct: f64,
    pub default_take_profit_pct: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            trade_notional: DEFAULT_TRADE_NOTIONAL,
            default_stop_loss_pct: DEFAULT_STOP_LOSS_PCT,
            default_take_profit_pct: DEFAULT_TAKE_PROFIT_PCT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "papertrader=info".to_string(),
        }
    }
}

/// Simulation declared in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSimulation {
    pub user_id: u64,
    pub symbol: String,
    pub strategy_id: u32,
    pub investment: f64,
    pub timeperiod: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

fn default_interval() -> String {
    "1h".to_string()
}

impl AppConfig {
    /// Load from defaults, an optional file and the environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("watchlist")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;

        // Same variable the dashboard server reads
        if config.market.alpha_vantage_api_key == "demo" {
            if let Ok(key) = std::env::var("ALPHA_VANTAGE_API_KEY") {
                if !key.is_empty() {
                    config.market.alpha_vantage_api_key = key;
                }
            }
        }

        Ok(config)
    }
}
