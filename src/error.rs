use crate::models::SimulationStatus;
use std::time::Duration;

/// Errors surfaced by the simulation core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or invalid simulation / trade payload
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("simulation {0} not found")]
    SimulationNotFound(u64),

    #[error("symbol {0} not found")]
    SymbolNotFound(String),

    #[error("strategy {0} not found")]
    StrategyNotFound(u32),

    #[error("simulation {id} is {status}, expected active")]
    SimulationInactive { id: u64, status: SimulationStatus },

    #[error("simulation {simulation_id} does not belong to user {user_id}")]
    Forbidden { simulation_id: u64, user_id: u64 },

    /// Compare-and-swap on the simulation version failed
    #[error("simulation {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict { id: u64, expected: u64, found: u64 },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("no market data available for symbol {0}")]
    NoMarketData(u64),

    #[error("processing simulation {id} timed out after {timeout:?}")]
    TickTimeout { id: u64, timeout: Duration },

    #[error("market data request failed: {0}")]
    MarketData(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Whether the caller sent something we refuse to act on (as opposed to a runtime failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::SimulationNotFound(_)
                | Error::SymbolNotFound(_)
                | Error::StrategyNotFound(_)
                | Error::SimulationInactive { .. }
                | Error::Forbidden { .. }
        )
    }
}
