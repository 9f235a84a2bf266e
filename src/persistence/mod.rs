// Storage for simulations, trades, symbols and market data
pub mod memory;

use chrono::{DateTime, Utc};

use crate::models::{MarketData, NewSymbol, NewTrade, Quote, Simulation, Symbol, Trade};
use crate::Result;

pub use memory::MemoryStore;

/// Repository used by the trade cycle, the market data feed and the simulation service
///
/// Implementations assign ids. `update_simulation` is a compare-and-swap on
/// `Simulation::version`: it fails with `Error::VersionConflict` when the stored
/// version differs from the one passed in, and bumps the version on success.
pub trait SimulationStore: Send + Sync {
    // Symbols
    fn create_symbol(&self, symbol: NewSymbol) -> Result<Symbol>;
    fn symbol(&self, id: u64) -> Result<Option<Symbol>>;
    /// Case-insensitive lookup by ticker code
    fn symbol_by_code(&self, code: &str) -> Result<Option<Symbol>>;
    fn symbols(&self) -> Result<Vec<Symbol>>;

    // Simulations
    /// Store a new simulation; `id` and `version` on the input are ignored
    fn create_simulation(&self, simulation: Simulation) -> Result<Simulation>;
    fn simulation(&self, id: u64) -> Result<Option<Simulation>>;
    fn simulations_for_user(&self, user_id: u64) -> Result<Vec<Simulation>>;
    /// Active simulations across all users, ordered by id
    fn active_simulations(&self) -> Result<Vec<Simulation>>;
    fn update_simulation(&self, simulation: &Simulation) -> Result<Simulation>;

    // Trades
    fn insert_trade(&self, trade: NewTrade, timestamp: DateTime<Utc>) -> Result<Trade>;
    /// Trades of a simulation, oldest first
    fn trades(&self, simulation_id: u64) -> Result<Vec<Trade>>;
    /// Most recent trades across a user's simulations, newest first
    fn recent_trades(&self, user_id: u64, limit: usize) -> Result<Vec<Trade>>;

    // Market data
    fn insert_market_data(
        &self,
        symbol_id: u64,
        quote: Quote,
        timestamp: DateTime<Utc>,
    ) -> Result<MarketData>;
    fn latest_market_data(&self, symbol_id: u64) -> Result<Option<MarketData>>;
    /// Up to `limit` snapshots, newest first
    fn market_history(&self, symbol_id: u64, limit: usize) -> Result<Vec<MarketData>>;
    /// Drop snapshots older than `before`, keeping at least the latest one per symbol
    fn prune_market_data(&self, before: DateTime<Utc>) -> Result<usize>;
}
