// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod persistence;
pub mod service;
pub mod strategy;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::Error;
pub use execution::{MarketDataFeed, TradeCycle};
pub use models::*;
pub use persistence::{MemoryStore, SimulationStore};
pub use service::SimulationService;
pub use strategy::StrategyKind;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
