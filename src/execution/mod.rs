// Trade generation, accounting and scheduling
pub mod ledger;
pub mod lifecycle;
pub mod price_feed;
pub mod scheduler;
pub mod trade_cycle;
pub mod trade_generator;

pub use ledger::Ledger;
pub use lifecycle::LifecycleDecision;
pub use price_feed::{MarketDataFeed, QuoteProvider, RefreshReport};
pub use scheduler::{Clock, ManualClock, RecurringTask, SystemClock};
pub use trade_cycle::{AppliedTrade, SimulationLocks, TickReport, TradeCycle};
pub use trade_generator::{propose_trade, OverrideReason, SideOverride, TradeProposal};
