// User-facing operations on simulations
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::execution::ledger::Ledger;
use crate::execution::scheduler::Clock;
use crate::execution::trade_cycle::{AppliedTrade, TradeCycle};
use crate::execution::trade_generator::round2;
use crate::models::{
    DurationBucket, NewSimulation, NewSymbol, NewTrade, Simulation, SimulationStatus, Strategy,
    Symbol, Trade, TradeSide, TradeStatus,
};
use crate::persistence::SimulationStore;
use crate::strategy::{strategy_by_id, strategy_catalog};
use crate::{Error, Result};

/// Trades returned when the caller does not ask for a specific count
pub const DEFAULT_RECENT_TRADES: usize = 10;

/// A simulation together with what it trades and how
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDetails {
    #[serde(flatten)]
    pub simulation: Simulation,
    pub symbol: Symbol,
    pub strategy: Strategy,
    /// Elapsed share of the configured duration, 0-100
    pub progress: u8,
}

/// Entry point for starting, inspecting and steering simulations
///
/// Shares per-simulation locks with the trade cycle, so a manual trade or a
/// cancellation never interleaves with a scheduler tick on the same simulation.
pub struct SimulationService {
    store: Arc<dyn SimulationStore>,
    clock: Arc<dyn Clock>,
    cycle: TradeCycle,
}

impl SimulationService {
    pub fn new(store: Arc<dyn SimulationStore>, clock: Arc<dyn Clock>, cycle: TradeCycle) -> Self {
        Self {
            store,
            clock,
            cycle,
        }
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    /// Register a symbol; registering an existing code returns the stored one
    pub fn register_symbol(&self, symbol: NewSymbol) -> Result<Symbol> {
        let code = symbol.symbol.trim().to_uppercase();
        if code.is_empty() {
            return Err(Error::Validation("symbol code must not be empty".into()));
        }
        self.store.create_symbol(NewSymbol {
            symbol: code,
            ..symbol
        })
    }

    pub fn symbol_by_code(&self, code: &str) -> Result<Symbol> {
        self.store
            .symbol_by_code(code.trim())?
            .ok_or_else(|| Error::SymbolNotFound(code.to_string()))
    }

    pub fn symbols(&self) -> Result<Vec<Symbol>> {
        self.store.symbols()
    }

    // ------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------

    pub fn strategies(&self) -> &'static [Strategy] {
        strategy_catalog()
    }

    pub fn strategy(&self, id: u32) -> Result<&'static Strategy> {
        strategy_by_id(id).ok_or(Error::StrategyNotFound(id))
    }

    // ------------------------------------------------------------------
    // Simulations
    // ------------------------------------------------------------------

    /// Validate and create a simulation, opening the initial position when a price is known
    pub async fn start_simulation(&self, request: NewSimulation) -> Result<SimulationDetails> {
        let timeperiod = validate(&request)?;

        let symbol = self
            .store
            .symbol(request.symbol_id)?
            .ok_or_else(|| Error::SymbolNotFound(request.symbol_id.to_string()))?;
        let strategy = self.strategy(request.strategy_id)?.clone();

        let now = self.clock.now();
        let simulation = self.store.create_simulation(Simulation {
            id: 0,
            user_id: request.user_id,
            symbol_id: symbol.id,
            strategy_id: request.strategy_id,
            investment: request.investment,
            timeperiod,
            interval: request.interval.trim().to_string(),
            settings: request.settings,
            start_time: now,
            end_time: None,
            status: SimulationStatus::Active,
            profit_loss: 0.0,
            profit_loss_percentage: 0.0,
            total_trades: 0,
            successful_trades: 0,
            version: 0,
            last_tick_at: None,
        })?;

        tracing::info!(
            simulation_id = simulation.id,
            user_id = simulation.user_id,
            symbol = %symbol.symbol,
            strategy = %strategy.name,
            timeperiod = %simulation.timeperiod,
            "Simulation started"
        );

        // A tick may win this lock first; open_position reloads and checks for that
        let lock = self.cycle.locks().for_simulation(simulation.id);
        let _guard = lock.lock().await;

        let simulation = match self.open_position(simulation.id, now) {
            Ok(simulation) => simulation,
            Err(e) => {
                self.abandon(simulation.id, now, &e);
                return Err(e);
            }
        };

        Ok(SimulationDetails {
            progress: simulation.progress(now),
            simulation,
            symbol,
            strategy,
        })
    }

    /// Buy the initial position; callers hold the simulation's lock
    fn open_position(&self, id: u64, now: DateTime<Utc>) -> Result<Simulation> {
        let mut simulation = self
            .store
            .simulation(id)?
            .ok_or(Error::SimulationNotFound(id))?;

        if simulation.total_trades > 0 || !self.store.trades(id)?.is_empty() {
            tracing::debug!(simulation_id = id, "Position already opened by the trade cycle");
            return Ok(simulation);
        }

        let Some(market) = self.store.latest_market_data(simulation.symbol_id)? else {
            tracing::warn!(
                simulation_id = id,
                "No market data yet, initial position deferred to the first tick"
            );
            return Ok(simulation);
        };
        if market.close <= 0.0 {
            return Ok(simulation);
        }

        let quantity = round2(simulation.investment / market.close);
        let trade = self.store.insert_trade(
            NewTrade {
                simulation_id: id,
                side: TradeSide::Buy,
                price: market.close,
                quantity,
                amount: round2(quantity * market.close),
                status: TradeStatus::Completed,
            },
            now,
        )?;

        let ledger = Ledger::from_trades(std::slice::from_ref(&trade), market.close);
        simulation.profit_loss = ledger.profit_loss;
        simulation.profit_loss_percentage = ledger.profit_loss_percentage;
        simulation.total_trades = ledger.total_trades;
        simulation.successful_trades = ledger.successful_trades;

        tracing::info!(
            simulation_id = id,
            price = trade.price,
            quantity = trade.quantity,
            "Opened initial position"
        );

        self.store.update_simulation(&simulation)
    }

    /// Cancel a simulation whose start failed so no tick picks it up
    fn abandon(&self, id: u64, now: DateTime<Utc>, cause: &Error) {
        tracing::error!(simulation_id = id, "Failed to open initial position: {}", cause);

        let cancelled = self
            .store
            .simulation(id)
            .and_then(|found| found.ok_or(Error::SimulationNotFound(id)))
            .and_then(|mut simulation| {
                if simulation.is_active() {
                    simulation.transition(SimulationStatus::Cancelled, now)?;
                    self.store.update_simulation(&simulation)?;
                }
                Ok(())
            });

        if let Err(e) = cancelled {
            tracing::error!(simulation_id = id, "Failed to cancel abandoned simulation: {}", e);
        }
    }

    /// Stop an active simulation on behalf of its owner
    pub async fn cancel_simulation(&self, user_id: u64, id: u64) -> Result<Simulation> {
        let lock = self.cycle.locks().for_simulation(id);
        let _guard = lock.lock().await;

        let mut simulation = self.owned_simulation(user_id, id)?;
        simulation.transition(SimulationStatus::Cancelled, self.clock.now())?;
        let simulation = self.store.update_simulation(&simulation)?;

        tracing::info!(simulation_id = id, user_id, "Simulation cancelled");
        Ok(simulation)
    }

    /// Trade immediately instead of waiting for the next tick
    ///
    /// `side` forces buy or sell; `None` lets the strategy decide. A forced sell with no
    /// shares held is turned into a buy and reported in `proposal.side_override`.
    pub async fn place_manual_trade(
        &self,
        user_id: u64,
        id: u64,
        side: Option<TradeSide>,
    ) -> Result<AppliedTrade> {
        let lock = self.cycle.locks().for_simulation(id);
        let _guard = lock.lock().await;

        let simulation = self.owned_simulation(user_id, id)?;
        if !simulation.is_active() {
            return Err(Error::SimulationInactive {
                id,
                status: simulation.status,
            });
        }

        self.cycle.apply_trade(simulation, side, None)
    }

    pub fn simulation(&self, user_id: u64, id: u64) -> Result<SimulationDetails> {
        let simulation = self.owned_simulation(user_id, id)?;
        let symbol = self
            .store
            .symbol(simulation.symbol_id)?
            .ok_or_else(|| Error::SymbolNotFound(simulation.symbol_id.to_string()))?;
        let strategy = self.strategy(simulation.strategy_id)?.clone();

        Ok(SimulationDetails {
            progress: simulation.progress(self.clock.now()),
            simulation,
            symbol,
            strategy,
        })
    }

    pub fn simulations_for_user(&self, user_id: u64) -> Result<Vec<Simulation>> {
        self.store.simulations_for_user(user_id)
    }

    pub fn active_simulations_for_user(&self, user_id: u64) -> Result<Vec<Simulation>> {
        let mut simulations = self.store.simulations_for_user(user_id)?;
        simulations.retain(Simulation::is_active);
        Ok(simulations)
    }

    /// Trades of one simulation, oldest first
    pub fn simulation_trades(&self, user_id: u64, id: u64) -> Result<Vec<Trade>> {
        self.owned_simulation(user_id, id)?;
        self.store.trades(id)
    }

    /// Newest trades across the user's simulations; `limit` 0 means the default
    pub fn recent_trades_for_user(&self, user_id: u64, limit: usize) -> Result<Vec<Trade>> {
        let limit = if limit == 0 { DEFAULT_RECENT_TRADES } else { limit };
        self.store.recent_trades(user_id, limit)
    }

    fn owned_simulation(&self, user_id: u64, id: u64) -> Result<Simulation> {
        let simulation = self
            .store
            .simulation(id)?
            .ok_or(Error::SimulationNotFound(id))?;
        if simulation.user_id != user_id {
            return Err(Error::Forbidden {
                simulation_id: id,
                user_id,
            });
        }
        Ok(simulation)
    }
}

fn validate(request: &NewSimulation) -> Result<DurationBucket> {
    if !request.investment.is_finite() || request.investment <= 0.0 {
        return Err(Error::Validation(format!(
            "investment must be a positive amount, got {}",
            request.investment
        )));
    }

    if request.interval.trim().is_empty() {
        return Err(Error::Validation("interval must not be empty".into()));
    }

    for (name, value) in [
        ("stopLoss", request.settings.stop_loss),
        ("takeProfit", request.settings.take_profit),
    ] {
        if let Some(pct) = value {
            if !pct.is_finite() || pct <= 0.0 {
                return Err(Error::Validation(format!(
                    "{} must be a positive percentage, got {}",
                    name, pct
                )));
            }
        }
    }

    request.timeperiod.parse()
}
