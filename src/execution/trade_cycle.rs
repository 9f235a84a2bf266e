use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Instrument;

use super::ledger::Ledger;
use super::lifecycle;
use super::scheduler::Clock;
use super::trade_generator::{propose_trade, TradeProposal};
use crate::models::{Simulation, Trade, TradeSide};
use crate::persistence::SimulationStore;
use crate::{Error, Result};

/// One async mutex per simulation
///
/// Serializes the scheduler tick and manual trades for the same simulation while
/// letting different simulations proceed in parallel.
#[derive(Clone, Default)]
pub struct SimulationLocks {
    inner: Arc<Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SimulationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_simulation(&self, id: u64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }
}

/// What happened to one simulation during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationOutcome {
    Traded { completed: bool },
    NoMarketData,
    AlreadyTicked,
    /// Completed or cancelled between enumeration and processing
    Inactive,
}

/// Counters for one trade-cycle tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub scheduled_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub traded: usize,
    pub completed: usize,
    pub skipped_no_data: usize,
    pub skipped_already_ticked: usize,
    pub skipped_inactive: usize,
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, outcome: &Result<SimulationOutcome>) {
        self.processed += 1;
        match outcome {
            Ok(SimulationOutcome::Traded { completed }) => {
                self.traded += 1;
                if *completed {
                    self.completed += 1;
                }
            }
            Ok(SimulationOutcome::NoMarketData) => self.skipped_no_data += 1,
            Ok(SimulationOutcome::AlreadyTicked) => self.skipped_already_ticked += 1,
            Ok(SimulationOutcome::Inactive) => self.skipped_inactive += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Result of applying one trade to a simulation
#[derive(Debug, Clone)]
pub struct AppliedTrade {
    pub proposal: TradeProposal,
    pub trade: Trade,
    pub ledger: Ledger,
    pub simulation: Simulation,
}

/// Periodic trade generation across all active simulations
#[derive(Clone)]
pub struct TradeCycle {
    store: Arc<dyn SimulationStore>,
    clock: Arc<dyn Clock>,
    locks: SimulationLocks,
    notional: f64,
    simulation_timeout: Duration,
}

impl TradeCycle {
    pub fn new(
        store: Arc<dyn SimulationStore>,
        clock: Arc<dyn Clock>,
        notional: f64,
        simulation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            locks: SimulationLocks::new(),
            notional,
            simulation_timeout,
        }
    }

    /// Share per-simulation locks with another component (the simulation service)
    pub fn with_locks(mut self, locks: SimulationLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &SimulationLocks {
        &self.locks
    }

    pub fn notional(&self) -> f64 {
        self.notional
    }

    /// Run one tick scheduled for `scheduled_at`
    ///
    /// Every active simulation is processed independently: a failure is logged and
    /// counted, the rest of the batch still runs. Running the same tick twice is a no-op
    /// for simulations that already applied it.
    pub async fn run_tick(&self, scheduled_at: DateTime<Utc>) -> Result<TickReport> {
        let tick_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("trade_tick", %tick_id, %scheduled_at);

        async move {
            let active = self.store.active_simulations()?;
            tracing::info!("Running trade cycle for {} active simulations", active.len());

            let mut report = TickReport {
                scheduled_at: Some(scheduled_at),
                ..Default::default()
            };

            for simulation in active {
                let id = simulation.id;
                let outcome = self.process_with_timeout(id, scheduled_at).await;

                match &outcome {
                    Ok(SimulationOutcome::Traded { completed: true }) => {
                        tracing::info!(simulation_id = id, "Simulation completed");
                    }
                    Ok(SimulationOutcome::NoMarketData) => {
                        tracing::warn!(simulation_id = id, "No market data, skipping this tick");
                    }
                    Ok(SimulationOutcome::AlreadyTicked) => {
                        tracing::debug!(simulation_id = id, "Tick already applied");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(simulation_id = id, "Failed to process simulation: {}", e);
                    }
                }

                report.record(&outcome);
            }

            tracing::info!(
                traded = report.traded,
                completed = report.completed,
                skipped = report.skipped_no_data + report.skipped_already_ticked,
                failed = report.failed,
                "Trade cycle finished"
            );

            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn process_with_timeout(
        &self,
        id: u64,
        scheduled_at: DateTime<Utc>,
    ) -> Result<SimulationOutcome> {
        match tokio::time::timeout(self.simulation_timeout, self.process(id, scheduled_at)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::TickTimeout {
                id,
                timeout: self.simulation_timeout,
            }),
        }
    }

    async fn process(&self, id: u64, scheduled_at: DateTime<Utc>) -> Result<SimulationOutcome> {
        let lock = self.locks.for_simulation(id);
        let _guard = lock.lock().await;

        // Reload under the lock; a manual trade or cancellation may have landed meanwhile
        let simulation = self
            .store
            .simulation(id)?
            .ok_or(Error::SimulationNotFound(id))?;

        if !simulation.is_active() {
            return Ok(SimulationOutcome::Inactive);
        }

        if simulation.last_tick_at.is_some_and(|at| at >= scheduled_at) {
            return Ok(SimulationOutcome::AlreadyTicked);
        }

        if self.store.latest_market_data(simulation.symbol_id)?.is_none() {
            return Ok(SimulationOutcome::NoMarketData);
        }

        let applied = self.apply_trade(simulation, None, Some(scheduled_at))?;

        Ok(SimulationOutcome::Traded {
            completed: !applied.simulation.is_active(),
        })
    }

    /// Generate, persist and account for one trade on `simulation`
    ///
    /// Callers must hold the simulation's lock, and every writer of the simulation takes
    /// that lock: the trade insert and the aggregate update are two store calls. A stale
    /// `simulation` is rejected with `Error::VersionConflict` before anything is written.
    /// `tick` marks the scheduled time the trade belongs to; manual trades pass `None`.
    pub fn apply_trade(
        &self,
        mut simulation: Simulation,
        forced_side: Option<TradeSide>,
        tick: Option<DateTime<Utc>>,
    ) -> Result<AppliedTrade> {
        let stored = self
            .store
            .simulation(simulation.id)?
            .ok_or(Error::SimulationNotFound(simulation.id))?;
        if stored.version != simulation.version {
            return Err(Error::VersionConflict {
                id: simulation.id,
                expected: simulation.version,
                found: stored.version,
            });
        }

        let market = self
            .store
            .latest_market_data(simulation.symbol_id)?
            .ok_or(Error::NoMarketData(simulation.symbol_id))?;

        let mut trades = self.store.trades(simulation.id)?;
        trades.reverse();
        let proposal = propose_trade(&simulation, &market, &trades, forced_side, self.notional);

        if let Some(flip) = &proposal.side_override {
            tracing::warn!(
                simulation_id = simulation.id,
                requested = %flip.requested,
                applied = %flip.applied,
                "Side overridden: {:?}",
                flip.reason
            );
        }

        let now = self.clock.now();
        let trade = self.store.insert_trade(proposal.trade.clone(), now)?;

        tracing::info!(
            simulation_id = simulation.id,
            side = %trade.side,
            price = trade.price,
            quantity = trade.quantity,
            amount = trade.amount,
            change_pct = proposal.price_change_pct,
            "Trade executed"
        );

        trades.reverse();
        trades.push(trade.clone());
        let ledger = Ledger::from_trades(&trades, market.close);

        simulation.profit_loss = ledger.profit_loss;
        simulation.profit_loss_percentage = ledger.profit_loss_percentage;
        simulation.total_trades = ledger.total_trades;
        simulation.successful_trades = ledger.successful_trades;
        if let Some(at) = tick {
            simulation.last_tick_at = Some(at);
        }
        lifecycle::apply(&mut simulation, now);

        let simulation = self.store.update_simulation(&simulation)?;

        Ok(AppliedTrade {
            proposal,
            trade,
            ledger,
            simulation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::scheduler::ManualClock;
    use crate::models::{
        DataSource, DurationBucket, NewSymbol, Quote, SimulationSettings, SimulationStatus,
    };
    use crate::persistence::MemoryStore;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn quote(close: f64) -> Quote {
        Quote {
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
            source: DataSource::Fallback,
        }
    }

    fn setup(strategy_id: u32) -> (Arc<MemoryStore>, Arc<ManualClock>, TradeCycle, Simulation) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let cycle = TradeCycle::new(
            store.clone(),
            clock.clone(),
            7500.0,
            Duration::from_secs(5),
        );

        let symbol = store.create_symbol(NewSymbol::from_code("TCS")).unwrap();
        let simulation = store
            .create_simulation(Simulation {
                id: 0,
                user_id: 1,
                symbol_id: symbol.id,
                strategy_id,
                investment: 7500.0,
                timeperiod: DurationBucket::TwentyFourHours,
                interval: "1h".to_string(),
                settings: SimulationSettings::default(),
                start_time: start(),
                end_time: None,
                status: SimulationStatus::Active,
                profit_loss: 0.0,
                profit_loss_percentage: 0.0,
                total_trades: 0,
                successful_trades: 0,
                version: 0,
                last_tick_at: None,
            })
            .unwrap();

        (store, clock, cycle, simulation)
    }

    #[tokio::test]
    async fn test_tick_without_market_data_skips() {
        let (store, _clock, cycle, sim) = setup(1);

        let report = cycle.run_tick(start()).await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped_no_data, 1);
        assert_eq!(report.traded, 0);
        assert!(store.trades(sim.id).unwrap().is_empty());
        let stored = store.simulation(sim.id).unwrap().unwrap();
        assert_eq!(stored.last_tick_at, None);
        assert_eq!(stored.version, sim.version);
    }

    #[tokio::test]
    async fn test_tick_trades_and_updates_aggregates() {
        let (store, clock, cycle, sim) = setup(1);
        store.insert_market_data(sim.symbol_id, quote(100.0), start()).unwrap();

        let report = cycle.run_tick(start()).await.unwrap();
        assert_eq!(report.traded, 1);

        let trades = store.trades(sim.id).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, TradeSide::Buy);
        assert_eq!(trades[0].quantity, 75.0);

        let stored = store.simulation(sim.id).unwrap().unwrap();
        assert_eq!(stored.total_trades, 1);
        assert_eq!(stored.profit_loss, 0.0);
        assert_eq!(stored.last_tick_at, Some(start()));

        // -1.5% is not below -2%, so mean reversion sells; clamped to the 75 held
        let next = clock.advance(chrono::Duration::hours(2));
        store.insert_market_data(sim.symbol_id, quote(98.5), next).unwrap();
        cycle.run_tick(next).await.unwrap();

        let trades = store.trades(sim.id).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].side, TradeSide::Sell);
        assert_eq!(trades[1].quantity, 75.0);
        let stored = store.simulation(sim.id).unwrap().unwrap();
        assert_eq!(stored.total_trades, 2);
        assert_eq!(stored.successful_trades, 0);
    }

    #[tokio::test]
    async fn test_same_tick_twice_is_noop() {
        let (store, _clock, cycle, sim) = setup(2);
        store.insert_market_data(sim.symbol_id, quote(100.0), start()).unwrap();

        cycle.run_tick(start()).await.unwrap();
        let again = cycle.run_tick(start()).await.unwrap();

        assert_eq!(again.skipped_already_ticked, 1);
        assert_eq!(again.traded, 0);
        assert_eq!(store.trades(sim.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completes_after_duration() {
        let (store, clock, cycle, sim) = setup(1);
        store.insert_market_data(sim.symbol_id, quote(100.0), start()).unwrap();

        let end = clock.advance(chrono::Duration::hours(24));
        let report = cycle.run_tick(end).await.unwrap();

        assert_eq!(report.completed, 1);
        let stored = store.simulation(sim.id).unwrap().unwrap();
        assert_eq!(stored.status, SimulationStatus::Completed);
        assert_eq!(stored.end_time, Some(end));

        // Completed simulations are no longer enumerated
        let next = clock.advance(chrono::Duration::hours(2));
        let report = cycle.run_tick(next).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(store.trades(sim.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_simulation_writes_nothing() {
        let (store, _clock, cycle, sim) = setup(1);
        store.insert_market_data(sim.symbol_id, quote(100.0), start()).unwrap();
        store.update_simulation(&sim).unwrap();

        let result = cycle.apply_trade(sim.clone(), None, Some(start()));

        assert!(matches!(
            result,
            Err(Error::VersionConflict { expected: 0, found: 1, .. })
        ));
        assert!(store.trades(sim.id).unwrap().is_empty());
        let stored = store.simulation(sim.id).unwrap().unwrap();
        assert_eq!(stored.total_trades, 0);
        assert_eq!(stored.last_tick_at, None);
    }

    #[tokio::test]
    async fn test_tick_report_serializes_camel_case() {
        let report = TickReport {
            skipped_no_data: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["skippedNoData"], 2);
    }

    #[test]
    fn test_locks_are_shared_per_simulation() {
        let locks = SimulationLocks::new();
        let a = locks.for_simulation(1);
        let b = locks.for_simulation(1);
        let c = locks.for_simulation(2);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
