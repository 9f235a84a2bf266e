use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::SimulationStore;
use crate::error::Error;
use crate::models::{
    MarketData, NewSymbol, NewTrade, Quote, Simulation, SimulationStatus, Symbol, Trade,
};
use crate::Result;

#[derive(Default)]
struct Tables {
    symbols: BTreeMap<u64, Symbol>,
    simulations: BTreeMap<u64, Simulation>,
    trades: BTreeMap<u64, Trade>,
    /// Snapshots per symbol, in insertion (= timestamp) order
    market_data: HashMap<u64, Vec<MarketData>>,
    next_symbol_id: u64,
    next_simulation_id: u64,
    next_trade_id: u64,
    next_market_data_id: u64,
}

impl Tables {
    fn next_id(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }
}

/// Process-local store backed by maps with incrementing ids
///
/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|e| Error::Storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|e| Error::Storage(e.to_string()))
    }
}

impl SimulationStore for MemoryStore {
    fn create_symbol(&self, symbol: NewSymbol) -> Result<Symbol> {
        let mut tables = self.write()?;

        if let Some(existing) = tables
            .symbols
            .values()
            .find(|s| s.symbol.eq_ignore_ascii_case(&symbol.symbol))
        {
            return Ok(existing.clone());
        }

        let id = Tables::next_id(&mut tables.next_symbol_id);
        let stored = Symbol {
            id,
            name: symbol.name,
            symbol: symbol.symbol,
            exchange: symbol.exchange,
            kind: symbol.kind,
            description: symbol.description,
        };
        tables.symbols.insert(id, stored.clone());
        Ok(stored)
    }

    fn symbol(&self, id: u64) -> Result<Option<Symbol>> {
        Ok(self.read()?.symbols.get(&id).cloned())
    }

    fn symbol_by_code(&self, code: &str) -> Result<Option<Symbol>> {
        Ok(self
            .read()?
            .symbols
            .values()
            .find(|s| s.symbol.eq_ignore_ascii_case(code))
            .cloned())
    }

    fn symbols(&self) -> Result<Vec<Symbol>> {
        Ok(self.read()?.symbols.values().cloned().collect())
    }

    fn create_simulation(&self, mut simulation: Simulation) -> Result<Simulation> {
        let mut tables = self.write()?;
        simulation.id = Tables::next_id(&mut tables.next_simulation_id);
        simulation.version = 0;
        tables.simulations.insert(simulation.id, simulation.clone());
        Ok(simulation)
    }

    fn simulation(&self, id: u64) -> Result<Option<Simulation>> {
        Ok(self.read()?.simulations.get(&id).cloned())
    }

    fn simulations_for_user(&self, user_id: u64) -> Result<Vec<Simulation>> {
        Ok(self
            .read()?
            .simulations
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    fn active_simulations(&self) -> Result<Vec<Simulation>> {
        Ok(self
            .read()?
            .simulations
            .values()
            .filter(|s| s.status == SimulationStatus::Active)
            .cloned()
            .collect())
    }

    fn update_simulation(&self, simulation: &Simulation) -> Result<Simulation> {
        let mut tables = self.write()?;
        let stored = tables
            .simulations
            .get_mut(&simulation.id)
            .ok_or(Error::SimulationNotFound(simulation.id))?;

        if stored.version != simulation.version {
            return Err(Error::VersionConflict {
                id: simulation.id,
                expected: simulation.version,
                found: stored.version,
            });
        }

        let mut updated = simulation.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    fn insert_trade(&self, trade: NewTrade, timestamp: DateTime<Utc>) -> Result<Trade> {
        let mut tables = self.write()?;

        if !tables.simulations.contains_key(&trade.simulation_id) {
            return Err(Error::SimulationNotFound(trade.simulation_id));
        }

        let id = Tables::next_id(&mut tables.next_trade_id);
        let stored = Trade {
            id,
            simulation_id: trade.simulation_id,
            side: trade.side,
            price: trade.price,
            quantity: trade.quantity,
            amount: trade.amount,
            timestamp,
            status: trade.status,
        };
        tables.trades.insert(id, stored.clone());
        Ok(stored)
    }

    fn trades(&self, simulation_id: u64) -> Result<Vec<Trade>> {
        let mut trades: Vec<Trade> = self
            .read()?
            .trades
            .values()
            .filter(|t| t.simulation_id == simulation_id)
            .cloned()
            .collect();
        trades.sort_by_key(|t| (t.timestamp, t.id));
        Ok(trades)
    }

    fn recent_trades(&self, user_id: u64, limit: usize) -> Result<Vec<Trade>> {
        let tables = self.read()?;
        let mut trades: Vec<Trade> = tables
            .trades
            .values()
            .filter(|t| {
                tables
                    .simulations
                    .get(&t.simulation_id)
                    .is_some_and(|s| s.user_id == user_id)
            })
            .cloned()
            .collect();
        trades.sort_by_key(|t| std::cmp::Reverse((t.timestamp, t.id)));
        trades.truncate(limit);
        Ok(trades)
    }

    fn insert_market_data(
        &self,
        symbol_id: u64,
        quote: Quote,
        timestamp: DateTime<Utc>,
    ) -> Result<MarketData> {
        let mut tables = self.write()?;
        let id = Tables::next_id(&mut tables.next_market_data_id);
        let data = MarketData {
            id,
            symbol_id,
            timestamp,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            volume: quote.volume,
            source: quote.source,
        };

        let series = tables.market_data.entry(symbol_id).or_default();
        // Keep the series sorted even if an older observation arrives late
        let pos = series.partition_point(|d| d.timestamp <= timestamp);
        series.insert(pos, data.clone());
        Ok(data)
    }

    fn latest_market_data(&self, symbol_id: u64) -> Result<Option<MarketData>> {
        Ok(self
            .read()?
            .market_data
            .get(&symbol_id)
            .and_then(|series| series.last().cloned()))
    }

    fn market_history(&self, symbol_id: u64, limit: usize) -> Result<Vec<MarketData>> {
        Ok(self
            .read()?
            .market_data
            .get(&symbol_id)
            .map(|series| series.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn prune_market_data(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.write()?;
        let mut removed = 0;

        for series in tables.market_data.values_mut() {
            let stale = series.partition_point(|d| d.timestamp < before);
            // Never drop the latest observation for a symbol
            let stale = stale.min(series.len().saturating_sub(1));
            series.drain(..stale);
            removed += stale;
        }

        Ok(removed)
    }
}
