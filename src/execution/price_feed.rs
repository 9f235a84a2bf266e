use super::scheduler::Clock;
use crate::api::{AlphaVantageClient, SyntheticQuotes, YahooFinanceClient};
use crate::config::MarketConfig;
use crate::models::{MarketData, NewSymbol, Quote, Symbol};
use crate::persistence::SimulationStore;
use crate::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One link in the quote provider chain
pub enum QuoteProvider {
    AlphaVantage(AlphaVantageClient),
    Yahoo(YahooFinanceClient),
    Synthetic(Arc<SyntheticQuotes>),
}

impl QuoteProvider {
    pub fn name(&self) -> &'static str {
        match self {
            QuoteProvider::AlphaVantage(_) => "alpha_vantage",
            QuoteProvider::Yahoo(_) => "yahoo",
            QuoteProvider::Synthetic(_) => "synthetic",
        }
    }

    async fn fetch(&self, code: &str, previous_close: Option<f64>) -> Result<Option<Quote>> {
        match self {
            QuoteProvider::AlphaVantage(client) => client.global_quote(code).await,
            QuoteProvider::Yahoo(client) => client.latest_quote(code).await,
            QuoteProvider::Synthetic(quotes) => Ok(Some(quotes.next_quote(previous_close))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub refreshed: usize,
    /// Symbols no provider had a quote for
    pub unavailable: usize,
    pub pruned: usize,
}

/// Keeps the market data cache warm for every watched symbol
///
/// Providers are tried in order; the first quote wins. Upstream failures are logged and
/// never surface to the trade cycle, which only ever sees what made it into the store.
pub struct MarketDataFeed {
    store: Arc<dyn SimulationStore>,
    clock: Arc<dyn Clock>,
    providers: Vec<QuoteProvider>,
    watchlist: Vec<String>,
    retention: chrono::Duration,
    prune_every_ticks: u32,
    tick_count: AtomicU32,
}

impl MarketDataFeed {
    pub fn new(
        store: Arc<dyn SimulationStore>,
        clock: Arc<dyn Clock>,
        providers: Vec<QuoteProvider>,
    ) -> Self {
        Self {
            store,
            clock,
            providers,
            watchlist: Vec::new(),
            retention: chrono::Duration::hours(48),
            prune_every_ticks: 12,
            tick_count: AtomicU32::new(0),
        }
    }

    /// Alpha Vantage, then Yahoo, then the synthetic walk when enabled
    pub fn from_config(
        store: Arc<dyn SimulationStore>,
        clock: Arc<dyn Clock>,
        config: &MarketConfig,
    ) -> Result<Self> {
        let mut providers = vec![
            QuoteProvider::AlphaVantage(AlphaVantageClient::new(config)?),
            QuoteProvider::Yahoo(YahooFinanceClient::new(config)?),
        ];

        if config.synthetic_fallback {
            let quotes = match config.synthetic_seed {
                Some(seed) => SyntheticQuotes::new(seed, config.synthetic_base_price),
                None => SyntheticQuotes::from_entropy(config.synthetic_base_price),
            };
            providers.push(QuoteProvider::Synthetic(Arc::new(quotes)));
        }

        Ok(Self::new(store, clock, providers))
    }

    pub fn with_watchlist(mut self, watchlist: Vec<String>) -> Self {
        self.watchlist = watchlist;
        self
    }

    pub fn with_retention(mut self, retention_hours: u64, prune_every_ticks: u32) -> Self {
        self.retention = chrono::Duration::hours(retention_hours as i64);
        self.prune_every_ticks = prune_every_ticks.max(1);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.iter().map(|p| p.name())
    }

    /// Walk the provider chain for one symbol
    pub async fn fetch_quote(&self, symbol: &Symbol) -> Result<Option<Quote>> {
        let previous_close = self
            .store
            .latest_market_data(symbol.id)?
            .map(|data| data.close);

        for provider in &self.providers {
            match provider.fetch(&symbol.symbol, previous_close).await {
                Ok(Some(quote)) => return Ok(Some(quote)),
                Ok(None) => {
                    tracing::debug!(
                        symbol = %symbol.symbol,
                        provider = provider.name(),
                        "No quote, trying next provider"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        symbol = %symbol.symbol,
                        provider = provider.name(),
                        "Quote fetch failed: {}",
                        e
                    );
                }
            }
        }

        Ok(None)
    }

    /// Fetch and store a fresh snapshot for one symbol
    pub async fn refresh_symbol(&self, symbol: &Symbol) -> Result<Option<MarketData>> {
        let Some(quote) = self.fetch_quote(symbol).await? else {
            tracing::warn!(symbol = %symbol.symbol, "No market data from any provider");
            return Ok(None);
        };

        let data = self
            .store
            .insert_market_data(symbol.id, quote, self.clock.now())?;

        tracing::info!(
            symbol = %symbol.symbol,
            close = data.close,
            source = %data.source,
            "Stored market data"
        );

        Ok(Some(data))
    }

    /// Symbols referenced by active simulations plus the watchlist, deduplicated
    pub fn watched_symbols(&self) -> Result<Vec<Symbol>> {
        let mut ids = BTreeSet::new();
        for simulation in self.store.active_simulations()? {
            ids.insert(simulation.symbol_id);
        }
        for code in &self.watchlist {
            let symbol = self.store.create_symbol(NewSymbol::from_code(code))?;
            ids.insert(symbol.id);
        }

        let mut symbols = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.symbol(id)? {
                Some(symbol) => symbols.push(symbol),
                None => tracing::warn!(symbol_id = id, "Simulation references unknown symbol"),
            }
        }
        Ok(symbols)
    }

    pub async fn refresh_all(&self) -> Result<RefreshReport> {
        let symbols = self.watched_symbols()?;
        let mut report = RefreshReport::default();

        for symbol in &symbols {
            match self.refresh_symbol(symbol).await {
                Ok(Some(_)) => report.refreshed += 1,
                Ok(None) => report.unavailable += 1,
                Err(e) => {
                    tracing::error!(symbol = %symbol.symbol, "Failed to store market data: {}", e);
                    report.unavailable += 1;
                }
            }
        }

        Ok(report)
    }

    /// Drop snapshots older than the retention window
    pub fn prune(&self) -> Result<usize> {
        let cutoff = self.clock.now() - self.retention;
        let pruned = self.store.prune_market_data(cutoff)?;
        if pruned > 0 {
            tracing::info!(pruned, %cutoff, "Pruned old market data");
        }
        Ok(pruned)
    }

    /// One feed loop iteration: refresh, and prune every few ticks
    pub async fn run_tick(&self) -> Result<RefreshReport> {
        let tick = self.tick_count.fetch_add(1, Ordering::Relaxed) + 1;

        let mut report = self.refresh_all().await?;
        if tick % self.prune_every_ticks == 0 {
            report.pruned = self.prune()?;
        }

        tracing::info!(
            refreshed = report.refreshed,
            unavailable = report.unavailable,
            "Market data refresh finished"
        );
        Ok(report)
    }
}
