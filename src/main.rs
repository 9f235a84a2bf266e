use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use papertrader::api::SyntheticQuotes;
use papertrader::config::{AppConfig, SeedSimulation};
use papertrader::execution::{
    Clock, ManualClock, MarketDataFeed, QuoteProvider, RecurringTask, SystemClock, TradeCycle,
};
use papertrader::models::{NewSimulation, NewSymbol, SimulationSettings};
use papertrader::persistence::{MemoryStore, SimulationStore};
use papertrader::service::SimulationService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "papertrader")]
#[command(about = "Paper trading simulations on a fixed trade cycle", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = papertrader::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the market data and trade cycle loops until Ctrl+C
    Run,

    /// Replay a simulation offline against synthetic prices
    Replay {
        /// Ticker code
        #[arg(long, default_value = "RELIANCE")]
        symbol: String,

        /// Strategy id (1-4)
        #[arg(long, default_value_t = 1)]
        strategy: u32,

        #[arg(long, default_value_t = 7500.0)]
        investment: f64,

        /// Duration bucket, e.g. "24 Hours"
        #[arg(long, default_value = "24 Hours")]
        timeperiod: String,

        /// Number of trade-cycle ticks to run
        #[arg(long, default_value_t = 12)]
        ticks: u32,

        /// Seed for the synthetic random walk
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Starting price
        #[arg(long, default_value_t = 100.0)]
        price: f64,

        #[arg(long)]
        stop_loss: Option<f64>,

        #[arg(long)]
        take_profit: Option<f64>,
    },

    /// Print the strategy catalog
    Strategies,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    setup_logging(&config.logging.filter);

    match cli.command {
        Command::Run => run(config).await,
        Command::Replay {
            symbol,
            strategy,
            investment,
            timeperiod,
            ticks,
            seed,
            price,
            stop_loss,
            take_profit,
        } => {
            let seed_simulation = SeedSimulation {
                user_id: 1,
                symbol,
                strategy_id: strategy,
                investment,
                timeperiod,
                interval: "2h".to_string(),
                stop_loss,
                take_profit,
            };
            replay(config, seed_simulation, ticks, seed, price).await
        }
        Command::Strategies => {
            let catalog = papertrader::strategy::strategy_catalog();
            println!("{}", serde_json::to_string_pretty(catalog)?);
            Ok(())
        }
    }
}

fn setup_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Register the symbol and start a simulation described in config or on the command line
async fn start_seeded(
    service: &SimulationService,
    seed: &SeedSimulation,
    settings_defaults: &papertrader::config::TradingConfig,
) -> Result<u64> {
    let symbol = service.register_symbol(NewSymbol::from_code(&seed.symbol))?;

    let settings = SimulationSettings {
        stop_loss: seed.stop_loss.or(Some(settings_defaults.default_stop_loss_pct)),
        take_profit: seed
            .take_profit
            .or(Some(settings_defaults.default_take_profit_pct)),
        ..SimulationSettings::default()
    };

    let details = service
        .start_simulation(NewSimulation {
            user_id: seed.user_id,
            symbol_id: symbol.id,
            strategy_id: seed.strategy_id,
            investment: seed.investment,
            timeperiod: seed.timeperiod.clone(),
            interval: seed.interval.clone(),
            settings,
        })
        .await
        .with_context(|| format!("Failed to start simulation for {}", seed.symbol))?;

    Ok(details.simulation.id)
}

async fn run(config: AppConfig) -> Result<()> {
    tracing::info!("Starting papertrader");

    let store: Arc<dyn SimulationStore> = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let feed = Arc::new(
        MarketDataFeed::from_config(store.clone(), clock.clone(), &config.market)
            .context("Failed to build market data clients")?
            .with_watchlist(config.watchlist.clone())
            .with_retention(
                config.scheduler.retention_hours,
                config.scheduler.prune_every_ticks,
            ),
    );
    let cycle = TradeCycle::new(
        store.clone(),
        clock.clone(),
        config.trading.trade_notional,
        config.scheduler.simulation_timeout(),
    );
    let service = SimulationService::new(store.clone(), clock.clone(), cycle.clone());

    tracing::info!("Configuration:");
    tracing::info!("  Trade interval: {:?}", config.scheduler.trade_interval());
    tracing::info!("  Market refresh: {:?}", config.scheduler.market_refresh_interval());
    tracing::info!("  Trade notional: {:.2}", config.trading.trade_notional);
    tracing::info!("  Providers: {}", feed.providers().collect::<Vec<_>>().join(" -> "));
    tracing::info!("  Watchlist: {}", config.watchlist.join(", "));

    // Warm the cache so seeded simulations can open a position right away
    let warm = feed.refresh_all().await?;
    tracing::info!(refreshed = warm.refreshed, "Initial market data refresh done");

    for seed in &config.simulations {
        match start_seeded(&service, seed, &config.trading).await {
            Ok(id) => tracing::info!(simulation_id = id, symbol = %seed.symbol, "Seeded simulation"),
            Err(e) => tracing::error!("{:#}", e),
        }
    }
    // Symbols of seeded simulations without data get another chance before the first tick
    feed.refresh_all().await?;

    let feed_task = {
        let feed = feed.clone();
        RecurringTask::spawn(
            "market_data",
            config.scheduler.market_refresh_interval(),
            clock.clone(),
            move |_| {
                let feed = feed.clone();
                async move {
                    if let Err(e) = feed.run_tick().await {
                        tracing::error!("Market data refresh failed: {}", e);
                    }
                }
            },
        )
    };

    let trade_task = {
        let cycle = cycle.clone();
        RecurringTask::spawn(
            "trade_cycle",
            config.scheduler.trade_interval(),
            clock.clone(),
            move |scheduled| {
                let cycle = cycle.clone();
                async move {
                    if let Err(e) = cycle.run_tick(scheduled).await {
                        tracing::error!("Trade cycle failed: {}", e);
                    }
                }
            },
        )
    };

    tracing::info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Received Ctrl+C, shutting down...");

    feed_task.shutdown().await;
    trade_task.shutdown().await;

    for simulation in store.active_simulations()? {
        tracing::info!(
            simulation_id = simulation.id,
            trades = simulation.total_trades,
            profit_loss = simulation.profit_loss,
            "Still active at shutdown"
        );
    }

    tracing::info!("papertrader stopped");
    Ok(())
}

/// Offline run: synthetic prices, manual clock, fixed number of ticks
async fn replay(
    config: AppConfig,
    seed_simulation: SeedSimulation,
    ticks: u32,
    seed: u64,
    start_price: f64,
) -> Result<()> {
    let store: Arc<dyn SimulationStore> = Arc::new(MemoryStore::new());
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .context("Invalid replay start time")?;
    let manual = Arc::new(ManualClock::new(start));
    let clock: Arc<dyn Clock> = manual.clone();

    let feed = MarketDataFeed::new(
        store.clone(),
        clock.clone(),
        vec![QuoteProvider::Synthetic(Arc::new(SyntheticQuotes::new(
            seed,
            start_price,
        )))],
    )
    .with_watchlist(vec![seed_simulation.symbol.clone()]);

    let cycle = TradeCycle::new(
        store.clone(),
        clock.clone(),
        config.trading.trade_notional,
        config.scheduler.simulation_timeout(),
    );
    let service = SimulationService::new(store.clone(), clock.clone(), cycle.clone());

    feed.refresh_all().await?;
    let id = start_seeded(&service, &seed_simulation, &config.trading).await?;

    let step = chrono::Duration::from_std(config.scheduler.trade_interval())
        .context("Trade interval out of range")?;

    for _ in 0..ticks {
        let now = manual.advance(step);
        feed.refresh_all().await?;
        let report = cycle.run_tick(now).await?;
        if report.processed == 0 {
            tracing::info!("No active simulations left, stopping replay");
            break;
        }
    }

    let details = service.simulation(seed_simulation.user_id, id)?;
    let trades = service.simulation_trades(seed_simulation.user_id, id)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "simulation": details,
            "trades": trades,
        }))?
    );

    Ok(())
}
