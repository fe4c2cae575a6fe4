//! Synthetic Arb Engine - Main Entry Point
//!
//! Paper trading against recorded market data. A live venue connector plugs
//! in through `exchange::VenueConnector`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use synthetic_arb_engine::config::{Config, StrategyKind};
use synthetic_arb_engine::engine::{EngineStats, PaperRunner};
use synthetic_arb_engine::exchange::ReplayFeed;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Synthetic Arb Engine CLI
#[derive(Parser)]
#[command(name = "synthetic-arb-engine")]
#[command(version, about = "Basket arbitrage and inventory-skewed market making")]
struct Cli {
    /// Config file (without extension); `config` in the working directory by default
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the configured strategy
    #[arg(short, long, global = true, value_enum)]
    strategy: Option<StrategyArg>,

    /// Emit JSON log lines instead of human-readable text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a recording in real time against the paper venue
    Run {
        /// Path to a JSON-lines recording
        #[arg(short, long)]
        data: String,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,
    },

    /// Run a recording on a simulated clock and print a summary
    Replay {
        /// Path to a JSON-lines recording
        #[arg(short, long)]
        data: String,
    },

    /// Load, validate and print the configuration
    CheckConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Arbitrage,
    MarketMaker,
    Combined,
    DeltaHedge,
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Arbitrage => StrategyKind::Arbitrage,
            StrategyArg::MarketMaker => StrategyKind::MarketMaker,
            StrategyArg::Combined => StrategyKind::Combined,
            StrategyArg::DeltaHedge => StrategyKind::DeltaHedge,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.json_logs)?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(strategy) = cli.strategy {
        config.engine.strategy = strategy.into();
    }
    config.validate().context("Invalid configuration")?;

    if std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
        warn!("LIVE_TRADING is set but no live venue connector is built in; running on paper");
    }

    match cli.command {
        Commands::Run { data, speed } => run_paper(&config, &data, speed).await,
        Commands::Replay { data } => run_replay(&config, &data).await,
        Commands::CheckConfig => {
            log_config(&config);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_paper(config: &Config, data_path: &str, speed: f64) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║      Synthetic Arb Engine v{} - Paper Trading          ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(config);

    let feed = ReplayFeed::new(data_path)?;
    let runner = PaperRunner::new(config);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; run until the feed ends.
            std::future::pending::<()>().await;
        }
        info!("🛑 Shutdown signal received");
    };

    let stats = runner.run(feed, speed, shutdown).await?;
    log_summary(&stats);

    info!("👋 Synthetic Arb Engine shutdown complete");
    Ok(())
}

async fn run_replay(config: &Config, data_path: &str) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              REPLAY MODE                                   ║");
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(config);

    let feed = ReplayFeed::new(data_path)?;
    if let Some((start, end)) = feed.time_range() {
        info!("   Data range: {} to {}", start, end);
    }
    info!("   Instruments: {}", feed.instruments().len());
    info!("   Events: {}", feed.len());

    let mut runner = PaperRunner::new(config);
    let stats = runner.replay(feed.into_events()).await?;

    log_summary(&stats);

    let (orders, fills, cancels) = runner.venue().activity().await;
    println!();
    println!("Replay summary ({})", runner.engine().strategy_name());
    println!("  Orders sent:        {}", orders);
    println!("  Paper fills:        {}", fills);
    println!("  Cancels:            {}", cancels);
    println!("  Arbitrage fired:    {}", stats.arbitrage_fired);
    println!("  Limit aborts:       {}", stats.limit_aborts);
    println!("  Quote refreshes:    {}", stats.quote_refreshes);
    println!("  Hedge orders:       {}", stats.hedge_orders);
    println!("  Replenishments:     {}", stats.replenish_orders);

    let mut positions: Vec<_> = runner.engine().context().positions.snapshot().into_iter().collect();
    positions.sort();
    for (instrument, position) in positions {
        println!("  {:<12} {:>6}", instrument, position);
    }

    Ok(())
}

/// Initialize logging with file output and structured format.
fn init_logging(json: bool) -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "synthetic-arb-engine.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes on drop; keep it for the whole process.
    Box::leak(Box::new(guard));

    let filter = EnvFilter::from_default_env()
        .add_directive("synthetic_arb_engine=debug".parse()?)
        .add_directive(Level::INFO.into());

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stdout.and(file_writer))
            .with_ansi(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stdout.and(file_writer))
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .init();
    }

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Strategy: {}", config.engine.strategy);
    info!(
        "   Basket: {} = {}",
        config.basket.synthetic,
        config.basket.components.join(" + ")
    );
    info!(
        "   Position Limit: ±{} (buffer {})",
        config.risk.position_limit, config.risk.position_buffer
    );
    info!(
        "   Arbitrage: margin {} volume {} cooldown {}ms",
        config.arbitrage.profit_margin, config.arbitrage.trade_volume, config.arbitrage.cooldown_ms
    );
    info!(
        "   Quoting: spread {} skew {} volume {} refresh {}ms",
        config.market_making.spread,
        config.market_making.skew_coefficient,
        config.market_making.quote_volume,
        config.market_making.refresh_interval_ms
    );
    if config.engine.strategy == StrategyKind::DeltaHedge {
        info!(
            "   Hedge: {} via {} cooldown {}ms",
            config.hedge.derivative,
            config.hedge_instrument(),
            config.hedge.cooldown_ms
        );
    }
}

fn log_summary(stats: &EngineStats) {
    info!("📊 Session summary:");
    info!("   Book updates: {}", stats.book_updates);
    info!("   Own fills: {}", stats.own_fills);
    info!("   Arbitrage fired: {}", stats.arbitrage_fired);
    info!("   Limit aborts: {}", stats.limit_aborts);
    info!("   Remnants cancelled: {}", stats.remnants_cancelled);
    info!("   Quote refreshes: {}", stats.quote_refreshes);
    info!("   Hedge orders: {}", stats.hedge_orders);
    info!("   Replenishments: {}", stats.replenish_orders);
}
