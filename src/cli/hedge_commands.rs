// `hedge` command: maker pyramid on one venue, taker hedge on another
use clap::Args;
use perp_grid_bot::clients::factory::{build_client, BuiltClient, Credentials, ExchangeKind};
use perp_grid_bot::clients::paper::{spawn_price_walk, PaperExchange};
use perp_grid_bot::config::{BotConfig, HedgeParams};
use perp_grid_bot::core::hedge_runner::{HedgeOutcome, HedgeRunner, HedgeSummary};
use perp_grid_bot::core::{GracefulShutdown, Side};
use perp_grid_bot::recorder::{LogPaths, OrdersRecord};
use perp_grid_bot::{PreFlightValidator, TradingError, TradingResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct HedgeArgs {
    /// Venue for the resting maker orders
    #[arg(long)]
    pub exchange: String,

    /// Venue for the taker hedge
    #[arg(long)]
    pub hedge_exchange: String,

    #[arg(long)]
    pub ticker: String,

    /// Quantity per maker order
    #[arg(long)]
    pub quantity: f64,

    /// Position at which building stops and unwinding starts
    #[arg(long)]
    pub max_position: f64,

    /// Build-and-unwind cycles to complete
    #[arg(long, default_value_t = 20)]
    pub iter: u32,

    /// Seconds a maker order rests before it is re-quoted
    #[arg(long, default_value_t = 5)]
    pub fill_timeout: u64,

    /// buy or sell
    #[arg(long, default_value = "buy")]
    pub direction: String,

    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,
}

impl HedgeArgs {
    pub fn to_params(&self) -> TradingResult<HedgeParams> {
        let params = HedgeParams {
            primary: self.exchange.parse()?,
            secondary: self.hedge_exchange.parse()?,
            ticker: self.ticker.to_uppercase(),
            quantity: self.quantity,
            max_position: self.max_position,
            direction: self.direction.parse::<Side>().map_err(TradingError::InvalidParameters)?,
            iterations: self.iter,
            fill_timeout: Duration::from_secs(self.fill_timeout),
            env_file: self.env_file.clone(),
        };
        params.validate()?;
        Ok(params)
    }
}

fn build_leg(kind: ExchangeKind, label: &str, ticker: &str, config: &BotConfig) -> TradingResult<BuiltClient> {
    if kind == ExchangeKind::Paper {
        let venue = Arc::new(PaperExchange::new(label, ticker, config.paper.clone()));
        return Ok(BuiltClient { client: venue.clone(), paper: Some(venue) });
    }
    let credentials = Credentials::from_env(kind)?;
    build_client(kind, ticker, &credentials, &config.paper)
}

pub async fn run_hedge(
    params: HedgeParams,
    config: &BotConfig,
    primary_paths: &LogPaths,
    secondary_paths: &LogPaths,
    shutdown: GracefulShutdown,
) -> TradingResult<HedgeSummary> {
    let validator = PreFlightValidator::new(config.clone());
    let validation = validator.validate_hedge(&params);
    validation.display();
    if !validation.passed {
        return Err(TradingError::ConfigValidation("Critical validation checks did not pass".to_string()));
    }

    let primary = build_leg(params.primary, "paper", &params.ticker, config)?;
    let secondary = build_leg(params.secondary, "paper-hedge", &params.ticker, config)?;
    for paper in [&primary.paper, &secondary.paper].into_iter().flatten() {
        spawn_price_walk(paper.clone(), shutdown.clone());
    }

    let mut runner = HedgeRunner::new(
        primary.client,
        secondary.client,
        params,
        config.engine.clone(),
        config.hedge.clone(),
        shutdown.clone(),
        OrdersRecord::new(primary_paths.orders.clone()),
        OrdersRecord::new(secondary_paths.orders.clone()),
    );
    let summary = runner.run().await?;
    shutdown.initiate_shutdown();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match summary.outcome {
        HedgeOutcome::Completed => info!("🏁 {} cycles completed", summary.completed_cycles),
        HedgeOutcome::Shutdown => info!("👋 Stopped by operator after {} cycles", summary.completed_cycles),
    }
    info!("📈 Maker fills: {}", summary.primary_fills);
    info!(
        "📊 Final positions: {} / {} (net {})",
        summary.positions.primary,
        summary.positions.secondary,
        summary.positions.imbalance()
    );

    Ok(summary)
}
