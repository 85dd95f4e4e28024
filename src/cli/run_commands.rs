// `run` command: one take-profit grid on a single venue
use clap::Args;
use perp_grid_bot::clients::factory::{build_client, Credentials, ExchangeKind};
use perp_grid_bot::clients::paper::spawn_price_walk;
use perp_grid_bot::config::{BotConfig, GridParams};
use perp_grid_bot::core::grid_runner::{GridOutcome, GridRunner, GridSummary};
use perp_grid_bot::core::price_gate::PRICE_GATE_DISABLED;
use perp_grid_bot::core::pricing::{GridStep, TakeProfit, GRID_STEP_UNRESTRICTED};
use perp_grid_bot::core::{GracefulShutdown, Side};
use perp_grid_bot::recorder::{LogPaths, OrdersRecord};
use perp_grid_bot::{PreFlightValidator, TradingError, TradingResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Venue to trade on
    #[arg(long)]
    pub exchange: String,

    /// Base asset, e.g. ETH
    #[arg(long)]
    pub ticker: String,

    /// Quantity per entry order
    #[arg(long, default_value_t = 0.1)]
    pub quantity: f64,

    /// Take-profit distance in percent of the fill price
    #[arg(long, default_value_t = 0.02)]
    pub take_profit: f64,

    /// Take-profit distance in ticks
    #[arg(long, requires = "grid_step_tick", conflicts_with_all = ["take_profit", "grid_step"])]
    pub take_profit_tick: Option<u32>,

    /// Minimum percent between resting closes; -100 disables the check
    #[arg(long, default_value_t = GRID_STEP_UNRESTRICTED, allow_negative_numbers = true)]
    pub grid_step: f64,

    /// Minimum ticks between resting closes
    #[arg(long, requires = "take_profit_tick", conflicts_with_all = ["take_profit", "grid_step"])]
    pub grid_step_tick: Option<u32>,

    /// Resting close orders allowed before entries hold
    #[arg(long, default_value_t = 40)]
    pub max_orders: usize,

    /// Seconds an unfilled entry rests before it is re-quoted
    #[arg(long, default_value_t = 450)]
    pub wait_time: u64,

    /// buy or sell
    #[arg(long, default_value = "buy")]
    pub direction: String,

    /// End the run once price crosses this level; -1 disables
    #[arg(long, default_value_t = PRICE_GATE_DISABLED, allow_negative_numbers = true)]
    pub stop_price: f64,

    /// Hold new entries while price is beyond this level; -1 disables
    #[arg(long, default_value_t = PRICE_GATE_DISABLED, allow_negative_numbers = true)]
    pub pause_price: f64,

    /// Close each fill with a market order instead of a take-profit ladder
    #[arg(long)]
    pub boost: bool,

    /// Credentials file
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    /// Stop after this many filled entries
    #[arg(long)]
    pub iter: Option<u32>,
}

impl RunArgs {
    pub fn exchange_kind(&self) -> TradingResult<ExchangeKind> {
        self.exchange.parse()
    }

    pub fn to_params(&self) -> TradingResult<GridParams> {
        let direction: Side = self.direction.parse().map_err(TradingError::InvalidParameters)?;
        let (take_profit, grid_step) = match (self.take_profit_tick, self.grid_step_tick) {
            (Some(tp), Some(gs)) => (TakeProfit::Ticks(tp), GridStep::from_ticks(gs as i64)),
            _ => (TakeProfit::Percent(self.take_profit), GridStep::from_percent(self.grid_step)),
        };
        let enabled = |v: f64| if v <= 0.0 { None } else { Some(v) };

        let params = GridParams {
            exchange: self.exchange_kind()?,
            ticker: self.ticker.to_uppercase(),
            quantity: self.quantity,
            take_profit,
            grid_step,
            direction,
            max_orders: self.max_orders,
            wait_time: Duration::from_secs(self.wait_time),
            stop_price: enabled(self.stop_price),
            pause_price: enabled(self.pause_price),
            boost: self.boost,
            iterations: self.iter,
            env_file: self.env_file.clone(),
        };
        params.validate()?;
        Ok(params)
    }
}

pub async fn run_grid(params: GridParams, config: &BotConfig, paths: &LogPaths, shutdown: GracefulShutdown) -> TradingResult<GridSummary> {
    let validator = PreFlightValidator::new(config.clone());
    let validation = validator.validate_grid(&params);
    validation.display();
    if !validation.passed {
        return Err(TradingError::ConfigValidation("Critical validation checks did not pass".to_string()));
    }

    let credentials = Credentials::from_env(params.exchange)?;
    let built = build_client(params.exchange, &params.ticker, &credentials, &config.paper)?;
    if let Some(paper) = built.paper {
        info!("🧪 Paper venue, quotes follow a random walk");
        spawn_price_walk(paper, shutdown.clone());
    }

    let mut runner = GridRunner::new(
        built.client,
        params,
        config.engine.clone(),
        shutdown.clone(),
        OrdersRecord::new(paths.orders.clone()),
    );
    let summary = runner.run().await?;
    shutdown.initiate_shutdown();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match summary.outcome {
        GridOutcome::Stopped { price } => warn!("🛑 Stop price reached at {}", price),
        GridOutcome::Finished => info!("🏁 Iteration limit reached"),
        GridOutcome::Shutdown => info!("👋 Stopped by operator"),
    }
    info!("📈 Entries filled: {}", summary.filled_entries);
    info!("📉 Closes placed: {}", summary.closes_placed);
    info!("📊 Final position: {}", summary.final_position);
    if summary.final_position.abs() > 0.0 {
        info!("📌 Open position stays covered by resting take-profit orders");
    }
    info!("📝 Orders: {}", paths.orders.display());

    Ok(summary)
}
