// `mm` command: two-sided quoting with inventory limits on a single venue
use clap::Args;
use perp_grid_bot::clients::factory::{build_client, Credentials, ExchangeKind};
use perp_grid_bot::clients::paper::spawn_price_walk;
use perp_grid_bot::config::{BotConfig, MarketMakerParams};
use perp_grid_bot::core::mm_runner::{MarketMakerRunner, MarketMakerSummary};
use perp_grid_bot::core::{GracefulShutdown, Spread};
use perp_grid_bot::recorder::{LogPaths, OrdersRecord};
use perp_grid_bot::{PreFlightValidator, TradingError, TradingResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct MmArgs {
    #[arg(long)]
    pub exchange: String,

    #[arg(long)]
    pub ticker: String,

    /// Quantity per quote
    #[arg(long)]
    pub quantity: f64,

    /// Full bid/ask spread in percent
    #[arg(long, default_value_t = 0.30)]
    pub spread: f64,

    /// Ticks from mid on each side; replaces --spread
    #[arg(long)]
    pub spread_ticks: Option<u32>,

    /// Seconds between quote refreshes
    #[arg(long, default_value_t = 2.0)]
    pub refresh_interval: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub target_position: f64,

    /// Absolute position that is flattened at market
    #[arg(long, default_value_t = 2.0)]
    pub max_position: f64,

    /// Drift past target before a side stops quoting
    #[arg(long, default_value_t = 0.1)]
    pub position_threshold: f64,

    /// Fraction of mid shifted against inventory at max position, 0 to 1
    #[arg(long, default_value_t = 0.0)]
    pub inventory_skew: f64,

    /// Smallest price change that replaces a quote; 0 means one tick
    #[arg(long, default_value_t = 0.0)]
    pub min_price_move: f64,

    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,
}

impl MmArgs {
    pub fn exchange_kind(&self) -> TradingResult<ExchangeKind> {
        self.exchange.parse()
    }

    pub fn to_params(&self) -> TradingResult<MarketMakerParams> {
        if !(self.refresh_interval > 0.0) {
            return Err(TradingError::InvalidParameters(format!(
                "refresh-interval must be positive, got {}",
                self.refresh_interval
            )));
        }
        let spread = match self.spread_ticks {
            Some(ticks) => Spread::Ticks(ticks),
            None => Spread::Percent(self.spread),
        };

        let params = MarketMakerParams {
            exchange: self.exchange_kind()?,
            ticker: self.ticker.to_uppercase(),
            quantity: self.quantity,
            spread,
            refresh_interval: Duration::from_secs_f64(self.refresh_interval),
            target_position: self.target_position,
            max_position: self.max_position,
            position_threshold: self.position_threshold,
            inventory_skew: self.inventory_skew,
            min_price_move: self.min_price_move,
            env_file: self.env_file.clone(),
        };
        params.validate()?;
        Ok(params)
    }
}

pub async fn run_mm(
    params: MarketMakerParams,
    config: &BotConfig,
    paths: &LogPaths,
    shutdown: GracefulShutdown,
) -> TradingResult<MarketMakerSummary> {
    let validator = PreFlightValidator::new(config.clone());
    let validation = validator.validate_mm(&params);
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

    let mut runner = MarketMakerRunner::new(
        built.client,
        params,
        config.engine.clone(),
        shutdown.clone(),
        OrdersRecord::new(paths.orders.clone()),
    );
    let summary = runner.run().await?;
    shutdown.initiate_shutdown();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("🔄 Refreshes: {}", summary.refreshes);
    info!("📝 Quotes placed: {}", summary.quotes_placed);
    info!("🧹 Flatten orders: {}", summary.flatten_orders);
    info!("📊 Final position: {}", summary.final_position);
    info!("📝 Orders: {}", paths.orders.display());

    Ok(summary)
}
