// Common test utilities and helpers
#![allow(dead_code)]

use perp_grid_bot::clients::paper::{PaperConfig, PaperExchange};
use perp_grid_bot::config::{EngineConfig, GridParams, HedgeConfig, HedgeParams, MarketMakerParams};
use perp_grid_bot::core::pricing::{GridStep, TakeProfit};
use perp_grid_bot::core::{RetryPolicy, Side, Spread};
use perp_grid_bot::clients::ExchangeKind;
use perp_grid_bot::recorder::OrdersRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Paper venue quoting 1999.99 / 2000.01 that only moves when told to
pub fn paper_venue(name: &str) -> Arc<PaperExchange> {
    paper_venue_with_min(name, PaperConfig::default().min_quantity)
}

pub fn paper_venue_with_min(name: &str, min_quantity: f64) -> Arc<PaperExchange> {
    let config = PaperConfig { volatility_ticks: 0, min_quantity, ..PaperConfig::default() };
    Arc::new(PaperExchange::new(name, "ETH", config))
}

/// Every pair of resting orders on `side` is at least `step_pct` percent apart
pub fn resting_spacing_holds(venue: &PaperExchange, side: Side, step_pct: f64) -> bool {
    let mut prices: Vec<f64> = venue.open_orders().iter().filter(|o| o.side == side).map(|o| o.price).collect();
    prices.sort_by(|a, b| a.total_cmp(b));
    prices.windows(2).all(|w| (w[1] - w[0]) / w[0] * 100.0 + 1e-9 >= step_pct)
}

/// Engine tunables shrunk so runs finish in milliseconds
pub fn fast_engine() -> EngineConfig {
    EngineConfig {
        max_retries: 3,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        backoff_multiplier: 2.0,
        min_poll_interval_ms: 10,
        status_interval_secs: 60,
        shutdown_timeout_secs: 1,
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), 2.0).without_jitter()
}

pub fn grid_params() -> GridParams {
    GridParams {
        exchange: ExchangeKind::Paper,
        ticker: "ETH".to_string(),
        quantity: 0.1,
        take_profit: TakeProfit::Percent(0.02),
        grid_step: GridStep::Unrestricted,
        direction: Side::Buy,
        max_orders: 40,
        wait_time: Duration::from_secs(5),
        stop_price: None,
        pause_price: None,
        boost: false,
        iterations: Some(1),
        env_file: PathBuf::from(".env"),
    }
}

pub fn hedge_params() -> HedgeParams {
    HedgeParams {
        primary: ExchangeKind::Paper,
        secondary: ExchangeKind::Paper,
        ticker: "ETH".to_string(),
        quantity: 0.1,
        max_position: 0.2,
        direction: Side::Buy,
        iterations: 1,
        fill_timeout: Duration::from_millis(500),
        env_file: PathBuf::from(".env"),
    }
}

/// 0.30% spread around the paper mid of 2000, refreshed every 20ms
pub fn mm_params() -> MarketMakerParams {
    MarketMakerParams {
        exchange: ExchangeKind::Paper,
        ticker: "ETH".to_string(),
        quantity: 0.1,
        spread: Spread::Percent(0.30),
        refresh_interval: Duration::from_millis(20),
        target_position: 0.0,
        max_position: 2.0,
        position_threshold: 0.1,
        inventory_skew: 0.0,
        min_price_move: 0.0,
        env_file: PathBuf::from(".env"),
    }
}

pub fn hedge_config(lag_bound_ms: u64) -> HedgeConfig {
    HedgeConfig { tolerance: 0.2, lag_bound_ms }
}

/// Orders record inside a fresh temp dir; keep the `TempDir` alive
pub fn temp_record(name: &str) -> (TempDir, OrdersRecord) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let record = OrdersRecord::new(temp_dir.path().join(format!("{}_orders.csv", name)));
    (temp_dir, record)
}

/// Move the book through the first resting order on `side` so it fills.
/// Returns whether an order was crossed.
pub fn cross_resting(venue: &PaperExchange, side: Side) -> bool {
    let Some(order) = venue.open_orders().into_iter().find(|o| o.side == side) else {
        return false;
    };
    match side {
        Side::Buy => venue.set_quote(order.price - 1.0, order.price - 0.98),
        Side::Sell => venue.set_quote(order.price + 0.98, order.price + 1.0),
    }
    true
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
