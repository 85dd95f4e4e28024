// Configuration management for the order cycle bot
//
// `BotConfig` is the TOML file with engine tunables. `GridParams`,
// `HedgeParams` and `MarketMakerParams` are the per-run trading parameters
// assembled from the command line and validated before anything talks to an
// exchange.

use crate::clients::factory::ExchangeKind;
use crate::clients::paper::PaperConfig;
use crate::core::error_handling::RetryPolicy;
use crate::core::hedge::DEFAULT_HEDGE_TOLERANCE;
use crate::core::market_maker::{QuoteSettings, Spread};
use crate::core::pricing::{GridStep, TakeProfit};
use crate::core::types::Side;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Floor between order queries when the push channel is down
    #[serde(default = "default_min_poll_interval_ms")]
    pub min_poll_interval_ms: u64,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeConfig {
    #[serde(default = "default_hedge_tolerance")]
    pub tolerance: f64,
    /// Upper bound from primary fill to secondary acknowledgement
    #[serde(default = "default_hedge_lag_bound_ms")]
    pub lag_bound_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Adds an account label to log file names; `ACCOUNT_NAME` overrides it
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default = "default_true")]
    pub log_to_file: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

// Default value functions
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 200 }
fn default_retry_max_delay_ms() -> u64 { 5_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_min_poll_interval_ms() -> u64 { 1_000 }
fn default_status_interval_secs() -> u64 { 60 }
fn default_shutdown_timeout_secs() -> u64 { 10 }
fn default_hedge_tolerance() -> f64 { DEFAULT_HEDGE_TOLERANCE }
fn default_hedge_lag_bound_ms() -> u64 { 1_000 }
fn default_log_dir() -> String { "logs".to_string() }
fn default_true() -> bool { true }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            min_poll_interval_ms: default_min_poll_interval_ms(),
            status_interval_secs: default_status_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self { tolerance: default_hedge_tolerance(), lag_bound_ms: default_hedge_lag_bound_ms() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_dir: default_log_dir(), account_name: None, log_to_file: true }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            hedge: HedgeConfig::default(),
            logging: LoggingConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
            self.backoff_multiplier,
        )
    }

    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.min_poll_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl HedgeConfig {
    pub fn lag_bound(&self) -> Duration {
        Duration::from_millis(self.lag_bound_ms)
    }
}

impl BotConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: BotConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load the file when present, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            info!("📁 No config at {}, using defaults", path.as_ref().display());
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation("backoff_multiplier must be >= 1.0".to_string()));
        }

        if self.engine.min_poll_interval_ms == 0 {
            return Err(ConfigError::Validation("min_poll_interval_ms must be greater than 0".to_string()));
        }

        if self.engine.retry_base_delay_ms > self.engine.retry_max_delay_ms {
            return Err(ConfigError::Validation(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".to_string(),
            ));
        }

        if !(self.hedge.tolerance >= 0.0) {
            return Err(ConfigError::Validation("hedge tolerance must be non-negative".to_string()));
        }

        if self.hedge.lag_bound_ms == 0 {
            return Err(ConfigError::Validation("hedge lag_bound_ms must be greater than 0".to_string()));
        }

        if self.logging.log_dir.trim().is_empty() {
            return Err(ConfigError::Validation("log_dir must not be empty".to_string()));
        }

        if self.paper.tick_size <= 0.0 || self.paper.initial_price <= 0.0 {
            return Err(ConfigError::Validation("paper tick_size and initial_price must be positive".to_string()));
        }

        Ok(())
    }
}

/// Parameters of a grid (take-profit ladder) run
#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    pub exchange: ExchangeKind,
    pub ticker: String,
    pub quantity: f64,
    pub take_profit: TakeProfit,
    pub grid_step: GridStep,
    pub direction: Side,
    pub max_orders: usize,
    pub wait_time: Duration,
    pub stop_price: Option<f64>,
    pub pause_price: Option<f64>,
    pub boost: bool,
    /// Stop after this many filled entries
    pub iterations: Option<u32>,
    pub env_file: PathBuf,
}

impl GridParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.trim().is_empty() {
            return Err(ConfigError::Validation("ticker must not be empty".to_string()));
        }
        if !(self.quantity > 0.0) {
            return Err(ConfigError::Validation(format!("quantity must be positive, got {}", self.quantity)));
        }
        if self.max_orders == 0 {
            return Err(ConfigError::Validation("max-orders must be greater than 0".to_string()));
        }
        if self.boost && !self.exchange.supports_boost() {
            return Err(ConfigError::Validation(format!(
                "--boost is only available on aster and backpack, not {}",
                self.exchange
            )));
        }
        match (self.take_profit, self.grid_step) {
            (TakeProfit::Percent(_), GridStep::Ticks(_)) | (TakeProfit::Ticks(_), GridStep::Percent(_)) => {
                return Err(ConfigError::Validation(
                    "percent and tick flags cannot be mixed".to_string(),
                ));
            }
            _ => {}
        }
        if let TakeProfit::Percent(pct) = self.take_profit {
            if pct < 0.0 {
                return Err(ConfigError::Validation("take-profit must not be negative".to_string()));
            }
        }
        Ok(())
    }
}

/// Parameters of a hedged pyramid run
#[derive(Debug, Clone, PartialEq)]
pub struct HedgeParams {
    pub primary: ExchangeKind,
    pub secondary: ExchangeKind,
    pub ticker: String,
    pub quantity: f64,
    /// Required: there is no implied default
    pub max_position: f64,
    pub direction: Side,
    pub iterations: u32,
    pub fill_timeout: Duration,
    pub env_file: PathBuf,
}

impl HedgeParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.trim().is_empty() {
            return Err(ConfigError::Validation("ticker must not be empty".to_string()));
        }
        // Two paper venues are independent books; real venues must differ
        if self.primary == self.secondary && self.primary != ExchangeKind::Paper {
            return Err(ConfigError::Validation("primary and hedge exchange must differ".to_string()));
        }
        if !(self.quantity > 0.0) {
            return Err(ConfigError::Validation(format!("quantity must be positive, got {}", self.quantity)));
        }
        if self.max_position < self.quantity {
            return Err(ConfigError::Validation(format!(
                "max-position {} must be at least the order quantity {}",
                self.max_position, self.quantity
            )));
        }
        if self.iterations == 0 {
            return Err(ConfigError::Validation("iter must be greater than 0".to_string()));
        }
        if self.fill_timeout.is_zero() {
            return Err(ConfigError::Validation("fill-timeout must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Parameters of a simple two-sided market-making run
#[derive(Debug, Clone, PartialEq)]
pub struct MarketMakerParams {
    pub exchange: ExchangeKind,
    pub ticker: String,
    pub quantity: f64,
    pub spread: Spread,
    pub refresh_interval: Duration,
    pub target_position: f64,
    pub max_position: f64,
    pub position_threshold: f64,
    pub inventory_skew: f64,
    pub min_price_move: f64,
    pub env_file: PathBuf,
}

impl MarketMakerParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ticker.trim().is_empty() {
            return Err(ConfigError::Validation("ticker must not be empty".to_string()));
        }
        if !(self.quantity > 0.0) {
            return Err(ConfigError::Validation(format!("quantity must be positive, got {}", self.quantity)));
        }
        if !(self.max_position > 0.0) {
            return Err(ConfigError::Validation(format!(
                "max-position must be positive, got {}",
                self.max_position
            )));
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Validation("refresh-interval must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.inventory_skew) {
            return Err(ConfigError::Validation(format!(
                "inventory-skew must be within [0, 1], got {}",
                self.inventory_skew
            )));
        }
        if let Spread::Percent(pct) = self.spread {
            if !(pct >= 0.0) {
                return Err(ConfigError::Validation("spread must not be negative".to_string()));
            }
        }
        if self.position_threshold < 0.0 || self.min_price_move < 0.0 {
            return Err(ConfigError::Validation(
                "position-threshold and min-price-move must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn quote_settings(&self) -> QuoteSettings {
        QuoteSettings {
            quantity: self.quantity,
            spread: self.spread,
            target_position: self.target_position,
            max_position: self.max_position,
            position_threshold: self.position_threshold,
            inventory_skew: self.inventory_skew,
            min_price_move: self.min_price_move,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_params() -> GridParams {
        GridParams {
            exchange: ExchangeKind::Paper,
            ticker: "ETH".to_string(),
            quantity: 0.1,
            take_profit: TakeProfit::Percent(0.02),
            grid_step: GridStep::Unrestricted,
            direction: Side::Buy,
            max_orders: 40,
            wait_time: Duration::from_secs(450),
            stop_price: None,
            pause_price: None,
            boost: false,
            iterations: None,
            env_file: PathBuf::from(".env"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hedge.tolerance, 0.2);
        assert_eq!(config.hedge.lag_bound(), Duration::from_millis(1000));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BotConfig = toml::from_str("[hedge]\ntolerance = 0.05\n").unwrap();
        assert_eq!(config.hedge.tolerance, 0.05);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.logging.log_dir, "logs");
    }

    #[test]
    fn test_boost_restricted_to_supported_venues() {
        let mut params = grid_params();
        params.boost = true;
        assert!(params.validate().is_ok());

        params.exchange = ExchangeKind::Lighter;
        assert!(params.validate().is_err());

        params.exchange = ExchangeKind::Backpack;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_mixed_units_rejected() {
        let mut params = grid_params();
        params.grid_step = GridStep::Ticks(5);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_hedge_params_need_explicit_max_position() {
        let params = HedgeParams {
            primary: ExchangeKind::Paper,
            secondary: ExchangeKind::Lighter,
            ticker: "BTC".to_string(),
            quantity: 0.1,
            max_position: 0.05,
            direction: Side::Buy,
            iterations: 20,
            fill_timeout: Duration::from_secs(5),
            env_file: PathBuf::from(".env"),
        };
        assert!(params.validate().is_err());

        let ok = HedgeParams { max_position: 0.5, ..params };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_market_maker_params_bounds() {
        let params = MarketMakerParams {
            exchange: ExchangeKind::Paper,
            ticker: "ETH".to_string(),
            quantity: 0.1,
            spread: Spread::Percent(0.30),
            refresh_interval: Duration::from_secs(2),
            target_position: 0.0,
            max_position: 2.0,
            position_threshold: 0.1,
            inventory_skew: 0.0,
            min_price_move: 0.0,
            env_file: PathBuf::from(".env"),
        };
        assert!(params.validate().is_ok());
        assert_eq!(params.quote_settings().max_position, 2.0);

        assert!(MarketMakerParams { inventory_skew: 1.2, ..params.clone() }.validate().is_err());
        assert!(MarketMakerParams { max_position: 0.0, ..params.clone() }.validate().is_err());
        assert!(MarketMakerParams { refresh_interval: Duration::ZERO, ..params }.validate().is_err());
    }
}
