// Perpetual-futures grid bot library
//
// A take-profit ladder, a hedged pyramid and a simple two-sided market
// maker, all driven through the `ExchangeClient` trait so any venue adapter
// can be plugged in

pub mod core;
pub mod clients;
pub mod config;
pub mod error;       // Unified error handling
pub mod logging;     // Console and activity-log tracing
pub mod recorder;    // Per-run orders CSV
pub mod validation;  // Pre-flight validation

// Re-export core trading types
pub use core::{
    GridRunner, GridSummary, HedgeRunner, HedgeSummary, MarketMakerRunner, MarketMakerSummary, OrderCycleController,
    PyramidCycle, Quote, Side, SpacingPolicy,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export validation types
pub use validation::{PreFlightValidator, ValidationResult, ValidationCheck, ValidationLevel};

// Re-export client types
pub use clients::{ExchangeClient, ExchangeKind, PaperExchange, SharedClient};

// Re-export configuration
pub use config::{BotConfig, ConfigError, EngineConfig, GridParams, HedgeConfig, HedgeParams, LoggingConfig, MarketMakerParams};
