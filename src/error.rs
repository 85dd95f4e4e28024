//! Error type shared by the order cycle, the runners and the exchange seam
//!
//! Every failure is classified as transient (retried with backoff by
//! `RetryPolicy`) or fatal (the run halts). Stop conditions are not failures
//! and are reported through the runners' outcome types instead.

use std::fmt;
use std::io;

/// Main error type for the bot
#[derive(Debug, Clone, PartialEq)]
pub enum TradingError {
    // Configuration errors
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),
    EnvFile(String),
    MissingCredential(String, String), // (exchange, key)
    UnsupportedExchange(String),

    // Exchange errors that are worth another attempt
    InvalidNonce(String),
    Timeout(String),
    Network(String),
    RateLimited(String),

    // Exchange errors that end the run
    Authentication(String),
    InvalidParameters(String),
    InvalidMarketData(String),
    OrderNotFound(String),

    // Hedge errors
    HedgeImbalance { primary: f64, secondary: f64, tolerance: f64 },
    HedgeLagExceeded { lag_ms: u64, bound_ms: u64 },

    // IO errors
    FileWrite(String),
    DirectoryCreate(String),

    // General errors
    Internal(String),
}

impl TradingError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: grid-bot init\n\
                    2. Adjust config.toml if needed\n\
                    3. Try again",
                    path
                )
            }
            TradingError::EnvFile(path) => {
                format!(
                    "Environment file could not be loaded: {}\n\n\
                    💡 Pass an existing file with --env-file",
                    path
                )
            }
            TradingError::MissingCredential(exchange, key) => {
                format!(
                    "Missing credential {} for exchange {}\n\n\
                    💡 Add {}=... to the env file",
                    key, exchange, key
                )
            }
            TradingError::Authentication(msg) => {
                format!(
                    "Exchange authentication failed: {}\n\n\
                    💡 Check:\n\
                    - API key and secret in the env file\n\
                    - Keys have trading permissions\n\
                    - Account index / account id is correct",
                    msg
                )
            }
            TradingError::HedgeImbalance { primary, secondary, tolerance } => {
                format!(
                    "Hedge positions diverged after resync\n\
                    Primary: {:.6}\n\
                    Secondary: {:.6}\n\
                    Tolerance: {:.6}\n\n\
                    💡 Flatten both venues manually before restarting",
                    primary, secondary, tolerance
                )
            }
            _ => self.to_string(),
        }
    }

    /// Errors worth another attempt with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TradingError::InvalidNonce(_)
                | TradingError::Timeout(_)
                | TradingError::Network(_)
                | TradingError::RateLimited(_)
        )
    }

    /// Errors that must terminate the run
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::ConfigNotFound(_)
            | TradingError::ConfigParse(_)
            | TradingError::ConfigValidation(_)
            | TradingError::EnvFile(_)
            | TradingError::MissingCredential(_, _)
            | TradingError::UnsupportedExchange(_) => "config",

            TradingError::InvalidNonce(_)
            | TradingError::Timeout(_)
            | TradingError::Network(_)
            | TradingError::RateLimited(_) => "transient",

            TradingError::Authentication(_)
            | TradingError::InvalidParameters(_)
            | TradingError::InvalidMarketData(_)
            | TradingError::OrderNotFound(_) => "exchange",

            TradingError::HedgeImbalance { .. } | TradingError::HedgeLagExceeded { .. } => "hedge",

            TradingError::FileWrite(_) | TradingError::DirectoryCreate(_) => "io",

            TradingError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for TradingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            TradingError::ConfigParse(msg) => {
                write!(f, "Configuration parse error: {}", msg)
            }
            TradingError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }
            TradingError::EnvFile(msg) => {
                write!(f, "Env file error: {}", msg)
            }
            TradingError::MissingCredential(exchange, key) => {
                write!(f, "Missing credential '{}' for {}", key, exchange)
            }
            TradingError::UnsupportedExchange(name) => {
                write!(f, "Unsupported exchange: {}", name)
            }

            TradingError::InvalidNonce(msg) => {
                write!(f, "Invalid nonce: {}", msg)
            }
            TradingError::Timeout(msg) => {
                write!(f, "Request timed out: {}", msg)
            }
            TradingError::Network(msg) => {
                write!(f, "Network error: {}", msg)
            }
            TradingError::RateLimited(msg) => {
                write!(f, "Rate limited: {}", msg)
            }

            TradingError::Authentication(msg) => {
                write!(f, "Authentication failed: {}", msg)
            }
            TradingError::InvalidParameters(msg) => {
                write!(f, "Invalid order parameters: {}", msg)
            }
            TradingError::InvalidMarketData(msg) => {
                write!(f, "Invalid market data: {}", msg)
            }
            TradingError::OrderNotFound(id) => {
                write!(f, "Order not found: {}", id)
            }

            TradingError::HedgeImbalance { primary, secondary, tolerance } => {
                write!(
                    f,
                    "Hedge imbalance: primary {:.6} + secondary {:.6} = {:.6} exceeds tolerance {:.6}",
                    primary,
                    secondary,
                    primary + secondary,
                    tolerance
                )
            }
            TradingError::HedgeLagExceeded { lag_ms, bound_ms } => {
                write!(f, "Hedge lag {}ms exceeded bound {}ms", lag_ms, bound_ms)
            }

            TradingError::FileWrite(msg) => {
                write!(f, "File write error: {}", msg)
            }
            TradingError::DirectoryCreate(msg) => {
                write!(f, "Directory creation error: {}", msg)
            }

            TradingError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for TradingError {}

// Conversion implementations for common error types

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TradingError::ConfigNotFound(err.to_string()),
            io::ErrorKind::TimedOut => TradingError::Timeout(err.to_string()),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
                TradingError::Network(err.to_string())
            }
            _ => TradingError::FileWrite(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::Internal(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<crate::config::ConfigError> for TradingError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileNotFound(path) => TradingError::ConfigNotFound(path),
            ConfigError::FileRead(msg) => TradingError::ConfigParse(msg),
            ConfigError::FileWrite(msg) => TradingError::FileWrite(msg),
            ConfigError::Parse(msg) => TradingError::ConfigParse(msg),
            ConfigError::Serialize(msg) => TradingError::ConfigParse(msg),
            ConfigError::Validation(msg) => TradingError::ConfigValidation(msg),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TradingError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        TradingError::Timeout(err.to_string())
    }
}

impl From<String> for TradingError {
    fn from(msg: String) -> Self {
        TradingError::Internal(msg)
    }
}

impl From<&str> for TradingError {
    fn from(msg: &str) -> Self {
        TradingError::Internal(msg.to_string())
    }
}

/// Result type alias for bot operations
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TradingError::InvalidNonce("nonce too low".into()).is_transient());
        assert!(TradingError::Timeout("place_order".into()).is_transient());
        assert!(TradingError::RateLimited("429".into()).is_transient());

        assert!(TradingError::Authentication("bad key".into()).is_fatal());
        assert!(TradingError::InvalidParameters("qty".into()).is_fatal());
        assert!(TradingError::HedgeImbalance { primary: 0.3, secondary: 0.0, tolerance: 0.2 }.is_fatal());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TradingError::ConfigNotFound("x".into()).category(), "config");
        assert_eq!(TradingError::Network("x".into()).category(), "transient");
        assert_eq!(TradingError::OrderNotFound("x".into()).category(), "exchange");
        assert_eq!(
            TradingError::HedgeLagExceeded { lag_ms: 1500, bound_ms: 1000 }.category(),
            "hedge"
        );
    }

    #[test]
    fn test_hedge_imbalance_display() {
        let err = TradingError::HedgeImbalance { primary: 0.25, secondary: 0.0, tolerance: 0.2 };
        let text = err.to_string();
        assert!(text.contains("0.250000"));
        assert!(text.contains("tolerance 0.200000"));
    }

    #[test]
    fn test_user_message_has_hint() {
        let err = TradingError::MissingCredential("lighter".into(), "API_KEY_PRIVATE_KEY".into());
        assert!(err.user_message().contains("💡"));
    }
}
