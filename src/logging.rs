// Tracing setup: console output plus the per-run activity log

use crate::error::{TradingError, TradingResult};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
///
/// When `activity_log` is set every event is also appended, without colours,
/// to that file.
pub fn init_logging(verbose: bool, activity_log: Option<&Path>) -> TradingResult<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match activity_log {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .map_err(|e| TradingError::DirectoryCreate(format!("{}: {}", parent.display(), e)))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| TradingError::FileWrite(format!("{}: {}", path.display(), e)))?;
            Some(fmt::layer().with_ansi(false).with_target(false).with_writer(Mutex::new(file)).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| TradingError::Internal(format!("logging already initialised: {}", e)))
}

/// Tag used on every line of a run, e.g. `PAPER_ETH`
pub fn run_tag(exchange: &str, ticker: &str) -> String {
    format!("{}_{}", exchange.to_uppercase(), ticker.to_uppercase())
}
