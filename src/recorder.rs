// Persisted run artefacts: activity log location and the append-only orders record

use crate::core::types::Side;
use crate::error::{TradingError, TradingResult};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ORDERS_HEADER: &str = "exchange,timestamp,side,price,quantity";

/// File locations for one exchange+ticker pair
#[derive(Debug, Clone, PartialEq)]
pub struct LogPaths {
    pub activity: PathBuf,
    pub orders: PathBuf,
}

impl LogPaths {
    pub fn new<P: AsRef<Path>>(log_dir: P, exchange: &str, ticker: &str, account: Option<&str>) -> Self {
        let stem = match account {
            Some(account) => format!("{}_{}_{}", exchange, ticker, account),
            None => format!("{}_{}", exchange, ticker),
        };
        let dir = log_dir.as_ref();
        Self {
            activity: dir.join(format!("{}_activity.log", stem)),
            orders: dir.join(format!("{}_orders.csv", stem)),
        }
    }
}

/// Append-only CSV of every order the bot placed or saw fill
#[derive(Debug, Clone)]
pub struct OrdersRecord {
    path: PathBuf,
}

impl OrdersRecord {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, exchange: &str, side: Side, price: f64, quantity: f64) -> TradingResult<()> {
        // Ensure logs directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| TradingError::DirectoryCreate(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TradingError::FileWrite(format!("{}: {}", self.path.display(), e)))?;

        // Write header if file is new
        if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            writeln!(file, "{}", ORDERS_HEADER)?;
        }
        writeln!(
            file,
            "{},{},{},{},{}",
            exchange,
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            side,
            price,
            quantity
        )?;
        Ok(())
    }
}
