// Exchange registry and env-file credentials

use crate::clients::paper::{PaperConfig, PaperExchange};
use crate::clients::SharedClient;
use crate::error::{TradingError, TradingResult};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Edgex,
    Backpack,
    Paradex,
    Aster,
    Lighter,
    Grvt,
    Extended,
    Apex,
    Paper,
}

impl ExchangeKind {
    pub const ALL: [ExchangeKind; 9] = [
        ExchangeKind::Edgex,
        ExchangeKind::Backpack,
        ExchangeKind::Paradex,
        ExchangeKind::Aster,
        ExchangeKind::Lighter,
        ExchangeKind::Grvt,
        ExchangeKind::Extended,
        ExchangeKind::Apex,
        ExchangeKind::Paper,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeKind::Edgex => "edgex",
            ExchangeKind::Backpack => "backpack",
            ExchangeKind::Paradex => "paradex",
            ExchangeKind::Aster => "aster",
            ExchangeKind::Lighter => "lighter",
            ExchangeKind::Grvt => "grvt",
            ExchangeKind::Extended => "extended",
            ExchangeKind::Apex => "apex",
            ExchangeKind::Paper => "paper",
        }
    }

    /// Keys the venue adapter reads from the environment
    pub fn credential_keys(self) -> &'static [&'static str] {
        match self {
            ExchangeKind::Edgex => &["EDGEX_ACCOUNT_ID", "EDGEX_STARK_PRIVATE_KEY"],
            ExchangeKind::Backpack => &["BACKPACK_PUBLIC_KEY", "BACKPACK_SECRET_KEY"],
            ExchangeKind::Paradex => &["PARADEX_L1_ADDRESS", "PARADEX_L2_PRIVATE_KEY"],
            ExchangeKind::Aster => &["ASTER_API_KEY", "ASTER_SECRET_KEY"],
            ExchangeKind::Lighter => &["API_KEY_PRIVATE_KEY", "LIGHTER_ACCOUNT_INDEX", "LIGHTER_API_KEY_INDEX"],
            ExchangeKind::Grvt => &["GRVT_TRADING_ACCOUNT_ID", "GRVT_PRIVATE_KEY", "GRVT_API_KEY"],
            ExchangeKind::Extended => &[
                "EXTENDED_API_KEY",
                "EXTENDED_STARK_KEY_PUBLIC",
                "EXTENDED_STARK_KEY_PRIVATE",
                "EXTENDED_VAULT",
            ],
            ExchangeKind::Apex => &["APEX_API_KEY", "APEX_API_KEY_PASSPHRASE", "APEX_API_KEY_SECRET", "APEX_OMNI_KEY_SEED"],
            ExchangeKind::Paper => &[],
        }
    }

    /// Venues where closing with a market order right after the fill is allowed
    pub fn supports_boost(self) -> bool {
        matches!(self, ExchangeKind::Aster | ExchangeKind::Backpack | ExchangeKind::Paper)
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ExchangeKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| TradingError::UnsupportedExchange(s.to_string()))
    }
}

/// Load `path` into the process environment; the file must exist
pub fn load_env_file<P: AsRef<Path>>(path: P) -> TradingResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TradingError::EnvFile(format!("{} does not exist", path.display())));
    }
    dotenvy::from_path(path).map_err(|e| TradingError::EnvFile(format!("{}: {}", path.display(), e)))?;
    info!("🔑 Loaded environment from {}", path.display());
    Ok(())
}

/// Credential values for one venue. Values never appear in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    exchange: ExchangeKind,
    values: BTreeMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("exchange", &self.exchange)
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Credentials {
    /// Collect the venue's keys from the process environment
    pub fn from_env(exchange: ExchangeKind) -> TradingResult<Self> {
        let mut values = BTreeMap::new();
        for key in exchange.credential_keys() {
            match std::env::var(key) {
                Ok(value) if !value.trim().is_empty() => {
                    values.insert(key.to_string(), value);
                }
                _ => {
                    return Err(TradingError::MissingCredential(exchange.to_string(), key.to_string()));
                }
            }
        }
        Ok(Self { exchange, values })
    }

    pub fn exchange(&self) -> ExchangeKind {
        self.exchange
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Optional account label used in log file names
pub fn account_name_from_env() -> Option<String> {
    std::env::var("ACCOUNT_NAME").ok().filter(|s| !s.trim().is_empty())
}

/// A constructed client; `paper` is set when the venue is simulated
pub struct BuiltClient {
    pub client: SharedClient,
    pub paper: Option<Arc<PaperExchange>>,
}

/// Construct the client for `exchange`. Vendor venues are served by adapter
/// crates linked in separately; this build ships the paper venue.
pub fn build_client(
    exchange: ExchangeKind,
    ticker: &str,
    credentials: &Credentials,
    paper: &PaperConfig,
) -> TradingResult<BuiltClient> {
    match exchange {
        ExchangeKind::Paper => {
            let venue = Arc::new(PaperExchange::new(exchange.as_str(), ticker, paper.clone()));
            Ok(BuiltClient { client: venue.clone(), paper: Some(venue) })
        }
        other => Err(TradingError::UnsupportedExchange(format!(
            "{} adapter is not linked into this build ({} credential keys present)",
            other,
            credentials.values.len()
        ))),
    }
}
