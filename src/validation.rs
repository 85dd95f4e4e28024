//! Pre-flight validation for grid, hedge and market-making runs
//!
//! Checks everything that can be known before an exchange is contacted:
//! the env file, venue credentials, the log directory and parameter
//! combinations that are legal but probably not what the operator meant.

use crate::clients::factory::{Credentials, ExchangeKind};
use crate::config::{BotConfig, GridParams, HedgeParams, MarketMakerParams};
use crate::core::market_maker::Spread;
use crate::core::pricing::{GridStep, TakeProfit};
use crate::core::types::Side;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Validation result with detailed findings
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub checks: Vec<ValidationCheck>,
}

#[derive(Debug, Clone)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub level: ValidationLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Critical,  // Must pass for the run to start
    Warning,   // Should pass, but the run can continue
    Info,      // Informational only
}

impl ValidationCheck {
    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self { name: name.to_string(), passed: true, message: message.into(), level: ValidationLevel::Info }
    }

    fn fail(name: &str, message: impl Into<String>, level: ValidationLevel) -> Self {
        Self { name: name.to_string(), passed: false, message: message.into(), level }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult { passed: true, checks: Vec::new() }
    }

    pub fn add_check(&mut self, check: ValidationCheck) {
        if !check.passed && check.level == ValidationLevel::Critical {
            self.passed = false;
        }
        self.checks.push(check);
    }

    pub fn critical_failures(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Critical)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Warning)
            .collect()
    }

    pub fn display(&self) {
        info!("🔍 Pre-flight Validation");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        for check in &self.checks {
            let icon = if check.passed {
                "✅"
            } else {
                match check.level {
                    ValidationLevel::Critical => "❌",
                    ValidationLevel::Warning => "⚠️",
                    ValidationLevel::Info => "ℹ️",
                }
            };
            info!("{} {} - {}", icon, check.name, check.message);
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if !self.passed {
            let failures = self.critical_failures();
            error!("❌ Validation failed: {} critical issue(s)", failures.len());
            for failure in failures {
                error!("   • {}: {}", failure.name, failure.message);
            }
        } else {
            let warnings = self.warnings();
            if !warnings.is_empty() {
                warn!("⚠️  {} warning(s) detected", warnings.len());
                for warning in warnings {
                    warn!("   • {}: {}", warning.name, warning.message);
                }
            }
            info!("✅ All critical checks passed");
        }
    }
}

/// Pre-flight validator for both run modes
pub struct PreFlightValidator {
    config: BotConfig,
}

impl PreFlightValidator {
    pub fn new(config: BotConfig) -> Self {
        PreFlightValidator { config }
    }

    /// Checks for a grid run. Expects the env file to be loaded already.
    pub fn validate_grid(&self, params: &GridParams) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.add_check(self.check_config());
        result.add_check(match params.validate() {
            Ok(()) => ValidationCheck::ok("Parameters", format!("{} {} on {}", params.direction, params.ticker, params.exchange)),
            Err(e) => ValidationCheck::fail("Parameters", e.to_string(), ValidationLevel::Critical),
        });
        result.add_check(self.check_env_file(&params.env_file, params.exchange));
        result.add_check(self.check_credentials(params.exchange));
        result.add_check(self.check_log_dir());

        if let TakeProfit::Percent(pct) = params.take_profit {
            if pct == 0.0 {
                result.add_check(ValidationCheck::fail(
                    "Take Profit",
                    "0% closes at the entry price; every cycle only pays fees",
                    ValidationLevel::Warning,
                ));
            }
        }

        if params.boost && params.grid_step.is_restricted() {
            result.add_check(ValidationCheck::fail(
                "Grid Step",
                "ignored in boost mode, closes are taken at market",
                ValidationLevel::Warning,
            ));
        } else if let GridStep::Unrestricted = params.grid_step {
            result.add_check(ValidationCheck::ok("Grid Step", "unrestricted"));
        }

        if let Some(check) = Self::check_gate_order(params.direction, params.stop_price, params.pause_price) {
            result.add_check(check);
        }

        if params.max_orders > 100 {
            result.add_check(ValidationCheck::fail(
                "Max Orders",
                format!("{} resting closes may hit venue order limits", params.max_orders),
                ValidationLevel::Warning,
            ));
        }

        result
    }

    /// Checks for a hedged pyramid run. Expects the env file to be loaded already.
    pub fn validate_hedge(&self, params: &HedgeParams) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.add_check(self.check_config());
        result.add_check(match params.validate() {
            Ok(()) => ValidationCheck::ok(
                "Parameters",
                format!(
                    "{} {} on {} hedged on {}, max position {}",
                    params.direction, params.ticker, params.primary, params.secondary, params.max_position
                ),
            ),
            Err(e) => ValidationCheck::fail("Parameters", e.to_string(), ValidationLevel::Critical),
        });
        result.add_check(self.check_env_file(&params.env_file, params.primary));
        result.add_check(self.check_credentials(params.primary));
        if params.secondary != params.primary {
            result.add_check(self.check_credentials(params.secondary));
        }
        result.add_check(self.check_log_dir());

        let steps = (params.max_position / params.quantity).ceil();
        if steps > 50.0 {
            result.add_check(ValidationCheck::fail(
                "Pyramid Depth",
                format!("{} build steps per cycle", steps),
                ValidationLevel::Warning,
            ));
        }

        if let Some(check) = self.check_pyramid_remainder(params) {
            result.add_check(check);
        }

        result
    }

    /// Checks for a simple market-making run. Expects the env file to be loaded already.
    pub fn validate_mm(&self, params: &MarketMakerParams) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.add_check(self.check_config());
        result.add_check(match params.validate() {
            Ok(()) => ValidationCheck::ok(
                "Parameters",
                format!("{} {} per side on {}, max position {}", params.ticker, params.quantity, params.exchange, params.max_position),
            ),
            Err(e) => ValidationCheck::fail("Parameters", e.to_string(), ValidationLevel::Critical),
        });
        result.add_check(self.check_env_file(&params.env_file, params.exchange));
        result.add_check(self.check_credentials(params.exchange));
        result.add_check(self.check_log_dir());

        if params.target_position.abs() + params.position_threshold >= params.max_position {
            result.add_check(ValidationCheck::fail(
                "Position Limits",
                format!(
                    "target {} + threshold {} reaches max position {}; quoting only stops at the flatten limit",
                    params.target_position, params.position_threshold, params.max_position
                ),
                ValidationLevel::Warning,
            ));
        }

        if let Spread::Percent(pct) = params.spread {
            if pct == 0.0 {
                result.add_check(ValidationCheck::fail(
                    "Spread",
                    "0% quotes one tick apart at best",
                    ValidationLevel::Warning,
                ));
            }
        }

        result
    }

    // Individual check methods

    fn check_config(&self) -> ValidationCheck {
        match self.config.validate() {
            Ok(()) => ValidationCheck::ok("Configuration", "Loaded successfully"),
            Err(e) => ValidationCheck::fail("Configuration", e.to_string(), ValidationLevel::Critical),
        }
    }

    fn check_env_file(&self, path: &Path, exchange: ExchangeKind) -> ValidationCheck {
        if path.exists() {
            return ValidationCheck::ok("Env File", path.display().to_string());
        }
        // The paper venue needs no credentials
        let level = if exchange == ExchangeKind::Paper { ValidationLevel::Warning } else { ValidationLevel::Critical };
        ValidationCheck::fail("Env File", format!("{} not found", path.display()), level)
    }

    fn check_credentials(&self, exchange: ExchangeKind) -> ValidationCheck {
        let name = format!("{} Credentials", exchange);
        match Credentials::from_env(exchange) {
            Ok(_) if exchange.credential_keys().is_empty() => ValidationCheck::ok(&name, "none required"),
            Ok(_) => ValidationCheck::ok(&name, format!("{} key(s) present", exchange.credential_keys().len())),
            Err(e) => ValidationCheck::fail(&name, e.to_string(), ValidationLevel::Critical),
        }
    }

    fn check_log_dir(&self) -> ValidationCheck {
        if !self.config.logging.log_to_file {
            return ValidationCheck::ok("Log Directory", "file logging disabled");
        }

        let dir = Path::new(&self.config.logging.log_dir);
        if let Err(e) = fs::create_dir_all(dir) {
            return ValidationCheck::fail("Log Directory", format!("{}: {}", dir.display(), e), ValidationLevel::Critical);
        }

        let write_test = dir.join(".write_test");
        match fs::write(&write_test, b"") {
            Ok(()) => {
                let _ = fs::remove_file(&write_test);
                ValidationCheck::ok("Log Directory", format!("{} writable", dir.display()))
            }
            Err(e) => ValidationCheck::fail("Log Directory", format!("{}: {}", dir.display(), e), ValidationLevel::Critical),
        }
    }

    /// The final build step of an uneven pyramid is skipped when the paper
    /// venue cannot trade it
    fn check_pyramid_remainder(&self, params: &HedgeParams) -> Option<ValidationCheck> {
        if params.primary != ExchangeKind::Paper && params.secondary != ExchangeKind::Paper {
            return None;
        }
        let remainder = params.max_position % params.quantity;
        let min_quantity = self.config.paper.min_quantity;
        if remainder > 1e-9 && remainder + 1e-9 < params.quantity && remainder + 1e-9 < min_quantity {
            return Some(ValidationCheck::fail(
                "Pyramid Remainder",
                format!(
                    "final step of {:.6} is below the paper minimum {}; building stops at {}",
                    remainder,
                    min_quantity,
                    params.max_position - remainder
                ),
                ValidationLevel::Warning,
            ));
        }
        None
    }

    /// A pause beyond the stop can never trigger
    fn check_gate_order(direction: Side, stop: Option<f64>, pause: Option<f64>) -> Option<ValidationCheck> {
        let (stop, pause) = (stop?, pause?);
        let unreachable = match direction {
            Side::Buy => pause >= stop,
            Side::Sell => pause <= stop,
        };
        Some(if unreachable {
            ValidationCheck::fail(
                "Price Gate",
                format!("pause {} is beyond stop {} and will never trigger", pause, stop),
                ValidationLevel::Warning,
            )
        } else {
            ValidationCheck::ok("Price Gate", format!("pause {} / stop {}", pause, stop))
        })
    }
}
