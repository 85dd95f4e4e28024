//! Cross-venue hedge reconciliation
//!
//! A hedged run keeps `primary + secondary ≈ 0`. The cached pair is checked
//! after every fill; a breach forces a resync from both venues and a breach
//! that survives the resync halts the run.

use crate::clients::ExchangeClient;
use crate::error::{TradingError, TradingResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Documented tolerance between the two legs, in contract units
pub const DEFAULT_HEDGE_TOLERANCE: f64 = 0.2;

/// Default upper bound between a primary fill and the secondary acknowledgement
pub const DEFAULT_HEDGE_LAG_BOUND: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HedgePositionPair {
    pub primary: f64,
    pub secondary: f64,
}

impl HedgePositionPair {
    pub fn new(primary: f64, secondary: f64) -> Self {
        Self { primary, secondary }
    }

    /// Signed net exposure across both venues
    pub fn imbalance(&self) -> f64 {
        self.primary + self.secondary
    }

    /// Apply a fill on the primary venue
    pub fn record_primary(&mut self, signed_quantity: f64) {
        self.primary += signed_quantity;
    }

    /// Apply a fill on the secondary venue
    pub fn record_secondary(&mut self, signed_quantity: f64) {
        self.secondary += signed_quantity;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HedgeCheck {
    Hedged { imbalance: f64 },
    Breached { imbalance: f64 },
}

impl HedgeCheck {
    pub fn is_hedged(&self) -> bool {
        matches!(self, HedgeCheck::Hedged { .. })
    }

    pub fn imbalance(&self) -> f64 {
        match self {
            HedgeCheck::Hedged { imbalance } | HedgeCheck::Breached { imbalance } => *imbalance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HedgeReconciler {
    tolerance: f64,
}

impl Default for HedgeReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_HEDGE_TOLERANCE)
    }
}

impl HedgeReconciler {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance: tolerance.abs() }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn check(&self, pair: &HedgePositionPair) -> HedgeCheck {
        let imbalance = pair.imbalance();
        if imbalance.abs() <= self.tolerance + 1e-12 {
            HedgeCheck::Hedged { imbalance }
        } else {
            HedgeCheck::Breached { imbalance }
        }
    }

    /// Check `cached`; on breach re-query both venues and check again.
    ///
    /// Returns the pair to continue with: `cached` when it was hedged, the
    /// authoritative pair when the resync resolved the breach. A breach that
    /// survives the resync is `TradingError::HedgeImbalance`.
    pub async fn reconcile(
        &self,
        cached: HedgePositionPair,
        primary: &dyn ExchangeClient,
        secondary: &dyn ExchangeClient,
    ) -> TradingResult<HedgePositionPair> {
        let first = self.check(&cached);
        if first.is_hedged() {
            return Ok(cached);
        }

        warn!(
            "⚠️  Hedge breach: {} {:.6} + {} {:.6} = {:.6} (tolerance {}), resyncing",
            primary.name(),
            cached.primary,
            secondary.name(),
            cached.secondary,
            first.imbalance(),
            self.tolerance
        );

        let resynced = HedgePositionPair::new(primary.get_position().await?, secondary.get_position().await?);

        match self.check(&resynced) {
            HedgeCheck::Hedged { imbalance } => {
                info!("🔄 Resync resolved hedge breach, imbalance now {:.6}", imbalance);
                Ok(resynced)
            }
            HedgeCheck::Breached { .. } => Err(TradingError::HedgeImbalance {
                primary: resynced.primary,
                secondary: resynced.secondary,
                tolerance: self.tolerance,
            }),
        }
    }
}
