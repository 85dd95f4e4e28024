// Stop / pause price gate for new entries

use crate::core::types::{Quote, Side};

/// Sentinel the command line uses to disable a price threshold
pub const PRICE_GATE_DISABLED: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Open,
    /// Reversible; re-evaluated every tick
    Paused,
    /// Terminal for the run
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceGate {
    direction: Side,
    stop_price: Option<f64>,
    pause_price: Option<f64>,
}

impl PriceGate {
    pub fn new(direction: Side, stop_price: Option<f64>, pause_price: Option<f64>) -> Self {
        Self { direction, stop_price, pause_price }
    }

    /// Build from command line values where `-1` means disabled
    pub fn from_sentinels(direction: Side, stop_price: f64, pause_price: f64) -> Self {
        let enabled = |v: f64| if v == PRICE_GATE_DISABLED || v <= 0.0 { None } else { Some(v) };
        Self::new(direction, enabled(stop_price), enabled(pause_price))
    }

    pub fn stop_price(&self) -> Option<f64> {
        self.stop_price
    }

    pub fn pause_price(&self) -> Option<f64> {
        self.pause_price
    }

    fn crossed(&self, price: f64, threshold: f64) -> bool {
        match self.direction {
            Side::Buy => price >= threshold,
            Side::Sell => price <= threshold,
        }
    }

    /// Evaluate a single reference price. Stop wins over pause.
    pub fn check_price(&self, price: f64) -> GateDecision {
        if let Some(stop) = self.stop_price {
            if self.crossed(price, stop) {
                return GateDecision::Stopped;
            }
        }
        if let Some(pause) = self.pause_price {
            if self.crossed(price, pause) {
                return GateDecision::Paused;
            }
        }
        GateDecision::Open
    }

    /// Buy entries compare the best ask, sell entries the best bid
    pub fn evaluate(&self, quote: &Quote) -> GateDecision {
        self.check_price(quote.taker_price(self.direction))
    }
}
