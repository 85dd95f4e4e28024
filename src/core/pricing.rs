//! Take-profit and grid-step spacing policy
//!
//! Prices are expressed either in percent of price or in exchange ticks.
//! A run uses one unit for both the take-profit offset and the grid step;
//! mixing them is rejected at construction.

use crate::core::active_orders::ActiveOrderSet;
use crate::core::types::{round_to_tick, Side};
use crate::error::{TradingError, TradingResult};

/// Sentinel the command line uses for "no grid-step restriction"
pub const GRID_STEP_UNRESTRICTED: f64 = -100.0;

const DISTANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TakeProfit {
    Percent(f64),
    Ticks(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridStep {
    Unrestricted,
    Percent(f64),
    Ticks(u32),
}

impl GridStep {
    /// Map the command line percent value; non-positive means unrestricted
    pub fn from_percent(value: f64) -> Self {
        if value > 0.0 {
            GridStep::Percent(value)
        } else {
            GridStep::Unrestricted
        }
    }

    pub fn from_ticks(value: i64) -> Self {
        if value > 0 {
            GridStep::Ticks(value as u32)
        } else {
            GridStep::Unrestricted
        }
    }

    pub fn is_restricted(&self) -> bool {
        !matches!(self, GridStep::Unrestricted)
    }
}

/// Outcome of the grid-step check for a candidate close price
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admit,
    /// `distance` is in the grid-step unit (percent or ticks)
    Defer { nearest: f64, distance: f64 },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpacingPolicy {
    take_profit: TakeProfit,
    grid_step: GridStep,
    tick_size: f64,
}

impl SpacingPolicy {
    pub fn new(take_profit: TakeProfit, grid_step: GridStep, tick_size: f64) -> TradingResult<Self> {
        match (take_profit, grid_step) {
            (TakeProfit::Percent(_), GridStep::Ticks(_)) | (TakeProfit::Ticks(_), GridStep::Percent(_)) => {
                return Err(TradingError::ConfigValidation(
                    "take-profit and grid-step must both be percent or both be ticks".to_string(),
                ));
            }
            _ => {}
        }

        if let TakeProfit::Percent(pct) = take_profit {
            if !pct.is_finite() || pct < 0.0 {
                return Err(TradingError::ConfigValidation(format!(
                    "take-profit must be a non-negative percent, got {}",
                    pct
                )));
            }
        }

        let tick_mode = matches!(take_profit, TakeProfit::Ticks(_)) || matches!(grid_step, GridStep::Ticks(_));
        if tick_mode && tick_size <= 0.0 {
            return Err(TradingError::ConfigValidation(
                "tick mode needs a positive tick size from the exchange".to_string(),
            ));
        }

        Ok(Self { take_profit, grid_step, tick_size })
    }

    pub fn take_profit(&self) -> TakeProfit {
        self.take_profit
    }

    pub fn grid_step(&self) -> GridStep {
        self.grid_step
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    /// Take-profit price for an entry filled at `fill_price` on `entry_side`.
    ///
    /// Long entries close above the fill, short entries below it.
    pub fn close_price(&self, fill_price: f64, entry_side: Side) -> f64 {
        let sign = entry_side.sign();
        match self.take_profit {
            TakeProfit::Percent(pct) => fill_price * (1.0 + sign * pct / 100.0),
            TakeProfit::Ticks(ticks) => fill_price + sign * self.tick_size * ticks as f64,
        }
    }

    /// `close_price` snapped to the exchange tick grid
    pub fn rounded_close_price(&self, fill_price: f64, entry_side: Side) -> f64 {
        round_to_tick(self.close_price(fill_price, entry_side), self.tick_size)
    }

    /// Distance between two prices in the grid-step unit
    pub fn distance(&self, existing: f64, candidate: f64) -> f64 {
        match self.grid_step {
            GridStep::Ticks(_) => (existing - candidate).abs() / self.tick_size,
            _ => (existing - candidate).abs() / candidate * 100.0,
        }
    }

    fn step(&self) -> Option<f64> {
        match self.grid_step {
            GridStep::Unrestricted => None,
            GridStep::Percent(pct) => Some(pct),
            GridStep::Ticks(ticks) => Some(ticks as f64),
        }
    }

    /// Decide whether a close order at `candidate` on `close_side` may join
    /// `active`. Only the nearest same-side order is compared.
    pub fn admit(&self, candidate: f64, close_side: Side, active: &ActiveOrderSet) -> Admission {
        let Some(step) = self.step() else {
            return Admission::Admit;
        };
        let Some(nearest) = active.nearest(close_side, candidate) else {
            return Admission::Admit;
        };

        let distance = self.distance(nearest.price, candidate);
        if distance + DISTANCE_EPSILON < step {
            Admission::Defer { nearest: nearest.price, distance }
        } else {
            Admission::Admit
        }
    }

    /// Whether an unfilled entry at `order_price` is stale enough to be
    /// cancelled and re-quoted at `market_price`
    pub fn requote_needed(&self, order_price: f64, market_price: f64) -> bool {
        match self.step() {
            None => true,
            Some(step) => match self.grid_step {
                GridStep::Ticks(_) => (market_price - order_price).abs() / self.tick_size > step,
                _ => (market_price - order_price).abs() / order_price * 100.0 > step,
            },
        }
    }
}
