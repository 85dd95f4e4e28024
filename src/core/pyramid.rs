//! Pyramid position sizing
//!
//! Exposure is built in `order_quantity` increments up to `max_position`,
//! then unwound in the same increments back to flat. One build-up plus one
//! unwind is a cycle.
//!
//! With a venue minimum set, no step is ever sized below it: room under the
//! bound that is too small to trade counts as the bound, and a closing step
//! that would leave untradeable dust takes the dust along.

use crate::core::types::{Side, QTY_EPSILON};
use crate::error::{TradingError, TradingResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Building,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    /// Signed: positive long, negative short
    pub net_quantity: f64,
    pub phase: Phase,
}

impl Default for PositionState {
    fn default() -> Self {
        Self { net_quantity: 0.0, phase: Phase::Building }
    }
}

/// Next order the machine wants filled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidStep {
    pub side: Side,
    pub quantity: f64,
    pub phase: Phase,
    /// Last build step; its fill flips the phase to `Closing`
    pub final_build: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    EnteredClosing,
    CycleCompleted,
}

#[derive(Debug, Clone)]
pub struct PyramidCycle {
    state: PositionState,
    direction: Side,
    order_quantity: f64,
    max_position: f64,
    min_quantity: f64,
    completed_cycles: u32,
}

impl PyramidCycle {
    pub fn new(direction: Side, order_quantity: f64, max_position: f64) -> TradingResult<Self> {
        if order_quantity <= 0.0 {
            return Err(TradingError::ConfigValidation("order quantity must be positive".to_string()));
        }
        if max_position + QTY_EPSILON < order_quantity {
            return Err(TradingError::ConfigValidation(format!(
                "max position {} is smaller than order quantity {}",
                max_position, order_quantity
            )));
        }

        Ok(Self {
            state: PositionState::default(),
            direction,
            order_quantity,
            max_position,
            min_quantity: 0.0,
            completed_cycles: 0,
        })
    }

    /// Smallest order the venues accept
    pub fn with_min_quantity(mut self, min_quantity: f64) -> TradingResult<Self> {
        if self.order_quantity + QTY_EPSILON < min_quantity {
            return Err(TradingError::ConfigValidation(format!(
                "order quantity {} is below the venue minimum {}",
                self.order_quantity, min_quantity
            )));
        }
        self.min_quantity = min_quantity.max(0.0);
        Ok(self)
    }

    pub fn min_quantity(&self) -> f64 {
        self.min_quantity
    }

    /// Whether `quantity` is too small to be sent as an order
    fn untradeable(&self, quantity: f64) -> bool {
        quantity <= QTY_EPSILON || quantity + QTY_EPSILON < self.min_quantity
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    pub fn max_position(&self) -> f64 {
        self.max_position
    }

    pub fn next_step(&self) -> PyramidStep {
        let held = self.state.net_quantity.abs();
        match self.state.phase {
            Phase::Building => {
                let room = (self.max_position - held).max(0.0);
                let quantity = self.order_quantity.min(room);
                PyramidStep {
                    side: self.direction,
                    quantity,
                    phase: Phase::Building,
                    final_build: self.untradeable(room - quantity),
                }
            }
            Phase::Closing => {
                let mut quantity = self.order_quantity.min(held);
                if self.untradeable(held - quantity) {
                    quantity = held;
                }
                PyramidStep {
                    side: self.direction.opposite(),
                    quantity,
                    phase: Phase::Closing,
                    final_build: false,
                }
            }
        }
    }

    /// Record a fill of `quantity` for the current step. Partial fills are
    /// accepted; the phase only moves at the bounds.
    pub fn on_fill(&mut self, quantity: f64) -> TradingResult<Transition> {
        if quantity <= QTY_EPSILON {
            return Ok(Transition::Stay);
        }
        let step = self.next_step();
        if quantity > step.quantity + QTY_EPSILON {
            return Err(TradingError::Internal(format!(
                "fill {} exceeds step quantity {}",
                quantity, step.quantity
            )));
        }

        self.state.net_quantity += step.side.sign() * quantity;
        let held = self.state.net_quantity.abs();

        match self.state.phase {
            Phase::Building if self.untradeable(self.max_position - held) => {
                self.state.phase = Phase::Closing;
                Ok(Transition::EnteredClosing)
            }
            Phase::Closing if self.untradeable(held) => {
                // Dust below the minimum stays on the books and rides the next cycle
                if held <= QTY_EPSILON {
                    self.state.net_quantity = 0.0;
                }
                self.state.phase = Phase::Building;
                self.completed_cycles += 1;
                Ok(Transition::CycleCompleted)
            }
            _ => Ok(Transition::Stay),
        }
    }

    /// An order that did not fill in time leaves the machine untouched
    pub fn on_failed_fill(&self) -> PyramidStep {
        self.next_step()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.3).unwrap();

        let first = cycle.next_step();
        assert_eq!(first.side, Side::Buy);
        assert!(!first.final_build);
        assert_eq!(cycle.on_fill(0.1).unwrap(), Transition::Stay);

        assert!(!cycle.next_step().final_build);
        cycle.on_fill(0.1).unwrap();

        let last = cycle.next_step();
        assert!(last.final_build);
        assert_eq!(cycle.on_fill(0.1).unwrap(), Transition::EnteredClosing);
        assert!((cycle.state().net_quantity - 0.3).abs() < 1e-9);

        for _ in 0..2 {
            let step = cycle.next_step();
            assert_eq!(step.side, Side::Sell);
            assert_eq!(cycle.on_fill(step.quantity).unwrap(), Transition::Stay);
        }
        assert_eq!(cycle.on_fill(0.1).unwrap(), Transition::CycleCompleted);
        assert_eq!(cycle.phase(), Phase::Building);
        assert_eq!(cycle.state().net_quantity, 0.0);
        assert_eq!(cycle.completed_cycles(), 1);
    }

    #[test]
    fn test_short_direction_goes_negative() {
        let mut cycle = PyramidCycle::new(Side::Sell, 0.5, 1.0).unwrap();
        cycle.on_fill(0.5).unwrap();
        assert_eq!(cycle.on_fill(0.5).unwrap(), Transition::EnteredClosing);
        assert!((cycle.state().net_quantity + 1.0).abs() < 1e-9);
        assert_eq!(cycle.next_step().side, Side::Buy);
    }

    #[test]
    fn test_last_step_clamped_to_max_position() {
        let mut cycle = PyramidCycle::new(Side::Buy, 0.4, 1.0).unwrap();
        cycle.on_fill(0.4).unwrap();
        cycle.on_fill(0.4).unwrap();
        let step = cycle.next_step();
        assert!((step.quantity - 0.2).abs() < 1e-9);
        assert!(step.final_build);
        assert!(cycle.on_fill(0.4).is_err());
    }

    #[test]
    fn test_failed_fill_does_not_advance() {
        let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.2).unwrap();
        cycle.on_fill(0.1).unwrap();
        let before = cycle.state();
        let retry = cycle.on_failed_fill();
        assert_eq!(cycle.state(), before);
        assert!(retry.final_build);
    }

    #[test]
    fn test_single_step_cycle() {
        // max_position == quantity: open then close, one unit at a time
        let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.1).unwrap();
        assert!(cycle.next_step().final_build);
        assert_eq!(cycle.on_fill(0.1).unwrap(), Transition::EnteredClosing);
        assert_eq!(cycle.on_fill(0.1).unwrap(), Transition::CycleCompleted);
    }

    #[test]
    fn test_partial_fill_dust_ends_build_early() {
        let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.1).unwrap().with_min_quantity(0.001).unwrap();
        assert_eq!(cycle.on_fill(0.0995).unwrap(), Transition::EnteredClosing);

        let close = cycle.next_step();
        assert_eq!(close.side, Side::Sell);
        assert!((close.quantity - 0.0995).abs() < 1e-9);
        assert_eq!(cycle.on_fill(close.quantity).unwrap(), Transition::CycleCompleted);
        assert_eq!(cycle.state().net_quantity, 0.0);
    }

    #[test]
    fn test_remainder_below_minimum_is_skipped() {
        let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.25).unwrap().with_min_quantity(0.1).unwrap();
        assert!(!cycle.next_step().final_build);
        cycle.on_fill(0.1).unwrap();
        assert!(cycle.next_step().final_build);
        assert_eq!(cycle.on_fill(0.1).unwrap(), Transition::EnteredClosing);
        assert!(cycle.next_step().quantity >= 0.1);
    }

    #[test]
    fn test_closing_step_takes_dust_along() {
        let mut cycle = PyramidCycle::new(Side::Sell, 0.1, 0.2).unwrap().with_min_quantity(0.01).unwrap();
        cycle.on_fill(0.1).unwrap();
        cycle.on_fill(0.1).unwrap();
        // A partial close leaves 0.105 held; 0.1 would strand 0.005
        assert_eq!(cycle.on_fill(0.095).unwrap(), Transition::Stay);
        let step = cycle.next_step();
        assert_eq!(step.side, Side::Buy);
        assert!((step.quantity - 0.105).abs() < 1e-9);
    }

    #[test]
    fn test_order_quantity_below_minimum_rejected() {
        assert!(PyramidCycle::new(Side::Buy, 0.001, 1.0).unwrap().with_min_quantity(0.01).is_err());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(PyramidCycle::new(Side::Buy, 0.0, 1.0).is_err());
        assert!(PyramidCycle::new(Side::Buy, 0.5, 0.2).is_err());
    }
}
