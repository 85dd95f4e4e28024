// Close-order coverage of the open position

use crate::core::types::{Side, QTY_EPSILON};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    /// Position held in the trading direction (never negative)
    pub held: f64,
    /// Resting plus queued close quantity
    pub covered: f64,
}

impl Coverage {
    /// `position` is signed; exposure against `direction` is not ours to close
    pub fn new(position: f64, direction: Side, covered: f64) -> Self {
        let held = (position * direction.sign()).max(0.0);
        Self { held, covered }
    }

    pub fn deficit(&self) -> f64 {
        (self.held - self.covered).max(0.0)
    }

    /// Quantity of the top-up close order to place, if any
    pub fn top_up(&self, min_quantity: f64) -> Option<f64> {
        let deficit = self.deficit();
        if deficit + QTY_EPSILON >= min_quantity.max(QTY_EPSILON) {
            Some(deficit)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncovered_long_needs_top_up() {
        let coverage = Coverage::new(0.3, Side::Buy, 0.2);
        assert!((coverage.top_up(0.01).unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_dust_is_ignored() {
        let coverage = Coverage::new(0.2005, Side::Buy, 0.2);
        assert_eq!(coverage.top_up(0.001), None);
    }

    #[test]
    fn test_short_direction_uses_negative_position() {
        let coverage = Coverage::new(-0.5, Side::Sell, 0.3);
        assert!((coverage.deficit() - 0.2).abs() < 1e-9);

        // A long position is not covered by a short-direction bot
        let wrong_side = Coverage::new(0.5, Side::Sell, 0.0);
        assert_eq!(wrong_side.top_up(0.001), None);
    }

    #[test]
    fn test_over_covered_needs_nothing() {
        let coverage = Coverage::new(0.1, Side::Buy, 0.3);
        assert_eq!(coverage.deficit(), 0.0);
        assert_eq!(coverage.top_up(0.001), None);
    }
}
