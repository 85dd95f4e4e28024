//! Two-sided quoting policy for the simple market maker
//!
//! Quotes sit symmetrically around a mid that is shifted against the current
//! inventory. Each side is switched off once the position drifts past the
//! target by more than the threshold, and a position at or beyond the hard
//! limit is flattened with a market order instead of being quoted.

use crate::core::types::{round_to_tick, Quote, Side, QTY_EPSILON};
use crate::error::{TradingError, TradingResult};

/// Distance of each quote from the skewed mid
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Spread {
    /// Full bid/ask spread in percent; each side sits half of it away
    Percent(f64),
    /// Ticks from the mid on each side
    Ticks(u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteSettings {
    pub quantity: f64,
    pub spread: Spread,
    pub target_position: f64,
    pub max_position: f64,
    pub position_threshold: f64,
    /// Fraction of the mid shifted at full inventory, within [0, 1]
    pub inventory_skew: f64,
    /// Smallest price change that replaces a resting quote; 0 means one tick
    pub min_price_move: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotePair {
    pub buy: Option<f64>,
    pub sell: Option<f64>,
}

impl QuotePair {
    pub fn price(&self, side: Side) -> Option<f64> {
        match side {
            Side::Buy => self.buy,
            Side::Sell => self.sell,
        }
    }
}

/// What one refresh should do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuoteDecision {
    Quote(QuotePair),
    Flatten { side: Side, quantity: f64 },
}

#[derive(Debug, Clone)]
pub struct MarketMakerPolicy {
    settings: QuoteSettings,
    tick_size: f64,
}

impl MarketMakerPolicy {
    pub fn new(settings: QuoteSettings, tick_size: f64) -> TradingResult<Self> {
        if !(tick_size > 0.0) {
            return Err(TradingError::ConfigValidation(format!("tick size must be positive, got {}", tick_size)));
        }
        if !(settings.quantity > 0.0) || !(settings.max_position > 0.0) {
            return Err(TradingError::ConfigValidation(
                "quantity and max position must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&settings.inventory_skew) {
            return Err(TradingError::ConfigValidation(format!(
                "inventory skew must be within [0, 1], got {}",
                settings.inventory_skew
            )));
        }
        Ok(Self { settings, tick_size })
    }

    pub fn settings(&self) -> &QuoteSettings {
        &self.settings
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    /// Price change needed before a resting quote is replaced
    pub fn replace_threshold(&self) -> f64 {
        self.settings.min_price_move.max(self.tick_size)
    }

    pub fn needs_replace(&self, resting: f64, wanted: f64) -> bool {
        (wanted - resting).abs() + QTY_EPSILON >= self.replace_threshold()
    }

    /// Buy stays on while the position is at most target + threshold,
    /// sell while it is at least -target - threshold
    pub fn side_toggles(&self, net_position: f64) -> (bool, bool) {
        let long_cutoff = self.settings.target_position + self.settings.position_threshold;
        let short_cutoff = -self.settings.target_position - self.settings.position_threshold;
        (net_position <= long_cutoff, net_position >= short_cutoff)
    }

    /// Mid moved down when long and up when short, by at most `inventory_skew` of itself
    pub fn skewed_mid(&self, mid: f64, net_position: f64) -> f64 {
        let ratio = (net_position / self.settings.max_position).clamp(-1.0, 1.0);
        mid - mid * self.settings.inventory_skew * ratio
    }

    /// Tick-rounded bid and ask around `mid`; the ask is kept above the bid
    pub fn quotes_around(&self, mid: f64) -> (f64, f64) {
        let (buy, sell) = match self.settings.spread {
            Spread::Ticks(ticks) => {
                let offset = ticks as f64 * self.tick_size;
                (mid - offset, mid + offset)
            }
            Spread::Percent(pct) => {
                let half = pct / 100.0 / 2.0;
                (mid * (1.0 - half), mid * (1.0 + half))
            }
        };
        let buy = round_to_tick(buy, self.tick_size);
        let mut sell = round_to_tick(sell, self.tick_size);
        if sell <= buy {
            sell = round_to_tick(buy + self.tick_size, self.tick_size);
        }
        (buy, sell)
    }

    /// Market order bringing a position at the hard limit back toward target.
    /// Never larger than the position itself.
    pub fn flatten_order(&self, net_position: f64) -> Option<(Side, f64)> {
        let held = net_position.abs();
        if held + QTY_EPSILON < self.settings.max_position {
            return None;
        }
        let mut quantity = held - self.settings.target_position;
        if quantity <= QTY_EPSILON {
            quantity = held;
        }
        let quantity = quantity.max(self.settings.quantity).min(held);
        Some((Side::closing(net_position), quantity))
    }

    pub fn decide(&self, quote: &Quote, net_position: f64) -> QuoteDecision {
        if let Some((side, quantity)) = self.flatten_order(net_position) {
            return QuoteDecision::Flatten { side, quantity };
        }
        let (buy_on, sell_on) = self.side_toggles(net_position);
        let (buy, sell) = self.quotes_around(self.skewed_mid(quote.mid(), net_position));
        QuoteDecision::Quote(QuotePair {
            buy: buy_on.then_some(buy),
            sell: sell_on.then_some(sell),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> QuoteSettings {
        QuoteSettings {
            quantity: 0.1,
            spread: Spread::Percent(0.30),
            target_position: 0.0,
            max_position: 2.0,
            position_threshold: 0.1,
            inventory_skew: 0.0,
            min_price_move: 0.0,
        }
    }

    fn policy(settings: QuoteSettings) -> MarketMakerPolicy {
        MarketMakerPolicy::new(settings, 0.01).unwrap()
    }

    #[test]
    fn test_percent_spread_quotes() {
        let (buy, sell) = policy(settings()).quotes_around(2000.0);
        assert_eq!(buy, 1997.0);
        assert_eq!(sell, 2003.0);
    }

    #[test]
    fn test_tick_spread_quotes() {
        let p = policy(QuoteSettings { spread: Spread::Ticks(3), ..settings() });
        assert_eq!(p.quotes_around(2000.0), (1999.97, 2000.03));
    }

    #[test]
    fn test_collapsed_spread_keeps_one_tick() {
        let p = policy(QuoteSettings { spread: Spread::Ticks(0), ..settings() });
        assert_eq!(p.quotes_around(2000.0), (2000.0, 2000.01));
    }

    #[test]
    fn test_side_toggles_follow_threshold() {
        let p = policy(settings());
        assert_eq!(p.side_toggles(0.0), (true, true));
        assert_eq!(p.side_toggles(0.1), (true, true));
        assert_eq!(p.side_toggles(0.3), (false, true));
        assert_eq!(p.side_toggles(-0.3), (true, false));
    }

    #[test]
    fn test_skew_moves_mid_against_inventory() {
        let p = policy(QuoteSettings { inventory_skew: 0.01, ..settings() });
        assert!((p.skewed_mid(2000.0, 1.0) - 1990.0).abs() < 1e-9);
        assert!((p.skewed_mid(2000.0, -1.0) - 2010.0).abs() < 1e-9);
        // Clamped at the hard limit
        assert!((p.skewed_mid(2000.0, 5.0) - 1980.0).abs() < 1e-9);
    }

    #[test]
    fn test_flatten_at_hard_limit() {
        let p = policy(QuoteSettings { target_position: 0.5, ..settings() });
        assert_eq!(p.flatten_order(1.9), None);
        assert_eq!(p.flatten_order(2.0), Some((Side::Sell, 1.5)));
        assert_eq!(p.flatten_order(-2.5), Some((Side::Buy, 2.0)));

        let decision = p.decide(&Quote::new(1999.99, 2000.01), 2.0);
        assert_eq!(decision, QuoteDecision::Flatten { side: Side::Sell, quantity: 1.5 });
    }

    #[test]
    fn test_flatten_never_exceeds_position() {
        let p = policy(QuoteSettings { quantity: 5.0, target_position: 1.9, ..settings() });
        assert_eq!(p.flatten_order(2.0), Some((Side::Sell, 2.0)));
    }

    #[test]
    fn test_replace_threshold_is_at_least_a_tick() {
        let p = policy(settings());
        assert!(!p.needs_replace(2000.0, 2000.0));
        assert!(p.needs_replace(2000.0, 2000.01));

        let coarse = policy(QuoteSettings { min_price_move: 0.5, ..settings() });
        assert!(!coarse.needs_replace(2000.0, 2000.3));
        assert!(coarse.needs_replace(2000.0, 2000.5));
    }

    #[test]
    fn test_decide_drops_disabled_side() {
        let decision = policy(settings()).decide(&Quote::new(1999.99, 2000.01), 0.5);
        let QuoteDecision::Quote(pair) = decision else { panic!("expected quotes") };
        assert_eq!(pair.buy, None);
        assert_eq!(pair.sell, Some(2003.0));
    }

    #[test]
    fn test_invalid_skew_rejected() {
        let result = MarketMakerPolicy::new(QuoteSettings { inventory_skew: 1.5, ..settings() }, 0.01);
        assert!(result.is_err());
    }
}
