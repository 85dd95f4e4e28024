// Order cycle domain types shared by the controller, the runners and the clients

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance used for quantity comparisons
pub const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for buy, -1 for sell; the sign a fill applies to a net position
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Side that reduces a signed position
    pub fn closing(position: f64) -> Side {
        if position > 0.0 {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "long" => Ok(Side::Buy),
            "sell" | "short" => Ok(Side::Sell),
            other => Err(format!("unknown side '{}', expected buy or sell", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    /// Post-only limit order resting on the book
    Maker,
    /// Market order consuming liquidity
    Taker,
}

/// What the controller wants sent to the exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderIntent {
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub role: OrderRole,
}

impl OrderIntent {
    pub fn maker(side: Side, price: f64, quantity: f64) -> Self {
        Self { side, price, quantity, role: OrderRole::Maker }
    }

    /// `reference_price` is only used for logging and the orders record
    pub fn taker(side: Side, reference_price: f64, quantity: f64) -> Self {
        Self { side, price: reference_price, quantity, role: OrderRole::Taker }
    }
}

/// Best bid/offer snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    pub fn is_valid(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.bid < self.ask
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Price a post-only entry on `side` rests at
    pub fn maker_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }

    /// Price a market order on `side` would trade at
    pub fn taker_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected)
    }
}

/// Acknowledgement for a placement or cancellation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub status: OrderStatus,
}

/// Snapshot of a single order, as returned by `get_order` or pushed as an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub status: OrderStatus,
}

impl From<&OrderResult> for OrderUpdate {
    fn from(result: &OrderResult) -> Self {
        Self {
            order_id: result.order_id.clone(),
            side: result.side,
            price: result.price,
            quantity: result.quantity,
            filled_quantity: result.filled_quantity,
            status: result.status,
        }
    }
}

/// Static contract attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub contract_id: String,
    pub tick_size: f64,
    pub min_quantity: f64,
}

/// Round `price` to the nearest multiple of `tick_size`
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 {
        return price;
    }
    let ticks = (price / tick_size).round();
    // Trim float noise such as 2000.4000000000001
    let decimals = (-tick_size.log10()).ceil().max(0.0) as i32;
    let scale = 10f64.powi(decimals);
    (ticks * tick_size * scale).round() / scale
}
