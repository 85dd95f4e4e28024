// Outstanding take-profit orders, kept sorted by price

use crate::core::types::{OrderStatus, OrderUpdate, Side, QTY_EPSILON};

#[derive(Debug, Clone, PartialEq)]
pub struct CloseOrder {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    /// Remaining (unfilled) quantity
    pub quantity: f64,
}

/// Resting close orders known to the controller.
///
/// Mutated only from fill/cancel events and periodic snapshots coming from
/// the exchange client; spacing is enforced by `SpacingPolicy::admit` before
/// anything is inserted.
#[derive(Debug, Clone, Default)]
pub struct ActiveOrderSet {
    orders: Vec<CloseOrder>,
}

impl ActiveOrderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: CloseOrder) {
        self.orders.retain(|o| o.order_id != order.order_id);
        let pos = self
            .orders
            .iter()
            .position(|o| o.price > order.price)
            .unwrap_or(self.orders.len());
        self.orders.insert(pos, order);
    }

    pub fn remove(&mut self, order_id: &str) -> Option<CloseOrder> {
        let idx = self.orders.iter().position(|o| o.order_id == order_id)?;
        Some(self.orders.remove(idx))
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.iter().any(|o| o.order_id == order_id)
    }

    /// Apply an exchange event. Returns the order when it left the set.
    pub fn apply_update(&mut self, update: &OrderUpdate) -> Option<CloseOrder> {
        if update.status.is_terminal() {
            return self.remove(&update.order_id);
        }
        if update.status == OrderStatus::PartiallyFilled {
            if let Some(order) = self.orders.iter_mut().find(|o| o.order_id == update.order_id) {
                order.quantity = (update.quantity - update.filled_quantity).max(0.0);
            }
        }
        None
    }

    /// Replace the whole set with an authoritative snapshot
    pub fn replace_with(&mut self, orders: Vec<CloseOrder>) {
        self.orders = orders;
        self.orders
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CloseOrder> {
        self.orders.iter()
    }

    pub fn on_side(&self, side: Side) -> impl Iterator<Item = &CloseOrder> {
        self.orders.iter().filter(move |o| o.side == side)
    }

    pub fn total_quantity(&self, side: Side) -> f64 {
        self.on_side(side)
            .map(|o| o.quantity)
            .filter(|q| *q > QTY_EPSILON)
            .sum()
    }

    /// Same-side order whose price is closest to `price`
    pub fn nearest(&self, side: Side, price: f64) -> Option<&CloseOrder> {
        self.on_side(side).min_by(|a, b| {
            (a.price - price)
                .abs()
                .partial_cmp(&(b.price - price).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    pub fn prices(&self, side: Side) -> Vec<f64> {
        self.on_side(side).map(|o| o.price).collect()
    }
}
