//! Per-tick decisions of the grid order cycle
//!
//! The controller never talks to an exchange. The runner feeds it quotes,
//! fills and order snapshots and executes whatever it returns:
//!
//! 1. `on_tick` gates a new maker entry (stop/pause, max orders, grid step).
//! 2. `on_entry_filled` turns a fill into a take-profit close, a market close
//!    in boost mode, or a deferred close when spacing forbids it right now.
//! 3. `next_deferred` and `reconcile_coverage` place queued and top-up closes
//!    once the active set makes room for them.

use crate::core::active_orders::{ActiveOrderSet, CloseOrder};
use crate::core::coverage::Coverage;
use crate::core::price_gate::{GateDecision, PriceGate};
use crate::core::pricing::{Admission, SpacingPolicy};
use crate::core::types::{OrderIntent, OrderUpdate, Quote, Side};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    pub direction: Side,
    pub quantity: f64,
    pub max_orders: usize,
    pub boost: bool,
    /// Stop opening entries after this many fills
    pub iterations: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoldReason {
    Paused { price: f64 },
    MaxOrders { active: usize },
    GridStep { candidate: f64, nearest: f64, distance: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickDecision {
    PlaceEntry(OrderIntent),
    Hold(HoldReason),
    /// Stop price crossed; terminal
    Stop { price: f64 },
    /// Iteration budget spent; terminal
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseAction {
    Place(OrderIntent),
    /// Boost mode: close with a market order right away
    Market(OrderIntent),
    /// Queued until the active set leaves room
    Deferred { intent: OrderIntent, nearest: f64, distance: f64 },
}

#[derive(Debug, Clone)]
pub struct OrderCycleController {
    settings: CycleSettings,
    policy: SpacingPolicy,
    gate: PriceGate,
    active: ActiveOrderSet,
    deferred: VecDeque<OrderIntent>,
    filled_entries: u32,
    stopped: bool,
}

impl OrderCycleController {
    pub fn new(settings: CycleSettings, policy: SpacingPolicy, gate: PriceGate) -> Self {
        Self {
            settings,
            policy,
            gate,
            active: ActiveOrderSet::new(),
            deferred: VecDeque::new(),
            filled_entries: 0,
            stopped: false,
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn policy(&self) -> &SpacingPolicy {
        &self.policy
    }

    pub fn active(&self) -> &ActiveOrderSet {
        &self.active
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn filled_entries(&self) -> u32 {
        self.filled_entries
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn close_side(&self) -> Side {
        self.settings.direction.opposite()
    }

    fn iterations_done(&self) -> bool {
        matches!(self.settings.iterations, Some(limit) if self.filled_entries >= limit)
    }

    pub fn on_tick(&mut self, quote: &Quote) -> TickDecision {
        let direction = self.settings.direction;
        let reference = quote.taker_price(direction);

        if self.stopped {
            return TickDecision::Stop { price: reference };
        }
        match self.gate.evaluate(quote) {
            GateDecision::Stopped => {
                self.stopped = true;
                return TickDecision::Stop { price: reference };
            }
            GateDecision::Paused => return TickDecision::Hold(HoldReason::Paused { price: reference }),
            GateDecision::Open => {}
        }

        if self.iterations_done() {
            return TickDecision::Finished;
        }

        let outstanding = self.active.len() + self.deferred.len();
        if outstanding >= self.settings.max_orders {
            return TickDecision::Hold(HoldReason::MaxOrders { active: outstanding });
        }

        let entry_price = quote.maker_price(direction);
        if !self.settings.boost {
            let candidate = self.policy.rounded_close_price(entry_price, direction);
            if let Admission::Defer { nearest, distance } = self.policy.admit(candidate, self.close_side(), &self.active) {
                return TickDecision::Hold(HoldReason::GridStep { candidate, nearest, distance });
            }
        }

        TickDecision::PlaceEntry(OrderIntent::maker(direction, entry_price, self.settings.quantity))
    }

    /// Turn an entry fill into its close
    pub fn on_entry_filled(&mut self, fill_price: f64, quantity: f64) -> CloseAction {
        self.filled_entries += 1;
        let close_side = self.close_side();

        if self.settings.boost {
            return CloseAction::Market(OrderIntent::taker(close_side, fill_price, quantity));
        }

        let price = self.policy.rounded_close_price(fill_price, self.settings.direction);
        let intent = OrderIntent::maker(close_side, price, quantity);
        match self.policy.admit(price, close_side, &self.active) {
            Admission::Admit => CloseAction::Place(intent),
            Admission::Defer { nearest, distance } => {
                self.deferred.push_back(intent);
                CloseAction::Deferred { intent, nearest, distance }
            }
        }
    }

    /// First queued close that now fits the grid step, removed from the queue
    pub fn next_deferred(&mut self) -> Option<OrderIntent> {
        let idx = self
            .deferred
            .iter()
            .position(|intent| self.policy.admit(intent.price, intent.side, &self.active).is_admitted())?;
        self.deferred.remove(idx)
    }

    /// Put a close back at the front of the queue, e.g. after a failed placement
    pub fn requeue(&mut self, intent: OrderIntent) {
        self.deferred.push_front(intent);
    }

    /// A close order was acknowledged by the exchange
    pub fn close_placed(&mut self, order_id: impl Into<String>, intent: &OrderIntent) {
        self.active.insert(CloseOrder {
            order_id: order_id.into(),
            side: intent.side,
            price: intent.price,
            quantity: intent.quantity,
        });
    }

    pub fn apply_update(&mut self, update: &OrderUpdate) -> Option<CloseOrder> {
        self.active.apply_update(update)
    }

    /// Replace the active set with the exchange's open close-side orders
    pub fn sync_active(&mut self, open_orders: &[OrderUpdate]) {
        let close_side = self.close_side();
        let orders = open_orders
            .iter()
            .filter(|o| o.side == close_side && !o.status.is_terminal())
            .map(|o| CloseOrder {
                order_id: o.order_id.clone(),
                side: o.side,
                price: o.price,
                quantity: (o.quantity - o.filled_quantity).max(0.0),
            })
            .collect();
        self.active.replace_with(orders);
    }

    pub fn coverage(&self, position: f64) -> Coverage {
        let queued: f64 = self.deferred.iter().map(|i| i.quantity).sum();
        let resting = self.active.total_quantity(self.close_side());
        Coverage::new(position, self.settings.direction, resting + queued)
    }

    /// Close order for position not covered by resting or queued closes.
    ///
    /// Returns the intent when it can be placed now; otherwise it is queued.
    pub fn reconcile_coverage(&mut self, position: f64, quote: &Quote, min_quantity: f64) -> Option<OrderIntent> {
        if self.settings.boost {
            return None;
        }
        let quantity = self.coverage(position).top_up(min_quantity)?;
        let direction = self.settings.direction;
        let price = self.policy.rounded_close_price(quote.maker_price(direction), direction);
        let intent = OrderIntent::maker(self.close_side(), price, quantity);

        if self.policy.admit(price, intent.side, &self.active).is_admitted() {
            Some(intent)
        } else {
            self.deferred.push_back(intent);
            None
        }
    }
}
