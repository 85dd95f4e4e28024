//! In-memory paper venue
//!
//! Resting post-only orders fill at their limit price once the quote crosses
//! them; market orders fill at the touch. Quotes move either explicitly
//! (`set_quote`, used by tests) or through a random walk driven by
//! `spawn_price_walk`. Failures can be injected to exercise retry paths,
//! the next crossing can be limited to a partial fill, and the push channel
//! can be dropped to exercise polling fallback. After `disconnect` every
//! venue call fails until the next `connect`.

use crate::clients::ExchangeClient;
use crate::core::error_handling::GracefulShutdown;
use crate::core::types::{round_to_tick, ContractInfo, OrderResult, OrderStatus, OrderUpdate, Quote, Side, QTY_EPSILON};
use crate::error::{TradingError, TradingResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub initial_price: f64,
    pub tick_size: f64,
    pub min_quantity: f64,
    /// Distance between bid and ask
    pub spread_ticks: u32,
    /// Largest random-walk step per tick of `spawn_price_walk`; 0 keeps the quote still
    pub volatility_ticks: u32,
    pub walk_interval_ms: u64,
    /// Whether `subscribe_order_updates` hands out a push channel
    pub push_updates: bool,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_price: 2000.0,
            tick_size: 0.01,
            min_quantity: 0.001,
            spread_ticks: 2,
            volatility_ticks: 5,
            walk_interval_ms: 500,
            push_updates: true,
        }
    }
}

#[derive(Debug)]
struct PaperState {
    quote: Quote,
    orders: Vec<OrderUpdate>,
    position: f64,
    subscribers: Vec<mpsc::Sender<OrderUpdate>>,
    push_enabled: bool,
    injected_failures: VecDeque<TradingError>,
    market_order_delay: Option<Duration>,
    next_fill_quantity: Option<f64>,
    reject_limit_orders: bool,
    disconnected: bool,
    placed_orders: usize,
}

pub struct PaperExchange {
    name: String,
    ticker: String,
    config: PaperConfig,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(name: impl Into<String>, ticker: impl Into<String>, config: PaperConfig) -> Self {
        let half_spread = config.tick_size * config.spread_ticks.max(1) as f64 / 2.0;
        let quote = Quote::new(
            round_to_tick(config.initial_price - half_spread, config.tick_size),
            round_to_tick(config.initial_price + half_spread, config.tick_size),
        );
        let push_enabled = config.push_updates;

        Self {
            name: name.into(),
            ticker: ticker.into(),
            config,
            state: Mutex::new(PaperState {
                quote,
                orders: Vec::new(),
                position: 0.0,
                subscribers: Vec::new(),
                push_enabled,
                injected_failures: VecDeque::new(),
                market_order_delay: None,
                next_fill_quantity: None,
                reject_limit_orders: false,
                disconnected: false,
                placed_orders: 0,
            }),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn quote(&self) -> Quote {
        self.state.lock().quote
    }

    /// Move the book and fill whatever it crosses
    pub fn set_quote(&self, bid: f64, ask: f64) {
        let mut state = self.state.lock();
        state.quote = Quote::new(bid, ask);
        Self::match_resting(&mut state);
    }

    /// Shift bid and ask by `delta`
    pub fn shift_quote(&self, delta: f64) {
        let mut state = self.state.lock();
        let tick = self.config.tick_size;
        let bid = round_to_tick((state.quote.bid + delta).max(tick), tick);
        let ask = round_to_tick((state.quote.ask + delta).max(2.0 * tick), tick);
        state.quote = Quote::new(bid, ask);
        Self::match_resting(&mut state);
    }

    /// Overwrite the position, e.g. to simulate a venue-side liquidation
    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position;
    }

    pub fn position(&self) -> f64 {
        self.state.lock().position
    }

    /// Next order or cancel call fails with `error`
    pub fn inject_failure(&self, error: TradingError) {
        self.state.lock().injected_failures.push_back(error);
    }

    pub fn set_market_order_delay(&self, delay: Option<Duration>) {
        self.state.lock().market_order_delay = delay;
    }

    /// The next resting order the book crosses fills only `quantity`
    pub fn set_next_fill_quantity(&self, quantity: Option<f64>) {
        self.state.lock().next_fill_quantity = quantity;
    }

    /// Reject every post-only order as if the book had moved through it
    pub fn set_reject_limit_orders(&self, reject: bool) {
        self.state.lock().reject_limit_orders = reject;
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }

    /// Close every push channel handed out so far and stop handing out new ones
    pub fn drop_push_channel(&self) {
        let mut state = self.state.lock();
        state.subscribers.clear();
        state.push_enabled = false;
    }

    pub fn restore_push_channel(&self) {
        self.state.lock().push_enabled = true;
    }

    pub fn open_orders(&self) -> Vec<OrderUpdate> {
        self.state
            .lock()
            .orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect()
    }

    pub fn placed_orders(&self) -> usize {
        self.state.lock().placed_orders
    }

    fn ensure_connected(&self) -> TradingResult<()> {
        if self.state.lock().disconnected {
            return Err(TradingError::Network(format!("paper venue {} is disconnected", self.name)));
        }
        Ok(())
    }

    fn take_failure(&self) -> TradingResult<()> {
        self.ensure_connected()?;
        match self.state.lock().injected_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn publish(state: &mut PaperState, update: &OrderUpdate) {
        state
            .subscribers
            .retain(|tx| !matches!(tx.try_send(update.clone()), Err(mpsc::error::TrySendError::Closed(_))));
    }

    fn match_resting(state: &mut PaperState) {
        let quote = state.quote;
        let mut partial = state.next_fill_quantity.take();
        let mut filled = Vec::new();

        for order in state.orders.iter_mut().filter(|o| !o.status.is_terminal()) {
            let crosses = match order.side {
                Side::Buy => quote.ask <= order.price,
                Side::Sell => quote.bid >= order.price,
            };
            if crosses {
                let remaining = order.quantity - order.filled_quantity;
                let quantity = match partial.take() {
                    Some(limit) if limit + QTY_EPSILON < remaining => limit,
                    _ => remaining,
                };
                order.filled_quantity += quantity;
                order.status = if quantity < remaining {
                    OrderStatus::PartiallyFilled
                } else {
                    OrderStatus::Filled
                };
                filled.push((order.clone(), quantity));
            }
        }
        if partial.is_some() {
            state.next_fill_quantity = partial;
        }

        for (update, quantity) in filled {
            state.position += update.side.sign() * quantity;
            debug!("paper fill {} {} {} @ {}", update.order_id, update.side, quantity, update.price);
            Self::publish(state, &update);
        }
    }

    fn walk(&self) {
        let max_step = self.config.volatility_ticks as i64;
        if max_step == 0 {
            return;
        }
        let steps = rand::thread_rng().gen_range(-max_step..=max_step);
        self.shift_quote(steps as f64 * self.config.tick_size);
    }
}

/// Drive the paper venue's random walk until shutdown
pub fn spawn_price_walk(exchange: Arc<PaperExchange>, shutdown: GracefulShutdown) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_millis(exchange.config.walk_interval_ms.max(10));
    tokio::spawn(async move {
        while shutdown.sleep(interval).await {
            exchange.walk();
        }
    })
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> TradingResult<()> {
        self.state.lock().disconnected = false;
        debug!("paper venue {} ready for {}", self.name, self.ticker);
        Ok(())
    }

    async fn disconnect(&self) -> TradingResult<()> {
        let mut state = self.state.lock();
        state.subscribers.clear();
        state.disconnected = true;
        Ok(())
    }

    async fn contract_info(&self) -> TradingResult<ContractInfo> {
        Ok(ContractInfo {
            contract_id: format!("{}-PERP", self.ticker),
            tick_size: self.config.tick_size,
            min_quantity: self.config.min_quantity,
        })
    }

    async fn fetch_bbo(&self) -> TradingResult<Quote> {
        self.ensure_connected()?;
        Ok(self.quote())
    }

    async fn place_limit_order(&self, side: Side, price: f64, quantity: f64) -> TradingResult<OrderResult> {
        self.take_failure()?;
        if quantity < self.config.min_quantity || price <= 0.0 {
            return Err(TradingError::InvalidParameters(format!("price {} quantity {}", price, quantity)));
        }

        let mut state = self.state.lock();
        state.placed_orders += 1;
        let quote = state.quote;
        let crosses = state.reject_limit_orders
            || match side {
                Side::Buy => price >= quote.ask,
                Side::Sell => price <= quote.bid,
            };

        let order = OrderUpdate {
            order_id: Uuid::new_v4().to_string(),
            side,
            price,
            quantity,
            filled_quantity: 0.0,
            status: if crosses { OrderStatus::Rejected } else { OrderStatus::Open },
        };
        state.orders.push(order.clone());
        Self::publish(&mut state, &order);

        Ok(OrderResult {
            order_id: order.order_id,
            side,
            price,
            quantity,
            filled_quantity: 0.0,
            status: order.status,
        })
    }

    async fn place_market_order(&self, side: Side, quantity: f64) -> TradingResult<OrderResult> {
        self.take_failure()?;
        if quantity < self.config.min_quantity {
            return Err(TradingError::InvalidParameters(format!("quantity {}", quantity)));
        }

        let delay = self.state.lock().market_order_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.placed_orders += 1;
        let price = state.quote.taker_price(side);
        state.position += side.sign() * quantity;

        let order = OrderUpdate {
            order_id: Uuid::new_v4().to_string(),
            side,
            price,
            quantity,
            filled_quantity: quantity,
            status: OrderStatus::Filled,
        };
        state.orders.push(order.clone());
        Self::publish(&mut state, &order);

        Ok(OrderResult {
            order_id: order.order_id,
            side,
            price,
            quantity,
            filled_quantity: quantity,
            status: OrderStatus::Filled,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> TradingResult<OrderResult> {
        self.take_failure()?;
        let mut state = self.state.lock();
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))?;

        if !order.status.is_terminal() {
            order.status = OrderStatus::Canceled;
        }
        let snapshot = order.clone();
        Self::publish(&mut state, &snapshot);

        Ok(OrderResult {
            order_id: snapshot.order_id,
            side: snapshot.side,
            price: snapshot.price,
            quantity: snapshot.quantity,
            filled_quantity: snapshot.filled_quantity,
            status: snapshot.status,
        })
    }

    async fn get_order(&self, order_id: &str) -> TradingResult<OrderUpdate> {
        self.ensure_connected()?;
        self.state
            .lock()
            .orders
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned()
            .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))
    }

    async fn get_active_orders(&self) -> TradingResult<Vec<OrderUpdate>> {
        self.ensure_connected()?;
        Ok(self.open_orders())
    }

    async fn get_position(&self) -> TradingResult<f64> {
        self.ensure_connected()?;
        Ok(self.position())
    }

    fn subscribe_order_updates(&self) -> Option<mpsc::Receiver<OrderUpdate>> {
        let mut state = self.state.lock();
        if !state.push_enabled {
            return None;
        }
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        state.subscribers.push(tx);
        Some(rx)
    }
}
