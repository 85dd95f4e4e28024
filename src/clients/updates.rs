// Order-update feed: push channel first, throttled polling when it is gone

use crate::clients::ExchangeClient;
use crate::core::error_handling::GracefulShutdown;
use crate::core::types::{OrderStatus, OrderUpdate};
use crate::error::TradingResult;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Safety poll interval while the push channel is healthy
const PUSH_HEARTBEAT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    Filled(OrderUpdate),
    /// Cancelled or rejected, possibly after a partial fill
    Closed(OrderUpdate),
    TimedOut(OrderUpdate),
    Interrupted(OrderUpdate),
}

impl WaitOutcome {
    pub fn update(&self) -> &OrderUpdate {
        match self {
            WaitOutcome::Filled(u) | WaitOutcome::Closed(u) | WaitOutcome::TimedOut(u) | WaitOutcome::Interrupted(u) => u,
        }
    }

    pub fn filled_quantity(&self) -> f64 {
        self.update().filled_quantity
    }
}

pub struct OrderUpdateFeed {
    receiver: Option<mpsc::Receiver<OrderUpdate>>,
    min_poll_interval: Duration,
    last_query: Option<Instant>,
    /// Updates for other orders seen while waiting
    pending: Vec<OrderUpdate>,
    keep_others: bool,
}

impl OrderUpdateFeed {
    pub fn subscribe(client: &dyn ExchangeClient, min_poll_interval: Duration) -> Self {
        let receiver = client.subscribe_order_updates();
        if receiver.is_none() {
            warn!("📡 {} has no push channel, polling every {:?}", client.name(), min_poll_interval);
        }
        Self { receiver, min_poll_interval, last_query: None, pending: Vec::new(), keep_others: true }
    }

    /// Drop updates for orders other than the one being waited on. For
    /// callers that never drain them.
    pub fn ignore_other_orders(mut self) -> Self {
        self.keep_others = false;
        self
    }

    fn stash(&mut self, update: OrderUpdate) {
        if self.keep_others {
            self.pending.push(update);
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.receiver.is_none()
    }

    /// Take updates for orders nobody was waiting on
    pub fn drain_other_updates(&mut self) -> Vec<OrderUpdate> {
        if let Some(rx) = self.receiver.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(update) => {
                        if self.keep_others {
                            self.pending.push(update);
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        warn!("📡 Order update channel lost, degrading to polling");
                        self.receiver = None;
                        break;
                    }
                }
            }
        }
        std::mem::take(&mut self.pending)
    }

    fn try_restore(&mut self, client: &dyn ExchangeClient) {
        if self.receiver.is_none() {
            if let Some(rx) = client.subscribe_order_updates() {
                info!("📡 Order update channel restored on {}", client.name());
                self.receiver = Some(rx);
            }
        }
    }

    async fn throttled_query(&mut self, client: &dyn ExchangeClient, order_id: &str) -> TradingResult<OrderUpdate> {
        if let Some(last) = self.last_query {
            let next = last + self.min_poll_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        self.last_query = Some(Instant::now());
        client.get_order(order_id).await
    }

    fn settled(update: &OrderUpdate) -> Option<WaitOutcome> {
        match update.status {
            OrderStatus::Filled => Some(WaitOutcome::Filled(update.clone())),
            OrderStatus::Canceled | OrderStatus::Rejected => Some(WaitOutcome::Closed(update.clone())),
            _ => None,
        }
    }

    /// Wait until `order_id` reaches a terminal state, `timeout` passes or
    /// shutdown is requested
    pub async fn wait_for_order(
        &mut self,
        client: &dyn ExchangeClient,
        order_id: &str,
        timeout: Duration,
        shutdown: &GracefulShutdown,
    ) -> TradingResult<WaitOutcome> {
        let deadline = Instant::now() + timeout;
        let mut last = self.throttled_query(client, order_id).await?;
        if let Some(outcome) = Self::settled(&last) {
            return Ok(outcome);
        }

        loop {
            if shutdown.is_shutting_down() {
                return Ok(WaitOutcome::Interrupted(last));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut(last));
            }
            let remaining = deadline - now;

            match self.receiver.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        msg = rx.recv() => match msg {
                            Some(update) if update.order_id == order_id => {
                                last = update;
                                if let Some(outcome) = Self::settled(&last) {
                                    return Ok(outcome);
                                }
                            }
                            Some(other) => self.stash(other),
                            None => {
                                warn!("📡 Order update channel lost, degrading to polling");
                                self.receiver = None;
                            }
                        },
                        _ = sleep(remaining.min(PUSH_HEARTBEAT)) => {
                            last = self.throttled_query(client, order_id).await?;
                            if let Some(outcome) = Self::settled(&last) {
                                return Ok(outcome);
                            }
                        }
                        _ = shutdown.cancelled() => {}
                    }
                }
                None => {
                    if !shutdown.sleep(remaining.min(self.min_poll_interval)).await {
                        continue;
                    }
                    last = self.throttled_query(client, order_id).await?;
                    if let Some(outcome) = Self::settled(&last) {
                        return Ok(outcome);
                    }
                    self.try_restore(client);
                }
            }
        }
    }
}
