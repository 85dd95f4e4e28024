// Grid run loop: drives the order cycle controller against one exchange

use crate::clients::updates::{OrderUpdateFeed, WaitOutcome};
use crate::clients::{fetch_valid_bbo, SharedClient};
use crate::config::{EngineConfig, GridParams};
use crate::core::cycle_controller::{CloseAction, CycleSettings, HoldReason, OrderCycleController, TickDecision};
use crate::core::error_handling::{GracefulShutdown, RetryPolicy};
use crate::core::price_gate::PriceGate;
use crate::core::pricing::{Admission, SpacingPolicy};
use crate::core::types::{round_to_tick, ContractInfo, OrderIntent, OrderStatus, Quote, Side, QTY_EPSILON};
use crate::error::{TradingError, TradingResult};
use crate::recorder::OrdersRecord;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridOutcome {
    /// Stop price crossed
    Stopped { price: f64 },
    /// `--iter` entries filled
    Finished,
    /// Interrupted by the operator
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridSummary {
    pub outcome: GridOutcome,
    pub filled_entries: u32,
    pub closes_placed: u32,
    pub final_position: f64,
}

pub struct GridRunner {
    client: SharedClient,
    params: GridParams,
    engine: EngineConfig,
    retry: RetryPolicy,
    shutdown: GracefulShutdown,
    record: OrdersRecord,
    closes_placed: u32,
}

impl GridRunner {
    pub fn new(
        client: SharedClient,
        params: GridParams,
        engine: EngineConfig,
        shutdown: GracefulShutdown,
        record: OrdersRecord,
    ) -> Self {
        let retry = engine.retry_policy();
        Self { client, params, engine, retry, shutdown, record, closes_placed: 0 }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_controller(&self, info: &ContractInfo) -> TradingResult<OrderCycleController> {
        let policy = SpacingPolicy::new(self.params.take_profit, self.params.grid_step, info.tick_size)?;
        let gate = PriceGate::new(self.params.direction, self.params.stop_price, self.params.pause_price);
        let settings = CycleSettings {
            direction: self.params.direction,
            quantity: self.params.quantity,
            max_orders: self.params.max_orders,
            boost: self.params.boost,
            iterations: self.params.iterations,
        };
        Ok(OrderCycleController::new(settings, policy, gate))
    }

    async fn prepare(&self) -> TradingResult<(ContractInfo, OrderCycleController)> {
        self.client.connect().await?;
        let info = self.client.contract_info().await?;
        let controller = self.build_controller(&info)?;
        Ok((info, controller))
    }

    pub async fn run(&mut self) -> TradingResult<GridSummary> {
        let (info, mut controller) = match self.prepare().await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("❌ Grid run not started [{}]: {}", e.category(), e);
                if let Err(e) = self.client.disconnect().await {
                    warn!("⚠️  Disconnect failed: {}", e);
                }
                return Err(e);
            }
        };
        info!(
            "🚀 Grid run on {} {} ({}): {} {} per entry, tick {}",
            self.client.name(),
            self.params.ticker,
            info.contract_id,
            self.params.direction,
            self.params.quantity,
            info.tick_size
        );

        let mut feed = OrderUpdateFeed::subscribe(self.client.as_ref(), self.engine.min_poll_interval());

        let result = self.run_loop(&mut controller, &mut feed, &info).await;

        if !self.shutdown.wait_for_completion(self.engine.shutdown_timeout()).await {
            warn!("⚠️  Exiting with order calls still in flight");
        }
        let result = match result {
            Ok(outcome) => self.client.get_position().await.map(|position| (outcome, position)),
            Err(e) => Err(e),
        };
        if let Err(e) = self.client.disconnect().await {
            warn!("⚠️  Disconnect failed: {}", e);
        }

        let (outcome, final_position) = match result {
            Ok(done) => done,
            Err(e) => {
                error!("❌ Grid run halted [{}]: {}", e.category(), e);
                return Err(e);
            }
        };

        Ok(GridSummary {
            outcome,
            filled_entries: controller.filled_entries(),
            closes_placed: self.closes_placed,
            final_position,
        })
    }

    async fn run_loop(
        &mut self,
        controller: &mut OrderCycleController,
        feed: &mut OrderUpdateFeed,
        info: &ContractInfo,
    ) -> TradingResult<GridOutcome> {
        let status_interval = self.engine.status_interval();
        let hold_interval = self.engine.min_poll_interval();
        let mut last_status: Option<Instant> = None;

        loop {
            if self.shutdown.is_shutting_down() {
                return Ok(GridOutcome::Shutdown);
            }

            for update in feed.drain_other_updates() {
                if let Some(closed) = controller.apply_update(&update) {
                    if update.status == OrderStatus::Filled {
                        info!("💰 Take-profit filled: {} {} @ {}", closed.side, closed.quantity, closed.price);
                        self.record.record(self.client.name(), closed.side, closed.price, update.filled_quantity)?;
                    }
                }
            }

            let client = self.client.clone();
            let open_orders = self.retry.execute("get_active_orders", |_| client.get_active_orders()).await?;
            controller.sync_active(&open_orders);

            let quote = match fetch_valid_bbo(self.client.as_ref()).await {
                Ok(quote) => quote,
                Err(e) if e.is_transient() || matches!(e, TradingError::InvalidMarketData(_)) => {
                    warn!("⚠️  Skipping tick: {}", e);
                    self.shutdown.sleep(hold_interval).await;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let position = self.retry.execute("get_position", |_| client.get_position()).await?;

            if let Some(intent) = controller.next_deferred() {
                info!("📤 Releasing deferred close {} {} @ {}", intent.side, intent.quantity, intent.price);
                self.place_close(controller, intent, info).await?;
            }
            if let Some(intent) = controller.reconcile_coverage(position, &quote, info.min_quantity) {
                warn!(
                    "⚠️  Position {:.6} not covered by close orders, topping up {} @ {}",
                    position, intent.quantity, intent.price
                );
                self.place_close(controller, intent, info).await?;
            }

            if last_status.map_or(true, |t| t.elapsed() >= status_interval) {
                last_status = Some(Instant::now());
                info!(
                    "📊 Position {:.6} | {} close orders ({:.6}) | {} deferred | {} entries filled | bid {} ask {}",
                    position,
                    controller.active().len(),
                    controller.active().total_quantity(controller.close_side()),
                    controller.deferred_len(),
                    controller.filled_entries(),
                    quote.bid,
                    quote.ask
                );
            }

            match controller.on_tick(&quote) {
                TickDecision::Stop { price } => {
                    warn!(
                        "🛑 Stop price {:?} reached at {}, no further entries",
                        self.params.stop_price, price
                    );
                    return Ok(GridOutcome::Stopped { price });
                }
                TickDecision::Finished => {
                    info!("🏁 {} entries filled, iteration limit reached", controller.filled_entries());
                    return Ok(GridOutcome::Finished);
                }
                TickDecision::Hold(reason) => {
                    match reason {
                        HoldReason::Paused { price } => {
                            info!("⏸️  Paused: price {} beyond pause price {:?}", price, self.params.pause_price)
                        }
                        HoldReason::MaxOrders { active } => {
                            debug!("⏳ {} close orders outstanding, max {}", active, self.params.max_orders)
                        }
                        HoldReason::GridStep { candidate, nearest, distance } => debug!(
                            "📏 Close at {} too near {} ({:.4} < grid step), waiting",
                            candidate, nearest, distance
                        ),
                    }
                    self.shutdown.sleep(hold_interval).await;
                }
                TickDecision::PlaceEntry(intent) => {
                    self.run_entry(controller, feed, intent, info).await?;
                }
            }
        }
    }

    /// Place one maker entry and see it through to a fill, a re-quote or shutdown
    async fn run_entry(
        &mut self,
        controller: &mut OrderCycleController,
        feed: &mut OrderUpdateFeed,
        intent: OrderIntent,
        info: &ContractInfo,
    ) -> TradingResult<()> {
        let client = self.client.clone();
        let placed = {
            let _guard = self.shutdown.register_operation();
            self.retry
                .execute("place entry", |_| client.place_limit_order(intent.side, intent.price, intent.quantity))
                .await?
        };

        if placed.status == OrderStatus::Rejected {
            debug!("↩️  Entry at {} would cross the book, re-quoting", intent.price);
            self.shutdown.sleep(self.engine.min_poll_interval()).await;
            return Ok(());
        }
        info!("📥 Entry {} {} @ {} ({})", intent.side, intent.quantity, intent.price, placed.order_id);
        self.record.record(client.name(), intent.side, intent.price, intent.quantity)?;

        loop {
            let outcome = feed
                .wait_for_order(client.as_ref(), &placed.order_id, self.params.wait_time, &self.shutdown)
                .await?;

            let (filled, price) = match outcome {
                WaitOutcome::Filled(update) | WaitOutcome::Closed(update) => (update.filled_quantity, update.price),
                WaitOutcome::Interrupted(_) => {
                    let cancelled = self.cancel(&placed.order_id).await?;
                    (cancelled.filled_quantity, cancelled.price)
                }
                WaitOutcome::TimedOut(_) => {
                    let quote = match fetch_valid_bbo(client.as_ref()).await {
                        Ok(quote) => quote,
                        Err(e) if e.is_transient() || matches!(e, TradingError::InvalidMarketData(_)) => {
                            warn!("⚠️  Cannot price re-quote check: {}", e);
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    let market = quote.maker_price(intent.side);
                    if !controller.policy().requote_needed(intent.price, market) {
                        debug!("⏳ Entry @ {} still close to market {}, keep waiting", intent.price, market);
                        continue;
                    }
                    info!("🔄 Market moved to {}, cancelling entry @ {}", market, intent.price);
                    let cancelled = self.cancel(&placed.order_id).await?;
                    (cancelled.filled_quantity, cancelled.price)
                }
            };

            if filled > QTY_EPSILON {
                self.on_entry_fill(controller, price, filled, info).await?;
            }
            return Ok(());
        }
    }

    async fn cancel(&self, order_id: &str) -> TradingResult<crate::core::types::OrderResult> {
        let _guard = self.shutdown.register_operation();
        let client = self.client.clone();
        self.retry.execute("cancel", |_| client.cancel_order(order_id)).await
    }

    async fn on_entry_fill(
        &mut self,
        controller: &mut OrderCycleController,
        price: f64,
        quantity: f64,
        info: &ContractInfo,
    ) -> TradingResult<()> {
        info!("✅ Entry filled: {} @ {}", quantity, price);
        match controller.on_entry_filled(price, quantity) {
            CloseAction::Place(intent) => self.place_close(controller, intent, info).await,
            CloseAction::Market(intent) => self.market_close(intent).await,
            CloseAction::Deferred { intent, nearest, distance } => {
                info!(
                    "📏 Close @ {} deferred: {:.4} from {} is inside the grid step",
                    intent.price, distance, nearest
                );
                Ok(())
            }
        }
    }

    async fn market_close(&mut self, intent: OrderIntent) -> TradingResult<()> {
        let client = self.client.clone();
        let result = {
            let _guard = self.shutdown.register_operation();
            self.retry
                .execute("market close", |_| client.place_market_order(intent.side, intent.quantity))
                .await?
        };
        info!("⚡ Market close {} {} @ {}", intent.side, intent.quantity, result.price);
        self.record.record(client.name(), intent.side, result.price, intent.quantity)?;
        self.closes_placed += 1;
        Ok(())
    }

    /// Post the take-profit, walking the price away from the book when it
    /// would cross, and fall back to a market close when the ladder runs out
    async fn place_close(
        &mut self,
        controller: &mut OrderCycleController,
        intent: OrderIntent,
        info: &ContractInfo,
    ) -> TradingResult<()> {
        let client = self.client.clone();
        let mut price = intent.price;

        for attempt in 0..=self.retry.max_retries() {
            let result = {
                let _guard = self.shutdown.register_operation();
                client.place_limit_order(intent.side, price, intent.quantity).await
            };

            match result {
                Ok(placed) if placed.status != OrderStatus::Rejected => {
                    let placed_intent = OrderIntent { price, ..intent };
                    controller.close_placed(placed.order_id.clone(), &placed_intent);
                    info!("🎯 Close {} {} @ {} ({})", intent.side, intent.quantity, price, placed.order_id);
                    self.record.record(client.name(), intent.side, price, intent.quantity)?;
                    self.closes_placed += 1;
                    return Ok(());
                }
                Ok(_) => {
                    let quote = fetch_valid_bbo(client.as_ref()).await?;
                    price = reprice_outside_book(intent.side, price, &quote, info.tick_size);
                    // The moved price must still respect the grid step
                    if let Admission::Defer { nearest, distance } =
                        controller.policy().admit(price, intent.side, controller.active())
                    {
                        info!(
                            "📏 Close repriced to {} sits {:.4} from {}, deferring @ {}",
                            price, distance, nearest, intent.price
                        );
                        controller.requeue(intent);
                        return Ok(());
                    }
                    debug!("↩️  Close would cross the book, retrying @ {}", price);
                }
                Err(e) if e.is_transient() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!("🔁 Close placement failed (attempt {}): {}, retrying in {:?}", attempt + 1, e, delay);
                    if !self.shutdown.sleep(delay).await {
                        controller.requeue(intent);
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        }

        warn!("⚠️  Close ladder exhausted, closing {} with a market order", intent.quantity);
        self.market_close(OrderIntent::taker(intent.side, intent.price, intent.quantity)).await
    }
}

/// Move a rejected post-only close one tick beyond the touch on its own side
pub fn reprice_outside_book(side: Side, price: f64, quote: &Quote, tick_size: f64) -> f64 {
    let adjusted = match side {
        Side::Sell => price.max(quote.bid + tick_size).max(quote.ask),
        Side::Buy => price.min(quote.ask - tick_size).min(quote.bid),
    };
    round_to_tick(adjusted, tick_size)
}
