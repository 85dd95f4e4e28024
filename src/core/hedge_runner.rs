//! Hedged pyramid run
//!
//! Each step posts a maker order on the primary venue sized by the pyramid
//! state machine. Whatever fills is immediately offset with a taker order on
//! the secondary venue, then both legs are reconciled. The time from seeing
//! the primary fill to the secondary acknowledgement is bounded.

use crate::clients::updates::{OrderUpdateFeed, WaitOutcome};
use crate::clients::{fetch_valid_bbo, SharedClient};
use crate::config::{EngineConfig, HedgeConfig, HedgeParams};
use crate::core::error_handling::{GracefulShutdown, RetryPolicy};
use crate::core::hedge::{HedgePositionPair, HedgeReconciler};
use crate::core::pyramid::{PyramidCycle, Transition};
use crate::core::types::{OrderResult, OrderStatus, Side, QTY_EPSILON};
use crate::error::{TradingError, TradingResult};
use crate::recorder::OrdersRecord;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgeOutcome {
    Completed,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HedgeSummary {
    pub outcome: HedgeOutcome,
    pub completed_cycles: u32,
    pub primary_fills: u32,
    pub positions: HedgePositionPair,
}

pub struct HedgeRunner {
    primary: SharedClient,
    secondary: SharedClient,
    params: HedgeParams,
    engine: EngineConfig,
    hedge: HedgeConfig,
    retry: RetryPolicy,
    shutdown: GracefulShutdown,
    primary_record: OrdersRecord,
    secondary_record: OrdersRecord,
    primary_fills: u32,
}

impl HedgeRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primary: SharedClient,
        secondary: SharedClient,
        params: HedgeParams,
        engine: EngineConfig,
        hedge: HedgeConfig,
        shutdown: GracefulShutdown,
        primary_record: OrdersRecord,
        secondary_record: OrdersRecord,
    ) -> Self {
        let retry = engine.retry_policy();
        Self {
            primary,
            secondary,
            params,
            engine,
            hedge,
            retry,
            shutdown,
            primary_record,
            secondary_record,
            primary_fills: 0,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&mut self) -> TradingResult<HedgeSummary> {
        let reconciler = HedgeReconciler::new(self.hedge.tolerance);
        let (mut cycle, mut pair) = match self.prepare(&reconciler).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("❌ Hedge run not started [{}]: {}", e.category(), e);
                self.disconnect_all().await;
                return Err(e);
            }
        };

        info!(
            "🚀 Hedge run {} ⇄ {} on {}: {} steps of {} up to {}, {} cycles",
            self.primary.name(),
            self.secondary.name(),
            self.params.ticker,
            self.params.direction,
            self.params.quantity,
            self.params.max_position,
            self.params.iterations
        );

        // Only the maker being waited on matters; stale requote updates are dropped
        let mut feed =
            OrderUpdateFeed::subscribe(self.primary.as_ref(), self.engine.min_poll_interval()).ignore_other_orders();
        let result = self.run_loop(&mut cycle, &mut feed, &reconciler, &mut pair).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("❌ Hedge run halted [{}]: {}", e.category(), e);
                self.shutdown.wait_for_completion(self.engine.shutdown_timeout()).await;
                self.disconnect_all().await;
                return Err(e);
            }
        };

        self.shutdown.wait_for_completion(self.engine.shutdown_timeout()).await;
        let positions = self.close_remaining().await;
        self.disconnect_all().await;
        let positions = positions?;

        Ok(HedgeSummary {
            outcome,
            completed_cycles: cycle.completed_cycles(),
            primary_fills: self.primary_fills,
            positions,
        })
    }

    async fn run_loop(
        &mut self,
        cycle: &mut PyramidCycle,
        feed: &mut OrderUpdateFeed,
        reconciler: &HedgeReconciler,
        pair: &mut HedgePositionPair,
    ) -> TradingResult<HedgeOutcome> {
        let primary = self.primary.clone();
        // Primary fills too small to hedge on their own, signed
        let mut unhedged = 0.0;

        loop {
            if self.shutdown.is_shutting_down() {
                return Ok(HedgeOutcome::Shutdown);
            }
            if cycle.completed_cycles() >= self.params.iterations {
                info!("🏁 {} cycles completed", cycle.completed_cycles());
                return Ok(HedgeOutcome::Completed);
            }

            let step = cycle.next_step();
            let quote = match fetch_valid_bbo(primary.as_ref()).await {
                Ok(quote) => quote,
                Err(e) if e.is_transient() || matches!(e, TradingError::InvalidMarketData(_)) => {
                    warn!("⚠️  No usable quote: {}", e);
                    self.shutdown.sleep(self.engine.min_poll_interval()).await;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let price = quote.maker_price(step.side);

            let placed = {
                let _guard = self.shutdown.register_operation();
                self.retry
                    .execute("place maker", |_| primary.place_limit_order(step.side, price, step.quantity))
                    .await?
            };
            if placed.status == OrderStatus::Rejected {
                debug!("↩️  Maker @ {} would cross, re-quoting", price);
                continue;
            }
            self.primary_record.record(primary.name(), step.side, price, step.quantity)?;
            debug!("📥 {:?} step {} {} @ {} (final build: {})", step.phase, step.side, step.quantity, price, step.final_build);

            let outcome = feed
                .wait_for_order(primary.as_ref(), &placed.order_id, self.params.fill_timeout, &self.shutdown)
                .await?;
            let filled = match outcome {
                WaitOutcome::Filled(update) | WaitOutcome::Closed(update) => update.filled_quantity,
                WaitOutcome::TimedOut(_) | WaitOutcome::Interrupted(_) => {
                    let cancelled = self.cancel_primary(&placed.order_id).await?;
                    cancelled.filled_quantity
                }
            };

            if filled <= QTY_EPSILON {
                cycle.on_failed_fill();
                info!("⏱️  No fill within {:?}, re-quoting", self.params.fill_timeout);
                continue;
            }

            let fill_seen = Instant::now();
            self.primary_fills += 1;
            pair.record_primary(step.side.sign() * filled);
            unhedged += step.side.sign() * filled;

            if unhedged.abs() + QTY_EPSILON >= cycle.min_quantity() {
                let hedge_side = Side::closing(unhedged);
                let hedge = self.hedge_fill(hedge_side, unhedged.abs(), fill_seen).await?;
                pair.record_secondary(hedge_side.sign() * hedge.quantity);
                unhedged = 0.0;
            } else {
                info!(
                    "🧮 Fill of {} is below the hedge minimum {}, carrying {:.6} to the next fill",
                    filled,
                    cycle.min_quantity(),
                    unhedged
                );
            }

            match cycle.on_fill(filled)? {
                Transition::EnteredClosing => info!("🔺 Max position {} reached, unwinding", cycle.max_position()),
                Transition::CycleCompleted => info!("🔁 Cycle {} complete", cycle.completed_cycles()),
                Transition::Stay => {}
            }

            *pair = reconciler
                .reconcile(*pair, self.primary.as_ref(), self.secondary.as_ref())
                .await?;
        }
    }

    /// Connect both legs, size the pyramid for the stricter venue minimum and
    /// confirm the legs start out hedged
    async fn prepare(&self, reconciler: &HedgeReconciler) -> TradingResult<(PyramidCycle, HedgePositionPair)> {
        self.primary.connect().await?;
        self.secondary.connect().await?;

        let primary_info = self.primary.contract_info().await?;
        let secondary_info = self.secondary.contract_info().await?;
        let min_quantity = primary_info.min_quantity.max(secondary_info.min_quantity);
        let cycle = PyramidCycle::new(self.params.direction, self.params.quantity, self.params.max_position)?
            .with_min_quantity(min_quantity)?;

        let starting = HedgePositionPair::new(self.primary.get_position().await?, self.secondary.get_position().await?);
        let pair = reconciler
            .reconcile(starting, self.primary.as_ref(), self.secondary.as_ref())
            .await?;
        Ok((cycle, pair))
    }

    async fn disconnect_all(&self) {
        for client in [&self.primary, &self.secondary] {
            if let Err(e) = client.disconnect().await {
                warn!("⚠️  Disconnect from {} failed: {}", client.name(), e);
            }
        }
    }

    async fn cancel_primary(&self, order_id: &str) -> TradingResult<OrderResult> {
        let _guard = self.shutdown.register_operation();
        let primary = self.primary.clone();
        self.retry.execute("cancel maker", |_| primary.cancel_order(order_id)).await
    }

    /// Offset a primary fill on the secondary venue within the lag bound.
    /// Transient failures are retried until the bound runs out.
    async fn hedge_fill(&self, side: Side, quantity: f64, fill_seen: Instant) -> TradingResult<OrderResult> {
        let bound = self.hedge.lag_bound();
        let deadline = fill_seen + bound;
        let secondary = self.secondary.clone();
        let _guard = self.shutdown.register_operation();
        let mut attempt = 0;

        loop {
            match tokio::time::timeout_at(deadline, secondary.place_market_order(side, quantity)).await {
                Ok(Ok(result)) => {
                    let lag = fill_seen.elapsed();
                    info!(
                        "🛡️  Hedged {} {} on {} @ {} ({}ms)",
                        side,
                        quantity,
                        secondary.name(),
                        result.price,
                        lag.as_millis()
                    );
                    self.secondary_record.record(secondary.name(), side, result.price, quantity)?;
                    return Ok(result);
                }
                Ok(Err(e)) if e.is_transient() => {
                    let delay = self.retry.delay_for(attempt).min(deadline.saturating_duration_since(Instant::now()));
                    warn!("🔁 Hedge order failed: {}, retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(TradingError::HedgeLagExceeded {
                        lag_ms: fill_seen.elapsed().as_millis() as u64,
                        bound_ms: bound.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Flatten both venues with market orders
    async fn close_remaining(&self) -> TradingResult<HedgePositionPair> {
        let mut positions = [0.0; 2];

        for (i, client) in [&self.primary, &self.secondary].into_iter().enumerate() {
            let min_quantity = client.contract_info().await?.min_quantity;
            let position = client.get_position().await?;
            if position.abs() + QTY_EPSILON >= min_quantity.max(QTY_EPSILON) {
                let side = Side::closing(position);
                let qty = position.abs();
                info!("🧹 Closing remaining {} {} on {}", side, qty, client.name());
                let _guard = self.shutdown.register_operation();
                let result = self
                    .retry
                    .execute("close remaining", |_| client.place_market_order(side, qty))
                    .await?;
                let record = if i == 0 { &self.primary_record } else { &self.secondary_record };
                record.record(client.name(), side, result.price, qty)?;
            }
            positions[i] = client.get_position().await?;
        }

        Ok(HedgePositionPair::new(positions[0], positions[1]))
    }
}
