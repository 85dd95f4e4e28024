// Simple market-making loop: one quote per side, refreshed on a timer

use crate::clients::{fetch_valid_bbo, SharedClient};
use crate::config::{EngineConfig, MarketMakerParams};
use crate::core::error_handling::{GracefulShutdown, RetryPolicy};
use crate::core::market_maker::{MarketMakerPolicy, QuoteDecision};
use crate::core::types::{OrderStatus, Side};
use crate::error::{TradingError, TradingResult};
use crate::recorder::OrdersRecord;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct MarketMakerSummary {
    pub refreshes: u32,
    pub quotes_placed: u32,
    pub flatten_orders: u32,
    pub final_position: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct RestingQuote {
    order_id: String,
    price: f64,
}

#[derive(Debug, Default)]
struct QuoteSlots {
    buy: Option<RestingQuote>,
    sell: Option<RestingQuote>,
}

impl QuoteSlots {
    fn get(&self, side: Side) -> Option<&RestingQuote> {
        match side {
            Side::Buy => self.buy.as_ref(),
            Side::Sell => self.sell.as_ref(),
        }
    }

    fn slot(&mut self, side: Side) -> &mut Option<RestingQuote> {
        match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        }
    }
}

pub struct MarketMakerRunner {
    client: SharedClient,
    params: MarketMakerParams,
    engine: EngineConfig,
    retry: RetryPolicy,
    shutdown: GracefulShutdown,
    record: OrdersRecord,
    quotes: QuoteSlots,
    refreshes: u32,
    quotes_placed: u32,
    flatten_orders: u32,
}

impl MarketMakerRunner {
    pub fn new(
        client: SharedClient,
        params: MarketMakerParams,
        engine: EngineConfig,
        shutdown: GracefulShutdown,
        record: OrdersRecord,
    ) -> Self {
        let retry = engine.retry_policy();
        Self {
            client,
            params,
            engine,
            retry,
            shutdown,
            record,
            quotes: QuoteSlots::default(),
            refreshes: 0,
            quotes_placed: 0,
            flatten_orders: 0,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Quote until shutdown, then pull both quotes and disconnect
    pub async fn run(&mut self) -> TradingResult<MarketMakerSummary> {
        let policy = match self.prepare().await {
            Ok(policy) => policy,
            Err(e) => {
                error!("❌ Market maker not started [{}]: {}", e.category(), e);
                self.disconnect().await;
                return Err(e);
            }
        };

        let settings = policy.settings();
        info!(
            "🚀 Market making {} on {}: {} per side, spread {:?}, refresh {:?}",
            self.params.ticker,
            self.client.name(),
            settings.quantity,
            settings.spread,
            self.params.refresh_interval
        );
        info!(
            "🎯 Target position {}, max {}, threshold {}, skew {}",
            settings.target_position, settings.max_position, settings.position_threshold, settings.inventory_skew
        );

        let result = self.run_loop(&policy).await;
        if let Err(e) = &result {
            error!("❌ Market maker halted [{}]: {}", e.category(), e);
        }

        self.shutdown.wait_for_completion(self.engine.shutdown_timeout()).await;
        for side in [Side::Buy, Side::Sell] {
            if let Err(e) = self.cancel_side(side).await {
                error!("❌ Could not cancel {} quote on exit: {}", side, e);
            }
        }
        let result = match result {
            Ok(()) => self.client.get_position().await,
            Err(e) => Err(e),
        };
        self.disconnect().await;
        let final_position = result?;

        info!("👋 Market maker stopped after {} refreshes, position {}", self.refreshes, final_position);
        Ok(MarketMakerSummary {
            refreshes: self.refreshes,
            quotes_placed: self.quotes_placed,
            flatten_orders: self.flatten_orders,
            final_position,
        })
    }

    async fn prepare(&self) -> TradingResult<MarketMakerPolicy> {
        self.client.connect().await?;
        let info = self.client.contract_info().await?;
        MarketMakerPolicy::new(self.params.quote_settings(), info.tick_size)
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("⚠️  Disconnect from {} failed: {}", self.client.name(), e);
        }
    }

    async fn run_loop(&mut self, policy: &MarketMakerPolicy) -> TradingResult<()> {
        loop {
            if self.shutdown.is_shutting_down() {
                return Ok(());
            }
            match self.refresh(policy).await {
                Ok(()) => {}
                Err(e) if e.is_transient() || matches!(e, TradingError::InvalidMarketData(_)) => {
                    warn!("⚠️  Quote refresh skipped: {}", e);
                }
                Err(e) => return Err(e),
            }
            self.refreshes += 1;
            if !self.shutdown.sleep(self.params.refresh_interval).await {
                return Ok(());
            }
        }
    }

    async fn refresh(&mut self, policy: &MarketMakerPolicy) -> TradingResult<()> {
        let quote = fetch_valid_bbo(self.client.as_ref()).await?;
        self.forget_closed_quotes().await?;
        let net_position = self.client.get_position().await?;

        match policy.decide(&quote, net_position) {
            QuoteDecision::Flatten { side, quantity } => {
                warn!(
                    "🚨 Net position {} at the limit {}, market {} {}",
                    net_position,
                    policy.settings().max_position,
                    side,
                    quantity
                );
                self.cancel_side(Side::Buy).await?;
                self.cancel_side(Side::Sell).await?;
                self.flatten(side, quantity).await
            }
            QuoteDecision::Quote(pair) => {
                for side in [Side::Buy, Side::Sell] {
                    match pair.price(side) {
                        Some(price) => self.ensure_quote(policy, side, price).await?,
                        None => self.cancel_side(side).await?,
                    }
                }
                Ok(())
            }
        }
    }

    /// Stop tracking quotes that filled or were cancelled on the venue
    async fn forget_closed_quotes(&mut self) -> TradingResult<()> {
        if self.quotes.buy.is_none() && self.quotes.sell.is_none() {
            return Ok(());
        }
        let active = self.client.get_active_orders().await?;
        for side in [Side::Buy, Side::Sell] {
            let gone = self
                .quotes
                .get(side)
                .is_some_and(|resting| !active.iter().any(|o| o.order_id == resting.order_id));
            if let Some(resting) = gone.then(|| self.quotes.slot(side).take()).flatten() {
                debug!("📤 {} quote {} is no longer resting", side, resting.order_id);
            }
        }
        Ok(())
    }

    async fn ensure_quote(&mut self, policy: &MarketMakerPolicy, side: Side, price: f64) -> TradingResult<()> {
        if let Some(resting_price) = self.quotes.get(side).map(|resting| resting.price) {
            if !policy.needs_replace(resting_price, price) {
                return Ok(());
            }
            self.cancel_side(side).await?;
        }

        let client = self.client.clone();
        let quantity = self.params.quantity;
        let placed = {
            let _guard = self.shutdown.register_operation();
            self.retry
                .execute("place quote", |_| client.place_limit_order(side, price, quantity))
                .await?
        };
        if placed.status == OrderStatus::Rejected {
            debug!("↩️  {} quote @ {} would cross, waiting for the next refresh", side, price);
            return Ok(());
        }

        self.record.record(client.name(), side, price, quantity)?;
        self.quotes_placed += 1;
        info!("📝 {} quote {} @ {}", side, placed.order_id, price);
        *self.quotes.slot(side) = Some(RestingQuote { order_id: placed.order_id, price });
        Ok(())
    }

    async fn cancel_side(&mut self, side: Side) -> TradingResult<()> {
        let Some(resting) = self.quotes.slot(side).take() else {
            return Ok(());
        };

        let client = self.client.clone();
        let _guard = self.shutdown.register_operation();
        let cancelled = self.retry.execute("cancel quote", |_| client.cancel_order(&resting.order_id)).await;
        match cancelled {
            Ok(result) => {
                info!("🗑️  {} quote {} cancelled ({:?})", side, resting.order_id, result.status);
                Ok(())
            }
            Err(TradingError::OrderNotFound(_)) => Ok(()),
            Err(e) => {
                // Still resting as far as we know; the next refresh retries
                *self.quotes.slot(side) = Some(resting);
                Err(e)
            }
        }
    }

    async fn flatten(&mut self, side: Side, quantity: f64) -> TradingResult<()> {
        let client = self.client.clone();
        let result = {
            let _guard = self.shutdown.register_operation();
            self.retry
                .execute("flatten", |_| client.place_market_order(side, quantity))
                .await?
        };
        self.record.record(client.name(), side, result.price, quantity)?;
        self.flatten_orders += 1;
        info!("🧹 Flatten {} {} filled @ {}", side, quantity, result.price);
        Ok(())
    }
}
