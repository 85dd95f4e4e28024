// Exchange clients consumed by the order cycle

pub mod factory;
pub mod paper;
pub mod updates;

use crate::core::types::{ContractInfo, OrderResult, OrderUpdate, Quote, Side};
use crate::error::{TradingError, TradingResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

// Re-export client types
pub use factory::{ExchangeKind, Credentials};
pub use paper::{PaperExchange, PaperConfig};
pub use updates::OrderUpdateFeed;

/// Contract every venue adapter implements.
///
/// Signing, authentication and wire protocols live behind this trait; the
/// order cycle only sees sides, prices, quantities and order ids.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> TradingResult<()>;

    async fn disconnect(&self) -> TradingResult<()>;

    async fn contract_info(&self) -> TradingResult<ContractInfo>;

    async fn fetch_bbo(&self) -> TradingResult<Quote>;

    /// Post-only limit order
    async fn place_limit_order(&self, side: Side, price: f64, quantity: f64) -> TradingResult<OrderResult>;

    async fn place_market_order(&self, side: Side, quantity: f64) -> TradingResult<OrderResult>;

    async fn cancel_order(&self, order_id: &str) -> TradingResult<OrderResult>;

    async fn get_order(&self, order_id: &str) -> TradingResult<OrderUpdate>;

    async fn get_active_orders(&self) -> TradingResult<Vec<OrderUpdate>>;

    /// Signed position: positive long, negative short
    async fn get_position(&self) -> TradingResult<f64>;

    /// Push channel for order updates, `None` when the venue cannot stream
    fn subscribe_order_updates(&self) -> Option<mpsc::Receiver<OrderUpdate>>;
}

pub type SharedClient = Arc<dyn ExchangeClient>;

/// Fetch the BBO and reject crossed or empty books
pub async fn fetch_valid_bbo(client: &dyn ExchangeClient) -> TradingResult<Quote> {
    let quote = client.fetch_bbo().await?;
    if !quote.is_valid() {
        return Err(TradingError::InvalidMarketData(format!(
            "{}: bid {} / ask {}",
            client.name(),
            quote.bid,
            quote.ask
        )));
    }
    Ok(quote)
}
