// Core order-cycle logic: pricing, state machines and the run loops

pub mod types;
pub mod pricing;
pub mod active_orders;
pub mod coverage;
pub mod price_gate;
pub mod pyramid;
pub mod hedge;
pub mod market_maker;
pub mod cycle_controller;
pub mod error_handling;
pub mod grid_runner;
pub mod hedge_runner;
pub mod mm_runner;

// Re-export commonly used types
pub use types::{ContractInfo, OrderIntent, OrderResult, OrderRole, OrderStatus, OrderUpdate, Quote, Side};
pub use pricing::{Admission, GridStep, SpacingPolicy, TakeProfit};
pub use active_orders::{ActiveOrderSet, CloseOrder};
pub use price_gate::{GateDecision, PriceGate};
pub use pyramid::{Phase, PositionState, PyramidCycle, PyramidStep, Transition};
pub use hedge::{HedgeCheck, HedgePositionPair, HedgeReconciler};
pub use market_maker::{MarketMakerPolicy, QuoteDecision, QuotePair, QuoteSettings, Spread};
pub use cycle_controller::{CloseAction, CycleSettings, HoldReason, OrderCycleController, TickDecision};
pub use error_handling::{GracefulShutdown, OperationGuard, RetryPolicy};
pub use grid_runner::{GridOutcome, GridRunner, GridSummary};
pub use hedge_runner::{HedgeOutcome, HedgeRunner, HedgeSummary};
pub use mm_runner::{MarketMakerRunner, MarketMakerSummary};
