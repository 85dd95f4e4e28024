// Grid run loop against the paper venue

mod common;

use common::{
    approx_eq, cross_resting, fast_engine, fast_retry, grid_params, paper_venue, resting_spacing_holds, temp_record,
    wait_until,
};
use perp_grid_bot::clients::{ExchangeClient, SharedClient};
use perp_grid_bot::core::pricing::GridStep;
use perp_grid_bot::core::{GracefulShutdown, GridOutcome, GridRunner, Side};
use perp_grid_bot::TradingError;
use std::fs;
use std::time::Duration;

const SECS_5: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_entry_fill_places_take_profit() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    let record_path = record.path().to_path_buf();
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, grid_params(), fast_engine(), GracefulShutdown::new(), record).with_retry_policy(fast_retry());

    let driver = wait_until(|| cross_resting(&venue, Side::Buy), SECS_5);
    let (summary, crossed) = tokio::join!(runner.run(), driver);
    let summary = summary.expect("grid run failed");

    assert!(crossed);
    assert_eq!(summary.outcome, GridOutcome::Finished);
    assert_eq!(summary.filled_entries, 1);
    assert_eq!(summary.closes_placed, 1);
    // Read from the venue before the session was closed
    assert!(approx_eq(summary.final_position, 0.1));
    assert!(venue.is_disconnected());

    // Entry at the bid 1999.99, take-profit 0.02% above, rounded to the tick
    let open = venue.open_orders();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].side, Side::Sell);
    assert!(approx_eq(open[0].price, 2000.39));

    let content = fs::read_to_string(record_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "exchange,timestamp,side,price,quantity");
    assert_eq!(lines.len(), 3);
    assert!(lines[2].contains(",sell,"));
}

#[tokio::test]
async fn test_stop_price_ends_run_without_orders() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    let params = perp_grid_bot::GridParams { stop_price: Some(1995.0), iterations: None, ..grid_params() };
    let client: SharedClient = venue.clone();
    let mut runner = GridRunner::new(client, params, fast_engine(), GracefulShutdown::new(), record);

    let summary = runner.run().await.unwrap();

    assert_eq!(summary.outcome, GridOutcome::Stopped { price: 2000.01 });
    assert_eq!(venue.placed_orders(), 0);
}

#[tokio::test]
async fn test_boost_closes_at_market() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    let params = perp_grid_bot::GridParams { boost: true, ..grid_params() };
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, params, fast_engine(), GracefulShutdown::new(), record).with_retry_policy(fast_retry());

    let driver = wait_until(|| cross_resting(&venue, Side::Buy), SECS_5);
    let (summary, _) = tokio::join!(runner.run(), driver);
    let summary = summary.unwrap();

    assert_eq!(summary.outcome, GridOutcome::Finished);
    assert_eq!(summary.closes_placed, 1);
    assert!(approx_eq(summary.final_position, 0.0));
    assert!(venue.open_orders().is_empty());
}

#[tokio::test]
async fn test_transient_nonce_error_is_retried() {
    let venue = paper_venue("paper");
    venue.inject_failure(TradingError::InvalidNonce("nonce too low".to_string()));
    let (_dir, record) = temp_record("paper_ETH");
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, grid_params(), fast_engine(), GracefulShutdown::new(), record).with_retry_policy(fast_retry());

    let driver = wait_until(|| cross_resting(&venue, Side::Buy), SECS_5);
    let (summary, _) = tokio::join!(runner.run(), driver);

    assert_eq!(summary.unwrap().outcome, GridOutcome::Finished);
    // The failed attempt never reached the book
    assert_eq!(venue.placed_orders(), 2);
}

#[tokio::test]
async fn test_fatal_error_halts_run() {
    let venue = paper_venue("paper");
    venue.inject_failure(TradingError::Authentication("bad signature".to_string()));
    let (_dir, record) = temp_record("paper_ETH");
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, grid_params(), fast_engine(), GracefulShutdown::new(), record).with_retry_policy(fast_retry());

    let result = runner.run().await;

    assert!(matches!(result, Err(TradingError::Authentication(_))));
    assert_eq!(venue.placed_orders(), 0);
}

#[tokio::test]
async fn test_polling_fallback_without_push_channel() {
    let venue = paper_venue("paper");
    venue.drop_push_channel();
    let (_dir, record) = temp_record("paper_ETH");
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, grid_params(), fast_engine(), GracefulShutdown::new(), record).with_retry_policy(fast_retry());

    let driver = wait_until(|| cross_resting(&venue, Side::Buy), SECS_5);
    let (summary, crossed) = tokio::join!(runner.run(), driver);

    assert!(crossed);
    let summary = summary.unwrap();
    assert_eq!(summary.outcome, GridOutcome::Finished);
    assert_eq!(summary.closes_placed, 1);
}

#[tokio::test]
async fn test_grid_step_holds_entries_near_resting_close() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    let shutdown = GracefulShutdown::new();
    let params = perp_grid_bot::GridParams {
        grid_step: GridStep::Percent(0.1),
        iterations: None,
        ..grid_params()
    };
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, params, fast_engine(), shutdown.clone(), record).with_retry_policy(fast_retry());

    let driver = async {
        assert!(wait_until(|| cross_resting(&venue, Side::Buy), SECS_5).await);
        assert!(wait_until(|| venue.placed_orders() == 2, SECS_5).await);
        // Next close would land ~0.05% from the resting one
        tokio::time::sleep(Duration::from_millis(300)).await;
        let placed = venue.placed_orders();
        shutdown.initiate_shutdown();
        placed
    };
    let (summary, placed) = tokio::join!(runner.run(), driver);

    assert_eq!(placed, 2);
    let summary = summary.unwrap();
    assert_eq!(summary.outcome, GridOutcome::Shutdown);
    assert_eq!(summary.filled_entries, 1);
}

#[tokio::test]
async fn test_pause_price_holds_until_market_returns() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    let shutdown = GracefulShutdown::new();
    let params = perp_grid_bot::GridParams { pause_price: Some(1995.0), iterations: None, ..grid_params() };
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, params, fast_engine(), shutdown.clone(), record).with_retry_policy(fast_retry());

    let driver = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let while_paused = venue.placed_orders();
        venue.set_quote(1990.0, 1990.02);
        let resumed = wait_until(|| venue.placed_orders() == 1, SECS_5).await;
        shutdown.initiate_shutdown();
        (while_paused, resumed)
    };
    let (summary, (while_paused, resumed)) = tokio::join!(runner.run(), driver);

    assert_eq!(while_paused, 0);
    assert!(resumed);
    assert_eq!(summary.unwrap().outcome, GridOutcome::Shutdown);
    // The unfilled entry was cancelled on the way out
    assert!(venue.open_orders().is_empty());
}

#[tokio::test]
async fn test_repriced_close_respects_grid_step() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    let params = perp_grid_bot::GridParams { grid_step: GridStep::Percent(0.5), ..grid_params() };
    // Close left over from an earlier run, 0.55% above the next take-profit
    venue.place_limit_order(Side::Sell, 2011.4, 0.1).await.unwrap();
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, params, fast_engine(), GracefulShutdown::new(), record).with_retry_policy(fast_retry());

    // Fill the entry, then gap the book up before the take-profit goes out
    let driver = wait_until(
        || {
            if venue.open_orders().iter().any(|o| o.side == Side::Buy) {
                cross_resting(&venue, Side::Buy);
                venue.set_quote(2005.00, 2005.02);
                true
            } else {
                false
            }
        },
        SECS_5,
    );
    let (summary, gapped) = tokio::join!(runner.run(), driver);

    assert!(gapped);
    let summary = summary.unwrap();
    assert_eq!(summary.filled_entries, 1);
    // 2005.02 would sit 0.32% under the resting close, so nothing was posted
    assert_eq!(summary.closes_placed, 0);
    assert!(resting_spacing_holds(&venue, Side::Sell, 0.5));
    let sells: Vec<f64> = venue.open_orders().iter().filter(|o| o.side == Side::Sell).map(|o| o.price).collect();
    assert_eq!(sells, vec![2011.4]);
}

#[tokio::test]
async fn test_rejected_entry_backs_off_before_requote() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    let shutdown = GracefulShutdown::new();
    let mut engine = fast_engine();
    engine.min_poll_interval_ms = 100;
    let client: SharedClient = venue.clone();
    let mut runner =
        GridRunner::new(client, grid_params(), engine, shutdown.clone(), record).with_retry_policy(fast_retry());

    // Every entry is rejected as crossing
    venue.set_reject_limit_orders(true);
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown.initiate_shutdown();
        venue.placed_orders()
    };
    let (summary, placed) = tokio::join!(runner.run(), stopper);

    assert_eq!(summary.unwrap().outcome, GridOutcome::Shutdown);
    // One attempt per poll interval, not a tight loop
    assert!((1..=4).contains(&placed), "placed {} entries", placed);
}

#[tokio::test]
async fn test_setup_failure_still_disconnects() {
    let venue = paper_venue("paper");
    let (_dir, record) = temp_record("paper_ETH");
    // Percent take-profit with a tick grid step cannot build a spacing policy
    let params = perp_grid_bot::GridParams { grid_step: GridStep::Ticks(5), ..grid_params() };
    let client: SharedClient = venue.clone();
    let mut runner = GridRunner::new(client, params, fast_engine(), GracefulShutdown::new(), record);

    let result = runner.run().await;

    assert!(matches!(result, Err(TradingError::ConfigValidation(_))));
    assert_eq!(venue.placed_orders(), 0);
    assert!(venue.is_disconnected());
}
