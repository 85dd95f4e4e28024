// Simple market maker against the paper venue

mod common;

use common::{approx_eq, cross_resting, fast_engine, fast_retry, mm_params, paper_venue, temp_record, wait_until};
use perp_grid_bot::clients::paper::PaperExchange;
use perp_grid_bot::clients::SharedClient;
use perp_grid_bot::core::{GracefulShutdown, MarketMakerRunner, Side, Spread};
use perp_grid_bot::{MarketMakerParams, TradingError};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SECS_5: Duration = Duration::from_secs(5);

fn runner(venue: &Arc<PaperExchange>, params: MarketMakerParams) -> (TempDir, GracefulShutdown, MarketMakerRunner) {
    let (dir, record) = temp_record("paper_ETH");
    let shutdown = GracefulShutdown::new();
    let client: SharedClient = venue.clone();
    let runner =
        MarketMakerRunner::new(client, params, fast_engine(), shutdown.clone(), record).with_retry_policy(fast_retry());
    (dir, shutdown, runner)
}

fn resting(venue: &PaperExchange, side: Side) -> Vec<f64> {
    venue.open_orders().iter().filter(|o| o.side == side).map(|o| o.price).collect()
}

#[tokio::test]
async fn test_quotes_both_sides_and_cancels_on_shutdown() {
    let venue = paper_venue("paper");
    let (dir, shutdown, mut runner) = runner(&venue, mm_params());

    let driver = async {
        let quoted = wait_until(|| venue.open_orders().len() == 2, SECS_5).await;
        let snapshot = (resting(&venue, Side::Buy), resting(&venue, Side::Sell));
        // A few unchanged refreshes must not churn the quotes
        tokio::time::sleep(Duration::from_millis(80)).await;
        let placed = venue.placed_orders();
        shutdown.initiate_shutdown();
        (quoted, snapshot, placed)
    };
    let (summary, (quoted, (buys, sells), placed)) = tokio::join!(runner.run(), driver);
    let summary = summary.expect("market maker failed");

    assert!(quoted);
    // 0.30% around the 2000.00 mid
    assert_eq!(buys.len(), 1);
    assert_eq!(sells.len(), 1);
    assert!(approx_eq(buys[0], 1997.0));
    assert!(approx_eq(sells[0], 2003.0));
    assert_eq!(placed, 2);
    assert_eq!(summary.quotes_placed, 2);
    assert!(summary.refreshes >= 2);

    assert!(venue.open_orders().is_empty());
    assert!(venue.is_disconnected());
    assert!(approx_eq(summary.final_position, 0.0));

    let content = fs::read_to_string(dir.path().join("paper_ETH_orders.csv")).unwrap();
    assert_eq!(content.lines().count(), 3);
}

#[tokio::test]
async fn test_quotes_follow_the_market() {
    let venue = paper_venue("paper");
    let params = MarketMakerParams { spread: Spread::Ticks(5), ..mm_params() };
    let (_dir, shutdown, mut runner) = runner(&venue, params);

    let driver = async {
        let first = wait_until(|| resting(&venue, Side::Buy) == vec![1999.95], SECS_5).await;
        // Three ticks up, through neither quote
        venue.set_quote(2000.02, 2000.04);
        let moved = wait_until(
            || resting(&venue, Side::Buy) == vec![1999.98] && resting(&venue, Side::Sell) == vec![2000.08],
            SECS_5,
        )
        .await;
        shutdown.initiate_shutdown();
        (first, moved)
    };
    let (summary, (first, moved)) = tokio::join!(runner.run(), driver);
    let summary = summary.expect("market maker failed");

    assert!(first);
    assert!(moved);
    assert_eq!(summary.quotes_placed, 4);
    assert!(approx_eq(summary.final_position, 0.0));
    assert!(venue.open_orders().is_empty());
}

#[tokio::test]
async fn test_filled_quote_disables_side_past_threshold() {
    let venue = paper_venue("paper");
    let params = MarketMakerParams { position_threshold: 0.05, ..mm_params() };
    let (_dir, shutdown, mut runner) = runner(&venue, params);

    let driver = async {
        let quoted = wait_until(|| venue.open_orders().len() == 2, SECS_5).await;
        // Buy at 1997.00 fills, book drops to 1996.00 / 1996.02
        cross_resting(&venue, Side::Buy);
        let requoted = wait_until(
            || {
                let open = venue.open_orders();
                open.len() == 1 && open[0].side == Side::Sell && open[0].price < 2000.0
            },
            SECS_5,
        )
        .await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let buys_after = resting(&venue, Side::Buy);
        shutdown.initiate_shutdown();
        (quoted, requoted, buys_after)
    };
    let (summary, (quoted, requoted, buys_after)) = tokio::join!(runner.run(), driver);
    let summary = summary.expect("market maker failed");

    assert!(quoted);
    assert!(requoted);
    assert!(buys_after.is_empty());
    assert!(approx_eq(summary.final_position, 0.1));
    assert_eq!(summary.flatten_orders, 0);
}

#[tokio::test]
async fn test_position_at_limit_is_flattened_before_quoting() {
    let venue = paper_venue("paper");
    venue.set_position(2.0);
    let (_dir, shutdown, mut runner) = runner(&venue, mm_params());

    let driver = async {
        let flat_and_quoted =
            wait_until(|| approx_eq(venue.position(), 0.0) && venue.open_orders().len() == 2, SECS_5).await;
        shutdown.initiate_shutdown();
        flat_and_quoted
    };
    let (summary, flat_and_quoted) = tokio::join!(runner.run(), driver);
    let summary = summary.expect("market maker failed");

    assert!(flat_and_quoted);
    assert_eq!(summary.flatten_orders, 1);
    assert!(approx_eq(summary.final_position, 0.0));
}

#[tokio::test]
async fn test_crossed_book_skips_refresh() {
    let venue = paper_venue("paper");
    venue.set_quote(2000.01, 1999.99);
    let (_dir, shutdown, mut runner) = runner(&venue, mm_params());

    let driver = async {
        tokio::time::sleep(Duration::from_millis(80)).await;
        let placed_while_crossed = venue.placed_orders();
        venue.set_quote(1999.99, 2000.01);
        let quoted = wait_until(|| venue.open_orders().len() == 2, SECS_5).await;
        shutdown.initiate_shutdown();
        (placed_while_crossed, quoted)
    };
    let (summary, (placed_while_crossed, quoted)) = tokio::join!(runner.run(), driver);

    assert!(summary.is_ok());
    assert_eq!(placed_while_crossed, 0);
    assert!(quoted);
}

#[tokio::test]
async fn test_fatal_error_halts_and_disconnects() {
    let venue = paper_venue("paper");
    venue.inject_failure(TradingError::Authentication("key revoked".to_string()));
    let (_dir, _shutdown, mut runner) = runner(&venue, mm_params());

    let result = runner.run().await;

    assert!(matches!(result, Err(TradingError::Authentication(_))));
    assert!(venue.open_orders().is_empty());
    assert!(venue.is_disconnected());
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let venue = paper_venue("paper");
    venue.inject_failure(TradingError::Network("connection reset".to_string()));
    let (_dir, shutdown, mut runner) = runner(&venue, mm_params());

    let driver = async {
        let quoted = wait_until(|| venue.open_orders().len() == 2, SECS_5).await;
        shutdown.initiate_shutdown();
        quoted
    };
    let (summary, quoted) = tokio::join!(runner.run(), driver);

    assert!(quoted);
    assert_eq!(summary.expect("market maker failed").quotes_placed, 2);
}
