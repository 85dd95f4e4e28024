// Bounded retries for transient exchange errors and cooperative shutdown

use crate::error::TradingResult;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{info, warn};

/// Retry mechanism with exponential backoff.
///
/// Only errors classified as transient are retried; anything else is
/// returned on the first failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
            jitter: true,
        }
    }

    /// Deterministic delays, used by tests
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor).min(self.max_delay.as_millis() as f64);
        let millis = if self.jitter && millis > 0.0 {
            millis * rand::thread_rng().gen_range(0.8..1.2)
        } else {
            millis
        };
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a fatal error, or the
    /// retry budget is spent (the last transient error is returned).
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> TradingResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = TradingResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(result) => return Ok(result),
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "🔁 {} failed (attempt {}/{}), retrying in {:?}: {}",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        delay,
                        error
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,                          // 3 retries
            Duration::from_millis(200), // 200ms base delay
            Duration::from_secs(5),     // 5s max delay
            2.0,                        // Double delay each time
        )
    }
}

/// Graceful shutdown handler.
///
/// Order placement and cancellation hold an `OperationGuard`; shutdown waits
/// for outstanding guards before the process exits.
#[derive(Debug, Clone, Default)]
pub struct GracefulShutdown {
    shutdown_signal: Arc<AtomicBool>,
    active_operations: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initiate_shutdown(&self) {
        if !self.shutdown_signal.swap(true, Ordering::SeqCst) {
            info!("🛑 Graceful shutdown initiated");
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_signal.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutting_down() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration`; returns false when interrupted by shutdown
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }

    pub fn register_operation(&self) -> OperationGuard {
        self.active_operations.fetch_add(1, Ordering::SeqCst);
        OperationGuard { counter: self.active_operations.clone() }
    }

    pub fn active_operations(&self) -> u32 {
        self.active_operations.load(Ordering::SeqCst)
    }

    /// Wait until no operation is in flight; false on timeout
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let start = Instant::now();

        while start.elapsed() < timeout {
            let active_count = self.active_operations();
            if active_count == 0 {
                info!("✅ All operations completed gracefully");
                return true;
            }
            info!("⏳ Waiting for {} operations to complete...", active_count);
            sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.active_operations();
        if remaining > 0 {
            warn!("⚠️  Shutdown timeout: {} operations still active", remaining);
            return false;
        }
        true
    }

    /// Trigger shutdown on Ctrl-C
    pub fn listen_for_ctrl_c(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⌨️  Interrupt received");
                shutdown.initiate_shutdown();
            }
        });
    }
}

pub struct OperationGuard {
    counter: Arc<AtomicU32>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use crate::error::TradingError;

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(1), Duration::from_millis(5), 2.0).without_jitter()
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(3)
            .execute("place", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TradingError::InvalidNonce("stale".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: TradingResult<()> = fast_policy(3)
            .execute("place", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TradingError::Authentication("bad key".into())) }
            })
            .await;
        assert!(matches!(result, Err(TradingError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let calls = AtomicUsize::new(0);
        let result: TradingResult<()> = fast_policy(2)
            .execute("cancel", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TradingError::Timeout("slow".into())) }
            })
            .await;
        assert!(matches!(result, Err(TradingError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(500), 2.0).without_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(5), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_guards() {
        let shutdown = GracefulShutdown::new();
        let guard = shutdown.register_operation();
        shutdown.initiate_shutdown();
        assert!(shutdown.is_shutting_down());
        assert!(!shutdown.wait_for_completion(Duration::from_millis(150)).await);

        drop(guard);
        assert!(shutdown.wait_for_completion(Duration::from_millis(150)).await);
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_shutdown() {
        let shutdown = GracefulShutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.initiate_shutdown();
        });
        assert!(!shutdown.sleep(Duration::from_secs(10)).await);
        assert!(shutdown.is_shutting_down());
    }
}
