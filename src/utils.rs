//! Miscellaneous helper utilities.

use crate::errors::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Await a collaborator call, failing with [`AppError::Timeout`] after `limit`.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AppError::Timeout(format!("{what} after {}ms", limit.as_millis())))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_results() {
        let v = with_timeout(Duration::from_millis(50), "fast", async { Ok(7) })
            .await
            .expect("completes in time");
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let res: Result<()> = with_timeout(Duration::from_millis(50), "ticker BTCUSDT", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        match res {
            Err(AppError::Timeout(msg)) => assert_eq!(msg, "ticker BTCUSDT after 50ms"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
