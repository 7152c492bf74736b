//! Bounded polling for external conditions.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The condition did not become true within the timeout.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The check itself failed; polling stops at the first failure.
    #[error("Check failed: {0}")]
    Check(E),
}

impl<E> PollError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout(_))
    }
}

/// Runs `check` every `interval` until it returns `true` or `timeout` elapses.
///
/// The first check runs immediately.
pub async fn wait_until<F, Fut, E>(
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<(), PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let poll = async {
        loop {
            if check().await.map_err(PollError::Check)? {
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(PollError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_condition_holds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = tokio::time::Instant::now();

        let result: Result<(), PollError<()>> =
            wait_until(Duration::from_secs(1), Duration::from_secs(60), move || async move {
                Ok(calls.fetch_add(1, Ordering::SeqCst) >= 3)
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let result: Result<(), PollError<()>> =
            wait_until(Duration::from_secs(5), Duration::from_secs(30), || async {
                Ok(false)
            })
            .await;

        assert!(matches!(result, Err(PollError::Timeout(t)) if t == Duration::from_secs(30)));
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_stops_polling() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = wait_until(Duration::from_secs(1), Duration::from_secs(60), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<bool, _>("rpc down")
        })
        .await;

        assert!(matches!(result, Err(PollError::Check("rpc down"))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
