//! Retry of store operations that failed on a transient lock.

use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};

/// Exponential backoff for `DatabaseBusy` failures. Other errors are
/// returned immediately.
#[derive(Debug, Clone)]
pub struct StoreRetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Give up after this much time spent retrying
    pub max_elapsed: Duration,
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl StoreRetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_elapsed: Duration::ZERO,
            ..Self::default()
        }
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build();

        backoff::future::retry(policy, || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|err: DomainError| {
                    if err.is_transient() {
                        tracing::debug!(error = %err, "store busy, retrying");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }
}
