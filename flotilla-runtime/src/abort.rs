use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
#[error("The sleep was aborted before it elapsed.")]
pub struct SleepAborted;

#[derive(Debug, Clone)]
/// A shared abort signal.
///
/// Once an abort has been requested it stays requested, every clone of the
/// source observes it.
pub struct AbortSource(Arc<watch::Sender<bool>>);

impl Default for AbortSource {
    fn default() -> Self {
        Self(Arc::new(watch::channel(false).0))
    }
}

impl AbortSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an abort, waking every task waiting on the source.
    pub fn request_abort(&self) {
        let previous = self.0.send_replace(true);
        if !previous {
            debug!("Abort has been requested.");
        }
    }

    #[inline]
    /// Returns if an abort has been requested.
    pub fn abort_requested(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once an abort has been requested.
    pub async fn aborted(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Sleeps for the given duration unless an abort is requested first.
    pub async fn sleep_abortable(&self, duration: Duration) -> Result<(), SleepAborted> {
        tokio::select! {
            biased;

            _ = self.aborted() => Err(SleepAborted),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let source = AbortSource::new();
        let start = Instant::now();

        source
            .sleep_abortable(Duration::from_secs(5))
            .await
            .expect("Sleep should not be aborted");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_aborted() {
        let source = AbortSource::new();
        let start = Instant::now();

        let sleeper = tokio::spawn({
            let source = source.clone();
            async move { source.sleep_abortable(Duration::from_secs(5)).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        source.request_abort();

        let result = sleeper.await.unwrap();
        assert!(result.is_err(), "Sleep should be aborted.");
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(source.abort_requested());
    }

    #[tokio::test]
    async fn test_already_aborted_sleep_returns_immediately() {
        let source = AbortSource::new();
        source.request_abort();
        source.request_abort();

        let result = source.sleep_abortable(Duration::from_secs(3600)).await;
        assert!(result.is_err());
    }
}
