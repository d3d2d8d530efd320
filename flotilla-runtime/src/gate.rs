use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
#[error("The gate has been closed and is no longer admitting operations.")]
pub struct GateClosed;

#[derive(Clone, Default)]
/// A lifecycle barrier for background operations.
///
/// Operations enter the gate and hold a [GateGuard] while they run. Once the
/// gate is closed no new operations are admitted and [Gate::close] resolves
/// when every outstanding guard has been dropped.
pub struct Gate(Arc<GateInner>);

struct GateInner {
    state: Mutex<GateState>,
    drained: Notify,
    closing: watch::Sender<bool>,
}

impl Default for GateInner {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            drained: Notify::new(),
            closing: watch::channel(false).0,
        }
    }
}

#[derive(Default)]
struct GateState {
    closed: bool,
    holders: usize,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the gate, returning a guard which keeps the gate open until dropped.
    pub fn enter(&self) -> Result<GateGuard, GateClosed> {
        let mut state = self.0.state.lock();
        if state.closed {
            return Err(GateClosed);
        }

        state.holders += 1;
        Ok(GateGuard {
            inner: self.0.clone(),
        })
    }

    /// Spawns a task which holds the gate open until it completes.
    pub fn spawn<F>(&self, fut: F) -> Result<JoinHandle<F::Output>, GateClosed>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.enter()?;

        Ok(tokio::spawn(async move {
            let _guard = guard;
            fut.await
        }))
    }

    #[inline]
    /// Returns if the gate has started closing.
    pub fn is_closed(&self) -> bool {
        self.0.state.lock().closed
    }

    #[inline]
    /// The number of operations currently holding the gate open.
    pub fn num_holders(&self) -> usize {
        self.0.state.lock().holders
    }

    /// Resolves once the gate has started closing.
    pub async fn closed(&self) {
        let mut closing = self.0.closing.subscribe();
        let _ = closing.wait_for(|closing| *closing).await;
    }

    /// Closes the gate and waits for all admitted operations to complete.
    ///
    /// Calling this more than once is fine, every caller waits for the drain.
    pub async fn close(&self) {
        self.0.state.lock().closed = true;
        self.0.closing.send_replace(true);

        loop {
            let drained = self.0.drained.notified();
            if self.0.state.lock().holders == 0 {
                break;
            }
            drained.await;
        }
    }
}

/// Keeps the [Gate] it was issued from open while alive.
pub struct GateGuard {
    inner: Arc<GateInner>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.holders -= 1;

        if state.holders == 0 {
            self.inner.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_close_without_holders() {
        let gate = Gate::new();
        assert!(!gate.is_closed());

        gate.close().await;
        assert!(gate.is_closed());
        assert!(gate.enter().is_err(), "Closed gate should not admit operations.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_holders() {
        let _ = tracing_subscriber::fmt::try_init();

        let gate = Gate::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        gate.spawn(async move {
            let _ = release_rx.await;
        })
        .expect("Gate should be open");
        assert_eq!(gate.num_holders(), 1);

        let closing = tokio::spawn({
            let gate = gate.clone();
            async move { gate.close().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.is_closed());
        assert!(!closing.is_finished(), "Close should wait for the holder.");

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), closing)
            .await
            .expect("Close should complete once drained")
            .unwrap();
        assert_eq!(gate.num_holders(), 0);
    }

    #[tokio::test]
    async fn test_closed_signal() {
        let gate = Gate::new();
        let guard = gate.enter().unwrap();

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.closed().await }
        });

        let closing = tokio::spawn({
            let gate = gate.clone();
            async move { gate.close().await }
        });

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("Closed signal should fire before the gate drains")
            .unwrap();

        drop(guard);
        closing.await.unwrap();

        // Repeated closes resolve immediately.
        gate.close().await;
        gate.closed().await;
    }
}
