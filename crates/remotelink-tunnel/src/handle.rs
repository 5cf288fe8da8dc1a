//! Shared close guard for one bridged connection
//!
//! Both copy tasks of a bridge hold a handle to both connections. Either task
//! may close either connection; only the first `close()` has an effect and a
//! second one is a no-op. Pending reads and writes raced against
//! [`ConnectionHandle::closed`] return promptly once the connection is closed,
//! which is the only way a bridge is ever torn down.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    name: &'static str,
    state: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            name,
            state: Arc::new(state),
        }
    }

    /// Mark the connection closed. Returns `true` only for the first caller.
    pub fn close(&self) -> bool {
        let first = self.state.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if first {
            tracing::trace!(connection = self.name, "Connection closed");
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the connection has been closed
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so wait_for cannot fail while we hold it.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_close_is_idempotent() {
        let handle = ConnectionHandle::new("local");
        assert!(!handle.is_closed());
        assert!(handle.close());
        assert!(handle.is_closed());
        assert!(!handle.close());
        assert!(!handle.clone().close());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiters() {
        let handle = ConnectionHandle::new("data");
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.closed().await })
        };

        tokio::task::yield_now().await;
        handle.close();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_returns_immediately_after_close() {
        let handle = ConnectionHandle::new("data");
        handle.close();
        tokio::time::timeout(Duration::from_millis(100), handle.closed())
            .await
            .expect("closed() should resolve for an already closed handle");
    }
}
