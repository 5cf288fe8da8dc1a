//! Bounded shutdown of the local service

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

/// A service the host can stop at process exit
#[async_trait]
pub trait LocalService: Send + Sync {
    /// Stop accepting and wait for in-flight work to finish
    async fn graceful_stop(&self);

    /// Abort in-flight work
    async fn force_stop(&self);
}

/// Stops the local service once, gracefully if possible.
///
/// Safe to call from several trigger sites (signals, UI, tests); only the
/// first call stops anything.
pub struct ShutdownCoordinator {
    service: Mutex<Option<Arc<dyn LocalService>>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(service: Arc<dyn LocalService>, timeout: Duration) -> Self {
        Self {
            service: Mutex::new(Some(service)),
            timeout,
        }
    }

    /// Coordinator with no running service
    pub fn idle(timeout: Duration) -> Self {
        Self {
            service: Mutex::new(None),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Graceful stop bounded by the timeout, then force stop.
    ///
    /// Returns `false` when there was nothing to stop.
    pub async fn try_graceful_shutdown(&self) -> bool {
        let service = match self.service.lock() {
            Ok(mut service) => service.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(service) = service else {
            tracing::debug!("Local service not running, nothing to shut down");
            return false;
        };

        tracing::info!(
            timeout_secs = self.timeout.as_secs_f64(),
            "Stopping local service"
        );
        match tokio::time::timeout(self.timeout, service.graceful_stop()).await {
            Ok(()) => tracing::info!("Local service stopped gracefully"),
            Err(_) => {
                tracing::warn!("Graceful stop timed out, forcing stop");
                service.force_stop().await;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingService {
        graceful: AtomicUsize,
        forced: AtomicUsize,
        hang: bool,
    }

    #[async_trait]
    impl LocalService for RecordingService {
        async fn graceful_stop(&self) {
            self.graceful.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
        }

        async fn force_stop(&self) {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_graceful_stop_once() {
        let service = Arc::new(RecordingService::default());
        let coordinator = ShutdownCoordinator::new(service.clone(), Duration::from_secs(5));

        assert!(coordinator.try_graceful_shutdown().await);
        assert!(!coordinator.try_graceful_shutdown().await);

        assert_eq!(service.graceful.load(Ordering::SeqCst), 1);
        assert_eq!(service.forced.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_forces_stop() {
        let service = Arc::new(RecordingService {
            hang: true,
            ..Default::default()
        });
        let coordinator = ShutdownCoordinator::new(service.clone(), Duration::from_secs(5));

        assert!(coordinator.try_graceful_shutdown().await);
        assert_eq!(service.graceful.load(Ordering::SeqCst), 1);
        assert_eq!(service.forced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idle_coordinator_does_nothing() {
        let coordinator = ShutdownCoordinator::idle(Duration::from_secs(5));
        assert!(!coordinator.try_graceful_shutdown().await);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_stop_once() {
        let service = Arc::new(RecordingService::default());
        let coordinator = Arc::new(ShutdownCoordinator::new(
            service.clone(),
            Duration::from_secs(5),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.try_graceful_shutdown().await })
            })
            .collect();

        let mut acted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                acted += 1;
            }
        }
        assert_eq!(acted, 1);
        assert_eq!(service.graceful.load(Ordering::SeqCst), 1);
    }
}
