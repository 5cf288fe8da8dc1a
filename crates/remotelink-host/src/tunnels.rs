use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use remotelink_proto::SessionToken;
use tokio::sync::RwLock;

/// Information about an active host-side tunnel
#[derive(Debug, Clone)]
pub struct TunnelInfo {
    pub token: SessionToken,
    /// Relay data endpoint the tunnel was opened to
    pub relay_data_addr: String,
    pub established_at: Instant,
}

/// Registry of active tunnels, keyed by session token.
///
/// At most one tunnel may be active per token; tunnels for different tokens
/// are independent.
#[derive(Debug, Clone, Default)]
pub struct ActiveTunnels {
    tunnels: Arc<RwLock<HashMap<SessionToken, TunnelInfo>>>,
}

impl ActiveTunnels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tunnel. Returns `false` if the token already has one.
    pub async fn try_register(&self, info: TunnelInfo) -> bool {
        let mut tunnels = self.tunnels.write().await;
        if tunnels.contains_key(&info.token) {
            tracing::warn!(
                token = %info.token.short(),
                "Tunnel already active for session token"
            );
            return false;
        }

        tracing::debug!(
            token = %info.token.short(),
            relay_data_addr = %info.relay_data_addr,
            "Registering tunnel"
        );
        tunnels.insert(info.token.clone(), info);

        tracing::info!(active_tunnels = tunnels.len(), "Tunnel registered");
        true
    }

    /// Remove a tunnel once its bridge has ended
    pub async fn unregister(&self, token: &SessionToken) {
        let mut tunnels = self.tunnels.write().await;

        if let Some(info) = tunnels.remove(token) {
            tracing::info!(
                token = %token.short(),
                duration_secs = info.established_at.elapsed().as_secs(),
                active_tunnels = tunnels.len(),
                "Tunnel unregistered"
            );
        } else {
            tracing::warn!(token = %token.short(), "Attempted to unregister unknown tunnel");
        }
    }

    pub async fn contains(&self, token: &SessionToken) -> bool {
        self.tunnels.read().await.contains_key(token)
    }

    pub async fn count(&self) -> usize {
        self.tunnels.read().await.len()
    }

    pub async fn list(&self) -> Vec<TunnelInfo> {
        self.tunnels.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(token: &str) -> TunnelInfo {
        TunnelInfo {
            token: SessionToken::from(token),
            relay_data_addr: "relay.example.com:40001".to_string(),
            established_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_one_tunnel_per_token() {
        let tunnels = ActiveTunnels::new();

        assert!(tunnels.try_register(info("tok-a")).await);
        assert!(!tunnels.try_register(info("tok-a")).await);
        assert!(tunnels.try_register(info("tok-b")).await);
        assert_eq!(tunnels.count().await, 2);

        tunnels.unregister(&SessionToken::from("tok-a")).await;
        assert!(!tunnels.contains(&SessionToken::from("tok-a")).await);
        assert!(tunnels.try_register(info("tok-a")).await);
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_harmless() {
        let tunnels = ActiveTunnels::new();
        tunnels.unregister(&SessionToken::from("missing")).await;
        assert_eq!(tunnels.count().await, 0);
        assert!(tunnels.list().await.is_empty());
    }
}
