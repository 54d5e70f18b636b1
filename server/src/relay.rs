//! # Relay
//!
//! The explicit, passed-by-reference value bundling the Correlation Table
//! and Tunnel Registry: handlers take `State<Relay>`, and tests build a
//! fresh `Relay` per case instead of reaching for global state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::auth::AuthMode;
use crate::correlation::{CancelReason, CorrelationTable};
use crate::registry::TunnelRegistry;

#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

struct Inner {
    correlation: CorrelationTable,
    registry: TunnelRegistry,
    auth_mode: AuthMode,
    queue_soft_cap: usize,
    waiter_timeout: Duration,
    shutting_down: AtomicBool,
}

impl Relay {
    pub fn new(auth_mode: AuthMode, queue_soft_cap: usize, waiter_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                correlation: CorrelationTable::new(),
                registry: TunnelRegistry::new(),
                auth_mode,
                queue_soft_cap,
                waiter_timeout,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn correlation(&self) -> &CorrelationTable {
        &self.inner.correlation
    }

    pub fn registry(&self) -> &TunnelRegistry {
        &self.inner.registry
    }

    pub fn auth_mode(&self) -> &AuthMode {
        &self.inner.auth_mode
    }

    pub fn queue_soft_cap(&self) -> usize {
        self.inner.queue_soft_cap
    }

    pub fn waiter_timeout(&self) -> Duration {
        self.inner.waiter_timeout
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Cancels every outstanding waiter with `Shutdown` and marks the relay
    /// as refusing new inbound requests. Run once, from the graceful
    /// shutdown future passed to `axum::serve`.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        let tunnels = self.inner.registry.enumerate();
        let mut cancelled = 0usize;
        for tunnel in tunnels {
            for id in tunnel.outstanding_ids() {
                self.inner.correlation.cancel(id, CancelReason::Shutdown);
                cancelled += 1;
            }
        }
        info!(cancelled, "relay shutting down; cancelled outstanding waiters");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_cancels_outstanding_waiters_as_504() {
        let relay = Relay::new(
            AuthMode::SharedToken {
                secret: "x".into(),
            },
            1024,
            Duration::from_secs(300),
        );
        let tunnel = relay.registry().get_or_create("conn-1", relay.queue_soft_cap());
        let id = uuid::Uuid::new_v4();
        let handle = relay.correlation().register(id).unwrap();
        tunnel.mark_outstanding(id);

        relay.shutdown().await;
        assert!(relay.is_shutting_down());

        let err = relay
            .correlation()
            .await_response(handle, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::RelayError::Shutdown));
    }
}
