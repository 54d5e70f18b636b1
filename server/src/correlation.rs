//! # Correlation Table
//!
//! Process-wide (well — `Relay`-wide, see [`crate::relay`]) registry from
//! correlation id to a one-shot response waiter. Built on a `DashMap` of
//! `tokio::sync::oneshot` senders: at most one consumer, at most one
//! producer, delivery exactly once or cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use pipegate_protocol::ResponseFrame;
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

use crate::error::RelayError;

/// Reason a waiter was cancelled rather than fulfilled with a real response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Timeout,
    TunnelClosed,
    Shutdown,
}

impl From<CancelReason> for RelayError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Timeout => RelayError::Timeout,
            CancelReason::TunnelClosed => RelayError::TunnelClosed,
            CancelReason::Shutdown => RelayError::Shutdown,
        }
    }
}

enum Outcome {
    Response(ResponseFrame),
    Cancelled(CancelReason),
}

/// A handle returned by [`CorrelationTable::register`]; consumed exactly
/// once by [`CorrelationTable::await_response`].
pub struct WaiterHandle {
    id: Uuid,
    rx: oneshot::Receiver<Outcome>,
}

impl WaiterHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Raised by [`CorrelationTable::register`] when the id is already in use.
/// Should never happen in practice since ids are freshly generated UUIDs.
#[derive(Debug, thiserror::Error)]
#[error("correlation id {0} is already registered")]
pub struct DuplicateCorrelation(pub Uuid);

#[derive(Default)]
pub struct CorrelationTable {
    slots: DashMap<Uuid, oneshot::Sender<Outcome>>,
    drops_total: AtomicU64,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a one-shot slot for `id`.
    pub fn register(&self, id: Uuid) -> Result<WaiterHandle, DuplicateCorrelation> {
        let (tx, rx) = oneshot::channel();
        match self.slots.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DuplicateCorrelation(id)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(tx);
                Ok(WaiterHandle { id, rx })
            }
        }
    }

    /// Delivers a response to the waiter for `id`. A no-op, logged at
    /// `warn`, if no waiter is registered (already timed out, already
    /// fulfilled, or never existed).
    pub fn fulfill(&self, id: Uuid, frame: ResponseFrame) {
        match self.slots.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(Outcome::Response(frame));
            }
            None => {
                self.drops_total.fetch_add(1, Ordering::Relaxed);
                warn!(correlation_id = %id, "response frame for unknown or completed waiter; dropped");
            }
        }
    }

    /// Cancels the waiter for `id` with `reason`. Idempotent: cancelling an
    /// id with no registered waiter is a silent no-op.
    pub fn cancel(&self, id: Uuid, reason: CancelReason) {
        if let Some((_, tx)) = self.slots.remove(&id) {
            let _ = tx.send(Outcome::Cancelled(reason));
        }
    }

    /// Removes a waiter without resolving it, for callers that registered
    /// a waiter but failed before anyone could be awaiting it (e.g. the
    /// outbound queue was saturated). Never fires the oneshot.
    pub fn unregister(&self, id: Uuid) {
        self.slots.remove(&id);
    }

    /// Suspends until the waiter is fulfilled, cancelled, or `deadline`
    /// elapses. On deadline the waiter is withdrawn and `Timeout` surfaces.
    pub async fn await_response(
        &self,
        handle: WaiterHandle,
        deadline: Duration,
    ) -> Result<ResponseFrame, RelayError> {
        let id = handle.id();
        match tokio::time::timeout(deadline, handle.rx).await {
            Ok(Ok(Outcome::Response(frame))) => Ok(frame),
            Ok(Ok(Outcome::Cancelled(reason))) => Err(reason.into()),
            // Sender dropped without sending — treat as TunnelClosed, the
            // only path that drops a sender without resolving it first.
            Ok(Err(_)) => Err(RelayError::TunnelClosed),
            Err(_) => {
                self.unregister(id);
                Err(RelayError::Timeout)
            }
        }
    }

    /// Count of `Fulfill` calls that found no waiter. Surfaced for tests
    /// and operational logging, not as a metrics-crate counter.
    pub fn drops_total(&self) -> u64 {
        self.drops_total.load(Ordering::Relaxed)
    }

    /// Number of waiters currently parked. Used by shutdown to enumerate
    /// everything that needs cancelling.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
