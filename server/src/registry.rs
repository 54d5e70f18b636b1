//! # Tunnel Registry
//!
//! Maps a connection id to its live [`TunnelState`]: the outbound request
//! queue and the set of in-flight correlation ids for that tunnel. Creation
//! is atomic (`DashMap::entry`) — no implicit default-value lookup that
//! could race two concurrent first-accesses into creating two queues.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use pipegate_protocol::RequestFrame;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Raised by [`TunnelState::enqueue`] when the outbound queue is at its
/// configured soft cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelSaturated;

/// Raised by [`TunnelRegistry::attach_session`] when a live session is
/// already bound to the connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyAttached;

/// Live state for one connection id: its outbound queue and the
/// correlation ids of requests enqueued on it that haven't yet resolved.
pub struct TunnelState {
    conn_id: String,
    tx: mpsc::UnboundedSender<RequestFrame>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RequestFrame>>>,
    queue_len: AtomicUsize,
    soft_cap: usize,
    /// `Some(session_id)` while a Session is attached.
    session: Mutex<Option<Uuid>>,
    outstanding: DashMap<Uuid, ()>,
}

impl TunnelState {
    fn new(conn_id: String, soft_cap: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            conn_id,
            tx,
            rx: Mutex::new(Some(rx)),
            queue_len: AtomicUsize::new(0),
            soft_cap,
            session: Mutex::new(None),
            outstanding: DashMap::new(),
        })
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// Enqueues `frame`, failing with `TunnelSaturated` if the queue is
    /// already at its soft cap. Never blocks the caller.
    pub fn enqueue(&self, frame: RequestFrame) -> Result<(), TunnelSaturated> {
        if self.queue_len.load(Ordering::Acquire) >= self.soft_cap {
            return Err(TunnelSaturated);
        }
        self.queue_len.fetch_add(1, Ordering::AcqRel);
        // The receiver only ever drops once the whole tunnel is torn down,
        // at which point the registry stops handing out new enqueues for
        // this id via `get_or_create` creating a fresh TunnelState instead.
        let _ = self.tx.send(frame);
        Ok(())
    }

    /// Called by the session writer after pulling a frame off the queue.
    pub(crate) fn note_dequeued(&self) {
        self.queue_len.fetch_sub(1, Ordering::AcqRel);
    }

    /// Takes the receiving half of the outbound queue. Returns `None` if it
    /// was already taken by an earlier session attach.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<RequestFrame>> {
        self.rx.lock().unwrap().take()
    }

    pub(crate) fn mark_outstanding(&self, id: Uuid) {
        self.outstanding.insert(id, ());
    }

    pub(crate) fn clear_outstanding(&self, id: Uuid) {
        self.outstanding.remove(&id);
    }

    /// Snapshot of correlation ids enqueued or in-flight on this tunnel,
    /// for Teardown to cancel.
    pub(crate) fn outstanding_ids(&self) -> Vec<Uuid> {
        self.outstanding.iter().map(|e| *e.key()).collect()
    }
}

#[derive(Default)]
pub struct TunnelRegistry {
    tunnels: DashMap<String, Arc<TunnelState>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing tunnel for `conn_id`, or atomically creates one
    /// with an empty queue and no attached session.
    pub fn get_or_create(&self, conn_id: &str, soft_cap: usize) -> Arc<TunnelState> {
        self.tunnels
            .entry(conn_id.to_string())
            .or_insert_with(|| TunnelState::new(conn_id.to_string(), soft_cap))
            .clone()
    }

    /// Looks up a tunnel without creating one.
    pub fn get(&self, conn_id: &str) -> Option<Arc<TunnelState>> {
        self.tunnels.get(conn_id).map(|e| e.clone())
    }

    /// Binds `session_id` to `conn_id`'s tunnel, failing if one is already
    /// bound. On success, hands back the receiving half of the outbound
    /// queue for the session's writer fiber to drain.
    pub fn attach_session(
        &self,
        conn_id: &str,
        session_id: Uuid,
        soft_cap: usize,
    ) -> Result<(Arc<TunnelState>, mpsc::UnboundedReceiver<RequestFrame>), AlreadyAttached> {
        let tunnel = self.get_or_create(conn_id, soft_cap);
        {
            let mut current = tunnel.session.lock().unwrap();
            if current.is_some() {
                return Err(AlreadyAttached);
            }
            *current = Some(session_id);
        }
        let rx = tunnel.take_receiver().ok_or(AlreadyAttached)?;
        Ok((tunnel, rx))
    }

    /// Unbinds `session_id` from `conn_id`'s tunnel, iff it is the current
    /// session. Idempotent: a mismatched or already-detached session is a
    /// silent no-op and returns `false`. Returns `true` if this call
    /// performed the detach (the caller should then run Teardown).
    pub fn detach_session(&self, conn_id: &str, session_id: Uuid) -> bool {
        let Some(tunnel) = self.get(conn_id) else {
            return false;
        };
        let detached = {
            let mut current = tunnel.session.lock().unwrap();
            if *current == Some(session_id) {
                *current = None;
                true
            } else {
                false
            }
        };
        if detached {
            // Release the registry's slot for this id iff nobody raced in
            // and replaced it with a fresh TunnelState in the meantime.
            self.tunnels
                .remove_if(conn_id, |_, v| Arc::ptr_eq(v, &tunnel));
        }
        detached
    }

    /// All live tunnels, for shutdown to enumerate.
    pub fn enumerate(&self) -> Vec<Arc<TunnelState>> {
        self.tunnels.iter().map(|e| e.value().clone()).collect()
    }
}
