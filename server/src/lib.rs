//! # Pipegate Relay Server
//!
//! A WebSocket-based relay server that multiplexes public HTTP requests
//! over a long-lived, per-connection-id WebSocket tunnel to a Client
//! process sitting next to a local HTTP origin.
//!
//! ## Architecture
//!
//! ```text
//! Public HTTP ──► Ingress ──► Tunnel outbound queue ──► Session writer ──► WebSocket
//!                                                                              │
//!                                                                              ▼
//!                                                                         Client / origin
//!                                                                              │
//! Ingress response ◄── Correlation Table ◄── Session reader ◄── WebSocket ◄───┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — re-exported wire frame types (see [`pipegate_protocol`])
//! - [`correlation`] — the Correlation Table (correlation id → one-shot waiter)
//! - [`registry`] — the Tunnel Registry (connection id → live tunnel state)
//! - [`session`] — the Tunnel Session (reader/writer fiber pair per WebSocket)
//! - [`ingress`] — the HTTP Ingress Handler
//! - [`auth`] — shared-token and signed-token client authentication
//! - [`relay`] — the `Relay` value bundling the Correlation Table and Tunnel Registry
//! - [`error`] — the `RelayError` hierarchy and its HTTP status mapping
//! - [`config`] — CLI configuration

pub mod auth;
pub mod config;
pub mod correlation;
pub mod error;
pub mod ingress;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod session;

use axum::routing::{any, get};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::relay::Relay;

/// Builds the full router: the WebSocket tunnel endpoint plus the public
/// HTTP ingress surface, both bound to the same [`Relay`].
pub fn router(relay: Relay) -> Router {
    Router::new()
        .route("/{conn_id}", get(session::ws_handler))
        .route("/{conn_id}/", any(ingress::handle_request_root))
        .route("/{conn_id}/{*tail_path}", any(ingress::handle_request_tail))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}
