//! # HTTP Ingress Handler
//!
//! Translates an inbound public HTTP request into an outbound Request
//! Frame, parks a waiter on the Correlation Table, and assembles the HTTP
//! response from whatever the waiter resolves to.

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method as HttpMethod, StatusCode};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use pipegate_protocol::{Method, RequestFrame, CORRELATION_ID_HEADER};

use crate::error::RelayError;
use crate::relay::Relay;

/// `<METHOD> /<connectionId>/` — a connection id with no tail path.
pub async fn handle_request_root(
    state: State<Relay>,
    Path(conn_id): Path<String>,
    method: HttpMethod,
    headers: HeaderMap,
    raw_query: RawQuery,
    body: Bytes,
) -> Response {
    respond(state, conn_id, String::new(), method, headers, raw_query, body).await
}

/// `<METHOD> /<connectionId>/<tailPath>?<query>` — the general case.
pub async fn handle_request_tail(
    state: State<Relay>,
    Path((conn_id, tail_path)): Path<(String, String)>,
    method: HttpMethod,
    headers: HeaderMap,
    raw_query: RawQuery,
    body: Bytes,
) -> Response {
    respond(state, conn_id, tail_path, method, headers, raw_query, body).await
}

async fn respond(
    State(relay): State<Relay>,
    conn_id: String,
    tail_path: String,
    method: HttpMethod,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    body: Bytes,
) -> Response {
    if relay.is_shutting_down() {
        return RelayError::Shutdown.into_response();
    }

    if Uuid::parse_str(&conn_id).is_err() {
        return RelayError::InvalidConnectionId.into_response();
    }

    let Some(method) = Method::parse(method.as_str()) else {
        return RelayError::MethodNotAllowed.into_response();
    };

    let correlation_id = Uuid::new_v4();
    let query_pairs = parse_query_pairs(raw_query.as_deref().unwrap_or(""));
    let mut header_pairs = header_map_to_pairs(&headers);
    header_pairs.push((
        CORRELATION_ID_HEADER.to_string(),
        correlation_id.simple().to_string(),
    ));

    let frame = RequestFrame::new(
        correlation_id,
        method,
        tail_path,
        &query_pairs,
        &header_pairs,
        &body,
    );

    let waiter = match relay.correlation().register(correlation_id) {
        Ok(w) => w,
        Err(e) => {
            // Should never happen: fresh UUIDs don't collide. Surface as a
            // 500 rather than silently dropping the request.
            tracing::error!(error = %e, "duplicate correlation id");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
    };

    let tunnel = relay
        .registry()
        .get_or_create(&conn_id, relay.queue_soft_cap());
    tunnel.mark_outstanding(correlation_id);

    if tunnel.enqueue(frame).is_err() {
        relay.correlation().unregister(correlation_id);
        tunnel.clear_outstanding(correlation_id);
        return RelayError::TunnelSaturated.into_response();
    }

    let outcome = relay
        .correlation()
        .await_response(waiter, relay.waiter_timeout())
        .await;
    tunnel.clear_outstanding(correlation_id);

    match outcome {
        Ok(response_frame) => build_response(response_frame),
        Err(e) => e.into_response(),
    }
}

fn parse_query_pairs(raw_query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw_query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn header_map_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn build_response(frame: pipegate_protocol::ResponseFrame) -> Response {
    let status =
        StatusCode::from_u16(frame.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match frame.body_bytes() {
        Ok(b) => b,
        Err(_) => Vec::new(),
    };
    let header_pairs = frame.header_pairs().unwrap_or_default();

    let mut response = Response::builder().status(status);
    if let Some(h) = response.headers_mut() {
        for (name, value) in header_pairs {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                h.append(name, value);
            }
        }
    }
    response
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_preserve_repeated_keys() {
        let pairs = parse_query_pairs("a=1&a=2&b=3");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "3".to_string()),
            ]
        );
    }
}
