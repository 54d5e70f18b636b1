//! # Origin Replay
//!
//! Replays a decoded `RequestFrame` against the local origin via `reqwest`
//! and builds the `ResponseFrame` to send back. On any failure to reach
//! the origin, a synthetic error response is produced instead of dropping
//! the frame.

use pipegate_protocol::{Method, RequestFrame, ResponseFrame};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

/// Status code sent back when the origin could not be reached at all.
const ORIGIN_UNREACHABLE_STATUS: u16 = 502;

pub async fn replay(client: &reqwest::Client, origin: &str, frame: &RequestFrame) -> ResponseFrame {
    match try_replay(client, origin, frame).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                correlation_id = %frame.correlation_id,
                error = %e,
                "origin request failed; sending synthetic error response"
            );
            ResponseFrame::gateway_error(frame.correlation_id, ORIGIN_UNREACHABLE_STATUS)
        }
    }
}

async fn try_replay(
    client: &reqwest::Client,
    origin: &str,
    frame: &RequestFrame,
) -> anyhow::Result<ResponseFrame> {
    let url = format!("{}/{}", origin.trim_end_matches('/'), frame.url_path);
    let query_pairs = frame.query_pairs()?;
    let header_pairs = frame.header_pairs()?;
    let body = frame.body_bytes()?;

    let mut headers = HeaderMap::new();
    for (name, value) in &header_pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }

    let request = client
        .request(to_reqwest_method(frame.method), &url)
        .query(&query_pairs)
        .headers(headers)
        .body(body)
        .build()?;

    let response = client.execute(request).await?;
    let status = response.status().as_u16();
    let response_header_pairs: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response.bytes().await?;

    Ok(ResponseFrame::new(
        frame.correlation_id,
        &response_header_pairs,
        &body,
        status,
    ))
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Head => reqwest::Method::HEAD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn unreachable_origin_produces_a_synthetic_502() {
        let client = reqwest::Client::new();
        let frame = RequestFrame::new(
            Uuid::new_v4(),
            Method::Get,
            "anything".to_string(),
            &[],
            &[],
            b"",
        );
        // Nothing listens on this port.
        let response = replay(&client, "http://127.0.0.1:1", &frame).await;
        assert_eq!(response.status_code, ORIGIN_UNREACHABLE_STATUS);
        assert_eq!(response.correlation_id, frame.correlation_id);
    }
}
