//! # Wire Frame Protocol
//!
//! Defines the `RequestFrame` / `ResponseFrame` pair exchanged as JSON text
//! messages over the server↔client WebSocket, plus the small set of helpers
//! both sides need to build and read them: the allowed HTTP method set, a
//! binary-safe body codec, and a header/query codec that preserves repeated
//! keys.
//!
//! Frames are immutable once constructed: every field is set at
//! construction time via [`RequestFrame::new`] / [`ResponseFrame::new`], and
//! there are no setters.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header injected by the ingress handler into every outbound request so the
/// origin (and its logs) can observe the correlation id driving a request.
pub const CORRELATION_ID_HEADER: &str = "x-pipegate-correlation-id";

/// Header carrying the shared-token credential on a tunnel WebSocket
/// connect, in `shared-token` auth mode.
pub const CLIENT_TOKEN_HEADER: &str = "x-pipegate-client-token";

/// The fixed set of HTTP methods the relay will forward.
///
/// Anything outside this set is rejected by the ingress handler with
/// `405 Method Not Allowed` before a `RequestFrame` is ever built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl Method {
    /// Parses an HTTP method name (as found on an inbound request) into the
    /// fixed allowed set. Returns `None` for anything else (`TRACE`,
    /// `CONNECT`, garbage, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "OPTIONS" => Self::Options,
            "HEAD" => Self::Head,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure decoding a frame field off the wire. The session reader treats
/// any of these as a `MalformedFrame`: logged and discarded, never fatal to
/// the session.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON in frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A request, as sent from the server to the client over the tunnel.
///
/// `url_path` never begins with `/`. `body` is base64 on the wire and
/// decoded to raw bytes by [`RequestFrame::body_bytes`] — the field is
/// opaque bytes, never assumed to be UTF-8.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub correlation_id: Uuid,
    pub method: Method,
    pub url_path: String,
    /// JSON array of `[key, value]` pairs, preserving repeated keys.
    pub url_query: String,
    /// JSON object mapping header name to header value.
    pub headers: String,
    /// Base64-encoded request body.
    pub body: String,
}

impl RequestFrame {
    pub fn new(
        correlation_id: Uuid,
        method: Method,
        url_path: String,
        query_pairs: &[(String, String)],
        header_pairs: &[(String, String)],
        body: &[u8],
    ) -> Self {
        Self {
            correlation_id,
            method,
            url_path,
            url_query: encode_pairs(query_pairs),
            headers: encode_mapping(header_pairs),
            body: encode_body(body),
        }
    }

    pub fn query_pairs(&self) -> Result<Vec<(String, String)>, FrameError> {
        decode_pairs(&self.url_query)
    }

    pub fn header_pairs(&self) -> Result<Vec<(String, String)>, FrameError> {
        decode_mapping(&self.headers)
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>, FrameError> {
        decode_body(&self.body)
    }
}

/// A response, as sent from the client back to the server over the tunnel.
///
/// `headers` is the empty string to mean "no headers", not an empty JSON
/// object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub correlation_id: Uuid,
    /// JSON object mapping header name to header value, or `""` for none.
    pub headers: String,
    /// Base64-encoded response body.
    pub body: String,
    pub status_code: u16,
}

impl ResponseFrame {
    pub fn new(
        correlation_id: Uuid,
        header_pairs: &[(String, String)],
        body: &[u8],
        status_code: u16,
    ) -> Self {
        Self {
            correlation_id,
            headers: if header_pairs.is_empty() {
                String::new()
            } else {
                encode_mapping(header_pairs)
            },
            body: encode_body(body),
            status_code,
        }
    }

    /// A synthetic response used by the client when the origin could not be
    /// reached at all (connection refused, DNS failure, ...).
    pub fn gateway_error(correlation_id: Uuid, status_code: u16) -> Self {
        Self {
            correlation_id,
            headers: String::new(),
            body: String::new(),
            status_code,
        }
    }

    pub fn header_pairs(&self) -> Result<Vec<(String, String)>, FrameError> {
        if self.headers.is_empty() {
            Ok(Vec::new())
        } else {
            decode_mapping(&self.headers)
        }
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>, FrameError> {
        decode_body(&self.body)
    }
}

/// Base64-encodes a raw byte body for the wire.
pub fn encode_body(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes a base64 body field back to raw bytes.
pub fn decode_body(s: &str) -> Result<Vec<u8>, FrameError> {
    Ok(BASE64.decode(s)?)
}

/// Serializes key/value pairs as a JSON array of `[key, value]` arrays,
/// preserving order and duplicate keys (used for `url_query`).
pub fn encode_pairs(pairs: &[(String, String)]) -> String {
    serde_json::to_string(pairs).expect("Vec<(String, String)> always serializes")
}

/// Inverse of [`encode_pairs`].
pub fn decode_pairs(s: &str) -> Result<Vec<(String, String)>, FrameError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(s)?)
}

/// Serializes key/value pairs as a flat JSON object (later duplicates win),
/// used for `headers` where the wire shape is a string→string mapping.
pub fn encode_mapping(pairs: &[(String, String)]) -> String {
    let map: std::collections::BTreeMap<&str, &str> = pairs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    serde_json::to_string(&map).expect("string map always serializes")
}

/// Inverse of [`encode_mapping`].
pub fn decode_mapping(s: &str) -> Result<Vec<(String, String)>, FrameError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let map: std::collections::BTreeMap<String, String> = serde_json::from_str(s)?;
    Ok(map.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_rejects_unsupported() {
        assert_eq!(Method::parse("GET"), Some(Method::Get));
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("TRACE"), None);
        assert_eq!(Method::parse("CONNECT"), None);
    }

    #[test]
    fn query_pairs_round_trip_with_duplicates() {
        let pairs = vec![
            ("a".to_string(), "1".to_string()),
            ("a".to_string(), "2".to_string()),
        ];
        let encoded = encode_pairs(&pairs);
        let decoded = decode_pairs(&encoded).unwrap();
        assert_eq!(decoded, pairs);
    }

    #[test]
    fn empty_query_round_trips_to_empty_vec() {
        assert_eq!(decode_pairs("").unwrap(), Vec::<(String, String)>::new());
    }

    #[test]
    fn body_is_binary_safe() {
        let bytes = vec![0u8, 159, 146, 150, 255];
        let encoded = encode_body(&bytes);
        assert_eq!(decode_body(&encoded).unwrap(), bytes);
    }

    #[test]
    fn empty_response_headers_round_trip() {
        let frame = ResponseFrame::new(Uuid::nil(), &[], b"hi", 200);
        assert_eq!(frame.headers, "");
        assert_eq!(frame.header_pairs().unwrap(), Vec::new());
    }

    #[test]
    fn request_frame_round_trips_through_json() {
        let frame = RequestFrame::new(
            Uuid::nil(),
            Method::Get,
            "hello".to_string(),
            &[("x".to_string(), "1".to_string())],
            &[("accept".to_string(), "*/*".to_string())],
            b"body-bytes",
        );
        let wire = serde_json::to_string(&frame).unwrap();
        let back: RequestFrame = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.correlation_id, frame.correlation_id);
        assert_eq!(back.body_bytes().unwrap(), b"body-bytes");
        assert_eq!(
            back.query_pairs().unwrap(),
            vec![("x".to_string(), "1".to_string())]
        );
    }
}
