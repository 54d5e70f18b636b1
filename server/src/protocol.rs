//! Re-exports of the shared wire-frame types from [`pipegate_protocol`],
//! so callers inside this crate can write `crate::protocol::RequestFrame`
//! instead of reaching across to the protocol crate directly.

pub use pipegate_protocol::{
    decode_body, decode_mapping, decode_pairs, encode_body, encode_mapping, encode_pairs,
    FrameError, Method, RequestFrame, ResponseFrame, CORRELATION_ID_HEADER,
};
