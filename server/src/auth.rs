//! # Client Authentication
//!
//! Two modes, selected by server configuration (never both at once): a
//! shared static token compared in constant time, or a signed bearer token
//! whose subject must match the connection id in the URL.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use pipegate_protocol::CLIENT_TOKEN_HEADER;

use crate::error::{AuthFailure, RelayError};

/// Claims carried by a signed bearer token. `sub` must equal the URL's
/// connection id; `exp` is a Unix timestamp validated by `jsonwebtoken`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub enum AuthMode {
    SharedToken { secret: String },
    SignedToken { secret: String },
}

/// Verifies the credential a Client presented on a WebSocket upgrade
/// request against `conn_id`, per the configured `mode`.
pub fn verify(mode: &AuthMode, conn_id: &str, headers: &HeaderMap) -> Result<(), RelayError> {
    match mode {
        AuthMode::SharedToken { secret } => verify_shared_token(secret, headers),
        AuthMode::SignedToken { secret } => verify_signed_token(secret, conn_id, headers),
    }
}

fn verify_shared_token(secret: &str, headers: &HeaderMap) -> Result<(), RelayError> {
    let presented = headers
        .get(CLIENT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayError::AuthFailed(AuthFailure::Missing))?;

    if bool::from(presented.as_bytes().ct_eq(secret.as_bytes())) {
        Ok(())
    } else {
        Err(RelayError::AuthFailed(AuthFailure::Invalid))
    }
}

fn verify_signed_token(secret: &str, conn_id: &str, headers: &HeaderMap) -> Result<(), RelayError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(RelayError::AuthFailed(AuthFailure::Missing))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            RelayError::AuthFailed(AuthFailure::Expired)
        }
        _ => RelayError::AuthFailed(AuthFailure::Invalid),
    })?;

    if data.claims.sub == conn_id {
        Ok(())
    } else {
        Err(RelayError::AuthFailed(AuthFailure::SubjectMismatch))
    }
}

/// Mints a signed bearer token for `conn_id`, valid for `ttl_days` days.
/// Used by the server binary's `token` subcommand.
pub fn mint_signed_token(
    secret: &str,
    conn_id: &str,
    ttl_days: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = unix_now() + ttl_days * 86_400;
    let claims = Claims {
        sub: conn_id.to_string(),
        exp,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after 1970")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn shared_token_accepts_matching_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_TOKEN_HEADER, HeaderValue::from_static("s3cr3t"));
        let mode = AuthMode::SharedToken {
            secret: "s3cr3t".to_string(),
        };
        assert!(verify(&mode, "conn-1", &headers).is_ok());
    }

    #[test]
    fn shared_token_rejects_missing_or_wrong_header() {
        let mode = AuthMode::SharedToken {
            secret: "s3cr3t".to_string(),
        };
        assert!(verify(&mode, "conn-1", &HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_TOKEN_HEADER, HeaderValue::from_static("wrong"));
        assert!(verify(&mode, "conn-1", &headers).is_err());
    }

    #[test]
    fn signed_token_round_trips_and_validates_subject() {
        let secret = "jwt-secret";
        let token = mint_signed_token(secret, "conn-1", 1).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let mode = AuthMode::SignedToken {
            secret: secret.to_string(),
        };
        assert!(verify(&mode, "conn-1", &headers).is_ok());

        let err = verify(&mode, "conn-2", &headers).unwrap_err();
        assert!(matches!(
            err,
            RelayError::AuthFailed(AuthFailure::SubjectMismatch)
        ));
    }

    #[test]
    fn signed_token_rejects_expired_claim() {
        let secret = "jwt-secret";
        let claims = Claims {
            sub: "conn-1".to_string(),
            exp: 1, // long expired
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        let mode = AuthMode::SignedToken {
            secret: secret.to_string(),
        };
        let err = verify(&mode, "conn-1", &headers).unwrap_err();
        assert!(matches!(err, RelayError::AuthFailed(AuthFailure::Expired)));
    }
}
