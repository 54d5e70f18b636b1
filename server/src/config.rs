//! # Configuration
//!
//! Typed CLI flags (via `clap`'s derive API) with environment-variable
//! fallbacks for secrets. A `token` subcommand mints a signed bearer token
//! for a connection id, for use in `signed-token` auth mode.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::auth::AuthMode;

#[derive(Parser, Debug)]
#[command(name = "pipegate-server", about = "Reverse-tunnel relay server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay server (the default if no subcommand is given).
    Serve(ServeArgs),
    /// Mint a signed bearer token for a connection id, for signed-token
    /// auth mode.
    Token(TokenArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AuthModeArg {
    SharedToken,
    SignedToken,
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen for HTTP and WebSocket connections on.
    #[arg(long, default_value_t = 7070)]
    pub port: u16,

    /// Path to the TLS private key. Requires `--tls-cert`.
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Path to the TLS certificate chain. Requires `--tls-key`.
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// Which client authentication mode to enforce.
    #[arg(long, value_enum, default_value_t = AuthModeArg::SharedToken)]
    pub auth_mode: AuthModeArg,

    /// Shared secret for `shared-token` mode, or the HMAC secret for
    /// `signed-token` mode. Falls back to `PIPEGATE_AUTH_SECRET`.
    #[arg(long, env = "PIPEGATE_AUTH_SECRET")]
    pub auth_secret: String,

    /// Soft cap on each tunnel's outbound queue before `Enqueue` fails
    /// with `TunnelSaturated` (surfaced to callers as 503).
    #[arg(long, default_value_t = 1024)]
    pub queue_soft_cap: usize,

    /// How long an ingress waiter parks before it times out as 504.
    #[arg(long, default_value_t = 300)]
    pub waiter_timeout_secs: u64,
}

impl ServeArgs {
    pub fn auth_mode(&self) -> AuthMode {
        match self.auth_mode {
            AuthModeArg::SharedToken => AuthMode::SharedToken {
                secret: self.auth_secret.clone(),
            },
            AuthModeArg::SignedToken => AuthMode::SignedToken {
                secret: self.auth_secret.clone(),
            },
        }
    }

    pub fn waiter_timeout(&self) -> Duration {
        Duration::from_secs(self.waiter_timeout_secs)
    }

    pub fn tls(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.tls_key, &self.tls_cert) {
            (Some(key), Some(cert)) => Some((key.clone(), cert.clone())),
            _ => None,
        }
    }
}

#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Connection id the minted token authorizes.
    #[arg(long)]
    pub connection_id: String,

    /// HMAC secret to sign with. Falls back to `PIPEGATE_AUTH_SECRET`.
    #[arg(long, env = "PIPEGATE_AUTH_SECRET")]
    pub auth_secret: String,

    /// Token lifetime in days.
    #[arg(long, default_value_t = 21)]
    pub ttl_days: i64,
}
