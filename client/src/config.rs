//! CLI configuration for the client binary.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pipegate-client", about = "Reverse-tunnel relay client")]
pub struct Cli {
    /// WebSocket URL of the relay server's tunnel endpoint, e.g.
    /// `wss://relay.example.com/<connectionId>`.
    #[arg(long)]
    pub server_url: String,

    /// Base URL of the local origin to replay requests against, e.g.
    /// `http://127.0.0.1:8080`.
    #[arg(long)]
    pub origin: String,

    /// Credential presented on connect: the shared token, or a signed
    /// bearer token. Falls back to `PIPEGATE_CLIENT_TOKEN`.
    #[arg(long, env = "PIPEGATE_CLIENT_TOKEN")]
    pub token: String,

    /// Whether `token` is presented as a bearer token (`Authorization:
    /// Bearer <token>`) rather than the shared-token header. Set this when
    /// the server is running in `signed-token` auth mode.
    #[arg(long, default_value_t = false)]
    pub bearer: bool,
}
