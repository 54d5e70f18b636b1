mod agent;
mod config;
mod origin;

use clap::Parser;

use agent::AgentConfig;
use config::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipegate_client=info".into()),
        )
        .init();

    let cli = Cli::parse();
    agent::run(AgentConfig {
        server_url: cli.server_url,
        origin: cli.origin,
        token: cli.token,
        bearer: cli.bearer,
    })
    .await;
}
