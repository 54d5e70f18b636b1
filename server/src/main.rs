use std::net::SocketAddr;
use std::process::ExitCode;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use tracing::{error, info};

use pipegate_server::auth::mint_signed_token;
use pipegate_server::config::{Cli, Command, ServeArgs};
use pipegate_server::relay::Relay;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipegate_server=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Token(args)) => run_token(args),
        Some(Command::Serve(args)) => run_serve(args).await,
        None => run_serve(cli.serve).await,
    }
}

fn run_token(args: pipegate_server::config::TokenArgs) -> ExitCode {
    match mint_signed_token(&args.auth_secret, &args.connection_id, args.ttl_days) {
        Ok(token) => {
            println!("connection-id: {}", args.connection_id);
            println!("bearer-token:  {}", token);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "failed to mint token");
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(args: ServeArgs) -> ExitCode {
    let relay = Relay::new(args.auth_mode(), args.queue_soft_cap, args.waiter_timeout());
    let app = pipegate_server::router(relay.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    let handle = Handle::new();
    tokio::spawn(wait_for_shutdown_signal(relay, handle.clone()));

    let result = match args.tls() {
        Some((key, cert)) => {
            info!(%addr, "pipegate server listening (tls)");
            match RustlsConfig::from_pem_file(&cert, &key).await {
                Ok(tls_config) => {
                    axum_server::bind_rustls(addr, tls_config)
                        .handle(handle)
                        .serve(app.into_make_service())
                        .await
                }
                Err(e) => {
                    error!(error = %e, "failed to load TLS key/cert");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => {
            info!(%addr, "pipegate server listening");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "accept loop failed");
            ExitCode::FAILURE
        }
    }
}

/// Waits for Ctrl+C (or SIGTERM on unix), then cancels every outstanding
/// waiter with `Shutdown` and gives in-flight connections a grace period
/// to finish before the listener closes.
async fn wait_for_shutdown_signal(relay: Relay, handle: Handle) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, refusing new requests");
    relay.shutdown().await;
    handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
}
