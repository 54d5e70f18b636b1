//! # Tunnel Connection Loop
//!
//! Connects to the relay server's WebSocket endpoint and reconnects on
//! disconnect: a `connect_async` call, a split sink/stream, an inbound
//! loop dispatching each frame to its own task, and a fixed reconnect
//! delay.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use pipegate_protocol::{RequestFrame, CLIENT_TOKEN_HEADER};

use crate::origin;

/// How long to wait before attempting to reconnect after a disconnect.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub struct AgentConfig {
    pub server_url: String,
    pub origin: String,
    pub token: String,
    pub bearer: bool,
}

/// Runs the client's connection loop forever: connect, replay requests
/// against the origin until the socket drops, then wait and reconnect.
pub async fn run(config: AgentConfig) -> ! {
    let http_client = reqwest::Client::new();

    loop {
        info!(server_url = %config.server_url, "connecting to relay server");
        match connect(&config, &http_client).await {
            Ok(()) => warn!("tunnel connection closed"),
            Err(e) => error!(error = %e, "tunnel connection failed"),
        }

        info!(delay_secs = RECONNECT_DELAY.as_secs(), "reconnecting");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect(config: &AgentConfig, http_client: &reqwest::Client) -> anyhow::Result<()> {
    let mut request = config.server_url.as_str().into_client_request()?;
    if config.bearer {
        request.headers_mut().insert(
            tokio_tungstenite::tungstenite::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.token))?,
        );
    } else {
        request
            .headers_mut()
            .insert(CLIENT_TOKEN_HEADER, HeaderValue::from_str(&config.token)?);
    }

    let (ws_stream, _) = connect_async(request).await?;
    info!("tunnel connected");

    let (mut sink, mut stream) = ws_stream.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg? {
            Message::Text(text) => {
                let frame: RequestFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(error = %e, "malformed request frame; dropped");
                        continue;
                    }
                };
                let tx = tx.clone();
                let http_client = http_client.clone();
                let origin = config.origin.clone();
                tokio::spawn(async move {
                    let response = origin::replay(&http_client, &origin, &frame).await;
                    if let Ok(text) = serde_json::to_string(&response) {
                        let _ = tx.send(Message::Text(text.into()));
                    }
                });
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}
