//! Upstream AIS feed client
//!
//! One task owns the socket. Each connection sends the subscription
//! handshake, then drives every received frame through the pipeline in
//! arrival order. When the socket closes or errors the client waits out the
//! backoff delay and connects again; there is never more than one socket open.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, BoundingBox, FeedConfig};
use crate::error::FeedError;
use crate::metrics;
use crate::pipeline::FramePipeline;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription handshake sent once per connection.
#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    #[serde(rename = "Apikey")]
    api_key: &'a str,
    #[serde(rename = "BoundingBoxes")]
    bounding_boxes: &'a [BoundingBox],
    #[serde(rename = "FiltersShipMMSI", skip_serializing_if = "<[_]>::is_empty")]
    mmsi: &'a [String],
    #[serde(rename = "FilterMessageTypes", skip_serializing_if = "<[_]>::is_empty")]
    message_types: &'a [String],
}

/// Build the handshake message for a connection.
pub fn subscription_message(config: &FeedConfig, api_key: &str) -> Result<String, FeedError> {
    let request = SubscribeRequest {
        api_key,
        bounding_boxes: &config.bounding_boxes,
        mmsi: &config.mmsi_filter,
        message_types: &config.message_type_filter,
    };
    Ok(serde_json::to_string(&request)?)
}

enum SessionEnd {
    Closed,
    Shutdown,
}

pub struct FeedClient {
    config: FeedConfig,
    backoff: Backoff,
    pipeline: FramePipeline,
    state: watch::Sender<ConnectionState>,
}

impl FeedClient {
    pub fn new(config: FeedConfig, backoff: BackoffConfig, pipeline: FramePipeline) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            backoff: Backoff::new(backoff),
            pipeline,
            state,
        }
    }

    /// Observe connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        metrics::set_connection_state(state);
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// Returns `FeedError::MissingApiKey` straight away when no key is
    /// configured; the caller logs it and carries on without live data.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), FeedError> {
        let api_key = self.config.api_key.clone().ok_or(FeedError::MissingApiKey)?;
        let url =
            Url::parse(&self.config.url).map_err(|e| FeedError::InvalidUrl(e.to_string()))?;
        let handshake = subscription_message(&self.config, &api_key)?;

        loop {
            match self.session(&url, &handshake, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => info!("Upstream connection closed"),
                Err(e) => warn!(error = %e, "Upstream connection failed"),
            }
            self.set_state(ConnectionState::Disconnected);

            let delay = self.backoff.next_delay();
            metrics::record_reconnect();
            info!(delay_ms = delay.as_millis() as u64, "Scheduling upstream reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Feed client stopped");
        Ok(())
    }

    /// One connection, from connect to close.
    async fn session(
        &mut self,
        url: &Url,
        handshake: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, FeedError> {
        self.set_state(ConnectionState::Connecting);
        info!(host = url.host_str().unwrap_or(""), "Connecting to upstream AIS feed");

        let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()));
        let (mut ws, response) = tokio::select! {
            result = connect => result
                .map_err(|_| FeedError::ConnectionFailed("connect timed out".into()))??,
            _ = shutdown_requested(shutdown) => return Ok(SessionEnd::Shutdown),
        };
        info!(status = ?response.status(), "Upstream connected");

        // A failed send does not end the session: the read side sees the
        // broken socket and is the only path that triggers a reconnect.
        match ws.send(WsMessage::Text(handshake.to_string())).await {
            Ok(()) => {
                self.set_state(ConnectionState::Subscribed);
                info!(
                    mmsi_filters = self.config.mmsi_filter.len(),
                    type_filters = self.config.message_type_filter.len(),
                    "Upstream subscription sent"
                );
            }
            Err(e) => warn!(error = %e, "Failed to send upstream subscription"),
        }

        // A provider that rejects the subscription still accepts the socket,
        // so the backoff only counts a session as good once feed data arrives.
        let mut healthy = false;
        loop {
            let feed_data = tokio::select! {
                _ = shutdown_requested(shutdown) => {
                    if let Err(e) = ws.close(None).await {
                        debug!(error = %e, "Error closing upstream socket");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                frame = ws.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.pipeline.process_text(&text),
                    Some(Ok(WsMessage::Binary(data))) => self.pipeline.process_bytes(&data),
                    Some(Ok(WsMessage::Ping(data))) => {
                        if let Err(e) = ws.send(WsMessage::Pong(data)).await {
                            warn!(error = %e, "Failed to answer upstream ping");
                        }
                        false
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(frame = ?frame, "Upstream sent close");
                        return Ok(SessionEnd::Closed);
                    }
                    Some(Ok(_)) => false,
                    // Dropping the stream closes the socket
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Closed),
                }
            };
            if feed_data && !healthy {
                healthy = true;
                self.backoff.on_session_healthy();
                debug!("Upstream session delivering data");
            }
        }
    }
}

/// Resolves once shutdown is signalled or the signalling side is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
