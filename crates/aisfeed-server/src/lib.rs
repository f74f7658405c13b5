pub mod api;
pub mod config;
pub mod shutdown;

use std::sync::Arc;

use tokio::sync::watch;

use aisfeed::{Broadcaster, ConnectionState, PositionQueryService};

/// Shared application state
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
    pub queries: PositionQueryService,
    pub connection: watch::Receiver<ConnectionState>,
    pub feed_enabled: bool,
    /// Flips to true on shutdown; ends open event streams.
    pub shutdown: watch::Receiver<bool>,
}
