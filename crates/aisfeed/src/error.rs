use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("no upstream API key configured")]
    MissingApiKey,
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("pool error: {0}")]
    Pool(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("insert failed for mmsi {mmsi}: {reason}")]
    Insert { mmsi: i64, reason: String },
    #[error("migration failed: {0}")]
    Migration(String),
}

/// Read-side failures. Validation variants are the caller's fault and are
/// detected before any storage call.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("limit must be an integer between {min} and {max}")]
    InvalidLimit { min: i64, max: i64 },
    #[error("mmsi must be 6 to 9 digits")]
    InvalidMmsi,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, QueryError::InvalidLimit { .. } | QueryError::InvalidMmsi)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("subscriber closed")]
    Closed,
    #[error("subscriber lagging")]
    Lagging,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid bounding box: {0}")]
    BoundingBox(String),
    #[error("invalid backoff: {0}")]
    Backoff(String),
}
