//! Prometheus metrics for the ingest pipeline
//!
//! Registered on the default registry; the server exposes them via `encode`.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::DeliveryError;
use crate::feed::ConnectionState;

static FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "aisfeed_frames_total",
        "Upstream frames received, by frame kind",
        &["kind"]
    )
    .expect("Failed to register frames_total metric")
});

static POSITIONS_INSERTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "aisfeed_positions_inserted_total",
        "Positions written to storage"
    )
    .expect("Failed to register positions_inserted metric")
});

static POSITIONS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "aisfeed_positions_failed_total",
        "Position inserts that failed"
    )
    .expect("Failed to register positions_failed metric")
});

static SINK_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "aisfeed_sink_dropped_total",
        "Frames dropped because the sink queue was full or closed"
    )
    .expect("Failed to register sink_dropped metric")
});

static SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("aisfeed_subscribers", "Live stream subscribers")
        .expect("Failed to register subscribers metric")
});

static SUBSCRIBERS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "aisfeed_subscribers_dropped_total",
        "Subscribers removed after a failed delivery",
        &["reason"]
    )
    .expect("Failed to register subscribers_dropped metric")
});

static RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "aisfeed_upstream_reconnects_total",
        "Scheduled upstream reconnect attempts"
    )
    .expect("Failed to register reconnects metric")
});

static CONNECTION_STATE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "aisfeed_upstream_state",
        "Upstream connection state (0=disconnected, 1=connecting, 2=subscribed)"
    )
    .expect("Failed to register upstream_state metric")
});

pub fn record_frame(kind: &str) {
    FRAMES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_position_inserted() {
    POSITIONS_INSERTED.inc();
}

pub fn record_position_failed() {
    POSITIONS_FAILED.inc();
}

pub fn record_sink_dropped() {
    SINK_DROPPED.inc();
}

pub fn set_subscribers(count: usize) {
    SUBSCRIBERS.set(count as i64);
}

pub fn record_subscriber_dropped(reason: &DeliveryError) {
    let label = match reason {
        DeliveryError::Closed => "closed",
        DeliveryError::Lagging => "lagging",
    };
    SUBSCRIBERS_DROPPED.with_label_values(&[label]).inc();
}

pub fn record_reconnect() {
    RECONNECTS.inc();
}

pub fn set_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Subscribed => 2,
    };
    CONNECTION_STATE.set(value);
}

/// Encode all registered metrics in Prometheus text format
pub fn encode() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
