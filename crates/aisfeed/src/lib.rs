//! aisfeed: AIS ingestion and real-time distribution
//!
//! One upstream feed client drives every frame through a fixed pipeline:
//! decode, recent-message buffer, fan-out to live subscribers, and a
//! best-effort position sink backed by PostgreSQL/PostGIS. The read side
//! answers position queries against the same store.

pub mod backoff;
pub mod broadcast;
pub mod buffer;
pub mod config;
pub mod error;
pub mod feed;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod position;
pub mod query;
pub mod sink;
pub mod store;

pub use backoff::Backoff;
pub use broadcast::{Broadcaster, SubscriberId, SubscriberSink, Subscription};
pub use buffer::RecentMessageBuffer;
pub use config::{BackoffConfig, BoundingBox, FeedConfig};
pub use error::{ConfigError, DeliveryError, FeedError, QueryError, StoreError};
pub use feed::{ConnectionState, FeedClient};
pub use message::{AisFrame, FeedMessage, FeedPayload};
pub use pipeline::FramePipeline;
pub use position::{PositionRow, VesselPosition, VesselSummary};
pub use query::PositionQueryService;
pub use sink::{BatchOutcome, PositionSink, SinkHandle};
pub use store::{MemoryPositionStore, PgPositionStore, PositionStore};
