//! Durable position storage
//!
//! `PositionStore` is the seam between the sink / query service and the
//! database. `PgPositionStore` is the production backend; the in-memory
//! store serves tests and database-less runs.

mod memory;
mod postgres;

pub use memory::{MemoryPositionStore, DEFAULT_MEMORY_ROWS};
pub use postgres::{create_pool, run_migrations, PgPositionStore};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::position::{PositionRow, VesselPosition, VesselSummary};

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Insert one record. Duplicate reports are stored as separate rows.
    async fn insert(&self, position: &VesselPosition) -> Result<(), StoreError>;

    /// Most recent report per vessel, ordered by MMSI.
    async fn latest_per_vessel(&self, limit: i64) -> Result<Vec<PositionRow>, StoreError>;

    /// Reports for one vessel, newest first.
    async fn history_for_vessel(&self, mmsi: i64, limit: i64)
        -> Result<Vec<PositionRow>, StoreError>;

    /// Distinct vessels with last known name and last seen time, ordered by MMSI.
    async fn known_vessels(&self, limit: i64) -> Result<Vec<VesselSummary>, StoreError>;
}
