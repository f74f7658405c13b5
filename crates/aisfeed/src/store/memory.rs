use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::PositionStore;
use crate::error::StoreError;
use crate::position::{PositionRow, VesselPosition, VesselSummary};

/// Rows kept by `MemoryPositionStore::new`.
pub const DEFAULT_MEMORY_ROWS: usize = 100_000;

/// In-process store. Keeps at most `max_rows` rows in insertion order; the
/// oldest insert is evicted first.
pub struct MemoryPositionStore {
    rows: Mutex<VecDeque<VesselPosition>>,
    max_rows: usize,
}

impl Default for MemoryPositionStore {
    fn default() -> Self {
        Self::with_max_rows(DEFAULT_MEMORY_ROWS)
    }
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_rows(max_rows: usize) -> Self {
        let max_rows = max_rows.max(1);
        Self {
            rows: Mutex::new(VecDeque::with_capacity(max_rows.min(1024))),
            max_rows,
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    fn rows(&self) -> MutexGuard<'_, VecDeque<VesselPosition>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    pub fn snapshot(&self) -> Vec<VesselPosition> {
        self.rows().iter().cloned().collect()
    }
}

fn take(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

/// Latest report per MMSI. Ties on `time_utc` go to the later insert.
fn latest_by_mmsi<'a>(
    rows: impl IntoIterator<Item = &'a VesselPosition>,
) -> BTreeMap<i64, &'a VesselPosition> {
    let mut latest: BTreeMap<i64, &VesselPosition> = BTreeMap::new();
    for row in rows {
        match latest.get(&row.mmsi) {
            Some(existing) if existing.time_utc > row.time_utc => {}
            _ => {
                latest.insert(row.mmsi, row);
            }
        }
    }
    latest
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn insert(&self, position: &VesselPosition) -> Result<(), StoreError> {
        let mut rows = self.rows();
        while rows.len() >= self.max_rows {
            rows.pop_front();
        }
        rows.push_back(position.clone());
        Ok(())
    }

    async fn latest_per_vessel(&self, limit: i64) -> Result<Vec<PositionRow>, StoreError> {
        let rows = self.rows();
        Ok(latest_by_mmsi(rows.iter())
            .into_values()
            .take(take(limit))
            .map(PositionRow::from)
            .collect())
    }

    async fn history_for_vessel(
        &self,
        mmsi: i64,
        limit: i64,
    ) -> Result<Vec<PositionRow>, StoreError> {
        let rows = self.rows();
        let mut history: Vec<&VesselPosition> = rows.iter().filter(|r| r.mmsi == mmsi).collect();
        // Newest first; equal timestamps keep the later insert first
        history.reverse();
        history.sort_by(|a, b| b.time_utc.cmp(&a.time_utc));
        Ok(history
            .into_iter()
            .take(take(limit))
            .map(PositionRow::from)
            .collect())
    }

    async fn known_vessels(&self, limit: i64) -> Result<Vec<VesselSummary>, StoreError> {
        let rows = self.rows();
        let mut vessels: BTreeMap<i64, VesselSummary> = BTreeMap::new();
        let mut ordered: Vec<&VesselPosition> = rows.iter().collect();
        ordered.sort_by_key(|r| r.time_utc);
        for row in ordered {
            let entry = vessels.entry(row.mmsi).or_insert_with(|| VesselSummary {
                mmsi: row.mmsi,
                ship_name: None,
                time_utc: row.time_utc,
            });
            entry.time_utc = row.time_utc;
            if row.ship_name.is_some() {
                entry.ship_name = row.ship_name.clone();
            }
        }
        Ok(vessels.into_values().take(take(limit)).collect())
    }
}
