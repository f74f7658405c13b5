//! Read-side position queries
//!
//! Limits and MMSIs are validated before the store is touched.

use std::sync::Arc;

use crate::error::QueryError;
use crate::position::{PositionRow, VesselSummary};
use crate::store::PositionStore;

pub const MIN_LIMIT: i64 = 1;
pub const MAX_LIMIT: i64 = 5000;

pub const DEFAULT_VESSELS_LIMIT: i64 = 500;
pub const DEFAULT_LATEST_LIMIT: i64 = 500;
pub const DEFAULT_HISTORY_LIMIT: i64 = 200;

/// Reject anything outside `MIN_LIMIT..=MAX_LIMIT`.
pub fn validate_limit(limit: i64) -> Result<i64, QueryError> {
    if (MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(QueryError::InvalidLimit {
            min: MIN_LIMIT,
            max: MAX_LIMIT,
        })
    }
}

/// Parse an optional `limit` query parameter, falling back to `default`
/// when absent. Non-integers are rejected, not clamped.
pub fn parse_limit(raw: Option<&str>, default: i64) -> Result<i64, QueryError> {
    match raw {
        None => validate_limit(default),
        Some(s) => {
            let limit = s.trim().parse::<i64>().map_err(|_| QueryError::InvalidLimit {
                min: MIN_LIMIT,
                max: MAX_LIMIT,
            })?;
            validate_limit(limit)
        }
    }
}

/// An MMSI is 6 to 9 ASCII digits.
pub fn validate_mmsi(raw: &str) -> Result<i64, QueryError> {
    let valid = (6..=9).contains(&raw.len()) && raw.bytes().all(|b| b.is_ascii_digit());
    if !valid {
        return Err(QueryError::InvalidMmsi);
    }
    raw.parse().map_err(|_| QueryError::InvalidMmsi)
}

#[derive(Clone)]
pub struct PositionQueryService {
    store: Arc<dyn PositionStore>,
}

impl PositionQueryService {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self { store }
    }

    /// At most `limit` rows, one per vessel, ordered by MMSI.
    pub async fn latest_per_vessel(&self, limit: i64) -> Result<Vec<PositionRow>, QueryError> {
        let limit = validate_limit(limit)?;
        Ok(self.store.latest_per_vessel(limit).await?)
    }

    /// Up to `limit` reports for one vessel, newest first.
    pub async fn history_for_vessel(
        &self,
        mmsi: &str,
        limit: i64,
    ) -> Result<Vec<PositionRow>, QueryError> {
        let mmsi = validate_mmsi(mmsi)?;
        let limit = validate_limit(limit)?;
        Ok(self.store.history_for_vessel(mmsi, limit).await?)
    }

    pub async fn known_vessels(&self, limit: i64) -> Result<Vec<VesselSummary>, QueryError> {
        let limit = validate_limit(limit)?;
        Ok(self.store.known_vessels(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::position::VesselPosition;
    use crate::store::MemoryPositionStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every call; answers with nothing.
    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PositionStore for CountingStore {
        async fn insert(&self, _p: &VesselPosition) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn latest_per_vessel(&self, _limit: i64) -> Result<Vec<PositionRow>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        async fn history_for_vessel(
            &self,
            _mmsi: i64,
            _limit: i64,
        ) -> Result<Vec<PositionRow>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
        async fn known_vessels(&self, _limit: i64) -> Result<Vec<VesselSummary>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_validate_mmsi() {
        assert_eq!(validate_mmsi("123456").unwrap(), 123456);
        assert_eq!(validate_mmsi("123456789").unwrap(), 123456789);
        assert!(validate_mmsi("12345").is_err());
        assert!(validate_mmsi("1234567890").is_err());
        assert!(validate_mmsi("12a").is_err());
        assert!(validate_mmsi("+12345678").is_err());
        assert!(validate_mmsi("").is_err());
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None, 200).unwrap(), 200);
        assert_eq!(parse_limit(Some("10"), 200).unwrap(), 10);
        assert_eq!(parse_limit(Some("5000"), 200).unwrap(), 5000);
        assert!(parse_limit(Some("0"), 200).is_err());
        assert!(parse_limit(Some("100000"), 200).is_err());
        assert!(parse_limit(Some("1.5"), 200).is_err());
        assert!(parse_limit(Some("ten"), 200).is_err());
    }

    #[tokio::test]
    async fn test_invalid_mmsi_never_reaches_store() {
        let store = Arc::new(CountingStore::default());
        let service = PositionQueryService::new(store.clone());

        let err = service.history_for_vessel("12a", 10).await.unwrap_err();

        assert!(matches!(err, QueryError::InvalidMmsi));
        assert!(err.is_client_error());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_limit_rejected() {
        let store = Arc::new(CountingStore::default());
        let service = PositionQueryService::new(store.clone());

        assert!(service.latest_per_vessel(100_000).await.is_err());
        assert!(service.known_vessels(0).await.is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_latest_per_vessel_respects_limit() {
        let store = Arc::new(MemoryPositionStore::new());
        for i in 0..25 {
            for _ in 0..3 {
                store
                    .insert(&VesselPosition {
                        mmsi: 200000000 + i,
                        ship_name: None,
                        sog: None,
                        cog: None,
                        heading: None,
                        nav_status: None,
                        lat: 0.0,
                        lon: 0.0,
                        time_utc: Utc::now(),
                        raw: serde_json::Value::Null,
                    })
                    .await
                    .unwrap();
            }
        }
        let service = PositionQueryService::new(store);

        let rows = service.latest_per_vessel(10).await.unwrap();

        assert_eq!(rows.len(), 10);
        let mut mmsis: Vec<i64> = rows.iter().map(|r| r.mmsi).collect();
        mmsis.dedup();
        assert_eq!(mmsis.len(), 10);
    }
}
