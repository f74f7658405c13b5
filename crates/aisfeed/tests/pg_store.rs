//! PostGIS store integration tests.
//!
//! Requires a PostgreSQL database with the PostGIS extension available.
//! Set DATABASE_URL to run.
//! Run with: cargo test -p aisfeed --test pg_store -- --ignored

use std::sync::Arc;

use chrono::{Duration, Utc};

use aisfeed::store::{create_pool, run_migrations};
use aisfeed::{PgPositionStore, PositionQueryService, PositionSink, PositionStore, VesselPosition};

async fn setup() -> PgPositionStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = create_pool(&url).expect("pool");
    run_migrations(&pool).await.expect("migrations");
    PgPositionStore::new(pool)
}

/// MMSIs unique per test run so reruns against the same database don't
/// see each other's rows.
fn unique_mmsi(offset: i64) -> i64 {
    let base = (Utc::now().timestamp_micros() % 90_000_000) + 100_000_000;
    base + offset
}

fn position(mmsi: i64, minutes_ago: i64, name: Option<&str>, sog: f64) -> VesselPosition {
    VesselPosition {
        mmsi,
        ship_name: name.map(str::to_string),
        sog: Some(sog),
        cog: Some(90.0),
        heading: Some(91.0),
        nav_status: Some(0),
        lat: 52.37,
        lon: 4.89,
        time_utc: Utc::now() - Duration::minutes(minutes_ago),
        raw: serde_json::json!({"test": true}),
    }
}

#[tokio::test]
#[ignore]
async fn test_insert_and_history_roundtrip_point() {
    let store = setup().await;
    let mmsi = unique_mmsi(0);

    store.insert(&position(mmsi, 10, Some("FIRST"), 1.0)).await.unwrap();
    store.insert(&position(mmsi, 5, None, 2.0)).await.unwrap();

    let history = store.history_for_vessel(mmsi, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sog, Some(2.0));
    assert!((history[0].lat - 52.37).abs() < 1e-9);
    assert!((history[0].lon - 4.89).abs() < 1e-9);

    let vessels = store.known_vessels(5000).await.unwrap();
    let vessel = vessels.iter().find(|v| v.mmsi == mmsi).unwrap();
    assert_eq!(vessel.ship_name.as_deref(), Some("FIRST"));
}

#[tokio::test]
#[ignore]
async fn test_latest_per_vessel_distinct() {
    let store = setup().await;
    let a = unique_mmsi(1);
    let b = unique_mmsi(2);
    for (mmsi, minutes) in [(a, 3), (a, 1), (b, 2)] {
        store
            .insert(&position(mmsi, minutes, None, minutes as f64))
            .await
            .unwrap();
    }

    let rows = store.latest_per_vessel(5000).await.unwrap();
    let a_rows: Vec<_> = rows.iter().filter(|r| r.mmsi == a).collect();
    assert_eq!(a_rows.len(), 1);
    assert_eq!(a_rows[0].sog, Some(1.0));
    assert!(rows.windows(2).all(|w| w[0].mmsi < w[1].mmsi));
}

#[tokio::test]
#[ignore]
async fn test_sink_batch_against_postgres() {
    let store: Arc<dyn PositionStore> = Arc::new(setup().await);
    let sink = PositionSink::new(Arc::clone(&store));
    let mmsi = unique_mmsi(3);

    let outcome = sink
        .persist_batch(&[position(mmsi, 2, None, 1.0), position(mmsi, 1, None, 2.0)])
        .await;
    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.failed, 0);

    let rows = PositionQueryService::new(store)
        .history_for_vessel(&mmsi.to_string(), 1)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sog, Some(2.0));
}
