//! Normalized vessel positions
//!
//! `normalize` turns a position-bearing frame into the record stored by the
//! sink. Frames without an MMSI or a valid position are skipped.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{AisFrame, FeedMessage, PositionFrame};

// AIS "not available" values. Heading uses 511, which the 0..360 range
// check already excludes.
const SOG_NOT_AVAILABLE: f64 = 102.3;
const COG_NOT_AVAILABLE: f64 = 360.0;

/// Persisted record. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselPosition {
    pub mmsi: i64,
    pub ship_name: Option<String>,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<f64>,
    pub nav_status: Option<i32>,
    pub lat: f64,
    pub lon: f64,
    pub time_utc: DateTime<Utc>,
    /// Original frame, kept for audit.
    pub raw: Value,
}

/// Query-side view of a stored position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
    pub mmsi: i64,
    pub ship_name: Option<String>,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<f64>,
    pub nav_status: Option<i32>,
    pub time_utc: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
}

impl From<&VesselPosition> for PositionRow {
    fn from(p: &VesselPosition) -> Self {
        Self {
            mmsi: p.mmsi,
            ship_name: p.ship_name.clone(),
            sog: p.sog,
            cog: p.cog,
            heading: p.heading,
            nav_status: p.nav_status,
            time_utc: p.time_utc,
            lat: p.lat,
            lon: p.lon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselSummary {
    pub mmsi: i64,
    pub ship_name: Option<String>,
    pub time_utc: DateTime<Utc>,
}

/// Build a position record from a frame, or `None` if it lacks an MMSI or
/// a position inside [-90, 90] x [-180, 180]. AIS uses 91/181 for
/// "not available", which is rejected here.
pub fn normalize(msg: &FeedMessage) -> Option<VesselPosition> {
    match msg.frame() {
        AisFrame::PositionReport(frame) => from_frame(&frame, msg.to_value()),
        _ => None,
    }
}

fn from_frame(frame: &PositionFrame, raw: Value) -> Option<VesselPosition> {
    let PositionFrame { report, meta } = frame;

    let mmsi = report.mmsi.or(report.user_id).or(meta.mmsi)?;
    if mmsi <= 0 {
        return None;
    }

    let lat = report.latitude.or(meta.latitude)?;
    let lon = report.longitude.or(meta.longitude)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }

    let ship_name = meta
        .ship_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let time_utc = meta
        .time_utc
        .as_deref()
        .and_then(parse_time_utc)
        .unwrap_or_else(Utc::now);

    Some(VesselPosition {
        mmsi,
        ship_name,
        sog: report.sog.filter(|v| (0.0..SOG_NOT_AVAILABLE).contains(v)),
        cog: report.cog.filter(|v| (0.0..COG_NOT_AVAILABLE).contains(v)),
        heading: report.heading.filter(|v| (0.0..360.0).contains(v)),
        nav_status: report.nav_status,
        lat,
        lon,
        time_utc,
        raw,
    })
}

/// Parse the upstream report timestamp.
///
/// Accepts `2024-03-01 12:00:00.123456789 +0000 UTC` as well as RFC 3339.
pub fn parse_time_utc(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let trimmed = s.strip_suffix(" UTC").unwrap_or(s);
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_normalize_minimal_report() {
        let msg = FeedMessage::from_text(
            r#"{"Message":{"PositionReport":{"MMSI":123456789,"Latitude":10.0,"Longitude":20.0,"Sog":5.2}}}"#,
        );
        let pos = normalize(&msg).unwrap();
        assert_eq!(pos.mmsi, 123456789);
        assert_eq!(pos.lat, 10.0);
        assert_eq!(pos.lon, 20.0);
        assert_eq!(pos.sog, Some(5.2));
        assert_eq!(pos.cog, None);
        assert_eq!(pos.raw, msg.to_value());
    }

    #[test]
    fn test_normalize_full_aisstream_frame() {
        let msg = FeedMessage::from_text(
            r#"{"MessageType":"PositionReport",
                "MetaData":{"MMSI":244660000,"ShipName":"NORDIC STAR   ",
                            "time_utc":"2024-03-01 12:34:56.789 +0000 UTC"},
                "Message":{"PositionReport":{"UserID":244660000,"Latitude":52.1,"Longitude":4.2,
                            "Sog":11.3,"Cog":201.5,"TrueHeading":200,"NavigationalStatus":5}}}"#,
        );
        let pos = normalize(&msg).unwrap();
        assert_eq!(pos.mmsi, 244660000);
        assert_eq!(pos.ship_name.as_deref(), Some("NORDIC STAR"));
        assert_eq!(pos.heading, Some(200.0));
        assert_eq!(pos.nav_status, Some(5));
        assert_eq!(pos.time_utc.year(), 2024);
        assert_eq!(pos.time_utc.minute(), 34);
    }

    #[test]
    fn test_position_falls_back_to_metadata() {
        let msg = FeedMessage::from_text(
            r#"{"MetaData":{"MMSI":211331640,"latitude":53.5,"longitude":9.9},
                "Message":{"StandardClassBPositionReport":{"Sog":0.1}}}"#,
        );
        let pos = normalize(&msg).unwrap();
        assert_eq!(pos.mmsi, 211331640);
        assert_eq!(pos.lat, 53.5);
    }

    #[test]
    fn test_skip_without_mmsi() {
        let msg = FeedMessage::from_text(
            r#"{"Message":{"PositionReport":{"Latitude":10.0,"Longitude":20.0}}}"#,
        );
        assert!(normalize(&msg).is_none());
    }

    #[test]
    fn test_skip_without_position() {
        let msg = FeedMessage::from_text(r#"{"Message":{"PositionReport":{"MMSI":123456789}}}"#);
        assert!(normalize(&msg).is_none());
    }

    #[test]
    fn test_skip_not_available_sentinel() {
        let msg = FeedMessage::from_text(
            r#"{"Message":{"PositionReport":{"MMSI":123456789,"Latitude":91.0,"Longitude":181.0}}}"#,
        );
        assert!(normalize(&msg).is_none());
    }

    #[test]
    fn test_motion_not_available_values_dropped() {
        let msg = FeedMessage::from_text(
            r#"{"Message":{"PositionReport":{"MMSI":123456789,"Latitude":10.0,"Longitude":20.0,
                "Sog":102.3,"Cog":360.0,"TrueHeading":511}}}"#,
        );
        let pos = normalize(&msg).unwrap();
        assert_eq!(pos.sog, None);
        assert_eq!(pos.cog, None);
        assert_eq!(pos.heading, None);

        let msg = FeedMessage::from_text(
            r#"{"Message":{"PositionReport":{"MMSI":123456789,"Latitude":10.0,"Longitude":20.0,
                "Sog":0.0,"Cog":359.9,"TrueHeading":0}}}"#,
        );
        let pos = normalize(&msg).unwrap();
        assert_eq!(pos.sog, Some(0.0));
        assert_eq!(pos.cog, Some(359.9));
        assert_eq!(pos.heading, Some(0.0));
    }

    #[test]
    fn test_skip_non_position_frames() {
        assert!(normalize(&FeedMessage::from_text("garbage")).is_none());
        assert!(normalize(&FeedMessage::from_text(r#"{"MessageType":"ShipStaticData"}"#)).is_none());
    }

    #[test]
    fn test_parse_time_formats() {
        assert!(parse_time_utc("2024-03-01 12:00:00.123456789 +0000 UTC").is_some());
        assert!(parse_time_utc("2024-03-01T12:00:00Z").is_some());
        assert!(parse_time_utc("2024-03-01 12:00:00").is_some());
        assert!(parse_time_utc("yesterday").is_none());
    }
}
