//! Typed configuration for the feed client
//!
//! Values come from the server's command line / environment; this module only
//! holds the typed forms and the helpers to build them.

use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

pub const DEFAULT_AISSTREAM_URL: &str = "wss://stream.aisstream.io/v0/stream";

/// Geographic filter expressed as two opposite corners, `[lat, lon]` each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "[[f64; 2]; 2]")]
pub struct BoundingBox {
    pub south_west: (f64, f64),
    pub north_east: (f64, f64),
}

impl BoundingBox {
    pub fn new(south_west: (f64, f64), north_east: (f64, f64)) -> Result<Self, ConfigError> {
        for (lat, lon) in [south_west, north_east] {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(ConfigError::BoundingBox(format!(
                    "corner ({}, {}) out of range",
                    lat, lon
                )));
            }
        }
        Ok(Self {
            south_west,
            north_east,
        })
    }

    /// Parse `lat,lon,lat,lon` boxes separated by `;`. An empty string
    /// means the whole globe.
    pub fn parse_list(value: &str) -> Result<Vec<BoundingBox>, ConfigError> {
        let mut boxes = Vec::new();
        for spec in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let coords = spec
                .split(',')
                .map(|c| c.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ConfigError::BoundingBox(format!("{:?}: {}", spec, e)))?;
            match coords[..] {
                [lat1, lon1, lat2, lon2] => boxes.push(Self::new((lat1, lon1), (lat2, lon2))?),
                _ => {
                    return Err(ConfigError::BoundingBox(format!(
                        "{:?}: expected lat,lon,lat,lon",
                        spec
                    )))
                }
            }
        }
        if boxes.is_empty() {
            boxes.push(Self::globe());
        }
        Ok(boxes)
    }

    pub fn globe() -> Self {
        Self {
            south_west: (-90.0, -180.0),
            north_east: (90.0, 180.0),
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::globe()
    }
}

impl From<BoundingBox> for [[f64; 2]; 2] {
    fn from(b: BoundingBox) -> Self {
        [
            [b.south_west.0, b.south_west.1],
            [b.north_east.0, b.north_east.1],
        ]
    }
}

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Without a key the feed client does not start.
    pub api_key: Option<String>,
    pub url: String,
    pub bounding_boxes: Vec<BoundingBox>,
    pub mmsi_filter: Vec<String>,
    pub message_type_filter: Vec<String>,
}

impl FeedConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            url: DEFAULT_AISSTREAM_URL.to_string(),
            bounding_boxes: vec![BoundingBox::globe()],
            mmsi_filter: Vec::new(),
            message_type_filter: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_bounding_boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.bounding_boxes = boxes;
        self
    }

    pub fn with_mmsi_filter(mut self, mmsi: Vec<String>) -> Self {
        self.mmsi_filter = mmsi;
        self
    }

    pub fn with_message_type_filter(mut self, types: Vec<String>) -> Self {
        self.message_type_filter = types;
        self
    }
}

/// Reconnect delay policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Return to `base` once a session delivers feed data. When false the
    /// delay keeps growing (within `max`) across the process lifetime.
    pub reset_on_success: bool,
}

impl BackoffConfig {
    pub fn new(base: Duration, max: Duration) -> Result<Self, ConfigError> {
        if base.is_zero() {
            return Err(ConfigError::Backoff("base delay must be positive".into()));
        }
        if max < base {
            return Err(ConfigError::Backoff(format!(
                "max delay {}ms below base delay {}ms",
                max.as_millis(),
                base.as_millis()
            )));
        }
        Ok(Self {
            base,
            max,
            ..Self::default()
        })
    }

    pub fn with_reset_on_success(mut self, reset: bool) -> Self {
        self.reset_on_success = reset;
        self
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30_000),
            multiplier: 1.5,
            reset_on_success: false,
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
