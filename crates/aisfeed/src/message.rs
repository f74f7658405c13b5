//! Feed messages and frame classification
//!
//! Every upstream frame becomes exactly one `FeedMessage`. Frames that are not
//! valid JSON are kept verbatim and serialize as `{"raw": "<text>"}`.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Message bodies that carry a vessel position in the same field layout.
const POSITION_BODIES: [&str; 3] = [
    "PositionReport",
    "StandardClassBPositionReport",
    "ExtendedClassBPositionReport",
];

#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    Json(Value),
    Raw(String),
}

impl Serialize for FeedPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FeedPayload::Json(value) => value.serialize(serializer),
            FeedPayload::Raw(text) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("raw", text)?;
                map.end()
            }
        }
    }
}

/// One upstream frame. Cheap to clone; the payload is shared between the
/// buffer, every subscriber queue and the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    payload: Arc<FeedPayload>,
}

impl FeedMessage {
    /// Decode a frame. Binary frames are read as UTF-8 (lossy).
    pub fn parse(bytes: &[u8]) -> Self {
        Self::from_text(&String::from_utf8_lossy(bytes))
    }

    pub fn from_text(text: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(text) {
            Ok(value) => FeedPayload::Json(value),
            Err(_) => FeedPayload::Raw(text.to_string()),
        };
        Self::new(payload)
    }

    pub fn new(payload: FeedPayload) -> Self {
        Self {
            payload: Arc::new(payload),
        }
    }

    pub fn from_value(value: Value) -> Self {
        Self::new(FeedPayload::Json(value))
    }

    pub fn payload(&self) -> &FeedPayload {
        &self.payload
    }

    pub fn is_raw(&self) -> bool {
        matches!(*self.payload, FeedPayload::Raw(_))
    }

    /// The payload as JSON, with raw frames wrapped as `{"raw": ...}`.
    pub fn to_value(&self) -> Value {
        match &*self.payload {
            FeedPayload::Json(value) => value.clone(),
            FeedPayload::Raw(text) => serde_json::json!({ "raw": text }),
        }
    }

    /// Compact JSON encoding used for SSE `data:` lines.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&*self.payload).unwrap_or_else(|_| "null".to_string())
    }

    pub fn frame(&self) -> AisFrame<'_> {
        AisFrame::classify(&self.payload)
    }
}

impl Serialize for FeedMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

/// Shape of an upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum AisFrame<'a> {
    /// A report carrying a vessel position.
    PositionReport(PositionFrame),
    /// A typed message with no position body (static data, safety messages...).
    Typed { message_type: &'a str },
    /// Error report from the provider, e.g. `{"error": "Api Key Is Not Valid"}`.
    UpstreamError(&'a str),
    /// Valid JSON of no recognised shape.
    Unknown(&'a Value),
    /// Not JSON at all.
    Raw(&'a str),
}

impl<'a> AisFrame<'a> {
    pub fn classify(payload: &'a FeedPayload) -> Self {
        let value = match payload {
            FeedPayload::Raw(text) => return AisFrame::Raw(text),
            FeedPayload::Json(value) => value,
        };

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return AisFrame::UpstreamError(error);
        }

        let message = value.get("Message");
        if let Some(message) = message {
            for body in POSITION_BODIES {
                if let Some(report) = message.get(body) {
                    if let Ok(report) = PositionReport::deserialize(report) {
                        let meta = value
                            .get("MetaData")
                            .and_then(|m| MetaData::deserialize(m).ok())
                            .unwrap_or_default();
                        return AisFrame::PositionReport(PositionFrame { report, meta });
                    }
                }
            }
        }

        let message_type = value
            .get("MessageType")
            .or_else(|| message.and_then(|m| m.get("Type")))
            .and_then(Value::as_str);
        match message_type {
            Some(message_type) => AisFrame::Typed { message_type },
            None => AisFrame::Unknown(value),
        }
    }

    /// Label used for per-kind metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AisFrame::PositionReport(_) => "position_report",
            AisFrame::Typed { .. } => "typed",
            AisFrame::UpstreamError(_) => "upstream_error",
            AisFrame::Unknown(_) => "unknown",
            AisFrame::Raw(_) => "raw",
        }
    }

    /// True for frames that carry feed data. Only these show the upstream
    /// session is actually streaming.
    pub fn is_feed_data(&self) -> bool {
        matches!(self, AisFrame::PositionReport(_) | AisFrame::Typed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionFrame {
    pub report: PositionReport,
    pub meta: MetaData,
}

/// Position body of `Message.PositionReport` and the class B variants.
/// Missing or mistyped fields deserialize to `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PositionReport {
    #[serde(rename = "MMSI", default, deserialize_with = "lenient")]
    pub mmsi: Option<i64>,
    #[serde(rename = "UserID", default, deserialize_with = "lenient")]
    pub user_id: Option<i64>,
    #[serde(rename = "Latitude", default, deserialize_with = "lenient")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude", default, deserialize_with = "lenient")]
    pub longitude: Option<f64>,
    #[serde(rename = "Sog", default, deserialize_with = "lenient")]
    pub sog: Option<f64>,
    #[serde(rename = "Cog", default, deserialize_with = "lenient")]
    pub cog: Option<f64>,
    #[serde(rename = "TrueHeading", default, deserialize_with = "lenient")]
    pub heading: Option<f64>,
    #[serde(rename = "NavigationalStatus", default, deserialize_with = "lenient")]
    pub nav_status: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetaData {
    #[serde(rename = "MMSI", default, deserialize_with = "lenient")]
    pub mmsi: Option<i64>,
    #[serde(rename = "ShipName", default, deserialize_with = "lenient")]
    pub ship_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub time_utc: Option<String>,
}

/// Deserialize a field as `Some` when it has the expected type, `None` otherwise.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
