//! Per-frame processing: buffer + broadcast, then hand off to the sink.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::broadcast::Broadcaster;
use crate::message::{AisFrame, FeedMessage};
use crate::metrics;
use crate::sink::SinkHandle;

/// The steps every upstream frame goes through, in order. None of them can
/// fail out of `process`.
#[derive(Clone)]
pub struct FramePipeline {
    broadcaster: Arc<Broadcaster>,
    sink: SinkHandle,
}

impl FramePipeline {
    pub fn new(broadcaster: Arc<Broadcaster>, sink: SinkHandle) -> Self {
        Self { broadcaster, sink }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn process_text(&self, text: &str) -> bool {
        self.process(FeedMessage::from_text(text))
    }

    pub fn process_bytes(&self, bytes: &[u8]) -> bool {
        self.process(FeedMessage::parse(bytes))
    }

    /// Returns true when the frame carried feed data (see
    /// `AisFrame::is_feed_data`).
    pub fn process(&self, msg: FeedMessage) -> bool {
        let frame = msg.frame();
        let kind = frame.kind();
        let feed_data = frame.is_feed_data();
        metrics::record_frame(kind);
        match frame {
            AisFrame::Raw(_) => debug!("Frame is not JSON, keeping raw text"),
            AisFrame::UpstreamError(error) => warn!(error, "Upstream reported an error"),
            _ => {}
        }

        let delivered = self.broadcaster.publish(msg.clone());
        self.sink.submit(&msg);
        debug!(kind, delivered, "Frame processed");
        feed_data
    }
}
