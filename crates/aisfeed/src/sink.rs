//! Best-effort position persistence
//!
//! The feed client never waits on storage. It hands messages to a bounded
//! queue through `SinkHandle::submit`; one worker task drains the queue in
//! arrival order, normalizes, and writes whatever has accumulated as a batch.
//! A failed insert is counted and logged, and the rest of the batch proceeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::message::FeedMessage;
use crate::metrics;
use crate::position::{self, VesselPosition};
use crate::store::PositionStore;

pub const DEFAULT_SINK_QUEUE: usize = 4096;

/// Maximum records written per batch by the worker.
pub const MAX_BATCH: usize = 256;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct PositionSink {
    store: Arc<dyn PositionStore>,
}

impl PositionSink {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self { store }
    }

    pub fn normalize(msg: &FeedMessage) -> Option<VesselPosition> {
        position::normalize(msg)
    }

    /// Insert one record. Errors are logged with the MMSI and returned.
    pub async fn persist(&self, record: &VesselPosition) -> Result<(), StoreError> {
        match self.store.insert(record).await {
            Ok(()) => {
                metrics::record_position_inserted();
                Ok(())
            }
            Err(e) => {
                error!(mmsi = record.mmsi, error = %e, "Failed to insert position");
                metrics::record_position_failed();
                Err(e)
            }
        }
    }

    /// Insert records one at a time; a failure never stops the batch.
    pub async fn persist_batch(&self, records: &[VesselPosition]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for record in records {
            match self.persist(record).await {
                Ok(()) => outcome.inserted += 1,
                Err(_) => outcome.failed += 1,
            }
        }
        if outcome.failed > 0 {
            warn!(
                inserted = outcome.inserted,
                failed = outcome.failed,
                "Position batch completed with failures"
            );
        }
        outcome
    }

    /// Start the worker. The worker exits once every `SinkHandle` is dropped
    /// and the queue is drained.
    pub fn spawn(self, queue: usize) -> (SinkHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let handle = tokio::spawn(self.run(rx));
        (SinkHandle::from_sender(tx), handle)
    }

    async fn run(self, mut rx: mpsc::Receiver<FeedMessage>) {
        let mut batch = Vec::with_capacity(MAX_BATCH);
        while let Some(first) = rx.recv().await {
            batch.extend(Self::normalize(&first));
            let mut taken = 1;
            while taken < MAX_BATCH {
                match rx.try_recv() {
                    Ok(msg) => {
                        batch.extend(Self::normalize(&msg));
                        taken += 1;
                    }
                    Err(_) => break,
                }
            }
            if batch.is_empty() {
                continue;
            }
            let outcome = self.persist_batch(&batch).await;
            debug!(
                inserted = outcome.inserted,
                failed = outcome.failed,
                "Position batch written"
            );
            batch.clear();
        }
        info!("Position sink drained");
    }
}

/// Producer side of the sink queue. Cheap to clone.
///
/// Drops are counted per frame; the log only records when the queue fills
/// up and when it accepts frames again.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<FeedMessage>,
    saturated: Arc<AtomicBool>,
}

impl SinkHandle {
    fn from_sender(tx: mpsc::Sender<FeedMessage>) -> Self {
        Self {
            tx,
            saturated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a message without waiting. Returns false when the queue is full
    /// or the worker has stopped; the message is then dropped.
    pub fn submit(&self, msg: &FeedMessage) -> bool {
        match self.tx.try_send(msg.clone()) {
            Ok(()) => {
                if self.saturated.load(Ordering::Relaxed)
                    && self.saturated.swap(false, Ordering::Relaxed)
                {
                    info!("Position sink queue accepting frames again");
                }
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                if !self.saturated.swap(true, Ordering::Relaxed) {
                    warn!("Position sink queue full, dropping frames until it drains");
                }
                metrics::record_sink_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_sink_dropped();
                false
            }
        }
    }

    /// A handle whose worker is gone. Everything submitted is dropped.
    pub fn disabled() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self::from_sender(tx)
    }

    /// True while the queue is full and frames are being dropped.
    pub fn is_saturated(&self) -> bool {
        self.saturated.load(Ordering::Relaxed)
    }
}
