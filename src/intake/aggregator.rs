//! Debounce aggregator for multi-attachment bursts.
//!
//! Attachment-bearing events that share a correlation key arrive as separate
//! inbound messages within a fraction of a second. The aggregator buffers
//! them per key, waits out a debounce window, then hands the whole burst
//! downstream exactly once, sorted by sequence id (delivery order is not
//! trustworthy).
//!
//! Timers are never cancelled. Correctness comes from removing the buffer
//! from the live set *before* delivering it: a timer firing against an
//! already-flushed key finds nothing, and late arrivals for a reused key
//! start a fresh burst.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Error;
use crate::queue::model::{AttachmentRef, SubmissionKind};

/// One inbound attachment-bearing (or plain) submission event.
#[derive(Debug, Clone)]
pub struct AttachmentEvent {
    /// Store id of the submitting user.
    pub owner_id: i64,
    pub kind: SubmissionKind,
    pub subject: String,
    pub body: String,
    pub related_event_id: Option<i64>,
    /// Correlation key for multi-part bursts; `None` delivers immediately.
    pub group_key: Option<String>,
    /// Strictly increasing per-session sequence id (message id).
    pub seq: i64,
    pub attachment: Option<AttachmentRef>,
    pub received_at: DateTime<Utc>,
}

/// Downstream consumer of one assembled burst.
#[async_trait]
pub trait IntakeSink: Send + Sync {
    async fn deliver(&self, batch: Vec<AttachmentEvent>) -> Result<(), Error>;
}

/// Groups events by correlation key with a fixed debounce window.
pub struct IntakeAggregator {
    buffers: Arc<Mutex<HashMap<String, Vec<AttachmentEvent>>>>,
    sink: Arc<dyn IntakeSink>,
    debounce: Duration,
}

impl IntakeAggregator {
    pub fn new(sink: Arc<dyn IntakeSink>, debounce: Duration) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(HashMap::new())),
            sink,
            debounce,
        }
    }

    /// Observe one inbound event.
    ///
    /// Keyless events go downstream immediately as a singleton batch. The
    /// first event for a key opens a buffer and arms the debounce timer;
    /// later events append without re-arming it.
    pub async fn observe(&self, event: AttachmentEvent) {
        let Some(key) = event.group_key.clone() else {
            if let Err(e) = self.sink.deliver(vec![event]).await {
                warn!(error = %e, "Singleton intake delivery failed");
            }
            return;
        };

        {
            // Check-and-insert under one lock hold so two events for a
            // brand-new key cannot open two buffers.
            let mut buffers = self.buffers.lock().await;
            match buffers.entry(key.clone()) {
                Entry::Occupied(mut open) => {
                    open.get_mut().push(event);
                    return;
                }
                Entry::Vacant(slot) => {
                    slot.insert(vec![event]);
                }
            }
        }

        debug!(group_key = %key, "Opened aggregation buffer");

        let buffers = Arc::clone(&self.buffers);
        let sink = Arc::clone(&self.sink);
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            // Remove before delivering: cleanup happens on every exit path,
            // so a sink failure cannot wedge the key.
            let batch = buffers.lock().await.remove(&key);
            let Some(mut batch) = batch else {
                return;
            };
            batch.sort_by_key(|e| e.seq);

            debug!(group_key = %key, size = batch.len(), "Flushing aggregation buffer");
            if let Err(e) = sink.deliver(batch).await {
                warn!(group_key = %key, error = %e, "Aggregated intake delivery failed");
            }
        });
    }

    /// Drop all live buffers. Operational tooling only — never called from
    /// request-handling paths.
    pub async fn clear(&self) {
        self.buffers.lock().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn open_buffers(&self) -> usize {
        self.buffers.lock().await.len()
    }
}
