//! Ingestion queue between the network worker and the presentation cycle.
//!
//! The queue is split into two handles: [`EnvelopeSender`] is cheap to clone
//! and may be held by any number of producers, [`EnvelopeDrain`] is unique and
//! owned by the presentation cycle. The queue itself is unbounded; retention is
//! enforced on the history buffer after draining.

use crate::envelope::Envelope;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<Envelope>,
    last_received_at: Option<OffsetDateTime>,
    total_enqueued: u64,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<QueueInner>,
}

/// Producer handle. Enqueueing never blocks beyond a short critical section.
#[derive(Debug, Clone)]
pub struct EnvelopeSender {
    shared: Arc<Shared>,
}

/// Consumer handle, owned by the presentation cycle.
#[derive(Debug)]
pub struct EnvelopeDrain {
    shared: Arc<Shared>,
}

/// Creates a new ingestion queue and returns its two ends.
pub fn ingest_queue() -> (EnvelopeSender, EnvelopeDrain) {
    let shared = Arc::new(Shared::default());
    (
        EnvelopeSender { shared: shared.clone() },
        EnvelopeDrain { shared },
    )
}

impl EnvelopeSender {
    /// Appends an envelope at the tail of the queue.
    ///
    /// `received_at` is clamped so it never goes backwards relative to the
    /// previously enqueued envelope, whichever producer enqueued it.
    pub fn enqueue(&self, mut envelope: Envelope) {
        let mut inner = self.shared.inner.lock();
        if let Some(last) = inner.last_received_at {
            if envelope.received_at() < last {
                envelope.set_received_at(last);
            }
        }
        inner.last_received_at = Some(envelope.received_at());
        inner.total_enqueued += 1;
        inner.items.push_back(envelope);
    }

    /// Number of envelopes currently waiting.
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().items.len()
    }
}

impl EnvelopeDrain {
    /// Removes and returns every queued envelope in arrival order.
    pub fn drain_all(&mut self) -> Vec<Envelope> {
        let items = std::mem::take(&mut self.shared.inner.lock().items);
        items.into()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().items.is_empty()
    }

    /// Total envelopes ever enqueued, drained or not.
    pub fn total_enqueued(&self) -> u64 {
        self.shared.inner.lock().total_enqueued
    }
}
