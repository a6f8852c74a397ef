//! Process-lifetime context shared by the network worker and the presentation cycle.

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::health::HealthTracker;
use crate::queue::{ingest_queue, EnvelopeDrain, EnvelopeSender};
use crate::worker::spawn_network_worker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Explicitly constructed owner of the queue's producer side and of the
/// start-once guard. The consumer side is returned separately by [`MonitorContext::new`]
/// so that only the presentation cycle can ever drain.
pub struct MonitorContext {
    config: MonitorConfig,
    sender: EnvelopeSender,
    health: HealthTracker,
    worker_started: AtomicBool,
}

pub type SharedContext = Arc<MonitorContext>;

impl MonitorContext {
    pub fn new(config: MonitorConfig) -> (SharedContext, EnvelopeDrain) {
        let (sender, drain) = ingest_queue();
        let ctx = MonitorContext {
            config,
            sender,
            health: HealthTracker::new(),
            worker_started: AtomicBool::new(false),
        };
        (Arc::new(ctx), drain)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn sender(&self) -> EnvelopeSender {
        self.sender.clone()
    }

    /// Claims the single worker slot. Fails on every call after the first.
    pub fn claim_worker_slot(&self) -> Result<(), MonitorError> {
        self.worker_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| MonitorError::WorkerAlreadyStarted)
    }

    pub fn worker_started(&self) -> bool {
        self.worker_started.load(Ordering::Acquire)
    }

    /// Starts the one network worker for this process.
    pub fn start_worker(&self) -> Result<JoinHandle<Result<(), MonitorError>>, MonitorError> {
        self.claim_worker_slot()?;
        match spawn_network_worker(&self.config.mqtt, self.sender(), self.health.clone()) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                // Nothing was spawned, give the slot back.
                self.worker_started.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use time::OffsetDateTime;

    #[test]
    fn test_worker_slot_is_claimed_once() {
        let (ctx, _drain) = MonitorContext::new(MonitorConfig::default());
        assert!(!ctx.worker_started());
        assert!(ctx.claim_worker_slot().is_ok());
        assert!(matches!(ctx.claim_worker_slot(), Err(MonitorError::WorkerAlreadyStarted)));
        assert!(ctx.worker_started());
    }

    #[test]
    fn test_claim_races_have_one_winner() {
        let (ctx, _drain) = MonitorContext::new(MonitorConfig::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                std::thread::spawn(move || ctx.claim_worker_slot().is_ok())
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_sender_feeds_the_returned_drain() {
        let (ctx, mut drain) = MonitorContext::new(MonitorConfig::default());
        ctx.sender().enqueue(Envelope::connection(true, OffsetDateTime::now_utc()));
        assert_eq!(drain.drain_all().len(), 1);
    }

    #[tokio::test]
    async fn test_start_worker_twice_is_rejected() {
        let mut config = MonitorConfig::default();
        // Nothing listens here; the worker just keeps retrying in the background.
        config.mqtt.host = "127.0.0.1".into();
        config.mqtt.port = 1;
        let (ctx, _drain) = MonitorContext::new(config);

        let first = ctx.start_worker().unwrap();
        assert!(matches!(ctx.start_worker(), Err(MonitorError::WorkerAlreadyStarted)));
        first.abort();
    }

    #[test]
    fn test_failed_start_releases_slot() {
        let mut config = MonitorConfig::default();
        config.mqtt.tls = true;
        config.mqtt.ca_file = Some("/nonexistent/ca.pem".into());
        let (ctx, _drain) = MonitorContext::new(config);

        assert!(matches!(ctx.start_worker(), Err(MonitorError::Io(_))));
        assert!(!ctx.worker_started());
    }
}
