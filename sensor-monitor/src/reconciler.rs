/**
 * STATE RECONCILER - applies queued envelopes to the dashboard state
 *
 * ROLE :
 * Runs on the presentation cycle only. Drains the ingestion queue and applies
 * each envelope in arrival order to the history, the latest snapshot and the
 * connection flag.
 *
 * RULES :
 * - SensorReading   -> overwrite latest, append to history (FIFO eviction)
 * - ConnectionStatus -> overwrite the connection flag
 * - DecodeError     -> logged, surfaced as a transient diagnostic, never stored
 * - an invalid envelope is dropped with a logged reason; the rest of the
 *   batch is still applied
 */

use crate::envelope::Envelope;
use crate::queue::EnvelopeDrain;
use crate::state::DashboardState;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Payload bytes kept in a diagnostic preview.
const PREVIEW_BYTES: usize = 120;

/// Something the operator should see for one cycle but that is not stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub message: String,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub readings: usize,
    pub status_changes: usize,
    pub decode_errors: usize,
    pub dropped: usize,
    pub evicted: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ReconcileReport {
    /// True when the latest snapshot, history or connection flag changed.
    pub fn changed(&self) -> bool {
        self.readings > 0 || self.status_changes > 0
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.readings += other.readings;
        self.status_changes += other.status_changes;
        self.decode_errors += other.decode_errors;
        self.dropped += other.dropped;
        self.evicted += other.evicted;
        self.diagnostics.extend(other.diagnostics);
    }
}

/// Drains every pending envelope and applies it to `state`.
pub fn reconcile(state: &mut DashboardState, drain: &mut EnvelopeDrain) -> ReconcileReport {
    apply_all(state, drain.drain_all())
}

/// Applies a batch of envelopes in order. Each one is handled independently.
pub fn apply_all(state: &mut DashboardState, envelopes: Vec<Envelope>) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for envelope in envelopes {
        apply(state, envelope, &mut report);
    }
    if report.changed() || !report.diagnostics.is_empty() {
        debug!(
            readings = report.readings,
            status_changes = report.status_changes,
            decode_errors = report.decode_errors,
            dropped = report.dropped,
            evicted = report.evicted,
            "reconciled"
        );
    }
    report
}

fn apply(state: &mut DashboardState, envelope: Envelope, report: &mut ReconcileReport) {
    match envelope {
        Envelope::SensorReading(reading) => {
            if let Err(reason) = reading.validate() {
                warn!(%reason, "dropping invalid reading");
                report.dropped += 1;
                report.diagnostics.push(Diagnostic {
                    at: reading.received_at,
                    message: format!("dropped reading: {reason}"),
                });
                return;
            }
            report.evicted += state.record_reading(reading);
            report.readings += 1;
        }
        Envelope::ConnectionStatus { connected, .. } => {
            if state.set_connected(connected) {
                info!(connected, "MQTT connection state changed");
                report.status_changes += 1;
            }
        }
        Envelope::DecodeError { raw_payload, reason, received_at } => {
            let preview = payload_preview(&raw_payload);
            warn!(%reason, payload = %preview, "discarding undecodable payload");
            report.decode_errors += 1;
            report.diagnostics.push(Diagnostic {
                at: received_at,
                message: format!("decode error: {reason} ({preview})"),
            });
        }
    }
}

fn payload_preview(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(&raw[..raw.len().min(PREVIEW_BYTES)]).into_owned();
    if raw.len() > PREVIEW_BYTES {
        format!("{text}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Classification, LightCondition, SensorReading};
    use crate::queue::ingest_queue;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2026-03-01 09:00:00 UTC);

    fn reading(temperature: f64, offset: i64) -> SensorReading {
        SensorReading {
            temperature,
            humidity: 60.1,
            light_intensity: 820,
            light_condition: LightCondition::Bright,
            classification: Classification::Normal,
            received_at: T0 + Duration::seconds(offset),
        }
    }

    #[test]
    fn test_status_then_reading() {
        let (tx, mut rx) = ingest_queue();
        let mut state = DashboardState::new(100);
        let r = reading(25.3, 1);
        tx.enqueue(Envelope::connection(true, T0));
        tx.enqueue(Envelope::SensorReading(r.clone()));

        let report = reconcile(&mut state, &mut rx);

        assert!(report.changed());
        assert!(state.is_connected());
        assert_eq!(state.latest(), Some(&r));
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_capacity_three_keeps_last_three() {
        let (tx, mut rx) = ingest_queue();
        let mut state = DashboardState::new(3);
        let readings: Vec<_> = (1..=4).map(|i| reading(20.0 + i as f64, i)).collect();
        for r in &readings {
            tx.enqueue(Envelope::SensorReading(r.clone()));
        }

        let report = reconcile(&mut state, &mut rx);

        assert_eq!(report.readings, 4);
        assert_eq!(report.evicted, 1);
        assert_eq!(state.history().to_vec(), readings[1..].to_vec());
        assert_eq!(state.latest(), Some(&readings[3]));
    }

    #[test]
    fn test_decode_error_leaves_state_untouched() {
        let (tx, mut rx) = ingest_queue();
        let mut state = DashboardState::new(10);
        let r = reading(22.0, 0);
        state.record_reading(r.clone());
        tx.enqueue(Envelope::DecodeError {
            raw_payload: b"{oops".to_vec(),
            reason: "invalid JSON".into(),
            received_at: T0,
        });

        let report = reconcile(&mut state, &mut rx);

        assert!(!report.changed());
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].message.contains("{oops"));
        assert_eq!(state.history().to_vec(), vec![r.clone()]);
        assert_eq!(state.latest(), Some(&r));
    }

    #[test]
    fn test_empty_queue_is_idempotent() {
        let (_tx, mut rx) = ingest_queue();
        let mut state = DashboardState::new(10);
        state.record_reading(reading(19.0, 0));
        state.set_connected(true);
        let before = (state.history().to_vec(), state.latest().cloned(), state.is_connected());

        let report = reconcile(&mut state, &mut rx);

        assert_eq!(report, ReconcileReport::default());
        let after = (state.history().to_vec(), state.latest().cloned(), state.is_connected());
        assert_eq!(before, after);
    }

    #[test]
    fn test_invalid_reading_does_not_abort_batch() {
        let mut state = DashboardState::new(10);
        let mut bad = reading(0.0, 1);
        bad.temperature = f64::INFINITY;
        let good = reading(23.0, 2);

        let report = apply_all(
            &mut state,
            vec![
                Envelope::SensorReading(bad),
                Envelope::SensorReading(good.clone()),
                Envelope::connection(true, T0 + Duration::seconds(3)),
            ],
        );

        assert_eq!(report.dropped, 1);
        assert_eq!(report.readings, 1);
        assert_eq!(report.status_changes, 1);
        assert_eq!(state.history().to_vec(), vec![good]);
        assert!(state.is_connected());
    }

    #[test]
    fn test_repeated_status_is_not_a_change() {
        let mut state = DashboardState::new(10);
        state.set_connected(true);
        let report = apply_all(&mut state, vec![Envelope::connection(true, T0)]);
        assert!(!report.changed());
        assert!(state.is_connected());
    }

    #[test]
    fn test_preview_is_truncated() {
        let raw = vec![b'x'; PREVIEW_BYTES + 10];
        let preview = payload_preview(&raw);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), PREVIEW_BYTES + 3);
    }
}
