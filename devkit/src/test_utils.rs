/*!
Test harness for the sensor monitor core.

Wires the real pieces together without a broker:
- a `NetworkWorker` fed with hand-built CONNACK / PUBLISH / DISCONNECT packets
- the ingestion queue between them
- a `DashboardState` reconciled on demand, like one presentation cycle

No tracing subscriber is installed here, so the monitor's own events go
through the `log` facade and show up with `RUST_LOG=sensor_monitor=debug`.
*/

use crate::payloads::SensorPayloadBuilder;
use crate::simulator::SimulatedSensor;
use anyhow::Result;
use rumqttc::{ConnAck, ConnectReturnCode, ConnectionError, Packet, Publish, QoS};
use sensor_monitor::health::HealthTracker;
use sensor_monitor::queue::{ingest_queue, EnvelopeDrain, EnvelopeSender};
use sensor_monitor::reconciler::{reconcile, ReconcileReport};
use sensor_monitor::state::DashboardState;
use sensor_monitor::worker::NetworkWorker;
use serde_json::Value;

pub const DEFAULT_TOPIC: &str = "iot/ml/monitor/data";

pub struct TestHarness {
    pub worker: NetworkWorker,
    pub health: HealthTracker,
    sender: EnvelopeSender,
    drain: EnvelopeDrain,
    state: DashboardState,
    reports: Vec<ReconcileReport>,
}

impl TestHarness {
    pub fn new(history_capacity: usize) -> Self {
        Self::with_topic(history_capacity, DEFAULT_TOPIC)
    }

    pub fn with_topic(history_capacity: usize, topic: &str) -> Self {
        env_logger::try_init().ok();

        let (sender, drain) = ingest_queue();
        let health = HealthTracker::new();
        Self {
            worker: NetworkWorker::new(sender.clone(), topic, health.clone()),
            health,
            sender,
            drain,
            state: DashboardState::new(history_capacity),
            reports: Vec::new(),
        }
    }

    /// A second producer on the same queue, for concurrency tests.
    pub fn sender(&self) -> EnvelopeSender {
        self.sender.clone()
    }

    /// Broker accepts the session. Returns whether the worker asked to subscribe.
    pub fn connect(&mut self) -> bool {
        let resubscribe = self
            .worker
            .handle_incoming(&Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)));
        log::info!("connack delivered, resubscribe={resubscribe}");
        resubscribe
    }

    pub fn refuse(&mut self, code: ConnectReturnCode) {
        self.worker.handle_incoming(&Packet::ConnAck(ConnAck::new(code, false)));
        log::info!("connack refused with {code:?}");
    }

    pub fn disconnect(&mut self) {
        self.worker.handle_incoming(&Packet::Disconnect);
        log::info!("disconnect delivered");
    }

    /// Transport failure as seen by the event loop.
    pub fn drop_link(&mut self) {
        self.worker.handle_transport_error(&ConnectionError::RequestsDone);
    }

    pub fn deliver(&mut self, payload: &[u8]) {
        let topic = self.worker.topic().to_string();
        self.deliver_on(&topic, payload);
    }

    pub fn deliver_on(&mut self, topic: &str, payload: &[u8]) {
        let packet = Packet::Publish(Publish::new(topic, QoS::AtLeastOnce, payload.to_vec()));
        self.worker.handle_incoming(&packet);
        log::debug!("publish delivered on {topic} ({} bytes)", payload.len());
    }

    pub fn deliver_json(&mut self, payload: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(payload)?;
        self.deliver(&bytes);
        Ok(())
    }

    /// Delivers `count` readings from a simulated sensor.
    pub fn deliver_simulated(&mut self, sensor: &mut SimulatedSensor, count: usize) -> Result<()> {
        for _ in 0..count {
            let payload = sensor.next_payload();
            self.deliver_json(&payload)?;
        }
        Ok(())
    }

    pub fn deliver_reading(&mut self, builder: SensorPayloadBuilder) {
        self.deliver(&builder.to_bytes());
    }

    /// Runs one reconciliation pass, as the presentation cycle would.
    pub fn reconcile(&mut self) -> &ReconcileReport {
        let report = reconcile(&mut self.state, &mut self.drain);
        log::info!(
            "reconciled: {} readings, {} status changes, {} decode errors",
            report.readings,
            report.status_changes,
            report.decode_errors
        );
        self.reports.push(report);
        &self.reports[self.reports.len() - 1]
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn reports(&self) -> &[ReconcileReport] {
        &self.reports
    }

    pub fn assert_connected(&self, expected: bool) -> Result<()> {
        if self.state.is_connected() != expected {
            anyhow::bail!("connection state: expected {expected}, got {}", self.state.is_connected());
        }
        Ok(())
    }

    pub fn assert_history_len(&self, expected: usize) -> Result<()> {
        let actual = self.state.history().len();
        if actual != expected {
            anyhow::bail!("history length: expected {expected}, got {actual}");
        }
        Ok(())
    }

    /// Temperatures in history order, handy for eviction assertions.
    pub fn history_temperatures(&self) -> Vec<f64> {
        self.state.history().iter().map(|r| r.temperature).collect()
    }

    pub fn assert_latest_temperature(&self, expected: f64) -> Result<()> {
        match self.state.latest() {
            Some(r) if r.temperature == expected => Ok(()),
            Some(r) => anyhow::bail!("latest temperature: expected {expected}, got {}", r.temperature),
            None => anyhow::bail!("latest temperature: expected {expected}, no reading yet"),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(100)
    }
}
