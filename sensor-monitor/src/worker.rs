/**
 * NETWORK WORKER - owns the MQTT subscription
 *
 * ROLE :
 * Polls the rumqttc event loop, turns every network event into an Envelope
 * and hands it to the ingestion queue. It never reads or writes dashboard
 * state; the presentation cycle picks everything up from the queue.
 *
 * HOW IT WORKS :
 * - CONNACK (success)  -> subscribe to the configured filter, enqueue connected
 * - PUBLISH on filter  -> decode payload, enqueue reading or decode error
 * - DISCONNECT / error -> enqueue disconnected, wait, let the event loop reconnect
 * - reconnect delay is fixed; retries are unbounded unless max_retries is set
 */

use crate::config::MqttConf;
use crate::envelope::{decode_payload, Envelope};
use crate::error::MonitorError;
use crate::health::HealthTracker;
use crate::queue::EnvelopeSender;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    TlsConfiguration, Transport,
};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

/// Request channel capacity between `AsyncClient` and its event loop.
const CLIENT_CAPACITY: usize = 10;

/// Fixed-delay reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub max_retries: Option<u32>,
}

impl ReconnectPolicy {
    pub fn from_config(cfg: &MqttConf) -> Self {
        Self {
            delay: cfg.reconnect_delay(),
            max_retries: cfg.max_retries,
        }
    }

    /// Delay before the next attempt, or `None` once the retry budget is spent.
    pub fn delay_for(&self, consecutive_failures: u32) -> Option<Duration> {
        match self.max_retries {
            Some(max) if consecutive_failures > max => None,
            _ => Some(self.delay),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_retries: None,
        }
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    // Leading wildcards never match `$SYS`-style topics.
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Builds the rumqttc options from the broker section of the config.
pub fn build_mqtt_options(cfg: &MqttConf) -> Result<MqttOptions, MonitorError> {
    let client_id = if cfg.unique_client_id {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", cfg.client_id, &suffix[..8])
    } else {
        cfg.client_id.clone()
    };

    let mut opts = MqttOptions::new(client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(cfg.keep_alive());
    opts.set_clean_session(true);

    if let Some(user) = &cfg.username {
        opts.set_credentials(user, cfg.password.clone().unwrap_or_default());
    }

    if cfg.tls {
        let transport = match &cfg.ca_file {
            Some(path) => Transport::Tls(TlsConfiguration::Simple {
                ca: std::fs::read(path)?,
                alpn: None,
                client_auth: None,
            }),
            None => Transport::tls_with_default_config(),
        };
        opts.set_transport(transport);
    }

    Ok(opts)
}

/// Translates MQTT events into envelopes for the ingestion queue.
pub struct NetworkWorker {
    sender: EnvelopeSender,
    topic: String,
    health: HealthTracker,
    connected: bool,
}

impl NetworkWorker {
    pub fn new(sender: EnvelopeSender, topic: impl Into<String>, health: HealthTracker) -> Self {
        Self {
            sender,
            topic: topic.into(),
            health,
            connected: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Handles one incoming packet. Returns true when the broker accepted a new
    /// session and the subscription has to be (re)issued.
    pub fn handle_incoming(&mut self, packet: &Packet) -> bool {
        match packet {
            Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
                info!(topic = %self.topic, "connected to MQTT broker");
                self.set_connected(true);
                true
            }
            Packet::ConnAck(ack) => {
                warn!(code = ?ack.code, "broker refused connection");
                self.set_connected(false);
                false
            }
            Packet::Publish(publish) => {
                if topic_matches(&self.topic, &publish.topic) {
                    self.on_message(&publish.payload);
                } else {
                    debug!(topic = %publish.topic, "ignoring publish outside subscription");
                }
                false
            }
            Packet::Disconnect => {
                warn!("broker sent DISCONNECT");
                self.set_connected(false);
                false
            }
            _ => false,
        }
    }

    /// Records a transport failure. The caller decides how long to wait.
    pub fn handle_transport_error(&mut self, err: &ConnectionError) {
        error!("MQTT connection error: {err}");
        self.health.increment_reconnects();
        self.set_connected(false);
    }

    fn on_message(&mut self, payload: &[u8]) {
        let envelope = decode_payload(payload, OffsetDateTime::now_utc());
        let decoded = matches!(envelope, Envelope::SensorReading(_));
        self.health.record_message(decoded);
        debug!(kind = envelope.kind(), bytes = payload.len(), "enqueue");
        self.sender.enqueue(envelope);
    }

    fn set_connected(&mut self, connected: bool) {
        // Only transitions are enqueued; repeated errors while offline stay quiet.
        if self.connected != connected {
            self.connected = connected;
            self.sender.enqueue(Envelope::connection(connected, OffsetDateTime::now_utc()));
        }
    }

    /// Drives the event loop until the retry budget runs out.
    pub async fn run(
        mut self,
        client: AsyncClient,
        mut eventloop: EventLoop,
        policy: ReconnectPolicy,
    ) -> Result<(), MonitorError> {
        let mut failures: u32 = 0;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(packet)) => {
                    if self.handle_incoming(&packet) {
                        failures = 0;
                        if let Err(e) = client.subscribe(self.topic.as_str(), QoS::AtLeastOnce).await {
                            error!("subscribe to {} failed: {e}", self.topic);
                        } else {
                            info!("subscribed to {}", self.topic);
                        }
                    }
                }
                Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    self.handle_transport_error(&e);
                    failures += 1;
                    match policy.delay_for(failures) {
                        Some(delay) => {
                            warn!(attempt = failures, "reconnecting in {}s", delay.as_secs());
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(failures, "reconnect budget exhausted, network worker stopping");
                            return Err(MonitorError::RetriesExhausted(failures));
                        }
                    }
                }
            }
        }
    }
}

/// Connects and runs a worker on the current tokio runtime.
pub fn spawn_network_worker(
    cfg: &MqttConf,
    sender: EnvelopeSender,
    health: HealthTracker,
) -> Result<tokio::task::JoinHandle<Result<(), MonitorError>>, MonitorError> {
    let opts = build_mqtt_options(cfg)?;
    info!(
        client_id = opts.client_id(),
        host = %cfg.host,
        port = cfg.port,
        tls = cfg.tls,
        "starting network worker"
    );
    let (client, eventloop) = AsyncClient::new(opts, CLIENT_CAPACITY);
    let worker = NetworkWorker::new(sender, cfg.topic.clone(), health);
    let policy = ReconnectPolicy::from_config(cfg);
    Ok(tokio::spawn(worker.run(client, eventloop, policy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Classification;
    use crate::queue::ingest_queue;
    use rumqttc::{ConnAck, Publish};

    const TOPIC: &str = "iot/ml/monitor/data";

    fn connack(code: ConnectReturnCode) -> Packet {
        Packet::ConnAck(ConnAck::new(code, false))
    }

    fn publish(topic: &str, payload: &[u8]) -> Packet {
        Packet::Publish(Publish::new(topic, QoS::AtLeastOnce, payload.to_vec()))
    }

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("iot/ml/monitor/data", "iot/ml/monitor/data"));
        assert!(!topic_matches("iot/ml/monitor/data", "iot/ml/monitor"));
        assert!(!topic_matches("iot/ml/monitor", "iot/ml/monitor/data"));
        assert!(topic_matches("iot/+/monitor/data", "iot/ml/monitor/data"));
        assert!(topic_matches("iot/#", "iot/ml/monitor/data"));
        assert!(topic_matches("iot/#", "iot"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("#", "$SYS/broker/uptime"));
        assert!(!topic_matches("+/broker/uptime", "$SYS/broker/uptime"));
        assert!(!topic_matches("iot/+", "iot/a/b"));
    }

    #[test]
    fn test_reconnect_policy() {
        let unbounded = ReconnectPolicy::default();
        assert_eq!(unbounded.delay_for(1), Some(Duration::from_secs(5)));
        assert_eq!(unbounded.delay_for(10_000), Some(Duration::from_secs(5)));

        let bounded = ReconnectPolicy { delay: Duration::from_secs(1), max_retries: Some(3) };
        assert_eq!(bounded.delay_for(3), Some(Duration::from_secs(1)));
        assert_eq!(bounded.delay_for(4), None);
    }

    #[test]
    fn test_connack_publish_disconnect_sequence() {
        let (tx, mut rx) = ingest_queue();
        let health = HealthTracker::new();
        let mut worker = NetworkWorker::new(tx, TOPIC, health.clone());

        assert!(worker.handle_incoming(&connack(ConnectReturnCode::Success)));
        assert!(!worker.handle_incoming(&publish(TOPIC, br#"{"temperature":35.2,"mlClassification":"panas"}"#)));
        assert!(!worker.handle_incoming(&publish(TOPIC, b"garbage")));
        assert!(!worker.handle_incoming(&publish("other/topic", br#"{"temperature":1}"#)));
        assert!(!worker.handle_incoming(&Packet::Disconnect));

        let drained = rx.drain_all();
        assert_eq!(drained.len(), 4);
        assert!(matches!(drained[0], Envelope::ConnectionStatus { connected: true, .. }));
        match &drained[1] {
            Envelope::SensorReading(r) => {
                assert_eq!(r.temperature, 35.2);
                assert_eq!(r.classification, Classification::Hot);
            }
            other => panic!("expected reading, got {:?}", other),
        }
        assert!(matches!(drained[2], Envelope::DecodeError { .. }));
        assert!(matches!(drained[3], Envelope::ConnectionStatus { connected: false, .. }));

        assert_eq!(health.messages_received(), 2);
    }

    #[test]
    fn test_refused_connack_does_not_subscribe() {
        let (tx, mut rx) = ingest_queue();
        let mut worker = NetworkWorker::new(tx, TOPIC, HealthTracker::new());

        assert!(!worker.handle_incoming(&connack(ConnectReturnCode::NotAuthorized)));
        // Already disconnected: nothing to report.
        assert!(rx.drain_all().is_empty());
    }

    #[test]
    fn test_repeated_errors_enqueue_one_status() {
        let (tx, mut rx) = ingest_queue();
        let health = HealthTracker::new();
        let mut worker = NetworkWorker::new(tx, TOPIC, health.clone());
        worker.handle_incoming(&connack(ConnectReturnCode::Success));

        for _ in 0..3 {
            worker.handle_transport_error(&ConnectionError::RequestsDone);
        }

        let drained = rx.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[1], Envelope::ConnectionStatus { connected: false, .. }));
        assert_eq!(health.reconnects(), 3);
    }

    #[test]
    fn test_mqtt_options_from_config() {
        let mut cfg = MqttConf::default();
        cfg.unique_client_id = false;
        cfg.username = Some("dashboard".into());
        cfg.password = Some("secret".into());
        let opts = build_mqtt_options(&cfg).unwrap();
        assert_eq!(opts.client_id(), "sensor-monitor");
        assert_eq!(opts.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(opts.credentials(), Some(("dashboard".to_string(), "secret".to_string())));

        cfg.unique_client_id = true;
        let a = build_mqtt_options(&cfg).unwrap().client_id();
        let b = build_mqtt_options(&cfg).unwrap().client_id();
        assert!(a.starts_with("sensor-monitor-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_worker_gives_up_after_retry_budget() {
        let mut cfg = MqttConf::default();
        // Nothing listens on port 1: every attempt fails immediately.
        cfg.host = "127.0.0.1".into();
        cfg.port = 1;
        cfg.reconnect_delay_secs = 1;
        cfg.max_retries = Some(2);

        let (tx, mut rx) = ingest_queue();
        let health = HealthTracker::new();
        let started = std::time::Instant::now();
        let handle = spawn_network_worker(&cfg, tx, health.clone()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(20), handle)
            .await
            .expect("worker should stop on its own")
            .unwrap();
        assert!(matches!(outcome, Err(MonitorError::RetriesExhausted(3))));
        // Two fixed delays between the three attempts.
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(health.reconnects(), 3);
        // Never connected, so no status transition was reported.
        assert!(rx.drain_all().is_empty());
    }
}
