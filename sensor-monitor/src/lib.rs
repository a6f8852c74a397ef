//! Sensor monitor: MQTT ingestion, single-writer dashboard state and a
//! periodic presentation cycle for an IoT temperature/humidity/light node.
//!
//! The network worker only ever enqueues [`envelope::Envelope`]s; the
//! [`cycle::PresentationCycle`] is the only code that drains them and
//! mutates [`state::DashboardState`].

pub mod config;
pub mod context;
pub mod cycle;
pub mod envelope;
pub mod error;
pub mod export;
pub mod health;
pub mod http;
pub mod queue;
pub mod reconciler;
pub mod state;
pub mod view;
pub mod worker;

pub use config::{load_config, MonitorConfig};
pub use context::{MonitorContext, SharedContext};
pub use cycle::{ControlCommand, CycleHandles, CyclePhase, PresentationCycle};
pub use envelope::{decode_payload, Classification, Envelope, LightCondition, SensorReading};
pub use error::MonitorError;
pub use queue::{ingest_queue, EnvelopeDrain, EnvelopeSender};
pub use reconciler::{reconcile, ReconcileReport};
pub use state::{DashboardState, HistoryBuffer};
pub use view::DashboardView;
pub use worker::NetworkWorker;
