/*!
# Sensor DevKit - tools for developing against the sensor monitor

- Payload builders for the node's JSON wire format (Indonesian and English labels)
- A deterministic simulated sensor
- A test harness driving the monitor core without a broker
*/

pub mod payloads;
pub mod simulator;
pub mod test_utils;

pub use payloads::{SensorPayloadBuilder, Vocabulary};
pub use simulator::SimulatedSensor;
pub use test_utils::TestHarness;
