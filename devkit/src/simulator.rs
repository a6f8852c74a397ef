/*!
Deterministic stand-in for the sensor node.

Readings follow a sine wave so that a run of `period` steps crosses every
classification band and both light conditions. Same inputs, same outputs:
no randomness, no clock.
*/

use crate::payloads::{SensorPayloadBuilder, Vocabulary};
use serde_json::Value;
use std::f64::consts::TAU;

pub const COLD_BELOW: f64 = 20.0;
pub const HOT_ABOVE: f64 = 30.0;
pub const DARK_BELOW: i64 = 300;

/// Label the node's model would give a temperature.
pub fn classify(temperature: f64) -> &'static str {
    if temperature < COLD_BELOW {
        "cold"
    } else if temperature > HOT_ABOVE {
        "hot"
    } else {
        "normal"
    }
}

pub fn is_dark(light: i64) -> bool {
    light < DARK_BELOW
}

#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    step: u64,
    period: u64,
    vocab: Vocabulary,
}

impl SimulatedSensor {
    /// `period` is the number of steps in one full waveform, at least 1.
    pub fn new(period: u64, vocab: Vocabulary) -> Self {
        Self { step: 0, period: period.max(1), vocab }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Temperature, humidity and light for a given step.
    pub fn sample(&self, step: u64) -> (f64, f64, i64) {
        let phase = TAU * (step % self.period) as f64 / self.period as f64;
        let temperature = round1(25.0 + 9.0 * phase.sin());
        let humidity = round1(60.0 - 15.0 * phase.sin());
        let light = (520.0 + 480.0 * phase.cos()).round() as i64;
        (temperature, humidity, light.clamp(0, 1023))
    }

    /// Builds the payload for the current step and advances.
    pub fn next_payload(&mut self) -> Value {
        let (temperature, humidity, light) = self.sample(self.step);
        self.step += 1;
        SensorPayloadBuilder::reading(
            temperature,
            humidity,
            light,
            is_dark(light),
            classify(temperature),
            self.vocab,
        )
    }
}

impl Iterator for SimulatedSensor {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        Some(self.next_payload())
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        assert_eq!(classify(19.9), "cold");
        assert_eq!(classify(20.0), "normal");
        assert_eq!(classify(30.0), "normal");
        assert_eq!(classify(30.1), "hot");
        assert!(is_dark(299));
        assert!(!is_dark(300));
    }

    #[test]
    fn test_waveform_is_deterministic_and_covers_all_bands() {
        let a: Vec<Value> = SimulatedSensor::new(24, Vocabulary::English).take(24).collect();
        let b: Vec<Value> = SimulatedSensor::new(24, Vocabulary::English).take(24).collect();
        assert_eq!(a, b);

        for class in ["cold", "normal", "hot"] {
            assert!(a.iter().any(|p| p["mlClassification"] == class), "missing {class}");
        }
        assert!(a.iter().any(|p| p["lightCondition"] == "Dark"));
        assert!(a.iter().any(|p| p["lightCondition"] == "Bright"));
    }

    #[test]
    fn test_step_advances() {
        let mut sensor = SimulatedSensor::new(10, Vocabulary::Indonesian);
        sensor.next_payload();
        sensor.next_payload();
        assert_eq!(sensor.step(), 2);
        assert_eq!(sensor.sample(0), sensor.sample(10));
    }
}
