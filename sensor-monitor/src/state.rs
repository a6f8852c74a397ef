//! Presentation-owned dashboard state.
//!
//! Only the presentation cycle holds a `DashboardState`; nothing here is
//! shared across threads.

use crate::envelope::SensorReading;
use std::collections::vec_deque::{self, VecDeque};

/// Capacity-bounded, FIFO-evicting store of past readings in arrival order.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    readings: VecDeque<SensorReading>,
    capacity: usize,
}

impl HistoryBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a reading and returns how many old readings were evicted.
    pub fn push(&mut self, reading: SensorReading) -> usize {
        self.readings.push_back(reading);
        let mut evicted = 0;
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> vec_deque::Iter<'_, SensorReading> {
        self.readings.iter()
    }

    /// The last `n` readings, newest first.
    pub fn recent(&self, n: usize) -> Vec<SensorReading> {
        self.readings.iter().rev().take(n).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<SensorReading> {
        self.readings.iter().cloned().collect()
    }
}

/// Latest snapshot, history and connection flag as seen by the dashboard.
#[derive(Debug, Clone)]
pub struct DashboardState {
    history: HistoryBuffer,
    latest: Option<SensorReading>,
    connected: bool,
}

impl DashboardState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: HistoryBuffer::new(history_capacity),
            latest: None,
            connected: false,
        }
    }

    /// Overwrites the latest snapshot and appends to the history.
    /// Returns the number of evicted readings.
    pub fn record_reading(&mut self, reading: SensorReading) -> usize {
        self.latest = Some(reading.clone());
        self.history.push(reading)
    }

    /// Returns true when the flag actually flipped.
    pub fn set_connected(&mut self, connected: bool) -> bool {
        let changed = self.connected != connected;
        self.connected = connected;
        changed
    }

    /// Empties the history; the latest snapshot survives.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// `None` until the first reading arrives.
    pub fn latest(&self) -> Option<&SensorReading> {
        self.latest.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Classification, LightCondition};
    use time::macros::datetime;

    fn reading(temperature: f64) -> SensorReading {
        SensorReading {
            temperature,
            humidity: 50.0,
            light_intensity: 400,
            light_condition: LightCondition::Bright,
            classification: Classification::Normal,
            received_at: datetime!(2026-03-01 10:00:00 UTC),
        }
    }

    #[test]
    fn test_history_keeps_most_recent_within_capacity() {
        for capacity in [1usize, 3, 100] {
            let mut history = HistoryBuffer::new(capacity);
            let total = capacity * 2 + 1;
            let mut evicted = 0;
            for i in 0..total {
                evicted += history.push(reading(i as f64));
            }
            assert_eq!(history.len(), capacity);
            assert_eq!(evicted, total - capacity);
            let temps: Vec<f64> = history.iter().map(|r| r.temperature).collect();
            let expected: Vec<f64> = ((total - capacity)..total).map(|i| i as f64).collect();
            assert_eq!(temps, expected);
        }
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut history = HistoryBuffer::new(0);
        history.push(reading(1.0));
        history.push(reading(2.0));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.recent(5)[0].temperature, 2.0);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut history = HistoryBuffer::new(10);
        for i in 0..5 {
            history.push(reading(i as f64));
        }
        let temps: Vec<f64> = history.recent(3).iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![4.0, 3.0, 2.0]);
    }

    #[test]
    fn test_clear_history_keeps_latest() {
        let mut state = DashboardState::new(5);
        state.record_reading(reading(21.0));
        state.clear_history();
        assert!(state.history().is_empty());
        assert_eq!(state.latest().map(|r| r.temperature), Some(21.0));
    }

    #[test]
    fn test_set_connected_reports_flips() {
        let mut state = DashboardState::new(5);
        assert!(!state.set_connected(false));
        assert!(state.set_connected(true));
        assert!(!state.set_connected(true));
        assert!(state.is_connected());
    }
}
