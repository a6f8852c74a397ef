use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process health as served on `/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorHealth {
    pub uptime_seconds: u64,
    pub mqtt_connected: bool,
    pub mqtt_reconnects: u32,
    pub messages_received: u64,
    pub decode_failures: u64,
    pub readings_buffered: usize,
    pub render_cycles: u64,
    pub memory_usage_mb: f32,
}

/// Counters bumped by the network worker and read by the HTTP layer.
/// None of this is dashboard state: the connection flag shown to users comes
/// from the reconciled view.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    mqtt_reconnects: Arc<AtomicU32>,
    messages_received: Arc<AtomicU64>,
    decode_failures: Arc<AtomicU64>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            messages_received: Arc::new(AtomicU64::new(0)),
            decode_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self, decoded: bool) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        if !decoded {
            self.decode_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn reconnects(&self) -> u32 {
        self.mqtt_reconnects.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn get_health(&self, mqtt_connected: bool, readings_buffered: usize, render_cycles: u64) -> MonitorHealth {
        MonitorHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            mqtt_connected,
            mqtt_reconnects: self.reconnects(),
            messages_received: self.messages_received(),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            readings_buffered,
            render_cycles,
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest.split_whitespace().next().and_then(|s| s.parse::<u64>().ok()) {
                        return kb as f32 / 1024.0;
                    }
                }
            }
        }
    }

    // rough fallback
    12.0
}
