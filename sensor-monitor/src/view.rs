//! Immutable views rendered from the reconciled state.
//!
//! A [`DashboardView`] is built once per cycle and then only read: by the
//! terminal renderer, by the HTTP handlers and by the CSV download.

use crate::envelope::{Classification, LightCondition, SensorReading};
use crate::reconciler::Diagnostic;
use crate::state::DashboardState;
use serde::Serialize;
use std::fmt::Write as _;
use time::OffsetDateTime;

/// Min / max / mean over one numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl FieldStats {
    fn compute(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| FieldStats { min, max, mean: sum / count as f64 })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub temperature: FieldStats,
    pub humidity: FieldStats,
    pub light_intensity: FieldStats,
}

impl SummaryStats {
    /// `None` for an empty history.
    pub fn from_readings<'a, I>(readings: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a SensorReading>,
        I::IntoIter: Clone,
    {
        let it = readings.into_iter();
        Some(SummaryStats {
            temperature: FieldStats::compute(it.clone().map(|r| r.temperature))?,
            humidity: FieldStats::compute(it.clone().map(|r| r.humidity))?,
            light_intensity: FieldStats::compute(it.map(|r| r.light_intensity as f64))?,
        })
    }
}

/// Counts of each classification and light condition in the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub cold: usize,
    pub normal: usize,
    pub hot: usize,
    pub bright: usize,
    pub dark: usize,
}

impl Distribution {
    pub fn from_readings<'a>(readings: impl IntoIterator<Item = &'a SensorReading>) -> Self {
        let mut dist = Distribution::default();
        for r in readings {
            match r.classification {
                Classification::Cold => dist.cold += 1,
                Classification::Normal => dist.normal += 1,
                Classification::Hot => dist.hot += 1,
            }
            match r.light_condition {
                LightCondition::Bright => dist.bright += 1,
                LightCondition::Dark => dist.dark += 1,
            }
        }
        dist
    }

    pub fn count(&self, class: Classification) -> usize {
        match class {
            Classification::Cold => self.cold,
            Classification::Normal => self.normal,
            Classification::Hot => self.hot,
        }
    }
}

/// Everything the dashboard shows for one cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub cycle: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub connected: bool,
    pub broker: String,
    pub topic: String,
    pub total_readings: usize,
    pub history_capacity: usize,
    pub latest: Option<SensorReading>,
    pub stats: Option<SummaryStats>,
    pub distribution: Distribution,
    /// Newest first
    pub recent: Vec<SensorReading>,
    pub diagnostics: Vec<Diagnostic>,
    /// Oldest first, served separately on `/history`
    #[serde(skip)]
    pub history: Vec<SensorReading>,
}

/// Where the dashboard is connected to, for display only.
#[derive(Debug, Clone, Default)]
pub struct ViewLabels {
    pub broker: String,
    pub topic: String,
    pub recent_rows: usize,
    pub history_capacity: usize,
}

impl DashboardView {
    /// The view shown before the first cycle has run.
    pub fn empty(labels: &ViewLabels) -> Self {
        Self::build(&DashboardState::new(labels.history_capacity), labels, 0, Vec::new(), OffsetDateTime::now_utc())
    }

    pub fn build(
        state: &DashboardState,
        labels: &ViewLabels,
        cycle: u64,
        diagnostics: Vec<Diagnostic>,
        now: OffsetDateTime,
    ) -> Self {
        let history = state.history();
        DashboardView {
            cycle,
            generated_at: now,
            connected: state.is_connected(),
            broker: labels.broker.clone(),
            topic: labels.topic.clone(),
            total_readings: history.len(),
            history_capacity: history.capacity(),
            latest: state.latest().cloned(),
            stats: SummaryStats::from_readings(history.iter()),
            distribution: Distribution::from_readings(history.iter()),
            recent: history.recent(labels.recent_rows),
            diagnostics,
            history: history.to_vec(),
        }
    }

    /// Plain-text dashboard for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let status = if self.connected { "CONNECTED" } else { "DISCONNECTED" };
        let _ = writeln!(out, "=== IoT ML Monitor | cycle {} | MQTT {} ===", self.cycle, status);
        let _ = writeln!(out, "broker: {}  topic: {}", self.broker, self.topic);

        match &self.latest {
            Some(r) => {
                let _ = writeln!(
                    out,
                    "temperature {:.1} C | humidity {:.1} % | light {} ({}) | ML status {}",
                    r.temperature,
                    r.humidity,
                    r.light_intensity,
                    r.light_condition.as_str().to_uppercase(),
                    r.classification.as_str().to_uppercase(),
                );
            }
            None => {
                let _ = writeln!(out, "waiting for data from the sensor node...");
            }
        }

        let _ = writeln!(out, "readings: {}/{}", self.total_readings, self.history_capacity);
        if let Some(stats) = &self.stats {
            for (name, s) in [
                ("temperature", stats.temperature),
                ("humidity", stats.humidity),
                ("light", stats.light_intensity),
            ] {
                let _ = writeln!(out, "  {:<12} min {:>8.1}  max {:>8.1}  mean {:>8.1}", name, s.min, s.max, s.mean);
            }
            let d = &self.distribution;
            let _ = writeln!(out, "  classes      cold {}  normal {}  hot {}", d.cold, d.normal, d.hot);
        }

        for d in &self.diagnostics {
            let _ = writeln!(out, "! {}", d.message);
        }
        out
    }
}
