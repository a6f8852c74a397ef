/**
 * PRESENTATION CYCLE - the single writer of dashboard state
 *
 * ROLE :
 * Periodic loop Idle -> Reconciling -> Rendering -> Sleeping -> Idle.
 * Owns the DashboardState and the drain side of the ingestion queue; nobody
 * else mutates the history, the latest snapshot or the connection flag.
 *
 * HOW IT WORKS :
 * - Reconciling : drain the queue, then apply pending ControlCommands
 * - Rendering   : build a DashboardView, print it, publish it on a watch channel
 * - end of cycle: optional late drain, shown on the next render
 * - Sleeping    : wait for the next tick of the refresh interval
 */

use crate::config::MonitorConfig;
use crate::envelope::SensorReading;
use crate::export::export_to_dir;
use crate::queue::EnvelopeDrain;
use crate::reconciler::{reconcile, Diagnostic, ReconcileReport};
use crate::state::DashboardState;
use crate::view::{DashboardView, ViewLabels};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Pending commands buffered between HTTP handlers and the cycle.
const COMMAND_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Reconciling,
    Rendering,
    Sleeping,
}

/// State changes requested from outside the cycle, applied while reconciling.
#[derive(Debug)]
pub enum ControlCommand {
    /// Empties the history; the latest snapshot is kept.
    ClearHistory,
    /// Writes the history to the export directory and replies with the file path.
    ExportCsv {
        reply: oneshot::Sender<Result<PathBuf, String>>,
    },
}

/// Read side of the cycle, handed to the HTTP layer.
#[derive(Clone)]
pub struct CycleHandles {
    pub views: watch::Receiver<Arc<DashboardView>>,
    pub commands: mpsc::Sender<ControlCommand>,
}

pub struct PresentationCycle {
    state: DashboardState,
    drain: EnvelopeDrain,
    phase: CyclePhase,
    cycle: u64,
    interval: Duration,
    late_drain: bool,
    terminal: bool,
    export_dir: PathBuf,
    labels: ViewLabels,
    commands: mpsc::Receiver<ControlCommand>,
    views: watch::Sender<Arc<DashboardView>>,
    carried: Vec<Diagnostic>,
}

impl PresentationCycle {
    pub fn new(config: &MonitorConfig, drain: EnvelopeDrain) -> (Self, CycleHandles) {
        let labels = ViewLabels {
            broker: format!("{}:{}", config.mqtt.host, config.mqtt.port),
            topic: config.mqtt.topic.clone(),
            recent_rows: config.dashboard.recent_rows,
            history_capacity: config.dashboard.history_capacity,
        };
        let (views_tx, views_rx) = watch::channel(Arc::new(DashboardView::empty(&labels)));
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);

        let cycle = PresentationCycle {
            state: DashboardState::new(config.dashboard.history_capacity),
            drain,
            phase: CyclePhase::Idle,
            cycle: 0,
            interval: config.dashboard.refresh_interval(),
            late_drain: config.dashboard.late_drain,
            terminal: config.dashboard.terminal,
            export_dir: config.dashboard.export_dir.clone(),
            labels,
            commands: commands_rx,
            views: views_tx,
            carried: Vec::new(),
        };
        let handles = CycleHandles { views: views_rx, commands: commands_tx };
        (cycle, handles)
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    fn transition(&mut self, next: CyclePhase) {
        debug!(from = ?self.phase, to = ?next, cycle = self.cycle, "phase");
        self.phase = next;
    }

    /// Runs one full cycle without waiting. Ends in `Sleeping`.
    pub fn run_once(&mut self) -> ReconcileReport {
        if self.phase == CyclePhase::Sleeping {
            self.transition(CyclePhase::Idle);
        }
        self.cycle += 1;

        self.transition(CyclePhase::Reconciling);
        let mut report = reconcile(&mut self.state, &mut self.drain);
        self.apply_commands();

        self.transition(CyclePhase::Rendering);
        let mut diagnostics = std::mem::take(&mut self.carried);
        diagnostics.extend(report.diagnostics.iter().cloned());
        let view = Arc::new(DashboardView::build(
            &self.state,
            &self.labels,
            self.cycle,
            diagnostics,
            OffsetDateTime::now_utc(),
        ));
        if self.terminal {
            println!("{}", view.render_text());
        }
        self.views.send_replace(view);

        if self.late_drain {
            let late = reconcile(&mut self.state, &mut self.drain);
            self.carried = late.diagnostics.clone();
            report.merge(late);
        }

        self.transition(CyclePhase::Sleeping);
        report
    }

    /// Loops for the lifetime of the process.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            capacity = self.state.history().capacity(),
            late_drain = self.late_drain,
            "presentation cycle started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_once();
        }
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                ControlCommand::ClearHistory => {
                    info!(cleared = self.state.history().len(), "history cleared");
                    self.state.clear_history();
                }
                ControlCommand::ExportCsv { reply } => {
                    // Snapshot now; the file is written off the cycle task.
                    let rows = self.state.history().to_vec();
                    let dir = self.export_dir.clone();
                    let job = move || {
                        let result = write_export(&dir, &rows);
                        // The requester may have given up; nothing to do then.
                        let _ = reply.send(result);
                    };
                    match tokio::runtime::Handle::try_current() {
                        Ok(runtime) => {
                            runtime.spawn_blocking(job);
                        }
                        Err(_) => job(),
                    }
                }
            }
        }
    }
}

fn write_export(dir: &Path, rows: &[SensorReading]) -> Result<PathBuf, String> {
    match export_to_dir(dir, rows, OffsetDateTime::now_utc()) {
        Ok(path) => {
            info!(path = %path.display(), rows = rows.len(), "history exported");
            Ok(path)
        }
        Err(e) => {
            error!("CSV export failed: {e}");
            Err(e.to_string())
        }
    }
}
