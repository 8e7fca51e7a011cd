//! Obstacle monitor - background detector polling
//!
//! Runs as its own task next to the guidance loop. Each cadence tick it polls
//! the detector; a reported hazard raises the shared `ObstacleSignal` and, if
//! the signal was not already raised, forwards the alert text to the alert
//! channel. The monitor never clears the signal.
//!
//! Shutdown is cooperative: `stop()` flips the shutdown watch and waits at
//! most the grace period for the task to exit, then abandons it. A
//! `MonitorScope` taken after `start()` releases the worker when dropped, so
//! a caller whose future is dropped mid-session cannot leak the poll loop.
//!
//! The alert channel also carries spoken status notices: vision start and
//! stop, and any notice the detector reports when it degrades. Notices never
//! touch the signal.

use crate::infra::config::Timing;
use crate::infra::metrics::Metrics;
use crate::io::detector::Detector;
use crate::services::signal::ObstacleSignal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Spoken when the poll loop starts
pub const VISION_STARTED: &str = "Starting vision safety. Camera on.";

/// Spoken once the poll loop is stopped
pub const VISION_STOPPED: &str = "Vision safety stopped.";

/// How `stop()` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The monitor was not running
    NotRunning,
    /// The worker exited within the grace period
    Joined,
    /// The worker did not exit in time and was aborted
    TimedOut,
}

struct Worker {
    shutdown_tx: Arc<watch::Sender<bool>>,
    handle: JoinHandle<()>,
}

/// Releases the running worker when dropped
///
/// Holds no borrow of the monitor. Dropping it after a graceful `stop()` is
/// a no-op on a finished task.
#[must_use = "dropping the scope releases the monitor immediately"]
pub struct MonitorScope {
    shutdown_tx: Arc<watch::Sender<bool>>,
    abort: AbortHandle,
}

impl Drop for MonitorScope {
    fn drop(&mut self) {
        if !self.abort.is_finished() {
            debug!("monitor_scope_released");
        }
        let _ = self.shutdown_tx.send(true);
        self.abort.abort();
    }
}

pub struct ObstacleMonitor {
    detector: Arc<dyn Detector>,
    signal: ObstacleSignal,
    poll_interval: Duration,
    stop_grace: Duration,
    alert_tx: Option<mpsc::Sender<String>>,
    metrics: Arc<Metrics>,
    worker: Option<Worker>,
}

impl ObstacleMonitor {
    pub fn new(
        detector: Arc<dyn Detector>,
        signal: ObstacleSignal,
        timing: &Timing,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            detector,
            signal,
            poll_interval: timing.poll_interval,
            stop_grace: timing.stop_grace,
            alert_tx: None,
            metrics,
            worker: None,
        }
    }

    /// Set the sink for alert text
    pub fn with_alert_tx(mut self, tx: mpsc::Sender<String>) -> Self {
        self.alert_tx = Some(tx);
        self
    }

    pub fn signal(&self) -> &ObstacleSignal {
        &self.signal
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Spawn the polling task; no-op while already running
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("obstacle_monitor_already_running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = Poller {
            detector: self.detector.clone(),
            signal: self.signal.clone(),
            poll_interval: self.poll_interval,
            alert_tx: self.alert_tx.clone(),
            metrics: self.metrics.clone(),
        };
        self.notify(VISION_STARTED);
        let handle = tokio::spawn(poller.run(shutdown_rx));
        self.worker = Some(Worker { shutdown_tx: Arc::new(shutdown_tx), handle });
    }

    /// Guard over the current worker, if one is running
    pub fn scope(&self) -> Option<MonitorScope> {
        self.worker.as_ref().filter(|worker| !worker.handle.is_finished()).map(|worker| MonitorScope {
            shutdown_tx: worker.shutdown_tx.clone(),
            abort: worker.handle.abort_handle(),
        })
    }

    /// Request shutdown and wait at most the grace period
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(mut worker) = self.worker.take() else {
            return StopOutcome::NotRunning;
        };

        let _ = worker.shutdown_tx.send(true);
        let outcome = match tokio::time::timeout(self.stop_grace, &mut worker.handle).await {
            Ok(_) => {
                info!("obstacle_monitor_stopped");
                StopOutcome::Joined
            }
            Err(_) => {
                worker.handle.abort();
                self.metrics.record_monitor_stop_timeout();
                warn!(grace_ms = %self.stop_grace.as_millis(), "monitor_stop_timed_out");
                StopOutcome::TimedOut
            }
        };
        self.notify(VISION_STOPPED);
        outcome
    }

    fn notify(&self, notice: &str) {
        if let Some(ref tx) = self.alert_tx {
            if let Err(e) = tx.try_send(notice.to_string()) {
                warn!(error = %e, "failed to forward vision notice");
            }
        }
    }
}

impl Drop for ObstacleMonitor {
    fn drop(&mut self) {
        // Dropped without stop(): signal and abandon the worker
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(true);
            worker.handle.abort();
        }
    }
}

/// State moved into the polling task
struct Poller {
    detector: Arc<dyn Detector>,
    signal: ObstacleSignal,
    poll_interval: Duration,
    alert_tx: Option<mpsc::Sender<String>>,
    metrics: Arc<Metrics>,
}

impl Poller {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            detector = %self.detector.name(),
            poll_interval_ms = %self.poll_interval.as_millis(),
            "obstacle_monitor_started"
        );

        let mut cadence = interval(self.poll_interval);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("obstacle_monitor_shutdown");
                    return;
                }
                _ = cadence.tick() => {}
            }

            let poll_start = Instant::now();
            let alert = tokio::select! {
                _ = shutdown.changed() => {
                    info!("obstacle_monitor_shutdown");
                    return;
                }
                alert = self.detector.poll() => alert,
            };
            self.metrics.record_poll(poll_start.elapsed().as_micros() as u64);

            if let Some(notice) = self.detector.take_notice() {
                info!(notice = %notice, "detector_notice");
                self.forward(notice);
            }

            let Some(alert) = alert.filter(|text| !text.trim().is_empty()) else {
                continue;
            };
            self.handle_alert(alert);
        }
    }

    fn handle_alert(&self, alert: String) {
        let raised = self.signal.raise();
        self.metrics.record_alert(raised);

        if !raised {
            tracing::trace!(alert = %alert, "obstacle_already_signalled");
            return;
        }

        info!(alert = %alert, "obstacle_detected");
        self.forward(alert);
    }

    fn forward(&self, text: String) {
        if let Some(ref tx) = self.alert_tx {
            if let Err(e) = tx.try_send(text) {
                warn!(error = %e, "failed to forward obstacle alert");
            }
        }
    }
}
