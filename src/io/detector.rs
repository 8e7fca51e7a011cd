//! Obstacle detectors polled by the obstacle monitor
//!
//! Detection itself happens outside this process. `CommandDetector` reads
//! object labels from an external detector program (one label per line on
//! stdout); `HeuristicDetector` is the stub used in demo mode or whenever the
//! detector program is unavailable. A detector that had to fall back keeps
//! a one-shot notice for the monitor to speak.

use crate::infra::config::Config;
use crate::io::voice::ExternalCommand;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Object labels that count as hazards
const HAZARD_LABELS: [&str; 6] = ["person", "bicycle", "car", "motorbike", "bus", "truck"];

/// Alert emitted by the heuristic stub
pub const HEURISTIC_ALERT: &str = "Obstacle ahead. Please wait.";

/// Spoken when the detector program cannot be used
pub const CAMERA_UNAVAILABLE: &str = "Warning. Could not access camera.";

/// Labels buffered between polls before older ones are dropped
const LABEL_BUFFER: usize = 64;

#[async_trait]
pub trait Detector: Send + Sync {
    /// Return alert text when a hazard is present; must not block past one cadence
    async fn poll(&self) -> Option<String>;

    fn name(&self) -> &'static str;

    /// Status text to speak once, outside the hazard path
    fn take_notice(&self) -> Option<String> {
        None
    }
}

/// Periodic alert stub
pub struct HeuristicDetector {
    interval: Duration,
    message: String,
    last_alert: Mutex<Instant>,
    notice: Mutex<Option<String>>,
}

impl HeuristicDetector {
    /// First alert fires one full interval after construction
    pub fn new(interval: Duration) -> Self {
        Self::with_message(interval, HEURISTIC_ALERT)
    }

    pub fn with_message(interval: Duration, message: impl Into<String>) -> Self {
        Self {
            interval,
            message: message.into(),
            last_alert: Mutex::new(Instant::now()),
            notice: Mutex::new(None),
        }
    }

    /// Queue a notice for the first poll
    pub fn with_notice(self, notice: impl Into<String>) -> Self {
        *self.notice.lock() = Some(notice.into());
        self
    }

    fn check(&self) -> Option<String> {
        let mut last_alert = self.last_alert.lock();
        if last_alert.elapsed() >= self.interval {
            *last_alert = Instant::now();
            Some(self.message.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl Detector for HeuristicDetector {
    async fn poll(&self) -> Option<String> {
        self.check()
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn take_notice(&self) -> Option<String> {
        self.notice.lock().take()
    }
}

/// Map a detector label to alert text if it names a hazard
pub fn hazard_alert(label: &str) -> Option<String> {
    let label = label.trim().to_lowercase();
    HAZARD_LABELS.contains(&label.as_str()).then(|| format!("{} ahead", label))
}

/// Detector backed by an external object-recognition program
///
/// A reader task forwards stdout lines into a bounded channel; `poll` drains
/// whatever arrived since the last call without waiting. If the program exits
/// the detector degrades to its heuristic fallback for good.
pub struct CommandDetector {
    labels: Mutex<mpsc::Receiver<String>>,
    fallback: HeuristicDetector,
    degraded: AtomicBool,
    notice: Mutex<Option<String>>,
    _child: Mutex<Child>,
}

impl CommandDetector {
    pub fn spawn(command: &ExternalCommand, fallback: HeuristicDetector) -> std::io::Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("detector stdout not captured"))?;

        let (label_tx, label_rx) = mpsc::channel(LABEL_BUFFER);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if label_tx.try_send(line).is_err() {
                            debug!("detector_label_dropped");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "detector_read_error");
                        break;
                    }
                }
            }
            info!("detector_output_closed");
        });

        Ok(Self {
            labels: Mutex::new(label_rx),
            fallback,
            degraded: AtomicBool::new(false),
            notice: Mutex::new(None),
            _child: Mutex::new(child),
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn drain(&self) -> Option<String> {
        let mut labels = self.labels.lock();
        let mut alert = None;
        loop {
            match labels.try_recv() {
                Ok(label) => {
                    if alert.is_none() {
                        alert = hazard_alert(&label);
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => return alert,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if !self.degraded.swap(true, Ordering::AcqRel) {
                        warn!("detector_unavailable_degrading_to_heuristic");
                        *self.notice.lock() = Some(CAMERA_UNAVAILABLE.to_string());
                    }
                    return alert;
                }
            }
        }
    }
}

#[async_trait]
impl Detector for CommandDetector {
    async fn poll(&self) -> Option<String> {
        if self.is_degraded() {
            return self.fallback.check();
        }
        self.drain()
    }

    fn name(&self) -> &'static str {
        "command"
    }

    fn take_notice(&self) -> Option<String> {
        self.notice.lock().take()
    }
}

/// Bind the detector for this run
///
/// Demo mode, a missing detector command, or a failed spawn all bind the
/// heuristic stub behind the same interface. Outside demo mode the stub
/// carries `CAMERA_UNAVAILABLE` as its notice.
pub fn probe_detector(config: &Config, demo_mode: bool) -> Arc<dyn Detector> {
    let heuristic = HeuristicDetector::new(config.heuristic_interval());

    if demo_mode {
        info!(detector = "heuristic", reason = "demo_mode", "detector_bound");
        return Arc::new(heuristic);
    }

    let Some(command) = config.detector_command().and_then(ExternalCommand::parse) else {
        warn!(detector = "heuristic", reason = "no_detector_command", "detector_bound");
        return Arc::new(heuristic.with_notice(CAMERA_UNAVAILABLE));
    };

    match CommandDetector::spawn(&command, heuristic) {
        Ok(detector) => {
            info!(detector = "command", program = %command.program.display(), "detector_bound");
            Arc::new(detector)
        }
        Err(e) => {
            warn!(program = %command.program.display(), error = %e, "detector_spawn_failed");
            let heuristic = HeuristicDetector::new(config.heuristic_interval());
            Arc::new(heuristic.with_notice(CAMERA_UNAVAILABLE))
        }
    }
}
