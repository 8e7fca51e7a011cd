//! Guidance orchestration - the session state machine
//!
//! Drives one session from destination dialogue to arrival:
//! `Presenting → AwaitingStart → Guiding ⇄ Paused → Arrived`
//!
//! The orchestrator owns the `GuidanceSession` outright. The only state it
//! shares with the obstacle monitor is the `ObstacleSignal`, read at the top
//! of every guidance tick and cleared once per pause. A latch left raised by
//! an earlier session is dropped on entering guidance. Every sleep and every
//! `ask` is raced against the operator cancel channel, and the monitor is
//! stopped on every exit path, including a dropped `run` future.

#[cfg(test)]
mod tests;

use crate::domain::eta::{minutes_to_eta_str, now_plus_minutes, remaining_phrase};
use crate::domain::route::RouteOption;
use crate::domain::session::{GuidanceSession, GuidanceState};
use crate::infra::config::{Config, Timing};
use crate::infra::metrics::Metrics;
use crate::io::geolocate::{Locator, Origin};
use crate::io::voice::VoiceChannel;
use crate::services::catalog::{demo_routes, RouteCatalog};
use crate::services::monitor::{MonitorScope, ObstacleMonitor};
use crate::services::selection::{self, Selection, SelectionRule};
use crate::services::signal::ObstacleSignal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const GREETING: &str = "Hello. I am your navigation assistant. Please tell me your destination.";
pub const DESTINATION_PROMPT: &str = "Where do you want to go?";
pub const DEFAULT_DESTINATION_NOTICE: &str =
    "I didn't hear a destination. Using a nearby place as an example.";
pub const NO_ROUTES_NOTICE: &str = "I'm sorry, I couldn't find routes. Falling back to a safe demo.";
pub const OPTIONS_INTRO: &str = "I found these options. Say one, two, or three to choose.";
pub const SELECTION_PROMPT: &str = "Which option do you want? One, two, or three?";
pub const SELECTION_FALLBACK_NOTICE: &str = "I didn't catch that. I'll pick the shortest route.";
pub const START_PROMPT: &str = "Say start when you are ready to begin, or say go.";
pub const START_ACK: &str = "Starting now. Stay safe and follow the instructions.";
pub const START_WAIT: &str = "Okay, I will wait. Let me know when to start.";
pub const AUTO_START_NOTICE: &str = "Starting automatically.";
pub const OBSTACLE_WARNING: &str =
    "Obstacle ahead. Please wait. I will let you know when it's safe to continue.";
pub const CLEAR_NOTICE: &str = "It should be clear now. You can proceed.";
pub const ARRIVAL: &str = "You have arrived at your destination.";

/// Substrings that release `AwaitingStart`
const START_KEYWORDS: [&str; 4] = ["start", "go", "begin", "proceed"];

/// Operator cancellation observed at a suspension point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("session cancelled by operator")]
pub struct Cancelled;

/// Inputs for one session
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    /// Used as-is unless the orchestrator has a locator
    pub origin: Origin,
    /// Skips the destination prompt when set and non-blank
    pub destination: Option<String>,
    /// Pick the shortest option without asking
    pub auto_select: bool,
    /// Skip `AwaitingStart`
    pub auto_start: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Arrived,
    Cancelled,
}

/// What happened during a session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: SessionOutcome,
    /// Chosen route, if the session got that far
    pub route: Option<RouteOption>,
    /// Countdown decrements performed
    pub ticks: u32,
    pub pauses: u32,
    /// States in the order they were entered
    pub transitions: Vec<GuidanceState>,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            session_id: uuid::Uuid::now_v7().to_string(),
            outcome: SessionOutcome::Cancelled,
            route: None,
            ticks: 0,
            pauses: 0,
            transitions: Vec::new(),
        }
    }

    fn enter(&mut self, state: GuidanceState) {
        debug!(session_id = %self.session_id, state = %state, "state_entered");
        self.transitions.push(state);
    }
}

/// Core state machine driving a navigation session
pub struct GuidanceOrchestrator {
    voice: Arc<dyn VoiceChannel>,
    catalog: Arc<dyn RouteCatalog>,
    timing: Timing,
    listen_timeout: Option<Duration>,
    max_start_prompts: Option<u32>,
    default_destination: String,
    /// Started on entering guidance, stopped on every exit path
    monitor: Option<ObstacleMonitor>,
    signal: ObstacleSignal,
    metrics: Arc<Metrics>,
    cancel: Option<watch::Receiver<bool>>,
    locator: Option<Arc<dyn Locator>>,
}

impl GuidanceOrchestrator {
    pub fn new(
        voice: Arc<dyn VoiceChannel>,
        catalog: Arc<dyn RouteCatalog>,
        config: &Config,
        timing: Timing,
    ) -> Self {
        Self {
            voice,
            catalog,
            timing,
            listen_timeout: config.listen_timeout(),
            max_start_prompts: config.max_start_prompts(),
            default_destination: config.default_destination().to_string(),
            monitor: None,
            signal: ObstacleSignal::new(),
            metrics: Arc::new(Metrics::new()),
            cancel: None,
            locator: None,
        }
    }

    /// Attach an obstacle monitor; the orchestrator adopts its signal
    pub fn with_monitor(mut self, monitor: ObstacleMonitor) -> Self {
        self.signal = monitor.signal().clone();
        self.monitor = Some(monitor);
        self
    }

    /// Attach the operator cancel channel (true = cancel)
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Resolve the origin after the greeting instead of taking it from the request
    pub fn with_locator(mut self, locator: Arc<dyn Locator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn obstacle_signal(&self) -> &ObstacleSignal {
        &self.signal
    }

    pub fn monitor(&self) -> Option<&ObstacleMonitor> {
        self.monitor.as_ref()
    }

    /// Run one session to arrival or cancellation
    pub async fn run(&mut self, request: SessionRequest) -> SessionReport {
        let mut report = SessionReport::new();
        info!(
            session_id = %report.session_id,
            auto_select = %request.auto_select,
            auto_start = %request.auto_start,
            monitor = %self.monitor.is_some(),
            "session_started"
        );

        // Outlives run_session so a dropped run future still releases the worker
        let mut monitor_scope: Option<MonitorScope> = None;
        let result = self.run_session(&request, &mut report, &mut monitor_scope).await;

        if let Some(monitor) = self.monitor.as_mut() {
            monitor.stop().await;
        }
        drop(monitor_scope);

        match result {
            Ok(()) => report.outcome = SessionOutcome::Arrived,
            Err(Cancelled) => {
                report.outcome = SessionOutcome::Cancelled;
                warn!(session_id = %report.session_id, "session_cancelled");
            }
        }

        info!(
            session_id = %report.session_id,
            outcome = ?report.outcome,
            ticks = %report.ticks,
            pauses = %report.pauses,
            "session_finished"
        );
        report
    }

    async fn run_session(
        &mut self,
        request: &SessionRequest,
        report: &mut SessionReport,
        monitor_scope: &mut Option<MonitorScope>,
    ) -> Result<(), Cancelled> {
        self.voice.say(GREETING).await;
        let origin = match self.locator.clone() {
            Some(locator) => self.guard(locator.locate()).await?,
            None => request.origin.clone(),
        };
        info!(
            session_id = %report.session_id,
            origin = %origin.display,
            detected = %origin.detected,
            "origin_resolved"
        );
        if origin.detected {
            self.voice.say(&format!("I detected you are near {}.", origin.display)).await;
        }
        let destination = self.destination(request).await?;

        // Presenting
        report.enter(GuidanceState::Presenting);
        let options = self.fetch_options(&origin, &destination).await?;
        let route = self.choose(&options, request.auto_select).await?;
        info!(
            session_id = %report.session_id,
            destination = %destination,
            mode = %route.mode,
            duration_min = %route.duration_min,
            provider = %route.provider,
            "route_selected"
        );
        report.route = Some(route.clone());

        let mut session = GuidanceSession::new(route);
        self.announce_route(session.route()).await?;

        // AwaitingStart
        if !request.auto_start {
            report.enter(GuidanceState::AwaitingStart);
            self.await_start().await?;
        }

        if self.signal.clear() {
            debug!(session_id = %report.session_id, "stale_obstacle_signal_cleared");
        }
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.start();
            *monitor_scope = monitor.scope();
        }

        // Guiding ⇄ Paused
        report.enter(GuidanceState::Guiding);
        while !session.is_complete() {
            if self.signal.is_raised() {
                report.enter(GuidanceState::Paused);
                self.pause(&mut session).await?;
                report.pauses += 1;
                report.enter(GuidanceState::Guiding);
                continue;
            }

            self.voice.say(&remaining_phrase(session.remaining_minutes())).await;
            session.tick();
            report.ticks += 1;
            self.metrics.record_tick();
            self.guard(tokio::time::sleep(self.timing.tick)).await?;
        }

        // Arrived
        report.enter(GuidanceState::Arrived);
        self.voice.say(ARRIVAL).await;
        info!(session_id = %report.session_id, ticks = %report.ticks, "session_arrived");
        Ok(())
    }

    async fn destination(&self, request: &SessionRequest) -> Result<String, Cancelled> {
        if let Some(destination) = non_blank(request.destination.as_deref()) {
            return Ok(destination);
        }

        let response = self.guard(self.voice.ask(DESTINATION_PROMPT, self.listen_timeout)).await?;
        match non_blank(Some(&response)) {
            Some(destination) => Ok(destination),
            None => {
                self.voice.say(DEFAULT_DESTINATION_NOTICE).await;
                Ok(self.default_destination.clone())
            }
        }
    }

    async fn fetch_options(&self, origin: &Origin, destination: &str) -> Result<Vec<RouteOption>, Cancelled> {
        let options = self.guard(self.catalog.get_routes(&origin.display, destination)).await?;
        if options.is_empty() {
            warn!(destination = %destination, "catalog_empty_using_demo");
            self.voice.say(NO_ROUTES_NOTICE).await;
            return Ok(demo_routes(destination));
        }
        debug!(options = %options.len(), "routes_fetched");
        Ok(options)
    }

    async fn choose(&self, options: &[RouteOption], auto_select: bool) -> Result<RouteOption, Cancelled> {
        let selection = if auto_select {
            selection::shortest(options).map(|index| Selection { index, rule: SelectionRule::Shortest })
        } else {
            self.voice.say(OPTIONS_INTRO).await;
            for (i, option) in options.iter().enumerate() {
                self.voice.say(&format!("Option {}: {}", i + 1, option.describe())).await;
            }
            let response = self.guard(self.voice.ask(SELECTION_PROMPT, self.listen_timeout)).await?;
            let selection = selection::resolve(&response, options);
            if selection.is_some_and(|s| s.is_fallback()) {
                self.voice.say(SELECTION_FALLBACK_NOTICE).await;
            }
            debug!(response = %response, selection = ?selection, "selection_resolved");
            selection
        };

        // Options are never empty here: the catalog result was topped up with demo routes
        let index = selection.map_or(0, |s| s.index);
        Ok(options[index].clone())
    }

    async fn announce_route(&self, route: &RouteOption) -> Result<(), Cancelled> {
        let minutes = i64::from(route.duration_min);
        self.voice
            .say(&format!(
                "Starting {} guidance. Estimated time {}. Arrival around {}.",
                route.mode,
                minutes_to_eta_str(minutes),
                now_plus_minutes(minutes)
            ))
            .await;

        for step in &route.steps {
            self.voice.say(step).await;
            self.guard(tokio::time::sleep(self.timing.step_gap)).await?;
        }
        Ok(())
    }

    async fn await_start(&self) -> Result<(), Cancelled> {
        let mut prompts = 0u32;
        loop {
            let response = self.guard(self.voice.ask(START_PROMPT, self.listen_timeout)).await?;
            prompts += 1;

            if is_start_response(&response) {
                self.voice.say(START_ACK).await;
                return Ok(());
            }

            if self.max_start_prompts.is_some_and(|max| prompts >= max) {
                info!(prompts = %prompts, "start_prompts_exhausted");
                self.voice.say(AUTO_START_NOTICE).await;
                return Ok(());
            }
            self.voice.say(START_WAIT).await;
        }
    }

    async fn pause(&self, session: &mut GuidanceSession) -> Result<(), Cancelled> {
        session.pause();
        self.metrics.record_pause();
        info!(remaining_minutes = %session.remaining_minutes(), "guidance_paused");

        self.voice.say(OBSTACLE_WARNING).await;
        self.guard(tokio::time::sleep(self.timing.pause)).await?;

        self.signal.clear();
        self.voice.say(CLEAR_NOTICE).await;
        session.resume();
        info!(remaining_minutes = %session.remaining_minutes(), "guidance_resumed");
        Ok(())
    }

    /// Race `fut` against the cancel channel
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        tokio::select! {
            biased;
            _ = cancel_requested(self.cancel.clone()) => Err(Cancelled),
            output = fut => Ok(output),
        }
    }
}

/// Case-insensitive substring match against the start keywords
pub fn is_start_response(response: &str) -> bool {
    let lowered = response.to_lowercase();
    START_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Resolves once cancel is requested; pends forever without a live sender
async fn cancel_requested(cancel: Option<watch::Receiver<bool>>) {
    if let Some(mut cancel) = cancel {
        if cancel.wait_for(|requested| *requested).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}
