//! Tests for the GuidanceOrchestrator state machine

use super::*;
use crate::domain::route::RouteMode;
use crate::io::detector::HeuristicDetector;
use crate::io::geolocate::Locator;
use crate::io::voice::TranscriptVoice;
use crate::services::catalog::DemoCatalog;
use async_trait::async_trait;

/// Catalog returning a fixed option list
struct FixedCatalog(Vec<RouteOption>);

#[async_trait]
impl RouteCatalog for FixedCatalog {
    async fn get_routes(&self, _origin: &str, _destination: &str) -> Vec<RouteOption> {
        self.0.clone()
    }
}

/// Scripted voice that raises the obstacle signal right after hearing given lines
struct TriggerVoice {
    transcript: TranscriptVoice,
    signal: ObstacleSignal,
    triggers: Vec<&'static str>,
}

#[async_trait]
impl VoiceChannel for TriggerVoice {
    async fn say(&self, text: &str) {
        self.transcript.say(text).await;
        if self.triggers.iter().any(|trigger| *trigger == text) {
            self.signal.raise();
        }
    }

    async fn ask(&self, prompt: &str, timeout: Option<Duration>) -> String {
        self.transcript.ask(prompt, timeout).await
    }
}

/// Locator that records what had been spoken when it was consulted
struct SnapshotLocator {
    voice: Arc<TranscriptVoice>,
    heard: parking_lot::Mutex<Option<Vec<String>>>,
}

#[async_trait]
impl Locator for SnapshotLocator {
    async fn locate(&self) -> Origin {
        *self.heard.lock() = Some(self.voice.spoken());
        Origin::detected("Hafnarfjordur, Iceland")
    }
}

fn route(mode: RouteMode, duration_min: u32) -> RouteOption {
    RouteOption {
        mode,
        duration_min,
        distance_km: 1.25,
        summary: "Main Street".to_string(),
        provider: "test".to_string(),
        steps: vec!["Head north".to_string(), "Turn left at the park".to_string()],
    }
}

fn orchestrator(voice: Arc<dyn VoiceChannel>, options: Vec<RouteOption>) -> GuidanceOrchestrator {
    GuidanceOrchestrator::new(voice, Arc::new(FixedCatalog(options)), &Config::default(), Timing::fast())
}

fn quick_request() -> SessionRequest {
    SessionRequest {
        destination: Some("cafe".to_string()),
        auto_select: true,
        auto_start: true,
        ..SessionRequest::default()
    }
}

/// Announcements from the first countdown line onward
fn guidance_lines(spoken: &[String]) -> Vec<String> {
    let start = spoken
        .iter()
        .position(|line| line.ends_with("remaining.") || line == OBSTACLE_WARNING)
        .unwrap_or(spoken.len());
    spoken[start..].to_vec()
}

#[tokio::test(start_paused = true)]
async fn test_countdown_three_minutes_then_arrival() {
    let voice = Arc::new(TranscriptVoice::default());
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Walking, 3)]);

    let report = orchestrator.run(quick_request()).await;

    assert_eq!(report.outcome, SessionOutcome::Arrived);
    assert_eq!(report.ticks, 3);
    assert_eq!(report.pauses, 0);
    assert_eq!(
        guidance_lines(&voice.spoken()),
        vec![
            "3 minutes remaining.".to_string(),
            "2 minutes remaining.".to_string(),
            "One minute remaining.".to_string(),
            ARRIVAL.to_string(),
        ]
    );
    assert_eq!(
        report.transitions,
        vec![GuidanceState::Presenting, GuidanceState::Guiding, GuidanceState::Arrived]
    );
}

#[tokio::test(start_paused = true)]
async fn test_opening_dialogue_and_steps_in_order() {
    let voice = Arc::new(TranscriptVoice::default());
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Walking, 1)]);
    let request = SessionRequest { origin: Origin::detected("Reykjavik, Iceland"), ..quick_request() };

    orchestrator.run(request).await;

    let spoken = voice.spoken();
    assert_eq!(spoken[0], GREETING);
    assert_eq!(spoken[1], "I detected you are near Reykjavik, Iceland.");
    assert!(spoken[2].starts_with("Starting walking guidance. Estimated time 1 minute. Arrival around "));
    assert_eq!(spoken[3], "Head north");
    assert_eq!(spoken[4], "Turn left at the park");
    assert_eq!(spoken[5], "One minute remaining.");
    // Destination was given, nothing was asked
    assert!(voice.prompts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_undetected_origin_is_not_announced() {
    let voice = Arc::new(TranscriptVoice::default());
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Walking, 1)]);

    orchestrator.run(quick_request()).await;

    assert!(!voice.spoken().iter().any(|line| line.starts_with("I detected")));
}

#[tokio::test(start_paused = true)]
async fn test_obstacle_pause_resumes_pending_tick() {
    let signal = ObstacleSignal::new();
    let voice = Arc::new(TriggerVoice {
        transcript: TranscriptVoice::default(),
        signal: signal.clone(),
        // Raised after the second countdown line, then again mid-pause
        triggers: vec!["2 minutes remaining.", OBSTACLE_WARNING],
    });
    let metrics = Arc::new(Metrics::new());
    let mut orchestrator = GuidanceOrchestrator::new(
        voice.clone(),
        Arc::new(FixedCatalog(vec![route(RouteMode::Walking, 3)])),
        &Config::default(),
        Timing::fast(),
    )
    .with_metrics(metrics.clone());
    // Share the test's signal with the orchestrator
    orchestrator.signal = signal.clone();

    let started = tokio::time::Instant::now();
    let report = orchestrator.run(quick_request()).await;
    let elapsed = started.elapsed();

    assert_eq!(
        guidance_lines(&voice.transcript.spoken()),
        vec![
            "3 minutes remaining.".to_string(),
            "2 minutes remaining.".to_string(),
            OBSTACLE_WARNING.to_string(),
            CLEAR_NOTICE.to_string(),
            "One minute remaining.".to_string(),
            ARRIVAL.to_string(),
        ]
    );
    // One pause, one clear, no tick lost or repeated
    assert_eq!(report.ticks, 3);
    assert_eq!(report.pauses, 1);
    assert_eq!(metrics.pauses(), 1);
    assert_eq!(metrics.guidance_ticks(), 3);
    assert!(!signal.is_raised());
    assert!(elapsed >= Timing::fast().tick * 3 + Timing::fast().pause);
    assert_eq!(
        report.transitions,
        vec![
            GuidanceState::Presenting,
            GuidanceState::Guiding,
            GuidanceState::Paused,
            GuidanceState::Guiding,
            GuidanceState::Arrived,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_signal_cleared_on_entering_guidance() {
    let voice = Arc::new(TranscriptVoice::default());
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Driving, 2)]);
    orchestrator.obstacle_signal().raise();

    let report = orchestrator.run(quick_request()).await;

    assert_eq!(
        guidance_lines(&voice.spoken()),
        vec![
            "2 minutes remaining.".to_string(),
            "One minute remaining.".to_string(),
            ARRIVAL.to_string(),
        ]
    );
    assert_eq!(report.ticks, 2);
    assert_eq!(report.pauses, 0);
    assert!(!orchestrator.obstacle_signal().is_raised());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_pause_does_not_leak_into_next_session() {
    let voice = Arc::new(TranscriptVoice::default());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut orchestrator =
        orchestrator(voice.clone(), vec![route(RouteMode::Walking, 30)]).with_cancel(cancel_rx);
    let signal = orchestrator.obstacle_signal().clone();

    // Raised during the first tick, cancelled inside the pause that follows
    let driver = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.raise();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let _ = cancel_tx.send(true);
        cancel_tx
    });

    let first = orchestrator.run(quick_request()).await;
    let cancel_tx = driver.await.unwrap();

    assert_eq!(first.outcome, SessionOutcome::Cancelled);
    assert_eq!(first.transitions.last(), Some(&GuidanceState::Paused));
    assert!(orchestrator.obstacle_signal().is_raised());

    cancel_tx.send_replace(false);
    let second = orchestrator.run(quick_request()).await;

    assert_eq!(second.outcome, SessionOutcome::Arrived);
    assert_eq!(second.pauses, 0);
    assert_eq!(second.ticks, 30);
    assert!(!second.transitions.contains(&GuidanceState::Paused));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_run_future_releases_monitor() {
    let voice = Arc::new(TranscriptVoice::default());
    let metrics = Arc::new(Metrics::new());
    let detector = Arc::new(HeuristicDetector::new(Duration::from_secs(3600)));
    let monitor = ObstacleMonitor::new(detector, ObstacleSignal::new(), &Timing::fast(), metrics.clone());
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Walking, 30)])
        .with_monitor(monitor)
        .with_metrics(metrics.clone());

    let run = tokio::time::timeout(Duration::from_millis(100), orchestrator.run(quick_request())).await;
    assert!(run.is_err());

    // Let the runtime reap the aborted worker
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(orchestrator.monitor().is_some_and(|m| !m.is_running()));

    let polls = metrics.detector_polls();
    assert!(polls > 0);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(metrics.detector_polls(), polls);
}

#[tokio::test(start_paused = true)]
async fn test_greeting_spoken_before_origin_lookup() {
    let voice = Arc::new(TranscriptVoice::default());
    let locator = Arc::new(SnapshotLocator { voice: voice.clone(), heard: parking_lot::Mutex::new(None) });
    let mut orchestrator =
        orchestrator(voice.clone(), vec![route(RouteMode::Walking, 1)]).with_locator(locator.clone());
    let request = SessionRequest { origin: Origin::detected("ignored"), ..quick_request() };

    orchestrator.run(request).await;

    assert_eq!(locator.heard.lock().clone(), Some(vec![GREETING.to_string()]));
    let spoken = voice.spoken();
    assert_eq!(spoken[0], GREETING);
    assert_eq!(spoken[1], "I detected you are near Hafnarfjordur, Iceland.");
    assert!(!spoken.iter().any(|line| line.contains("ignored")));
}

#[tokio::test(start_paused = true)]
async fn test_awaiting_start_reprompts_until_keyword() {
    let voice = Arc::new(TranscriptVoice::new(["", "not yet", "OK let's GO"]));
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Walking, 1)]);
    let request = SessionRequest { auto_start: false, ..quick_request() };

    let report = orchestrator.run(request).await;

    assert_eq!(voice.prompts(), vec![START_PROMPT; 3]);
    let spoken = voice.spoken();
    assert_eq!(spoken.iter().filter(|line| *line == START_WAIT).count(), 2);
    assert_eq!(spoken.iter().filter(|line| *line == START_ACK).count(), 1);
    assert_eq!(
        report.transitions,
        vec![
            GuidanceState::Presenting,
            GuidanceState::AwaitingStart,
            GuidanceState::Guiding,
            GuidanceState::Arrived,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_bounded_start_prompts_auto_start() {
    let voice = Arc::new(TranscriptVoice::default());
    let config = Config::default().with_max_start_prompts(Some(2));
    let mut orchestrator = GuidanceOrchestrator::new(
        voice.clone(),
        Arc::new(FixedCatalog(vec![route(RouteMode::Walking, 1)])),
        &config,
        Timing::fast(),
    );
    let request = SessionRequest { auto_start: false, ..quick_request() };

    let report = orchestrator.run(request).await;

    assert_eq!(report.outcome, SessionOutcome::Arrived);
    assert_eq!(voice.prompts().len(), 2);
    let spoken = voice.spoken();
    assert!(spoken.contains(&AUTO_START_NOTICE.to_string()));
    assert!(!spoken.contains(&START_ACK.to_string()));
}

#[test]
fn test_start_keywords_match_substrings() {
    assert!(is_start_response("Start"));
    assert!(is_start_response("let's go"));
    assert!(is_start_response("ready to BEGIN"));
    assert!(is_start_response("please proceed"));
    assert!(is_start_response("restart"));
    assert!(!is_start_response("wait a moment"));
    assert!(!is_start_response(""));
}

#[tokio::test(start_paused = true)]
async fn test_interactive_selection_by_number() {
    let voice = Arc::new(TranscriptVoice::new(["two please"]));
    let mut orchestrator = GuidanceOrchestrator::new(
        voice.clone(),
        Arc::new(DemoCatalog),
        &Config::default(),
        Timing::fast(),
    );
    let request = SessionRequest { auto_select: false, ..quick_request() };

    let report = orchestrator.run(request).await;

    let options = demo_routes("cafe");
    assert_eq!(report.route.as_ref(), Some(&options[1]));
    let spoken = voice.spoken();
    assert!(spoken.contains(&OPTIONS_INTRO.to_string()));
    for (i, option) in options.iter().enumerate() {
        assert!(spoken.contains(&format!("Option {}: {}", i + 1, option.describe())));
    }
    assert_eq!(voice.prompts(), vec![SELECTION_PROMPT]);
    assert!(!spoken.contains(&SELECTION_FALLBACK_NOTICE.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_selection_announces_fallback() {
    let voice = Arc::new(TranscriptVoice::new(["uh I don't know"]));
    let options = vec![route(RouteMode::Walking, 9), route(RouteMode::Driving, 4), route(RouteMode::Transit, 4)];
    let mut orchestrator = orchestrator(voice.clone(), options);
    let request = SessionRequest { auto_select: false, ..quick_request() };

    let report = orchestrator.run(request).await;

    assert_eq!(report.route.map(|r| r.mode), Some(RouteMode::Driving));
    assert!(voice.spoken().contains(&SELECTION_FALLBACK_NOTICE.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_empty_catalog_falls_back_to_demo() {
    let voice = Arc::new(TranscriptVoice::default());
    let mut orchestrator = orchestrator(voice.clone(), Vec::new());

    let report = orchestrator.run(quick_request()).await;

    let demo = demo_routes("cafe");
    let shortest = selection::shortest(&demo).map(|i| demo[i].clone());
    assert!(voice.spoken().contains(&NO_ROUTES_NOTICE.to_string()));
    assert_eq!(report.route, shortest);
    assert_eq!(report.outcome, SessionOutcome::Arrived);
}

#[tokio::test(start_paused = true)]
async fn test_blank_destination_uses_default() {
    let voice = Arc::new(TranscriptVoice::new(["   "]));
    let mut orchestrator = GuidanceOrchestrator::new(
        voice.clone(),
        Arc::new(DemoCatalog),
        &Config::default(),
        Timing::fast(),
    );
    let request = SessionRequest { destination: None, ..quick_request() };

    let report = orchestrator.run(request).await;

    assert_eq!(voice.prompts(), vec![DESTINATION_PROMPT]);
    assert!(voice.spoken().contains(&DEFAULT_DESTINATION_NOTICE.to_string()));
    let route = report.route.unwrap_or_else(|| panic!("route chosen"));
    assert!(route.summary.contains("nearest coffee shop"));
}

#[tokio::test(start_paused = true)]
async fn test_spoken_destination_is_used() {
    let voice = Arc::new(TranscriptVoice::new(["the library"]));
    let mut orchestrator = GuidanceOrchestrator::new(
        voice.clone(),
        Arc::new(DemoCatalog),
        &Config::default(),
        Timing::fast(),
    );
    let request = SessionRequest { destination: Some(" ".to_string()), ..quick_request() };

    let report = orchestrator.run(request).await;

    let route = report.route.unwrap_or_else(|| panic!("route chosen"));
    assert!(route.summary.contains("the library"));
    assert!(!voice.spoken().contains(&DEFAULT_DESTINATION_NOTICE.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_guidance_stops_monitor() {
    let voice = Arc::new(TranscriptVoice::default());
    let metrics = Arc::new(Metrics::new());
    let detector = Arc::new(HeuristicDetector::new(Duration::from_secs(3600)));
    let monitor = ObstacleMonitor::new(detector, ObstacleSignal::new(), &Timing::fast(), metrics.clone());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Walking, 30)])
        .with_monitor(monitor)
        .with_metrics(metrics)
        .with_cancel(cancel_rx);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = cancel_tx.send(true);
        cancel_tx
    });

    let report = orchestrator.run(quick_request()).await;
    let _ = canceller.await;

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert!(report.ticks > 0 && report.ticks < 30);
    assert!(!voice.spoken().contains(&ARRIVAL.to_string()));
    assert!(orchestrator.monitor().is_some_and(|m| !m.is_running()));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_requested_before_run() {
    let voice = Arc::new(TranscriptVoice::default());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut orchestrator =
        orchestrator(voice.clone(), vec![route(RouteMode::Walking, 1)]).with_cancel(cancel_rx);
    cancel_tx.send_replace(true);

    let report = orchestrator.run(SessionRequest { auto_start: false, ..quick_request() }).await;

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.ticks, 0);
    assert_eq!(report.transitions, vec![GuidanceState::Presenting]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_cancel_sender_never_cancels() {
    let voice = Arc::new(TranscriptVoice::default());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    drop(cancel_tx);
    let mut orchestrator =
        orchestrator(voice.clone(), vec![route(RouteMode::Walking, 2)]).with_cancel(cancel_rx);

    let report = orchestrator.run(quick_request()).await;

    assert_eq!(report.outcome, SessionOutcome::Arrived);
}

#[tokio::test(start_paused = true)]
async fn test_monitor_detections_pause_guidance() {
    let voice = Arc::new(TranscriptVoice::default());
    let metrics = Arc::new(Metrics::new());
    // First alert one interval after construction, well inside the countdown
    let detector = Arc::new(HeuristicDetector::new(Duration::from_millis(50)));
    let monitor = ObstacleMonitor::new(detector, ObstacleSignal::new(), &Timing::fast(), metrics.clone());
    let mut orchestrator = orchestrator(voice.clone(), vec![route(RouteMode::Walking, 6)])
        .with_monitor(monitor)
        .with_metrics(metrics.clone());

    let report = orchestrator.run(quick_request()).await;

    assert_eq!(report.outcome, SessionOutcome::Arrived);
    assert_eq!(report.ticks, 6);
    assert!(report.pauses >= 1);
    assert!(metrics.detector_polls() > 0);
    assert!(metrics.alerts_raised() >= 1);
    assert!(voice.spoken().contains(&OBSTACLE_WARNING.to_string()));
    assert!(orchestrator.monitor().is_some_and(|m| !m.is_running()));
}
