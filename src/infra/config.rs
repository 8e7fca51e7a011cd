//! Configuration loading from TOML files and the environment
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/wayfinder.toml
//!
//! Environment variables (DEMO_MODE, ENABLE_VISION, GOOGLE_MAPS_API_KEY, ...)
//! override the file. Command line flags are layered on top by `main`.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct GuidanceConfig {
    #[serde(default = "default_demo_mode")]
    pub demo_mode: bool,
    /// Real-world tick length (one countdown minute)
    #[serde(default = "default_tick_secs")]
    pub tick_secs: f64,
    /// Tick length under demo mode
    #[serde(default = "default_demo_tick_secs")]
    pub demo_tick_secs: f64,
    /// Obstacle pause length in time units (seconds at real-world pace)
    #[serde(default = "default_pause_units")]
    pub pause_units: f64,
    /// Gap between spoken route steps
    #[serde(default = "default_step_gap_secs")]
    pub step_gap_secs: f64,
    /// Bound on "say start" re-prompts; unbounded when absent
    #[serde(default)]
    pub max_start_prompts: Option<u32>,
    #[serde(default = "default_destination")]
    pub default_destination: String,
}

fn default_demo_mode() -> bool {
    true
}

fn default_tick_secs() -> f64 {
    60.0
}

fn default_demo_tick_secs() -> f64 {
    3.0
}

fn default_pause_units() -> f64 {
    120.0
}

fn default_step_gap_secs() -> f64 {
    1.0
}

fn default_destination() -> String {
    "nearest coffee shop".to_string()
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            demo_mode: default_demo_mode(),
            tick_secs: default_tick_secs(),
            demo_tick_secs: default_demo_tick_secs(),
            pause_units: default_pause_units(),
            step_gap_secs: default_step_gap_secs(),
            max_start_prompts: None,
            default_destination: default_destination(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VoiceConfig {
    /// Speech recognition engine: "command" or empty for keyboard input
    #[serde(default)]
    pub stt_engine: String,
    /// External recognizer printing the transcript on stdout
    #[serde(default)]
    pub stt_command: Option<String>,
    /// External speech synthesizer taking the text as last argument
    #[serde(default)]
    pub tts_command: Option<String>,
    /// Default wait for a response (0 waits indefinitely on keyboard input)
    #[serde(default)]
    pub listen_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// External detector printing one object label per line
    #[serde(default)]
    pub detector_command: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_heuristic_interval_secs")]
    pub heuristic_interval_secs: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_heuristic_interval_secs() -> u64 {
    15
}

fn default_stop_grace_ms() -> u64 {
    2000
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            detector_command: None,
            poll_interval_ms: default_poll_interval_ms(),
            heuristic_interval_secs: default_heuristic_interval_secs(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { google_api_key: None, request_timeout_secs: default_request_timeout_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Look up the approximate origin by IP
    #[serde(default = "default_geolocate")]
    pub geolocate: bool,
    #[serde(default)]
    pub default_city: Option<String>,
}

fn default_geolocate() -> bool {
    true
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self { geolocate: default_geolocate(), default_city: None }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub guidance: GuidanceConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub location: LocationConfig,
}

/// Durations the orchestrator and monitor run on
///
/// Demo mode compresses tick and pause by the same factor so ordering and
/// counts are unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub tick: Duration,
    pub pause: Duration,
    pub step_gap: Duration,
    pub poll_interval: Duration,
    pub stop_grace: Duration,
}

impl Timing {
    /// Millisecond-scale timing for tests and dry runs
    pub fn fast() -> Self {
        Self {
            tick: Duration::from_millis(30),
            pause: Duration::from_millis(60),
            step_gap: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
            stop_grace: Duration::from_millis(100),
        }
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    demo_mode: bool,
    tick_secs: f64,
    demo_tick_secs: f64,
    pause_units: f64,
    step_gap_secs: f64,
    max_start_prompts: Option<u32>,
    default_destination: String,
    stt_engine: String,
    stt_command: Option<String>,
    tts_command: Option<String>,
    listen_timeout_secs: u64,
    vision_enabled: bool,
    detector_command: Option<String>,
    poll_interval_ms: u64,
    heuristic_interval_secs: u64,
    stop_grace_ms: u64,
    google_api_key: Option<String>,
    request_timeout_secs: u64,
    geolocate: bool,
    default_city: Option<String>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let TomlConfig { guidance, voice, vision, routing, location } = toml_config;
        Self {
            demo_mode: guidance.demo_mode,
            tick_secs: guidance.tick_secs,
            demo_tick_secs: guidance.demo_tick_secs,
            pause_units: guidance.pause_units,
            step_gap_secs: guidance.step_gap_secs,
            max_start_prompts: guidance.max_start_prompts,
            default_destination: guidance.default_destination,
            stt_engine: voice.stt_engine.trim().to_lowercase(),
            stt_command: non_empty(voice.stt_command),
            tts_command: non_empty(voice.tts_command),
            listen_timeout_secs: voice.listen_timeout_secs,
            vision_enabled: vision.enabled,
            detector_command: non_empty(vision.detector_command),
            poll_interval_ms: vision.poll_interval_ms,
            heuristic_interval_secs: vision.heuristic_interval_secs,
            stop_grace_ms: vision.stop_grace_ms,
            google_api_key: non_empty(routing.google_api_key),
            request_timeout_secs: routing.request_timeout_secs,
            geolocate: location.geolocate,
            default_city: non_empty(location.default_city),
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from the --config flag or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/wayfinder.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_file_unavailable_using_defaults");
                Self { config_file: "default".to_string(), ..Self::default() }
            }
        }
    }

    /// Load configuration - TOML file, then process environment
    pub fn load(cli_path: Option<&str>) -> Self {
        let config_path = Self::resolve_config_path(cli_path);
        let mut config = Self::load_from_path(&config_path);
        config.apply_env(|key| env::var(key).ok());
        config
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DEMO_MODE") {
            self.demo_mode = value.trim().eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup("ENABLE_VISION") {
            self.vision_enabled = value.trim().eq_ignore_ascii_case("true");
        }
        if let Some(value) = lookup("VOICE_STT_ENGINE") {
            self.stt_engine = value.trim().to_lowercase();
        }
        if let Some(value) = non_empty(lookup("VOICE_STT_COMMAND")) {
            self.stt_command = Some(value);
        }
        if let Some(value) = non_empty(lookup("VOICE_TTS_COMMAND")) {
            self.tts_command = Some(value);
        }
        if let Some(value) = non_empty(lookup("VISION_DETECTOR_COMMAND")) {
            self.detector_command = Some(value);
        }
        if let Some(value) = non_empty(lookup("GOOGLE_MAPS_API_KEY")) {
            self.google_api_key = Some(value);
        }
        if let Some(value) = non_empty(lookup("DEFAULT_CITY")) {
            self.default_city = Some(value);
        }
    }

    /// Timing for the given mode
    pub fn timing(&self, demo_mode: bool) -> Timing {
        let tick_secs = if demo_mode { self.demo_tick_secs } else { self.tick_secs };
        // Pause units are seconds at real-world pace, scaled like the tick
        let pause_secs = if self.tick_secs > 0.0 {
            self.pause_units * tick_secs / self.tick_secs
        } else {
            self.pause_units
        };
        Timing {
            tick: secs(tick_secs),
            pause: secs(pause_secs),
            step_gap: secs(self.step_gap_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms.clamp(1, 250)),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }

    // Getters for all config fields
    pub fn demo_mode(&self) -> bool {
        self.demo_mode
    }

    pub fn max_start_prompts(&self) -> Option<u32> {
        self.max_start_prompts
    }

    pub fn default_destination(&self) -> &str {
        &self.default_destination
    }

    pub fn stt_engine(&self) -> &str {
        &self.stt_engine
    }

    pub fn stt_command(&self) -> Option<&str> {
        self.stt_command.as_deref()
    }

    pub fn tts_command(&self) -> Option<&str> {
        self.tts_command.as_deref()
    }

    pub fn listen_timeout(&self) -> Option<Duration> {
        (self.listen_timeout_secs > 0).then(|| Duration::from_secs(self.listen_timeout_secs))
    }

    pub fn vision_enabled(&self) -> bool {
        self.vision_enabled
    }

    pub fn detector_command(&self) -> Option<&str> {
        self.detector_command.as_deref()
    }

    pub fn heuristic_interval(&self) -> Duration {
        Duration::from_secs(self.heuristic_interval_secs)
    }

    pub fn google_api_key(&self) -> Option<&str> {
        self.google_api_key.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn geolocate(&self) -> bool {
        self.geolocate
    }

    pub fn default_city(&self) -> Option<&str> {
        self.default_city.as_deref()
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set max_start_prompts
    #[cfg(test)]
    pub fn with_max_start_prompts(mut self, max: Option<u32>) -> Self {
        self.max_start_prompts = max;
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
