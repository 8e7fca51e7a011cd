//! Google Directions API client
//!
//! Fetches one walking and one driving route per request. Transit is left out:
//! it needs region-specific parameters the service does not accept uniformly.

use crate::domain::route::{RouteMode, RouteOption};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

/// Modes requested from the live provider, in presentation order
const LIVE_MODES: [RouteMode; 2] = [RouteMode::Walking, RouteMode::Driving];

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("provider response malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    duration: Measure,
    distance: Measure,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(default)]
    html_instructions: String,
}

pub struct DirectionsClient {
    api_key: String,
    client: reqwest::Client,
}

impl DirectionsClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, RouteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { api_key: api_key.into(), client })
    }

    /// Query every live mode; modes without a route are skipped
    pub async fn routes(&self, origin: &str, destination: &str) -> Result<Vec<RouteOption>, RouteError> {
        let mut options = Vec::with_capacity(LIVE_MODES.len());
        for mode in LIVE_MODES {
            let body = self.fetch(origin, destination, mode).await?;
            if let Some(option) = parse_directions(&body, mode)? {
                options.push(option);
            } else {
                debug!(mode = %mode, "directions_no_route");
            }
        }
        Ok(options)
    }

    async fn fetch(&self, origin: &str, destination: &str, mode: RouteMode) -> Result<String, RouteError> {
        let response = self
            .client
            .get(DIRECTIONS_URL)
            .query(&[
                ("origin", origin),
                ("destination", destination),
                ("mode", mode.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RouteError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Convert a Directions API body into a route option for `mode`
fn parse_directions(body: &str, mode: RouteMode) -> Result<Option<RouteOption>, RouteError> {
    let response: DirectionsResponse = serde_json::from_str(body)?;
    let Some(route) = response.routes.into_iter().next() else {
        return Ok(None);
    };
    let Some(leg) = route.legs.into_iter().next() else {
        return Ok(None);
    };

    let steps: Vec<String> = leg
        .steps
        .iter()
        .map(|step| strip_html(&step.html_instructions))
        .filter(|step| !step.is_empty())
        .collect();
    if steps.is_empty() {
        return Ok(None);
    }

    let summary = if route.summary.trim().is_empty() {
        format!("{} route", capitalize(mode.as_str()))
    } else {
        route.summary
    };

    Ok(Some(RouteOption {
        mode,
        // Whole minutes, never zero so the countdown has at least one tick
        duration_min: u32::try_from(leg.duration.value / 60).unwrap_or(u32::MAX).max(1),
        distance_km: (leg.distance.value as f64 / 1000.0 * 100.0).round() / 100.0,
        summary,
        provider: "google".to_string(),
        steps,
    }))
}

fn html_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex is valid"))
}

fn whitespace_run() -> &'static Regex {
    static RUN: OnceLock<Regex> = OnceLock::new();
    RUN.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Replace tags with spaces and collapse whitespace
pub fn strip_html(text: &str) -> String {
    let without_tags = html_tag().replace_all(text, " ");
    whitespace_run().replace_all(without_tags.trim(), " ").into_owned()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
