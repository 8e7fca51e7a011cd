//! Route catalogs - where route options come from
//!
//! `RoutePlanner` is the catalog the application runs with: it prefers the live
//! directions provider and degrades to the deterministic demo generator on any
//! failure, so `get_routes` never surfaces an error and never blocks past the
//! configured timeout.

use crate::domain::route::{RouteMode, RouteOption};
use crate::infra::config::Config;
use crate::io::directions::{DirectionsClient, RouteError};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait RouteCatalog: Send + Sync {
    /// Ordered route options from `origin` to `destination`, possibly empty
    async fn get_routes(&self, origin: &str, destination: &str) -> Vec<RouteOption>;
}

/// Offline catalog producing the seeded demo sequence
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoCatalog;

#[async_trait]
impl RouteCatalog for DemoCatalog {
    async fn get_routes(&self, _origin: &str, destination: &str) -> Vec<RouteOption> {
        demo_routes(destination)
    }
}

/// Stable seed for a destination; identical text always yields the same seed
fn destination_seed(destination: &str) -> u64 {
    let mut hasher = FxHasher::default();
    destination.hash(&mut hasher);
    hasher.finish()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn steps(lines: [&str; 4]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

/// One walking, one driving and one transit option seeded by `destination`
pub fn demo_routes(destination: &str) -> Vec<RouteOption> {
    let mut rng = StdRng::seed_from_u64(destination_seed(destination));

    let walk = RouteOption {
        mode: RouteMode::Walking,
        duration_min: rng.gen_range(10..=45),
        distance_km: round2(rng.gen_range(0.8..3.5)),
        summary: format!("Walk to {} via Main Street", destination),
        provider: "demo".to_string(),
        steps: steps([
            "Head north",
            "Turn right at the second intersection",
            "Continue for 500 meters",
            "Destination on your left",
        ]),
    };
    let drive = RouteOption {
        mode: RouteMode::Driving,
        duration_min: rng.gen_range(5..=20),
        distance_km: round2(rng.gen_range(1.0..5.0)),
        summary: format!("Drive to {} via Central Ave", destination),
        provider: "demo".to_string(),
        steps: steps([
            "Start driving east",
            "Merge onto Central Ave",
            "Take exit 3 toward Downtown",
            "Arrive at destination",
        ]),
    };
    let transit = RouteOption {
        mode: RouteMode::Transit,
        duration_min: rng.gen_range(12..=40),
        distance_km: round2(rng.gen_range(1.2..6.0)),
        summary: format!("Bus 24 to {} then 3-minute walk", destination),
        provider: "demo".to_string(),
        steps: steps([
            "Walk to Bus Stop A",
            "Take Bus 24 for 3 stops",
            "Walk 200 meters south",
            "Destination on your right",
        ]),
    };

    vec![walk, drive, transit]
}

/// Live-first catalog with demo fallback
pub struct RoutePlanner {
    demo_mode: bool,
    directions: Option<DirectionsClient>,
    timeout: Duration,
}

impl RoutePlanner {
    pub fn new(config: &Config, demo_mode: bool) -> Self {
        let timeout = config.request_timeout();
        let directions = match config.google_api_key() {
            Some(key) if !demo_mode => match DirectionsClient::new(key, timeout) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "directions_client_init_failed");
                    None
                }
            },
            _ => None,
        };
        Self { demo_mode, directions, timeout }
    }

    /// True when requests will go to a live provider
    pub fn is_live(&self) -> bool {
        !self.demo_mode && self.directions.is_some()
    }

    async fn live_routes(
        &self,
        client: &DirectionsClient,
        origin: &str,
        destination: &str,
    ) -> Result<Vec<RouteOption>, RouteError> {
        // One request per mode, each bounded by the client timeout
        let budget = self.timeout * 2;
        tokio::time::timeout(budget, client.routes(origin, destination))
            .await
            .map_err(|_| RouteError::Timeout(budget))?
    }
}

#[async_trait]
impl RouteCatalog for RoutePlanner {
    async fn get_routes(&self, origin: &str, destination: &str) -> Vec<RouteOption> {
        let Some(client) = self.directions.as_ref().filter(|_| !self.demo_mode) else {
            return demo_routes(destination);
        };

        match self.live_routes(client, origin, destination).await {
            Ok(options) if !options.is_empty() => {
                info!(provider = "google", options = %options.len(), "routes_fetched");
                options
            }
            Ok(_) => {
                warn!(provider = "google", "routes_empty_using_demo");
                demo_routes(destination)
            }
            Err(e) => {
                warn!(provider = "google", error = %e, "routes_failed_using_demo");
                demo_routes(destination)
            }
        }
    }
}
