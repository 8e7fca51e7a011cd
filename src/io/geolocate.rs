//! Approximate origin via coarse IP geolocation

use crate::infra::config::Config;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const GEOLOCATION_URL: &str = "https://ipapi.co/json/";
const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the session starts from
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    /// Human-readable place ("Reykjavik, Capital Region, Iceland")
    pub display: String,
    /// True when the place came from a lookup and is worth announcing
    pub detected: bool,
}

impl Origin {
    pub fn detected(display: impl Into<String>) -> Self {
        Self { display: display.into(), detected: true }
    }

    pub fn fallback(display: impl Into<String>) -> Self {
        Self { display: display.into(), detected: false }
    }
}

impl Default for Origin {
    fn default() -> Self {
        Self::fallback("current location")
    }
}

#[derive(Debug, Default, Deserialize)]
struct IpLocation {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

impl IpLocation {
    fn display(&self) -> String {
        [&self.city, &self.region, &self.country_name]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Source of the session origin, consulted after the greeting
#[async_trait]
pub trait Locator: Send + Sync {
    async fn locate(&self) -> Origin;
}

/// IP lookup with the configured fallback city
pub struct IpLocator {
    lookup: bool,
    default_city: Option<String>,
}

impl IpLocator {
    pub fn new(config: &Config) -> Self {
        Self { lookup: config.geolocate(), default_city: config.default_city().map(str::to_string) }
    }
}

#[async_trait]
impl Locator for IpLocator {
    async fn locate(&self) -> Origin {
        resolve_origin(self.lookup, self.default_city.as_deref()).await
    }
}

/// Resolve the origin: IP lookup, then the configured default city, then a placeholder
pub async fn resolve_origin(lookup: bool, default_city: Option<&str>) -> Origin {
    if lookup {
        if let Some(display) = approximate_location().await {
            return Origin::detected(display);
        }
    }
    match default_city {
        Some(city) => Origin::fallback(city),
        None => Origin::default(),
    }
}

async fn approximate_location() -> Option<String> {
    let client = match reqwest::Client::builder().timeout(GEOLOCATION_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "geolocation_client_failed");
            return None;
        }
    };

    let body = match client.get(GEOLOCATION_URL).send().await {
        Ok(response) if response.status().is_success() => response.text().await.ok()?,
        Ok(response) => {
            debug!(status = %response.status().as_u16(), "geolocation_unavailable");
            return None;
        }
        Err(e) => {
            debug!(error = %e, "geolocation_unavailable");
            return None;
        }
    };

    parse_location(&body)
}

fn parse_location(body: &str) -> Option<String> {
    let location: IpLocation = serde_json::from_str(body).ok()?;
    let display = location.display();
    (!display.is_empty()).then_some(display)
}
