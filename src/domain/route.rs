//! Route options produced by a catalog and their spoken descriptions

use crate::domain::eta::minutes_to_eta_str;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a route is travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Walking,
    Driving,
    Transit,
}

impl RouteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMode::Walking => "walking",
            RouteMode::Driving => "driving",
            RouteMode::Transit => "transit",
        }
    }

    /// Map a spoken keyword to a mode ("car" → driving, "bus" → transit, ...)
    pub fn from_keyword(token: &str) -> Option<Self> {
        match token {
            "walk" | "walking" => Some(RouteMode::Walking),
            "drive" | "driving" | "car" => Some(RouteMode::Driving),
            "bus" | "transit" | "public" => Some(RouteMode::Transit),
            _ => None,
        }
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate way to travel from origin to destination
///
/// Immutable once built by a catalog; a session clones the chosen one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOption {
    pub mode: RouteMode,
    /// Estimated travel time, always > 0
    pub duration_min: u32,
    pub distance_km: f64,
    pub summary: String,
    /// Source of the option ("demo", "google")
    pub provider: String,
    /// Ordered turn-by-turn instructions, never empty
    pub steps: Vec<String>,
}

impl RouteOption {
    /// Spoken one-line description used when presenting options
    pub fn describe(&self) -> String {
        format!(
            "{} takes {}, about {} kilometers, via {}.",
            self.mode,
            minutes_to_eta_str(i64::from(self.duration_min)),
            self.distance_km,
            self.summary
        )
    }
}
