//! Guidance session state
//!
//! A `GuidanceSession` is created once a route is chosen and is owned by the
//! orchestrator alone. Nothing here is shared with the obstacle monitor.

use crate::domain::route::RouteOption;
use std::fmt;

/// States of the guidance state machine
///
/// `Presenting → AwaitingStart → Guiding ⇄ Paused → Arrived`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuidanceState {
    Presenting,
    AwaitingStart,
    Guiding,
    Paused,
    Arrived,
}

impl GuidanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuidanceState::Presenting => "presenting",
            GuidanceState::AwaitingStart => "awaiting_start",
            GuidanceState::Guiding => "guiding",
            GuidanceState::Paused => "paused",
            GuidanceState::Arrived => "arrived",
        }
    }
}

impl fmt::Display for GuidanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable countdown for one chosen route
#[derive(Debug, Clone)]
pub struct GuidanceSession {
    route: RouteOption,
    remaining_minutes: u32,
    paused: bool,
}

impl GuidanceSession {
    pub fn new(route: RouteOption) -> Self {
        let remaining_minutes = route.duration_min;
        Self { route, remaining_minutes, paused: false }
    }

    pub fn route(&self) -> &RouteOption {
        &self.route
    }

    pub fn remaining_minutes(&self) -> u32 {
        self.remaining_minutes
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_minutes == 0
    }

    /// Count down one minute, saturating at zero
    pub fn tick(&mut self) {
        self.remaining_minutes = self.remaining_minutes.saturating_sub(1);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }
}
