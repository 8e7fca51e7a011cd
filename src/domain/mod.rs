//! Domain models - route options and guidance session state
//!
//! This module contains the canonical data types used throughout the system:
//! - `RouteOption` - one candidate route returned by a catalog
//! - `RouteMode` - walking, driving or transit
//! - `GuidanceSession` - the countdown owned by the orchestrator
//! - `GuidanceState` - states of the guidance state machine
//! - `eta` - spoken time phrasing

pub mod eta;
pub mod route;
pub mod session;

pub use route::{RouteMode, RouteOption};
pub use session::{GuidanceSession, GuidanceState};
