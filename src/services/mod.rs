//! Services - the guidance core
//!
//! This module contains the session logic:
//! - `orchestrator` - Guidance state machine driving one session
//! - `selection` - Resolving a spoken answer to one route option
//! - `monitor` - Background obstacle polling worker
//! - `signal` - Obstacle latch shared by the orchestrator and the monitor
//! - `catalog` - Route option sources (live provider with demo fallback)

pub mod catalog;
pub mod monitor;
pub mod orchestrator;
pub mod selection;
pub mod signal;

// Re-export commonly used types
pub use catalog::{demo_routes, DemoCatalog, RouteCatalog, RoutePlanner};
pub use monitor::{MonitorScope, ObstacleMonitor, StopOutcome, VISION_STARTED, VISION_STOPPED};
pub use orchestrator::{
    Cancelled, GuidanceOrchestrator, SessionOutcome, SessionReport, SessionRequest,
};
pub use selection::{Selection, SelectionRule};
pub use signal::ObstacleSignal;
