//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, environment, timing)
//! - `metrics` - Lock-free session counters

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, Timing};
pub use metrics::{Metrics, MetricsSummary};
