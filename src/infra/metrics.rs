//! Lock-free session metrics
//!
//! Counters are updated from both the guidance loop and the obstacle monitor
//! worker. All atomics use Relaxed ordering: these are statistical counters
//! only and never take part in coordination (that is `ObstacleSignal`'s job).

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Detector poll latency bucket boundaries (microseconds)
/// Buckets: ≤100, ≤1000, ≤10000, ≤100000, ≤250000, >250000
const POLL_BUCKET_BOUNDS: [u64; 5] = [100, 1_000, 10_000, 100_000, 250_000];
pub const POLL_NUM_BUCKETS: usize = 6;

#[inline]
fn poll_bucket_index(latency_us: u64) -> usize {
    POLL_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Session metrics collector
#[derive(Debug, Default)]
pub struct Metrics {
    /// Detector polls completed
    detector_polls: AtomicU64,
    /// Detections that raised the obstacle signal
    alerts_raised: AtomicU64,
    /// Detections while the signal was already raised
    alerts_coalesced: AtomicU64,
    /// Max detector poll latency in microseconds
    poll_latency_max_us: AtomicU64,
    /// Detector poll latency histogram
    poll_latency_buckets: [AtomicU64; POLL_NUM_BUCKETS],
    /// Guidance countdown ticks
    guidance_ticks: AtomicU64,
    /// Obstacle pauses taken by the guidance loop
    pauses: AtomicU64,
    /// Times the monitor had to be abandoned after its stop grace period
    monitor_stop_timeouts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_poll(&self, latency_us: u64) {
        self.detector_polls.fetch_add(1, Ordering::Relaxed);
        self.poll_latency_buckets[poll_bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.poll_latency_max_us, latency_us);
    }

    /// Record a detection; `raised` is false when the latch was already set
    #[inline]
    pub fn record_alert(&self, raised: bool) {
        if raised {
            self.alerts_raised.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alerts_coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_tick(&self) {
        self.guidance_ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pause(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_monitor_stop_timeout(&self) {
        self.monitor_stop_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn detector_polls(&self) -> u64 {
        self.detector_polls.load(Ordering::Relaxed)
    }

    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }

    pub fn alerts_coalesced(&self) -> u64 {
        self.alerts_coalesced.load(Ordering::Relaxed)
    }

    pub fn guidance_ticks(&self) -> u64 {
        self.guidance_ticks.load(Ordering::Relaxed)
    }

    pub fn pauses(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }

    /// Snapshot all counters
    pub fn report(&self) -> MetricsSummary {
        let mut poll_buckets = [0u64; POLL_NUM_BUCKETS];
        for (slot, bucket) in poll_buckets.iter_mut().zip(self.poll_latency_buckets.iter()) {
            *slot = bucket.load(Ordering::Relaxed);
        }
        MetricsSummary {
            detector_polls: self.detector_polls(),
            alerts_raised: self.alerts_raised(),
            alerts_coalesced: self.alerts_coalesced(),
            poll_latency_max_us: self.poll_latency_max_us.load(Ordering::Relaxed),
            poll_buckets,
            guidance_ticks: self.guidance_ticks(),
            pauses: self.pauses(),
            monitor_stop_timeouts: self.monitor_stop_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the session counters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub detector_polls: u64,
    pub alerts_raised: u64,
    pub alerts_coalesced: u64,
    pub poll_latency_max_us: u64,
    /// Bounds: ≤100, ≤1000, ≤10000, ≤100000, ≤250000, >250000 µs
    pub poll_buckets: [u64; POLL_NUM_BUCKETS],
    pub guidance_ticks: u64,
    pub pauses: u64,
    pub monitor_stop_timeouts: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            detector_polls = %self.detector_polls,
            alerts_raised = %self.alerts_raised,
            alerts_coalesced = %self.alerts_coalesced,
            poll_latency_max_us = %self.poll_latency_max_us,
            poll_buckets = ?self.poll_buckets,
            guidance_ticks = %self.guidance_ticks,
            pauses = %self.pauses,
            monitor_stop_timeouts = %self.monitor_stop_timeouts,
            "session_metrics"
        );
    }
}
