//! IO modules - external collaborators
//!
//! This module contains every backend the guidance core talks to:
//! - `voice` - spoken/typed input-output channel
//! - `directions` - Google Directions HTTP client
//! - `geolocate` - approximate origin via IP geolocation
//! - `detector` - obstacle detectors polled by the obstacle monitor

pub mod detector;
pub mod directions;
pub mod geolocate;
pub mod voice;

// Re-export commonly used types
pub use detector::{probe_detector, CommandDetector, Detector, HeuristicDetector, CAMERA_UNAVAILABLE};
pub use directions::{DirectionsClient, RouteError};
pub use geolocate::{resolve_origin, IpLocator, Locator, Origin};
pub use voice::{probe_voice, LocalVoice, TranscriptVoice, VoiceChannel};
