//! MPQ engine library
//!
//! Media period queue with ad insertion resolution, plus a deterministic
//! playback simulator driving it over a static timeline.

pub mod config;
pub mod error;
pub mod queue;
pub mod sim;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use queue::{MediaPeriodId, MediaPeriodInfo, MediaPeriodQueue, PlaybackPosition, ReadPosition};
pub use sim::{PlaybackEvent, Simulator};
