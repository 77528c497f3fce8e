//! # MPQ Common Library
//!
//! Shared code for the media period queue crates including:
//! - Timeline model (windows, periods, ad groups) and the `Timeline` trait
//! - In-memory `StaticTimeline` and its TOML description format
//! - Configuration file resolution
//! - Time value helpers

pub mod ads;
pub mod config;
pub mod error;
pub mod static_timeline;
pub mod time;
pub mod timeline;

pub use ads::{AdGroup, AdGroupTime, AdPlaybackState, AdState};
pub use error::{Error, Result};
pub use static_timeline::StaticTimeline;
pub use time::{EndPosition, TimeUs};
pub use timeline::{Period, PeriodUid, RepeatMode, Timeline, Window};
