//! Media period queue
//!
//! Tracks the media periods being played, read, and loaded, and decides which
//! media period (content or ad) comes next.

pub mod holder;
pub mod media_period_queue;
pub mod period_id;
pub mod period_info;

pub use holder::{BufferedPosition, HolderId, MediaPeriod, MediaPeriodHolder, MediaSource};
pub use media_period_queue::{
    Iter, MediaPeriodQueue, PlaybackPosition, ReadPosition, MAXIMUM_BUFFER_AHEAD_PERIODS,
};
pub use period_id::{MediaPeriodId, PeriodKind};
pub use period_info::MediaPeriodInfo;
