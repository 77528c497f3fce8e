//! Media period descriptor

use super::period_id::MediaPeriodId;
use mpq_common::time::{format_opt_us, format_us};
use mpq_common::{EndPosition, TimeUs};
use serde::Serialize;
use std::fmt;

/// Immutable description of one queued media period
///
/// Holders get a new value when the timeline changes; fields are never
/// patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPeriodInfo {
    pub id: MediaPeriodId,

    /// Start position in period time
    pub start_position_us: TimeUs,

    /// Content position requested by the player; for ads this is the position
    /// content resumes from afterwards. `None` means the window default.
    pub requested_content_position_us: Option<TimeUs>,

    /// Where the media period stops within its timeline period
    pub end_position: EndPosition,

    /// Duration in period time, `None` if unknown
    pub duration_us: Option<TimeUs>,

    /// Last media period of its timeline period
    pub is_last_in_timeline_period: bool,

    /// Last media period of its window
    pub is_last_in_timeline_window: bool,

    /// Last media period of the whole timeline under the current repeat and
    /// shuffle policy; nothing is loaded after it
    pub is_final: bool,
}

impl MediaPeriodInfo {
    /// Copy with a different requested content position
    pub fn copy_with_requested_content_position_us(
        &self,
        requested_content_position_us: Option<TimeUs>,
    ) -> Self {
        Self {
            requested_content_position_us,
            ..self.clone()
        }
    }
}

impl fmt::Display for MediaPeriodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} start={} end={} duration={}{}",
            self.id,
            format_us(self.start_position_us),
            self.end_position,
            format_opt_us(self.duration_us),
            if self.is_final { " final" } else { "" }
        )
    }
}
