//! Timeline model
//!
//! A timeline is an ordered list of windows (logical content units, e.g. one
//! video) each covering one or more contiguous periods. Periods carry the ad
//! groups scheduled inside them.
//!
//! The [`Timeline`] trait is the read-only view the period queue resolves
//! against. Implementors provide indexed window/period lookup; traversal under
//! a repeat/shuffle policy and default position projection are provided
//! methods built on top of it.

use crate::ads::{AdGroupTime, AdPlaybackState};
use crate::time::TimeUs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identity of a timeline period across timeline updates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodUid(String);

impl PeriodUid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeriodUid {
    fn from(uid: String) -> Self {
        PeriodUid::new(uid)
    }
}

impl From<&str> for PeriodUid {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

/// Repeat policy applied when traversing windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Stop after the last window
    #[default]
    Off,
    /// Repeat the current window forever
    One,
    /// Wrap from the last window back to the first
    All,
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "one" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            other => Err(format!("unknown repeat mode '{}'", other)),
        }
    }
}

/// One window of a timeline
///
/// Returned by value because the default position depends on the projection
/// requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Live or otherwise still-changing window
    pub is_dynamic: bool,

    /// Default start position in window time, `None` if not yet known
    pub default_position_us: Option<TimeUs>,

    /// Window duration, `None` if unknown
    pub duration_us: Option<TimeUs>,

    /// Offset of the window start inside its first period
    pub position_in_first_period_us: TimeUs,

    pub first_period_index: usize,
    pub last_period_index: usize,
}

/// One period of a timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub uid: PeriodUid,

    /// Index of the window containing this period
    pub window_index: usize,

    /// Period duration, `None` if unknown
    pub duration_us: Option<TimeUs>,

    /// Offset of the period start relative to its window start
    pub position_in_window_us: TimeUs,

    pub ad_playback_state: AdPlaybackState,
}

impl Period {
    pub fn ad_group_count(&self) -> usize {
        self.ad_playback_state.ad_group_count()
    }

    /// Ad group at or before `position_us` that still has ads to play
    pub fn ad_group_index_for_position_us(&self, position_us: TimeUs) -> Option<usize> {
        self.ad_playback_state
            .ad_group_index_for_position_us(position_us, self.duration_us)
    }

    /// Ad group strictly after `position_us` that still has ads to play
    pub fn ad_group_index_after_position_us(&self, position_us: TimeUs) -> Option<usize> {
        self.ad_playback_state
            .ad_group_index_after_position_us(position_us, self.duration_us)
    }

    pub fn ad_group_time(&self, ad_group_index: usize) -> AdGroupTime {
        self.ad_playback_state.ad_group(ad_group_index).time
    }

    /// Number of ads in the group, `None` while unknown
    pub fn ad_count_in_ad_group(&self, ad_group_index: usize) -> Option<usize> {
        self.ad_playback_state.ad_group(ad_group_index).count
    }

    pub fn first_ad_index_to_play(&self, ad_group_index: usize) -> usize {
        self.ad_playback_state
            .ad_group(ad_group_index)
            .first_ad_index_to_play()
    }

    pub fn next_ad_index_to_play(&self, ad_group_index: usize, last_played_ad_index: usize) -> usize {
        self.ad_playback_state
            .ad_group(ad_group_index)
            .next_ad_index_to_play(Some(last_played_ad_index))
    }

    pub fn is_ad_available(&self, ad_group_index: usize, ad_index: usize) -> bool {
        self.ad_playback_state.is_ad_available(ad_group_index, ad_index)
    }

    pub fn ad_duration_us(&self, ad_group_index: usize, ad_index: usize) -> Option<TimeUs> {
        self.ad_playback_state
            .ad_group(ad_group_index)
            .duration_us(ad_index)
    }

    pub fn ad_resume_position_us(&self) -> TimeUs {
        self.ad_playback_state.ad_resume_position_us
    }
}

/// Read-only view of a timeline
pub trait Timeline {
    fn window_count(&self) -> usize;

    /// Window at `window_index`
    ///
    /// `default_position_projection_us` asks dynamic windows to project their
    /// default position that far into the future. Static windows ignore it.
    fn window(&self, window_index: usize, default_position_projection_us: TimeUs) -> Window;

    fn period_count(&self) -> usize;

    fn period(&self, period_index: usize) -> &Period;

    /// Index of the period with `uid`, `None` if it is no longer part of the timeline
    fn index_of_period(&self, uid: &PeriodUid) -> Option<usize>;

    fn is_empty(&self) -> bool {
        self.window_count() == 0
    }

    fn first_window_index(&self, _shuffle_mode_enabled: bool) -> Option<usize> {
        (!self.is_empty()).then_some(0)
    }

    fn last_window_index(&self, _shuffle_mode_enabled: bool) -> Option<usize> {
        self.window_count().checked_sub(1)
    }

    /// Window played after `window_index`, `None` at the end of playback
    fn next_window_index(
        &self,
        window_index: usize,
        repeat_mode: RepeatMode,
        shuffle_mode_enabled: bool,
    ) -> Option<usize> {
        let is_last = Some(window_index) == self.last_window_index(shuffle_mode_enabled);
        match repeat_mode {
            RepeatMode::Off => (!is_last).then_some(window_index + 1),
            RepeatMode::One => Some(window_index),
            RepeatMode::All if is_last => self.first_window_index(shuffle_mode_enabled),
            RepeatMode::All => Some(window_index + 1),
        }
    }

    /// Period played after `period_index`, crossing window boundaries as needed
    fn next_period_index(
        &self,
        period_index: usize,
        repeat_mode: RepeatMode,
        shuffle_mode_enabled: bool,
    ) -> Option<usize> {
        let window_index = self.period(period_index).window_index;
        if self.window(window_index, 0).last_period_index == period_index {
            let next_window_index =
                self.next_window_index(window_index, repeat_mode, shuffle_mode_enabled)?;
            return Some(self.window(next_window_index, 0).first_period_index);
        }
        Some(period_index + 1)
    }

    fn is_last_period(
        &self,
        period_index: usize,
        repeat_mode: RepeatMode,
        shuffle_mode_enabled: bool,
    ) -> bool {
        self.next_period_index(period_index, repeat_mode, shuffle_mode_enabled)
            .is_none()
    }

    fn period_by_uid(&self, uid: &PeriodUid) -> Option<&Period> {
        self.index_of_period(uid).map(|index| self.period(index))
    }

    /// Convert a window position into a `(period uid, period position)` pair
    ///
    /// With `window_position_us` of `None` the window's default position is
    /// used, projected by `default_position_projection_us`. Returns `None` when
    /// that default position is not known yet.
    fn period_position(
        &self,
        window_index: usize,
        window_position_us: Option<TimeUs>,
        default_position_projection_us: TimeUs,
    ) -> Option<(PeriodUid, TimeUs)> {
        let window = self.window(window_index, default_position_projection_us);
        let window_position_us = match window_position_us {
            Some(position_us) => position_us,
            None => window.default_position_us?,
        };
        let mut period_index = window.first_period_index;
        let mut period_position_us = window.position_in_first_period_us + window_position_us;
        let mut period_duration_us = self.period(period_index).duration_us;
        while let Some(duration_us) = period_duration_us {
            if period_position_us < duration_us || period_index >= window.last_period_index {
                break;
            }
            period_position_us -= duration_us;
            period_index += 1;
            period_duration_us = self.period(period_index).duration_us;
        }
        Some((self.period(period_index).uid.clone(), period_position_us))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_mode_from_str() {
        assert_eq!("off".parse::<RepeatMode>(), Ok(RepeatMode::Off));
        assert_eq!("ONE".parse::<RepeatMode>(), Ok(RepeatMode::One));
        assert_eq!("All".parse::<RepeatMode>(), Ok(RepeatMode::All));
        assert!("sometimes".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn test_period_uid_display() {
        let uid = PeriodUid::from("period-1");
        assert_eq!(uid.to_string(), "period-1");
        assert_eq!(uid.as_str(), "period-1");
    }
}
