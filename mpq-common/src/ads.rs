//! Ad insertion state of a timeline period
//!
//! An [`AdPlaybackState`] lists the ad groups scheduled in one period, in
//! increasing position order with an optional postroll last. Every query is
//! answered from the per-ad [`AdState`] values, so marking ads played or
//! skipped changes what the period queue resolves next.
//!
//! Values are immutable by convention: the `with_*` methods consume `self`
//! and return the updated state, which is how a timeline source publishes a
//! new ad state alongside a new timeline.

use crate::time::TimeUs;
use serde::{Deserialize, Serialize};

/// Playback state of a single ad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdState {
    /// Ad media is not known yet
    Unavailable,
    /// Ad media is known and can be played
    Available,
    /// Ad was skipped by the user or the ad loader
    Skipped,
    /// Ad was played to completion
    Played,
    /// Ad failed to load
    Error,
}

impl AdState {
    /// True while the ad may still be played
    pub fn is_playable_later(self) -> bool {
        matches!(self, AdState::Unavailable | AdState::Available)
    }
}

/// Scheduled position of an ad group in its period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdGroupTime {
    /// Midroll or preroll at a period position (preroll at zero)
    At(TimeUs),
    /// Postroll, played once content reaches the end of the source
    EndOfSource,
}

/// A set of ads scheduled at one position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdGroup {
    /// Scheduled position
    pub time: AdGroupTime,

    /// Number of ads, `None` while the ad loader has not reported it
    pub count: Option<usize>,

    /// State of each ad (grown on demand up to `count`)
    pub states: Vec<AdState>,

    /// Duration of each ad, `None` while unknown
    pub durations_us: Vec<Option<TimeUs>>,
}

impl AdGroup {
    /// Create an ad group with an unknown number of ads
    pub fn new(time: AdGroupTime) -> Self {
        Self {
            time,
            count: None,
            states: Vec::new(),
            durations_us: Vec::new(),
        }
    }

    /// Index of the first ad that may still be played
    ///
    /// Returns `count` (or the known state length) when every ad is finished.
    pub fn first_ad_index_to_play(&self) -> usize {
        self.next_ad_index_to_play(None)
    }

    /// Index of the next ad to play after `last_played_ad_index`
    pub fn next_ad_index_to_play(&self, last_played_ad_index: Option<usize>) -> usize {
        let mut index = last_played_ad_index.map_or(0, |last| last + 1);
        while index < self.states.len() && !self.states[index].is_playable_later() {
            index += 1;
        }
        index
    }

    /// True while the count is unknown or some ad has not finished
    pub fn has_unplayed_ads(&self) -> bool {
        match self.count {
            None => true,
            Some(count) => self.first_ad_index_to_play() < count,
        }
    }

    /// State of the ad at `ad_index`, `Unavailable` when not reported yet
    pub fn state(&self, ad_index: usize) -> AdState {
        self.states
            .get(ad_index)
            .copied()
            .unwrap_or(AdState::Unavailable)
    }

    /// Duration of the ad at `ad_index`
    pub fn duration_us(&self, ad_index: usize) -> Option<TimeUs> {
        self.durations_us.get(ad_index).copied().flatten()
    }

    fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self.states.resize(count, AdState::Unavailable);
        self.durations_us.resize(count, None);
        self
    }

    fn with_state(mut self, state: AdState, ad_index: usize) -> Self {
        assert!(
            self.count.map_or(true, |count| ad_index < count),
            "ad index {} out of range for ad group of {:?} ads",
            ad_index,
            self.count
        );
        if self.states.len() <= ad_index {
            self.states.resize(ad_index + 1, AdState::Unavailable);
            self.durations_us.resize(ad_index + 1, None);
        }
        self.states[ad_index] = state;
        self
    }

    fn with_all_skipped(mut self) -> Self {
        if self.count.is_none() {
            return Self {
                time: self.time,
                count: Some(0),
                states: Vec::new(),
                durations_us: Vec::new(),
            };
        }
        for state in &mut self.states {
            if state.is_playable_later() {
                *state = AdState::Skipped;
            }
        }
        self
    }

    fn is_position_before(&self, position_us: TimeUs, period_duration_us: Option<TimeUs>) -> bool {
        match self.time {
            AdGroupTime::EndOfSource => period_duration_us.map_or(true, |d| position_us < d),
            AdGroupTime::At(time_us) => position_us < time_us,
        }
    }
}

/// Ad groups of one timeline period
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdPlaybackState {
    /// Ad groups ordered by position, postroll last
    pub ad_groups: Vec<AdGroup>,

    /// Position to resume an interrupted ad from
    pub ad_resume_position_us: TimeUs,
}

impl AdPlaybackState {
    /// State for a period without ads
    pub fn none() -> Self {
        Self::default()
    }

    /// Create a state with one empty ad group per scheduled time
    pub fn new(times: &[AdGroupTime]) -> Self {
        Self {
            ad_groups: times.iter().map(|t| AdGroup::new(*t)).collect(),
            ad_resume_position_us: 0,
        }
    }

    pub fn ad_group_count(&self) -> usize {
        self.ad_groups.len()
    }

    pub fn ad_group(&self, ad_group_index: usize) -> &AdGroup {
        &self.ad_groups[ad_group_index]
    }

    /// Latest ad group at or before `position_us` that still has ads to play
    ///
    /// An ad group scheduled exactly at `position_us` counts as reached.
    pub fn ad_group_index_for_position_us(
        &self,
        position_us: TimeUs,
        period_duration_us: Option<TimeUs>,
    ) -> Option<usize> {
        // Linear scan: the postroll breaks ordering by time.
        let mut index = self.ad_groups.len();
        while index > 0 && self.ad_groups[index - 1].is_position_before(position_us, period_duration_us) {
            index -= 1;
        }
        let index = index.checked_sub(1)?;
        self.ad_groups[index].has_unplayed_ads().then_some(index)
    }

    /// Ad group reached once content plays to the end of the source
    pub fn ad_group_index_for_end_of_source(&self) -> Option<usize> {
        let index = self.ad_groups.len().checked_sub(1)?;
        self.ad_groups[index].has_unplayed_ads().then_some(index)
    }

    /// First ad group strictly after `position_us` that still has ads to play
    pub fn ad_group_index_after_position_us(
        &self,
        position_us: TimeUs,
        period_duration_us: Option<TimeUs>,
    ) -> Option<usize> {
        if period_duration_us.map_or(false, |d| position_us >= d) {
            return None;
        }
        self.ad_groups.iter().position(|group| {
            let reached = match group.time {
                AdGroupTime::At(time_us) => time_us <= position_us,
                AdGroupTime::EndOfSource => false,
            };
            !reached && group.has_unplayed_ads()
        })
    }

    /// True if the ad is known and playable
    pub fn is_ad_available(&self, ad_group_index: usize, ad_index: usize) -> bool {
        let group = &self.ad_groups[ad_group_index];
        group.count.map_or(false, |count| ad_index < count)
            && group.state(ad_index) == AdState::Available
    }

    pub fn with_ad_count(mut self, ad_group_index: usize, count: usize) -> Self {
        let group = self.ad_groups[ad_group_index].clone();
        self.ad_groups[ad_group_index] = group.with_count(count);
        self
    }

    pub fn with_available_ad(self, ad_group_index: usize, ad_index: usize) -> Self {
        self.with_ad_state(ad_group_index, ad_index, AdState::Available)
    }

    pub fn with_played_ad(self, ad_group_index: usize, ad_index: usize) -> Self {
        self.with_ad_state(ad_group_index, ad_index, AdState::Played)
    }

    pub fn with_skipped_ad(self, ad_group_index: usize, ad_index: usize) -> Self {
        self.with_ad_state(ad_group_index, ad_index, AdState::Skipped)
    }

    pub fn with_ad_load_error(self, ad_group_index: usize, ad_index: usize) -> Self {
        self.with_ad_state(ad_group_index, ad_index, AdState::Error)
    }

    /// Mark every remaining ad of the group skipped
    pub fn with_skipped_ad_group(mut self, ad_group_index: usize) -> Self {
        let group = self.ad_groups[ad_group_index].clone();
        self.ad_groups[ad_group_index] = group.with_all_skipped();
        self
    }

    pub fn with_ad_durations(mut self, ad_group_index: usize, durations_us: &[Option<TimeUs>]) -> Self {
        let group = &mut self.ad_groups[ad_group_index];
        if group.durations_us.len() < durations_us.len() {
            group.durations_us.resize(durations_us.len(), None);
            group.states.resize(durations_us.len(), AdState::Unavailable);
        }
        group.durations_us[..durations_us.len()].copy_from_slice(durations_us);
        self
    }

    pub fn with_ad_resume_position_us(mut self, ad_resume_position_us: TimeUs) -> Self {
        self.ad_resume_position_us = ad_resume_position_us;
        self
    }

    fn with_ad_state(mut self, ad_group_index: usize, ad_index: usize, state: AdState) -> Self {
        let group = self.ad_groups[ad_group_index].clone();
        self.ad_groups[ad_group_index] = group.with_state(state, ad_index);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn midroll_at_100() -> AdPlaybackState {
        AdPlaybackState::new(&[AdGroupTime::At(100)])
            .with_ad_count(0, 2)
            .with_available_ad(0, 0)
            .with_available_ad(0, 1)
    }

    #[test]
    fn test_group_reached_at_its_own_position() {
        let state = midroll_at_100();
        assert_eq!(state.ad_group_index_for_position_us(99, Some(1000)), None);
        assert_eq!(state.ad_group_index_for_position_us(100, Some(1000)), Some(0));
        assert_eq!(state.ad_group_index_for_position_us(500, Some(1000)), Some(0));
    }

    #[test]
    fn test_group_after_position_is_strictly_after() {
        let state = midroll_at_100();
        assert_eq!(state.ad_group_index_after_position_us(50, Some(1000)), Some(0));
        assert_eq!(state.ad_group_index_after_position_us(100, Some(1000)), None);
    }

    #[test]
    fn test_played_group_is_ignored() {
        let state = midroll_at_100().with_played_ad(0, 0).with_played_ad(0, 1);
        assert!(!state.ad_group(0).has_unplayed_ads());
        assert_eq!(state.ad_group_index_for_position_us(200, Some(1000)), None);
        assert_eq!(state.ad_group_index_after_position_us(50, Some(1000)), None);
    }

    #[test]
    fn test_unknown_count_has_unplayed_ads() {
        let state = AdPlaybackState::new(&[AdGroupTime::At(0)]);
        assert!(state.ad_group(0).has_unplayed_ads());
        assert!(!state.is_ad_available(0, 0));
        assert_eq!(state.ad_group_index_for_position_us(0, None), Some(0));
    }

    #[test]
    fn test_next_ad_index_skips_finished_ads() {
        let state = AdPlaybackState::new(&[AdGroupTime::At(0)])
            .with_ad_count(0, 3)
            .with_played_ad(0, 0)
            .with_skipped_ad(0, 1);
        let group = state.ad_group(0);
        assert_eq!(group.first_ad_index_to_play(), 2);
        assert_eq!(group.next_ad_index_to_play(Some(2)), 3);
    }

    #[test]
    fn test_skipped_group_with_unknown_count() {
        let state = AdPlaybackState::new(&[AdGroupTime::At(0)]).with_skipped_ad_group(0);
        assert_eq!(state.ad_group(0).count, Some(0));
        assert!(!state.ad_group(0).has_unplayed_ads());
    }

    #[test]
    fn test_postroll_positions() {
        let state = AdPlaybackState::new(&[AdGroupTime::EndOfSource])
            .with_ad_count(0, 1)
            .with_available_ad(0, 0);
        // A postroll always lies ahead of content positions.
        assert_eq!(state.ad_group_index_after_position_us(10, Some(1000)), Some(0));
        assert_eq!(state.ad_group_index_for_position_us(10, Some(1000)), None);
        assert_eq!(state.ad_group_index_for_position_us(1000, Some(1000)), Some(0));
        assert_eq!(state.ad_group_index_for_end_of_source(), Some(0));
    }

    #[test]
    fn test_ad_durations() {
        let state = midroll_at_100().with_ad_durations(0, &[Some(30), None]);
        assert_eq!(state.ad_group(0).duration_us(0), Some(30));
        assert_eq!(state.ad_group(0).duration_us(1), None);
        assert_eq!(state.ad_group(0).duration_us(7), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_state_outside_count_panics() {
        let _ = midroll_at_100().with_played_ad(0, 5);
    }
}
