//! In-memory timeline
//!
//! `StaticTimeline` is a fully materialised [`Timeline`]: a list of windows,
//! each made of periods laid end to end, with an optional shuffle order. It is
//! built either programmatically from [`WindowDefinition`]s or from a TOML
//! timeline description:
//!
//! ```toml
//! shuffle_order = [1, 0]
//!
//! [[windows]]
//! duration_us = 10_000_000
//!
//! [[windows.periods]]
//! uid = "episode-1"
//! duration_us = 10_000_000
//!
//! [[windows.periods.ad_groups]]
//! time_us = 0
//! count = 1
//! available = [0]
//! durations_us = [2_000_000]
//!
//! [[windows]]
//! is_dynamic = true
//!
//! [[windows.periods]]
//! uid = "live"
//! ```

use crate::ads::{AdGroupTime, AdPlaybackState};
use crate::error::{Error, Result};
use crate::time::TimeUs;
use crate::timeline::{Period, PeriodUid, RepeatMode, Timeline, Window};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Definition of one period for [`StaticTimeline::new`]
#[derive(Debug, Clone)]
pub struct PeriodDefinition {
    pub uid: PeriodUid,
    pub duration_us: Option<TimeUs>,
    pub ad_playback_state: AdPlaybackState,
}

impl PeriodDefinition {
    pub fn new(uid: impl Into<PeriodUid>, duration_us: Option<TimeUs>) -> Self {
        Self {
            uid: uid.into(),
            duration_us,
            ad_playback_state: AdPlaybackState::none(),
        }
    }

    pub fn with_ads(mut self, ad_playback_state: AdPlaybackState) -> Self {
        self.ad_playback_state = ad_playback_state;
        self
    }
}

/// Definition of one window for [`StaticTimeline::new`]
#[derive(Debug, Clone)]
pub struct WindowDefinition {
    pub is_dynamic: bool,

    /// Default start position in window time (`None` = not yet known)
    pub default_position_us: Option<TimeUs>,

    /// Window duration; derived from the periods when they are all known
    pub duration_us: Option<TimeUs>,

    pub periods: Vec<PeriodDefinition>,
}

impl WindowDefinition {
    /// Static window starting at zero, covering `periods`
    pub fn new(periods: Vec<PeriodDefinition>) -> Self {
        Self {
            is_dynamic: false,
            default_position_us: Some(0),
            duration_us: None,
            periods,
        }
    }

    /// Single-period window
    pub fn single(uid: impl Into<PeriodUid>, duration_us: Option<TimeUs>) -> Self {
        Self::new(vec![PeriodDefinition::new(uid, duration_us)])
    }

    pub fn dynamic(mut self) -> Self {
        self.is_dynamic = true;
        self
    }

    pub fn with_default_position_us(mut self, default_position_us: Option<TimeUs>) -> Self {
        self.default_position_us = default_position_us;
        self
    }

    pub fn with_duration_us(mut self, duration_us: Option<TimeUs>) -> Self {
        self.duration_us = duration_us;
        self
    }
}

#[derive(Debug, Clone)]
struct WindowEntry {
    is_dynamic: bool,
    default_position_us: Option<TimeUs>,
    duration_us: Option<TimeUs>,
    first_period_index: usize,
    last_period_index: usize,
}

/// Fully materialised timeline
#[derive(Debug, Clone)]
pub struct StaticTimeline {
    windows: Vec<WindowEntry>,
    periods: Vec<Period>,
    shuffle_order: Option<Vec<usize>>,
}

impl StaticTimeline {
    /// Build a timeline from window definitions
    ///
    /// Fails if a window has no periods or a period uid appears twice.
    pub fn new(windows: Vec<WindowDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut window_entries = Vec::with_capacity(windows.len());
        let mut periods = Vec::new();

        for (window_index, definition) in windows.into_iter().enumerate() {
            if definition.periods.is_empty() {
                return Err(Error::InvalidTimeline(format!(
                    "window {} has no periods",
                    window_index
                )));
            }
            let first_period_index = periods.len();
            let mut position_in_window_us = 0;
            let mut summed_duration_us = Some(0);
            for period in definition.periods {
                if !seen.insert(period.uid.clone()) {
                    return Err(Error::InvalidTimeline(format!(
                        "duplicate period uid '{}'",
                        period.uid
                    )));
                }
                periods.push(Period {
                    uid: period.uid,
                    window_index,
                    duration_us: period.duration_us,
                    position_in_window_us,
                    ad_playback_state: period.ad_playback_state,
                });
                summed_duration_us = summed_duration_us
                    .zip(period.duration_us)
                    .map(|(total, d)| total + d);
                position_in_window_us += period.duration_us.unwrap_or(0);
            }
            window_entries.push(WindowEntry {
                is_dynamic: definition.is_dynamic,
                default_position_us: definition.default_position_us,
                duration_us: definition.duration_us.or(summed_duration_us),
                first_period_index,
                last_period_index: periods.len() - 1,
            });
        }

        debug!(
            "Built timeline with {} windows, {} periods",
            window_entries.len(),
            periods.len()
        );
        Ok(Self {
            windows: window_entries,
            periods,
            shuffle_order: None,
        })
    }

    /// Timeline with no windows
    pub fn empty() -> Self {
        Self {
            windows: Vec::new(),
            periods: Vec::new(),
            shuffle_order: None,
        }
    }

    /// Use `order` as the window order while shuffle mode is enabled
    ///
    /// `order` must be a permutation of the window indices.
    pub fn with_shuffle_order(mut self, order: Vec<usize>) -> Result<Self> {
        let mut sorted = order.clone();
        sorted.sort_unstable();
        if sorted != (0..self.windows.len()).collect::<Vec<_>>() {
            return Err(Error::InvalidTimeline(format!(
                "shuffle order {:?} is not a permutation of {} windows",
                order,
                self.windows.len()
            )));
        }
        self.shuffle_order = Some(order);
        Ok(self)
    }

    /// Copy of this timeline with the ad state of period `uid` replaced
    pub fn with_ad_playback_state(&self, uid: &PeriodUid, ad_playback_state: AdPlaybackState) -> Self {
        let mut timeline = self.clone();
        if let Some(period) = timeline.periods.iter_mut().find(|p| &p.uid == uid) {
            period.ad_playback_state = ad_playback_state;
        }
        timeline
    }

    /// Parse a TOML timeline description
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let description: TimelineDescription = toml::from_str(document)?;
        description.into_timeline()
    }

    /// Load a TOML timeline description from disk
    ///
    /// Parse and validation failures keep their `Toml` / `InvalidTimeline`
    /// variant; callers add the path as context.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading timeline description from {}", path.display());
        let document = std::fs::read_to_string(path)?;
        Self::from_toml_str(&document)
    }

    fn shuffled(&self, shuffle_mode_enabled: bool) -> Option<&[usize]> {
        if shuffle_mode_enabled {
            self.shuffle_order.as_deref()
        } else {
            None
        }
    }
}

impl Timeline for StaticTimeline {
    fn window_count(&self) -> usize {
        self.windows.len()
    }

    fn window(&self, window_index: usize, default_position_projection_us: TimeUs) -> Window {
        let entry = &self.windows[window_index];
        let mut default_position_us = entry.default_position_us;
        if entry.is_dynamic && default_position_projection_us != 0 {
            default_position_us = match (default_position_us, entry.duration_us) {
                (Some(position_us), Some(duration_us)) => {
                    let projected_us = position_us + default_position_projection_us;
                    (projected_us <= duration_us).then_some(projected_us)
                }
                _ => None,
            };
        }
        Window {
            is_dynamic: entry.is_dynamic,
            default_position_us,
            duration_us: entry.duration_us,
            position_in_first_period_us: 0,
            first_period_index: entry.first_period_index,
            last_period_index: entry.last_period_index,
        }
    }

    fn period_count(&self) -> usize {
        self.periods.len()
    }

    fn period(&self, period_index: usize) -> &Period {
        &self.periods[period_index]
    }

    fn index_of_period(&self, uid: &PeriodUid) -> Option<usize> {
        self.periods.iter().position(|p| &p.uid == uid)
    }

    fn first_window_index(&self, shuffle_mode_enabled: bool) -> Option<usize> {
        match self.shuffled(shuffle_mode_enabled) {
            Some(order) => order.first().copied(),
            None => (!self.windows.is_empty()).then_some(0),
        }
    }

    fn last_window_index(&self, shuffle_mode_enabled: bool) -> Option<usize> {
        match self.shuffled(shuffle_mode_enabled) {
            Some(order) => order.last().copied(),
            None => self.windows.len().checked_sub(1),
        }
    }

    fn next_window_index(
        &self,
        window_index: usize,
        repeat_mode: RepeatMode,
        shuffle_mode_enabled: bool,
    ) -> Option<usize> {
        if repeat_mode == RepeatMode::One {
            return Some(window_index);
        }
        let next = match self.shuffled(shuffle_mode_enabled) {
            Some(order) => {
                let position = order.iter().position(|&w| w == window_index)?;
                order.get(position + 1).copied()
            }
            None => (window_index + 1 < self.windows.len()).then_some(window_index + 1),
        };
        match (next, repeat_mode) {
            (Some(next), _) => Some(next),
            (None, RepeatMode::All) => self.first_window_index(shuffle_mode_enabled),
            (None, _) => None,
        }
    }
}

/// Root of a TOML timeline description
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineDescription {
    #[serde(default)]
    pub windows: Vec<WindowDescription>,

    /// Window order used while shuffle mode is enabled
    #[serde(default)]
    pub shuffle_order: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowDescription {
    #[serde(default)]
    pub is_dynamic: bool,

    #[serde(default)]
    pub default_position_us: TimeUs,

    #[serde(default)]
    pub duration_us: Option<TimeUs>,

    pub periods: Vec<PeriodDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodDescription {
    pub uid: String,

    #[serde(default)]
    pub duration_us: Option<TimeUs>,

    #[serde(default)]
    pub ad_resume_position_us: TimeUs,

    #[serde(default)]
    pub ad_groups: Vec<AdGroupDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdGroupDescription {
    /// Scheduled position; omit together with `postroll = true`
    #[serde(default)]
    pub time_us: Option<TimeUs>,

    #[serde(default)]
    pub postroll: bool,

    /// Number of ads; omit while unknown
    #[serde(default)]
    pub count: Option<usize>,

    #[serde(default)]
    pub available: Vec<usize>,

    #[serde(default)]
    pub played: Vec<usize>,

    #[serde(default)]
    pub skipped: Vec<usize>,

    /// Ads that failed to load
    #[serde(default)]
    pub errored: Vec<usize>,

    #[serde(default)]
    pub durations_us: Vec<TimeUs>,
}

impl TimelineDescription {
    /// Validate the description and build the timeline
    pub fn into_timeline(self) -> Result<StaticTimeline> {
        let shuffle_order = self.shuffle_order;
        let windows = self
            .windows
            .into_iter()
            .map(WindowDescription::into_definition)
            .collect::<Result<Vec<_>>>()?;
        let timeline = StaticTimeline::new(windows)?;
        match shuffle_order {
            Some(order) => timeline.with_shuffle_order(order),
            None => Ok(timeline),
        }
    }
}

impl WindowDescription {
    fn into_definition(self) -> Result<WindowDefinition> {
        let periods = self
            .periods
            .into_iter()
            .map(PeriodDescription::into_definition)
            .collect::<Result<Vec<_>>>()?;
        Ok(WindowDefinition {
            is_dynamic: self.is_dynamic,
            default_position_us: Some(self.default_position_us),
            duration_us: self.duration_us,
            periods,
        })
    }
}

impl PeriodDescription {
    fn into_definition(self) -> Result<PeriodDefinition> {
        let mut times = Vec::with_capacity(self.ad_groups.len());
        for (index, group) in self.ad_groups.iter().enumerate() {
            let time = match (group.time_us, group.postroll) {
                (Some(time_us), false) => AdGroupTime::At(time_us),
                (None, true) => AdGroupTime::EndOfSource,
                _ => {
                    return Err(Error::InvalidTimeline(format!(
                        "period '{}' ad group {} needs exactly one of time_us or postroll",
                        self.uid, index
                    )))
                }
            };
            if let (Some(AdGroupTime::At(previous)), AdGroupTime::At(current)) = (times.last(), time) {
                if current <= *previous {
                    return Err(Error::InvalidTimeline(format!(
                        "period '{}' ad groups are not in increasing time order",
                        self.uid
                    )));
                }
            }
            if times.last() == Some(&AdGroupTime::EndOfSource) {
                return Err(Error::InvalidTimeline(format!(
                    "period '{}' has an ad group after its postroll",
                    self.uid
                )));
            }
            times.push(time);
        }

        let mut state = AdPlaybackState::new(&times)
            .with_ad_resume_position_us(self.ad_resume_position_us);
        for (index, group) in self.ad_groups.into_iter().enumerate() {
            if let Some(count) = group.count {
                let out_of_range = group
                    .available
                    .iter()
                    .chain(&group.played)
                    .chain(&group.skipped)
                    .chain(&group.errored)
                    .any(|&ad| ad >= count);
                if out_of_range || group.durations_us.len() > count {
                    return Err(Error::InvalidTimeline(format!(
                        "period '{}' ad group {} refers to ads beyond its count of {}",
                        self.uid, index, count
                    )));
                }
                state = state.with_ad_count(index, count);
            }
            for ad in group.available {
                state = state.with_available_ad(index, ad);
            }
            for ad in group.played {
                state = state.with_played_ad(index, ad);
            }
            for ad in group.skipped {
                state = state.with_skipped_ad(index, ad);
            }
            for ad in group.errored {
                state = state.with_ad_load_error(index, ad);
            }
            if !group.durations_us.is_empty() {
                let durations: Vec<_> = group.durations_us.into_iter().map(Some).collect();
                state = state.with_ad_durations(index, &durations);
            }
        }

        Ok(PeriodDefinition::new(self.uid, self.duration_us).with_ads(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::AdState;

    fn two_window_timeline() -> StaticTimeline {
        StaticTimeline::new(vec![
            WindowDefinition::new(vec![
                PeriodDefinition::new("a1", Some(1000)),
                PeriodDefinition::new("a2", Some(2000)),
            ]),
            WindowDefinition::single("b", Some(500)),
        ])
        .unwrap()
    }

    #[test]
    fn test_window_and_period_layout() {
        let timeline = two_window_timeline();
        assert_eq!(timeline.window_count(), 2);
        assert_eq!(timeline.period_count(), 3);

        let window = timeline.window(0, 0);
        assert_eq!(window.first_period_index, 0);
        assert_eq!(window.last_period_index, 1);
        assert_eq!(window.duration_us, Some(3000));
        assert_eq!(timeline.period(1).position_in_window_us, 1000);
        assert_eq!(timeline.period(2).window_index, 1);
    }

    #[test]
    fn test_next_period_index_respects_repeat_mode() {
        let timeline = two_window_timeline();
        assert_eq!(timeline.next_period_index(0, RepeatMode::Off, false), Some(1));
        assert_eq!(timeline.next_period_index(1, RepeatMode::Off, false), Some(2));
        assert_eq!(timeline.next_period_index(2, RepeatMode::Off, false), None);
        assert_eq!(timeline.next_period_index(2, RepeatMode::All, false), Some(0));
        assert_eq!(timeline.next_period_index(1, RepeatMode::One, false), Some(0));
        assert!(timeline.is_last_period(2, RepeatMode::Off, false));
    }

    #[test]
    fn test_shuffle_order_traversal() {
        let timeline = two_window_timeline().with_shuffle_order(vec![1, 0]).unwrap();
        assert_eq!(timeline.first_window_index(true), Some(1));
        assert_eq!(timeline.next_window_index(1, RepeatMode::Off, true), Some(0));
        assert_eq!(timeline.next_window_index(0, RepeatMode::Off, true), None);
        assert_eq!(timeline.next_window_index(0, RepeatMode::All, true), Some(1));
        // Shuffle order is ignored while shuffle mode is off.
        assert_eq!(timeline.next_window_index(0, RepeatMode::Off, false), Some(1));
    }

    #[test]
    fn test_invalid_shuffle_order_rejected() {
        assert!(two_window_timeline().with_shuffle_order(vec![0, 0]).is_err());
        assert!(two_window_timeline().with_shuffle_order(vec![0]).is_err());
    }

    #[test]
    fn test_duplicate_uid_rejected() {
        let result = StaticTimeline::new(vec![
            WindowDefinition::single("x", Some(1)),
            WindowDefinition::single("x", Some(1)),
        ]);
        assert!(matches!(result, Err(Error::InvalidTimeline(_))));
    }

    #[test]
    fn test_period_position_walks_into_later_periods() {
        let timeline = two_window_timeline();
        assert_eq!(
            timeline.period_position(0, Some(1500), 0),
            Some((PeriodUid::from("a2"), 500))
        );
        assert_eq!(
            timeline.period_position(0, Some(10_000), 0),
            Some((PeriodUid::from("a2"), 9000))
        );
    }

    #[test]
    fn test_dynamic_window_projection() {
        let timeline = StaticTimeline::new(vec![WindowDefinition::single("live", Some(10_000))
            .dynamic()
            .with_default_position_us(Some(8000))])
        .unwrap();
        assert_eq!(timeline.window(0, 0).default_position_us, Some(8000));
        assert_eq!(timeline.window(0, 1500).default_position_us, Some(9500));
        assert_eq!(timeline.window(0, 5000).default_position_us, None);
        assert_eq!(timeline.period_position(0, None, 5000), None);
    }

    #[test]
    fn test_from_toml_str() {
        let timeline = StaticTimeline::from_toml_str(
            r#"
            [[windows]]
            [[windows.periods]]
            uid = "content"
            duration_us = 10000

            [[windows.periods.ad_groups]]
            time_us = 0
            count = 2
            available = [0, 1]
            played = [0]
            durations_us = [100, 200]

            [[windows.periods.ad_groups]]
            postroll = true
            "#,
        )
        .unwrap();
        let period = timeline.period(0);
        assert_eq!(period.ad_group_count(), 2);
        assert_eq!(period.first_ad_index_to_play(0), 1);
        assert_eq!(period.ad_duration_us(0, 1), Some(200));
        assert_eq!(period.ad_group_time(1), AdGroupTime::EndOfSource);
        assert_eq!(period.ad_count_in_ad_group(1), None);
    }

    #[test]
    fn test_from_toml_rejects_bad_ad_groups() {
        let both = r#"
            [[windows]]
            [[windows.periods]]
            uid = "p"
            [[windows.periods.ad_groups]]
            time_us = 5
            postroll = true
        "#;
        assert!(StaticTimeline::from_toml_str(both).is_err());

        let beyond_count = r#"
            [[windows]]
            [[windows.periods]]
            uid = "p"
            [[windows.periods.ad_groups]]
            time_us = 5
            count = 1
            available = [1]
        "#;
        assert!(StaticTimeline::from_toml_str(beyond_count).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.toml");
        std::fs::write(
            &path,
            "[[windows]]\n[[windows.periods]]\nuid = \"only\"\nduration_us = 42\n",
        )
        .unwrap();
        let timeline = StaticTimeline::load(&path).unwrap();
        assert_eq!(timeline.period(0).duration_us, Some(42));
    }

    #[test]
    fn test_load_keeps_error_kind() {
        let dir = tempfile::tempdir().unwrap();

        let malformed = dir.path().join("malformed.toml");
        std::fs::write(&malformed, "[[windows]\n").unwrap();
        assert!(matches!(StaticTimeline::load(&malformed), Err(Error::Toml(_))));

        let empty_window = dir.path().join("empty_window.toml");
        std::fs::write(&empty_window, "[[windows]]\nperiods = []\n").unwrap();
        assert!(matches!(
            StaticTimeline::load(&empty_window),
            Err(Error::InvalidTimeline(_))
        ));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(StaticTimeline::load(&missing), Err(Error::Io(_))));
    }

    #[test]
    fn test_errored_ads_are_passed_over() {
        let document = r#"
            [[windows]]
            [[windows.periods]]
            uid = "p"
            duration_us = 1000
            [[windows.periods.ad_groups]]
            time_us = 500
            count = 3
            available = [0, 2]
            errored = [1]
            durations_us = [100, 100, 100]
        "#;
        let timeline = StaticTimeline::from_toml_str(document).unwrap();
        let group = timeline.period(0).ad_playback_state.ad_group(0).clone();
        assert_eq!(group.state(1), AdState::Error);
        assert_eq!(group.next_ad_index_to_play(Some(0)), 2);

        let out_of_range = document.replace("errored = [1]", "errored = [3]");
        assert!(matches!(
            StaticTimeline::from_toml_str(&out_of_range),
            Err(Error::InvalidTimeline(_))
        ));
    }

    #[test]
    fn test_with_ad_playback_state_replaces_one_period() {
        let timeline = two_window_timeline();
        let ads = AdPlaybackState::new(&[AdGroupTime::At(0)]);
        let updated = timeline.with_ad_playback_state(&PeriodUid::from("a2"), ads.clone());
        assert_eq!(updated.period(1).ad_playback_state, ads);
        assert_eq!(updated.period(0).ad_group_count(), 0);
        assert_eq!(timeline.period(1).ad_group_count(), 0);
    }
}
