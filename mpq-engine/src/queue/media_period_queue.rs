//! Media period queue
//!
//! Holds the chain of media period holders the player is playing, reading
//! from, and loading, and resolves which media period comes next for a given
//! timeline.
//!
//! **Design:**
//! - Holders live in an arena; the chain is linked through `HolderId`s and
//!   always runs `playing` → ... → `reading` → ... → `loading`
//! - `length` counts the chain and is capped to bound look-ahead memory
//! - Window sequence numbers are minted per queue instance
//! - The identity of the last evicted front holder is remembered while the
//!   chain is empty, so re-enqueueing the same window keeps its sequence number
//!
//! All methods are synchronous and never block. Callers serialise access.

use super::holder::{HolderId, MediaPeriodHolder, MediaSource};
use super::period_id::{MediaPeriodId, PeriodKind};
use super::period_info::MediaPeriodInfo;
use crate::config::QueueConfig;
use mpq_common::time::{format_opt_us, format_us};
use mpq_common::{AdGroupTime, EndPosition, Period, PeriodUid, RepeatMode, TimeUs, Timeline};
use tracing::{debug, trace};

/// Upper bound on the number of queued media periods
pub const MAXIMUM_BUFFER_AHEAD_PERIODS: usize = 100;

/// Where playback starts when the queue is empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Media period to start in, from [`MediaPeriodQueue::resolve_media_period_id_for_ads`]
    pub period_id: MediaPeriodId,

    /// Content position requested by the player, `None` for the window default
    pub requested_content_position_us: Option<TimeUs>,

    /// Start position in period time
    pub position_us: TimeUs,
}

/// Furthest renderer position any renderer has read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPosition {
    At(TimeUs),
    /// Renderers have read the reading period to its end
    EndOfSource,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    holder: Option<MediaPeriodHolder>,
}

/// Queue of media period holders
#[derive(Debug)]
pub struct MediaPeriodQueue {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,

    playing: Option<HolderId>,
    reading: Option<HolderId>,
    loading: Option<HolderId>,
    length: usize,
    max_buffer_ahead_periods: usize,

    next_window_sequence_number: u64,
    repeat_mode: RepeatMode,
    shuffle_mode_enabled: bool,

    old_front_period_uid: Option<PeriodUid>,
    old_front_period_window_sequence_number: u64,
}

impl MediaPeriodQueue {
    /// Create an empty queue with the default look-ahead cap
    pub fn new() -> Self {
        Self::with_config(&QueueConfig::default())
    }

    /// Create an empty queue
    pub fn with_config(config: &QueueConfig) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            playing: None,
            reading: None,
            loading: None,
            length: 0,
            max_buffer_ahead_periods: config
                .max_buffer_ahead_periods
                .clamp(1, MAXIMUM_BUFFER_AHEAD_PERIODS),
            next_window_sequence_number: 0,
            repeat_mode: RepeatMode::Off,
            shuffle_mode_enabled: false,
            old_front_period_uid: None,
            old_front_period_window_sequence_number: 0,
        }
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn shuffle_mode_enabled(&self) -> bool {
        self.shuffle_mode_enabled
    }

    /// Set the repeat mode and revalidate the queue against it
    ///
    /// Returns false if the reading period was removed and the player must
    /// reseek.
    pub fn update_repeat_mode(&mut self, timeline: &dyn Timeline, repeat_mode: RepeatMode) -> bool {
        self.repeat_mode = repeat_mode;
        self.update_for_playback_mode_change(timeline)
    }

    /// Set shuffle mode and revalidate the queue against it
    ///
    /// Returns false if the reading period was removed and the player must
    /// reseek.
    pub fn update_shuffle_mode_enabled(&mut self, timeline: &dyn Timeline, shuffle_mode_enabled: bool) -> bool {
        self.shuffle_mode_enabled = shuffle_mode_enabled;
        self.update_for_playback_mode_change(timeline)
    }

    /// Number of holders in the chain
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True if `id` is the loading holder
    pub fn is_loading(&self, id: HolderId) -> bool {
        self.loading == Some(id)
    }

    pub fn loading_period(&self) -> Option<HolderId> {
        self.loading
    }

    pub fn playing_period(&self) -> Option<HolderId> {
        self.playing
    }

    pub fn reading_period(&self) -> Option<HolderId> {
        self.reading
    }

    /// Period uid of the most recently evicted front holder while the chain is empty
    pub fn old_front_period_uid(&self) -> Option<&PeriodUid> {
        self.old_front_period_uid.as_ref()
    }

    pub fn old_front_period_window_sequence_number(&self) -> u64 {
        self.old_front_period_window_sequence_number
    }

    /// Holder for `id`, `None` once it has been released
    pub fn get(&self, id: HolderId) -> Option<&MediaPeriodHolder> {
        self.slots
            .get(id.slot)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.holder.as_ref())
    }

    /// Holder for `id`
    ///
    /// # Panics
    /// If `id` has been released.
    pub fn holder(&self, id: HolderId) -> &MediaPeriodHolder {
        match self.get(id) {
            Some(holder) => holder,
            None => panic!("{} is not in the media period queue", id),
        }
    }

    /// Mutable holder for `id`
    ///
    /// # Panics
    /// If `id` has been released.
    pub fn holder_mut(&mut self, id: HolderId) -> &mut MediaPeriodHolder {
        let slot = self
            .slots
            .get_mut(id.slot)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.holder.as_mut());
        match slot {
            Some(holder) => holder,
            None => panic!("{} is not in the media period queue", id),
        }
    }

    /// Iterate the chain from the playing holder to the loading holder
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            queue: self,
            next: self.playing,
        }
    }

    /// Let the loading period discard buffer it no longer needs
    pub fn reevaluate_buffer(&mut self, renderer_position_us: TimeUs) {
        if let Some(loading) = self.loading {
            self.holder_mut(loading).reevaluate_buffer(renderer_position_us);
        }
    }

    /// True if another media period should be enqueued
    ///
    /// Always true for an empty queue. Otherwise the loading period must be
    /// non-final, fully buffered, of known duration, and the queue below its cap.
    pub fn should_load_next_media_period(&self) -> bool {
        match self.loading {
            None => true,
            Some(loading) => {
                let loading = self.holder(loading);
                !loading.info.is_final
                    && loading.is_fully_buffered()
                    && loading.info.duration_us.is_some()
                    && self.length < self.max_buffer_ahead_periods
            }
        }
    }

    /// Descriptor of the media period to enqueue next
    ///
    /// Starts from `playback` when the queue is empty, otherwise follows the
    /// loading period. `None` if the timeline cannot answer yet.
    pub fn get_next_media_period_info(
        &mut self,
        timeline: &dyn Timeline,
        renderer_position_us: TimeUs,
        playback: &PlaybackPosition,
    ) -> Option<MediaPeriodInfo> {
        match self.loading {
            None => self.get_first_media_period_info(timeline, playback),
            Some(loading) => self.get_following_media_period_info(timeline, loading, renderer_position_us),
        }
    }

    /// Append a holder for `info` to the chain and make it the loading holder
    ///
    /// Holders are laid out back to back on the renderer time axis.
    ///
    /// # Panics
    /// If the current loading holder has no known duration.
    pub fn enqueue_next_media_period_holder(
        &mut self,
        media_source: &mut dyn MediaSource,
        info: MediaPeriodInfo,
    ) -> HolderId {
        let renderer_offset_us = match self.loading {
            None if info.id.is_ad() => info.requested_content_position_us.unwrap_or(0),
            None => 0,
            Some(loading) => {
                let loading = self.holder(loading);
                let duration_us = match loading.info.duration_us {
                    Some(duration_us) => duration_us,
                    None => panic!("cannot enqueue after {} of unknown duration", loading.info.id),
                };
                loading.renderer_offset_us() + duration_us - info.start_position_us
            }
        };

        debug!(
            "Enqueue {} at renderer offset {}",
            info,
            format_us(renderer_offset_us)
        );
        let media_period = media_source.create_period(&info);
        let id = self.allocate(MediaPeriodHolder::new(media_period, renderer_offset_us, info));
        match self.loading {
            Some(loading) => self.holder_mut(loading).next = Some(id),
            None => {
                self.playing = Some(id);
                self.reading = Some(id);
            }
        }
        self.old_front_period_uid = None;
        self.loading = Some(id);
        self.length += 1;
        id
    }

    /// Move the reading cursor to its successor
    ///
    /// # Panics
    /// If there is no reading holder or it has no successor.
    pub fn advance_reading_period(&mut self) -> HolderId {
        let next = self.reading.and_then(|reading| self.holder(reading).next);
        let next = match next {
            Some(next) => next,
            None => panic!("advance_reading_period called without a successor to the reading period"),
        };
        trace!("Reading advanced to {}", self.holder(next).info.id);
        self.reading = Some(next);
        next
    }

    /// Release the playing holder and move playback to its successor
    ///
    /// Returns the new playing holder, `None` if the queue is (now) empty.
    pub fn advance_playing_period(&mut self) -> Option<HolderId> {
        let playing = self.playing?;
        let (uid, window_sequence_number) = {
            let holder = self.holder(playing);
            (
                holder.info.id.period_uid.clone(),
                holder.info.id.window_sequence_number,
            )
        };
        let next = self.holder(playing).next;
        if self.reading == Some(playing) {
            self.reading = next;
        }
        self.release(playing);
        self.length -= 1;
        if self.length == 0 {
            self.loading = None;
            self.old_front_period_uid = Some(uid);
            self.old_front_period_window_sequence_number = window_sequence_number;
        }
        self.playing = next;
        if let Some(next) = next {
            trace!("Playing advanced to {}", self.holder(next).info.id);
        }
        next
    }

    /// Release every holder after `id`, making `id` the loading holder
    ///
    /// Returns true if the reading holder was among the removed ones, in which
    /// case reading falls back to the playing holder.
    ///
    /// # Panics
    /// If `id` is not in the chain.
    pub fn remove_after(&mut self, id: HolderId) -> bool {
        assert!(
            self.iter().any(|(chained, _)| chained == id),
            "remove_after called with {} which is not in the chain",
            id
        );
        let mut removed_reading = false;
        let mut removed = 0;
        self.loading = Some(id);
        let mut next = self.holder_mut(id).next.take();
        while let Some(current) = next {
            if self.reading == Some(current) {
                self.reading = self.playing;
                removed_reading = true;
            }
            next = self.release(current);
            self.length -= 1;
            removed += 1;
        }
        if removed > 0 {
            debug!(
                "Removed {} media periods after {} (reading removed: {})",
                removed,
                self.holder(id).info.id,
                removed_reading
            );
        }
        removed_reading
    }

    /// Release every holder
    ///
    /// With `keep_front_period_uid` the playing holder's identity is remembered
    /// so that re-enqueueing its window reuses the window sequence number.
    pub fn clear(&mut self, keep_front_period_uid: bool) {
        if let Some(front) = self.playing {
            let front_id = self.holder(front).info.id.clone();
            self.old_front_period_uid = keep_front_period_uid.then_some(front_id.period_uid);
            self.old_front_period_window_sequence_number = front_id.window_sequence_number;
            self.remove_after(front);
            self.release(front);
        } else if !keep_front_period_uid {
            self.old_front_period_uid = None;
        }
        self.playing = None;
        self.reading = None;
        self.loading = None;
        self.length = 0;
    }

    /// Reconcile queued holders with an updated timeline
    ///
    /// The playing holder's identity and start position must already be valid
    /// in `timeline`. Later holders are kept while the descriptor expected
    /// after their predecessor matches theirs; the chain is truncated at the
    /// first divergence.
    ///
    /// Returns false if the player must reseek: the reading holder was
    /// removed, or renderers already read past a shortened reading period.
    pub fn update_queued_periods(
        &mut self,
        timeline: &dyn Timeline,
        renderer_position_us: TimeUs,
        max_renderer_read_position: ReadPosition,
    ) -> bool {
        let mut previous: Option<HolderId> = None;
        let mut current = self.playing;
        while let Some(id) = current {
            let old_info = self.holder(id).info.clone();
            let new_info = match previous {
                None => self.get_updated_media_period_info(timeline, &old_info),
                Some(previous) => {
                    match self.get_following_media_period_info(timeline, previous, renderer_position_us) {
                        Some(info) if can_keep_media_period_holder(&old_info, &info) => info,
                        expected => {
                            debug!(
                                "Timeline update diverges at {} (expected {})",
                                old_info.id,
                                expected.map_or_else(|| "nothing yet".to_string(), |i| i.id.to_string())
                            );
                            return !self.remove_after(previous);
                        }
                    }
                }
            };

            let new_duration_us = new_info.duration_us;
            self.holder_mut(id).info =
                new_info.copy_with_requested_content_position_us(old_info.requested_content_position_us);

            if !are_durations_compatible(old_info.duration_us, new_duration_us) {
                debug!(
                    "Duration of {} changed from {} to {}",
                    old_info.id,
                    format_opt_us(old_info.duration_us),
                    format_opt_us(new_duration_us)
                );
                let holder = self.holder(id);
                let is_reading_and_read_beyond_new_duration = self.reading == Some(id)
                    && match max_renderer_read_position {
                        ReadPosition::EndOfSource => true,
                        ReadPosition::At(read_us) => new_duration_us
                            .map_or(false, |d| read_us >= holder.to_renderer_time(d)),
                    };
                let reading_removed = self.remove_after(id);
                return !reading_removed && !is_reading_and_read_beyond_new_duration;
            }

            previous = Some(id);
            current = self.holder(id).next;
        }
        true
    }

    /// Truncate the chain where it stops following the timeline's period order
    ///
    /// Call after the repeat or shuffle mode changed. Returns false if the
    /// reading holder was removed.
    pub fn update_for_playback_mode_change(&mut self, timeline: &dyn Timeline) -> bool {
        let Some(mut last_valid) = self.playing else {
            return true;
        };
        let mut current_period_index = timeline.index_of_period(&self.holder(last_valid).info.id.period_uid);
        loop {
            let next_period_index = current_period_index.and_then(|index| {
                timeline.next_period_index(index, self.repeat_mode, self.shuffle_mode_enabled)
            });
            // Skip the ad/content split of the current timeline period.
            while let Some(next) = self.holder(last_valid).next {
                if self.holder(last_valid).info.is_last_in_timeline_period {
                    break;
                }
                last_valid = next;
            }
            let next_holder = self.holder(last_valid).next;
            let (Some(next_period_index), Some(next_holder)) = (next_period_index, next_holder) else {
                break;
            };
            if timeline.index_of_period(&self.holder(next_holder).info.id.period_uid) != Some(next_period_index) {
                break;
            }
            last_valid = next_holder;
            current_period_index = Some(next_period_index);
        }

        let reading_removed = self.remove_after(last_valid);
        let info = self.holder(last_valid).info.clone();
        if timeline.index_of_period(&info.id.period_uid).is_some() {
            let updated = self.get_updated_media_period_info(timeline, &info);
            self.holder_mut(last_valid).info = updated;
        }
        !reading_removed
    }

    /// Refresh duration and "last in" flags of `info` for `timeline`
    ///
    /// Identity and start position are kept; the period must exist in `timeline`.
    pub fn get_updated_media_period_info(&self, timeline: &dyn Timeline, info: &MediaPeriodInfo) -> MediaPeriodInfo {
        let id = &info.id;
        let is_last_in_period = is_last_in_period(id);
        let is_last_in_window = self.is_last_in_window(timeline, id, is_last_in_period);
        let is_final = self.is_last_in_timeline(timeline, id, is_last_in_window);
        let period = expect_period(timeline, &id.period_uid);
        let duration_us = match id.kind {
            PeriodKind::Ad {
                ad_group_index,
                ad_index_in_ad_group,
            } => period.ad_duration_us(ad_group_index, ad_index_in_ad_group),
            PeriodKind::Content { .. } => match info.end_position {
                EndPosition::At(end_us) => Some(end_us),
                EndPosition::Unset | EndPosition::EndOfSource => period.duration_us,
            },
        };
        MediaPeriodInfo {
            id: id.clone(),
            start_position_us: info.start_position_us,
            requested_content_position_us: info.requested_content_position_us,
            end_position: info.end_position,
            duration_us,
            is_last_in_timeline_period: is_last_in_period,
            is_last_in_timeline_window: is_last_in_window,
            is_final,
        }
    }

    /// Resolve what plays at `position_us` of period `period_uid`
    ///
    /// An unplayed ad group at or before the position wins over content.
    /// The window sequence number is reused from the queue where possible.
    pub fn resolve_media_period_id_for_ads(
        &mut self,
        timeline: &dyn Timeline,
        period_uid: &PeriodUid,
        position_us: TimeUs,
    ) -> MediaPeriodId {
        let window_sequence_number = self.resolve_period_index_to_window_sequence_number(timeline, period_uid);
        resolve_media_period_id_for_ads(timeline, period_uid, position_us, window_sequence_number)
    }

    /// Window sequence number for a media period of `period_uid`
    ///
    /// Priority: the old front window while the queue is empty, a holder of
    /// the same period, a holder of the same window, then a fresh number.
    fn resolve_period_index_to_window_sequence_number(
        &mut self,
        timeline: &dyn Timeline,
        period_uid: &PeriodUid,
    ) -> u64 {
        let window_index = expect_period(timeline, period_uid).window_index;

        if let Some(old_front_uid) = &self.old_front_period_uid {
            if let Some(old_front_index) = timeline.index_of_period(old_front_uid) {
                if timeline.period(old_front_index).window_index == window_index {
                    return self.old_front_period_window_sequence_number;
                }
            }
        }

        if let Some((_, holder)) = self.iter().find(|(_, h)| &h.info.id.period_uid == period_uid) {
            return holder.info.id.window_sequence_number;
        }

        let same_window = self.iter().find(|(_, h)| {
            timeline
                .index_of_period(&h.info.id.period_uid)
                .map_or(false, |index| timeline.period(index).window_index == window_index)
        });
        if let Some((_, holder)) = same_window {
            return holder.info.id.window_sequence_number;
        }

        let window_sequence_number = self.mint_window_sequence_number();
        if self.playing.is_none() {
            self.old_front_period_uid = Some(period_uid.clone());
            self.old_front_period_window_sequence_number = window_sequence_number;
        }
        window_sequence_number
    }

    fn mint_window_sequence_number(&mut self) -> u64 {
        let window_sequence_number = self.next_window_sequence_number;
        self.next_window_sequence_number += 1;
        window_sequence_number
    }

    fn get_first_media_period_info(&self, timeline: &dyn Timeline, playback: &PlaybackPosition) -> Option<MediaPeriodInfo> {
        self.get_media_period_info(
            timeline,
            &playback.period_id,
            playback.requested_content_position_us,
            playback.position_us,
        )
    }

    /// Descriptor of the media period following holder `id`, `None` if not yet resolvable
    fn get_following_media_period_info(
        &mut self,
        timeline: &dyn Timeline,
        id: HolderId,
        renderer_position_us: TimeUs,
    ) -> Option<MediaPeriodInfo> {
        let holder = self.holder(id);
        let info = holder.info.clone();
        let next_holder = holder.next;
        // How much is buffered beyond the playback position, used to project
        // default positions to where playback will be when this period starts.
        let buffered_duration_us = info
            .duration_us
            .map_or(0, |d| holder.renderer_offset_us() + d - renderer_position_us)
            .max(0);

        if info.is_last_in_timeline_period {
            let current_period_index = timeline.index_of_period(&info.id.period_uid)?;
            let next_period_index =
                timeline.next_period_index(current_period_index, self.repeat_mode, self.shuffle_mode_enabled)?;
            let next_window_index = timeline.period(next_period_index).window_index;
            let mut next_period_uid = timeline.period(next_period_index).uid.clone();
            let mut window_sequence_number = info.id.window_sequence_number;
            let start_position_us;
            let requested_content_position_us;
            if timeline.window(next_window_index, 0).first_period_index == next_period_index {
                // New window: start near where playback will be when it gets there.
                requested_content_position_us = None;
                let (uid, position_us) =
                    timeline.period_position(next_window_index, None, buffered_duration_us)?;
                next_period_uid = uid;
                start_position_us = position_us;
                let queued_sequence_number = next_holder
                    .map(|next| &self.holder(next).info.id)
                    .filter(|next_id| next_id.period_uid == next_period_uid)
                    .map(|next_id| next_id.window_sequence_number);
                window_sequence_number = match queued_sequence_number {
                    Some(queued) => queued,
                    None => self.mint_window_sequence_number(),
                };
            } else {
                start_position_us = 0;
                requested_content_position_us = Some(0);
            }
            let period_id = resolve_media_period_id_for_ads(
                timeline,
                &next_period_uid,
                start_position_us,
                window_sequence_number,
            );
            return self.get_media_period_info(
                timeline,
                &period_id,
                requested_content_position_us,
                start_position_us,
            );
        }

        let period = timeline.period_by_uid(&info.id.period_uid)?;
        let period_uid = &info.id.period_uid;
        let window_sequence_number = info.id.window_sequence_number;
        match info.id.kind {
            PeriodKind::Ad {
                ad_group_index,
                ad_index_in_ad_group,
            } => {
                if ad_group_index >= period.ad_group_count() {
                    return None;
                }
                let ad_count = period.ad_count_in_ad_group(ad_group_index)?;
                let next_ad_index = period.next_ad_index_to_play(ad_group_index, ad_index_in_ad_group);
                if next_ad_index < ad_count {
                    if !period.is_ad_available(ad_group_index, next_ad_index) {
                        return None;
                    }
                    return Some(self.media_period_info_for_ad(
                        timeline,
                        period_uid,
                        ad_group_index,
                        next_ad_index,
                        info.requested_content_position_us,
                        window_sequence_number,
                    ));
                }
                // Ad group finished: resume content.
                let start_position_us = match info.requested_content_position_us {
                    Some(position_us) => position_us,
                    None => {
                        let (_, position_us) =
                            timeline.period_position(period.window_index, None, buffered_duration_us)?;
                        position_us
                    }
                };
                Some(self.media_period_info_for_content(
                    timeline,
                    period_uid,
                    start_position_us,
                    info.requested_content_position_us,
                    window_sequence_number,
                ))
            }
            PeriodKind::Content { .. } => {
                let next_ad_group_index = match info.end_position {
                    EndPosition::At(end_us) => period.ad_group_index_for_position_us(end_us),
                    EndPosition::EndOfSource => period.ad_playback_state.ad_group_index_for_end_of_source(),
                    EndPosition::Unset => None,
                };
                match next_ad_group_index {
                    None => {
                        // The ad group can no longer be played: continue content.
                        let start_position_us = info.duration_us?;
                        Some(self.media_period_info_for_content(
                            timeline,
                            period_uid,
                            start_position_us,
                            Some(start_position_us),
                            window_sequence_number,
                        ))
                    }
                    Some(ad_group_index) => {
                        let ad_index = period.first_ad_index_to_play(ad_group_index);
                        if !period.is_ad_available(ad_group_index, ad_index) {
                            return None;
                        }
                        Some(self.media_period_info_for_ad(
                            timeline,
                            period_uid,
                            ad_group_index,
                            ad_index,
                            info.duration_us,
                            window_sequence_number,
                        ))
                    }
                }
            }
        }
    }

    fn get_media_period_info(
        &self,
        timeline: &dyn Timeline,
        id: &MediaPeriodId,
        requested_content_position_us: Option<TimeUs>,
        start_position_us: TimeUs,
    ) -> Option<MediaPeriodInfo> {
        let period = timeline.period_by_uid(&id.period_uid)?;
        match id.kind {
            PeriodKind::Ad {
                ad_group_index,
                ad_index_in_ad_group,
            } => {
                if !period.is_ad_available(ad_group_index, ad_index_in_ad_group) {
                    return None;
                }
                Some(self.media_period_info_for_ad(
                    timeline,
                    &id.period_uid,
                    ad_group_index,
                    ad_index_in_ad_group,
                    requested_content_position_us,
                    id.window_sequence_number,
                ))
            }
            PeriodKind::Content { .. } => Some(self.media_period_info_for_content(
                timeline,
                &id.period_uid,
                start_position_us,
                requested_content_position_us,
                id.window_sequence_number,
            )),
        }
    }

    fn media_period_info_for_ad(
        &self,
        timeline: &dyn Timeline,
        period_uid: &PeriodUid,
        ad_group_index: usize,
        ad_index_in_ad_group: usize,
        requested_content_position_us: Option<TimeUs>,
        window_sequence_number: u64,
    ) -> MediaPeriodInfo {
        let id = MediaPeriodId::ad(
            period_uid.clone(),
            ad_group_index,
            ad_index_in_ad_group,
            window_sequence_number,
        );
        let period = expect_period(timeline, period_uid);
        let duration_us = period.ad_duration_us(ad_group_index, ad_index_in_ad_group);
        let start_position_us = if ad_index_in_ad_group == period.first_ad_index_to_play(ad_group_index) {
            period.ad_resume_position_us()
        } else {
            0
        };
        MediaPeriodInfo {
            id,
            start_position_us: clamp_start_position(start_position_us, duration_us),
            requested_content_position_us,
            end_position: EndPosition::Unset,
            duration_us,
            is_last_in_timeline_period: false,
            is_last_in_timeline_window: false,
            is_final: false,
        }
    }

    fn media_period_info_for_content(
        &self,
        timeline: &dyn Timeline,
        period_uid: &PeriodUid,
        start_position_us: TimeUs,
        requested_content_position_us: Option<TimeUs>,
        window_sequence_number: u64,
    ) -> MediaPeriodInfo {
        let period = expect_period(timeline, period_uid);
        let next_ad_group_index = period.ad_group_index_after_position_us(start_position_us);
        let id = MediaPeriodId::content(period_uid.clone(), window_sequence_number, next_ad_group_index);
        let is_last_in_period = is_last_in_period(&id);
        let is_last_in_window = self.is_last_in_window(timeline, &id, is_last_in_period);
        let is_final = self.is_last_in_timeline(timeline, &id, is_last_in_window);
        let end_position = match next_ad_group_index.map(|index| period.ad_group_time(index)) {
            Some(AdGroupTime::At(time_us)) => EndPosition::At(time_us),
            Some(AdGroupTime::EndOfSource) => EndPosition::EndOfSource,
            None => EndPosition::Unset,
        };
        let duration_us = match end_position {
            EndPosition::At(end_us) => Some(end_us),
            EndPosition::Unset | EndPosition::EndOfSource => period.duration_us,
        };
        MediaPeriodInfo {
            id,
            start_position_us: clamp_start_position(start_position_us, duration_us),
            requested_content_position_us,
            end_position,
            duration_us,
            is_last_in_timeline_period: is_last_in_period,
            is_last_in_timeline_window: is_last_in_window,
            is_final,
        }
    }

    fn is_last_in_window(&self, timeline: &dyn Timeline, id: &MediaPeriodId, is_last_in_period: bool) -> bool {
        if !is_last_in_period {
            return false;
        }
        let Some(period_index) = timeline.index_of_period(&id.period_uid) else {
            return false;
        };
        let window_index = timeline.period(period_index).window_index;
        timeline.window(window_index, 0).last_period_index == period_index
    }

    fn is_last_in_timeline(&self, timeline: &dyn Timeline, id: &MediaPeriodId, is_last_in_window: bool) -> bool {
        if !is_last_in_window {
            return false;
        }
        let Some(period_index) = timeline.index_of_period(&id.period_uid) else {
            return false;
        };
        let window_index = timeline.period(period_index).window_index;
        !timeline.window(window_index, 0).is_dynamic
            && timeline.is_last_period(period_index, self.repeat_mode, self.shuffle_mode_enabled)
    }

    fn allocate(&mut self, holder: MediaPeriodHolder) -> HolderId {
        match self.free_slots.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot];
                entry.generation += 1;
                entry.holder = Some(holder);
                HolderId {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    holder: Some(holder),
                });
                HolderId {
                    slot: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Release the holder's media period and free its slot; returns its successor
    fn release(&mut self, id: HolderId) -> Option<HolderId> {
        let mut holder = match self.slots.get_mut(id.slot) {
            Some(slot) if slot.generation == id.generation => slot.holder.take(),
            _ => None,
        }
        .unwrap_or_else(|| panic!("{} released twice", id));
        trace!("Releasing {}", holder.info.id);
        holder.release();
        self.free_slots.push(id.slot);
        holder.next
    }
}

impl Default for MediaPeriodQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MediaPeriodQueue {
    fn drop(&mut self) {
        self.clear(false);
    }
}

/// Iterator over the chain, playing holder first
pub struct Iter<'a> {
    queue: &'a MediaPeriodQueue,
    next: Option<HolderId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (HolderId, &'a MediaPeriodHolder);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let holder = self.queue.holder(id);
        self.next = holder.next;
        Some((id, holder))
    }
}

fn resolve_media_period_id_for_ads(
    timeline: &dyn Timeline,
    period_uid: &PeriodUid,
    position_us: TimeUs,
    window_sequence_number: u64,
) -> MediaPeriodId {
    let period = expect_period(timeline, period_uid);
    match period.ad_group_index_for_position_us(position_us) {
        Some(ad_group_index) => MediaPeriodId::ad(
            period_uid.clone(),
            ad_group_index,
            period.first_ad_index_to_play(ad_group_index),
            window_sequence_number,
        ),
        None => MediaPeriodId::content(
            period_uid.clone(),
            window_sequence_number,
            period.ad_group_index_after_position_us(position_us),
        ),
    }
}

fn expect_period<'t>(timeline: &'t dyn Timeline, period_uid: &PeriodUid) -> &'t Period {
    match timeline.period_by_uid(period_uid) {
        Some(period) => period,
        None => panic!("period {} is not part of the timeline", period_uid),
    }
}

fn is_last_in_period(id: &MediaPeriodId) -> bool {
    matches!(id.kind, PeriodKind::Content { next_ad_group_index: None })
}

/// A media period never starts at or after its own end
fn clamp_start_position(start_position_us: TimeUs, duration_us: Option<TimeUs>) -> TimeUs {
    match duration_us {
        Some(duration_us) if start_position_us >= duration_us => (duration_us - 1).max(0),
        _ => start_position_us,
    }
}

fn can_keep_media_period_holder(old_info: &MediaPeriodInfo, new_info: &MediaPeriodInfo) -> bool {
    old_info.start_position_us == new_info.start_position_us && old_info.id == new_info.id
}

fn are_durations_compatible(previous_duration_us: Option<TimeUs>, new_duration_us: Option<TimeUs>) -> bool {
    previous_duration_us.is_none() || previous_duration_us == new_duration_us
}
