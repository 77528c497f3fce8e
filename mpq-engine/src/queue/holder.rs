//! Media period holder
//!
//! A holder is one node of the period queue. It owns the buffering state of
//! one media period (behind the [`MediaPeriod`] trait), the descriptor it was
//! created for, and its place on the renderer time axis.

use super::period_info::MediaPeriodInfo;
use mpq_common::TimeUs;
use std::fmt;

/// How far a media period has buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferedPosition {
    /// Buffered up to a period position
    At(TimeUs),
    /// Everything up to the end of the media period is buffered
    EndOfSource,
}

/// Buffering state of one media period
///
/// Implemented by the loading layer. The queue only asks how far it has
/// buffered, forwards buffer reevaluation for the loading period, and releases
/// it when the holder leaves the queue.
pub trait MediaPeriod: Send {
    fn buffered_position(&self) -> BufferedPosition;

    /// Drop buffered data no longer needed at `position_us` (period time)
    fn reevaluate_buffer(&mut self, _position_us: TimeUs) {}

    /// Free all resources. Called exactly once.
    fn release(&mut self);
}

/// Creates media periods for resolved descriptors
pub trait MediaSource {
    fn create_period(&mut self, info: &MediaPeriodInfo) -> Box<dyn MediaPeriod>;
}

/// Stable handle to a holder in the queue arena
///
/// Handles are never reused: the generation changes whenever a slot is
/// recycled, so a handle to a released holder never aliases a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HolderId {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "holder{}.{}", self.slot, self.generation)
    }
}

/// One queued media period
pub struct MediaPeriodHolder {
    /// Descriptor, replaced wholesale on timeline updates
    pub info: MediaPeriodInfo,

    /// Set once the media period finished preparing
    pub prepared: bool,

    /// Set when track selection enabled at least one track
    pub has_enabled_tracks: bool,

    media_period: Box<dyn MediaPeriod>,
    renderer_offset_us: TimeUs,
    pub(crate) next: Option<HolderId>,
    released: bool,
}

impl MediaPeriodHolder {
    pub(crate) fn new(
        media_period: Box<dyn MediaPeriod>,
        renderer_offset_us: TimeUs,
        info: MediaPeriodInfo,
    ) -> Self {
        Self {
            info,
            prepared: false,
            has_enabled_tracks: false,
            media_period,
            renderer_offset_us,
            next: None,
            released: false,
        }
    }

    /// Offset added to period time to get renderer time
    pub fn renderer_offset_us(&self) -> TimeUs {
        self.renderer_offset_us
    }

    pub fn to_renderer_time(&self, period_time_us: TimeUs) -> TimeUs {
        period_time_us + self.renderer_offset_us
    }

    pub fn to_period_time(&self, renderer_time_us: TimeUs) -> TimeUs {
        renderer_time_us - self.renderer_offset_us
    }

    /// Start position on the renderer time axis
    pub fn start_position_renderer_time(&self) -> TimeUs {
        self.info.start_position_us + self.renderer_offset_us
    }

    /// Successor in the queue
    pub fn next(&self) -> Option<HolderId> {
        self.next
    }

    /// Record the outcome of preparation and track selection
    pub fn handle_prepared(&mut self, has_enabled_tracks: bool) {
        self.prepared = true;
        self.has_enabled_tracks = has_enabled_tracks;
    }

    /// True once every enabled track is buffered to the end
    pub fn is_fully_buffered(&self) -> bool {
        self.prepared
            && (!self.has_enabled_tracks
                || self.media_period.buffered_position() == BufferedPosition::EndOfSource)
    }

    /// Buffered position in period time
    ///
    /// The start position before preparation; the duration (possibly unknown)
    /// once fully buffered.
    pub fn buffered_position_us(&self) -> Option<TimeUs> {
        if !self.prepared {
            return Some(self.info.start_position_us);
        }
        let buffered = if self.has_enabled_tracks {
            self.media_period.buffered_position()
        } else {
            BufferedPosition::EndOfSource
        };
        match buffered {
            BufferedPosition::At(position_us) => Some(position_us),
            BufferedPosition::EndOfSource => self.info.duration_us,
        }
    }

    pub(crate) fn reevaluate_buffer(&mut self, renderer_position_us: TimeUs) {
        if self.prepared {
            let position_us = self.to_period_time(renderer_position_us);
            self.media_period.reevaluate_buffer(position_us);
        }
    }

    pub(crate) fn release(&mut self) {
        debug_assert!(!self.released, "media period holder released twice");
        if !self.released {
            self.released = true;
            self.media_period.release();
        }
    }
}

impl fmt::Debug for MediaPeriodHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPeriodHolder")
            .field("info", &self.info)
            .field("prepared", &self.prepared)
            .field("has_enabled_tracks", &self.has_enabled_tracks)
            .field("renderer_offset_us", &self.renderer_offset_us)
            .field("next", &self.next)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::period_id::MediaPeriodId;
    use mpq_common::{EndPosition, PeriodUid};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedPeriod {
        buffered: BufferedPosition,
        releases: Arc<AtomicUsize>,
    }

    impl MediaPeriod for FixedPeriod {
        fn buffered_position(&self) -> BufferedPosition {
            self.buffered
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn holder(buffered: BufferedPosition, offset_us: TimeUs) -> (MediaPeriodHolder, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let info = MediaPeriodInfo {
            id: MediaPeriodId::content(PeriodUid::from("p"), 0, None),
            start_position_us: 100,
            requested_content_position_us: None,
            end_position: EndPosition::Unset,
            duration_us: Some(1000),
            is_last_in_timeline_period: true,
            is_last_in_timeline_window: true,
            is_final: false,
        };
        let period = FixedPeriod {
            buffered,
            releases: Arc::clone(&releases),
        };
        (MediaPeriodHolder::new(Box::new(period), offset_us, info), releases)
    }

    #[test]
    fn test_time_conversion() {
        let (holder, _) = holder(BufferedPosition::At(0), 5000);
        assert_eq!(holder.to_renderer_time(100), 5100);
        assert_eq!(holder.to_period_time(5100), 100);
        assert_eq!(holder.start_position_renderer_time(), 5100);
    }

    #[test]
    fn test_unprepared_holder_reports_start_position() {
        let (holder, _) = holder(BufferedPosition::At(700), 0);
        assert!(!holder.is_fully_buffered());
        assert_eq!(holder.buffered_position_us(), Some(100));
    }

    #[test]
    fn test_fully_buffered_needs_end_of_source() {
        let (mut partial, _) = holder(BufferedPosition::At(700), 0);
        partial.handle_prepared(true);
        assert!(!partial.is_fully_buffered());
        assert_eq!(partial.buffered_position_us(), Some(700));

        let (mut complete, _) = holder(BufferedPosition::EndOfSource, 0);
        complete.handle_prepared(true);
        assert!(complete.is_fully_buffered());
        assert_eq!(complete.buffered_position_us(), Some(1000));
    }

    #[test]
    fn test_no_enabled_tracks_counts_as_buffered() {
        let (mut holder, _) = holder(BufferedPosition::At(0), 0);
        holder.handle_prepared(false);
        assert!(holder.is_fully_buffered());
    }

    #[test]
    fn test_release_reaches_media_period() {
        let (mut holder, releases) = holder(BufferedPosition::At(0), 0);
        holder.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
