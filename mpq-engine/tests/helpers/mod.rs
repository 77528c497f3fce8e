//! Shared fixtures for mpq-engine integration tests
//!
//! - Timeline builders for common window/ad layouts
//! - `enqueue_next`: resolve, enqueue and prepare the next media period
//! - `assert_chain_invariants`: structural checks on the queue

#![allow(dead_code)]

use mpq_common::static_timeline::{PeriodDefinition, WindowDefinition};
use mpq_common::{AdGroupTime, AdPlaybackState, PeriodUid, StaticTimeline, TimeUs};
use mpq_engine::queue::{HolderId, MediaPeriodQueue, PlaybackPosition};
use mpq_engine::sim::SimulatedMediaSource;

/// One single-period window per `(uid, duration)` pair
pub fn windows(periods: &[(&str, TimeUs)]) -> StaticTimeline {
    StaticTimeline::new(
        periods
            .iter()
            .map(|(uid, duration_us)| WindowDefinition::single(*uid, Some(*duration_us)))
            .collect(),
    )
    .expect("valid timeline")
}

/// Single window holding one period `uid` with the given ads
pub fn period_with_ads(uid: &str, duration_us: TimeUs, ads: AdPlaybackState) -> WindowDefinition {
    WindowDefinition::new(vec![PeriodDefinition::new(uid, Some(duration_us)).with_ads(ads)])
}

/// One ad group of `durations.len()` available ads at `time`
pub fn ad_group(time: AdGroupTime, durations: &[TimeUs]) -> AdPlaybackState {
    let mut ads = AdPlaybackState::new(&[time]).with_ad_count(0, durations.len());
    let durations_us: Vec<_> = durations.iter().map(|d| Some(*d)).collect();
    ads = ads.with_ad_durations(0, &durations_us);
    for index in 0..durations.len() {
        ads = ads.with_available_ad(0, index);
    }
    ads
}

/// Playback position at `position_us` of `uid`, resolved through the queue
pub fn start_at(
    queue: &mut MediaPeriodQueue,
    timeline: &StaticTimeline,
    uid: &str,
    position_us: TimeUs,
) -> PlaybackPosition {
    PlaybackPosition {
        period_id: queue.resolve_media_period_id_for_ads(timeline, &PeriodUid::from(uid), position_us),
        requested_content_position_us: None,
        position_us,
    }
}

/// Resolve, enqueue and prepare the next media period; `None` if unresolvable
pub fn try_enqueue_next(
    queue: &mut MediaPeriodQueue,
    timeline: &StaticTimeline,
    source: &mut SimulatedMediaSource,
    playback: &PlaybackPosition,
) -> Option<HolderId> {
    let info = queue.get_next_media_period_info(timeline, 0, playback)?;
    let id = queue.enqueue_next_media_period_holder(source, info);
    queue.holder_mut(id).handle_prepared(true);
    Some(id)
}

pub fn enqueue_next(
    queue: &mut MediaPeriodQueue,
    timeline: &StaticTimeline,
    source: &mut SimulatedMediaSource,
    playback: &PlaybackPosition,
) -> HolderId {
    try_enqueue_next(queue, timeline, source, playback).expect("next media period should resolve")
}

/// Check the structural invariants of the queue
///
/// - The chain length matches `len()`
/// - Reading lies between playing and loading
/// - Loading is the last holder
/// - Holders are back to back on the renderer time axis
/// - Every live media period belongs to a queued holder
pub fn assert_chain_invariants(queue: &MediaPeriodQueue, source: &SimulatedMediaSource) {
    let chain: Vec<_> = queue.iter().collect();
    assert_eq!(chain.len(), queue.len());
    assert_eq!(source.live_periods(), queue.len());
    if chain.is_empty() {
        assert!(queue.playing_period().is_none());
        assert!(queue.reading_period().is_none());
        assert!(queue.loading_period().is_none());
        return;
    }
    assert_eq!(Some(chain[0].0), queue.playing_period());
    assert_eq!(chain.last().map(|(id, _)| *id), queue.loading_period());
    assert!(chain.iter().any(|(id, _)| Some(*id) == queue.reading_period()));
    for pair in chain.windows(2) {
        let (_, previous) = pair[0];
        let (_, next) = pair[1];
        let duration_us = previous.info.duration_us.expect("holders with successors have known durations");
        assert_eq!(
            next.renderer_offset_us(),
            previous.renderer_offset_us() + duration_us - next.info.start_position_us,
            "{} does not start where {} ends",
            next.info.id,
            previous.info.id
        );
    }
}
