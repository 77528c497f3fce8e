//! Playback simulator
//!
//! Drives a [`MediaPeriodQueue`] the way a player loop would: enqueue when
//! the queue asks for more, move the reading and playing cursors as a virtual
//! renderer clock advances, and reconcile the queue whenever the timeline
//! changes. Media periods buffer instantly, so the run is deterministic.
//!
//! **Design:**
//! - One `step()` = enqueue at most one media period, then advance the clock by `step_us`
//! - Renderers read one step ahead of the clock
//! - The clock holds at the end of the last queued media period until its
//!   successor can be resolved (a stall)
//! - A finished ad is marked played in the timeline, which triggers a timeline update
//! - A failed reconciliation reseeks to the current position of the playing period

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::queue::{
    BufferedPosition, MediaPeriod, MediaPeriodId, MediaPeriodInfo, MediaPeriodQueue, MediaSource,
    PeriodKind, PlaybackPosition, ReadPosition,
};
use mpq_common::time::format_us;
use mpq_common::{RepeatMode, StaticTimeline, TimeUs, Timeline};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Something observable that happened during a simulation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    PeriodEnqueued {
        step: u64,
        renderer_offset_us: TimeUs,
        info: MediaPeriodInfo,
    },
    ReadingAdvanced {
        step: u64,
        id: MediaPeriodId,
    },
    PlayingAdvanced {
        step: u64,
        renderer_position_us: TimeUs,
        id: MediaPeriodId,
    },
    /// The queue was cleared and playback restarts at `position_us` of `id`
    Reseek {
        step: u64,
        position_us: TimeUs,
        id: MediaPeriodId,
    },
    /// Playback reached the end of the queued media and waits for the timeline
    Stalled {
        step: u64,
        renderer_position_us: TimeUs,
    },
    Ended {
        step: u64,
        renderer_position_us: TimeUs,
    },
}

/// Media period that is fully buffered as soon as it exists
#[derive(Debug)]
pub struct SimulatedMediaPeriod {
    released: Arc<AtomicUsize>,
}

impl MediaPeriod for SimulatedMediaPeriod {
    fn buffered_position(&self) -> BufferedPosition {
        BufferedPosition::EndOfSource
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Media source handing out [`SimulatedMediaPeriod`]s and counting them
#[derive(Debug, Default)]
pub struct SimulatedMediaSource {
    created: usize,
    released: Arc<AtomicUsize>,
}

impl SimulatedMediaSource {
    pub fn created(&self) -> usize {
        self.created
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Media periods created and not yet released
    pub fn live_periods(&self) -> usize {
        self.created - self.released()
    }
}

impl MediaSource for SimulatedMediaSource {
    fn create_period(&mut self, info: &MediaPeriodInfo) -> Box<dyn MediaPeriod> {
        trace!("Creating media period for {}", info.id);
        self.created += 1;
        Box::new(SimulatedMediaPeriod {
            released: Arc::clone(&self.released),
        })
    }
}

/// Deterministic player loop over a static timeline
pub struct Simulator {
    timeline: StaticTimeline,
    queue: MediaPeriodQueue,
    source: SimulatedMediaSource,
    playback: PlaybackPosition,
    renderer_position_us: TimeUs,
    step_us: TimeUs,
    max_steps: u64,
    step: u64,
    ended: bool,
    stalled: bool,
    events: Vec<PlaybackEvent>,
}

impl Simulator {
    /// Prepare a simulation starting at the default position of the first window
    pub fn new(timeline: StaticTimeline, config: &EngineConfig) -> Result<Self> {
        let mut queue = MediaPeriodQueue::with_config(&config.queue);
        queue.update_repeat_mode(&timeline, config.playback.repeat_mode);
        queue.update_shuffle_mode_enabled(&timeline, config.playback.shuffle);
        let playback = initial_position(&mut queue, &timeline)?;
        info!(
            "Simulating {} windows from {} (repeat {:?}, shuffle {})",
            timeline.window_count(),
            playback.period_id,
            queue.repeat_mode(),
            queue.shuffle_mode_enabled()
        );
        Ok(Self {
            timeline,
            queue,
            source: SimulatedMediaSource::default(),
            playback,
            renderer_position_us: 0,
            step_us: config.playback.step_us,
            max_steps: config.playback.max_steps,
            step: 0,
            ended: false,
            stalled: false,
            events: Vec::new(),
        })
    }

    pub fn timeline(&self) -> &StaticTimeline {
        &self.timeline
    }

    pub fn queue(&self) -> &MediaPeriodQueue {
        &self.queue
    }

    pub fn source(&self) -> &SimulatedMediaSource {
        &self.source
    }

    pub fn events(&self) -> &[PlaybackEvent] {
        &self.events
    }

    pub fn renderer_position_us(&self) -> TimeUs {
        self.renderer_position_us
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// True while the clock is held waiting for the next media period
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Step until playback ends, stalls or the step limit is reached
    pub fn run(&mut self) -> &[PlaybackEvent] {
        while self.step < self.max_steps && self.step() {}
        if self.stalled {
            warn!(
                "Stalled after {} steps at renderer position {}: next media period is not resolvable",
                self.step,
                format_us(self.renderer_position_us)
            );
        } else if !self.ended {
            warn!(
                "Stopped after {} steps at renderer position {} without reaching the end",
                self.step,
                format_us(self.renderer_position_us)
            );
        }
        &self.events
    }

    /// Run one step; returns false once playback has ended or stalled
    ///
    /// A stalled simulation resumes on the next step after a timeline update
    /// makes the next media period resolvable.
    pub fn step(&mut self) -> bool {
        if self.ended {
            return false;
        }
        self.step += 1;
        self.maybe_enqueue();
        self.queue.reevaluate_buffer(self.renderer_position_us);
        self.maybe_advance_reading();
        if self.check_stalled() {
            return false;
        }
        self.renderer_position_us += self.step_us;
        self.maybe_advance_playing();
        self.check_ended();
        !self.ended
    }

    /// Switch to a new timeline, reconciling the queued media periods
    pub fn update_timeline(&mut self, timeline: StaticTimeline) {
        self.timeline = timeline;
        let Some(playing) = self.queue.playing_period() else {
            self.restart();
            return;
        };
        if !self.is_playing_period_valid(&self.queue.holder(playing).info.id) {
            info!("Playing media period left the timeline, restarting");
            self.queue.clear(false);
            self.restart();
            return;
        }
        let read_position = ReadPosition::At(self.renderer_position_us + self.step_us);
        if !self
            .queue
            .update_queued_periods(&self.timeline, self.renderer_position_us, read_position)
        {
            self.reseek();
        }
    }

    pub fn set_repeat_mode(&mut self, repeat_mode: RepeatMode) {
        if !self.queue.update_repeat_mode(&self.timeline, repeat_mode) {
            self.reseek();
        }
    }

    pub fn set_shuffle_mode_enabled(&mut self, shuffle_mode_enabled: bool) {
        if !self
            .queue
            .update_shuffle_mode_enabled(&self.timeline, shuffle_mode_enabled)
        {
            self.reseek();
        }
    }

    fn maybe_enqueue(&mut self) {
        if !self.queue.should_load_next_media_period() {
            return;
        }
        let Some(info) = self.queue.get_next_media_period_info(
            &self.timeline,
            self.renderer_position_us,
            &self.playback,
        ) else {
            trace!("Next media period not resolvable yet");
            return;
        };
        let was_empty = self.queue.is_empty();
        let id = self.queue.enqueue_next_media_period_holder(&mut self.source, info);
        let holder = self.queue.holder_mut(id);
        holder.handle_prepared(true);
        if was_empty {
            self.renderer_position_us = holder.start_position_renderer_time();
        }
        self.events.push(PlaybackEvent::PeriodEnqueued {
            step: self.step,
            renderer_offset_us: holder.renderer_offset_us(),
            info: holder.info.clone(),
        });
    }

    fn maybe_advance_reading(&mut self) {
        let Some(reading) = self.queue.reading_period() else {
            return;
        };
        let holder = self.queue.holder(reading);
        let (Some(next), Some(duration_us)) = (holder.next(), holder.info.duration_us) else {
            return;
        };
        if self.renderer_position_us + self.step_us < holder.to_renderer_time(duration_us) {
            return;
        }
        self.queue.advance_reading_period();
        self.events.push(PlaybackEvent::ReadingAdvanced {
            step: self.step,
            id: self.queue.holder(next).info.id.clone(),
        });
    }

    fn maybe_advance_playing(&mut self) {
        while let Some(playing) = self.queue.playing_period() {
            let holder = self.queue.holder(playing);
            let Some(next) = holder.next() else {
                break;
            };
            if self.queue.reading_period() == Some(playing)
                || self.renderer_position_us < self.queue.holder(next).start_position_renderer_time()
            {
                break;
            }
            let finished = holder.info.id.clone();
            self.queue.advance_playing_period();
            let now_playing = self.queue.holder(next).info.id.clone();
            debug!(
                "Playing {} at renderer position {}",
                now_playing,
                format_us(self.renderer_position_us)
            );
            self.events.push(PlaybackEvent::PlayingAdvanced {
                step: self.step,
                renderer_position_us: self.renderer_position_us,
                id: now_playing,
            });
            if finished.is_ad() {
                self.mark_ad_played(&finished);
            }
        }
    }

    /// Hold the clock once the last queued, non-final media period has played out
    fn check_stalled(&mut self) -> bool {
        let waiting = match self.queue.playing_period() {
            None => true,
            Some(playing) => {
                let holder = self.queue.holder(playing);
                !holder.info.is_final
                    && holder.next().is_none()
                    && holder
                        .info
                        .duration_us
                        .map_or(false, |d| self.renderer_position_us >= holder.to_renderer_time(d))
            }
        };
        if !waiting {
            self.stalled = false;
            return false;
        }
        if !self.stalled {
            info!(
                "Stalled at renderer position {} after {} steps",
                format_us(self.renderer_position_us),
                self.step
            );
            self.stalled = true;
            self.events.push(PlaybackEvent::Stalled {
                step: self.step,
                renderer_position_us: self.renderer_position_us,
            });
        }
        true
    }

    fn check_ended(&mut self) {
        let Some(playing) = self.queue.playing_period() else {
            return;
        };
        let holder = self.queue.holder(playing);
        let reached_end = holder
            .info
            .duration_us
            .map_or(false, |d| self.renderer_position_us >= holder.to_renderer_time(d));
        if holder.info.is_final && holder.next().is_none() && reached_end {
            info!(
                "Playback ended at renderer position {} after {} steps",
                format_us(self.renderer_position_us),
                self.step
            );
            self.ended = true;
            self.events.push(PlaybackEvent::Ended {
                step: self.step,
                renderer_position_us: self.renderer_position_us,
            });
        }
    }

    fn mark_ad_played(&mut self, id: &MediaPeriodId) {
        let PeriodKind::Ad {
            ad_group_index,
            ad_index_in_ad_group,
        } = id.kind
        else {
            return;
        };
        let Some(period) = self.timeline.period_by_uid(&id.period_uid) else {
            return;
        };
        if ad_group_index >= period.ad_group_count() {
            return;
        }
        let ad_playback_state = period
            .ad_playback_state
            .clone()
            .with_played_ad(ad_group_index, ad_index_in_ad_group);
        let timeline = self
            .timeline
            .with_ad_playback_state(&id.period_uid, ad_playback_state);
        self.update_timeline(timeline);
    }

    fn is_playing_period_valid(&self, id: &MediaPeriodId) -> bool {
        match self.timeline.period_by_uid(&id.period_uid) {
            None => false,
            Some(period) => match id.kind {
                PeriodKind::Ad { ad_group_index, .. } => ad_group_index < period.ad_group_count(),
                PeriodKind::Content { .. } => true,
            },
        }
    }

    /// Clear the queue and resume from the playing period's current position
    fn reseek(&mut self) {
        let Some(playing) = self.queue.playing_period() else {
            return;
        };
        let holder = self.queue.holder(playing);
        let period_uid = holder.info.id.period_uid.clone();
        let position_us = match holder.info.id.kind {
            PeriodKind::Ad { .. } => holder.info.requested_content_position_us.unwrap_or(0),
            PeriodKind::Content { .. } => holder
                .to_period_time(self.renderer_position_us)
                .max(holder.info.start_position_us),
        };
        let period_id =
            self.queue
                .resolve_media_period_id_for_ads(&self.timeline, &period_uid, position_us);
        self.queue.clear(true);
        info!("Reseeking to {} at {}", period_id, format_us(position_us));
        self.events.push(PlaybackEvent::Reseek {
            step: self.step,
            position_us,
            id: period_id.clone(),
        });
        self.playback = PlaybackPosition {
            period_id,
            requested_content_position_us: Some(position_us),
            position_us,
        };
    }

    /// Start over from the first window of the current timeline
    fn restart(&mut self) {
        match initial_position(&mut self.queue, &self.timeline) {
            Ok(playback) => self.playback = playback,
            Err(e) => {
                warn!("Cannot restart playback: {}", e);
                self.ended = true;
            }
        }
    }
}

fn initial_position(queue: &mut MediaPeriodQueue, timeline: &StaticTimeline) -> Result<PlaybackPosition> {
    let window_index = timeline
        .first_window_index(queue.shuffle_mode_enabled())
        .ok_or_else(|| Error::Simulation("timeline has no windows".to_string()))?;
    let (period_uid, position_us) = timeline
        .period_position(window_index, None, 0)
        .ok_or_else(|| {
            Error::Simulation(format!(
                "default position of window {} is not known",
                window_index
            ))
        })?;
    Ok(PlaybackPosition {
        period_id: queue.resolve_media_period_id_for_ads(timeline, &period_uid, position_us),
        requested_content_position_us: None,
        position_us,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpq_common::static_timeline::WindowDefinition;

    fn config(step_us: TimeUs) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.playback.step_us = step_us;
        config.playback.max_steps = 1000;
        config
    }

    fn two_windows() -> StaticTimeline {
        StaticTimeline::new(vec![
            WindowDefinition::single("a", Some(1000)),
            WindowDefinition::single("b", Some(1000)),
        ])
        .unwrap()
    }

    #[test]
    fn test_plays_two_windows_to_the_end() {
        let mut sim = Simulator::new(two_windows(), &config(100)).unwrap();
        sim.run();
        assert!(sim.is_ended());
        assert_eq!(sim.renderer_position_us(), 2000);

        let enqueued = sim
            .events()
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::PeriodEnqueued { .. }))
            .count();
        assert_eq!(enqueued, 2);
        assert!(sim.events().iter().any(|e| matches!(
            e,
            PlaybackEvent::PlayingAdvanced { renderer_position_us: 1000, .. }
        )));
        assert!(matches!(sim.events().last(), Some(PlaybackEvent::Ended { .. })));
    }

    #[test]
    fn test_live_periods_match_queue_length() {
        let mut sim = Simulator::new(two_windows(), &config(100)).unwrap();
        for _ in 0..15 {
            sim.step();
            assert_eq!(sim.source().live_periods(), sim.queue().len());
        }
    }

    #[test]
    fn test_empty_timeline_is_rejected() {
        let result = Simulator::new(StaticTimeline::empty(), &config(100));
        assert!(matches!(result, Err(Error::Simulation(_))));
    }

    #[test]
    fn test_step_after_end_is_a_no_op() {
        let mut sim = Simulator::new(two_windows(), &config(500)).unwrap();
        sim.run();
        let steps = sim.steps();
        assert!(!sim.step());
        assert_eq!(sim.steps(), steps);
    }

    #[test]
    fn test_clock_holds_when_next_period_is_unresolvable() {
        let timeline = StaticTimeline::new(vec![
            WindowDefinition::single("a", Some(1000)),
            WindowDefinition::single("b", Some(1000)).with_default_position_us(None),
        ])
        .unwrap();
        let mut sim = Simulator::new(timeline, &config(300)).unwrap();
        sim.run();

        assert!(!sim.is_ended());
        assert!(sim.is_stalled());
        assert_eq!(sim.renderer_position_us(), 1200);
        assert_eq!(sim.queue().len(), 1);
        let stalls = sim
            .events()
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::Stalled { .. }))
            .count();
        assert_eq!(stalls, 1);

        assert!(!sim.step());
        assert_eq!(sim.renderer_position_us(), 1200);
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let mut sim = Simulator::new(two_windows(), &config(500)).unwrap();
        sim.step();
        let json = serde_json::to_value(&sim.events()[0]).unwrap();
        assert_eq!(json["event"], "period_enqueued");
        assert_eq!(json["info"]["id"]["period_uid"], "a");
        assert_eq!(json["renderer_offset_us"], 0);
    }
}
