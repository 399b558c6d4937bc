//! Lifecycle and loudness of a single sound emitter.

use crate::config::TrackTuning;
use std::fmt;

/// Unique identifier of a track, assigned when the track pool creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Track({})", self.0)
    }
}

/// Generation of an asynchronous start. A completion carrying an epoch other
/// than its ticket's current one is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Created by the pool; assets may be loading but nothing has been asked
    /// to sound yet.
    Preloading,
    /// Start requested, waiting for the strategy to report sound.
    Loading,
    /// The strategy confirmed audio is being produced.
    Playing,
}

/// State of one emitter.
///
/// Owned by the track pool's resource; mutated by the proximity pass and by
/// strategy events, destroyed when the pool removes the resource.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    status: TrackStatus,
    last_amp: f32,
    last_amp_time: f64,
    last_living_time: f64,
    created_at: f64,
    fault: Option<String>,
}

impl Track {
    /// Creates a silent preloading track.
    pub fn new(id: TrackId, now: f64) -> Self {
        Self {
            id,
            status: TrackStatus::Preloading,
            last_amp: 0.0,
            last_amp_time: now,
            last_living_time: now,
            created_at: now,
            fault: None,
        }
    }

    /// Seeds the amplitude from proximity as the track is asked to sound, so
    /// a track woken close by starts loud and one at the edge never starts
    /// silent. Returns the amplitude to start the audio at.
    pub fn start(&mut self, proximity: f32, now: f64, tuning: &TrackTuning) -> f32 {
        let seed = tuning.seed_floor;
        self.last_amp = proximity.clamp(0.0, 1.0) * (1.0 - seed) + seed;
        self.last_amp_time = now;
        self.last_living_time = now;
        self.last_amp
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn last_amp(&self) -> f32 {
        self.last_amp
    }

    pub fn last_amp_time(&self) -> f64 {
        self.last_amp_time
    }

    pub fn last_living_time(&self) -> f64 {
        self.last_living_time
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Why the start failed, if it did. A faulted track stays where it was
    /// and is never restarted; it goes away with its pool resource.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Commits the start request. Must happen before the strategy's `play`
    /// is issued, so a second tick cannot start the track again.
    pub fn mark_loading(&mut self) {
        if self.status == TrackStatus::Preloading {
            self.status = TrackStatus::Loading;
        }
    }

    pub fn mark_playing(&mut self) {
        self.status = TrackStatus::Playing;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.fault = Some(reason.into());
    }

    /// Feeds the current distance-derived loudness.
    ///
    /// The stored amplitude releases exponentially towards silence and jumps
    /// up immediately when the target is louder. Returns the amplitude that
    /// should be applied to the audio.
    pub fn set_proximity(&mut self, target: f32, now: f64, tuning: &TrackTuning) -> f32 {
        let dt = (now - self.last_amp_time).max(0.0);
        let released = self.last_amp as f64 / (dt * tuning.decay_rate).exp();
        self.last_amp = released as f32;
        if target > self.last_amp {
            self.last_amp = target;
        }
        self.last_amp_time = now;
        if self.last_amp > tuning.audibility_floor {
            self.last_living_time = now;
        }
        self.last_amp
    }

    /// True once the track has been inaudible for longer than the grace
    /// window. Independent of status.
    pub fn is_done(&self, now: f64, tuning: &TrackTuning) -> bool {
        now - self.last_living_time > tuning.grace_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_at(amp_seed: f32) -> Track {
        let mut track = Track::new(TrackId::new(1), 0.0);
        track.start(amp_seed, 0.0, &TrackTuning::default());
        track
    }

    #[test]
    fn test_seed_amplitude_from_proximity() {
        assert!((track_at(0.0).last_amp() - 0.7).abs() < 1e-6);
        assert!((track_at(0.5).last_amp() - 0.85).abs() < 1e-6);
        assert!((track_at(1.0).last_amp() - 1.0).abs() < 1e-6);
        assert_eq!(track_at(1.0).status(), TrackStatus::Preloading);
    }

    #[test]
    fn test_seed_is_taken_when_started_not_when_created() {
        let tuning = TrackTuning::default();
        let mut track = Track::new(TrackId::new(1), 0.0);
        assert_eq!(track.last_amp(), 0.0);

        // Thirty seconds of preloading do not eat into the seed.
        let amp = track.start(0.5, 30.0, &tuning);
        assert!((amp - 0.85).abs() < 1e-6);
        assert_eq!(track.last_amp_time(), 30.0);
        assert_eq!(track.last_living_time(), 30.0);
        assert!(!track.is_done(39.0, &tuning));
    }

    #[test]
    fn test_release_curve_matches_decay_rate() {
        let tuning = TrackTuning::default();
        let mut track = track_at(1.0);
        let expected = [0.861, 0.741, 0.638];
        for (step, want) in expected.iter().enumerate() {
            let amp = track.set_proximity(0.0, (step + 1) as f64, &tuning);
            assert!((amp - want).abs() < 1e-3, "step {}: {} != {}", step, amp, want);
        }
    }

    #[test]
    fn test_release_never_increases_without_a_louder_target() {
        let tuning = TrackTuning::default();
        let mut track = track_at(1.0);
        let mut previous = track.last_amp();
        for tick in 1..200 {
            let amp = track.set_proximity(0.1, tick as f64 * 0.1, &tuning);
            assert!(amp <= previous);
            assert!(amp >= 0.1);
            previous = amp;
        }
    }

    #[test]
    fn test_attack_is_instant() {
        let tuning = TrackTuning::default();
        let mut track = track_at(0.0);
        track.set_proximity(0.0, 30.0, &tuning);
        assert!(track.last_amp() < 0.01);
        assert_eq!(track.set_proximity(0.9, 30.1, &tuning), 0.9);
    }

    #[test]
    fn test_done_after_grace_window_of_silence() {
        let tuning = TrackTuning::default();
        let mut track = track_at(0.0);
        // 0.7 / exp(0.15 t) drops under 0.05 at t ~ 17.6s
        let mut now = 0.0;
        while now < 17.5 {
            now += 0.1;
            track.set_proximity(0.0, now, &tuning);
        }
        let living = track.last_living_time();
        assert!(living > 17.0 && living < 17.7);
        assert!(!track.is_done(living + 9.99, &tuning));
        assert!(track.is_done(living + 10.01, &tuning));
    }

    #[test]
    fn test_status_transitions() {
        let mut track = track_at(0.5);
        track.mark_loading();
        assert_eq!(track.status(), TrackStatus::Loading);
        track.mark_playing();
        track.mark_loading();
        assert_eq!(track.status(), TrackStatus::Playing);

        track.mark_failed("no such asset");
        assert_eq!(track.fault(), Some("no such asset"));
    }
}
