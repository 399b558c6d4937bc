use super::RadiusGate;
use crate::config::{TrackTuning, WakeConfig};
use crate::error::GardenSonicError;
use crate::events::GardenSonicEvent;
use crate::math::{Vec2, distance_sq, falloff};
use crate::playback::{PlaybackEvent, PlaybackStrategy, StrategyStats};
use crate::pool::{Keyed, PoolPolicy, TickContext};
use crate::records::{EmitterCatalog, EmitterRecord, RecordId};
use crate::track::{Track, TrackId, TrackStatus};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::Arc;

/// Loudness of `record` heard from `observer`: 1 on top of it, 0 at the
/// record's hush distance.
pub fn proximity(record: &EmitterRecord, observer: Vec2, hush_radius: f32) -> f32 {
    falloff(record.position.distance(observer), hush_radius * record.reach)
}

/// Multiplier on the wake radius.
///
/// Holds at its start value until [`WakeRamp::begin`], then grows with world
/// time until it reaches 1 and stops. Growth pauses on ticks that are held,
/// so the radius only widens while nothing is busy starting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WakeRamp {
    start: f32,
    rate: f32,
    last_advance: Option<f64>,
    mul: f32,
}

impl WakeRamp {
    pub fn new(config: &WakeConfig) -> Self {
        Self {
            start: config.wake_start_mul,
            rate: config.wake_ramp_rate,
            last_advance: None,
            mul: config.wake_start_mul,
        }
    }

    pub fn begin(&mut self, now: f64) {
        self.last_advance = Some(now);
        self.mul = self.start;
    }

    pub fn is_ramping(&self) -> bool {
        self.last_advance.is_some()
    }

    pub fn mul(&self) -> f32 {
        self.mul
    }

    /// Grows the multiplier by the time since the previous call, unless
    /// `hold` is set. Returns true on the tick the ramp completes.
    pub fn advance(&mut self, now: f64, hold: bool) -> bool {
        let Some(last) = self.last_advance.replace(now) else {
            return false;
        };
        if hold {
            return false;
        }
        self.mul += ((now - last).max(0.0) as f32) * self.rate;
        if self.mul >= 1.0 {
            self.mul = 1.0;
            self.last_advance = None;
            return true;
        }
        false
    }
}

/// A loaded emitter: its record and the track playing it.
#[derive(Debug)]
pub struct TrackResource {
    pub record: RecordId,
    pub track: Track,
}

impl Keyed for TrackResource {
    type Key = RecordId;

    fn key(&self) -> RecordId {
        self.record
    }
}

/// What the policy remembers about a loaded record between ticks.
#[derive(Debug, Clone, Copy)]
struct Presence {
    status: TrackStatus,
    faulted: bool,
    last_living_time: f64,
}

/// Pool policy for sound emitters.
///
/// Records are preloaded inside `preload_radius * reach` and released past
/// `(preload_radius + release_margin) * reach`, unless their track is still
/// audibly playing. A preloaded track starts once the observer is inside
/// the (ramping) wake radius.
pub struct TrackPolicy {
    catalog: Arc<EmitterCatalog>,
    strategy: Box<dyn PlaybackStrategy>,
    wake_config: WakeConfig,
    tuning: TrackTuning,
    gate: RadiusGate,
    wake: WakeRamp,
    enabled: bool,
    floor: i32,
    last_track_id: u64,
    presence: HashMap<RecordId, Presence>,
    last_push: Option<f64>,
    events: Option<Sender<GardenSonicEvent>>,
}

impl TrackPolicy {
    pub fn new(catalog: Arc<EmitterCatalog>, strategy: Box<dyn PlaybackStrategy>) -> Self {
        let wake_config = WakeConfig::default();
        Self {
            catalog,
            strategy,
            gate: RadiusGate::with_margin(wake_config.preload_radius, wake_config.release_margin),
            wake: WakeRamp::new(&wake_config),
            wake_config,
            tuning: TrackTuning::default(),
            enabled: true,
            floor: 0,
            last_track_id: 0,
            presence: HashMap::new(),
            last_push: None,
            events: None,
        }
    }

    pub fn with_wake_config(mut self, config: WakeConfig) -> Self {
        self.gate = RadiusGate::with_margin(config.preload_radius, config.release_margin);
        self.wake = WakeRamp::new(&config);
        self.wake_config = config;
        self
    }

    pub fn with_tuning(mut self, tuning: TrackTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_events(mut self, sender: Sender<GardenSonicEvent>) -> Self {
        self.set_events(sender);
        self
    }

    pub fn set_events(&mut self, sender: Sender<GardenSonicEvent>) {
        self.events = Some(sender);
    }

    pub fn strategy(&self) -> &dyn PlaybackStrategy {
        self.strategy.as_ref()
    }

    pub fn strategy_stats(&self) -> StrategyStats {
        self.strategy.stats()
    }

    pub fn tuning(&self) -> &TrackTuning {
        &self.tuning
    }

    pub fn wake(&self) -> &WakeRamp {
        &self.wake
    }

    /// Current wake distance before the record's reach is applied.
    pub fn wake_radius(&self) -> f32 {
        self.wake_config.wake_radius * self.wake.mul()
    }

    /// Starts widening the wake radius from its start value.
    pub fn begin_wake_intro(&mut self, now: f64) {
        log::info!("Wake intro started at {:.2}s", now);
        self.wake.begin(now);
    }

    /// Moves the wake radius to `radius` and the preload distance to
    /// `radius + load_lead`. The release margin is kept.
    pub fn set_radius(&mut self, radius: f32) {
        self.wake_config = self.wake_config.radius(radius);
        self.gate = RadiusGate::with_margin(
            self.wake_config.preload_radius,
            self.wake_config.release_margin,
        );
        log::info!(
            "Wake radius {:.0}, preload distance {:.0}",
            radius,
            self.wake_config.preload_radius
        );
    }

    pub fn wake_config(&self) -> &WakeConfig {
        &self.wake_config
    }

    /// While disabled, tracks still preload and finish what they started,
    /// but none is woken and no amplitude is pushed.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Only records on the observer's floor are preloaded and woken. Tracks
    /// already loaded on another floor fade out as usual.
    pub fn set_floor(&mut self, floor: i32) {
        self.floor = floor;
    }

    /// True while a start has been requested and has neither sounded nor
    /// failed.
    pub fn any_loading(&self) -> bool {
        self.presence
            .values()
            .any(|presence| presence.status == TrackStatus::Loading && !presence.faulted)
    }

    fn emit(&self, event: GardenSonicEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    fn is_retained(&self, presence: &Presence, now: f64) -> bool {
        presence.status == TrackStatus::Playing
            && now - presence.last_living_time <= self.tuning.grace_window
    }

    fn apply_strategy_events(&mut self, loaded: &mut [TrackResource]) {
        for event in self.strategy.poll() {
            let Some(resource) = loaded
                .iter_mut()
                .find(|resource| resource.track.id() == event.track())
            else {
                log::debug!("Ignoring playback event for departed {}", event.track());
                continue;
            };
            let Some(record) = self.catalog.get(resource.record) else {
                continue;
            };

            match event {
                PlaybackEvent::Started(track) => {
                    resource.track.mark_playing();
                    log::info!("{} ({}) is playing", track, record.desc);
                    self.emit(GardenSonicEvent::TrackStarted {
                        track,
                        record: resource.record,
                        position: record.position,
                        glow_curve: record.glow_curve,
                    });
                }
                PlaybackEvent::Failed { track, error } => {
                    match &error {
                        GardenSonicError::Handshake(_) => {
                            log::error!("{} ({}) failed: {}", track, record.desc, error)
                        }
                        _ => log::warn!("{} ({}) failed: {}", track, record.desc, error),
                    }
                    resource.track.mark_failed(error.to_string());
                    self.emit(GardenSonicEvent::TrackFailed {
                        track,
                        record: resource.record,
                        error: error.to_string(),
                    });
                }
            }
        }
    }

    fn wake_tracks(&mut self, loaded: &mut [TrackResource], ctx: &TickContext) {
        let wake_radius = self.wake_radius();
        for resource in loaded.iter_mut() {
            if resource.track.status() != TrackStatus::Preloading || resource.track.is_faulted() {
                continue;
            }
            let Some(record) = self.catalog.get(resource.record) else {
                continue;
            };
            let radius = wake_radius * record.reach;
            if record.floor != self.floor
                || distance_sq(ctx.observer, record.position) > radius * radius
            {
                continue;
            }
            let near = proximity(record, ctx.observer, self.wake_config.hush_radius);
            let amp = resource.track.start(near, ctx.world_time, &self.tuning);
            // Committed before the asynchronous start so a later tick cannot
            // start the same track twice.
            resource.track.mark_loading();
            self.strategy.play(resource.track.id(), record, amp);
        }
    }

    fn push_proximity(&mut self, loaded: &mut [TrackResource], ctx: &TickContext) {
        if let Some(last) = self.last_push {
            if ctx.world_time - last < self.tuning.proximity_interval {
                return;
            }
        }
        for resource in loaded.iter_mut() {
            if resource.track.status() != TrackStatus::Playing {
                continue;
            }
            let Some(record) = self.catalog.get(resource.record) else {
                continue;
            };
            let target = proximity(record, ctx.observer, self.wake_config.hush_radius);
            let amp = resource
                .track
                .set_proximity(target, ctx.world_time, &self.tuning);
            self.strategy.set_amp(resource.track.id(), amp);
        }
        self.last_push = Some(ctx.world_time);
    }
}

impl PoolPolicy for TrackPolicy {
    type Candidate = RecordId;
    type Resource = TrackResource;

    fn generate(&mut self, ctx: &TickContext) -> Vec<RecordId> {
        self.catalog
            .iter()
            .filter(|(id, record)| {
                let presence = self.presence.get(id);
                if presence.is_none() && record.floor != self.floor {
                    return false;
                }
                let distance = distance_sq(ctx.observer, record.position);
                self.gate
                    .scaled(record.reach)
                    .admits(distance, presence.is_some())
                    || presence.is_some_and(|presence| self.is_retained(presence, ctx.world_time))
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn add(
        &mut self,
        record_id: RecordId,
        _recycling: Option<TrackResource>,
        ctx: &TickContext,
    ) -> TrackResource {
        self.last_track_id += 1;
        let id = TrackId::new(self.last_track_id);
        let track = Track::new(id, ctx.world_time);

        if let Some(record) = self.catalog.get(record_id) {
            log::debug!("{} preloading {}", id, record.desc);
            self.strategy.preload(id, record);
        }
        self.presence.insert(
            record_id,
            Presence {
                status: track.status(),
                faulted: false,
                last_living_time: track.last_living_time(),
            },
        );
        self.emit(GardenSonicEvent::TrackPreloading {
            track: id,
            record: record_id,
        });
        TrackResource {
            record: record_id,
            track,
        }
    }

    fn remove(&mut self, resource: &mut TrackResource) {
        let id = resource.track.id();
        self.strategy.stop(id);
        self.presence.remove(&resource.record);
        log::debug!("{} stopped ({:?})", id, resource.track.status());
        self.emit(GardenSonicEvent::TrackStopped {
            track: id,
            record: resource.record,
        });
    }

    fn after_update(&mut self, loaded: &mut [TrackResource], ctx: &TickContext) {
        let hold = self.any_loading();
        if self.wake.advance(ctx.world_time, hold) {
            log::info!("Wake radius reached {:.0}", self.wake_radius());
            self.emit(GardenSonicEvent::WakeRampCompleted);
        }
        self.apply_strategy_events(loaded);
        if self.enabled {
            self.wake_tracks(loaded, ctx);
            self.push_proximity(loaded, ctx);
        }

        self.presence = loaded
            .iter()
            .map(|resource| {
                (
                    resource.record,
                    Presence {
                        status: resource.track.status(),
                        faulted: resource.track.is_faulted(),
                        last_living_time: resource.track.last_living_time(),
                    },
                )
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::{LoadOptions, SegmentData, SegmentLoader};
    use crate::error::Result;
    use crate::mixer::{Mixer, MixerHandle};
    use crate::playback::{
        FrozenStrategy, HandshakeReply, LiveStrategy, SynthFactory, SynthParams, SynthProcessor,
    };
    use crate::pool::Pool;
    use crate::task::ManualSpawner;
    use crossbeam_channel::Receiver;

    struct DcLoader;

    impl SegmentLoader for DcLoader {
        fn load(&self, location: &str, _options: &LoadOptions) -> Result<SegmentData> {
            if location.contains("hseri") {
                return Err(GardenSonicError::AssetLoad(location.to_string()));
            }
            SegmentData::from_samples(vec![0.5; 4800], 480, 1)
        }
    }

    struct Harness {
        pool: Pool<TrackPolicy>,
        spawner: ManualSpawner,
        mixer: Mixer,
        events: Receiver<GardenSonicEvent>,
        time: f64,
    }

    impl Harness {
        fn new(records: Vec<EmitterRecord>) -> Self {
            let spawner = ManualSpawner::new();
            let (mixer, handle): (Mixer, MixerHandle) = Mixer::new(480, 1);
            let strategy =
                FrozenStrategy::new(Arc::new(DcLoader), Arc::new(spawner.clone()), handle, 480);
            let (sender, events) = crossbeam_channel::unbounded();
            let policy = TrackPolicy::new(
                Arc::new(EmitterCatalog::from_records(records)),
                Box::new(strategy),
            )
            .with_events(sender);
            Self {
                pool: Pool::new("tracks", policy),
                spawner,
                mixer,
                events,
                time: 0.0,
            }
        }

        fn tick(&mut self, x: f32, dt: f64) {
            self.time += dt;
            self.pool
                .reconcile(&TickContext::new(Vec2::new(x, 0.0), self.time));
        }

        fn track(&self, index: usize) -> Option<&TrackResource> {
            self.pool
                .find(|resource| resource.record == RecordId::new(index))
        }

        fn drain(&self) -> Vec<GardenSonicEvent> {
            self.events.try_iter().collect()
        }
    }

    fn emitter(desc: &str, x: f32) -> EmitterRecord {
        EmitterRecord::parse(desc, x, 0.0).unwrap()
    }

    #[test]
    fn test_proximity_is_linear_in_distance() {
        let record = emitter("vib 2 3 + 1", 0.0);
        assert_eq!(proximity(&record, Vec2::new(0.0, 0.0), 330.0), 1.0);
        assert_eq!(proximity(&record, Vec2::new(330.0, 0.0), 330.0), 0.0);
        assert!((proximity(&record, Vec2::new(165.0, 0.0), 330.0) - 0.5).abs() < 1e-6);
        assert_eq!(proximity(&record, Vec2::new(900.0, 0.0), 330.0), 0.0);

        let bell = emitter("wbell 4 3/2", 0.0);
        assert!((proximity(&bell, Vec2::new(330.0, 0.0), 330.0) - (1.0 - 1.0 / 1.7)).abs() < 1e-5);
    }

    #[test]
    fn test_wake_ramp_timing() {
        let mut ramp = WakeRamp::new(&WakeConfig::default());
        assert!(!ramp.advance(5.0, false));
        assert_eq!(ramp.mul(), 0.7);

        ramp.begin(10.0);
        assert!(!ramp.advance(11.0, false));
        assert!((ramp.mul() - 0.9).abs() < 1e-6);
        assert!(ramp.advance(11.5, false));
        assert_eq!(ramp.mul(), 1.0);
        assert!(!ramp.is_ramping());
        assert!(!ramp.advance(30.0, false));
        assert_eq!(ramp.mul(), 1.0);
    }

    #[test]
    fn test_wake_ramp_waits_while_held() {
        let mut ramp = WakeRamp::new(&WakeConfig::default());
        ramp.begin(0.0);
        assert!(!ramp.advance(1.0, true));
        assert!(!ramp.advance(2.0, true));
        assert_eq!(ramp.mul(), 0.7);

        // Held time is not made up for later.
        assert!(!ramp.advance(2.5, false));
        assert!((ramp.mul() - 0.8).abs() < 1e-6);
        assert!(ramp.is_ramping());
    }

    #[test]
    fn test_preload_wake_and_play() {
        let mut h = Harness::new(vec![emitter("vib 2 3 + 1", 0.0)]);
        // Inside preload (330) but outside wake (250 * 0.7)
        h.tick(300.0, 0.1);
        let resource = h.track(0).unwrap();
        assert_eq!(resource.track.status(), TrackStatus::Preloading);
        assert_eq!(h.spawner.pending(), 1);

        h.tick(150.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Loading);
        assert!(h.pool.policy().any_loading());

        h.spawner.run_all();
        h.tick(150.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Playing);
        assert!(!h.pool.policy().any_loading());

        let events = h.drain();
        assert!(matches!(events[0], GardenSonicEvent::TrackPreloading { .. }));
        assert!(matches!(events[1], GardenSonicEvent::TrackStarted { .. }));
        h.mixer.apply_commands();
        assert_eq!(h.mixer.voice_count(), 1);
    }

    #[test]
    fn test_release_margin_keeps_preloaded_tracks() {
        let mut h = Harness::new(vec![emitter("sdrone 1 2", 0.0)]);
        h.tick(340.0, 0.1);
        assert!(h.track(0).is_none());
        h.tick(320.0, 0.1);
        assert!(h.track(0).is_some());
        h.tick(360.0, 0.1);
        assert!(h.track(0).is_some());
        h.tick(371.0, 0.1);
        assert!(h.track(0).is_none());
        assert_eq!(h.pool.last_stats().removed, 1);
    }

    #[test]
    fn test_playing_track_outlives_the_gate_until_done() {
        let mut h = Harness::new(vec![emitter("sdrone 1 2", 0.0)]);
        h.tick(0.0, 0.1);
        h.spawner.run_all();
        h.tick(0.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Playing);

        // Walk far away: the amplitude releases from 1.0 and needs ~20s of
        // decay plus the 10s grace window before the track may go.
        h.tick(5000.0, 0.1);
        let mut elapsed = 0.0;
        while h.track(0).is_some() {
            h.tick(5000.0, 0.1);
            elapsed += 0.1;
            assert!(elapsed < 60.0, "track never finished");
        }
        assert!(elapsed > 25.0, "track left after only {:.1}s", elapsed);

        h.mixer.apply_commands();
        assert_eq!(h.mixer.voice_count(), 0);
        assert!(h
            .drain()
            .iter()
            .any(|event| matches!(event, GardenSonicEvent::TrackStopped { .. })));
    }

    #[test]
    fn test_removal_before_completion_connects_nothing() {
        let mut h = Harness::new(vec![emitter("vib 2 3 + 1", 0.0)]);
        h.tick(0.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Loading);
        h.tick(1000.0, 0.1);
        assert!(h.track(0).is_none());

        h.spawner.run_all();
        h.tick(1000.0, 0.1);
        let stats = h.pool.policy().strategy_stats();
        assert_eq!(stats.connected, 0);
        assert_eq!(stats.released, 1);
        h.mixer.apply_commands();
        assert_eq!(h.mixer.voice_count(), 0);
    }

    #[test]
    fn test_failed_load_marks_fault_and_emits() {
        let mut h = Harness::new(vec![emitter("hseri 3", 0.0)]);
        h.tick(0.0, 0.1);
        h.spawner.run_all();
        h.tick(0.0, 0.1);

        let resource = h.track(0).unwrap();
        assert_eq!(resource.track.status(), TrackStatus::Loading);
        assert!(resource.track.is_faulted());
        assert!(!h.pool.policy().any_loading());
        assert!(h
            .drain()
            .iter()
            .any(|event| matches!(event, GardenSonicEvent::TrackFailed { .. })));

        h.tick(0.0, 0.1);
        assert_eq!(h.spawner.pending(), 0);
    }

    #[test]
    fn test_other_floors_are_not_preloaded() {
        let mut h = Harness::new(vec![
            emitter("vib 2 3 + 1", 0.0),
            emitter("sdrone 1 2", 0.0).with_floor(1),
        ]);
        h.tick(0.0, 0.1);
        assert!(h.track(0).is_some());
        assert!(h.track(1).is_none());

        h.pool.policy_mut().set_floor(1);
        h.tick(0.0, 0.1);
        assert!(h.track(1).is_some());
    }

    #[test]
    fn test_floor_change_keeps_playing_tracks() {
        let mut h = Harness::new(vec![emitter("vib 2 3 + 1", 0.0)]);
        h.tick(0.0, 0.1);
        h.spawner.run_all();
        h.tick(0.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Playing);

        h.pool.policy_mut().set_floor(1);
        h.tick(0.0, 0.1);
        assert_eq!(h.pool.last_stats().removed, 0);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Playing);
        h.mixer.apply_commands();
        assert_eq!(h.mixer.voice_count(), 1);
    }

    #[test]
    fn test_preloaded_track_on_other_floor_does_not_wake() {
        let mut h = Harness::new(vec![emitter("vib 2 3 + 1", 0.0)]);
        // Inside preload, outside wake
        h.tick(300.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Preloading);

        h.pool.policy_mut().set_floor(1);
        h.tick(0.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Preloading);

        h.pool.policy_mut().set_floor(0);
        h.tick(0.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Loading);
    }

    #[test]
    fn test_run_mode_off_stops_waking_and_pushing() {
        let mut h = Harness::new(vec![
            emitter("vib 2 3 + 1", 0.0),
            emitter("sdrone 1 2", 250.0),
        ]);
        h.tick(0.0, 0.1);
        h.spawner.run_all();
        h.tick(0.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Playing);
        assert_eq!(h.track(1).unwrap().track.status(), TrackStatus::Preloading);
        let pushed_at = h.track(0).unwrap().track.last_amp_time();

        h.pool.policy_mut().set_enabled(false);
        for _ in 0..5 {
            h.tick(250.0, 0.1);
        }
        assert_eq!(h.pool.loaded().len(), 2);
        assert_eq!(h.track(0).unwrap().track.last_amp_time(), pushed_at);
        assert_eq!(h.track(1).unwrap().track.status(), TrackStatus::Preloading);

        h.pool.policy_mut().set_enabled(true);
        h.tick(250.0, 0.1);
        assert_eq!(h.track(1).unwrap().track.status(), TrackStatus::Loading);
        assert!(h.track(0).unwrap().track.last_amp_time() > pushed_at);
    }

    #[test]
    fn test_seed_survives_a_long_preload() {
        let mut h = Harness::new(vec![emitter("vib 2 3 + 1", 0.0)]);
        for _ in 0..60 {
            h.tick(300.0, 0.5);
        }
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Preloading);

        h.tick(150.0, 0.1);
        h.spawner.run_all();
        h.tick(150.0, 0.1);
        let track = &h.track(0).unwrap().track;
        assert_eq!(track.status(), TrackStatus::Playing);
        // 0.7 + 0.3 * (1 - 150 / 330) = 0.864, released for 0.1s
        assert!(track.last_amp() > 0.84, "seed lost: {}", track.last_amp());

        // The voice starts at the seeded gain, not at the raw proximity.
        h.mixer.apply_commands();
        let mut block = vec![0.0f32; 4];
        h.mixer.render(&mut block);
        assert!(block[0] > 0.5 * 0.84, "started at {}", block[0]);
    }

    #[test]
    fn test_oscillating_across_the_release_edge_keeps_the_track() {
        let mut h = Harness::new(vec![emitter("sdrone 1 2", 0.0)]);
        h.tick(325.0, 0.1);
        assert_eq!(h.pool.last_stats().added, 1);

        for i in 0..40 {
            let x = if i % 2 == 0 { 365.0 } else { 325.0 };
            h.tick(x, 0.1);
            let stats = h.pool.last_stats();
            assert!(stats.is_quiet(), "tick {} at {}: {:?}", i, x, stats);
        }
        assert!(h.track(0).is_some());
    }

    #[test]
    fn test_radius_setting_moves_preload_distance() {
        let mut h = Harness::new(vec![emitter("sdrone 1 2", 0.0)]);
        h.tick(450.0, 0.1);
        assert!(h.track(0).is_none());

        h.pool.policy_mut().set_radius(400.0);
        assert_eq!(h.pool.policy().wake_config().preload_radius, 500.0);
        assert!((h.pool.policy().wake_radius() - 280.0).abs() < 1e-3);
        h.tick(450.0, 0.1);
        assert!(h.track(0).is_some());
        // 540 is inside the 40 release margin
        h.tick(539.0, 0.1);
        assert!(h.track(0).is_some());
        h.tick(541.0, 0.1);
        assert!(h.track(0).is_none());
    }

    #[test]
    fn test_wake_ramp_holds_while_a_track_is_loading() {
        let mut h = Harness::new(vec![emitter("vib 2 3 + 1", 0.0)]);
        h.tick(0.0, 0.1);
        assert!(h.pool.policy().any_loading());

        let now = h.time;
        h.pool.policy_mut().begin_wake_intro(now);
        for _ in 0..10 {
            h.tick(0.0, 0.1);
        }
        assert_eq!(h.pool.policy().wake().mul(), 0.7);

        h.spawner.run_all();
        for _ in 0..5 {
            h.tick(0.0, 0.1);
        }
        assert!(!h.pool.policy().any_loading());
        assert!(h.pool.policy().wake().mul() > 0.75);
    }

    #[test]
    fn test_wake_intro_widens_the_wake_radius() {
        let mut h = Harness::new(vec![emitter("vib 2 3 + 1", 0.0)]);
        // 200 is outside 250 * 0.7 = 175
        h.tick(200.0, 0.1);
        h.tick(200.0, 0.1);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Preloading);

        let now = h.time;
        h.pool.policy_mut().begin_wake_intro(now);
        // 250 * (0.7 + 0.2 t) >= 200 once t >= 0.5
        h.tick(200.0, 0.3);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Preloading);
        h.tick(200.0, 0.3);
        assert_eq!(h.track(0).unwrap().track.status(), TrackStatus::Loading);
    }

    struct SilentSynth;

    impl SynthProcessor for SilentSynth {
        fn handshake(&mut self, _sample_rate: u32, _params: &SynthParams) -> HandshakeReply {
            HandshakeReply::WrongSampleRate { supported: 22050 }
        }

        fn set_param(&mut self, _name: &str, _value: f32) {}

        fn render(&mut self, out: &mut [f32], _channels: u16) {
            out.fill(0.0);
        }
    }

    struct SilentFactory;

    impl SynthFactory for SilentFactory {
        fn create(&self, _record: &EmitterRecord) -> Result<Box<dyn SynthProcessor>> {
            Ok(Box::new(SilentSynth))
        }
    }

    #[test]
    fn test_live_handshake_failure_reaches_the_track() {
        let spawner = ManualSpawner::new();
        let (_mixer, handle) = Mixer::new(48000, 2);
        let strategy =
            LiveStrategy::new(Arc::new(SilentFactory), Arc::new(spawner.clone()), handle, 48000);
        let catalog = Arc::new(EmitterCatalog::from_records(vec![emitter("vtone 5", 0.0)]));
        let mut pool = Pool::new("live", TrackPolicy::new(catalog, Box::new(strategy)));

        let ctx = TickContext::new(Vec2::ZERO, 0.1);
        pool.reconcile(&ctx);
        spawner.run_all();
        pool.reconcile(&TickContext::new(Vec2::ZERO, 0.2));

        let resource = &pool.loaded()[0];
        assert!(resource.track.fault().is_some_and(|fault| fault.contains("22050")));
        assert_eq!(pool.policy().strategy_stats().failed, 1);
    }
}
