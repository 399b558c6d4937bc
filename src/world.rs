use crate::clock::WorldClock;
use crate::config::GardenSonicWorldDesc;
use crate::error::{GardenSonicError, Result};
use crate::events::GardenSonicEvent;
use crate::math::Vec2;
use crate::mixer::MixerHandle;
use crate::policies::TrackPolicy;
use crate::pool::{Pool, PoolPolicy, PoolRegistry, ReconcileStats, TickContext};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::time::Duration;

/// The orchestration loop.
///
/// `GardenSonicWorld` owns every resource pool and the world clock. The host
/// calls [`GardenSonicWorld::step`] once per frame with the observer's ground
/// position; each step that passes the minimum step length advances world
/// time and reconciles every pool, in registration order, against the same
/// [`TickContext`]. The amplitude pass of the sound emitters runs inside the
/// track pool's `after_update`.
///
/// One pool may be designated the track pool; the run-mode, floor, radius,
/// wake intro and loading queries go to it. With a mixer attached, pausing
/// suspends the audio output and the volume setting drives its master gain.
pub struct GardenSonicWorld {
    desc: GardenSonicWorldDesc,
    registry: PoolRegistry,
    clock: WorldClock,
    pending: Duration,
    observer: Vec2,
    track_pool: Option<String>,
    mixer: Option<MixerHandle>,
    volume: f32,
    event_sender: Sender<GardenSonicEvent>,
    event_receiver: Receiver<GardenSonicEvent>,
}

impl GardenSonicWorld {
    pub fn new(desc: GardenSonicWorldDesc) -> Result<Self> {
        if desc.channels == 0 || desc.sample_rate == 0 {
            return Err(GardenSonicError::Configuration(format!(
                "{} Hz x {} channels is not a valid output",
                desc.sample_rate, desc.channels
            )));
        }
        let (event_sender, event_receiver) = unbounded();
        Ok(Self {
            clock: WorldClock::new(desc.max_step),
            desc,
            registry: PoolRegistry::new(),
            pending: Duration::ZERO,
            observer: Vec2::ZERO,
            track_pool: None,
            mixer: None,
            volume: 1.0,
            event_sender,
            event_receiver,
        })
    }

    /// Routes pause and volume to the mixer behind `handle`.
    pub fn with_mixer(mut self, handle: MixerHandle) -> Self {
        self.attach_mixer(handle);
        self
    }

    pub fn attach_mixer(&mut self, handle: MixerHandle) {
        handle.set_master_gain(self.volume);
        handle.set_suspended(self.clock.is_paused());
        self.mixer = Some(handle);
    }

    pub fn config(&self) -> &GardenSonicWorldDesc {
        &self.desc
    }

    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    pub fn world_time(&self) -> f64 {
        self.clock.world_time()
    }

    /// Observer position of the most recent step.
    pub fn observer(&self) -> Vec2 {
        self.observer
    }

    /// Sender for collaborators that report into the world's event stream.
    pub fn event_sender(&self) -> Sender<GardenSonicEvent> {
        self.event_sender.clone()
    }

    /// Drains every event produced since the last call.
    pub fn poll_events(&self) -> Vec<GardenSonicEvent> {
        self.event_receiver.try_iter().collect()
    }

    pub fn add_pool<P: PoolPolicy + 'static>(&mut self, pool: Pool<P>) -> Result<()> {
        let name = pool.name().to_string();
        self.registry.add_pool(pool)?;
        self.emit(GardenSonicEvent::PoolRegistered { name });
        Ok(())
    }

    /// Registers the pool of sound emitters and routes its events into the
    /// world's stream.
    pub fn add_track_pool(&mut self, mut pool: Pool<TrackPolicy>) -> Result<()> {
        if let Some(existing) = &self.track_pool {
            return Err(GardenSonicError::DuplicatePool(existing.clone()));
        }
        let name = pool.name().to_string();
        pool.policy_mut().set_events(self.event_sender.clone());
        self.add_pool(pool)?;
        self.track_pool = Some(name);
        Ok(())
    }

    /// Unregisters a pool; everything it still holds is removed first.
    pub fn remove_pool(&mut self, name: &str) -> Result<()> {
        self.registry.remove_pool(name)?;
        if self.track_pool.as_deref() == Some(name) {
            self.track_pool = None;
        }
        self.emit(GardenSonicEvent::PoolRemoved {
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn pool<P: PoolPolicy + 'static>(&self, name: &str) -> Option<&Pool<P>> {
        self.registry.pool(name)
    }

    pub fn pool_mut<P: PoolPolicy + 'static>(&mut self, name: &str) -> Option<&mut Pool<P>> {
        self.registry.pool_mut(name)
    }

    pub fn track_pool(&self) -> Option<&Pool<TrackPolicy>> {
        self.track_pool
            .as_deref()
            .and_then(|name| self.registry.pool(name))
    }

    fn track_pool_mut(&mut self) -> Result<&mut Pool<TrackPolicy>> {
        let name = self
            .track_pool
            .as_deref()
            .ok_or_else(|| GardenSonicError::UnknownPool("tracks".into()))?;
        self.registry
            .pool_mut(name)
            .ok_or_else(|| GardenSonicError::UnknownPool(name.to_string()))
    }

    /// Advances the world by `elapsed` and reconciles every pool around
    /// `observer`.
    ///
    /// Steps shorter than `min_step` are accumulated and skipped; `None` is
    /// returned for them and while paused.
    pub fn step(&mut self, observer: Vec2, elapsed: Duration) -> Option<ReconcileStats> {
        self.observer = observer;
        if self.clock.is_paused() {
            return None;
        }
        self.pending += elapsed;
        if self.pending < self.desc.min_step {
            return None;
        }
        let elapsed = std::mem::take(&mut self.pending);
        self.clock.advance(elapsed);
        Some(self.reconcile())
    }

    /// Fixed-rate tick between frames: reconciles at the last observer
    /// position without advancing world time.
    pub fn aux_step(&mut self) -> Option<ReconcileStats> {
        if self.clock.is_paused() {
            return None;
        }
        Some(self.reconcile())
    }

    pub fn aux_interval(&self) -> Duration {
        self.desc.aux_tick
    }

    fn reconcile(&mut self) -> ReconcileStats {
        let ctx = TickContext::new(self.observer, self.clock.world_time());
        let stats = self.registry.update_all(&ctx);
        if !stats.is_quiet() {
            log::debug!(
                "Step at {:.2}s: +{} -{} ({} retained)",
                ctx.world_time,
                stats.added,
                stats.removed,
                stats.retained
            );
        }
        stats
    }

    /// Stops world time and suspends the attached mixer.
    pub fn pause(&mut self) {
        log::info!("World paused at {:.2}s", self.clock.world_time());
        self.clock.pause();
        self.pending = Duration::ZERO;
        if let Some(mixer) = &self.mixer {
            mixer.set_suspended(true);
        }
    }

    pub fn resume(&mut self) {
        log::info!("World resumed");
        self.clock.resume();
        if let Some(mixer) = &self.mixer {
            mixer.set_suspended(false);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// Master volume, clamped to `0..=1`.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        log::debug!("Volume {:.2}", self.volume);
        match &self.mixer {
            Some(mixer) => mixer.set_master_gain(self.volume),
            None => log::warn!("No mixer attached; volume is only remembered"),
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Moves the wake radius and the preload distance of the track pool.
    pub fn set_radius(&mut self, radius: f32) -> Result<()> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(GardenSonicError::Configuration(format!(
                "wake radius {} must be positive",
                radius
            )));
        }
        self.track_pool_mut()?.policy_mut().set_radius(radius);
        Ok(())
    }

    /// Turns the sound world on or off. While off no track is started and
    /// amplitudes are left alone; tracks already playing fade out on their
    /// own schedule once the observer leaves them.
    pub fn set_run_mode(&mut self, enabled: bool) -> Result<()> {
        log::info!("Run mode {}", if enabled { "on" } else { "off" });
        self.track_pool_mut()?.policy_mut().set_enabled(enabled);
        Ok(())
    }

    pub fn set_floor(&mut self, floor: i32) -> Result<()> {
        self.track_pool_mut()?.policy_mut().set_floor(floor);
        Ok(())
    }

    /// Starts the wake radius ramp at the current world time.
    pub fn begin_wake_intro(&mut self) -> Result<()> {
        let now = self.clock.world_time();
        self.track_pool_mut()?.policy_mut().begin_wake_intro(now);
        Ok(())
    }

    /// True while some track has been asked to start and has not yet
    /// sounded or failed.
    pub fn any_loading(&self) -> bool {
        self.track_pool()
            .is_some_and(|pool| pool.policy().any_loading())
    }

    fn emit(&self, event: GardenSonicEvent) {
        let _ = self.event_sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_data::{LoadOptions, SegmentData, SegmentLoader};
    use crate::mixer::{Mixer, Voice};
    use crate::playback::FrozenStrategy;
    use crate::policies::{ZoneMaterializer, ZonePolicy};
    use crate::records::{EmitterCatalog, EmitterRecord};
    use crate::task::ManualSpawner;
    use std::sync::Arc;

    struct Tiles;

    impl ZoneMaterializer for Tiles {
        type Mesh = Vec2;

        fn create(&mut self) -> Vec2 {
            Vec2::ZERO
        }

        fn place(&mut self, mesh: &mut Vec2, origin: Vec2) {
            *mesh = origin;
        }
    }

    struct Silence;

    impl SegmentLoader for Silence {
        fn load(&self, _location: &str, _options: &LoadOptions) -> Result<SegmentData> {
            SegmentData::from_samples(vec![0.0; 4800], 48000, 1)
        }
    }

    fn world() -> GardenSonicWorld {
        GardenSonicWorld::new(GardenSonicWorldDesc::default()).unwrap()
    }

    fn track_pool(spawner: &ManualSpawner) -> Pool<TrackPolicy> {
        let (_mixer, handle) = Mixer::new(48000, 2);
        let strategy = FrozenStrategy::new(
            Arc::new(Silence),
            Arc::new(spawner.clone()),
            handle,
            48000,
        );
        let catalog = EmitterCatalog::from_records(vec![
            EmitterRecord::parse("vib 2 3 + 1", 0.0, 0.0).unwrap(),
            EmitterRecord::parse("sdrone 1 2", 0.0, 0.0).unwrap().with_floor(1),
        ]);
        Pool::new("tracks", TrackPolicy::new(Arc::new(catalog), Box::new(strategy)))
    }

    #[test]
    fn test_short_steps_accumulate() {
        let mut world = world();
        world
            .add_pool(Pool::new("zones", ZonePolicy::new(Tiles, 100.0, 1)))
            .unwrap();

        let short = Duration::from_millis(5);
        assert!(world.step(Vec2::ZERO, short).is_none());
        assert!(world.step(Vec2::ZERO, short).is_none());
        let stats = world.step(Vec2::ZERO, short).unwrap();
        assert_eq!(stats.added, 4);
        assert!((world.world_time() - 0.015).abs() < 1e-9);
    }

    #[test]
    fn test_pause_freezes_time_and_pools() {
        let mut world = world();
        world
            .add_pool(Pool::new("zones", ZonePolicy::new(Tiles, 100.0, 1)))
            .unwrap();
        world.step(Vec2::ZERO, Duration::from_millis(20));

        world.pause();
        assert!(world.step(Vec2::new(1000.0, 0.0), Duration::from_secs(1)).is_none());
        assert!(world.aux_step().is_none());
        assert!((world.world_time() - 0.02).abs() < 1e-9);

        world.resume();
        let stats = world.step(Vec2::new(1000.0, 0.0), Duration::from_secs(5)).unwrap();
        assert_eq!(stats.removed, 4);
        // Clamped to max_step
        assert!((world.world_time() - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_pool_registration_events() {
        let mut world = world();
        world
            .add_pool(Pool::new("zones", ZonePolicy::new(Tiles, 100.0, 1)))
            .unwrap();
        assert!(matches!(
            world.add_pool(Pool::new("zones", ZonePolicy::new(Tiles, 100.0, 1))),
            Err(GardenSonicError::DuplicatePool(_))
        ));
        world.remove_pool("zones").unwrap();

        let events = world.poll_events();
        assert_eq!(
            events,
            vec![
                GardenSonicEvent::PoolRegistered {
                    name: "zones".into()
                },
                GardenSonicEvent::PoolRemoved {
                    name: "zones".into()
                },
            ]
        );
    }

    #[test]
    fn test_track_pool_controls() {
        let mut world = world();
        assert!(matches!(
            world.set_floor(1),
            Err(GardenSonicError::UnknownPool(_))
        ));

        let spawner = ManualSpawner::new();
        world.add_track_pool(track_pool(&spawner)).unwrap();
        world.step(Vec2::ZERO, Duration::from_millis(20));
        assert!(world.any_loading());
        assert_eq!(world.track_pool().unwrap().loaded().len(), 1);

        // The started track stays; the other floor's record joins it.
        world.set_floor(1).unwrap();
        world.step(Vec2::ZERO, Duration::from_millis(20));
        let loaded = world.track_pool().unwrap().loaded();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].record.index(), 0);

        world.set_run_mode(false).unwrap();
        world.step(Vec2::ZERO, Duration::from_millis(20));
        assert_eq!(world.track_pool().unwrap().loaded().len(), 2);
        assert!(!world.track_pool().unwrap().policy().is_enabled());

        world.remove_pool("tracks").unwrap();
        assert!(!world.any_loading());
        let events = world.poll_events();
        assert!(events
            .iter()
            .any(|event| matches!(event, GardenSonicEvent::TrackPreloading { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|event| matches!(event, GardenSonicEvent::TrackStopped { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_radius_goes_to_the_track_pool() {
        let mut world = world();
        assert!(matches!(
            world.set_radius(300.0),
            Err(GardenSonicError::UnknownPool(_))
        ));
        let spawner = ManualSpawner::new();
        world.add_track_pool(track_pool(&spawner)).unwrap();
        assert!(matches!(
            world.set_radius(0.0),
            Err(GardenSonicError::Configuration(_))
        ));

        // Out of reach at the default preload distance of 330.
        world.step(Vec2::new(380.0, 0.0), Duration::from_millis(20));
        assert!(world.track_pool().unwrap().loaded().is_empty());

        world.set_radius(300.0).unwrap();
        world.step(Vec2::new(380.0, 0.0), Duration::from_millis(20));
        assert_eq!(world.track_pool().unwrap().loaded().len(), 1);
    }

    #[test]
    fn test_wake_intro_uses_world_time() {
        let mut world = world();
        let spawner = ManualSpawner::new();
        world.add_track_pool(track_pool(&spawner)).unwrap();
        world.step(Vec2::new(200.0, 0.0), Duration::from_millis(20));
        world.begin_wake_intro().unwrap();

        // The ramp pauses for the one step the woken track spends loading.
        for _ in 0..12 {
            world.step(Vec2::new(200.0, 0.0), Duration::from_millis(200));
            spawner.run_all();
        }
        let policy = world.track_pool().unwrap().policy();
        assert_eq!(policy.wake().mul(), 1.0);
        assert!(world
            .poll_events()
            .contains(&GardenSonicEvent::WakeRampCompleted));
    }

    struct Dc;

    impl Voice for Dc {
        fn render(&mut self, out: &mut [f32], _channels: u16, _sample_rate: u32) {
            out.fill(1.0);
        }
    }

    #[test]
    fn test_pause_suspends_the_mixer() {
        let (mut mixer, handle) = Mixer::new(48000, 1);
        handle.connect(Box::new(Dc), 1.0);
        let mut world = world().with_mixer(handle);
        let mut block = vec![0.0f32; 4];

        world.pause();
        assert_eq!(mixer.render(&mut block), 0);
        assert_eq!(block, vec![0.0; 4]);

        world.resume();
        assert_eq!(mixer.render(&mut block), 4);
        assert_eq!(block, vec![1.0; 4]);
    }

    #[test]
    fn test_volume_drives_master_gain() {
        let (mut mixer, handle) = Mixer::new(48000, 1);
        handle.connect(Box::new(Dc), 1.0);
        let mut world = world();
        world.set_volume(0.5);
        world.attach_mixer(handle);

        let mut block = vec![0.0f32; 4];
        mixer.render(&mut block);
        mixer.render(&mut block);
        assert_eq!(block, vec![0.5; 4]);

        world.set_volume(3.0);
        assert_eq!(world.volume(), 1.0);
        mixer.render(&mut block);
        mixer.render(&mut block);
        assert_eq!(block, vec![1.0; 4]);
    }
}
