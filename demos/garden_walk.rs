use anyhow::Context;
use gardensonic::math::Vec2;
use gardensonic::playback::{HandshakeReply, SynthFactory, SynthParams, SynthProcessor};
use gardensonic::policies::{FormFactory, ZoneMaterializer};
use gardensonic::task::ThreadSpawner;
use gardensonic::{
    EmitterCatalog, EmitterRecord, FormPolicy, GardenSonicEngine, GardenSonicEvent,
    GardenSonicWorld, GardenSonicWorldDesc, LiveStrategy, Mixer, Pool, TrackPolicy, ZonePolicy,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A sine at the record's first frequency, faded by its `amp` param.
struct Sine {
    freq: f32,
    sample_rate: f32,
    phase: f32,
    amp: f32,
    target_amp: f32,
}

impl SynthProcessor for Sine {
    fn handshake(&mut self, sample_rate: u32, params: &SynthParams) -> HandshakeReply {
        self.sample_rate = sample_rate as f32;
        self.target_amp = params.get("amp").unwrap_or(0.0);
        HandshakeReply::Ready
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name == "amp" {
            self.target_amp = value;
        }
    }

    fn render(&mut self, out: &mut [f32], channels: u16) {
        let channels = channels.max(1) as usize;
        for frame in out.chunks_mut(channels) {
            self.amp += (self.target_amp - self.amp) * 0.001;
            let sample = (self.phase * std::f32::consts::TAU).sin() * 0.1 * self.amp;
            frame.fill(sample);
            self.phase = (self.phase + self.freq / self.sample_rate).fract();
        }
    }
}

struct SineFactory;

impl SynthFactory for SineFactory {
    fn create(&self, record: &EmitterRecord) -> gardensonic::Result<Box<dyn SynthProcessor>> {
        Ok(Box::new(Sine {
            freq: record.number("freq1").unwrap_or(220.0),
            sample_rate: 48000.0,
            phase: 0.0,
            amp: 0.0,
            target_amp: 0.0,
        }))
    }
}

/// Tiles are only their corner positions here.
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

struct Labels;

impl FormFactory for Labels {
    type Form = String;

    fn materialize(&mut self, record: &EmitterRecord, position: Vec2) -> String {
        log::debug!("Raising {} at {}", record.patch_name, position);
        record.patch_name.clone()
    }

    fn dispose(&mut self, form: &mut String) {
        log::debug!("Lowering {}", form);
    }
}

fn catalog() -> anyhow::Result<EmitterCatalog> {
    let records = [
        ("vib 2 3 + 1", 0.0, 0.0),
        ("sdrone 1 2", 400.0, 60.0),
        ("wbell 4 3/2", 800.0, -40.0),
        ("hseri 3/2", 1200.0, 0.0),
    ]
    .into_iter()
    .map(|(desc, x, z)| EmitterRecord::parse(desc, x, z))
    .collect::<gardensonic::Result<Vec<_>>>()
    .context("parsing the demo emitters")?;
    Ok(EmitterCatalog::from_records(records))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let desc = GardenSonicWorldDesc::default();
    let catalog = Arc::new(catalog()?);
    let (mixer, handle) = Mixer::new(desc.sample_rate, desc.channels);

    let strategy = LiveStrategy::new(
        Arc::new(SineFactory),
        Arc::new(ThreadSpawner::new("garden-synth")),
        handle.clone(),
        desc.sample_rate,
    );

    let mut world = GardenSonicWorld::new(desc.clone())?.with_mixer(handle);
    world.set_volume(0.8);
    world.add_pool(Pool::new("zones", ZonePolicy::new(Tiles, 200.0, 3)))?;
    world.add_pool(Pool::new("forms", FormPolicy::new(catalog.clone(), Labels)))?;
    world.add_track_pool(Pool::new(
        "tracks",
        TrackPolicy::new(catalog, Box::new(strategy)),
    ))?;

    let mut engine = GardenSonicEngine::new(desc, mixer)?.with_events(world.event_sender());
    if let Err(e) = engine.start() {
        log::warn!("No audio output ({}); walking in silence", e);
    }

    world.begin_wake_intro()?;

    // Walk east along the row of emitters at 80 units per second.
    let walk = Duration::from_secs(20);
    let started = Instant::now();
    let mut last = started;
    while started.elapsed() < walk {
        std::thread::sleep(Duration::from_millis(16));
        let now = Instant::now();
        let x = started.elapsed().as_secs_f32() * 80.0 - 200.0;
        world.step(Vec2::new(x, 0.0), now - last);
        last = now;

        for event in world.poll_events() {
            match event {
                GardenSonicEvent::TrackStarted { track, position, .. } => {
                    println!("{} glows at {}", track, position)
                }
                GardenSonicEvent::TrackStopped { track, .. } => println!("{} goes dark", track),
                event if event.is_error() => println!("{:?}", event),
                _ => {}
            }
        }
    }

    println!(
        "Walked to x={:.0}, {} frames rendered",
        world.observer().x,
        engine.frames_processed()
    );
    engine.stop()?;
    Ok(())
}
