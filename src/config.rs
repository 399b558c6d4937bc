//! Configuration for GardenSonic
//!
//! Every constant here was picked by ear or by eye. They are defaults, not
//! invariants: override them through the builder-style setters.

use std::time::Duration;

/// Configuration descriptor for a GardenSonic world
#[derive(Debug, Clone)]
pub struct GardenSonicWorldDesc {
    /// Sample rate the mixer renders at; loaded segments are resampled to it
    pub sample_rate: u32,
    /// Frames per output block requested from the audio device
    pub block_size: usize,
    /// Number of output channels (typically 2 for stereo)
    pub channels: u16,
    /// Steps shorter than this are skipped by the orchestration loop
    pub min_step: Duration,
    /// A single step never advances world time by more than this
    pub max_step: Duration,
    /// Interval of the auxiliary polling tick
    pub aux_tick: Duration,
}

impl Default for GardenSonicWorldDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 1024,
            channels: 2,
            min_step: Duration::from_secs_f64(1.0 / 80.0),
            max_step: Duration::from_secs(1),
            aux_tick: Duration::from_millis(125),
        }
    }
}

impl GardenSonicWorldDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn min_step(mut self, step: Duration) -> Self {
        self.min_step = step;
        self
    }

    pub fn aux_tick(mut self, tick: Duration) -> Self {
        self.aux_tick = tick;
        self
    }
}

/// Amplitude model of a single track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackTuning {
    /// Release rate `k` in `amp / exp(dt * k)`. 0.25 fades in ~12s, 0.15 in ~20s.
    pub decay_rate: f64,
    /// Below this amplitude a track counts as silent
    pub audibility_floor: f32,
    /// Silence longer than this makes `is_done` true
    pub grace_window: f64,
    /// Woken tracks start at `floor + proximity * (1 - floor)`
    pub seed_floor: f32,
    /// Minimum world time between two proximity pushes
    pub proximity_interval: f64,
}

impl Default for TrackTuning {
    fn default() -> Self {
        Self {
            decay_rate: 0.15,
            audibility_floor: 0.05,
            grace_window: 10.0,
            seed_floor: 0.7,
            proximity_interval: 0.1,
        }
    }
}

impl TrackTuning {
    pub fn decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = rate;
        self
    }

    pub fn audibility_floor(mut self, floor: f32) -> Self {
        self.audibility_floor = floor;
        self
    }

    pub fn grace_window(mut self, seconds: f64) -> Self {
        self.grace_window = seconds;
        self
    }

    pub fn seed_floor(mut self, floor: f32) -> Self {
        self.seed_floor = floor;
        self
    }
}

/// Distances that decide when tracks exist, wake up, and fall silent.
///
/// All radii are multiplied by the record's `reach`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WakeConfig {
    /// Loudness reaches zero at this distance
    pub hush_radius: f32,
    /// Tracks are created (preloaded) inside this distance
    pub preload_radius: f32,
    /// Already loaded tracks survive until `preload_radius + release_margin`
    pub release_margin: f32,
    /// Steady-state wake distance
    pub wake_radius: f32,
    /// Wake multiplier before and at the start of the intro ramp
    pub wake_start_mul: f32,
    /// Multiplier growth per second of world time during the ramp
    pub wake_ramp_rate: f32,
    /// When the radius setting changes, tracks preload this far beyond the
    /// new wake radius
    pub load_lead: f32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            hush_radius: 330.0,
            preload_radius: 330.0,
            release_margin: 40.0,
            wake_radius: 250.0,
            wake_start_mul: 0.7,
            wake_ramp_rate: 0.2,
            load_lead: 100.0,
        }
    }
}

impl WakeConfig {
    pub fn hush_radius(mut self, radius: f32) -> Self {
        self.hush_radius = radius;
        self
    }

    pub fn preload_radius(mut self, radius: f32) -> Self {
        self.preload_radius = radius;
        self
    }

    pub fn release_margin(mut self, margin: f32) -> Self {
        self.release_margin = margin;
        self
    }

    pub fn wake_radius(mut self, radius: f32) -> Self {
        self.wake_radius = radius;
        self
    }

    /// Moves the wake radius and the preload distance together.
    pub fn radius(mut self, radius: f32) -> Self {
        self.wake_radius = radius;
        self.preload_radius = radius + self.load_lead;
        self
    }
}

/// How overlapping segments are blended during a splice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossfadeShape {
    /// Both segments play at full gain; the recordings carry their own fades
    #[default]
    Overlap,
    /// Cosine fade-out of the outgoing and fade-in of the incoming segment
    EqualPower,
}

/// Splice timing of the pre-rendered segment strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeConfig {
    /// Overlap between consecutive segments
    pub window: Duration,
    /// Extra lead so the next segment never starts late
    pub margin: Duration,
    pub shape: CrossfadeShape,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(2),
            margin: Duration::from_millis(100),
            shape: CrossfadeShape::Overlap,
        }
    }
}

impl CrossfadeConfig {
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn shape(mut self, shape: CrossfadeShape) -> Self {
        self.shape = shape;
        self
    }
}

/// Bookkeeping limits of a resource pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Removed resources kept around as recycling hints
    pub dead_capacity: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self { dead_capacity: 64 }
    }
}
