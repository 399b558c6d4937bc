//! GardenSonic keeps only the nearby part of a large walkable world alive.
//!
//! Terrain tiles, decorative forms and sound emitters each live in a
//! [`Pool`] reconciled against the observer's position every tick. Sound
//! emitters are preloaded as the observer approaches, start inside a wake
//! radius that widens after the intro, and fade with distance until they
//! fall silent and are released.

pub mod audio_data;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
pub mod mixer;
pub mod playback;
pub mod policies;
pub mod pool;
pub mod records;
pub mod task;
pub mod track;
pub mod world;

pub use config::{
    CrossfadeConfig, CrossfadeShape, GardenSonicWorldDesc, PoolLimits, TrackTuning, WakeConfig,
};
pub use engine::GardenSonicEngine;
pub use error::{GardenSonicError, Result};
pub use events::GardenSonicEvent;
pub use mixer::{Mixer, MixerHandle};
pub use playback::{FrozenStrategy, LiveStrategy, PlaybackStrategy};
pub use policies::{FormPolicy, TrackPolicy, ZonePolicy};
pub use pool::{Pool, PoolPolicy, PoolRegistry, TickContext};
pub use records::{EmitterCatalog, EmitterRecord, RecordId};
pub use track::{Track, TrackId, TrackStatus};
pub use world::GardenSonicWorld;
