//! Event types for GardenSonic
//!
//! Events are what visual collaborators see of the sound world: a glow
//! starts with `TrackStarted` and fades with `TrackStopped`.

use crate::math::Vec2;
use crate::records::{GlowCurve, RecordId};
use crate::track::TrackId;

#[derive(Debug, Clone, PartialEq)]
pub enum GardenSonicEvent {
    /// The track pool created a track and began preloading it.
    TrackPreloading {
        track: TrackId,
        record: RecordId,
    },
    /// The track is audible.
    TrackStarted {
        track: TrackId,
        record: RecordId,
        position: Vec2,
        glow_curve: GlowCurve,
    },
    /// The track was removed from the working set.
    TrackStopped {
        track: TrackId,
        record: RecordId,
    },
    /// Loading or the synthesis handshake failed; the track stays silent.
    TrackFailed {
        track: TrackId,
        record: RecordId,
        error: String,
    },
    /// The wake radius finished ramping up after `begin_wake_intro`.
    WakeRampCompleted,
    PoolRegistered {
        name: String,
    },
    PoolRemoved {
        name: String,
    },
    EngineStarted,
    EngineStopped,
    EngineError {
        error: String,
    },
}

impl GardenSonicEvent {
    pub fn track_id(&self) -> Option<TrackId> {
        match self {
            Self::TrackPreloading { track, .. }
            | Self::TrackStarted { track, .. }
            | Self::TrackStopped { track, .. }
            | Self::TrackFailed { track, .. } => Some(*track),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::TrackFailed { .. } | Self::EngineError { .. })
    }

    pub fn is_track_event(&self) -> bool {
        self.track_id().is_some()
    }
}
