//! Realizations of "make this emitter sound".
//!
//! The track policy owns one [`PlaybackStrategy`] and drives it with track
//! ids. Starting is asynchronous: `preload` and `play` only issue work, and
//! the outcome comes back through [`PlaybackStrategy::poll`]. Every start
//! carries an [`Epoch`]; a completion whose ticket is gone or has moved on
//! is released instead of connected.
//!
//! [`Epoch`]: crate::track::Epoch

mod frozen;
mod live;
mod segments;

pub use frozen::FrozenStrategy;
pub use live::{HandshakeReply, LiveStrategy, SynthFactory, SynthParams, SynthProcessor};
pub use segments::{SegmentChain, SegmentSet, SegmentSlot, SpliceEvent};

use crate::error::GardenSonicError;
use crate::records::EmitterRecord;
use crate::track::TrackId;

/// Outcome of an asynchronous start, reported by `poll`.
#[derive(Debug)]
pub enum PlaybackEvent {
    /// Audio for the track is being produced.
    Started(TrackId),
    /// The start was abandoned for good.
    Failed {
        track: TrackId,
        error: GardenSonicError,
    },
}

impl PlaybackEvent {
    pub fn track(&self) -> TrackId {
        match self {
            Self::Started(track) => *track,
            Self::Failed { track, .. } => *track,
        }
    }
}

/// Counters kept by a strategy, mostly for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyStats {
    /// Voices handed to the mixer
    pub connected: usize,
    /// Voices taken back from the mixer by `stop`
    pub disconnected: usize,
    /// Loaded payloads dropped without ever being connected
    pub released: usize,
    pub failed: usize,
}

pub trait PlaybackStrategy {
    fn name(&self) -> &'static str;

    /// Starts fetching whatever the track needs. Called when the track pool
    /// creates the track.
    fn preload(&mut self, track: TrackId, record: &EmitterRecord);

    /// Requests sound. The track is already `loading` when this is called;
    /// `Started` or `Failed` follows through `poll`.
    fn play(&mut self, track: TrackId, record: &EmitterRecord, proximity: f32);

    /// Releases everything held for the track. Safe in any state, including
    /// while a load or handshake is still in flight.
    fn stop(&mut self, track: TrackId);

    /// Applies a new amplitude to a playing track.
    fn set_amp(&mut self, track: TrackId, amp: f32);

    /// Applies finished background work and returns what happened.
    fn poll(&mut self) -> Vec<PlaybackEvent>;

    fn stats(&self) -> StrategyStats;
}
