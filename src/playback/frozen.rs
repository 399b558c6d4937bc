use super::segments::{SegmentChain, SegmentSet};
use super::{PlaybackEvent, PlaybackStrategy, StrategyStats};
use crate::audio_data::{LoadOptions, SegmentLoader};
use crate::config::CrossfadeConfig;
use crate::error::Result;
use crate::mixer::{MixerHandle, VoiceId};
use crate::records::EmitterRecord;
use crate::task::TaskSpawner;
use crate::track::{Epoch, TrackId};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;

struct Completion {
    track: TrackId,
    epoch: Epoch,
    result: Result<SegmentSet>,
}

enum TicketState {
    /// Segments are loading; `requested` holds the amplitude to start at once
    /// they arrive, if `play` already came in.
    Loading { requested: Option<f32> },
    Ready(SegmentSet),
    Playing(VoiceId),
    Failed,
}

struct Ticket {
    epoch: Epoch,
    state: TicketState,
}

/// Plays emitters from pre-rendered intro and loop recordings.
///
/// `preload` fetches both segments on a background task; `play` connects a
/// [`SegmentChain`] to the mixer as soon as they are in memory.
pub struct FrozenStrategy {
    loader: Arc<dyn SegmentLoader>,
    spawner: Arc<dyn TaskSpawner>,
    mixer: MixerHandle,
    crossfade: CrossfadeConfig,
    load_options: LoadOptions,
    sample_rate: u32,
    tickets: HashMap<TrackId, Ticket>,
    last_epoch: Epoch,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    events: Vec<PlaybackEvent>,
    stats: StrategyStats,
}

impl FrozenStrategy {
    pub fn new(
        loader: Arc<dyn SegmentLoader>,
        spawner: Arc<dyn TaskSpawner>,
        mixer: MixerHandle,
        sample_rate: u32,
    ) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            loader,
            spawner,
            mixer,
            crossfade: CrossfadeConfig::default(),
            load_options: LoadOptions::default().target_sample_rate(sample_rate),
            sample_rate,
            tickets: HashMap::new(),
            last_epoch: Epoch::default(),
            completion_tx,
            completion_rx,
            events: Vec::new(),
            stats: StrategyStats::default(),
        }
    }

    pub fn with_crossfade(mut self, crossfade: CrossfadeConfig) -> Self {
        self.crossfade = crossfade;
        self
    }

    pub fn crossfade(&self) -> &CrossfadeConfig {
        &self.crossfade
    }

    /// Tracks the strategy still holds anything for.
    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    fn connect(&mut self, track: TrackId, segments: SegmentSet, gain: f32) -> VoiceId {
        let chain = SegmentChain::new(segments, &self.crossfade, self.sample_rate);
        let voice = self.mixer.connect(Box::new(chain), gain);
        self.stats.connected += 1;
        self.events.push(PlaybackEvent::Started(track));
        log::debug!("{} connected as {}", track, voice);
        voice
    }

    fn apply(&mut self, completion: Completion) {
        let Completion {
            track,
            epoch,
            result,
        } = completion;

        let current = match self.tickets.remove(&track) {
            Some(ticket) if ticket.epoch == epoch => ticket,
            other => {
                if let Some(ticket) = other {
                    self.tickets.insert(track, ticket);
                }
                if result.is_ok() {
                    self.stats.released += 1;
                }
                log::debug!("Released stale segments of {} ({:?})", track, epoch);
                return;
            }
        };

        let state = match (current.state, result) {
            (TicketState::Loading { requested }, Ok(segments)) => match requested {
                Some(gain) => TicketState::Playing(self.connect(track, segments, gain)),
                None => TicketState::Ready(segments),
            },
            (TicketState::Loading { .. }, Err(error)) => {
                self.stats.failed += 1;
                self.events.push(PlaybackEvent::Failed { track, error });
                TicketState::Failed
            }
            (state, result) => {
                // Only loading tickets wait for a completion.
                if result.is_ok() {
                    self.stats.released += 1;
                }
                state
            }
        };
        self.tickets.insert(
            track,
            Ticket {
                epoch: current.epoch,
                state,
            },
        );
    }
}

impl PlaybackStrategy for FrozenStrategy {
    fn name(&self) -> &'static str {
        "frozen"
    }

    fn preload(&mut self, track: TrackId, record: &EmitterRecord) {
        if self
            .tickets
            .get(&track)
            .is_some_and(|ticket| !matches!(ticket.state, TicketState::Failed))
        {
            return;
        }

        self.last_epoch = self.last_epoch.next();
        let epoch = self.last_epoch;
        self.tickets.insert(
            track,
            Ticket {
                epoch,
                state: TicketState::Loading { requested: None },
            },
        );

        let loader = self.loader.clone();
        let options = self.load_options.clone();
        let intro = record.intro_location.clone();
        let looped = record.loop_location.clone();
        let sender = self.completion_tx.clone();
        self.spawner.spawn(Box::new(move || {
            let result = loader.load(&intro, &options).and_then(|intro| {
                let looped = loader.load(&looped, &options)?;
                Ok(SegmentSet::new(intro, looped))
            });
            // The strategy may be gone; nothing to hand the segments to then.
            let _ = sender.send(Completion {
                track,
                epoch,
                result,
            });
        }));
    }

    fn play(&mut self, track: TrackId, record: &EmitterRecord, proximity: f32) {
        if !self.tickets.contains_key(&track) {
            self.preload(track, record);
        }
        let Some(mut ticket) = self.tickets.remove(&track) else {
            return;
        };
        ticket.state = match ticket.state {
            TicketState::Loading { .. } => TicketState::Loading {
                requested: Some(proximity),
            },
            TicketState::Ready(segments) => {
                TicketState::Playing(self.connect(track, segments, proximity))
            }
            state => state,
        };
        self.tickets.insert(track, ticket);
    }

    fn stop(&mut self, track: TrackId) {
        let Some(ticket) = self.tickets.remove(&track) else {
            return;
        };
        match ticket.state {
            // The completion finds no ticket and releases the payload.
            TicketState::Loading { .. } => {}
            TicketState::Ready(_) => self.stats.released += 1,
            TicketState::Playing(voice) => {
                self.mixer.disconnect(voice);
                self.stats.disconnected += 1;
            }
            TicketState::Failed => {}
        }
    }

    fn set_amp(&mut self, track: TrackId, amp: f32) {
        match self.tickets.get_mut(&track).map(|ticket| &mut ticket.state) {
            Some(TicketState::Playing(voice)) => self.mixer.set_gain(*voice, amp),
            Some(TicketState::Loading {
                requested: Some(requested),
            }) => *requested = amp,
            _ => {}
        }
    }

    fn poll(&mut self) -> Vec<PlaybackEvent> {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply(completion);
        }
        std::mem::take(&mut self.events)
    }

    fn stats(&self) -> StrategyStats {
        self.stats
    }
}
