use super::{PlaybackEvent, PlaybackStrategy, StrategyStats};
use crate::error::{GardenSonicError, Result};
use crate::mixer::{MixerHandle, Voice, VoiceId};
use crate::records::{EmitterRecord, ParamValue};
use crate::task::TaskSpawner;
use crate::track::{Epoch, TrackId};
use crossbeam_channel::{Receiver, Sender};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Parameters a processor is started with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SynthParams {
    pub patch: String,
    pub values: BTreeMap<String, f32>,
    pub text: BTreeMap<String, String>,
}

impl SynthParams {
    /// The record's parameters plus the starting `amp`.
    pub fn for_record(record: &EmitterRecord, amp: f32) -> Self {
        let mut params = Self {
            patch: record.patch_name.clone(),
            ..Self::default()
        };
        for (name, value) in &record.params {
            match value {
                ParamValue::Number(number) => {
                    params.values.insert(name.clone(), *number);
                }
                ParamValue::Text(text) => {
                    params.text.insert(name.clone(), text.clone());
                }
            }
        }
        params.values.insert("amp".to_string(), amp);
        params
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }
}

/// Answer of a processor's capability handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeReply {
    Ready,
    /// The processor only runs at `supported` Hz.
    WrongSampleRate { supported: u32 },
}

/// A live synthesis process for one emitter.
pub trait SynthProcessor: Send {
    /// Runs once, before the processor is connected.
    fn handshake(&mut self, sample_rate: u32, params: &SynthParams) -> HandshakeReply;

    fn set_param(&mut self, name: &str, value: f32);

    /// Overwrites `out` (interleaved) with the next block.
    fn render(&mut self, out: &mut [f32], channels: u16);
}

/// Builds processors for records. Called on a background task.
pub trait SynthFactory: Send + Sync {
    fn create(&self, record: &EmitterRecord) -> Result<Box<dyn SynthProcessor>>;
}

struct SynthVoice {
    processor: Box<dyn SynthProcessor>,
}

impl Voice for SynthVoice {
    fn render(&mut self, out: &mut [f32], channels: u16, _sample_rate: u32) {
        self.processor.render(out, channels);
    }

    fn set_param(&mut self, name: &str, value: f32) {
        self.processor.set_param(name, value);
    }
}

struct Completion {
    track: TrackId,
    epoch: Epoch,
    result: Result<Box<dyn SynthProcessor>>,
}

enum LiveState {
    Idle,
    Handshaking { amp: f32 },
    Playing(VoiceId),
    Failed,
}

struct Ticket {
    epoch: Epoch,
    state: LiveState,
}

/// Plays emitters through live synthesis processors.
///
/// `play` creates the processor and runs its handshake on a background
/// task. Once ready, the processor lives in the mixer until `stop`;
/// amplitude travels to it as an `amp` control message.
pub struct LiveStrategy {
    factory: Arc<dyn SynthFactory>,
    spawner: Arc<dyn TaskSpawner>,
    mixer: MixerHandle,
    sample_rate: u32,
    tickets: HashMap<TrackId, Ticket>,
    last_epoch: Epoch,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    events: Vec<PlaybackEvent>,
    stats: StrategyStats,
}

impl LiveStrategy {
    pub fn new(
        factory: Arc<dyn SynthFactory>,
        spawner: Arc<dyn TaskSpawner>,
        mixer: MixerHandle,
        sample_rate: u32,
    ) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            factory,
            spawner,
            mixer,
            sample_rate,
            tickets: HashMap::new(),
            last_epoch: Epoch::default(),
            completion_tx,
            completion_rx,
            events: Vec::new(),
            stats: StrategyStats::default(),
        }
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    fn start(&mut self, track: TrackId, record: &EmitterRecord, amp: f32) -> Epoch {
        self.last_epoch = self.last_epoch.next();
        let epoch = self.last_epoch;
        let factory = self.factory.clone();
        let record = record.clone();
        let sample_rate = self.sample_rate;
        let sender = self.completion_tx.clone();

        self.spawner.spawn(Box::new(move || {
            let params = SynthParams::for_record(&record, amp);
            let result = factory.create(&record).and_then(|mut processor| {
                match processor.handshake(sample_rate, &params) {
                    HandshakeReply::Ready => Ok(processor),
                    HandshakeReply::WrongSampleRate { supported } => {
                        Err(GardenSonicError::Handshake(format!(
                            "{} runs at {} Hz, world runs at {} Hz",
                            record.patch_name, supported, sample_rate
                        )))
                    }
                }
            });
            let _ = sender.send(Completion {
                track,
                epoch,
                result,
            });
        }));
        epoch
    }

    fn apply(&mut self, completion: Completion) {
        let Completion {
            track,
            epoch,
            result,
        } = completion;

        let amp = match self.tickets.get(&track) {
            Some(Ticket {
                epoch: current,
                state: LiveState::Handshaking { amp },
            }) if *current == epoch => *amp,
            _ => {
                if result.is_ok() {
                    self.stats.released += 1;
                }
                log::debug!("Released stale processor of {} ({:?})", track, epoch);
                return;
            }
        };

        let state = match result {
            Ok(processor) => {
                let voice = self.mixer.connect(Box::new(SynthVoice { processor }), 1.0);
                self.mixer.set_param(voice, "amp", amp);
                self.stats.connected += 1;
                self.events.push(PlaybackEvent::Started(track));
                log::debug!("{} connected as {}", track, voice);
                LiveState::Playing(voice)
            }
            Err(error) => {
                let error = if matches!(error, GardenSonicError::Handshake(_)) {
                    error
                } else {
                    GardenSonicError::Handshake(error.to_string())
                };
                self.stats.failed += 1;
                self.events.push(PlaybackEvent::Failed { track, error });
                LiveState::Failed
            }
        };
        self.tickets.insert(track, Ticket { epoch, state });
    }
}

impl PlaybackStrategy for LiveStrategy {
    fn name(&self) -> &'static str {
        "live"
    }

    fn preload(&mut self, track: TrackId, _record: &EmitterRecord) {
        // Nothing to fetch ahead of time; the processor is created on play.
        self.tickets.entry(track).or_insert(Ticket {
            epoch: Epoch::default(),
            state: LiveState::Idle,
        });
    }

    fn play(&mut self, track: TrackId, record: &EmitterRecord, proximity: f32) {
        let idle = self
            .tickets
            .get(&track)
            .is_none_or(|ticket| matches!(ticket.state, LiveState::Idle));
        if !idle {
            return;
        }
        let epoch = self.start(track, record, proximity);
        self.tickets.insert(
            track,
            Ticket {
                epoch,
                state: LiveState::Handshaking { amp: proximity },
            },
        );
    }

    fn stop(&mut self, track: TrackId) {
        if let Some(Ticket {
            state: LiveState::Playing(voice),
            ..
        }) = self.tickets.remove(&track)
        {
            self.mixer.disconnect(voice);
            self.stats.disconnected += 1;
        }
    }

    fn set_amp(&mut self, track: TrackId, amp: f32) {
        match self.tickets.get_mut(&track).map(|ticket| &mut ticket.state) {
            Some(LiveState::Playing(voice)) => self.mixer.set_param(*voice, "amp", amp),
            Some(LiveState::Handshaking { amp: pending }) => *pending = amp,
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
