// Mixer module - the render side every playback strategy connects voices to.
// The control side only ever talks to it through `MixerCommand`s, so the
// audio thread never waits on the orchestration loop.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a connected voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Voice({})", self.0)
    }
}

/// Something that produces audio for the mixer.
///
/// `render` adds nothing and assumes nothing: it overwrites `out`
/// (interleaved, `channels` wide) with its next block. Gain is applied by
/// the mixer afterwards.
pub trait Voice: Send {
    fn render(&mut self, out: &mut [f32], channels: u16, sample_rate: u32);

    /// Control message addressed to this voice.
    fn set_param(&mut self, _name: &str, _value: f32) {}
}

pub enum MixerCommand {
    Connect {
        id: VoiceId,
        voice: Box<dyn Voice>,
        gain: f32,
    },
    SetGain {
        id: VoiceId,
        gain: f32,
    },
    SetParam {
        id: VoiceId,
        name: String,
        value: f32,
    },
    Disconnect {
        id: VoiceId,
    },
    /// Overall output volume, ramped like a voice gain.
    SetMasterGain {
        gain: f32,
    },
    /// While suspended the mixer outputs silence and its voices do not
    /// advance.
    Suspend(bool),
}

impl fmt::Debug for MixerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { id, gain, .. } => write!(f, "Connect({}, gain {})", id, gain),
            Self::SetGain { id, gain } => write!(f, "SetGain({}, {})", id, gain),
            Self::SetParam { id, name, value } => write!(f, "SetParam({}, {}={})", id, name, value),
            Self::Disconnect { id } => write!(f, "Disconnect({})", id),
            Self::SetMasterGain { gain } => write!(f, "SetMasterGain({})", gain),
            Self::Suspend(suspended) => write!(f, "Suspend({})", suspended),
        }
    }
}

/// Control-side handle of a [`Mixer`]. Cheap to clone.
#[derive(Clone)]
pub struct MixerHandle {
    sender: Sender<MixerCommand>,
    next_id: Arc<AtomicU64>,
}

impl MixerHandle {
    /// Hands a voice to the render side. The id is valid immediately; the
    /// voice starts sounding at the next block.
    pub fn connect(&self, voice: Box<dyn Voice>, gain: f32) -> VoiceId {
        let id = VoiceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(MixerCommand::Connect { id, voice, gain });
        id
    }

    pub fn set_gain(&self, id: VoiceId, gain: f32) {
        self.send(MixerCommand::SetGain { id, gain });
    }

    pub fn set_param(&self, id: VoiceId, name: &str, value: f32) {
        self.send(MixerCommand::SetParam {
            id,
            name: name.to_string(),
            value,
        });
    }

    pub fn disconnect(&self, id: VoiceId) {
        self.send(MixerCommand::Disconnect { id });
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.send(MixerCommand::SetMasterGain {
            gain: gain.max(0.0),
        });
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.send(MixerCommand::Suspend(suspended));
    }

    fn send(&self, command: MixerCommand) {
        if let Err(e) = self.sender.send(command) {
            log::warn!("Mixer is gone, dropping {:?}", e.into_inner());
        }
    }
}

struct VoiceSlot {
    voice: Box<dyn Voice>,
    gain: f32,
    target_gain: f32,
}

/// Sums every connected voice into the output block.
///
/// Gain changes ramp linearly across one block so amplitude updates never
/// click.
pub struct Mixer {
    commands: Receiver<MixerCommand>,
    voices: HashMap<VoiceId, VoiceSlot>,
    scratch: Vec<f32>,
    master_gain: f32,
    master_target: f32,
    suspended: bool,
    sample_rate: u32,
    channels: u16,
}

impl Mixer {
    pub fn new(sample_rate: u32, channels: u16) -> (Self, MixerHandle) {
        let (sender, commands) = crossbeam_channel::unbounded();
        let mixer = Self {
            commands,
            voices: HashMap::new(),
            scratch: Vec::new(),
            master_gain: 1.0,
            master_target: 1.0,
            suspended: false,
            sample_rate,
            channels,
        };
        let handle = MixerHandle {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (mixer, handle)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Grows the scratch buffer so blocks of up to `samples` interleaved
    /// samples render without allocating.
    pub fn reserve(&mut self, samples: usize) {
        self.scratch
            .reserve(samples.saturating_sub(self.scratch.len()));
    }

    pub fn master_gain(&self) -> f32 {
        self.master_target
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn has_voice(&self, id: VoiceId) -> bool {
        self.voices.contains_key(&id)
    }

    /// Applies every queued command. Called at the start of each block.
    pub fn apply_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, command: MixerCommand) {
        match command {
            MixerCommand::Connect { id, voice, gain } => {
                log::debug!("Mixer: connecting {} at gain {:.3}", id, gain);
                self.voices.insert(
                    id,
                    VoiceSlot {
                        voice,
                        gain,
                        target_gain: gain,
                    },
                );
            }
            MixerCommand::SetGain { id, gain } => {
                if let Some(slot) = self.voices.get_mut(&id) {
                    slot.target_gain = gain;
                }
            }
            MixerCommand::SetParam { id, name, value } => {
                if let Some(slot) = self.voices.get_mut(&id) {
                    slot.voice.set_param(&name, value);
                }
            }
            MixerCommand::Disconnect { id } => {
                if self.voices.remove(&id).is_some() {
                    log::debug!("Mixer: disconnected {}", id);
                }
            }
            MixerCommand::SetMasterGain { gain } => self.master_target = gain,
            MixerCommand::Suspend(suspended) => {
                if suspended != self.suspended {
                    log::debug!("Mixer: {}", if suspended { "suspended" } else { "resumed" });
                }
                self.suspended = suspended;
            }
        }
    }

    /// Renders one interleaved block into `out`. Returns the number of
    /// frames filled, 0 while suspended.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        self.apply_commands();
        out.fill(0.0);

        let channels = self.channels.max(1) as usize;
        let frames = out.len() / channels;
        if frames == 0 || self.suspended {
            return 0;
        }
        self.scratch.resize(out.len(), 0.0);

        for slot in self.voices.values_mut() {
            self.scratch.fill(0.0);
            slot.voice
                .render(&mut self.scratch, self.channels, self.sample_rate);

            let step = (slot.target_gain - slot.gain) / frames as f32;
            for (frame, (dst, src)) in out
                .chunks_mut(channels)
                .zip(self.scratch.chunks(channels))
                .enumerate()
            {
                let gain = slot.gain + step * (frame + 1) as f32;
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += s * gain;
                }
            }
            slot.gain = slot.target_gain;
        }

        let step = (self.master_target - self.master_gain) / frames as f32;
        if step != 0.0 || self.master_gain != 1.0 {
            for (frame, dst) in out.chunks_mut(channels).enumerate() {
                let gain = self.master_gain + step * (frame + 1) as f32;
                for d in dst {
                    *d *= gain;
                }
            }
        }
        self.master_gain = self.master_target;

        frames
    }
}
