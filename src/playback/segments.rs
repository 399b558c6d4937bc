//! Seamless continuation of pre-rendered segments.
//!
//! A chain plays `intro -> loopA -> loopB -> loopA -> ...`. Each segment
//! starts the next one `window + margin` before its declared end, so two
//! segments always sound together across the splice.

use crate::audio_data::SegmentData;
use crate::config::{CrossfadeConfig, CrossfadeShape};
use crate::mixer::Voice;
use std::f32::consts::FRAC_PI_2;

/// Decoded material of one emitter. The two loop instances share a buffer.
#[derive(Debug, Clone)]
pub struct SegmentSet {
    pub intro: SegmentData,
    pub loop_a: SegmentData,
    pub loop_b: SegmentData,
}

impl SegmentSet {
    pub fn new(intro: SegmentData, loop_data: SegmentData) -> Self {
        Self {
            intro,
            loop_b: loop_data.clone(),
            loop_a: loop_data,
        }
    }

    fn get(&self, slot: SegmentSlot) -> &SegmentData {
        match slot {
            SegmentSlot::Intro => &self.intro,
            SegmentSlot::LoopA => &self.loop_a,
            SegmentSlot::LoopB => &self.loop_b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSlot {
    Intro,
    LoopA,
    LoopB,
}

impl SegmentSlot {
    pub fn successor(self) -> Self {
        match self {
            Self::Intro | Self::LoopB => Self::LoopA,
            Self::LoopA => Self::LoopB,
        }
    }
}

/// A segment started sounding at `frame` (counted from the chain's start).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceEvent {
    pub slot: SegmentSlot,
    pub frame: u64,
}

#[derive(Debug)]
struct Instance {
    slot: SegmentSlot,
    cursor: usize,
    /// Local frame at which the successor starts; the fade-out begins here
    splice_at: usize,
    fade_in: bool,
}

/// Voice that renders a [`SegmentSet`] as an endless, spliced stream.
pub struct SegmentChain {
    segments: SegmentSet,
    shape: CrossfadeShape,
    window_frames: usize,
    lead_frames: usize,
    active: Vec<Instance>,
    frame: u64,
    next_start: u64,
    next_slot: SegmentSlot,
    splices: Vec<SpliceEvent>,
}

impl SegmentChain {
    pub fn new(segments: SegmentSet, crossfade: &CrossfadeConfig, sample_rate: u32) -> Self {
        let window_frames = (crossfade.window.as_secs_f64() * sample_rate as f64).round() as usize;
        let margin_frames = (crossfade.margin.as_secs_f64() * sample_rate as f64).round() as usize;
        Self {
            segments,
            shape: crossfade.shape,
            window_frames,
            lead_frames: window_frames + margin_frames,
            active: Vec::new(),
            frame: 0,
            next_start: 0,
            next_slot: SegmentSlot::Intro,
            splices: Vec::new(),
        }
    }

    /// Frames rendered so far.
    pub fn position(&self) -> u64 {
        self.frame
    }

    /// Chain frame at which the next segment will start.
    pub fn next_splice(&self) -> u64 {
        self.next_start
    }

    pub fn active_slots(&self) -> Vec<SegmentSlot> {
        self.active.iter().map(|instance| instance.slot).collect()
    }

    /// Splices that happened since the last call.
    pub fn take_splices(&mut self) -> Vec<SpliceEvent> {
        std::mem::take(&mut self.splices)
    }

    fn start_next(&mut self) {
        let slot = self.next_slot;
        let total = self.segments.get(slot).total_frames();
        let splice_at = total.saturating_sub(self.lead_frames).max(1);
        self.active.push(Instance {
            slot,
            cursor: 0,
            splice_at,
            fade_in: slot != SegmentSlot::Intro,
        });
        self.splices.push(SpliceEvent {
            slot,
            frame: self.frame,
        });
        self.next_start = self.frame + splice_at as u64;
        self.next_slot = slot.successor();
    }

    fn envelope(&self, instance: &Instance) -> f32 {
        if self.shape == CrossfadeShape::Overlap || self.window_frames == 0 {
            return 1.0;
        }
        let window = self.window_frames as f32;
        let mut gain = 1.0;
        if instance.fade_in && instance.cursor < self.window_frames {
            gain *= (instance.cursor as f32 / window * FRAC_PI_2).sin();
        }
        if instance.cursor >= instance.splice_at {
            let t = ((instance.cursor - instance.splice_at) as f32 / window).min(1.0);
            gain *= (t * FRAC_PI_2).cos().max(0.0);
        }
        gain
    }

    /// Renders `frames` frames into `out`, starting segments exactly on
    /// their splice frame even in the middle of a block.
    pub fn render_block(&mut self, out: &mut [f32], channels: u16) {
        let channels = channels.max(1) as usize;
        let frames = out.len() / channels;
        let mut pos = 0;

        while pos < frames {
            if self.frame >= self.next_start {
                self.start_next();
            }
            let until = frames.min(pos + (self.next_start - self.frame) as usize);

            for frame in pos..until {
                for index in 0..self.active.len() {
                    let instance = &self.active[index];
                    let data = self.segments.get(instance.slot);
                    if instance.cursor < data.total_frames() {
                        let gain = self.envelope(instance);
                        for channel in 0..channels {
                            out[frame * channels + channel] +=
                                data.sample(instance.cursor, channel) * gain;
                        }
                    }
                    self.active[index].cursor += 1;
                }
            }

            self.frame += (until - pos) as u64;
            pos = until;
            let segments = &self.segments;
            self.active
                .retain(|instance| instance.cursor < segments.get(instance.slot).total_frames());
        }
    }
}

impl Voice for SegmentChain {
    fn render(&mut self, out: &mut [f32], channels: u16, _sample_rate: u32) {
        out.fill(0.0);
        self.render_block(out, channels);
    }
}
