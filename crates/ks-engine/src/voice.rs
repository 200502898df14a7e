//! Voice: one note of one channel, bound to a compiled synth.

use crate::note::SynthNote;
use crate::render::{render, StereoGain, WaveSet};
use crate::synth::Synth;
use crate::tone_list::SynthKey;

/// Voice slot lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Never used; ends a probe chain.
    #[default]
    Empty,
    /// Key held.
    On,
    /// Key released; envelopes releasing.
    Released,
    /// Finished; slot reusable but still part of probe chains.
    Off,
}

impl VoiceState {
    /// Producing sound.
    pub fn is_sounding(self) -> bool {
        matches!(self, Self::On | Self::Released)
    }

    /// Available for a new note.
    pub fn is_free(self) -> bool {
        matches!(self, Self::Empty | Self::Off)
    }
}

/// Identity of a voice: channel and note.
pub const fn voice_id(channel: u8, note: u8) -> u16 {
    (((channel & 0x0F) as u16) << 7) | (note & 0x7F) as u16
}

/// A single voice.
#[derive(Clone, Debug, Default)]
pub struct Voice {
    pub state: VoiceState,
    pub channel: u8,
    pub note: u8,
    /// Compiled tone this voice renders.
    pub synth: SynthKey,
    pub synth_note: SynthNote,
}

impl Voice {
    pub fn id(&self) -> u16 {
        voice_id(self.channel, self.note)
    }

    pub fn matches(&self, channel: u8, note: u8) -> bool {
        self.id() == voice_id(channel, note)
    }

    /// Begin sounding `synth_note`.
    pub fn start(&mut self, channel: u8, note: u8, synth: SynthKey, synth_note: SynthNote) {
        self.state = VoiceState::On;
        self.channel = channel;
        self.note = note;
        self.synth = synth;
        self.synth_note = synth_note;
    }

    /// Enter release.
    pub fn release(&mut self) {
        if self.state == VoiceState::On {
            self.synth_note.note_off();
            self.state = VoiceState::Released;
        }
    }

    /// Silence immediately.
    pub fn kill(&mut self) {
        if self.state.is_sounding() {
            self.synth_note.kill();
            self.state = VoiceState::Off;
        }
    }

    /// Mix this voice into `buf`, moving to `Off` once every envelope has finished.
    pub fn render(
        &mut self,
        waves: &WaveSet<'_>,
        synth: &Synth,
        gain: StereoGain,
        pitch_bend: u32,
        buf: &mut [i32],
    ) {
        if !self.state.is_sounding() {
            return;
        }
        render(waves, synth, &mut self.synth_note, gain, pitch_bend, buf);
        if !self.synth_note.is_active() {
            self.state = VoiceState::Off;
        }
    }
}
