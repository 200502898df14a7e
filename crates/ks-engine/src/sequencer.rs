//! Score playback: channel state, voice allocation and tick timing.
//!
//! The sequencer walks a `Score` in ticks, dispatching events to
//! channels and voices, and mixes every sounding voice into the output
//! between events. Tick length follows the current tempo with a
//! fractional carry, so long scores do not drift.

use alloc::vec;
use alloc::vec::Vec;
use log::{debug, error, trace, warn};

use ks_ir::{
    Message, Score, ScoreEvent, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_BANK_LSB, CC_BANK_MSB,
    CC_PAN, CC_RESET_CONTROLLERS, CC_VOLUME, DEFAULT_RESOLUTION, DEFAULT_TEMPO,
};

use crate::channel::{ChannelState, CHANNEL_COUNT, PERCUSSION_CHANNEL};
use crate::frame::Frame;
use crate::note::SynthNote;
use crate::tone_list::ToneList;
use crate::voice_pool::VoicePool;

/// Engine settings chosen by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Output rate in Hz
    pub sampling_rate: u32,
    /// log2 of the voice pool size
    pub polyphony_bits: u8,
    /// Largest number of frames mixed in one pass
    pub block_frames: usize,
    /// Pitch-bend range in semitones either way
    pub pitch_bend_range: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 48000,
            polyphony_bits: 6,
            block_frames: 512,
            pitch_bend_range: 2,
        }
    }
}

/// Playback state of one score.
pub struct SequencerState {
    config: EngineConfig,
    channels: Vec<ChannelState>,
    voices: VoicePool,
    /// Interleaved stereo accumulator, `block_frames` long
    mix: Vec<i32>,
    resolution: u16,
    /// Microseconds per quarter note
    tempo: u32,
    /// Frames per tick (16.16)
    frames_per_tick: u64,
    tick_fraction: u64,
    frames_to_tick: u64,
    ticks_to_event: u32,
    event_index: usize,
    running_status: u8,
    tick: u64,
    started: bool,
    finished: bool,
}

impl SequencerState {
    pub fn new(config: EngineConfig) -> Self {
        let config = EngineConfig {
            block_frames: config.block_frames.max(1),
            ..config
        };
        let mut state = Self {
            config,
            channels: (0..CHANNEL_COUNT as u8)
                .map(|ch| ChannelState::new(ch == PERCUSSION_CHANNEL))
                .collect(),
            voices: VoicePool::new(config.polyphony_bits),
            mix: vec![0; config.block_frames * 2],
            resolution: DEFAULT_RESOLUTION,
            tempo: DEFAULT_TEMPO,
            frames_per_tick: 0,
            tick_fraction: 0,
            frames_to_tick: 0,
            ticks_to_event: 0,
            event_index: 0,
            running_status: 0,
            tick: 0,
            started: false,
            finished: false,
        };
        state.update_frames_per_tick();
        state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rewind to the start of a score: default controllers, silent voices,
    /// default tempo, and program 0 resolved on every channel.
    pub fn set_default(&mut self, tones: &ToneList) {
        if tones.sampling_rate() != self.config.sampling_rate {
            warn!(
                "tone list compiled at {} Hz, sequencer running at {} Hz",
                tones.sampling_rate(),
                self.config.sampling_rate
            );
        }
        for (i, channel) in self.channels.iter_mut().enumerate() {
            *channel = ChannelState::new(i as u8 == PERCUSSION_CHANNEL);
        }
        for ch in 0..CHANNEL_COUNT as u8 {
            let bank = self.channels[ch as usize].requested_bank();
            match tones.resolve_program(bank, 0) {
                Some(resolved) => self.channels[ch as usize].bank = Some(resolved),
                None => trace!("channel {} has no default program", ch),
            }
        }
        self.voices.reset();
        self.tempo = DEFAULT_TEMPO;
        self.tick = 0;
        self.tick_fraction = 0;
        self.event_index = 0;
        self.running_status = 0;
        self.started = false;
        self.finished = false;
        self.update_frames_per_tick();
    }

    /// Start a note; false (with a log message) if the channel has no
    /// program for it or the pool is full.
    pub fn note_on(&mut self, tones: &ToneList, channel: u8, note: u8, velocity: u8) -> bool {
        let channel = channel & 0x0F;
        let note = note & 0x7F;
        if velocity == 0 {
            return self.note_off(channel, note);
        }
        let ch = &self.channels[channel as usize];
        let Some(bank) = ch.bank else {
            error!("note on: channel {} has no bank selected", channel);
            return false;
        };
        let Some(key) = tones.program(bank, ch.program, note) else {
            warn!(
                "note on: no tone for bank {}:{} program {} note {}",
                bank.msb, bank.lsb, ch.program, note
            );
            return false;
        };
        let Some(synth) = tones.synth(key) else {
            warn!("note on: stale tone reference on channel {}", channel);
            return false;
        };
        let Some(id) = self.voices.allocate(channel, note) else {
            return false;
        };
        let synth_note = SynthNote::note_on(tones.tables(), synth, note, velocity);
        match self.voices.get_mut(id) {
            Some(voice) => {
                voice.start(channel, note, key, synth_note);
                true
            }
            None => false,
        }
    }

    /// Release a held note; false (with a log message) if it is not held.
    pub fn note_off(&mut self, channel: u8, note: u8) -> bool {
        let channel = channel & 0x0F;
        let note = note & 0x7F;
        if self.channels[channel as usize].bank.is_none() {
            error!("note off: channel {} has no bank selected", channel);
            return false;
        }
        match self.voices.find_held(channel, note).and_then(|id| self.voices.get_mut(id)) {
            Some(voice) => {
                voice.release();
                true
            }
            None => {
                warn!("note off: channel {} note {} is not sounding", channel, note);
                false
            }
        }
    }

    /// Select `program` from the channel's requested bank, falling back
    /// to bank 0:0 and then to any bank providing it.
    pub fn program_change(&mut self, tones: &ToneList, channel: u8, program: u8) -> bool {
        let program = program & 0x7F;
        let ch = &mut self.channels[channel as usize & 0x0F];
        let requested = ch.requested_bank();
        match tones.resolve_program(requested, program) {
            Some(bank) => {
                if bank != requested {
                    debug!(
                        "program {} not in bank {}:{}, using {}:{}",
                        program, requested.msb, requested.lsb, bank.msb, bank.lsb
                    );
                }
                ch.bank = Some(bank);
                ch.program = program;
                true
            }
            None => {
                error!("no bank provides program {} (channel {})", program, channel);
                false
            }
        }
    }

    pub fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        let channel = channel & 0x0F;
        let ch = &mut self.channels[channel as usize];
        match controller {
            CC_BANK_MSB => ch.bank_msb = value & 0x7F,
            CC_BANK_LSB => ch.bank_lsb = value & 0x7F,
            CC_VOLUME => ch.set_volume(value),
            CC_PAN => ch.set_pan(value),
            CC_ALL_SOUND_OFF => self.voices.kill_channel(channel),
            CC_RESET_CONTROLLERS => ch.reset_controllers(),
            CC_ALL_NOTES_OFF => self.voices.release_channel(channel),
            _ => trace!("ignoring controller {} on channel {}", controller, channel),
        }
    }

    /// 14-bit bend, 8192 = centre.
    pub fn pitch_bend(&mut self, channel: u8, value: u16) {
        let range = self.config.pitch_bend_range;
        self.channels[channel as usize & 0x0F].set_pitch_bend(value, range);
    }

    /// Tempo meta-event payload: microseconds per quarter note, big-endian.
    pub fn tempo_change(&mut self, data: [u8; 3]) {
        self.set_tempo(u32::from_be_bytes([0, data[0], data[1], data[2]]));
    }

    pub fn set_tempo(&mut self, micros_per_quarter: u32) {
        self.tempo = micros_per_quarter.max(1);
        self.update_frames_per_tick();
        trace!("tempo {} us/quarter", self.tempo);
    }

    /// Render `out.len()` frames of `score`, dispatching events as their ticks come due.
    pub fn render(&mut self, score: &Score, tones: &ToneList, out: &mut [Frame]) {
        if !self.started {
            self.start(score, tones);
        }
        let mut done = 0;
        while done < out.len() {
            let mut span = (out.len() - done).min(self.config.block_frames);
            if !self.finished {
                span = span.min(self.frames_to_tick as usize);
            }
            self.mix_voices(tones, &mut out[done..done + span]);
            done += span;
            if !self.finished {
                self.frames_to_tick -= span as u64;
                while self.frames_to_tick == 0 && !self.finished {
                    self.advance_tick(score, tones);
                }
            }
        }
    }

    fn start(&mut self, score: &Score, tones: &ToneList) {
        self.started = true;
        self.resolution = if score.resolution == 0 {
            DEFAULT_RESOLUTION
        } else {
            score.resolution
        };
        self.update_frames_per_tick();
        self.tick_fraction = 0;
        self.load_next_event(score);
        self.dispatch_due(score, tones);
        self.reload_tick();
        while self.frames_to_tick == 0 && !self.finished {
            self.advance_tick(score, tones);
        }
    }

    fn advance_tick(&mut self, score: &Score, tones: &ToneList) {
        self.tick += 1;
        self.ticks_to_event = self.ticks_to_event.saturating_sub(1);
        // Events on this tick (tempo included) run before its length is taken.
        self.dispatch_due(score, tones);
        self.reload_tick();
    }

    fn reload_tick(&mut self) {
        let total = self.tick_fraction + self.frames_per_tick;
        self.frames_to_tick = total >> 16;
        self.tick_fraction = total & 0xFFFF;
    }

    fn dispatch_due(&mut self, score: &Score, tones: &ToneList) {
        while !self.finished && self.ticks_to_event == 0 {
            if let Some(event) = score.events.get(self.event_index).copied() {
                self.dispatch(tones, event);
            }
            self.event_index += 1;
            self.load_next_event(score);
        }
    }

    fn load_next_event(&mut self, score: &Score) {
        match score.events.get(self.event_index) {
            Some(event) if !event.is_end() => self.ticks_to_event = event.delta,
            _ => {
                self.finished = true;
                debug!("end of score at tick {}", self.tick);
            }
        }
    }

    fn dispatch(&mut self, tones: &ToneList, event: ScoreEvent) {
        let (status, data) = if event.status < 0x80 {
            (self.running_status, [event.status, event.data[0], event.data[1]])
        } else {
            if event.status < 0xF0 {
                self.running_status = event.status;
            }
            (event.status, event.data)
        };
        if status < 0x80 {
            warn!("running status without a previous status at tick {}", self.tick);
            return;
        }
        trace!("tick {}: status {:#04x} data {:?}", self.tick, status, data);
        match ScoreEvent::message(status, data) {
            Message::NoteOn { channel, note, velocity } => {
                self.note_on(tones, channel, note, velocity);
            }
            Message::NoteOff { channel, note } => {
                self.note_off(channel, note);
            }
            Message::ControlChange { channel, controller, value } => {
                self.control_change(channel, controller, value)
            }
            Message::ProgramChange { channel, program } => {
                self.program_change(tones, channel, program);
            }
            Message::PitchBend { channel, value } => self.pitch_bend(channel, value),
            Message::Tempo(micros) => self.set_tempo(micros),
            Message::Other(status) => trace!("ignoring status {:#04x}", status),
        }
    }

    fn update_frames_per_tick(&mut self) {
        let resolution = self.resolution.max(1) as u128;
        let scaled = (self.config.sampling_rate as u128 * self.tempo as u128) << 16;
        self.frames_per_tick = u64::try_from(scaled / (1_000_000 * resolution)).unwrap_or(u64::MAX);
    }

    fn mix_voices(&mut self, tones: &ToneList, out: &mut [Frame]) {
        let mix = &mut self.mix[..out.len() * 2];
        mix.fill(0);
        let waves = tones.waves();
        for voice in self.voices.iter_mut() {
            if !voice.state.is_sounding() {
                continue;
            }
            let Some(synth) = tones.synth(voice.synth) else {
                voice.kill();
                continue;
            };
            let ch = &self.channels[voice.channel as usize];
            voice.render(&waves, synth, ch.gain, ch.pitch_multiplier, mix);
        }
        for (frame, pair) in out.iter_mut().zip(mix.chunks_exact(2)) {
            *frame = Frame::from_mix(pair[0], pair[1]);
        }
    }

    /// No events remain.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Finished and every voice has decayed.
    pub fn is_silent(&self) -> bool {
        self.finished && self.voices.active_count() == 0
    }

    pub fn active_voices(&self) -> usize {
        self.voices.active_count()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Frames per tick (16.16).
    pub fn frames_per_tick(&self) -> u64 {
        self.frames_per_tick
    }

    pub fn channel(&self, channel: u8) -> Option<&ChannelState> {
        self.channels.get(channel as usize)
    }
}
