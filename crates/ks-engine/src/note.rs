//! Per-note runtime state: operator phases, envelopes and the LFO.
//!
//! Envelopes and the LFO advance once per frame of `FRAME_SAMPLES`
//! samples; between frame boundaries the envelope amplitude moves by a
//! constant per-sample delta.

use ks_ir::{Algorithm, LfoWave, ENVELOPE_POINTS, OPERATOR_COUNT, RELEASE_POINT};

use crate::fixed::{phase_delta, scale_frames, FRAME_SAMPLES, FRAME_SHIFT, MAX_PHASE_DELTA};
use crate::synth::{OperatorSynth, Synth};
use crate::tables::{wave_index, WaveTables, PHASE_CYCLE_BITS, UNITY, WAVE_LEN, WAVE_PEAK};

/// Right shift applied to the scaled LFO value before it bends pitch.
/// Full depth swings pitch by about a sixteenth (roughly a semitone).
const FMS_SHIFT: u32 = 4;

/// Envelope state of one operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvelopeState {
    #[default]
    Off = 0,
    /// Running the note-on segments
    On = 1,
    /// Holding the last note-on level
    Sustained = 2,
    /// Running the release segment
    Released = 3,
}

/// Runtime state of one sounding note.
#[derive(Clone, Debug)]
pub struct SynthNote {
    pub phases: [u32; OPERATOR_COUNT],
    /// Unbent per-sample phase steps
    pub deltas: [u32; OPERATOR_COUNT],
    /// Per-operator breakpoint amplitudes after keyscale, level and velocity
    pub env_targets: [[i32; ENVELOPE_POINTS]; OPERATOR_COUNT],
    /// Per-operator breakpoint durations in frames after rate scaling
    pub env_frames: [[u32; ENVELOPE_POINTS]; OPERATOR_COUNT],
    /// Per-sample amplitude steps of each note-on segment
    pub env_deltas: [[i32; ENVELOPE_POINTS]; OPERATOR_COUNT],
    pub env_amp: [i32; OPERATOR_COUNT],
    pub env_delta: [i32; OPERATOR_COUNT],
    pub env_remaining: [u32; OPERATOR_COUNT],
    pub env_segment: [u8; OPERATOR_COUNT],
    pub env_state: [EnvelopeState; OPERATOR_COUNT],
    pub lfo_phase: u32,
    /// Bipolar LFO output (Q15)
    pub lfo_value: i32,
    /// Per-operator amplitude gain from the LFO (Q16)
    pub lfo_am: [i32; OPERATOR_COUNT],
    /// Pitch multiplier from the LFO (Q16)
    pub lfo_fm: u32,
    lfo_seed: u32,
    /// Last operator outputs
    pub outputs: [i32; OPERATOR_COUNT],
    /// Two most recent outputs of operator 0
    pub feedback: [i32; 2],
    pub noise_seed: u32,
    pub noise_cycle: u32,
    /// Samples left until the next frame boundary
    pub frame_countdown: u32,
}

impl Default for SynthNote {
    fn default() -> Self {
        Self {
            phases: [0; OPERATOR_COUNT],
            deltas: [0; OPERATOR_COUNT],
            env_targets: [[0; ENVELOPE_POINTS]; OPERATOR_COUNT],
            env_frames: [[0; ENVELOPE_POINTS]; OPERATOR_COUNT],
            env_deltas: [[0; ENVELOPE_POINTS]; OPERATOR_COUNT],
            env_amp: [0; OPERATOR_COUNT],
            env_delta: [0; OPERATOR_COUNT],
            env_remaining: [0; OPERATOR_COUNT],
            env_segment: [0; OPERATOR_COUNT],
            env_state: [EnvelopeState::Off; OPERATOR_COUNT],
            lfo_phase: 0,
            lfo_value: 0,
            lfo_am: [0; OPERATOR_COUNT],
            lfo_fm: 0,
            lfo_seed: 0,
            outputs: [0; OPERATOR_COUNT],
            feedback: [0; 2],
            noise_seed: 0,
            noise_cycle: 0,
            frame_countdown: FRAME_SAMPLES,
        }
    }
}

impl SynthNote {
    /// Start a note on `synth`.
    pub fn note_on(tables: &WaveTables, synth: &Synth, note: u8, velocity: u8) -> Self {
        let note = note & 0x7F;
        let velocity = velocity.min(127);
        let rate_multiplier = tables.rate_scale(note) as i64;
        let mut n = Self {
            lfo_am: [UNITY as i32; OPERATOR_COUNT],
            lfo_fm: UNITY,
            lfo_phase: synth.lfo_phase,
            lfo_seed: 0x2545_F491 ^ note as u32,
            noise_seed: 0x9E37 ^ ((note as u32) << 8) ^ synth.feedback_byte as u32,
            frame_countdown: FRAME_SAMPLES,
            ..Self::default()
        };

        for (i, op) in synth.operators.iter().enumerate() {
            n.phases[i] = if synth.algorithm == Algorithm::SawPair && (i == 1 || i == 3) {
                op.level_phase
            } else {
                op.phase_offset
            };
            n.deltas[i] = phase_delta(operator_frequency(tables, op, note), synth.sampling_rate);

            let scale = rate_scale_multiplier(rate_multiplier, op.rate_scale);
            let keyscale = keyscale_factor(tables, op, note);
            let velocity_gain = velocity_factor(op.velocity_sensitivity, velocity);
            let mut previous = 0;
            for k in 0..ENVELOPE_POINTS {
                let point = op.envelope_points[k] as i64;
                let scaled = ((point * keyscale) >> 16) * op.level as i64 >> 16;
                let target = ((scaled.clamp(0, point) * velocity_gain) >> 16) as i32;
                let frames = scale_frames(op.envelope_frames[k], scale);
                n.env_targets[i][k] = target;
                n.env_frames[i][k] = frames;
                n.env_deltas[i][k] = segment_delta(previous, target, frames);
                previous = target;
            }

            n.env_state[i] = EnvelopeState::On;
            n.env_remaining[i] = n.env_frames[i][0];
            n.env_delta[i] = n.env_deltas[i][0];
        }

        if synth.lfo_ams_enabled || synth.lfo_fms_enabled {
            n.update_lfo(tables, synth, true);
        }
        n
    }

    /// Move every sounding operator into its release segment.
    pub fn note_off(&mut self) {
        for i in 0..OPERATOR_COUNT {
            if self.env_state[i] == EnvelopeState::Off {
                continue;
            }
            let frames = self.env_frames[i][RELEASE_POINT];
            self.env_state[i] = EnvelopeState::Released;
            self.env_segment[i] = RELEASE_POINT as u8;
            self.env_remaining[i] = frames;
            self.env_delta[i] =
                segment_delta(self.env_amp[i], self.env_targets[i][RELEASE_POINT], frames);
        }
        // Release lasts exactly its frame count from here.
        self.frame_countdown = FRAME_SAMPLES;
    }

    /// Jump every operator still in its note-on segments to its sustain level.
    pub fn skip_to_sustain(&mut self) {
        let sustain = RELEASE_POINT - 1;
        for i in 0..OPERATOR_COUNT {
            if self.env_state[i] != EnvelopeState::On {
                continue;
            }
            self.env_state[i] = EnvelopeState::Sustained;
            self.env_segment[i] = sustain as u8;
            self.env_amp[i] = self.env_targets[i][sustain];
            self.env_delta[i] = 0;
            self.env_remaining[i] = 0;
        }
    }

    /// Silence every operator immediately.
    pub fn kill(&mut self) {
        self.env_state = [EnvelopeState::Off; OPERATOR_COUNT];
        self.env_amp = [0; OPERATOR_COUNT];
        self.env_delta = [0; OPERATOR_COUNT];
    }

    /// Operator envelope states packed one byte each, operator 0 lowest.
    pub fn packed_state(&self) -> u32 {
        u32::from_le_bytes(self.env_state.map(|s| s as u8))
    }

    /// True while any operator envelope is not `Off`.
    pub fn is_active(&self) -> bool {
        self.packed_state() != 0
    }

    pub fn is_released(&self) -> bool {
        self.env_state.iter().all(|s| matches!(s, EnvelopeState::Released | EnvelopeState::Off))
    }

    /// Advance every envelope by one frame.
    pub(crate) fn step_envelopes(&mut self) {
        for i in 0..OPERATOR_COUNT {
            match self.env_state[i] {
                EnvelopeState::On | EnvelopeState::Released => {
                    self.env_remaining[i] = self.env_remaining[i].saturating_sub(1);
                    if self.env_remaining[i] == 0 {
                        self.finish_segment(i);
                    }
                }
                EnvelopeState::Off | EnvelopeState::Sustained => {}
            }
        }
    }

    fn finish_segment(&mut self, op: usize) {
        let segment = self.env_segment[op] as usize;
        match self.env_state[op] {
            EnvelopeState::On => {
                self.env_amp[op] = self.env_targets[op][segment];
                let next = segment + 1;
                if next >= RELEASE_POINT {
                    self.env_state[op] = EnvelopeState::Sustained;
                    self.env_delta[op] = 0;
                } else {
                    self.env_segment[op] = next as u8;
                    self.env_remaining[op] = self.env_frames[op][next];
                    self.env_delta[op] = self.env_deltas[op][next];
                }
            }
            EnvelopeState::Released => {
                self.env_state[op] = EnvelopeState::Off;
                self.env_amp[op] = 0;
                self.env_delta[op] = 0;
            }
            EnvelopeState::Off | EnvelopeState::Sustained => {}
        }
    }

    /// Advance the LFO by one frame.
    pub(crate) fn step_lfo(&mut self, tables: &WaveTables, synth: &Synth) {
        let previous = self.lfo_phase;
        self.lfo_phase = previous.wrapping_add(synth.lfo_delta);
        let wrapped = (previous >> PHASE_CYCLE_BITS) != (self.lfo_phase >> PHASE_CYCLE_BITS);
        self.update_lfo(tables, synth, wrapped);
    }

    fn update_lfo(&mut self, tables: &WaveTables, synth: &Synth, new_cycle: bool) {
        let phase = self.lfo_phase;
        let value = match synth.lfo_wave {
            LfoWave::Triangle => tables.triangle(phase),
            LfoWave::Sawtooth => tables.sawtooth(phase),
            LfoWave::Square => {
                if wave_index(phase) < WAVE_LEN / 2 {
                    WAVE_PEAK
                } else {
                    -WAVE_PEAK
                }
            }
            LfoWave::Sine => tables.sine(phase, false),
            LfoWave::Noise => {
                if new_cycle {
                    self.lfo_seed = self.lfo_seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    ((self.lfo_seed >> 16) as u16 as i16) as i32
                } else {
                    self.lfo_value
                }
            }
        };
        self.lfo_value = value;

        if synth.lfo_ams_enabled {
            let unipolar = (value + 32768) as i64;
            for (gain, op) in self.lfo_am.iter_mut().zip(&synth.operators) {
                *gain = (UNITY as i64 - ((op.lfo_ams_depth as i64 * unipolar) >> 16)) as i32;
            }
        }
        if synth.lfo_fms_enabled {
            let bend = ((synth.lfo_fms_depth as i64 * value as i64) >> 15) >> FMS_SHIFT;
            self.lfo_fm = (UNITY as i64 + bend) as u32;
        }
    }

    /// Phase steps for the next frame with pitch bend and LFO pitch modulation applied.
    pub fn bent_deltas(&self, pitch_bend: u32, lfo: bool) -> [u32; OPERATOR_COUNT] {
        let fm = if lfo { self.lfo_fm } else { UNITY } as u64;
        self.deltas.map(|d| {
            let bent = (((d as u64 * pitch_bend as u64) >> 16) * fm) >> 16;
            bent.min(MAX_PHASE_DELTA as u64) as u32
        })
    }
}

/// Per-sample amplitude step that moves `from` to `to` in `frames` frames.
fn segment_delta(from: i32, to: i32, frames: u32) -> i32 {
    let samples = (frames.max(1) as i64) << FRAME_SHIFT;
    ((to as i64 - from as i64) / samples) as i32
}

/// Operator frequency in 16.16 Hz.
fn operator_frequency(tables: &WaveTables, op: &OperatorSynth, note: u8) -> u64 {
    let base = if op.fixed_frequency {
        (1u64 << op.coarse) << 16
    } else {
        let ratio = if op.coarse == 0 {
            UNITY as u64 / 2
        } else {
            (op.coarse as u64) << 16
        };
        (tables.note_frequency(note) as u64 * ratio) >> 16
    };
    (((base * op.fine as u64) >> 16) * op.tune as u64) >> 16
}

/// Duration multiplier (Q16): the per-note table scaled toward one by the
/// operator's rate-scale byte.
fn rate_scale_multiplier(table: i64, rate_scale: i32) -> u32 {
    let m = UNITY as i64 + (((table - UNITY as i64) * rate_scale as i64) >> 8);
    m.max(1) as u32
}

/// Level factor (Q16) from the operator's keyscale at `note`.
fn keyscale_factor(tables: &WaveTables, op: &OperatorSynth, note: u8) -> i64 {
    let mid = op.keyscale_mid;
    let (depth, curve, distance) = if note < mid {
        (op.keyscale_low, op.keyscale_curves.left, mid - note)
    } else {
        (op.keyscale_high, op.keyscale_curves.right, note - mid)
    };
    if depth == 0 || distance == 0 {
        return UNITY as i64;
    }
    let amount = (tables.keyscale(curve, distance as usize) as i64 * depth as i64) >> 16;
    if curve.is_up() {
        UNITY as i64 + amount
    } else {
        UNITY as i64 - amount
    }
}

/// Velocity gain (Q16): unity at full velocity, falling by the sensitivity at zero.
fn velocity_factor(sensitivity: i32, velocity: u8) -> i64 {
    UNITY as i64 - (sensitivity as i64 * (127 - velocity as i64)) / 127
}
