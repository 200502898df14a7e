//! Compiled tones.
//!
//! A `Synth` is a `ToneParameters` expanded into engine units for one
//! sampling rate. It is immutable while voices render from it and is
//! recompiled whenever the parameters or the rate change.

use ks_ir::{
    Algorithm, KeyscaleCurves, LfoWave, OperatorParams, ToneParameters, ENVELOPE_POINTS,
    OPERATOR_COUNT,
};

use crate::fixed::{
    byte_phase, envelope_frames, frame_phase_delta, lfo_frequency, linear_inclusive, pan_gains,
    ENV_ONE,
};
use crate::tables::{WaveTables, UNITY};

/// One compiled operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatorSynth {
    pub fixed_frequency: bool,
    /// Wave source (0 = sine, k = custom slot k-1)
    pub wave: u8,
    pub coarse: u8,
    /// Phase at note-on
    pub phase_offset: u32,
    /// Phase seed used by the saw-pair algorithm, derived from the level byte
    pub level_phase: u32,
    /// Fine ratio multiplier (Q16)
    pub fine: u32,
    /// Detune multiplier (Q16)
    pub tune: u32,
    /// Output level (Q16)
    pub level: i32,
    /// Breakpoint amplitudes (ENV units)
    pub envelope_points: [i32; ENVELOPE_POINTS],
    /// Breakpoint durations in frames before rate scaling
    pub envelope_frames: [u32; ENVELOPE_POINTS],
    /// Q16
    pub velocity_sensitivity: i32,
    /// 0-255, applied as a fraction of 256
    pub rate_scale: i32,
    /// Q16
    pub keyscale_low: i32,
    /// Q16
    pub keyscale_high: i32,
    pub keyscale_mid: u8,
    pub keyscale_curves: KeyscaleCurves,
    /// Q16
    pub lfo_ams_depth: i32,
}

impl OperatorSynth {
    fn compile(op: &OperatorParams, sampling_rate: u32) -> Self {
        let q16 = |b: u8| linear_inclusive(b, 0, UNITY as i64) as i32;
        Self {
            fixed_frequency: op.phase_coarse.fixed_frequency,
            wave: op.phase_coarse.wave,
            coarse: op.phase_coarse.value,
            phase_offset: byte_phase(op.phase_offset),
            level_phase: byte_phase(op.level),
            fine: UNITY + ((op.phase_fine as u32) << 8),
            tune: (UNITY as i32 + (op.phase_tune as i32 - 128) * 8) as u32,
            level: q16(op.level),
            envelope_points: op
                .envelope
                .map(|p| linear_inclusive(p.level, 0, ENV_ONE as i64) as i32),
            envelope_frames: op.envelope.map(|p| envelope_frames(p.time, sampling_rate)),
            velocity_sensitivity: q16(op.velocity_sensitivity),
            rate_scale: op.rate_scale as i32,
            keyscale_low: q16(op.keyscale_low),
            keyscale_high: q16(op.keyscale_high),
            keyscale_mid: op.keyscale_mid.min(127),
            keyscale_curves: op.keyscale_curves,
            lfo_ams_depth: q16(op.lfo_ams_depth),
        }
    }
}

/// A compiled tone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Synth {
    /// Source parameters, kept for recompilation
    pub params: ToneParameters,
    pub sampling_rate: u32,
    pub operators: [OperatorSynth; OPERATOR_COUNT],
    pub algorithm: Algorithm,
    /// Operator 0 self-modulation (Q16)
    pub feedback: i32,
    /// Raw feedback byte; steps the fake triangle and reseeds noise
    pub feedback_byte: u8,
    /// Pan gains (Q15)
    pub pan_left: i32,
    pub pan_right: i32,
    pub lfo_wave: LfoWave,
    /// LFO frequency-modulation depth (Q16)
    pub lfo_fms_depth: i32,
    /// LFO phase step per frame
    pub lfo_delta: u32,
    /// LFO phase at note-on
    pub lfo_phase: u32,
    pub lfo_ams_enabled: bool,
    pub lfo_fms_enabled: bool,
}

impl Synth {
    pub fn new(tables: &WaveTables, params: &ToneParameters, sampling_rate: u32) -> Self {
        let operators = params
            .operators
            .map(|op| OperatorSynth::compile(&op, sampling_rate));
        let (pan_left, pan_right) = pan_gains(tables, params.panpot);
        let lfo_fms_depth = linear_inclusive(params.lfo_fms_depth, 0, UNITY as i64) as i32;
        let lfo_freq = lfo_frequency(params.lfo_freq);
        Self {
            params: *params,
            sampling_rate,
            lfo_ams_enabled: operators.iter().any(|op| op.lfo_ams_depth != 0),
            lfo_fms_enabled: lfo_fms_depth != 0,
            operators,
            algorithm: params.algorithm(),
            feedback: linear_inclusive(params.feedback, 0, UNITY as i64) as i32,
            feedback_byte: params.feedback,
            pan_left,
            pan_right,
            lfo_wave: params.lfo_wave(),
            lfo_fms_depth,
            lfo_delta: frame_phase_delta(lfo_freq, sampling_rate),
            lfo_phase: byte_phase(params.lfo_det),
        }
    }

    /// Recompile from new parameters.
    pub fn set(&mut self, tables: &WaveTables, params: &ToneParameters, sampling_rate: u32) {
        *self = Self::new(tables, params, sampling_rate);
    }

    /// Recompile the rate-dependent parts for a new sampling rate.
    pub fn set_sampling_rate(&mut self, tables: &WaveTables, sampling_rate: u32) {
        if sampling_rate != self.sampling_rate {
            let params = self.params;
            self.set(tables, &params, sampling_rate);
        }
    }

    /// Step count of the fake triangle used by the stepped-triangle algorithm.
    pub fn fake_triangle_shift(&self) -> u32 {
        (self.feedback_byte >> 5) as u32
    }
}
