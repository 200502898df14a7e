//! Conversions from authored bytes into engine fixed-point units.
//!
//! All functions are pure and total.

use crate::tables::{WaveTables, PHASE_CYCLE_BITS, WAVE_BITS, WAVE_LEN};

/// log2 of the samples per engine frame.
pub const FRAME_SHIFT: u32 = 5;
/// Samples per engine frame; envelopes and LFOs step once per frame.
pub const FRAME_SAMPLES: u32 = 1 << FRAME_SHIFT;

/// Envelope amplitude fraction bits.
pub const ENV_BITS: u32 = 28;
/// Full-scale envelope amplitude.
pub const ENV_ONE: i32 = 1 << ENV_BITS;

/// Envelope times are `exp(byte, ENV_TIME_BASE, 4)` in 1/65536 s:
/// byte 1 is about 0.26 ms, byte 255 about 15.5 s.
const ENV_TIME_BASE: u64 = 16;
/// LFO rates are `exp(byte, LFO_FREQ_BASE, 4)` in 16.16 Hz, up to about 46 Hz.
const LFO_FREQ_BASE: u64 = 48;
const EXP_MANTISSA_BITS: u32 = 4;

/// Largest per-sample phase step (half a cycle, Nyquist).
pub const MAX_PHASE_DELTA: u32 = 1 << (PHASE_CYCLE_BITS - 1);

/// `min + byte * (max - min) / 256`; `max` itself is never reached.
pub const fn linear(byte: u8, min: i64, max: i64) -> i64 {
    min + (byte as i64) * (max - min) / 256
}

/// Like `linear`, but byte 255 lands on (about) `max`.
pub const fn linear_inclusive(byte: u8, min: i64, max: i64) -> i64 {
    linear(byte, min, max + max / 256)
}

/// Exponential decode: the low `mantissa_bits` are a mantissa with an
/// implicit leading one, the remaining bits an exponent.
///
/// Result is `base * 1.mantissa * 2^exponent`; byte 0 decodes to 0.
pub const fn exp(byte: u8, base: u64, mantissa_bits: u32) -> u64 {
    if byte == 0 {
        return 0;
    }
    let mask = (1u32 << mantissa_bits) - 1;
    let mantissa = ((byte as u32) & mask) | (1 << mantissa_bits);
    let exponent = (byte as u32) >> mantissa_bits;
    ((base * mantissa as u64) << exponent) >> mantissa_bits
}

/// Envelope time in 1/65536 s.
pub const fn envelope_time(byte: u8) -> u64 {
    exp(byte, ENV_TIME_BASE, EXP_MANTISSA_BITS)
}

/// Envelope segment length in frames at `sampling_rate`, at least one.
pub const fn envelope_frames(byte: u8, sampling_rate: u32) -> u32 {
    let frames = (envelope_time(byte) * sampling_rate as u64) >> (16 + FRAME_SHIFT);
    if frames == 0 {
        1
    } else if frames > u32::MAX as u64 {
        u32::MAX
    } else {
        frames as u32
    }
}

/// Apply a Q16 duration multiplier to a frame count, keeping at least one frame.
pub const fn scale_frames(frames: u32, multiplier: u32) -> u32 {
    let scaled = (frames as u64 * multiplier as u64) >> 16;
    if scaled == 0 {
        1
    } else if scaled > u32::MAX as u64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// LFO frequency in 16.16 Hz.
pub const fn lfo_frequency(byte: u8) -> u64 {
    exp(byte, LFO_FREQ_BASE, EXP_MANTISSA_BITS)
}

/// Per-sample phase step for a 16.16 Hz frequency, capped at Nyquist.
pub const fn phase_delta(freq: u64, sampling_rate: u32) -> u32 {
    if sampling_rate == 0 {
        return 0;
    }
    let delta = (freq << WAVE_BITS) / sampling_rate as u64;
    if delta > MAX_PHASE_DELTA as u64 {
        MAX_PHASE_DELTA
    } else {
        delta as u32
    }
}

/// Per-frame phase step for a 16.16 Hz frequency (LFO rate).
pub const fn frame_phase_delta(freq: u64, sampling_rate: u32) -> u32 {
    if sampling_rate == 0 {
        return 0;
    }
    ((freq << (WAVE_BITS + FRAME_SHIFT)) / sampling_rate as u64) as u32
}

/// Phase (fraction of a cycle) from a byte.
pub const fn byte_phase(byte: u8) -> u32 {
    (byte as u32) << (PHASE_CYCLE_BITS - 8)
}

/// Q16 product.
#[inline]
pub const fn q16_mul(a: i64, b: i64) -> i64 {
    (a * b) >> 16
}

/// Equal-power pan gains (Q15) for a pan byte (0 = left, 128 = centre, 255 = right),
/// read from the first quarter of the sine table.
pub fn pan_gains(tables: &WaveTables, pan: u8) -> (i32, i32) {
    let quarter = WAVE_LEN / 4;
    let sine = tables.sine_table();
    let right = sine[pan as usize] as i32;
    let left = sine[quarter - pan as usize] as i32;
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_is_half_open() {
        assert_eq!(linear(0, 10, 266), 10);
        assert_eq!(linear(128, 0, 256), 128);
        assert_eq!(linear(255, 0, 256), 255);
    }

    #[test]
    fn linear_inclusive_reaches_max() {
        assert_eq!(linear_inclusive(255, 0, 1 << 16), (1 << 16) - 1);
        assert_eq!(linear_inclusive(0, 0, 1 << 16), 0);
    }

    #[test]
    fn exp_decodes_mantissa_and_exponent() {
        assert_eq!(exp(0, 16, 4), 0);
        assert_eq!(exp(0x01, 16, 4), 17);
        assert_eq!(exp(0x10, 16, 4), 32);
        assert_eq!(exp(0x2F, 16, 4), 31 << 2);
        assert_eq!(exp(0xFF, 16, 4), 31 << 15);
    }

    #[test]
    fn byte_mappings_are_monotonic() {
        for b in 1..=255u8 {
            assert!(linear(b, -100, 5000) >= linear(b - 1, -100, 5000));
            assert!(linear_inclusive(b, 0, 1 << 20) >= linear_inclusive(b - 1, 0, 1 << 20));
            assert!(exp(b, 16, 4) >= exp(b - 1, 16, 4));
            assert!(exp(b, 48, 4) >= exp(b - 1, 48, 4));
            assert!(envelope_frames(b, 48000) >= envelope_frames(b - 1, 48000));
        }
    }

    #[test]
    fn conversions_are_stable() {
        for b in 0..=255u8 {
            assert_eq!(exp(b, 16, 4), exp(b, 16, 4));
            assert_eq!(envelope_frames(b, 44100), envelope_frames(b, 44100));
        }
    }

    #[test]
    fn envelope_frames_never_zero() {
        assert_eq!(envelope_frames(0, 48000), 1);
        assert_eq!(envelope_frames(1, 8000), 1);
        // 0x80: 4096/65536 s = 62.5 ms = 3000 samples = 93 frames
        assert_eq!(envelope_frames(0x80, 48000), 93);
    }

    #[test]
    fn scale_frames_clamps() {
        assert_eq!(scale_frames(100, 1 << 16), 100);
        assert_eq!(scale_frames(100, 1 << 15), 50);
        assert_eq!(scale_frames(1, 100), 1);
    }

    #[test]
    fn phase_delta_for_a440() {
        // 440 Hz at 48 kHz: 440 / 48000 of a 2^26 cycle
        let d = phase_delta(440 << 16, 48000);
        let expected = ((440u64 << 26) / 48000) as u32;
        assert_eq!(d, expected);
        assert_eq!(phase_delta(u32::MAX as u64, 8000), MAX_PHASE_DELTA);
    }

    #[test]
    fn pan_is_equal_power() {
        let t = WaveTables::new();
        let (l, r) = pan_gains(&t, 128);
        assert_eq!(l, r);
        let (l, r) = pan_gains(&t, 0);
        assert_eq!((l, r), (32767, 0));
        let (l, r) = pan_gains(&t, 255);
        assert!(r > 32700 && l < 300);
    }
}
