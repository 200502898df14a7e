//! Precomputed lookup tables shared by every synth and voice.
//!
//! Phase is a fixed-point angle: the top `WAVE_BITS` of a
//! `PHASE_CYCLE_BITS`-bit cycle select a table entry and the low
//! `PHASE_BITS` are the sub-entry fraction. Bits above the cycle are
//! ignored, so phase accumulators may wrap freely.

use alloc::sync::Arc;
use ks_ir::KeyscaleCurve;

/// Table index bits.
pub const WAVE_BITS: u32 = 10;
/// Entries per wave table.
pub const WAVE_LEN: usize = 1 << WAVE_BITS;
const WAVE_MASK: usize = WAVE_LEN - 1;
/// Sub-entry phase bits.
pub const PHASE_BITS: u32 = 16;
/// Bits in one full cycle of phase.
pub const PHASE_CYCLE_BITS: u32 = WAVE_BITS + PHASE_BITS;
const PHASE_FRAC_MASK: u32 = (1 << PHASE_BITS) - 1;

/// Peak wave amplitude (Q15).
pub const WAVE_PEAK: i32 = 32767;

/// Number of MIDI notes covered by the per-note tables.
pub const NOTE_COUNT: usize = 128;

/// Fixed-point one for Q16 multipliers.
pub const UNITY: u32 = 1 << 16;

/// Note whose rate-scale multiplier is exactly one.
pub const RATE_SCALE_CENTER: u8 = 60;

/// One cycle of a waveform.
pub type WaveTable = [i16; WAVE_LEN];

/// Table index for a phase.
#[inline]
pub const fn wave_index(phase: u32) -> usize {
    (phase >> PHASE_BITS) as usize & WAVE_MASK
}

/// Plain table lookup.
#[inline]
pub fn lookup(table: &WaveTable, phase: u32) -> i32 {
    table[wave_index(phase)] as i32
}

/// Table lookup with linear interpolation on the sub-entry fraction.
#[inline]
pub fn lookup_interpolated(table: &WaveTable, phase: u32) -> i32 {
    let i = wave_index(phase);
    let a = table[i] as i64;
    let b = table[(i + 1) & WAVE_MASK] as i64;
    let frac = (phase & PHASE_FRAC_MASK) as i64;
    (a + (((b - a) * frac) >> PHASE_BITS)) as i32
}

/// Read-only lookup tables, built once and shared by reference.
pub struct WaveTables {
    sine: WaveTable,
    sawtooth: WaveTable,
    triangle: WaveTable,
    noise: WaveTable,
    /// Keyscale attenuation (Q16, 0 to full scale) indexed by semitone distance
    keyscale: [[u32; NOTE_COUNT]; 4],
    /// Note frequency in 16.16 Hz
    note_frequency: [u32; NOTE_COUNT],
    /// Envelope duration multiplier (Q16) per note
    rate_scale: [u32; NOTE_COUNT],
}

impl WaveTables {
    pub fn new() -> Self {
        let mut t = Self {
            sine: [0; WAVE_LEN],
            sawtooth: [0; WAVE_LEN],
            triangle: [0; WAVE_LEN],
            noise: [0; WAVE_LEN],
            keyscale: [[0; NOTE_COUNT]; 4],
            note_frequency: [0; NOTE_COUNT],
            rate_scale: [0; NOTE_COUNT],
        };

        let mut seed: u32 = 0x1234_5678;
        for i in 0..WAVE_LEN {
            let angle = 2.0 * core::f64::consts::PI * i as f64 / WAVE_LEN as f64;
            t.sine[i] = libm::round(libm::sin(angle) * WAVE_PEAK as f64) as i16;
            t.sawtooth[i] = (((i as i32) << 6) - 32768) as i16;
            let tri = match i {
                0..=255 => i as i32 * 128,
                256..=767 => (512 - i as i32) * 128,
                _ => (i as i32 - 1024) * 128,
            };
            t.triangle[i] = tri.clamp(-WAVE_PEAK, WAVE_PEAK) as i16;
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            t.noise[i] = (seed >> 16) as u16 as i16;
        }

        let full = UNITY as f64;
        let exp_down_norm = 1.0 - libm::exp2(-127.0 / 12.0);
        let exp_up_norm = libm::exp2(127.0 / 24.0) - 1.0;
        for d in 0..NOTE_COUNT {
            let x = d as f64;
            let linear = libm::round(x * full / 127.0) as u32;
            t.keyscale[KeyscaleCurve::LinearDown as usize][d] = linear;
            t.keyscale[KeyscaleCurve::LinearUp as usize][d] = linear;
            t.keyscale[KeyscaleCurve::ExpDown as usize][d] =
                libm::round((1.0 - libm::exp2(-x / 12.0)) / exp_down_norm * full) as u32;
            t.keyscale[KeyscaleCurve::ExpUp as usize][d] =
                libm::round((libm::exp2(x / 24.0) - 1.0) / exp_up_norm * full) as u32;
        }

        for n in 0..NOTE_COUNT {
            let semis = n as f64 - 69.0;
            t.note_frequency[n] = libm::round(440.0 * libm::exp2(semis / 12.0) * full) as u32;
            let rel = n as f64 - RATE_SCALE_CENTER as f64;
            t.rate_scale[n] = libm::round(libm::exp2(-rel / 24.0) * full) as u32;
        }

        t
    }

    /// Construct the tables behind shared ownership.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn sine_table(&self) -> &WaveTable {
        &self.sine
    }

    /// Sine at `phase`. Interpolation is needed when phase is modulated
    /// by other operators and no longer lands on table entries.
    #[inline]
    pub fn sine(&self, phase: u32, interpolate: bool) -> i32 {
        if interpolate {
            lookup_interpolated(&self.sine, phase)
        } else {
            lookup(&self.sine, phase)
        }
    }

    #[inline]
    pub fn sawtooth(&self, phase: u32) -> i32 {
        lookup(&self.sawtooth, phase)
    }

    #[inline]
    pub fn triangle(&self, phase: u32) -> i32 {
        lookup(&self.triangle, phase)
    }

    /// Triangle held over `2^shift` entries, a stepped approximation.
    #[inline]
    pub fn fake_triangle(&self, phase: u32, shift: u32) -> i32 {
        let shift = shift.min(WAVE_BITS - 1);
        let i = (wave_index(phase) >> shift) << shift;
        self.triangle[i] as i32
    }

    /// Pseudo-noise; `seed` scrambles the walk and is rerolled by the caller per cycle.
    #[inline]
    pub fn noise(&self, phase: u32, seed: u32) -> i32 {
        self.noise[(wave_index(phase) ^ seed as usize) & WAVE_MASK] as i32
    }

    /// Keyscale amount (Q16) at a distance in semitones from the mid-point.
    /// Distances past the table clamp to the last entry.
    #[inline]
    pub fn keyscale(&self, curve: KeyscaleCurve, distance: usize) -> u32 {
        self.keyscale[curve as usize][distance.min(NOTE_COUNT - 1)]
    }

    /// Frequency of `note` in 16.16 Hz.
    #[inline]
    pub fn note_frequency(&self, note: u8) -> u32 {
        self.note_frequency[note as usize & (NOTE_COUNT - 1)]
    }

    /// Envelope duration multiplier (Q16) for `note`; one at the centre note.
    #[inline]
    pub fn rate_scale(&self, note: u8) -> u32 {
        self.rate_scale[note as usize & (NOTE_COUNT - 1)]
    }
}

impl Default for WaveTables {
    fn default() -> Self {
        Self::new()
    }
}
