//! Per-algorithm render kernels.
//!
//! Every algorithm is a zero-sized `Kernel` type; `render` picks the
//! kernel once per call and monomorphises the block loop over it and
//! over whether the LFO touches amplitude and pitch, so the inner loop
//! carries no per-sample branching on tone settings.

use alloc::boxed::Box;
use ks_ir::{Algorithm, OPERATOR_COUNT};

use crate::fixed::{ENV_BITS, FRAME_SAMPLES};
use crate::note::SynthNote;
use crate::synth::Synth;
use crate::tables::{lookup_interpolated, WaveTable, WaveTables, PHASE_CYCLE_BITS};

/// Left shift turning an operator output (Q15) into a phase offset:
/// full scale swings the modulated phase by two cycles.
const MOD_SHIFT: u32 = PHASE_CYCLE_BITS - 14;

/// Lookup tables plus the baked custom waveforms of a tone list.
#[derive(Clone, Copy)]
pub struct WaveSet<'a> {
    pub tables: &'a WaveTables,
    /// Custom slots; an operator wave selector `k` reads slot `k - 1`
    pub custom: &'a [Option<Box<WaveTable>>],
}

impl<'a> WaveSet<'a> {
    /// Only the built-in sine.
    pub fn new(tables: &'a WaveTables) -> Self {
        Self { tables, custom: &[] }
    }

    /// Table for an operator wave selector. Unpopulated custom slots fall back to sine.
    pub fn operator_table(&self, wave: u8) -> &'a WaveTable {
        match wave {
            0 => self.tables.sine_table(),
            k => self
                .custom
                .get(k as usize - 1)
                .and_then(|slot| slot.as_deref())
                .unwrap_or(self.tables.sine_table()),
        }
    }
}

/// Channel gain applied to a voice (Q16 per side).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StereoGain {
    pub left: i32,
    pub right: i32,
}

impl StereoGain {
    pub const UNITY: Self = Self {
        left: 1 << 16,
        right: 1 << 16,
    };

    pub const fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }
}

impl Default for StereoGain {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Render `note` into `buf` (interleaved stereo, mixed by addition).
///
/// `pitch_bend` is a Q16 multiplier on every operator frequency. Returns
/// without touching `buf` when every operator envelope is off.
pub fn render(
    waves: &WaveSet<'_>,
    synth: &Synth,
    note: &mut SynthNote,
    gain: StereoGain,
    pitch_bend: u32,
    buf: &mut [i32],
) {
    if !note.is_active() {
        return;
    }
    match synth.algorithm {
        Algorithm::Serial => dispatch::<Serial>(waves, synth, note, gain, pitch_bend, buf),
        Algorithm::DualModSerial => {
            dispatch::<DualModSerial>(waves, synth, note, gain, pitch_bend, buf)
        }
        Algorithm::BranchToCarrier => {
            dispatch::<BranchToCarrier>(waves, synth, note, gain, pitch_bend, buf)
        }
        Algorithm::ChainPlusMod => {
            dispatch::<ChainPlusMod>(waves, synth, note, gain, pitch_bend, buf)
        }
        Algorithm::TwoPairs => dispatch::<TwoPairs>(waves, synth, note, gain, pitch_bend, buf),
        Algorithm::OneToThree => dispatch::<OneToThree>(waves, synth, note, gain, pitch_bend, buf),
        Algorithm::PairPlusTwo => {
            dispatch::<PairPlusTwo>(waves, synth, note, gain, pitch_bend, buf)
        }
        Algorithm::Additive => dispatch::<Additive>(waves, synth, note, gain, pitch_bend, buf),
        Algorithm::SawPair => dispatch::<SawPair>(waves, synth, note, gain, pitch_bend, buf),
        Algorithm::FakeTriangle => {
            dispatch::<FakeTriangle>(waves, synth, note, gain, pitch_bend, buf)
        }
        Algorithm::Noise => dispatch::<NoiseKernel>(waves, synth, note, gain, pitch_bend, buf),
    }
}

fn dispatch<K: Kernel>(
    waves: &WaveSet<'_>,
    synth: &Synth,
    note: &mut SynthNote,
    gain: StereoGain,
    pitch_bend: u32,
    buf: &mut [i32],
) {
    match (synth.lfo_ams_enabled, synth.lfo_fms_enabled) {
        (false, false) => {
            render_block::<K, false, false>(waves, synth, note, gain, pitch_bend, buf)
        }
        (true, false) => render_block::<K, true, false>(waves, synth, note, gain, pitch_bend, buf),
        (false, true) => render_block::<K, false, true>(waves, synth, note, gain, pitch_bend, buf),
        (true, true) => render_block::<K, true, true>(waves, synth, note, gain, pitch_bend, buf),
    }
}

fn render_block<K: Kernel, const AMS: bool, const FMS: bool>(
    waves: &WaveSet<'_>,
    synth: &Synth,
    note: &mut SynthNote,
    gain: StereoGain,
    pitch_bend: u32,
    buf: &mut [i32],
) {
    let gain_left = (gain.left as i64 * synth.pan_left as i64) >> 15;
    let gain_right = (gain.right as i64 * synth.pan_right as i64) >> 15;
    let mut deltas = note.bent_deltas(pitch_bend, FMS);
    let mut ctx = Ctx {
        waves: synth.operators.each_ref().map(|op| waves.operator_table(op.wave)),
        tables: waves.tables,
        synth,
        note,
    };

    for frame in buf.chunks_exact_mut(2) {
        let mono = K::sample::<AMS>(&mut ctx) as i64;
        frame[0] += ((mono * gain_left) >> 16) as i32;
        frame[1] += ((mono * gain_right) >> 16) as i32;

        let note = &mut *ctx.note;
        for i in 0..OPERATOR_COUNT {
            note.phases[i] = note.phases[i].wrapping_add(deltas[i]);
            note.env_amp[i] += note.env_delta[i];
        }
        note.frame_countdown -= 1;
        if note.frame_countdown == 0 {
            note.frame_countdown = FRAME_SAMPLES;
            note.step_envelopes();
            if AMS || FMS {
                note.step_lfo(waves.tables, synth);
                if FMS {
                    deltas = note.bent_deltas(pitch_bend, true);
                }
            }
            if !note.is_active() {
                break;
            }
        }
    }
}

struct Ctx<'a, 'n> {
    waves: [&'a WaveTable; OPERATOR_COUNT],
    tables: &'a WaveTables,
    synth: &'a Synth,
    note: &'n mut SynthNote,
}

impl Ctx<'_, '_> {
    /// Envelope amplitude of operator `i`, with LFO amplitude modulation if enabled.
    #[inline(always)]
    fn amp<const AMS: bool>(&self, i: usize) -> i64 {
        let amp = self.note.env_amp[i] as i64;
        if AMS {
            (amp * self.note.lfo_am[i] as i64) >> 16
        } else {
            amp
        }
    }

    /// Scale a raw wave value by operator `i`'s amplitude.
    #[inline(always)]
    fn shape<const AMS: bool>(&mut self, i: usize, wave: i32) -> i32 {
        let out = ((wave as i64 * self.amp::<AMS>(i)) >> ENV_BITS) as i32;
        self.note.outputs[i] = out;
        out
    }

    /// Operator `i` on its own table, phase-modulated by `modulation`.
    #[inline(always)]
    fn op<const AMS: bool>(&mut self, i: usize, modulation: i32) -> i32 {
        let phase = self.note.phases[i].wrapping_add(modulation as u32);
        let wave = lookup_interpolated(self.waves[i], phase);
        self.shape::<AMS>(i, wave)
    }

    /// Operator 0 with self-feedback from its two most recent outputs.
    #[inline(always)]
    fn op0<const AMS: bool>(&mut self) -> i32 {
        let [a, b] = self.note.feedback;
        let fb = (((a as i64 + b as i64) * self.synth.feedback as i64) >> 17) as i32;
        let out = self.op::<AMS>(0, modulation(fb));
        self.note.feedback = [out, a];
        out
    }
}

#[inline(always)]
fn modulation(out: i32) -> i32 {
    out << MOD_SHIFT
}

/// Per-sample output of one operator routing.
trait Kernel {
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32;
}

/// 0 -> 1 -> 2 -> 3
struct Serial;
/// (0 + 1) -> 2 -> 3
struct DualModSerial;
/// (0 + (1 -> 2)) -> 3
struct BranchToCarrier;
/// ((0 -> 1) + 2) -> 3
struct ChainPlusMod;
/// (0 -> 1) + (2 -> 3)
struct TwoPairs;
/// 0 -> 1, 0 -> 2, 0 -> 3
struct OneToThree;
/// (0 -> 1) + 2 + 3
struct PairPlusTwo;
/// 0 + 1 + 2 + 3
struct Additive;
/// (saw 0 - saw 1) + (saw 2 - saw 3)
struct SawPair;
/// Stepped triangles 0 and 1, modulated by sines 2 and 3
struct FakeTriangle;
/// Noise 0 plus sines 1, 2 and 3
struct NoiseKernel;

impl Kernel for Serial {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let o0 = ctx.op0::<AMS>();
        let o1 = ctx.op::<AMS>(1, modulation(o0));
        let o2 = ctx.op::<AMS>(2, modulation(o1));
        ctx.op::<AMS>(3, modulation(o2))
    }
}

impl Kernel for DualModSerial {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let o0 = ctx.op0::<AMS>();
        let o1 = ctx.op::<AMS>(1, 0);
        let o2 = ctx.op::<AMS>(2, modulation(o0 + o1));
        ctx.op::<AMS>(3, modulation(o2))
    }
}

impl Kernel for BranchToCarrier {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let o0 = ctx.op0::<AMS>();
        let o1 = ctx.op::<AMS>(1, 0);
        let o2 = ctx.op::<AMS>(2, modulation(o1));
        ctx.op::<AMS>(3, modulation(o0 + o2))
    }
}

impl Kernel for ChainPlusMod {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let o0 = ctx.op0::<AMS>();
        let o1 = ctx.op::<AMS>(1, modulation(o0));
        let o2 = ctx.op::<AMS>(2, 0);
        ctx.op::<AMS>(3, modulation(o1 + o2))
    }
}

impl Kernel for TwoPairs {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let o0 = ctx.op0::<AMS>();
        let o1 = ctx.op::<AMS>(1, modulation(o0));
        let o2 = ctx.op::<AMS>(2, 0);
        let o3 = ctx.op::<AMS>(3, modulation(o2));
        o1 + o3
    }
}

impl Kernel for OneToThree {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let m = modulation(ctx.op0::<AMS>());
        ctx.op::<AMS>(1, m) + ctx.op::<AMS>(2, m) + ctx.op::<AMS>(3, m)
    }
}

impl Kernel for PairPlusTwo {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let o0 = ctx.op0::<AMS>();
        ctx.op::<AMS>(1, modulation(o0)) + ctx.op::<AMS>(2, 0) + ctx.op::<AMS>(3, 0)
    }
}

impl Kernel for Additive {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        ctx.op0::<AMS>() + ctx.op::<AMS>(1, 0) + ctx.op::<AMS>(2, 0) + ctx.op::<AMS>(3, 0)
    }
}

impl Kernel for SawPair {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let saw = ctx.note.phases.map(|p| ctx.tables.sawtooth(p));
        let low = ctx.shape::<AMS>(0, saw[0]) - ctx.shape::<AMS>(1, saw[1]);
        let high = ctx.shape::<AMS>(2, saw[2]) - ctx.shape::<AMS>(3, saw[3]);
        (low + high) >> 1
    }
}

impl Kernel for FakeTriangle {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let shift = ctx.synth.fake_triangle_shift();
        let m2 = modulation(ctx.op::<AMS>(2, 0));
        let m3 = modulation(ctx.op::<AMS>(3, 0));
        let t0 = ctx.tables.fake_triangle(ctx.note.phases[0].wrapping_add(m2 as u32), shift);
        let t1 = ctx.tables.fake_triangle(ctx.note.phases[1].wrapping_add(m3 as u32), shift);
        ctx.shape::<AMS>(0, t0) + ctx.shape::<AMS>(1, t1)
    }
}

impl Kernel for NoiseKernel {
    #[inline(always)]
    fn sample<const AMS: bool>(ctx: &mut Ctx<'_, '_>) -> i32 {
        let phase = ctx.note.phases[0];
        let cycle = phase >> PHASE_CYCLE_BITS;
        if cycle != ctx.note.noise_cycle {
            ctx.note.noise_cycle = cycle;
            ctx.note.noise_seed = ctx
                .note
                .noise_seed
                .wrapping_mul(1_664_525)
                .wrapping_add(1_013_904_223)
                .wrapping_add(ctx.synth.feedback_byte as u32);
        }
        let wave = ctx.tables.noise(phase, ctx.note.noise_seed >> 16);
        ctx.shape::<AMS>(0, wave) + ctx.op::<AMS>(1, 0) + ctx.op::<AMS>(2, 0) + ctx.op::<AMS>(3, 0)
    }
}
