//! Authored tone definitions.
//!
//! A tone is four operators plus shared routing and LFO settings, every
//! field an unconstrained byte. Packed bytes (phase coarse, keyscale
//! curves) are exposed as small typed structs with explicit
//! encode/decode helpers.

/// Operators per tone.
pub const OPERATOR_COUNT: usize = 4;

/// Envelope breakpoints per operator (three note-on segments plus release).
pub const ENVELOPE_POINTS: usize = 4;

/// Index of the release breakpoint.
pub const RELEASE_POINT: usize = 3;

/// Wave source, fixed-frequency flag and coarse ratio of an operator.
///
/// Byte layout: bit 7 fixed-frequency, bits 4-6 wave, bits 0-3 coarse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseCoarse {
    /// Absolute frequency instead of tracking the note
    pub fixed_frequency: bool,
    /// Wave source (0 = sine, 1-7 = custom wave slot 0-6)
    pub wave: u8,
    /// Coarse ratio (0 = one half) or fixed-frequency exponent (0-15)
    pub value: u8,
}

impl PhaseCoarse {
    /// Largest wave selector.
    pub const WAVE_MAX: u8 = 7;
    /// Largest coarse value.
    pub const VALUE_MAX: u8 = 15;

    /// Decode from the packed byte.
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            fixed_frequency: byte & 0x80 != 0,
            wave: (byte >> 4) & Self::WAVE_MAX,
            value: byte & Self::VALUE_MAX,
        }
    }

    /// Encode to the packed byte. Out-of-range fields are masked.
    pub const fn to_byte(self) -> u8 {
        ((self.fixed_frequency as u8) << 7)
            | ((self.wave & Self::WAVE_MAX) << 4)
            | (self.value & Self::VALUE_MAX)
    }
}

/// Shape of one side of a keyscale curve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyscaleCurve {
    /// Level falls linearly with distance from the mid-point
    #[default]
    LinearDown = 0,
    /// Level falls exponentially with distance
    ExpDown = 1,
    /// Level rises linearly with distance
    LinearUp = 2,
    /// Level rises exponentially with distance
    ExpUp = 3,
}

impl KeyscaleCurve {
    /// Decode from the low two bits of a nibble.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::LinearDown,
            1 => Self::ExpDown,
            2 => Self::LinearUp,
            _ => Self::ExpUp,
        }
    }

    /// Whether this curve raises the level away from the mid-point.
    pub const fn is_up(self) -> bool {
        matches!(self, Self::LinearUp | Self::ExpUp)
    }
}

/// Left (below mid-point) and right (above) keyscale curves, nibble-packed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyscaleCurves {
    pub left: KeyscaleCurve,
    pub right: KeyscaleCurve,
}

impl KeyscaleCurves {
    /// Decode: low nibble is the left curve, high nibble the right.
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            left: KeyscaleCurve::from_bits(byte & 0x0F),
            right: KeyscaleCurve::from_bits(byte >> 4),
        }
    }

    pub const fn to_byte(self) -> u8 {
        (self.left as u8) | ((self.right as u8) << 4)
    }
}

/// One authored envelope breakpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Target level (0-255)
    pub level: u8,
    /// Time to reach the level (exponentially encoded)
    pub time: u8,
}

impl EnvelopePoint {
    pub const fn new(level: u8, time: u8) -> Self {
        Self { level, time }
    }
}

/// Authored parameters of a single operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorParams {
    pub phase_coarse: PhaseCoarse,
    /// Initial phase (fraction of a cycle)
    pub phase_offset: u8,
    /// Fine ratio adjustment (0 = none, 255 = almost one more coarse step)
    pub phase_fine: u8,
    /// Detune around 128
    pub phase_tune: u8,
    /// Output level
    pub level: u8,
    /// Attack, decay, sustain and release breakpoints
    pub envelope: [EnvelopePoint; ENVELOPE_POINTS],
    pub velocity_sensitivity: u8,
    pub rate_scale: u8,
    /// Keyscale depth below the mid-point
    pub keyscale_low: u8,
    /// Keyscale depth above the mid-point
    pub keyscale_high: u8,
    /// Keyscale mid-point note
    pub keyscale_mid: u8,
    pub keyscale_curves: KeyscaleCurves,
    /// LFO amplitude-modulation depth
    pub lfo_ams_depth: u8,
}

impl Default for OperatorParams {
    fn default() -> Self {
        Self {
            phase_coarse: PhaseCoarse {
                fixed_frequency: false,
                wave: 0,
                value: 1,
            },
            phase_offset: 0,
            phase_fine: 0,
            phase_tune: 128,
            level: 0,
            envelope: [
                EnvelopePoint::new(255, 0),
                EnvelopePoint::new(255, 0),
                EnvelopePoint::new(255, 0),
                EnvelopePoint::new(0, 0x80),
            ],
            velocity_sensitivity: 0,
            rate_scale: 0,
            keyscale_low: 0,
            keyscale_high: 0,
            keyscale_mid: 60,
            keyscale_curves: KeyscaleCurves::default(),
            lfo_ams_depth: 0,
        }
    }
}

/// Operator routing selected by a tone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Algorithm {
    /// 0 -> 1 -> 2 -> 3
    #[default]
    Serial = 0,
    /// (0 + 1) -> 2 -> 3
    DualModSerial = 1,
    /// (0 + (1 -> 2)) -> 3
    BranchToCarrier = 2,
    /// ((0 -> 1) + 2) -> 3
    ChainPlusMod = 3,
    /// (0 -> 1) + (2 -> 3)
    TwoPairs = 4,
    /// 0 -> 1, 0 -> 2, 0 -> 3
    OneToThree = 5,
    /// (0 -> 1) + 2 + 3
    PairPlusTwo = 6,
    /// 0 + 1 + 2 + 3
    Additive = 7,
    /// Detuned sawtooth differences (0 - 1) + (2 - 3)
    SawPair = 8,
    /// Stepped triangles 0 and 1, phase-modulated by 2 and 3
    FakeTriangle = 9,
    /// Pseudo-noise on 0 plus sines 1, 2 and 3
    Noise = 10,
}

impl Algorithm {
    /// Number of algorithms.
    pub const COUNT: u8 = 11;

    /// Decode an authored byte; values past the last algorithm wrap.
    pub const fn from_byte(byte: u8) -> Self {
        match byte % Self::COUNT {
            0 => Self::Serial,
            1 => Self::DualModSerial,
            2 => Self::BranchToCarrier,
            3 => Self::ChainPlusMod,
            4 => Self::TwoPairs,
            5 => Self::OneToThree,
            6 => Self::PairPlusTwo,
            7 => Self::Additive,
            8 => Self::SawPair,
            9 => Self::FakeTriangle,
            _ => Self::Noise,
        }
    }

    /// Whether operators modulate each other's phase.
    pub const fn is_fm(self) -> bool {
        (self as u8) < 8
    }
}

/// LFO waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum LfoWave {
    #[default]
    Triangle = 0,
    Sawtooth = 1,
    Square = 2,
    Sine = 3,
    /// Sample-and-hold noise
    Noise = 4,
}

impl LfoWave {
    pub const COUNT: u8 = 5;

    pub const fn from_byte(byte: u8) -> Self {
        match byte % Self::COUNT {
            0 => Self::Triangle,
            1 => Self::Sawtooth,
            2 => Self::Square,
            3 => Self::Sine,
            _ => Self::Noise,
        }
    }
}

/// A complete authored tone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToneParameters {
    pub operators: [OperatorParams; OPERATOR_COUNT],
    pub algorithm: u8,
    pub feedback: u8,
    pub panpot: u8,
    pub lfo_wave: u8,
    pub lfo_freq: u8,
    /// LFO initial phase
    pub lfo_det: u8,
    pub lfo_fms_depth: u8,
}

impl Default for ToneParameters {
    /// A plain sine: serial routing with only the carrier audible.
    fn default() -> Self {
        let mut operators = [OperatorParams::default(); OPERATOR_COUNT];
        operators[OPERATOR_COUNT - 1].level = 255;
        Self {
            operators,
            algorithm: 0,
            feedback: 0,
            panpot: 128,
            lfo_wave: 0,
            lfo_freq: 0,
            lfo_det: 0,
            lfo_fms_depth: 0,
        }
    }
}

impl ToneParameters {
    pub fn algorithm(&self) -> Algorithm {
        Algorithm::from_byte(self.algorithm)
    }

    pub fn lfo_wave(&self) -> LfoWave {
        LfoWave::from_byte(self.lfo_wave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_coarse_byte_layout() {
        let pc = PhaseCoarse::from_byte(0b1011_0101);
        assert!(pc.fixed_frequency);
        assert_eq!(pc.wave, 3);
        assert_eq!(pc.value, 5);
        assert_eq!(pc.to_byte(), 0b1011_0101);
    }

    #[test]
    fn phase_coarse_masks_out_of_range_fields() {
        let pc = PhaseCoarse {
            fixed_frequency: false,
            wave: 9,
            value: 20,
        };
        assert_eq!(PhaseCoarse::from_byte(pc.to_byte()), PhaseCoarse::from_byte(0x14));
    }

    #[test]
    fn keyscale_curves_nibbles() {
        let curves = KeyscaleCurves::from_byte(0x31);
        assert_eq!(curves.left, KeyscaleCurve::ExpDown);
        assert_eq!(curves.right, KeyscaleCurve::ExpUp);
        assert_eq!(curves.to_byte(), 0x31);
        assert!(curves.right.is_up());
        assert!(!curves.left.is_up());
    }

    #[test]
    fn algorithm_wraps() {
        assert_eq!(Algorithm::from_byte(0), Algorithm::Serial);
        assert_eq!(Algorithm::from_byte(10), Algorithm::Noise);
        assert_eq!(Algorithm::from_byte(11), Algorithm::Serial);
        assert!(Algorithm::Additive.is_fm());
        assert!(!Algorithm::SawPair.is_fm());
    }

    #[test]
    fn default_tone_is_single_carrier() {
        let tone = ToneParameters::default();
        assert_eq!(tone.algorithm(), Algorithm::Serial);
        let levels: [u8; 4] = tone.operators.map(|op| op.level);
        assert_eq!(levels, [0, 0, 0, 255]);
        assert_eq!(tone.operators[0].envelope[RELEASE_POINT].level, 0);
    }
}
