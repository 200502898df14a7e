//! Tone binary (`.ksyb`): the magic `KSYN` followed by the packed tone.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use ks_ir::{EnvelopePoint, KeyscaleCurves, OperatorParams, PhaseCoarse, ToneParameters};

use crate::FormatError;

/// Packed size of one operator.
const OPERATOR_BYTES: usize = 20;
/// Packed size of a tone without magic.
pub const TONE_BYTES: usize = 4 * OPERATOR_BYTES + 7;

#[derive(BinRead, BinWrite, Clone, Copy, Debug)]
#[brw(little)]
struct RawOperator {
    phase_coarse: u8,
    phase_offset: u8,
    phase_fine: u8,
    phase_tune: u8,
    level: u8,
    /// (level, time) per breakpoint
    envelope: [[u8; 2]; 4],
    velocity_sensitivity: u8,
    rate_scale: u8,
    keyscale_low: u8,
    keyscale_high: u8,
    keyscale_mid: u8,
    keyscale_curves: u8,
    lfo_ams_depth: u8,
}

impl From<&OperatorParams> for RawOperator {
    fn from(op: &OperatorParams) -> Self {
        Self {
            phase_coarse: op.phase_coarse.to_byte(),
            phase_offset: op.phase_offset,
            phase_fine: op.phase_fine,
            phase_tune: op.phase_tune,
            level: op.level,
            envelope: op.envelope.map(|p| [p.level, p.time]),
            velocity_sensitivity: op.velocity_sensitivity,
            rate_scale: op.rate_scale,
            keyscale_low: op.keyscale_low,
            keyscale_high: op.keyscale_high,
            keyscale_mid: op.keyscale_mid,
            keyscale_curves: op.keyscale_curves.to_byte(),
            lfo_ams_depth: op.lfo_ams_depth,
        }
    }
}

impl From<RawOperator> for OperatorParams {
    fn from(raw: RawOperator) -> Self {
        Self {
            phase_coarse: PhaseCoarse::from_byte(raw.phase_coarse),
            phase_offset: raw.phase_offset,
            phase_fine: raw.phase_fine,
            phase_tune: raw.phase_tune,
            level: raw.level,
            envelope: raw.envelope.map(|[level, time]| EnvelopePoint::new(level, time)),
            velocity_sensitivity: raw.velocity_sensitivity,
            rate_scale: raw.rate_scale,
            keyscale_low: raw.keyscale_low,
            keyscale_high: raw.keyscale_high,
            keyscale_mid: raw.keyscale_mid,
            keyscale_curves: KeyscaleCurves::from_byte(raw.keyscale_curves),
            lfo_ams_depth: raw.lfo_ams_depth,
        }
    }
}

/// A tone as laid out on disk, shared with the tone-list codec.
#[derive(BinRead, BinWrite, Clone, Copy, Debug)]
#[brw(little)]
pub(crate) struct RawTone {
    operators: [RawOperator; 4],
    algorithm: u8,
    feedback: u8,
    panpot: u8,
    lfo_wave: u8,
    lfo_freq: u8,
    lfo_det: u8,
    lfo_fms_depth: u8,
}

impl From<&ToneParameters> for RawTone {
    fn from(tone: &ToneParameters) -> Self {
        Self {
            operators: tone.operators.each_ref().map(RawOperator::from),
            algorithm: tone.algorithm,
            feedback: tone.feedback,
            panpot: tone.panpot,
            lfo_wave: tone.lfo_wave,
            lfo_freq: tone.lfo_freq,
            lfo_det: tone.lfo_det,
            lfo_fms_depth: tone.lfo_fms_depth,
        }
    }
}

impl From<RawTone> for ToneParameters {
    fn from(raw: RawTone) -> Self {
        Self {
            operators: raw.operators.map(OperatorParams::from),
            algorithm: raw.algorithm,
            feedback: raw.feedback,
            panpot: raw.panpot,
            lfo_wave: raw.lfo_wave,
            lfo_freq: raw.lfo_freq,
            lfo_det: raw.lfo_det,
            lfo_fms_depth: raw.lfo_fms_depth,
        }
    }
}

#[derive(BinRead, BinWrite)]
#[brw(little, magic = b"KSYN")]
struct ToneFile {
    tone: RawTone,
}

/// Parse a `.ksyb` tone.
pub fn load_tone(data: &[u8]) -> Result<ToneParameters, FormatError> {
    let file = ToneFile::read(&mut Cursor::new(data))?;
    Ok(file.tone.into())
}

/// Encode a tone as `.ksyb`.
pub fn save_tone(tone: &ToneParameters) -> Result<Vec<u8>, FormatError> {
    let mut out = Cursor::new(Vec::with_capacity(4 + TONE_BYTES));
    ToneFile { tone: tone.into() }.write(&mut out)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_ir::{KeyscaleCurve, RELEASE_POINT};

    fn sample_tone() -> ToneParameters {
        let mut tone = ToneParameters::default();
        tone.algorithm = 4;
        tone.feedback = 96;
        tone.lfo_wave = 3;
        tone.lfo_freq = 40;
        tone.operators[0].phase_coarse = PhaseCoarse {
            fixed_frequency: true,
            wave: 2,
            value: 9,
        };
        tone.operators[1].keyscale_curves = KeyscaleCurves {
            left: KeyscaleCurve::ExpUp,
            right: KeyscaleCurve::LinearDown,
        };
        tone.operators[2].envelope[RELEASE_POINT] = EnvelopePoint::new(3, 200);
        tone
    }

    #[test]
    fn saved_tone_has_magic_and_fixed_size() {
        let bytes = save_tone(&ToneParameters::default()).expect("save");
        assert_eq!(&bytes[..4], b"KSYN");
        assert_eq!(bytes.len(), 4 + TONE_BYTES);
    }

    #[test]
    fn operator_byte_order() {
        let tone = sample_tone();
        let bytes = save_tone(&tone).expect("save");
        let op0 = &bytes[4..4 + OPERATOR_BYTES];
        assert_eq!(op0[0], 0b1010_1001);
        assert_eq!(op0[3], 128);
        let shared = &bytes[4 + 4 * OPERATOR_BYTES..];
        assert_eq!(shared, &[4, 96, 128, 3, 40, 0, 0]);
    }

    #[test]
    fn tone_survives_save_and_load() {
        let tone = sample_tone();
        let bytes = save_tone(&tone).expect("save");
        assert_eq!(load_tone(&bytes), Ok(tone));
    }

    #[test]
    fn bad_magic_is_invalid_header() {
        let mut bytes = save_tone(&ToneParameters::default()).expect("save");
        bytes[0] = b'X';
        assert_eq!(load_tone(&bytes), Err(FormatError::InvalidHeader));
    }

    #[test]
    fn truncated_tone_is_eof() {
        let bytes = save_tone(&ToneParameters::default()).expect("save");
        assert_eq!(load_tone(&bytes[..40]), Err(FormatError::UnexpectedEof));
    }
}
