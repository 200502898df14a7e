//! Per-channel controller state for score playback.

use crate::render::StereoGain;
use crate::tone_list::BankNumber;

/// Channels addressed by a score.
pub const CHANNEL_COUNT: usize = 16;
/// Channel that plays percussion banks.
pub const PERCUSSION_CHANNEL: u8 = 9;

pub const DEFAULT_VOLUME: u8 = 100;
pub const CENTRE_PAN: u8 = 64;
pub const PITCH_BEND_CENTRE: u16 = 8192;

/// Controller state of one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelState {
    pub percussion: bool,
    /// Bank select as last received (applied on the next program change)
    pub bank_msb: u8,
    pub bank_lsb: u8,
    /// Bank the current program resolved to
    pub bank: Option<BankNumber>,
    pub program: u8,
    pub volume: u8,
    pub pan: u8,
    /// Volume and balance (Q16 per side)
    pub gain: StereoGain,
    /// 14-bit value, 8192 = centre
    pub pitch_bend: u16,
    /// Frequency multiplier for the current bend (Q16)
    pub pitch_multiplier: u32,
}

impl ChannelState {
    pub fn new(percussion: bool) -> Self {
        let mut channel = Self {
            percussion,
            bank_msb: 0,
            bank_lsb: 0,
            bank: None,
            program: 0,
            volume: DEFAULT_VOLUME,
            pan: CENTRE_PAN,
            gain: StereoGain::UNITY,
            pitch_bend: PITCH_BEND_CENTRE,
            pitch_multiplier: 1 << 16,
        };
        channel.update_gain();
        channel
    }

    /// Bank number requested by the latest bank select.
    pub fn requested_bank(&self) -> BankNumber {
        BankNumber::new(self.bank_msb, self.bank_lsb, self.percussion)
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume & 0x7F;
        self.update_gain();
    }

    pub fn set_pan(&mut self, pan: u8) {
        self.pan = pan & 0x7F;
        self.update_gain();
    }

    /// Bend by a 14-bit value over +/- `range` semitones.
    pub fn set_pitch_bend(&mut self, value: u16, range: u8) {
        self.pitch_bend = value & 0x3FFF;
        self.pitch_multiplier = pitch_multiplier(self.pitch_bend, range);
    }

    /// Volume, pan and pitch bend back to defaults. Bank and program are kept.
    pub fn reset_controllers(&mut self) {
        self.volume = DEFAULT_VOLUME;
        self.pan = CENTRE_PAN;
        self.pitch_bend = PITCH_BEND_CENTRE;
        self.pitch_multiplier = 1 << 16;
        self.update_gain();
    }

    fn update_gain(&mut self) {
        self.gain = channel_gain(self.volume, self.pan);
    }
}

/// Volume scales both sides; pan is a balance that attenuates the far side only.
fn channel_gain(volume: u8, pan: u8) -> StereoGain {
    let volume = ((volume as i64) << 16) / 127;
    let pan = pan.min(127) as i64;
    let centre = CENTRE_PAN as i64;
    let left = if pan <= centre { 1 << 16 } else { ((127 - pan) << 16) / (127 - centre) };
    let right = if pan >= centre { 1 << 16 } else { (pan << 16) / centre };
    StereoGain::new(((volume * left) >> 16) as i32, ((volume * right) >> 16) as i32)
}

fn pitch_multiplier(value: u16, range: u8) -> u32 {
    let offset = (value as f32 - PITCH_BEND_CENTRE as f32) / PITCH_BEND_CENTRE as f32;
    let semitones = offset * range as f32;
    libm::roundf(libm::exp2f(semitones / 12.0) * 65536.0) as u32
}
