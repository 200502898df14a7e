//! Audio frame type.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: i16) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Saturate a wide mix accumulator into 16 bits.
    pub fn from_mix(left: i32, right: i32) -> Self {
        Self {
            left: left.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            right: right.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mix_saturates() {
        assert_eq!(Frame::from_mix(40_000, -40_000), Frame { left: 32767, right: -32768 });
        assert_eq!(Frame::from_mix(12, -7), Frame { left: 12, right: -7 });
    }

    #[test]
    fn mono_and_silence() {
        assert_eq!(Frame::mono(-5), Frame { left: -5, right: -5 });
        assert!(Frame::silence().is_silent());
        assert!(!Frame::mono(1).is_silent());
    }
}
