//! Binary codecs for ksynth.
//!
//! Loads and saves tones (`.ksyb`), tone lists (`.kstb`) and scores
//! (`.kscb`) into the IR, and imports Standard MIDI Files as scores.

mod reader;
mod score;
mod smf;
mod tone;
mod tone_list;

pub use score::{load_score, save_score};
pub use smf::load_smf;
pub use tone::{load_tone, save_tone, TONE_BYTES};
pub use tone_list::{load_tone_list, save_tone_list};

use thiserror::Error;

/// Error type for format parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    #[error("invalid file header")]
    InvalidHeader,
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Unsupported format version
    #[error("unsupported format version")]
    UnsupportedVersion,
    /// I/O error
    #[error("i/o error: {0}")]
    Io(String),
    /// Structurally invalid content
    #[error("malformed data: {0}")]
    Malformed(String),
}

impl From<std::io::Error> for FormatError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<binrw::Error> for FormatError {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::BadMagic { .. } => Self::InvalidHeader,
            binrw::Error::Io(io) => io.into(),
            binrw::Error::Backtrace(bt) => Self::from(*bt.error),
            other => Self::Malformed(other.to_string()),
        }
    }
}
