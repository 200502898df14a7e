//! Core data types for ksynth.
//!
//! This crate defines the plain-old-data structures that the codecs
//! produce and the engine consumes: authored tones, tone lists, and
//! delta-timed scores. Nothing here depends on a sampling rate.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod score;
mod tone;
mod tone_list;

pub use score::{
    Message, Score, ScoreEvent, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_BANK_LSB, CC_BANK_MSB,
    CC_PAN, CC_RESET_CONTROLLERS, CC_VOLUME, DEFAULT_RESOLUTION, DEFAULT_TEMPO, END_OF_SCORE,
    STATUS_CONTROL_CHANGE, STATUS_META, STATUS_NOTE_OFF, STATUS_NOTE_ON, STATUS_PITCH_BEND,
    STATUS_PROGRAM_CHANGE,
};
pub use tone::{
    Algorithm, EnvelopePoint, KeyscaleCurve, KeyscaleCurves, LfoWave, OperatorParams,
    PhaseCoarse, ToneParameters, ENVELOPE_POINTS, OPERATOR_COUNT, RELEASE_POINT,
};
pub use tone_list::{ToneListData, ToneListEntry, CUSTOM_WAVE_PROGRAM, NOTE_ALL, TONE_NAME_LEN};
