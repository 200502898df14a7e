//! Synthesis engine for ksynth.
//!
//! Compiles tones into fixed-point synths, renders voices through the
//! eleven operator algorithms, and plays scores through a hashed voice
//! pool.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
pub mod fixed;
mod frame;
mod note;
mod render;
mod sequencer;
mod synth;
pub mod tables;
mod tone_list;
mod voice;
mod voice_pool;

pub use channel::{ChannelState, CHANNEL_COUNT, PERCUSSION_CHANNEL};
pub use frame::Frame;
pub use note::{EnvelopeState, SynthNote};
pub use render::{render, StereoGain, WaveSet};
pub use sequencer::{EngineConfig, SequencerState};
pub use synth::{OperatorSynth, Synth};
pub use tables::{WaveTable, WaveTables};
pub use tone_list::{
    BankNumber, ProgramSlot, SynthKey, ToneBank, ToneList, CUSTOM_WAVE_RATE, MAX_CUSTOM_WAVES,
};
pub use voice::{Voice, VoiceState};
pub use voice_pool::{VoiceId, VoicePool};
