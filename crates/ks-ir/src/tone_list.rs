//! Tone list: the authored bank/program assignments of a set of tones.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::tone::ToneParameters;

/// Note byte meaning "all notes" (a melodic, non-percussion entry).
pub const NOTE_ALL: u8 = 0x80;

/// Programs at or above this number request a custom waveform slot.
pub const CUSTOM_WAVE_PROGRAM: u8 = 128;

/// Fixed size of a tone name in the binary layout.
pub const TONE_NAME_LEN: usize = 32;

/// One tone assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToneListEntry {
    /// Bank select MSB (7-bit)
    pub msb: u8,
    /// Bank select LSB (7-bit)
    pub lsb: u8,
    /// Program number, or custom wave slot + 128
    pub program: u8,
    /// Note number for percussion entries, `NOTE_ALL` otherwise
    pub note: u8,
    pub name: ArrayString<TONE_NAME_LEN>,
    pub tone: ToneParameters,
}

impl ToneListEntry {
    /// Create a melodic entry.
    pub fn new(name: &str, msb: u8, lsb: u8, program: u8, tone: ToneParameters) -> Self {
        let mut entry = Self {
            msb,
            lsb,
            program,
            note: NOTE_ALL,
            name: ArrayString::new(),
            tone,
        };
        push_truncated(&mut entry.name, name);
        entry
    }

    /// Create a percussion entry bound to a single note.
    pub fn percussion(
        name: &str,
        msb: u8,
        lsb: u8,
        program: u8,
        note: u8,
        tone: ToneParameters,
    ) -> Self {
        let mut entry = Self::new(name, msb, lsb, program, tone);
        entry.note = note & 0x7F;
        entry
    }

    pub fn is_percussion(&self) -> bool {
        self.note != NOTE_ALL
    }

    pub fn is_custom_wave(&self) -> bool {
        self.program >= CUSTOM_WAVE_PROGRAM
    }
}

/// Copy as much of `s` as fits, never splitting a character.
fn push_truncated(dst: &mut ArrayString<TONE_NAME_LEN>, s: &str) {
    for ch in s.chars() {
        if dst.try_push(ch).is_err() {
            break;
        }
    }
}

/// All entries of an authored tone list, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToneListData {
    pub entries: Vec<ToneListEntry>,
}

impl ToneListData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ToneListEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
