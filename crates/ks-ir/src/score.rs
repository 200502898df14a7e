//! Delta-timed event stream mirroring MIDI channel-voice messages.

use alloc::vec::Vec;

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;
pub const STATUS_PROGRAM_CHANGE: u8 = 0xC0;
pub const STATUS_PITCH_BEND: u8 = 0xE0;
/// Tempo meta-event; data holds microseconds per quarter note, big-endian.
pub const STATUS_META: u8 = 0xFF;

pub const CC_BANK_MSB: u8 = 0;
pub const CC_VOLUME: u8 = 7;
/// Pan controller in this engine's convention.
pub const CC_PAN: u8 = 16;
pub const CC_BANK_LSB: u8 = 32;
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_RESET_CONTROLLERS: u8 = 121;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Delta value that terminates the event list.
pub const END_OF_SCORE: u32 = u32::MAX;

/// 120 BPM in microseconds per quarter note.
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Ticks per quarter note when a score does not say.
pub const DEFAULT_RESOLUTION: u16 = 96;

/// One event: a delta in ticks since the previous event, a status byte
/// and up to three data bytes.
///
/// A status below 0x80 is running status: the byte is the first data
/// byte of a message using the previous status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScoreEvent {
    pub delta: u32,
    pub status: u8,
    pub data: [u8; 3],
}

impl ScoreEvent {
    pub const fn new(delta: u32, status: u8, data: [u8; 3]) -> Self {
        Self { delta, status, data }
    }

    pub const fn note_on(delta: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(delta, STATUS_NOTE_ON | (channel & 0x0F), [note & 0x7F, velocity & 0x7F, 0])
    }

    pub const fn note_off(delta: u32, channel: u8, note: u8) -> Self {
        Self::new(delta, STATUS_NOTE_OFF | (channel & 0x0F), [note & 0x7F, 0, 0])
    }

    pub const fn control_change(delta: u32, channel: u8, controller: u8, value: u8) -> Self {
        Self::new(
            delta,
            STATUS_CONTROL_CHANGE | (channel & 0x0F),
            [controller & 0x7F, value & 0x7F, 0],
        )
    }

    pub const fn program_change(delta: u32, channel: u8, program: u8) -> Self {
        Self::new(delta, STATUS_PROGRAM_CHANGE | (channel & 0x0F), [program & 0x7F, 0, 0])
    }

    /// Pitch bend with a 14-bit value (8192 = centre).
    pub const fn pitch_bend(delta: u32, channel: u8, value: u16) -> Self {
        Self::new(
            delta,
            STATUS_PITCH_BEND | (channel & 0x0F),
            [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8, 0],
        )
    }

    pub const fn tempo(delta: u32, micros_per_quarter: u32) -> Self {
        let b = micros_per_quarter.to_be_bytes();
        Self::new(delta, STATUS_META, [b[1], b[2], b[3]])
    }

    /// Terminal event; nothing after it is dispatched.
    pub const fn end() -> Self {
        Self::new(END_OF_SCORE, STATUS_META, [0; 3])
    }

    pub const fn is_end(&self) -> bool {
        self.delta == END_OF_SCORE
    }

    /// Decode with an explicit status (resolving running status is the caller's job).
    pub fn message(status: u8, data: [u8; 3]) -> Message {
        let channel = status & 0x0F;
        match status & 0xF0 {
            STATUS_NOTE_OFF => Message::NoteOff { channel, note: data[0] & 0x7F },
            STATUS_NOTE_ON => Message::NoteOn {
                channel,
                note: data[0] & 0x7F,
                velocity: data[1] & 0x7F,
            },
            STATUS_CONTROL_CHANGE => Message::ControlChange {
                channel,
                controller: data[0] & 0x7F,
                value: data[1] & 0x7F,
            },
            STATUS_PROGRAM_CHANGE => Message::ProgramChange { channel, program: data[0] & 0x7F },
            STATUS_PITCH_BEND => Message::PitchBend {
                channel,
                value: (data[0] & 0x7F) as u16 | (((data[1] & 0x7F) as u16) << 7),
            },
            _ if status == STATUS_META => {
                Message::Tempo(u32::from_be_bytes([0, data[0], data[1], data[2]]))
            }
            _ => Message::Other(status),
        }
    }
}

/// A decoded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    NoteOff { channel: u8, note: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    PitchBend { channel: u8, value: u16 },
    /// Microseconds per quarter note
    Tempo(u32),
    /// Aftertouch, system messages: ignored by the sequencer
    Other(u8),
}

/// A complete score.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Score {
    /// Ticks per quarter note
    pub resolution: u16,
    pub events: Vec<ScoreEvent>,
}

impl Default for Score {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            events: Vec::new(),
        }
    }
}

impl Score {
    pub fn new(resolution: u16) -> Self {
        Self {
            resolution,
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, event: ScoreEvent) {
        self.events.push(event);
    }

    /// Total length in ticks, up to the terminal event if any.
    pub fn length_ticks(&self) -> u64 {
        self.events
            .iter()
            .take_while(|e| !e.is_end())
            .map(|e| e.delta as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_channel_messages() {
        let on = ScoreEvent::note_on(0, 3, 60, 100);
        assert_eq!(
            ScoreEvent::message(on.status, on.data),
            Message::NoteOn { channel: 3, note: 60, velocity: 100 }
        );
        let bend = ScoreEvent::pitch_bend(0, 1, 0x2001);
        assert_eq!(
            ScoreEvent::message(bend.status, bend.data),
            Message::PitchBend { channel: 1, value: 0x2001 }
        );
    }

    #[test]
    fn tempo_is_big_endian_24_bit() {
        let ev = ScoreEvent::tempo(0, 500_000);
        assert_eq!(ev.data, [0x07, 0xA1, 0x20]);
        assert_eq!(ScoreEvent::message(ev.status, ev.data), Message::Tempo(500_000));
    }

    #[test]
    fn length_stops_at_end_marker() {
        let mut score = Score::new(96);
        score.push(ScoreEvent::note_on(0, 0, 60, 100));
        score.push(ScoreEvent::note_off(96, 0, 60));
        score.push(ScoreEvent::end());
        assert_eq!(score.length_ticks(), 96);
    }
}
