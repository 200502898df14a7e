//! Score binary (`.kscb`) and the MIDI event stream shared with SMF import.
//!
//! Layout: magic `KSCB`, `u16` LE resolution, `u32` LE record count, then
//! one record per event: a variable-length delta and a MIDI message with
//! running status. Tempo is the meta event `FF 51 03`, the end of the
//! score `FF 2F 00`.

use ks_ir::{Score, ScoreEvent, STATUS_META};
use log::trace;

use crate::reader::{write_vlq, ByteReader, VLQ_MAX};
use crate::FormatError;

const MAGIC: &[u8; 4] = b"KSCB";

pub(crate) const META_END_OF_TRACK: u8 = 0x2F;
pub(crate) const META_TEMPO: u8 = 0x51;
const SYSEX: u8 = 0xF0;
const SYSEX_ESCAPE: u8 = 0xF7;

/// Result of reading one message.
pub(crate) enum Decoded {
    Event(ScoreEvent),
    EndOfTrack,
    /// Meta or system-exclusive data the engine has no use for
    Skipped,
}

/// Data bytes following a channel status.
fn data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

/// Read one message after its delta. `running` holds the running status
/// and is updated; the returned event always carries an explicit status.
pub(crate) fn read_message(
    r: &mut ByteReader<'_>,
    delta: u32,
    running: &mut u8,
) -> Result<Decoded, FormatError> {
    let first = r.read_u8()?;
    let (status, first_data) = if first < 0x80 {
        if *running == 0 {
            return Err(FormatError::Malformed(format!(
                "running status with no prior status at offset {}",
                r.position() - 1
            )));
        }
        (*running, Some(first))
    } else {
        (first, None)
    };

    match status {
        STATUS_META => {
            *running = 0;
            let kind = r.read_u8()?;
            let len = r.read_vlq()? as usize;
            let data = r.read_bytes(len)?;
            match (kind, data) {
                (META_END_OF_TRACK, _) => Ok(Decoded::EndOfTrack),
                (META_TEMPO, &[a, b, c]) => {
                    Ok(Decoded::Event(ScoreEvent::new(delta, STATUS_META, [a, b, c])))
                }
                _ => {
                    trace!("skipping meta event {:#04x} ({} bytes)", kind, len);
                    Ok(Decoded::Skipped)
                }
            }
        }
        SYSEX | SYSEX_ESCAPE => {
            *running = 0;
            let len = r.read_vlq()? as usize;
            r.skip(len)?;
            Ok(Decoded::Skipped)
        }
        0xF1..=0xFE => Err(FormatError::Malformed(format!(
            "system message {:#04x} in event stream",
            status
        ))),
        _ => {
            *running = status;
            let d0 = match first_data {
                Some(b) => b,
                None => r.read_u8()?,
            };
            let d1 = if data_len(status) == 2 { r.read_u8()? } else { 0 };
            Ok(Decoded::Event(ScoreEvent::new(delta, status, [d0 & 0x7F, d1 & 0x7F, 0])))
        }
    }
}

/// Parse a `.kscb` score.
pub fn load_score(data: &[u8]) -> Result<Score, FormatError> {
    let mut r = ByteReader::new(data);
    r.expect_tag(MAGIC)?;
    let mut score = Score::new(r.read_u16_le()?);
    let count = r.read_u32_le()?;

    let mut running = 0u8;
    let mut pending = 0u32;
    for _ in 0..count {
        let delta = r.read_vlq()?;
        match read_message(&mut r, pending.saturating_add(delta), &mut running)? {
            Decoded::Event(event) => {
                score.push(event);
                pending = 0;
            }
            Decoded::Skipped => pending = pending.saturating_add(delta),
            Decoded::EndOfTrack => {
                score.push(ScoreEvent::end());
                break;
            }
        }
    }
    Ok(score)
}

/// Encode a score as `.kscb`.
///
/// Events with a running status byte are written after the message
/// they continue. Deltas must fit a four-byte variable-length quantity.
pub fn save_score(score: &Score) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::with_capacity(10 + score.events.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&score.resolution.to_le_bytes());
    out.extend_from_slice(&(score.events.len() as u32).to_le_bytes());

    let mut running = 0u8;
    for event in &score.events {
        if event.is_end() {
            write_vlq(&mut out, 0);
            out.extend_from_slice(&[STATUS_META, META_END_OF_TRACK, 0]);
            break;
        }
        if event.delta > VLQ_MAX {
            return Err(FormatError::Malformed(format!("delta {} too large", event.delta)));
        }
        write_vlq(&mut out, event.delta);

        if event.status == STATUS_META {
            out.extend_from_slice(&[STATUS_META, META_TEMPO, 3]);
            out.extend_from_slice(&event.data);
            running = 0;
            continue;
        }
        let (status, data) = if event.status < 0x80 {
            (running, [event.status, event.data[0]])
        } else {
            (event.status, [event.data[0], event.data[1]])
        };
        if status < 0x80 || status >= 0xF0 {
            return Err(FormatError::Malformed(format!(
                "cannot encode status {:#04x}",
                event.status
            )));
        }
        if status != running {
            out.push(status);
            running = status;
        }
        out.extend_from_slice(&data[..data_len(status)]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_note_score() -> Score {
        let mut score = Score::new(480);
        score.push(ScoreEvent::tempo(0, 400_000));
        score.push(ScoreEvent::program_change(0, 0, 5));
        score.push(ScoreEvent::note_on(0, 0, 60, 100));
        score.push(ScoreEvent::note_on(0, 0, 64, 90));
        score.push(ScoreEvent::note_off(480, 0, 60));
        score.push(ScoreEvent::pitch_bend(10, 0, 0x2345));
        score.push(ScoreEvent::end());
        score
    }

    #[test]
    fn running_status_is_compressed() {
        let bytes = save_score(&two_note_score()).expect("save");
        let stream = &bytes[10..];
        assert_eq!(
            stream,
            &[
                0x00, 0xFF, 0x51, 0x03, 0x06, 0x1A, 0x80, // tempo
                0x00, 0xC0, 0x05, // program
                0x00, 0x90, 60, 100, // note on
                0x00, 64, 90, // running status
                0x83, 0x60, 0x80, 60, 0, // note off
                0x0A, 0xE0, 0x45, 0x46, // pitch bend
                0x00, 0xFF, 0x2F, 0x00,
            ][..]
        );
    }

    #[test]
    fn score_survives_save_and_load() {
        let score = two_note_score();
        let loaded = load_score(&save_score(&score).expect("save")).expect("load");
        assert_eq!(loaded, score);
        assert_eq!(loaded.length_ticks(), 490);
    }

    #[test]
    fn running_status_events_resolve_on_load() {
        let mut score = Score::new(96);
        score.push(ScoreEvent::note_on(0, 3, 60, 100));
        score.push(ScoreEvent::new(12, 62, [80, 0, 0]));
        let loaded = load_score(&save_score(&score).expect("save")).expect("load");
        assert_eq!(loaded.events[1], ScoreEvent::note_on(12, 3, 62, 80));
    }

    #[test]
    fn skipped_meta_delta_carries_over() {
        let mut bytes = b"KSCB".to_vec();
        bytes.extend_from_slice(&96u16.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0x05, 0xFF, 0x01, 0x02, b'h', b'i']);
        bytes.extend_from_slice(&[0x07, 0x90, 60, 100]);
        let score = load_score(&bytes).expect("load");
        assert_eq!(score.events, vec![ScoreEvent::note_on(12, 0, 60, 100)]);
    }

    #[test]
    fn running_status_without_status_is_malformed() {
        let mut bytes = b"KSCB".to_vec();
        bytes.extend_from_slice(&96u16.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0x00, 60, 100]);
        assert!(matches!(load_score(&bytes), Err(FormatError::Malformed(_))));
    }

    #[test]
    fn truncated_stream_is_eof() {
        let bytes = save_score(&two_note_score()).expect("save");
        assert_eq!(load_score(&bytes[..20]), Err(FormatError::UnexpectedEof));
        assert_eq!(load_score(b"MThd"), Err(FormatError::InvalidHeader));
    }

    #[test]
    fn oversized_delta_is_rejected() {
        let mut score = Score::new(96);
        score.push(ScoreEvent::note_on(VLQ_MAX + 1, 0, 60, 100));
        assert!(matches!(save_score(&score), Err(FormatError::Malformed(_))));
    }
}
