//! Standard MIDI File import.

use ks_ir::{Score, ScoreEvent};
use log::{debug, warn};

use crate::reader::ByteReader;
use crate::score::{read_message, Decoded};
use crate::FormatError;

/// Parse a format 0 or 1 Standard MIDI File into a single-stream score.
///
/// Tracks are merged by absolute tick; events at the same tick keep
/// track order. SMPTE time division is not supported.
pub fn load_smf(data: &[u8]) -> Result<Score, FormatError> {
    let mut r = ByteReader::new(data);
    r.expect_tag(b"MThd")?;
    let header_len = r.read_u32_be()? as usize;
    if header_len < 6 {
        return Err(FormatError::Malformed(format!("header chunk of {} bytes", header_len)));
    }
    let format = r.read_u16_be()?;
    let track_count = r.read_u16_be()?;
    let division = r.read_u16_be()?;
    r.skip(header_len - 6)?;

    if format > 1 {
        return Err(FormatError::UnsupportedVersion);
    }
    if division & 0x8000 != 0 {
        return Err(FormatError::UnsupportedVersion);
    }
    if division == 0 {
        return Err(FormatError::Malformed("zero ticks per quarter note".into()));
    }

    let mut timed: Vec<(u64, ScoreEvent)> = Vec::new();
    let mut tracks_read = 0u16;
    while tracks_read < track_count && !r.is_empty() {
        let tag = r.read_bytes(4)?;
        let len = r.read_u32_be()? as usize;
        let body = r.read_bytes(len)?;
        if tag != b"MTrk" {
            debug!("skipping chunk {:?}", String::from_utf8_lossy(tag));
            continue;
        }
        read_track(body, &mut timed)?;
        tracks_read += 1;
    }
    if tracks_read < track_count {
        warn!("header declares {} tracks, found {}", track_count, tracks_read);
    }

    timed.sort_by_key(|&(tick, _)| tick);
    let mut score = Score::new(division);
    let mut last = 0u64;
    for (tick, mut event) in timed {
        event.delta = (tick - last).min(u32::MAX as u64 - 1) as u32;
        last = tick;
        score.push(event);
    }
    score.push(ScoreEvent::end());
    debug!(
        "imported {} events from {} tracks at {} ticks per quarter",
        score.events.len() - 1,
        tracks_read,
        division
    );
    Ok(score)
}

fn read_track(body: &[u8], out: &mut Vec<(u64, ScoreEvent)>) -> Result<(), FormatError> {
    let mut r = ByteReader::new(body);
    let mut running = 0u8;
    let mut tick = 0u64;
    while !r.is_empty() {
        tick += r.read_vlq()? as u64;
        match read_message(&mut r, 0, &mut running)? {
            Decoded::Event(event) => out.push((tick, event)),
            Decoded::Skipped => {}
            Decoded::EndOfTrack => break,
        }
    }
    Ok(())
}
