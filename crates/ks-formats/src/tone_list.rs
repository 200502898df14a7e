//! Tone list binary (`.kstb`).
//!
//! Layout: magic `KSTL`, `u32` LE entry count, then per entry the bank
//! MSB, bank LSB, program and note bytes, a 32-byte NUL-padded name and
//! the packed tone without its magic.

use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};
use ks_ir::{ToneListData, ToneListEntry, TONE_NAME_LEN};
use log::debug;

use crate::tone::{RawTone, TONE_BYTES};
use crate::FormatError;

const HEADER_BYTES: usize = 8;
const ENTRY_BYTES: usize = 4 + TONE_NAME_LEN + TONE_BYTES;

#[derive(BinRead, BinWrite)]
#[brw(little)]
struct RawEntry {
    msb: u8,
    lsb: u8,
    program: u8,
    note: u8,
    name: [u8; TONE_NAME_LEN],
    tone: RawTone,
}

#[binrw]
#[brw(little, magic = b"KSTL")]
struct ToneListFile {
    #[br(temp)]
    #[bw(calc = entries.len() as u32)]
    count: u32,
    #[br(count = count)]
    entries: Vec<RawEntry>,
}

impl From<&ToneListEntry> for RawEntry {
    fn from(entry: &ToneListEntry) -> Self {
        let mut name = [0u8; TONE_NAME_LEN];
        let bytes = entry.name.as_bytes();
        name[..bytes.len()].copy_from_slice(bytes);
        Self {
            msb: entry.msb,
            lsb: entry.lsb,
            program: entry.program,
            note: entry.note,
            name,
            tone: (&entry.tone).into(),
        }
    }
}

impl From<RawEntry> for ToneListEntry {
    fn from(raw: RawEntry) -> Self {
        let len = raw.name.iter().position(|&b| b == 0).unwrap_or(TONE_NAME_LEN);
        let name = String::from_utf8_lossy(&raw.name[..len]);
        let mut entry = ToneListEntry::new(&name, raw.msb, raw.lsb, raw.program, raw.tone.into());
        entry.note = raw.note;
        entry
    }
}

/// Parse a `.kstb` tone list.
pub fn load_tone_list(data: &[u8]) -> Result<ToneListData, FormatError> {
    if data.len() >= HEADER_BYTES && &data[..4] == b"KSTL" {
        let count = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        if count.saturating_mul(ENTRY_BYTES) > data.len() - HEADER_BYTES {
            return Err(FormatError::UnexpectedEof);
        }
    }
    let file = ToneListFile::read(&mut Cursor::new(data))?;
    debug!("loaded tone list with {} entries", file.entries.len());
    Ok(ToneListData {
        entries: file.entries.into_iter().map(ToneListEntry::from).collect(),
    })
}

/// Encode a tone list as `.kstb`.
pub fn save_tone_list(list: &ToneListData) -> Result<Vec<u8>, FormatError> {
    let file = ToneListFile {
        entries: list.entries.iter().map(RawEntry::from).collect(),
    };
    let mut out = Cursor::new(Vec::with_capacity(HEADER_BYTES + list.len() * ENTRY_BYTES));
    file.write(&mut out)?;
    Ok(out.into_inner())
}
