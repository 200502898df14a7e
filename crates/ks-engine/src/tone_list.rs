//! Runtime tone list: compiled synths organised into banks of programs.
//!
//! Banks live in an open-addressing table keyed by bank number. Synths
//! live in a slot map; banks and voices refer to them by `SynthKey`.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use log::{debug, warn};
use slotmap::SlotMap;

use ks_ir::{ToneListData, ToneParameters, CUSTOM_WAVE_PROGRAM};

use crate::note::SynthNote;
use crate::render::{render, StereoGain, WaveSet};
use crate::synth::Synth;
use crate::tables::{WaveTable, WaveTables, NOTE_COUNT, UNITY, WAVE_LEN, WAVE_PEAK};

slotmap::new_key_type! {
    /// Key into a tone list's compiled synths.
    pub struct SynthKey;
}

/// Programs per bank.
pub const PROGRAM_COUNT: usize = 128;

/// Custom waveform slots.
pub const MAX_CUSTOM_WAVES: usize = 7;

/// Sampling rate at which a custom wave is baked: one cycle of A4 spans
/// exactly one table.
pub const CUSTOM_WAVE_RATE: u32 = 440 * WAVE_LEN as u32;

const CUSTOM_WAVE_NOTE: u8 = 69;
const INITIAL_BANK_CAPACITY: usize = 8;

/// Bank select value plus the percussion flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BankNumber {
    pub msb: u8,
    pub lsb: u8,
    pub percussion: bool,
}

impl BankNumber {
    pub const fn new(msb: u8, lsb: u8, percussion: bool) -> Self {
        Self {
            msb: msb & 0x7F,
            lsb: lsb & 0x7F,
            percussion,
        }
    }

    pub const fn hash(self) -> usize {
        ((self.percussion as usize) << 8) | ((self.msb as usize) << 7) | self.lsb as usize
    }
}

/// What a program number maps to within a bank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ProgramSlot {
    #[default]
    Empty,
    /// One synth for every note
    Melodic(SynthKey),
    /// One synth per note
    Percussion(Box<[Option<SynthKey>; NOTE_COUNT]>),
}

/// 128 programs of one bank.
#[derive(Clone, Debug)]
pub struct ToneBank {
    number: BankNumber,
    programs: Vec<ProgramSlot>,
}

impl ToneBank {
    pub fn new(number: BankNumber) -> Self {
        Self {
            number,
            programs: vec![ProgramSlot::Empty; PROGRAM_COUNT],
        }
    }

    pub fn number(&self) -> BankNumber {
        self.number
    }

    pub fn slot(&self, program: u8) -> &ProgramSlot {
        &self.programs[program as usize & (PROGRAM_COUNT - 1)]
    }

    /// Synth sounding `note` on `program`.
    pub fn synth_key(&self, program: u8, note: u8) -> Option<SynthKey> {
        match self.slot(program) {
            ProgramSlot::Empty => None,
            ProgramSlot::Melodic(key) => Some(*key),
            ProgramSlot::Percussion(notes) => notes[note as usize & (NOTE_COUNT - 1)],
        }
    }

    pub fn has_program(&self, program: u8) -> bool {
        !matches!(self.slot(program), ProgramSlot::Empty)
    }

    pub fn program_count(&self) -> usize {
        self.programs.iter().filter(|p| !matches!(p, ProgramSlot::Empty)).count()
    }

    fn keys(&self) -> impl Iterator<Item = SynthKey> + '_ {
        self.programs.iter().flat_map(|slot| {
            let (melodic, notes) = match slot {
                ProgramSlot::Empty => (None, None),
                ProgramSlot::Melodic(key) => (Some(*key), None),
                ProgramSlot::Percussion(notes) => (None, Some(notes.iter().flatten().copied())),
            };
            melodic.into_iter().chain(notes.into_iter().flatten())
        })
    }
}

/// Compiled tones plus bank/program lookup.
pub struct ToneList {
    tables: Arc<WaveTables>,
    sampling_rate: u32,
    banks: Vec<Option<ToneBank>>,
    bank_count: usize,
    synths: SlotMap<SynthKey, Synth>,
    custom_waves: heapless::Vec<Option<Box<WaveTable>>, MAX_CUSTOM_WAVES>,
}

impl ToneList {
    pub fn new(tables: Arc<WaveTables>, sampling_rate: u32) -> Self {
        Self {
            tables,
            sampling_rate,
            banks: vec![None; INITIAL_BANK_CAPACITY],
            bank_count: 0,
            synths: SlotMap::with_key(),
            custom_waves: heapless::Vec::new(),
        }
    }

    /// Compile every entry of an authored tone list.
    ///
    /// Entries at or past program 128 bake custom waveforms. A repeated
    /// melodic (bank, program) keeps the first entry.
    pub fn from_data(tables: Arc<WaveTables>, sampling_rate: u32, data: &ToneListData) -> Self {
        let mut list = Self::new(tables, sampling_rate);
        for entry in &data.entries {
            if entry.is_custom_wave() {
                let slot = (entry.program - CUSTOM_WAVE_PROGRAM) as usize;
                list.set_custom_wave(slot, &entry.tone);
                continue;
            }
            let number = BankNumber::new(entry.msb, entry.lsb, entry.is_percussion());
            let note = entry.is_percussion().then_some(entry.note);
            if !list.insert_tone(number, entry.program, note, &entry.tone) {
                debug!("tone {:?} skipped", entry.name.as_str());
            }
        }
        debug!(
            "tone list: {} banks, {} tones, {} custom waves",
            list.bank_count,
            list.synths.len(),
            list.custom_wave_count()
        );
        list
    }

    pub fn tables(&self) -> &Arc<WaveTables> {
        &self.tables
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    /// Tables and custom waves for rendering.
    pub fn waves(&self) -> WaveSet<'_> {
        WaveSet {
            tables: &self.tables,
            custom: &self.custom_waves,
        }
    }

    pub fn synth(&self, key: SynthKey) -> Option<&Synth> {
        self.synths.get(key)
    }

    pub fn tone_count(&self) -> usize {
        self.synths.len()
    }

    pub fn bank_count(&self) -> usize {
        self.bank_count
    }

    /// Current bank table size (always a power of two).
    pub fn bank_capacity(&self) -> usize {
        self.banks.len()
    }

    pub fn custom_wave_count(&self) -> usize {
        self.custom_waves.iter().filter(|w| w.is_some()).count()
    }

    pub fn find_bank(&self, number: BankNumber) -> Option<&ToneBank> {
        self.find_slot(number).and_then(|i| self.banks[i].as_ref())
    }

    /// Insert a new empty bank, replacing (and dropping the synths of) any bank with that number.
    pub fn emplace_bank(&mut self, number: BankNumber) -> &mut ToneBank {
        let i = match self.find_slot(number) {
            Some(i) => {
                if let Some(old) = self.banks[i].take() {
                    self.drop_synths(&old);
                }
                i
            }
            None => self.reserve_slot(number),
        };
        self.banks[i].insert(ToneBank::new(number))
    }

    /// Compile `tone` into (`number`, `program`), for one `note` if given.
    ///
    /// Returns false for a duplicate melodic program. A duplicate
    /// percussion note replaces the earlier tone.
    pub fn insert_tone(
        &mut self,
        number: BankNumber,
        program: u8,
        note: Option<u8>,
        tone: &ToneParameters,
    ) -> bool {
        let program = program & 0x7F;
        let number = BankNumber::new(number.msb, number.lsb, note.is_some());
        if note.is_none() && self.find_bank(number).is_some_and(|b| b.has_program(program)) {
            warn!(
                "duplicate tone for bank {}:{} program {}, keeping the first",
                number.msb, number.lsb, program
            );
            return false;
        }

        let key = self.synths.insert(Synth::new(&self.tables, tone, self.sampling_rate));
        let i = match self.find_slot(number) {
            Some(i) => i,
            None => self.reserve_slot(number),
        };
        let bank = self.banks[i].get_or_insert_with(|| ToneBank::new(number));
        let slot = &mut bank.programs[program as usize];
        let replaced = match note {
            None => {
                *slot = ProgramSlot::Melodic(key);
                None
            }
            Some(n) => {
                if !matches!(slot, ProgramSlot::Percussion(_)) {
                    *slot = ProgramSlot::Percussion(Box::new([None; NOTE_COUNT]));
                }
                match slot {
                    ProgramSlot::Percussion(notes) => {
                        notes[n as usize & (NOTE_COUNT - 1)].replace(key)
                    }
                    _ => None,
                }
            }
        };
        if let Some(old) = replaced {
            debug!(
                "percussion tone for bank {}:{} program {} note {:?} replaced",
                number.msb, number.lsb, program, note
            );
            self.synths.remove(old);
        }
        true
    }

    /// Synth for (`number`, `program`, `note`), without fallback.
    pub fn program(&self, number: BankNumber, program: u8, note: u8) -> Option<SynthKey> {
        self.find_bank(number)?.synth_key(program, note)
    }

    /// Bank that should serve `program` when `number` is requested: the
    /// requested bank, else bank 0:0, else the first bank in table order
    /// starting from the requested slot. Percussion requests only match
    /// percussion banks.
    pub fn resolve_program(&self, number: BankNumber, program: u8) -> Option<BankNumber> {
        let has = |n: BankNumber| self.find_bank(n).is_some_and(|b| b.has_program(program));
        if has(number) {
            return Some(number);
        }
        let fallback = BankNumber::new(0, 0, number.percussion);
        if has(fallback) {
            return Some(fallback);
        }
        self.banks_from(number)
            .find(|b| b.number.percussion == number.percussion && b.has_program(program))
            .map(|b| b.number)
    }

    /// Every bank, visiting the table from `number`'s home slot and wrapping.
    pub fn banks_from(&self, number: BankNumber) -> impl Iterator<Item = &ToneBank> + '_ {
        let mask = self.banks.len() - 1;
        let start = number.hash() & mask;
        (0..self.banks.len()).filter_map(move |i| self.banks[(start + i) & mask].as_ref())
    }

    /// Bake one cycle of `tone` into custom wave `slot`.
    ///
    /// Returns false when `slot` is out of range.
    pub fn set_custom_wave(&mut self, slot: usize, tone: &ToneParameters) -> bool {
        if slot >= MAX_CUSTOM_WAVES {
            warn!("custom wave slot {} out of range, ignored", slot);
            return false;
        }
        let table = self.bake_wave(tone);
        if self.custom_waves.len() <= slot && self.custom_waves.resize(slot + 1, None).is_err() {
            return false;
        }
        self.custom_waves[slot] = Some(table);
        debug!("baked custom wave {}", slot);
        true
    }

    pub fn custom_wave(&self, slot: usize) -> Option<&WaveTable> {
        self.custom_waves.get(slot).and_then(|w| w.as_deref())
    }

    /// Recompile every synth for a new sampling rate.
    pub fn set_sampling_rate(&mut self, sampling_rate: u32) {
        if sampling_rate == self.sampling_rate {
            return;
        }
        self.sampling_rate = sampling_rate;
        for synth in self.synths.values_mut() {
            synth.set_sampling_rate(&self.tables, sampling_rate);
        }
    }

    /// Render one note of `tone` at its sustain level and normalise a
    /// single cycle into a table.
    ///
    /// The first cycle is discarded so operator feedback has settled.
    fn bake_wave(&self, tone: &ToneParameters) -> Box<WaveTable> {
        let waves = self.waves();
        let synth = Synth::new(&self.tables, tone, CUSTOM_WAVE_RATE);
        let mut note = SynthNote::note_on(&self.tables, &synth, CUSTOM_WAVE_NOTE, 127);
        note.skip_to_sustain();
        let mut buf = vec![0i32; WAVE_LEN * 2];
        render(&waves, &synth, &mut note, StereoGain::UNITY, UNITY, &mut buf);
        buf.fill(0);
        render(&waves, &synth, &mut note, StereoGain::UNITY, UNITY, &mut buf);

        let mono: Vec<i64> = buf.chunks_exact(2).map(|f| f[0] as i64 + f[1] as i64).collect();
        let peak = mono.iter().map(|s| s.abs()).max().unwrap_or(0);
        let mut table = Box::new([0i16; WAVE_LEN]);
        if peak > 0 {
            for (dst, s) in table.iter_mut().zip(&mono) {
                *dst = (s * WAVE_PEAK as i64 / peak) as i16;
            }
        }
        table
    }

    fn find_slot(&self, number: BankNumber) -> Option<usize> {
        let mask = self.banks.len() - 1;
        let start = number.hash() & mask;
        for probe in 0..self.banks.len() {
            let i = (start + probe) & mask;
            match &self.banks[i] {
                None => return None,
                Some(bank) if bank.number == number => return Some(i),
                Some(_) => {}
            }
        }
        None
    }

    /// Claim an empty slot for a new bank, doubling the table when full.
    fn reserve_slot(&mut self, number: BankNumber) -> usize {
        if self.bank_count == self.banks.len() {
            self.grow();
        }
        self.bank_count += 1;
        self.probe_empty(number)
    }

    fn probe_empty(&self, number: BankNumber) -> usize {
        let mask = self.banks.len() - 1;
        let start = number.hash() & mask;
        (0..self.banks.len())
            .map(|probe| (start + probe) & mask)
            .find(|&i| self.banks[i].is_none())
            .unwrap_or(start)
    }

    fn grow(&mut self) {
        let capacity = self.banks.len() * 2;
        let old = core::mem::replace(&mut self.banks, vec![None; capacity]);
        for bank in old.into_iter().flatten() {
            let i = self.probe_empty(bank.number);
            self.banks[i] = Some(bank);
        }
        debug!("bank table grown to {}", capacity);
    }

    fn drop_synths(&mut self, bank: &ToneBank) {
        for key in bank.keys() {
            self.synths.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_ir::{EnvelopePoint, ToneListEntry};

    fn list() -> ToneList {
        ToneList::new(WaveTables::shared(), 48000)
    }

    fn tone_with_level(level: u8) -> ToneParameters {
        let mut tone = ToneParameters::default();
        tone.operators[3].level = level;
        tone
    }

    #[test]
    fn bank_hash_packs_fields() {
        assert_eq!(BankNumber::new(0, 0, false).hash(), 0);
        assert_eq!(BankNumber::new(1, 2, false).hash(), 130);
        assert_eq!(BankNumber::new(0, 0, true).hash(), 256);
        assert_eq!(BankNumber::new(0xFF, 0xFF, false), BankNumber::new(0x7F, 0x7F, false));
    }

    #[test]
    fn emplace_then_find() {
        let mut list = list();
        let number = BankNumber::new(3, 4, false);
        assert!(list.find_bank(number).is_none());
        list.emplace_bank(number);
        assert_eq!(list.find_bank(number).map(|b| b.number()), Some(number));
        assert_eq!(list.bank_count(), 1);
    }

    #[test]
    fn bank_table_grows_and_keeps_entries() {
        let mut list = list();
        for msb in 0..20 {
            list.emplace_bank(BankNumber::new(msb, 0, false));
        }
        assert_eq!(list.bank_count(), 20);
        assert!(list.bank_capacity() >= 20);
        assert!(list.bank_capacity().is_power_of_two());
        for msb in 0..20 {
            assert!(list.find_bank(BankNumber::new(msb, 0, false)).is_some());
        }
        assert!(list.find_bank(BankNumber::new(20, 0, false)).is_none());
    }

    #[test]
    fn colliding_banks_probe_linearly() {
        let mut list = list();
        // Same home slot at capacity 8.
        let a = BankNumber::new(0, 0, false);
        let b = BankNumber::new(0, 8, false);
        list.emplace_bank(a);
        list.emplace_bank(b);
        assert_eq!(list.find_bank(a).map(|x| x.number()), Some(a));
        assert_eq!(list.find_bank(b).map(|x| x.number()), Some(b));
    }

    #[test]
    fn duplicate_melodic_program_keeps_first() {
        let mut list = list();
        let number = BankNumber::new(0, 0, false);
        assert!(list.insert_tone(number, 5, None, &tone_with_level(100)));
        assert!(!list.insert_tone(number, 5, None, &tone_with_level(200)));
        let key = list.program(number, 5, 60).expect("program 5");
        assert_eq!(list.synth(key).map(|s| s.params.operators[3].level), Some(100));
        assert_eq!(list.tone_count(), 1);
    }

    #[test]
    fn percussion_notes_are_independent() {
        let mut list = list();
        let number = BankNumber::new(0, 0, true);
        list.insert_tone(number, 0, Some(36), &tone_with_level(10));
        list.insert_tone(number, 0, Some(38), &tone_with_level(20));
        let kick = list.program(number, 0, 36).expect("kick");
        let snare = list.program(number, 0, 38).expect("snare");
        assert_ne!(kick, snare);
        assert!(list.program(number, 0, 40).is_none());
        // Later entry for the same note wins.
        list.insert_tone(number, 0, Some(36), &tone_with_level(30));
        let kick = list.program(number, 0, 36).expect("kick");
        assert_eq!(list.synth(kick).map(|s| s.params.operators[3].level), Some(30));
        assert_eq!(list.tone_count(), 2);
    }

    #[test]
    fn resolve_falls_back_to_default_bank_then_scan() {
        let mut list = list();
        list.insert_tone(BankNumber::new(0, 0, false), 1, None, &tone_with_level(1));
        list.insert_tone(BankNumber::new(5, 0, false), 2, None, &tone_with_level(2));
        list.insert_tone(BankNumber::new(0, 0, true), 3, Some(40), &tone_with_level(3));

        let missing = BankNumber::new(9, 9, false);
        assert_eq!(list.resolve_program(missing, 1), Some(BankNumber::new(0, 0, false)));
        assert_eq!(list.resolve_program(missing, 2), Some(BankNumber::new(5, 0, false)));
        assert_eq!(list.resolve_program(missing, 3), None);
        assert_eq!(
            list.resolve_program(BankNumber::new(9, 9, true), 3),
            Some(BankNumber::new(0, 0, true))
        );
    }

    #[test]
    fn emplace_replaces_existing_bank() {
        let mut list = list();
        let number = BankNumber::new(1, 1, false);
        list.insert_tone(number, 0, None, &tone_with_level(1));
        list.insert_tone(number, 1, None, &tone_with_level(1));
        list.emplace_bank(number);
        assert_eq!(list.find_bank(number).map(|b| b.program_count()), Some(0));
        assert_eq!(list.tone_count(), 0);
        assert_eq!(list.bank_count(), 1);
    }

    #[test]
    fn custom_wave_is_normalised() {
        let mut list = list();
        assert!(list.set_custom_wave(2, &ToneParameters::default()));
        let table = list.custom_wave(2).expect("baked");
        let peak = table.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0);
        assert_eq!(peak, WAVE_PEAK);
        assert!(list.custom_wave(0).is_none());
        assert_eq!(list.custom_wave_count(), 1);
        assert!(!list.set_custom_wave(MAX_CUSTOM_WAVES, &ToneParameters::default()));
    }

    #[test]
    fn custom_sine_wave_resembles_sine() {
        let mut list = list();
        list.set_custom_wave(0, &ToneParameters::default());
        let table = list.custom_wave(0).expect("baked");
        // Quarter cycle is the positive peak, three quarters the negative.
        assert!(table[WAVE_LEN / 4] > 30_000);
        assert!(table[3 * WAVE_LEN / 4] < -30_000);
    }

    #[test]
    fn custom_wave_skips_attack_ramp() {
        let mut tone = ToneParameters::default();
        tone.operators[3].envelope[0] = EnvelopePoint::new(255, 0x50);
        tone.operators[3].envelope[1] = EnvelopePoint::new(255, 0x50);
        let mut list = list();
        assert!(list.set_custom_wave(0, &tone));
        let table = list.custom_wave(0).expect("baked");
        assert!(table[WAVE_LEN / 4] > 30_000);
        assert!(table[3 * WAVE_LEN / 4] < -30_000);
        // One steady cycle: the second half mirrors the first.
        for i in 0..WAVE_LEN / 2 {
            let sum = table[i] as i32 + table[i + WAVE_LEN / 2] as i32;
            assert!(sum.abs() <= 4, "sample {} not periodic: {}", i, sum);
        }
    }

    #[test]
    fn from_data_routes_entries() {
        let mut data = ToneListData::new();
        data.push(ToneListEntry::new("Lead", 0, 0, 0, tone_with_level(255)));
        data.push(ToneListEntry::percussion("Kick", 0, 0, 0, 36, tone_with_level(255)));
        let wave = ToneParameters::default();
        data.push(ToneListEntry::new("Wave", 0, 0, CUSTOM_WAVE_PROGRAM + 1, wave));
        data.push(ToneListEntry::new("Lead 2", 0, 0, 0, tone_with_level(1)));
        let list = ToneList::from_data(WaveTables::shared(), 44100, &data);
        assert_eq!(list.bank_count(), 2);
        assert_eq!(list.tone_count(), 2);
        assert!(list.custom_wave(1).is_some());
        assert!(list.program(BankNumber::new(0, 0, false), 0, 10).is_some());
        assert!(list.program(BankNumber::new(0, 0, true), 0, 36).is_some());
    }

    #[test]
    fn sampling_rate_recompiles_synths() {
        let mut list = list();
        let number = BankNumber::new(0, 0, false);
        list.insert_tone(number, 0, None, &ToneParameters::default());
        list.set_sampling_rate(96000);
        let key = list.program(number, 0, 60).expect("program");
        assert_eq!(list.synth(key).map(|s| s.sampling_rate), Some(96000));
    }

    #[test]
    fn ring_scan_visits_every_bank_once() {
        let mut list = list();
        for lsb in 0..5 {
            list.emplace_bank(BankNumber::new(0, lsb, false));
        }
        assert_eq!(list.banks_from(BankNumber::new(0, 3, false)).count(), 5);
        let first = list.banks_from(BankNumber::new(0, 3, false)).next().map(|b| b.number());
        assert_eq!(first, Some(BankNumber::new(0, 3, false)));
    }
}
