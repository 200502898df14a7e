//! VoicePool: fixed-size, hash-addressed voice slots.
//!
//! A note's home slot is a multiplicative hash of its (channel, note)
//! identity; collisions probe linearly. `Empty` slots end a probe chain
//! and are never re-created, so finished voices go to `Off` instead.

use alloc::vec::Vec;
use log::{debug, warn};

use crate::voice::{voice_id, Voice, VoiceState};

/// Identifier for a voice slot in the pool.
pub type VoiceId = usize;

pub const MIN_POLYPHONY_BITS: u8 = 1;
pub const MAX_POLYPHONY_BITS: u8 = 12;

/// Fibonacci hashing constant (2^32 / golden ratio).
const HASH_MULTIPLIER: u32 = 0x9E37_79B9;

pub struct VoicePool {
    pub(crate) slots: Vec<Voice>,
    bits: u8,
}

impl VoicePool {
    /// Pool of `2^polyphony_bits` slots (bits clamped to a supported range).
    pub fn new(polyphony_bits: u8) -> Self {
        let bits = polyphony_bits.clamp(MIN_POLYPHONY_BITS, MAX_POLYPHONY_BITS);
        Self {
            slots: (0..1usize << bits).map(|_| Voice::default()).collect(),
            bits,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn home(&self, channel: u8, note: u8) -> usize {
        let hash = (voice_id(channel, note) as u32).wrapping_mul(HASH_MULTIPLIER);
        hash as usize >> (32 - self.bits as u32)
    }

    fn probe(&self, channel: u8, note: u8) -> impl Iterator<Item = VoiceId> {
        let mask = self.slots.len() - 1;
        let home = self.home(channel, note);
        (0..self.slots.len()).map(move |i| (home + i) & mask)
    }

    /// Find a slot for a new (channel, note) voice.
    ///
    /// A voice already sounding with the same identity is forced off and
    /// its slot reused. Returns `None` when every slot is sounding.
    pub fn allocate(&mut self, channel: u8, note: u8) -> Option<VoiceId> {
        let mut free = None;
        for i in self.probe(channel, note) {
            let voice = &mut self.slots[i];
            match voice.state {
                VoiceState::Empty => return Some(free.unwrap_or(i)),
                VoiceState::Off => {
                    free.get_or_insert(i);
                }
                VoiceState::On | VoiceState::Released => {
                    if voice.matches(channel, note) {
                        debug!("retriggering channel {} note {}", channel, note);
                        voice.kill();
                        return Some(i);
                    }
                }
            }
        }
        if free.is_none() {
            warn!("polyphony exhausted, dropping channel {} note {}", channel, note);
        }
        free
    }

    /// Slot of the held (not yet released) voice for (channel, note).
    pub fn find_held(&self, channel: u8, note: u8) -> Option<VoiceId> {
        for i in self.probe(channel, note) {
            let voice = &self.slots[i];
            match voice.state {
                VoiceState::Empty => return None,
                VoiceState::On if voice.matches(channel, note) => return Some(i),
                _ => {}
            }
        }
        None
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.slots.get(id)
    }

    pub fn get_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        self.slots.get_mut(id)
    }

    /// Release every held voice on `channel`.
    pub fn release_channel(&mut self, channel: u8) {
        for voice in self.slots.iter_mut().filter(|v| v.channel == channel) {
            voice.release();
        }
    }

    /// Silence every voice on `channel`.
    pub fn kill_channel(&mut self, channel: u8) {
        for voice in self.slots.iter_mut().filter(|v| v.channel == channel) {
            voice.kill();
        }
    }

    /// Return every slot to `Empty`.
    pub fn reset(&mut self) {
        for voice in &mut self.slots {
            *voice = Voice::default();
        }
    }

    /// Count of sounding voices.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|v| v.state.is_sounding()).count()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.slots.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone_list::SynthKey;
    use crate::note::SynthNote;

    fn start(pool: &mut VoicePool, channel: u8, note: u8) -> Option<VoiceId> {
        let id = pool.allocate(channel, note)?;
        let mut synth_note = SynthNote::default();
        synth_note.env_state[0] = crate::note::EnvelopeState::On;
        pool.get_mut(id)?.start(channel, note, SynthKey::default(), synth_note);
        Some(id)
    }

    #[test]
    fn pool_allocate_returns_valid_id() {
        let mut pool = VoicePool::new(4);
        let id = start(&mut pool, 0, 60).expect("slot");
        assert!(id < pool.capacity());
        assert_eq!(pool.get(id).map(|v| v.state), Some(VoiceState::On));
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn pool_capacity_is_power_of_two() {
        assert_eq!(VoicePool::new(0).capacity(), 2);
        assert_eq!(VoicePool::new(6).capacity(), 64);
        assert_eq!(VoicePool::new(30).capacity(), 1 << MAX_POLYPHONY_BITS);
    }

    #[test]
    fn pool_retrigger_reuses_slot() {
        let mut pool = VoicePool::new(4);
        let first = start(&mut pool, 2, 64).expect("slot");
        let second = start(&mut pool, 2, 64).expect("slot");
        assert_eq!(first, second);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn pool_exhaustion_drops_note() {
        let mut pool = VoicePool::new(2);
        for note in 0..4 {
            assert!(start(&mut pool, 0, note).is_some());
        }
        assert_eq!(pool.active_count(), 4);
        assert!(pool.allocate(0, 100).is_none());
        assert_eq!(pool.active_count(), 4);
    }

    #[test]
    fn pool_reuses_off_slots() {
        let mut pool = VoicePool::new(2);
        let ids: Vec<VoiceId> = (0..4).map(|n| start(&mut pool, 0, n).expect("slot")).collect();
        pool.get_mut(ids[1]).expect("voice").kill();
        let id = start(&mut pool, 3, 99).expect("slot");
        assert_eq!(id, ids[1]);
    }

    #[test]
    fn pool_find_held_skips_released() {
        let mut pool = VoicePool::new(4);
        let id = start(&mut pool, 1, 40).expect("slot");
        assert_eq!(pool.find_held(1, 40), Some(id));
        assert_eq!(pool.find_held(1, 41), None);
        pool.get_mut(id).expect("voice").release();
        assert_eq!(pool.find_held(1, 40), None);
    }

    #[test]
    fn pool_channel_operations_are_scoped() {
        let mut pool = VoicePool::new(4);
        start(&mut pool, 0, 60);
        start(&mut pool, 1, 60);
        pool.kill_channel(0);
        assert_eq!(pool.active_count(), 1);
        pool.release_channel(1);
        assert_eq!(pool.find_held(1, 60), None);
        assert_eq!(pool.active_count(), 1);
        pool.reset();
        assert_eq!(pool.active_count(), 0);
    }
}
