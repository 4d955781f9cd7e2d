//! A lock-free, best-effort record of which search thread last visited a
//! given position at a given ply.
//!
//! When a worker notices another thread is already exploring the same node,
//! it bumps the LMR reduction for its next sibling move. This is a pure
//! performance heuristic: collisions (two different positions mapping to the
//! same slot) are tolerated and simply mean we occasionally skip the bump,
//! never that we misjudge alpha/beta.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

const THREAD_BITS: u32 = 8;
const PLY_BITS: u32 = 8;
const KEY_BITS: u32 = 64 - THREAD_BITS - PLY_BITS;

pub struct ThreadMarker {
    slots: Vec<AtomicU64>,
}

impl ThreadMarker {
    pub fn with_capacity(size: usize) -> Self {
        let size = size.next_power_of_two().max(1);
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || AtomicU64::new(0));

        Self { slots }
    }

    fn index(&self, key: u64) -> usize {
        key as usize & (self.slots.len() - 1)
    }

    fn pack(key: u64, ply: usize, thread_id: usize) -> u64 {
        let key_bits = key >> (64 - KEY_BITS);
        (key_bits << (THREAD_BITS + PLY_BITS))
            | ((ply as u64 & 0xFF) << THREAD_BITS)
            | (thread_id as u64 & 0xFF)
    }

    /// Record that `thread_id` is searching `key` at `ply`. Returns `true` if
    /// a _different_ thread was already recorded at the same key and ply.
    pub fn mark(&self, key: u64, ply: usize, thread_id: usize) -> bool {
        let packed = Self::pack(key, ply, thread_id);
        let slot = &self.slots[self.index(key)];
        let prev = slot.swap(packed, Ordering::Relaxed);

        if prev == 0 {
            return false;
        }

        let prev_key = prev >> (THREAD_BITS + PLY_BITS);
        let prev_ply = (prev >> THREAD_BITS) & 0xFF;
        let prev_thread = prev & 0xFF;
        let key_bits = key >> (64 - KEY_BITS);

        prev_key == key_bits && prev_ply as usize == ply && prev_thread as usize != thread_id
    }
}
