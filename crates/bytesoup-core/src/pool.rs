//! Fixed-capacity slot arena backed by a free-index stack.

use rand::{Rng, RngCore};
use thiserror::Error;

/// Errors emitted by [`Pool`] operations that can fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is occupied.
    #[error("pool is full (capacity {capacity})")]
    Full { capacity: usize },
    /// A shrink was requested below the number of live entries.
    #[error("cannot shrink pool to {requested} slots while {live} entries are live")]
    Shrink { requested: usize, live: usize },
}

/// Slot arena whose handles are plain slot indices.
///
/// Indices stay valid until the entry is explicitly removed; a removed slot
/// is cleared before its index goes back onto the free stack, so reuse never
/// observes stale data.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Pool<T> {
    /// Create a pool with `capacity` empty slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            // Reversed so the lowest index is handed out first.
            free: (0..capacity).rev().collect(),
        }
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently handed out.
    #[must_use]
    pub fn count_active(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns true when no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count_active() == 0
    }

    /// Returns true when `add` would fail.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Store `value` in a free slot and return its handle.
    pub fn add(&mut self, value: T) -> Result<usize, PoolError> {
        let Some(index) = self.free.pop() else {
            return Err(PoolError::Full {
                capacity: self.capacity(),
            });
        };
        debug_assert!(self.slots[index].is_none(), "free slot {index} still occupied");
        self.slots[index] = Some(value);
        Ok(index)
    }

    /// Borrow the entry at `index`, if live.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Mutably borrow the entry at `index`, if live.
    #[must_use]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Release `index`, returning its value. Removing an empty slot is a no-op.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        Some(value)
    }

    /// Iterate live entries in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    /// Pick a live entry uniformly at random.
    pub fn random_live(&self, rng: &mut dyn RngCore) -> Option<usize> {
        let live = self.count_active();
        if live == 0 {
            return None;
        }
        // Dense pools hit quickly; sparse ones fall back to a ranked pick.
        for _ in 0..4 {
            let index = rng.random_range(0..self.capacity());
            if self.slots[index].is_some() {
                return Some(index);
            }
        }
        // Checked-out slots count as active but hold no value.
        let present = self.iter().count();
        if present == 0 {
            return None;
        }
        let nth = rng.random_range(0..present);
        self.iter().nth(nth).map(|(index, _)| index)
    }

    /// Change the number of slots.
    ///
    /// Growing keeps every handle. Shrinking keeps handles below
    /// `new_capacity` and relocates higher live entries into free lower
    /// slots; the returned list maps each relocated `(old, new)` handle.
    pub fn resize(&mut self, new_capacity: usize) -> Result<Vec<(usize, usize)>, PoolError> {
        let live = self.count_active();
        if new_capacity < live {
            return Err(PoolError::Shrink {
                requested: new_capacity,
                live,
            });
        }

        let mut old = std::mem::take(&mut self.slots);
        let mut slots: Vec<Option<T>> = (0..new_capacity).map(|_| None).collect();
        let mut displaced = Vec::new();
        for (index, slot) in old.iter_mut().enumerate() {
            let Some(value) = slot.take() else {
                continue;
            };
            if index < new_capacity {
                slots[index] = Some(value);
            } else {
                displaced.push((index, value));
            }
        }

        let mut remap = Vec::with_capacity(displaced.len());
        let mut cursor = 0;
        for (from, value) in displaced {
            while slots[cursor].is_some() {
                cursor += 1;
            }
            slots[cursor] = Some(value);
            remap.push((from, cursor));
        }

        self.free = (0..new_capacity).rev().filter(|&i| slots[i].is_none()).collect();
        self.slots = slots;
        Ok(remap)
    }

    /// Take the value out of a live slot without releasing the slot.
    ///
    /// The index stays off the free stack until [`Pool::restore`] or
    /// [`Pool::release_vacant`] is called, so nothing else can claim it in
    /// the meantime.
    pub(crate) fn checkout(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index)?.take()
    }

    /// Put a checked-out value back into its slot.
    pub(crate) fn restore(&mut self, index: usize, value: T) {
        debug_assert!(self.slots[index].is_none(), "slot {index} restored twice");
        self.slots[index] = Some(value);
    }

    /// Release a checked-out slot whose value is gone for good.
    pub(crate) fn release_vacant(&mut self, index: usize) {
        debug_assert!(self.slots[index].is_none(), "slot {index} still occupied");
        debug_assert!(!self.free.contains(&index), "slot {index} already free");
        self.free.push(index);
    }
}
