//! Fixed capacity FIFOs backing the adapter.
//!
//! Transmit and receive refuse new entries when full, the event queue
//! makes room by dropping its oldest entry. These are two types on purpose.

use std::collections::VecDeque;

/// FIFO of at most `N` entries that rejects pushes when full.
#[derive(Debug)]
pub struct BoundedQueue<T, const N: usize> {
    items: VecDeque<T>,
}

impl<T, const N: usize> BoundedQueue<T, N> {
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        Self {
            items: VecDeque::with_capacity(N),
        }
    }
    /// Append `item`, handing it back if there is no room.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.items.len() == N {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.items.front_mut()
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn is_full(&self) -> bool {
        self.items.len() == N
    }
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO of at most `N` entries that always accepts a push,
/// dropping the oldest entry to make room.
#[derive(Debug)]
pub struct EventRing<T, const N: usize> {
    items: VecDeque<T>,
    dropped: u64,
}

impl<T, const N: usize> EventRing<T, N> {
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        Self {
            items: VecDeque::with_capacity(N),
            dropped: 0,
        }
    }
    /// Append `item`. Returns the entry that was dropped for it, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let old = if self.items.len() == N {
            self.dropped += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        old
    }
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    /// How many entries were lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
    pub fn clear(&mut self) {
        self.items.clear();
    }
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T, const N: usize> Default for EventRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
