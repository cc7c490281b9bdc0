//! Correlation id allocator.
//!
//! Ids are drawn from `1..=upper_bound` (at most `65535`) so they fit the
//! 2-byte id field of binary frames. Id `0` is reserved for uncorrelated
//! packets and never issued.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest id that fits the wire field.
pub const MAX_PACKET_ID: u16 = u16::MAX;

/// Bits per bitmap word.
const WORD_BITS: usize = u64::BITS as usize;

// ============================================================================
// PacketIdAllocator
// ============================================================================

/// Bounded pool of numeric correlation ids.
///
/// Issues ids round-robin from a cursor, so a freed id is not handed out
/// again until the cursor wraps around to it.
#[derive(Debug, Clone)]
pub struct PacketIdAllocator {
    /// Bit `n` set means id `n` is outstanding.
    used: Vec<u64>,
    /// Highest id this pool issues.
    upper_bound: u16,
    /// Next id to try.
    cursor: u16,
    /// Outstanding id count.
    outstanding: usize,
}

impl PacketIdAllocator {
    /// Creates an allocator over the full `1..=65535` range.
    #[must_use]
    pub fn new() -> Self {
        Self::with_upper_bound(MAX_PACKET_ID)
    }

    /// Creates an allocator over `1..=upper_bound`.
    ///
    /// An `upper_bound` of `0` is raised to `1`.
    #[must_use]
    pub fn with_upper_bound(upper_bound: u16) -> Self {
        let upper_bound = upper_bound.max(1);
        let words = (usize::from(upper_bound) + 1).div_ceil(WORD_BITS);
        Self {
            used: vec![0; words],
            upper_bound,
            cursor: 1,
            outstanding: 0,
        }
    }

    /// Returns the number of ids this pool can issue.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        usize::from(self.upper_bound)
    }

    /// Returns the number of ids currently outstanding.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Returns `true` if `id` is currently outstanding.
    #[inline]
    #[must_use]
    pub fn is_outstanding(&self, id: u16) -> bool {
        let (word, bit) = Self::slot(id);
        self.used.get(word).is_some_and(|w| w & bit != 0)
    }

    /// Issues an id that is not currently outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationExhausted`] if every id is outstanding.
    pub fn alloc(&mut self) -> Result<u16> {
        if self.outstanding >= self.capacity() {
            return Err(Error::allocation_exhausted(self.capacity()));
        }

        // At least one free id exists, so this terminates within one lap.
        loop {
            let id = self.cursor;
            self.cursor = if id >= self.upper_bound { 1 } else { id + 1 };
            if !self.is_outstanding(id) {
                self.mark(id);
                return Ok(id);
            }
        }
    }

    /// Marks a caller-chosen id as outstanding.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateId`] if `id` is already outstanding
    /// - [`Error::Config`] if `id` is `0` or above the upper bound
    pub fn reserve(&mut self, id: u16) -> Result<()> {
        if id == 0 || id > self.upper_bound {
            return Err(Error::config(format!(
                "packet id {id} outside 1..={}",
                self.upper_bound
            )));
        }
        if self.is_outstanding(id) {
            return Err(Error::duplicate_id(id.into()));
        }
        self.mark(id);
        Ok(())
    }

    /// Returns `id` to the pool.
    ///
    /// Returns `false` if it was not outstanding.
    pub fn free(&mut self, id: u16) -> bool {
        if !self.is_outstanding(id) {
            return false;
        }
        let (word, bit) = Self::slot(id);
        self.used[word] &= !bit;
        self.outstanding -= 1;
        true
    }

    fn mark(&mut self, id: u16) {
        let (word, bit) = Self::slot(id);
        self.used[word] |= bit;
        self.outstanding += 1;
    }

    #[inline]
    fn slot(id: u16) -> (usize, u64) {
        let index = usize::from(id);
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
