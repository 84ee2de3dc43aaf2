//! Sequence Number Handling
//!
//! Every packet an output emits carries a 32-bit global sequence number that
//! wraps modulo 2^32. [`SequenceState`] hands out numbers from an atomic
//! counter so concurrent writers never observe the same value, and
//! [`SeqNumber`] orders received numbers across the wrap boundary.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Per-output sequence counter and time epoch
#[derive(Debug, Default)]
pub struct SequenceState {
    seq: AtomicU32,
    epoch: AtomicU64,
}

impl SequenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose first [`next`](Self::next) returns `seq`
    pub fn starting_at(seq: u32) -> Self {
        SequenceState {
            seq: AtomicU32::new(seq),
            epoch: AtomicU64::new(0),
        }
    }

    /// Claim the next sequence number
    ///
    /// Each call returns a distinct value (modulo 2^32) even under concurrent
    /// use; `u32::MAX` is followed by 0.
    #[inline]
    pub fn next(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Value the next call to [`next`](Self::next) would return
    #[inline]
    pub fn peek(&self) -> u32 {
        self.seq.load(Ordering::Relaxed)
    }

    /// Time epoch in nanoseconds (0 until a time-sync packet has been sent)
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Release);
    }
}

/// Sequence number with 32-bit wraparound ordering
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SeqNumber(u32);

impl SeqNumber {
    #[inline]
    pub const fn new(value: u32) -> Self {
        SeqNumber(value)
    }

    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn next(self) -> Self {
        SeqNumber(self.0.wrapping_add(1))
    }

    /// Signed distance from this sequence number to `other`
    ///
    /// Positive values mean `other` is ahead of `self`. Distances are taken
    /// modulo 2^32, so numbers more than 2^31 apart read as behind.
    #[inline]
    pub fn distance_to(self, other: SeqNumber) -> i32 {
        other.0.wrapping_sub(self.0) as i32
    }

    #[inline]
    pub fn lt(self, other: SeqNumber) -> bool {
        self.distance_to(other) > 0
    }

    #[inline]
    pub fn gt(self, other: SeqNumber) -> bool {
        self.distance_to(other) < 0
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        SeqNumber(value)
    }
}

impl From<SeqNumber> for u32 {
    fn from(seq: SeqNumber) -> u32 {
        seq.0
    }
}

impl Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u32> for SeqNumber {
    fn add_assign(&mut self, rhs: u32) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl Sub for SeqNumber {
    type Output = i32;

    /// Signed distance between two sequence numbers
    fn sub(self, rhs: SeqNumber) -> i32 {
        rhs.distance_to(self)
    }
}
