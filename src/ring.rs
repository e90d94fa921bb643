//! Head/tail index arithmetic for a power-of-two byte ring.
//!
//! # Overview
//! - `head` is the next write offset (producer-owned), `tail` the next read
//!   offset (completion-owned); both wrap with a mask instead of a modulo.
//! - One slot stays permanently reserved so `head == tail` always means
//!   empty and a full ring still keeps the two indices distinct.
//! - [`RingIndex::contiguous`] never crosses the physical end of storage: a
//!   wrapped payload is drained in two chained transfers, not one.
//!
//! # Notes
//! - This type carries no storage. The logger owns the byte array and asks
//!   for physical offsets, which keeps the arithmetic testable on its own.

/// Index bookkeeping for a ring of `N` bytes, `N` a power of two.
pub struct RingIndex<const N: usize> {
    head: usize,
    tail: usize,
}

impl<const N: usize> RingIndex<N> {
    const MASK: usize = N - 1;

    pub const fn new() -> Self {
        assert!(N.is_power_of_two() && N >= 2);
        Self { head: 0, tail: 0 }
    }

    /// Bytes currently buffered.
    #[inline]
    pub fn used(&self) -> usize {
        self.head.wrapping_sub(self.tail) & Self::MASK
    }

    /// Room left for new bytes. Tops out at `N - 1`, never `N`.
    #[inline]
    pub fn available(&self) -> usize {
        (N - 1) - self.used()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Physical offset of the `i`-th byte of a write starting at `head`.
    #[inline(always)]
    pub fn slot(&self, i: usize) -> usize {
        self.head.wrapping_add(i) & Self::MASK
    }

    /// Span a single transfer may cover: from `tail` up to `head` or to the
    /// physical end of storage, whichever comes first.
    #[inline]
    pub fn contiguous(&self) -> (usize, usize) {
        let used = self.used();
        (self.tail, used.min(N - self.tail))
    }

    /// Publish `n` freshly copied bytes. Producer side only.
    #[inline]
    pub fn advance_head(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.head = self.head.wrapping_add(n) & Self::MASK;
    }

    /// Retire `n` transmitted bytes. Completion side only; `tail` only ever
    /// moves forward (mod `N`).
    #[inline]
    pub fn advance_tail(&mut self, n: usize) {
        debug_assert!(n <= self.used());
        self.tail = self.tail.wrapping_add(n) & Self::MASK;
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}
