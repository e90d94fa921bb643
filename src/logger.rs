//! Non-blocking transmit path: bounded rendering, single-critical-section
//! enqueue, and a self-chaining transmit engine.
//!
//! # Overview
//! - [`TxLogger::emit`] renders a message into a fixed scratch buffer,
//!   copies it into the ring inside one critical section, and kicks the
//!   engine. A message that does not fit is discarded whole and counted.
//! - The engine starts at most one transfer at a time. When the transport
//!   reports completion, the handler retires the sent span and immediately
//!   re-checks, which drains the tail half of a wrapped payload and any
//!   data queued while the transfer was in flight.
//! - [`TxLogger::pump`] re-checks from an idle loop, for the window where
//!   data lands exactly as a completion clears the in-flight flag.
//!
//! # Access protocol
//! All indices, the in-flight flag, and the counters live behind one
//! `critical-section` mutex. The byte array is touched in two ways only:
//! the producer writes slots inside the critical section that also
//! publishes them, and the transport reads the committed span
//! `[tail, tail + len)`, which nothing overwrites until its completion
//! advances `tail`. That protocol is what justifies the `Sync` impl below.

use core::cell::{RefCell, UnsafeCell};
use core::fmt::{self, Write};

use critical_section::Mutex;

use crate::ring::RingIndex;

/// Tag identifying a transport instance, so completions can be filtered
/// when several channels share one driver.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ChannelId(pub u8);

/// Hardware boundary: an asynchronous byte shipper.
///
/// Implementations wrap a DMA-capable peripheral or a driver task. The core
/// never inspects the wire protocol; it only starts transfers and consumes
/// completion notifications.
pub trait TxTransport {
    /// Tag that completions from this instance carry.
    fn channel(&self) -> ChannelId;

    /// Begin an asynchronous transfer of `len` bytes starting at `data`.
    ///
    /// Must return without waiting for the transfer to finish; the finished
    /// transfer is reported through [`TxLogger::on_transfer_complete`] with
    /// the byte count actually sent. The pointed-to bytes stay valid and
    /// unmodified until that completion is delivered, provided the logger
    /// does not move in the meantime (keep it in a `static`).
    fn start(&self, data: *const u8, len: usize);
}

/// Counters observing the drop/truncate policy without changing it.
#[must_use]
#[derive(Copy, Clone, Debug, Default)]
pub struct Stats {
    /// Messages discarded whole because the ring had no room.
    pub dropped: u32,
    /// Messages clamped to the scratch capacity during rendering.
    pub truncated: u32,
    /// Most bytes ever buffered at once.
    pub high_watermark: usize,
}

/// Bounded formatting sink. Keeps at most `M - 1` bytes and silently clamps
/// the rest of an oversized render, which may split a multi-byte character
/// (the link carries raw bytes, not validated UTF-8).
struct Scratch<const M: usize> {
    buf: [u8; M],
    len: usize,
    clamped: bool,
}

impl<const M: usize> Scratch<M> {
    const fn new() -> Self {
        Self {
            buf: [0; M],
            len: 0,
            clamped: false,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl<const M: usize> fmt::Write for Scratch<M> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = (M - 1) - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.clamped = true;
        }
        Ok(())
    }
}

struct Shared<const N: usize> {
    idx: RingIndex<N>,
    in_flight: bool,
    stats: Stats,
}

/// Ring-buffered log transport over an asynchronous serial link.
///
/// `N` is the ring capacity in bytes (a power of two); `M` is the scratch
/// buffer size bounding a single rendered message. Both are build-time
/// choices, independent of each other.
pub struct TxLogger<T: TxTransport, const N: usize, const M: usize> {
    storage: UnsafeCell<[u8; N]>,
    shared: Mutex<RefCell<Shared<N>>>,
    transport: T,
}

// SAFETY: `storage` is written only inside the critical section that also
// publishes `head`, and read outside it only over the committed in-flight
// span, which no write touches until the matching completion retires it.
unsafe impl<T: TxTransport + Sync, const N: usize, const M: usize> Sync for TxLogger<T, N, M> {}

impl<T: TxTransport, const N: usize, const M: usize> TxLogger<T, N, M> {
    /// Const-construct an idle logger, suitable for `static` placement.
    pub const fn new(transport: T) -> Self {
        assert!(M >= 2);
        Self {
            storage: UnsafeCell::new([0; N]),
            shared: Mutex::new(RefCell::new(Shared {
                idx: RingIndex::new(),
                in_flight: false,
                stats: Stats {
                    dropped: 0,
                    truncated: 0,
                    high_watermark: 0,
                },
            })),
            transport,
        }
    }

    /// Reset indices, the in-flight flag, and the counters. Call once at
    /// startup before the first [`emit`](Self::emit).
    pub fn init(&self) {
        critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            shared.idx.reset();
            shared.in_flight = false;
            shared.stats = Stats::default();
        });
    }

    /// The transport handed to [`new`](Self::new).
    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the drop/truncate counters and the high watermark.
    pub fn stats(&self) -> Stats {
        critical_section::with(|cs| self.shared.borrow_ref(cs).stats)
    }

    /// Render a message and enqueue it. Fire-and-forget: never blocks,
    /// never signals failure to the caller. A message the ring cannot hold
    /// is discarded whole; there are no partial writes.
    pub fn emit(&self, args: fmt::Arguments<'_>) {
        let mut scratch = Scratch::<M>::new();
        if scratch.write_fmt(args).is_err() {
            // a Display impl refused to format; nothing was committed
            return;
        }
        let msg = scratch.as_bytes();
        if msg.is_empty() {
            return;
        }

        // One indivisible section for the space check, the copy, and the
        // head publish, so the completion context cannot interleave.
        let queued = critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            if scratch.clamped {
                shared.stats.truncated += 1;
            }
            if msg.len() > shared.idx.available() {
                shared.stats.dropped += 1;
                return false;
            }
            let storage = unsafe { &mut *self.storage.get() };
            for (i, &b) in msg.iter().enumerate() {
                storage[shared.idx.slot(i)] = b;
            }
            shared.idx.advance_head(msg.len());
            let used = shared.idx.used();
            if used > shared.stats.high_watermark {
                shared.stats.high_watermark = used;
            }
            true
        });

        if queued {
            self.check_and_transmit();
        }
    }

    /// Idle-loop nudge. Covers the window where data is enqueued exactly as
    /// a completion clears the in-flight flag, before the handler re-checks.
    #[inline]
    pub fn pump(&self) {
        self.check_and_transmit();
    }

    /// Completion notification entry point, for the transport layer only.
    ///
    /// `len` is the byte count actually sent. Notifications tagged for a
    /// different channel are ignored. Retires the sent span, then re-checks
    /// immediately to chain the next transfer without an external trigger.
    /// Never blocks; safe to call from an interrupt-driven context.
    pub fn on_transfer_complete(&self, channel: ChannelId, len: usize) {
        if channel != self.transport.channel() {
            return;
        }
        critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            shared.idx.advance_tail(len);
            shared.in_flight = false;
        });
        self.check_and_transmit();
    }

    /// Start a transfer if the engine is idle and data is buffered.
    ///
    /// The critical section covers the flag test and the span computation
    /// only; the transport is invoked after it ends, since starting the
    /// hardware can take longer than the index arithmetic.
    fn check_and_transmit(&self) {
        let span = critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            if shared.in_flight || shared.idx.is_empty() {
                return None;
            }
            shared.in_flight = true;
            Some(shared.idx.contiguous())
        });

        if let Some((offset, len)) = span {
            // The committed span stays untouched until its completion
            // advances `tail`, so handing out the pointer is sound.
            let data = unsafe { self.storage.get().cast::<u8>().add(offset) };
            self.transport.start(data, len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelId, Scratch, TxLogger, TxTransport};
    use core::cell::RefCell;
    use core::fmt::Write;
    use std::vec::Vec;

    const CH: ChannelId = ChannelId(7);

    struct MockUart {
        transfers: RefCell<Vec<Vec<u8>>>,
    }

    impl MockUart {
        fn new() -> Self {
            Self {
                transfers: RefCell::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.transfers.borrow().len()
        }

        fn last_len(&self) -> usize {
            self.transfers.borrow().last().map_or(0, Vec::len)
        }

        fn flat(&self) -> Vec<u8> {
            self.transfers.borrow().iter().flatten().copied().collect()
        }
    }

    impl TxTransport for MockUart {
        fn channel(&self) -> ChannelId {
            CH
        }

        fn start(&self, data: *const u8, len: usize) {
            // capture the span at start time, like hardware latching it
            let bytes = unsafe { core::slice::from_raw_parts(data, len) };
            self.transfers.borrow_mut().push(bytes.to_vec());
        }
    }

    fn complete_last<const N: usize, const M: usize>(log: &TxLogger<MockUart, N, M>) {
        let len = log.transport().last_len();
        log.on_transfer_complete(CH, len);
    }

    #[test]
    fn emit_starts_a_transfer_immediately() {
        let log = TxLogger::<MockUart, 64, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!("hello"));
        assert_eq!(log.transport().count(), 1);
        assert_eq!(log.transport().flat(), b"hello");
    }

    #[test]
    fn queues_while_in_flight_and_chains_on_completion() {
        let log = TxLogger::<MockUart, 64, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!("abc"));
        log.emit(format_args!("def"));
        assert_eq!(log.transport().count(), 1);

        complete_last(&log);
        assert_eq!(log.transport().count(), 2);
        assert_eq!(log.transport().flat(), b"abcdef");

        complete_last(&log);
        assert_eq!(log.transport().count(), 2);
    }

    #[test]
    fn wrapped_payload_drains_in_two_transfers() {
        let log = TxLogger::<MockUart, 8, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!("abcdef"));
        complete_last(&log); // tail at 6, ring empty, engine idle

        log.emit(format_args!("ghij")); // head wraps to 2; sends up to the end
        assert_eq!(log.transport().last_len(), 2);

        log.emit(format_args!("kl")); // fits in the 3 remaining slots
        log.emit(format_args!("mnop")); // 4 > 1 available: dropped whole
        assert_eq!(log.stats().dropped, 1);

        complete_last(&log); // tail wraps to 0; chains the rest
        assert_eq!(log.transport().last_len(), 4);

        complete_last(&log);
        assert_eq!(log.transport().count(), 3);
        assert_eq!(log.transport().flat(), b"abcdefghijkl");
    }

    #[test]
    fn drop_on_full_leaves_buffered_data_intact() {
        let log = TxLogger::<MockUart, 8, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!("abc"));
        log.emit(format_args!("defg")); // ring now holds all 7 usable bytes
        log.emit(format_args!("x"));
        assert_eq!(log.stats().dropped, 1);

        complete_last(&log);
        complete_last(&log);
        assert_eq!(log.transport().flat(), b"abcdefg");
    }

    #[test]
    fn foreign_completion_is_ignored() {
        let log = TxLogger::<MockUart, 64, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!("hi"));
        log.emit(format_args!("yo"));

        log.on_transfer_complete(ChannelId(9), 2);
        assert_eq!(log.transport().count(), 1); // still in flight, no chain

        log.on_transfer_complete(CH, 2);
        assert_eq!(log.transport().count(), 2);
        assert_eq!(log.transport().flat(), b"hiyo");
    }

    #[test]
    fn truncation_clamps_to_scratch_capacity() {
        let log = TxLogger::<MockUart, 64, 8>::new(MockUart::new());
        log.init();
        log.emit(format_args!("0123456789"));
        assert_eq!(log.transport().flat(), b"0123456");
        assert_eq!(log.stats().truncated, 1);
        assert_eq!(log.stats().dropped, 0);
    }

    #[test]
    fn empty_render_is_a_no_op() {
        let log = TxLogger::<MockUart, 64, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!(""));
        assert_eq!(log.transport().count(), 0);
        assert_eq!(log.stats().high_watermark, 0);
    }

    #[test]
    fn pump_never_starts_a_duplicate_transfer() {
        let log = TxLogger::<MockUart, 64, 32>::new(MockUart::new());
        log.init();
        log.pump(); // idle and empty
        assert_eq!(log.transport().count(), 0);

        log.emit(format_args!("ab"));
        log.pump(); // transfer already in flight
        assert_eq!(log.transport().count(), 1);

        complete_last(&log);
        log.pump(); // drained again
        assert_eq!(log.transport().count(), 1);
    }

    #[test]
    fn init_resets_counters_and_indices() {
        let log = TxLogger::<MockUart, 8, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!("abcdef"));
        log.emit(format_args!("zzzz")); // dropped, ring too full
        assert_eq!(log.stats().dropped, 1);

        log.init();
        let stats = log.stats();
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.high_watermark, 0);

        log.emit(format_args!("ok")); // fresh ring starts at offset zero
        assert_eq!(log.transport().last_len(), 2);
        assert_eq!(*log.transport().transfers.borrow().last().unwrap(), b"ok");
    }

    #[test]
    fn high_watermark_tracks_peak_usage() {
        let log = TxLogger::<MockUart, 16, 32>::new(MockUart::new());
        log.init();
        log.emit(format_args!("abcde"));
        log.emit(format_args!("fgh"));
        assert_eq!(log.stats().high_watermark, 8);

        complete_last(&log);
        complete_last(&log);
        assert_eq!(log.stats().high_watermark, 8); // drains do not lower it
    }

    #[test]
    fn macro_front_end_renders_formatting() {
        let log = TxLogger::<MockUart, 64, 32>::new(MockUart::new());
        log.init();
        crate::logf!(log, "t={} v={:04}", 3, 7);
        assert_eq!(log.transport().flat(), b"t=3 v=0007");
    }

    #[test]
    fn scratch_clamps_across_multiple_writes() {
        let mut s = Scratch::<6>::new();
        s.write_str("abc").unwrap();
        s.write_str("defg").unwrap();
        assert_eq!(s.as_bytes(), b"abcde");
        assert!(s.clamped);
    }
}
