//! Non-blocking log transport over a DMA-driven serial link for no-std targets.
//!
//! # Highlights
//! - Fixed-capacity byte ring drained in the background by an asynchronous
//!   transmitter; producers never block and never allocate.
//! - Critical sections cover index arithmetic and the byte copy only, never
//!   the hardware call.
//! - Messages that do not fit are dropped whole and counted, never split.
//!
//! # Quick start
//! ```
//! use txlog::{ChannelId, TxLogger, TxTransport, logf};
//!
//! struct Uart;
//!
//! impl TxTransport for Uart {
//!     fn channel(&self) -> ChannelId {
//!         ChannelId(2)
//!     }
//!     fn start(&self, _data: *const u8, _len: usize) {
//!         // hand (pointer, length) to the DMA engine and return
//!     }
//! }
//!
//! static LOG: TxLogger<Uart, 512, 128> = TxLogger::new(Uart);
//!
//! LOG.init();
//! logf!(LOG, "boot complete after {} ms", 42);
//! assert_eq!(LOG.stats().dropped, 0);
//! ```
//!
//! # No-std
//! The crate is `#![no_std]` by default. Tests and doctests require `std`
//! (they use the `critical-section/std` implementation; on hardware the
//! target's critical-section provider fills that role).
//!
//! # Safety and concurrency
//! Two execution contexts are expected: one producer and one completion
//! context, typically an interrupt raised by the transmit hardware. All
//! shared state sits behind a single `critical-section` mutex, so the two
//! roles can preempt each other freely. The design is single-producer:
//! calling `emit` from several contexts is memory-safe but their messages
//! interleave with no ordering guarantee.
//!
//! # Semantics
//! - Rendering is clamped to the scratch capacity minus one byte; overflow
//!   marks the message truncated, not failed.
//! - A transfer never crosses the physical end of the ring; a wrapped
//!   payload drains in two chained transfers.
//! - If the transport never reports completion, the engine stays busy and
//!   the ring eventually fills and drops. There is no timeout.
#![no_std]

pub mod logger;
pub mod ring;

pub use logger::{ChannelId, Stats, TxLogger, TxTransport};

#[cfg(test)]
extern crate std;

/// `printf`-style front end for [`TxLogger::emit`].
///
/// Renders with [`core::format_args!`] and enqueues the result.
/// Fire-and-forget: expands to a `()` expression that never blocks.
#[macro_export]
macro_rules! logf {
    ($logger:expr, $($arg:tt)*) => {
        $logger.emit(core::format_args!($($arg)*))
    };
}
