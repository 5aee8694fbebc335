//! Buffered, interrupt-driven serial transport.
//!
//! This crate decouples application code from peripheral timing by staging
//! data in software ring buffers and doing all time-critical FIFO work in
//! interrupt handlers. Two line modes are supported over the same hardware
//! abstraction:
//!
//! - [`stream::StreamDriver`]: asynchronous byte stream (UART-like), with
//!   blocking/timeout read and write backed by a transmit and a receive
//!   ring.
//! - [`exchange::JobEngine`]: synchronous full-duplex exchange (SPI-like),
//!   a fire-and-forget job pair drained word-by-word by the ISR pair under
//!   a single-owner lock.
//!
//! The peripheral itself is reached through the [`instance::SerialInstance`]
//! trait; register-level configuration is the platform layer's business.
//! Interrupt service routines are plain methods (`isr_transmit`,
//! `isr_receive`, `isr_error`) that the platform's interrupt entry points
//! call with the driver instance, e.g.:
//!
//! ```ignore
//! static DRIVER: StreamDriver<Serial0, Timer0, 64, 64> = /* ... */;
//!
//! #[interrupt]
//! fn SERIAL0_TX() {
//!     DRIVER.isr_transmit();
//! }
//! ```
//!
//! Timeouts are measured with a [`groundhog::RollingTimer`]; short critical
//! sections use the `critical-section` crate.

#![cfg_attr(not(test), no_std)]

pub mod event;
pub mod exchange;
pub mod flags;
pub mod instance;
pub mod ring;
pub mod stream;

#[cfg(test)]
pub(crate) mod testutil;

use groundhog::RollingTimer;

/// Outcome of submitting an exchange, and the engine's live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Engine is idle / the request was accepted.
    Ok,
    /// An exchange is in flight. The caller must retry; nothing is queued.
    Busy,
}

/// Upper bound for a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Wait indefinitely.
    Forever,
    /// Give up after this many microseconds.
    Micros(u32),
}

impl Timeout {
    /// Has this timeout elapsed since `start` (a tick value captured from
    /// the same timer)?
    pub fn expired<R>(&self, timer: &R, start: u32) -> bool
    where
        R: RollingTimer<Tick = u32>,
    {
        match *self {
            Timeout::Forever => false,
            Timeout::Micros(0) => true,
            // `start` is truncated to whole ticks, so part of a tick may
            // already have passed when it was captured. The strict
            // comparison guarantees the full duration has really elapsed.
            Timeout::Micros(us) => timer.micros_since(start) > us,
        }
    }

    /// A timeout of zero: move whatever is immediately possible, never wait.
    pub const fn immediate() -> Self {
        Timeout::Micros(0)
    }
}
