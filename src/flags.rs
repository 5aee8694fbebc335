//! Sticky error flags.
//!
//! Hardware-detected errors are latched by the error ISR and stay set until
//! the application explicitly clears them. Nothing in the driver clears a
//! flag on its own, and no error here ever aborts an in-flight transfer.

use core::sync::atomic::{AtomicU8, Ordering};

/// A set of serial error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    /// Parity check failed on a received frame.
    pub const PARITY: ErrorFlags = ErrorFlags(1 << 0);
    /// Frame error (bad stop bit / transmit pending error).
    pub const FRAME: ErrorFlags = ErrorFlags(1 << 1);
    /// Receive overflow: the hardware FIFO overran, or the software receive
    /// ring was full while the hardware delivered more data.
    pub const RX_OVERFLOW: ErrorFlags = ErrorFlags(1 << 2);
    /// Receive underflow: a hardware FIFO read was attempted with nothing
    /// available.
    pub const RX_UNDERFLOW: ErrorFlags = ErrorFlags(1 << 3);
    /// Transmit overflow: a hardware FIFO write was attempted with no space.
    pub const TX_OVERFLOW: ErrorFlags = ErrorFlags(1 << 4);

    pub const NONE: ErrorFlags = ErrorFlags(0);
    pub const ALL: ErrorFlags = ErrorFlags(0x1F);

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: ErrorFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn union(self, other: ErrorFlags) -> ErrorFlags {
        ErrorFlags(self.0 | other.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> ErrorFlags {
        ErrorFlags(bits & Self::ALL.0)
    }
}

impl Default for ErrorFlags {
    fn default() -> Self {
        ErrorFlags::NONE
    }
}

impl core::ops::BitOr for ErrorFlags {
    type Output = ErrorFlags;

    fn bitor(self, rhs: ErrorFlags) -> ErrorFlags {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for ErrorFlags {
    fn bitor_assign(&mut self, rhs: ErrorFlags) {
        self.0 |= rhs.0;
    }
}

/// Sticky latch shared between the error ISR (writer) and the application
/// (reader). Flags accumulate until explicitly cleared.
pub struct ErrorLatch {
    flags: AtomicU8,
}

impl ErrorLatch {
    pub const fn new() -> Self {
        ErrorLatch {
            flags: AtomicU8::new(0),
        }
    }

    /// OR the given conditions into the latch. ISR side.
    pub fn latch(&self, flags: ErrorFlags) {
        if !flags.is_empty() {
            self.flags.fetch_or(flags.bits(), Ordering::Release);
        }
    }

    /// Read the currently latched set without clearing it.
    pub fn get(&self) -> ErrorFlags {
        ErrorFlags::from_bits(self.flags.load(Ordering::Acquire))
    }

    /// Clear exactly the given conditions, leaving the rest latched.
    pub fn clear(&self, flags: ErrorFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::Release);
    }

    pub fn clear_all(&self) {
        self.flags.store(0, Ordering::Release);
    }
}
