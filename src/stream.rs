//! Asynchronous byte-stream mode (UART-like).
//!
//! [`StreamDriver`] interposes a transmit and a receive ring between the
//! application and the hardware FIFO. Application-facing operations only
//! touch the rings; the interrupt handlers are the only code that moves
//! bytes to and from the FIFO registers, except for the first chunk primed
//! by [`initiate_transmission`](StreamDriver::initiate_transmission) inside
//! a critical section.
//!
//! The driver is meant to live in a `static` so that the platform's
//! interrupt entry points and the application tasks can both reach it; all
//! operations take `&self`.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use groundhog::RollingTimer;

use crate::event::ThresholdEvent;
use crate::flags::{ErrorFlags, ErrorLatch};
use crate::instance::{Config, SerialInstance};
use crate::ring::RingBuffer;
use crate::Timeout;

/// Buffered stream driver over one serial peripheral.
///
/// `TXN`/`RXN` are the ring buffer slot counts; usable staging capacity is
/// one less than each (see [`RingBuffer`]).
pub struct StreamDriver<T, R, const TXN: usize, const RXN: usize>
where
    T: SerialInstance,
    R: RollingTimer<Tick = u32>,
{
    instance: T,
    timer: R,
    tx: RingBuffer<TXN>,
    rx: RingBuffer<RXN>,
    /// True while the hardware FIFO holds bytes fed from the transmit ring.
    /// Set by `initiate_transmission`, cleared by `isr_transmit` once the
    /// ring has drained.
    tx_in_progress: AtomicBool,
    errors: ErrorLatch,
    send_count: AtomicU32,
    tx_timestamp: AtomicU32,
    read_event: ThresholdEvent,
    write_event: ThresholdEvent,
}

impl<T, R, const TXN: usize, const RXN: usize> StreamDriver<T, R, TXN, RXN>
where
    T: SerialInstance,
    R: RollingTimer<Tick = u32>,
{
    /// Take ownership of a peripheral handle, apply the configuration and
    /// return the ready driver.
    pub fn new(instance: T, timer: R, config: &Config) -> Self {
        instance.enable();
        instance.apply_config(config);

        #[cfg(feature = "defmt")]
        defmt::trace!("stream driver up, fifo depth {}", T::FIFO_DEPTH);

        StreamDriver {
            instance,
            timer,
            tx: RingBuffer::new(),
            rx: RingBuffer::new(),
            tx_in_progress: AtomicBool::new(false),
            errors: ErrorLatch::new(),
            send_count: AtomicU32::new(0),
            tx_timestamp: AtomicU32::new(0),
            read_event: ThresholdEvent::new(),
            write_event: ThresholdEvent::new(),
        }
    }

    /// Disable the peripheral. FIFOs are forcibly reset; any in-flight data
    /// is lost. This is the only way to abort a transfer.
    pub fn disable(&self) {
        self.instance.disable();
    }

    // ------------------------------------------------------------------
    // Simple communication
    // ------------------------------------------------------------------

    /// Write one byte, waiting forever for ring space.
    pub fn blocking_write(&self, byte: u8) {
        loop {
            if self.tx.push(byte).is_ok() {
                break;
            }
            // Ring is full: make sure the drain path is running before we
            // spin on it.
            self.initiate_transmission();
            core::hint::spin_loop();
        }
        self.initiate_transmission();
    }

    /// Read one byte, waiting forever for data.
    pub fn blocking_read(&self) -> u8 {
        loop {
            if let Some(byte) = self.rx.pop() {
                return byte;
            }
            core::hint::spin_loop();
        }
    }

    // ------------------------------------------------------------------
    // Stream communication
    // ------------------------------------------------------------------

    /// Copy up to `data.len()` bytes into the transmit ring, waiting up to
    /// `timeout` for space once the ring fills.
    ///
    /// Whatever is immediately acceptable is moved first; the wait only
    /// covers the remainder. Returns the number of bytes actually staged;
    /// the full count was satisfied iff the return value equals
    /// `data.len()`.
    pub fn write(&self, data: &[u8], timeout: Timeout) -> usize {
        let start = self.timer.get_ticks();
        let mut written = 0;

        while written < data.len() {
            if self.tx.push(data[written]).is_ok() {
                written += 1;
                continue;
            }
            self.initiate_transmission();
            if timeout.expired(&self.timer, start) {
                break;
            }
            core::hint::spin_loop();
        }

        if written > 0 {
            self.initiate_transmission();
        }
        written
    }

    /// Copy up to `data.len()` bytes out of the receive ring, waiting up to
    /// `timeout` once the ring runs dry.
    ///
    /// Returns the number of bytes actually delivered. Bytes that arrived
    /// before the timeout are handed out exactly once.
    pub fn read(&self, data: &mut [u8], timeout: Timeout) -> usize {
        let start = self.timer.get_ticks();
        let mut delivered = 0;

        while delivered < data.len() {
            if let Some(byte) = self.rx.pop() {
                data[delivered] = byte;
                delivered += 1;
                continue;
            }
            if timeout.expired(&self.timer, start) {
                break;
            }
            core::hint::spin_loop();
        }
        delivered
    }

    /// Non-mutating readiness check: are at least `count` bytes readable?
    ///
    /// If not immediately satisfiable, arms the read event so the receive
    /// ISR wakes this waiter once the ring crosses `count`, and waits up to
    /// `timeout`.
    pub fn can_read_count(&self, count: usize, timeout: Timeout) -> bool {
        if self.rx.count() >= count {
            return true;
        }
        if count > self.rx.capacity() {
            return false;
        }

        let start = self.timer.get_ticks();
        self.read_event.arm(count);

        let satisfied = loop {
            // The level re-check covers bytes that landed between the fast
            // path above and the arming; the ISR will not notify for those.
            if self.read_event.is_signaled() || self.rx.count() >= count {
                break true;
            }
            if timeout.expired(&self.timer, start) {
                break false;
            }
            core::hint::spin_loop();
        };

        self.read_event.disarm();
        satisfied
    }

    /// Non-mutating readiness check: can at least `count` bytes be written?
    ///
    /// Arms the write event against the ring's free count, symmetric to
    /// [`can_read_count`](Self::can_read_count).
    pub fn can_write_count(&self, count: usize, timeout: Timeout) -> bool {
        if self.tx.free_count() >= count {
            return true;
        }
        if count > self.tx.capacity() {
            return false;
        }

        let start = self.timer.get_ticks();
        self.write_event.arm(count);

        let satisfied = loop {
            if self.write_event.is_signaled() || self.tx.free_count() >= count {
                break true;
            }
            if timeout.expired(&self.timer, start) {
                break false;
            }
            core::hint::spin_loop();
        };

        self.write_event.disarm();
        satisfied
    }

    /// Wait until the transmit ring is empty and no transmission is in
    /// progress. Returns false if `timeout` elapsed first.
    pub fn flush_tx(&self, timeout: Timeout) -> bool {
        let start = self.timer.get_ticks();
        loop {
            if self.tx.is_empty() && !self.tx_in_progress.load(Ordering::Acquire) {
                return true;
            }
            if timeout.expired(&self.timer, start) {
                return false;
            }
            core::hint::spin_loop();
        }
    }

    /// Discard everything staged in the receive ring.
    pub fn clear_rx(&self) {
        self.rx.clear();
    }

    /// Discard everything staged in the transmit ring.
    ///
    /// Runs with interrupts masked so the transmit ISR cannot drain
    /// concurrently. Bytes already in the hardware FIFO still go out.
    pub fn clear_tx(&self) {
        critical_section::with(|_| {
            self.tx.clear();
        });
    }

    /// Bytes currently readable from the receive ring.
    pub fn read_count(&self) -> usize {
        self.rx.count()
    }

    /// Bytes currently writable into the transmit ring.
    pub fn write_count(&self) -> usize {
        self.tx.free_count()
    }

    // ------------------------------------------------------------------
    // Transmission control and introspection
    // ------------------------------------------------------------------

    /// Start draining the transmit ring into the hardware FIFO if no
    /// transmission is currently active.
    ///
    /// Called by the write paths whenever data is newly staged. The prime
    /// write happens with interrupts masked: it is the one place where task
    /// code touches the FIFO registers the transmit ISR also uses.
    pub fn initiate_transmission(&self) {
        critical_section::with(|_| {
            if !self.tx_in_progress.load(Ordering::Acquire) && !self.tx.is_empty() {
                self.tx_in_progress.store(true, Ordering::Release);
                self.fill_tx_fifo();
            }
        });
    }

    /// Total bytes handed to the hardware since the last reset.
    pub fn send_count(&self) -> u32 {
        self.send_count.load(Ordering::Relaxed)
    }

    pub fn reset_send_count(&self) {
        self.send_count.store(0, Ordering::Relaxed);
    }

    /// Timer tick of the most recent hand-off to the hardware FIFO.
    pub fn tx_timestamp(&self) -> u32 {
        self.tx_timestamp.load(Ordering::Relaxed)
    }

    /// Currently latched error conditions.
    pub fn errors(&self) -> ErrorFlags {
        self.errors.get()
    }

    /// Clear the given latched conditions. Flags are never cleared by the
    /// driver itself.
    pub fn clear_errors(&self, flags: ErrorFlags) {
        self.errors.clear(flags);
    }

    // ------------------------------------------------------------------
    // Interrupt service routines
    // ------------------------------------------------------------------

    /// Transmit-FIFO-level interrupt: refill the hardware FIFO from the
    /// transmit ring.
    ///
    /// If the ring has drained, `tx_in_progress` is cleared and the drain
    /// path stops re-arming; otherwise the hardware level interrupt fires
    /// again on its own as FIFO space frees up.
    pub fn isr_transmit(&self) {
        self.instance.clear_tx_level_flag();
        self.fill_tx_fifo();
        if self.tx.is_empty() {
            self.tx_in_progress.store(false, Ordering::Release);
        }
        self.write_event.notify(self.tx.free_count());
    }

    /// Receive-FIFO-level interrupt: pull everything the hardware holds
    /// into the receive ring.
    ///
    /// If the ring is full the newest bytes are dropped and `RX_OVERFLOW`
    /// is latched; that matches the hardware, where overrun data is
    /// unrecoverable.
    pub fn isr_receive(&self) {
        self.instance.clear_rx_level_flag();
        while self.instance.rx_fifo_level() > 0 {
            let word = self.instance.read_word();
            if self.rx.push(word as u8).is_err() {
                self.errors.latch(ErrorFlags::RX_OVERFLOW);
            }
        }
        self.read_event.notify(self.rx.count());
    }

    /// Error interrupt: latch the hardware conditions sticky and
    /// acknowledge them. Never aborts an in-flight transfer; recovery is
    /// the application's call.
    pub fn isr_error(&self) {
        let hw = self.instance.hardware_errors();
        if !hw.is_empty() {
            self.instance.clear_hardware_errors(hw);
            self.errors.latch(hw);
        }
    }

    /// Move bytes from the transmit ring into free hardware FIFO slots.
    ///
    /// Runs in the transmit ISR, or in task context under the critical
    /// section of `initiate_transmission`; the two can never interleave.
    fn fill_tx_fifo(&self) {
        let mut free = T::FIFO_DEPTH.saturating_sub(self.instance.tx_fifo_level());
        let mut moved = 0u32;

        while free > 0 {
            match self.tx.pop() {
                Some(byte) => {
                    self.instance.write_word(byte as u16);
                    free -= 1;
                    moved += 1;
                }
                None => break,
            }
        }

        if moved > 0 {
            self.send_count.fetch_add(moved, Ordering::Relaxed);
            self.tx_timestamp
                .store(self.timer.get_ticks(), Ordering::Relaxed);
        }
    }
}
