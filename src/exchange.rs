//! Synchronous full-duplex mode (SPI-like).
//!
//! [`JobEngine`] runs one exchange at a time: a transmit job and a receive
//! job, each a source/sink descriptor plus a pending word count, populated
//! by [`exchange`](JobEngine::exchange) and consumed entirely by the ISR
//! pair. A single `sending` flag is the lock; acquisition is one atomic
//! compare-and-swap, there is no queueing, and a losing caller simply
//! retries.
//!
//! `exchange` is fire-and-forget. The engine never blocks; callers poll
//! [`status`](JobEngine::status) or layer their own wait on top.

use core::cell::UnsafeCell;
use core::sync::atomic::{compiler_fence, AtomicBool, Ordering};

use crate::flags::{ErrorFlags, ErrorLatch};
use crate::instance::{Config, SerialInstance, WordWidth};
use crate::Status;

/// Raw view of a caller-provided transmit buffer. Length is in transfer
/// units of the configured word width.
#[derive(Debug)]
pub struct ConstRawSlice {
    ptr: *const u8,
    len: usize,
}

/// Raw view of a caller-provided receive buffer. Length is in transfer
/// units of the configured word width.
#[derive(Debug)]
pub struct MutRawSlice {
    ptr: *mut u8,
    len: usize,
}

/// Where transmitted words come from.
///
/// Buffer variants capture the raw parts of the slice they are built from.
/// The caller must keep that buffer alive and untouched until the engine
/// reports [`Status::Ok`] again; the ISRs read through the pointer while
/// the exchange is in flight.
#[derive(Debug)]
pub enum TxSource {
    /// Transmit from a buffer. Must match the configured word width.
    Slice(ConstRawSlice),
    /// No data to send: clock out dummy fill words with all bits set.
    Fill,
}

impl TxSource {
    /// Transmit the given bytes ([`WordWidth::One`] configurations).
    pub fn bytes(data: &[u8]) -> Self {
        TxSource::Slice(ConstRawSlice {
            ptr: data.as_ptr(),
            len: data.len(),
        })
    }

    /// Transmit the given 16-bit words ([`WordWidth::Two`] configurations).
    pub fn words(data: &[u16]) -> Self {
        TxSource::Slice(ConstRawSlice {
            ptr: data.as_ptr().cast(),
            len: data.len(),
        })
    }
}

/// Where received words go.
///
/// Same aliveness contract as [`TxSource`]: a captured buffer must not be
/// referenced until the exchange has completed.
#[derive(Debug)]
pub enum RxSink {
    /// Store into a buffer. Must match the configured word width.
    Slice(MutRawSlice),
    /// No interest in the received data: read and discard.
    Discard,
}

impl RxSink {
    /// Receive into the given byte buffer ([`WordWidth::One`]).
    pub fn bytes(data: &mut [u8]) -> Self {
        RxSink::Slice(MutRawSlice {
            ptr: data.as_mut_ptr(),
            len: data.len(),
        })
    }

    /// Receive into the given 16-bit word buffer ([`WordWidth::Two`]).
    pub fn words(data: &mut [u16]) -> Self {
        RxSink::Slice(MutRawSlice {
            ptr: data.as_mut_ptr().cast(),
            len: data.len(),
        })
    }
}

/// One side of an in-flight exchange.
struct Job<S> {
    data: S,
    /// Words left to move. Monotonically decreasing; only the owning ISR
    /// decrements it while a transfer is in flight.
    pending: usize,
}

/// Full-duplex exchange engine over one serial peripheral.
pub struct JobEngine<T>
where
    T: SerialInstance,
{
    instance: T,
    width: WordWidth,
    /// Single-owner lock. Taken by `exchange` with a compare-and-swap,
    /// released by the receive ISR once the receive job drains.
    sending: AtomicBool,
    /// Transfer state as visible to `status()`.
    in_progress: AtomicBool,
    tx_job: UnsafeCell<Job<TxSource>>,
    rx_job: UnsafeCell<Job<RxSink>>,
    errors: ErrorLatch,
}

// SAFETY: the jobs behind UnsafeCell are only written by `exchange` while
// it holds the `sending` lock (before any data is in flight) and by the ISR
// pair afterwards, with the transmit ISR touching only `tx_job` and the
// receive ISR only `rx_job`. The lock plus that split makes the aliasing
// exclusive at every point in time.
unsafe impl<T> Sync for JobEngine<T> where T: SerialInstance + Sync {}

impl<T> JobEngine<T>
where
    T: SerialInstance,
{
    /// Take ownership of a peripheral handle, apply the configuration and
    /// return the idle engine.
    pub fn new(instance: T, config: &Config) -> Self {
        instance.enable();
        instance.apply_config(config);

        #[cfg(feature = "defmt")]
        defmt::trace!(
            "exchange engine up, word width {} byte(s)",
            config.word_width.bytes()
        );

        JobEngine {
            instance,
            width: config.word_width,
            sending: AtomicBool::new(false),
            in_progress: AtomicBool::new(false),
            tx_job: UnsafeCell::new(Job {
                data: TxSource::Fill,
                pending: 0,
            }),
            rx_job: UnsafeCell::new(Job {
                data: RxSink::Discard,
                pending: 0,
            }),
            errors: ErrorLatch::new(),
        }
    }

    /// Start a full-duplex exchange of `count` words and return
    /// immediately.
    ///
    /// Returns [`Status::Busy`] without touching the jobs if an exchange is
    /// already in flight; the caller must retry, nothing is queued. On
    /// [`Status::Ok`] the jobs are armed and the first FIFO chunk has been
    /// primed; completion is observed through [`status`](Self::status).
    ///
    /// Buffers captured by `src`/`dest` must stay alive and unreferenced
    /// until the engine is idle again.
    pub fn exchange(&self, src: TxSource, dest: RxSink, count: usize) -> Status {
        if self
            .sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Status::Busy;
        }

        if let TxSource::Slice(ref s) = src {
            debug_assert!(s.len >= count, "tx buffer shorter than exchange count");
        }
        if let RxSink::Slice(ref s) = dest {
            debug_assert!(s.len >= count, "rx buffer shorter than exchange count");
        }

        if count == 0 {
            // Nothing to clock; no ISR will ever run for this exchange.
            self.sending.store(false, Ordering::Release);
            return Status::Ok;
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("exchange: {} words", count);

        self.in_progress.store(true, Ordering::Release);

        // The stores run with interrupts masked: a stray tx-level interrupt
        // between them must not observe a half-populated job pair.
        critical_section::with(|_| {
            // SAFETY: the lock was free, so the previous exchange (if any)
            // has fully drained and no ISR holds a reference to the jobs.
            unsafe {
                *self.tx_job.get() = Job {
                    data: src,
                    pending: count,
                };
                *self.rx_job.get() = Job {
                    data: dest,
                    pending: count,
                };
            }
        });
        compiler_fence(Ordering::SeqCst);

        // Prime the hardware FIFO with the first chunk.
        self.write_step();

        Status::Ok
    }

    /// Live engine state: [`Status::Busy`] while any word of either job is
    /// still pending, [`Status::Ok`] otherwise.
    pub fn status(&self) -> Status {
        if self.in_progress.load(Ordering::Acquire) || self.sending.load(Ordering::Acquire) {
            Status::Busy
        } else {
            Status::Ok
        }
    }

    /// Currently latched error conditions.
    pub fn errors(&self) -> ErrorFlags {
        self.errors.get()
    }

    /// Clear the given latched conditions.
    pub fn clear_errors(&self, flags: ErrorFlags) {
        self.errors.clear(flags);
    }

    /// Disable the peripheral. FIFOs are forcibly reset and any in-flight
    /// exchange is destroyed; this is the only way to abort one.
    pub fn disable(&self) {
        self.instance.disable();
    }

    // ------------------------------------------------------------------
    // Interrupt service routines
    // ------------------------------------------------------------------

    /// Transmit-FIFO-level interrupt: acknowledge and refill from the
    /// transmit job.
    pub fn isr_transmit(&self) {
        self.instance.clear_tx_level_flag();
        self.write_step();
    }

    /// Receive-FIFO-level interrupt: acknowledge and drain into the
    /// receive job. Completion is defined by the receive side reaching
    /// zero, since received words mirror transmitted words one-for-one in
    /// full-duplex operation.
    pub fn isr_receive(&self) {
        self.instance.clear_rx_level_flag();
        self.read_step();
    }

    /// Error interrupt: latch the hardware conditions sticky and
    /// acknowledge them. The exchange keeps running; recovery is the
    /// application's call.
    pub fn isr_error(&self) {
        let hw = self.instance.hardware_errors();
        if !hw.is_empty() {
            self.instance.clear_hardware_errors(hw);
            self.errors.latch(hw);
        }
    }

    /// Move words from the transmit job into free hardware FIFO slots.
    ///
    /// The FIFO fill level and the job state are read and written
    /// non-atomically, so the whole step runs with interrupts masked.
    fn write_step(&self) {
        critical_section::with(|_| {
            // SAFETY: inside the masked section this is the only live
            // reference; the prime path and the transmit ISR both reach the
            // job through here and cannot interleave.
            let job = unsafe { &mut *self.tx_job.get() };
            if job.pending == 0 {
                return;
            }

            let free = T::FIFO_DEPTH.saturating_sub(self.instance.tx_fifo_level());
            let count = job.pending.min(free);

            match job.data {
                TxSource::Fill => {
                    for _ in 0..count {
                        self.instance.write_word(!0);
                    }
                }
                TxSource::Slice(ref mut slice) => {
                    for i in 0..count {
                        // SAFETY: `slice` came from a live buffer of at
                        // least `pending` remaining units of the configured
                        // width (exchange contract).
                        let word = unsafe {
                            match self.width {
                                WordWidth::One => *slice.ptr.add(i) as u16,
                                WordWidth::Two => slice.ptr.cast::<u16>().add(i).read(),
                            }
                        };
                        self.instance.write_word(word);
                    }
                    // SAFETY: advancing within the same buffer.
                    slice.ptr = unsafe { slice.ptr.add(count * self.width.bytes()) };
                    slice.len -= count;
                }
            }

            job.pending -= count;
        });
    }

    /// Move words from the hardware FIFO into the receive job; unlock the
    /// engine once the job drains.
    fn read_step(&self) {
        // SAFETY: see the Sync rationale; the receive job belongs to this
        // step for the duration of an exchange.
        let job = unsafe { &mut *self.rx_job.get() };
        if job.pending == 0 {
            return;
        }

        let available = self.instance.rx_fifo_level();
        let count = job.pending.min(available);

        match job.data {
            RxSink::Discard => {
                for _ in 0..count {
                    let _ = self.instance.read_word();
                }
            }
            RxSink::Slice(ref mut slice) => {
                for i in 0..count {
                    let word = self.instance.read_word();
                    // SAFETY: `slice` came from a live buffer of at least
                    // `pending` remaining units of the configured width
                    // (exchange contract).
                    unsafe {
                        match self.width {
                            WordWidth::One => *slice.ptr.add(i) = word as u8,
                            WordWidth::Two => slice.ptr.cast::<u16>().add(i).write(word),
                        }
                    }
                }
                // SAFETY: advancing within the same buffer.
                slice.ptr = unsafe { slice.ptr.add(count * self.width.bytes()) };
                slice.len -= count;
            }
        }

        job.pending -= count;

        if job.pending == 0 {
            self.in_progress.store(false, Ordering::Release);
            // Release the single-owner lock; the engine is idle again.
            self.sending.store(false, Ordering::Release);
        }
    }

    #[cfg(test)]
    fn pending_words(&self) -> (usize, usize) {
        // Test-only peek; not synchronized against a live ISR.
        unsafe { ((*self.tx_job.get()).pending, (*self.rx_job.get()).pending) }
    }
}
