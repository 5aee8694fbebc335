//! Shared test support: a mock peripheral and host-side timers.
//!
//! The mock models the hardware contract the drivers rely on: two bounded
//! 16-word FIFOs, fill levels, interrupt condition flags, an optional
//! loopback route from the transmit shifter into the receiver, and
//! injectable error conditions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use groundhog::RollingTimer;

use crate::flags::ErrorFlags;
use crate::instance::{Config, SerialInstance};

const FIFO_DEPTH: usize = 16;

#[derive(Default)]
struct MockState {
    enabled: bool,
    config: Option<Config>,
    tx_fifo: Vec<u16>,
    rx_fifo: Vec<u16>,
    hw_errors: ErrorFlags,
    /// Cap on how many rx words `rx_fifo_level` admits to holding; lets
    /// tests dole data out one word at a time.
    rx_visible: usize,
    tx_flag_clears: u32,
    rx_flag_clears: u32,
}

/// Mock serial peripheral. Clones share state, so a test can keep a handle
/// to the "wire" while the driver owns the instance.
#[derive(Clone)]
pub struct MockSerial {
    state: Arc<Mutex<MockState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        MockSerial {
            state: Arc::new(Mutex::new(MockState {
                rx_visible: usize::MAX,
                ..MockState::default()
            })),
        }
    }

    /// Deliver words to the receive FIFO, as if they arrived on the wire.
    pub fn inject_rx(&self, words: &[u16]) {
        let mut state = self.state.lock().unwrap();
        for &word in words {
            if state.rx_fifo.len() < FIFO_DEPTH {
                state.rx_fifo.push(word);
            } else {
                state.hw_errors |= ErrorFlags::RX_OVERFLOW;
            }
        }
    }

    /// Take everything queued for transmission off the "wire".
    pub fn drain_tx(&self) -> Vec<u16> {
        std::mem::take(&mut self.state.lock().unwrap().tx_fifo)
    }

    /// Flag hardware error conditions, as the peripheral would.
    pub fn raise_errors(&self, flags: ErrorFlags) {
        self.state.lock().unwrap().hw_errors |= flags;
    }

    /// Unacknowledged hardware error conditions.
    pub fn hardware_errors_raw(&self) -> ErrorFlags {
        self.state.lock().unwrap().hw_errors
    }

    /// Make `rx_fifo_level` report at most `n` words regardless of actual
    /// occupancy. `usize::MAX` lifts the cap.
    pub fn limit_rx_visibility(&self, n: usize) {
        self.state.lock().unwrap().rx_visible = n;
    }

    /// How many times the tx and rx level condition flags were acknowledged.
    pub fn flag_clear_counts(&self) -> (u32, u32) {
        let state = self.state.lock().unwrap();
        (state.tx_flag_clears, state.rx_flag_clears)
    }

    pub fn applied_config(&self) -> Option<Config> {
        self.state.lock().unwrap().config
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }
}

impl SerialInstance for MockSerial {
    const FIFO_DEPTH: usize = FIFO_DEPTH;

    fn enable(&self) {
        self.state.lock().unwrap().enabled = true;
    }

    fn disable(&self) {
        let mut state = self.state.lock().unwrap();
        state.enabled = false;
        state.tx_fifo.clear();
        state.rx_fifo.clear();
    }

    fn apply_config(&self, config: &Config) {
        self.state.lock().unwrap().config = Some(*config);
    }

    fn tx_fifo_level(&self) -> usize {
        self.state.lock().unwrap().tx_fifo.len()
    }

    fn rx_fifo_level(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.rx_fifo.len().min(state.rx_visible)
    }

    fn write_word(&self, word: u16) {
        let mut state = self.state.lock().unwrap();
        let loopback = state.config.map(|c| c.loopback).unwrap_or(false);
        if loopback {
            // The transmit shifter is routed straight into the receiver.
            if state.rx_fifo.len() < FIFO_DEPTH {
                state.rx_fifo.push(word);
            } else {
                state.hw_errors |= ErrorFlags::RX_OVERFLOW;
            }
        } else if state.tx_fifo.len() < FIFO_DEPTH {
            state.tx_fifo.push(word);
        } else {
            state.hw_errors |= ErrorFlags::TX_OVERFLOW;
        }
    }

    fn read_word(&self) -> u16 {
        let mut state = self.state.lock().unwrap();
        if state.rx_fifo.is_empty() {
            state.hw_errors |= ErrorFlags::RX_UNDERFLOW;
            0
        } else {
            state.rx_fifo.remove(0)
        }
    }

    fn clear_tx_level_flag(&self) {
        self.state.lock().unwrap().tx_flag_clears += 1;
    }

    fn clear_rx_level_flag(&self) {
        self.state.lock().unwrap().rx_flag_clears += 1;
    }

    fn hardware_errors(&self) -> ErrorFlags {
        self.state.lock().unwrap().hw_errors
    }

    fn clear_hardware_errors(&self, flags: ErrorFlags) {
        let mut state = self.state.lock().unwrap();
        state.hw_errors = ErrorFlags::from_bits(state.hw_errors.bits() & !flags.bits());
    }
}

/// Wall-clock timer: one tick per microsecond of real elapsed time.
pub struct InstantTimer {
    start: Instant,
}

impl InstantTimer {
    pub fn new() -> Self {
        InstantTimer {
            start: Instant::now(),
        }
    }
}

impl RollingTimer for InstantTimer {
    type Tick = u32;
    const TICKS_PER_SECOND: u32 = 1_000_000;

    fn get_ticks(&self) -> u32 {
        self.start.elapsed().as_micros() as u32
    }

    fn is_initialized(&self) -> bool {
        true
    }
}

/// Hand-advanced timer for deterministic timeout tests. Clones share the
/// same tick counter.
#[derive(Clone)]
pub struct ManualTimer {
    ticks: Arc<AtomicU32>,
}

impl ManualTimer {
    pub fn new() -> Self {
        ManualTimer {
            ticks: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn advance_micros(&self, micros: u32) {
        self.ticks.fetch_add(micros, Ordering::SeqCst);
    }
}

impl RollingTimer for ManualTimer {
    type Tick = u32;
    const TICKS_PER_SECOND: u32 = 1_000_000;

    fn get_ticks(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn is_initialized(&self) -> bool {
        true
    }
}
