//! Peripheral handle abstraction.
//!
//! Register-level bring-up (clocks, pins, baud computation, interrupt
//! controller priorities) belongs to the board support layer. The driver
//! only needs the small surface below: FIFO access, fill levels, and the
//! three interrupt condition flags. The platform implementation forwards
//! [`Config`] to its register writes in [`apply_config`] and otherwise hands
//! the driver a ready-to-use handle.
//!
//! [`apply_config`]: SerialInstance::apply_config

use crate::flags::ErrorFlags;

/// Transfer unit width moved through the FIFOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordWidth {
    /// One byte per transfer unit (data lengths up to 8 bit).
    One,
    /// Two bytes per transfer unit (data lengths of 9..=16 bit).
    Two,
}

impl WordWidth {
    pub const fn bytes(self) -> usize {
        match self {
            WordWidth::One => 1,
            WordWidth::Two => 2,
        }
    }
}

/// Baud rate generation parameters.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaudRate {
    /// Target baud rate in bit/s. The fractional divider setup is derived
    /// from this by the platform layer.
    pub baudrate: u32,
    /// Division ratio of the predivider.
    pub prescaler: u16,
    /// Division ratio of the baud post-divider (samples per bit time).
    pub oversampling: u8,
}

/// FIFO interrupt trigger levels, in words.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoLevels {
    /// Transmit interrupt fires when the tx FIFO fill level drops to this.
    pub tx_trigger: u8,
    /// Receive interrupt fires when the rx FIFO fill level reaches this.
    pub rx_trigger: u8,
}

/// Interrupt priorities per condition, forwarded to the interrupt
/// controller by the platform layer. Zero leaves a condition unrouted.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqPriorities {
    pub tx: u8,
    pub rx: u8,
    pub error: u8,
}

/// Recognized peripheral options.
///
/// Buffer storage and sizes are the ring buffer const generics on
/// [`StreamDriver`](crate::stream::StreamDriver) and are deliberately not
/// part of this structure.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub baudrate: BaudRate,
    pub word_width: WordWidth,
    pub fifo: FifoLevels,
    pub irq: IrqPriorities,
    /// Route the transmit shifter back into the receiver.
    pub loopback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            baudrate: BaudRate {
                baudrate: 100_000,
                prescaler: 2,
                oversampling: 8,
            },
            word_width: WordWidth::One,
            fifo: FifoLevels {
                tx_trigger: 15,
                rx_trigger: 1,
            },
            irq: IrqPriorities {
                tx: 0,
                rx: 0,
                error: 0,
            },
            loopback: false,
        }
    }
}

/// One serial communication peripheral.
///
/// The driver structs take exclusive ownership of the implementing handle;
/// the handle itself is expected to be a cheap token over a register block.
/// All FIFO-touching methods are called either from the interrupt handlers
/// or from task code inside a critical section, never both concurrently.
pub trait SerialInstance {
    /// Depth of the hardware tx and rx FIFOs, in words.
    const FIFO_DEPTH: usize;

    /// Enable the peripheral kernel.
    fn enable(&self);

    /// Disable the peripheral kernel. Forcibly resets the FIFOs and drops
    /// any in-flight data; this is the only way to abort a transfer.
    fn disable(&self);

    /// Apply the recognized configuration options to the register block.
    fn apply_config(&self, config: &Config);

    /// Words currently queued in the transmit FIFO.
    fn tx_fifo_level(&self) -> usize;

    /// Words currently available in the receive FIFO.
    fn rx_fifo_level(&self) -> usize;

    /// Queue one word for transmission. For [`WordWidth::One`] only the low
    /// byte is significant.
    fn write_word(&self, word: u16);

    /// Take one word out of the receive FIFO.
    fn read_word(&self) -> u16;

    /// Acknowledge the tx-FIFO-level interrupt condition.
    fn clear_tx_level_flag(&self);

    /// Acknowledge the rx-FIFO-level interrupt condition.
    fn clear_rx_level_flag(&self);

    /// Error conditions currently flagged by the hardware.
    fn hardware_errors(&self) -> ErrorFlags;

    /// Acknowledge the given hardware error conditions.
    fn clear_hardware_errors(&self, flags: ErrorFlags);
}
