//! Configuration types for the SpaceWire DMA packet engine

use bitflags::bitflags;

use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::constants::{DEFAULT_MAX_DEVICES, DEFAULT_RX_MAX_LEN, MAX_RX_LEN};
use crate::internal::register::node::{
    CTRL_ID, CTRL_NCH_MASK, CTRL_NCH_SHIFT, CTRL_PO, CTRL_RA, CTRL_RC, STATUS_CE, STATUS_DE,
    STATUS_EE, STATUS_ER, STATUS_IA, STATUS_LS_MASK, STATUS_LS_SHIFT, STATUS_PE, STATUS_WE,
};

// =============================================================================
// DMA Channel Configuration
// =============================================================================

/// Per-channel DMA configuration
///
/// Applied with [`DmaChannel::set_config`](crate::dma::DmaChannel::set_config)
/// while the channel is stopped and programmed into hardware on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaConfig {
    /// Maximum receive length; longer packets are truncated
    pub rx_max_len: u32,
    /// Hold incoming packets in the FIFO when no RX descriptor is available
    /// instead of spilling them
    pub no_spill: bool,
    /// Strip the destination address byte from received packets
    pub strip_addr: bool,
    /// Strip the protocol ID byte from received packets
    pub strip_pid: bool,
    /// Disable the transmitter when a link error occurs
    pub tx_disable_on_link_error: bool,
    /// Raise an RX interrupt every N scheduled buffers (0 = only on request)
    pub rx_irq_every: u32,
    /// Raise a TX interrupt every N scheduled packets (0 = only on request)
    pub tx_irq_every: u32,
    /// Enable the RX completion interrupt (off for polled reception)
    pub rx_irq: bool,
    /// Enable the TX completion interrupt (off for polled transmission)
    pub tx_irq: bool,
    /// Enable the DMA error interrupt
    pub error_irq: bool,
    /// Re-arm RX and TX interrupts together, whichever fired
    pub irq_both: bool,
    /// Separate node address and mask for this channel
    pub channel_addr: Option<(u8, u8)>,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaConfig {
    /// Create a configuration with default values
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rx_max_len: DEFAULT_RX_MAX_LEN,
            no_spill: true,
            strip_addr: false,
            strip_pid: false,
            tx_disable_on_link_error: false,
            rx_irq_every: 0,
            tx_irq_every: 0,
            rx_irq: true,
            tx_irq: true,
            error_irq: true,
            irq_both: false,
            channel_addr: None,
        }
    }

    /// Set the maximum receive length
    #[must_use]
    pub const fn with_rx_max_len(mut self, len: u32) -> Self {
        self.rx_max_len = len;
        self
    }

    /// Set the no-spill policy
    #[must_use]
    pub const fn with_no_spill(mut self, no_spill: bool) -> Self {
        self.no_spill = no_spill;
        self
    }

    /// Strip address and/or protocol ID bytes on receive
    #[must_use]
    pub const fn with_strip(mut self, addr: bool, pid: bool) -> Self {
        self.strip_addr = addr;
        self.strip_pid = pid;
        self
    }

    /// Disable the transmitter on link error
    #[must_use]
    pub const fn with_tx_disable_on_link_error(mut self, enable: bool) -> Self {
        self.tx_disable_on_link_error = enable;
        self
    }

    /// Set the RX and TX interrupt cadence (0 disables coalesced interrupts)
    #[must_use]
    pub const fn with_irq_every(mut self, rx: u32, tx: u32) -> Self {
        self.rx_irq_every = rx;
        self.tx_irq_every = tx;
        self
    }

    /// Enable or disable the RX, TX and DMA error interrupts
    #[must_use]
    pub const fn with_irq_enables(mut self, rx: bool, tx: bool, error: bool) -> Self {
        self.rx_irq = rx;
        self.tx_irq = tx;
        self.error_irq = error;
        self
    }

    /// Re-arm both directions' interrupts together
    #[must_use]
    pub const fn with_irq_both(mut self, both: bool) -> Self {
        self.irq_both = both;
        self
    }

    /// Give this channel its own node address and mask
    #[must_use]
    pub const fn with_channel_addr(mut self, addr: u8, mask: u8) -> Self {
        self.channel_addr = Some((addr, mask));
        self
    }

    /// Validate configuration parameters
    pub const fn validate(&self) -> ConfigResult<()> {
        if self.rx_max_len == 0 || self.rx_max_len > MAX_RX_LEN {
            return Err(ConfigError::InvalidArgument);
        }
        Ok(())
    }
}

// =============================================================================
// Link Configuration
// =============================================================================

bitflags! {
    /// Link error conditions, laid out as in the status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LinkErrors: u32 {
        /// Credit error
        const CREDIT = STATUS_CE;
        /// Escape error
        const ESCAPE = STATUS_ER;
        /// Disconnect error
        const DISCONNECT = STATUS_DE;
        /// Parity error
        const PARITY = STATUS_PE;
        /// Write synchronization error
        const WRITE_SYNC = STATUS_WE;
        /// Invalid address
        const INVALID_ADDRESS = STATUS_IA;
        /// Early EOP/EEP
        const EARLY_EOP = STATUS_EE;
    }
}

/// Link control settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkControl {
    /// Hold the link disabled
    pub disable: bool,
    /// Start the link
    pub start: bool,
    /// Start the link when activity is seen
    pub autostart: bool,
    /// Interrupt on link errors
    pub error_irq: bool,
    /// Clock divisor used while starting (divides by value + 1)
    pub clkdiv_start: u8,
    /// Clock divisor used in run state
    pub clkdiv_run: u8,
    /// Errors that disable the link and shut the device's channels down
    pub disable_on_error: LinkErrors,
    /// Errors acknowledged (and counted) by the interrupt handler
    pub status_clear: LinkErrors,
}

impl LinkControl {
    /// Create settings with the link disabled
    #[must_use]
    pub const fn new() -> Self {
        Self {
            disable: true,
            start: false,
            autostart: false,
            error_irq: false,
            clkdiv_start: 0,
            clkdiv_run: 0,
            disable_on_error: LinkErrors::empty(),
            status_clear: LinkErrors::empty(),
        }
    }

    /// Start the link (clears disable)
    #[must_use]
    pub const fn with_start(mut self, autostart: bool) -> Self {
        self.disable = false;
        self.start = true;
        self.autostart = autostart;
        self
    }

    /// Set clock divisors
    #[must_use]
    pub const fn with_clkdiv(mut self, start: u8, run: u8) -> Self {
        self.clkdiv_start = start;
        self.clkdiv_run = run;
        self
    }

    /// Enable or disable the link error interrupt
    #[must_use]
    pub const fn with_error_irq(mut self, enable: bool) -> Self {
        self.error_irq = enable;
        self
    }

    /// Errors that disable the link
    #[must_use]
    pub const fn with_disable_on_error(mut self, errors: LinkErrors) -> Self {
        self.disable_on_error = errors;
        self
    }

    /// Errors the interrupt handler acknowledges
    #[must_use]
    pub const fn with_status_clear(mut self, errors: LinkErrors) -> Self {
        self.status_clear = errors;
        self
    }
}

/// Link state machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Error reset
    ErrorReset,
    /// Error wait
    ErrorWait,
    /// Ready
    Ready,
    /// Started
    Started,
    /// Connecting
    Connecting,
    /// Run
    Run,
    /// Encoding not defined by the hardware
    Unknown(u8),
}

impl LinkState {
    /// Decode from the status register
    #[must_use]
    pub const fn from_status(status: u32) -> Self {
        match (status & STATUS_LS_MASK) >> STATUS_LS_SHIFT {
            0 => Self::ErrorReset,
            1 => Self::ErrorWait,
            2 => Self::Ready,
            3 => Self::Started,
            4 => Self::Connecting,
            5 => Self::Run,
            other => Self::Unknown(other as u8),
        }
    }
}

/// Port selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortSelect {
    /// Hardware picks the port with an active link
    #[default]
    Auto,
    /// Force port 0
    Port0,
    /// Force port 1 (two-port cores only)
    Port1,
}

// =============================================================================
// Addressing, RMAP and Time-codes
// =============================================================================

/// Default node address configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressConfig {
    /// Node address
    pub node_addr: u8,
    /// Address mask; set bits are ignored in the comparison
    pub node_mask: u8,
    /// Accept packets with any address
    pub promiscuous: bool,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            node_addr: 254,
            node_mask: 0,
            promiscuous: false,
        }
    }
}

/// RMAP target control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RmapControl {
    /// Enable the RMAP target
    pub enable: bool,
    /// Disable RMAP reply buffering
    pub buffer_disable: bool,
    /// RMAP destination key
    pub dest_key: u8,
}

/// Time-code control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimecodeControl {
    /// Enable time-code transmission
    pub tx_enable: bool,
    /// Enable time-code reception
    pub rx_enable: bool,
    /// Interrupt (and call the time-code handler) on tick-out
    pub tick_irq: bool,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Hardware capabilities, captured once when the device is added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    /// Number of link ports (1 or 2)
    pub ports: u8,
    /// Number of DMA channels (1..=4)
    pub dma_channels: u8,
    /// RMAP target available
    pub rmap: bool,
    /// RMAP CRC available
    pub rmap_crc: bool,
    /// Interrupt-code distribution available
    pub interrupt_code: bool,
}

impl Capabilities {
    /// Decode from the control register
    #[must_use]
    pub const fn from_ctrl(ctrl: u32) -> Self {
        Self {
            ports: if (ctrl & CTRL_PO) != 0 { 2 } else { 1 },
            dma_channels: (((ctrl & CTRL_NCH_MASK) >> CTRL_NCH_SHIFT) + 1) as u8,
            rmap: (ctrl & CTRL_RA) != 0,
            rmap_crc: (ctrl & CTRL_RC) != 0,
            interrupt_code: (ctrl & CTRL_ID) != 0,
        }
    }
}

// =============================================================================
// Registry Configuration
// =============================================================================

/// Configuration for a [`Registry`](crate::driver::registry::Registry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of devices that may be added
    pub max_devices: usize,
    /// Configuration applied to every channel when it is opened
    pub dma: DmaConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfig {
    /// Create a configuration with default values
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            dma: DmaConfig::new(),
        }
    }

    /// Set the device limit
    #[must_use]
    pub const fn with_max_devices(mut self, max: usize) -> Self {
        self.max_devices = max;
        self
    }

    /// Set the default channel configuration
    #[must_use]
    pub const fn with_dma(mut self, dma: DmaConfig) -> Self {
        self.dma = dma;
        self
    }
}
