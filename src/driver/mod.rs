//! Device-level driver components.
//!
//! - [`config`] - Configuration types and builder patterns
//! - [`device`] - The device core: link, port, addressing, time-codes, reset
//! - [`error`] - Error types and result aliases
//! - [`interrupt`] - Interrupt service routine
//! - [`registry`] - Device table
//! - [`stats`] - Statistics snapshots
//! - [`work`] - Deferred work queue and worker
//!
//! # Example
//!
//! ```ignore
//! use spw_dma::driver::{DmaConfig, RegistryConfig};
//!
//! let config = RegistryConfig::new()
//!     .with_dma(DmaConfig::new().with_rx_max_len(4096));
//! ```

// Submodules
pub mod config;
pub mod device;
pub mod error;
pub mod interrupt;
pub mod registry;
pub mod stats;
pub mod work;

// Re-exports for convenience
pub use config::{
    AddressConfig, Capabilities, DmaConfig, LinkControl, LinkErrors, LinkState, PortSelect,
    RegistryConfig, RmapControl, TimecodeControl,
};
pub use device::{Device, InterruptCodeHandler, TimecodeHandler};
pub use error::{ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, Result};
pub use interrupt::ChannelIrqStatus;
pub use registry::Registry;
pub use stats::{ChannelStats, DeviceStats};
pub use work::{ChannelWork, WorkDispatch, WorkEvent, WorkItem, WorkMessage, Worker, work_queue};
