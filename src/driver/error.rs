//! Error types for the SpaceWire DMA packet engine
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Open/close, configuration and argument failures
//! - [`DmaError`]: Hardware-reported DMA and link failures
//! - [`IoError`]: Runtime packet-movement and wait outcomes
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most driver methods.
//!
//! A stopped channel is *not* an error for the packet-movement calls: those
//! report it through their return value. [`IoError::Stopped`] is only used
//! where a call cannot express it otherwise.

use std::sync::PoisonError;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration, lifecycle and argument errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Device or channel already open
    AlreadyOpen,
    /// Device or channel not open (not available)
    NotOpen,
    /// Invalid argument or configuration parameter
    InvalidArgument,
    /// Ring or synchronization allocation failed while opening
    ResourceExhausted,
    /// Operation requires a stopped channel
    ChannelRunning,
    /// Core reset did not complete in time
    ResetFailed,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::AlreadyOpen => "already open",
            ConfigError::NotOpen => "not available",
            ConfigError::InvalidArgument => "invalid argument",
            ConfigError::ResourceExhausted => "resource exhausted",
            ConfigError::ChannelRunning => "channel is running",
            ConfigError::ResetFailed => "core reset failed",
        }
    }
}

// =============================================================================
// DMA Errors
// =============================================================================

/// Hardware-reported errors
///
/// A DMA error is fatal to the channel it occurred on only; a link error
/// is fatal to the device when link-disable-on-error is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// AHB/bus error reported by a DMA channel
    ChannelError,
    /// Link error (parity, disconnect, escape, credit, ...)
    LinkError,
}

impl core::fmt::Display for DmaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DmaError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DmaError::ChannelError => "DMA channel error",
            DmaError::LinkError => "link error",
        }
    }
}

// =============================================================================
// I/O Errors
// =============================================================================

/// Runtime packet-movement and wait errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// Channel is stopped
    Stopped,
    /// Another thread is already waiting on this channel direction
    WaiterBusy,
    /// Wait timed out before the condition became true
    Timeout,
    /// A synchronization primitive failed (poisoned lock, closed queue)
    Internal,
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IoError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            IoError::Stopped => "channel stopped",
            IoError::WaiterBusy => "waiter already armed",
            IoError::Timeout => "operation timed out",
            IoError::Internal => "internal synchronization error",
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// Match on the inner domain error for specific handling:
/// ```ignore
/// match result {
///     Err(Error::Config(ConfigError::NotOpen)) => { /* ... */ }
///     Err(Error::Io(IoError::WaiterBusy)) => { /* ... */ }
///     Err(Error::Io(IoError::Timeout)) => { /* ... */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// DMA error
    Dma(DmaError),
    /// I/O error
    Io(IoError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Dma(e) => write!(f, "dma: {}", e.as_str()),
            Error::Io(e) => write!(f, "io: {}", e.as_str()),
        }
    }
}

impl std::error::Error for Error {}

// From impls for automatic conversion
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<DmaError> for Error {
    fn from(e: DmaError) -> Self {
        Error::Dma(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

// A poisoned side lock means a thread panicked mid-update.
impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::Io(IoError::Internal)
    }
}

/// Result type alias for driver operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for DMA operations
pub type DmaResult<T> = core::result::Result<T, DmaError>;

/// Result type alias for I/O operations
pub type IoResult<T> = core::result::Result<T, IoError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn config_error_as_str_non_empty() {
        let variants = [
            ConfigError::AlreadyOpen,
            ConfigError::NotOpen,
            ConfigError::InvalidArgument,
            ConfigError::ResourceExhausted,
            ConfigError::ChannelRunning,
            ConfigError::ResetFailed,
        ];

        for variant in variants {
            assert!(!variant.as_str().is_empty(), "{variant:?} has empty string");
        }
    }

    #[test]
    fn config_error_display() {
        assert_eq!(format!("{}", ConfigError::NotOpen), "not available");
    }

    #[test]
    fn dma_error_display() {
        assert_eq!(format!("{}", DmaError::ChannelError), "DMA channel error");
        assert_ne!(DmaError::ChannelError, DmaError::LinkError);
    }

    #[test]
    fn io_error_as_str_non_empty() {
        let variants = [
            IoError::Stopped,
            IoError::WaiterBusy,
            IoError::Timeout,
            IoError::Internal,
        ];

        for variant in variants {
            assert!(!variant.as_str().is_empty(), "{variant:?} has empty string");
        }
    }

    #[test]
    fn error_from_domain_errors() {
        assert_eq!(
            Error::from(ConfigError::AlreadyOpen),
            Error::Config(ConfigError::AlreadyOpen)
        );
        assert_eq!(
            Error::from(DmaError::LinkError),
            Error::Dma(DmaError::LinkError)
        );
        assert_eq!(Error::from(IoError::Timeout), Error::Io(IoError::Timeout));
    }

    #[test]
    fn error_display_carries_domain() {
        let display = format!("{}", Error::Io(IoError::WaiterBusy));
        assert!(display.starts_with("io:"));
        assert!(display.contains("waiter"));

        let display = format!("{}", Error::Config(ConfigError::ResourceExhausted));
        assert!(display.starts_with("config:"));
    }

    #[test]
    fn poisoned_lock_maps_to_internal() {
        let lock = std::sync::Arc::new(Mutex::new(0u32));
        let cloned = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = cloned.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: Error = lock.lock().unwrap_err().into();
        assert_eq!(err, Error::Io(IoError::Internal));
    }

    #[test]
    fn result_type_works() {
        fn open() -> Result<u32> {
            Err(ConfigError::NotOpen.into())
        }

        assert_eq!(open(), Err(Error::Config(ConfigError::NotOpen)));
    }
}
