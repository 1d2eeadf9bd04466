//! SpaceWire DMA Packet Engine
//!
//! Driver core for SpaceWire interface controllers with one or two link
//! ports and up to four DMA channels (GRSPW2-style register layout).
//!
//! The crate moves caller-owned packets through hardware descriptor rings.
//! Each channel has six queues:
//!
//! ```text
//! RX:  ready -> rx_sched (RX ring, 128 slots) -> recv
//! TX:  send  -> tx_sched (TX ring, 64 slots)  -> sent
//! ```
//!
//! # Architecture
//!
//! 1. **Registry** ([`Registry`]): owns every device; open and close by index
//! 2. **Device** ([`Device`]): link, port, address, RMAP, time-code and
//!    interrupt-code controls, core reset, and the interrupt handler
//! 3. **Channel** ([`DmaChannel`]): the packet scheduler and blocking waits
//! 4. **Worker** ([`Worker`]): deferred completion processing fed by the
//!    interrupt handler through a bounded queue
//!
//! Hardware is reached through [`RegisterAccess`]; [`Mmio`] is the volatile
//! memory-mapped implementation.
//!
//! # Features
//!
//! - `critical-section-std` (default): std critical-section implementation
//!   for the register lock
//! - `defmt`: Enable defmt formatting for error and status types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spw_dma::{
//!     DmaOpts, IdentityTranslation, LinkControl, Mmio, Packet, PacketQueue, Registry,
//!     RegistryConfig, WaitOp, Worker, work_queue,
//! };
//!
//! let (sender, queue) = work_queue(spw_dma::constants::DEFAULT_WORK_QUEUE_DEPTH);
//! let registry = Arc::new(Registry::new(
//!     RegistryConfig::new(),
//!     Arc::new(sender),
//!     Arc::new(IdentityTranslation),
//! ));
//! registry.add_device(Arc::new(unsafe { Mmio::new(0x8000_0a00) }))?;
//! Worker::new(registry.clone(), queue).spawn()?;
//!
//! let dev = registry.open(0)?;
//! dev.link_ctrl(LinkControl::new().with_start(true).with_clkdiv(9, 1));
//! // Route the platform interrupt to `dev.isr()`
//!
//! let ch = dev.dma_open(0)?;
//! ch.start()?;
//! let pkts: PacketQueue = vec![Packet::tx(1, vec![0x42], b"hello".to_vec())].into();
//! ch.tx_send(DmaOpts::empty(), pkts)?;
//! ch.tx_wait(0, WaitOp::And, 1, None)?;
//! let sent = ch.tx_reclaim(DmaOpts::empty(), None)?;
//! ```

#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels live here and in Cargo.toml.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements
)]

// =============================================================================
// Modules
// =============================================================================

pub mod dma;
pub mod driver;
pub mod sync;

// Internal implementation details (pub(crate) only)
mod internal;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use dma::{
    AddressTranslate, Collected, DmaChannel, DmaOpts, IdentityTranslation, OffsetTranslation,
    Packet, PacketQueue, PktFlags, RxCount, Submitted, TxCount, WaitCondition, WaitOp, WaitOutcome,
};
pub use driver::config::{
    AddressConfig, Capabilities, DmaConfig, LinkControl, LinkErrors, LinkState, PortSelect,
    RegistryConfig, RmapControl, TimecodeControl,
};
pub use driver::device::{Device, InterruptCodeHandler, TimecodeHandler};
pub use driver::error::{
    ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, Result,
};
pub use driver::registry::Registry;
pub use driver::stats::{ChannelStats, DeviceStats};
pub use driver::work::{
    ChannelWork, WorkDispatch, WorkEvent, WorkItem, WorkMessage, Worker, work_queue,
};
pub use internal::register::{Mmio, RegisterAccess};

/// Low-level register views for advanced use.
///
/// Direct register access bypasses the register lock and every driver
/// invariant. Most users should prefer the [`Device`] and [`DmaChannel`] APIs.
pub mod unsafe_registers {
    pub use crate::internal::register::dma::DmaRegs;
    pub use crate::internal::register::node::NodeRegs;
}

/// Shared driver constants.
pub mod constants {
    pub use crate::internal::constants::{
        // Limits
        DEFAULT_MAX_DEVICES,
        // Defaults
        DEFAULT_RX_MAX_LEN,
        DEFAULT_WORK_QUEUE_DEPTH,
        MAX_CRC_SKIP,
        MAX_DMA_CHANNELS,
        MAX_RX_LEN,
        MAX_TX_DATA_LEN,
        MAX_TX_HDR_LEN,
        // Timing
        RESET_POLL_INTERVAL_US,
        RESET_TIMEOUT_US,
        // Rings
        RX_RING_SIZE,
        TX_RING_SIZE,
    };
}
