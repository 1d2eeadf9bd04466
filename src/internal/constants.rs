//! Centralized Constants
//!
//! This module provides a single source of truth for the sizes, limits and
//! defaults used throughout the DMA packet engine.
//!
//! # Organization
//!
//! Constants are grouped by category:
//! - **Topology**: channel and device counts
//! - **Descriptor rings**: slot counts, descriptor and table geometry
//! - **Packet limits**: maximum header/data/receive lengths
//! - **Timing**: reset polling
//! - **Defaults**: default configuration values
//!
//! # Note
//!
//! Hardware register bit definitions remain in their respective modules
//! (`register/node.rs`, `register/dma.rs`, `dma/descriptor/bits.rs`) as they
//! are specific to those hardware blocks.

// =============================================================================
// Topology
// =============================================================================

/// Maximum number of DMA channels per device
pub const MAX_DMA_CHANNELS: usize = 4;

/// Default upper bound on devices managed by one registry
pub const DEFAULT_MAX_DEVICES: usize = 8;

// =============================================================================
// Descriptor Rings
// =============================================================================

/// RX descriptor ring slot count
pub const RX_RING_SIZE: usize = 128;

/// TX descriptor ring slot count
pub const TX_RING_SIZE: usize = 64;

/// RX descriptor size in bytes
pub const RX_DESC_SIZE: usize = 8;

/// TX descriptor size in bytes
pub const TX_DESC_SIZE: usize = 16;

/// Descriptor table size and alignment in bytes
pub const DESC_TABLE_ALIGN: usize = 1024;

// =============================================================================
// Packet Limits
// =============================================================================

/// Largest TX header (HLEN is 8 bits)
pub const MAX_TX_HDR_LEN: usize = 0xFF;

/// Largest TX data length (24-bit field)
pub const MAX_TX_DATA_LEN: usize = 0x00FF_FFFF;

/// Largest RX max-length setting (25-bit field)
pub const MAX_RX_LEN: u32 = 0x01FF_FFFF;

/// Largest non-CRC prefix count for TX header CRC (4-bit field)
pub const MAX_CRC_SKIP: u8 = 0xF;

// =============================================================================
// Timing Constants
// =============================================================================

/// Core reset timeout in microseconds
pub const RESET_TIMEOUT_US: u32 = 10_000;

/// Polling interval while waiting for core reset, in microseconds
pub const RESET_POLL_INTERVAL_US: u32 = 10;

// =============================================================================
// Default Configurations
// =============================================================================

/// Default maximum receive packet length
pub const DEFAULT_RX_MAX_LEN: u32 = 1024;

/// Default work queue depth between interrupt handlers and the worker
pub const DEFAULT_WORK_QUEUE_DEPTH: usize = 32;

/// IRQ-coalescing countdown value used when coalescing is disabled
pub const IRQ_COUNTDOWN_DISABLED: u32 = u32::MAX;

// =============================================================================
// Compile-time checks
// =============================================================================

const _: () = assert!(RX_RING_SIZE * RX_DESC_SIZE == DESC_TABLE_ALIGN);
const _: () = assert!(TX_RING_SIZE * TX_DESC_SIZE == DESC_TABLE_ALIGN);
