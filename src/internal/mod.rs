//! Internal Implementation Details
//!
//! This module contains implementation details that are not part of the public API.
//! Types in this module may change without notice between minor versions.
//!
//! # Contents
//!
//! - [`register`]: Register access trait, volatile MMIO and typed register views
//! - [`constants`]: Ring sizes, limits, timeouts and defaults
//!
//! # Stability
//!
//! Only [`constants`] and the [`register::RegisterAccess`] / [`register::Mmio`]
//! items are re-exported from the crate root. Everything else is subject to
//! change without notice.

pub mod constants;
pub mod register;

// Register types are accessed via submodules: register::dma::DmaRegs, etc.
