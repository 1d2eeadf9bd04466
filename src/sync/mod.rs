//! Synchronization and Concurrency Support
//!
//! - [`CriticalSectionCell`] - ISR-safe interior mutability, used as the
//!   device register lock
//!
//! Channel side locks, wait objects and the work queue use
//! `std::sync::{Mutex, Condvar, mpsc}` directly; only state that the
//! interrupt handler touches goes through a critical section.
//!
//! # Example
//!
//! ```ignore
//! use spw_dma::sync::CriticalSectionCell;
//!
//! static EVENTS: CriticalSectionCell<u32> = CriticalSectionCell::new(0);
//!
//! fn spw_irq() {
//!     EVENTS.with(|count| *count += 1);
//! }
//! ```

mod primitives;

pub use primitives::CriticalSectionCell;
