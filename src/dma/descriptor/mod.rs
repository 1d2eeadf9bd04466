//! TX and RX DMA descriptor structures.
//!
//! Each descriptor points to packet buffers and carries the enable bit that
//! hands ownership between CPU and DMA. Descriptor tables are 1 KiB and
//! 1 KiB aligned, as required by the descriptor table address registers.

pub mod bits;
pub mod rx;
pub mod tx;

use std::alloc::{Layout, alloc_zeroed};

use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::constants::DESC_TABLE_ALIGN;

pub use rx::{RxDescriptor, RxStatus};
pub use tx::{TxDescriptor, TxRequest};

/// Volatile cell wrapper for descriptor fields
///
/// Ensures all accesses are volatile to prevent compiler optimization
/// from reordering or caching descriptor field accesses.
#[repr(transparent)]
pub(crate) struct VolatileCell<T: Copy> {
    value: core::cell::UnsafeCell<T>,
}

// Safety: VolatileCell is safe to share between threads because all access
// is through volatile operations on naturally aligned 32-bit words.
unsafe impl<T: Copy> Sync for VolatileCell<T> {}

impl<T: Copy> VolatileCell<T> {
    /// Create a new volatile cell with the given initial value
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self {
            value: core::cell::UnsafeCell::new(value),
        }
    }

    /// Read the value (volatile read)
    #[inline(always)]
    pub fn get(&self) -> T {
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    /// Write a value (volatile write)
    #[inline(always)]
    pub fn set(&self, value: T) {
        unsafe { core::ptr::write_volatile(self.value.get(), value) }
    }
}

/// Hardware descriptor shared with the DMA engine
///
/// # Safety
///
/// The all-zero bit pattern must be a valid, disabled descriptor, and the
/// type must contain only volatile cells.
pub unsafe trait Descriptor: Sync {
    /// Whether hardware still owns the slot
    fn is_enabled(&self) -> bool;

    /// Whether the wrap bit is set
    fn has_wrap(&self) -> bool;

    /// Return the slot to the disabled state, keeping the wrap bit if `wrap`
    fn clear(&self, wrap: bool);
}

/// Descriptor table occupying one aligned 1 KiB block
#[repr(C, align(1024))]
pub struct DescriptorTable<D, const N: usize>([D; N]);

const _: () = assert!(core::mem::align_of::<DescriptorTable<RxDescriptor, 128>>() == DESC_TABLE_ALIGN);

impl<D: Descriptor, const N: usize> DescriptorTable<D, N> {
    /// Allocate a zeroed table on the heap.
    ///
    /// Returns [`ConfigError::ResourceExhausted`] when the allocator fails.
    pub fn alloc() -> ConfigResult<Box<Self>> {
        let layout = Layout::new::<Self>();
        // SAFETY: the layout is non-zero sized (N > 0 is enforced by the ring)
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(ConfigError::ResourceExhausted);
        }
        // SAFETY: ptr was allocated with the layout of Self and all-zero is a
        // valid value for every descriptor per the Descriptor contract
        Ok(unsafe { Box::from_raw(ptr.cast::<Self>()) })
    }

    /// Descriptor at `index`
    #[inline(always)]
    pub fn get(&self, index: usize) -> &D {
        &self.0[index]
    }

    /// Bus address of the table (for the descriptor table register).
    ///
    /// Tables are allocated from memory the DMA engine sees one to one, so
    /// the low 32 bits are the bus address.
    #[inline(always)]
    pub fn base_addr_u32(&self) -> u32 {
        self.0.as_ptr() as usize as u32
    }

    /// Iterate over all descriptors
    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.0.iter()
    }
}
