//! Register access for the SpaceWire core
//!
//! Hardware registers are reached through the [`RegisterAccess`] trait: a
//! register block is a base plus an offset table, and every access is a
//! single ordered 32-bit read or write. [`Mmio`] is the volatile
//! memory-mapped implementation; tests substitute an in-memory block.
//!
//! The typed views in [`node`] and [`dma`] generate their accessors with the
//! macros below, so scheduling code never computes an offset by hand.

pub mod dma;
pub mod node;

/// 32-bit register block access.
///
/// Implementations must perform each call as exactly one hardware access,
/// in program order. Read-modify-write sequences are composed by callers
/// under the device register lock.
pub trait RegisterAccess: Send + Sync {
    /// Read the register at `offset` bytes from the block base
    fn read(&self, offset: usize) -> u32;

    /// Write the register at `offset` bytes from the block base
    fn write(&self, offset: usize, value: u32);
}

/// Volatile memory-mapped register block
#[derive(Debug)]
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Create a register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the 4-byte aligned address of a mapped SpaceWire core
    /// register block that stays valid for the lifetime of this value, and
    /// no other code may access it except through this block.
    #[must_use]
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Block base address
    #[inline(always)]
    pub const fn base(&self) -> usize {
        self.base
    }
}

impl RegisterAccess for Mmio {
    #[inline(always)]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: validity of the block is guaranteed by `Mmio::new`'s contract
        unsafe { read_reg(self.base + offset) }
    }

    #[inline(always)]
    fn write(&self, offset: usize, value: u32) {
        // SAFETY: validity of the block is guaranteed by `Mmio::new`'s contract
        unsafe { write_reg(self.base + offset, value) }
    }
}

/// Read a 32-bit register at the given address
///
/// # Safety
/// The caller must ensure the address is valid and properly aligned.
#[inline(always)]
pub unsafe fn read_reg(addr: usize) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

/// Write a 32-bit value to a register at the given address
///
/// # Safety
/// The caller must ensure the address is valid and properly aligned.
#[inline(always)]
pub unsafe fn write_reg(addr: usize, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

// =============================================================================
// Register Access Macros
// =============================================================================

/// Generate read/write accessor methods for a register of a typed view.
///
/// The view must have `io: &dyn RegisterAccess` and `base: usize` fields.
///
/// # Example
/// ```ignore
/// impl NodeRegs<'_> {
///     reg_rw!(ctrl, set_ctrl, CTRL_OFFSET, "Control register");
/// }
/// ```
macro_rules! reg_rw {
    ($read_fn:ident, $write_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read ", $doc)]
        #[inline(always)]
        pub fn $read_fn(&self) -> u32 {
            self.io.read(self.base + $offset)
        }

        #[doc = concat!("Write ", $doc)]
        #[inline(always)]
        pub fn $write_fn(&self, value: u32) {
            self.io.write(self.base + $offset, value)
        }
    };
}

/// Generate a read-modify-write method for a register of a typed view.
///
/// Callers hold the device register lock around the generated method.
macro_rules! reg_modify {
    ($fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read-modify-write ", $doc)]
        #[inline(always)]
        pub fn $fn<F>(&self, f: F) -> u32
        where
            F: FnOnce(u32) -> u32,
        {
            let value = f(self.io.read(self.base + $offset));
            self.io.write(self.base + $offset, value);
            value
        }
    };
}

pub(crate) use reg_modify;
pub(crate) use reg_rw;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmio_reads_and_writes_backing_memory() {
        let mut backing = [0u32; 4];
        // SAFETY: backing outlives `regs` and is only touched through it below
        let regs = unsafe { Mmio::new(backing.as_mut_ptr() as usize) };

        regs.write(0x8, 0xDEAD_BEEF);
        assert_eq!(regs.read(0x8), 0xDEAD_BEEF);
        assert_eq!(regs.read(0x0), 0);
        assert_eq!(regs.base(), backing.as_ptr() as usize);
        assert_eq!(backing[2], 0xDEAD_BEEF);
    }
}
