//! Synchronization primitives for ISR-safe access.
//!
//! Low-level primitives shared between interrupt handlers and threads.

use core::cell::RefCell;
use critical_section::Mutex;

/// Cell providing interior mutability with critical section protection.
///
/// Combines `critical_section::Mutex` with `RefCell` for safe mutable access
/// from both normal code and interrupt handlers. The device uses one of
/// these as its register lock: every read-modify-write of a register the
/// interrupt handler also touches runs inside [`with`](Self::with).
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Create a new cell (const, suitable for static initialization).
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Execute a closure with exclusive mutable access.
    ///
    /// Interrupts are disabled for the duration of the closure.
    ///
    /// # Panics
    ///
    /// Panics if called re-entrantly from inside another `with` on the same
    /// cell.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }
}

impl<T: Default> Default for CriticalSectionCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// SAFETY: CriticalSectionCell uses critical sections to protect all access.
unsafe impl<T: Send> Sync for CriticalSectionCell<T> {}
