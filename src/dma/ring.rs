//! Circular descriptor ring.
//!
//! Pairs each hardware descriptor slot with at most one [`Packet`]. `head`
//! is the next free slot to enable and `tail` the oldest enabled slot not yet
//! reaped; hardware walks the slots strictly in order and wraps at the slot
//! carrying the wrap bit, which is always the physically last one.

use crate::driver::error::ConfigResult;
use crate::internal::constants::{RX_RING_SIZE, TX_RING_SIZE};

use super::descriptor::{Descriptor, DescriptorTable, RxDescriptor, TxDescriptor};
use super::packet::{Packet, PacketQueue};

/// RX descriptor ring
pub type RxRing = DescriptorRing<RxDescriptor, RX_RING_SIZE>;
/// TX descriptor ring
pub type TxRing = DescriptorRing<TxDescriptor, TX_RING_SIZE>;

/// Circular descriptor ring with owned packet slots.
pub struct DescriptorRing<D: Descriptor, const N: usize> {
    table: Box<DescriptorTable<D, N>>,
    slots: Box<[Option<Packet>]>,
    head: usize,
    tail: usize,
    used: usize,
}

impl<D: Descriptor, const N: usize> DescriptorRing<D, N> {
    const NON_EMPTY: () = assert!(N > 0);

    /// Allocate a ring with every slot free
    pub fn new() -> ConfigResult<Self> {
        let () = Self::NON_EMPTY;
        let table = DescriptorTable::<D, N>::alloc()?;
        table.get(N - 1).clear(true);

        Ok(Self {
            table,
            slots: (0..N).map(|_| None).collect(),
            head: 0,
            tail: 0,
            used: 0,
        })
    }

    /// Get the number of slots in the ring
    #[inline(always)]
    #[must_use]
    pub const fn len(&self) -> usize {
        N
    }

    /// Slots currently holding a packet
    #[inline(always)]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Slots available for scheduling
    #[inline(always)]
    #[must_use]
    pub const fn free(&self) -> usize {
        N - self.used
    }

    /// Whether no slot holds a packet
    #[inline(always)]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Next slot to enable
    #[inline(always)]
    #[must_use]
    pub const fn head_index(&self) -> usize {
        self.head
    }

    /// Oldest enabled slot
    #[inline(always)]
    #[must_use]
    pub const fn tail_index(&self) -> usize {
        self.tail
    }

    /// Bus address of the descriptor table
    #[inline(always)]
    pub fn base_addr_u32(&self) -> u32 {
        self.table.base_addr_u32()
    }

    /// Descriptor at `index`
    #[inline(always)]
    pub fn descriptor(&self, index: usize) -> &D {
        self.table.get(index % N)
    }

    /// Store `packet` in the head slot and let `arm` enable its descriptor.
    ///
    /// `arm` receives the descriptor, the packet and whether the slot carries
    /// the wrap bit. Hands the packet back when the ring is full.
    pub fn push<F>(&mut self, packet: Packet, arm: F) -> Result<(), Packet>
    where
        F: FnOnce(&D, &Packet, bool),
    {
        if self.used == N {
            return Err(packet);
        }

        arm(self.table.get(self.head), &packet, self.head == N - 1);
        self.slots[self.head] = Some(packet);
        self.head = (self.head + 1) % N;
        self.used += 1;
        Ok(())
    }

    /// Take the tail packet if hardware has finished with its slot.
    ///
    /// `complete` copies the descriptor status into the packet before the
    /// slot is cleared.
    pub fn pop_completed<F>(&mut self, complete: F) -> Option<Packet>
    where
        F: FnOnce(&D, &mut Packet),
    {
        if self.used == 0 {
            return None;
        }

        let desc = self.table.get(self.tail);
        if desc.is_enabled() {
            return None;
        }

        let mut packet = self.slots[self.tail].take()?;
        complete(desc, &mut packet);
        desc.clear(self.tail == N - 1);

        self.tail = (self.tail + 1) % N;
        self.used -= 1;
        Some(packet)
    }

    /// Remove every packet in hardware order, completed or not, and rewind
    /// the ring. Only valid while the DMA engine is disabled.
    pub fn drain(&mut self) -> PacketQueue {
        let mut out = PacketQueue::new();
        while self.used > 0 {
            if let Some(packet) = self.slots[self.tail].take() {
                out.push_back(packet);
            }
            self.table.get(self.tail).clear(self.tail == N - 1);
            self.tail = (self.tail + 1) % N;
            self.used -= 1;
        }
        self.head = 0;
        self.tail = 0;
        out
    }

    /// Scheduled packets from tail to head
    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        (0..self.used).filter_map(move |i| self.slots[(self.tail + i) % N].as_ref())
    }

    /// Number of enabled descriptors
    pub fn enabled_count(&self) -> usize {
        self.table.iter().filter(|d| d.is_enabled()).count()
    }

    /// Number of descriptors carrying the wrap bit
    pub fn wrap_count(&self) -> usize {
        self.table.iter().filter(|d| d.has_wrap()).count()
    }
}

// =============================================================================
// Tests
// =============================================================================
