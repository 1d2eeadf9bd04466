//! Packets and packet queues
//!
//! A [`Packet`] owns its header and data buffers. Ownership moves into a
//! channel when the packet is submitted and back to the caller when it is
//! collected, with [`PktFlags`] updated to say what happened to it.
//!
//! A [`PacketQueue`] is an ordered FIFO. Packets only ever leave from the
//! front and join at the back, so order is preserved end to end.

use std::collections::VecDeque;

use bitflags::bitflags;

bitflags! {
    /// Per-packet request and completion flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PktFlags: u16 {
        /// Request a completion interrupt for this packet
        const IE = 1 << 0;
        /// Data buffer address must be translated to a DMA address
        const TR_DATA = 1 << 1;
        /// Header buffer address must be translated to a DMA address (TX)
        const TR_HDR = 1 << 2;
        /// Append header CRC (TX)
        const HCRC = 1 << 3;
        /// Append data CRC (TX)
        const DCRC = 1 << 4;
        /// Hardware completed this packet (received or transmitted)
        const DONE = 1 << 5;
        /// TX: link error while sending
        const LINK_ERR = 1 << 6;
        /// RX: packet longer than the RX max length was truncated
        const TRUNCATED = 1 << 7;
        /// RX: data CRC error
        const DATA_CRC_ERR = 1 << 8;
        /// RX: header CRC error
        const HDR_CRC_ERR = 1 << 9;
        /// RX: packet ended with an error end-of-packet
        const EEP = 1 << 10;

        /// Flags set by hardware completion
        const STATUS = Self::DONE.bits()
            | Self::LINK_ERR.bits()
            | Self::TRUNCATED.bits()
            | Self::DATA_CRC_ERR.bits()
            | Self::HDR_CRC_ERR.bits()
            | Self::EEP.bits();

        /// Completion flags that indicate a failed transfer
        const ERRORS = Self::LINK_ERR.bits()
            | Self::TRUNCATED.bits()
            | Self::DATA_CRC_ERR.bits()
            | Self::HDR_CRC_ERR.bits()
            | Self::EEP.bits();
    }
}

/// A SpaceWire packet and its buffers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    /// Caller-owned tag, never touched by the driver
    pub id: u64,
    /// Header buffer (TX only; sent in full ahead of the data)
    pub hdr: Vec<u8>,
    /// Data buffer. For RX its length is the receive capacity.
    pub data: Vec<u8>,
    /// Valid data length: bytes to send (TX) or bytes received (RX)
    pub dlen: usize,
    /// Request and completion flags
    pub flags: PktFlags,
    /// Leading header bytes excluded from the header CRC (TX)
    pub crc_skip: u8,
}

impl Packet {
    /// Create an RX buffer of `capacity` bytes
    #[must_use]
    pub fn rx(id: u64, capacity: usize) -> Self {
        Self {
            id,
            data: vec![0; capacity],
            ..Self::default()
        }
    }

    /// Create a TX packet sending `hdr` followed by all of `data`
    #[must_use]
    pub fn tx(id: u64, hdr: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            id,
            dlen: data.len(),
            hdr,
            data,
            ..Self::default()
        }
    }

    /// Add request flags (builder)
    #[must_use]
    pub fn with_flags(mut self, flags: PktFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Set the header CRC skip count (builder)
    #[must_use]
    pub fn with_crc_skip(mut self, crc_skip: u8) -> Self {
        self.crc_skip = crc_skip;
        self
    }

    /// Received or to-be-sent bytes
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlen.min(self.data.len())]
    }

    /// Whether hardware actually completed this packet
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.flags.contains(PktFlags::DONE)
    }

    /// Whether hardware reported an error for this packet
    #[inline]
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.flags.intersects(PktFlags::ERRORS)
    }

    /// Clear completion flags before resubmitting
    pub fn reset_status(&mut self) {
        self.flags.remove(PktFlags::STATUS);
    }
}

/// Ordered packet FIFO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketQueue {
    packets: VecDeque<Packet>,
}

impl PacketQueue {
    /// Create an empty queue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            packets: VecDeque::new(),
        }
    }

    /// Number of packets
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the queue is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Append one packet at the tail
    #[inline]
    pub fn push_back(&mut self, packet: Packet) {
        self.packets.push_back(packet);
    }

    /// Put a packet back at the head after a failed move
    pub(crate) fn push_front(&mut self, packet: Packet) {
        self.packets.push_front(packet);
    }

    /// Remove the head packet
    #[inline]
    pub fn pop_front(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// Head packet
    #[must_use]
    pub fn front(&self) -> Option<&Packet> {
        self.packets.front()
    }

    /// Move every packet of `other` to the tail of this queue, leaving
    /// `other` empty.
    pub fn append(&mut self, other: &mut PacketQueue) {
        self.packets.append(&mut other.packets);
    }

    /// Detach the leading run of up to `count` packets.
    pub fn remove_head_run(&mut self, count: usize) -> PacketQueue {
        let n = count.min(self.packets.len());
        if n == self.packets.len() {
            return core::mem::take(self);
        }
        Self {
            packets: self.packets.drain(..n).collect(),
        }
    }

    /// Iterate from head to tail
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }

    /// Iterate mutably from head to tail
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Packet> {
        self.packets.iter_mut()
    }

    /// Drop every packet
    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

impl From<Vec<Packet>> for PacketQueue {
    fn from(packets: Vec<Packet>) -> Self {
        Self {
            packets: packets.into(),
        }
    }
}

impl FromIterator<Packet> for PacketQueue {
    fn from_iter<I: IntoIterator<Item = Packet>>(iter: I) -> Self {
        Self {
            packets: iter.into_iter().collect(),
        }
    }
}

impl Extend<Packet> for PacketQueue {
    fn extend<I: IntoIterator<Item = Packet>>(&mut self, iter: I) {
        self.packets.extend(iter);
    }
}

impl IntoIterator for PacketQueue {
    type Item = Packet;
    type IntoIter = std::collections::vec_deque::IntoIter<Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.into_iter()
    }
}

impl<'a> IntoIterator for &'a PacketQueue {
    type Item = &'a Packet;
    type IntoIter = std::collections::vec_deque::Iter<'a, Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.iter()
    }
}
