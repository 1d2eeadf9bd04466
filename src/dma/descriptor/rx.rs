//! RX DMA descriptor for packet reception.

use super::bits::rxd0;
use super::{Descriptor, VolatileCell};

/// Completion status read back from an RX descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxStatus {
    /// Received length in bytes
    pub len: usize,
    /// Packet exceeded the RX max length and was cut
    pub truncated: bool,
    /// Data CRC error
    pub data_crc_err: bool,
    /// Header CRC error
    pub hdr_crc_err: bool,
    /// Packet ended with EEP
    pub eep: bool,
}

/// RX DMA descriptor (8 bytes).
#[repr(C, align(8))]
pub struct RxDescriptor {
    /// RXD0: Control, status and length
    ctrl: VolatileCell<u32>,
    /// RXD1: Buffer address
    addr: VolatileCell<u32>,
}

impl RxDescriptor {
    /// Size of the descriptor in bytes
    pub const SIZE: usize = 8;

    /// Create a new zeroed RX descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ctrl: VolatileCell::new(0),
            addr: VolatileCell::new(0),
        }
    }

    /// Hand the slot to hardware.
    ///
    /// The buffer address is written before the control word so hardware never
    /// sees an enabled slot with a stale address.
    pub fn arm(&self, buffer: u32, wrap: bool, irq: bool) {
        self.addr.set(buffer);

        let mut ctrl = rxd0::EN;
        if wrap {
            ctrl |= rxd0::WR;
        }
        if irq {
            ctrl |= rxd0::IE;
        }
        self.ctrl.set(ctrl);
    }

    /// Decode completion status.
    #[must_use]
    pub fn status(&self) -> RxStatus {
        let ctrl = self.ctrl.get();
        RxStatus {
            len: (ctrl & rxd0::LEN_MASK) as usize,
            truncated: (ctrl & rxd0::TR) != 0,
            data_crc_err: (ctrl & rxd0::DC) != 0,
            hdr_crc_err: (ctrl & rxd0::HC) != 0,
            eep: (ctrl & rxd0::EP) != 0,
        }
    }

    /// Buffer address currently programmed
    #[inline(always)]
    #[must_use]
    pub fn buffer_addr(&self) -> u32 {
        self.addr.get()
    }

    /// Raw control word
    #[inline(always)]
    #[must_use]
    pub fn raw_ctrl(&self) -> u32 {
        self.ctrl.get()
    }

    /// Overwrite the control word as hardware would on completion
    #[cfg(test)]
    pub(crate) fn set_raw_ctrl(&self, value: u32) {
        self.ctrl.set(value);
    }
}

impl Default for RxDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: two plain u32 words; all zeroes is a disabled, unwrapped descriptor.
unsafe impl Descriptor for RxDescriptor {
    #[inline(always)]
    fn is_enabled(&self) -> bool {
        (self.ctrl.get() & rxd0::EN) != 0
    }

    #[inline(always)]
    fn has_wrap(&self) -> bool {
        (self.ctrl.get() & rxd0::WR) != 0
    }

    fn clear(&self, wrap: bool) {
        self.addr.set(0);
        self.ctrl.set(if wrap { rxd0::WR } else { 0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_descriptor_size() {
        assert_eq!(core::mem::size_of::<RxDescriptor>(), RxDescriptor::SIZE);
    }

    #[test]
    fn arm_sets_enable_and_options() {
        let desc = RxDescriptor::new();
        desc.arm(0x4000_1000, true, false);

        assert!(desc.is_enabled());
        assert!(desc.has_wrap());
        assert_eq!(desc.raw_ctrl() & rxd0::IE, 0);
        assert_eq!(desc.buffer_addr(), 0x4000_1000);

        desc.arm(0x4000_2000, false, true);
        assert!(!desc.has_wrap());
        assert_ne!(desc.raw_ctrl() & rxd0::IE, 0);
    }

    #[test]
    fn status_decodes_completion() {
        let desc = RxDescriptor::new();
        desc.set_raw_ctrl(rxd0::TR | rxd0::EP | 512);

        let status = desc.status();
        assert!(!desc.is_enabled());
        assert_eq!(status.len, 512);
        assert!(status.truncated);
        assert!(status.eep);
        assert!(!status.data_crc_err);
        assert!(!status.hdr_crc_err);
    }

    #[test]
    fn clear_keeps_only_wrap() {
        let desc = RxDescriptor::new();
        desc.arm(0x1234, true, true);
        desc.clear(true);
        assert_eq!(desc.raw_ctrl(), rxd0::WR);
        assert_eq!(desc.buffer_addr(), 0);

        desc.clear(false);
        assert_eq!(desc.raw_ctrl(), 0);
    }
}
