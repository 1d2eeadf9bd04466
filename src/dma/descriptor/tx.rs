//! TX DMA descriptor for packet transmission.

use super::bits::{txd0, txd2};
use super::{Descriptor, VolatileCell};

/// Per-packet transmit request written into a TX descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxRequest {
    /// Header bus address
    pub hdr_addr: u32,
    /// Header length (0..=255)
    pub hdr_len: u8,
    /// Leading header bytes excluded from the header CRC (0..=15)
    pub crc_skip: u8,
    /// Data bus address
    pub data_addr: u32,
    /// Data length (24 bits)
    pub data_len: u32,
    /// Append header CRC
    pub hdr_crc: bool,
    /// Append data CRC
    pub data_crc: bool,
}

/// TX DMA descriptor (16 bytes).
#[repr(C, align(16))]
pub struct TxDescriptor {
    /// TXD0: Control, header length and status
    ctrl: VolatileCell<u32>,
    /// TXD1: Header address
    hdr_addr: VolatileCell<u32>,
    /// TXD2: Data length
    data_len: VolatileCell<u32>,
    /// TXD3: Data address
    data_addr: VolatileCell<u32>,
}

impl TxDescriptor {
    /// Size of the descriptor in bytes
    pub const SIZE: usize = 16;

    /// Create a new zeroed TX descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ctrl: VolatileCell::new(0),
            hdr_addr: VolatileCell::new(0),
            data_len: VolatileCell::new(0),
            data_addr: VolatileCell::new(0),
        }
    }

    /// Hand the slot to hardware. The control word is written last.
    pub fn arm(&self, req: &TxRequest, wrap: bool, irq: bool) {
        self.hdr_addr.set(req.hdr_addr);
        self.data_len.set(req.data_len & txd2::LEN_MASK);
        self.data_addr.set(req.data_addr);

        let mut ctrl = txd0::EN
            | (u32::from(req.hdr_len) & txd0::HLEN_MASK)
            | ((u32::from(req.crc_skip) << txd0::NCL_SHIFT) & txd0::NCL_MASK);
        if req.hdr_crc {
            ctrl |= txd0::HC;
        }
        if req.data_crc {
            ctrl |= txd0::DC;
        }
        if wrap {
            ctrl |= txd0::WR;
        }
        if irq {
            ctrl |= txd0::IE;
        }
        self.ctrl.set(ctrl);
    }

    /// Whether the packet was hit by a link error.
    #[inline(always)]
    #[must_use]
    pub fn link_error(&self) -> bool {
        (self.ctrl.get() & txd0::LE) != 0
    }

    /// Raw control word
    #[inline(always)]
    #[must_use]
    pub fn raw_ctrl(&self) -> u32 {
        self.ctrl.get()
    }

    /// Header, data-length and data words
    #[must_use]
    pub fn words(&self) -> (u32, u32, u32) {
        (self.hdr_addr.get(), self.data_len.get(), self.data_addr.get())
    }

    #[cfg(test)]
    pub(crate) fn set_raw_ctrl(&self, value: u32) {
        self.ctrl.set(value);
    }
}

impl Default for TxDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: four plain u32 words; all zeroes is a disabled, unwrapped descriptor.
unsafe impl Descriptor for TxDescriptor {
    #[inline(always)]
    fn is_enabled(&self) -> bool {
        (self.ctrl.get() & txd0::EN) != 0
    }

    #[inline(always)]
    fn has_wrap(&self) -> bool {
        (self.ctrl.get() & txd0::WR) != 0
    }

    fn clear(&self, wrap: bool) {
        self.hdr_addr.set(0);
        self.data_len.set(0);
        self.data_addr.set(0);
        self.ctrl.set(if wrap { txd0::WR } else { 0 });
    }
}
