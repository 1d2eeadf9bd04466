//! DMA Channel Register Definitions
//!
//! Each DMA channel has a 0x20-byte register block starting at
//! [`DMA_BASE_OFFSET`]. The control register mixes enables, IRQ sources and
//! write-one-to-clear status bits; every read-modify-write must mask the
//! status bits out unless it means to acknowledge them.

use super::{RegisterAccess, reg_modify, reg_rw};

// =============================================================================
// Register Offsets
// =============================================================================

/// Offset of channel 0's register block
pub const DMA_BASE_OFFSET: usize = 0x20;
/// Distance between channel register blocks
pub const DMA_STRIDE: usize = 0x20;

/// DMA Control/Status register offset (within the channel block)
pub const DMACTRL_OFFSET: usize = 0x00;
/// RX Maximum Length register offset
pub const DMARXMAX_OFFSET: usize = 0x04;
/// TX Descriptor Table Address register offset
pub const DMATXDESC_OFFSET: usize = 0x08;
/// RX Descriptor Table Address register offset
pub const DMARXDESC_OFFSET: usize = 0x0C;
/// Channel Address register offset
pub const DMAADDR_OFFSET: usize = 0x10;

/// Byte offset of a channel's control register from the register block base
#[inline(always)]
pub const fn dmactrl_offset(channel: usize) -> usize {
    DMA_BASE_OFFSET + DMA_STRIDE * channel + DMACTRL_OFFSET
}

// =============================================================================
// Control/Status Register (DMACTRL) Bits
// =============================================================================

/// Transmitter Enable
pub const DMACTRL_TE: u32 = 1 << 0;
/// Receiver Enable
pub const DMACTRL_RE: u32 = 1 << 1;
/// Transmit Interrupt enable
pub const DMACTRL_TI: u32 = 1 << 2;
/// Receive Interrupt enable
pub const DMACTRL_RI: u32 = 1 << 3;
/// AHB error Interrupt enable
pub const DMACTRL_AI: u32 = 1 << 4;
/// Packet Sent (W1C)
pub const DMACTRL_PS: u32 = 1 << 5;
/// Packet Received (W1C)
pub const DMACTRL_PR: u32 = 1 << 6;
/// TX AHB error (W1C)
pub const DMACTRL_TA: u32 = 1 << 7;
/// RX AHB error (W1C)
pub const DMACTRL_RA: u32 = 1 << 8;
/// Abort TX on link error
pub const DMACTRL_AT: u32 = 1 << 9;
/// RX Active (read-only)
pub const DMACTRL_RX: u32 = 1 << 10;
/// RX Descriptors available
pub const DMACTRL_RD: u32 = 1 << 11;
/// No Spill: keep packets in the FIFO until a descriptor is available
pub const DMACTRL_NS: u32 = 1 << 12;
/// Enable separate channel address
pub const DMACTRL_EN: u32 = 1 << 13;
/// Strip destination Address
pub const DMACTRL_SA: u32 = 1 << 14;
/// Strip Protocol ID
pub const DMACTRL_SP: u32 = 1 << 15;
/// Disable transmitter on Link Error
pub const DMACTRL_LE: u32 = 1 << 16;

/// Write-one-to-clear status bits
pub const DMACTRL_W1C: u32 = DMACTRL_PS | DMACTRL_PR | DMACTRL_TA | DMACTRL_RA;
/// DMA (AHB) error status bits
pub const DMACTRL_ERROR: u32 = DMACTRL_TA | DMACTRL_RA;
/// All IRQ source enables
pub const DMACTRL_IRQ_MASK: u32 = DMACTRL_TI | DMACTRL_RI | DMACTRL_AI;
/// Configuration bits owned by the channel config
pub const DMACTRL_CFG_MASK: u32 =
    DMACTRL_NS | DMACTRL_SA | DMACTRL_SP | DMACTRL_LE | DMACTRL_AT | DMACTRL_EN;

/// RX maximum length field mask (25 bits)
pub const DMARXMAX_MASK: u32 = 0x01FF_FFFF;

// =============================================================================
// Typed View
// =============================================================================

/// Register block view for one DMA channel
#[derive(Clone, Copy)]
pub struct DmaRegs<'a> {
    io: &'a dyn RegisterAccess,
    base: usize,
}

impl<'a> DmaRegs<'a> {
    /// Create a view over channel `channel` of a register block
    pub fn new(io: &'a dyn RegisterAccess, channel: usize) -> Self {
        Self {
            io,
            base: DMA_BASE_OFFSET + DMA_STRIDE * channel,
        }
    }

    reg_rw!(ctrl, set_ctrl, DMACTRL_OFFSET, "DMA Control/Status register");
    reg_rw!(rxmax, set_rxmax, DMARXMAX_OFFSET, "RX Maximum Length register");
    reg_rw!(txdesc, set_txdesc, DMATXDESC_OFFSET, "TX Descriptor Table register");
    reg_rw!(rxdesc, set_rxdesc, DMARXDESC_OFFSET, "RX Descriptor Table register");
    reg_rw!(addr, set_addr, DMAADDR_OFFSET, "Channel Address register");

    reg_modify!(modify_ctrl_raw, DMACTRL_OFFSET, "DMA Control/Status register");

    /// Read-modify-write the control register without acknowledging status.
    ///
    /// `f` sees the current value with the W1C bits cleared; the bits it
    /// returns in [`DMACTRL_W1C`] are written as ones and so acknowledge
    /// those events.
    #[inline]
    pub fn modify_ctrl<F>(&self, f: F) -> u32
    where
        F: FnOnce(u32) -> u32,
    {
        self.modify_ctrl_raw(|ctrl| f(ctrl & !DMACTRL_W1C))
    }
}
