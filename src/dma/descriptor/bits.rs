//! DMA descriptor bit field constants.
//!
//! GRSPW2-compatible layout: RX descriptors are two words, TX descriptors
//! four. Hardware clears the enable bit when it is done with a slot.

// =============================================================================
// RXD0 (RX Descriptor Word 0) - Control/Status
// =============================================================================

/// RX Descriptor Word 0 bit field constants
pub mod rxd0 {
    /// Received packet length mask (25 bits)
    pub const LEN_MASK: u32 = 0x01FF_FFFF;
    /// Enable - descriptor owned by hardware
    pub const EN: u32 = 1 << 25;
    /// Wrap - next descriptor is the first in the table
    pub const WR: u32 = 1 << 26;
    /// Interrupt Enable - raise PR interrupt when this slot completes
    pub const IE: u32 = 1 << 27;
    /// Packet ended with an error end-of-packet (EEP)
    pub const EP: u32 = 1 << 28;
    /// Header CRC error
    pub const HC: u32 = 1 << 29;
    /// Data CRC error
    pub const DC: u32 = 1 << 30;
    /// Truncated - packet was longer than the RX max length
    pub const TR: u32 = 1 << 31;

    /// All completion status bits
    pub const STATUS_MASK: u32 = EP | HC | DC | TR;
}

// =============================================================================
// TXD0 (TX Descriptor Word 0) - Control/Status
// =============================================================================

/// TX Descriptor Word 0 bit field constants
pub mod txd0 {
    /// Header length mask
    pub const HLEN_MASK: u32 = 0xFF;
    /// Non-CRC bytes shift: header prefix excluded from the header CRC
    pub const NCL_SHIFT: u32 = 8;
    /// Non-CRC bytes mask
    pub const NCL_MASK: u32 = 0xF << 8;
    /// Enable - descriptor owned by hardware
    pub const EN: u32 = 1 << 12;
    /// Wrap - next descriptor is the first in the table
    pub const WR: u32 = 1 << 13;
    /// Interrupt Enable - raise PS interrupt when this slot completes
    pub const IE: u32 = 1 << 14;
    /// Link Error - packet was not (completely) sent
    pub const LE: u32 = 1 << 15;
    /// Append header CRC
    pub const HC: u32 = 1 << 16;
    /// Append data CRC
    pub const DC: u32 = 1 << 17;
}

// =============================================================================
// TXD2 (TX Descriptor Word 2) - Data length
// =============================================================================

/// TX Descriptor Word 2 bit field constants
pub mod txd2 {
    /// Data length mask (24 bits)
    pub const LEN_MASK: u32 = 0x00FF_FFFF;
}
