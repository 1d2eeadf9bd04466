//! Node (core) register definitions
//!
//! Global control, status, addressing, clock divisor, RMAP key, time-code and
//! interrupt-code distribution registers. The DMA channel blocks live at
//! [`super::dma::DMA_BASE_OFFSET`] and are described in [`super::dma`].

use super::{RegisterAccess, reg_modify, reg_rw};

// =============================================================================
// Register Offsets
// =============================================================================

/// Control register offset
pub const CTRL_OFFSET: usize = 0x00;
/// Status register offset
pub const STATUS_OFFSET: usize = 0x04;
/// Default node address register offset
pub const NODE_ADDR_OFFSET: usize = 0x08;
/// Clock divisor register offset
pub const CLKDIV_OFFSET: usize = 0x0C;
/// RMAP destination key register offset
pub const DEST_KEY_OFFSET: usize = 0x10;
/// Time register offset
pub const TIME_OFFSET: usize = 0x14;
/// Interrupt-code distribution control register offset
pub const ICCTRL_OFFSET: usize = 0xA0;

// =============================================================================
// Control Register (CTRL) Bits
// =============================================================================

/// Link Disable
pub const CTRL_LD: u32 = 1 << 0;
/// Link Start
pub const CTRL_LS: u32 = 1 << 1;
/// Autostart
pub const CTRL_AS: u32 = 1 << 2;
/// Global Interrupt Enable
pub const CTRL_IE: u32 = 1 << 3;
/// Tick In - transmit a time-code, cleared by hardware
pub const CTRL_TI: u32 = 1 << 4;
/// Promiscuous Mode
pub const CTRL_PM: u32 = 1 << 5;
/// Reset - cleared by hardware when the core reset completes
pub const CTRL_RS: u32 = 1 << 6;
/// Tick-out Interrupt enable
pub const CTRL_TQ: u32 = 1 << 8;
/// Link error Interrupt enable
pub const CTRL_LI: u32 = 1 << 9;
/// Time-code Transmit enable
pub const CTRL_TT: u32 = 1 << 10;
/// Time-code Receive enable
pub const CTRL_TR: u32 = 1 << 11;
/// RMAP target Enable
pub const CTRL_RE: u32 = 1 << 16;
/// RMAP buffer Disable
pub const CTRL_RD: u32 = 1 << 17;
/// No Port force: let hardware select the active port
pub const CTRL_NP: u32 = 1 << 20;
/// Port Select (when NP is clear)
pub const CTRL_PS: u32 = 1 << 21;
/// Interrupt-code distribution available (read-only)
pub const CTRL_ID: u32 = 1 << 26;
/// Number of DMA channels minus one, shift
pub const CTRL_NCH_SHIFT: u32 = 27;
/// Number of DMA channels minus one, mask
pub const CTRL_NCH_MASK: u32 = 0x3 << 27;
/// Two ports available (read-only)
pub const CTRL_PO: u32 = 1 << 29;
/// RMAP CRC available (read-only)
pub const CTRL_RC: u32 = 1 << 30;
/// RMAP available (read-only)
pub const CTRL_RA: u32 = 1 << 31;

/// Bits that trigger an action when written as 1 and must not be written back
pub const CTRL_ACTION_BITS: u32 = CTRL_TI | CTRL_RS;

/// IRQ sources that require the global interrupt enable
pub const CTRL_IRQ_SOURCES: u32 = CTRL_TQ | CTRL_LI;

// =============================================================================
// Status Register (STATUS) Bits
// =============================================================================

/// Tick Out - a time-code was received
pub const STATUS_TO: u32 = 1 << 0;
/// Credit Error
pub const STATUS_CE: u32 = 1 << 1;
/// Escape Error
pub const STATUS_ER: u32 = 1 << 2;
/// Disconnect Error
pub const STATUS_DE: u32 = 1 << 3;
/// Parity Error
pub const STATUS_PE: u32 = 1 << 4;
/// Write Synchronization Error
pub const STATUS_WE: u32 = 1 << 6;
/// Invalid Address
pub const STATUS_IA: u32 = 1 << 7;
/// Early EOP/EEP
pub const STATUS_EE: u32 = 1 << 8;
/// Active Port (0 or 1)
pub const STATUS_AP: u32 = 1 << 9;
/// Interrupt-code received
pub const STATUS_IC: u32 = 1 << 10;
/// Link state shift
pub const STATUS_LS_SHIFT: u32 = 21;
/// Link state mask
pub const STATUS_LS_MASK: u32 = 0x7 << 21;

/// All link error bits
pub const STATUS_LINK_ERRORS: u32 =
    STATUS_CE | STATUS_ER | STATUS_DE | STATUS_PE | STATUS_WE | STATUS_IA | STATUS_EE;

/// Write-one-to-clear bits
pub const STATUS_W1C: u32 = STATUS_TO | STATUS_LINK_ERRORS | STATUS_IC;

// =============================================================================
// Field Layouts
// =============================================================================

/// Node address field mask (NODE_ADDR[7:0])
pub const NODE_ADDR_MASK: u32 = 0xFF;
/// Node address mask field shift (NODE_ADDR[15:8])
pub const NODE_MASK_SHIFT: u32 = 8;

/// Clock divisor used in run state (CLKDIV[7:0])
pub const CLKDIV_RUN_MASK: u32 = 0xFF;
/// Clock divisor used during link start, shift (CLKDIV[15:8])
pub const CLKDIV_START_SHIFT: u32 = 8;

/// RMAP destination key mask
pub const DEST_KEY_MASK: u32 = 0xFF;

/// Time counter and control flags (TIME[7:0])
pub const TIME_MASK: u32 = 0xFF;

/// Interrupt-code distribution enable
pub const ICCTRL_EN: u32 = 1 << 0;
/// Interrupt on received interrupt-code
pub const ICCTRL_IQ: u32 = 1 << 1;

/// Compute the control value with the global interrupt enable derived from
/// the enabled IRQ sources.
#[inline]
pub const fn with_global_irq(ctrl: u32, icctrl: u32) -> u32 {
    if (ctrl & CTRL_IRQ_SOURCES) != 0 || (icctrl & ICCTRL_IQ) != 0 {
        ctrl | CTRL_IE
    } else {
        ctrl & !CTRL_IE
    }
}

// =============================================================================
// Typed View
// =============================================================================

/// Node register block view
#[derive(Clone, Copy)]
pub struct NodeRegs<'a> {
    io: &'a dyn RegisterAccess,
    base: usize,
}

impl<'a> NodeRegs<'a> {
    /// Create a view over a register block
    pub fn new(io: &'a dyn RegisterAccess) -> Self {
        Self { io, base: 0 }
    }

    reg_rw!(ctrl, set_ctrl, CTRL_OFFSET, "Control register");
    reg_rw!(status, set_status, STATUS_OFFSET, "Status register");
    reg_rw!(node_addr, set_node_addr, NODE_ADDR_OFFSET, "Node Address register");
    reg_rw!(clkdiv, set_clkdiv, CLKDIV_OFFSET, "Clock Divisor register");
    reg_rw!(dest_key, set_dest_key, DEST_KEY_OFFSET, "Destination Key register");
    reg_rw!(time, set_time, TIME_OFFSET, "Time register");
    reg_rw!(icctrl, set_icctrl, ICCTRL_OFFSET, "Interrupt-code Control register");

    reg_modify!(modify_icctrl, ICCTRL_OFFSET, "Interrupt-code Control register");

    /// Read-modify-write the control register.
    ///
    /// Action bits are never written back and the global interrupt enable is
    /// recomputed from the result.
    pub fn modify_ctrl<F>(&self, f: F) -> u32
    where
        F: FnOnce(u32) -> u32,
    {
        let value = f(self.ctrl() & !CTRL_ACTION_BITS);
        let value = with_global_irq(value, self.icctrl());
        self.set_ctrl(value);
        value
    }

    /// Recompute the global interrupt enable from the current sources
    pub fn sync_global_irq(&self) {
        self.modify_ctrl(|ctrl| ctrl);
    }

    /// Acknowledge write-one-to-clear status bits
    #[inline]
    pub fn clear_status(&self, bits: u32) {
        self.set_status(bits & STATUS_W1C);
    }
}
