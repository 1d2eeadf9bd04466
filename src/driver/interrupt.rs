//! Interrupt handling
//!
//! [`Device::isr`] does only what cannot wait: it reads the status
//! registers, acknowledges what it consumed, masks the channel interrupt
//! sources that fired and posts a [`WorkMessage`] describing the rest to
//! the worker. It never takes a channel lock and never blocks.

use crate::driver::config::LinkErrors;
use crate::driver::device::Device;
use crate::driver::work::{ChannelWork, WorkMessage};
use crate::internal::register::dma::{
    DMACTRL_ERROR, DMACTRL_IRQ_MASK, DMACTRL_PR, DMACTRL_PS, DMACTRL_RI, DMACTRL_TI, DMACTRL_W1C,
};
use crate::internal::register::node::{
    CTRL_AS, CTRL_LD, CTRL_LS, CTRL_TQ, ICCTRL_EN, STATUS_LINK_ERRORS, STATUS_TO, TIME_MASK,
};

// =============================================================================
// Channel Interrupt Status
// =============================================================================

/// Interrupt causes decoded from a channel control register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelIrqStatus {
    /// A packet was received and the RX interrupt is enabled
    pub rx_done: bool,
    /// A packet was sent and the TX interrupt is enabled
    pub tx_done: bool,
    /// AHB error on either direction
    pub dma_error: bool,
}

impl ChannelIrqStatus {
    /// Decode from a raw control register value
    #[inline]
    pub const fn from_ctrl(ctrl: u32) -> Self {
        Self {
            rx_done: (ctrl & DMACTRL_PR) != 0 && (ctrl & DMACTRL_RI) != 0,
            tx_done: (ctrl & DMACTRL_PS) != 0 && (ctrl & DMACTRL_TI) != 0,
            dma_error: (ctrl & DMACTRL_ERROR) != 0,
        }
    }

    /// Whether the channel needs attention
    #[inline]
    pub const fn any(&self) -> bool {
        self.rx_done || self.tx_done || self.dma_error
    }

    /// Interrupt enables to mask and work to post, given the channel's
    /// re-arm policy
    const fn disposition(&self, irq_both: bool) -> (u32, ChannelWork) {
        if self.dma_error {
            return (DMACTRL_IRQ_MASK, ChannelWork::ERROR);
        }
        if irq_both {
            return (
                DMACTRL_RI | DMACTRL_TI,
                ChannelWork::RX.union(ChannelWork::TX),
            );
        }

        let mut mask = 0;
        let mut work = ChannelWork::empty();
        if self.rx_done {
            mask |= DMACTRL_RI;
            work = work.union(ChannelWork::RX);
        }
        if self.tx_done {
            mask |= DMACTRL_TI;
            work = work.union(ChannelWork::TX);
        }
        (mask, work)
    }
}

// =============================================================================
// Interrupt Service Routine
// =============================================================================

impl Device {
    /// Service an interrupt from this device.
    ///
    /// Call from the platform's interrupt handler. The time-code and
    /// interrupt-code handlers run inline, outside the register lock.
    pub fn isr(&self) {
        let dev = &*self.shared;
        dev.counters.irq();

        let node = dev.node();
        let status = node.status();
        let mut msg = WorkMessage::new(dev.index);

        let (tc_handler, ic_handler) = dev.locked(|st| {
            let tc = if node.ctrl() & CTRL_TQ != 0 && status & STATUS_TO != 0 {
                node.clear_status(STATUS_TO);
                st.tc_handler.clone()
            } else {
                None
            };
            let ic = if node.icctrl() & ICCTRL_EN != 0 {
                st.ic_handler.clone()
            } else {
                None
            };

            let link_errors = LinkErrors::from_bits_truncate(status & STATUS_LINK_ERRORS);
            let cleared = link_errors & st.status_clear;
            if !cleared.is_empty() {
                dev.counters.link_errors(cleared);
                node.clear_status(cleared.bits());
            }

            for (index, ch) in st.channels.iter().enumerate().take(dev.channel_count()) {
                if !ch.open {
                    continue;
                }
                let regs = dev.dma(index);
                let ctrl = regs.ctrl();
                let cause = ChannelIrqStatus::from_ctrl(ctrl);
                if !cause.any() {
                    continue;
                }

                let (mask, work) = cause.disposition(ch.irq_both);
                // Leave PR/PS pending for the worker to acknowledge
                regs.set_ctrl(ctrl & !(DMACTRL_W1C | mask));
                msg.channels[index] |= work;
                dev.channel_counters[index].irq();
            }

            if link_errors.intersects(st.disable_on_error) {
                node.modify_ctrl(|ctrl| (ctrl | CTRL_LD) & !(CTRL_LS | CTRL_AS));
                msg.shutdown = true;
                dev.counters.link_shutdown();
            }

            (tc, ic)
        });

        if let Some(handler) = tc_handler {
            handler((node.time() & TIME_MASK) as u8);
        }
        if let Some(handler) = ic_handler {
            handler(status);
        }

        if !msg.is_empty() && !dev.dispatch.try_send(msg) {
            dev.counters.dropped_work();
        }
    }
}
