//! Device core
//!
//! A [`Device`] is one SpaceWire interface: the node registers, link
//! controls and the DMA channels. The state the interrupt handler shares
//! with everyone else lives in [`DeviceShared`], behind a critical-section
//! register lock.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::dma::{AddressTranslate, DmaChannel};
use crate::driver::config::{
    AddressConfig, Capabilities, DmaConfig, LinkControl, LinkErrors, LinkState, PortSelect,
    RmapControl, TimecodeControl,
};
use crate::driver::error::{ConfigError, Result};
use crate::driver::stats::{ChannelCounters, DeviceCounters, DeviceStats};
use crate::driver::work::WorkDispatch;
use crate::internal::constants::{MAX_DMA_CHANNELS, RESET_POLL_INTERVAL_US, RESET_TIMEOUT_US};
use crate::internal::register::RegisterAccess;
use crate::internal::register::dma::{DMACTRL_W1C, DmaRegs};
use crate::internal::register::node::{
    CLKDIV_RUN_MASK, CLKDIV_START_SHIFT, CTRL_AS, CTRL_LD, CTRL_LI, CTRL_LS, CTRL_NP, CTRL_PM,
    CTRL_PS, CTRL_RD, CTRL_RE, CTRL_RS, CTRL_TI, CTRL_TQ, CTRL_TR, CTRL_TT, DEST_KEY_MASK,
    ICCTRL_EN, ICCTRL_IQ, NODE_ADDR_MASK, NODE_MASK_SHIFT, NodeRegs, STATUS_AP, STATUS_W1C,
    TIME_MASK,
};
use crate::sync::CriticalSectionCell;

/// Called from the interrupt handler with the received time-code
pub type TimecodeHandler = Arc<dyn Fn(u8) + Send + Sync>;

/// Called from the interrupt handler with the status register value
pub type InterruptCodeHandler = Arc<dyn Fn(u32) + Send + Sync>;

/// What the interrupt handler needs to know about a channel
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ChannelIrq {
    pub(crate) open: bool,
    pub(crate) irq_both: bool,
}

/// State guarded by the register lock
#[derive(Default)]
pub(crate) struct IrqState {
    pub(crate) tc_handler: Option<TimecodeHandler>,
    pub(crate) ic_handler: Option<InterruptCodeHandler>,
    pub(crate) disable_on_error: LinkErrors,
    pub(crate) status_clear: LinkErrors,
    pub(crate) channels: [ChannelIrq; MAX_DMA_CHANNELS],
}

/// Device state shared by the interrupt handler, the worker and channels
pub(crate) struct DeviceShared {
    pub(crate) index: usize,
    pub(crate) regs: Arc<dyn RegisterAccess>,
    pub(crate) irq: CriticalSectionCell<IrqState>,
    pub(crate) translator: Arc<dyn AddressTranslate>,
    pub(crate) dispatch: Arc<dyn WorkDispatch>,
    pub(crate) caps: Capabilities,
    pub(crate) counters: DeviceCounters,
    pub(crate) channel_counters: [ChannelCounters; MAX_DMA_CHANNELS],
}

impl DeviceShared {
    pub(crate) fn new(
        index: usize,
        regs: Arc<dyn RegisterAccess>,
        translator: Arc<dyn AddressTranslate>,
        dispatch: Arc<dyn WorkDispatch>,
    ) -> Self {
        let caps = Capabilities::from_ctrl(NodeRegs::new(&*regs).ctrl());
        Self {
            index,
            regs,
            irq: CriticalSectionCell::new(IrqState::default()),
            translator,
            dispatch,
            caps,
            counters: DeviceCounters::default(),
            channel_counters: Default::default(),
        }
    }

    /// Node register view
    #[inline]
    pub(crate) fn node(&self) -> NodeRegs<'_> {
        NodeRegs::new(&*self.regs)
    }

    /// Channel register view
    #[inline]
    pub(crate) fn dma(&self, channel: usize) -> DmaRegs<'_> {
        DmaRegs::new(&*self.regs, channel)
    }

    /// Number of DMA channels the hardware implements
    pub(crate) fn channel_count(&self) -> usize {
        usize::from(self.caps.dma_channels).min(MAX_DMA_CHANNELS)
    }

    /// Run `f` holding the register lock
    #[inline]
    pub(crate) fn locked<R>(&self, f: impl FnOnce(&mut IrqState) -> R) -> R {
        self.irq.with(f)
    }

    /// Read-modify-write a channel's control register under the register
    /// lock without acknowledging pending status
    pub(crate) fn modify_dma_ctrl(&self, channel: usize, f: impl FnOnce(u32) -> u32) {
        self.locked(|_| {
            self.dma(channel).modify_ctrl(f);
        });
    }
}

/// A SpaceWire interface
pub struct Device {
    pub(crate) shared: Arc<DeviceShared>,
    channels: Vec<Arc<DmaChannel>>,
    open: AtomicBool,
    default_dma: DmaConfig,
}

impl core::fmt::Debug for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("index", &self.shared.index)
            .field("caps", &self.shared.caps)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Device {
    pub(crate) fn new(shared: DeviceShared, default_dma: DmaConfig) -> Self {
        let shared = Arc::new(shared);
        let channels = (0..shared.channel_count())
            .map(|i| Arc::new(DmaChannel::new(shared.clone(), i)))
            .collect();
        Self {
            shared,
            channels,
            open: AtomicBool::new(false),
            default_dma,
        }
    }

    /// Registry index
    pub fn index(&self) -> usize {
        self.shared.index
    }

    /// Hardware capabilities
    pub fn capabilities(&self) -> Capabilities {
        self.shared.caps
    }

    /// Whether the device is open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Claim the device and quiesce every channel
    pub(crate) fn open(&self) -> Result<()> {
        if self
            .open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConfigError::AlreadyOpen.into());
        }

        let shared = &*self.shared;
        shared.locked(|st| {
            *st = IrqState::default();
            for ch in 0..shared.channel_count() {
                shared.dma(ch).set_ctrl(DMACTRL_W1C);
            }
            shared.node().clear_status(STATUS_W1C);
        });
        shared.counters.clear();

        info!("spw{}: opened, {:?}", shared.index, shared.caps);
        Ok(())
    }

    /// Stop and close every open channel, then release the device.
    ///
    /// Every channel is attempted; on failure the first error is returned
    /// and the device stays open so the close can be retried.
    pub(crate) fn close(&self) -> Result<()> {
        if !self.is_open() {
            return Err(ConfigError::NotOpen.into());
        }

        let mut first_err = None;
        for ch in self.channels.iter().filter(|ch| ch.is_open()) {
            if let Err(e) = ch.stop().and_then(|()| ch.close()) {
                warn!("spw{}: dma{} close failed: {e}", self.shared.index, ch.index());
                first_err.get_or_insert(e);
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        self.shared.locked(|st| {
            st.tc_handler = None;
            st.ic_handler = None;
        });
        self.open.store(false, Ordering::Release);

        info!("spw{}: closed", self.shared.index);
        Ok(())
    }

    pub(crate) fn channels(&self) -> &[Arc<DmaChannel>] {
        &self.channels
    }

    // =========================================================================
    // DMA channels
    // =========================================================================

    /// Open DMA channel `index` with the registry's default configuration
    pub fn dma_open(&self, index: usize) -> Result<Arc<DmaChannel>> {
        if !self.is_open() {
            return Err(ConfigError::NotOpen.into());
        }
        let ch = self
            .channels
            .get(index)
            .ok_or(ConfigError::InvalidArgument)?;
        ch.open(self.default_dma)?;
        Ok(ch.clone())
    }

    /// Open channel `index`, if it is open
    pub fn channel(&self, index: usize) -> Option<Arc<DmaChannel>> {
        self.channels
            .get(index)
            .filter(|ch| ch.is_open())
            .cloned()
    }

    // =========================================================================
    // Link
    // =========================================================================

    fn current_link(&self, st: &IrqState) -> LinkControl {
        let node = self.shared.node();
        let ctrl = node.ctrl();
        let clkdiv = node.clkdiv();
        LinkControl {
            disable: ctrl & CTRL_LD != 0,
            start: ctrl & CTRL_LS != 0,
            autostart: ctrl & CTRL_AS != 0,
            error_irq: ctrl & CTRL_LI != 0,
            clkdiv_start: (clkdiv >> CLKDIV_START_SHIFT) as u8,
            clkdiv_run: (clkdiv & CLKDIV_RUN_MASK) as u8,
            disable_on_error: st.disable_on_error,
            status_clear: st.status_clear,
        }
    }

    /// Apply link settings, returning the previous ones
    pub fn link_ctrl(&self, ctl: LinkControl) -> LinkControl {
        let prev = self.shared.locked(|st| {
            let prev = self.current_link(st);
            let node = self.shared.node();
            node.set_clkdiv(
                (u32::from(ctl.clkdiv_start) << CLKDIV_START_SHIFT) | u32::from(ctl.clkdiv_run),
            );
            node.modify_ctrl(|ctrl| {
                let mut ctrl = ctrl & !(CTRL_LD | CTRL_LS | CTRL_AS | CTRL_LI);
                if ctl.disable {
                    ctrl |= CTRL_LD;
                }
                if ctl.start {
                    ctrl |= CTRL_LS;
                }
                if ctl.autostart {
                    ctrl |= CTRL_AS;
                }
                if ctl.error_irq {
                    ctrl |= CTRL_LI;
                }
                ctrl
            });
            st.disable_on_error = ctl.disable_on_error;
            st.status_clear = ctl.status_clear;
            prev
        });
        info!("spw{}: link {:?}", self.shared.index, ctl);
        prev
    }

    /// Current link settings
    pub fn link_config(&self) -> LinkControl {
        self.shared.locked(|st| self.current_link(st))
    }

    /// Link state machine state
    pub fn link_state(&self) -> LinkState {
        LinkState::from_status(self.shared.node().status())
    }

    // =========================================================================
    // Ports and addressing
    // =========================================================================

    /// Select the port, returning the previous selection
    pub fn port_ctrl(&self, sel: PortSelect) -> Result<PortSelect> {
        if sel == PortSelect::Port1 && self.shared.caps.ports < 2 {
            return Err(ConfigError::InvalidArgument.into());
        }

        let prev = self.shared.locked(|_| {
            let mut prev = PortSelect::Auto;
            self.shared.node().modify_ctrl(|ctrl| {
                prev = if ctrl & CTRL_NP != 0 {
                    PortSelect::Auto
                } else if ctrl & CTRL_PS != 0 {
                    PortSelect::Port1
                } else {
                    PortSelect::Port0
                };
                let ctrl = ctrl & !(CTRL_NP | CTRL_PS);
                match sel {
                    PortSelect::Auto => ctrl | CTRL_NP,
                    PortSelect::Port0 => ctrl,
                    PortSelect::Port1 => ctrl | CTRL_PS,
                }
            });
            prev
        });
        Ok(prev)
    }

    /// Port the link is currently using
    pub fn active_port(&self) -> u8 {
        u8::from(self.shared.node().status() & STATUS_AP != 0)
    }

    /// Set the default node address, returning the previous one
    pub fn addr_ctrl(&self, cfg: AddressConfig) -> AddressConfig {
        self.shared.locked(|_| {
            let prev = self.address_config_unlocked();
            let node = self.shared.node();
            node.set_node_addr(
                (u32::from(cfg.node_mask) << NODE_MASK_SHIFT) | u32::from(cfg.node_addr),
            );
            node.modify_ctrl(|ctrl| {
                if cfg.promiscuous { ctrl | CTRL_PM } else { ctrl & !CTRL_PM }
            });
            prev
        })
    }

    /// Current node address configuration
    pub fn address_config(&self) -> AddressConfig {
        self.shared.locked(|_| self.address_config_unlocked())
    }

    fn address_config_unlocked(&self) -> AddressConfig {
        let node = self.shared.node();
        let addr = node.node_addr();
        AddressConfig {
            node_addr: (addr & NODE_ADDR_MASK) as u8,
            node_mask: ((addr >> NODE_MASK_SHIFT) & NODE_ADDR_MASK) as u8,
            promiscuous: node.ctrl() & CTRL_PM != 0,
        }
    }

    /// Configure the RMAP target, returning the previous settings.
    ///
    /// Fails with [`ConfigError::InvalidArgument`] on cores without RMAP.
    pub fn rmap_ctrl(&self, ctl: RmapControl) -> Result<RmapControl> {
        if !self.shared.caps.rmap {
            return Err(ConfigError::InvalidArgument.into());
        }

        let prev = self.shared.locked(|_| {
            let node = self.shared.node();
            let ctrl = node.ctrl();
            let prev = RmapControl {
                enable: ctrl & CTRL_RE != 0,
                buffer_disable: ctrl & CTRL_RD != 0,
                dest_key: (node.dest_key() & DEST_KEY_MASK) as u8,
            };
            node.set_dest_key(u32::from(ctl.dest_key));
            node.modify_ctrl(|ctrl| {
                let mut ctrl = ctrl & !(CTRL_RE | CTRL_RD);
                if ctl.enable {
                    ctrl |= CTRL_RE;
                }
                if ctl.buffer_disable {
                    ctrl |= CTRL_RD;
                }
                ctrl
            });
            prev
        });
        Ok(prev)
    }

    // =========================================================================
    // Time-codes and interrupt-codes
    // =========================================================================

    /// Configure time-code handling, returning the previous settings
    pub fn tc_ctrl(&self, ctl: TimecodeControl) -> TimecodeControl {
        self.shared.locked(|_| {
            let mut prev = TimecodeControl::default();
            self.shared.node().modify_ctrl(|ctrl| {
                prev = TimecodeControl {
                    tx_enable: ctrl & CTRL_TT != 0,
                    rx_enable: ctrl & CTRL_TR != 0,
                    tick_irq: ctrl & CTRL_TQ != 0,
                };
                let mut ctrl = ctrl & !(CTRL_TT | CTRL_TR | CTRL_TQ);
                if ctl.tx_enable {
                    ctrl |= CTRL_TT;
                }
                if ctl.rx_enable {
                    ctrl |= CTRL_TR;
                }
                if ctl.tick_irq {
                    ctrl |= CTRL_TQ;
                }
                ctrl
            });
            prev
        })
    }

    /// Load the time counter and send a time-code
    pub fn tc_tx(&self, time: u8) {
        self.shared.locked(|_| {
            let node = self.shared.node();
            node.set_time(u32::from(time));
            node.modify_ctrl(|ctrl| ctrl | CTRL_TI);
        });
    }

    /// Last time-code sent or received
    pub fn tc_time(&self) -> u8 {
        (self.shared.node().time() & TIME_MASK) as u8
    }

    /// Install or remove the time-code handler
    pub fn set_tc_handler(&self, handler: Option<TimecodeHandler>) {
        self.shared.locked(|st| st.tc_handler = handler);
    }

    /// Enable or disable interrupt-code distribution, returning the previous
    /// state.
    ///
    /// Fails with [`ConfigError::InvalidArgument`] on cores without it.
    pub fn ic_ctrl(&self, enable: bool) -> Result<bool> {
        if !self.shared.caps.interrupt_code {
            return Err(ConfigError::InvalidArgument.into());
        }

        let prev = self.shared.locked(|_| {
            let node = self.shared.node();
            let mut prev = false;
            node.modify_icctrl(|ic| {
                prev = ic & ICCTRL_EN != 0;
                if enable {
                    ic | ICCTRL_EN | ICCTRL_IQ
                } else {
                    ic & !(ICCTRL_EN | ICCTRL_IQ)
                }
            });
            node.sync_global_irq();
            prev
        });
        Ok(prev)
    }

    /// Install or remove the interrupt-code handler
    pub fn set_ic_handler(&self, handler: Option<InterruptCodeHandler>) {
        self.shared.locked(|st| st.ic_handler = handler);
    }

    // =========================================================================
    // Reset and statistics
    // =========================================================================

    /// Reset the core and wait for the reset bit to self-clear.
    ///
    /// Every channel must be stopped.
    pub fn hw_reset(&self, mut delay: impl DelayNs) -> Result<()> {
        if self.channels.iter().any(|ch| ch.is_started()) {
            return Err(ConfigError::ChannelRunning.into());
        }

        let node = self.shared.node();
        self.shared.locked(|_| {
            node.modify_ctrl(|ctrl| ctrl | CTRL_RS);
        });

        let mut waited = 0;
        while node.ctrl() & CTRL_RS != 0 {
            if waited >= RESET_TIMEOUT_US {
                warn!("spw{}: reset did not complete", self.shared.index);
                return Err(ConfigError::ResetFailed.into());
            }
            delay.delay_us(RESET_POLL_INTERVAL_US);
            waited += RESET_POLL_INTERVAL_US;
        }

        info!("spw{}: reset", self.shared.index);
        Ok(())
    }

    /// Snapshot of device counters
    pub fn stats(&self) -> DeviceStats {
        self.shared.counters.snapshot()
    }

    /// Reset device counters
    pub fn clear_stats(&self) {
        self.shared.counters.clear();
    }
}
