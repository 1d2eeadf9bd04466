//! Receive side of a DMA channel: `ready` → ring (`rx_sched`) → `recv`.

use log::warn;

use crate::driver::config::DmaConfig;
use crate::driver::device::DeviceShared;
use crate::driver::error::{ConfigError, ConfigResult};
use crate::driver::stats::ChannelCounters;
use crate::internal::register::dma::{DMACTRL_RD, DMACTRL_RE};

use super::IrqCountdown;
use super::packet::{Packet, PacketQueue, PktFlags};
use super::ring::RxRing;
use super::translate::{AddressTranslate, bus_addr, reachable};
use super::wait::{WaitGate, WaitSide};

/// Snapshot of RX queue counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxCount {
    /// Buffers waiting for a free descriptor
    pub ready: usize,
    /// Buffers owned by hardware
    pub sched: usize,
    /// Received packets waiting to be collected
    pub recv: usize,
}

/// Check that a buffer can take a packet of `max_len` bytes and that the
/// DMA engine can reach it
pub(crate) fn validate(pkt: &Packet, max_len: usize, xlate: &dyn AddressTranslate) -> ConfigResult<()> {
    if pkt.data.len() < max_len
        || !reachable(xlate, pkt.data.as_ptr() as usize, pkt.flags, PktFlags::TR_DATA)
    {
        return Err(ConfigError::InvalidArgument);
    }
    Ok(())
}

/// State guarded by a channel's RX lock
pub(crate) struct RxSide {
    pub(crate) ring: RxRing,
    pub(crate) ready: PacketQueue,
    pub(crate) recv: PacketQueue,
    pub(crate) cfg: DmaConfig,
    pub(crate) gate: WaitGate,
    irq: IrqCountdown,
}

impl RxSide {
    pub(crate) fn new(cfg: DmaConfig) -> ConfigResult<Self> {
        Ok(Self {
            ring: RxRing::new()?,
            ready: PacketQueue::new(),
            recv: PacketQueue::new(),
            irq: IrqCountdown::new(cfg.rx_irq_every),
            cfg,
            gate: WaitGate::default(),
        })
    }

    pub(crate) fn set_config(&mut self, cfg: DmaConfig) {
        self.cfg = cfg;
        self.irq = IrqCountdown::new(cfg.rx_irq_every);
    }

    /// Move buffers from `ready` into free ring slots.
    ///
    /// Enables the receiver under the register lock when at least one buffer
    /// was scheduled; an empty `ready` queue touches no register.
    pub(crate) fn schedule(&mut self, dev: &DeviceShared, channel: usize) -> usize {
        let mut count = 0;

        while self.ring.free() > 0 {
            let Some(mut pkt) = self.ready.pop_front() else {
                break;
            };

            let data = pkt.data.as_ptr() as usize;
            let Ok(addr) = bus_addr(&*dev.translator, data, &mut pkt.flags, PktFlags::TR_DATA) else {
                // Handed back like a drained buffer, never marked done
                warn!("spw{}: dma{channel} rx buffer {} not reachable by DMA", dev.index, pkt.id);
                self.recv.push_back(pkt);
                continue;
            };
            let irq = self.irq.next(pkt.flags.contains(PktFlags::IE));

            if let Err(pkt) = self.ring.push(pkt, |desc, _, wrap| desc.arm(addr, wrap, irq)) {
                self.ready.push_front(pkt);
                break;
            }
            count += 1;
        }

        if count > 0 {
            dev.modify_dma_ctrl(channel, |ctrl| ctrl | DMACTRL_RE | DMACTRL_RD);
        }
        count
    }

    /// Collect completed buffers into `recv`, in completion order.
    pub(crate) fn reap(&mut self, stats: &ChannelCounters) -> usize {
        let mut count = 0;

        while let Some(pkt) = self.ring.pop_completed(|desc, pkt| {
            let status = desc.status();
            pkt.dlen = status.len;
            pkt.flags.insert(PktFlags::DONE);
            if status.truncated {
                pkt.flags.insert(PktFlags::TRUNCATED);
                stats.rx_truncated();
            }
            if status.eep {
                pkt.flags.insert(PktFlags::EEP);
                stats.rx_eep();
            }
            if status.data_crc_err {
                pkt.flags.insert(PktFlags::DATA_CRC_ERR);
            }
            if status.hdr_crc_err {
                pkt.flags.insert(PktFlags::HDR_CRC_ERR);
            }
            if status.data_crc_err || status.hdr_crc_err {
                stats.rx_crc_error();
            }
        }) {
            self.recv.push_back(pkt);
            count += 1;
        }

        stats.rx_reaped(count);
        count
    }

    /// Move every scheduled and ready buffer to `recv` without marking it
    /// done. The receiver must already be disabled.
    pub(crate) fn drain(&mut self) {
        let mut abandoned = self.ring.drain();
        self.recv.append(&mut abandoned);
        self.recv.append(&mut self.ready);
        self.irq = IrqCountdown::new(self.cfg.rx_irq_every);
    }

    pub(crate) fn counts(&self) -> RxCount {
        RxCount {
            ready: self.ready.len(),
            sched: self.ring.used(),
            recv: self.recv.len(),
        }
    }
}

impl WaitSide for RxSide {
    fn gate(&mut self) -> &mut WaitGate {
        &mut self.gate
    }

    fn wait_counts(&self) -> (usize, usize) {
        (self.ready.len() + self.ring.used(), self.recv.len())
    }
}
