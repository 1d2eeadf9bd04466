//! Transmit side of a DMA channel: `send` → ring (`tx_sched`) → `sent`.

use log::warn;

use crate::driver::config::DmaConfig;
use crate::driver::device::DeviceShared;
use crate::driver::error::{ConfigError, ConfigResult};
use crate::driver::stats::ChannelCounters;
use crate::internal::constants::{MAX_CRC_SKIP, MAX_TX_DATA_LEN, MAX_TX_HDR_LEN};
use crate::internal::register::dma::DMACTRL_TE;

use super::IrqCountdown;
use super::descriptor::TxRequest;
use super::packet::{Packet, PacketQueue, PktFlags};
use super::ring::TxRing;
use super::translate::{AddressTranslate, bus_addr, reachable};
use super::wait::{WaitGate, WaitSide};

/// Snapshot of TX queue counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxCount {
    /// Packets waiting for a free descriptor
    pub send: usize,
    /// Packets owned by hardware
    pub sched: usize,
    /// Sent packets waiting to be reclaimed
    pub sent: usize,
}

/// Check that a packet fits the TX descriptor fields and that the DMA
/// engine can reach its buffers
pub(crate) fn validate(pkt: &Packet, xlate: &dyn AddressTranslate) -> ConfigResult<()> {
    if pkt.hdr.len() > MAX_TX_HDR_LEN
        || pkt.dlen > pkt.data.len()
        || pkt.dlen > MAX_TX_DATA_LEN
        || pkt.crc_skip > MAX_CRC_SKIP
        || !reachable(xlate, pkt.hdr.as_ptr() as usize, pkt.flags, PktFlags::TR_HDR)
        || !reachable(xlate, pkt.data.as_ptr() as usize, pkt.flags, PktFlags::TR_DATA)
    {
        return Err(ConfigError::InvalidArgument);
    }
    Ok(())
}

/// State guarded by a channel's TX lock
pub(crate) struct TxSide {
    pub(crate) ring: TxRing,
    pub(crate) send: PacketQueue,
    pub(crate) sent: PacketQueue,
    pub(crate) cfg: DmaConfig,
    pub(crate) gate: WaitGate,
    irq: IrqCountdown,
}

impl TxSide {
    pub(crate) fn new(cfg: DmaConfig) -> ConfigResult<Self> {
        Ok(Self {
            ring: TxRing::new()?,
            send: PacketQueue::new(),
            sent: PacketQueue::new(),
            gate: WaitGate::default(),
            irq: IrqCountdown::new(cfg.tx_irq_every),
            cfg,
        })
    }

    pub(crate) fn set_config(&mut self, cfg: DmaConfig) {
        self.cfg = cfg;
        self.irq = IrqCountdown::new(cfg.tx_irq_every);
    }

    /// Move packets from `send` into free ring slots and enable the
    /// transmitter if any were scheduled.
    pub(crate) fn schedule(&mut self, dev: &DeviceShared, channel: usize) -> usize {
        let mut count = 0;

        while self.ring.free() > 0 {
            let Some(mut pkt) = self.send.pop_front() else {
                break;
            };

            let (hdr, data) = (pkt.hdr.as_ptr() as usize, pkt.data.as_ptr() as usize);
            let xlate = &*dev.translator;
            let addrs = bus_addr(xlate, hdr, &mut pkt.flags, PktFlags::TR_HDR).and_then(|hdr_addr| {
                bus_addr(xlate, data, &mut pkt.flags, PktFlags::TR_DATA).map(|data_addr| (hdr_addr, data_addr))
            });
            let Ok((hdr_addr, data_addr)) = addrs else {
                // Handed back like a drained packet, never marked done
                warn!("spw{}: dma{channel} tx packet {} not reachable by DMA", dev.index, pkt.id);
                self.sent.push_back(pkt);
                continue;
            };

            let req = TxRequest {
                hdr_addr,
                hdr_len: pkt.hdr.len() as u8,
                crc_skip: pkt.crc_skip,
                data_addr,
                data_len: pkt.dlen as u32,
                hdr_crc: pkt.flags.contains(PktFlags::HCRC),
                data_crc: pkt.flags.contains(PktFlags::DCRC),
            };
            let irq = self.irq.next(pkt.flags.contains(PktFlags::IE));

            if let Err(pkt) = self.ring.push(pkt, |desc, _, wrap| desc.arm(&req, wrap, irq)) {
                self.send.push_front(pkt);
                break;
            }
            count += 1;
        }

        if count > 0 {
            dev.modify_dma_ctrl(channel, |ctrl| ctrl | DMACTRL_TE);
        }
        count
    }

    /// Collect transmitted packets into `sent`, in completion order.
    pub(crate) fn reap(&mut self, stats: &ChannelCounters) -> usize {
        let mut count = 0;

        while let Some(pkt) = self.ring.pop_completed(|desc, pkt| {
            pkt.flags.insert(PktFlags::DONE);
            if desc.link_error() {
                pkt.flags.insert(PktFlags::LINK_ERR);
                stats.tx_link_error();
            }
        }) {
            self.sent.push_back(pkt);
            count += 1;
        }

        stats.tx_reaped(count);
        count
    }

    /// Move every scheduled and unsent packet to `sent` without marking it
    /// done. The transmitter must already be disabled.
    pub(crate) fn drain(&mut self) {
        let mut abandoned = self.ring.drain();
        self.sent.append(&mut abandoned);
        self.sent.append(&mut self.send);
        self.irq = IrqCountdown::new(self.cfg.tx_irq_every);
    }

    pub(crate) fn counts(&self) -> TxCount {
        TxCount {
            send: self.send.len(),
            sched: self.ring.used(),
            sent: self.sent.len(),
        }
    }
}

impl WaitSide for TxSide {
    fn gate(&mut self) -> &mut WaitGate {
        &mut self.gate
    }

    fn wait_counts(&self) -> (usize, usize) {
        (self.send.len() + self.ring.used(), self.sent.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::descriptor::bits::txd0;
    use crate::dma::translate::IdentityTranslation;
    use crate::internal::register::dma::dmactrl_offset;
    use crate::testing::{
        LowBitsTranslation, NoDmaWindow, complete_tx_slot, test_device, test_device_with,
    };
    use std::sync::Arc;

    fn packets(range: core::ops::Range<u64>) -> PacketQueue {
        range.map(|id| Packet::tx(id, vec![1, 2], vec![0; 32])).collect()
    }

    #[test]
    fn validate_limits() {
        let xlate = &IdentityTranslation;
        assert!(validate(&Packet::tx(0, vec![0; 255], vec![0; 8]), xlate).is_ok());
        assert_eq!(
            validate(&Packet::tx(0, vec![0; 256], vec![]), xlate),
            Err(ConfigError::InvalidArgument)
        );

        let mut pkt = Packet::tx(0, vec![], vec![0; 4]);
        pkt.dlen = 5;
        assert_eq!(validate(&pkt, xlate), Err(ConfigError::InvalidArgument));

        let pkt = Packet::tx(0, vec![0; 4], vec![]).with_crc_skip(16);
        assert_eq!(validate(&pkt, xlate), Err(ConfigError::InvalidArgument));
    }

    #[test]
    fn validate_checks_translation() {
        let pkt = Packet::tx(0, vec![1], vec![0; 4]);
        assert!(validate(&pkt, &NoDmaWindow).is_ok());
        assert_eq!(
            validate(&pkt.clone().with_flags(PktFlags::TR_HDR), &NoDmaWindow),
            Err(ConfigError::InvalidArgument)
        );
        assert_eq!(
            validate(&pkt.with_flags(PktFlags::TR_DATA), &NoDmaWindow),
            Err(ConfigError::InvalidArgument)
        );
    }

    #[test]
    fn schedule_and_reap_preserve_order() {
        let (dev, regs) = test_device();
        let stats = ChannelCounters::default();
        let mut side = TxSide::new(DmaConfig::new()).unwrap();
        side.send = packets(1..11);

        assert_eq!(side.schedule(&dev, 1), 10);
        assert_eq!(regs.get(dmactrl_offset(1)) & DMACTRL_TE, DMACTRL_TE);

        for i in 0..10 {
            complete_tx_slot(side.ring.descriptor(i), false);
        }
        assert_eq!(side.reap(&stats), 10);

        let ids: Vec<u64> = side.sent.iter().map(|p| p.id).collect();
        assert_eq!(ids, (1..11).collect::<Vec<_>>());
        assert!(side.sent.iter().all(|p| p.is_done() && !p.has_error()));
        assert_eq!(stats.snapshot().tx_packets, 10);
    }

    #[test]
    fn link_error_is_reported() {
        let (dev, _regs) = test_device();
        let stats = ChannelCounters::default();
        let mut side = TxSide::new(DmaConfig::new()).unwrap();
        side.send = packets(0..1);
        side.schedule(&dev, 0);

        complete_tx_slot(side.ring.descriptor(0), true);
        side.reap(&stats);

        let pkt = side.sent.pop_front().unwrap();
        assert!(pkt.flags.contains(PktFlags::DONE | PktFlags::LINK_ERR));
        assert_eq!(stats.snapshot().tx_link_errors, 1);
    }

    #[test]
    fn descriptor_words_follow_packet() {
        let (dev, _regs) = test_device();
        let mut side = TxSide::new(DmaConfig::new()).unwrap();
        let pkt = Packet::tx(0, vec![0xAA; 3], vec![0; 100])
            .with_flags(PktFlags::HCRC | PktFlags::DCRC)
            .with_crc_skip(1);
        let data_addr = pkt.data.as_ptr() as usize as u32;
        side.send.push_back(pkt);
        side.schedule(&dev, 0);

        let desc = side.ring.descriptor(0);
        let ctrl = desc.raw_ctrl();
        assert_eq!(ctrl & txd0::HLEN_MASK, 3);
        assert_eq!((ctrl & txd0::NCL_MASK) >> txd0::NCL_SHIFT, 1);
        assert_eq!(ctrl & (txd0::HC | txd0::DC), txd0::HC | txd0::DC);
        let (_, dlen, daddr) = desc.words();
        assert_eq!(dlen, 100);
        assert_eq!(daddr, data_addr);
    }

    #[test]
    fn unreachable_packet_handed_back_not_done() {
        let (dev, regs) = test_device_with(Arc::new(NoDmaWindow));
        let mut side = TxSide::new(DmaConfig::new()).unwrap();
        side.send.push_back(Packet::tx(7, vec![], vec![0; 8]).with_flags(PktFlags::TR_DATA));
        side.send.push_back(Packet::tx(8, vec![], vec![0; 8]));

        assert_eq!(side.schedule(&dev, 0), 1);
        assert_eq!(side.counts(), TxCount { send: 0, sched: 1, sent: 1 });
        let back = side.sent.pop_front().unwrap();
        assert_eq!(back.id, 7);
        assert!(!back.is_done());
        assert_eq!(regs.get(dmactrl_offset(0)) & DMACTRL_TE, DMACTRL_TE);
    }

    #[test]
    fn translation_flag_kept_when_address_moves() {
        let (dev, _regs) = test_device_with(Arc::new(LowBitsTranslation { offset: 0x100 }));
        let mut side = TxSide::new(DmaConfig::new()).unwrap();
        let pkt = Packet::tx(0, vec![1], vec![0; 8]).with_flags(PktFlags::TR_DATA | PktFlags::TR_HDR);
        let data = pkt.data.as_ptr() as usize as u32;
        side.send.push_back(pkt);
        side.schedule(&dev, 0);

        let (_, _, daddr) = side.ring.descriptor(0).words();
        assert_eq!(daddr, data.wrapping_add(0x100));
        let flags = side.ring.packets().next().unwrap().flags;
        assert!(flags.contains(PktFlags::TR_DATA | PktFlags::TR_HDR));
    }

    #[test]
    fn drain_moves_send_after_ring() {
        let (dev, _regs) = test_device();
        let stats = ChannelCounters::default();
        let mut side = TxSide::new(DmaConfig::new()).unwrap();
        side.send = packets(0..2);
        side.schedule(&dev, 0);
        side.send = packets(2..5);

        complete_tx_slot(side.ring.descriptor(0), false);
        complete_tx_slot(side.ring.descriptor(1), false);
        side.reap(&stats);
        side.drain();

        let got: Vec<_> = side.sent.iter().map(|p| (p.id, p.is_done())).collect();
        assert_eq!(got, vec![(0, true), (1, true), (2, false), (3, false), (4, false)]);
        assert_eq!(side.counts(), TxCount { send: 0, sched: 0, sent: 5 });
    }
}
