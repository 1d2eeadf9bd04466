//! DMA channel scheduler
//!
//! A [`DmaChannel`] moves packets between six queues and two descriptor
//! rings:
//!
//! ```text
//! RX:  rx_prepare -> ready -> [RX ring] -> recv -> rx_recv
//! TX:  tx_send    -> send  -> [TX ring] -> sent -> tx_reclaim
//! ```
//!
//! The packets held by a ring are the `rx_sched` / `tx_sched` queues. Every
//! packet is in exactly one place at any time.
//!
//! # Locking
//!
//! Each direction has its own `Mutex`; operations that touch both (start,
//! stop, close, reconfiguration) take RX before TX. Register writes the
//! interrupt handler may race with happen under the device register lock,
//! which is always taken last.
//!
//! # Lifecycle
//!
//! ```text
//! CLOSED --open--> OPEN --start--> STARTED --stop--> OPEN --close--> CLOSED
//! ```
//!
//! Packet-movement calls on an open but stopped channel succeed and report
//! the stop in their return value, so a link going down never turns into a
//! hard error for the caller.

pub mod descriptor;
pub mod packet;
pub mod ring;
pub mod rx;
pub mod translate;
pub mod tx;
pub mod wait;

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Condvar, Mutex};

use bitflags::bitflags;
use log::{debug, info};

use crate::driver::config::DmaConfig;
use crate::driver::device::DeviceShared;
use crate::driver::error::{ConfigError, Error, IoError, Result};
use crate::driver::stats::{ChannelCounters, ChannelStats};
use crate::driver::work::ChannelWork;
use crate::internal::constants::IRQ_COUNTDOWN_DISABLED;
use crate::internal::register::dma::{
    DMACTRL_AI, DMACTRL_AT, DMACTRL_EN, DMACTRL_IRQ_MASK, DMACTRL_LE, DMACTRL_NS, DMACTRL_PR,
    DMACTRL_PS, DMACTRL_RD, DMACTRL_RE, DMACTRL_RI, DMACTRL_SA, DMACTRL_SP, DMACTRL_TE,
    DMACTRL_TI, DMACTRL_W1C, DMARXMAX_MASK,
};

use rx::RxSide;
use tx::TxSide;
use wait::{WaitSide, await_waiter_exit, wait_on};

pub use packet::{Packet, PacketQueue, PktFlags};
pub use rx::RxCount;
pub use translate::{AddressTranslate, IdentityTranslation, OffsetTranslation};
pub use tx::TxCount;
pub use wait::{WaitCondition, WaitOp, WaitOutcome};

bitflags! {
    /// Options for the packet-movement calls
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DmaOpts: u8 {
        /// Do not reap completed descriptors first
        const NO_REAP = 1 << 0;
        /// Do not schedule queued packets into free descriptors
        const NO_SCHEDULE = 1 << 1;
    }
}

/// Result of submitting packets
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub enum Submitted {
    /// Packets were queued (and scheduled unless `NO_SCHEDULE`)
    Queued,
    /// Channel is not started; the packets are handed back untouched
    Stopped(PacketQueue),
    /// A packet failed validation; nothing was queued and the whole batch
    /// is handed back untouched
    Rejected {
        /// Why the batch was refused
        error: ConfigError,
        /// The submitted packets, in order
        packets: PacketQueue,
    },
}

impl Submitted {
    /// Whether the packets were accepted
    pub fn is_queued(&self) -> bool {
        matches!(self, Submitted::Queued)
    }
}

/// Packets collected from `sent` or `recv`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Collected {
    /// Collected packets, oldest first
    pub packets: PacketQueue,
    /// The channel was stopped at the time of the call
    pub stopped: bool,
}

/// Every-Nth-packet interrupt request
#[derive(Debug, Clone, Copy)]
pub(crate) struct IrqCountdown {
    remaining: u32,
    every: u32,
}

impl IrqCountdown {
    pub(crate) const fn new(every: u32) -> Self {
        Self {
            remaining: Self::reload(every),
            every,
        }
    }

    const fn reload(every: u32) -> u32 {
        if every == 0 { IRQ_COUNTDOWN_DISABLED } else { every }
    }

    /// Whether the next scheduled packet should raise an interrupt
    pub(crate) fn next(&mut self, requested: bool) -> bool {
        self.remaining -= 1;
        if self.remaining == 0 {
            self.remaining = Self::reload(self.every);
            return true;
        }
        requested
    }
}

/// Release the side's waiter if its condition now holds
fn wake<S: WaitSide>(side: &mut S, cvar: &Condvar) {
    if side.release_if_met() {
        cvar.notify_all();
    }
}

/// One DMA channel of a device
pub struct DmaChannel {
    dev: Arc<DeviceShared>,
    index: usize,
    rx: Mutex<Option<RxSide>>,
    rx_cond: Condvar,
    tx: Mutex<Option<TxSide>>,
    tx_cond: Condvar,
    started: AtomicBool,
}

impl core::fmt::Debug for DmaChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaChannel")
            .field("device", &self.dev.index)
            .field("index", &self.index)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl DmaChannel {
    pub(crate) fn new(dev: Arc<DeviceShared>, index: usize) -> Self {
        Self {
            dev,
            index,
            rx: Mutex::new(None),
            rx_cond: Condvar::new(),
            tx: Mutex::new(None),
            tx_cond: Condvar::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Channel number within the device
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the channel is started
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Whether the channel is open
    pub fn is_open(&self) -> bool {
        self.rx.lock().is_ok_and(|side| side.is_some())
    }

    fn counters(&self) -> &ChannelCounters {
        &self.dev.channel_counters[self.index]
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Allocate rings and queues and apply `cfg`.
    ///
    /// Nothing is kept if any allocation fails.
    pub(crate) fn open(&self, cfg: DmaConfig) -> Result<()> {
        cfg.validate()?;

        let mut rx_guard = self.rx.lock()?;
        let mut tx_guard = self.tx.lock()?;
        if rx_guard.is_some() || tx_guard.is_some() {
            return Err(ConfigError::AlreadyOpen.into());
        }

        let rx = RxSide::new(cfg)?;
        let tx = TxSide::new(cfg)?;

        *rx_guard = Some(rx);
        *tx_guard = Some(tx);
        self.started.store(false, Ordering::Release);
        self.counters().clear();
        self.dev.locked(|st| {
            st.channels[self.index].open = true;
            st.channels[self.index].irq_both = cfg.irq_both;
        });

        info!("spw{}: dma{} opened", self.dev.index, self.index);
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> Result<DmaConfig> {
        let guard = self.rx.lock()?;
        let side = guard.as_ref().ok_or(ConfigError::NotOpen)?;
        Ok(side.cfg)
    }

    /// Replace the configuration. The channel must be stopped.
    pub fn set_config(&self, cfg: DmaConfig) -> Result<()> {
        cfg.validate()?;

        let mut rx_guard = self.rx.lock()?;
        let mut tx_guard = self.tx.lock()?;
        let (Some(rx), Some(tx)) = (rx_guard.as_mut(), tx_guard.as_mut()) else {
            return Err(ConfigError::NotOpen.into());
        };
        if self.is_started() {
            return Err(ConfigError::ChannelRunning.into());
        }

        rx.set_config(cfg);
        tx.set_config(cfg);
        self.dev
            .locked(|st| st.channels[self.index].irq_both = cfg.irq_both);
        Ok(())
    }

    /// Program the hardware and mark the channel started.
    ///
    /// Both directions are idle until buffers or packets are supplied.
    pub fn start(&self) -> Result<()> {
        let rx_guard = self.rx.lock()?;
        let tx_guard = self.tx.lock()?;
        let (Some(rx), Some(tx)) = (rx_guard.as_ref(), tx_guard.as_ref()) else {
            return Err(ConfigError::NotOpen.into());
        };
        if self.is_started() {
            return Ok(());
        }

        let cfg = rx.cfg;
        let mut ctrl = DMACTRL_W1C;
        if cfg.rx_irq {
            ctrl |= DMACTRL_RI;
        }
        if cfg.tx_irq {
            ctrl |= DMACTRL_TI;
        }
        if cfg.error_irq {
            ctrl |= DMACTRL_AI;
        }
        if cfg.no_spill {
            ctrl |= DMACTRL_NS;
        }
        if cfg.strip_addr {
            ctrl |= DMACTRL_SA;
        }
        if cfg.strip_pid {
            ctrl |= DMACTRL_SP;
        }
        if cfg.tx_disable_on_link_error {
            ctrl |= DMACTRL_LE | DMACTRL_AT;
        }
        if cfg.channel_addr.is_some() {
            ctrl |= DMACTRL_EN;
        }

        self.dev.locked(|_| {
            let regs = self.dev.dma(self.index);
            regs.set_rxmax(cfg.rx_max_len & DMARXMAX_MASK);
            regs.set_rxdesc(rx.ring.base_addr_u32());
            regs.set_txdesc(tx.ring.base_addr_u32());
            if let Some((addr, mask)) = cfg.channel_addr {
                regs.set_addr((u32::from(mask) << 8) | u32::from(addr));
            }
            // Written W1C bits clear stale status from a previous run
            regs.set_ctrl(ctrl);
        });
        self.started.store(true, Ordering::Release);

        info!("spw{}: dma{} started", self.dev.index, self.index);
        Ok(())
    }

    /// Disable DMA and hand every in-flight packet back.
    ///
    /// Completed packets are reaped first; everything still scheduled or
    /// queued then moves to `sent` / `recv` without [`PktFlags::DONE`].
    /// Blocked waiters wake with [`WaitOutcome::Stopped`]. Stopping a
    /// stopped channel does nothing.
    pub fn stop(&self) -> Result<()> {
        let mut rx_guard = self.rx.lock()?;
        let mut tx_guard = self.tx.lock()?;
        let (Some(rx), Some(tx)) = (rx_guard.as_mut(), tx_guard.as_mut()) else {
            return Err(ConfigError::NotOpen.into());
        };
        if !self.started.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        self.dev.locked(|_| {
            self.dev.dma(self.index).modify_ctrl_raw(|ctrl| {
                (ctrl & !(DMACTRL_TE | DMACTRL_RE | DMACTRL_RD | DMACTRL_IRQ_MASK)) | DMACTRL_W1C
            });
        });

        let stats = self.counters();
        tx.reap(stats);
        rx.reap(stats);
        tx.drain();
        rx.drain();

        rx.gate.force_release();
        tx.gate.force_release();
        drop(tx_guard);
        drop(rx_guard);
        self.rx_cond.notify_all();
        self.tx_cond.notify_all();

        info!("spw{}: dma{} stopped", self.dev.index, self.index);
        Ok(())
    }

    /// Free rings and queues. Packets still queued are dropped.
    ///
    /// Waiters woken by [`stop`](Self::stop) are allowed to return first.
    /// Fails with [`ConfigError::ChannelRunning`] while started and with
    /// [`IoError::WaiterBusy`] if a waiter is still armed.
    pub fn close(&self) -> Result<()> {
        if self.is_started() {
            return Err(ConfigError::ChannelRunning.into());
        }
        await_waiter_exit(&self.rx, &self.rx_cond)?;
        await_waiter_exit(&self.tx, &self.tx_cond)?;

        let mut rx_guard = self.rx.lock()?;
        let mut tx_guard = self.tx.lock()?;
        let (Some(rx), Some(tx)) = (rx_guard.as_mut(), tx_guard.as_mut()) else {
            return Err(ConfigError::NotOpen.into());
        };
        if self.is_started() {
            return Err(ConfigError::ChannelRunning.into());
        }
        if !rx.gate.is_idle() || !tx.gate.is_idle() {
            return Err(IoError::WaiterBusy.into());
        }

        *rx_guard = None;
        *tx_guard = None;
        self.dev
            .locked(|st| st.channels[self.index].open = false);

        info!("spw{}: dma{} closed", self.dev.index, self.index);
        Ok(())
    }

    // =========================================================================
    // Transmit
    // =========================================================================

    /// Queue packets for transmission.
    ///
    /// Reaps completed packets first unless [`DmaOpts::NO_REAP`] and
    /// schedules `send` into free descriptors unless
    /// [`DmaOpts::NO_SCHEDULE`]. On a stopped channel the packets are
    /// returned in [`Submitted::Stopped`]. If any packet does not fit a
    /// descriptor or cannot be translated, the batch comes back in
    /// [`Submitted::Rejected`].
    pub fn tx_send(&self, opts: DmaOpts, packets: PacketQueue) -> Result<Submitted> {
        let mut guard = self.tx.lock()?;
        let side = guard.as_mut().ok_or(ConfigError::NotOpen)?;
        if !self.is_started() {
            self.counters().stopped_call();
            return Ok(Submitted::Stopped(packets));
        }

        let xlate = &*self.dev.translator;
        let validated = packets.iter().try_for_each(|pkt| tx::validate(pkt, xlate));
        if let Err(error) = validated {
            debug!("spw{}: dma{} tx batch rejected: {error}", self.dev.index, self.index);
            return Ok(Submitted::Rejected { error, packets });
        }
        let mut packets = packets;
        packets.iter_mut().for_each(Packet::reset_status);

        if !opts.contains(DmaOpts::NO_REAP) {
            side.reap(self.counters());
        }
        side.send.append(&mut packets);
        if !opts.contains(DmaOpts::NO_SCHEDULE) {
            side.schedule(&self.dev, self.index);
        }
        wake(side, &self.tx_cond);

        Ok(Submitted::Queued)
    }

    /// Take up to `count` (all if `None`) transmitted packets from `sent`.
    ///
    /// Allowed on a stopped channel so drained packets can be collected.
    pub fn tx_reclaim(&self, opts: DmaOpts, count: Option<usize>) -> Result<Collected> {
        let mut guard = self.tx.lock()?;
        let side = guard.as_mut().ok_or(ConfigError::NotOpen)?;
        let started = self.is_started();

        if started && !opts.contains(DmaOpts::NO_REAP) {
            side.reap(self.counters());
        }
        let packets = side.sent.remove_head_run(count.unwrap_or(usize::MAX));
        if started && !opts.contains(DmaOpts::NO_SCHEDULE) {
            side.schedule(&self.dev, self.index);
        }
        if started {
            wake(side, &self.tx_cond);
        } else {
            self.counters().stopped_call();
        }

        Ok(Collected {
            packets,
            stopped: !started,
        })
    }

    /// TX queue counts
    pub fn tx_count(&self) -> Result<TxCount> {
        let guard = self.tx.lock()?;
        Ok(guard.as_ref().ok_or(ConfigError::NotOpen)?.counts())
    }

    /// Block until `(send + tx_sched <= send_max) op (sent >= sent_min)`.
    ///
    /// Returns [`WaitOutcome::Stopped`] if the channel stops (or is not
    /// started), [`IoError::Timeout`] when `timeout` elapses first and
    /// [`IoError::WaiterBusy`] at once if another thread is already waiting
    /// on this channel's TX side.
    pub fn tx_wait(
        &self,
        send_max: usize,
        op: WaitOp,
        sent_min: usize,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let cond = WaitCondition::new(send_max, op, sent_min);
        let result = wait_on(&self.tx, &self.tx_cond, || self.is_started(), cond, timeout);
        self.note_wait(&result);
        result
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Supply receive buffers.
    ///
    /// Each buffer must hold at least the configured RX max length. On a
    /// stopped channel the buffers are returned in [`Submitted::Stopped`];
    /// a batch with an unusable buffer comes back in
    /// [`Submitted::Rejected`].
    pub fn rx_prepare(&self, opts: DmaOpts, packets: PacketQueue) -> Result<Submitted> {
        let mut guard = self.rx.lock()?;
        let side = guard.as_mut().ok_or(ConfigError::NotOpen)?;
        if !self.is_started() {
            self.counters().stopped_call();
            return Ok(Submitted::Stopped(packets));
        }

        let max_len = side.cfg.rx_max_len as usize;
        let xlate = &*self.dev.translator;
        let validated = packets.iter().try_for_each(|pkt| rx::validate(pkt, max_len, xlate));
        if let Err(error) = validated {
            debug!("spw{}: dma{} rx batch rejected: {error}", self.dev.index, self.index);
            return Ok(Submitted::Rejected { error, packets });
        }
        let mut packets = packets;
        for pkt in packets.iter_mut() {
            pkt.reset_status();
            pkt.dlen = 0;
        }

        if !opts.contains(DmaOpts::NO_REAP) {
            side.reap(self.counters());
        }
        side.ready.append(&mut packets);
        if !opts.contains(DmaOpts::NO_SCHEDULE) {
            side.schedule(&self.dev, self.index);
        }
        wake(side, &self.rx_cond);

        Ok(Submitted::Queued)
    }

    /// Take up to `count` (all if `None`) received packets from `recv`.
    pub fn rx_recv(&self, opts: DmaOpts, count: Option<usize>) -> Result<Collected> {
        let mut guard = self.rx.lock()?;
        let side = guard.as_mut().ok_or(ConfigError::NotOpen)?;
        let started = self.is_started();

        if started && !opts.contains(DmaOpts::NO_REAP) {
            side.reap(self.counters());
        }
        let packets = side.recv.remove_head_run(count.unwrap_or(usize::MAX));
        if started && !opts.contains(DmaOpts::NO_SCHEDULE) {
            side.schedule(&self.dev, self.index);
        }
        if started {
            wake(side, &self.rx_cond);
        } else {
            self.counters().stopped_call();
        }

        Ok(Collected {
            packets,
            stopped: !started,
        })
    }

    /// RX queue counts
    pub fn rx_count(&self) -> Result<RxCount> {
        let guard = self.rx.lock()?;
        Ok(guard.as_ref().ok_or(ConfigError::NotOpen)?.counts())
    }

    /// Block until `(ready + rx_sched <= ready_max) op (recv >= recv_min)`.
    ///
    /// Same outcomes as [`tx_wait`](Self::tx_wait), for the RX side.
    pub fn rx_wait(
        &self,
        ready_max: usize,
        op: WaitOp,
        recv_min: usize,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let cond = WaitCondition::new(ready_max, op, recv_min);
        let result = wait_on(&self.rx, &self.rx_cond, || self.is_started(), cond, timeout);
        self.note_wait(&result);
        result
    }

    fn note_wait(&self, result: &Result<WaitOutcome>) {
        match result {
            Err(Error::Io(IoError::WaiterBusy)) => self.counters().busy_waiter(),
            Err(Error::Io(IoError::Timeout)) => self.counters().timeout(),
            Ok(WaitOutcome::Stopped) => self.counters().stopped_call(),
            _ => {}
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Snapshot of this channel's counters
    pub fn stats(&self) -> ChannelStats {
        self.counters().snapshot()
    }

    /// Reset this channel's counters
    pub fn clear_stats(&self) {
        self.counters().clear();
    }

    // =========================================================================
    // Deferred work
    // =========================================================================

    /// Handle completions flagged by the interrupt handler: acknowledge and
    /// re-enable the interrupt if configured, reap, reschedule and release a
    /// waiter whose condition now holds.
    pub(crate) fn process_work(&self, work: ChannelWork) -> Result<()> {
        self.counters().work();

        if work.contains(ChannelWork::RX) {
            let mut guard = self.rx.lock()?;
            if let Some(side) = guard.as_mut().filter(|_| self.is_started()) {
                let rearm = if side.cfg.rx_irq { DMACTRL_RI } else { 0 };
                self.dev.modify_dma_ctrl(self.index, |ctrl| ctrl | DMACTRL_PR | rearm);
                let reaped = side.reap(self.counters());
                let scheduled = side.schedule(&self.dev, self.index);
                wake(side, &self.rx_cond);
                debug!("spw{}: dma{} rx reaped {reaped} scheduled {scheduled}", self.dev.index, self.index);
            }
        }

        if work.contains(ChannelWork::TX) {
            let mut guard = self.tx.lock()?;
            if let Some(side) = guard.as_mut().filter(|_| self.is_started()) {
                let rearm = if side.cfg.tx_irq { DMACTRL_TI } else { 0 };
                self.dev.modify_dma_ctrl(self.index, |ctrl| ctrl | DMACTRL_PS | rearm);
                let reaped = side.reap(self.counters());
                let scheduled = side.schedule(&self.dev, self.index);
                wake(side, &self.tx_cond);
                debug!("spw{}: dma{} tx reaped {reaped} scheduled {scheduled}", self.dev.index, self.index);
            }
        }

        Ok(())
    }

    pub(crate) fn note_dma_error(&self) {
        self.counters().dma_error();
    }
}

#[cfg(test)]
impl DmaChannel {
    pub(crate) fn with_rx<R>(&self, f: impl FnOnce(&mut RxSide) -> R) -> R {
        f(self.rx.lock().unwrap().as_mut().unwrap())
    }

    pub(crate) fn with_tx<R>(&self, f: impl FnOnce(&mut TxSide) -> R) -> R {
        f(self.tx.lock().unwrap().as_mut().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::register::dma::dmactrl_offset;
    use crate::testing::{TestBed, complete_rx, complete_tx};
    use std::thread;

    fn started(bed: &TestBed, index: usize) -> Arc<DmaChannel> {
        let ch = bed.device.dma_open(index).unwrap();
        ch.start().unwrap();
        ch
    }

    fn rx_buffers(range: core::ops::Range<u64>) -> PacketQueue {
        range.map(|id| Packet::rx(id, 1024)).collect()
    }

    fn tx_packets(range: core::ops::Range<u64>) -> PacketQueue {
        range
            .map(|id| Packet::tx(id, vec![0x01, 0x02], vec![id as u8; 16]))
            .collect()
    }

    fn ids(queue: &PacketQueue) -> Vec<u64> {
        queue.iter().map(|p| p.id).collect()
    }

    /// Wait until a waiter has armed the TX or RX gate
    fn until_armed(ch: &DmaChannel, rx: bool) {
        loop {
            let idle = if rx {
                ch.with_rx(|side| side.gate.is_idle())
            } else {
                ch.with_tx(|side| side.gate.is_idle())
            };
            if !idle {
                return;
            }
            thread::yield_now();
        }
    }

    #[test]
    fn irq_countdown_every_third() {
        let mut irq = IrqCountdown::new(3);
        let got: Vec<bool> = [false, true, false, false, false, false]
            .into_iter()
            .map(|req| irq.next(req))
            .collect();
        assert_eq!(got, vec![false, true, true, false, false, true]);

        let mut off = IrqCountdown::new(0);
        assert!(!(0..1000).any(|_| off.next(false)));
    }

    #[test]
    fn start_programs_hardware() {
        let bed = TestBed::new(1);
        let ch = bed.device.dma_open(0).unwrap();
        ch.set_config(DmaConfig::new().with_rx_max_len(512).with_channel_addr(0x40, 0x0F))
            .unwrap();
        ch.start().unwrap();

        let regs = bed.device.shared.dma(0);
        assert_eq!(regs.rxmax(), 512);
        assert_eq!(regs.addr(), 0x0F40);
        assert_ne!(regs.rxdesc(), 0);
        assert_ne!(regs.txdesc(), 0);
        let ctrl = bed.regs.get(dmactrl_offset(0));
        assert_eq!(ctrl & (DMACTRL_NS | DMACTRL_EN), DMACTRL_NS | DMACTRL_EN);
        assert_eq!(ctrl & DMACTRL_IRQ_MASK, DMACTRL_IRQ_MASK);
        // Nothing to do yet
        assert_eq!(ctrl & (DMACTRL_TE | DMACTRL_RE), 0);
    }

    #[test]
    fn irq_enables_follow_config() {
        let bed = TestBed::new(1);
        let ch = bed.device.dma_open(0).unwrap();
        ch.set_config(DmaConfig::new().with_irq_enables(false, false, true))
            .unwrap();
        ch.start().unwrap();
        assert_eq!(bed.regs.get(dmactrl_offset(0)) & DMACTRL_IRQ_MASK, DMACTRL_AI);

        // Polled: completions are acknowledged and reaped but never re-armed
        assert!(ch.rx_prepare(DmaOpts::empty(), rx_buffers(0..2)).unwrap().is_queued());
        assert_eq!(complete_rx(&ch, &bed.regs, 1, 8), 1);
        ch.process_work(ChannelWork::RX).unwrap();

        let ctrl = bed.regs.get(dmactrl_offset(0));
        assert_eq!(ctrl & (DMACTRL_RI | DMACTRL_PR), 0);
        assert_eq!(ch.rx_count().unwrap(), RxCount { ready: 0, sched: 1, recv: 1 });

        ch.stop().unwrap();
        ch.set_config(DmaConfig::new().with_irq_enables(true, false, false))
            .unwrap();
        ch.start().unwrap();
        assert_eq!(bed.regs.get(dmactrl_offset(0)) & DMACTRL_IRQ_MASK, DMACTRL_RI);
    }

    #[test]
    fn config_changes_need_stopped_channel() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert_eq!(
            ch.set_config(DmaConfig::new()),
            Err(ConfigError::ChannelRunning.into())
        );
        ch.stop().unwrap();
        ch.set_config(DmaConfig::new().with_irq_both(true)).unwrap();
        assert!(ch.config().unwrap().irq_both);
        assert_eq!(
            ch.set_config(DmaConfig::new().with_rx_max_len(0)),
            Err(ConfigError::InvalidArgument.into())
        );
    }

    #[test]
    fn rx_receive_scenario() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);

        assert!(ch.rx_prepare(DmaOpts::empty(), rx_buffers(0..10)).unwrap().is_queued());
        assert_eq!(ch.rx_count().unwrap(), RxCount { ready: 0, sched: 10, recv: 0 });
        assert_eq!(ch.with_rx(|side| side.ring.enabled_count()), 10);

        assert_eq!(complete_rx(&ch, &bed.regs, 3, 200), 3);
        let got = ch.rx_recv(DmaOpts::empty(), None).unwrap();

        assert!(!got.stopped);
        assert_eq!(ids(&got.packets), vec![0, 1, 2]);
        assert!(got.packets.iter().all(|p| p.dlen == 200 && p.is_done()));
        assert_eq!(ch.rx_count().unwrap(), RxCount { ready: 0, sched: 7, recv: 0 });
    }

    #[test]
    fn tx_send_scenario() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);

        assert!(ch.tx_send(DmaOpts::empty(), tx_packets(0..5)).unwrap().is_queued());
        assert_eq!(ch.tx_count().unwrap(), TxCount { send: 0, sched: 5, sent: 0 });

        complete_tx(&ch, &bed.regs, 5);
        let got = ch.tx_reclaim(DmaOpts::empty(), None).unwrap();

        assert_eq!(ids(&got.packets), vec![0, 1, 2, 3, 4]);
        assert!(got.packets.iter().all(|p| p.is_done() && !p.has_error()));
        assert_eq!(ch.tx_count().unwrap(), TxCount::default());
    }

    #[test]
    fn stop_drains_with_done_flag() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);

        assert!(ch.tx_send(DmaOpts::empty(), tx_packets(0..2)).unwrap().is_queued());
        assert!(ch.tx_send(DmaOpts::NO_SCHEDULE, tx_packets(2..5)).unwrap().is_queued());
        assert_eq!(ch.tx_count().unwrap(), TxCount { send: 3, sched: 2, sent: 0 });
        complete_tx(&ch, &bed.regs, 2);

        ch.stop().unwrap();
        let got = ch.tx_reclaim(DmaOpts::empty(), None).unwrap();

        assert!(got.stopped);
        let flags: Vec<_> = got.packets.iter().map(|p| (p.id, p.is_done())).collect();
        assert_eq!(
            flags,
            vec![(0, true), (1, true), (2, false), (3, false), (4, false)]
        );
        let ctrl = bed.regs.get(dmactrl_offset(0));
        assert_eq!(ctrl & (DMACTRL_TE | DMACTRL_RE | DMACTRL_IRQ_MASK), 0);
    }

    #[test]
    fn second_waiter_is_busy() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert!(ch.rx_prepare(DmaOpts::empty(), rx_buffers(0..4)).unwrap().is_queued());

        let first = {
            let ch = ch.clone();
            thread::spawn(move || ch.rx_wait(0, WaitOp::And, 4, None))
        };
        until_armed(&ch, true);

        assert_eq!(
            ch.rx_wait(0, WaitOp::And, 1, None),
            Err(IoError::WaiterBusy.into())
        );
        assert_eq!(ch.stats().busy_waiters, 1);

        ch.stop().unwrap();
        assert_eq!(first.join().unwrap(), Ok(WaitOutcome::Stopped));
    }

    #[test]
    fn wait_and_needs_both_halves() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert!(ch.tx_send(DmaOpts::empty(), tx_packets(0..3)).unwrap().is_queued());

        let waiter = {
            let ch = ch.clone();
            thread::spawn(move || ch.tx_wait(0, WaitOp::And, 3, None))
        };
        until_armed(&ch, false);

        // Two of three sent: neither half holds yet
        complete_tx(&ch, &bed.regs, 2);
        ch.tx_reclaim(DmaOpts::empty(), Some(0)).unwrap();
        assert!(!waiter.is_finished());

        complete_tx(&ch, &bed.regs, 1);
        ch.tx_reclaim(DmaOpts::empty(), Some(0)).unwrap();
        assert_eq!(waiter.join().unwrap(), Ok(WaitOutcome::Satisfied));
        assert_eq!(ch.tx_count().unwrap().sent, 3);
    }

    #[test]
    fn wait_times_out() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert!(ch.tx_send(DmaOpts::empty(), tx_packets(0..1)).unwrap().is_queued());

        assert_eq!(
            ch.tx_wait(0, WaitOp::And, 1, Some(Duration::from_millis(10))),
            Err(IoError::Timeout.into())
        );
        assert_eq!(ch.stats().timeouts, 1);
        // Gate is free again
        assert_eq!(
            ch.tx_wait(usize::MAX, WaitOp::Or, 0, None),
            Ok(WaitOutcome::Satisfied)
        );
    }

    #[test]
    fn stopped_channel_hands_packets_back() {
        let bed = TestBed::new(1);
        let ch = bed.device.dma_open(0).unwrap();

        match ch.tx_send(DmaOpts::empty(), tx_packets(0..2)).unwrap() {
            Submitted::Stopped(back) => assert_eq!(ids(&back), vec![0, 1]),
            other => panic!("expected stopped, got {other:?}"),
        }
        assert_eq!(
            ch.rx_wait(0, WaitOp::And, 1, None),
            Ok(WaitOutcome::Stopped)
        );
        assert!(ch.rx_recv(DmaOpts::empty(), None).unwrap().stopped);
        assert_eq!(ch.stats().stopped_calls, 3);
    }

    #[test]
    fn small_rx_buffer_rejects_whole_batch() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        let bufs: PacketQueue =
            vec![Packet::rx(0, 1024), Packet::rx(1, 16), Packet::rx(2, 1024)].into();

        match ch.rx_prepare(DmaOpts::empty(), bufs).unwrap() {
            Submitted::Rejected { error, packets } => {
                assert_eq!(error, ConfigError::InvalidArgument);
                assert_eq!(ids(&packets), vec![0, 1, 2]);
                let sizes: Vec<usize> = packets.iter().map(|p| p.data.len()).collect();
                assert_eq!(sizes, vec![1024, 16, 1024]);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(ch.rx_count().unwrap(), RxCount::default());
        assert_eq!(ch.with_rx(|side| side.ring.enabled_count()), 0);
    }

    #[test]
    fn bad_tx_packet_rejects_batch_untouched() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        let mut pkts = tx_packets(0..3);
        for pkt in pkts.iter_mut() {
            pkt.flags |= PktFlags::DONE;
        }
        pkts.push_back(Packet::tx(3, vec![0; 300], vec![]));

        match ch.tx_send(DmaOpts::empty(), pkts).unwrap() {
            Submitted::Rejected { error, packets } => {
                assert_eq!(error, ConfigError::InvalidArgument);
                assert_eq!(ids(&packets), vec![0, 1, 2, 3]);
                // Status of the valid packets was not reset
                assert!(packets.iter().take(3).all(Packet::is_done));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(ch.tx_count().unwrap(), TxCount::default());
    }

    #[test]
    fn no_reap_leaves_completions_on_ring() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert!(ch.tx_send(DmaOpts::empty(), tx_packets(0..2)).unwrap().is_queued());
        complete_tx(&ch, &bed.regs, 2);

        let got = ch.tx_reclaim(DmaOpts::NO_REAP, None).unwrap();
        assert!(got.packets.is_empty());
        assert_eq!(ch.tx_count().unwrap().sched, 2);

        // Reaping twice with nothing new changes nothing
        assert_eq!(ch.tx_reclaim(DmaOpts::empty(), None).unwrap().packets.len(), 2);
        assert_eq!(ch.tx_reclaim(DmaOpts::empty(), None).unwrap().packets.len(), 0);
        assert_eq!(ch.tx_count().unwrap(), TxCount::default());
    }

    #[test]
    fn ring_overflow_waits_in_send() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert!(ch.tx_send(DmaOpts::empty(), tx_packets(0..70)).unwrap().is_queued());
        assert_eq!(ch.tx_count().unwrap(), TxCount { send: 6, sched: 64, sent: 0 });
        assert_eq!(ch.with_tx(|side| side.ring.wrap_count()), 1);

        complete_tx(&ch, &bed.regs, 10);
        let got = ch.tx_reclaim(DmaOpts::empty(), Some(4)).unwrap();
        assert_eq!(ids(&got.packets), vec![0, 1, 2, 3]);
        assert_eq!(ch.tx_count().unwrap(), TxCount { send: 0, sched: 60, sent: 6 });
    }

    #[test]
    fn conservation_and_order_across_many_rounds() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        let mut submitted = 0u64;
        let mut collected = Vec::new();

        for round in 0..20u64 {
            let n = 7 + round % 5;
            let sub = ch.tx_send(DmaOpts::empty(), tx_packets(submitted..submitted + n));
            assert!(sub.unwrap().is_queued());
            submitted += n;

            complete_tx(&ch, &bed.regs, 5);
            let got = ch.tx_reclaim(DmaOpts::empty(), Some(3)).unwrap();
            collected.extend(got.packets.iter().map(|p| p.id));

            let c = ch.tx_count().unwrap();
            assert_eq!((c.send + c.sched + c.sent) as u64, submitted - collected.len() as u64);
        }

        ch.stop().unwrap();
        let rest = ch.tx_reclaim(DmaOpts::empty(), None).unwrap();
        collected.extend(rest.packets.iter().map(|p| p.id));
        assert_eq!(collected, (0..submitted).collect::<Vec<_>>());
    }

    #[test]
    fn rx_conservation_and_order_across_many_rounds() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        let mut supplied = 0u64;
        let mut collected = Vec::new();

        for round in 0..20u64 {
            let n = 9 + round % 4;
            let sub = ch.rx_prepare(DmaOpts::empty(), rx_buffers(supplied..supplied + n));
            assert!(sub.unwrap().is_queued());
            supplied += n;

            complete_rx(&ch, &bed.regs, 6, 64);
            let got = ch.rx_recv(DmaOpts::empty(), Some(4)).unwrap();
            assert!(got.packets.iter().all(|p| p.is_done() && p.dlen == 64));
            collected.extend(got.packets.iter().map(|p| p.id));

            let c = ch.rx_count().unwrap();
            assert_eq!((c.ready + c.sched + c.recv) as u64, supplied - collected.len() as u64);
        }

        ch.stop().unwrap();
        let rest = ch.rx_recv(DmaOpts::empty(), None).unwrap();
        collected.extend(rest.packets.iter().map(|p| p.id));
        assert_eq!(collected, (0..supplied).collect::<Vec<_>>());
        assert_eq!(ch.rx_count().unwrap(), RxCount::default());
    }

    #[test]
    fn stop_is_idempotent_and_close_requires_it() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert_eq!(ch.close(), Err(ConfigError::ChannelRunning.into()));

        ch.stop().unwrap();
        let writes = bed.regs.write_count();
        ch.stop().unwrap();
        assert_eq!(bed.regs.write_count(), writes);

        ch.close().unwrap();
        assert_eq!(ch.close(), Err(ConfigError::NotOpen.into()));
        assert_eq!(ch.start(), Err(ConfigError::NotOpen.into()));
        assert!(bed.device.dma_open(0).is_ok());
    }

    #[test]
    fn restart_after_stop_reuses_ring() {
        let bed = TestBed::new(1);
        let ch = started(&bed, 0);
        assert!(ch.rx_prepare(DmaOpts::empty(), rx_buffers(0..5)).unwrap().is_queued());
        ch.stop().unwrap();
        let back = ch.rx_recv(DmaOpts::empty(), None).unwrap();
        assert_eq!(back.packets.len(), 5);
        assert!(back.packets.iter().all(|p| !p.is_done()));

        ch.start().unwrap();
        assert!(ch.rx_prepare(DmaOpts::empty(), back.packets).unwrap().is_queued());
        assert_eq!(ch.with_rx(|side| side.ring.tail_index()), 0);
        assert_eq!(complete_rx(&ch, &bed.regs, 5, 8), 5);
        assert_eq!(ch.rx_recv(DmaOpts::empty(), None).unwrap().packets.len(), 5);
    }
}
