//! Driver statistics
//!
//! Counters are plain relaxed atomics so the interrupt handler can bump them
//! without taking a lock. [`ChannelStats`] and [`DeviceStats`] are the
//! copyable snapshots handed to callers.

use core::sync::atomic::{AtomicU32, Ordering};

#[inline]
fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn add(counter: &AtomicU32, n: usize) {
    if n > 0 {
        counter.fetch_add(n as u32, Ordering::Relaxed);
    }
}

#[inline]
fn load(counter: &AtomicU32) -> u32 {
    counter.load(Ordering::Relaxed)
}

/// Snapshot of one DMA channel's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStats {
    /// Interrupts that produced work for this channel
    pub irqs: u32,
    /// Packets received (reaped from the RX ring)
    pub rx_packets: u32,
    /// Received packets that were truncated
    pub rx_truncated: u32,
    /// Received packets terminated by EEP
    pub rx_eep: u32,
    /// Received packets with a header or data CRC error
    pub rx_crc_errors: u32,
    /// Packets transmitted (reaped from the TX ring)
    pub tx_packets: u32,
    /// Transmitted packets hit by a link error
    pub tx_link_errors: u32,
    /// Work items processed by the worker
    pub work_items: u32,
    /// Packet-movement calls made while the channel was stopped
    pub stopped_calls: u32,
    /// Waits rejected because another waiter was present
    pub busy_waiters: u32,
    /// Waits that timed out
    pub timeouts: u32,
    /// DMA (AHB) errors
    pub dma_errors: u32,
}

/// Live counters for one channel
#[derive(Debug, Default)]
pub(crate) struct ChannelCounters {
    irqs: AtomicU32,
    rx_packets: AtomicU32,
    rx_truncated: AtomicU32,
    rx_eep: AtomicU32,
    rx_crc_errors: AtomicU32,
    tx_packets: AtomicU32,
    tx_link_errors: AtomicU32,
    work_items: AtomicU32,
    stopped_calls: AtomicU32,
    busy_waiters: AtomicU32,
    timeouts: AtomicU32,
    dma_errors: AtomicU32,
}

impl ChannelCounters {
    pub(crate) fn irq(&self) {
        bump(&self.irqs);
    }

    pub(crate) fn rx_reaped(&self, n: usize) {
        add(&self.rx_packets, n);
    }

    pub(crate) fn rx_truncated(&self) {
        bump(&self.rx_truncated);
    }

    pub(crate) fn rx_eep(&self) {
        bump(&self.rx_eep);
    }

    pub(crate) fn rx_crc_error(&self) {
        bump(&self.rx_crc_errors);
    }

    pub(crate) fn tx_reaped(&self, n: usize) {
        add(&self.tx_packets, n);
    }

    pub(crate) fn tx_link_error(&self) {
        bump(&self.tx_link_errors);
    }

    pub(crate) fn work(&self) {
        bump(&self.work_items);
    }

    pub(crate) fn stopped_call(&self) {
        bump(&self.stopped_calls);
    }

    pub(crate) fn busy_waiter(&self) {
        bump(&self.busy_waiters);
    }

    pub(crate) fn timeout(&self) {
        bump(&self.timeouts);
    }

    pub(crate) fn dma_error(&self) {
        bump(&self.dma_errors);
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            irqs: load(&self.irqs),
            rx_packets: load(&self.rx_packets),
            rx_truncated: load(&self.rx_truncated),
            rx_eep: load(&self.rx_eep),
            rx_crc_errors: load(&self.rx_crc_errors),
            tx_packets: load(&self.tx_packets),
            tx_link_errors: load(&self.tx_link_errors),
            work_items: load(&self.work_items),
            stopped_calls: load(&self.stopped_calls),
            busy_waiters: load(&self.busy_waiters),
            timeouts: load(&self.timeouts),
            dma_errors: load(&self.dma_errors),
        }
    }

    pub(crate) fn clear(&self) {
        for counter in [
            &self.irqs,
            &self.rx_packets,
            &self.rx_truncated,
            &self.rx_eep,
            &self.rx_crc_errors,
            &self.tx_packets,
            &self.tx_link_errors,
            &self.work_items,
            &self.stopped_calls,
            &self.busy_waiters,
            &self.timeouts,
            &self.dma_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of device-level counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceStats {
    /// Interrupt handler invocations
    pub irqs: u32,
    /// Credit errors
    pub credit_errors: u32,
    /// Escape errors
    pub escape_errors: u32,
    /// Disconnect errors
    pub disconnect_errors: u32,
    /// Parity errors
    pub parity_errors: u32,
    /// Write synchronization errors
    pub write_sync_errors: u32,
    /// Invalid address errors
    pub invalid_address: u32,
    /// Early EOP/EEP errors
    pub early_eop: u32,
    /// Link errors of any kind
    pub link_errors: u32,
    /// Links disabled because of a link error
    pub link_shutdowns: u32,
    /// Work messages dropped because the work queue was full
    pub dropped_work: u32,
}

/// Live device counters
#[derive(Debug, Default)]
pub(crate) struct DeviceCounters {
    irqs: AtomicU32,
    credit_errors: AtomicU32,
    escape_errors: AtomicU32,
    disconnect_errors: AtomicU32,
    parity_errors: AtomicU32,
    write_sync_errors: AtomicU32,
    invalid_address: AtomicU32,
    early_eop: AtomicU32,
    link_errors: AtomicU32,
    link_shutdowns: AtomicU32,
    dropped_work: AtomicU32,
}

impl DeviceCounters {
    pub(crate) fn irq(&self) {
        bump(&self.irqs);
    }

    /// Count each link error kind present in `errors`
    pub(crate) fn link_errors(&self, errors: crate::driver::config::LinkErrors) {
        use crate::driver::config::LinkErrors;

        let kinds = [
            (LinkErrors::CREDIT, &self.credit_errors),
            (LinkErrors::ESCAPE, &self.escape_errors),
            (LinkErrors::DISCONNECT, &self.disconnect_errors),
            (LinkErrors::PARITY, &self.parity_errors),
            (LinkErrors::WRITE_SYNC, &self.write_sync_errors),
            (LinkErrors::INVALID_ADDRESS, &self.invalid_address),
            (LinkErrors::EARLY_EOP, &self.early_eop),
        ];
        for (kind, counter) in kinds {
            if errors.contains(kind) {
                bump(counter);
                bump(&self.link_errors);
            }
        }
    }

    pub(crate) fn link_shutdown(&self) {
        bump(&self.link_shutdowns);
    }

    pub(crate) fn dropped_work(&self) {
        bump(&self.dropped_work);
    }

    pub(crate) fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            irqs: load(&self.irqs),
            credit_errors: load(&self.credit_errors),
            escape_errors: load(&self.escape_errors),
            disconnect_errors: load(&self.disconnect_errors),
            parity_errors: load(&self.parity_errors),
            write_sync_errors: load(&self.write_sync_errors),
            invalid_address: load(&self.invalid_address),
            early_eop: load(&self.early_eop),
            link_errors: load(&self.link_errors),
            link_shutdowns: load(&self.link_shutdowns),
            dropped_work: load(&self.dropped_work),
        }
    }

    pub(crate) fn clear(&self) {
        for counter in [
            &self.irqs,
            &self.credit_errors,
            &self.escape_errors,
            &self.disconnect_errors,
            &self.parity_errors,
            &self.write_sync_errors,
            &self.invalid_address,
            &self.early_eop,
            &self.link_errors,
            &self.link_shutdowns,
            &self.dropped_work,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::config::LinkErrors;

    #[test]
    fn channel_counters_snapshot_and_clear() {
        let c = ChannelCounters::default();
        c.rx_reaped(3);
        c.rx_reaped(0);
        c.tx_reaped(2);
        c.busy_waiter();
        c.timeout();

        let s = c.snapshot();
        assert_eq!(s.rx_packets, 3);
        assert_eq!(s.tx_packets, 2);
        assert_eq!(s.busy_waiters, 1);
        assert_eq!(s.timeouts, 1);

        c.clear();
        assert_eq!(c.snapshot(), ChannelStats::default());
    }

    #[test]
    fn link_errors_counted_per_kind() {
        let d = DeviceCounters::default();
        d.link_errors(LinkErrors::PARITY | LinkErrors::DISCONNECT);
        d.link_errors(LinkErrors::PARITY);

        let s = d.snapshot();
        assert_eq!(s.parity_errors, 2);
        assert_eq!(s.disconnect_errors, 1);
        assert_eq!(s.credit_errors, 0);
        assert_eq!(s.link_errors, 3);

        d.clear();
        assert_eq!(d.snapshot(), DeviceStats::default());
    }
}
