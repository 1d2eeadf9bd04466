//! Testing utilities and mock implementations
//!
//! An in-memory register block that models the core's write-one-to-clear,
//! self-clearing and read-only bits, a counting delay, and helpers that play
//! the part of the DMA engine by completing descriptors.
//!
//! Only available when running `cargo test`.

#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core)]

use core::cell::Cell;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use embedded_hal::delay::DelayNs;

use crate::dma::descriptor::bits::{rxd0, txd0};
use crate::dma::descriptor::{Descriptor, RxDescriptor, TxDescriptor};
use crate::dma::{DmaChannel, IdentityTranslation};
use crate::dma::translate::AddressTranslate;
use crate::driver::config::{DmaConfig, RegistryConfig};
use crate::driver::device::{Device, DeviceShared};
use crate::driver::registry::Registry;
use crate::driver::work::{WorkItem, WorkMessage, Worker, work_queue};
use crate::internal::register::RegisterAccess;
use crate::internal::register::dma::{
    DMACTRL_PR, DMACTRL_PS, DMACTRL_RX, DMACTRL_W1C, dmactrl_offset,
};
use crate::internal::register::node::{
    CTRL_ID, CTRL_NCH_SHIFT, CTRL_OFFSET, CTRL_RA, CTRL_RC, CTRL_RS, CTRL_TI, STATUS_AP,
    STATUS_LS_MASK, STATUS_OFFSET, STATUS_W1C,
};

// =============================================================================
// Mock Register Block
// =============================================================================

#[derive(Debug, Default)]
struct MockState {
    values: HashMap<usize, u32>,
    w1c: HashMap<usize, u32>,
    self_clear: HashMap<usize, u32>,
    read_only: HashMap<usize, u32>,
    last: HashMap<usize, u32>,
    writes: usize,
}

/// In-memory register block.
///
/// With no rules configured every register is plain read/write storage.
/// [`MockRegisters::spw`] adds the core's bit semantics.
#[derive(Debug, Default)]
pub struct MockRegisters {
    state: Mutex<MockState>,
}

impl MockRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A core with `channels` DMA channels, one port and interrupt-code
    /// distribution, optionally with RMAP.
    pub fn spw(channels: usize, rmap: bool) -> Self {
        let regs = Self::new();
        let mut caps = CTRL_ID | (((channels as u32) - 1) << CTRL_NCH_SHIFT);
        if rmap {
            caps |= CTRL_RA | CTRL_RC;
        }
        regs.set(CTRL_OFFSET, caps);
        {
            let mut st = regs.state.lock().unwrap();
            st.read_only.insert(CTRL_OFFSET, caps);
            st.self_clear.insert(CTRL_OFFSET, CTRL_RS | CTRL_TI);
            st.w1c.insert(STATUS_OFFSET, STATUS_W1C);
            st.read_only.insert(STATUS_OFFSET, STATUS_AP | STATUS_LS_MASK);
            for ch in 0..channels {
                st.w1c.insert(dmactrl_offset(ch), DMACTRL_W1C);
                st.read_only.insert(dmactrl_offset(ch), DMACTRL_RX);
            }
        }
        regs
    }

    /// Store a value directly, bypassing write semantics
    pub fn set(&self, offset: usize, value: u32) {
        self.state.lock().unwrap().values.insert(offset, value);
    }

    /// Set bits as hardware would
    pub fn raise(&self, offset: usize, bits: u32) {
        *self
            .state
            .lock()
            .unwrap()
            .values
            .entry(offset)
            .or_default() |= bits;
    }

    pub fn get(&self, offset: usize) -> u32 {
        self.read(offset)
    }

    /// Last value written to `offset`, before any bit semantics applied
    pub fn last_write(&self, offset: usize) -> Option<u32> {
        self.state.lock().unwrap().last.get(&offset).copied()
    }

    /// Total number of register writes
    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// Replace the bits of `offset` that hardware clears right after a write
    pub fn set_self_clear(&self, offset: usize, mask: u32) {
        self.state.lock().unwrap().self_clear.insert(offset, mask);
    }
}

impl RegisterAccess for MockRegisters {
    fn read(&self, offset: usize) -> u32 {
        self.state
            .lock()
            .unwrap()
            .values
            .get(&offset)
            .copied()
            .unwrap_or(0)
    }

    fn write(&self, offset: usize, value: u32) {
        let mut st = self.state.lock().unwrap();
        let old = st.values.get(&offset).copied().unwrap_or(0);
        let w1c = st.w1c.get(&offset).copied().unwrap_or(0);
        let ro = st.read_only.get(&offset).copied().unwrap_or(0);
        let sc = st.self_clear.get(&offset).copied().unwrap_or(0);

        let new = (value & !(w1c | ro | sc)) | (old & w1c & !value) | (old & ro);
        st.values.insert(offset, new);
        st.last.insert(offset, value);
        st.writes += 1;
    }
}

// =============================================================================
// Mock Delay
// =============================================================================

/// Delay that returns at once and adds up what was asked for
#[derive(Debug, Default)]
pub struct MockDelay {
    total_ns: Cell<u64>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_us(&self) -> u32 {
        (self.total_ns.get() / 1_000) as u32
    }
}

impl DelayNs for &MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.set(self.total_ns.get() + u64::from(ns));
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Work sink that keeps every message
#[derive(Debug, Default)]
pub struct RecordingDispatch {
    pub messages: Mutex<Vec<WorkMessage>>,
}

impl crate::driver::work::WorkDispatch for RecordingDispatch {
    fn try_send(&self, msg: WorkMessage) -> bool {
        self.messages.lock().unwrap().push(msg);
        true
    }
}

/// Translator that can reach no buffer at all
#[derive(Debug, Default)]
pub struct NoDmaWindow;

impl AddressTranslate for NoDmaWindow {
    fn to_dma(&self, _cpu_addr: usize) -> Option<u32> {
        None
    }
}

/// Keeps the low 32 address bits and adds `offset`, so host heap buffers
/// count as reachable
#[derive(Debug, Default)]
pub struct LowBitsTranslation {
    pub offset: u32,
}

impl AddressTranslate for LowBitsTranslation {
    fn to_dma(&self, cpu_addr: usize) -> Option<u32> {
        Some((cpu_addr as u32).wrapping_add(self.offset))
    }
}

/// Bare device state for exercising one channel side
pub fn test_device() -> (DeviceShared, Arc<MockRegisters>) {
    test_device_with(Arc::new(IdentityTranslation))
}

pub fn test_device_with(translator: Arc<dyn AddressTranslate>) -> (DeviceShared, Arc<MockRegisters>) {
    let regs = Arc::new(MockRegisters::spw(4, true));
    let dev = DeviceShared::new(
        0,
        regs.clone(),
        translator,
        Arc::new(RecordingDispatch::default()),
    );
    (dev, regs)
}

/// Registry with one open device and its work queue
pub struct TestBed {
    pub registry: Arc<Registry>,
    pub device: Arc<Device>,
    pub regs: Arc<MockRegisters>,
    pub queue: Receiver<WorkItem>,
    pub sender: SyncSender<WorkItem>,
}

impl TestBed {
    /// Device with `channels` channels and RMAP
    pub fn new(channels: usize) -> Self {
        Self::build(channels, true, 64)
    }

    pub fn with_caps(channels: usize, rmap: bool) -> Self {
        Self::build(channels, rmap, 64)
    }

    pub fn with_queue_depth(channels: usize, depth: usize) -> Self {
        Self::build(channels, true, depth)
    }

    fn build(channels: usize, rmap: bool, depth: usize) -> Self {
        let (sender, queue) = work_queue(depth);
        let registry = Arc::new(Registry::new(
            RegistryConfig::new().with_dma(DmaConfig::new()),
            Arc::new(sender.clone()),
            Arc::new(IdentityTranslation),
        ));
        let regs = Arc::new(MockRegisters::spw(channels, rmap));
        let index = registry.add_device(regs.clone()).unwrap();
        let device = registry.open(index).unwrap();
        Self {
            registry,
            device,
            regs,
            queue,
            sender,
        }
    }

    /// Next message the interrupt handler posted, if any
    pub fn next_message(&self) -> Option<WorkMessage> {
        match self.queue.try_recv().ok()? {
            WorkItem::Device(msg) => Some(msg),
            WorkItem::Terminate => None,
        }
    }

    /// Worker for calling `handle` directly; its own queue is never fed
    pub fn worker(&self) -> Worker {
        let (_sender, queue) = work_queue(1);
        Worker::new(self.registry.clone(), queue)
    }
}

// =============================================================================
// DMA Engine Simulation
// =============================================================================

/// Complete an RX slot: `len` bytes received with extra status `bits`
pub fn complete_rx_slot(desc: &RxDescriptor, len: usize, bits: u32) {
    let wrap = desc.raw_ctrl() & rxd0::WR;
    desc.set_raw_ctrl(wrap | (len as u32 & rxd0::LEN_MASK) | bits);
}

/// Complete a TX slot, optionally with a link error
pub fn complete_tx_slot(desc: &TxDescriptor, link_err: bool) {
    let mut ctrl = desc.raw_ctrl() & !txd0::EN;
    if link_err {
        ctrl |= txd0::LE;
    }
    desc.set_raw_ctrl(ctrl);
}

/// Receive `n` packets of `len` bytes into the oldest enabled slots and
/// raise PR. Returns how many slots were completed.
pub fn complete_rx(ch: &DmaChannel, regs: &MockRegisters, n: usize, len: usize) -> usize {
    let done = ch.with_rx(|side| {
        let ring = &side.ring;
        let pending = (0..ring.used())
            .map(|i| ring.descriptor(ring.tail_index() + i))
            .filter(|desc| desc.is_enabled())
            .take(n);
        let mut done = 0;
        for desc in pending {
            complete_rx_slot(desc, len, 0);
            done += 1;
        }
        done
    });
    if done > 0 {
        regs.raise(dmactrl_offset(ch.index()), DMACTRL_PR);
    }
    done
}

/// Send `n` packets from the oldest enabled slots and raise PS.
pub fn complete_tx(ch: &DmaChannel, regs: &MockRegisters, n: usize) -> usize {
    let done = ch.with_tx(|side| {
        let ring = &side.ring;
        let pending = (0..ring.used())
            .map(|i| ring.descriptor(ring.tail_index() + i))
            .filter(|desc| desc.is_enabled())
            .take(n);
        let mut done = 0;
        for desc in pending {
            complete_tx_slot(desc, false);
            done += 1;
        }
        done
    });
    if done > 0 {
        regs.raise(dmactrl_offset(ch.index()), DMACTRL_PS);
    }
    done
}
