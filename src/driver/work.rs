//! Deferred work
//!
//! The interrupt handler posts [`WorkMessage`]s to a bounded queue; a
//! [`Worker`] thread drains it and does everything that needs channel locks:
//! reaping, rescheduling, waking waiters and stopping channels after errors.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::{self, JoinHandle};

use bitflags::bitflags;
use log::{debug, info, warn};

use crate::driver::device::Device;
use crate::driver::registry::Registry;
use crate::internal::constants::MAX_DMA_CHANNELS;

bitflags! {
    /// Work the interrupt handler found for one channel
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelWork: u8 {
        /// Received packets to reap
        const RX = 1 << 0;
        /// Sent packets to reap
        const TX = 1 << 1;
        /// DMA error: stop the channel
        const ERROR = 1 << 2;
    }
}

/// Work for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkMessage {
    /// Registry index of the device
    pub device: usize,
    /// The link was disabled after an error; stop every channel
    pub shutdown: bool,
    /// Per-channel work
    pub channels: [ChannelWork; MAX_DMA_CHANNELS],
}

impl WorkMessage {
    /// Create an empty message for `device`
    pub const fn new(device: usize) -> Self {
        Self {
            device,
            shutdown: false,
            channels: [ChannelWork::empty(); MAX_DMA_CHANNELS],
        }
    }

    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        !self.shutdown && self.channels.iter().all(|w| w.is_empty())
    }
}

/// Item on the work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    /// Work for a device
    Device(WorkMessage),
    /// Stop the worker
    Terminate,
}

/// Sink the interrupt handler posts work into. Must never block.
pub trait WorkDispatch: Send + Sync {
    /// Post `msg`; returns `false` if it was dropped
    fn try_send(&self, msg: WorkMessage) -> bool;
}

impl WorkDispatch for SyncSender<WorkItem> {
    fn try_send(&self, msg: WorkMessage) -> bool {
        match SyncSender::try_send(self, WorkItem::Device(msg)) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Create a bounded work queue
pub fn work_queue(depth: usize) -> (SyncSender<WorkItem>, Receiver<WorkItem>) {
    sync_channel(depth)
}

/// Notable events the worker handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkEvent {
    /// The link was disabled after an error and all channels stopped
    LinkShutdown {
        /// Registry index of the device
        device: usize,
    },
    /// A channel was stopped after a DMA error
    DmaError {
        /// Registry index of the device
        device: usize,
        /// Channel number
        channel: usize,
    },
}

/// Callback for [`WorkEvent`]s
pub type EventHandler = Box<dyn Fn(WorkEvent) + Send>;

/// Work queue consumer
pub struct Worker {
    registry: Arc<Registry>,
    queue: Receiver<WorkItem>,
    on_event: Option<EventHandler>,
}

impl Worker {
    /// Create a worker serving every device of `registry`
    pub fn new(registry: Arc<Registry>, queue: Receiver<WorkItem>) -> Self {
        Self {
            registry,
            queue,
            on_event: None,
        }
    }

    /// Report shutdowns and DMA errors to `handler`
    #[must_use]
    pub fn with_event_handler(mut self, handler: impl Fn(WorkEvent) + Send + 'static) -> Self {
        self.on_event = Some(Box::new(handler));
        self
    }

    /// Process work until [`WorkItem::Terminate`] arrives or every sender is
    /// gone.
    pub fn run(self) {
        debug!("work task started");
        while let Ok(item) = self.queue.recv() {
            match item {
                WorkItem::Device(msg) => self.handle(msg),
                WorkItem::Terminate => break,
            }
        }
        debug!("work task exiting");
    }

    /// Run on a new thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("spw-work".into())
            .spawn(move || self.run())
    }

    /// Process one message.
    ///
    /// Channel DMA errors are handled before a link shutdown so each is
    /// still counted and reported.
    pub fn handle(&self, msg: WorkMessage) {
        let Some(dev) = self.registry.device(msg.device) else {
            warn!("work for unknown device {}", msg.device);
            return;
        };
        if !dev.is_open() {
            return;
        }

        for (index, work) in msg.channels.iter().enumerate() {
            if work.is_empty() {
                continue;
            }
            let Some(ch) = dev.channel(index) else {
                continue;
            };

            if work.contains(ChannelWork::ERROR) {
                ch.note_dma_error();
                match ch.stop() {
                    Ok(()) => warn!("spw{}: dma{index} stopped after DMA error", msg.device),
                    Err(e) => warn!("spw{}: dma{index} stop failed: {e}", msg.device),
                }
                self.emit(WorkEvent::DmaError {
                    device: msg.device,
                    channel: index,
                });
                continue;
            }

            // Stopping reaps whatever completed
            if msg.shutdown {
                continue;
            }
            if let Err(e) = ch.process_work(*work) {
                warn!("spw{}: dma{index} work failed: {e}", msg.device);
            }
        }

        if msg.shutdown {
            self.shutdown(&dev);
        }
    }

    fn shutdown(&self, dev: &Device) {
        for ch in dev.channels().iter().filter(|ch| ch.is_started()) {
            if let Err(e) = ch.stop() {
                warn!("spw{}: dma{} stop failed: {e}", dev.index(), ch.index());
            }
        }
        info!("spw{}: link disabled after error, channels stopped", dev.index());
        self.emit(WorkEvent::LinkShutdown {
            device: dev.index(),
        });
    }

    fn emit(&self, event: WorkEvent) {
        if let Some(handler) = &self.on_event {
            handler(event);
        }
    }
}
