//! Blocking wait gate
//!
//! One waiter per channel direction may block until the queue counts meet a
//! [`WaitCondition`]. The gate records the armed condition in the side state,
//! so whoever changes the counts (a caller or the worker) can see the
//! condition and release the waiter. The waiter itself blocks on the side's
//! `Condvar`, which releases the side lock while it sleeps.

use core::time::Duration;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::driver::error::{ConfigError, IoError, IoResult, Result};

/// How the two halves of a wait condition combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOp {
    /// Both halves must hold
    #[default]
    And,
    /// Either half suffices
    Or,
}

/// Queue-count condition a waiter blocks on.
///
/// `pending` is the number of packets not yet handed back by hardware
/// (`send + tx_sched` or `ready + rx_sched`) and `done` the number waiting to
/// be collected (`sent` or `recv`). The condition holds when
/// `(pending <= pending_max) op (done >= done_min)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaitCondition {
    /// Upper bound on pending packets
    pub pending_max: usize,
    /// Combinator
    pub op: WaitOp,
    /// Lower bound on completed packets
    pub done_min: usize,
}

impl WaitCondition {
    /// Create a condition
    #[must_use]
    pub const fn new(pending_max: usize, op: WaitOp, done_min: usize) -> Self {
        Self {
            pending_max,
            op,
            done_min,
        }
    }

    /// Evaluate against live counts
    #[inline]
    #[must_use]
    pub const fn is_met(&self, pending: usize, done: usize) -> bool {
        let low = pending <= self.pending_max;
        let high = done >= self.done_min;
        match self.op {
            WaitOp::And => low && high,
            WaitOp::Or => low || high,
        }
    }
}

/// How a wait ended (timeouts are reported as [`IoError::Timeout`])
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
    /// The condition became true
    Satisfied,
    /// The channel was stopped, or was not started when the wait began
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GateState {
    #[default]
    Idle,
    Armed(WaitCondition),
    Released,
    Stopped,
}

/// Per-direction waiter slot
#[derive(Debug, Default)]
pub(crate) struct WaitGate {
    state: GateState,
}

impl WaitGate {
    /// Record `cond`; fails with `WaiterBusy` if a waiter is already present
    pub(crate) fn arm(&mut self, cond: WaitCondition) -> IoResult<()> {
        match self.state {
            GateState::Idle => {
                self.state = GateState::Armed(cond);
                Ok(())
            }
            _ => Err(IoError::WaiterBusy),
        }
    }

    /// Armed condition, if a waiter is blocked
    pub(crate) fn condition(&self) -> Option<WaitCondition> {
        match self.state {
            GateState::Armed(cond) => Some(cond),
            _ => None,
        }
    }

    /// Wake the waiter with success. Returns whether a waiter was armed.
    pub(crate) fn release(&mut self) -> bool {
        self.transition(GateState::Released)
    }

    /// Wake the waiter with [`WaitOutcome::Stopped`]
    pub(crate) fn force_release(&mut self) -> bool {
        self.transition(GateState::Stopped)
    }

    fn transition(&mut self, to: GateState) -> bool {
        if let GateState::Armed(_) = self.state {
            self.state = to;
            true
        } else {
            false
        }
    }

    /// Consume a release decision made by another thread
    fn take_outcome(&mut self) -> Option<WaitOutcome> {
        let outcome = match self.state {
            GateState::Released => WaitOutcome::Satisfied,
            GateState::Stopped => WaitOutcome::Stopped,
            _ => return None,
        };
        self.state = GateState::Idle;
        Some(outcome)
    }

    fn disarm(&mut self) {
        self.state = GateState::Idle;
    }

    /// Whether no waiter is present
    pub(crate) fn is_idle(&self) -> bool {
        self.state == GateState::Idle
    }

    /// Whether a waiter was woken but has not yet returned
    pub(crate) fn is_releasing(&self) -> bool {
        matches!(self.state, GateState::Released | GateState::Stopped)
    }
}

/// Side state a waiter can block on
pub(crate) trait WaitSide {
    /// The side's gate
    fn gate(&mut self) -> &mut WaitGate;

    /// `(pending, done)` counts
    fn wait_counts(&self) -> (usize, usize);

    /// Release the waiter if its condition holds. Returns whether it did.
    fn release_if_met(&mut self) -> bool {
        let (pending, done) = self.wait_counts();
        match self.gate().condition() {
            Some(cond) if cond.is_met(pending, done) => self.gate().release(),
            _ => false,
        }
    }
}

/// Block on `lock`'s side until `cond` holds, the channel stops or `timeout`
/// elapses. `started` is re-read under the lock.
pub(crate) fn wait_on<S, F>(
    lock: &Mutex<Option<S>>,
    cvar: &Condvar,
    started: F,
    cond: WaitCondition,
    timeout: Option<Duration>,
) -> Result<WaitOutcome>
where
    S: WaitSide,
    F: Fn() -> bool,
{
    let mut guard = lock.lock()?;
    let side = guard.as_mut().ok_or(ConfigError::NotOpen)?;

    if !started() {
        return Ok(WaitOutcome::Stopped);
    }
    side.gate().arm(cond)?;

    let (pending, done) = side.wait_counts();
    if cond.is_met(pending, done) {
        side.gate().disarm();
        return Ok(WaitOutcome::Satisfied);
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let timed_out = match deadline {
            None => {
                guard = cvar.wait(guard)?;
                false
            }
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let (g, result) = cvar.wait_timeout(guard, remaining)?;
                guard = g;
                result.timed_out()
            }
        };

        // Closing refuses while a waiter is present, so the side still exists
        let side = guard.as_mut().ok_or(IoError::Internal)?;
        if let Some(outcome) = side.gate().take_outcome() {
            // A closer may be waiting for the gate to go idle
            cvar.notify_all();
            return Ok(outcome);
        }

        let (pending, done) = side.wait_counts();
        if cond.is_met(pending, done) {
            side.gate().disarm();
            return Ok(WaitOutcome::Satisfied);
        }

        if timed_out || deadline.is_some_and(|d| Instant::now() >= d) {
            side.gate().disarm();
            return Err(IoError::Timeout.into());
        }
    }
}

/// Block until a woken waiter on `lock`'s side has left its wait call
pub(crate) fn await_waiter_exit<S: WaitSide>(lock: &Mutex<Option<S>>, cvar: &Condvar) -> Result<()> {
    let mut guard = lock.lock()?;
    while guard.as_mut().is_some_and(|side| side.gate().is_releasing()) {
        guard = cvar.wait(guard)?;
    }
    Ok(())
}
