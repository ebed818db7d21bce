//! Event records and the per-thread growable buffer.
//!
//! Every intercepted call that is worth remembering appends one [`Event`]
//! to the calling thread's [`EventBuffer`]. The buffer is exclusively
//! owned by its thread, so the append path takes no locks; the only cost
//! beyond a clock read is an occasional doubling reallocation.
//!
//! Tracing is best effort: if a doubling fails the triggering event is
//! dropped, counted, and the host program proceeds untouched.

use crate::clock::Baseline;
use crate::errno::ErrnoGuard;
use std::collections::TryReserveError;

/// Initial buffer capacity, sized so short-lived workloads never grow.
pub const INITIAL_CAPACITY: usize = 100_000;

/// What an event records.
///
/// The discriminants are the wire codes emitted in the trace (`%02x`).
/// `Running` and `Finished` are reserved codes carried for trace-format
/// compatibility; the interception layer itself never emits them.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Running = 0x00,
    Finished = 0x01,
    ContinueMutex = 0x10,
    WaitMutex = 0x11,
    ContinueCond = 0x20,
    WaitCond = 0x21,
    SignalCond = 0x30,
    BroadcastCond = 0x40,
}

impl EventKind {
    /// Wire code for the trace line.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// One observed occurrence. Immutable once recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Seconds elapsed since the baseline.
    pub when: f64,
    pub what: EventKind,
    /// Address of the synchronization object involved.
    pub subject: usize,
    /// Code address the intercepted call was made from.
    pub call_site: usize,
}

/// Owned, growable sequence of events local to one thread.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Event>,
    dropped: u64,
}

impl EventBuffer {
    /// Allocate a buffer, reporting allocation failure instead of aborting.
    ///
    /// The initial allocation is the one large enough to matter (tens of
    /// thousands of slots), so thread creation can surface exhaustion to
    /// the caller rather than crash the host.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        let mut events = Vec::new();
        events.try_reserve_exact(capacity)?;
        Ok(Self { events, dropped: 0 })
    }

    /// Append one event, timestamped against `clock`.
    ///
    /// When the buffer is full its capacity doubles; if that reallocation
    /// fails the event is dropped and counted. The caller-visible errno is
    /// saved and restored across the append (allocation and clock reads
    /// may scribble on it), so recording never perturbs the error state of
    /// the intercepted call. O(1) amortized.
    pub fn record(&mut self, clock: &Baseline, what: EventKind, subject: usize, call_site: usize) {
        let _errno = ErrnoGuard::save();
        if self.events.len() == self.events.capacity() {
            let grow_by = self.events.capacity().max(1);
            if self.events.try_reserve_exact(grow_by).is_err() {
                self.dropped += 1;
                return;
            }
        }
        self.events.push(Event {
            when: clock.elapsed_seconds(),
            what,
            subject,
            call_site,
        });
    }

    /// Recorded events, in append order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Events lost to failed reallocations.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
