//! Per-thread tracer state: the owned event buffer, its thread-local
//! slot, and the reentrancy guard.
//!
//! # Ownership
//!
//! Each thread owns exactly one [`ThreadContext`] for its lifetime, held
//! in a thread-local slot. The slot is filled either by the thread-creation
//! trampoline (for threads spawned through the intercepted
//! `pthread_create`), by runtime initialization (the initial thread), or
//! lazily on a thread's first recorded event (threads that predate the
//! tracer). Draining moves the context out of the slot, so a context is
//! flushed at most once no matter how many exit paths race.
//!
//! # Exit paths
//!
//! Normal return drains through [`DrainOnExit`] in the trampoline;
//! cancellation and unusual teardown orders drain through the slot's own
//! destructor when thread-local storage is torn down.

use crate::clock::Baseline;
use crate::events::{EventBuffer, EventKind, INITIAL_CAPACITY};
use std::cell::{Cell, RefCell};
use std::collections::TryReserveError;

/// Per-thread state tracked by the instrumentation layer.
#[derive(Debug)]
pub struct ThreadContext {
    id: u32,
    buffer: EventBuffer,
}

impl ThreadContext {
    /// Allocate a context with the default buffer capacity.
    pub fn new(id: u32) -> Result<Self, TryReserveError> {
        Self::with_capacity(id, INITIAL_CAPACITY)
    }

    pub fn with_capacity(id: u32, capacity: usize) -> Result<Self, TryReserveError> {
        Ok(Self {
            id,
            buffer: EventBuffer::try_with_capacity(capacity)?,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    /// Record one event; errno preservation lives in the buffer's append
    /// path.
    pub fn record(&mut self, clock: &Baseline, what: EventKind, subject: usize, call_site: usize) {
        self.buffer.record(clock, what, subject, call_site);
    }

    /// Tear the context apart for flushing.
    pub(crate) fn into_parts(self) -> (u32, EventBuffer) {
        (self.id, self.buffer)
    }
}

struct Slot {
    ctx: Option<ThreadContext>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            crate::runtime::flush_context(ctx);
        }
    }
}

thread_local! {
    static ACTIVE: RefCell<Slot> = const { RefCell::new(Slot { ctx: None }) };
    static IN_TRACER: Cell<bool> = const { Cell::new(false) };
}

/// Install `ctx` as the calling thread's context, replacing (and flushing)
/// any previous one.
pub fn install(ctx: ThreadContext) {
    let previous = ACTIVE
        .try_with(|slot| slot.borrow_mut().ctx.replace(ctx))
        .ok()
        .flatten();
    if let Some(previous) = previous {
        crate::runtime::flush_context(previous);
    }
}

/// Run `f` against the calling thread's context, creating one via `make`
/// if the thread has none yet. Returns `None` when thread-local storage is
/// unavailable (thread teardown) or no context could be made.
pub fn with_current<R>(
    make: impl FnOnce() -> Option<ThreadContext>,
    f: impl FnOnce(&mut ThreadContext) -> R,
) -> Option<R> {
    ACTIVE
        .try_with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.ctx.is_none() {
                slot.ctx = make();
            }
            slot.ctx.as_mut().map(f)
        })
        .ok()
        .flatten()
}

/// Move the calling thread's context out of its slot and flush it.
/// Returns whether there was a context to flush; at most one caller
/// observes `true` per installed context.
pub fn drain_current() -> bool {
    let ctx = ACTIVE
        .try_with(|slot| slot.borrow_mut().ctx.take())
        .ok()
        .flatten();
    match ctx {
        Some(ctx) => {
            crate::runtime::flush_context(ctx);
            true
        }
        None => false,
    }
}

/// Scoped drain: flushes the calling thread's context on every exit path,
/// including forced unwinding from cancellation.
pub struct DrainOnExit;

impl Drop for DrainOnExit {
    fn drop(&mut self) {
        drain_current();
    }
}

/// Marks the calling thread as inside the tracer's own machinery.
///
/// `try_enter` refuses (returns `None`) when the flag is already set, or
/// when thread-local storage is gone; wrappers treat both as a signal to
/// pass the call straight through to the real implementation.
pub struct ReentrancyGuard {
    _priv: (),
}

impl ReentrancyGuard {
    pub fn try_enter() -> Option<Self> {
        IN_TRACER
            .try_with(|flag| {
                if flag.get() {
                    None
                } else {
                    flag.set(true);
                    Some(ReentrancyGuard { _priv: () })
                }
            })
            .ok()
            .flatten()
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let _ = IN_TRACER.try_with(|flag| flag.set(false));
    }
}
