//! Interception logic for the wrapped primitives.
//!
//! These functions hold the record-and-delegate contracts and are generic
//! over [`SyncPrimitives`], so the exported `extern "C"` entry points in
//! `interpose` stay thin and the contracts are testable against a fake
//! implementation. Recording is a pure side effect: return values and the
//! caller-visible errno always come out exactly as the real primitive
//! produced them.
//!
//! Call-site discovery is passed as a closure and only invoked once an
//! event will actually be recorded, keeping the uncontended lock path free
//! of stack walking.

use crate::clock::Baseline;
use crate::context::ThreadContext;
use crate::events::EventKind;
use crate::primitives::{CondAbi, SyncPrimitives};
use libc::{c_int, pthread_cond_t, pthread_mutex_t, timespec};
use nix::errno::Errno;

/// Mutex lock: non-blocking attempt first (when enabled), Wait/Continue
/// bracket only when the primitive was actually busy.
///
/// An immediate trylock success, or any trylock error other than `EBUSY`,
/// is returned as-is with nothing recorded, so the trace reflects actual
/// contention rather than every lock call.
///
/// # Safety
/// `mutex` must satisfy the `pthread_mutex_lock(3)` contract.
pub unsafe fn lock_mutex<P: SyncPrimitives>(
    real: &P,
    clock: &Baseline,
    ctx: &mut ThreadContext,
    trylock_first: bool,
    mutex: *mut pthread_mutex_t,
    call_site: impl FnOnce() -> usize,
) -> c_int {
    if trylock_first {
        let saved_errno = Errno::last_raw();
        let res = unsafe { real.mutex_trylock(mutex) };
        if res == 0 || res != libc::EBUSY {
            // The fast path substitutes for the blocking call entirely,
            // errno state included.
            return res;
        }
        Errno::set_raw(saved_errno);
    }

    let site = call_site();
    ctx.record(clock, EventKind::WaitMutex, mutex as usize, site);
    let res = unsafe { real.mutex_lock(mutex) };
    ctx.record(clock, EventKind::ContinueMutex, mutex as usize, site);
    res
}

/// Condition wait, timed when `abstime` is given.
///
/// The Wait/Continue pair brackets the real call regardless of whether it
/// returned due to signal, broadcast, or timeout; the distinction lives
/// only in the returned value.
///
/// # Safety
/// Arguments must satisfy the `pthread_cond_(timed)wait(3)` contract.
pub unsafe fn wait_condition<P: SyncPrimitives>(
    real: &P,
    clock: &Baseline,
    ctx: &mut ThreadContext,
    abi: CondAbi,
    cond: *mut pthread_cond_t,
    mutex: *mut pthread_mutex_t,
    abstime: Option<*const timespec>,
    call_site: impl FnOnce() -> usize,
) -> c_int {
    let site = call_site();
    ctx.record(clock, EventKind::WaitCond, cond as usize, site);
    let res = unsafe {
        match abstime {
            None => real.cond_wait(abi, cond, mutex),
            Some(abstime) => real.cond_timedwait(abi, cond, mutex, abstime),
        }
    };
    ctx.record(clock, EventKind::ContinueCond, cond as usize, site);
    res
}

/// Condition signal: one event, then delegate. Signaling never blocks, so
/// there is no bracket.
///
/// # Safety
/// `cond` must satisfy the `pthread_cond_signal(3)` contract.
pub unsafe fn signal_condition<P: SyncPrimitives>(
    real: &P,
    clock: &Baseline,
    ctx: &mut ThreadContext,
    abi: CondAbi,
    cond: *mut pthread_cond_t,
    call_site: impl FnOnce() -> usize,
) -> c_int {
    ctx.record(clock, EventKind::SignalCond, cond as usize, call_site());
    unsafe { real.cond_signal(abi, cond) }
}

/// Condition broadcast: one event, then delegate.
///
/// # Safety
/// `cond` must satisfy the `pthread_cond_broadcast(3)` contract.
pub unsafe fn broadcast_condition<P: SyncPrimitives>(
    real: &P,
    clock: &Baseline,
    ctx: &mut ThreadContext,
    abi: CondAbi,
    cond: *mut pthread_cond_t,
    call_site: impl FnOnce() -> usize,
) -> c_int {
    ctx.record(clock, EventKind::BroadcastCond, cond as usize, call_site());
    unsafe { real.cond_broadcast(abi, cond) }
}
