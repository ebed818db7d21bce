//! Exported interposition entry points.
//!
//! This module is the `LD_PRELOAD` surface: functions with the exact
//! names (and, for the condition variables, the exact symbol versions)
//! the host binary links against. Each entry point consults the
//! reentrancy guard, hands the call to the generic logic in
//! [`crate::wrappers`], and otherwise delegates untouched.
//!
//! # Symbol versions
//!
//! On x86_64 both glibc condvar generations are exported, each delegating
//! to its own resolved handle; the versioned names are produced with
//! `#[export_name = "name@VERSION"]` (`@@` marks the default version),
//! which is the object-level encoding the linker reads. On aarch64 glibc
//! there is a single generation, so the plain names suffice.
//!
//! # Unwinding
//!
//! The condition waits are cancellation points and the spawn trampoline
//! hosts the user routine, so those cross the FFI boundary as
//! `extern "C-unwind"`: cancellation must be able to force-unwind through
//! them while the scoped drain guard and thread-local destructors still
//! run and flush the thread's buffer.

use crate::callsite;
use crate::context::{self, DrainOnExit, ReentrancyGuard, ThreadContext};
use crate::primitives::{CondAbi, StartRoutine, SyncPrimitives};
use crate::runtime::{self, runtime};
use crate::wrappers;
use libc::{c_int, c_void, pthread_attr_t, pthread_cond_t, pthread_mutex_t, pthread_t, timespec};
use nix::errno::Errno;

/// Frames between a recording path and the host call site.
const WRAPPER_FRAMES: usize = 2;

fn call_site() -> usize {
    callsite::caller(WRAPPER_FRAMES)
}

/// Binds symbols, opens the output, fixes the clock baseline, and adopts
/// the initial thread - before any user code runs.
#[ctor::ctor]
fn init() {
    runtime::init();
}

/// Drains the last thread's buffer and closes the output after user code
/// completes.
#[ctor::dtor]
fn finish() {
    runtime::shutdown();
}

// ---------------------------------------------------------------------------
// Thread creation
// ---------------------------------------------------------------------------

struct SpawnEntry {
    start: StartRoutine,
    arg: *mut c_void,
    ctx: ThreadContext,
}

/// Runs as the new thread: installs the pre-allocated context, pins a
/// scoped drain guard, then enters the user routine. The guard flushes on
/// normal return and rides forced unwinding on cancellation; the
/// thread-local slot destructor is the backstop for teardown orders that
/// bypass the guard. Draining removes the context, so the flush happens
/// exactly once either way.
unsafe extern "C-unwind" fn spawn_trampoline(raw: *mut c_void) -> *mut c_void {
    // SAFETY: `raw` is the Box<SpawnEntry> leaked by `pthread_create`.
    let entry = unsafe { Box::from_raw(raw.cast::<SpawnEntry>()) };
    let SpawnEntry { start, arg, ctx } = *entry;
    context::install(ctx);
    let _drain = DrainOnExit;
    // SAFETY: start/arg are exactly what the host handed to
    // pthread_create.
    unsafe { start(arg) }
}

/// # Safety
/// Same contract as `pthread_create(3)`.
#[no_mangle]
pub unsafe extern "C" fn pthread_create(
    thread: *mut pthread_t,
    attr: *const pthread_attr_t,
    start_routine: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    let rt = runtime();
    let Some(_guard) = ReentrancyGuard::try_enter() else {
        return unsafe { rt.primitives().thread_create(thread, attr, start_routine, arg) };
    };

    // The context (buffer plus id) exists before the thread does, so the
    // new thread can record from its first instruction.
    let ctx = match rt.new_thread_context() {
        Ok(ctx) => ctx,
        Err(_) => {
            Errno::set_raw(libc::EAGAIN);
            return libc::EAGAIN;
        }
    };

    let raw = Box::into_raw(Box::new(SpawnEntry {
        start: start_routine,
        arg,
        ctx,
    }));
    let res =
        unsafe { rt.primitives().thread_create(thread, attr, spawn_trampoline, raw.cast()) };
    if res != 0 {
        // The thread never ran; reclaim the entry without flushing.
        drop(unsafe { Box::from_raw(raw) });
    }
    res
}

// ---------------------------------------------------------------------------
// Mutex lock
// ---------------------------------------------------------------------------

/// # Safety
/// Same contract as `pthread_mutex_lock(3)`.
#[no_mangle]
pub unsafe extern "C" fn pthread_mutex_lock(mutex: *mut pthread_mutex_t) -> c_int {
    let rt = runtime();
    let Some(_guard) = ReentrancyGuard::try_enter() else {
        return unsafe { rt.primitives().mutex_lock(mutex) };
    };
    let trylock_first = rt.config().trylock_first;
    let res = context::with_current(
        || rt.new_thread_context().ok(),
        |ctx| unsafe {
            wrappers::lock_mutex(rt.primitives(), rt.clock(), ctx, trylock_first, mutex, call_site)
        },
    );
    match res {
        Some(res) => res,
        // No context available for this thread: delegate untraced.
        None => unsafe { rt.primitives().mutex_lock(mutex) },
    }
}

// ---------------------------------------------------------------------------
// Condition variables (shared entry logic, one export per ABI generation)
// ---------------------------------------------------------------------------

unsafe fn cond_signal_entry(abi: CondAbi, cond: *mut pthread_cond_t) -> c_int {
    let rt = runtime();
    let Some(_guard) = ReentrancyGuard::try_enter() else {
        return unsafe { rt.primitives().cond_signal(abi, cond) };
    };
    let res = context::with_current(
        || rt.new_thread_context().ok(),
        |ctx| unsafe {
            wrappers::signal_condition(rt.primitives(), rt.clock(), ctx, abi, cond, call_site)
        },
    );
    match res {
        Some(res) => res,
        None => unsafe { rt.primitives().cond_signal(abi, cond) },
    }
}

unsafe fn cond_broadcast_entry(abi: CondAbi, cond: *mut pthread_cond_t) -> c_int {
    let rt = runtime();
    let Some(_guard) = ReentrancyGuard::try_enter() else {
        return unsafe { rt.primitives().cond_broadcast(abi, cond) };
    };
    let res = context::with_current(
        || rt.new_thread_context().ok(),
        |ctx| unsafe {
            wrappers::broadcast_condition(rt.primitives(), rt.clock(), ctx, abi, cond, call_site)
        },
    );
    match res {
        Some(res) => res,
        None => unsafe { rt.primitives().cond_broadcast(abi, cond) },
    }
}

unsafe fn cond_wait_entry(
    abi: CondAbi,
    cond: *mut pthread_cond_t,
    mutex: *mut pthread_mutex_t,
    abstime: Option<*const timespec>,
) -> c_int {
    let rt = runtime();
    let delegate = || unsafe {
        match abstime {
            None => rt.primitives().cond_wait(abi, cond, mutex),
            Some(abstime) => rt.primitives().cond_timedwait(abi, cond, mutex, abstime),
        }
    };
    let Some(_guard) = ReentrancyGuard::try_enter() else {
        return delegate();
    };
    let res = context::with_current(
        || rt.new_thread_context().ok(),
        |ctx| unsafe {
            wrappers::wait_condition(
                rt.primitives(),
                rt.clock(),
                ctx,
                abi,
                cond,
                mutex,
                abstime,
                call_site,
            )
        },
    );
    match res {
        Some(res) => res,
        None => delegate(),
    }
}

#[cfg(target_arch = "x86_64")]
mod exports {
    use super::*;

    /// # Safety
    /// Same contract as `pthread_cond_signal(3)`.
    #[export_name = "pthread_cond_signal@GLIBC_2.2.5"]
    pub unsafe extern "C" fn cond_signal_compat(cond: *mut pthread_cond_t) -> c_int {
        unsafe { cond_signal_entry(CondAbi::Compat, cond) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_signal(3)`.
    #[export_name = "pthread_cond_signal@@GLIBC_2.3.2"]
    pub unsafe extern "C" fn cond_signal_current(cond: *mut pthread_cond_t) -> c_int {
        unsafe { cond_signal_entry(CondAbi::Current, cond) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_broadcast(3)`.
    #[export_name = "pthread_cond_broadcast@GLIBC_2.2.5"]
    pub unsafe extern "C" fn cond_broadcast_compat(cond: *mut pthread_cond_t) -> c_int {
        unsafe { cond_broadcast_entry(CondAbi::Compat, cond) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_broadcast(3)`.
    #[export_name = "pthread_cond_broadcast@@GLIBC_2.3.2"]
    pub unsafe extern "C" fn cond_broadcast_current(cond: *mut pthread_cond_t) -> c_int {
        unsafe { cond_broadcast_entry(CondAbi::Current, cond) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_wait(3)`.
    #[export_name = "pthread_cond_wait@GLIBC_2.2.5"]
    pub unsafe extern "C-unwind" fn cond_wait_compat(
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
    ) -> c_int {
        unsafe { cond_wait_entry(CondAbi::Compat, cond, mutex, None) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_wait(3)`.
    #[export_name = "pthread_cond_wait@@GLIBC_2.3.2"]
    pub unsafe extern "C-unwind" fn cond_wait_current(
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
    ) -> c_int {
        unsafe { cond_wait_entry(CondAbi::Current, cond, mutex, None) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_timedwait(3)`.
    #[export_name = "pthread_cond_timedwait@GLIBC_2.2.5"]
    pub unsafe extern "C-unwind" fn cond_timedwait_compat(
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
        abstime: *const timespec,
    ) -> c_int {
        unsafe { cond_wait_entry(CondAbi::Compat, cond, mutex, Some(abstime)) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_timedwait(3)`.
    #[export_name = "pthread_cond_timedwait@@GLIBC_2.3.2"]
    pub unsafe extern "C-unwind" fn cond_timedwait_current(
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
        abstime: *const timespec,
    ) -> c_int {
        unsafe { cond_wait_entry(CondAbi::Current, cond, mutex, Some(abstime)) }
    }
}

#[cfg(target_arch = "aarch64")]
mod exports {
    use super::*;

    /// # Safety
    /// Same contract as `pthread_cond_signal(3)`.
    #[no_mangle]
    pub unsafe extern "C" fn pthread_cond_signal(cond: *mut pthread_cond_t) -> c_int {
        unsafe { cond_signal_entry(CondAbi::Current, cond) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_broadcast(3)`.
    #[no_mangle]
    pub unsafe extern "C" fn pthread_cond_broadcast(cond: *mut pthread_cond_t) -> c_int {
        unsafe { cond_broadcast_entry(CondAbi::Current, cond) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_wait(3)`.
    #[no_mangle]
    pub unsafe extern "C-unwind" fn pthread_cond_wait(
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
    ) -> c_int {
        unsafe { cond_wait_entry(CondAbi::Current, cond, mutex, None) }
    }

    /// # Safety
    /// Same contract as `pthread_cond_timedwait(3)`.
    #[no_mangle]
    pub unsafe extern "C-unwind" fn pthread_cond_timedwait(
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
        abstime: *const timespec,
    ) -> c_int {
        unsafe { cond_wait_entry(CondAbi::Current, cond, mutex, Some(abstime)) }
    }
}
