//! Resolution of, and access to, the real synchronization primitives.
//!
//! Wrapper code never names platform symbols directly; it goes through the
//! [`SyncPrimitives`] capability trait so tests can substitute a fake. The
//! one production implementation, [`RealPthread`], is bound once at
//! startup by looking up the next (non-interposed) definition of each
//! symbol with `dlsym(RTLD_NEXT, ..)`.
//!
//! # Symbol versioning
//!
//! glibc ships two ABI generations of the condition-variable entry points
//! and keeps both alive for old binaries. Each generation must be resolved
//! (`dlvsym`) and intercepted separately, because a host binary linked
//! against the compat generation would otherwise bypass interception or,
//! worse, be delegated to the wrong implementation. [`CondAbi`] tags which
//! generation a call belongs to; the tag is fixed at link time by which
//! exported wrapper the host binary reaches.

use std::ffi::CString;

use libc::{c_int, c_void, pthread_attr_t, pthread_cond_t, pthread_mutex_t, pthread_t, timespec};
use thiserror::Error;

#[cfg(target_arch = "x86_64")]
const COMPAT_VERSION: &str = "GLIBC_2.2.5";
#[cfg(target_arch = "x86_64")]
const CURRENT_VERSION: &str = "GLIBC_2.3.2";

#[cfg(target_arch = "aarch64")]
const COMPAT_VERSION: &str = "GLIBC_2.17";
#[cfg(target_arch = "aarch64")]
const CURRENT_VERSION: &str = "GLIBC_2.17";

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("condition-variable symbol versions are only mapped for x86_64 and aarch64 glibc");

/// Entry function signature for created threads. `C-unwind` because
/// cancellation force-unwinds out of the routine.
pub type StartRoutine = unsafe extern "C-unwind" fn(*mut c_void) -> *mut c_void;

pub type PthreadCreateFn = unsafe extern "C" fn(
    *mut pthread_t,
    *const pthread_attr_t,
    StartRoutine,
    *mut c_void,
) -> c_int;
pub type MutexOpFn = unsafe extern "C" fn(*mut pthread_mutex_t) -> c_int;
pub type CondOpFn = unsafe extern "C" fn(*mut pthread_cond_t) -> c_int;
pub type CondWaitFn =
    unsafe extern "C-unwind" fn(*mut pthread_cond_t, *mut pthread_mutex_t) -> c_int;
pub type CondTimedwaitFn = unsafe extern "C-unwind" fn(
    *mut pthread_cond_t,
    *mut pthread_mutex_t,
    *const timespec,
) -> c_int;

/// Which ABI generation of the condition-variable entry points a call
/// came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondAbi {
    /// The old generation kept for binaries linked before the condvar
    /// rework.
    Compat,
    /// The default generation current binaries link against.
    Current,
}

impl CondAbi {
    pub const ALL: [CondAbi; 2] = [CondAbi::Compat, CondAbi::Current];

    /// glibc version node this generation lives under.
    pub fn glibc_version(self) -> &'static str {
        match self {
            CondAbi::Compat => COMPAT_VERSION,
            CondAbi::Current => CURRENT_VERSION,
        }
    }

    fn index(self) -> usize {
        match self {
            CondAbi::Compat => 0,
            CondAbi::Current => 1,
        }
    }
}

/// A required real symbol could not be resolved. Always fatal: running
/// with a partially interposed API would be undefined.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("real symbol `{symbol}` not found")]
    MissingSymbol { symbol: &'static str },
    #[error("real symbol `{symbol}@{version}` not found")]
    MissingVersionedSymbol {
        symbol: &'static str,
        version: &'static str,
    },
}

/// Capability interface over the real (non-interposed) primitives.
pub trait SyncPrimitives {
    /// # Safety
    /// Same contract as `pthread_create(3)`.
    unsafe fn thread_create(
        &self,
        thread: *mut pthread_t,
        attr: *const pthread_attr_t,
        start: StartRoutine,
        arg: *mut c_void,
    ) -> c_int;

    /// # Safety
    /// `mutex` must point to an initialized pthread mutex.
    unsafe fn mutex_lock(&self, mutex: *mut pthread_mutex_t) -> c_int;

    /// # Safety
    /// `mutex` must point to an initialized pthread mutex.
    unsafe fn mutex_trylock(&self, mutex: *mut pthread_mutex_t) -> c_int;

    /// # Safety
    /// `mutex` must point to an initialized pthread mutex held by the
    /// calling thread.
    unsafe fn mutex_unlock(&self, mutex: *mut pthread_mutex_t) -> c_int;

    /// # Safety
    /// `cond` must point to an initialized condition variable.
    unsafe fn cond_signal(&self, abi: CondAbi, cond: *mut pthread_cond_t) -> c_int;

    /// # Safety
    /// `cond` must point to an initialized condition variable.
    unsafe fn cond_broadcast(&self, abi: CondAbi, cond: *mut pthread_cond_t) -> c_int;

    /// # Safety
    /// Same contract as `pthread_cond_wait(3)`.
    unsafe fn cond_wait(
        &self,
        abi: CondAbi,
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
    ) -> c_int;

    /// # Safety
    /// Same contract as `pthread_cond_timedwait(3)`.
    unsafe fn cond_timedwait(
        &self,
        abi: CondAbi,
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
        abstime: *const timespec,
    ) -> c_int;
}

/// The platform's native primitives, resolved once at startup.
pub struct RealPthread {
    create: PthreadCreateFn,
    mutex_lock: MutexOpFn,
    mutex_trylock: MutexOpFn,
    mutex_unlock: MutexOpFn,
    cond_signal: [CondOpFn; 2],
    cond_broadcast: [CondOpFn; 2],
    cond_wait: [CondWaitFn; 2],
    cond_timedwait: [CondTimedwaitFn; 2],
}

impl RealPthread {
    /// Resolve every intercepted primitive, both condvar generations
    /// included.
    pub fn bind() -> Result<Self, BindError> {
        // SAFETY: each address comes from the dynamic linker for the
        // symbol whose type we transmute to.
        unsafe {
            Ok(Self {
                create: std::mem::transmute::<*mut c_void, PthreadCreateFn>(lookup(
                    "pthread_create",
                )?),
                mutex_lock: std::mem::transmute::<*mut c_void, MutexOpFn>(lookup(
                    "pthread_mutex_lock",
                )?),
                mutex_trylock: std::mem::transmute::<*mut c_void, MutexOpFn>(lookup(
                    "pthread_mutex_trylock",
                )?),
                mutex_unlock: std::mem::transmute::<*mut c_void, MutexOpFn>(lookup(
                    "pthread_mutex_unlock",
                )?),
                cond_signal: bind_versioned_pair("pthread_cond_signal")?,
                cond_broadcast: bind_versioned_pair("pthread_cond_broadcast")?,
                cond_wait: bind_versioned_pair("pthread_cond_wait")?,
                cond_timedwait: bind_versioned_pair("pthread_cond_timedwait")?,
            })
        }
    }
}

impl SyncPrimitives for RealPthread {
    unsafe fn thread_create(
        &self,
        thread: *mut pthread_t,
        attr: *const pthread_attr_t,
        start: StartRoutine,
        arg: *mut c_void,
    ) -> c_int {
        unsafe { (self.create)(thread, attr, start, arg) }
    }

    unsafe fn mutex_lock(&self, mutex: *mut pthread_mutex_t) -> c_int {
        unsafe { (self.mutex_lock)(mutex) }
    }

    unsafe fn mutex_trylock(&self, mutex: *mut pthread_mutex_t) -> c_int {
        unsafe { (self.mutex_trylock)(mutex) }
    }

    unsafe fn mutex_unlock(&self, mutex: *mut pthread_mutex_t) -> c_int {
        unsafe { (self.mutex_unlock)(mutex) }
    }

    unsafe fn cond_signal(&self, abi: CondAbi, cond: *mut pthread_cond_t) -> c_int {
        unsafe { (self.cond_signal[abi.index()])(cond) }
    }

    unsafe fn cond_broadcast(&self, abi: CondAbi, cond: *mut pthread_cond_t) -> c_int {
        unsafe { (self.cond_broadcast[abi.index()])(cond) }
    }

    unsafe fn cond_wait(
        &self,
        abi: CondAbi,
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
    ) -> c_int {
        unsafe { (self.cond_wait[abi.index()])(cond, mutex) }
    }

    unsafe fn cond_timedwait(
        &self,
        abi: CondAbi,
        cond: *mut pthread_cond_t,
        mutex: *mut pthread_mutex_t,
        abstime: *const timespec,
    ) -> c_int {
        unsafe { (self.cond_timedwait[abi.index()])(cond, mutex, abstime) }
    }
}

fn lookup(symbol: &'static str) -> Result<*mut c_void, BindError> {
    let name = CString::new(symbol).expect("symbol names contain no NUL");
    let addr = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) };
    if addr.is_null() {
        return Err(BindError::MissingSymbol { symbol });
    }
    Ok(addr)
}

fn lookup_versioned(symbol: &'static str, abi: CondAbi) -> Result<*mut c_void, BindError> {
    let name = CString::new(symbol).expect("symbol names contain no NUL");
    let version = CString::new(abi.glibc_version()).expect("version strings contain no NUL");
    let addr = unsafe { libc::dlvsym(libc::RTLD_NEXT, name.as_ptr(), version.as_ptr()) };
    if addr.is_null() {
        return Err(BindError::MissingVersionedSymbol {
            symbol,
            version: abi.glibc_version(),
        });
    }
    Ok(addr)
}

/// Resolve both generations of one condvar operation.
///
/// # Safety
/// `F` must match the C signature of `symbol`.
unsafe fn bind_versioned_pair<F>(symbol: &'static str) -> Result<[F; 2], BindError>
where
    F: Copy,
{
    assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
    let compat = lookup_versioned(symbol, CondAbi::Compat)?;
    let current = lookup_versioned(symbol, CondAbi::Current)?;
    // SAFETY: caller guarantees F is the fn-pointer type for `symbol`;
    // sizes checked above.
    unsafe {
        Ok([
            std::mem::transmute_copy::<*mut c_void, F>(&compat),
            std::mem::transmute_copy::<*mut c_void, F>(&current),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_resolves_all_symbols() {
        assert!(RealPthread::bind().is_ok());
    }

    #[test]
    fn test_bound_mutex_ops_work() {
        let real = RealPthread::bind().unwrap();
        let mut mutex: pthread_mutex_t = libc::PTHREAD_MUTEX_INITIALIZER;
        unsafe {
            assert_eq!(real.mutex_trylock(&mut mutex), 0);
            // Default mutexes report busy on a second non-blocking attempt.
            assert_eq!(real.mutex_trylock(&mut mutex), libc::EBUSY);
            assert_eq!(real.mutex_unlock(&mut mutex), 0);
            assert_eq!(real.mutex_lock(&mut mutex), 0);
            assert_eq!(real.mutex_unlock(&mut mutex), 0);
        }
    }

    #[test]
    fn test_both_cond_generations_signal_without_waiters() {
        let real = RealPthread::bind().unwrap();
        let mut cond: pthread_cond_t = libc::PTHREAD_COND_INITIALIZER;
        for abi in CondAbi::ALL {
            unsafe {
                assert_eq!(real.cond_signal(abi, &mut cond), 0);
                assert_eq!(real.cond_broadcast(abi, &mut cond), 0);
            }
        }
    }

    #[test]
    fn test_version_tags() {
        assert!(CondAbi::Compat.glibc_version().starts_with("GLIBC_"));
        assert!(CondAbi::Current.glibc_version().starts_with("GLIBC_"));
    }
}
