//! Process-wide tracer state.
//!
//! All cross-thread mutable state lives in one lazily-initialized
//! [`Runtime`]: the bound real primitives, the baseline clock, the
//! configuration snapshot, the output sink, and the thread-id counter.
//! The library constructor forces initialization before `main`, and
//! initialization also happens on the first intercepted call so that
//! synchronization from earlier-running library constructors is handled.
//!
//! The thread-id counter is guarded by a dedicated internal lock; std's
//! mutex is futex-backed on Linux and therefore never re-enters the
//! interposed pthread symbols. The reentrancy guard is still held around
//! internal bookkeeping so that any library call made while recording
//! passes straight through.

use crate::clock::Baseline;
use crate::config::Config;
use crate::context::{self, ThreadContext};
use crate::primitives::RealPthread;
use crate::sink::TraceSink;
use std::collections::TryReserveError;
use std::sync::{Mutex, OnceLock};

pub struct Runtime {
    primitives: RealPthread,
    clock: Baseline,
    config: Config,
    sink: TraceSink,
    next_thread_id: Mutex<u32>,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

impl Runtime {
    fn bootstrap() -> Self {
        let primitives = match RealPthread::bind() {
            Ok(primitives) => primitives,
            Err(err) => {
                // A partially interposed process has undefined lock
                // semantics; there is no safe way to continue.
                eprintln!("[contienda: fatal: {err}]");
                std::process::abort();
            }
        };
        let clock = Baseline::now();
        let config = Config::from_env();
        let sink = TraceSink::open(&config);
        tracing::debug!(
            trylock_first = config.trylock_first,
            output = ?sink.path(),
            monotonic = clock.is_monotonic(),
            "tracer runtime initialized"
        );
        Self {
            primitives,
            clock,
            config,
            sink,
            next_thread_id: Mutex::new(0),
        }
    }

    pub fn primitives(&self) -> &RealPthread {
        &self.primitives
    }

    pub fn clock(&self) -> &Baseline {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &TraceSink {
        &self.sink
    }

    /// Next unique thread id. Ids are never reused, even under concurrent
    /// creation.
    pub fn allocate_thread_id(&self) -> u32 {
        let mut next = match self.next_thread_id.lock() {
            Ok(next) => next,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = *next;
        *next += 1;
        id
    }

    /// Allocate a context (buffer plus fresh id) for a new thread.
    /// Allocation failure is surfaced, not fatal.
    pub fn new_thread_context(&self) -> Result<ThreadContext, TryReserveError> {
        ThreadContext::new(self.allocate_thread_id())
    }
}

/// The singleton, initializing it on first use.
pub fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(Runtime::bootstrap)
}

/// The singleton only if it already exists; used on teardown paths that
/// must not trigger initialization.
pub fn try_runtime() -> Option<&'static Runtime> {
    RUNTIME.get()
}

/// Serialize a drained context's events to the sink and release it.
pub(crate) fn flush_context(ctx: ThreadContext) {
    // Anything the sink does internally must not be re-intercepted.
    let _guard = context::ReentrancyGuard::try_enter();
    let Some(rt) = try_runtime() else {
        return;
    };
    let (id, buffer) = ctx.into_parts();
    if buffer.dropped() > 0 {
        eprintln!(
            "[contienda: warning: thread {id} dropped {} events after allocation failure]",
            buffer.dropped()
        );
    }
    rt.sink.write_events(id, buffer.events());
    tracing::debug!(thread_id = id, events = buffer.len(), "flushed thread buffer");
}

/// Process start: bind symbols, open output, fix the baseline, and adopt
/// the calling (initial) thread.
pub fn init() {
    let rt = runtime();
    context::with_current(|| rt.new_thread_context().ok(), |_| ());
}

/// Process end: drain the calling thread and close the output, reporting
/// (not failing on) close errors.
pub fn shutdown() {
    context::drain_current();
    if let Some(rt) = try_runtime() {
        if let Err(err) = rt.sink.close() {
            eprintln!("[contienda: warning: error writing trace output: {err}]");
        }
    }
}
