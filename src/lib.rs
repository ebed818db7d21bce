//! Contienda - lock-contention tracer for pthread programs
//!
//! This library interposes the pthread synchronization entry points
//! (`LD_PRELOAD=libcontienda.so`) and records a timestamped trace of
//! contention and handoff events - waits on busy mutexes, condition
//! waits, signals and broadcasts, thread creation - without any change to
//! the traced program. The trace is raw and ordered; reconstruction and
//! judgement (timelines, deadlock hunting) belong to downstream tools.
//!
//! ```text
//! host program ──calls──▶ exported wrappers (interpose)
//!                              │ reentrancy guard, per-thread context
//!                              ├─ record events ──▶ per-thread buffer
//!                              └─ delegate ──▶ real pthread (primitives)
//! thread/process exit ──▶ flush buffers ──▶ trace file or stderr (sink)
//! ```
//!
//! Only contended locks appear in the trace: the lock wrapper tries a
//! non-blocking acquisition first and records nothing when it succeeds,
//! so an uncontended workload traces almost for free.

pub mod callsite;
pub mod clock;
pub mod config;
pub mod context;
pub mod errno;
pub mod events;
pub mod interpose;
pub mod primitives;
pub mod runtime;
pub mod sink;
pub mod wrappers;

pub use clock::Baseline;
pub use config::Config;
pub use context::ThreadContext;
pub use events::{Event, EventBuffer, EventKind, INITIAL_CAPACITY};
pub use primitives::{CondAbi, RealPthread, SyncPrimitives};
pub use sink::TraceSink;
