//! Flush/output protocol: the shared trace destination.
//!
//! One sink exists per process, opened at runtime initialization and
//! shared by every thread's flush. Writes are serialized by an internal
//! lock; each event becomes one append-only line:
//!
//! ```text
//! <elapsed:%.9f> <thread-id> <kind:%02x> <subject> <call-site>
//! 0.000513612 2 11 0x55e4b2a01040 0x55e4b29ff2a1
//! ```
//!
//! A sink that cannot be opened degrades to stderr with a warning rather
//! than disabling tracing.

use crate::config::Config;
use crate::events::Event;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

enum Target {
    File(BufWriter<File>),
    Stderr(io::Stderr),
}

impl Target {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Target::File(file) => file,
            Target::Stderr(stderr) => stderr,
        }
    }
}

struct Inner {
    target: Target,
    path: Option<PathBuf>,
}

/// Single append-capable trace destination.
pub struct TraceSink {
    inner: Mutex<Inner>,
}

impl TraceSink {
    /// Open the destination selected by `config`, degrading to stderr
    /// (with a warning) when the file cannot be created.
    pub fn open(config: &Config) -> Self {
        match &config.output_path {
            None => Self::stderr(),
            Some(path) => match Self::to_path(path) {
                Ok(sink) => sink,
                Err(err) => {
                    eprintln!(
                        "[contienda: warning: couldn't open {} for writing: {err}]",
                        path.display()
                    );
                    Self::stderr()
                }
            },
        }
    }

    pub fn to_path(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                target: Target::File(BufWriter::new(file)),
                path: Some(path.to_path_buf()),
            }),
        })
    }

    pub fn stderr() -> Self {
        Self {
            inner: Mutex::new(Inner {
                target: Target::Stderr(io::stderr()),
                path: None,
            }),
        }
    }

    /// Serialize one thread's buffered events, in order, as one batch.
    pub fn write_events(&self, thread_id: u32, events: &[Event]) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let path = inner.path.clone();
        let writer = inner.target.writer();
        for event in events {
            if let Err(err) = writeln!(writer, "{}", format_line(thread_id, event)) {
                warn_write_error(path.as_deref(), &err);
                return;
            }
        }
    }

    /// Flush buffered output and hand back any error; the destination is
    /// closed when the sink is dropped.
    pub fn close(&self) -> io::Result<()> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &mut inner.target {
            Target::File(file) => file.flush(),
            Target::Stderr(_) => Ok(()),
        }
    }

    /// Where trace lines are going, if a file was opened.
    pub fn path(&self) -> Option<PathBuf> {
        match self.inner.lock() {
            Ok(inner) => inner.path.clone(),
            Err(poisoned) => poisoned.into_inner().path.clone(),
        }
    }
}

/// One trace line, without the trailing newline.
pub fn format_line(thread_id: u32, event: &Event) -> String {
    format!(
        "{:.9} {} {:02x} {:#x} {:#x}",
        event.when,
        thread_id,
        event.what.code(),
        event.subject,
        event.call_site
    )
}

fn warn_write_error(path: Option<&Path>, err: &io::Error) {
    match path {
        Some(path) => eprintln!(
            "[contienda: warning: error writing to {}: {err}]",
            path.display()
        ),
        None => eprintln!("[contienda: warning: error writing trace: {err}]"),
    }
}
