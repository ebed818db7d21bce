//! Runtime configuration from environment variables.
//!
//! The interposed library has no command line, so all knobs arrive through
//! the environment of the traced process:
//!
//! - `CONTIENDA_OUT` - trace output path. The first `%p` in the value is
//!   replaced with the process id so concurrent processes do not collide
//!   on one file. Unset: trace lines go to stderr.
//! - `CONTIENDA_TRYLOCK_FIRST` - set to `0`, `false`, or `off` to disable
//!   the non-blocking fast path in the mutex-lock wrapper, recording a
//!   Wait/Continue pair for every lock call instead of only contended ones.

use std::env;
use std::path::PathBuf;

/// Environment variable naming the trace output path.
pub const OUTPUT_ENV_VAR: &str = "CONTIENDA_OUT";

/// Environment variable toggling the trylock fast path.
pub const TRYLOCK_ENV_VAR: &str = "CONTIENDA_TRYLOCK_FIRST";

/// Configuration snapshot taken once at runtime initialization.
#[derive(Debug, Clone)]
pub struct Config {
    /// Trace destination; `None` routes output to stderr.
    pub output_path: Option<PathBuf>,
    /// Attempt a non-blocking acquisition before recording a wait.
    pub trylock_first: bool,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        let pid = nix::unistd::getpid().as_raw() as u32;
        let output_path = env::var(OUTPUT_ENV_VAR)
            .ok()
            .map(|raw| PathBuf::from(expand_pid_token(&raw, pid)));
        let trylock_first = env::var(TRYLOCK_ENV_VAR)
            .map(|raw| parse_switch(&raw))
            .unwrap_or(true);
        Self {
            output_path,
            trylock_first,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_path: None,
            trylock_first: true,
        }
    }
}

/// Replace the first `%p` in `raw` with `pid`.
pub fn expand_pid_token(raw: &str, pid: u32) -> String {
    raw.replacen("%p", &pid.to_string(), 1)
}

fn parse_switch(raw: &str) -> bool {
    !matches!(raw.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off")
}
