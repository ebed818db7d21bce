//! errno preservation across instrumentation work.
//!
//! Recording an event must not perturb the error state the intercepted
//! call would otherwise leave behind, so every internal code path that can
//! touch errno runs under an [`ErrnoGuard`].

use nix::errno::Errno;

/// Saves errno on construction and restores it on drop.
#[derive(Debug)]
pub struct ErrnoGuard {
    saved: i32,
}

impl ErrnoGuard {
    pub fn save() -> Self {
        Self {
            saved: Errno::last_raw(),
        }
    }

    /// The errno value captured at guard construction.
    pub fn saved(&self) -> i32 {
        self.saved
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        Errno::set_raw(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_restored_on_drop() {
        Errno::set_raw(libc::EINTR);
        {
            let _guard = ErrnoGuard::save();
            Errno::set_raw(libc::ENOMEM);
        }
        assert_eq!(Errno::last_raw(), libc::EINTR);
    }

    #[test]
    fn test_saved_value_visible() {
        Errno::set_raw(libc::EBUSY);
        let guard = ErrnoGuard::save();
        assert_eq!(guard.saved(), libc::EBUSY);
    }
}
