//! Call-site discovery for event records.
//!
//! A trace line identifies where in the host program an intercepted call
//! was made from. The address is found by walking the current stack and
//! taking the instruction pointer `skip` frames above the function that
//! invoked [`caller`]; the result is stable per call site, which is all
//! the downstream timeline reconstruction needs.
//!
//! The walk only runs on paths that actually record an event (a contended
//! lock, a condition operation), never on the uncontended fast path.

/// Instruction pointer `skip` frames above the invoking function.
///
/// Returns 0 when the stack cannot be walked that far.
#[inline(never)]
pub fn caller(skip: usize) -> usize {
    let mut index = 0usize;
    let mut ip = 0usize;
    backtrace::trace(|frame| {
        if index == skip + 1 {
            ip = frame.ip() as usize;
            false
        } else {
            index += 1;
            true
        }
    });
    ip
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn probe() -> usize {
        caller(0)
    }

    #[test]
    fn test_caller_returns_code_address() {
        assert_ne!(probe(), 0);
    }

    #[test]
    fn test_deep_skip_is_zero_not_panic() {
        assert_eq!(caller(10_000), 0);
    }
}
