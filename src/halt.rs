//! Halt-signal delivery between the debugger, signal handlers and the run loop.
//!
//! The run loop polls `HaltSignal::is_requested` between instructions, so the
//! only cross-thread communication is a pair of atomics. Signal handlers set
//! the flag and nothing else.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Clone, Default)]
pub struct HaltSignal {
    inner: Arc<HaltInner>,
}

#[derive(Default)]
struct HaltInner {
    requested: AtomicBool,
    status: AtomicI32,
}

impl HaltSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the run loop stop before its next step, carrying an exit
    /// status. The first non-zero status wins so the original failure reason
    /// is preserved.
    pub fn request(&self, status: i32) {
        if status != 0 {
            let _ = self.inner.status.compare_exchange(
                0,
                status,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
        self.inner.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> i32 {
        self.inner.status.load(Ordering::SeqCst)
    }
}

static SIGNAL_HALT: OnceLock<HaltSignal> = OnceLock::new();

/// Install SIGINT/SIGTERM handlers that request a halt with a non-zero
/// status. Only flag stores happen in signal context.
#[cfg(unix)]
pub fn install_signal_handler(halt: HaltSignal) {
    use std::os::raw::c_int;
    const SIGINT: c_int = 2;
    const SIGTERM: c_int = 15;

    let _ = SIGNAL_HALT.set(halt);

    extern "C" fn handler(_sig: c_int) {
        if let Some(halt) = SIGNAL_HALT.get() {
            halt.request(1);
        }
    }

    extern "C" {
        fn signal(sig: c_int, handler: extern "C" fn(c_int)) -> usize;
    }

    unsafe {
        // Best-effort; ignore returns
        let _ = signal(SIGINT, handler);
        let _ = signal(SIGTERM, handler);
    }
}

#[cfg(not(unix))]
pub fn install_signal_handler(halt: HaltSignal) {
    let _ = SIGNAL_HALT.set(halt);
}
