//! Cooperative stop flag shared between the engine loop and whoever wants it halted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set by a SIGINT handler installed with [`install_interrupt_handler`].
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Clonable stop token. The scheduler checks it once per pass; anything
/// already executing finishes its step first.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    /// True once this flag was raised or the process received SIGINT.
    pub fn is_stop_requested(&self) -> bool {
        self.inner.load(Ordering::Relaxed) || INTERRUPTED.load(Ordering::Relaxed)
    }
}

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
}

/// Route SIGINT to every [`StopFlag`] so a running transfer halts and saves its state.
#[cfg(unix)]
pub fn install_interrupt_handler() {
    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler performs a single atomic store, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler);
    }
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = StopFlag::new();
        let b = a.clone();
        assert!(!b.is_stop_requested());
        a.request_stop();
        assert!(b.is_stop_requested());
    }
}
