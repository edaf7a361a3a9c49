//! Process-wide signal hook.
//!
//! The installed handler does nothing but store two atomics, the only
//! operations that are async-signal-safe. Workers poll the flag at tick
//! boundaries; a worker sleeping in its mailbox wakes within its bounded
//! idle wait, so no notification from signal context is needed.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static SIGNUM: AtomicI32 = AtomicI32::new(0);

/// True once a handled signal arrived (or [`trigger`] was called).
#[inline]
pub(crate) fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// The signal that initiated shutdown, 0 for a programmatic stop.
#[allow(dead_code)]
pub(crate) fn last_signal() -> i32 {
    SIGNUM.load(Ordering::Acquire)
}

/// Clears the flag so a new engine run starts clean.
pub(crate) fn rearm() {
    SIGNUM.store(0, Ordering::Release);
    SHUTDOWN.store(false, Ordering::Release);
}

#[cfg(unix)]
mod os {
    use super::{Ordering, SHUTDOWN, SIGNUM};

    extern "C" fn on_signal(signum: libc::c_int) {
        SIGNUM.store(signum, Ordering::Relaxed);
        SHUTDOWN.store(true, Ordering::Relaxed);
    }

    fn set_action(signum: i32, handler: libc::sighandler_t) {
        // SAFETY: plain sigaction installation; the handler only touches
        // atomics.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handler;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signum, &action, std::ptr::null_mut());
        }
    }

    /// Routes `signum` to the shutdown flag.
    pub(crate) fn install(signum: i32) {
        set_action(signum, on_signal as usize as libc::sighandler_t);
    }

    /// Suppresses `signum` entirely.
    pub(crate) fn ignore(signum: i32) {
        set_action(signum, libc::SIG_IGN);
    }

    /// Restores the OS default disposition.
    pub(crate) fn restore_default(signum: i32) {
        set_action(signum, libc::SIG_DFL);
    }
}

#[cfg(unix)]
pub(crate) use os::{ignore, install, restore_default};

#[cfg(not(unix))]
mod os_stub {
    pub(crate) fn install(_signum: i32) {}
    pub(crate) fn ignore(_signum: i32) {}
    pub(crate) fn restore_default(_signum: i32) {}
}

#[cfg(not(unix))]
pub(crate) use os_stub::{ignore, install, restore_default};
