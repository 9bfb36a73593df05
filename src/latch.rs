//! Guard against a failure report recursing into itself.
//!
//! A flush handler or a diagnostic dump can fail an assertion of its own,
//! directly or through something it calls. Without a guard the nested report
//! would run the same callbacks again, which fail again, and so on. The latch
//! breaks the cycle: only the first report of a
//! [`Diagnostics`](crate::Diagnostics) runs the flush handlers, and a report
//! raised from inside it on the same thread calls no user code at all.
//!
//! A report raised on another thread while the first one is in progress
//! waits for it to finish before writing its own.
//!
//! There is no way back to [`LatchState::Clear`]. The process is about to
//! exit once a report has started.

use core::{
    cell::Cell,
    sync::atomic::{AtomicU8, AtomicUsize, Ordering},
    time::Duration,
};
use std::time::Instant;

/// State of the reentrancy latch of a [`Diagnostics`](crate::Diagnostics).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LatchState {
    /// No failure report has started yet.
    Clear,
    /// A failure report has started.
    Set,
}

const CLEAR: u8 = 0;
const REPORTING: u8 = 1;
const FINISHED: u8 = 2;

/// How a report relates to the reports that came before it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    /// The first report. Runs the flush handlers and the dumps.
    First,
    /// Raised on the thread that is writing the first report, from inside a
    /// callback of it.
    Nested,
    /// Any other report. Waits for the first one to finish.
    Later,
}

thread_local! {
    static THREAD_MARKER: Cell<u8> = const { Cell::new(0) };
}

// Address of a thread local, unique among live threads.
fn thread_token() -> usize {
    THREAD_MARKER.with(|marker| core::ptr::from_ref(marker).addr())
}

/// One-way switch from CLEAR through REPORTING to FINISHED, remembering
/// which thread owns the first report.
#[derive(Debug)]
pub(crate) struct ReentrancyLatch {
    state: AtomicU8,
    owner: AtomicUsize,
}

impl ReentrancyLatch {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(CLEAR),
            owner: AtomicUsize::new(0),
        }
    }

    /// Registers a new report. Only the caller that gets [`Entry::First`]
    /// owns the flush step.
    pub(crate) fn enter(&self) -> Entry {
        let token = thread_token();
        match self
            .state
            .compare_exchange(CLEAR, REPORTING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.owner.store(token, Ordering::Release);
                Entry::First
            }
            Err(REPORTING) if self.owner.load(Ordering::Acquire) == token => Entry::Nested,
            Err(_) => Entry::Later,
        }
    }

    /// Marks the first report as finished.
    pub(crate) fn finish(&self) {
        self.state.store(FINISHED, Ordering::Release);
    }

    /// Waits until the first report has finished, for at most `timeout`.
    ///
    /// Returns `false` if the wait timed out.
    pub(crate) fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.state.load(Ordering::Acquire) != FINISHED {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    pub(crate) fn state(&self) -> LatchState {
        match self.state.load(Ordering::Acquire) {
            CLEAR => LatchState::Clear,
            _ => LatchState::Set,
        }
    }
}

/// Marks the first report as finished when dropped, including when the
/// report unwinds through an unwinding terminator.
pub(crate) struct FirstReport<'a>(pub(crate) &'a ReentrancyLatch);

impl Drop for FirstReport<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}
