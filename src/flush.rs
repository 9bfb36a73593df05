//! Side effects that must complete before a failure report is written.
//!
//! Buffered writers, log appenders and similar components register a
//! [`Flushable`] so that their pending output reaches its destination before
//! the process exits. Handlers run in registration order, once per failure.
//!
//! Registration is add-only: a handler stays registered for the rest of the
//! lifetime of the [`Diagnostics`](crate::Diagnostics) it was added to.
//!
//! # Failure policy
//!
//! A handler that panics is caught. The panic is logged, recorded in the
//! failure report as a `flush_panic` field, and the next handler runs. The
//! only panic that is let through is the one raised by
//! [`UnwindTerminator`](crate::terminate::UnwindTerminator), since it stands
//! in for the process exiting.

use alloc::vec::Vec;
use core::{fmt, panic::Location};

use triomphe::Arc;
use unsize::CoerceUnsize;

use crate::{fields::Field, lock::StateLock, terminate::catch_callback};

/// A side effect to run before a failure is reported.
///
/// Closures taking no arguments implement this trait.
pub trait Flushable: 'static + Send + Sync {
    /// Pushes any pending state to its destination.
    fn flush(&self);
}

impl<F> Flushable for F
where
    F: Fn() + 'static + Send + Sync,
{
    fn flush(&self) {
        self()
    }
}

struct Handler {
    flushable: Arc<dyn Flushable>,
    added_at: &'static Location<'static>,
}

impl Clone for Handler {
    fn clone(&self) -> Self {
        Self {
            flushable: self.flushable.clone(),
            added_at: self.added_at,
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flush handler registered at {}:{}",
            self.added_at.file(),
            self.added_at.line()
        )
    }
}

/// Ordered, add-only list of [`Flushable`]s.
pub(crate) struct FlushRegistry {
    handlers: StateLock<Vec<Handler>>,
}

impl FlushRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            handlers: StateLock::new(),
        }
    }

    #[track_caller]
    pub(crate) fn register<F>(&self, flushable: F)
    where
        F: Flushable,
    {
        let handler = Handler {
            flushable: Arc::new(flushable).unsize(unsize::Coercion!(to dyn Flushable)),
            added_at: Location::caller(),
        };
        self.handlers
            .write()
            .get_or_insert_with(Vec::new)
            .push(handler);
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.read().get().map_or(0, Vec::len)
    }

    /// Runs every handler registered so far, in order.
    ///
    /// Returns one `flush_panic` field per handler that panicked. Handlers
    /// registered while this runs are not part of this round.
    pub(crate) fn run_all(&self) -> Vec<Field> {
        let handlers: Vec<Handler> = self.handlers.read().get().cloned().unwrap_or_default();

        let mut failures = Vec::new();
        for handler in &handlers {
            if let Err(message) = catch_callback(|| handler.flushable.flush()) {
                tracing::error!(
                    handler = %handler,
                    panic = %message,
                    "flush handler panicked while preparing a failure report"
                );
                failures.push(Field::new(
                    "flush_panic",
                    alloc::format!("{handler}: {message}"),
                ));
            }
        }
        failures
    }
}

impl fmt::Debug for FlushRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
