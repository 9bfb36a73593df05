//! The diagnostics context: everything a failure report draws on.

use alloc::{borrow::Cow, string::String, vec::Vec};
use core::{fmt, panic::Location, time::Duration};
use std::io::Write;

use triomphe::Arc;
use unsize::CoerceUnsize;

use crate::{
    fields::{Field, Fields},
    flush::{FlushRegistry, Flushable},
    latch::{Entry, FirstReport, LatchState, ReentrancyLatch},
    lock::StateLock,
    registry::{DiagnosticRegistry, Dumpable},
    report::FailureRecord,
    sink::SinkSlot,
    stack::{StackConfig, StackFilter},
    terminate::{ExitProcess, Terminator},
};

/// Exit code used when an assertion fails.
pub const FAILURE_EXIT_CODE: i32 = 1;

// Bound on how long a report from another thread waits for the first one.
const EARLIER_REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner of the registered diagnostic state, the flush handlers, the report
/// sink and the termination strategy.
///
/// Most programs use the process-wide instance returned by
/// [`Diagnostics::global`], which is what the free functions and macros of
/// this crate operate on. Independent instances are useful in tests, or for
/// subsystems that want their own failure context.
///
/// All methods take `&self` and are safe to call from any thread.
///
/// # Examples
///
/// ```rust
/// use tripwire::{Diagnostics, fields, terminate::{Terminated, UnwindTerminator}};
///
/// let diagnostics = Diagnostics::new();
/// diagnostics.set_terminator(UnwindTerminator);
/// diagnostics.set_sink(std::io::sink());
/// diagnostics.add_diagnostic("config", || "retries=3".to_string());
///
/// // A satisfied check returns normally.
/// diagnostics.check(true, "unreachable", fields![]);
///
/// let terminated = Terminated::catch(|| {
///     diagnostics.check(false, "retries exhausted", fields!["attempt" => 4]);
/// });
/// assert_eq!(terminated, Some(Terminated { code: 1 }));
/// ```
pub struct Diagnostics {
    registry: DiagnosticRegistry,
    flushes: FlushRegistry,
    sink: SinkSlot,
    latch: ReentrancyLatch,
    terminator: StateLock<Arc<dyn Terminator>>,
    stack: StateLock<StackConfig>,
}

static GLOBAL: Diagnostics = Diagnostics::new();

impl Diagnostics {
    /// Creates an empty context that reports to standard error and exits
    /// the process on failure.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registry: DiagnosticRegistry::new(),
            flushes: FlushRegistry::new(),
            sink: SinkSlot::new(),
            latch: ReentrancyLatch::new(),
            terminator: StateLock::new(),
            stack: StateLock::new(),
        }
    }

    /// The process-wide context.
    pub fn global() -> &'static Diagnostics {
        &GLOBAL
    }

    /// Registers `entry` under `key`. Its dump is included in every failure
    /// report until the key is removed. A second registration under the same
    /// key replaces the first.
    pub fn add_diagnostic<D>(&self, key: impl Into<Cow<'static, str>>, entry: D)
    where
        D: Dumpable,
    {
        self.registry.add(key, entry);
    }

    /// Removes the entry registered under `key`, if any.
    pub fn remove_diagnostic(&self, key: &str) {
        self.registry.remove(key);
    }

    /// Returns `true` if an entry is registered under `key`.
    pub fn has_diagnostic(&self, key: &str) -> bool {
        self.registry.contains(key)
    }

    /// Number of registered diagnostic entries.
    pub fn diagnostic_count(&self) -> usize {
        self.registry.len()
    }

    /// Dumps every registered entry, as a failure report would.
    ///
    /// The order of the returned pairs is unspecified.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.registry.snapshot()
    }

    /// Registers a handler to run before every future failure report.
    ///
    /// Handlers run in registration order and cannot be unregistered.
    #[track_caller]
    pub fn add_flush_handler<F>(&self, handler: F)
    where
        F: Flushable,
    {
        self.flushes.register(handler);
    }

    /// Number of registered flush handlers.
    pub fn flush_handler_count(&self) -> usize {
        self.flushes.len()
    }

    /// Sends future failure reports to `sink` instead of the current
    /// destination.
    pub fn set_sink<W>(&self, sink: W)
    where
        W: Write + Send + Sync + 'static,
    {
        self.sink.set(sink);
    }

    /// Sends future failure reports to standard error again.
    pub fn reset_sink(&self) {
        self.sink.reset();
    }

    /// Replaces the termination strategy. The default is [`ExitProcess`].
    pub fn set_terminator<T>(&self, terminator: T)
    where
        T: Terminator,
    {
        let terminator = Arc::new(terminator).unsize(unsize::Coercion!(to dyn Terminator));
        let previous = self.terminator.write().get().replace(terminator);
        drop(previous);
    }

    /// Replaces the stack filter. The default is derived from the
    /// environment, see [`StackFilter::from_env`].
    pub fn set_stack_filter(&self, filter: StackFilter) {
        let mut guard = self.stack.write();
        let config = guard.get_or_insert_with(StackConfig::from_env);
        config.filter = filter;
        config.enabled = true;
    }

    /// Leaves the call stack out of future failure reports.
    pub fn disable_stack(&self) {
        self.stack
            .write()
            .get_or_insert_with(StackConfig::from_env)
            .enabled = false;
    }

    /// State of the reentrancy latch. [`LatchState::Set`] once a failure
    /// report has started.
    pub fn latch_state(&self) -> LatchState {
        self.latch.state()
    }

    /// Returns `true` once a failure report has started.
    pub fn is_reporting(&self) -> bool {
        self.latch.state() == LatchState::Set
    }

    /// Reports a failed assertion and terminates.
    ///
    /// The first report of a context runs the flush handlers, dumps the
    /// registered diagnostics, writes the failure record to the sink and
    /// hands control to the terminator with [`FAILURE_EXIT_CODE`].
    ///
    /// A report raised from inside the first one on the same thread, by a
    /// flush handler, a dump or the sink, calls none of them again. It is
    /// written to standard error if the sink is the one that failed. A report
    /// raised on another thread waits for the first one to finish and skips
    /// the flush handlers.
    #[track_caller]
    #[cold]
    pub fn report(&self, message: &str, fields: Fields) -> ! {
        let location = Location::caller();

        let entry = self.latch.enter();
        let _first = (entry == Entry::First).then(|| FirstReport(&self.latch));

        let (diagnostics, notes) = match entry {
            Entry::First => {
                let notes = self.flushes.run_all();
                (self.registry.snapshot(), notes)
            }
            Entry::Nested => {
                tracing::warn!(
                    %location,
                    "assertion failed inside a failure report; skipping flush handlers and dumps"
                );
                let note = Field::new(
                    "note",
                    "raised while reporting an earlier failure, flush handlers and dumps skipped",
                );
                (Vec::new(), alloc::vec![note])
            }
            Entry::Later => {
                if !self.latch.wait_finished(EARLIER_REPORT_TIMEOUT) {
                    tracing::warn!(%location, "timed out waiting for an earlier failure report");
                }
                tracing::warn!(
                    %location,
                    "assertion failed after an earlier failure report; skipping flush handlers"
                );
                (self.registry.snapshot(), Vec::new())
            }
        };

        let record = FailureRecord {
            message: String::from(message),
            location,
            fields,
            diagnostics,
            notes,
            stack: self.stack_config().render(),
        };

        tracing::error!(assertion = %record.message, %location, "assertion failed");

        let report = record.to_string();
        let written = match entry {
            Entry::Nested => self.sink.write_nested_report(&report),
            Entry::First | Entry::Later => self.sink.write_report(&report),
        };
        if let Err(error) = written {
            tracing::warn!(%error, "failed to write failure report");
        }

        self.terminate()
    }

    fn stack_config(&self) -> StackConfig {
        *self.stack.write().get_or_insert_with(StackConfig::from_env)
    }

    fn terminate(&self) -> ! {
        let terminator = self.terminator.read().get().cloned();
        match terminator {
            Some(terminator) => terminator.terminate(FAILURE_EXIT_CODE),
            None => ExitProcess.terminate(FAILURE_EXIT_CODE),
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("registry", &self.registry)
            .field("flushes", &self.flushes)
            .field("sink", &self.sink)
            .field("latch", &self.latch.state())
            .finish_non_exhaustive()
    }
}

/// Registers `entry` under `key` in the global context.
///
/// See [`Diagnostics::add_diagnostic`].
pub fn add_diagnostic<D>(key: impl Into<Cow<'static, str>>, entry: D)
where
    D: Dumpable,
{
    GLOBAL.add_diagnostic(key, entry);
}

/// Removes `key` from the global context.
pub fn remove_diagnostic(key: &str) {
    GLOBAL.remove_diagnostic(key);
}

/// Registers a flush handler in the global context.
///
/// See [`Diagnostics::add_flush_handler`].
#[track_caller]
pub fn add_flush_handler<F>(handler: F)
where
    F: Flushable,
{
    GLOBAL.add_flush_handler(handler);
}

/// Sends failure reports of the global context to `sink`.
pub fn set_sink<W>(sink: W)
where
    W: Write + Send + Sync + 'static,
{
    GLOBAL.set_sink(sink);
}
