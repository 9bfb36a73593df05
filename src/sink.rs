//! Destination of formatted failure reports.

use alloc::boxed::Box;
use core::fmt;
use std::io::{self, Write};

use crate::lock::StateLock;

type BoxedSink = Box<dyn Write + Send + Sync>;

/// Holds the current report destination. Standard error until replaced.
pub(crate) struct SinkSlot {
    sink: StateLock<BoxedSink>,
}

impl SinkSlot {
    pub(crate) const fn new() -> Self {
        Self {
            sink: StateLock::new(),
        }
    }

    /// Replaces the destination. The previous one is flushed and dropped.
    pub(crate) fn set<W>(&self, sink: W)
    where
        W: Write + Send + Sync + 'static,
    {
        let previous = self.sink.write().get().replace(Box::new(sink));
        if let Some(mut previous) = previous
            && let Err(error) = previous.flush()
        {
            tracing::warn!(%error, "failed to flush replaced failure report sink");
        }
    }

    /// Restores the default destination, standard error.
    pub(crate) fn reset(&self) {
        let previous = self.sink.write().get().take();
        drop(previous);
    }

    /// Writes one complete report.
    ///
    /// The lock is held for the whole write so that concurrent reports are
    /// never interleaved.
    pub(crate) fn write_report(&self, report: &str) -> io::Result<()> {
        write_to(self.sink.write().get().as_mut(), report)
    }

    /// Writes a report raised from inside another report on the same thread.
    ///
    /// That thread may be inside the sink's own `write` already, so the lock
    /// is not waited for. A busy sink is replaced by standard error.
    pub(crate) fn write_nested_report(&self, report: &str) -> io::Result<()> {
        match self.sink.try_write() {
            Some(mut guard) => write_to(guard.get().as_mut(), report),
            None => write_to(None, report),
        }
    }
}

fn write_to(sink: Option<&mut BoxedSink>, report: &str) -> io::Result<()> {
    match sink {
        Some(sink) => {
            sink.write_all(report.as_bytes())?;
            sink.flush()
        }
        None => {
            let mut stderr = io::stderr().lock();
            stderr.write_all(report.as_bytes())?;
            stderr.flush()
        }
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let custom = self.sink.read().get().is_some();
        f.debug_struct("SinkSlot")
            .field("sink", if custom { &"custom" } else { &"stderr" })
            .finish()
    }
}
