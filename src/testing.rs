//! Helpers shared by the unit tests.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;
use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use tracing::{
    Event, Metadata, Subscriber,
    field::{Field, Visit},
    span,
};

use crate::{Diagnostics, terminate::UnwindTerminator};

/// In-memory report sink. Clones share the buffer.
#[derive(Clone, Default)]
pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub(crate) fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub(crate) fn report_count(&self) -> usize {
        self.text().matches("ASSERT\n").count()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A context that unwinds instead of exiting, writes to a [`Capture`] and
/// leaves the stack out.
pub(crate) fn context() -> (Diagnostics, Capture) {
    let diagnostics = Diagnostics::new();
    let capture = Capture::default();
    diagnostics.set_sink(capture.clone());
    diagnostics.set_terminator(UnwindTerminator);
    diagnostics.disable_stack();
    (diagnostics, capture)
}

/// One recorded tracing event: its level and `name=value` fields.
#[derive(Clone, Debug)]
pub(crate) struct LoggedEvent {
    pub(crate) level: tracing::Level,
    pub(crate) fields: Vec<(String, String)>,
}

impl LoggedEvent {
    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Subscriber that records every event.
#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<LoggedEvent>>>);

impl EventLog {
    /// Runs `f` with this log as the thread's subscriber.
    pub(crate) fn record<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::subscriber::with_default(self.clone(), f)
    }

    pub(crate) fn events(&self) -> Vec<LoggedEvent> {
        self.0.lock().unwrap().clone()
    }
}

struct FieldRecorder<'a>(&'a mut Vec<(String, String)>);

impl Visit for FieldRecorder<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0
            .push((field.name().to_string(), alloc::format!("{value:?}")));
    }
}

impl Subscriber for EventLog {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }

    fn record(&self, _: &span::Id, _: &span::Record<'_>) {}

    fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut fields = Vec::new();
        event.record(&mut FieldRecorder(&mut fields));
        self.0.lock().unwrap().push(LoggedEvent {
            level: *event.metadata().level(),
            fields,
        });
    }

    fn enter(&self, _: &span::Id) {}

    fn exit(&self, _: &span::Id) {}
}
