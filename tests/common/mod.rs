//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use tripwire::{Diagnostics, terminate::UnwindTerminator};

/// In-memory report sink. Clones share the buffer.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn report_count(&self) -> usize {
        self.text().matches("ASSERT\n").count()
    }

    /// The lines after the `key=value` pairs of the first report.
    pub fn stack_lines(&self) -> Vec<String> {
        self.text()
            .lines()
            .skip_while(|line| *line != "ASSERT")
            .skip(1)
            .skip_while(|line| line.starts_with("   "))
            .map(String::from)
            .collect()
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

/// A fresh context that unwinds instead of exiting and writes to a
/// [`Capture`]. The stack section is left out.
pub fn diagnostics() -> (Arc<Diagnostics>, Capture) {
    let diagnostics = Diagnostics::new();
    let capture = Capture::default();
    diagnostics.set_sink(capture.clone());
    diagnostics.set_terminator(UnwindTerminator);
    diagnostics.disable_stack();
    (Arc::new(diagnostics), capture)
}
