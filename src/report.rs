//! The failure record and its textual layout.
//!
//! A report looks like this:
//!
//! ```text
//! ARGS: [a 1]
//! ASSERT
//!    msg=queue must not be empty
//!    area=Assert
//!    location=src/worker.rs:88:9
//!    a=1
//!    queue=depth=0 head=17
//! pop             - /build/app/src/worker.rs:88
//! run             - /build/app/src/worker.rs:40
//! main            - /build/app/src/main.rs:12
//! note: 31 frame(s) hidden. For a complete stack, set RUST_BACKTRACE=full.
//! ```
//!
//! The layout is meant for humans. It is not a stable, parseable format.

use alloc::{string::String, vec::Vec};
use core::{fmt, panic::Location};

use crate::fields::{Field, Fields};

/// Everything known about one failed assertion.
#[derive(Clone, Debug)]
pub struct FailureRecord {
    /// The message passed to the failing predicate.
    pub message: String,
    /// Where the failing predicate was called.
    pub location: &'static Location<'static>,
    /// Caller-supplied fields, in call order.
    pub fields: Fields,
    /// Registered diagnostic dumps, taken after the flush handlers ran.
    pub diagnostics: Vec<(String, String)>,
    /// Notes about the report itself, such as flush handlers that panicked
    /// or steps that were skipped.
    pub notes: Vec<Field>,
    /// Rendered call stack, if captured.
    pub stack: Option<String>,
}

impl FailureRecord {
    /// All `key=value` lines of the report, in output order.
    ///
    /// The message, area and location come first, then the caller fields,
    /// then the registered diagnostics, then the notes.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        let header = [
            ("msg", self.message.clone()),
            ("area", String::from("Assert")),
            (
                "location",
                alloc::format!(
                    "{}:{}:{}",
                    self.location.file(),
                    self.location.line(),
                    self.location.column()
                ),
            ),
        ];
        let fields = self
            .fields
            .iter()
            .map(|field| (field.key.as_ref(), field.value.clone()));
        let diagnostics = self
            .diagnostics
            .iter()
            .map(|(key, dump)| (key.as_str(), dump.clone()));
        let notes = self
            .notes
            .iter()
            .map(|field| (field.key.as_ref(), field.value.clone()));

        header
            .into_iter()
            .chain(fields)
            .chain(diagnostics)
            .chain(notes)
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ARGS: {}", self.fields)?;
        writeln!(f, "ASSERT")?;
        for (key, value) in self.pairs() {
            writeln!(f, "   {key}={value}")?;
        }
        if let Some(stack) = &self.stack {
            write!(f, "{stack}")?;
            if !stack.ends_with('\n') {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
