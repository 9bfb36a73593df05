//! Registered debug state that is dumped into every failure report.
//!
//! Long-lived components register a [`Dumpable`] under a key when they come
//! up and remove it when they go away. Whenever an assertion fails, every
//! registered entry is asked for a summary, and the summaries are printed
//! after the caller-supplied fields.
//!
//! ```rust
//! use tripwire::Diagnostics;
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.add_diagnostic("queue", || "depth=3 head=17".to_string());
//!
//! assert_eq!(
//!     diagnostics.snapshot(),
//!     vec![("queue".to_string(), "depth=3 head=17".to_string())]
//! );
//!
//! diagnostics.remove_diagnostic("queue");
//! assert!(diagnostics.snapshot().is_empty());
//! ```

use alloc::{borrow::Cow, string::String, vec::Vec};
use core::fmt;

use indexmap::IndexMap;
use triomphe::Arc;
use unsize::CoerceUnsize;

use crate::{lock::StateLock, terminate::catch_callback};

/// An object that can describe its current state for a failure report.
///
/// Closures returning a [`String`] implement this trait, which is usually the
/// simplest way to register state that lives elsewhere.
pub trait Dumpable: 'static + Send + Sync {
    /// Produces a human-readable summary of the current state.
    fn dump(&self) -> String;
}

impl<F> Dumpable for F
where
    F: Fn() -> String + 'static + Send + Sync,
{
    fn dump(&self) -> String {
        self()
    }
}

type EntryMap = IndexMap<Cow<'static, str>, Arc<dyn Dumpable>, rustc_hash::FxBuildHasher>;

/// Mapping from a key to a [`Dumpable`], one entry per key.
pub(crate) struct DiagnosticRegistry {
    entries: StateLock<EntryMap>,
}

impl DiagnosticRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            entries: StateLock::new(),
        }
    }

    /// Inserts `entry` under `key`, replacing whatever was there.
    pub(crate) fn add<D>(&self, key: impl Into<Cow<'static, str>>, entry: D)
    where
        D: Dumpable,
    {
        let entry = Arc::new(entry).unsize(unsize::Coercion!(to dyn Dumpable));
        let previous = self
            .entries
            .write()
            .get_or_insert_with(EntryMap::default)
            .insert(key.into(), entry);
        // Dropped after the lock is released, in case its destructor
        // touches the registry.
        drop(previous);
    }

    pub(crate) fn remove(&self, key: &str) {
        let removed = self
            .entries
            .write()
            .get()
            .as_mut()
            .and_then(|entries| entries.shift_remove(key));
        drop(removed);
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .get()
            .is_some_and(|entries| entries.contains_key(key))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().get().map_or(0, IndexMap::len)
    }

    /// Dumps every entry.
    ///
    /// The entries are cloned out of the lock first, so a `dump`
    /// implementation is free to add or remove entries itself. A dump that
    /// panics is reported in place of its output.
    pub(crate) fn snapshot(&self) -> Vec<(String, String)> {
        let entries: Vec<(Cow<'static, str>, Arc<dyn Dumpable>)> = match self.entries.read().get() {
            Some(entries) => entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
            None => return Vec::new(),
        };

        entries
            .into_iter()
            .map(|(key, entry)| {
                let dump = catch_callback(|| entry.dump()).unwrap_or_else(|message| {
                    tracing::error!(%key, panic = %message, "diagnostic dump panicked");
                    alloc::format!("<dump panicked: {message}>")
                });
                (key.into_owned(), dump)
            })
            .collect()
    }
}

impl fmt::Debug for DiagnosticRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.entries.read();
        let mut list = f.debug_set();
        if let Some(entries) = guard.get() {
            list.entries(entries.keys());
        }
        list.finish()
    }
}
