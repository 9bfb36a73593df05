#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Runtime assertions that stop the process with a useful report.
//!
//! ## Overview
//!
//! A failed assertion in a long running service is usually hard to debug
//! after the fact: the process is gone, and the only trace left is a one-line
//! message. This crate makes a failed assertion leave a complete record
//! behind. Before the process exits it:
//!
//! 1. runs every registered **flush handler**, so buffered logs and metrics
//!    reach their destination,
//! 2. writes a **failure report** containing the message, the caller's
//!    fields, a dump of every registered **diagnostic** and the call stack,
//! 3. exits with status code [`FAILURE_EXIT_CODE`].
//!
//! ## Quick Example
//!
//! ```no_run
//! use tripwire::{add_diagnostic, add_flush_handler, check, not_nil};
//!
//! add_diagnostic("build", || format!("version={}", env!("CARGO_PKG_VERSION")));
//! add_flush_handler(|| {
//!     // Push buffered log lines out before the process exits.
//! });
//!
//! let workers = 4;
//! check!(workers > 0, "worker pool must not be empty", "workers" => workers);
//!
//! let config: Option<Box<str>> = None;
//! not_nil!(config, "configuration must be loaded"); // exits here
//! ```
//!
//! The report written to standard error looks like this:
//!
//! ```text
//! ARGS: []
//! ASSERT
//!    msg=configuration must be loaded
//!    area=Assert
//!    location=src/main.rs:11:1
//!    build=version=0.1.0
//! main            - /build/app/src/main.rs:11
//! ```
//!
//! ## Predicates
//!
//! | Macro          | Fails when                                              |
//! |----------------|---------------------------------------------------------|
//! | [`check!`]     | the condition is false                                  |
//! | [`no_error!`]  | the [`Fallible`] value carries an error                 |
//! | [`nil!`]       | the value is not nil                                    |
//! | [`not_nil!`]   | the value is nil, see [`Nullable`]                      |
//! | [`never!`]     | always                                                  |
//!
//! The macros only render their fields when the check fails, and accept an
//! explicit context with a leading `in <diagnostics>;`. The same checks are
//! available as methods on [`Diagnostics`] and as free functions taking an
//! already built [`Fields`] list.
//!
//! ## Contexts
//!
//! All state lives in a [`Diagnostics`] value. The free functions and macros
//! use the process-wide [`Diagnostics::global`] instance; tests and isolated
//! subsystems can create their own with [`Diagnostics::new`].
//!
//! A failure never returns. By default the process exits; the
//! [`terminate`] module has a [`Terminator`](terminate::Terminator) that
//! unwinds instead, which is what tests use to observe failures.
//!
//! ## Configuration
//!
//! The stack section of a report is filtered to the frames that matter. It
//! follows two environment variables, read once:
//!
//! - `RUST_BACKTRACE=full` disables filtering.
//! - `TRIPWIRE_BACKTRACE` takes a comma-separated list of `full_paths` and
//!   `off`.
//!
//! Filtering needs the `backtrace` feature, which is on by default. Without
//! it the unfiltered standard library backtrace is used. See [`stack`].

extern crate alloc;

#[macro_use]
mod macros;

mod diagnostics;
mod fields;
mod flush;
mod latch;
mod lock;
mod predicates;
mod registry;
mod report;
mod sink;
#[cfg(test)]
mod testing;

pub mod stack;
pub mod terminate;

pub use self::{
    diagnostics::{
        Diagnostics, FAILURE_EXIT_CODE, add_diagnostic, add_flush_handler, remove_diagnostic,
        set_sink,
    },
    fields::{Field, Fields},
    flush::Flushable,
    latch::LatchState,
    predicates::{Fallible, Nullable, check, never, nil, no_error, not_nil},
    registry::Dumpable,
    report::FailureRecord,
};

// Not public API. Referenced by macro-generated code.
#[doc(hidden)]
pub mod __private {
    use alloc::string::String;

    use crate::{Diagnostics, Fields};

    #[doc(hidden)]
    #[cold]
    #[track_caller]
    pub fn fail(diagnostics: &Diagnostics, message: &str, fields: Fields) -> ! {
        diagnostics.report(message, fields)
    }

    #[doc(hidden)]
    #[cold]
    #[track_caller]
    pub fn fail_with_error(
        diagnostics: &Diagnostics,
        message: &str,
        fields: Fields,
        description: String,
    ) -> ! {
        diagnostics.error_violation(message, fields, description)
    }

    #[doc(hidden)]
    #[inline]
    #[track_caller]
    pub fn nil_outcome(
        diagnostics: &Diagnostics,
        is_null: bool,
        describe: impl Fn() -> String,
        message: &str,
        fields: impl FnOnce() -> Fields,
    ) {
        diagnostics.nil_outcome(is_null, describe, message, fields);
    }

    #[doc(hidden)]
    #[inline]
    #[track_caller]
    pub fn not_nil_outcome(
        diagnostics: &Diagnostics,
        is_null: bool,
        describe: impl Fn() -> String,
        message: &str,
        fields: impl FnOnce() -> Fields,
    ) {
        diagnostics.not_nil_outcome(is_null, describe, message, fields);
    }

    #[doc(hidden)]
    pub mod kind {
        use alloc::{format, string::String};
        use core::fmt;

        use crate::Nullable;

        #[doc(hidden)]
        pub struct Wrap<'a, T>(pub &'a T);

        #[doc(hidden)]
        pub trait DisplayKind {
            fn render(&self) -> String;
        }

        impl<T> DisplayKind for &Wrap<'_, T>
        where
            T: fmt::Display,
        {
            #[inline(always)]
            fn render(&self) -> String {
                format!("{}", self.0)
            }
        }

        #[doc(hidden)]
        pub trait DebugKind {
            fn render(&self) -> String;
        }

        impl<T> DebugKind for Wrap<'_, T>
        where
            T: fmt::Debug,
        {
            #[inline(always)]
            fn render(&self) -> String {
                format!("{:?}", self.0)
            }
        }

        #[doc(hidden)]
        pub trait DisplayItem {
            fn describe_item(&self) -> String;
        }

        impl<T> DisplayItem for &&Wrap<'_, T>
        where
            T: fmt::Display,
        {
            #[inline(always)]
            fn describe_item(&self) -> String {
                format!("{}", self.0)
            }
        }

        #[doc(hidden)]
        pub trait DebugItem {
            fn describe_item(&self) -> String;
        }

        impl<T> DebugItem for &Wrap<'_, T>
        where
            T: fmt::Debug,
        {
            #[inline(always)]
            fn describe_item(&self) -> String {
                format!("{:?}", self.0)
            }
        }

        #[doc(hidden)]
        pub trait TypeNameItem {
            fn describe_item(&self) -> String;
        }

        impl<T> TypeNameItem for Wrap<'_, T> {
            #[inline(always)]
            fn describe_item(&self) -> String {
                String::from(core::any::type_name::<T>())
            }
        }

        #[doc(hidden)]
        pub trait NullableKind {
            fn is_null_item(&self) -> bool;
        }

        impl<T> NullableKind for &Wrap<'_, T>
        where
            T: Nullable,
        {
            #[inline(always)]
            fn is_null_item(&self) -> bool {
                Nullable::is_null(self.0)
            }
        }

        #[doc(hidden)]
        pub trait OptionKind {
            fn is_null_item(&self) -> bool;
        }

        impl<T> OptionKind for Wrap<'_, Option<T>> {
            #[inline(always)]
            fn is_null_item(&self) -> bool {
                self.0.is_none()
            }
        }
    }
}
