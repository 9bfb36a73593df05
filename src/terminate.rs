//! How a failure report ends the program.
//!
//! In production the default [`ExitProcess`] terminator calls
//! [`std::process::exit`]. Test suites install an [`UnwindTerminator`]
//! instead, which unwinds with a [`Terminated`] payload that the test can
//! catch:
//!
//! ```rust
//! use tripwire::{
//!     Diagnostics, fields,
//!     terminate::{Terminated, UnwindTerminator},
//! };
//!
//! let diagnostics = Diagnostics::new();
//! diagnostics.set_terminator(UnwindTerminator);
//! diagnostics.set_sink(std::io::sink());
//!
//! let terminated = Terminated::catch(|| diagnostics.check(1 + 1 == 3, "math is broken", fields![]));
//! assert_eq!(terminated, Some(Terminated { code: 1 }));
//! ```

use alloc::{boxed::Box, string::String};
use core::{fmt, panic::AssertUnwindSafe};
use std::panic;

/// Ends the program after a failure report has been written.
pub trait Terminator: 'static + Send + Sync {
    /// Terminates with the given exit code. Must not return.
    fn terminate(&self, code: i32) -> !;
}

/// Exits the process with [`std::process::exit`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ExitProcess;

impl Terminator for ExitProcess {
    fn terminate(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Unwinds the current thread with a [`Terminated`] payload instead of
/// exiting.
///
/// Intended for tests. The flush machinery recognizes the payload and never
/// treats it as a failing flush handler.
#[derive(Copy, Clone, Debug, Default)]
pub struct UnwindTerminator;

impl Terminator for UnwindTerminator {
    fn terminate(&self, code: i32) -> ! {
        panic::resume_unwind(Box::new(Terminated { code }))
    }
}

/// Panic payload raised by [`UnwindTerminator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Terminated {
    /// The exit code the process would have exited with.
    pub code: i32,
}

impl Terminated {
    /// Runs `f`, intercepting a termination raised by [`UnwindTerminator`].
    ///
    /// Returns `None` if `f` returned normally. Panics that are not
    /// terminations are resumed.
    pub fn catch(f: impl FnOnce()) -> Option<Terminated> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => None,
            Err(payload) => match payload.downcast::<Terminated>() {
                Ok(terminated) => Some(*terminated),
                Err(payload) => panic::resume_unwind(payload),
            },
        }
    }
}

/// Runs a user callback from inside the failure pipeline.
///
/// A panic is turned into its message so the report can go on. A
/// [`Terminated`] unwind is resumed.
pub(crate) fn catch_callback<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        if payload.is::<Terminated>() {
            panic::resume_unwind(payload);
        }
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            String::from(*message)
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            String::from("<non-string panic payload>")
        }
    })
}

impl fmt::Display for Terminated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminated with exit code {}", self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_returns_none_without_termination() {
        assert_eq!(Terminated::catch(|| {}), None);
    }

    #[test]
    fn test_catch_intercepts_unwind_terminator() {
        let terminated = Terminated::catch(|| UnwindTerminator.terminate(3));
        assert_eq!(terminated, Some(Terminated { code: 3 }));
    }

    #[test]
    fn test_catch_resumes_other_panics() {
        let result = panic::catch_unwind(|| Terminated::catch(|| panic!("unrelated")));
        assert!(result.is_err());
    }

    #[test]
    fn test_catch_callback_turns_panics_into_messages() {
        assert_eq!(catch_callback(|| 4), Ok(4));
        assert_eq!(
            catch_callback::<()>(|| panic!("static message")),
            Err(String::from("static message"))
        );
        let index = 9;
        assert_eq!(
            catch_callback::<()>(|| panic!("slot {index} missing")),
            Err(String::from("slot 9 missing"))
        );
        assert_eq!(
            catch_callback::<()>(|| panic::panic_any(17u8)),
            Err(String::from("<non-string panic payload>"))
        );
    }

    #[test]
    fn test_catch_callback_resumes_termination() {
        let terminated = Terminated::catch(|| {
            let _ = catch_callback::<()>(|| UnwindTerminator.terminate(2));
        });
        assert_eq!(terminated, Some(Terminated { code: 2 }));
    }

    #[test]
    fn test_terminators_are_send_sync() {
        static_assertions::assert_impl_all!(ExitProcess: Terminator, Send, Sync, Copy);
        static_assertions::assert_impl_all!(UnwindTerminator: Terminator, Send, Sync, Copy);
    }
}
