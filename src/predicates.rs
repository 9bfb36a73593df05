//! The assertion predicates.
//!
//! Each predicate evaluates one condition. When the condition holds it
//! returns without any side effect; otherwise it hands its message and fields
//! to [`Diagnostics::report`], which never returns.
//!
//! The methods here take an already built [`Fields`] list. The macros
//! ([`check!`](crate::check!), [`no_error!`](crate::no_error!),
//! [`nil!`](crate::nil!), [`not_nil!`](crate::not_nil!),
//! [`never!`](crate::never!)) only build the list when the check fails.

use alloc::string::{String, ToString};
use core::{fmt, ptr::NonNull};

use crate::{Diagnostics, fields::Fields};

/// Types that can be "nil": absent, or present but pointing at nothing.
///
/// The implementation for [`Option`] looks through the option: `Some` of a
/// null value is null. This catches the case of a present wrapper around a
/// dangling or null pointer, which a plain `is_none` check would let
/// through.
///
/// ```rust
/// use std::{ptr, sync::{Arc, Weak}};
///
/// use tripwire::Nullable;
///
/// assert!(None::<Box<u8>>.is_null());
/// assert!(Some(ptr::null::<u8>()).is_null());
///
/// let gone: Weak<u8> = Arc::downgrade(&Arc::new(1));
/// assert!(Some(gone).is_null());
///
/// assert!(!Some(Box::new(1)).is_null());
/// ```
pub trait Nullable {
    /// Returns `true` if the value is absent or points at nothing.
    fn is_null(&self) -> bool;
}

impl<T: Nullable> Nullable for Option<T> {
    fn is_null(&self) -> bool {
        self.as_ref().is_none_or(Nullable::is_null)
    }
}

impl<T: Nullable + ?Sized> Nullable for &T {
    fn is_null(&self) -> bool {
        T::is_null(*self)
    }
}

impl<T: ?Sized> Nullable for *const T {
    fn is_null(&self) -> bool {
        <*const T>::is_null(*self)
    }
}

impl<T: ?Sized> Nullable for *mut T {
    fn is_null(&self) -> bool {
        <*mut T>::is_null(*self)
    }
}

impl<T: ?Sized> Nullable for std::sync::Weak<T> {
    fn is_null(&self) -> bool {
        self.strong_count() == 0
    }
}

impl<T: ?Sized> Nullable for std::rc::Weak<T> {
    fn is_null(&self) -> bool {
        self.strong_count() == 0
    }
}

macro_rules! never_null {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<T: ?Sized> Nullable for $ty {
                fn is_null(&self) -> bool {
                    false
                }
            }
        )*
    };
}

never_null!(
    NonNull<T>,
    alloc::boxed::Box<T>,
    std::sync::Arc<T>,
    std::rc::Rc<T>,
    triomphe::Arc<T>,
);

/// Values that may carry an error, checked by [`Diagnostics::no_error`].
pub trait Fallible {
    /// The description of the carried error, if there is one.
    fn error_description(&self) -> Option<String>;
}

impl<T, E: fmt::Display> Fallible for Result<T, E> {
    fn error_description(&self) -> Option<String> {
        self.as_ref().err().map(ToString::to_string)
    }
}

impl<E: fmt::Display> Fallible for Option<E> {
    fn error_description(&self) -> Option<String> {
        self.as_ref().map(ToString::to_string)
    }
}

impl<F: Fallible + ?Sized> Fallible for &F {
    fn error_description(&self) -> Option<String> {
        (**self).error_description()
    }
}

impl Diagnostics {
    /// Fails unless `condition` is true.
    #[track_caller]
    #[inline]
    pub fn check(&self, condition: bool, message: &str, fields: Fields) {
        if !condition {
            self.report(message, fields)
        }
    }

    /// Fails if `result` carries an error. The error's description is
    /// appended to `fields` under the key `error`.
    #[track_caller]
    #[inline]
    pub fn no_error<F>(&self, result: &F, message: &str, fields: Fields)
    where
        F: Fallible + ?Sized,
    {
        if let Some(description) = result.error_description() {
            self.error_violation(message, fields, description)
        }
    }

    /// Fails unless `item` is null.
    #[track_caller]
    #[inline]
    pub fn nil<N>(&self, item: &N, message: &str, fields: Fields)
    where
        N: Nullable + ?Sized,
    {
        self.nil_outcome(item.is_null(), type_name_of::<N>, message, || fields);
    }

    /// Fails if `item` is null, including a present wrapper around a null
    /// value.
    #[track_caller]
    #[inline]
    pub fn not_nil<N>(&self, item: &N, message: &str, fields: Fields)
    where
        N: Nullable + ?Sized,
    {
        self.not_nil_outcome(item.is_null(), type_name_of::<N>, message, || fields);
    }

    /// Always fails. Marks code that must be unreachable.
    #[track_caller]
    pub fn never(&self, message: &str, fields: Fields) -> ! {
        self.report(message, fields)
    }

    #[track_caller]
    #[cold]
    pub(crate) fn error_violation(&self, message: &str, mut fields: Fields, description: String) -> ! {
        fields.push("error", description);
        self.report(message, fields)
    }

    // `fields` is only called on a violation, so the macros can defer
    // rendering their values. `describe` renders the item for the log events.
    #[track_caller]
    pub(crate) fn nil_outcome(
        &self,
        is_null: bool,
        describe: impl Fn() -> String,
        message: &str,
        fields: impl FnOnce() -> Fields,
    ) {
        tracing::debug!(is_null, item = %describe(), "nil check");
        if !is_null {
            tracing::error!(item = %describe(), "nil check encountered a non-nil value");
            self.report(message, fields())
        }
    }

    #[track_caller]
    pub(crate) fn not_nil_outcome(
        &self,
        is_null: bool,
        describe: impl Fn() -> String,
        message: &str,
        fields: impl FnOnce() -> Fields,
    ) {
        if is_null {
            tracing::error!(item = %describe(), "not-nil check encountered a nil value");
            self.report(message, fields())
        }
    }
}

fn type_name_of<N: ?Sized>() -> String {
    String::from(core::any::type_name::<N>())
}

/// Fails the global context unless `condition` is true.
///
/// See [`Diagnostics::check`].
#[track_caller]
pub fn check(condition: bool, message: &str, fields: Fields) {
    Diagnostics::global().check(condition, message, fields);
}

/// Fails the global context if `result` carries an error.
///
/// See [`Diagnostics::no_error`].
#[track_caller]
pub fn no_error<F>(result: &F, message: &str, fields: Fields)
where
    F: Fallible + ?Sized,
{
    Diagnostics::global().no_error(result, message, fields);
}

/// Fails the global context unless `item` is null.
#[track_caller]
pub fn nil<N>(item: &N, message: &str, fields: Fields)
where
    N: Nullable + ?Sized,
{
    Diagnostics::global().nil(item, message, fields);
}

/// Fails the global context if `item` is null.
#[track_caller]
pub fn not_nil<N>(item: &N, message: &str, fields: Fields)
where
    N: Nullable + ?Sized,
{
    Diagnostics::global().not_nil(item, message, fields);
}

/// Fails the global context unconditionally.
#[track_caller]
pub fn never(message: &str, fields: Fields) -> ! {
    Diagnostics::global().never(message, fields)
}
