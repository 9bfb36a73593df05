/// Builds a [`Fields`](crate::Fields) list from `"key" => value` pairs.
///
/// Values are rendered with [`Display`](core::fmt::Display) if the type
/// implements it, and with [`Debug`](core::fmt::Debug) otherwise. Since keys
/// and values are written as pairs, a key without a value does not compile.
///
/// # Examples
///
/// ```
/// use tripwire::fields;
///
/// let path = std::path::PathBuf::from("/etc/app.toml");
/// let fields = fields!["attempt" => 3, "path" => path];
/// assert_eq!(fields.get("attempt"), Some("3"));
/// assert_eq!(fields.get("path"), Some(r#""/etc/app.toml""#));
///
/// assert!(fields![].is_empty());
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::Fields::new();
        $(
            fields.push($key, {
                use $crate::__private::kind::*;
                let value = &$value;
                (&&Wrap(value)).render()
            });
        )+
        fields
    }};
}

/// Fails unless the condition holds.
///
/// The message and fields are only evaluated when the condition is false.
/// Operates on the global [`Diagnostics`](crate::Diagnostics) unless a
/// context is given with a leading `in <context>;`.
///
/// # Examples
///
/// ```
/// use tripwire::{Diagnostics, check, terminate::{Terminated, UnwindTerminator}};
///
/// let queue: Vec<u32> = Vec::new();
/// check!(queue.is_empty(), "queue must start empty");
///
/// let diagnostics = Diagnostics::new();
/// diagnostics.set_terminator(UnwindTerminator);
/// diagnostics.set_sink(std::io::sink());
///
/// let terminated = Terminated::catch(|| {
///     check!(in &diagnostics; queue.len() == 1, "expected one entry", "len" => queue.len());
/// });
/// assert!(terminated.is_some());
/// ```
#[macro_export]
macro_rules! check {
    (in $diagnostics:expr; $condition:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        if !$condition {
            $crate::__private::fail(
                $diagnostics,
                &$message,
                $crate::fields![$($key => $value),*],
            )
        }
    };
    ($condition:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::check!(in $crate::Diagnostics::global(); $condition, $message $(, $key => $value)*)
    };
}

/// Fails if the value carries an error.
///
/// Accepts anything implementing [`Fallible`](crate::Fallible), such as a
/// `Result` or an `Option` of an error. The error's description is added as
/// an `error` field after the given ones.
///
/// # Examples
///
/// ```
/// use tripwire::no_error;
///
/// let parsed: Result<u16, std::num::ParseIntError> = "8080".parse();
/// no_error!(parsed, "port must parse", "input" => "8080");
/// ```
#[macro_export]
macro_rules! no_error {
    (in $diagnostics:expr; $result:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        if let ::core::option::Option::Some(description) =
            $crate::Fallible::error_description(&$result)
        {
            $crate::__private::fail_with_error(
                $diagnostics,
                &$message,
                $crate::fields![$($key => $value),*],
                description,
            )
        }
    };
    ($result:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::no_error!(in $crate::Diagnostics::global(); $result, $message $(, $key => $value)*)
    };
}

/// Fails unless the value is nil.
///
/// Anything implementing [`Nullable`](crate::Nullable) is checked deeply. Any
/// other `Option` is nil when it is `None`.
///
/// # Examples
///
/// ```
/// use tripwire::nil;
///
/// let pending: Option<std::time::Duration> = None;
/// nil!(pending, "no timer may be pending at startup");
/// ```
#[macro_export]
macro_rules! nil {
    (in $diagnostics:expr; $item:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {{
        let item = &$item;
        let is_null = {
            use $crate::__private::kind::*;
            (&&Wrap(item)).is_null_item()
        };
        $crate::__private::nil_outcome(
            $diagnostics,
            is_null,
            || {
                use $crate::__private::kind::*;
                (&&&Wrap(item)).describe_item()
            },
            &$message,
            || $crate::fields![$($key => $value),*],
        )
    }};
    ($item:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::nil!(in $crate::Diagnostics::global(); $item, $message $(, $key => $value)*)
    };
}

/// Fails if the value is nil, including a present wrapper around a null
/// pointer or a dropped [`Weak`](std::sync::Weak).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use tripwire::not_nil;
///
/// let shared = Arc::new(5);
/// let handle = Some(Arc::downgrade(&shared));
/// not_nil!(handle, "handle must be live", "owner" => "cache");
/// ```
#[macro_export]
macro_rules! not_nil {
    (in $diagnostics:expr; $item:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {{
        let item = &$item;
        let is_null = {
            use $crate::__private::kind::*;
            (&&Wrap(item)).is_null_item()
        };
        $crate::__private::not_nil_outcome(
            $diagnostics,
            is_null,
            || {
                use $crate::__private::kind::*;
                (&&&Wrap(item)).describe_item()
            },
            &$message,
            || $crate::fields![$($key => $value),*],
        )
    }};
    ($item:expr, $message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::not_nil!(in $crate::Diagnostics::global(); $item, $message $(, $key => $value)*)
    };
}

/// Always fails. Evaluates to `!`, so it can stand in for any value.
///
/// # Examples
///
/// ```
/// use tripwire::never;
///
/// fn parity(n: u32) -> &'static str {
///     match n % 2 {
///         0 => "even",
///         1 => "odd",
///         _ => never!("remainder out of range", "n" => n),
///     }
/// }
///
/// assert_eq!(parity(7), "odd");
/// ```
#[macro_export]
macro_rules! never {
    (in $diagnostics:expr; $message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::__private::fail(
            $diagnostics,
            &$message,
            $crate::fields![$($key => $value),*],
        )
    };
    ($message:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::never!(in $crate::Diagnostics::global(); $message $(, $key => $value)*)
    };
}
