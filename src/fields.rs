//! Caller-supplied key/value context attached to a failure.
//!
//! Every predicate accepts a list of [`Field`]s describing the state around
//! the failing check. Fields keep the order they were given in, and duplicate
//! keys are allowed: both copies show up in the report.
//!
//! The [`fields!`](crate::fields!) macro is the usual way to build the list.
//! Values are rendered with [`Display`](core::fmt::Display) when the type
//! implements it, and with [`Debug`](core::fmt::Debug) otherwise:
//!
//! ```rust
//! use tripwire::fields;
//!
//! #[derive(Debug)]
//! struct Point(i32, i32);
//!
//! let fields = fields!["id" => 42, "name" => "widget", "at" => Point(1, 2)];
//! assert_eq!(fields.to_string(), "[id 42 name widget at Point(1, 2)]");
//! ```

use alloc::{borrow::Cow, string::String, vec::Vec};
use core::fmt;

/// One key/value pair of failure context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// The key, printed to the left of the `=` in a report.
    pub key: Cow<'static, str>,
    /// The rendered value.
    pub value: String,
}

impl Field {
    /// Creates a field from a key and an already rendered value.
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// An ordered list of [`Field`]s.
///
/// The [`Display`](fmt::Display) implementation produces the flat
/// `[key value key value ...]` echo used on the `ARGS:` line of a report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields(Vec<Field>);

impl Fields {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a field with an already rendered value.
    pub fn push(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) {
        self.0.push(Field::new(key, value));
    }

    /// Appends a field, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<Cow<'static, str>>, value: impl fmt::Display) -> Self {
        self.0.push(Field::new(key, alloc::format!("{value}")));
        self
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> core::slice::Iter<'_, Field> {
        self.0.iter()
    }

    /// Returns the value of the first field with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value.as_str())
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{} {}", field.key, field.value)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<Field>> for Fields {
    fn from(fields: Vec<Field>) -> Self {
        Self(fields)
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<Cow<'static, str>>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| Field::new(k, v)).collect())
    }
}

impl Extend<Field> for Fields {
    fn extend<I: IntoIterator<Item = Field>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Fields {
    type Item = Field;
    type IntoIter = alloc::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a Field;
    type IntoIter = core::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
