//! Runtime values and the semantic kinds that classify them.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// A runtime SQL value.
///
/// Records hand their fields to the mapping layer as `Value`s and are rebuilt
/// from them. `Null` stands for an absent field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL / absent
    Null,

    /// Boolean
    Bool(bool),

    /// Single character (CHAR(1))
    Char(char),

    /// 32-bit signed integer (INTEGER)
    I32(i32),

    /// 64-bit signed integer (BIGINT)
    I64(i64),

    /// Text (TEXT, VARCHAR, etc.)
    String(String),

    /// Point in time (TIMESTAMPTZ)
    Timestamp(DateTime<Utc>),

    /// Elapsed time (INTERVAL)
    Duration(TimeDelta),

    /// Ordered collection (ARRAY)
    List(Vec<Value>),

    /// Collection without duplicates (ARRAY)
    Set(Vec<Value>),

    /// Symbolic name of an enumerated value
    Enum(String),

    /// JSON document (JSONB)
    Document(serde_json::Value),
}

impl Value {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Duration(_) => "duration",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Enum(_) => "enum",
            Value::Document(_) => "document",
        }
    }

    /// Build a set value, dropping duplicates but keeping first-seen order.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Value::Set(out)
    }

    /// The symbolic value of an enumeration.
    pub fn symbol<E: Symbolic>(value: E) -> Self {
        Value::Enum(value.symbol().to_owned())
    }

    /// An optional enumeration value.
    pub fn opt_symbol<E: Symbolic>(value: Option<E>) -> Self {
        value.map(Value::symbol).unwrap_or(Value::Null)
    }

    /// An ordered list of enumeration values.
    pub fn symbols<E: Symbolic>(values: impl IntoIterator<Item = E>) -> Self {
        Value::List(values.into_iter().map(Value::symbol).collect())
    }

    /// A set of enumeration values.
    pub fn symbol_set<E: Symbolic>(values: impl IntoIterator<Item = E>) -> Self {
        Value::set(values.into_iter().map(Value::symbol))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v:?}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::String(v) | Value::Enum(v) => write!(f, "{v:?}"),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Duration(v) => write!(f, "{v}"),
            Value::List(items) | Value::Set(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Document(v) => write!(f, "{v}"),
        }
    }
}

/// A Rust enum stored by its symbolic name.
///
/// ```
/// use rowsync::Symbolic;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Status { Draft, Live }
///
/// impl Symbolic for Status {
///     const SYMBOLS: &'static [&'static str] = &["Draft", "Live"];
///
///     fn symbol(&self) -> &'static str {
///         match self {
///             Status::Draft => "Draft",
///             Status::Live => "Live",
///         }
///     }
///
///     fn from_symbol(symbol: &str) -> Option<Self> {
///         match symbol {
///             "Draft" => Some(Status::Draft),
///             "Live" => Some(Status::Live),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Symbolic: Sized + 'static {
    /// Every declared symbol, in declaration order.
    const SYMBOLS: &'static [&'static str];

    fn symbol(&self) -> &'static str;

    fn from_symbol(symbol: &str) -> Option<Self>;
}

/// Element kind of a collection column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Text,
    Int32,
    Int64,
    /// Elements are symbols of an enumeration.
    Enumerated(&'static [&'static str]),
}

impl Element {
    /// Physical array type for collections of this element.
    pub fn array_type(&self) -> &'static str {
        match self {
            Element::Text | Element::Enumerated(_) => "text[]",
            Element::Int32 => "int[]",
            Element::Int64 => "bigint[]",
        }
    }
}

/// The closed set of semantic kinds a field can have.
///
/// The kind decides how a [`Value`] is sent to Postgres and how a raw column
/// comes back, independently of the physical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Text,
    Char,
    Bool,
    Int32,
    Int64,
    Timestamp,
    Duration,
    List(Element),
    Set(Element),
    Enumerated(&'static [&'static str]),
    Document,
}

impl Kind {
    /// Enumeration kind for a [`Symbolic`] type.
    pub fn enumerated<E: Symbolic>() -> Self {
        Kind::Enumerated(E::SYMBOLS)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kind::Text => "text",
            Kind::Char => "char",
            Kind::Bool => "bool",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Timestamp => "timestamp",
            Kind::Duration => "duration",
            Kind::List(_) => "list",
            Kind::Set(_) => "set",
            Kind::Enumerated(_) => "enumerated",
            Kind::Document => "document",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::List(e) => write!(f, "list<{e:?}>"),
            Kind::Set(e) => write!(f, "set<{e:?}>"),
            other => f.write_str(other.name()),
        }
    }
}

// Convenient From impls
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<TimeDelta> for Value {
    fn from(v: TimeDelta) -> Self {
        Value::Duration(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Document(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeSet<T>> for Value {
    fn from(v: BTreeSet<T>) -> Self {
        Value::set(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, S> From<HashSet<T, S>> for Value {
    fn from(v: HashSet<T, S>) -> Self {
        Value::set(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_drops_duplicates_in_order() {
        let set = Value::set(vec![
            Value::I32(3),
            Value::I32(1),
            Value::I32(3),
            Value::I32(2),
        ]);
        assert_eq!(
            set,
            Value::Set(vec![Value::I32(3), Value::I32(1), Value::I32(2)])
        );
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
    }

    #[test]
    fn test_display() {
        let v = Value::List(vec![Value::from("a"), Value::I64(2), Value::Null]);
        assert_eq!(v.to_string(), r#"["a", 2, NULL]"#);
    }
}
