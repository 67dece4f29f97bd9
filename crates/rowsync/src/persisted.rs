//! Static declarations of persisted types.
//!
//! A type opts into the mapping layer by implementing [`Persisted`]: it
//! declares its fields once, in constructor order, and converts itself to and
//! from a positional list of [`Value`]s in that same order.
//!
//! ```
//! use rowsync::{FieldDecl, Kind, Persisted, TypeDecl, Value, Values};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct User {
//!     id: Option<i64>,
//!     email: String,
//!     display_name: Option<String>,
//! }
//!
//! impl Persisted for User {
//!     fn declaration() -> TypeDecl {
//!         TypeDecl::new("User")
//!             .field(FieldDecl::new("id", Kind::Int64).nullable().primary_key())
//!             .field(FieldDecl::new("email", Kind::Text).unique().varchar(255))
//!             .field(FieldDecl::new("displayName", Kind::Text).nullable())
//!     }
//!
//!     fn to_values(&self) -> Vec<Value> {
//!         vec![
//!             self.id.into(),
//!             self.email.clone().into(),
//!             self.display_name.clone().into(),
//!         ]
//!     }
//!
//!     fn from_values(mut values: Values<'_>) -> rowsync::Result<Self> {
//!         Ok(User {
//!             id: values.take()?,
//!             email: values.take()?,
//!             display_name: values.take()?,
//!         })
//!     }
//! }
//! ```

use crate::value::{Kind, Symbolic, Value};
use crate::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

/// A record type the mapping layer can persist.
pub trait Persisted: Sized + Send + Sync + 'static {
    /// The static shape of this type.
    fn declaration() -> TypeDecl;

    /// One value per persisted (non-transient) field, in declaration order.
    /// Absent fields are [`Value::Null`].
    fn to_values(&self) -> Vec<Value>;

    /// Rebuild a record from decoded values, in declaration order.
    fn from_values(values: Values<'_>) -> Result<Self>;
}

/// Key role of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyRole {
    #[default]
    None,
    Primary,
    Unique,
}

/// Declaration of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: &'static str,
    pub kind: Kind,
    pub nullable: bool,
    pub key: KeyRole,
    /// Not stored at all.
    pub transient: bool,
    /// Store text as `varchar(n)` instead of `text`.
    pub varchar: Option<u32>,
}

impl FieldDecl {
    pub fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            key: KeyRole::None,
            transient: false,
            varchar: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.key = KeyRole::Primary;
        self
    }

    pub fn unique(mut self) -> Self {
        self.key = KeyRole::Unique;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn varchar(mut self, len: u32) -> Self {
        self.varchar = Some(len);
        self
    }
}

/// Declaration of a persisted type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub type_name: &'static str,
    pub fields: Vec<FieldDecl>,
    /// Class-level composite unique key, by field or column name.
    pub unique_key: Option<Vec<&'static str>>,
}

impl TypeDecl {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
            unique_key: None,
        }
    }

    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique_key(mut self, columns: &[&'static str]) -> Self {
        self.unique_key = Some(columns.to_vec());
        self
    }
}

/// Conversion out of a decoded [`Value`].
pub trait FromValue: Sized {
    /// Name used in mismatch errors.
    const EXPECTED: &'static str;

    /// `None` when the value has the wrong shape.
    fn from_value(value: Value) -> Option<Self>;

    /// Called for NULL. Only `Option` accepts it.
    fn from_null() -> Option<Self> {
        None
    }
}

macro_rules! from_value {
    ($ty:ty, $expected:literal, $variant:ident) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

from_value!(bool, "bool", Bool);
from_value!(char, "char", Char);
from_value!(i32, "i32", I32);
from_value!(i64, "i64", I64);
from_value!(String, "string", String);
from_value!(DateTime<Utc>, "timestamp", Timestamp);
from_value!(TimeDelta, "duration", Duration);
from_value!(serde_json::Value, "document", Document);

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn from_null() -> Option<Self> {
        Some(None)
    }
}

fn collection_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) | Value::Set(items) => Some(items),
        _ => None,
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    const EXPECTED: &'static str = "list";

    fn from_value(value: Value) -> Option<Self> {
        collection_items(value)?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    const EXPECTED: &'static str = "set";

    fn from_value(value: Value) -> Option<Self> {
        collection_items(value)?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FromValue + Eq + Hash> FromValue for HashSet<T> {
    const EXPECTED: &'static str = "set";

    fn from_value(value: Value) -> Option<Self> {
        collection_items(value)?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

/// Positional reader handed to [`Persisted::from_values`].
///
/// Each `take` consumes the next column in declaration order.
pub struct Values<'a> {
    table: &'a str,
    columns: Vec<&'a str>,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl<'a> Values<'a> {
    /// `columns` names each value, for error reporting.
    pub fn new(table: &'a str, columns: Vec<&'a str>, values: Vec<Value>) -> Self {
        Self {
            table,
            columns,
            values: values.into_iter(),
            position: 0,
        }
    }

    fn next_raw(&mut self) -> Result<(String, Value)> {
        let column = self
            .columns
            .get(self.position)
            .copied()
            .unwrap_or("?")
            .to_owned();
        let value = self.values.next().ok_or_else(|| {
            Error::ContractViolation(format!(
                "`{}` read more values than it declares columns",
                self.table
            ))
        })?;
        self.position += 1;
        Ok((column, value))
    }

    fn mismatch(&self, column: String, expected: &str, actual: &Value) -> Error {
        Error::TypeMismatch {
            table: self.table.to_owned(),
            column,
            expected: expected.to_owned(),
            actual: actual.type_name().to_owned(),
        }
    }

    fn current_column(&self) -> String {
        self.columns
            .get(self.position.saturating_sub(1))
            .copied()
            .unwrap_or("?")
            .to_owned()
    }

    /// Take the next value as `T`.
    pub fn take<T: FromValue>(&mut self) -> Result<T> {
        let (column, value) = self.next_raw()?;
        if value.is_null() {
            return T::from_null().ok_or_else(|| self.mismatch(column, T::EXPECTED, &value));
        }
        let actual = value.type_name();
        T::from_value(value).ok_or_else(|| Error::TypeMismatch {
            table: self.table.to_owned(),
            column,
            expected: T::EXPECTED.to_owned(),
            actual: actual.to_owned(),
        })
    }

    /// Take the next value as an enumeration.
    pub fn take_symbol<E: Symbolic>(&mut self) -> Result<E> {
        match self.take_opt_symbol()? {
            Some(v) => Ok(v),
            None => Err(Error::UnexpectedNull {
                table: self.table.to_owned(),
                column: self.current_column(),
            }),
        }
    }

    /// Take the next value as an optional enumeration.
    pub fn take_opt_symbol<E: Symbolic>(&mut self) -> Result<Option<E>> {
        let (column, value) = self.next_raw()?;
        match value {
            Value::Null => Ok(None),
            Value::Enum(symbol) => parse_symbol(&symbol).map(Some),
            other => Err(self.mismatch(column, "enum", &other)),
        }
    }

    /// Take the next value as a collection of enumeration values.
    pub fn take_symbols<E: Symbolic, C: FromIterator<E>>(&mut self) -> Result<C> {
        let (column, value) = self.next_raw()?;
        let items = match value {
            Value::List(items) | Value::Set(items) => items,
            other => return Err(self.mismatch(column, "list", &other)),
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::Enum(symbol) => parse_symbol(&symbol),
                other => Err(self.mismatch(column.clone(), "enum", &other)),
            })
            .collect()
    }

    /// Number of values not yet taken.
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

fn parse_symbol<E: Symbolic>(symbol: &str) -> Result<E> {
    E::from_symbol(symbol).ok_or_else(|| Error::DecodeFailure {
        value: symbol.to_owned(),
        target: std::any::type_name::<E>().to_owned(),
    })
}
