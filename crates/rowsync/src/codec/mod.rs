//! Per-kind conversion between [`Value`]s and Postgres.
//!
//! Encoding happens in two steps: [`encode`] checks a record's value against
//! its column's kind when a statement is built, and [`SqlParam`] writes it to
//! the wire once the server has told us the parameter type. Decoding reads a
//! raw column with [`decode`], driven by the column's kind.

mod interval;
mod jsonb;

pub(crate) use interval::PgInterval;
use jsonb::{JSONB_VERSION, RawJson};

use crate::descriptor::ColumnDescriptor;
use crate::value::{Element, Kind, Value};
use crate::{Error, Result};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use postgres_types::{FromSql, IsNull, ToSql, Type, WrongType, to_sql_checked};
use std::error::Error as StdError;

/// Check `value` against the column's kind and normalize it.
///
/// Sets lose their duplicates, 32-bit integers widen into 64-bit columns and
/// lists are accepted where a set is declared.
pub fn encode(column: &ColumnDescriptor, value: Value) -> Result<Value> {
    let unsupported = |value: &Value| Error::UnsupportedMapping {
        kind: column.kind.to_string(),
        detail: format!(
            "column `{}` cannot carry a {} value",
            column.name,
            value.type_name()
        ),
    };

    match (column.kind, value) {
        (_, Value::Null) => Ok(Value::Null),
        (Kind::Text, v @ Value::String(_))
        | (Kind::Char, v @ Value::Char(_))
        | (Kind::Bool, v @ Value::Bool(_))
        | (Kind::Int32, v @ Value::I32(_))
        | (Kind::Int64, v @ Value::I64(_))
        | (Kind::Timestamp, v @ Value::Timestamp(_))
        | (Kind::Duration, v @ Value::Duration(_))
        | (Kind::Document, v @ Value::Document(_)) => Ok(v),
        (Kind::Int64, Value::I32(v)) => Ok(Value::I64(i64::from(v))),
        (Kind::Enumerated(symbols), Value::Enum(symbol)) => {
            check_symbol(column, symbols, &symbol)?;
            Ok(Value::Enum(symbol))
        }
        (Kind::List(element), Value::List(items) | Value::Set(items)) => {
            Ok(Value::List(encode_elements(column, element, items)?))
        }
        (Kind::Set(element), Value::List(items) | Value::Set(items)) => {
            Ok(Value::set(encode_elements(column, element, items)?))
        }
        (_, other) => Err(unsupported(&other)),
    }
}

fn encode_elements(
    column: &ColumnDescriptor,
    element: Element,
    items: Vec<Value>,
) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|item| match (element, item) {
            (_, Value::Null) => Ok(Value::Null),
            (Element::Text, v @ Value::String(_)) | (Element::Int32, v @ Value::I32(_)) => Ok(v),
            (Element::Int64, Value::I64(v)) => Ok(Value::I64(v)),
            (Element::Int64, Value::I32(v)) => Ok(Value::I64(i64::from(v))),
            (Element::Enumerated(symbols), Value::Enum(symbol)) => {
                check_symbol(column, symbols, &symbol)?;
                Ok(Value::Enum(symbol))
            }
            (_, other) => Err(Error::UnsupportedMapping {
                kind: column.kind.to_string(),
                detail: format!(
                    "column `{}` cannot hold a {} element",
                    column.name,
                    other.type_name()
                ),
            }),
        })
        .collect()
}

fn check_symbol(column: &ColumnDescriptor, symbols: &[&str], symbol: &str) -> Result<()> {
    if symbols.iter().any(|s| *s == symbol) {
        Ok(())
    } else {
        Err(Error::UnsupportedMapping {
            kind: column.kind.to_string(),
            detail: format!(
                "`{symbol}` is not one of {symbols:?} declared for `{}`",
                column.name
            ),
        })
    }
}

/// Decode column `idx` of `row` according to the column's kind.
///
/// NULL comes back as [`Value::Null`]; nullability is the caller's concern.
pub fn decode(
    row: &tokio_postgres::Row,
    idx: usize,
    column: &ColumnDescriptor,
) -> Result<Value> {
    let pg_type = row
        .columns()
        .get(idx)
        .map(|c| c.type_().clone())
        .unwrap_or(Type::UNKNOWN);

    let read_error = |e: tokio_postgres::Error| {
        if e.source()
            .and_then(|s| s.downcast_ref::<WrongType>())
            .is_some()
        {
            return Error::UnsupportedMapping {
                kind: column.kind.to_string(),
                detail: format!(
                    "column `{}` has postgres type {}",
                    column.name,
                    pg_type.name()
                ),
            };
        }
        Error::DecodeFailure {
            value: e.to_string(),
            target: column.kind.to_string(),
        }
    };

    match column.kind {
        Kind::Text => {
            let v: Option<String> = row.try_get(idx).map_err(read_error)?;
            Ok(v.map(Value::String).unwrap_or(Value::Null))
        }
        Kind::Char => {
            let v: Option<String> = row.try_get(idx).map_err(read_error)?;
            match v {
                Some(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Ok(Value::Char(c)),
                        _ => Err(Error::DecodeFailure {
                            value: s,
                            target: "char".to_owned(),
                        }),
                    }
                }
                None => Ok(Value::Null),
            }
        }
        Kind::Bool => {
            let v: Option<bool> = row.try_get(idx).map_err(read_error)?;
            Ok(v.map(Value::Bool).unwrap_or(Value::Null))
        }
        Kind::Int32 => {
            let v: Option<i32> = row.try_get(idx).map_err(read_error)?;
            Ok(v.map(Value::I32).unwrap_or(Value::Null))
        }
        Kind::Int64 => {
            let v: Option<i64> = row.try_get(idx).map_err(read_error)?;
            Ok(v.map(Value::I64).unwrap_or(Value::Null))
        }
        Kind::Timestamp if pg_type == Type::TIMESTAMP => {
            let v: Option<NaiveDateTime> = row.try_get(idx).map_err(read_error)?;
            Ok(v.map(|t| Value::Timestamp(t.and_utc()))
                .unwrap_or(Value::Null))
        }
        Kind::Timestamp => {
            let v: Option<DateTime<Utc>> = row.try_get(idx).map_err(read_error)?;
            Ok(v.map(Value::Timestamp).unwrap_or(Value::Null))
        }
        Kind::Duration => {
            let v: Option<PgInterval> = row.try_get(idx).map_err(read_error)?;
            match v {
                Some(interval) => Ok(Value::Duration(interval.to_delta()?)),
                None => Ok(Value::Null),
            }
        }
        Kind::List(element) => match decode_elements(row, idx, element, read_error)? {
            Some(items) => Ok(Value::List(items)),
            None => Ok(Value::Null),
        },
        Kind::Set(element) => match decode_elements(row, idx, element, read_error)? {
            Some(items) => Ok(Value::set(items)),
            None => Ok(Value::Null),
        },
        Kind::Enumerated(symbols) => {
            let v: Option<String> = row.try_get(idx).map_err(read_error)?;
            match v {
                Some(s) => Ok(Value::Enum(match_symbol(symbols, s)?)),
                None => Ok(Value::Null),
            }
        }
        Kind::Document => {
            let v: RawJson = row.try_get(idx).map_err(read_error)?;
            match v.0 {
                Some(raw) => {
                    let text = RawJson::text(&raw, &pg_type);
                    serde_json::from_slice(text)
                        .map(Value::Document)
                        .map_err(|_| Error::DecodeFailure {
                            value: String::from_utf8_lossy(text).into_owned(),
                            target: "document".to_owned(),
                        })
                }
                None => Ok(Value::Null),
            }
        }
    }
}

fn decode_elements(
    row: &tokio_postgres::Row,
    idx: usize,
    element: Element,
    read_error: impl Fn(tokio_postgres::Error) -> Error,
) -> Result<Option<Vec<Value>>> {
    fn collect<T>(items: Option<Vec<Option<T>>>, wrap: impl Fn(T) -> Value) -> Option<Vec<Value>> {
        items.map(|items| {
            items
                .into_iter()
                .map(|item| item.map(&wrap).unwrap_or(Value::Null))
                .collect()
        })
    }

    match element {
        Element::Text => {
            let v: Option<Vec<Option<String>>> = row.try_get(idx).map_err(read_error)?;
            Ok(collect(v, Value::String))
        }
        Element::Int32 => {
            let v: Option<Vec<Option<i32>>> = row.try_get(idx).map_err(read_error)?;
            Ok(collect(v, Value::I32))
        }
        Element::Int64 => {
            let v: Option<Vec<Option<i64>>> = row.try_get(idx).map_err(read_error)?;
            Ok(collect(v, Value::I64))
        }
        Element::Enumerated(symbols) => {
            let v: Option<Vec<Option<String>>> = row.try_get(idx).map_err(read_error)?;
            let Some(items) = v else {
                return Ok(None);
            };
            items
                .into_iter()
                .map(|item| match item {
                    Some(s) => match_symbol(symbols, s).map(Value::Enum),
                    None => Ok(Value::Null),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some)
        }
    }
}

/// Exact match of a stored symbol against the declared ones.
pub(crate) fn match_symbol(symbols: &[&str], raw: String) -> Result<String> {
    if symbols.iter().any(|s| *s == raw) {
        Ok(raw)
    } else {
        Err(Error::DecodeFailure {
            value: raw,
            target: format!("enumeration {symbols:?}"),
        })
    }
}

type BoxError = Box<dyn StdError + Sync + Send>;
type ToSqlResult = std::result::Result<IsNull, BoxError>;

/// Wrapper to make our Value usable as a ToSql parameter.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl SqlParam<'_> {
    fn write_int(v: i64, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
        match *ty {
            Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
            Type::INT8 => v.to_sql(ty, out),
            _ => Err(Box::new(WrongType::new::<i64>(ty.clone()))),
        }
    }

    /// Write `value` as `T`, refusing server types `T` does not map to.
    fn write_as<T: ToSql>(value: T, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
        if !T::accepts(ty) {
            return Err(Box::new(WrongType::new::<T>(ty.clone())));
        }
        value.to_sql(ty, out)
    }

    fn write_array(
        items: &[Value],
        ty: &Type,
        out: &mut BytesMut,
    ) -> ToSqlResult {
        match *ty {
            Type::INT4_ARRAY => {
                let ints = items
                    .iter()
                    .map(|item| match item {
                        Value::Null => Ok(None),
                        Value::I32(v) => Ok(Some(*v)),
                        Value::I64(v) => Ok(Some(i32::try_from(*v)?)),
                        other => Err(format!("cannot put {} into int[]", other.type_name()).into()),
                    })
                    .collect::<std::result::Result<Vec<Option<i32>>, BoxError>>()?;
                ints.to_sql(ty, out)
            }
            Type::INT8_ARRAY => {
                let ints = items
                    .iter()
                    .map(|item| match item {
                        Value::Null => Ok(None),
                        Value::I32(v) => Ok(Some(i64::from(*v))),
                        Value::I64(v) => Ok(Some(*v)),
                        other => Err(format!("cannot put {} into bigint[]", other.type_name()).into()),
                    })
                    .collect::<std::result::Result<Vec<Option<i64>>, BoxError>>()?;
                ints.to_sql(ty, out)
            }
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
                let texts = items
                    .iter()
                    .map(|item| match item {
                        Value::Null => Ok(None),
                        Value::String(v) | Value::Enum(v) => Ok(Some(v.as_str())),
                        other => Err(format!("cannot put {} into {}", other.type_name(), ty).into()),
                    })
                    .collect::<std::result::Result<Vec<Option<&str>>, BoxError>>()?;
                texts.to_sql(ty, out)
            }
            _ => Err(format!("cannot bind a collection to {}", ty).into()),
        }
    }
}

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> ToSqlResult {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => Self::write_as(*v, ty, out),
            Value::Char(v) => {
                let mut buf = [0u8; 4];
                let s: &str = v.encode_utf8(&mut buf);
                Self::write_as(s, ty, out)
            }
            Value::I32(v) => Self::write_int(i64::from(*v), ty, out),
            Value::I64(v) => Self::write_int(*v, ty, out),
            Value::String(v) | Value::Enum(v) => Self::write_as(v.as_str(), ty, out),
            Value::Timestamp(v) => {
                if *ty == Type::TIMESTAMP {
                    Self::write_as(v.naive_utc(), ty, out)
                } else {
                    Self::write_as(*v, ty, out)
                }
            }
            Value::Duration(v) => Self::write_as(PgInterval::from_delta(*v)?, ty, out),
            Value::List(items) | Value::Set(items) => Self::write_array(items, ty, out),
            Value::Document(v) => {
                if !matches!(*ty, Type::JSON | Type::JSONB) && !<&str as ToSql>::accepts(ty) {
                    return Err(Box::new(WrongType::new::<serde_json::Value>(ty.clone())));
                }
                // JSONB needs the version byte in front
                if *ty == Type::JSONB {
                    out.extend_from_slice(&[JSONB_VERSION]);
                }
                serde_json::to_writer(bytes::BufMut::writer(&mut *out), v)?;
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT4
                | Type::INT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::INTERVAL
                | Type::TEXT_ARRAY
                | Type::VARCHAR_ARRAY
                | Type::INT4_ARRAY
                | Type::INT8_ARRAY
                | Type::JSON
                | Type::JSONB
        )
    }

    to_sql_checked!();
}
