//! SQL statement construction from type descriptors.
//!
//! Every builder here is pure: it takes a descriptor and values and returns
//! a [`Statement`] with `$n` placeholders and quoted identifiers. Nothing is
//! executed. Values are checked against their column kinds on the way in.
//!
//! Predicate and assignment fragments (`select_where`, `update_where`) are
//! pasted verbatim after `WHERE` / the table name, and [`raw`] takes a whole
//! statement as is. They are a trust boundary: only pass text you wrote
//! yourself, and bind anything else as a parameter.

use crate::codec;
use crate::descriptor::{ColumnDescriptor, TypeDescriptor};
use crate::value::Value;
use crate::{Error, Result};
use rowsync_schema::quote_ident;
use std::fmt;

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Parameters rendered for error messages.
    pub fn rendered_params(&self) -> Vec<String> {
        self.params.iter().map(|p| p.to_string()).collect()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.sql, self.rendered_params())
    }
}

/// Pair each present value with its column, checking kinds.
fn present_columns<'d>(
    descriptor: &'d TypeDescriptor,
    values: Vec<Value>,
) -> Result<Vec<(usize, &'d ColumnDescriptor, Value)>> {
    if values.len() != descriptor.columns.len() {
        return Err(Error::ContractViolation(format!(
            "{}: {} values for {} columns",
            descriptor.type_name,
            values.len(),
            descriptor.columns.len()
        )));
    }

    let mut present = Vec::new();
    for (index, (column, value)) in descriptor.columns.iter().zip(values).enumerate() {
        let value = codec::encode(column, value)?;
        if !value.is_null() {
            present.push((index, column, value));
        }
    }
    Ok(present)
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list<'a>(columns: impl Iterator<Item = &'a ColumnDescriptor>) -> String {
    columns
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT ... RETURNING *` over every present field.
pub fn insert(descriptor: &TypeDescriptor, values: Vec<Value>) -> Result<Statement> {
    let present = present_columns(descriptor, values)?;
    let table = quote_ident(&descriptor.table);

    if present.is_empty() {
        return Ok(Statement {
            sql: format!("INSERT INTO {table} DEFAULT VALUES RETURNING *"),
            params: Vec::new(),
        });
    }

    let columns = column_list(present.iter().map(|(_, c, _)| *c));
    let sql = format!(
        "INSERT INTO {table} ({columns}) VALUES ({}) RETURNING *",
        placeholders(1, present.len())
    );
    Ok(Statement {
        sql,
        params: present.into_iter().map(|(_, _, v)| v).collect(),
    })
}

/// `UPDATE ... SET <present non-key fields> WHERE pk = $n RETURNING *`.
///
/// The primary key must be declared and present.
pub fn update(descriptor: &TypeDescriptor, values: Vec<Value>) -> Result<Statement> {
    let (pk_index, pk) = descriptor.require_primary_key()?;
    let present = present_columns(descriptor, values)?;

    let Some(pk_value) = present
        .iter()
        .find(|(i, _, _)| *i == pk_index)
        .map(|(_, _, v)| v.clone())
    else {
        return Err(Error::ContractViolation(format!(
            "{}: primary key cannot be null",
            descriptor.type_name
        )));
    };

    let set: Vec<_> = present.into_iter().filter(|(i, _, _)| *i != pk_index).collect();
    if set.is_empty() {
        return Err(Error::ContractViolation(format!(
            "{}: nothing to update besides the primary key",
            descriptor.type_name
        )));
    }

    let assignments = set
        .iter()
        .enumerate()
        .map(|(n, (_, c, _))| format!("{} = ${}", quote_ident(&c.name), n + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING *",
        quote_ident(&descriptor.table),
        assignments,
        quote_ident(&pk.name),
        set.len() + 1
    );

    let mut params: Vec<Value> = set.into_iter().map(|(_, _, v)| v).collect();
    params.push(pk_value);
    Ok(Statement { sql, params })
}

/// `INSERT ... ON CONFLICT (unique key) DO UPDATE SET ... RETURNING *`.
///
/// Unique-key columns are left out of the SET list. When nothing else is
/// present the first unique column is reassigned to itself, so the
/// conflicting row is still returned.
pub fn upsert(descriptor: &TypeDescriptor, values: Vec<Value>) -> Result<Statement> {
    let unique = descriptor.require_unique_key()?;
    let present = present_columns(descriptor, values)?;

    for &index in unique {
        if !present.iter().any(|(i, _, _)| *i == index) {
            return Err(Error::ContractViolation(format!(
                "{}: unique key column `{}` cannot be null",
                descriptor.type_name, descriptor.columns[index].name
            )));
        }
    }

    let mut updates: Vec<&str> = present
        .iter()
        .filter(|(i, _, _)| !unique.contains(i))
        .map(|(_, c, _)| c.name.as_str())
        .collect();
    if updates.is_empty() {
        updates.push(&descriptor.columns[unique[0]].name);
    }

    let assignments = updates
        .iter()
        .map(|name| {
            let col = quote_ident(name);
            format!("{col} = EXCLUDED.{col}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    let conflict = column_list(unique.iter().map(|&i| &descriptor.columns[i]));

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} RETURNING *",
        quote_ident(&descriptor.table),
        column_list(present.iter().map(|(_, c, _)| *c)),
        placeholders(1, present.len()),
        conflict,
        assignments
    );
    Ok(Statement {
        sql,
        params: present.into_iter().map(|(_, _, v)| v).collect(),
    })
}

/// The primary-key value of a record's values.
pub fn primary_key_value(descriptor: &TypeDescriptor, values: &[Value]) -> Result<Value> {
    let (index, _) = descriptor.require_primary_key()?;
    match values.get(index) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(Error::ContractViolation(format!(
            "{}: primary key cannot be null",
            descriptor.type_name
        ))),
    }
}

/// `DELETE FROM t WHERE pk = $1`.
pub fn delete_by_id(descriptor: &TypeDescriptor, id: Value) -> Result<Statement> {
    let (_, pk) = descriptor.require_primary_key()?;
    let id = codec::encode(pk, id)?;
    if id.is_null() {
        return Err(Error::ContractViolation(format!(
            "{}: primary key cannot be null",
            descriptor.type_name
        )));
    }
    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} = $1",
            quote_ident(&descriptor.table),
            quote_ident(&pk.name)
        ),
        params: vec![id],
    })
}

/// `SELECT * FROM t WHERE pk = $1`.
pub fn select_by_id(descriptor: &TypeDescriptor, id: Value) -> Result<Statement> {
    let (_, pk) = descriptor.require_primary_key()?;
    let id = codec::encode(pk, id)?;
    Ok(Statement {
        sql: format!(
            "SELECT * FROM {} WHERE {} = $1",
            quote_ident(&descriptor.table),
            quote_ident(&pk.name)
        ),
        params: vec![id],
    })
}

/// `SELECT * FROM t WHERE <predicate>`. The predicate must be trusted text.
pub fn select_where(descriptor: &TypeDescriptor, predicate: &str, params: &[Value]) -> Statement {
    Statement {
        sql: format!(
            "SELECT * FROM {} WHERE {}",
            quote_ident(&descriptor.table),
            predicate
        ),
        params: params.to_vec(),
    }
}

/// `SELECT * FROM t`.
pub fn select_all(descriptor: &TypeDescriptor) -> Statement {
    Statement {
        sql: format!("SELECT * FROM {}", quote_ident(&descriptor.table)),
        params: Vec::new(),
    }
}

/// `UPDATE t <fragment>`, e.g. `SET "active" = $1 WHERE "id" = $2`.
/// The fragment must be trusted text.
pub fn update_where(descriptor: &TypeDescriptor, fragment: &str, params: &[Value]) -> Statement {
    Statement {
        sql: format!("UPDATE {} {}", quote_ident(&descriptor.table), fragment),
        params: params.to_vec(),
    }
}

/// A complete statement written by the caller. The text must be trusted.
pub fn raw(sql: &str, params: &[Value]) -> Statement {
    Statement {
        sql: sql.to_owned(),
        params: params.to_vec(),
    }
}

#[cfg(test)]
mod tests;
