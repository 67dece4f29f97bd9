//! Physical table shapes for rowsync.
//!
//! A [`Table`] is the storage-level view of a relation: its name and its
//! columns, each with a physical type string, a nullability flag and a
//! primary-key flag. The same type describes both sides of a schema
//! comparison:
//!
//! - the *wanted* shape, derived from a persisted type's declaration;
//! - the *existing* shape, read back from the live catalog.
//!
//! [`diff`] compares the two and produces the corrective DDL.
//!
//! Physical types are compared as plain strings. Whoever builds a `Table`
//! is responsible for spelling types canonically (`bigint`, `varchar(64)`,
//! `text[]`, ...) so that equal shapes compare equal.

use indexmap::IndexMap;
use std::fmt;

mod diff;
pub use diff::{Change, DiffError, TableDiff, diff};

/// A physical column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Physical type, e.g. `bigint` or `varchar(255)`
    pub pg_type: String,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Whether the column is (part of) the primary key
    pub primary_key: bool,
}

impl Column {
    /// A non-nullable, non-key column.
    pub fn new(name: impl Into<String>, pg_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pg_type: pg_type.into(),
            nullable: false,
            primary_key: false,
        }
    }

    /// Builder: mark the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Builder: mark the column as the primary key. Primary keys are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Column definition as used in `CREATE TABLE` and `ADD COLUMN`.
    ///
    /// Primary keys always carry `NOT NULL`, even though Postgres implies it.
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.pg_type);
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        if self.primary_key || !self.nullable {
            def.push_str(" NOT NULL");
        }
        def
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition())
    }
}

/// A physical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration (wanted) or ordinal (existing) order
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary-key columns, in column order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Generate the `CREATE TABLE` statement for this table.
    pub fn to_create_table_sql(&self) -> String {
        let defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("    {}", col.definition()))
            .collect();
        format!(
            "CREATE TABLE {} (\n{}\n);",
            quote_ident(&self.name),
            defs.join(",\n")
        )
    }
}

/// A set of tables, indexed by name in catalog order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Insert or replace a table.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes, so reserved words like `user` or `order` are safe as table
/// and column names. Embedded double quotes are doubled.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        if c == '"' {
            out.push_str("\"\"");
        } else {
            out.push(c);
        }
    }
    out.push('"');
    out
}
