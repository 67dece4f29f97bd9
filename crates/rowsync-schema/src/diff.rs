//! Schema diffing - compare a wanted table shape against the live one.
//!
//! [`diff`] takes the existing table (if the database has one) and the
//! wanted table and returns the changes needed to bring the database in line.
//!
//! ## Safety policy
//!
//! Some differences are never acted on automatically. They are reported as
//! *advisory* changes, which render as SQL comments:
//!
//! - a column present in the database but not wanted is never dropped;
//! - a change of primary-key membership always needs a human;
//! - a type change that only adds or removes a `serial` sequence default.
//!
//! `serial` and `bigserial` are not real column types, so a type change
//! towards one alters the column to `int` / `bigint`.
//!
//! Renames are not inferred either: renaming a field shows up as one removed
//! column (advisory) plus one added column.
//!
//! ## Ordering
//!
//! Changes come out in fixed phases, regardless of where in the column lists
//! they were discovered:
//!
//! 1. removed columns (advisory)
//! 2. added columns, in wanted order
//! 3. type changes, in existing order
//! 4. nullability changes, in existing order
//! 5. primary-key changes (advisory), in existing order
//!
//! so identical inputs always render byte-identical SQL.

use crate::{Column, Table, quote_ident};
use std::collections::HashSet;
use std::fmt;

/// Errors produced by the differ.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("cannot diff table `{existing}` against table `{wanted}`: names differ")]
    TableMismatch { existing: String, wanted: String },
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Create the whole table.
    CreateTable(Table),
    /// A column exists in the database but is no longer wanted (advisory).
    RemovedColumn(String),
    /// Add a new column.
    AddColumn(Column),
    /// Change a column's physical type.
    AlterColumnType {
        name: String,
        from: String,
        to: String,
    },
    /// Change a column's nullability.
    AlterColumnNullable { name: String, from: bool, to: bool },
    /// A column joined or left the primary key (advisory).
    PrimaryKeyChanged { name: String, from: bool, to: bool },
}

impl Change {
    /// Advisory changes render as comments and are never executed.
    pub fn is_advisory(&self) -> bool {
        match self {
            Change::RemovedColumn(_) | Change::PrimaryKeyChanged { .. } => true,
            Change::AlterColumnType { from, to, .. } => storage_type(from) == storage_type(to),
            _ => false,
        }
    }

    /// Generate the SQL statement for this change.
    ///
    /// The `table_name` is required for column-level changes.
    pub fn to_sql(&self, table_name: &str) -> String {
        let table = quote_ident(table_name);
        match self {
            Change::CreateTable(t) => t.to_create_table_sql(),
            Change::RemovedColumn(name) => {
                format!(
                    "-- ALTER TABLE {} DROP COLUMN {};",
                    table,
                    quote_ident(name)
                )
            }
            Change::AddColumn(col) => {
                format!("ALTER TABLE {} ADD COLUMN {};", table, col.definition())
            }
            Change::AlterColumnType { name, from, to } => {
                let col = quote_ident(name);
                let storage = storage_type(to);
                if storage_type(from) == storage {
                    format!(
                        "-- {}.{}: {} -> {} changes the sequence default only, apply manually",
                        table, col, from, to
                    )
                } else {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                        table, col, storage, col, storage
                    )
                }
            }
            Change::AlterColumnNullable { name, to, .. } => {
                if *to {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
                        table,
                        quote_ident(name)
                    )
                } else {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                        table,
                        quote_ident(name)
                    )
                }
            }
            Change::PrimaryKeyChanged { name, from, to } => {
                format!(
                    "-- {}.{}: primary key {} -> {}, apply manually",
                    table,
                    quote_ident(name),
                    from,
                    to
                )
            }
        }
    }
}

/// The type a column is stored as; `serial` types are sequence-backed ints.
fn storage_type(pg_type: &str) -> &str {
    match pg_type {
        "serial" => "int",
        "bigserial" => "bigint",
        other => other,
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::CreateTable(t) => write!(f, "+ table {}", t.name),
            Change::RemovedColumn(name) => write!(f, "- {} (not dropped)", name),
            Change::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.pg_type, nullable)
            }
            Change::AlterColumnType { name, from, to } => {
                write!(f, "~ {}: {} -> {}", name, from, to)
            }
            Change::AlterColumnNullable { name, from, to } => {
                let from_str = if *from { "nullable" } else { "not null" };
                let to_str = if *to { "nullable" } else { "not null" };
                write!(f, "~ {}: {} -> {}", name, from_str, to_str)
            }
            Change::PrimaryKeyChanged { name, from, to } => {
                write!(f, "! {}: primary key {} -> {}", name, from, to)
            }
        }
    }
}

/// Changes for a single table, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// List of changes.
    pub changes: Vec<Change>,
}

impl TableDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Every change rendered as SQL, advisory comments included.
    pub fn statements(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.to_sql(&self.table)).collect()
    }

    /// Only the statements that may be executed.
    pub fn executable_statements(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| !c.is_advisory())
            .map(|c| c.to_sql(&self.table))
            .collect()
    }

    /// All statements joined with newlines.
    pub fn to_sql(&self) -> String {
        self.statements().join("\n")
    }
}

impl fmt::Display for TableDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "{}: up to date", self.table);
        }
        writeln!(f, "{}:", self.table)?;
        for change in &self.changes {
            writeln!(f, "  {}", change)?;
        }
        Ok(())
    }
}

/// Compare the existing table (if any) with the wanted one.
///
/// Returns the changes needed to turn `existing` into `wanted`. Fails only
/// when both tables are given and their names differ.
pub fn diff(existing: Option<&Table>, wanted: &Table) -> Result<TableDiff, DiffError> {
    let Some(existing) = existing else {
        return Ok(TableDiff {
            table: wanted.name.clone(),
            changes: vec![Change::CreateTable(wanted.clone())],
        });
    };

    if existing.name != wanted.name {
        return Err(DiffError::TableMismatch {
            existing: existing.name.clone(),
            wanted: wanted.name.clone(),
        });
    }

    Ok(TableDiff {
        table: wanted.name.clone(),
        changes: diff_columns(&existing.columns, &wanted.columns),
    })
}

/// Diff columns between existing and wanted state, phase by phase.
fn diff_columns(existing: &[Column], wanted: &[Column]) -> Vec<Change> {
    let existing_names: HashSet<&str> = existing.iter().map(|c| c.name.as_str()).collect();
    let wanted_names: HashSet<&str> = wanted.iter().map(|c| c.name.as_str()).collect();

    let mut removed = Vec::new();
    for col in existing {
        if !wanted_names.contains(col.name.as_str()) {
            removed.push(Change::RemovedColumn(col.name.clone()));
        }
    }

    let mut added = Vec::new();
    for col in wanted {
        if !existing_names.contains(col.name.as_str()) {
            added.push(Change::AddColumn(col.clone()));
        }
    }

    let mut type_changes = Vec::new();
    let mut nullability_changes = Vec::new();
    let mut pk_changes = Vec::new();
    for current in existing {
        let Some(desired) = wanted.iter().find(|c| c.name == current.name) else {
            continue;
        };

        if current.pg_type != desired.pg_type {
            type_changes.push(Change::AlterColumnType {
                name: desired.name.clone(),
                from: current.pg_type.clone(),
                to: desired.pg_type.clone(),
            });
        }

        if current.nullable != desired.nullable {
            nullability_changes.push(Change::AlterColumnNullable {
                name: desired.name.clone(),
                from: current.nullable,
                to: desired.nullable,
            });
        }

        if current.primary_key != desired.primary_key {
            pk_changes.push(Change::PrimaryKeyChanged {
                name: desired.name.clone(),
                from: current.primary_key,
                to: desired.primary_key,
            });
        }
    }

    let mut changes = removed;
    changes.extend(added);
    changes.extend(type_changes);
    changes.extend(nullability_changes);
    changes.extend(pk_changes);
    changes
}
