//! Type descriptors: the column shape of a persisted type.
//!
//! A [`TypeDescriptor`] is built once per type from its [`TypeDecl`] and then
//! shared through a process-wide cache.

use crate::naming::translate;
use crate::persisted::{KeyRole, Persisted, TypeDecl};
use crate::value::Kind;
use crate::{Error, Result};
use rowsync_schema::{Column, Table};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// Shape of one persisted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Field name as declared.
    pub field: &'static str,
    /// Translated column name.
    pub name: String,
    pub kind: Kind,
    pub nullable: bool,
    pub key: KeyRole,
    pub varchar: Option<u32>,
}

impl ColumnDescriptor {
    /// Physical column type for this field.
    pub fn physical_type(&self) -> String {
        let primary = self.key == KeyRole::Primary;
        match self.kind {
            Kind::Text => match self.varchar {
                Some(len) => format!("varchar({len})"),
                None => "text".to_owned(),
            },
            Kind::Char => "char(1)".to_owned(),
            Kind::Bool => "bool".to_owned(),
            Kind::Int32 if primary => "serial".to_owned(),
            Kind::Int32 => "int".to_owned(),
            Kind::Int64 if primary => "bigserial".to_owned(),
            Kind::Int64 => "bigint".to_owned(),
            Kind::Timestamp => "timestamptz".to_owned(),
            Kind::Duration => "interval".to_owned(),
            Kind::List(element) | Kind::Set(element) => element.array_type().to_owned(),
            Kind::Enumerated(_) => "text".to_owned(),
            Kind::Document => "jsonb".to_owned(),
        }
    }
}

/// The full shape of a persisted type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub type_name: &'static str,
    /// Translated type name.
    pub table: String,
    /// Persisted columns in declaration order.
    pub columns: Vec<ColumnDescriptor>,
    primary_key: Option<usize>,
    unique_key: Vec<usize>,
}

impl TypeDescriptor {
    /// Derive the descriptor from a declaration.
    ///
    /// Transient fields are skipped. Fails with a contract violation on more
    /// than one primary key, more than one field-level unique key, an empty
    /// or unresolvable class-level unique key, or colliding column names.
    pub fn build(decl: TypeDecl) -> Result<Self> {
        let table = translate(decl.type_name);
        let mut columns = Vec::with_capacity(decl.fields.len());
        let mut seen = HashSet::new();
        let mut primary_key = None;
        let mut field_unique = Vec::new();

        for field in decl.fields.into_iter().filter(|f| !f.transient) {
            let name = translate(field.name);
            if !seen.insert(name.clone()) {
                return Err(Error::ContractViolation(format!(
                    "{}: field `{}` maps to column `{}`, which is already taken",
                    decl.type_name, field.name, name
                )));
            }

            let index = columns.len();
            match field.key {
                KeyRole::Primary if primary_key.is_some() => {
                    return Err(Error::ContractViolation(format!(
                        "{}: more than one primary key declared",
                        decl.type_name
                    )));
                }
                KeyRole::Primary => primary_key = Some(index),
                KeyRole::Unique => field_unique.push(index),
                KeyRole::None => {}
            }

            columns.push(ColumnDescriptor {
                field: field.name,
                name,
                kind: field.kind,
                nullable: field.nullable && field.key != KeyRole::Primary,
                key: field.key,
                varchar: field.varchar,
            });
        }

        let unique_key = match decl.unique_key {
            Some(names) => {
                if names.is_empty() {
                    return Err(Error::ContractViolation(format!(
                        "{}: class-level unique key must name its columns",
                        decl.type_name
                    )));
                }
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    let column = translate(name);
                    let index = columns
                        .iter()
                        .position(|c| c.name == column)
                        .ok_or_else(|| {
                            Error::ContractViolation(format!(
                                "{}: unique key names unknown column `{}`",
                                decl.type_name, name
                            ))
                        })?;
                    indices.push(index);
                }
                indices
            }
            // without a class-level key the first field marked unique is the conflict target
            None => field_unique.into_iter().take(1).collect(),
        };

        tracing::trace!(
            type_name = decl.type_name,
            table = %table,
            columns = columns.len(),
            "built type descriptor"
        );

        Ok(Self {
            type_name: decl.type_name,
            table,
            columns,
            primary_key,
            unique_key,
        })
    }

    /// The primary-key column, if one is declared.
    pub fn primary_key(&self) -> Option<(usize, &ColumnDescriptor)> {
        self.primary_key.map(|i| (i, &self.columns[i]))
    }

    /// The primary-key column, or a contract violation.
    pub fn require_primary_key(&self) -> Result<(usize, &ColumnDescriptor)> {
        self.primary_key().ok_or_else(|| {
            Error::ContractViolation(format!("{}: no primary key declared", self.type_name))
        })
    }

    /// Indices of the unique-key columns. Empty when none is declared.
    pub fn unique_key(&self) -> &[usize] {
        &self.unique_key
    }

    /// The unique-key columns, or a contract violation.
    pub fn require_unique_key(&self) -> Result<&[usize]> {
        if self.unique_key.is_empty() {
            return Err(Error::ContractViolation(format!(
                "{}: no unique key declared",
                self.type_name
            )));
        }
        Ok(&self.unique_key)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The physical table this type wants.
    pub fn wanted_table(&self) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let column = Column::new(c.name.clone(), c.physical_type());
                let column = if c.nullable { column.nullable() } else { column };
                if c.key == KeyRole::Primary {
                    column.primary_key()
                } else {
                    column
                }
            })
            .collect();
        Table::new(self.table.clone(), columns)
    }
}

static DESCRIPTORS: LazyLock<RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// The cached descriptor for `T`, building it on first use.
///
/// Concurrent first lookups may each build a descriptor; the first one
/// published wins and every caller gets that one.
pub fn descriptor<T: Persisted>() -> Result<Arc<TypeDescriptor>> {
    let id = TypeId::of::<T>();
    if let Some(found) = DESCRIPTORS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return Ok(found.clone());
    }

    let built = Arc::new(TypeDescriptor::build(T::declaration())?);
    let mut cache = DESCRIPTORS.write().unwrap_or_else(PoisonError::into_inner);
    Ok(cache.entry(id).or_insert(built).clone())
}

/// The physical table `T` wants.
pub fn wanted_table<T: Persisted>() -> Result<Table> {
    Ok(descriptor::<T>()?.wanted_table())
}

#[cfg(test)]
mod tests;
