//! Rows to records.

use crate::codec;
use crate::descriptor::TypeDescriptor;
use crate::persisted::{Persisted, Values};
use crate::value::Value;
use crate::{Error, Result};

/// Build a `T` from one result row.
///
/// Columns are looked up by name, so the row may carry extra columns in any
/// order. A missing nullable column reads as NULL; a missing non-nullable
/// column, or a NULL in one, is an error.
pub fn map_row<T: Persisted>(row: &tokio_postgres::Row, descriptor: &TypeDescriptor) -> Result<T> {
    let mut values = Vec::with_capacity(descriptor.columns.len());

    for column in &descriptor.columns {
        let idx = row.columns().iter().position(|c| c.name() == column.name);
        let value = match idx {
            Some(idx) => codec::decode(row, idx, column)?,
            None if column.nullable => Value::Null,
            None => {
                return Err(Error::MissingColumn {
                    table: descriptor.table.clone(),
                    column: column.name.clone(),
                });
            }
        };

        if value.is_null() && !column.nullable {
            return Err(Error::UnexpectedNull {
                table: descriptor.table.clone(),
                column: column.name.clone(),
            });
        }
        values.push(value);
    }

    T::from_values(Values::new(
        &descriptor.table,
        descriptor.column_names(),
        values,
    ))
}
