//! Reading existing table shapes from the live catalog.
//!
//! Type names come back from `information_schema` in their internal spelling
//! (`int8`, `_text`, `bpchar`, ...). [`normalize_type`] rewrites them to the
//! spelling wanted tables use, so identical shapes compare equal in the
//! differ.

use crate::Result;
use crate::traced::Connection;
use rowsync_schema::{Column, Schema, Table};

const TABLES_SQL: &str = r#"
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = current_schema()
  AND table_type = 'BASE TABLE'
ORDER BY table_name
"#;

const TABLE_EXISTS_SQL: &str = r#"
SELECT 1
FROM information_schema.tables
WHERE table_schema = current_schema()
  AND table_type = 'BASE TABLE'
  AND table_name = $1
"#;

const PRIMARY_KEY_SQL: &str = r#"
SELECT kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
  AND tc.table_schema = kcu.table_schema
  AND tc.table_name = kcu.table_name
WHERE tc.constraint_type = 'PRIMARY KEY'
  AND tc.table_schema = current_schema()
  AND tc.table_name = $1
"#;

const COLUMNS_SQL: &str = r#"
SELECT
    column_name::text,
    udt_name::text,
    character_maximum_length::int4,
    is_nullable::text,
    column_default::text
FROM information_schema.columns
WHERE table_schema = current_schema()
  AND table_name = $1
ORDER BY ordinal_position
"#;

/// One column as the catalog reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub udt_name: String,
    pub max_length: Option<i32>,
    pub is_nullable: bool,
    pub default: Option<String>,
}

/// Canonical physical type for a catalog column.
pub fn normalize_type(udt_name: &str, max_length: Option<i32>, default: Option<&str>) -> String {
    let sequence = default.is_some_and(|d| d.starts_with("nextval("));
    match (udt_name, max_length) {
        ("varchar", Some(len)) => format!("varchar({len})"),
        ("bpchar", Some(len)) => format!("char({len})"),
        ("bpchar", None) => "char".to_owned(),
        ("int4", _) if sequence => "serial".to_owned(),
        ("int8", _) if sequence => "bigserial".to_owned(),
        ("int4", _) => "int".to_owned(),
        ("int8", _) => "bigint".to_owned(),
        ("_text", _) => "text[]".to_owned(),
        ("_int4", _) => "int[]".to_owned(),
        ("_int8", _) => "bigint[]".to_owned(),
        (other, _) => other.to_owned(),
    }
}

/// Build a table shape from catalog rows.
///
/// A column is nullable only if the catalog says so and it is not part of
/// the primary key.
pub fn table_from_catalog(name: &str, columns: Vec<CatalogColumn>, primary_key: &[String]) -> Table {
    let columns = columns
        .into_iter()
        .map(|c| {
            let pg_type = normalize_type(&c.udt_name, c.max_length, c.default.as_deref());
            let is_pk = primary_key.contains(&c.name);
            let column = Column::new(c.name, pg_type);
            if is_pk {
                column.primary_key()
            } else if c.is_nullable {
                column.nullable()
            } else {
                column
            }
        })
        .collect();
    Table::new(name, columns)
}

/// Read every base table of the current schema.
pub async fn introspect<C: Connection + ?Sized>(conn: &C) -> Result<Schema> {
    let mut schema = Schema::new();

    for row in conn.query(TABLES_SQL, &[]).await? {
        let name: String = row.try_get(0)?;
        if let Some(table) = introspect_table(conn, &name).await? {
            schema.insert(table);
        }
    }

    tracing::debug!(tables = schema.tables.len(), "introspected schema");
    Ok(schema)
}

/// Read a single base table of the current schema, `None` if there is none.
pub async fn introspect_table<C: Connection + ?Sized>(conn: &C, name: &str) -> Result<Option<Table>> {
    if conn.query_opt(TABLE_EXISTS_SQL, &[&name]).await?.is_none() {
        return Ok(None);
    }

    let primary_key: Vec<String> = conn
        .query(PRIMARY_KEY_SQL, &[&name])
        .await?
        .iter()
        .map(|row| row.try_get(0))
        .collect::<std::result::Result<_, _>>()?;

    let columns = conn
        .query(COLUMNS_SQL, &[&name])
        .await?
        .iter()
        .map(|row| {
            Ok(CatalogColumn {
                name: row.try_get(0)?,
                udt_name: row.try_get(1)?,
                max_length: row.try_get(2)?,
                is_nullable: row.try_get::<_, String>(3)? == "YES",
                default: row.try_get(4)?,
            })
        })
        .collect::<std::result::Result<Vec<_>, tokio_postgres::Error>>()?;

    Ok(Some(table_from_catalog(name, columns, &primary_key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, udt: &str, len: Option<i32>, nullable: bool, default: Option<&str>) -> CatalogColumn {
        CatalogColumn {
            name: name.to_owned(),
            udt_name: udt.to_owned(),
            max_length: len,
            is_nullable: nullable,
            default: default.map(str::to_owned),
        }
    }

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("varchar", Some(64), None), "varchar(64)");
        assert_eq!(normalize_type("varchar", None, None), "varchar");
        assert_eq!(normalize_type("bpchar", Some(1), None), "char(1)");
        assert_eq!(normalize_type("int8", None, None), "bigint");
        assert_eq!(normalize_type("int4", None, None), "int");
        assert_eq!(
            normalize_type("int8", None, Some("nextval('user_id_seq'::regclass)")),
            "bigserial"
        );
        assert_eq!(
            normalize_type("int4", None, Some("nextval('t_id_seq'::regclass)")),
            "serial"
        );
        assert_eq!(normalize_type("int8", None, Some("0")), "bigint");
        assert_eq!(normalize_type("_text", None, None), "text[]");
        assert_eq!(normalize_type("_int8", None, None), "bigint[]");
        assert_eq!(normalize_type("timestamptz", None, None), "timestamptz");
        assert_eq!(normalize_type("jsonb", None, None), "jsonb");
    }

    #[test]
    fn test_primary_key_is_never_nullable() {
        let table = table_from_catalog(
            "user",
            vec![
                col("id", "int8", None, true, Some("nextval('user_id_seq'::regclass)")),
                col("email", "varchar", Some(255), false, None),
                col("bio", "text", None, true, None),
            ],
            &["id".to_owned()],
        );

        insta::assert_snapshot!(table.to_create_table_sql(), @r#"
        CREATE TABLE "user" (
            "id" bigserial PRIMARY KEY NOT NULL,
            "email" varchar(255) NOT NULL,
            "bio" text
        );
        "#);
    }
}
