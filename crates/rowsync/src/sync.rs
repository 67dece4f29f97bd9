//! Bringing the live schema in line with declared tables.
//!
//! [`SchemaSync::run`] introspects the database, diffs every wanted table
//! against what exists, asks the confirm hook about the rendered DDL, and
//! applies the executable statements in one transaction. Advisory changes
//! (removed columns, primary-key flips) are rendered as comments and never
//! executed.

use crate::introspect::introspect;
use crate::Result;
use rowsync_schema::{Schema, Table, TableDiff, diff};

type ConfirmHook = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// What a sync run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No executable statement was needed.
    UpToDate,
    /// The confirm hook refused the plan; nothing ran.
    Declined,
    /// This many statements were applied.
    Applied(usize),
}

/// Schema synchronizer with a confirmation hook.
pub struct SchemaSync {
    confirm: ConfirmHook,
}

impl SchemaSync {
    /// `confirm` receives every rendered statement, advisories included, and
    /// decides whether the executable ones run.
    pub fn new(confirm: impl Fn(&[String]) -> bool + Send + Sync + 'static) -> Self {
        Self {
            confirm: Box::new(confirm),
        }
    }

    /// A synchronizer that accepts every plan.
    pub fn non_interactive() -> Self {
        Self::new(|_| true)
    }

    /// Diff each wanted table against `existing`, dropping empty diffs.
    pub fn plan(existing: &Schema, wanted: &[Table]) -> Result<Vec<TableDiff>> {
        let mut diffs = Vec::new();
        for table in wanted {
            let table_diff = diff(existing.get_table(&table.name), table)?;
            if !table_diff.is_empty() {
                diffs.push(table_diff);
            }
        }
        Ok(diffs)
    }

    /// Introspect, plan, confirm and apply.
    pub async fn run(&self, pool: &deadpool_postgres::Pool, wanted: &[Table]) -> Result<SyncOutcome> {
        let mut conn = pool.get().await?;
        let existing = introspect(&conn).await?;
        let diffs = Self::plan(&existing, wanted)?;

        let rendered: Vec<String> = diffs.iter().flat_map(TableDiff::statements).collect();
        let executable: Vec<String> = diffs
            .iter()
            .flat_map(TableDiff::executable_statements)
            .collect();

        if executable.is_empty() {
            for advisory in &rendered {
                tracing::warn!(statement = %advisory, "schema change needs manual attention");
            }
            tracing::debug!("schema up to date");
            return Ok(SyncOutcome::UpToDate);
        }

        for statement in &rendered {
            tracing::info!(statement = %statement, "planned schema change");
        }

        if !(self.confirm)(&rendered) {
            tracing::warn!(statements = executable.len(), "schema changes declined");
            return Ok(SyncOutcome::Declined);
        }

        let tx = conn.transaction().await?;
        for statement in &executable {
            tx.batch_execute(statement).await?;
            tracing::info!(statement = %statement, "applied schema change");
        }
        tx.commit().await?;

        Ok(SyncOutcome::Applied(executable.len()))
    }
}

impl std::fmt::Debug for SchemaSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaSync").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_schema::Column;

    fn users(extra: Option<Column>) -> Table {
        let mut columns = vec![
            Column::new("id", "bigserial").primary_key(),
            Column::new("name", "text"),
        ];
        columns.extend(extra);
        Table::new("user", columns)
    }

    #[test]
    fn test_plan_creates_missing_tables() {
        let diffs = SchemaSync::plan(&Schema::new(), &[users(None)]).unwrap();
        assert_eq!(diffs.len(), 1);
        insta::assert_snapshot!(diffs[0].to_sql(), @r#"
        CREATE TABLE "user" (
            "id" bigserial PRIMARY KEY NOT NULL,
            "name" text NOT NULL
        );
        "#);
    }

    #[test]
    fn test_plan_skips_matching_tables() {
        let mut existing = Schema::new();
        existing.insert(users(None));
        assert!(SchemaSync::plan(&existing, &[users(None)]).unwrap().is_empty());
    }

    #[test]
    fn test_plan_adds_nullable_column() {
        let mut existing = Schema::new();
        existing.insert(users(None));
        let wanted = users(Some(Column::new("email", "text").nullable()));

        let diffs = SchemaSync::plan(&existing, &[wanted]).unwrap();
        assert_eq!(
            diffs[0].executable_statements(),
            vec![r#"ALTER TABLE "user" ADD COLUMN "email" text;"#]
        );
    }

    #[test]
    fn test_plan_advisory_only() {
        let mut existing = Schema::new();
        existing.insert(users(Some(Column::new("legacy", "text"))));

        let diffs = SchemaSync::plan(&existing, &[users(None)]).unwrap();
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].executable_statements().is_empty());
        assert_eq!(
            diffs[0].statements(),
            vec![r#"-- ALTER TABLE "user" DROP COLUMN "legacy";"#]
        );
    }

    #[test]
    fn test_confirm_hook_sees_statements() {
        let sync = SchemaSync::new(|statements| statements.len() == 1);
        assert!((sync.confirm)(&["SELECT 1".to_owned()]));
        assert!(!(sync.confirm)(&[]));
        assert!((SchemaSync::non_interactive().confirm)(&[]));
    }
}
