//! CRUD over persisted types.

use crate::descriptor::{TypeDescriptor, descriptor};
use crate::events::{BoxError, ChangeHub};
use crate::mapper::map_row;
use crate::persisted::Persisted;
use crate::statement::{self, Statement};
use crate::traced::{Connection, ConnectionExt};
use crate::value::Value;
use crate::{Error, Result};

/// Executes statements built from type declarations and fires change events.
///
/// A `Store` is cheap to clone; clones share their [`ChangeHub`].
///
/// ```ignore
/// let store = Store::new();
/// store.on_change(|user: &User| {
///     tracing::info!(id = ?user.id, "user changed");
///     Ok(())
/// });
///
/// let saved = store.insert(&conn, &User::new("amos@example.com")).await?;
/// let found = store.find::<User>(&conn, "email = $1", &[saved.email.clone().into()]).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Store {
    hub: ChangeHub,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fires into an existing hub.
    pub fn with_hub(hub: ChangeHub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    /// Register a listener for inserts, updates and upserts of `T`.
    pub fn on_change<T, F>(&self, listener: F)
    where
        T: Persisted,
        F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hub.on_change(listener);
    }

    /// Insert every present field of `record` and return the stored row.
    pub async fn insert<T, C>(&self, conn: &C, record: &T) -> Result<T>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::insert(&descriptor, record.to_values())?;
        self.write(conn, &descriptor, stmt).await
    }

    /// Update every present non-key field of `record`, by primary key.
    pub async fn update<T, C>(&self, conn: &C, record: &T) -> Result<T>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::update(&descriptor, record.to_values())?;
        self.write(conn, &descriptor, stmt).await
    }

    /// Insert `record`, or update the row that has the same unique key.
    pub async fn upsert<T, C>(&self, conn: &C, record: &T) -> Result<T>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::upsert(&descriptor, record.to_values())?;
        self.write(conn, &descriptor, stmt).await
    }

    /// Delete by primary key. Returns the number of rows removed.
    ///
    /// Deletes do not fire change events.
    pub async fn delete<T, C>(&self, conn: &C, id: impl Into<Value>) -> Result<u64>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::delete_by_id(&descriptor, id.into())?;
        Ok(conn.traced().execute(&stmt).await?)
    }

    /// Delete the row `record` was loaded from.
    pub async fn delete_record<T, C>(&self, conn: &C, record: &T) -> Result<u64>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let id = statement::primary_key_value(&descriptor, &record.to_values())?;
        let stmt = statement::delete_by_id(&descriptor, id)?;
        Ok(conn.traced().execute(&stmt).await?)
    }

    /// First row matching `predicate`, if any.
    ///
    /// `predicate` is pasted after `WHERE` and must be trusted text; bind
    /// every variable part through `params` (`$1`, `$2`, ...).
    pub async fn find<T, C>(&self, conn: &C, predicate: &str, params: &[Value]) -> Result<Option<T>>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::select_where(&descriptor, predicate, params);
        self.first(conn, &descriptor, &stmt).await
    }

    /// Like [`find`](Self::find), but no match is [`Error::NotFound`].
    pub async fn get<T, C>(&self, conn: &C, predicate: &str, params: &[Value]) -> Result<T>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::select_where(&descriptor, predicate, params);
        self.first(conn, &descriptor, &stmt)
            .await?
            .ok_or_else(|| not_found(&stmt))
    }

    /// Every row matching `predicate`, in result order.
    pub async fn list<T, C>(&self, conn: &C, predicate: &str, params: &[Value]) -> Result<Vec<T>>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::select_where(&descriptor, predicate, params);
        self.all(conn, &descriptor, &stmt).await
    }

    /// The row with primary key `id`, or [`Error::NotFound`].
    pub async fn get_by_id<T, C>(&self, conn: &C, id: impl Into<Value>) -> Result<T>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::select_by_id(&descriptor, id.into())?;
        self.first(conn, &descriptor, &stmt)
            .await?
            .ok_or_else(|| not_found(&stmt))
    }

    /// Every row of `T`'s table.
    pub async fn list_all<T, C>(&self, conn: &C) -> Result<Vec<T>>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::select_all(&descriptor);
        self.all(conn, &descriptor, &stmt).await
    }

    /// `UPDATE <table> <fragment>`. Returns the affected row count and fires
    /// no events.
    pub async fn update_where<T, C>(&self, conn: &C, fragment: &str, params: &[Value]) -> Result<u64>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::update_where(&descriptor, fragment, params);
        Ok(conn.traced().execute(&stmt).await?)
    }

    /// First row of an arbitrary query, mapped into `T` by column name.
    ///
    /// `sql` is a whole statement (joins, CTEs, views, ...) and is executed
    /// as is, so it must be trusted text. Columns `T` does not declare are
    /// ignored; see [`map_row`] for missing and NULL columns.
    pub async fn query_find<T, C>(&self, conn: &C, sql: &str, params: &[Value]) -> Result<Option<T>>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        self.first(conn, &descriptor, &statement::raw(sql, params)).await
    }

    /// Like [`query_find`](Self::query_find), but no row is [`Error::NotFound`].
    pub async fn query_get<T, C>(&self, conn: &C, sql: &str, params: &[Value]) -> Result<T>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        let stmt = statement::raw(sql, params);
        self.first(conn, &descriptor, &stmt)
            .await?
            .ok_or_else(|| not_found(&stmt))
    }

    /// Every row of an arbitrary trusted query, in result order.
    pub async fn query_list<T, C>(&self, conn: &C, sql: &str, params: &[Value]) -> Result<Vec<T>>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let descriptor = descriptor::<T>()?;
        self.all(conn, &descriptor, &statement::raw(sql, params)).await
    }

    /// Run a trusted statement and return the affected row count. No events.
    pub async fn exec<C>(&self, conn: &C, sql: &str, params: &[Value]) -> Result<u64>
    where
        C: Connection + ?Sized,
    {
        Ok(conn.traced().execute(&statement::raw(sql, params)).await?)
    }

    async fn write<T, C>(&self, conn: &C, descriptor: &TypeDescriptor, stmt: Statement) -> Result<T>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        let row = conn
            .traced()
            .query_first(&stmt)
            .await?
            .ok_or_else(|| not_found(&stmt))?;
        let record = map_row::<T>(&row, descriptor)?;
        self.hub.fire(&record)?;
        Ok(record)
    }

    async fn first<T, C>(&self, conn: &C, descriptor: &TypeDescriptor, stmt: &Statement) -> Result<Option<T>>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        match conn.traced().query_first(stmt).await? {
            Some(row) => Ok(Some(map_row(&row, descriptor)?)),
            None => Ok(None),
        }
    }

    async fn all<T, C>(&self, conn: &C, descriptor: &TypeDescriptor, stmt: &Statement) -> Result<Vec<T>>
    where
        T: Persisted,
        C: Connection + ?Sized,
    {
        conn.traced()
            .query(stmt)
            .await?
            .iter()
            .map(|row| map_row(row, descriptor))
            .collect()
    }
}

fn not_found(stmt: &Statement) -> Error {
    Error::NotFound {
        query: stmt.sql.clone(),
        params: stmt.rendered_params(),
    }
}
