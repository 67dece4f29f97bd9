//! Units of work: one pooled connection, one transaction.

use crate::store::Store;
use crate::traced::{BoxFuture, Connection};
use crate::Result;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};

/// A transaction on a single checked-out connection.
///
/// Handed to the closure given to [`Store::unit_of_work`]. Every statement
/// run through it shares the transaction; it has no way to begin another.
pub struct UnitOfWork<'c> {
    tx: deadpool_postgres::Transaction<'c>,
    store: Store,
}

impl UnitOfWork<'_> {
    /// The store that opened this unit of work, sharing its change hub.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl Connection for UnitOfWork<'_> {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, std::result::Result<u64, Error>> {
        Connection::execute(&*self.tx, sql, params)
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, std::result::Result<Vec<Row>, Error>> {
        Connection::query(&*self.tx, sql, params)
    }

    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, std::result::Result<Option<Row>, Error>> {
        Connection::query_opt(&*self.tx, sql, params)
    }

    fn query_one<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, std::result::Result<Row, Error>> {
        Connection::query_one(&*self.tx, sql, params)
    }
}

impl Store {
    /// Run `work` inside a transaction on one pooled connection.
    ///
    /// `Ok` commits and `Err` rolls back. If the future is dropped before it
    /// finishes, the driver rolls the transaction back. The connection goes
    /// back to the pool in every case.
    ///
    /// ```ignore
    /// let (user, order) = store
    ///     .unit_of_work(&pool, |uow| {
    ///         Box::pin(async move {
    ///             let user = uow.store().insert(uow, &user).await?;
    ///             let order = uow.store().insert(uow, &Order::for_user(&user)).await?;
    ///             Ok((user, order))
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn unit_of_work<R, F>(&self, pool: &deadpool_postgres::Pool, work: F) -> Result<R>
    where
        R: Send,
        F: for<'u> FnOnce(&'u UnitOfWork<'u>) -> BoxFuture<'u, Result<R>>,
    {
        let mut conn = pool.get().await?;
        let tx = conn.transaction().await?;
        let uow = UnitOfWork {
            tx,
            store: self.clone(),
        };

        let outcome = work(&uow).await;
        match outcome {
            Ok(value) => {
                uow.tx.commit().await?;
                tracing::debug!("unit of work committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = uow.tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                tracing::debug!(error = %err, "unit of work rolled back");
                Err(err)
            }
        }
    }
}
