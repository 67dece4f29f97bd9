//! Map typed records to Postgres rows, and keep the schema in sync with them.
//!
//! This crate provides:
//! - Static type declarations ([`Persisted`]) turned into cached column shapes
//! - CRUD through a [`Store`], with change listeners fired after writes
//! - Units of work: one pooled connection, one transaction
//! - Catalog introspection and schema sync with a confirmation hook
//!
//! # Naming Convention
//!
//! Type and field names are translated to snake case: `UserAccount` lives in
//! table `user_account`, field `createdAt` in column `created_at`. Table names
//! are the singular type name.
//!
//! # Declaring a type
//!
//! ```ignore
//! impl Persisted for User {
//!     fn declaration() -> TypeDecl {
//!         TypeDecl::new("User")
//!             .field(FieldDecl::new("id", Kind::Int64).primary_key())
//!             .field(FieldDecl::new("email", Kind::Text).varchar(255).unique())
//!             .field(FieldDecl::new("displayName", Kind::Text).nullable())
//!     }
//!     // to_values / from_values in declaration order
//! }
//! ```
//!
//! # Syncing the schema
//!
//! ```ignore
//! let pool = PoolSettings::from_env()?.create_pool()?;
//! let outcome = SchemaSync::non_interactive()
//!     .run(&pool, &[wanted_table::<User>()?])
//!     .await?;
//! ```

pub mod codec;
mod config;
mod descriptor;
mod error;
mod events;
mod introspect;
mod mapper;
mod naming;
mod persisted;
pub mod statement;
mod store;
mod sync;
mod traced;
mod uow;
mod value;

pub use codec::SqlParam;
pub use config::PoolSettings;
pub use descriptor::{ColumnDescriptor, TypeDescriptor, descriptor, wanted_table};
pub use error::Error;
pub use events::{BoxError, ChangeHub};
pub use introspect::{CatalogColumn, introspect, introspect_table, normalize_type};
pub use mapper::map_row;
pub use naming::translate;
pub use persisted::{FieldDecl, FromValue, KeyRole, Persisted, TypeDecl, Values};
pub use statement::Statement;
pub use store::Store;
pub use sync::{SchemaSync, SyncOutcome};
pub use traced::{BoxFuture, Connection, ConnectionExt, TracedConn};
pub use uow::UnitOfWork;
pub use value::{Element, Kind, Symbolic, Value};

// Re-export the physical schema model
pub use rowsync_schema::{Change, Column, Schema, Table, TableDiff, diff, quote_ident};

/// Result type for rowsync operations.
pub type Result<T> = std::result::Result<T, Error>;
