use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// The caller broke a precondition: a malformed declaration, a missing
    /// key value, mismatched table names.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("no row found for `{query}` with params {params:?}")]
    NotFound { query: String, params: Vec<String> },

    #[error("unsupported mapping for kind {kind}: {detail}")]
    UnsupportedMapping { kind: String, detail: String },

    #[error("cannot decode {value:?} as {target}")]
    DecodeFailure { value: String, target: String },

    #[error("column `{column}` of `{table}` is missing from the result row")]
    MissingColumn { table: String, column: String },

    #[error("column `{column}` of `{table}` is NULL but declared non-nullable")]
    UnexpectedNull { table: String, column: String },

    #[error("type mismatch in {table}.{column}: expected {expected}, got {actual}")]
    TypeMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },

    #[error("change listener for {type_name} failed: {source}")]
    Listener {
        type_name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<rowsync_schema::DiffError> for Error {
    fn from(err: rowsync_schema::DiffError) -> Self {
        Error::ContractViolation(err.to_string())
    }
}
