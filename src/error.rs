//! Typed errors for schema resolution and CRUD execution.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid primary key: table {table} column {column}")]
    InvalidPrimaryKey { table: String, column: String },
    #[error("duplicate column '{column}' on table {table}")]
    DuplicateColumn { table: String, column: String },
    #[error("schema load: {0}")]
    Load(String),
}

#[derive(Error, Debug)]
pub enum CrudError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("unknown field '{field}' on table '{table}'")]
    UnknownField { table: String, field: String },
    #[error("field '{field}' on table '{table}' is not writeable")]
    FieldPermission { table: String, field: String },
    #[error("writeable field '{field}' on table '{table}' is not readable")]
    WriteableNotReadable { table: String, field: String },
    #[error("table mismatch: expected '{expected}', got '{got}'")]
    TableMismatch { expected: String, got: String },
    #[error("missing required fields: {0}")]
    MissingFields(String),
    #[error("field '{field}' is already fixed to a different value")]
    FixConflict { field: String },
    #[error("invalid page index: {0}")]
    InvalidPage(i64),
    #[error("page size must be positive, got {0}")]
    InvalidPageSize(u64),
    #[error("sanitize: {0}")]
    Sanitize(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl CrudError {
    pub(crate) fn unknown_field(table: &str, field: &str) -> Self {
        CrudError::UnknownField {
            table: table.to_string(),
            field: field.to_string(),
        }
    }

    pub(crate) fn not_writeable(table: &str, field: &str) -> Self {
        CrudError::FieldPermission {
            table: table.to_string(),
            field: field.to_string(),
        }
    }
}
