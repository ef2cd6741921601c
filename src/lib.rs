//! crudgate: policy-driven CRUD library for PostgreSQL.

pub mod crud;
pub mod error;
pub mod fields;
pub mod page;
pub mod policy;
pub mod reference;
pub mod sanitize;
pub mod schema;
pub mod sql;

pub use crud::Crud;
pub use error::{CrudError, SchemaError};
pub use fields::FieldSet;
pub use page::Paginator;
pub use policy::{Policy, Readset, Writeset};
pub use reference::Ref;
pub use sanitize::{SanitizeContext, Sanitizer};
pub use schema::{resolve, ColumnConfig, PkType, Table, TableConfig};
