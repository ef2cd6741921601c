//! Table definitions: raw serde config plus the resolved runtime model.

pub mod resolved;
pub mod types;

pub use resolved::{from_json, resolve, ColumnInfo, PkType, Table};
pub use types::{ColumnConfig, TableConfig};
