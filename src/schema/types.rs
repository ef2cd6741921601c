//! Raw table definition types matching the JSON schema.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    /// PostgreSQL schema the table lives in.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Single-column primary key; composite keys are not supported.
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
}

fn default_schema() -> String {
    "public".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding string values.
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. gen_random_uuid(), NOW()).
    #[serde(default)]
    pub has_default: bool,
}

fn default_true() -> bool {
    true
}
