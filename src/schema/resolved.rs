//! Resolved table model: config validated and flattened for runtime use.

use crate::error::SchemaError;
use crate::schema::types::TableConfig;
use std::collections::HashSet;

/// Primary key type for ordering and id handling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. gen_random_uuid(), NOW()).
    pub has_default: bool,
    /// PostgreSQL type name for SQL casts (e.g. "timestamptz") when binding string values.
    pub pg_type: Option<String>,
}

/// A table the policy layer can issue queries against. Immutable after
/// resolution; shared as `Arc<Table>` across policies and cruds.
#[derive(Clone, Debug)]
pub struct Table {
    pub name: String,
    pub schema_name: String,
    pub pk_column: String,
    pub pk_type: PkType,
    pub columns: Vec<ColumnInfo>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Build the runtime table from raw config (validates as it goes).
pub fn resolve(config: &TableConfig) -> Result<Table, SchemaError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for c in &config.columns {
        if !seen.insert(c.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                table: config.name.clone(),
                column: c.name.clone(),
            });
        }
    }

    let pk = config
        .columns
        .iter()
        .find(|c| c.name == config.primary_key)
        .ok_or_else(|| SchemaError::InvalidPrimaryKey {
            table: config.name.clone(),
            column: config.primary_key.clone(),
        })?;
    let pk_type = pk_type_of(pk.type_.as_deref());

    let columns = config
        .columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name.clone(),
            nullable: c.nullable,
            has_default: c.has_default,
            pg_type: c.type_.clone(),
        })
        .collect();

    Ok(Table {
        name: config.name.clone(),
        schema_name: config.schema.clone(),
        pk_column: config.primary_key.clone(),
        pk_type,
        columns,
    })
}

/// Parse a table definition from JSON and resolve it.
pub fn from_json(json: &str) -> Result<Table, SchemaError> {
    let config: TableConfig =
        serde_json::from_str(json).map_err(|e| SchemaError::Load(e.to_string()))?;
    resolve(&config)
}

fn pk_type_of(pg_type: Option<&str>) -> PkType {
    let t = pg_type.unwrap_or("").to_lowercase();
    if t.contains("uuid") {
        PkType::Uuid
    } else if t.contains("bigint") || t.contains("bigserial") {
        PkType::BigInt
    } else if t.contains("int") || t.contains("serial") {
        PkType::Int
    } else {
        PkType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ColumnConfig;

    fn column(name: &str, pg_type: Option<&str>) -> ColumnConfig {
        ColumnConfig {
            name: name.into(),
            type_: pg_type.map(String::from),
            nullable: true,
            has_default: false,
        }
    }

    fn config() -> TableConfig {
        TableConfig {
            name: "people".into(),
            schema: "public".into(),
            primary_key: "id".into(),
            columns: vec![
                column("id", Some("bigserial")),
                column("name", Some("text")),
                column("family_id", Some("bigint")),
            ],
        }
    }

    #[test]
    fn resolve_builds_runtime_table() {
        let table = resolve(&config()).unwrap();
        assert_eq!(table.name, "people");
        assert_eq!(table.pk_column, "id");
        assert_eq!(table.pk_type, PkType::BigInt);
        assert!(table.has_column("family_id"));
        assert!(!table.has_column("surname"));
    }

    #[test]
    fn resolve_rejects_unknown_primary_key() {
        let mut cfg = config();
        cfg.primary_key = "nope".into();
        let err = resolve(&cfg).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPrimaryKey { .. }));
    }

    #[test]
    fn resolve_rejects_duplicate_column() {
        let mut cfg = config();
        cfg.columns.push(column("name", Some("text")));
        let err = resolve(&cfg).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn pk_type_inferred_from_pg_type() {
        assert_eq!(pk_type_of(Some("uuid")), PkType::Uuid);
        assert_eq!(pk_type_of(Some("bigint")), PkType::BigInt);
        assert_eq!(pk_type_of(Some("serial")), PkType::Int);
        assert_eq!(pk_type_of(Some("text")), PkType::Text);
        assert_eq!(pk_type_of(None), PkType::Text);
    }

    #[test]
    fn from_json_applies_defaults() {
        let table = from_json(
            r#"{
                "name": "family",
                "primary_key": "id",
                "columns": [
                    {"name": "id", "type": "bigserial", "has_default": true},
                    {"name": "surname", "type": "text"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(table.schema_name, "public");
        assert!(table.column("id").unwrap().has_default);
        assert!(table.column("surname").unwrap().nullable);
    }
}
