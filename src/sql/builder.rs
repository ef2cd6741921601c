//! Builds parameterized INSERT, SELECT, UPDATE, DELETE under a policy's field sets.

use crate::fields::FieldSet;
use crate::schema::Table;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Quote identifier for PostgreSQL (safe: only from resolved tables).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(table: &Table) -> String {
    format!("{}.{}", quoted(&table.schema_name), quoted(&table.name))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// `$n` placeholder with a SQL cast (e.g. `$1::timestamptz`) when the column
/// carries a Postgres type name, so string values bind correctly.
/// Serial pseudo-types are DDL-only and cast as their integer base type.
fn placeholder(table: &Table, column: &str, n: usize) -> String {
    table
        .column(column)
        .and_then(|c| c.pg_type.as_deref())
        .map(|t| match t {
            "bigserial" => format!("${n}::bigint"),
            "serial" => format!("${n}::int"),
            "smallserial" => format!("${n}::smallint"),
            _ => format!("${n}::{t}"),
        })
        .unwrap_or_else(|| format!("${n}"))
}

/// Projection in table column order: the given fields plus hidden join keys.
/// Custom enum (schema.typename) and numeric columns come back as text.
fn projection(table: &Table, fields: &FieldSet, hidden: &[String]) -> String {
    table
        .columns
        .iter()
        .filter(|c| fields.contains(&c.name) || hidden.iter().any(|h| *h == c.name))
        .map(|c| {
            let q = quoted(&c.name);
            let pg_type = c.pg_type.as_deref().unwrap_or("");
            if pg_type.contains('.') || pg_type == "numeric" {
                format!("{q}::text")
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Conjunction of fixed-value equalities and the caller's extra filter.
/// Fixed values bind first (in key order), then filter pairs in given order.
fn where_clause(
    q: &mut QueryBuf,
    table: &Table,
    fixed: &BTreeMap<String, Value>,
    filter: &[(String, Value)],
) -> String {
    let mut parts = Vec::new();
    let constraints = fixed
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .chain(filter.iter().map(|(k, v)| (k.as_str(), v)));
    for (col, val) in constraints {
        let n = q.push_param(val.clone());
        parts.push(format!("{} = {}", quoted(col), placeholder(table, col, n)));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT under fixed values and extra filter, ORDER BY pk, optional LIMIT/OFFSET.
pub fn select_rows(
    table: &Table,
    fields: &FieldSet,
    hidden: &[String],
    fixed: &BTreeMap<String, Value>,
    filter: &[(String, Value)],
    limit: Option<u64>,
    offset: Option<u64>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = projection(table, fields, hidden);
    let where_part = where_clause(&mut q, table, fixed, filter);
    let order_part = format!(" ORDER BY {}", quoted(&table.pk_column));
    let limit_part = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
    let offset_part = offset.map(|n| format!(" OFFSET {n}")).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        cols,
        qualified_table(table),
        where_part,
        order_part,
        limit_part,
        offset_part
    );
    q
}

/// SELECT COUNT(*) under the same constraints as select_rows.
pub fn select_count(
    table: &Table,
    fixed: &BTreeMap<String, Value>,
    filter: &[(String, Value)],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_part = where_clause(&mut q, table, fixed, filter);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(table), where_part);
    q
}

/// SELECT fields (plus the join key) WHERE key_column IN (values), ORDER BY pk.
/// Used for batch-loading referenced rows.
pub fn select_related(
    table: &Table,
    fields: &FieldSet,
    key_column: &str,
    values: &[Value],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let hidden: Vec<String> = if fields.contains(key_column) {
        Vec::new()
    } else {
        vec![key_column.to_string()]
    };
    let cols = projection(table, fields, &hidden);
    if values.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, qualified_table(table));
        return q;
    }
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| {
            let n = q.push_param(v.clone());
            placeholder(table, key_column, n)
        })
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        cols,
        qualified_table(table),
        quoted(key_column),
        placeholders.join(", "),
        quoted(&table.pk_column)
    );
    q
}

/// INSERT the payload, RETURNING the read projection. Skips the pk column
/// unless the payload carries it, skips absent columns that have a DB default
/// (so the default applies), and binds NULL for other absent columns.
pub fn insert_row(
    table: &Table,
    fields: &FieldSet,
    hidden: &[String],
    data: &Map<String, Value>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let include_pk = data.contains_key(&table.pk_column);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &table.columns {
        if c.name == table.pk_column && !include_pk {
            continue;
        }
        let val = data.get(&c.name).cloned();
        if val.is_none() && c.has_default {
            continue;
        }
        let n = q.push_param(val.unwrap_or(Value::Null));
        placeholders.push(placeholder(table, &c.name, n));
        cols.push(quoted(&c.name));
    }
    let returning = projection(table, fields, hidden);
    if cols.is_empty() {
        q.sql = format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING {}",
            qualified_table(table),
            returning
        );
        return q;
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        qualified_table(table),
        cols.join(", "),
        placeholders.join(", "),
        returning
    );
    q
}

/// UPDATE every row matching fixed values and filter, SET only the payload
/// columns, RETURNING the read projection. Degrades to a plain select when
/// there is nothing to set.
pub fn update_rows(
    table: &Table,
    fields: &FieldSet,
    hidden: &[String],
    data: &Map<String, Value>,
    fixed: &BTreeMap<String, Value>,
    filter: &[(String, Value)],
) -> QueryBuf {
    if data.is_empty() {
        return select_rows(table, fields, hidden, fixed, filter, None, None);
    }
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (col, val) in data {
        let n = q.push_param(val.clone());
        sets.push(format!("{} = {}", quoted(col), placeholder(table, col, n)));
    }
    let where_part = where_clause(&mut q, table, fixed, filter);
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING {}",
        qualified_table(table),
        sets.join(", "),
        where_part,
        projection(table, fields, hidden)
    );
    q
}

/// DELETE every row matching fixed values and filter. No read-back.
pub fn delete_rows(
    table: &Table,
    fixed: &BTreeMap<String, Value>,
    filter: &[(String, Value)],
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_part = where_clause(&mut q, table, fixed, filter);
    q.sql = format!("DELETE FROM {}{}", qualified_table(table), where_part);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{resolve, ColumnConfig, TableConfig};
    use serde_json::json;

    fn table() -> Table {
        resolve(&TableConfig {
            name: "people".into(),
            schema: "public".into(),
            primary_key: "id".into(),
            columns: vec![
                ColumnConfig {
                    name: "id".into(),
                    type_: Some("bigserial".into()),
                    nullable: false,
                    has_default: true,
                },
                ColumnConfig {
                    name: "name".into(),
                    type_: Some("text".into()),
                    nullable: true,
                    has_default: false,
                },
                ColumnConfig {
                    name: "family_id".into(),
                    type_: Some("bigint".into()),
                    nullable: true,
                    has_default: false,
                },
                ColumnConfig {
                    name: "created".into(),
                    type_: Some("timestamptz".into()),
                    nullable: true,
                    has_default: true,
                },
            ],
        })
        .unwrap()
    }

    fn fields(t: &Table, names: &[&str]) -> FieldSet {
        FieldSet::resolve(t, Some(names)).unwrap()
    }

    #[test]
    fn select_projects_in_table_order_and_orders_by_pk() {
        let t = table();
        let f = fields(&t, &["name", "id"]);
        let q = select_rows(&t, &f, &[], &BTreeMap::new(), &[], None, None);
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"name\" FROM \"public\".\"people\" ORDER BY \"id\""
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn select_binds_fixed_before_filter_with_casts() {
        let t = table();
        let f = fields(&t, &["id", "name"]);
        let mut fixed = BTreeMap::new();
        fixed.insert("family_id".to_string(), json!(7));
        let filter = vec![("name".to_string(), json!("Jones"))];
        let q = select_rows(&t, &f, &[], &fixed, &filter, Some(13), Some(26));
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"name\" FROM \"public\".\"people\" \
             WHERE \"family_id\" = $1::bigint AND \"name\" = $2::text \
             ORDER BY \"id\" LIMIT 13 OFFSET 26"
        );
        assert_eq!(q.params, vec![json!(7), json!("Jones")]);
    }

    #[test]
    fn hidden_columns_join_the_projection() {
        let t = table();
        let f = fields(&t, &["name"]);
        let q = select_rows(
            &t,
            &f,
            &["family_id".to_string()],
            &BTreeMap::new(),
            &[],
            None,
            None,
        );
        assert!(q.sql.starts_with("SELECT \"name\", \"family_id\" FROM"));
    }

    #[test]
    fn count_shares_where_semantics() {
        let t = table();
        let mut fixed = BTreeMap::new();
        fixed.insert("family_id".to_string(), json!(3));
        let q = select_count(&t, &fixed, &[]);
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"public\".\"people\" WHERE \"family_id\" = $1::bigint"
        );
        assert_eq!(q.params, vec![json!(3)]);
    }

    #[test]
    fn insert_skips_missing_pk_and_defaulted_columns() {
        let t = table();
        let f = fields(&t, &["id", "name"]);
        let mut data = Map::new();
        data.insert("name".to_string(), json!("Molly"));
        let q = insert_row(&t, &f, &[], &data);
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"people\" (\"name\", \"family_id\") \
             VALUES ($1::text, $2::bigint) RETURNING \"id\", \"name\""
        );
        assert_eq!(q.params, vec![json!("Molly"), Value::Null]);
    }

    #[test]
    fn empty_insert_uses_default_values() {
        let t = table();
        let f = fields(&t, &["id"]);
        // Table where every non-pk column has a default.
        let t2 = {
            let mut t2 = t.clone();
            for c in &mut t2.columns {
                c.has_default = true;
            }
            t2
        };
        let q = insert_row(&t2, &f, &[], &Map::new());
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"people\" DEFAULT VALUES RETURNING \"id\""
        );
    }

    #[test]
    fn update_sets_payload_and_filters_by_fixed() {
        let t = table();
        let f = fields(&t, &["id", "name"]);
        let mut data = Map::new();
        data.insert("name".to_string(), json!("Jamison"));
        let mut fixed = BTreeMap::new();
        fixed.insert("family_id".to_string(), json!(7));
        let q = update_rows(&t, &f, &[], &data, &fixed, &[]);
        assert_eq!(
            q.sql,
            "UPDATE \"public\".\"people\" SET \"name\" = $1::text \
             WHERE \"family_id\" = $2::bigint RETURNING \"id\", \"name\""
        );
        assert_eq!(q.params, vec![json!("Jamison"), json!(7)]);
    }

    #[test]
    fn empty_update_degrades_to_select() {
        let t = table();
        let f = fields(&t, &["id", "name"]);
        let q = update_rows(&t, &f, &[], &Map::new(), &BTreeMap::new(), &[]);
        assert!(q.sql.starts_with("SELECT"));
    }

    #[test]
    fn delete_has_no_returning() {
        let t = table();
        let filter = vec![("name".to_string(), json!("Arnold"))];
        let q = delete_rows(&t, &BTreeMap::new(), &filter);
        assert_eq!(
            q.sql,
            "DELETE FROM \"public\".\"people\" WHERE \"name\" = $1::text"
        );
    }

    #[test]
    fn related_lookup_batches_values_and_projects_key() {
        let t = table();
        let f = fields(&t, &["name"]);
        let q = select_related(&t, &f, "id", &[json!(1), json!(2)]);
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"name\" FROM \"public\".\"people\" \
             WHERE \"id\" IN ($1::bigint, $2::bigint) ORDER BY \"id\""
        );
        assert_eq!(q.params, vec![json!(1), json!(2)]);
    }

    #[test]
    fn related_lookup_with_no_values_matches_nothing() {
        let t = table();
        let f = fields(&t, &["name"]);
        let q = select_related(&t, &f, "id", &[]);
        assert!(q.sql.ends_with("WHERE 1 = 0"));
        assert!(q.params.is_empty());
    }
}
