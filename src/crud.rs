//! Policy-enforced CRUD execution against PostgreSQL.

use crate::error::CrudError;
use crate::policy::{Policy, Readset, Writeset};
use crate::reference::Ref;
use crate::sanitize::{SanitizeContext, Sanitizer};
use crate::schema::Table;
use crate::sql::{self, PgBindValue, QueryBuf};
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Create/fetch/update/delete against one table under a policy, with
/// optional sanitization, reference expansion, fixed-value scoping, and
/// table-name exposure. Immutable; `fix`/`with_*` derive new instances.
#[derive(Clone, Debug)]
pub struct Crud {
    policy: Policy,
    sanitizer: Option<Sanitizer>,
    refs: Vec<Ref>,
    fixed: BTreeMap<String, Value>,
    table_attr: Option<String>,
    table_map: HashMap<String, String>,
    context: SanitizeContext,
}

impl Crud {
    pub fn new(policy: Policy) -> Self {
        Crud {
            policy,
            sanitizer: None,
            refs: Vec::new(),
            fixed: BTreeMap::new(),
            table_attr: None,
            table_map: HashMap::new(),
            context: SanitizeContext::new(),
        }
    }

    pub fn read_only(readset: Readset) -> Self {
        Self::new(Policy::read_only(readset))
    }

    pub fn from_sets(read: Readset, write: Writeset) -> Result<Self, CrudError> {
        Ok(Self::new(Policy::from_sets(read, write)?))
    }

    /// Attach a sanitizer; it must be bound to the same table.
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Result<Self, CrudError> {
        if sanitizer.table().name != self.table().name {
            return Err(CrudError::TableMismatch {
                expected: self.table().name.clone(),
                got: sanitizer.table().name.clone(),
            });
        }
        self.sanitizer = Some(sanitizer);
        Ok(self)
    }

    /// Attach a reference; its parent column must exist on this table.
    pub fn with_ref(mut self, reference: Ref) -> Result<Self, CrudError> {
        if !self.table().has_column(reference.parent_column()) {
            return Err(CrudError::unknown_field(
                &self.table().name,
                reference.parent_column(),
            ));
        }
        self.refs.push(reference);
        Ok(self)
    }

    /// Expose the table's display name under this attribute on every
    /// returned row, including expanded references.
    pub fn with_table_attr(mut self, attr: &str) -> Self {
        self.table_attr = Some(attr.to_string());
        self
    }

    /// Remap table names to display names for `with_table_attr`.
    pub fn with_table_map(mut self, map: HashMap<String, String>) -> Self {
        self.table_map = map;
        self
    }

    /// Contextual values handed to every sanitizer hook.
    pub fn with_context(mut self, context: SanitizeContext) -> Self {
        self.context = context;
        self
    }

    pub fn table(&self) -> &Arc<Table> {
        self.policy.table()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn fixed(&self) -> &BTreeMap<String, Value> {
        &self.fixed
    }

    /// Derive a crud with additional fixed values. Fixed values constrain
    /// every query this instance issues and are merged into created rows.
    /// Re-fixing a field to the same value is idempotent; to a different
    /// value, an error. A child can never un-fix its parent's scope.
    pub fn fix<I>(&self, values: I) -> Result<Crud, CrudError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut fixed = self.fixed.clone();
        for (field, value) in values {
            if !self.table().has_column(&field) {
                return Err(CrudError::unknown_field(&self.table().name, &field));
            }
            match fixed.get(&field) {
                Some(existing) if *existing != value => {
                    return Err(CrudError::FixConflict { field });
                }
                _ => {
                    fixed.insert(field, value);
                }
            }
        }
        let mut child = self.clone();
        child.fixed = fixed;
        Ok(child)
    }

    /// Insert one row. The payload may only name writeable, non-fixed
    /// columns; fixed values are merged in, the sanitizer runs, required
    /// fields are checked, and the created row comes back readable-only
    /// with references expanded.
    pub async fn create(&self, pool: &PgPool, data: Map<String, Value>) -> Result<Value, CrudError> {
        let payload = self.prepare_create(data)?;
        let hidden = self.hidden_columns();
        let q = sql::insert_row(self.table(), self.policy.readable(), &hidden, &payload);
        let row = fetch_one_row(pool, &q)
            .await?
            .ok_or(CrudError::Db(sqlx::Error::RowNotFound))?;
        let rows = self.expand(pool, vec![row]).await?;
        rows.into_iter()
            .next()
            .ok_or(CrudError::Db(sqlx::Error::RowNotFound))
    }

    /// Select every row matching the fixed values and the extra equality
    /// filter, readable columns only, ordered by primary key.
    pub async fn fetch(
        &self,
        pool: &PgPool,
        filter: &[(String, Value)],
    ) -> Result<Vec<Value>, CrudError> {
        self.fetch_range(pool, filter, None, None).await
    }

    pub(crate) async fn fetch_range(
        &self,
        pool: &PgPool,
        filter: &[(String, Value)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Value>, CrudError> {
        self.validate_filter(filter)?;
        let hidden = self.hidden_columns();
        let q = sql::select_rows(
            self.table(),
            self.policy.readable(),
            &hidden,
            &self.fixed,
            filter,
            limit,
            offset,
        );
        let rows = query_rows(pool, &q).await?;
        self.expand(pool, rows).await
    }

    /// Update every row matching the fixed values and filter. The payload is
    /// validated and sanitized like create (no required check); affected rows
    /// come back shaped like fetch.
    pub async fn update(
        &self,
        pool: &PgPool,
        data: Map<String, Value>,
        filter: &[(String, Value)],
    ) -> Result<Vec<Value>, CrudError> {
        let payload = self.prepare_update(data)?;
        self.validate_filter(filter)?;
        let hidden = self.hidden_columns();
        let q = sql::update_rows(
            self.table(),
            self.policy.readable(),
            &hidden,
            &payload,
            &self.fixed,
            filter,
        );
        let rows = query_rows(pool, &q).await?;
        self.expand(pool, rows).await
    }

    /// Delete every row matching the fixed values and filter; returns the
    /// affected-row count.
    pub async fn delete(
        &self,
        pool: &PgPool,
        filter: &[(String, Value)],
    ) -> Result<u64, CrudError> {
        self.validate_filter(filter)?;
        let q = sql::delete_rows(self.table(), &self.fixed, filter);
        execute(pool, &q).await
    }

    pub(crate) async fn count(
        &self,
        pool: &PgPool,
        filter: &[(String, Value)],
    ) -> Result<u64, CrudError> {
        self.validate_filter(filter)?;
        let q = sql::select_count(self.table(), &self.fixed, filter);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let n = query.fetch_one(pool).await?;
        Ok(n.max(0) as u64)
    }

    // --- validation (pure; runs before any statement is issued) ---

    fn validate_write(&self, data: &Map<String, Value>) -> Result<(), CrudError> {
        for key in data.keys() {
            if !self.table().has_column(key) {
                return Err(CrudError::unknown_field(&self.table().name, key));
            }
            if self.fixed.contains_key(key) || !self.policy.writeable().contains(key) {
                return Err(CrudError::not_writeable(&self.table().name, key));
            }
        }
        Ok(())
    }

    fn validate_filter(&self, filter: &[(String, Value)]) -> Result<(), CrudError> {
        for (col, _) in filter {
            if !self.table().has_column(col) {
                return Err(CrudError::unknown_field(&self.table().name, col));
            }
        }
        Ok(())
    }

    /// Sanitized payloads may carry columns outside the writeable set
    /// (system stamps), but never columns the table does not have.
    fn check_columns(&self, data: &Map<String, Value>) -> Result<(), CrudError> {
        for key in data.keys() {
            if !self.table().has_column(key) {
                return Err(CrudError::unknown_field(&self.table().name, key));
            }
        }
        Ok(())
    }

    fn check_required(&self, data: &Map<String, Value>) -> Result<(), CrudError> {
        let missing: Vec<&str> = self
            .policy
            .required()
            .iter()
            .filter(|f| matches!(data.get(*f), None | Some(Value::Null)))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CrudError::MissingFields(missing.join(", ")))
        }
    }

    fn prepare_create(&self, data: Map<String, Value>) -> Result<Map<String, Value>, CrudError> {
        self.validate_write(&data)?;
        let mut merged = data;
        for (k, v) in &self.fixed {
            merged.insert(k.clone(), v.clone());
        }
        let merged = match &self.sanitizer {
            Some(s) => s.run(&self.context, merged)?,
            None => merged,
        };
        self.check_columns(&merged)?;
        self.check_required(&merged)?;
        Ok(merged)
    }

    fn prepare_update(&self, data: Map<String, Value>) -> Result<Map<String, Value>, CrudError> {
        self.validate_write(&data)?;
        let payload = match &self.sanitizer {
            Some(s) => s.run(&self.context, data)?,
            None => data,
        };
        self.check_columns(&payload)?;
        Ok(payload)
    }

    // --- result shaping ---

    /// Join-key columns that must ride along in projections even when the
    /// policy does not make them readable. Stripped before returning rows.
    fn hidden_columns(&self) -> Vec<String> {
        let mut hidden = Vec::new();
        for r in &self.refs {
            let col = r.parent_column();
            if !self.policy.readable().contains(col) && !hidden.iter().any(|h| h == col) {
                hidden.push(col.to_string());
            }
        }
        hidden
    }

    fn display_name(&self, table: &Table) -> String {
        self.table_map
            .get(&table.name)
            .cloned()
            .unwrap_or_else(|| table.name.clone())
    }

    /// Expand references (one batch lookup per reference), apply table-name
    /// exposure, and strip hidden join keys.
    async fn expand(&self, pool: &PgPool, mut rows: Vec<Value>) -> Result<Vec<Value>, CrudError> {
        for r in &self.refs {
            let mut keys: Vec<Value> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for row in &rows {
                if let Some(v) = row.get(r.parent_column()) {
                    if !v.is_null() && seen.insert(value_key(v)) {
                        keys.push(v.clone());
                    }
                }
            }

            let related = if keys.is_empty() {
                Vec::new()
            } else {
                let q = sql::select_related(
                    r.readset().table(),
                    r.readset().fields(),
                    r.target_column(),
                    &keys,
                );
                query_rows(pool, &q).await?
            };

            let by_key = self.index_related(r, related);
            self.attach_related(r, &by_key, &mut rows);
        }

        let strip: Vec<String> = self
            .hidden_columns()
            .into_iter()
            .filter(|h| !self.refs.iter().any(|r| r.name() == h))
            .collect();
        for row in rows.iter_mut() {
            if let Some(obj) = row.as_object_mut() {
                for h in &strip {
                    obj.remove(h);
                }
                if let Some(attr) = &self.table_attr {
                    obj.insert(attr.clone(), Value::String(self.display_name(self.table())));
                }
            }
        }
        Ok(rows)
    }
}

impl Crud {
    /// Index related rows by join key, shaping each one: the join key is
    /// stripped when it is not a readable field of the target, and the
    /// table attribute is applied.
    fn index_related(&self, r: &Ref, related: Vec<Value>) -> HashMap<String, Value> {
        let mut by_key: HashMap<String, Value> = HashMap::new();
        for mut rel in related {
            let Some(key) = rel.get(r.target_column()).map(value_key) else {
                continue;
            };
            if let Some(obj) = rel.as_object_mut() {
                if !r.readset().fields().contains(r.target_column()) {
                    obj.remove(r.target_column());
                }
                if let Some(attr) = &self.table_attr {
                    obj.insert(
                        attr.clone(),
                        Value::String(self.display_name(r.readset().table())),
                    );
                }
            }
            // ORDER BY pk makes the first match deterministic.
            by_key.entry(key).or_insert(rel);
        }
        by_key
    }

    /// Attach the matching related row under the reference's name; no match
    /// leaves the key present with null.
    fn attach_related(&self, r: &Ref, by_key: &HashMap<String, Value>, rows: &mut [Value]) {
        for row in rows.iter_mut() {
            let attached = row
                .get(r.parent_column())
                .filter(|v| !v.is_null())
                .and_then(|v| by_key.get(&value_key(v)))
                .cloned()
                .unwrap_or(Value::Null);
            if let Some(obj) = row.as_object_mut() {
                obj.insert(r.name().to_string(), attached);
            }
        }
    }
}

/// Canonical key for equality joins between decoded JSON values.
fn value_key(v: &Value) -> String {
    v.to_string()
}

async fn query_rows(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Value>, CrudError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from(p));
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn fetch_one_row(pool: &PgPool, q: &QueryBuf) -> Result<Option<Value>, CrudError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from(p));
    }
    let row = query.fetch_optional(pool).await?;
    Ok(row.map(|r| row_to_json(&r)))
}

async fn execute(pool: &PgPool, q: &QueryBuf) -> Result<u64, CrudError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from(p));
    }
    let done = query.execute(pool).await?;
    Ok(done.rows_affected())
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
