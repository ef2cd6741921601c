//! Write-payload sanitization: an ordered pipeline of whole-payload and
//! per-field transforms, run by the crud before persistence.

use crate::error::CrudError;
use crate::schema::Table;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Caller-supplied contextual values (e.g. the acting user) threaded through
/// every hook unchanged.
#[derive(Clone, Debug, Default)]
pub struct SanitizeContext {
    values: HashMap<String, Value>,
}

impl SanitizeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

type DataHook =
    Arc<dyn Fn(&SanitizeContext, Map<String, Value>) -> Result<Map<String, Value>, CrudError> + Send + Sync>;
type FieldHook =
    Arc<dyn Fn(&SanitizeContext, &Map<String, Value>, &str) -> Result<Value, CrudError> + Send + Sync>;

/// Ordered transform pipeline over write payloads. Data-level hooks run
/// first in registration order, then field-level hooks grouped by field in
/// first-registration order; each hook sees the previous hook's output.
/// Field-set membership is not enforced here; the crud does that.
#[derive(Clone)]
pub struct Sanitizer {
    table: Arc<Table>,
    data_hooks: Vec<DataHook>,
    field_hooks: Vec<(String, Vec<FieldHook>)>,
}

impl std::fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sanitizer")
            .field("table", &self.table)
            .field("data_hooks", &self.data_hooks.len())
            .field(
                "field_hooks",
                &self
                    .field_hooks
                    .iter()
                    .map(|(name, hooks)| (name, hooks.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Sanitizer {
    pub fn new(table: Arc<Table>) -> Self {
        Sanitizer {
            table,
            data_hooks: Vec::new(),
            field_hooks: Vec::new(),
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Register a transform over the whole candidate payload.
    pub fn on_data<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SanitizeContext, Map<String, Value>) -> Result<Map<String, Value>, CrudError>
            + Send
            + Sync
            + 'static,
    {
        self.data_hooks.push(Arc::new(hook));
        self
    }

    /// Register a transform for one field, run only when the field is present
    /// after the data-level hooks. The hook returns the field's new value.
    pub fn on_field<F>(mut self, field: &str, hook: F) -> Result<Self, CrudError>
    where
        F: Fn(&SanitizeContext, &Map<String, Value>, &str) -> Result<Value, CrudError>
            + Send
            + Sync
            + 'static,
    {
        if !self.table.has_column(field) {
            return Err(CrudError::unknown_field(&self.table.name, field));
        }
        let hook: FieldHook = Arc::new(hook);
        match self.field_hooks.iter_mut().find(|(f, _)| f == field) {
            Some((_, hooks)) => hooks.push(hook),
            None => self.field_hooks.push((field.to_string(), vec![hook])),
        }
        Ok(self)
    }

    pub fn run(
        &self,
        ctx: &SanitizeContext,
        mut data: Map<String, Value>,
    ) -> Result<Map<String, Value>, CrudError> {
        for hook in &self.data_hooks {
            data = hook(ctx, data)?;
        }
        for (field, hooks) in &self.field_hooks {
            if !data.contains_key(field) {
                continue;
            }
            for hook in hooks {
                let value = hook(ctx, &data, field)?;
                data.insert(field.clone(), value);
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{resolve, ColumnConfig, TableConfig};
    use serde_json::json;

    fn table() -> Arc<Table> {
        Arc::new(
            resolve(&TableConfig {
                name: "people".into(),
                schema: "public".into(),
                primary_key: "id".into(),
                columns: ["id", "name", "created_by"]
                    .iter()
                    .map(|n| ColumnConfig {
                        name: (*n).into(),
                        type_: Some("text".into()),
                        nullable: true,
                        has_default: false,
                    })
                    .collect(),
            })
            .unwrap(),
        )
    }

    fn payload(entries: &[(&str, &str)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect()
    }

    fn title_case(s: &str) -> String {
        s.split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn field_hook_title_cases_name() {
        let sanitizer = Sanitizer::new(table())
            .on_field("name", |_, data, field| {
                let s = data.get(field).and_then(Value::as_str).unwrap_or_default();
                Ok(Value::String(title_case(s)))
            })
            .unwrap();
        let out = sanitizer
            .run(&SanitizeContext::new(), payload(&[("name", "molly")]))
            .unwrap();
        assert_eq!(out["name"], json!("Molly"));
    }

    #[test]
    fn field_hook_skipped_when_field_absent() {
        let sanitizer = Sanitizer::new(table())
            .on_field("name", |_, _, _| Ok(json!("should not run")))
            .unwrap();
        let out = sanitizer.run(&SanitizeContext::new(), Map::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn data_hooks_run_before_field_hooks() {
        let sanitizer = Sanitizer::new(table())
            .on_data(|_, mut data| {
                data.insert("name".into(), json!("injected"));
                Ok(data)
            })
            .on_field("name", |_, data, field| {
                let s = data.get(field).and_then(Value::as_str).unwrap_or_default();
                Ok(Value::String(format!("{s}!")))
            })
            .unwrap();
        let out = sanitizer.run(&SanitizeContext::new(), Map::new()).unwrap();
        assert_eq!(out["name"], json!("injected!"));
    }

    #[test]
    fn hooks_on_one_field_run_in_registration_order() {
        let sanitizer = Sanitizer::new(table())
            .on_field("name", |_, data, field| {
                let s = data.get(field).and_then(Value::as_str).unwrap_or_default();
                Ok(Value::String(format!("{s}-a")))
            })
            .unwrap()
            .on_field("name", |_, data, field| {
                let s = data.get(field).and_then(Value::as_str).unwrap_or_default();
                Ok(Value::String(format!("{s}-b")))
            })
            .unwrap();
        let out = sanitizer
            .run(&SanitizeContext::new(), payload(&[("name", "x")]))
            .unwrap();
        assert_eq!(out["name"], json!("x-a-b"));
    }

    #[test]
    fn context_reaches_hooks() {
        let sanitizer = Sanitizer::new(table()).on_data(|ctx, mut data| {
            if let Some(user) = ctx.get("user") {
                data.insert("created_by".into(), user.clone());
            }
            Ok(data)
        });
        let ctx = SanitizeContext::new().with("user", json!("alice"));
        let out = sanitizer.run(&ctx, Map::new()).unwrap();
        assert_eq!(out["created_by"], json!("alice"));
    }

    #[test]
    fn unknown_field_registration_is_rejected() {
        let err = Sanitizer::new(table())
            .on_field("nickname", |_, _, _| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(err, CrudError::UnknownField { .. }));
    }
}
