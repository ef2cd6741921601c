//! Joined sub-resources: a named, field-filtered related row attached to
//! fetched results. References affect reads only.

use crate::error::CrudError;
use crate::policy::Readset;

/// Declares that rows of a parent table carry a related row from another
/// table under `name`, joined by `parent.parent_column = target.target_column`.
#[derive(Clone, Debug)]
pub struct Ref {
    name: String,
    readset: Readset,
    parent_column: String,
    target_column: String,
}

impl Ref {
    /// `target_column` must be a column of the readset's table. The parent
    /// column is validated when the reference is attached to a crud, which
    /// knows the parent table.
    pub fn new(
        name: &str,
        readset: Readset,
        parent_column: &str,
        target_column: &str,
    ) -> Result<Self, CrudError> {
        if !readset.table().has_column(target_column) {
            return Err(CrudError::unknown_field(
                &readset.table().name,
                target_column,
            ));
        }
        Ok(Ref {
            name: name.to_string(),
            readset,
            parent_column: parent_column.to_string(),
            target_column: target_column.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn readset(&self) -> &Readset {
        &self.readset
    }

    pub fn parent_column(&self) -> &str {
        &self.parent_column
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{resolve, ColumnConfig, TableConfig};
    use std::sync::Arc;

    fn families() -> Readset {
        Readset::all(Arc::new(
            resolve(&TableConfig {
                name: "family".into(),
                schema: "public".into(),
                primary_key: "id".into(),
                columns: ["id", "surname"]
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
        ))
    }

    #[test]
    fn target_column_must_exist() {
        let err = Ref::new("family", families(), "family_id", "uid").unwrap_err();
        assert!(matches!(err, CrudError::UnknownField { .. }));
    }

    #[test]
    fn join_columns_are_kept() {
        let r = Ref::new("family", families(), "family_id", "id").unwrap();
        assert_eq!(r.name(), "family");
        assert_eq!(r.parent_column(), "family_id");
        assert_eq!(r.target_column(), "id");
    }
}
