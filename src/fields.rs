//! Validated sets of column names bound to a table.

use crate::error::CrudError;
use crate::schema::Table;
use std::collections::BTreeSet;

/// An immutable set of column names known to exist on a table. Projection
/// order is decided by the table's column order, not by this set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSet {
    names: BTreeSet<String>,
}

impl FieldSet {
    /// Resolve an optional allow-list against a table. `None` means every
    /// column; any name that is not a column fails.
    pub fn resolve(table: &Table, requested: Option<&[&str]>) -> Result<Self, CrudError> {
        match requested {
            None => Ok(Self::all(table)),
            Some(names) => {
                let mut set = BTreeSet::new();
                for name in names {
                    if !table.has_column(name) {
                        return Err(CrudError::unknown_field(&table.name, name));
                    }
                    set.insert((*name).to_string());
                }
                Ok(FieldSet { names: set })
            }
        }
    }

    pub fn all(table: &Table) -> Self {
        FieldSet {
            names: table.column_names().map(String::from).collect(),
        }
    }

    pub fn empty() -> Self {
        FieldSet::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn intersect(&self, other: &FieldSet) -> FieldSet {
        FieldSet {
            names: self.names.intersection(&other.names).cloned().collect(),
        }
    }

    pub fn is_subset(&self, other: &FieldSet) -> bool {
        self.names.is_subset(&other.names)
    }
}
