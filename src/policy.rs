//! Per-role field access: the readable/writeable/required triple.

use crate::error::CrudError;
use crate::fields::FieldSet;
use crate::schema::Table;
use std::sync::Arc;

/// Readable subset of one table, for read-only access or reference targets.
#[derive(Clone, Debug)]
pub struct Readset {
    table: Arc<Table>,
    fields: FieldSet,
}

impl Readset {
    pub fn new(table: Arc<Table>, fields: Option<&[&str]>) -> Result<Self, CrudError> {
        let fields = FieldSet::resolve(&table, fields)?;
        Ok(Readset { table, fields })
    }

    pub fn all(table: Arc<Table>) -> Self {
        let fields = FieldSet::all(&table);
        Readset { table, fields }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

/// Writeable subset of one table.
#[derive(Clone, Debug)]
pub struct Writeset {
    table: Arc<Table>,
    fields: FieldSet,
}

impl Writeset {
    pub fn new(table: Arc<Table>, fields: Option<&[&str]>) -> Result<Self, CrudError> {
        let fields = FieldSet::resolve(&table, fields)?;
        Ok(Writeset { table, fields })
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

/// Immutable binding of a table to readable/writeable/required field sets.
/// Writeable fields must be readable; required presence is checked by the
/// crud on create, not here.
#[derive(Clone, Debug)]
pub struct Policy {
    table: Arc<Table>,
    readable: FieldSet,
    writeable: FieldSet,
    required: FieldSet,
}

impl Policy {
    /// `readable`/`writeable` default to every column, `required` to none.
    pub fn new(
        table: Arc<Table>,
        required: Option<&[&str]>,
        readable: Option<&[&str]>,
        writeable: Option<&[&str]>,
    ) -> Result<Self, CrudError> {
        let readable = FieldSet::resolve(&table, readable)?;
        let writeable = FieldSet::resolve(&table, writeable)?;
        let required = match required {
            None => FieldSet::empty(),
            some => FieldSet::resolve(&table, some)?,
        };
        check_writeable_readable(&table, &readable, &writeable)?;
        Ok(Policy {
            table,
            readable,
            writeable,
            required,
        })
    }

    /// Everything readable and writeable, nothing required.
    pub fn open(table: Arc<Table>) -> Self {
        let readable = FieldSet::all(&table);
        let writeable = readable.clone();
        Policy {
            table,
            readable,
            writeable,
            required: FieldSet::empty(),
        }
    }

    pub fn from_sets(read: Readset, write: Writeset) -> Result<Self, CrudError> {
        if read.table.name != write.table.name {
            return Err(CrudError::TableMismatch {
                expected: read.table.name.clone(),
                got: write.table.name.clone(),
            });
        }
        check_writeable_readable(&read.table, &read.fields, &write.fields)?;
        Ok(Policy {
            table: read.table,
            readable: read.fields,
            writeable: write.fields,
            required: FieldSet::empty(),
        })
    }

    pub fn read_only(read: Readset) -> Self {
        Policy {
            table: read.table,
            readable: read.fields,
            writeable: FieldSet::empty(),
            required: FieldSet::empty(),
        }
    }

    /// Derive a strictly more restrictive policy: each requested list is
    /// resolved against the table, then intersected with the parent set.
    /// `None` leaves a set unchanged. The writeable result is clamped to the
    /// new readable set so narrowing can never widen access.
    pub fn narrow(
        &self,
        readable: Option<&[&str]>,
        writeable: Option<&[&str]>,
        required: Option<&[&str]>,
    ) -> Result<Policy, CrudError> {
        let readable = self.intersected(&self.readable, readable)?;
        let writeable = self
            .intersected(&self.writeable, writeable)?
            .intersect(&readable);
        let required = self.intersected(&self.required, required)?;
        Ok(Policy {
            table: Arc::clone(&self.table),
            readable,
            writeable,
            required,
        })
    }

    fn intersected(
        &self,
        current: &FieldSet,
        requested: Option<&[&str]>,
    ) -> Result<FieldSet, CrudError> {
        match requested {
            None => Ok(current.clone()),
            some => Ok(current.intersect(&FieldSet::resolve(&self.table, some)?)),
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn readable(&self) -> &FieldSet {
        &self.readable
    }

    pub fn writeable(&self) -> &FieldSet {
        &self.writeable
    }

    pub fn required(&self) -> &FieldSet {
        &self.required
    }
}

fn check_writeable_readable(
    table: &Table,
    readable: &FieldSet,
    writeable: &FieldSet,
) -> Result<(), CrudError> {
    for field in writeable.iter() {
        if !readable.contains(field) {
            return Err(CrudError::WriteableNotReadable {
                table: table.name.clone(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}
