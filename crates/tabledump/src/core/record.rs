//! Runtime record model derived from table definitions.
//!
//! A [`RecordDescriptor`] is the ordered list of fields for one table, each
//! with a resolved [`FieldRepr`]. A [`Record`] holds one [`Value`] per field,
//! positionally. Field order is the column order of the DDL and is what the
//! store's upsert binds its parameters against.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DumpError, Result};

use super::schema::{ColumnDefinition, CreateTableStatement, TypeTag};
use super::value::{ScalarType, Value};

/// Resolved value representation of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRepr {
    /// Underlying scalar kind.
    pub scalar: ScalarType,

    /// Whether the field distinguishes "absent" from the zero value.
    pub optional: bool,
}

impl FieldRepr {
    /// A bare scalar representation.
    pub fn required(scalar: ScalarType) -> Self {
        Self {
            scalar,
            optional: false,
        }
    }

    /// An optional-scalar representation.
    pub fn optional(scalar: ScalarType) -> Self {
        Self {
            scalar,
            optional: true,
        }
    }

    /// Initial value of a field before any input was applied.
    pub fn initial_value(&self) -> Value {
        if self.optional {
            Value::Null(self.scalar)
        } else {
            self.scalar.zero_value()
        }
    }
}

impl fmt::Display for FieldRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "Option<{}>", self.scalar)
        } else {
            write!(f, "{}", self.scalar)
        }
    }
}

/// One field of a record descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name (the column name).
    pub name: String,

    /// Resolved representation.
    pub repr: FieldRepr,
}

/// Ordered field schema for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    fields: Vec<FieldDescriptor>,
}

impl RecordDescriptor {
    /// Create a descriptor from already resolved fields.
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the descriptor has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the field with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// A record with every field in its initial (zero or absent) state.
    pub fn new_record(&self) -> Record {
        Record {
            values: self.fields.iter().map(|f| f.repr.initial_value()).collect(),
        }
    }
}

/// A table with its resolved record descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,

    /// Record descriptor in column order.
    pub descriptor: RecordDescriptor,

    /// Primary key column names.
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    /// Build a table definition from a parsed `CREATE TABLE` statement.
    ///
    /// Fails on the first unsupported column; no partial definition is returned.
    pub fn from_statement(stmt: &CreateTableStatement) -> Result<Self> {
        Ok(Self {
            name: stmt.table_name.clone(),
            descriptor: build_descriptor(&stmt.columns)?,
            primary_key: stmt.primary_key.clone(),
        })
    }

    /// Name of the JSON lines file this table is exported to.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.name)
    }
}

/// One row instance conforming to a [`RecordDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    /// Create a record from positional values.
    ///
    /// The caller is responsible for matching the descriptor's field order.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a field position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Replace the value at a field position.
    pub fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }
}

/// Resolve the representation of one column.
pub fn resolve_field(column: &ColumnDefinition) -> Result<FieldDescriptor> {
    if column.column_type.is_array {
        return Err(DumpError::UnsupportedSchemaFeature {
            column: column.name.clone(),
            feature: format!("array type {}", column.column_type),
        });
    }

    let scalar = match &column.column_type.tag {
        TypeTag::Bool => ScalarType::Bool,
        TypeTag::Int64 => ScalarType::Int64,
        TypeTag::Float64 => ScalarType::Float64,
        TypeTag::String => ScalarType::String,
        TypeTag::Bytes => ScalarType::Bytes,
        TypeTag::Date => ScalarType::Date,
        TypeTag::Timestamp => ScalarType::Timestamp,
        TypeTag::Other(tag) => {
            return Err(DumpError::UnsupportedColumnType {
                column: column.name.clone(),
                tag: tag.clone(),
            })
        }
    };

    let repr = if column.not_null {
        FieldRepr::required(scalar)
    } else {
        FieldRepr::optional(scalar)
    };

    Ok(FieldDescriptor {
        name: column.name.clone(),
        repr,
    })
}

/// Build a record descriptor from a column list, preserving column order.
pub fn build_descriptor(columns: &[ColumnDefinition]) -> Result<RecordDescriptor> {
    let fields = columns
        .iter()
        .map(resolve_field)
        .collect::<Result<Vec<_>>>()?;
    Ok(RecordDescriptor::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnType;

    fn col(name: &str, tag: TypeTag, not_null: bool) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::scalar(tag), not_null)
    }

    #[test]
    fn test_build_preserves_column_order() {
        let columns = vec![
            col("zeta", TypeTag::String, false),
            col("alpha", TypeTag::Int64, true),
            col("mid", TypeTag::Timestamp, false),
            col("beta", TypeTag::Bool, true),
        ];
        let descriptor = build_descriptor(&columns).unwrap();
        let names: Vec<&str> = descriptor.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid", "beta"]);
    }

    #[test]
    fn test_nullability_selects_representation() {
        let descriptor = build_descriptor(&[
            col("id", TypeTag::Int64, true),
            col("name", TypeTag::String, false),
        ])
        .unwrap();
        assert_eq!(descriptor.fields()[0].repr, FieldRepr::required(ScalarType::Int64));
        assert_eq!(descriptor.fields()[1].repr, FieldRepr::optional(ScalarType::String));
    }

    #[test]
    fn test_nullable_bytes_are_optional() {
        let descriptor = build_descriptor(&[col("blob", TypeTag::Bytes, false)]).unwrap();
        assert_eq!(descriptor.fields()[0].repr, FieldRepr::optional(ScalarType::Bytes));
    }

    #[test]
    fn test_array_column_is_rejected() {
        let columns = vec![
            col("id", TypeTag::Int64, true),
            ColumnDefinition::new("tags", ColumnType::array(TypeTag::String), false),
        ];
        let err = build_descriptor(&columns).unwrap_err();
        match err {
            DumpError::UnsupportedSchemaFeature { column, .. } => assert_eq!(column, "tags"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected_with_tag() {
        let columns = vec![col("amount", TypeTag::Other("NUMERIC".into()), true)];
        let err = build_descriptor(&columns).unwrap_err();
        match err {
            DumpError::UnsupportedColumnType { column, tag } => {
                assert_eq!(column, "amount");
                assert_eq!(tag, "NUMERIC");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_new_record_initial_state() {
        let descriptor = build_descriptor(&[
            col("id", TypeTag::Int64, true),
            col("name", TypeTag::String, false),
        ])
        .unwrap();
        let record = descriptor.new_record();
        assert_eq!(
            record.values(),
            &[Value::Int64(0), Value::Null(ScalarType::String)]
        );
    }

    #[test]
    fn test_table_definition_file_name() {
        let stmt = CreateTableStatement {
            table_name: "Users".into(),
            columns: vec![col("id", TypeTag::Int64, true)],
            primary_key: vec!["id".into()],
        };
        let table = TableDefinition::from_statement(&stmt).unwrap();
        assert_eq!(table.file_name(), "Users.json");
        assert_eq!(table.primary_key, vec!["id".to_string()]);
        assert_eq!(table.descriptor.index_of("id"), Some(0));
    }
}
