//! Request and result models for bulk operations.

use sea_orm::Value;

/// Parameter type tag of a column, used to synthesize typed NULLs when a row
/// cell is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Text,
    Bytes,
    Uuid,
    TimestampTz,
    Json,
}

impl ParamType {
    /// The typed NULL for this column.
    pub fn null_value(&self) -> Value {
        match self {
            ParamType::Bool => Value::Bool(None),
            ParamType::SmallInt => Value::SmallInt(None),
            ParamType::Int => Value::Int(None),
            ParamType::BigInt => Value::BigInt(None),
            ParamType::Float => Value::Float(None),
            ParamType::Double => Value::Double(None),
            ParamType::Text => Value::String(None),
            ParamType::Bytes => Value::Bytes(None),
            ParamType::Uuid => Value::Uuid(None),
            ParamType::TimestampTz => Value::ChronoDateTimeWithTimeZone(None),
            ParamType::Json => Value::Json(None),
        }
    }
}

/// One table column bound to a parameter slot.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub column: String,
    pub param_type: ParamType,
}

impl ColumnMapping {
    pub fn new(column: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            column: column.into(),
            param_type,
        }
    }
}

/// One row's ordered, nullable cell values. A `None` cell binds the typed
/// NULL of the column at the same position.
#[derive(Debug, Clone, Default)]
pub struct RowValues(pub Vec<Option<Value>>);

impl RowValues {
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self(values)
    }

    /// Build a row where every cell is present.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values.into_iter().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Option<Value>>> for RowValues {
    fn from(values: Vec<Option<Value>>) -> Self {
        Self(values)
    }
}

/// A batch insert into one table.
#[derive(Debug, Clone)]
pub struct BulkInsert {
    pub table: String,
    pub columns: Vec<ColumnMapping>,
    pub rows: Vec<RowValues>,
}

/// A batch insert with a conflict arm: on a key collision the listed columns
/// are overwritten from the incoming row (or the row is skipped when no
/// update columns are given).
#[derive(Debug, Clone)]
pub struct BulkInsertOnConflict {
    pub insert: BulkInsert,
    pub conflict_columns: Vec<String>,
    /// Must be a subset of the insert columns. Empty means DO NOTHING.
    pub update_columns: Vec<String>,
}

/// A batch update keyed by a single column. Key values are scalars by
/// construction; row `i` of `rows` is correlated with `keys[i]`.
#[derive(Debug, Clone)]
pub struct BulkUpdateByIdentityKey {
    pub table: String,
    pub columns: Vec<ColumnMapping>,
    pub rows: Vec<RowValues>,
    pub key_column: ColumnMapping,
    pub keys: Vec<Value>,
}

/// A batch update keyed by two or more columns. `keys[i]` holds row `i`'s
/// key values, one per key column, in key-column order.
#[derive(Debug, Clone)]
pub struct BulkUpdateByCompositeKey {
    pub table: String,
    pub columns: Vec<ColumnMapping>,
    pub rows: Vec<RowValues>,
    pub key_columns: Vec<ColumnMapping>,
    pub keys: Vec<Vec<Value>>,
}

/// A batch delete by a single key column.
#[derive(Debug, Clone)]
pub struct BulkDeleteByIdentityKey {
    pub table: String,
    pub column: String,
    pub ids: Vec<Value>,
}

/// A batch delete by composite key.
#[derive(Debug, Clone)]
pub struct BulkDeleteByCompositeKey {
    pub table: String,
    pub columns: Vec<String>,
    pub keys: Vec<Vec<Value>>,
}

/// One named parameter bound to a generated statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub value: Value,
}

/// Result of statement synthesis: SQL text with named placeholders plus the
/// ordered parameter list. Names are unique; every placeholder in the text
/// refers to exactly one entry of `params`.
#[derive(Debug, Clone)]
pub struct GeneratedStatement {
    pub sql: String,
    pub params: Vec<BoundParam>,
}
