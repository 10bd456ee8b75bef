//! Materialized row storage. spec.md §3 describes each connector owning "a parsed
//! rowset (field-count, row-count, rows of typed values)"; modeled here as a tagged
//! [`Value`] enum rather than the driver's own dynamically-typed column representation,
//! per spec.md §9's "manual union values → tagged variant" redesign note (originally
//! written for the hash table, applied here for the same reason).

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Row {
    pub columns: Vec<Value>,
}

impl Row {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.columns.get(index)
    }
}

/// The full materialized result of a query that produced rows.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub field_names: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn field_count(&self) -> usize {
        self.field_names.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
