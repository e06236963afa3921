//! Row predicates

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::models::stamps::IS_DELETED;
use crate::models::Row;

/// A condition on a single row; missing columns read as null
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    /// `is_deleted` is not `true`
    NotDeleted,
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(column.into(), value.into())
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In(column.into(), values)
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Eq(column, value) => column_value(row, column) == value,
            Self::Ne(column, value) => column_value(row, column) != value,
            Self::In(column, values) => values.contains(column_value(row, column)),
            Self::IsNull(column) => column_value(row, column).is_null(),
            Self::NotDeleted => !matches!(row.get(IS_DELETED), Some(Value::Bool(true))),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(column, value) => write!(f, "{} = {}", column, value),
            Self::Ne(column, value) => write!(f, "{} != {}", column, value),
            Self::In(column, values) => write!(f, "{} IN {}", column, Value::from(values.clone())),
            Self::IsNull(column) => write!(f, "{} IS NULL", column),
            Self::NotDeleted => write!(f, "{} IS NOT TRUE", IS_DELETED),
        }
    }
}

fn column_value<'r>(row: &'r Row, column: &str) -> &'r Value {
    static NULL: Value = Value::Null;
    row.get(column).unwrap_or(&NULL)
}

/// Total order over JSON values for sorting
///
/// null < bool < number < string < array < object; arrays and objects
/// compare by their serialized form.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Order two rows by a column
pub fn compare_rows(a: &Row, b: &Row, column: &str) -> Ordering {
    compare_values(column_value(a, column), column_value(b, column))
}
