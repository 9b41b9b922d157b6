//! Row, filter and value types.

use crate::DbError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A scalar used in filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Integer value.
    Integer(i64),
    /// Real/float value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Boolean value.
    Bool(bool),
}

impl Value {
    /// Check whether a stored JSON value equals this one.
    pub fn matches(&self, json: &Json) -> bool {
        match (self, json) {
            (Value::Null, Json::Null) => true,
            (Value::Integer(i), Json::Number(n)) => n.as_i64() == Some(*i),
            (Value::Real(f), Json::Number(n)) => n.as_f64() == Some(*f),
            (Value::Text(s), Json::String(j)) => s == j,
            (Value::Bool(b), Json::Bool(j)) => b == j,
            _ => false,
        }
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A stored row: a JSON object with an `id` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: Map<String, Json>,
}

impl Row {
    /// Serialize a record into a row.
    pub fn from_record<T: Serialize>(table: &str, record: &T) -> Result<Self, DbError> {
        match serde_json::to_value(record)? {
            Json::Object(columns) if columns.get("id").map_or(false, |v| !v.is_null()) => {
                Ok(Self { columns })
            }
            _ => Err(DbError::MissingId {
                table: table.to_string(),
            }),
        }
    }

    /// The row id, rendered as text.
    pub fn id(&self) -> String {
        self.columns.get("id").map(render).unwrap_or_default()
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Json> {
        self.columns.get(column)
    }

    /// Deserialize the row into a record type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, DbError> {
        Ok(serde_json::from_value(Json::Object(self.columns.clone()))?)
    }
}

/// Render a JSON scalar for ids and error messages.
pub(crate) fn render(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    IsNull(String),
}

/// Conjunction of column conditions, in the style of `.eq()` chains.
///
/// An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// A filter matching all rows.
    pub fn all() -> Self {
        Self::default()
    }

    /// Require `column == value`.
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    /// Require `column != value`.
    pub fn ne(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Ne(column.to_string(), value.into()));
        self
    }

    /// Require the column to be null or absent.
    pub fn is_null(mut self, column: &str) -> Self {
        self.conditions.push(Condition::IsNull(column.to_string()));
        self
    }

    /// Check a row against every condition.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::Eq(col, v) => match row.get(col) {
                Some(json) => v.matches(json),
                None => v.is_null(),
            },
            Condition::Ne(col, v) => match row.get(col) {
                Some(json) => !v.matches(json),
                None => !v.is_null(),
            },
            Condition::IsNull(col) => row.get(col).map_or(true, Json::is_null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Json) -> Row {
        Row::from_record("t", &value).unwrap()
    }

    #[test]
    fn test_row_requires_id() {
        assert!(Row::from_record("t", &json!({ "name": "x" })).is_err());
        assert!(Row::from_record("t", &json!({ "id": null })).is_err());
        assert!(Row::from_record("t", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_filter_eq_and_null() {
        let r = row(json!({ "id": "a", "user_id": "u1", "qty": 3, "option": null }));

        assert!(Filter::all().matches(&r));
        assert!(Filter::all().eq("user_id", "u1").eq("qty", 3).matches(&r));
        assert!(!Filter::all().eq("user_id", "u2").matches(&r));
        assert!(Filter::all().is_null("option").is_null("missing").matches(&r));
        assert!(Filter::all().eq("option", None::<String>).matches(&r));
        assert!(Filter::all().ne("user_id", "u2").matches(&r));
    }

    #[test]
    fn test_value_does_not_coerce_types() {
        assert!(!Value::from("3").matches(&json!(3)));
        assert!(!Value::from(1).matches(&json!(true)));
    }
}
