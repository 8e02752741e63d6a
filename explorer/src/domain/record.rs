//! Query result rows and their per-query schemas.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// One result row: column name to scalar value.
pub type Record = serde_json::Map<String, Value>;

/// The complete result of one query execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub records: Vec<Record>,
}

impl Payload {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Scalar type of a column as it arrives in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    /// Accepts integers as well.
    Float,
    Text,
    Boolean,
    /// RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` or plain dates.
    Timestamp,
}

impl ColumnType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ColumnType::Integer => value.is_i64() || value.is_u64(),
            ColumnType::Float => value.is_number(),
            ColumnType::Text => value.is_string(),
            ColumnType::Boolean => value.is_boolean(),
            ColumnType::Timestamp => value.as_str().is_some_and(is_timestamp),
        }
    }
}

fn is_timestamp(raw: &str) -> bool {
    DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// Expected shape of the rows produced by one query.
///
/// Columns not listed are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    columns: Vec<ColumnSpec>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required, non-null column.
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSpec {
            name: name.into(),
            column_type,
            nullable: false,
        });
        self
    }

    /// Add a column that must be present but may be null.
    pub fn nullable(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSpec {
            name: name.into(),
            column_type,
            nullable: true,
        });
        self
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Check every record against the schema, reporting the first violation.
    pub fn validate(&self, query: &str, records: &[Record]) -> Result<()> {
        for (row, record) in records.iter().enumerate() {
            for spec in &self.columns {
                let violation = match record.get(&spec.name) {
                    None => Some(format!("missing column '{}'", spec.name)),
                    Some(Value::Null) if spec.nullable => None,
                    Some(Value::Null) => Some(format!("column '{}' is null", spec.name)),
                    Some(value) if !spec.column_type.accepts(value) => Some(format!(
                        "column '{}' expected {:?}, got {}",
                        spec.name, spec.column_type, value
                    )),
                    Some(_) => None,
                };

                if let Some(message) = violation {
                    return Err(Error::SchemaViolation {
                        query: query.to_string(),
                        row,
                        message,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn commit_schema() -> RecordSchema {
        RecordSchema::new()
            .column("id", ColumnType::Integer)
            .column("commits", ColumnType::Text)
            .column("date", ColumnType::Timestamp)
    }

    #[test]
    fn test_valid_records_pass() {
        let records = vec![
            record(json!({"id": 1, "commits": "abc", "date": "2022-03-01T10:00:00"})),
            record(json!({"id": 2, "commits": "def", "date": "2022-03-02", "extra": true})),
            record(json!({"id": 3, "commits": "ghi", "date": "2022-03-02T10:00:00+00:00"})),
        ];
        assert!(commit_schema().validate("commits", &records).is_ok());
    }

    #[test]
    fn test_missing_column_reported_with_row() {
        let records = vec![
            record(json!({"id": 1, "commits": "abc", "date": "2022-03-01"})),
            record(json!({"id": 2, "date": "2022-03-01"})),
        ];
        let err = commit_schema().validate("commits", &records).unwrap_err();
        match err {
            Error::SchemaViolation { row, message, .. } => {
                assert_eq!(row, 1);
                assert!(message.contains("commits"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_type_mismatch() {
        let records = vec![record(json!({"id": "one", "commits": "a", "date": "2022-03-01"}))];
        assert!(commit_schema().validate("commits", &records).is_err());

        let records = vec![record(json!({"id": 1, "commits": "a", "date": "yesterday"}))];
        assert!(commit_schema().validate("commits", &records).is_err());
    }

    #[test]
    fn test_nullable_columns() {
        let schema = RecordSchema::new()
            .column("created", ColumnType::Timestamp)
            .nullable("closed", ColumnType::Timestamp);

        let ok = vec![record(json!({"created": "2022-01-01", "closed": null}))];
        assert!(schema.validate("prs", &ok).is_ok());

        let missing = vec![record(json!({"created": "2022-01-01"}))];
        assert!(schema.validate("prs", &missing).is_err());

        let null_required = vec![record(json!({"created": null, "closed": null}))];
        assert!(schema.validate("prs", &null_required).is_err());
    }

    #[test]
    fn test_float_accepts_integers() {
        let schema = RecordSchema::new().column("ratio", ColumnType::Float);
        let records = vec![record(json!({"ratio": 1})), record(json!({"ratio": 0.5}))];
        assert!(schema.validate("ratios", &records).is_ok());
    }
}
