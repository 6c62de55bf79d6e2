//! SQL-type dispatch and projected values
//!
//! Relationships are declared with a SQL-facing type string (`VARCHAR(64)`,
//! `INTEGER`, `BOOL`, ...). The type only matters to dendb through its
//! [`ColumnKind`], which decides how a field of the serialized object is
//! converted before it is written to a projected column.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

const TEXT_PREFIXES: &[&str] = &["CHAR", "VARCHAR", "TEXT", "ENUM", "SET"];
const FLOAT_PREFIXES: &[&str] = &["FLOAT", "REAL", "DOUBLE", "DECIMAL", "NUMERIC"];
const INTEGER_PREFIXES: &[&str] = &["INT", "SMALLINT", "TINYINT", "MEDIUMINT", "BIGINT"];

/// Storage class of a projected column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Integer,
    Bool,
    Float,
}

impl ColumnKind {
    /// Classify a SQL type by case-insensitive prefix. Unknown types are text.
    pub fn from_sql_type(sql_type: &str) -> Self {
        let upper = sql_type.trim().to_ascii_uppercase();
        let has_prefix = |prefixes: &[&str]| prefixes.iter().any(|p| upper.starts_with(p));

        if has_prefix(TEXT_PREFIXES) {
            ColumnKind::Text
        } else if has_prefix(INTEGER_PREFIXES) {
            ColumnKind::Integer
        } else if upper.starts_with("BOOL") {
            ColumnKind::Bool
        } else if has_prefix(FLOAT_PREFIXES) {
            ColumnKind::Float
        } else {
            // Probably a date or time; stored as its string form
            ColumnKind::Text
        }
    }

    /// Convert one field of a serialized object into a value of this kind.
    ///
    /// `None` means there is nothing to project: the field is null, an
    /// empty string, a nested array or object, or a string that does not
    /// read as a number for a numeric kind.
    pub fn extract(self, field: &Value) -> Option<SqlValue> {
        match self {
            ColumnKind::Text => match field {
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(SqlValue::Text(s.clone())),
                Value::Number(n) => Some(SqlValue::Text(n.to_string())),
                Value::Bool(b) => Some(SqlValue::Text(b.to_string())),
                _ => None,
            },
            ColumnKind::Integer => as_integer(field).map(SqlValue::Integer),
            ColumnKind::Bool => match field {
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(SqlValue::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(SqlValue::Bool(false)),
                other => as_integer(other).map(|i| SqlValue::Bool(i != 0)),
            },
            ColumnKind::Float => as_float(field).map(SqlValue::Float),
        }
    }
}

fn as_integer(field: &Value) -> Option<i64> {
    match field {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().map(|f| f as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn as_float(field: &Value) -> Option<f64> {
    match field {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// A value written to, or read back from, a projected column
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl SqlValue {
    /// Back to the structured form used by serialized objects
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::from(*i),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_type_dispatch() {
        let cases = [
            ("CHAR(8)", ColumnKind::Text),
            ("varchar(255)", ColumnKind::Text),
            ("TEXT", ColumnKind::Text),
            ("ENUM('a','b')", ColumnKind::Text),
            ("SET('x')", ColumnKind::Text),
            ("INTEGER", ColumnKind::Integer),
            ("int", ColumnKind::Integer),
            ("SMALLINT", ColumnKind::Integer),
            ("TINYINT(1)", ColumnKind::Integer),
            ("MEDIUMINT", ColumnKind::Integer),
            ("BIGINT UNSIGNED", ColumnKind::Integer),
            ("BOOL", ColumnKind::Bool),
            ("boolean", ColumnKind::Bool),
            ("FLOAT", ColumnKind::Float),
            ("REAL", ColumnKind::Float),
            ("DOUBLE PRECISION", ColumnKind::Float),
            ("DECIMAL(10,2)", ColumnKind::Float),
            ("NUMERIC(4)", ColumnKind::Float),
            ("DATETIME", ColumnKind::Text),
            ("TINYTEXT", ColumnKind::Text),
            ("", ColumnKind::Text),
        ];

        for (sql_type, expected) in cases {
            assert_eq!(ColumnKind::from_sql_type(sql_type), expected, "{}", sql_type);
        }
    }

    #[test]
    fn test_extract_text() {
        let kind = ColumnKind::Text;
        assert_eq!(kind.extract(&json!("Rex")), Some(SqlValue::Text("Rex".into())));
        assert_eq!(kind.extract(&json!(2012)), Some(SqlValue::Text("2012".into())));
        assert_eq!(kind.extract(&json!(true)), Some(SqlValue::Text("true".into())));
        assert_eq!(kind.extract(&json!("")), None);
        assert_eq!(kind.extract(&Value::Null), None);
        assert_eq!(kind.extract(&json!(["a"])), None);
    }

    #[test]
    fn test_extract_numeric() {
        assert_eq!(ColumnKind::Integer.extract(&json!(7)), Some(SqlValue::Integer(7)));
        assert_eq!(ColumnKind::Integer.extract(&json!(7.9)), Some(SqlValue::Integer(7)));
        assert_eq!(ColumnKind::Integer.extract(&json!(" 42 ")), Some(SqlValue::Integer(42)));
        assert_eq!(ColumnKind::Integer.extract(&json!("many")), None);
        assert_eq!(ColumnKind::Integer.extract(&json!(true)), Some(SqlValue::Integer(1)));

        assert_eq!(ColumnKind::Float.extract(&json!(1.5)), Some(SqlValue::Float(1.5)));
        assert_eq!(ColumnKind::Float.extract(&json!("2.25")), Some(SqlValue::Float(2.25)));
        assert_eq!(ColumnKind::Float.extract(&json!({})), None);
    }

    #[test]
    fn test_extract_bool() {
        assert_eq!(ColumnKind::Bool.extract(&json!(false)), Some(SqlValue::Bool(false)));
        assert_eq!(ColumnKind::Bool.extract(&json!(3)), Some(SqlValue::Bool(true)));
        assert_eq!(ColumnKind::Bool.extract(&json!("TRUE")), Some(SqlValue::Bool(true)));
        assert_eq!(ColumnKind::Bool.extract(&Value::Null), None);
    }

    #[test]
    fn test_to_json() {
        assert_eq!(SqlValue::Text("A".into()).to_json(), json!("A"));
        assert_eq!(SqlValue::Integer(3).to_json(), json!(3));
        assert_eq!(SqlValue::Bool(true).to_json(), json!(true));
        assert_eq!(SqlValue::Float(f64::NAN).to_json(), Value::Null);
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let values = vec![SqlValue::Text("park".into()), SqlValue::Integer(2), SqlValue::Null];
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"["park",2,null]"#);
    }
}
