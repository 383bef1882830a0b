use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Errors raised while validating client-side data before it is sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{0} is not a accepted type!")]
    UnacceptedType(String),
}

/// ColumnType is the closed set of column tags the service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Int,
    Real,
    Null,
}

impl ColumnType {
    pub const ACCEPTED: [ColumnType; 4] = [
        ColumnType::Text,
        ColumnType::Int,
        ColumnType::Real,
        ColumnType::Null,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Int => "INT",
            ColumnType::Real => "REAL",
            ColumnType::Null => "NULL",
        }
    }

    /// Whether a JSON value may be stored in a column of this type
    pub fn admits(&self, value: &Value) -> bool {
        match self {
            ColumnType::Text => value.is_string() || value.is_null(),
            ColumnType::Int => value.is_i64() || value.is_u64() || value.is_null(),
            ColumnType::Real => value.is_number() || value.is_null(),
            ColumnType::Null => value.is_null(),
        }
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    /// Tags are matched case-insensitively; rejected tags are reported upper-cased.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_uppercase();
        match tag.as_str() {
            "TEXT" => Ok(ColumnType::Text),
            "INT" => Ok(ColumnType::Int),
            "REAL" => Ok(ColumnType::Real),
            "NULL" => Ok(ColumnType::Null),
            _ => Err(SchemaError::UnacceptedType(tag)),
        }
    }
}

impl AsRef<str> for ColumnType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TableSchema maps column names to their types.
///
/// Columns are kept ordered by name, which is also the order in which the
/// service reports row values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema(BTreeMap<String, ColumnType>);

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column addition
    pub fn with(mut self, column: impl Into<String>, column_type: ColumnType) -> Self {
        self.0.insert(column.into(), column_type);
        self
    }

    /// Build a schema from raw type tags, rejecting the first unknown tag
    pub fn from_tags<I, K, V>(columns: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut schema = Self::new();
        for (column, tag) in columns {
            let column_type = tag.as_ref().parse::<ColumnType>()?;
            schema.0.insert(column.into(), column_type);
        }
        Ok(schema)
    }

    pub fn get(&self, column: &str) -> Option<ColumnType> {
        self.0.get(column).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.0.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a TableSchema {
    type Item = (&'a String, &'a ColumnType);
    type IntoIter = std::collections::btree_map::Iter<'a, String, ColumnType>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Row maps column names to values.
///
/// Used both as an insert payload and as equality filter criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style value assignment
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// Values of one selected row, in column order
pub type RowValues = Vec<Value>;

/// Envelope wraps every response body under `detail`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub detail: T,
}

impl<T> Envelope<T> {
    pub fn new(detail: T) -> Self {
        Self { detail }
    }
}

/// MeDetail is the payload of the identity endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeDetail {
    pub data: MeData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeData {
    #[serde(rename = "Databases", default)]
    pub databases: Vec<String>,
    #[serde(rename = "Admin", default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<bool>,
}

/// RowsDetail is the payload of a select
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowsDetail {
    #[serde(default)]
    pub rows: Vec<RowValues>,
}

/// TablesDetail is the payload of a table listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablesDetail {
    #[serde(default)]
    pub tables: Vec<String>,
}

/// KeyDetail is the payload returned when a key is generated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDetail {
    pub data: KeyData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyData {
    pub key: String,
}

/// MessageDetail carries a human-readable status or error message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDetail {
    pub message: String,
}

impl MessageDetail {
    pub fn envelope(message: impl Into<String>) -> Envelope<Self> {
        Envelope::new(Self {
            message: message.into(),
        })
    }
}

/// Extract the server message from an error body.
///
/// The service reports errors either as `{"detail": {"message": "..."}}` or
/// as `{"detail": "..."}`.
pub fn error_message(body: &Value) -> Option<&str> {
    let detail = body.get("detail")?;
    match detail {
        Value::String(message) => Some(message.as_str()),
        Value::Object(fields) => fields.get("message").and_then(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_type_parse_is_case_insensitive() {
        assert_eq!("text".parse::<ColumnType>().unwrap(), ColumnType::Text);
        assert_eq!("Int".parse::<ColumnType>().unwrap(), ColumnType::Int);
        assert_eq!("REAL".parse::<ColumnType>().unwrap(), ColumnType::Real);
        assert_eq!("null".parse::<ColumnType>().unwrap(), ColumnType::Null);
    }

    #[test]
    fn test_column_type_rejects_unknown_tag_uppercased() {
        let err = "blob".parse::<ColumnType>().unwrap_err();
        assert_eq!(err, SchemaError::UnacceptedType("BLOB".to_string()));
        assert_eq!(err.to_string(), "BLOB is not a accepted type!");
    }

    #[test]
    fn test_schema_from_tags() {
        let schema = TableSchema::from_tags([("c1", "TEXT"), ("c2", "int")]).unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("c2"), Some(ColumnType::Int));

        let err = TableSchema::from_tags([("c1", "TEXT"), ("c2", "BAD")]).unwrap_err();
        assert_eq!(err, SchemaError::UnacceptedType("BAD".to_string()));
    }

    #[test]
    fn test_schema_serializes_as_tag_map() {
        let schema = TableSchema::new()
            .with("name", ColumnType::Text)
            .with("age", ColumnType::Int);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value, json!({"age": "INT", "name": "TEXT"}));
    }

    #[test]
    fn test_column_type_admits() {
        assert!(ColumnType::Text.admits(&json!("x")));
        assert!(!ColumnType::Text.admits(&json!(1)));
        assert!(ColumnType::Int.admits(&json!(3)));
        assert!(!ColumnType::Int.admits(&json!(3.5)));
        assert!(ColumnType::Real.admits(&json!(3)));
        assert!(ColumnType::Null.admits(&Value::Null));
    }

    #[test]
    fn test_row_collects_and_serializes() {
        let row: Row = [("row1", "text 1"), ("row2", "text 2")].into_iter().collect();
        assert_eq!(row.get("row1"), Some(&json!("text 1")));
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"row1": "text 1", "row2": "text 2"})
        );
    }

    #[test]
    fn test_me_envelope_parses() {
        let body = json!({"detail": {"data": {"Databases": ["main", "logs"]}}});
        let me: Envelope<MeDetail> = serde_json::from_value(body).unwrap();
        assert_eq!(me.detail.data.databases, vec!["main", "logs"]);
        assert_eq!(me.detail.data.admin, None);
    }

    #[test]
    fn test_error_message_shapes() {
        let nested = json!({"detail": {"message": "table is required"}});
        assert_eq!(error_message(&nested), Some("table is required"));

        let flat = json!({"detail": "colour is not a column"});
        assert_eq!(error_message(&flat), Some("colour is not a column"));

        assert_eq!(error_message(&json!({"detail": 3})), None);
        assert_eq!(error_message(&json!({})), None);
    }
}
