//! Core data models for the file-info cache
//!
//! These types describe what the cache stores: the caller-declared field
//! schema, the scalar values an extractor produces, and the records the
//! query layer hands back.

use std::collections::HashSet;
use std::fmt;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString};

use crate::error::{CacheError, CacheResult};

/// Column names owned by the cache itself
pub const RESERVED_COLUMNS: &[&str] = &["id", "file_id"];

/// Scalar type of an index field
///
/// Displays as the SQLite declared type; parses case-insensitively, so
/// `"integer"` and `"INTEGER"` are equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Blob,
}

impl FieldType {
    /// Check whether a value may be stored in a field of this type
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (FieldType::Integer, Value::Integer(_))
                | (FieldType::Real, Value::Real(_))
                | (FieldType::Real, Value::Integer(_))
                | (FieldType::Text, Value::Text(_))
                | (FieldType::Blob, Value::Blob(_))
        )
    }
}

/// One named, typed index field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Ordered list of index fields, fixed for the lifetime of a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<Field>,
}

impl FieldSchema {
    /// Build a validated schema
    ///
    /// Names must be ASCII identifiers, unique ignoring case (SQLite column
    /// names are case-insensitive), and must not shadow [`RESERVED_COLUMNS`].
    pub fn new<N: Into<String>>(
        fields: impl IntoIterator<Item = (N, FieldType)>,
    ) -> CacheResult<Self> {
        let fields: Vec<Field> = fields
            .into_iter()
            .map(|(name, field_type)| Field {
                name: name.into(),
                field_type,
            })
            .collect();

        if fields.is_empty() {
            return Err(CacheError::InvalidSchema(
                "at least one field is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if !is_identifier(&field.name) {
                return Err(CacheError::InvalidSchema(format!(
                    "'{}' is not a valid field name",
                    field.name
                )));
            }
            let lowered = field.name.to_ascii_lowercase();
            if RESERVED_COLUMNS.contains(&lowered.as_str()) {
                return Err(CacheError::InvalidSchema(format!(
                    "'{}' is reserved by the cache",
                    field.name
                )));
            }
            if !seen.insert(lowered) {
                return Err(CacheError::InvalidSchema(format!(
                    "field '{}' is declared more than once",
                    field.name
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Build a schema from `(name, type name)` pairs such as `("size", "integer")`
    pub fn parse(fields: &[(&str, &str)]) -> CacheResult<Self> {
        let typed = fields
            .iter()
            .map(|(name, ty)| {
                ty.parse::<FieldType>()
                    .map(|t| (name.to_string(), t))
                    .map_err(|_| {
                        CacheError::InvalidSchema(format!(
                            "unknown type '{}' for field '{}'",
                            ty, name
                        ))
                    })
            })
            .collect::<CacheResult<Vec<_>>>()?;
        Self::new(typed)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field by name (case-insensitive)
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Check an extracted row against the schema
    ///
    /// Returns a description of the first problem found.
    pub fn check_row(&self, row: &[Value]) -> Result<(), String> {
        if row.len() != self.fields.len() {
            return Err(format!(
                "expected {} values, got {}",
                self.fields.len(),
                row.len()
            ));
        }
        for (field, value) in self.fields.iter().zip(row) {
            if !field.field_type.accepts(value) {
                return Err(format!(
                    "field '{}' expects {}, got {}",
                    field.name,
                    field.field_type,
                    value.kind()
                ));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A scalar value produced by an extractor or read back from the store
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Coerce for storage in a field of the given type
    pub(crate) fn coerce(self, field_type: FieldType) -> Value {
        match (field_type, self) {
            (FieldType::Real, Value::Integer(i)) => Value::Real(i as f64),
            (_, v) => v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

/// Persisted metadata for one tracked file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Row id; stable for the life of the record but meaningless to callers
    pub id: i64,
    /// Absolute path, unique across the store
    pub path: String,
    /// Modification time in whole seconds since the Unix epoch
    pub last_modified: i64,
    /// Hex-encoded blake3 digest of the file content
    pub content_hash: String,
}

/// One stored index record together with its owning file's path
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// Path of the owning file record
    pub path: String,
    /// Field values in schema order
    pub fields: Vec<(String, Value)>,
}

impl IndexRecord {
    /// Look up a field value by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Field values in schema order, without names
    pub fn values(&self) -> Vec<&Value> {
        self.fields.iter().map(|(_, v)| v).collect()
    }

    /// Render as a flat JSON object: every field plus `"path"`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for IndexRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("path", &self.path)?;
        map.end()
    }
}

/// Statistics about the current cache contents
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of tracked files
    pub total_files: usize,
    /// Number of stored index records
    pub total_records: usize,
    /// Time of the last pass that changed the store (RFC 3339)
    pub last_synced: Option<String>,
}
