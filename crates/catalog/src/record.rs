//! The kernel's window onto a record
//!
//! Record serialization is an external concern; the kernel only ever sees
//! a [`RecordView`]: the entity name, the primary-key tuple, and the field
//! values reachable through key expressions. Embedders build one from
//! whatever codec they use.

use std::collections::BTreeMap;

use facet_core::{Error, Result, Tuple, TupleValue};

/// A single field value as the kernel sees it
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent / explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer (covers int32 and int64 wire fields)
    Int(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 text
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Repeated field; elements are scalar values
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Convert a scalar field value into a tuple component
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for arrays, which only key-expression fan-out
    /// may consume.
    pub fn to_tuple_value(&self) -> Result<TupleValue> {
        match self {
            FieldValue::Null => Ok(TupleValue::Null),
            FieldValue::Bool(v) => Ok(TupleValue::Bool(*v)),
            FieldValue::Int(v) => Ok(TupleValue::Int(*v)),
            FieldValue::Float(v) => Ok(TupleValue::Float(*v)),
            FieldValue::Double(v) => Ok(TupleValue::Double(*v)),
            FieldValue::Str(v) => Ok(TupleValue::Str(v.clone())),
            FieldValue::Bytes(v) => Ok(TupleValue::Bytes(v.clone())),
            FieldValue::Array(_) => Err(Error::UnsupportedType(
                "repeated field used as a scalar key component".into(),
            )),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// The entity name, primary key and fields of one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView {
    entity: String,
    primary_key: Tuple,
    fields: BTreeMap<String, FieldValue>,
    raw_bytes: Option<Vec<u8>>,
}

impl RecordView {
    /// Create a view with no fields yet
    pub fn new(entity: impl Into<String>, primary_key: Tuple) -> Self {
        Self {
            entity: entity.into(),
            primary_key,
            fields: BTreeMap::new(),
            raw_bytes: None,
        }
    }

    /// Attach a field value, builder-style
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Attach the record's serialized wire bytes
    ///
    /// The kernel never parses these; the version index stores them
    /// verbatim as the historical payload.
    pub fn with_raw_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.raw_bytes = Some(bytes.into());
        self
    }

    /// The record's serialized wire bytes, when the embedder supplied them
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw_bytes.as_deref()
    }

    /// The entity this record belongs to
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The primary-key tuple
    pub fn primary_key(&self) -> &Tuple {
        &self.primary_key
    }

    /// Field value by name, if present
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Field value by name, or `SchemaMismatch` if the record lacks it
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` carries the entity and field name.
    pub fn require_field(&self, name: &str) -> Result<&FieldValue> {
        self.fields.get(name).ok_or_else(|| Error::SchemaMismatch {
            entity: self.entity.clone(),
            detail: format!("record has no field '{}'", name),
        })
    }

    /// Whether `self` and `other` agree on every field in `names`
    pub fn fields_equal(&self, other: &RecordView, names: &[&str]) -> bool {
        names
            .iter()
            .all(|name| self.fields.get(*name) == other.fields.get(*name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_access() {
        let r = RecordView::new("user", Tuple::new().with("u1"))
            .with_field("email", "a@x")
            .with_field("age", 30i64);
        assert_eq!(r.field("email"), Some(&FieldValue::Str("a@x".into())));
        assert!(r.require_field("missing").is_err());
    }

    #[test]
    fn array_is_not_a_scalar_component() {
        let v = FieldValue::Array(vec![FieldValue::Int(1)]);
        assert!(v.to_tuple_value().is_err());
    }

    #[test]
    fn fields_equal_compares_only_named_fields() {
        let a = RecordView::new("user", Tuple::new().with("u1"))
            .with_field("email", "a@x")
            .with_field("age", 30i64);
        let b = RecordView::new("user", Tuple::new().with("u1"))
            .with_field("email", "a@x")
            .with_field("age", 31i64);
        assert!(a.fields_equal(&b, &["email"]));
        assert!(!a.fields_equal(&b, &["email", "age"]));
    }
}
