//! Persisted entity schemas
//!
//! One schema document per entity, stored at `/_schema/<entity>` as JSON.
//! Maps are `BTreeMap`s so serialization is key-sorted and byte-stable:
//! re-persisting an unchanged schema writes identical bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use facet_core::{Error, Result};

use crate::descriptor::IndexDescriptor;

/// Wire-level field type of a schema field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Boolean
    Bool,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// UTF-8 text
    String,
    /// Raw bytes
    Bytes,
    /// Named enum; values resolve through the schema's enum metadata
    Enum,
}

/// One field of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Wire field number
    pub field_number: u32,
    /// Field type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field may be absent
    pub optional: bool,
    /// Whether the field is repeated
    pub is_array: bool,
}

/// A component of the entity's directory path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum DirectoryComponent {
    /// Fixed path element
    Static {
        /// The literal component value
        value: String,
    },
    /// Element supplied per record (e.g. a tenant id)
    Dynamic,
}

/// Named enum values referenced by `FieldType::Enum` fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMetadata {
    /// Enum type name
    pub name: String,
    /// Value name to wire number, key-sorted
    pub values: BTreeMap<String, i32>,
}

/// The persisted schema of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity name; also the document key under `/_schema/`
    pub name: String,
    /// Declared fields
    pub fields: Vec<FieldDescriptor>,
    /// Directory path components for the entity's data subspace
    pub directory_components: Vec<DirectoryComponent>,
    /// Indexes fed by this entity's records
    pub index_descriptors: Vec<IndexDescriptor>,
    /// Enum metadata, keyed by enum type name
    pub enum_metadata: BTreeMap<String, EnumMetadata>,
}

impl EntitySchema {
    /// Create an empty schema for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            directory_components: Vec::new(),
            index_descriptors: Vec::new(),
            enum_metadata: BTreeMap::new(),
        }
    }

    /// Append a field declaration, builder-style
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        optional: bool,
        is_array: bool,
    ) -> Self {
        let field_number = self.fields.len() as u32 + 1;
        self.fields.push(FieldDescriptor {
            name: name.into(),
            field_number,
            field_type,
            optional,
            is_array,
        });
        self
    }

    /// Attach an index descriptor, builder-style
    pub fn with_index(mut self, descriptor: IndexDescriptor) -> Self {
        self.index_descriptors.push(descriptor);
        self
    }

    /// Field descriptor by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Index descriptor by name
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.index_descriptors.iter().find(|d| d.name == name)
    }

    /// Resolve an enum value name to its wire number
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` when the enum or the value is unknown.
    pub fn enum_number(&self, enum_name: &str, value_name: &str) -> Result<i32> {
        let meta = self
            .enum_metadata
            .get(enum_name)
            .ok_or_else(|| Error::SchemaMismatch {
                entity: self.name.clone(),
                detail: format!("unknown enum '{}'", enum_name),
            })?;
        meta.values
            .get(value_name)
            .copied()
            .ok_or_else(|| Error::SchemaMismatch {
                entity: self.name.clone(),
                detail: format!("enum '{}' has no value '{}'", enum_name, value_name),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::IndexKind;
    use crate::expr::KeyExpression;

    fn schema() -> EntitySchema {
        EntitySchema::new("user")
            .with_field("email", FieldType::String, false, false)
            .with_field("age", FieldType::Int64, true, false)
            .with_index(IndexDescriptor::new(
                "by_email",
                IndexKind::Scalar,
                KeyExpression::field("email"),
            ))
    }

    #[test]
    fn json_round_trip_is_byte_stable() {
        let s = schema();
        let first = serde_json::to_vec(&s).unwrap();
        let back: EntitySchema = serde_json::from_slice(&first).unwrap();
        assert_eq!(back, s);
        let second = serde_json::to_vec(&back).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn field_numbers_are_sequential() {
        let s = schema();
        assert_eq!(s.field("email").unwrap().field_number, 1);
        assert_eq!(s.field("age").unwrap().field_number, 2);
    }

    #[test]
    fn enum_resolution() {
        let mut s = schema();
        let mut values = BTreeMap::new();
        values.insert("ACTIVE".to_string(), 0);
        values.insert("DISABLED".to_string(), 1);
        s.enum_metadata.insert(
            "Status".to_string(),
            EnumMetadata {
                name: "Status".to_string(),
                values,
            },
        );
        assert_eq!(s.enum_number("Status", "DISABLED").unwrap(), 1);
        assert!(s.enum_number("Status", "GONE").is_err());
        assert!(s.enum_number("Missing", "ACTIVE").is_err());
    }
}
