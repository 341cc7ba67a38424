//! Key expressions: from a record to ordered key tuples
//!
//! A key expression is a pure function evaluated against a [`RecordView`].
//! Most expressions yield exactly one tuple; `FanOut` over a repeated
//! field yields one per element, and a `Concat` containing a fan-out
//! yields the cross product (in practice: the fan-out elements, each
//! prefixed by the scalar siblings).

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::collections::BTreeSet;

use facet_core::{Error, Result, Tuple, TupleValue, Versionstamp};

use crate::record::{FieldValue, RecordView};

/// The tuples produced by one evaluation; almost always exactly one
pub type KeyTuples = SmallVec<[Tuple; 1]>;

/// A pure function from a record to one or more ordered key tuples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum KeyExpression {
    /// A single scalar field
    Field {
        /// Field name
        name: String,
    },
    /// Concatenation of sub-expressions in declaration order
    Concat {
        /// Children, evaluated left to right
        children: Vec<KeyExpression>,
    },
    /// One key per element of a repeated field
    FanOut {
        /// Repeated field name
        name: String,
    },
    /// An incomplete versionstamp completed by the store at commit
    Versionstamp,
}

impl KeyExpression {
    /// Convenience constructor for a single field
    pub fn field(name: impl Into<String>) -> Self {
        KeyExpression::Field { name: name.into() }
    }

    /// Convenience constructor for a concatenation of fields
    pub fn fields(names: &[&str]) -> Self {
        KeyExpression::Concat {
            children: names.iter().map(|n| KeyExpression::field(*n)).collect(),
        }
    }

    /// Convenience constructor for a fan-out over a repeated field
    pub fn fan_out(name: impl Into<String>) -> Self {
        KeyExpression::FanOut { name: name.into() }
    }

    /// Number of tuple components a single produced tuple carries
    pub fn column_count(&self) -> usize {
        match self {
            KeyExpression::Field { .. } => 1,
            KeyExpression::FanOut { .. } => 1,
            KeyExpression::Versionstamp => 1,
            KeyExpression::Concat { children } => {
                children.iter().map(KeyExpression::column_count).sum()
            }
        }
    }

    /// The record fields this expression reads
    pub fn touched_fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            KeyExpression::Field { name } | KeyExpression::FanOut { name } => {
                out.insert(name.as_str());
            }
            KeyExpression::Concat { children } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            KeyExpression::Versionstamp => {}
        }
    }

    /// Evaluate against a record, yielding the produced key tuples
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` when a named field is missing, `UnsupportedType`
    /// when a scalar position holds a repeated value or vice versa.
    pub fn evaluate(&self, record: &RecordView) -> Result<KeyTuples> {
        match self {
            KeyExpression::Field { name } => {
                let value = record.require_field(name)?;
                Ok(smallvec![Tuple::new().with(value.to_tuple_value()?)])
            }
            KeyExpression::FanOut { name } => match record.require_field(name)? {
                FieldValue::Array(elements) => {
                    let mut out = KeyTuples::new();
                    for element in elements {
                        out.push(Tuple::new().with(element.to_tuple_value()?));
                    }
                    Ok(out)
                }
                other => Err(Error::UnsupportedType(format!(
                    "fan-out over non-repeated field '{}' ({:?})",
                    name, other
                ))),
            },
            KeyExpression::Versionstamp => Ok(smallvec![
                Tuple::new().with(TupleValue::Versionstamp(Versionstamp::incomplete(0)))
            ]),
            KeyExpression::Concat { children } => {
                let mut acc: KeyTuples = smallvec![Tuple::new()];
                for child in children {
                    let parts = child.evaluate(record)?;
                    let mut next = KeyTuples::new();
                    for base in &acc {
                        for part in &parts {
                            next.push(base.clone().concat(part.clone()));
                        }
                    }
                    acc = next;
                }
                Ok(acc)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RecordView {
        RecordView::new("product", Tuple::new().with("p1"))
            .with_field("category", "tools")
            .with_field("price", 25i64)
            .with_field(
                "tags",
                FieldValue::Array(vec![FieldValue::Str("new".into()), "sale".into()]),
            )
    }

    #[test]
    fn field_yields_one_tuple() {
        let tuples = KeyExpression::field("category").evaluate(&record()).unwrap();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0], Tuple::new().with("tools"));
    }

    #[test]
    fn concat_preserves_declaration_order() {
        let expr = KeyExpression::fields(&["category", "price"]);
        let tuples = expr.evaluate(&record()).unwrap();
        assert_eq!(tuples[0], Tuple::new().with("tools").with(25i64));
        assert_eq!(expr.column_count(), 2);
    }

    #[test]
    fn fan_out_yields_one_tuple_per_element() {
        let expr = KeyExpression::Concat {
            children: vec![KeyExpression::fan_out("tags"), KeyExpression::field("category")],
        };
        let tuples = expr.evaluate(&record()).unwrap();
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[0], Tuple::new().with("new").with("tools"));
        assert_eq!(tuples[1], Tuple::new().with("sale").with("tools"));
    }

    #[test]
    fn touched_fields_collects_all_names() {
        let expr = KeyExpression::Concat {
            children: vec![
                KeyExpression::field("category"),
                KeyExpression::fan_out("tags"),
                KeyExpression::Versionstamp,
            ],
        };
        let touched = expr.touched_fields();
        assert!(touched.contains("category"));
        assert!(touched.contains("tags"));
        assert_eq!(touched.len(), 2);
    }

    #[test]
    fn missing_field_is_schema_mismatch() {
        let err = KeyExpression::field("absent").evaluate(&record()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }
}
