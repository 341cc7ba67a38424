//! Query-side routing
//!
//! Aggregation queries name their group fields, the aggregated field and
//! the function; when a maintained index matches all three the read is
//! answered from the index in O(1) reads. Otherwise the query falls back
//! to a streaming in-memory aggregator over a record scan, correct on
//! any data but proportional to table size.

use tracing::debug;

use facet_catalog::{EntitySchema, IndexKind, KeyExpression};
use facet_core::{Error, Result, ScanLimits, ScanResult, Tuple};
use facet_index::{
    AggregateIndex, AggregateKind, ExtremumIndex, ExtremumKind, Score, ValueIndex,
};
use facet_kv::KvTransaction;

use crate::builder::RecordSource;
use crate::kernel::IndexKernel;

/// Fallback scan batch size
const FALLBACK_BATCH: usize = 256;

/// Which aggregate a query computes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// Number of records in the group
    Count,
    /// Sum of the value field
    Sum,
    /// Arithmetic mean of the value field
    Average,
    /// Smallest value in the group
    Min,
    /// Largest value in the group
    Max,
}

/// An aggregate query's answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateValue {
    /// Count result
    Count(i64),
    /// Sum result, in the value field's domain
    Sum(f64),
    /// Average result; `None` for an empty group
    Average(Option<f64>),
    /// Min/max result; `None` for an empty group
    Extremum(Option<f64>),
}

impl IndexKernel {
    /// Answer an aggregate query, routed to an index when one matches
    ///
    /// A maintained index matches when its kind equals `function` and its
    /// key expression is exactly `group_fields` (plus `value_field` for
    /// value-carrying functions) and it is readable. `fallback` supplies
    /// records for the streaming path; pass `None` to require a match.
    ///
    /// # Errors
    ///
    /// `NotFound` when no index matches and no fallback was given.
    #[allow(clippy::too_many_arguments)]
    pub fn aggregate(
        &self,
        tx: &mut dyn KvTransaction,
        schema: &EntitySchema,
        function: AggregateFunction,
        group_fields: &[&str],
        value_field: Option<&str>,
        group: &Tuple,
        fallback: Option<&dyn RecordSource>,
    ) -> Result<AggregateValue> {
        let expected = expected_expression(group_fields, value_field);
        for descriptor in &schema.index_descriptors {
            if descriptor.key_expression != expected {
                continue;
            }
            let matched = matches!(
                (&descriptor.kind, function),
                (IndexKind::Count, AggregateFunction::Count)
                    | (IndexKind::Sum { .. }, AggregateFunction::Sum)
                    | (IndexKind::Average { .. }, AggregateFunction::Average)
                    | (IndexKind::Min { .. }, AggregateFunction::Min)
                    | (IndexKind::Max { .. }, AggregateFunction::Max)
            );
            if !matched {
                continue;
            }
            if self.require_readable(tx, &descriptor.name).is_err() {
                continue;
            }
            debug!(
                target: "facet::query",
                index = %descriptor.name,
                "aggregate routed to index"
            );
            return match (&descriptor.kind, function) {
                (IndexKind::Count, AggregateFunction::Count) => {
                    let index =
                        AggregateIndex::for_descriptor(descriptor, AggregateKind::Count);
                    Ok(AggregateValue::Count(index.count(tx, group)?))
                }
                (IndexKind::Sum { value_type }, AggregateFunction::Sum) => {
                    let index = AggregateIndex::for_descriptor(
                        descriptor,
                        AggregateKind::Sum { tag: *value_type },
                    );
                    Ok(AggregateValue::Sum(index.sum(tx, group)?))
                }
                (IndexKind::Average { value_type }, AggregateFunction::Average) => {
                    let index = AggregateIndex::for_descriptor(
                        descriptor,
                        AggregateKind::Average { tag: *value_type },
                    );
                    Ok(AggregateValue::Average(index.average(tx, group)?))
                }
                (IndexKind::Min { value_type }, AggregateFunction::Min) => {
                    let index = ExtremumIndex::for_descriptor(
                        descriptor,
                        ExtremumKind::Min,
                        *value_type,
                    );
                    Ok(AggregateValue::Extremum(index.extremum(tx, group)?))
                }
                (IndexKind::Max { value_type }, AggregateFunction::Max) => {
                    let index = ExtremumIndex::for_descriptor(
                        descriptor,
                        ExtremumKind::Max,
                        *value_type,
                    );
                    Ok(AggregateValue::Extremum(index.extremum(tx, group)?))
                }
                _ => unreachable!("matched above"),
            };
        }

        let source = fallback.ok_or_else(|| {
            Error::NotFound(format!(
                "no maintained index answers {:?} over {:?}",
                function, group_fields
            ))
        })?;
        debug!(target: "facet::query", "aggregate falling back to record scan");
        fallback_aggregate(tx, source, function, group_fields, value_field, group)
    }

    /// Scan a value index by physical prefix, returning primary keys
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown index, `IndexStateViolation` when it is
    /// not readable, `UnsupportedType` for non-value kinds.
    pub fn scan_index_prefix(
        &self,
        tx: &mut dyn KvTransaction,
        schema: &EntitySchema,
        index_name: &str,
        prefix: &Tuple,
        limits: &ScanLimits,
    ) -> Result<ScanResult<Tuple>> {
        let descriptor = schema.index(index_name).ok_or_else(|| {
            Error::NotFound(format!("no index named '{}'", index_name))
        })?;
        self.require_readable(tx, index_name)?;
        match descriptor.kind {
            IndexKind::Scalar | IndexKind::Compound | IndexKind::Permuted { .. } => {
                ValueIndex::for_descriptor(descriptor).scan_by_prefix(tx, prefix, limits)
            }
            _ => Err(Error::UnsupportedType(format!(
                "index '{}' is a {} index, not a value index",
                index_name,
                descriptor.kind.tag()
            ))),
        }
    }
}

fn expected_expression(group_fields: &[&str], value_field: Option<&str>) -> KeyExpression {
    let mut fields: Vec<&str> = group_fields.to_vec();
    if let Some(value) = value_field {
        fields.push(value);
    }
    KeyExpression::fields(&fields)
}

/// Streaming per-row aggregation over a record scan
fn fallback_aggregate(
    tx: &mut dyn KvTransaction,
    source: &dyn RecordSource,
    function: AggregateFunction,
    group_fields: &[&str],
    value_field: Option<&str>,
    group: &Tuple,
) -> Result<AggregateValue> {
    let mut count = 0i64;
    let mut sum = 0.0f64;
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;
    let mut cursor: Option<Vec<u8>> = None;

    loop {
        let batch = source.scan(tx, cursor.as_deref(), FALLBACK_BATCH)?;
        let done = batch.len() < FALLBACK_BATCH;
        for record in &batch {
            let mut matches = group_fields.len() == group.len();
            for (i, field) in group_fields.iter().enumerate() {
                let value = match record.field(field) {
                    Some(value) => value.to_tuple_value()?,
                    None => {
                        matches = false;
                        break;
                    }
                };
                if group
                    .get(i)
                    .map(|expected| expected.canonical_cmp(&value) != std::cmp::Ordering::Equal)
                    .unwrap_or(true)
                {
                    matches = false;
                    break;
                }
            }
            if !matches {
                continue;
            }
            count += 1;
            if let Some(field) = value_field {
                let value = Score::from_field(record.require_field(field)?)?.as_f64();
                sum += value;
                min = Some(min.map_or(value, |m| m.min(value)));
                max = Some(max.map_or(value, |m| m.max(value)));
            }
        }
        if let Some(record) = batch.last() {
            cursor = Some(record.primary_key().pack());
        }
        if done {
            break;
        }
    }

    Ok(match function {
        AggregateFunction::Count => AggregateValue::Count(count),
        AggregateFunction::Sum => AggregateValue::Sum(sum),
        AggregateFunction::Average => AggregateValue::Average(if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }),
        AggregateFunction::Min => AggregateValue::Extremum(min),
        AggregateFunction::Max => AggregateValue::Extremum(max),
    })
}
