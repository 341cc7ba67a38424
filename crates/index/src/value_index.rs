//! Scalar, compound and permuted value indexes
//!
//! One entry per record per produced key tuple:
//!
//! ```text
//! <indexSubspace> + pack(f1..fk) + pack(PK)  ->  ""
//! ```
//!
//! Compound indexes concatenate two or more fields in declaration order.
//! Permuted indexes reorder the fields by a permutation before packing;
//! prefix scans on the physical prefix then give equality on the leading
//! permuted fields, an alternate access path over the same columns. The
//! inverse permutation restores declared order when decoding entries.
//!
//! Uniqueness (when declared) is checked before writing: `immediate`
//! fails the write, `track` records the violation and succeeds, `skip`
//! does nothing.

use std::collections::BTreeSet;
use tracing::debug;

use facet_catalog::{IndexDescriptor, IndexKind, KeyExpression, RecordView};
use facet_core::{
    Error, LimitReason, Result, ScanLimits, ScanResult, Subspace, Tuple, UniquenessMode,
};
use facet_kv::{KeyRange, KvTransaction, RangeOptions};

use crate::maintainer::IndexMaintainer;
use crate::unique::{clear_violation, record_violation, ViolationRecord};

/// Maintainer and read path for scalar / compound / permuted indexes
#[derive(Debug, Clone)]
pub struct ValueIndex {
    name: String,
    subspace: Subspace,
    violations: Subspace,
    expression: KeyExpression,
    permutation: Option<Vec<usize>>,
    uniqueness: UniquenessMode,
    column_count: usize,
}

impl ValueIndex {
    /// Build from a scalar/compound/permuted descriptor
    pub fn for_descriptor(descriptor: &IndexDescriptor) -> Self {
        let permutation = match &descriptor.kind {
            IndexKind::Permuted { permutation } => Some(permutation.clone()),
            _ => None,
        };
        Self {
            name: descriptor.name.clone(),
            subspace: descriptor.subspace(),
            violations: descriptor.violations_subspace(),
            expression: descriptor.key_expression.clone(),
            permutation,
            uniqueness: descriptor.uniqueness,
            column_count: descriptor.key_expression.column_count(),
        }
    }

    /// Number of value columns per entry
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Apply the permutation to a declared-order value tuple
    fn to_physical(&self, values: &Tuple) -> Result<Tuple> {
        match &self.permutation {
            None => Ok(values.clone()),
            Some(perm) => {
                if perm.len() != values.len() {
                    return Err(Error::InvalidStructure(format!(
                        "index '{}': permutation length {} does not match {} columns",
                        self.name,
                        perm.len(),
                        values.len()
                    )));
                }
                let mut out = Tuple::new();
                for &i in perm {
                    let component = values.get(i).ok_or_else(|| {
                        Error::InvalidStructure(format!(
                            "index '{}': permutation refers to missing column {}",
                            self.name, i
                        ))
                    })?;
                    out.push(component.clone());
                }
                Ok(out)
            }
        }
    }

    /// Restore declared order from a stored (physical) value tuple
    pub fn to_declared(&self, stored: &Tuple) -> Result<Tuple> {
        match &self.permutation {
            None => Ok(stored.clone()),
            Some(perm) => {
                let mut slots: Vec<Option<facet_core::TupleValue>> = vec![None; perm.len()];
                for (physical, &declared) in perm.iter().enumerate() {
                    let component = stored.get(physical).ok_or_else(|| {
                        Error::InvalidStructure(format!(
                            "index '{}': stored entry is missing column {}",
                            self.name, physical
                        ))
                    })?;
                    if declared >= slots.len() {
                        return Err(Error::InvalidStructure(format!(
                            "index '{}': permutation target {} out of range",
                            self.name, declared
                        )));
                    }
                    slots[declared] = Some(component.clone());
                }
                let mut out = Tuple::new();
                for slot in slots {
                    out.push(slot.ok_or_else(|| {
                        Error::InvalidStructure(format!(
                            "index '{}': permutation is not a bijection",
                            self.name
                        ))
                    })?);
                }
                Ok(out)
            }
        }
    }

    /// Physical entry keys a record produces
    fn entry_keys(&self, record: &RecordView) -> Result<Vec<(Tuple, Vec<u8>)>> {
        let tuples = self.expression.evaluate(record)?;
        let mut out = Vec::with_capacity(tuples.len());
        for values in tuples {
            let physical = self.to_physical(&values)?;
            let key = self
                .subspace
                .pack(&physical.clone().concat(record.primary_key().clone()));
            out.push((physical, key));
        }
        Ok(out)
    }

    /// Check uniqueness of `values` for `record`, per the declared mode
    fn enforce_uniqueness(
        &self,
        tx: &mut dyn KvTransaction,
        record: &RecordView,
        values: &Tuple,
    ) -> Result<()> {
        if self.uniqueness == UniquenessMode::Skip {
            return Ok(());
        }
        let own_pk = record.primary_key().pack();
        let value_subspace = self.subspace.subspace(values);
        let (begin, end) = value_subspace.range();
        let existing = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::limited(2))?;
        for (key, _) in existing {
            let pk = value_subspace.unpack(&key)?;
            if pk.pack() != own_pk {
                match self.uniqueness {
                    UniquenessMode::Immediate => {
                        return Err(Error::UniquenessViolation {
                            index: self.name.clone(),
                            value: values.to_string(),
                            existing_pk: pk.pack(),
                            new_pk: own_pk,
                        });
                    }
                    UniquenessMode::Track => {
                        let detected_at = tx.read_version()?;
                        record_violation(
                            tx,
                            &self.violations,
                            values,
                            record.primary_key(),
                            &ViolationRecord {
                                index_name: self.name.clone(),
                                entity_name: record.entity().to_string(),
                                detected_at,
                            },
                        )?;
                        debug!(
                            target: "facet::index",
                            index = %self.name,
                            value = %values,
                            "uniqueness violation tracked"
                        );
                        return Ok(());
                    }
                    UniquenessMode::Skip => unreachable!(),
                }
            }
        }
        Ok(())
    }

    /// The scan ranges for `prefix`, stepping around index metadata
    ///
    /// The `_state` and `_violations` families share the index subspace
    /// with the entries. First-column string values beginning with an
    /// underscore are therefore reserved: a full scan splits into the
    /// zone before `_`-strings and the zone after them (which also holds
    /// every higher-ordered component type).
    fn scan_ranges(&self, prefix: &Tuple) -> Vec<KeyRange> {
        let scope = self.subspace.subspace(prefix);
        let (begin, end) = scope.range();
        if !prefix.is_empty() {
            return vec![KeyRange::new(begin, end)];
        }
        let mut reserved_begin = self.subspace.prefix().to_vec();
        reserved_begin.extend_from_slice(&[0x02, b'_']);
        let mut reserved_end = self.subspace.prefix().to_vec();
        reserved_end.extend_from_slice(&[0x02, b'_' + 1]);
        vec![
            KeyRange::new(begin, reserved_begin),
            KeyRange::new(reserved_end, end),
        ]
    }

    /// Scan by a physical value prefix, returning primary keys
    ///
    /// For permuted indexes the prefix is in stored (permuted) order.
    ///
    /// # Errors
    ///
    /// `FieldCountMismatch` when more prefix values than columns are
    /// supplied.
    pub fn scan_by_prefix(
        &self,
        tx: &mut dyn KvTransaction,
        prefix: &Tuple,
        limits: &ScanLimits,
    ) -> Result<ScanResult<Tuple>> {
        if prefix.len() > self.column_count {
            return Err(Error::FieldCountMismatch {
                expected: self.column_count,
                actual: prefix.len(),
            });
        }
        let budget = limits.max_results.min(limits.max_nodes);
        let mut pks = Vec::new();
        let mut truncated = false;
        for range in self.scan_ranges(prefix) {
            let remaining = budget - pks.len();
            let options = RangeOptions {
                limit: remaining.checked_add(1).map(Some).unwrap_or(None),
                reverse: false,
                snapshot: false,
            };
            let pairs = tx.get_range(&range, &options)?;
            if pairs.len() > remaining {
                truncated = true;
            }
            for (key, _) in pairs.into_iter().take(remaining) {
                let tuple = self.subspace.unpack(&key)?;
                let pk_components = tuple.values()[self.column_count..].to_vec();
                pks.push(Tuple::from_values(pk_components));
            }
            if truncated {
                break;
            }
        }
        if truncated {
            let reason = if limits.max_results <= limits.max_nodes {
                LimitReason::MaxResultsReached
            } else {
                LimitReason::MaxNodesReached
            };
            Ok(ScanResult::truncated(pks, reason))
        } else {
            Ok(ScanResult::complete(pks))
        }
    }

    /// Scan by an exact physical value, returning primary keys
    ///
    /// # Errors
    ///
    /// `FieldCountMismatch` unless exactly `column_count` values are
    /// supplied.
    pub fn scan_by_exact_match(
        &self,
        tx: &mut dyn KvTransaction,
        values: &Tuple,
        limits: &ScanLimits,
    ) -> Result<ScanResult<Tuple>> {
        if values.len() != self.column_count {
            return Err(Error::FieldCountMismatch {
                expected: self.column_count,
                actual: values.len(),
            });
        }
        self.scan_by_prefix(tx, values, limits)
    }
}

impl IndexMaintainer for ValueIndex {
    fn update(
        &self,
        tx: &mut dyn KvTransaction,
        old: Option<&RecordView>,
        new: Option<&RecordView>,
    ) -> Result<()> {
        if let (Some(old), Some(new)) = (old, new) {
            let touched: Vec<&str> = self.expression.touched_fields().into_iter().collect();
            if old.fields_equal(new, &touched) {
                return Ok(());
            }
        }

        let old_keys: BTreeSet<Vec<u8>> = match old {
            Some(record) => self
                .entry_keys(record)?
                .into_iter()
                .map(|(_, key)| key)
                .collect(),
            None => BTreeSet::new(),
        };
        let new_entries = match new {
            Some(record) => self.entry_keys(record)?,
            None => Vec::new(),
        };
        let new_keys: BTreeSet<Vec<u8>> = new_entries.iter().map(|(_, key)| key.clone()).collect();

        if let Some(record) = new {
            for (values, key) in &new_entries {
                if !old_keys.contains(key) {
                    self.enforce_uniqueness(tx, record, values)?;
                }
            }
        }

        for key in old_keys.difference(&new_keys) {
            tx.clear(key);
        }
        if let (Some(record), UniquenessMode::Track) = (old, self.uniqueness) {
            // Departing values no longer violate anything.
            for (values, key) in self.entry_keys(record)? {
                if !new_keys.contains(&key) {
                    clear_violation(tx, &self.violations, &values, record.primary_key());
                }
            }
        }
        for key in new_keys.difference(&old_keys) {
            tx.set(key, b"");
        }
        Ok(())
    }
}
