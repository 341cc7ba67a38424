//! Order-preserving tuple encoding
//!
//! Composite keys are expressed as tuples of typed components and packed
//! into byte strings whose lexicographic order equals the logical order of
//! the tuples. Range scans over packed keys therefore enumerate natural
//! orderings without any post-sort.
//!
//! ## Encoding layout
//!
//! Each component is a 1-byte type code followed by a code-specific body:
//!
//! - byte strings and text: body with `0x00` escaped as `0x00 0xFF`,
//!   terminated by a bare `0x00`
//! - integers: sign-magnitude variable-length big-endian; the magnitude
//!   byte count is folded into the type code so shorter magnitudes order
//!   correctly against longer ones, negatives are bitwise-complemented
//! - floats: IEEE bits with the sign bit flipped for non-negatives and
//!   all bits flipped for negatives, yielding IEEE total order
//! - nested tuples: recursively encoded, nulls escaped, `0x00` terminated
//! - versionstamps: 10 raw bytes
//!
//! Type codes are disjoint and ordered, so components of different types
//! collate by type first. The layout is part of the persisted contract
//! and must not change.

mod decode;
mod encode;

use std::cmp::Ordering;
use std::fmt;

use crate::error::Result;
use crate::versionstamp::Versionstamp;

/// A single typed tuple component
#[derive(Debug, Clone, PartialEq)]
pub enum TupleValue {
    /// Absent value; orders before everything else
    Null,
    /// Raw byte string
    Bytes(Vec<u8>),
    /// UTF-8 text
    Str(String),
    /// Nested tuple
    Nested(Tuple),
    /// Signed integer
    Int(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Boolean
    Bool(bool),
    /// 10-byte versionstamp
    Versionstamp(Versionstamp),
}

impl TupleValue {
    /// Rank used for cross-type comparison; mirrors type-code order
    fn type_rank(&self) -> u8 {
        match self {
            TupleValue::Null => 0,
            TupleValue::Bytes(_) => 1,
            TupleValue::Str(_) => 2,
            TupleValue::Nested(_) => 3,
            TupleValue::Int(_) => 4,
            TupleValue::Float(_) => 5,
            TupleValue::Double(_) => 6,
            TupleValue::Bool(_) => 7,
            TupleValue::Versionstamp(_) => 8,
        }
    }

    /// Total order matching the packed byte order
    ///
    /// Floats use IEEE total ordering (NaN collates above infinities),
    /// which is exactly what the sign-adjusted encoding realizes.
    pub fn canonical_cmp(&self, other: &TupleValue) -> Ordering {
        use TupleValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Nested(a), Nested(b)) => a.canonical_cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Versionstamp(a), Versionstamp(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

impl fmt::Display for TupleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleValue::Null => write!(f, "null"),
            TupleValue::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            TupleValue::Str(s) => write!(f, "{:?}", s),
            TupleValue::Nested(t) => write!(f, "{}", t),
            TupleValue::Int(v) => write!(f, "{}", v),
            TupleValue::Float(v) => write!(f, "{}", v),
            TupleValue::Double(v) => write!(f, "{}", v),
            TupleValue::Bool(v) => write!(f, "{}", v),
            TupleValue::Versionstamp(vs) => write!(f, "{}", vs),
        }
    }
}

impl From<&str> for TupleValue {
    fn from(v: &str) -> Self {
        TupleValue::Str(v.to_string())
    }
}

impl From<String> for TupleValue {
    fn from(v: String) -> Self {
        TupleValue::Str(v)
    }
}

impl From<i64> for TupleValue {
    fn from(v: i64) -> Self {
        TupleValue::Int(v)
    }
}

impl From<i32> for TupleValue {
    fn from(v: i32) -> Self {
        TupleValue::Int(v as i64)
    }
}

impl From<u32> for TupleValue {
    fn from(v: u32) -> Self {
        TupleValue::Int(v as i64)
    }
}

impl From<bool> for TupleValue {
    fn from(v: bool) -> Self {
        TupleValue::Bool(v)
    }
}

impl From<f32> for TupleValue {
    fn from(v: f32) -> Self {
        TupleValue::Float(v)
    }
}

impl From<f64> for TupleValue {
    fn from(v: f64) -> Self {
        TupleValue::Double(v)
    }
}

impl From<Vec<u8>> for TupleValue {
    fn from(v: Vec<u8>) -> Self {
        TupleValue::Bytes(v)
    }
}

impl From<&[u8]> for TupleValue {
    fn from(v: &[u8]) -> Self {
        TupleValue::Bytes(v.to_vec())
    }
}

impl From<Versionstamp> for TupleValue {
    fn from(v: Versionstamp) -> Self {
        TupleValue::Versionstamp(v)
    }
}

impl From<Tuple> for TupleValue {
    fn from(v: Tuple) -> Self {
        TupleValue::Nested(v)
    }
}

/// An ordered sequence of typed components forming a composite key
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tuple(Vec<TupleValue>);

impl Tuple {
    /// Create an empty tuple
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a tuple from component values
    pub fn from_values(values: Vec<TupleValue>) -> Self {
        Self(values)
    }

    /// Append a component, builder-style
    pub fn with(mut self, value: impl Into<TupleValue>) -> Self {
        self.0.push(value.into());
        self
    }

    /// Append a component in place
    pub fn push(&mut self, value: impl Into<TupleValue>) {
        self.0.push(value.into());
    }

    /// Append all components of another tuple
    pub fn extend(&mut self, other: Tuple) {
        self.0.extend(other.0);
    }

    /// Concatenate two tuples
    pub fn concat(mut self, other: Tuple) -> Tuple {
        self.0.extend(other.0);
        self
    }

    /// Component slice
    pub fn values(&self) -> &[TupleValue] {
        &self.0
    }

    /// Consume into the component vector
    pub fn into_values(self) -> Vec<TupleValue> {
        self.0
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tuple has no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component at `index`, if present
    pub fn get(&self, index: usize) -> Option<&TupleValue> {
        self.0.get(index)
    }

    /// A new tuple holding the first `n` components
    pub fn prefix(&self, n: usize) -> Tuple {
        Tuple(self.0[..n.min(self.0.len())].to_vec())
    }

    /// Pack into the order-preserving byte form
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for value in &self.0 {
            encode::encode_value(&mut out, value, false);
        }
        out
    }

    /// Unpack a byte string produced by [`Tuple::pack`]
    ///
    /// # Errors
    ///
    /// Returns `InvalidStructure` or `TruncatedData` when the bytes do not
    /// form a well-formed packed tuple.
    pub fn unpack(bytes: &[u8]) -> Result<Tuple> {
        let mut values = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let (value, next) = decode::decode_value(bytes, pos, false)?;
            values.push(value);
            pos = next;
        }
        Ok(Tuple(values))
    }

    /// Total order matching the packed byte order
    pub fn canonical_cmp(&self, other: &Tuple) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.canonical_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

impl FromIterator<TupleValue> for Tuple {
    fn from_iter<I: IntoIterator<Item = TupleValue>>(iter: I) -> Self {
        Tuple(iter.into_iter().collect())
    }
}
