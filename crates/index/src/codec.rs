//! Numeric encodings shared by the aggregate, extremum and rank kinds
//!
//! Three fixed layouts, all deliberate:
//!
//! - **Little-endian i64 slots** feed the store's commutative `Add`
//!   atomic op. Floats are scaled fixed-point with six decimal places so
//!   addition stays well-defined; integers are exact.
//! - **Order-preserving u64** maps any supported numeric value to an
//!   unsigned integer whose order equals the numeric order. Stored
//!   little-endian it feeds atomic `Min`/`Max` (which compare unsigned
//!   little-endian); stored big-endian inside key bytes it collates.
//! - **Descending score keys** complement the order-preserving form so
//!   ascending key order is descending score order: rank 0 is the first
//!   key of a rank subspace.

use byteorder::{ByteOrder, LittleEndian};

use facet_catalog::{FieldValue, ValueTypeTag};
use facet_core::{Error, Result, TupleValue};

/// Fixed-point scale applied to float values in additive slots
pub const FLOAT_SCALE: f64 = 1_000_000.0;

/// A numeric score feeding a rank or leaderboard index
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    /// Signed integer score
    Int(i64),
    /// Floating-point score
    Double(f64),
}

impl Score {
    /// Extract a score from a record field value
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for non-numeric values.
    pub fn from_field(value: &FieldValue) -> Result<Score> {
        match value {
            FieldValue::Int(v) => Ok(Score::Int(*v)),
            FieldValue::Float(v) => Ok(Score::Double(*v as f64)),
            FieldValue::Double(v) => Ok(Score::Double(*v)),
            other => Err(Error::UnsupportedType(format!(
                "non-numeric score value {:?}",
                other
            ))),
        }
    }

    /// Extract a score from a tuple component
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for non-numeric components.
    pub fn from_tuple_value(value: &TupleValue) -> Result<Score> {
        match value {
            TupleValue::Int(v) => Ok(Score::Int(*v)),
            TupleValue::Float(v) => Ok(Score::Double(*v as f64)),
            TupleValue::Double(v) => Ok(Score::Double(*v)),
            other => Err(Error::UnsupportedType(format!(
                "non-numeric score component {}",
                other
            ))),
        }
    }

    /// The score as a float, for display and statistics
    pub fn as_f64(&self) -> f64 {
        match self {
            Score::Int(v) => *v as f64,
            Score::Double(v) => *v,
        }
    }

    /// Pack into the 9-byte descending key form: a complemented type tag
    /// followed by the complemented order-preserving payload
    pub fn to_descending_bytes(&self) -> [u8; 9] {
        let (tag, ordered) = match self {
            Score::Int(v) => (0x01u8, ordered_from_i64(*v)),
            Score::Double(v) => (0x02u8, ordered_from_f64(*v)),
        };
        let mut out = [0u8; 9];
        out[0] = !tag;
        out[1..].copy_from_slice(&(!ordered).to_be_bytes());
        out
    }

    /// Reverse of [`Score::to_descending_bytes`]
    ///
    /// # Errors
    ///
    /// `InvalidStructure` on a malformed payload.
    pub fn from_descending_bytes(bytes: &[u8]) -> Result<Score> {
        if bytes.len() != 9 {
            return Err(Error::InvalidStructure(format!(
                "score key must be 9 bytes, got {}",
                bytes.len()
            )));
        }
        let ordered = !u64::from_be_bytes(bytes[1..].try_into().unwrap());
        match !bytes[0] {
            0x01 => Ok(Score::Int(i64_from_ordered(ordered))),
            0x02 => Ok(Score::Double(f64_from_ordered(ordered))),
            tag => Err(Error::InvalidStructure(format!(
                "unknown score tag 0x{:02x}",
                tag
            ))),
        }
    }
}

/// Map an i64 to an order-preserving u64
pub fn ordered_from_i64(v: i64) -> u64 {
    (v as u64) ^ (1 << 63)
}

/// Reverse of [`ordered_from_i64`]
pub fn i64_from_ordered(v: u64) -> i64 {
    (v ^ (1 << 63)) as i64
}

/// Map an f64 to an order-preserving u64 (IEEE total order)
pub fn ordered_from_f64(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}

/// Reverse of [`ordered_from_f64`]
pub fn f64_from_ordered(v: u64) -> f64 {
    if v & (1 << 63) != 0 {
        f64::from_bits(v ^ (1 << 63))
    } else {
        f64::from_bits(!v)
    }
}

/// Encode a field value as the additive-slot operand for its declared type
///
/// Integers are exact; floats are scaled fixed-point. The result is an
/// 8-byte little-endian two's-complement integer suitable for atomic
/// `Add` (negate for removal).
///
/// # Errors
///
/// `SchemaMismatch`-adjacent failures surface as `UnsupportedType` or
/// `TypeConversionOverflow`.
pub fn additive_operand(tag: ValueTypeTag, value: &FieldValue) -> Result<i64> {
    match (tag, value) {
        (ValueTypeTag::I32, FieldValue::Int(v)) => {
            i32::try_from(*v)
                .map(|v| v as i64)
                .map_err(|_| Error::TypeConversionOverflow {
                    value: v.to_string(),
                    target: "i32",
                })
        }
        (ValueTypeTag::I64, FieldValue::Int(v)) => Ok(*v),
        (ValueTypeTag::F32, _) | (ValueTypeTag::F64, _) => {
            let float = numeric_as_f64(value)?;
            let scaled = float * FLOAT_SCALE;
            if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
                return Err(Error::TypeConversionOverflow {
                    value: float.to_string(),
                    target: "scaled fixed-point i64",
                });
            }
            Ok(scaled.round() as i64)
        }
        (tag, other) => Err(Error::UnsupportedType(format!(
            "value {:?} does not fit declared type {:?}",
            other, tag
        ))),
    }
}

/// Decode an additive slot back to a float in the declared type's domain
pub fn decode_additive_slot(tag: ValueTypeTag, raw: &[u8]) -> f64 {
    let v = read_i64_le(raw);
    if tag.is_float() {
        v as f64 / FLOAT_SCALE
    } else {
        v as f64
    }
}

/// Encode a field value as the order-preserving extremum operand
///
/// # Errors
///
/// `UnsupportedType` for non-numeric values.
pub fn extremum_operand(tag: ValueTypeTag, value: &FieldValue) -> Result<u64> {
    match tag {
        ValueTypeTag::I32 | ValueTypeTag::I64 => match value {
            FieldValue::Int(v) => Ok(ordered_from_i64(*v)),
            other => Err(Error::UnsupportedType(format!(
                "value {:?} does not fit declared type {:?}",
                other, tag
            ))),
        },
        ValueTypeTag::F32 | ValueTypeTag::F64 => Ok(ordered_from_f64(numeric_as_f64(value)?)),
    }
}

/// Decode an extremum slot back to the declared type's domain
pub fn decode_extremum(tag: ValueTypeTag, ordered: u64) -> f64 {
    if tag.is_float() {
        f64_from_ordered(ordered)
    } else {
        i64_from_ordered(ordered) as f64
    }
}

/// Read an 8-byte little-endian i64, zero-extending short slots
pub fn read_i64_le(raw: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = raw.len().min(8);
    buf[..n].copy_from_slice(&raw[..n]);
    LittleEndian::read_i64(&buf)
}

/// [`additive_operand`] over a tuple component
///
/// # Errors
///
/// `UnsupportedType` for non-numeric components.
pub fn additive_operand_component(tag: ValueTypeTag, value: &TupleValue) -> Result<i64> {
    additive_operand(tag, &component_to_field(value)?)
}

/// [`extremum_operand`] over a tuple component
///
/// # Errors
///
/// `UnsupportedType` for non-numeric components.
pub fn extremum_operand_component(tag: ValueTypeTag, value: &TupleValue) -> Result<u64> {
    extremum_operand(tag, &component_to_field(value)?)
}

fn component_to_field(value: &TupleValue) -> Result<FieldValue> {
    match value {
        TupleValue::Int(v) => Ok(FieldValue::Int(*v)),
        TupleValue::Float(v) => Ok(FieldValue::Float(*v)),
        TupleValue::Double(v) => Ok(FieldValue::Double(*v)),
        other => Err(Error::UnsupportedType(format!(
            "non-numeric aggregate component {}",
            other
        ))),
    }
}

fn numeric_as_f64(value: &FieldValue) -> Result<f64> {
    match value {
        FieldValue::Int(v) => Ok(*v as f64),
        FieldValue::Float(v) => Ok(*v as f64),
        FieldValue::Double(v) => Ok(*v),
        other => Err(Error::UnsupportedType(format!(
            "non-numeric value {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_i64_preserves_order() {
        let values = [i64::MIN, -7, -1, 0, 1, 42, i64::MAX];
        for pair in values.windows(2) {
            assert!(ordered_from_i64(pair[0]) < ordered_from_i64(pair[1]));
        }
        for v in values {
            assert_eq!(i64_from_ordered(ordered_from_i64(v)), v);
        }
    }

    #[test]
    fn ordered_f64_preserves_order() {
        let values = [f64::NEG_INFINITY, -2.5, -0.0, 0.0, 1.0e-9, 3.5, f64::INFINITY];
        for pair in values.windows(2) {
            assert!(ordered_from_f64(pair[0]) <= ordered_from_f64(pair[1]));
        }
        for v in values {
            assert_eq!(f64_from_ordered(ordered_from_f64(v)), v);
        }
    }

    #[test]
    fn descending_score_keys_invert_order() {
        let low = Score::Int(10).to_descending_bytes();
        let high = Score::Int(90).to_descending_bytes();
        assert!(high < low, "higher scores must collate first");
        let s = Score::from_descending_bytes(&high).unwrap();
        assert_eq!(s, Score::Int(90));
        let f = Score::Double(1.5).to_descending_bytes();
        assert_eq!(
            Score::from_descending_bytes(&f).unwrap(),
            Score::Double(1.5)
        );
    }

    #[test]
    fn additive_operand_scales_floats() {
        let tag = ValueTypeTag::F64;
        let v = additive_operand(tag, &FieldValue::Double(1.5)).unwrap();
        assert_eq!(v, 1_500_000);
        assert_eq!(decode_additive_slot(tag, &v.to_le_bytes()), 1.5);
    }

    #[test]
    fn additive_operand_rejects_overflow() {
        assert!(additive_operand(ValueTypeTag::I32, &FieldValue::Int(i64::MAX)).is_err());
        assert!(additive_operand(ValueTypeTag::F64, &FieldValue::Double(f64::MAX)).is_err());
    }

    #[test]
    fn extremum_round_trips() {
        let tag = ValueTypeTag::I64;
        let ordered = extremum_operand(tag, &FieldValue::Int(-5)).unwrap();
        assert_eq!(decode_extremum(tag, ordered), -5.0);
        let tag = ValueTypeTag::F64;
        let ordered = extremum_operand(tag, &FieldValue::Double(2.25)).unwrap();
        assert_eq!(decode_extremum(tag, ordered), 2.25);
    }
}
