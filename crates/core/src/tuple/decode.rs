//! Packed-form readers for tuple components

use super::encode::{
    BYTES, DOUBLE, ESCAPE, FALSE, FLOAT, INT_ZERO, NESTED, NIL, STRING, TRUE, VERSIONSTAMP,
};
use super::{Tuple, TupleValue};
use crate::error::{Error, Result};
use crate::versionstamp::{Versionstamp, VERSIONSTAMP_LEN};

/// Read the escaped body starting at `pos`, returning the unescaped bytes
/// and the offset just past the terminator.
fn read_escaped(bytes: &[u8], mut pos: usize) -> Result<(Vec<u8>, usize)> {
    let mut body = Vec::new();
    loop {
        match bytes.get(pos) {
            None => {
                return Err(Error::TruncatedData(
                    "unterminated byte string in packed tuple".into(),
                ))
            }
            Some(&NIL) => {
                if bytes.get(pos + 1) == Some(&ESCAPE) {
                    body.push(NIL);
                    pos += 2;
                } else {
                    return Ok((body, pos + 1));
                }
            }
            Some(&b) => {
                body.push(b);
                pos += 1;
            }
        }
    }
}

fn read_fixed<const N: usize>(bytes: &[u8], pos: usize, what: &str) -> Result<[u8; N]> {
    bytes
        .get(pos..pos + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::TruncatedData(format!("truncated {} in packed tuple", what)))
}

fn read_int(bytes: &[u8], pos: usize, code: u8) -> Result<(i64, usize)> {
    let n = (code as i16 - INT_ZERO as i16).unsigned_abs() as usize;
    let body = bytes
        .get(pos..pos + n)
        .ok_or_else(|| Error::TruncatedData("truncated integer in packed tuple".into()))?;
    let mut magnitude = 0u64;
    for &b in body {
        magnitude = (magnitude << 8) | b as u64;
    }
    let value = if code > INT_ZERO {
        if magnitude > i64::MAX as u64 {
            return Err(Error::TypeConversionOverflow {
                value: magnitude.to_string(),
                target: "i64",
            });
        }
        magnitude as i64
    } else {
        let max = if n == 8 { u64::MAX } else { (1u64 << (8 * n)) - 1 };
        let m = max - magnitude;
        if m > i64::MAX as u64 + 1 {
            return Err(Error::TypeConversionOverflow {
                value: format!("-{}", m),
                target: "i64",
            });
        }
        (m as i128).wrapping_neg() as i64
    };
    Ok((value, pos + n))
}

/// Decode one component starting at `pos`
///
/// Nested bodies intercept `NIL` themselves (it doubles as the nested
/// terminator there), so this function only sees bare `NIL` at top level.
pub(super) fn decode_value(
    bytes: &[u8],
    pos: usize,
    _in_nested: bool,
) -> Result<(TupleValue, usize)> {
    let code = *bytes
        .get(pos)
        .ok_or_else(|| Error::TruncatedData("empty component in packed tuple".into()))?;
    let pos = pos + 1;
    match code {
        NIL => Ok((TupleValue::Null, pos)),
        BYTES => {
            let (body, next) = read_escaped(bytes, pos)?;
            Ok((TupleValue::Bytes(body), next))
        }
        STRING => {
            let (body, next) = read_escaped(bytes, pos)?;
            let text = String::from_utf8(body)
                .map_err(|_| Error::InvalidStructure("packed string is not UTF-8".into()))?;
            Ok((TupleValue::Str(text), next))
        }
        NESTED => {
            let mut values = Vec::new();
            let mut cursor = pos;
            loop {
                match bytes.get(cursor) {
                    None => {
                        return Err(Error::TruncatedData(
                            "unterminated nested tuple in packed tuple".into(),
                        ))
                    }
                    Some(&NIL) => {
                        if bytes.get(cursor + 1) == Some(&ESCAPE) {
                            values.push(TupleValue::Null);
                            cursor += 2;
                        } else {
                            return Ok((TupleValue::Nested(Tuple::from_values(values)), cursor + 1));
                        }
                    }
                    Some(_) => {
                        let (value, next) = decode_value(bytes, cursor, true)?;
                        values.push(value);
                        cursor = next;
                    }
                }
            }
        }
        c if (INT_ZERO - 8..=INT_ZERO + 8).contains(&c) => {
            let (value, next) = read_int(bytes, pos, c)?;
            Ok((TupleValue::Int(value), next))
        }
        FLOAT => {
            let raw: [u8; 4] = read_fixed(bytes, pos, "float")?;
            let mut bits = u32::from_be_bytes(raw);
            if bits & (1 << 31) != 0 {
                bits ^= 1 << 31;
            } else {
                bits = !bits;
            }
            Ok((TupleValue::Float(f32::from_bits(bits)), pos + 4))
        }
        DOUBLE => {
            let raw: [u8; 8] = read_fixed(bytes, pos, "double")?;
            let mut bits = u64::from_be_bytes(raw);
            if bits & (1 << 63) != 0 {
                bits ^= 1 << 63;
            } else {
                bits = !bits;
            }
            Ok((TupleValue::Double(f64::from_bits(bits)), pos + 8))
        }
        FALSE => Ok((TupleValue::Bool(false), pos)),
        TRUE => Ok((TupleValue::Bool(true), pos)),
        VERSIONSTAMP => {
            let raw: [u8; VERSIONSTAMP_LEN] = read_fixed(bytes, pos, "versionstamp")?;
            Ok((
                TupleValue::Versionstamp(Versionstamp::from_bytes(&raw)?),
                pos + VERSIONSTAMP_LEN,
            ))
        }
        other => Err(Error::InvalidStructure(format!(
            "unknown tuple type code 0x{:02x}",
            other
        ))),
    }
}
