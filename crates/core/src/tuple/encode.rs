//! Packed-form writers for tuple components
//!
//! Type codes are disjoint and ordered so that components of different
//! types collate by code. Integer codes fold the magnitude byte count in
//! (`0x14 - n` for negative n-byte magnitudes through `0x14 + n` for
//! positive), which keeps shorter magnitudes ordered against longer ones
//! without padding.

use super::TupleValue;

pub(super) const NIL: u8 = 0x00;
pub(super) const BYTES: u8 = 0x01;
pub(super) const STRING: u8 = 0x02;
pub(super) const NESTED: u8 = 0x05;
pub(super) const INT_ZERO: u8 = 0x14;
pub(super) const FLOAT: u8 = 0x20;
pub(super) const DOUBLE: u8 = 0x21;
pub(super) const FALSE: u8 = 0x26;
pub(super) const TRUE: u8 = 0x27;
pub(super) const VERSIONSTAMP: u8 = 0x33;

pub(super) const ESCAPE: u8 = 0xFF;

/// Minimal big-endian byte count for a non-zero magnitude
fn magnitude_len(m: u64) -> usize {
    ((64 - m.leading_zeros() as usize) + 7) / 8
}

fn write_escaped(out: &mut Vec<u8>, body: &[u8]) {
    for &byte in body {
        out.push(byte);
        if byte == NIL {
            out.push(ESCAPE);
        }
    }
    out.push(NIL);
}

fn write_int(out: &mut Vec<u8>, v: i64) {
    if v == 0 {
        out.push(INT_ZERO);
        return;
    }
    if v > 0 {
        let n = magnitude_len(v as u64);
        out.push(INT_ZERO + n as u8);
        out.extend_from_slice(&v.to_be_bytes()[8 - n..]);
    } else {
        // Negative magnitudes are stored complemented so that more
        // negative values order first.
        let m = v.unsigned_abs();
        let n = magnitude_len(m);
        let max = if n == 8 { u64::MAX } else { (1u64 << (8 * n)) - 1 };
        out.push(INT_ZERO - n as u8);
        out.extend_from_slice(&(max - m).to_be_bytes()[8 - n..]);
    }
}

fn write_f32(out: &mut Vec<u8>, v: f32) {
    let mut bits = v.to_bits();
    if bits & (1 << 31) != 0 {
        bits = !bits;
    } else {
        bits ^= 1 << 31;
    }
    out.extend_from_slice(&bits.to_be_bytes());
}

fn write_f64(out: &mut Vec<u8>, v: f64) {
    let mut bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        bits = !bits;
    } else {
        bits ^= 1 << 63;
    }
    out.extend_from_slice(&bits.to_be_bytes());
}

/// Append one component in packed form
///
/// `in_nested` selects the escaped representation of `Null`, which inside
/// a nested tuple must not collide with the nested terminator.
pub(super) fn encode_value(out: &mut Vec<u8>, value: &TupleValue, in_nested: bool) {
    match value {
        TupleValue::Null => {
            out.push(NIL);
            if in_nested {
                out.push(ESCAPE);
            }
        }
        TupleValue::Bytes(b) => {
            out.push(BYTES);
            write_escaped(out, b);
        }
        TupleValue::Str(s) => {
            out.push(STRING);
            write_escaped(out, s.as_bytes());
        }
        TupleValue::Nested(t) => {
            out.push(NESTED);
            for inner in t.values() {
                encode_value(out, inner, true);
            }
            out.push(NIL);
        }
        TupleValue::Int(v) => write_int(out, *v),
        TupleValue::Float(v) => {
            out.push(FLOAT);
            write_f32(out, *v);
        }
        TupleValue::Double(v) => {
            out.push(DOUBLE);
            write_f64(out, *v);
        }
        TupleValue::Bool(v) => out.push(if *v { TRUE } else { FALSE }),
        TupleValue::Versionstamp(vs) => {
            out.push(VERSIONSTAMP);
            out.extend_from_slice(vs.as_bytes());
        }
    }
}
