//! Canonical index value encoding
//!
//! An index key is a tag byte followed by a payload. Within one tag the byte
//! order of encoded keys matches the natural order of the values, so a bucket
//! cursor walks index entries in value order.
//!
//! | tag    | value                        | payload                          |
//! |--------|------------------------------|----------------------------------|
//! | `0x01` | null                         | none                             |
//! | `0x02` | false                        | none                             |
//! | `0x03` | true                         | none                             |
//! | `0x10` | integral number              | i64, sign bit flipped, big-endian |
//! | `0x11` | non-integral float           | order-preserving IEEE-754 bits   |
//! | `0x20` | string                       | UTF-8 bytes                      |
//!
//! A float with no fractional part that fits in an i64 takes the integer
//! form, so `30` and `30.0` land on the same entry.

use serde_json::{Number, Value};

/// Tag for `null`
pub const TAG_NULL: u8 = 0x01;
/// Tag for `false`
pub const TAG_FALSE: u8 = 0x02;
/// Tag for `true`
pub const TAG_TRUE: u8 = 0x03;
/// Tag for integral numbers
pub const TAG_INT: u8 = 0x10;
/// Tag for non-integral floats
pub const TAG_FLOAT: u8 = 0x11;
/// Tag for strings
pub const TAG_STRING: u8 = 0x20;

const fn ordered_i64_bytes(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1u64 << 63)).to_be_bytes()
}

fn ordered_f64_bytes(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let ordered = if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1u64 << 63)
    };
    ordered.to_be_bytes()
}

fn integral(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    if value.is_finite() && value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64
    {
        Some(value as i64)
    } else {
        None
    }
}

/// Encode an integer
pub fn encode_int(value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(TAG_INT);
    out.extend_from_slice(&ordered_i64_bytes(value));
    out
}

/// Encode a float, using the integer form when it is integral
pub fn encode_float(value: f64) -> Vec<u8> {
    if let Some(i) = integral(value) {
        return encode_int(i);
    }
    let mut out = Vec::with_capacity(9);
    out.push(TAG_FLOAT);
    out.extend_from_slice(&ordered_f64_bytes(value));
    out
}

/// Encode a string
pub fn encode_str(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 1);
    out.push(TAG_STRING);
    out.extend_from_slice(value.as_bytes());
    out
}

fn encode_number(n: &Number) -> Option<Vec<u8>> {
    if let Some(i) = n.as_i64() {
        return Some(encode_int(i));
    }
    n.as_f64().map(encode_float)
}

/// Encode a scalar JSON value; arrays and objects have no index form
pub fn encode_value(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Null => Some(vec![TAG_NULL]),
        Value::Bool(false) => Some(vec![TAG_FALSE]),
        Value::Bool(true) => Some(vec![TAG_TRUE]),
        Value::Number(n) => encode_number(n),
        Value::String(s) => Some(encode_str(s)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Decode an index key back into a JSON value
///
/// Returns `None` for an unknown tag or a malformed payload.
pub fn decode_value(bytes: &[u8]) -> Option<Value> {
    let (&tag, payload) = bytes.split_first()?;
    match tag {
        TAG_NULL if payload.is_empty() => Some(Value::Null),
        TAG_FALSE if payload.is_empty() => Some(Value::Bool(false)),
        TAG_TRUE if payload.is_empty() => Some(Value::Bool(true)),
        TAG_INT => {
            let raw: [u8; 8] = payload.try_into().ok()?;
            let value = (u64::from_be_bytes(raw) ^ (1u64 << 63)) as i64;
            Some(Value::from(value))
        }
        TAG_FLOAT => {
            let raw: [u8; 8] = payload.try_into().ok()?;
            let ordered = u64::from_be_bytes(raw);
            let bits = if ordered >> 63 == 1 {
                ordered & !(1u64 << 63)
            } else {
                !ordered
            };
            Number::from_f64(f64::from_bits(bits)).map(Value::Number)
        }
        TAG_STRING => std::str::from_utf8(payload)
            .ok()
            .map(|s| Value::String(s.to_string())),
        _ => None,
    }
}
