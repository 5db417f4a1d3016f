//! Canonical, order-preserving key encoding for [`FieldValue`]s.

use crate::types::FieldValue;

/// Encodes a single field value as a tag byte followed by a canonical,
/// byte-wise-ordered payload.
#[must_use]
pub fn encode(value: &FieldValue) -> Vec<u8> {
    let mut out = vec![value.tag()];
    match value {
        FieldValue::Null => {}
        FieldValue::Bool(b) => out.push(u8::from(*b)),
        FieldValue::I64(i) => out.extend_from_slice(&bias_i64(*i).to_be_bytes()),
        FieldValue::F64(f) => out.extend_from_slice(&order_preserving_f64_bits(f.0).to_be_bytes()),
        FieldValue::Str(s) => out.extend_from_slice(s.as_bytes()),
        FieldValue::Bytes(b) => out.extend_from_slice(b),
        FieldValue::Timestamp(dt) => {
            out.extend_from_slice(&bias_i64(dt.timestamp_millis()).to_be_bytes());
        }
        FieldValue::Map(_) | FieldValue::List(_) => {
            // Composite structural values aren't directly indexable; encode nothing
            // beyond the tag so they still sort together and deterministically.
        }
    }
    out
}

/// Encodes a composite (multi-column) key as length-prefixed components in order.
#[must_use]
pub fn encode_composite(values: &[FieldValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        let enc = encode(v);
        out.extend_from_slice(&(enc.len() as u32).to_be_bytes());
        out.extend_from_slice(&enc);
    }
    out
}

/// Computes the exclusive upper bound for a prefix scan: increments the last byte,
/// carrying through `0xFF -> 0x00`. Returns `None` if the prefix is all `0xFF`
/// (meaning there is no finite upper bound; callers should scan to EOF instead).
#[must_use]
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    for byte in out.iter_mut().rev() {
        if *byte == 0xFF {
            *byte = 0x00;
        } else {
            *byte += 1;
            return Some(out);
        }
    }
    None
}

/// Biases a signed integer into an unsigned range so big-endian byte order
/// matches numeric order.
fn bias_i64(v: i64) -> u64 {
    (v as i128 - i64::MIN as i128) as u64
}

/// Maps an f64's bit pattern into a big-endian-orderable u64, handling sign bit
/// and NaN/Inf per IEEE-754 total ordering conventions.
fn order_preserving_f64_bits(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}
