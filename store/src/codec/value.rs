//! Order-preserving byte encodings for primitive values.
//!
//! Each encoding is built so that the natural order of the source type is
//! preserved under byte-wise (lexicographic) comparison of the encoded
//! output, which lets index 1 (attribute+value+content-hash) support
//! range scans directly against the underlying ordered KV store.

use crate::error::{CResult, Error};
use std::cmp::Ordering;

/// Closed sum type standing in for the dynamic per-type dispatch a dynamically
/// typed source would use. `Composite` covers anything that isn't a plain
/// scalar: it's hashed via [`crate::codec::identity::hash_canonical`] rather
/// than encoded byte-for-byte, so it sorts by hash, not by value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Long(i64),
    Double(f64),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Str(String),
    Bytes(Vec<u8>),
    Composite(serde_json::Value),
}

/// Strings are truncated to this many bytes before encoding, per the wire
/// format in the key layout table.
pub const MAX_STRING_BYTES: usize = 128;

/// Fixed-width zero digest used to encode [`Value::Null`], matching the
/// width of a SHA-1 digest so all value encodings that aren't `Long`/`Double`
/// fixed-width types still compose predictably into composite keys.
pub const NULL_DIGEST: [u8; 20] = [0u8; 20];

impl Value {
    pub fn encode(&self) -> CResult<Vec<u8>> {
        Ok(match self {
            Value::Null => NULL_DIGEST.to_vec(),
            Value::Long(n) => encode_i64(*n).to_vec(),
            Value::Double(d) => encode_f64(*d).to_vec(),
            Value::Date(ms) => encode_i64(*ms).to_vec(),
            Value::Str(s) => encode_str(s),
            Value::Bytes(bytes) => {
                if bytes.is_empty() {
                    NULL_DIGEST.to_vec()
                } else {
                    crate::codec::identity::sha1(bytes).to_vec()
                }
            }
            Value::Composite(json) => crate::codec::identity::hash_canonical(json)?.to_vec(),
        })
    }
}

/// big-endian, XOR with the sign bit, so negative numbers sort before
/// positive ones and within each half the order is unchanged.
pub fn encode_i64(n: i64) -> [u8; 8] {
    let flipped = (n as u64) ^ (1u64 << 63);
    flipped.to_be_bytes()
}

pub fn decode_i64(bytes: &[u8]) -> CResult<i64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::CorruptIndex(format!("expected 8 bytes for i64, got {}", bytes.len())))?;
    let flipped = u64::from_be_bytes(arr);
    Ok((flipped ^ (1u64 << 63)) as i64)
}

/// IEEE-754 double, ordered for comparison as unsigned big-endian bytes:
/// negative numbers have every bit inverted (so larger magnitude sorts
/// first, as `-inf < -1`), non-negative numbers just get the sign bit set.
pub fn encode_f64(d: f64) -> [u8; 8] {
    let bits = d.to_bits();
    let encoded = if d.is_sign_negative() { !bits } else { bits | (1u64 << 63) };
    encoded.to_be_bytes()
}

pub fn decode_f64(bytes: &[u8]) -> CResult<f64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::CorruptIndex(format!("expected 8 bytes for f64, got {}", bytes.len())))?;
    let encoded = u64::from_be_bytes(arr);
    let bits = if encoded & (1u64 << 63) != 0 { encoded & !(1u64 << 63) } else { !encoded };
    Ok(f64::from_bits(bits))
}

/// UTF-8 bytes, each shifted up by two (reserving `0x00`/`0x01` as sentinels),
/// truncated to [`MAX_STRING_BYTES`], terminated by a literal `0x01` byte so
/// that `"ab"` sorts before `"ab\0"` (a strict prefix is always smaller).
pub fn encode_str(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let truncated = &bytes[..bytes.len().min(MAX_STRING_BYTES)];
    let mut out = Vec::with_capacity(truncated.len() + 1);
    for &b in truncated {
        out.push(b.wrapping_add(2));
    }
    out.push(0x01);
    out
}

pub fn decode_str(bytes: &[u8]) -> CResult<String> {
    let body = bytes
        .strip_suffix(&[0x01])
        .ok_or_else(|| Error::CorruptIndex("string encoding missing terminator".into()))?;
    let raw: Vec<u8> = body.iter().map(|b| b.wrapping_sub(2)).collect();
    String::from_utf8(raw).map_err(|e| Error::CorruptIndex(e.to_string()))
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (a, b) = (self.encode().ok()?, other.encode().ok()?);
        Some(a.cmp(&b))
    }
}
