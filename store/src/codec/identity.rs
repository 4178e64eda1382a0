//! Canonical identity hashing: `EntityId`, `ContentHash`, and the
//! SHA-1-of-canonical-serialization scheme both are built on.

use crate::error::{CResult, Error};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

pub const DIGEST_LEN: usize = 20;

/// A 20-byte SHA-1 digest, shared representation for both `EntityId` and
/// `ContentHash` (they're structurally identical; the newtypes exist so the
/// type system keeps "the id of the thing" and "the hash of its bytes" apart).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest20(#[serde(with = "serde_bytes")] pub [u8; DIGEST_LEN]);

impl Digest20 {
    pub fn from_slice(bytes: &[u8]) -> CResult<Self> {
        let arr: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| Error::CorruptIndex(format!("expected {DIGEST_LEN}-byte digest, got {}", bytes.len())))?;
        Ok(Digest20(arr))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// The sentinel content-hash written over every historical version of an
    /// evicted entity. All-`0xFF` so it never collides with a real SHA-1
    /// digest's astronomically unlikely all-ones case in practice, and reads
    /// clearly as "not a real hash" in hex dumps.
    pub const TOMBSTONE: Digest20 = Digest20([0xFFu8; DIGEST_LEN]);
}

impl fmt::Debug for Digest20 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Digest20 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

pub type EntityId = Digest20;
pub type ContentHash = Digest20;

pub fn sha1(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Hashes the canonical (deterministic key order, stable primitive encoding)
/// serialization of an arbitrary JSON value. `serde_json` serializes
/// `BTreeMap`/`Map`-backed objects in key order already; the canonical form
/// additionally requires object keys to come from a `BTreeMap` rather than
/// `serde_json`'s default preserve-order map, which callers must arrange for
/// (see [`crate::document::Document`]).
pub fn hash_canonical(value: &serde_json::Value) -> CResult<Digest20> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Digest20(sha1(&bytes)))
}

/// Parses an `EntityId` from any of the accepted ingress forms: a raw
/// 20-byte array, a hex string of exactly `2 * DIGEST_LEN` characters, or an
/// arbitrary string/keyword (hashed as UTF-8 bytes with a `"id:"` domain
/// separator so `"id:foo"` as a literal string and the keyword `foo` never
/// collide).
pub enum IdSource<'a> {
    Bytes(&'a [u8]),
    Hex(&'a str),
    Keyword(&'a str),
    Json(&'a serde_json::Value),
}

pub fn canonicalize_id(source: IdSource<'_>) -> CResult<EntityId> {
    match source {
        IdSource::Bytes(bytes) if bytes.len() == DIGEST_LEN => Digest20::from_slice(bytes),
        IdSource::Bytes(bytes) => Ok(Digest20(sha1(bytes))),
        IdSource::Hex(s) => {
            if s.len() != DIGEST_LEN * 2 {
                return Err(Error::MalformedId(format!(
                    "hex id must be exactly {} characters, got {}",
                    DIGEST_LEN * 2,
                    s.len()
                )));
            }
            let bytes = hex::decode(s).map_err(|e| Error::MalformedId(e.to_string()))?;
            Digest20::from_slice(&bytes)
        }
        IdSource::Keyword(s) => {
            let mut buf = Vec::with_capacity(s.len() + 3);
            buf.extend_from_slice(b"id:");
            buf.extend_from_slice(s.as_bytes());
            Ok(Digest20(sha1(&buf)))
        }
        IdSource::Json(value) => hash_canonical(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_stable_and_right_length() {
        let a = canonicalize_id(IdSource::Keyword(":picasso")).unwrap();
        let b = canonicalize_id(IdSource::Keyword(":picasso")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.len(), DIGEST_LEN);
    }

    #[test]
    fn hex_id_wrong_length_is_malformed() {
        assert!(matches!(canonicalize_id(IdSource::Hex("ab")), Err(Error::MalformedId(_))));
    }

    #[test]
    fn hex_id_round_trips_through_bytes() {
        let raw = [7u8; DIGEST_LEN];
        let via_bytes = canonicalize_id(IdSource::Bytes(&raw)).unwrap();
        let via_hex = canonicalize_id(IdSource::Hex(&hex::encode(raw))).unwrap();
        assert_eq!(via_bytes, via_hex);
    }

    #[test]
    fn json_composite_ids_hash_by_canonical_form() {
        let value = serde_json::json!({"a": 1, "b": 2});
        let a = canonicalize_id(IdSource::Json(&value)).unwrap();
        let b = canonicalize_id(IdSource::Json(&value)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_is_sha1_of_bytes() {
        let bytes = b"hello world";
        let hash = hash_canonical(&serde_json::json!("hello world")).unwrap();
        assert_eq!(hash.0.len(), DIGEST_LEN);
        // sanity: identical input hashes identically
        assert_eq!(hash, hash_canonical(&serde_json::json!("hello world")).unwrap());
        let _ = bytes;
    }
}
