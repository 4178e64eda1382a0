//! Typed, order-preserving key layouts for the five index spaces described
//! in the design doc. Each key starts with a 2-byte tag identifying which
//! index it belongs to, so every index lives in its own lexicographic range
//! of the shared ordered KV store.

use crate::codec::identity::{ContentHash, EntityId, DIGEST_LEN};
use crate::codec::value::{decode_i64, encode_i64};
use crate::error::{CResult, Error};

pub const TAG_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IndexTag {
    ContentToDoc = 0,
    AttrValue = 1,
    ContentEntity = 2,
    EntityTx = 3,
    Meta = 4,
}

impl IndexTag {
    fn bytes(self) -> [u8; TAG_LEN] {
        (self as u16).to_be_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> CResult<Self> {
        let arr: [u8; TAG_LEN] = bytes
            .try_into()
            .map_err(|_| Error::CorruptIndex("short index tag".into()))?;
        match u16::from_be_bytes(arr) {
            0 => Ok(IndexTag::ContentToDoc),
            1 => Ok(IndexTag::AttrValue),
            2 => Ok(IndexTag::ContentEntity),
            3 => Ok(IndexTag::EntityTx),
            4 => Ok(IndexTag::Meta),
            other => Err(Error::CorruptIndex(format!("unknown index tag {other}"))),
        }
    }
}

/// Descending encoding of a signed 64-bit quantity: larger `n` maps to
/// *smaller* encoded bytes, so prefix scans over a shared eid/bt/tt come back
/// newest-first. This is the complement of [`encode_i64`]'s ascending form.
fn encode_desc_i64(n: i64) -> [u8; 8] {
    let mut bytes = encode_i64(n);
    for b in bytes.iter_mut() {
        *b = !*b;
    }
    bytes
}

fn decode_desc_i64(bytes: &[u8]) -> CResult<i64> {
    let mut inverted = [0u8; 8];
    inverted.copy_from_slice(bytes);
    for b in inverted.iter_mut() {
        *b = !*b;
    }
    decode_i64(&inverted)
}

/// Descending encoding for the `op-index` tie-break (§3.1): an unsigned
/// 32-bit position within a transaction's op list, highest index sorts first.
fn encode_desc_u32(n: u32) -> [u8; 4] {
    (!n).to_be_bytes()
}

fn decode_desc_u32(bytes: &[u8]) -> CResult<u32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| Error::CorruptIndex(format!("expected 4 bytes for op-index, got {}", bytes.len())))?;
    Ok(!u32::from_be_bytes(arr))
}

/// Index 0: `content-hash -> doc`.
pub fn content_key(hash: &ContentHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN);
    key.extend_from_slice(&IndexTag::ContentToDoc.bytes());
    key.extend_from_slice(hash.as_bytes());
    key
}

pub fn decode_content_key(key: &[u8]) -> CResult<ContentHash> {
    expect_tag(key, IndexTag::ContentToDoc)?;
    ContentHash::from_slice(&key[TAG_LEN..])
}

/// Index 1: `attr-hash ++ value-bytes ++ content-hash`.
pub fn attr_value_key(attr_hash: &[u8; DIGEST_LEN], value_bytes: &[u8], hash: &ContentHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN + value_bytes.len() + DIGEST_LEN);
    key.extend_from_slice(&IndexTag::AttrValue.bytes());
    key.extend_from_slice(attr_hash);
    key.extend_from_slice(value_bytes);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Lower bound of the attribute's whole range (`attr-hash` with nothing
/// after it): every key for this attribute is `>=` this prefix.
pub fn attr_prefix(attr_hash: &[u8; DIGEST_LEN]) -> Vec<u8> {
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN);
    key.extend_from_slice(&IndexTag::AttrValue.bytes());
    key.extend_from_slice(attr_hash);
    key
}

/// The value bytes and content-hash a full index-1 key was built from. The
/// value portion is whatever bytes sit between the fixed-width attr-hash
/// prefix and the fixed-width content-hash suffix, so this needs no length
/// table: the content-hash is always the last [`DIGEST_LEN`] bytes.
pub fn decode_attr_value_key(key: &[u8]) -> CResult<(Vec<u8>, ContentHash)> {
    expect_tag(key, IndexTag::AttrValue)?;
    let body = &key[TAG_LEN..];
    if body.len() < DIGEST_LEN * 2 {
        return Err(Error::CorruptIndex("attr-value key too short".into()));
    }
    let value_bytes = body[DIGEST_LEN..body.len() - DIGEST_LEN].to_vec();
    let hash = ContentHash::from_slice(&body[body.len() - DIGEST_LEN..])?;
    Ok((value_bytes, hash))
}

/// Index 2: `content-hash ++ eid`.
pub fn content_entity_key(hash: &ContentHash, eid: &EntityId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN * 2);
    key.extend_from_slice(&IndexTag::ContentEntity.bytes());
    key.extend_from_slice(hash.as_bytes());
    key.extend_from_slice(eid.as_bytes());
    key
}

pub fn content_entity_prefix(hash: &ContentHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN);
    key.extend_from_slice(&IndexTag::ContentEntity.bytes());
    key.extend_from_slice(hash.as_bytes());
    key
}

pub fn decode_content_entity_key(key: &[u8]) -> CResult<(ContentHash, EntityId)> {
    expect_tag(key, IndexTag::ContentEntity)?;
    let body = &key[TAG_LEN..];
    if body.len() != DIGEST_LEN * 2 {
        return Err(Error::CorruptIndex("content-entity key has wrong length".into()));
    }
    let hash = ContentHash::from_slice(&body[..DIGEST_LEN])?;
    let eid = EntityId::from_slice(&body[DIGEST_LEN..])?;
    Ok((hash, eid))
}

/// Index 3: `eid ++ ~bt ++ ~tt ++ ~tx-id ++ ~op-index`, all time/ordinal
/// fields descending-encoded so a forward scan within one eid's prefix
/// yields entries newest-first (§3.1, §4.1).
pub fn entity_tx_key(eid: &EntityId, bt: i64, tt: i64, tx_id: i64, op_index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN + 8 + 8 + 8 + 4);
    key.extend_from_slice(&IndexTag::EntityTx.bytes());
    key.extend_from_slice(eid.as_bytes());
    key.extend_from_slice(&encode_desc_i64(bt));
    key.extend_from_slice(&encode_desc_i64(tt));
    key.extend_from_slice(&encode_desc_i64(tx_id));
    key.extend_from_slice(&encode_desc_u32(op_index));
    key
}

pub fn entity_tx_prefix(eid: &EntityId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN);
    key.extend_from_slice(&IndexTag::EntityTx.bytes());
    key.extend_from_slice(eid.as_bytes());
    key
}

pub struct EntityTxKey {
    pub eid: EntityId,
    pub business_time: i64,
    pub transaction_time: i64,
    pub tx_id: i64,
    pub op_index: u32,
}

pub fn decode_entity_tx_key(key: &[u8]) -> CResult<EntityTxKey> {
    expect_tag(key, IndexTag::EntityTx)?;
    let body = &key[TAG_LEN..];
    if body.len() != DIGEST_LEN + 8 + 8 + 8 + 4 {
        return Err(Error::CorruptIndex("entity-tx key has wrong length".into()));
    }
    let eid = EntityId::from_slice(&body[..DIGEST_LEN])?;
    let mut offset = DIGEST_LEN;
    let business_time = decode_desc_i64(&body[offset..offset + 8])?;
    offset += 8;
    let transaction_time = decode_desc_i64(&body[offset..offset + 8])?;
    offset += 8;
    let tx_id = decode_desc_i64(&body[offset..offset + 8])?;
    offset += 8;
    let op_index = decode_desc_u32(&body[offset..offset + 4])?;
    Ok(EntityTxKey { eid, business_time, transaction_time, tx_id, op_index })
}

/// Index 4: `meta-key-hash -> arbitrary bytes`.
pub fn meta_key(name: &[u8]) -> Vec<u8> {
    let hash = crate::codec::identity::sha1(name);
    let mut key = Vec::with_capacity(TAG_LEN + DIGEST_LEN);
    key.extend_from_slice(&IndexTag::Meta.bytes());
    key.extend_from_slice(&hash);
    key
}

fn expect_tag(key: &[u8], tag: IndexTag) -> CResult<()> {
    if key.len() < TAG_LEN {
        return Err(Error::CorruptIndex("key shorter than tag".into()));
    }
    let found = IndexTag::from_bytes(&key[..TAG_LEN])?;
    if found != tag {
        return Err(Error::CorruptIndex(format!("expected tag {:?}, found {:?}", tag, found)));
    }
    Ok(())
}

/// Smallest key `>=` every real key for this prefix, used as the exclusive
/// upper bound of a prefix scan.
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(&last) = upper.last() {
        if last == 0xff {
            upper.pop();
        } else {
            *upper.last_mut().unwrap() += 1;
            return Some(upper);
        }
    }
    None
}
