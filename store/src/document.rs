//! The data model submitted transactions are built from: documents, the two
//! operations that can be applied to an entity, and the historical rows
//! `entity_as_of`/`history` hand back to callers.

use crate::codec::identity::{ContentHash, EntityId};
use crate::codec::value::Value;
use crate::error::{CResult, Error};
use serde::{Deserialize, Serialize};

/// An immutable JSON document. Content-addressed by the SHA-1 of its
/// canonical serialization (see [`crate::codec::identity::hash_canonical`]).
///
/// `serde_json::Value::Object` is a `BTreeMap` under the hood as long as the
/// `preserve_order` feature is off (it is, here), so two documents built
/// from the same key/value pairs in different insertion order already
/// serialize identically and hash identically without any extra work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: serde_json::Value,
}

impl Document {
    pub fn new(content: serde_json::Value) -> Self {
        Document { content }
    }

    pub fn content_hash(&self) -> CResult<ContentHash> {
        crate::codec::identity::hash_canonical(&self.content)
    }

    pub fn to_bytes(&self) -> CResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.content)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> CResult<Self> {
        let content = serde_json::from_slice(bytes)?;
        Ok(Document { content })
    }

    /// Top-level key/value pairs, as indexable `(attribute, Value)` pairs.
    /// Only a JSON object has attributes to index; anything else is a
    /// malformed document as far as the index is concerned.
    pub fn attributes(&self) -> CResult<Vec<(String, Value)>> {
        let object = self
            .content
            .as_object()
            .ok_or_else(|| Error::Encoding("document content must be a JSON object".into()))?;
        Ok(object.iter().map(|(k, v)| (k.clone(), scalar_from_json(v))).collect())
    }
}

/// Converts an arbitrary JSON value into the codec's scalar sum type.
/// Anything that isn't a plain scalar (array, nested object) becomes a
/// [`Value::Composite`], which is order-indexed by its hash rather than by
/// value — range scans over composite-valued attributes only ever see
/// equality groups, never an ordering.
pub fn scalar_from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Long(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Long(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Composite(value.clone()),
    }
}

/// One operation within a submitted transaction. Every op names the entity
/// it applies to and the business time it takes effect at; `op-index` (its
/// position in the submitting transaction's op list) is assigned by the
/// indexer, not stored here, since it only matters relative to the other
/// ops landing in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    /// Asserts `document` as the value of `entity_id` as of `business_time`.
    Put { entity_id: EntityId, business_time: i64, document: Document },
    /// Asserts absence (a tombstone) as the value of `entity_id` as of
    /// `business_time` (defaulting to the transaction's time). Unlike
    /// `Evict`, this is a single new historical row, not a rewrite of
    /// every prior one — earlier `as-of` queries still see what was true
    /// then.
    Delete { entity_id: EntityId, business_time: Option<i64> },
    /// Writes `document` as of `business_time` only if `entity_id`'s
    /// current content-hash (as of the transaction's own time) equals
    /// `expected_hash`; `None` means "only if no version currently
    /// exists". A mismatch fails the whole transaction.
    Cas { entity_id: EntityId, business_time: Option<i64>, expected_hash: Option<ContentHash>, document: Document },
    /// Tombstones every historical version of `entity_id`: the index no
    /// longer serves its content, regardless of the business/transaction
    /// time queried.
    Evict { entity_id: EntityId },
}

impl Op {
    pub fn entity_id(&self) -> EntityId {
        match self {
            Op::Put { entity_id, .. } => *entity_id,
            Op::Delete { entity_id, .. } => *entity_id,
            Op::Cas { entity_id, .. } => *entity_id,
            Op::Evict { entity_id } => *entity_id,
        }
    }
}

/// A caller-submitted batch of operations, applied atomically: either every
/// op lands in the index at the same transaction time, or none do.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Transaction {
    pub ops: Vec<Op>,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Transaction { ops }
    }
}

/// One historical version of an entity, as returned by `entity_as_of` and
/// `history`. `content_hash` is [`ContentHash::TOMBSTONE`] for an evicted
/// version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTx {
    pub entity_id: EntityId,
    pub business_time: i64,
    pub transaction_time: i64,
    pub tx_id: i64,
    pub op_index: u32,
    pub content_hash: ContentHash,
}

impl EntityTx {
    pub fn is_evicted(&self) -> bool {
        self.content_hash == ContentHash::TOMBSTONE
    }
}

/// Outcome of a completed (applied or failed) transaction, handed back
/// through the future `submit_tx` resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResult {
    pub tx_id: i64,
    pub transaction_time: i64,
    pub outcome: TxOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxOutcome {
    Applied,
    /// The indexer rejected the transaction. Carries a human-readable
    /// reason; nothing about index corruption ever reaches here; see
    /// `crate::error::Error` for what is fatal instead.
    Failed(String),
}
