//! Index 1 (`attribute -> value -> content-hash`), index 3
//! (`entity -> business-time -> transaction-time -> tx-id -> op-index`), and
//! index 4 (small keyed metadata, e.g. the log consumer offset).

use crate::codec::identity::{sha1, ContentHash, EntityId};
use crate::codec::key;
use crate::codec::value::Value;
use crate::document::EntityTx;
use crate::engine::{EngineSnapshot, WriteBatch};
use crate::error::CResult;
use crate::object_store;
use std::collections::HashSet;
use std::ops::Bound;

fn attr_hash(attr: &str) -> [u8; 20] {
    sha1(attr.as_bytes())
}

/// Stages an attribute-value posting for `hash`. Called once per top-level
/// attribute on every `Put`.
pub fn index_attribute(batch: &mut WriteBatch, attr: &str, value: &Value, hash: &ContentHash) -> CResult<()> {
    let value_bytes = value.encode()?;
    batch.set(key::attr_value_key(&attr_hash(attr), &value_bytes, hash), Vec::new());
    Ok(())
}

/// One posting found by [`attribute_range_scan`]: the raw encoded value
/// bytes (decodable via the matching `decode_*` in [`crate::codec::value`]
/// for scalar attributes; opaque hash bytes for composite/byte-array
/// values, which were never byte-encoded reversibly to begin with) and the
/// content-hash of the document that carries it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeHit {
    pub value_bytes: Vec<u8>,
    pub content_hash: ContentHash,
}

/// Scans every posting for `attr` whose encoded value falls in
/// `[lower, upper]` (inclusive both ends), in ascending value order.
/// `lower` and `upper` must be the same `Value` variant; callers comparing
/// across variants (e.g. a `Long` lower bound against `Double` data) will
/// simply get no matches, since each variant encodes into a disjoint byte
/// range.
pub fn attribute_range_scan(
    snapshot: &dyn EngineSnapshot,
    attr: &str,
    lower: &Value,
    upper: &Value,
) -> CResult<Vec<AttributeHit>> {
    let prefix = attr_hash(attr);
    let lower_bytes = lower.encode()?;
    let upper_bytes = upper.encode()?;

    let mut start = key::attr_prefix(&prefix);
    start.extend_from_slice(&lower_bytes);

    let mut end = key::attr_prefix(&prefix);
    end.extend_from_slice(&upper_bytes);
    end.extend(std::iter::repeat(0xffu8).take(20));

    let rows = snapshot.scan((Bound::Included(start), Bound::Included(end)))?;
    rows.into_iter()
        .map(|(k, _)| {
            let (value_bytes, content_hash) = key::decode_attr_value_key(&k)?;
            Ok(AttributeHit { value_bytes, content_hash })
        })
        .collect()
}

/// Stages an `entity -> (bt, tt, tx-id, op-index) -> content-hash` row.
/// `content_hash` is [`ContentHash::TOMBSTONE`] for an eviction.
pub fn index_entity_tx(
    batch: &mut WriteBatch,
    eid: &EntityId,
    business_time: i64,
    transaction_time: i64,
    tx_id: i64,
    op_index: u32,
    content_hash: ContentHash,
) {
    let k = key::entity_tx_key(eid, business_time, transaction_time, tx_id, op_index);
    batch.set(k, content_hash.as_bytes().to_vec());
}

/// The latest version of `eid` visible as of `(business_time,
/// transaction_time)`: the newest row whose own business and transaction
/// times are both `<=` the query bounds, or `None` if no version qualifies.
///
/// Index 3's keys are encoded so a forward scan of one entity's prefix
/// already yields rows newest-first; this walks that prefix and returns the
/// first row that satisfies both bounds; no scan-optimizing seek is needed
/// because a prefix scan over one entity's history is already bounded by
/// that entity's version count, not the whole index.
pub fn entity_at(
    snapshot: &dyn EngineSnapshot,
    eid: &EntityId,
    business_time: i64,
    transaction_time: i64,
) -> CResult<Option<EntityTx>> {
    let prefix = key::entity_tx_prefix(eid);
    for (k, v) in snapshot.scan_prefix(&prefix)? {
        let decoded = key::decode_entity_tx_key(&k)?;
        if decoded.business_time <= business_time && decoded.transaction_time <= transaction_time {
            let content_hash = ContentHash::from_slice(&v)?;
            return Ok(Some(EntityTx {
                entity_id: decoded.eid,
                business_time: decoded.business_time,
                transaction_time: decoded.transaction_time,
                tx_id: decoded.tx_id,
                op_index: decoded.op_index,
                content_hash,
            }));
        }
    }
    Ok(None)
}

/// Every recorded version of `eid`, newest first.
pub fn all_entity_history(snapshot: &dyn EngineSnapshot, eid: &EntityId) -> CResult<Vec<EntityTx>> {
    let prefix = key::entity_tx_prefix(eid);
    snapshot
        .scan_prefix(&prefix)?
        .into_iter()
        .map(|(k, v)| {
            let decoded = key::decode_entity_tx_key(&k)?;
            let content_hash = ContentHash::from_slice(&v)?;
            Ok(EntityTx {
                entity_id: decoded.eid,
                business_time: decoded.business_time,
                transaction_time: decoded.transaction_time,
                tx_id: decoded.tx_id,
                op_index: decoded.op_index,
                content_hash,
            })
        })
        .collect()
}

/// Stages a rewrite of every recorded version of `eid` to
/// [`ContentHash::TOMBSTONE`], in place: each row's key (and so its
/// business/transaction time and tx-id) is unchanged, only the content-hash
/// it points at is scrubbed. `entity_at`/`all_entity_history` immediately
/// start reporting every version of this entity as evicted, at every
/// business and transaction time that previously had real content.
///
/// Also retires `eid`'s claim on every content-hash it ever pointed at
/// (index 2), and where that was the last remaining claim, deletes the
/// document itself (index 0) and its attribute postings (index 1) — other
/// entities that still reference the same content-addressed document are
/// left untouched. Returns the content-hashes that were fully purged this
/// way, so the caller can tell the doc-topic compactor about them.
pub fn evict_entity(batch: &mut WriteBatch, snapshot: &dyn EngineSnapshot, eid: &EntityId) -> CResult<Vec<ContentHash>> {
    let history = all_entity_history(snapshot, eid)?;

    let mut purged = Vec::new();
    let mut seen = HashSet::new();
    for version in &history {
        if version.is_evicted() || !seen.insert(version.content_hash) {
            continue;
        }
        if purge_content_if_unreferenced(batch, snapshot, &version.content_hash, eid)? {
            purged.push(version.content_hash);
        }
    }

    for version in history {
        index_entity_tx(
            batch,
            &version.entity_id,
            version.business_time,
            version.transaction_time,
            version.tx_id,
            version.op_index,
            ContentHash::TOMBSTONE,
        );
    }
    Ok(purged)
}

/// Drops `eid`'s index-2 reference to `hash`; if no other entity still
/// references it, also deletes the document (index 0) and its attribute
/// postings (index 1). Returns whether the content was fully purged.
fn purge_content_if_unreferenced(
    batch: &mut WriteBatch,
    snapshot: &dyn EngineSnapshot,
    hash: &ContentHash,
    eid: &EntityId,
) -> CResult<bool> {
    object_store::remove_entity_ref(batch, hash, eid);
    let still_claimed = object_store::entities_referencing(snapshot, hash)?.iter().any(|other| other != eid);
    if still_claimed {
        return Ok(false);
    }

    object_store::delete_document(batch, hash);
    if let Some(document) = object_store::get_document(snapshot, hash)? {
        for (attr, value) in document.attributes()? {
            let value_bytes = value.encode()?;
            batch.delete(key::attr_value_key(&attr_hash(&attr), &value_bytes, hash));
        }
    }
    Ok(true)
}

pub fn set_meta(batch: &mut WriteBatch, name: &[u8], value: Vec<u8>) {
    batch.set(key::meta_key(name), value);
}

pub fn get_meta(snapshot: &dyn EngineSnapshot, name: &[u8]) -> CResult<Option<Vec<u8>>> {
    snapshot.get(&key::meta_key(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::identity::Digest20;
    use pretty_assertions::assert_eq;
    use crate::engine::memory::Memory;
    use crate::engine::Engine;

    fn eid(n: u8) -> EntityId {
        Digest20([n; 20])
    }

    fn hash(n: u8) -> ContentHash {
        Digest20([n; 20])
    }

    #[test]
    fn entity_at_returns_latest_version_visible_at_bt() {
        let mut engine = Memory::new();
        let id = eid(1);
        let mut batch = WriteBatch::new();
        index_entity_tx(&mut batch, &id, 100, 100, 1, 0, hash(1));
        index_entity_tx(&mut batch, &id, 200, 200, 2, 0, hash(2));
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let at_150 = entity_at(&snapshot, &id, 150, 1_000).unwrap().unwrap();
        assert_eq!(at_150.content_hash, hash(1));

        let at_250 = entity_at(&snapshot, &id, 250, 1_000).unwrap().unwrap();
        assert_eq!(at_250.content_hash, hash(2));
    }

    #[test]
    fn entity_at_respects_transaction_time_bound() {
        let mut engine = Memory::new();
        let id = eid(2);
        let mut batch = WriteBatch::new();
        // A correction: bt=100 as recorded by a later transaction (tt=500).
        index_entity_tx(&mut batch, &id, 100, 500, 3, 0, hash(9));
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        // Querying with a transaction-time before the correction landed
        // must not see it.
        assert_eq!(entity_at(&snapshot, &id, 100, 200).unwrap(), None);
        assert!(entity_at(&snapshot, &id, 100, 600).unwrap().is_some());
    }

    #[test]
    fn entity_at_none_when_no_qualifying_version() {
        let engine = Memory::new();
        let snapshot = engine.new_snapshot();
        assert_eq!(entity_at(&snapshot, &eid(9), 0, 0).unwrap(), None);
    }

    #[test]
    fn all_entity_history_is_newest_first() {
        let mut engine = Memory::new();
        let id = eid(3);
        let mut batch = WriteBatch::new();
        index_entity_tx(&mut batch, &id, 100, 100, 1, 0, hash(1));
        index_entity_tx(&mut batch, &id, 200, 200, 2, 0, hash(2));
        index_entity_tx(&mut batch, &id, 300, 300, 3, 0, hash(3));
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let history = all_entity_history(&snapshot, &id).unwrap();
        let hashes: Vec<_> = history.iter().map(|e| e.content_hash).collect();
        assert_eq!(hashes, vec![hash(3), hash(2), hash(1)]);
    }

    #[test]
    fn attribute_range_scan_finds_values_in_bounds() {
        let mut engine = Memory::new();
        let mut batch = WriteBatch::new();
        index_attribute(&mut batch, "age", &Value::Long(10), &hash(1)).unwrap();
        index_attribute(&mut batch, "age", &Value::Long(20), &hash(2)).unwrap();
        index_attribute(&mut batch, "age", &Value::Long(30), &hash(3)).unwrap();
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let hits = attribute_range_scan(&snapshot, "age", &Value::Long(15), &Value::Long(25)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content_hash, hash(2));
    }

    #[test]
    fn attribute_range_scan_separates_distinct_attributes() {
        let mut engine = Memory::new();
        let mut batch = WriteBatch::new();
        index_attribute(&mut batch, "age", &Value::Long(10), &hash(1)).unwrap();
        index_attribute(&mut batch, "height", &Value::Long(10), &hash(2)).unwrap();
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let hits = attribute_range_scan(&snapshot, "age", &Value::Long(0), &Value::Long(100)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content_hash, hash(1));
    }

    #[test]
    fn evict_entity_tombstones_every_existing_version() {
        let mut engine = Memory::new();
        let id = eid(4);
        let mut batch = WriteBatch::new();
        index_entity_tx(&mut batch, &id, 100, 100, 1, 0, hash(1));
        index_entity_tx(&mut batch, &id, 200, 200, 2, 0, hash(2));
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let mut evict_batch = WriteBatch::new();
        evict_entity(&mut evict_batch, &snapshot, &id).unwrap();
        engine.write_batch(evict_batch).unwrap();

        let snapshot = engine.new_snapshot();
        let history = all_entity_history(&snapshot, &id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|v| v.is_evicted()));
        assert!(entity_at(&snapshot, &id, 150, 1_000).unwrap().unwrap().is_evicted());
    }

    #[test]
    fn evict_entity_purges_the_document_and_its_postings_when_unshared() {
        use crate::document::Document;

        let mut engine = Memory::new();
        let id = eid(5);
        let doc = Document::new(serde_json::json!({"age": 42}));
        let content_hash = doc.content_hash().unwrap();

        let mut batch = WriteBatch::new();
        object_store::put_document(&mut batch, &content_hash, &doc).unwrap();
        object_store::index_entity_ref(&mut batch, &content_hash, &id);
        index_attribute(&mut batch, "age", &Value::Long(42), &content_hash).unwrap();
        index_entity_tx(&mut batch, &id, 100, 100, 1, 0, content_hash);
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let mut evict_batch = WriteBatch::new();
        let purged = evict_entity(&mut evict_batch, &snapshot, &id).unwrap();
        engine.write_batch(evict_batch).unwrap();

        assert_eq!(purged, vec![content_hash]);
        let snapshot = engine.new_snapshot();
        assert_eq!(object_store::get_document(&snapshot, &content_hash).unwrap(), None);
        assert_eq!(object_store::entities_referencing(&snapshot, &content_hash).unwrap(), Vec::new());
        let hits = attribute_range_scan(&snapshot, "age", &Value::Long(0), &Value::Long(100)).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn evict_entity_keeps_a_document_still_claimed_by_another_entity() {
        use crate::document::Document;

        let mut engine = Memory::new();
        let evicted = eid(6);
        let survivor = eid(7);
        let doc = Document::new(serde_json::json!({"shared": true}));
        let content_hash = doc.content_hash().unwrap();

        let mut batch = WriteBatch::new();
        object_store::put_document(&mut batch, &content_hash, &doc).unwrap();
        object_store::index_entity_ref(&mut batch, &content_hash, &evicted);
        object_store::index_entity_ref(&mut batch, &content_hash, &survivor);
        index_entity_tx(&mut batch, &evicted, 100, 100, 1, 0, content_hash);
        index_entity_tx(&mut batch, &survivor, 100, 100, 2, 0, content_hash);
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let mut evict_batch = WriteBatch::new();
        let purged = evict_entity(&mut evict_batch, &snapshot, &evicted).unwrap();
        engine.write_batch(evict_batch).unwrap();

        assert!(purged.is_empty());
        let snapshot = engine.new_snapshot();
        assert_eq!(object_store::get_document(&snapshot, &content_hash).unwrap(), Some(doc));
        assert_eq!(object_store::entities_referencing(&snapshot, &content_hash).unwrap(), vec![survivor]);
        assert!(!entity_at(&snapshot, &survivor, 150, 1_000).unwrap().unwrap().is_evicted());
    }

    #[test]
    fn meta_round_trips() {
        let mut engine = Memory::new();
        let mut batch = WriteBatch::new();
        set_meta(&mut batch, b"offset", b"42".to_vec());
        engine.write_batch(batch).unwrap();
        let snapshot = engine.new_snapshot();
        assert_eq!(get_meta(&snapshot, b"offset").unwrap(), Some(b"42".to_vec()));
    }
}
