//! Index 0 (`content-hash -> doc`) and index 2 (`content-hash -> entity`):
//! the content-addressed document store and its reverse entity index.

use crate::codec::identity::{ContentHash, EntityId};
use crate::codec::key;
use crate::document::Document;
use crate::engine::{EngineSnapshot, WriteBatch};
use crate::error::CResult;

/// Stages a document write. Content-addressing makes this idempotent: if
/// the hash is already present the existing bytes are guaranteed identical
/// (same hash, same canonical serialization), so this never needs to read
/// before writing.
pub fn put_document(batch: &mut WriteBatch, hash: &ContentHash, doc: &Document) -> CResult<()> {
    batch.set(key::content_key(hash), doc.to_bytes()?);
    Ok(())
}

pub fn get_document(snapshot: &dyn EngineSnapshot, hash: &ContentHash) -> CResult<Option<Document>> {
    match snapshot.get(&key::content_key(hash))? {
        Some(bytes) => Ok(Some(Document::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Stages removal of a document's index-0 record. Used by eviction once a
/// content-hash has no other referencing entity left.
pub fn delete_document(batch: &mut WriteBatch, hash: &ContentHash) {
    batch.delete(key::content_key(hash));
}

/// Stages a `content-hash -> entity` reference. Written alongside every
/// `Put` so index 2 always knows every entity that has ever pointed at a
/// given piece of content.
pub fn index_entity_ref(batch: &mut WriteBatch, hash: &ContentHash, eid: &EntityId) {
    batch.set(key::content_entity_key(hash, eid), Vec::new());
}

/// Stages removal of a single `content-hash -> entity` reference, e.g. when
/// eviction retires one entity's claim on a piece of content that other
/// entities may still reference.
pub fn remove_entity_ref(batch: &mut WriteBatch, hash: &ContentHash, eid: &EntityId) {
    batch.delete(key::content_entity_key(hash, eid));
}

pub fn entities_referencing(snapshot: &dyn EngineSnapshot, hash: &ContentHash) -> CResult<Vec<EntityId>> {
    let prefix = key::content_entity_prefix(hash);
    snapshot
        .scan_prefix(&prefix)?
        .into_iter()
        .map(|(k, _)| key::decode_content_entity_key(&k).map(|(_, eid)| eid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::Memory;
    use crate::engine::Engine;

    #[test]
    fn put_then_get_round_trips() {
        let mut engine = Memory::new();
        let doc = Document::new(serde_json::json!({"a": 1}));
        let hash = doc.content_hash().unwrap();

        let mut batch = WriteBatch::new();
        put_document(&mut batch, &hash, &doc).unwrap();
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        assert_eq!(get_document(&snapshot, &hash).unwrap(), Some(doc));
    }

    #[test]
    fn missing_document_is_none_not_error() {
        let engine = Memory::new();
        let snapshot = engine.new_snapshot();
        let hash = crate::codec::identity::Digest20([1u8; 20]);
        assert_eq!(get_document(&snapshot, &hash).unwrap(), None);
    }

    #[test]
    fn entity_ref_index_tracks_every_referencing_entity() {
        let mut engine = Memory::new();
        let hash = crate::codec::identity::Digest20([2u8; 20]);
        let e1 = crate::codec::identity::Digest20([10u8; 20]);
        let e2 = crate::codec::identity::Digest20([11u8; 20]);

        let mut batch = WriteBatch::new();
        index_entity_ref(&mut batch, &hash, &e1);
        index_entity_ref(&mut batch, &hash, &e2);
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        let mut refs = entities_referencing(&snapshot, &hash).unwrap();
        refs.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        assert_eq!(refs, vec![e1, e2]);
    }

    #[test]
    fn delete_document_removes_it_from_the_object_store() {
        let mut engine = Memory::new();
        let doc = Document::new(serde_json::json!({"a": 1}));
        let hash = doc.content_hash().unwrap();

        let mut batch = WriteBatch::new();
        put_document(&mut batch, &hash, &doc).unwrap();
        engine.write_batch(batch).unwrap();

        let mut batch = WriteBatch::new();
        delete_document(&mut batch, &hash);
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        assert_eq!(get_document(&snapshot, &hash).unwrap(), None);
    }

    #[test]
    fn remove_entity_ref_drops_only_that_entity() {
        let mut engine = Memory::new();
        let hash = crate::codec::identity::Digest20([3u8; 20]);
        let e1 = crate::codec::identity::Digest20([20u8; 20]);
        let e2 = crate::codec::identity::Digest20([21u8; 20]);

        let mut batch = WriteBatch::new();
        index_entity_ref(&mut batch, &hash, &e1);
        index_entity_ref(&mut batch, &hash, &e2);
        engine.write_batch(batch).unwrap();

        let mut batch = WriteBatch::new();
        remove_entity_ref(&mut batch, &hash, &e1);
        engine.write_batch(batch).unwrap();

        let snapshot = engine.new_snapshot();
        assert_eq!(entities_referencing(&snapshot, &hash).unwrap(), vec![e2]);
    }
}
