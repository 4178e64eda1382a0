//! The read-only surface exposed to callers: as-of lookups, full history,
//! attribute range scans, and raw tx-log introspection. Every function here
//! takes a snapshot, never a live engine, so a long-running scan can't
//! observe a write landing mid-way through.

use crate::codec::identity::{ContentHash, EntityId};
use crate::codec::value::{decode_f64, decode_i64, decode_str, Value};
use crate::document::{Document, EntityTx};
use crate::engine::EngineSnapshot;
use crate::error::CResult;
use crate::index_store::{self, AttributeHit};
use crate::log::{LogClient, Record};
use crate::object_store;

/// One historical version of an entity, resolved to its document (`None`
/// if the version was evicted, or if the document is otherwise missing).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityVersion {
    pub entity_tx: EntityTx,
    pub document: Option<Document>,
}

fn resolve(snapshot: &dyn EngineSnapshot, entity_tx: EntityTx) -> CResult<EntityVersion> {
    let document = if entity_tx.is_evicted() { None } else { object_store::get_document(snapshot, &entity_tx.content_hash)? };
    Ok(EntityVersion { entity_tx, document })
}

/// The version of `entity_id` visible as of `(business_time,
/// transaction_time)`, or `None` if the entity has no qualifying version.
pub fn entity_as_of(
    snapshot: &dyn EngineSnapshot,
    entity_id: &EntityId,
    business_time: i64,
    transaction_time: i64,
) -> CResult<Option<EntityVersion>> {
    match index_store::entity_at(snapshot, entity_id, business_time, transaction_time)? {
        Some(entity_tx) => Ok(Some(resolve(snapshot, entity_tx)?)),
        None => Ok(None),
    }
}

/// Every recorded version of `entity_id`, newest first.
pub fn history(snapshot: &dyn EngineSnapshot, entity_id: &EntityId) -> CResult<Vec<EntityVersion>> {
    index_store::all_entity_history(snapshot, entity_id)?.into_iter().map(|tx| resolve(snapshot, tx)).collect()
}

/// The scalar type a range scan's bounds were encoded with, so a posting's
/// raw bytes can be decoded back for display. Only types with a reversible
/// byte encoding apply; `Bytes`/`Composite` postings are hashed, not
/// encoded, so they have no scalar form to decode.
#[derive(Debug, Clone, Copy)]
pub enum ScalarKind {
    Long,
    Double,
    Date,
    Str,
}

pub fn decode_scalar(bytes: &[u8], kind: ScalarKind) -> CResult<Value> {
    Ok(match kind {
        ScalarKind::Long => Value::Long(decode_i64(bytes)?),
        ScalarKind::Double => Value::Double(decode_f64(bytes)?),
        ScalarKind::Date => Value::Date(decode_i64(bytes)?),
        ScalarKind::Str => Value::Str(decode_str(bytes)?),
    })
}

/// Every posting for `attr` with an encoded value in `[lower, upper]`.
pub fn attribute_range_scan(
    snapshot: &dyn EngineSnapshot,
    attr: &str,
    lower: &Value,
    upper: &Value,
) -> CResult<Vec<AttributeHit>> {
    index_store::attribute_range_scan(snapshot, attr, lower, upper)
}

/// Raw tx-topic records at or after `from_offset`, for operators
/// inspecting what has actually been submitted rather than what the index
/// currently reflects.
pub fn tx_log(log: &dyn LogClient, tx_topic: &str, from_offset: i64) -> CResult<Vec<Record>> {
    log.consume_from(tx_topic, from_offset)
}
