//! Bridges the log protocol to the five-index store: a [`Client`] that
//! submits transactions onto the log and awaits their outcome, and an
//! [`Indexer`] that owns the engine exclusively and is the only thing that
//! ever writes to it, consuming both topics and applying what it finds.
//!
//! A submitted transaction moves through [`PendingState::Waiting`] (produced
//! to the tx-topic, sitting in `pending-txs` until every content-hash it
//! references is either indexed or tombstoned), [`PendingState::Applying`]
//! (the indexer is working through its ops), and finally resolves the
//! caller's future with [`TxOutcome::Applied`] or [`TxOutcome::Failed`] —
//! there is no going back from a terminal state. `pending-txs` is a strict
//! FIFO: the head blocks everything behind it, so transactions are applied
//! (or permanently failed) in tx-id order.

use crate::codec::identity::{ContentHash, EntityId};
use crate::document::{Document, Op, Transaction, TxOutcome, TxResult};
use crate::engine::{Engine, WriteBatch};
use crate::error::{CResult, Error};
use crate::log::{LogClient, TopicConfig};
use crate::{index_store, object_store};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// The doc-topic value eviction writes for a content-hash whose real bytes
/// have been purged: not valid JSON, so it can never collide with an
/// actual document, and small enough that the compacting topic keeps it
/// around indefinitely in place of the real content.
const DOC_TOMBSTONE: &[u8] = &[0xFF];

/// The wire form of a transaction actually carried on the tx-topic: `Put`
/// carries a content-hash reference rather than the document itself, so the
/// tx-topic stays small and the document bytes travel once, on the
/// doc-topic, keyed for compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireOp {
    Put { entity_id: EntityId, business_time: i64, content_hash: ContentHash },
    Delete { entity_id: EntityId, business_time: Option<i64> },
    Cas { entity_id: EntityId, business_time: Option<i64>, expected_hash: Option<ContentHash>, new_hash: ContentHash },
    Evict { entity_id: EntityId },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct WireTx {
    ops: Vec<WireOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Waiting,
    Applying,
}

struct PendingEntry {
    state: PendingState,
    responder: Option<oneshot::Sender<TxResult>>,
}

type PendingMap = Arc<Mutex<HashMap<i64, PendingEntry>>>;

/// A tx-topic record consumed but not yet resolved: either a decoded
/// transaction waiting on its referenced content-hashes, or a payload that
/// failed to decode at all (always immediately resolvable as `Failed`,
/// since there's nothing further to wait on).
struct PendingTx {
    tx_id: i64,
    tx_time: i64,
    payload: PendingPayload,
}

enum PendingPayload {
    Decoded(WireTx),
    Undecodable(String),
}

/// How long the indexer sleeps between polls of an empty tx-topic. Kept
/// short since the reference log transport is in-memory and polling it is
/// cheap; a real broker client would likely push instead.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

const META_TX_OFFSET: &[u8] = b"tx-offset";
const META_DOC_OFFSET: &[u8] = b"doc-offset";

/// Submission handle: produces transactions onto the log and awaits their
/// outcome. Cheaply cloneable (every field is an `Arc`), so many callers can
/// share one against a single running [`Indexer`].
#[derive(Clone)]
pub struct Client<L: LogClient> {
    log: Arc<L>,
    tx_topic: String,
    doc_topic: String,
    pending: PendingMap,
}

impl<L: LogClient> Client<L> {
    /// Submits `tx`, waiting for the indexer to apply (or reject) it.
    /// Resolves only once the transaction has reached a terminal state;
    /// there's no partial-application outcome to observe.
    pub async fn submit_tx(&self, tx: Transaction) -> CResult<TxResult> {
        let mut wire_ops = Vec::with_capacity(tx.ops.len());
        for op in tx.ops {
            match op {
                Op::Put { entity_id, business_time, document } => {
                    let content_hash = document.content_hash()?;
                    self.log.produce(&self.doc_topic, Some(content_hash.as_bytes().to_vec()), document.to_bytes()?)?;
                    wire_ops.push(WireOp::Put { entity_id, business_time, content_hash });
                }
                Op::Delete { entity_id, business_time } => wire_ops.push(WireOp::Delete { entity_id, business_time }),
                Op::Cas { entity_id, business_time, expected_hash, document } => {
                    let new_hash = document.content_hash()?;
                    self.log.produce(&self.doc_topic, Some(new_hash.as_bytes().to_vec()), document.to_bytes()?)?;
                    wire_ops.push(WireOp::Cas { entity_id, business_time, expected_hash, new_hash });
                }
                Op::Evict { entity_id } => wire_ops.push(WireOp::Evict { entity_id }),
            }
        }

        let payload = bincode::serialize(&WireTx { ops: wire_ops })?;
        let tx_id = self.log.produce(&self.tx_topic, None, payload)?;

        let (responder, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock()?;
            pending.insert(tx_id, PendingEntry { state: PendingState::Waiting, responder: Some(responder) });
        }

        receiver.await.map_err(|_| Error::Lock("indexer dropped pending transaction without a reply".into()))
    }

    /// The state of a still-pending transaction, or `None` if it has
    /// already resolved (or was never submitted through this client).
    pub fn pending_state(&self, tx_id: i64) -> CResult<Option<PendingState>> {
        Ok(self.pending.lock()?.get(&tx_id).map(|e| e.state))
    }
}

/// Owns the engine exclusively and applies every transaction it finds on
/// the tx-topic, in order. Nothing else may write to this engine while the
/// indexer is running.
pub struct Indexer<E: Engine, L: LogClient> {
    engine: E,
    log: Arc<L>,
    tx_topic: String,
    doc_topic: String,
    pending: PendingMap,
    doc_cache: HashMap<ContentHash, Document>,
    /// Content-hashes observed to be tombstoned on the doc-topic (eviction
    /// purged the real bytes). A pending transaction referencing one of
    /// these is resolvable even though the document itself is gone.
    tombstoned_hashes: HashSet<ContentHash>,
    /// Transactions consumed from the tx-topic but not yet applied, in
    /// consumption order. See [`Self::drain_pending_prefix`].
    pending_txs: VecDeque<PendingTx>,
    /// The tx-offset actually persisted: every transaction strictly before
    /// this offset has reached a terminal state (`Applied` or `Failed`).
    tx_offset: i64,
    /// How far the tx-topic has been polled into `pending_txs`. Always
    /// `>= tx_offset`; the gap is exactly the transactions still `Waiting`.
    tx_fetch_offset: i64,
    doc_offset: i64,
}

/// Opens (creating if necessary) the tx- and doc-topics this crate depends
/// on, validating their cleanup policy if they already exist, and returns a
/// connected `(Indexer, Client)` pair sharing one pending-transaction map.
pub fn connect<E: Engine, L: LogClient>(
    mut engine: E,
    log: Arc<L>,
    tx_topic: impl Into<String>,
    doc_topic: impl Into<String>,
) -> CResult<(Indexer<E, L>, Client<L>)> {
    let tx_topic = tx_topic.into();
    let doc_topic = doc_topic.into();

    let expected_tx = TopicConfig::tx_topic(&tx_topic);
    let expected_doc = TopicConfig::doc_topic(&doc_topic);
    if let Ok(found) = log.describe_topic(&tx_topic) {
        found.require(&expected_tx)?;
    }
    if let Ok(found) = log.describe_topic(&doc_topic) {
        found.require(&expected_doc)?;
    }

    let tx_offset = {
        let snapshot = engine.new_snapshot();
        offset_from_meta(&snapshot, META_TX_OFFSET)?
    };
    let doc_offset = {
        let snapshot = engine.new_snapshot();
        offset_from_meta(&snapshot, META_DOC_OFFSET)?
    };

    log::info!("indexer connected to tx-topic '{tx_topic}' (offset {tx_offset}) and doc-topic '{doc_topic}' (offset {doc_offset})");

    let pending = Arc::new(Mutex::new(HashMap::new()));
    let client = Client { log: Arc::clone(&log), tx_topic: tx_topic.clone(), doc_topic: doc_topic.clone(), pending: Arc::clone(&pending) };
    let indexer = Indexer {
        engine,
        log,
        tx_topic,
        doc_topic,
        pending,
        doc_cache: HashMap::new(),
        tombstoned_hashes: HashSet::new(),
        pending_txs: VecDeque::new(),
        tx_offset,
        tx_fetch_offset: tx_offset,
        doc_offset,
    };
    Ok((indexer, client))
}

fn offset_from_meta(snapshot: &impl crate::engine::EngineSnapshot, name: &[u8]) -> CResult<i64> {
    match index_store::get_meta(snapshot, name)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes.try_into().map_err(|_| Error::CorruptIndex("bad offset metadata".into()))?;
            Ok(i64::from_be_bytes(arr))
        }
        None => Ok(0),
    }
}

impl<E: Engine, L: LogClient> Indexer<E, L> {
    /// Runs forever, consuming both topics and applying whatever is new.
    /// Intended to run as its own task; cancel by dropping the task handle.
    pub async fn run(&mut self) -> CResult<()> {
        loop {
            if !self.drain_once()? {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    /// Consumes everything currently available on both topics and applies
    /// whatever of it is ready, then returns whether any record was found
    /// or any pending transaction resolved. Exposed separately from
    /// [`Self::run`] so tests can drive the indexer deterministically
    /// without a background task.
    pub fn drain_once(&mut self) -> CResult<bool> {
        let mut did_work = false;

        let doc_records = self.log.consume_from(&self.doc_topic, self.doc_offset)?;
        for record in doc_records {
            did_work = true;
            let key = record.key.ok_or_else(|| Error::CorruptIndex("doc-topic record missing key".into()))?;
            let hash = ContentHash::from_slice(&key)?;

            if record.value == DOC_TOMBSTONE {
                log::debug!("observed tombstone for content {hash} on doc-topic at offset {}", record.offset);
                self.tombstoned_hashes.insert(hash);
                self.doc_cache.remove(&hash);
            } else {
                let document = Document::from_bytes(&record.value)?;
                let mut batch = WriteBatch::new();
                object_store::put_document(&mut batch, &hash, &document)?;
                self.engine.write_batch(batch)?;

                log::debug!("indexed document {hash} from doc-topic at offset {}", record.offset);
                self.doc_cache.insert(hash, document);
            }
            self.doc_offset = record.offset + 1;
        }
        if did_work {
            self.persist_doc_offset()?;
        }

        let tx_records = self.log.consume_from(&self.tx_topic, self.tx_fetch_offset)?;
        for record in tx_records {
            did_work = true;
            let tx_id = record.offset;
            self.tx_fetch_offset = record.offset + 1;
            let tx_time = crate::clock::now_millis();

            let payload = match bincode::deserialize::<WireTx>(&record.value) {
                Ok(wire_tx) => PendingPayload::Decoded(wire_tx),
                Err(e) => {
                    log::warn!("tx {tx_id} carried an undecodable payload: {e}");
                    PendingPayload::Undecodable(e.to_string())
                }
            };
            self.pending_txs.push_back(PendingTx { tx_id, tx_time, payload });
        }

        if self.drain_pending_prefix()? {
            did_work = true;
        }
        Ok(did_work)
    }

    /// Applies every transaction at the head of `pending_txs` whose
    /// referenced content-hashes are all available (present or
    /// tombstoned), stopping at the first one that still has to wait. This
    /// is what keeps transactions applying in tx-id order even though
    /// documents for later transactions may arrive before documents for
    /// earlier ones.
    fn drain_pending_prefix(&mut self) -> CResult<bool> {
        let mut resolved_any = false;
        loop {
            match self.pending_txs.front() {
                Some(PendingTx { payload: PendingPayload::Decoded(wire_tx), .. }) => {
                    if !self.all_referenced_docs_available(wire_tx) {
                        break;
                    }
                }
                Some(PendingTx { payload: PendingPayload::Undecodable(_), .. }) => {}
                None => break,
            }

            let entry = self.pending_txs.pop_front().expect("checked by front() above");
            resolved_any = true;
            self.set_pending_state(entry.tx_id, PendingState::Applying)?;

            let outcome = match entry.payload {
                PendingPayload::Undecodable(msg) => TxOutcome::Failed(msg),
                PendingPayload::Decoded(wire_tx) => match self.apply(entry.tx_id, entry.tx_time, &wire_tx) {
                    Ok(()) => {
                        log::debug!("applied tx {} ({} ops) at {}", entry.tx_id, wire_tx.ops.len(), entry.tx_time);
                        TxOutcome::Applied
                    }
                    Err(e) => {
                        log::warn!("tx {} failed to apply: {e}", entry.tx_id);
                        TxOutcome::Failed(e.to_string())
                    }
                },
            };

            self.tx_offset = entry.tx_id + 1;
            self.persist_tx_offset()?;
            self.resolve(entry.tx_id, TxResult { tx_id: entry.tx_id, transaction_time: entry.tx_time, outcome });
        }
        Ok(resolved_any)
    }

    /// Whether every content-hash `tx` references is either indexed
    /// already or was tombstoned by a since-compacted eviction. `false`
    /// means the transaction must keep waiting.
    fn all_referenced_docs_available(&self, tx: &WireTx) -> bool {
        let snapshot = self.engine.new_snapshot();
        tx.ops.iter().all(|op| match op {
            WireOp::Put { content_hash, .. } => self.document_is_available(&snapshot, content_hash),
            WireOp::Cas { new_hash, .. } => self.document_is_available(&snapshot, new_hash),
            WireOp::Delete { .. } | WireOp::Evict { .. } => true,
        })
    }

    fn document_is_available(&self, snapshot: &impl crate::engine::EngineSnapshot, hash: &ContentHash) -> bool {
        self.doc_cache.contains_key(hash)
            || self.tombstoned_hashes.contains(hash)
            || matches!(object_store::get_document(snapshot, hash), Ok(Some(_)))
    }

    /// The document for `hash`, whether already cached or only indexed on
    /// a prior run. `Ok(None)` for a tombstoned hash — callers must already
    /// have confirmed availability via [`Self::all_referenced_docs_available`]
    /// before calling `apply`, so `Ok(None)` here only ever means "the real
    /// bytes are gone, index what we can".
    fn cached_document(&mut self, hash: &ContentHash) -> CResult<Option<Document>> {
        if let Some(doc) = self.doc_cache.get(hash) {
            return Ok(Some(doc.clone()));
        }
        let snapshot = self.engine.new_snapshot();
        match object_store::get_document(&snapshot, hash)? {
            Some(doc) => {
                self.doc_cache.insert(*hash, doc.clone());
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    fn apply(&mut self, tx_id: i64, tx_time: i64, tx: &WireTx) -> CResult<()> {
        let mut batch = WriteBatch::new();
        for (op_index, op) in tx.ops.iter().enumerate() {
            let op_index = op_index as u32;
            match op {
                WireOp::Put { entity_id, business_time, content_hash } => {
                    self.index_put(&mut batch, entity_id, content_hash)?;
                    index_store::index_entity_tx(&mut batch, entity_id, *business_time, tx_time, tx_id, op_index, *content_hash);
                }
                WireOp::Delete { entity_id, business_time } => {
                    let bt = business_time.unwrap_or(tx_time);
                    index_store::index_entity_tx(&mut batch, entity_id, bt, tx_time, tx_id, op_index, ContentHash::TOMBSTONE);
                }
                WireOp::Cas { entity_id, business_time, expected_hash, new_hash } => {
                    let snapshot = self.engine.new_snapshot();
                    let current = index_store::entity_at(&snapshot, entity_id, tx_time, tx_time)?.map(|e| e.content_hash);
                    if current != *expected_hash {
                        return Err(Error::CasMismatch(format!(
                            "entity {entity_id} expected {expected_hash:?}, found {current:?}"
                        )));
                    }

                    self.index_put(&mut batch, entity_id, new_hash)?;
                    let bt = business_time.unwrap_or(tx_time);
                    index_store::index_entity_tx(&mut batch, entity_id, bt, tx_time, tx_id, op_index, *new_hash);
                }
                WireOp::Evict { entity_id } => {
                    log::info!("evicting entity {entity_id}");
                    let snapshot = self.engine.new_snapshot();
                    let purged = index_store::evict_entity(&mut batch, &snapshot, entity_id)?;
                    for hash in purged {
                        self.log.produce(&self.doc_topic, Some(hash.as_bytes().to_vec()), DOC_TOMBSTONE.to_vec())?;
                        self.tombstoned_hashes.insert(hash);
                        self.doc_cache.remove(&hash);
                        log::debug!("tombstoned content {hash} on the doc-topic");
                    }
                }
            }
        }
        self.engine.write_batch(batch)
    }

    /// Indexes the attribute and entity-ref postings for a `Put`/`Cas`
    /// target, if the document is still available. A hash that was
    /// tombstoned by a since-applied eviction has no document to index —
    /// `index-3` still records the reference (§4.6's "modulo the evicted
    /// content's absence"), just without postings pointing at nothing.
    fn index_put(&mut self, batch: &mut WriteBatch, entity_id: &EntityId, content_hash: &ContentHash) -> CResult<()> {
        match self.cached_document(content_hash)? {
            Some(document) => {
                object_store::index_entity_ref(batch, content_hash, entity_id);
                for (attr, value) in document.attributes()? {
                    index_store::index_attribute(batch, &attr, &value, content_hash)?;
                }
                Ok(())
            }
            None if self.tombstoned_hashes.contains(content_hash) => Ok(()),
            None => Err(Error::MissingDocument(format!("document {content_hash} missing from doc-topic"))),
        }
    }

    fn set_pending_state(&self, tx_id: i64, state: PendingState) -> CResult<()> {
        if let Some(entry) = self.pending.lock()?.get_mut(&tx_id) {
            entry.state = state;
        }
        Ok(())
    }

    fn resolve(&self, tx_id: i64, result: TxResult) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(mut entry) = pending.remove(&tx_id) {
                if let Some(responder) = entry.responder.take() {
                    let _ = responder.send(result);
                }
            }
        }
    }

    fn persist_tx_offset(&mut self) -> CResult<()> {
        let mut batch = WriteBatch::new();
        index_store::set_meta(&mut batch, META_TX_OFFSET, self.tx_offset.to_be_bytes().to_vec());
        self.engine.write_batch(batch)
    }

    fn persist_doc_offset(&mut self) -> CResult<()> {
        let mut batch = WriteBatch::new();
        index_store::set_meta(&mut batch, META_DOC_OFFSET, self.doc_offset.to_be_bytes().to_vec());
        self.engine.write_batch(batch)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}
