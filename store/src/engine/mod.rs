//! The ordered key/value store this crate is built on top of: a single
//! trait (`Engine`), two implementations (`memory`, `file`), and the small
//! amount of shared scaffolding (`Status`, `WriteBatch`, snapshots) every
//! implementation needs to provide.

pub mod file;
pub mod memory;

use crate::error::CResult;
use std::ops::Bound;

pub type KeyRange = (Bound<Vec<u8>>, Bound<Vec<u8>>);

/// A single write queued into a [`WriteBatch`]. Mirrors `Engine::set`
/// (`Some(value)`) and `Engine::delete` (`None`).
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

/// Ops staged to be applied to an [`Engine`] as one indivisible unit. The
/// indexer stages every key it touches while applying one transaction here,
/// then calls [`Engine::write_batch`] exactly once, so a transaction either
/// fully lands in the index or doesn't appear at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp { key, value: Some(value) });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(WriteOp { key, value: None });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// Engine status, surfaced to operators via the CLI. Field names and
/// semantics mirror what a bitcask-style engine naturally tracks: logical
/// key/value totals plus the physical on-disk size, which diverge once
/// compaction is due.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub name: String,
    pub keys: u64,
    pub size: u64,
    pub total_disk_size: u64,
    pub live_disk_size: u64,
    pub garbage_disk_size: u64,
}

/// A read-only, point-in-time view of an engine's key space. Returned by
/// [`Engine::new_snapshot`]; the query layer (`entity_as_of`, `history`,
/// range scans) never reads directly off a live engine so that a write
/// racing a long scan can't be observed mid-way.
pub trait EngineSnapshot: Send + Sync {
    fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>>;
    fn scan(&self, range: KeyRange) -> CResult<Vec<(Vec<u8>, Vec<u8>)>>;

    fn scan_prefix(&self, prefix: &[u8]) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = Bound::Included(prefix.to_vec());
        let end = match crate::codec::key::prefix_upper_bound(prefix) {
            Some(upper) => Bound::Excluded(upper),
            None => Bound::Unbounded,
        };
        self.scan((start, end))
    }
}

/// The storage engine every index is built on: an ordered byte-string key
/// space with point get/set/delete and range scans. Anything satisfying
/// this trait (an in-memory `BTreeMap`, a bitcask-style log, a real
/// embedded KV store) can back the five indexes untouched.
pub trait Engine: Send + Sync {
    type Snapshot: EngineSnapshot;

    fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>>;
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> CResult<()>;
    fn delete(&mut self, key: &[u8]) -> CResult<()>;
    fn scan(&self, range: KeyRange) -> CResult<Vec<(Vec<u8>, Vec<u8>)>>;
    fn flush(&mut self) -> CResult<()>;
    fn status(&mut self) -> CResult<Status>;

    /// Apply every op in `batch` and flush once. Implementations must not
    /// leave a partially-applied batch visible to readers; the in-memory
    /// engine gets this for free via `Arc::make_mut` copy-on-write, the file
    /// engine by writing every entry before its single flush.
    fn write_batch(&mut self, batch: WriteBatch) -> CResult<()> {
        for op in batch.ops {
            match op.value {
                Some(value) => self.set(op.key, value)?,
                None => self.delete(&op.key)?,
            }
        }
        self.flush()
    }

    fn scan_prefix(&self, prefix: &[u8]) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = Bound::Included(prefix.to_vec());
        let end = match crate::codec::key::prefix_upper_bound(prefix) {
            Some(upper) => Bound::Excluded(upper),
            None => Bound::Unbounded,
        };
        self.scan((start, end))
    }

    /// A frozen, read-only view of the current key space, isolated from
    /// subsequent writes.
    fn new_snapshot(&self) -> Self::Snapshot;
}

#[cfg(test)]
macro_rules! test_engine {
    ($engine:expr) => {
        #[test]
        fn point_ops() {
            let mut e = $engine;
            assert_eq!(e.get(b"a").unwrap(), None);
            e.set(b"a".to_vec(), b"1".to_vec()).unwrap();
            assert_eq!(e.get(b"a").unwrap(), Some(b"1".to_vec()));
            e.set(b"a".to_vec(), b"2".to_vec()).unwrap();
            assert_eq!(e.get(b"a").unwrap(), Some(b"2".to_vec()));
            e.delete(b"a").unwrap();
            assert_eq!(e.get(b"a").unwrap(), None);
            e.delete(b"a").unwrap();
        }

        #[test]
        fn scan_is_ordered() {
            let mut e = $engine;
            for (k, v) in [(b"b".to_vec(), b"2"), (b"a".to_vec(), b"1"), (b"c".to_vec(), b"3")] {
                e.set(k, v.to_vec()).unwrap();
            }
            let scanned = e.scan((std::ops::Bound::Unbounded, std::ops::Bound::Unbounded)).unwrap();
            assert_eq!(
                scanned,
                vec![
                    (b"a".to_vec(), b"1".to_vec()),
                    (b"b".to_vec(), b"2".to_vec()),
                    (b"c".to_vec(), b"3".to_vec()),
                ]
            );
        }

        #[test]
        fn scan_prefix() {
            let mut e = $engine;
            e.set(b"aa".to_vec(), b"1".to_vec()).unwrap();
            e.set(b"ab".to_vec(), b"2".to_vec()).unwrap();
            e.set(b"b".to_vec(), b"3".to_vec()).unwrap();
            let scanned = e.scan_prefix(b"a").unwrap();
            assert_eq!(scanned.len(), 2);
        }

        #[test]
        fn write_batch_is_all_or_nothing_in_effect() {
            let mut e = $engine;
            let mut batch = crate::engine::WriteBatch::new();
            batch.set(b"x".to_vec(), b"1".to_vec());
            batch.set(b"y".to_vec(), b"2".to_vec());
            e.write_batch(batch).unwrap();
            assert_eq!(e.get(b"x").unwrap(), Some(b"1".to_vec()));
            assert_eq!(e.get(b"y").unwrap(), Some(b"2".to_vec()));
        }

        #[test]
        fn snapshot_is_isolated_from_later_writes() {
            let mut e = $engine;
            e.set(b"a".to_vec(), b"1".to_vec()).unwrap();
            let snap = e.new_snapshot();
            e.set(b"a".to_vec(), b"2".to_vec()).unwrap();
            e.set(b"b".to_vec(), b"3".to_vec()).unwrap();
            assert_eq!(snap.get(b"a").unwrap(), Some(b"1".to_vec()));
            assert_eq!(snap.get(b"b").unwrap(), None);
        }
    };
}

#[cfg(test)]
pub(crate) use test_engine;
