//! In-memory `Engine`, backed by a `BTreeMap` behind an `Arc` so that
//! [`Memory::new_snapshot`] is an `O(1)` clone of the `Arc` rather than a
//! copy of the tree: writes after a snapshot is taken use `Arc::make_mut`,
//! which clones the underlying map on first write (copy-on-write) so the
//! snapshot keeps observing the map as it stood at the moment it was taken.

use super::{Engine, EngineSnapshot, KeyRange, Status};
use crate::error::CResult;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

#[derive(Default)]
pub struct Memory {
    data: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemorySnapshot {
    data: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl EngineSnapshot for MemorySnapshot {
    fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn scan(&self, range: KeyRange) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.data.range(range).map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl Engine for Memory {
    type Snapshot = MemorySnapshot;

    fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> CResult<()> {
        Arc::make_mut(&mut self.data).insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        Arc::make_mut(&mut self.data).remove(key);
        Ok(())
    }

    fn scan(&self, range: KeyRange) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.data.range(range).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn flush(&mut self) -> CResult<()> {
        Ok(())
    }

    fn status(&mut self) -> CResult<Status> {
        let keys = self.data.len() as u64;
        let size: u64 = self.data.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum();
        Ok(Status {
            name: "memory".into(),
            keys,
            size,
            total_disk_size: 0,
            live_disk_size: 0,
            garbage_disk_size: 0,
        })
    }

    fn new_snapshot(&self) -> Self::Snapshot {
        MemorySnapshot { data: Arc::clone(&self.data) }
    }
}

// Kept for parity with `Bound`-taking callers that build ranges with
// `Bound::Unbounded` on both ends, e.g. a full scan.
#[allow(dead_code)]
fn unbounded() -> KeyRange {
    (Bound::Unbounded, Bound::Unbounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_engine;

    test_engine!(Memory::new());

    #[test]
    fn snapshot_does_not_see_deletes_made_after_it_was_taken() {
        let mut e = Memory::new();
        e.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        let snap = e.new_snapshot();
        e.delete(b"a").unwrap();
        assert_eq!(snap.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(e.get(b"a").unwrap(), None);
    }
}
