//! On-disk, log-structured `Engine`, adapted from a bitcask-style append
//! log: every write is appended to a single file, and reads are served from
//! an in-memory index built by replaying that file at startup.
//!
//! Unlike a classic bitcask keydir (which indexes offset + length and reads
//! values back off disk), this engine caches the live value alongside the
//! offset. Index values here are small (document ids, encoded scalars), so
//! keeping them resident buys the same `Arc<BTreeMap>` copy-on-write
//! snapshot isolation [`super::memory::Memory`] uses, at the cost of
//! bounding working-set size to available memory. The log itself remains
//! the durability boundary; the cache is rebuilt from it on every open.

use super::{Engine, EngineSnapshot, KeyRange, Status};
use crate::error::{CResult, Error};
use fs4::FileExt;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Offset + length of the most recent entry for a key, as replayed from the
/// log. Used for status reporting and compaction, not for reads (reads go
/// through the in-memory cache).
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u64,
    len: u64,
}

pub struct FileEngine {
    path: PathBuf,
    file: File,
    index: BTreeMap<Vec<u8>, IndexEntry>,
    cache: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
    garbage_disk_size: u64,
}

impl FileEngine {
    pub fn new<P: AsRef<Path>>(path: P) -> CResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        file.try_lock_exclusive().map_err(|_| Error::Lock(format!("{} is already locked", path.display())))?;

        let (index, cache, garbage_disk_size) = Self::rebuild(&file)?;
        Ok(FileEngine { path, file, index, cache: Arc::new(cache), garbage_disk_size })
    }

    fn rebuild(mut file: &File) -> CResult<(BTreeMap<Vec<u8>, IndexEntry>, BTreeMap<Vec<u8>, Vec<u8>>, u64)> {
        let mut index = BTreeMap::new();
        let mut cache = BTreeMap::new();
        let mut garbage = 0u64;
        file.seek(SeekFrom::Start(0))?;
        let mut offset = 0u64;
        loop {
            match read_entry(file, offset)? {
                None => break,
                Some((key, value, entry_len)) => {
                    match value {
                        Some(value) => {
                            if let Some(prev) = index.insert(key.clone(), IndexEntry { offset, len: entry_len }) {
                                garbage += prev.len;
                            }
                            cache.insert(key, value);
                        }
                        None => {
                            if let Some(prev) = index.remove(&key) {
                                garbage += prev.len;
                            }
                            cache.remove(&key);
                            garbage += entry_len;
                        }
                    }
                    offset += entry_len;
                }
            }
        }
        Ok((index, cache, garbage))
    }

    /// Rewrites the log containing only live keys, dropping tombstones and
    /// superseded versions. Swaps the new file in atomically via rename.
    pub fn compact(&mut self) -> CResult<()> {
        let tmp_path = self.path.with_extension("compact");
        let mut tmp = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&tmp_path)?;

        let mut new_index = BTreeMap::new();
        let mut offset = 0u64;
        for (key, value) in self.cache.iter() {
            let entry_len = write_entry(&mut tmp, key, Some(value))?;
            new_index.insert(key.clone(), IndexEntry { offset, len: entry_len });
            offset += entry_len;
        }
        tmp.flush()?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.file.try_lock_exclusive().map_err(|_| Error::Lock(format!("{} is already locked", self.path.display())))?;
        self.index = new_index;
        self.garbage_disk_size = 0;
        Ok(())
    }
}

fn read_entry(file: &mut File, at: u64) -> CResult<Option<(Vec<u8>, Option<Vec<u8>>, u64)>> {
    file.seek(SeekFrom::Start(at))?;
    let mut len_buf = [0u8; 4];
    match file.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let key_len = u32::from_be_bytes(len_buf) as usize;

    let mut value_len_buf = [0u8; 4];
    file.read_exact(&mut value_len_buf)?;
    let value_len = i32::from_be_bytes(value_len_buf);

    let mut key = vec![0u8; key_len];
    file.read_exact(&mut key)?;

    let (value, value_bytes_on_disk) = if value_len < 0 {
        (None, 0usize)
    } else {
        let mut value = vec![0u8; value_len as usize];
        file.read_exact(&mut value)?;
        (Some(value), value_len as usize)
    };

    let entry_len = 4 + 4 + key_len + value_bytes_on_disk;
    Ok(Some((key, value, entry_len as u64)))
}

fn write_entry(file: &mut File, key: &[u8], value: Option<&[u8]>) -> CResult<u64> {
    file.write_all(&(key.len() as u32).to_be_bytes())?;
    match value {
        Some(value) => {
            file.write_all(&(value.len() as i32).to_be_bytes())?;
            file.write_all(key)?;
            file.write_all(value)?;
            Ok((4 + 4 + key.len() + value.len()) as u64)
        }
        None => {
            file.write_all(&(-1i32).to_be_bytes())?;
            file.write_all(key)?;
            Ok((4 + 4 + key.len()) as u64)
        }
    }
}

pub struct FileSnapshot {
    cache: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl EngineSnapshot for FileSnapshot {
    fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.cache.get(key).cloned())
    }

    fn scan(&self, range: KeyRange) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.cache.range(range).map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl Engine for FileEngine {
    type Snapshot = FileSnapshot;

    fn get(&self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.cache.get(key).cloned())
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> CResult<()> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        let len = write_entry(&mut self.file, &key, Some(&value))?;
        if let Some(prev) = self.index.insert(key.clone(), IndexEntry { offset, len }) {
            self.garbage_disk_size += prev.len;
        }
        Arc::make_mut(&mut self.cache).insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        let len = write_entry(&mut self.file, key, None)?;
        if let Some(prev) = self.index.remove(key) {
            self.garbage_disk_size += prev.len;
        }
        self.garbage_disk_size += len;
        Arc::make_mut(&mut self.cache).remove(key);
        Ok(())
    }

    fn scan(&self, range: KeyRange) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.cache.range(range).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn flush(&mut self) -> CResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn status(&mut self) -> CResult<Status> {
        let keys = self.cache.len() as u64;
        let size: u64 = self.cache.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum();
        let live_disk_size: u64 = self.index.values().map(|e| e.len).sum();
        Ok(Status {
            name: self.path.display().to_string(),
            keys,
            size,
            total_disk_size: live_disk_size + self.garbage_disk_size,
            live_disk_size,
            garbage_disk_size: self.garbage_disk_size,
        })
    }

    fn new_snapshot(&self) -> Self::Snapshot {
        FileSnapshot { cache: Arc::clone(&self.cache) }
    }
}

impl Drop for FileEngine {
    fn drop(&mut self) {
        let _ = self.flush();
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_engine;
    use tempfile::NamedTempFile;

    fn temp_engine() -> FileEngine {
        let file = NamedTempFile::new().unwrap();
        FileEngine::new(file.path()).unwrap()
    }

    test_engine!(temp_engine());

    #[test]
    fn reopen_recovers_state() {
        let file = NamedTempFile::new().unwrap();
        {
            let mut e = FileEngine::new(file.path()).unwrap();
            e.set(b"a".to_vec(), b"1".to_vec()).unwrap();
            e.set(b"b".to_vec(), b"2".to_vec()).unwrap();
            e.delete(b"a").unwrap();
        }
        let mut e = FileEngine::new(file.path()).unwrap();
        assert_eq!(e.get(b"a").unwrap(), None);
        assert_eq!(e.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(e.status().unwrap().keys, 1);
    }

    #[test]
    fn compact_drops_superseded_and_deleted_entries() {
        let file = NamedTempFile::new().unwrap();
        let mut e = FileEngine::new(file.path()).unwrap();
        e.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        e.set(b"a".to_vec(), b"2".to_vec()).unwrap();
        e.set(b"b".to_vec(), b"3".to_vec()).unwrap();
        e.delete(b"b").unwrap();
        let before = e.status().unwrap();
        assert!(before.garbage_disk_size > 0);

        e.compact().unwrap();
        let after = e.status().unwrap();
        assert_eq!(after.garbage_disk_size, 0);
        assert_eq!(e.get(b"a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(e.get(b"b").unwrap(), None);
    }

    #[test]
    fn second_open_of_locked_file_fails() {
        let file = NamedTempFile::new().unwrap();
        let _e = FileEngine::new(file.path()).unwrap();
        assert!(FileEngine::new(file.path()).is_err());
    }
}
