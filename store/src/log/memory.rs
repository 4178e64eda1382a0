//! Reference in-memory log broker: each topic is a `Vec<Record>` behind a
//! mutex. A compacting topic rewrites its latest record per key in place
//! instead of appending, so `consume_from` never has to skip over
//! superseded entries.

use super::{CleanupPolicy, LogClient, Record, TopicConfig};
use crate::error::{CResult, Error};
use std::collections::HashMap;
use std::sync::Mutex;

struct TopicState {
    config: TopicConfig,
    records: Vec<Record>,
    /// Maps a compacting topic's keys to their index in `records`, so a
    /// repeat key overwrites in place instead of appending a duplicate.
    by_key: HashMap<Vec<u8>, usize>,
    next_offset: i64,
}

pub struct MemoryLog {
    topics: Mutex<HashMap<String, TopicState>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        MemoryLog { topics: Mutex::new(HashMap::new()) }
    }

    pub fn create_topic(&self, config: TopicConfig) -> CResult<()> {
        let mut topics = self.topics.lock()?;
        topics.entry(config.name.clone()).or_insert_with(|| TopicState {
            config,
            records: Vec::new(),
            by_key: HashMap::new(),
            next_offset: 0,
        });
        Ok(())
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogClient for MemoryLog {
    fn describe_topic(&self, topic: &str) -> CResult<TopicConfig> {
        let topics = self.topics.lock()?;
        topics.get(topic).map(|t| t.config.clone()).ok_or_else(|| Error::UnknownTopic(topic.to_string()))
    }

    fn produce(&self, topic: &str, key: Option<Vec<u8>>, value: Vec<u8>) -> CResult<i64> {
        let mut topics = self.topics.lock()?;
        let state = topics.get_mut(topic).ok_or_else(|| Error::UnknownTopic(topic.to_string()))?;

        let offset = state.next_offset;
        state.next_offset += 1;
        let record = Record { offset, key: key.clone(), value };

        if state.config.cleanup_policy == CleanupPolicy::Compact {
            if let Some(key) = key {
                if let Some(&existing) = state.by_key.get(&key) {
                    state.records[existing] = record;
                } else {
                    state.by_key.insert(key, state.records.len());
                    state.records.push(record);
                }
                return Ok(offset);
            }
        }
        state.records.push(record);
        Ok(offset)
    }

    fn consume_from(&self, topic: &str, from_offset: i64) -> CResult<Vec<Record>> {
        let topics = self.topics.lock()?;
        let state = topics.get(topic).ok_or_else(|| Error::UnknownTopic(topic.to_string()))?;
        Ok(state.records.iter().filter(|r| r.offset >= from_offset).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Retention;

    #[test]
    fn unknown_topic_is_an_error() {
        let log = MemoryLog::new();
        assert!(log.produce("missing", None, vec![]).is_err());
    }

    #[test]
    fn delete_policy_topic_keeps_every_record() {
        let log = MemoryLog::new();
        log.create_topic(TopicConfig::tx_topic("tx")).unwrap();
        log.produce("tx", None, b"a".to_vec()).unwrap();
        log.produce("tx", None, b"b".to_vec()).unwrap();
        assert_eq!(log.consume_from("tx", 0).unwrap().len(), 2);
    }

    #[test]
    fn compacting_topic_overwrites_same_key_in_place() {
        let log = MemoryLog::new();
        log.create_topic(TopicConfig::doc_topic("docs")).unwrap();
        log.produce("docs", Some(b"hash-1".to_vec()), b"v1".to_vec()).unwrap();
        log.produce("docs", Some(b"hash-1".to_vec()), b"v2".to_vec()).unwrap();
        log.produce("docs", Some(b"hash-2".to_vec()), b"v3".to_vec()).unwrap();

        let records = log.consume_from("docs", 0).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, b"v2");
    }

    #[test]
    fn consume_from_offset_skips_earlier_records() {
        let log = MemoryLog::new();
        log.create_topic(TopicConfig::tx_topic("tx")).unwrap();
        for i in 0..5 {
            log.produce("tx", None, vec![i]).unwrap();
        }
        let records = log.consume_from("tx", 3).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 3);
    }

    #[test]
    fn require_rejects_mismatched_policy() {
        let log = MemoryLog::new();
        log.create_topic(TopicConfig::doc_topic("docs")).unwrap();
        let found = log.describe_topic("docs").unwrap();
        assert!(found.require(&TopicConfig::tx_topic("docs")).is_err());
        assert_eq!(found.retention, Retention::Infinite);
    }
}
