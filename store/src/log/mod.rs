//! The two-topic log protocol the indexer consumes: a tx-topic carrying
//! submitted transactions and a doc-topic carrying documents, each with a
//! retention policy the indexer depends on to behave correctly.

pub mod memory;

use crate::error::{CResult, Error};
use serde::{Deserialize, Serialize};

/// How a topic's broker is allowed to reclaim space. `Delete` drops entries
/// past a retention window; `Compact` keeps only the latest record per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupPolicy {
    Delete,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Retention {
    Infinite,
    Bounded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    pub cleanup_policy: CleanupPolicy,
    pub retention: Retention,
}

impl TopicConfig {
    /// The tx-topic must never compact (every submitted transaction is a
    /// distinct record, not a keyed update) and must never expire (the
    /// indexer needs to be able to replay from offset 0 after a restart).
    pub fn tx_topic(name: impl Into<String>) -> Self {
        TopicConfig { name: name.into(), cleanup_policy: CleanupPolicy::Delete, retention: Retention::Infinite }
    }

    /// The doc-topic is keyed by content-hash and compacts: once the latest
    /// record for a hash is written, older records for the same hash can be
    /// dropped without losing anything, since the content is identical.
    pub fn doc_topic(name: impl Into<String>) -> Self {
        TopicConfig { name: name.into(), cleanup_policy: CleanupPolicy::Compact, retention: Retention::Infinite }
    }

    /// Validates a topic discovered at startup against what this crate
    /// requires of it. Called once when the indexer attaches to a topic;
    /// a mismatch is a fatal configuration error, not something to paper
    /// over by just using the topic as found.
    pub fn require(&self, expected: &TopicConfig) -> CResult<()> {
        if self.cleanup_policy != expected.cleanup_policy || self.retention != expected.retention {
            return Err(Error::LogPolicyMismatch(format!(
                "topic {} has policy {:?}/{:?}, expected {:?}/{:?}",
                self.name, self.cleanup_policy, self.retention, expected.cleanup_policy, expected.retention
            )));
        }
        Ok(())
    }
}

/// One entry produced to a topic. `key` drives compaction for topics with
/// [`CleanupPolicy::Compact`]; it's ignored for [`CleanupPolicy::Delete`]
/// topics such as the tx-topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// The log transport the indexer consumes. Swappable: the in-memory
/// [`memory::MemoryLog`] is the reference implementation used by tests and
/// the embedded CLI; a real deployment could swap in a client for an actual
/// log-structured broker behind the same trait.
pub trait LogClient: Send + Sync {
    fn describe_topic(&self, topic: &str) -> CResult<TopicConfig>;

    /// Appends `value` (optionally keyed, for compacting topics) to
    /// `topic`, returning the offset it landed at.
    fn produce(&self, topic: &str, key: Option<Vec<u8>>, value: Vec<u8>) -> CResult<i64>;

    /// Every record at or after `from_offset`, in offset order. Compaction
    /// may have already dropped superseded keyed records below the
    /// requested offset; callers must not assume every offset is present.
    fn consume_from(&self, topic: &str, from_offset: i64) -> CResult<Vec<Record>>;
}
