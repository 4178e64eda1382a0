//! Crate-wide error type. Flat enum rather than a tree of per-module error
//! types, mirroring the shape of hand-rolled (non-`thiserror`) error enums
//! used throughout this lineage of crates.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A key or value failed its length/tag check on decode. The on-disk
    /// index is corrupt; the caller should treat this as fatal.
    CorruptIndex(String),

    /// An id could not be canonicalized (e.g. a hex string of the wrong
    /// width, or a byte array of the wrong length).
    MalformedId(String),

    /// A subscribed topic's cleanup/retention policy does not match what
    /// this crate requires. Fatal at startup.
    LogPolicyMismatch(String),

    /// The named topic does not exist.
    UnknownTopic(String),

    Io(std::io::Error),

    /// An internal mutex was poisoned by a panicking holder.
    Lock(String),

    /// A value or key could not be serialized/deserialized.
    Encoding(String),

    /// A `cas` op's expected content-hash did not match the entity's
    /// current content-hash. Recorded as a failed transaction; the tx
    /// offset still advances.
    CasMismatch(String),

    /// During indexing, a referenced content-hash was neither present nor
    /// tombstoned. Should never actually reach a caller: the indexer only
    /// applies a transaction once every referenced hash is confirmed
    /// available, holding it in `pending-txs` (state `Waiting`) until then.
    MissingDocument(String),
}

pub type CResult<T> = Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CorruptIndex(msg) => write!(f, "corrupt index: {msg}"),
            Error::MalformedId(msg) => write!(f, "malformed id: {msg}"),
            Error::LogPolicyMismatch(msg) => write!(f, "log policy mismatch: {msg}"),
            Error::UnknownTopic(topic) => write!(f, "unknown topic: {topic}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Lock(msg) => write!(f, "lock poisoned: {msg}"),
            Error::Encoding(msg) => write!(f, "encoding error: {msg}"),
            Error::CasMismatch(msg) => write!(f, "cas mismatch: {msg}"),
            Error::MissingDocument(msg) => write!(f, "missing document: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Lock(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}
