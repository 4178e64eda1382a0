//! A bitemporal, content-addressed document store: five indexes over a
//! generic ordered key/value [`engine`], kept up to date by an [`indexer`]
//! that consumes a two-topic [`log`] of submitted transactions and their
//! documents.
//!
//! ```
//! # use std::sync::Arc;
//! # use txdb_store::codec::identity::{canonicalize_id, IdSource};
//! # use txdb_store::document::{Document, Op, Transaction};
//! # use txdb_store::engine::memory::Memory;
//! # use txdb_store::engine::Engine;
//! # use txdb_store::log::memory::MemoryLog;
//! # use txdb_store::log::TopicConfig;
//! # use txdb_store::{indexer, query};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let log = Arc::new(MemoryLog::new());
//! log.create_topic(TopicConfig::tx_topic("tx")).unwrap();
//! log.create_topic(TopicConfig::doc_topic("docs")).unwrap();
//! let (mut ix, client) = indexer::connect(Memory::new(), log, "tx", "docs").unwrap();
//!
//! let id = canonicalize_id(IdSource::Keyword("picasso")).unwrap();
//! let tx = Transaction::new(vec![Op::Put {
//!     entity_id: id,
//!     business_time: 0,
//!     document: Document::new(serde_json::json!({"name": "Pablo"})),
//! }]);
//!
//! let submitted = tokio::spawn(async move { client.submit_tx(tx).await });
//! tokio::task::yield_now().await;
//! ix.drain_once().unwrap();
//! ix.drain_once().unwrap();
//! submitted.await.unwrap().unwrap();
//!
//! let snapshot = ix.engine().new_snapshot();
//! let version = query::entity_as_of(&snapshot, &id, 0, i64::MAX).unwrap().unwrap();
//! assert_eq!(version.document.unwrap().content["name"], "Pablo");
//! # }
//! ```

pub mod clock;
pub mod codec;
pub mod document;
pub mod engine;
pub mod error;
pub mod index_store;
pub mod indexer;
pub mod log;
pub mod object_store;
pub mod query;

pub use document::{Document, EntityTx, Op, Transaction, TxOutcome, TxResult};
pub use error::{CResult, Error};
