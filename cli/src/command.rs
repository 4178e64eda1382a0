//! Subcommand implementations. Each one opens the on-disk engine fresh (a
//! one-shot CLI process), applies whatever it needs to, and exits.
//!
//! The log transport backing this process is always a fresh, empty
//! in-memory broker: it exists so `submit` can go through the same
//! indexer/client path a long-running `serve` process uses, not to persist
//! across invocations. That means `tx-log` only ever shows records
//! produced earlier in the *same* invocation (typically none, unless
//! chained after a `submit` in one command) — multi-client tx-log
//! introspection is a `serve`-mode thing.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use txdb_store::codec::identity::{canonicalize_id, IdSource};
use txdb_store::codec::value::Value;
use txdb_store::document::{scalar_from_json, Document, Op, Transaction};
use txdb_store::engine::file::FileEngine;
use txdb_store::engine::Engine;
use txdb_store::indexer;
use txdb_store::log::memory::MemoryLog;
use txdb_store::log::TopicConfig;
use txdb_store::query;

const TX_TOPIC: &str = "tx";
const DOC_TOPIC: &str = "docs";

fn engine_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("txdb.log")
}

type Opened = (indexer::Indexer<FileEngine, MemoryLog>, indexer::Client<MemoryLog>, Arc<MemoryLog>);

async fn open(data_dir: &std::path::Path) -> Result<Opened> {
    std::fs::create_dir_all(data_dir)?;
    let engine = FileEngine::new(engine_path(data_dir)).context("opening on-disk engine")?;

    let log = Arc::new(MemoryLog::new());
    log.create_topic(TopicConfig::tx_topic(TX_TOPIC))?;
    log.create_topic(TopicConfig::doc_topic(DOC_TOPIC))?;

    let (indexer, client) = indexer::connect(engine, Arc::clone(&log), TX_TOPIC, DOC_TOPIC)?;
    Ok((indexer, client, log))
}

fn parse_entity_id(raw: &str) -> Result<txdb_store::codec::identity::EntityId> {
    if raw.len() == 40 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(canonicalize_id(IdSource::Hex(raw))?)
    } else {
        Ok(canonicalize_id(IdSource::Keyword(raw))?)
    }
}

/// One line of a `submit` payload: `{"entity": "...", "bt": 123,
/// "document": {...}}` for a put, `{"entity": "...", "evict": true}`,
/// `{"entity": "...", "delete": true, "bt": 123}`, or
/// `{"entity": "...", "cas": true, "expected": "<hex hash>"|null,
/// "document": {...}}`.
#[derive(serde_derive::Deserialize)]
struct SubmitOp {
    entity: String,
    bt: Option<i64>,
    document: Option<serde_json::Value>,
    #[serde(default)]
    evict: bool,
    #[serde(default)]
    delete: bool,
    #[serde(default)]
    cas: bool,
    expected: Option<String>,
}

pub async fn submit(data_dir: &std::path::Path, ops_json: &str) -> Result<()> {
    let raw_ops: Vec<SubmitOp> = serde_json::from_str(ops_json).context("parsing submit payload")?;
    let mut ops = Vec::with_capacity(raw_ops.len());
    for raw in raw_ops {
        let entity_id = parse_entity_id(&raw.entity)?;
        if raw.evict {
            ops.push(Op::Evict { entity_id });
        } else if raw.delete {
            ops.push(Op::Delete { entity_id, business_time: raw.bt });
        } else if raw.cas {
            let content = raw.document.ok_or_else(|| anyhow!("cas op for {} is missing a document", raw.entity))?;
            let expected_hash = raw
                .expected
                .map(|h| txdb_store::codec::identity::canonicalize_id(IdSource::Hex(&h)))
                .transpose()?;
            ops.push(Op::Cas { entity_id, business_time: raw.bt, expected_hash, document: Document::new(content) });
        } else {
            let content = raw.document.ok_or_else(|| anyhow!("put op for {} is missing a document", raw.entity))?;
            ops.push(Op::Put { entity_id, business_time: raw.bt.unwrap_or(0), document: Document::new(content) });
        }
    }

    let (mut ix, client, _log) = open(data_dir).await?;
    let submit_task = tokio::spawn(async move { client.submit_tx(Transaction::new(ops)).await });

    // Drive the indexer until the submission resolves; this process is the
    // only writer, so there's no concurrent work to interleave with.
    let result = loop {
        ix.drain_once()?;
        if submit_task.is_finished() {
            break submit_task.await??;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };

    match &result.outcome {
        txdb_store::document::TxOutcome::Applied => {
            println!("{} tx {} at {}", "applied".green(), result.tx_id, result.transaction_time);
        }
        txdb_store::document::TxOutcome::Failed(reason) => {
            println!("{} tx {}: {}", "failed".red(), result.tx_id, reason);
        }
    }
    Ok(())
}

pub async fn entity_as_of(data_dir: &std::path::Path, entity: &str, bt: Option<i64>, tt: Option<i64>) -> Result<()> {
    let (ix, _client, _log) = open(data_dir).await?;
    let entity_id = parse_entity_id(entity)?;
    let snapshot = ix.engine().new_snapshot();
    let version = query::entity_as_of(&snapshot, &entity_id, bt.unwrap_or(i64::MAX), tt.unwrap_or(i64::MAX))?;
    match version {
        None => println!("{}", "no version found".yellow()),
        Some(v) if v.entity_tx.is_evicted() => println!("{}", "evicted".red()),
        Some(v) => println!("{}", serde_json::to_string_pretty(&v.document.unwrap().content)?),
    }
    Ok(())
}

pub async fn history(data_dir: &std::path::Path, entity: &str) -> Result<()> {
    let (ix, _client, _log) = open(data_dir).await?;
    let entity_id = parse_entity_id(entity)?;
    let snapshot = ix.engine().new_snapshot();
    for version in query::history(&snapshot, &entity_id)? {
        let label = if version.entity_tx.is_evicted() { "evicted".red() } else { "ok".green() };
        println!(
            "bt={} tt={} tx={} {}",
            version.entity_tx.business_time, version.entity_tx.transaction_time, version.entity_tx.tx_id, label
        );
    }
    Ok(())
}

pub async fn scan_attribute(data_dir: &std::path::Path, attr: &str, lower: &str, upper: &str) -> Result<()> {
    let (ix, _client, _log) = open(data_dir).await?;
    let lower: Value = scalar_from_json(&serde_json::from_str(lower)?);
    let upper: Value = scalar_from_json(&serde_json::from_str(upper)?);
    let snapshot = ix.engine().new_snapshot();
    for hit in query::attribute_range_scan(&snapshot, attr, &lower, &upper)? {
        println!("{}", hit.content_hash);
    }
    Ok(())
}

pub async fn tx_log(data_dir: &std::path::Path, from_offset: i64) -> Result<()> {
    let (_ix, _client, log) = open(data_dir).await?;
    let records = query::tx_log(&*log, TX_TOPIC, from_offset)?;
    if records.is_empty() {
        println!(
            "{}",
            "no records (each CLI invocation starts from a fresh log; chain with submit in the same command to see any)"
                .yellow()
        );
    }
    for record in records {
        println!("offset={} bytes={}", record.offset, record.value.len());
    }
    Ok(())
}

pub async fn serve(data_dir: &std::path::Path) -> Result<()> {
    let (mut ix, _client, _log) = open(data_dir).await?;
    log::info!("serving from {}", data_dir.display());
    ix.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_entity_id_is_recognized_by_length_and_charset() {
        let hex = "a".repeat(40);
        assert!(matches!(parse_entity_id(&hex), Ok(_)));
    }

    #[test]
    fn non_hex_entity_id_falls_back_to_keyword_hashing() {
        assert!(parse_entity_id("picasso").is_ok());
    }
}
