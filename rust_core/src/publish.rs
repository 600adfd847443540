//! Replace-set publisher.
//!
//! Swaps the persisted snapshot for a new record set: clear the table, then
//! insert in bounded chunks. A failed chunk is reported and skipped; later
//! chunks still go out.

use crate::retry::{execute_with_retry, RetryPolicy};
use crate::store::TableStore;
use crate::types::MatchRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const MAX_CHUNK_SIZE: usize = 1000;

/// Which records make it into the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PublishFilter {
    #[default]
    All,
    /// Only records whose two participants both resolved
    BothResolved,
}

impl PublishFilter {
    pub fn admits(&self, record: &MatchRecord) -> bool {
        match self {
            PublishFilter::All => true,
            PublishFilter::BothResolved => record.both_resolved(),
        }
    }
}

impl FromStr for PublishFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "all" => Ok(PublishFilter::All),
            "both_resolved" | "resolved" => Ok(PublishFilter::BothResolved),
            other => Err(format!("unknown publish filter: {other}")),
        }
    }
}

impl fmt::Display for PublishFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishFilter::All => f.write_str("all"),
            PublishFilter::BothResolved => f.write_str("both_resolved"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Refusing to publish an empty snapshot")]
    EmptySnapshot,

    #[error("Record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub size: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub inserted_count: usize,
    pub failed_chunks: Vec<ChunkFailure>,
    /// Previous snapshot was deleted
    pub cleared: bool,
    /// Records dropped by the publish filter
    pub filtered_out: usize,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub table: String,
    pub chunk_size: usize,
    pub filter: PublishFilter,
    pub retry: RetryPolicy,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            table: "upcoming_matches".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            filter: PublishFilter::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PublishConfig {
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.clamp(1, MAX_CHUNK_SIZE)
    }
}

pub struct Publisher {
    store: Arc<dyn TableStore>,
    config: PublishConfig,
}

impl Publisher {
    pub fn new(store: Arc<dyn TableStore>, config: PublishConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    pub async fn publish(&self, records: &[MatchRecord]) -> Result<PublishReport, PublishError> {
        if records.is_empty() {
            warn!("No records to publish, leaving snapshot untouched");
            return Err(PublishError::EmptySnapshot);
        }

        let admitted: Vec<&MatchRecord> = records.iter().filter(|r| self.config.filter.admits(r)).collect();
        let filtered_out = records.len() - admitted.len();
        if admitted.is_empty() {
            warn!(
                filter = %self.config.filter,
                filtered_out,
                "Every record filtered out, leaving snapshot untouched"
            );
            return Err(PublishError::EmptySnapshot);
        }

        let rows = admitted
            .iter()
            .map(|r| serde_json::to_value(r))
            .collect::<Result<Vec<Value>, _>>()?;

        let table = self.config.table.as_str();
        let mut report = PublishReport {
            filtered_out,
            ..Default::default()
        };

        match self.store.delete_all(table).await {
            Ok(()) => {
                report.cleared = true;
                info!(table, "Cleared previous snapshot");
            }
            Err(e) => error!(table, "Failed to clear previous snapshot: {}", e),
        }

        let chunk_size = self.config.effective_chunk_size();
        for (chunk_index, chunk) in rows.chunks(chunk_size).enumerate() {
            let store = &self.store;
            let result = execute_with_retry(
                move || store.insert_batch(table, chunk),
                self.config.retry,
                "insert chunk",
            )
            .await;

            match result {
                Ok(written) => {
                    report.inserted_count += written;
                    info!(table, chunk = chunk_index + 1, rows = written, "Inserted chunk");
                }
                Err(e) => {
                    error!(table, chunk = chunk_index + 1, "Chunk insert failed: {}", e);
                    report.failed_chunks.push(ChunkFailure {
                        chunk_index,
                        size: chunk.len(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            inserted = report.inserted_count,
            failed_chunks = report.failed_chunks.len(),
            cleared = report.cleared,
            filtered_out = report.filtered_out,
            "Publish complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::ScrapeStamp;

    fn records(n: usize) -> Vec<MatchRecord> {
        let stamp = ScrapeStamp {
            date: "2024-05-01".to_string(),
            time: "10:00:00".to_string(),
        };
        (0..n)
            .map(|i| MatchRecord::new(format!("A{i}"), format!("B{i}"), format!("https://s/m{i}"), &stamp))
            .collect()
    }

    fn publisher(store: Arc<MemoryStore>, chunk_size: usize, filter: PublishFilter) -> Publisher {
        Publisher::new(
            store,
            PublishConfig {
                chunk_size,
                filter,
                retry: RetryPolicy::immediate(2),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_replaces_snapshot_in_chunks() {
        let store = Arc::new(MemoryStore::new());
        store.seed("upcoming_matches", vec![serde_json::json!({"participant_a": "old"})]);

        let report = publisher(store.clone(), 2, PublishFilter::All)
            .publish(&records(5))
            .await
            .unwrap();

        assert!(report.cleared);
        assert_eq!(report.inserted_count, 5);
        assert!(report.failed_chunks.is_empty());
        assert_eq!(store.insert_calls(), 3);
        let rows = store.rows("upcoming_matches");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["participant_a"], "A0");
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_stop_later_chunks() {
        let store = Arc::new(MemoryStore::new());
        store.fail_insert_call(1);

        let report = publisher(store.clone(), 2, PublishFilter::All)
            .publish(&records(5))
            .await
            .unwrap();

        assert_eq!(report.inserted_count, 3);
        assert_eq!(
            report.failed_chunks,
            vec![ChunkFailure {
                chunk_index: 1,
                size: 2,
                message: "Store API error (status 400): insert call 1 rejected".to_string(),
            }]
        );
        assert_eq!(store.rows("upcoming_matches").len(), 3);
    }

    #[tokio::test]
    async fn test_failed_clear_still_inserts() {
        let store = Arc::new(MemoryStore::new());
        store.fail_deletes(true);

        let report = publisher(store.clone(), 100, PublishFilter::All)
            .publish(&records(2))
            .await
            .unwrap();
        assert!(!report.cleared);
        assert_eq!(report.inserted_count, 2);
    }

    #[tokio::test]
    async fn test_empty_snapshot_guard() {
        let store = Arc::new(MemoryStore::new());
        let err = publisher(store.clone(), 100, PublishFilter::All).publish(&[]).await.unwrap_err();
        assert!(matches!(err, PublishError::EmptySnapshot));

        // nothing resolved: filter empties the set
        let err = publisher(store.clone(), 100, PublishFilter::BothResolved)
            .publish(&records(3))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::EmptySnapshot));
        assert!(!store.was_written());
    }

    #[tokio::test]
    async fn test_both_resolved_filter() {
        let store = Arc::new(MemoryStore::new());
        let mut recs = records(3);
        recs[1].participant_a_resolved = true;
        recs[1].participant_b_resolved = true;

        let report = publisher(store.clone(), 100, PublishFilter::BothResolved)
            .publish(&recs)
            .await
            .unwrap();
        assert_eq!(report.inserted_count, 1);
        assert_eq!(report.filtered_out, 2);
    }

    #[test]
    fn test_chunk_size_clamped() {
        let mut config = PublishConfig::default();
        assert_eq!(config.effective_chunk_size(), 100);
        config.chunk_size = 0;
        assert_eq!(config.effective_chunk_size(), 1);
        config.chunk_size = 50_000;
        assert_eq!(config.effective_chunk_size(), MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!("all".parse(), Ok(PublishFilter::All));
        assert_eq!("both-resolved".parse(), Ok(PublishFilter::BothResolved));
        assert!("some".parse::<PublishFilter>().is_err());
    }
}
