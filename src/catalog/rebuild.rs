//! Index rebuild job
//!
//! Rebuilds the search index of each requested namespace from the records
//! currently stored: live ids come from the change feed (cursor 0), the
//! namespace index is cleared, records are loaded in batches and indexed.
//! Namespaces are processed one after another without any lock, so a write
//! landing mid-rebuild can be shadowed by the stale copy being indexed.

use super::batch::BatchStore;
use super::search::SearchIndex;
use super::sync;
use crate::dispatch;
use crate::error::Result;
use crate::model::{Kind, Record};
use crate::storage::{KvConnection, Storage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// Request to rebuild search indexes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildRequest {
    /// Target namespaces (None = all).
    #[serde(default)]
    pub namespaces: Option<Vec<Kind>>,

    /// Records loaded per round trip.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    256
}

impl Default for RebuildRequest {
    fn default() -> Self {
        Self {
            namespaces: None,
            batch_size: default_batch_size(),
        }
    }
}

impl RebuildRequest {
    /// Rebuild every namespace
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_kinds<I: IntoIterator<Item = Kind>>(kinds: I) -> Self {
        Self {
            namespaces: Some(kinds.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    fn kinds(&self) -> Vec<Kind> {
        match &self.namespaces {
            Some(kinds) => kinds.clone(),
            None => Kind::ALL.to_vec(),
        }
    }
}

/// Outcome for one namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceReport {
    pub namespace: Kind,
    /// Records written to the index
    pub indexed: usize,
    /// Feed ids whose record could not be loaded
    pub missing: usize,
}

/// Outcome of a rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    pub job_id: Uuid,
    pub namespaces: Vec<NamespaceReport>,
    pub elapsed_ms: u64,
}

impl RebuildReport {
    pub fn indexed(&self) -> usize {
        self.namespaces.iter().map(|n| n.indexed).sum()
    }
}

/// Runs rebuilds against the pooled store
#[derive(Clone)]
pub struct IndexRebuild {
    storage: Arc<Storage>,
    index: SearchIndex,
}

impl IndexRebuild {
    pub fn new(storage: Arc<Storage>, index: SearchIndex) -> Self {
        Self { storage, index }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, request: &RebuildRequest) -> Result<RebuildReport> {
        let job_id = Uuid::new_v4();
        let started = Instant::now();
        let batch = BatchStore::new(request.batch_size);
        info!(%job_id, "Starting index rebuild");

        let mut namespaces = Vec::new();
        for kind in request.kinds() {
            let mut conn = self.storage.acquire().await?;
            let report = dispatch!(kind, T => self.rebuild_kind::<T>(&mut conn, kind, batch).await?);
            info!(
                %job_id,
                namespace = %kind,
                indexed = report.indexed,
                missing = report.missing,
                "Rebuilt namespace index"
            );
            namespaces.push(report);
        }

        let report = RebuildReport {
            job_id,
            namespaces,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(%job_id, indexed = report.indexed(), elapsed_ms = report.elapsed_ms, "Index rebuild finished");
        Ok(report)
    }

    async fn rebuild_kind<T: Record>(
        &self,
        conn: &mut dyn KvConnection,
        kind: Kind,
        batch: BatchStore,
    ) -> Result<NamespaceReport> {
        let namespace = kind.prefix();
        let ids = sync::poll(conn, namespace, 0).await?;
        self.index.clear(conn, namespace).await?;

        let mut indexed = 0;
        let mut missing = 0;
        for chunk in ids.chunks(batch.batch_size()) {
            let mut slots: Vec<Option<T>> = chunk.iter().map(|&id| Some(T::with_id(id))).collect();
            batch.load(conn, namespace, &mut slots).await?;
            let live: Vec<T> = slots.into_iter().flatten().collect();
            missing += chunk.len() - live.len();
            indexed += self.index.index(conn, kind, &live).await?;
        }

        Ok(NamespaceReport {
            namespace: kind,
            indexed,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() -> Result<()> {
        let request: RebuildRequest = serde_json::from_str("{}")?;
        assert_eq!(request.batch_size, 256);
        assert_eq!(request.kinds().len(), Kind::ALL.len());

        let request: RebuildRequest = serde_json::from_str(r#"{"namespaces":["drug","class-atc"],"batch_size":8}"#)?;
        assert_eq!(request.kinds().len(), 2);
        assert_eq!(request.batch_size, 8);
        assert!(serde_json::from_str::<RebuildRequest>(r#"{"namespaces":["nope"]}"#).is_err());
        Ok(())
    }
}
