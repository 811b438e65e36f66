//! Catalog services
//!
//! # Architecture
//!
//! ```text
//! Catalog (facade used by handlers and the CLI)
//!   ├─→ BatchStore   record maps + change feed side effects
//!   ├─→ link         owner/target link sets
//!   ├─→ sync         per-namespace change feed
//!   ├─→ SearchIndex  token index, facet, rune histogram
//!   ├─→ Suggester    multi-namespace fan-out
//!   └─→ IndexRebuild search index rebuild from stored records
//! ```
//!
//! Every operation borrows its own pooled connection for its duration.

pub mod batch;
pub mod link;
pub mod normalize;
pub mod rebuild;
pub mod search;
pub mod suggest;
pub mod sync;

pub use batch::{BatchStore, SaveMode};
pub use rebuild::{IndexRebuild, NamespaceReport, RebuildReport, RebuildRequest};
pub use search::{Hit, Letter, SearchIndex};
pub use suggest::{SuggestPlan, SuggestStream, Suggester, Suggestion};
pub use sync::Change;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::{self, Kind, Lang, Record};
use crate::storage::{glob, Storage};
use normalize::{normalize, substring_pattern};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Entry point for catalog operations
#[derive(Clone)]
pub struct Catalog {
    storage: Arc<Storage>,
    batch: BatchStore,
    index: SearchIndex,
    suggester: Suggester,
    rebuild: IndexRebuild,
}

impl Catalog {
    /// Build the services over `storage`; checks record schemas and the
    /// suggestion plans first.
    pub fn new(storage: Arc<Storage>, config: &AppConfig) -> Result<Self> {
        model::validate_schemas()?;
        let plan = SuggestPlan::from_config(&config.search)?;
        let index = SearchIndex::new(config.search.scan_count);
        Ok(Self {
            batch: BatchStore::new(config.catalog.batch_size),
            index,
            suggester: Suggester::new(storage.clone(), plan, &config.search),
            rebuild: IndexRebuild::new(storage.clone(), index),
            storage,
        })
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn suggester(&self) -> &Suggester {
        &self.suggester
    }

    /// Load records by id; misses come back as `None` in their slot
    #[instrument(skip(self, ids), fields(namespace = %kind, count = ids.len()))]
    pub async fn get<T: Record>(&self, kind: Kind, ids: &[u64]) -> Result<Vec<Option<T>>> {
        check_ids(ids)?;
        let mut slots: Vec<Option<T>> = ids.iter().map(|&id| Some(T::with_id(id))).collect();
        let mut conn = self.storage.acquire().await?;
        self.batch.load(&mut conn, kind.prefix(), &mut slots).await?;
        Ok(slots)
    }

    /// Load one record or fail with [`Error::NotFound`]
    pub async fn get_one<T: Record>(&self, kind: Kind, id: u64) -> Result<T> {
        self.get::<T>(kind, &[id])
            .await?
            .pop()
            .flatten()
            .ok_or_else(|| Error::NotFound(format!("{}:{}", kind, id)))
    }

    /// Save records and keep the search index in step.
    ///
    /// Previous versions are loaded first so their index entries can be
    /// removed before the new names are indexed.
    #[instrument(skip(self, records), fields(namespace = %kind, count = records.len()))]
    pub async fn put<T: Record>(&self, kind: Kind, records: Vec<T>, mode: SaveMode) -> Result<usize> {
        if let Some(pos) = records.iter().position(|r| r.id() == 0) {
            return Err(Error::InvalidArgument(format!("{}: record {} has no id", kind, pos)));
        }
        let mut seen = HashSet::with_capacity(records.len());
        if let Some(record) = records.iter().find(|r| !seen.insert(r.id())) {
            return Err(Error::InvalidArgument(format!("{}: id {} appears twice", kind, record.id())));
        }
        let namespace = kind.prefix();
        let mut conn = self.storage.acquire().await?;

        let mut previous: Vec<Option<T>> = records.iter().map(|r| Some(T::with_id(r.id()))).collect();
        self.batch.load(&mut conn, namespace, &mut previous).await?;
        let previous: Vec<T> = previous.into_iter().flatten().collect();

        let slots: Vec<Option<T>> = records.into_iter().map(Some).collect();
        let written = self.batch.save(&mut conn, namespace, &slots, mode, 0).await?;

        // Merged records must be indexed as stored, not as sent
        let current: Vec<T> = match mode {
            SaveMode::Replace => slots.into_iter().flatten().collect(),
            SaveMode::Merge => {
                let mut reloaded: Vec<Option<T>> = slots
                    .iter()
                    .flatten()
                    .map(|r| Some(T::with_id(r.id())))
                    .collect();
                self.batch.load(&mut conn, namespace, &mut reloaded).await?;
                reloaded.into_iter().flatten().collect()
            }
        };

        self.index.deindex(&mut conn, kind, &previous).await?;
        self.index.index(&mut conn, kind, &current).await?;

        info!(namespace, written, ?mode, "Stored records");
        Ok(written)
    }

    /// Delete records with their links and index entries. Returns the ids
    /// that existed.
    #[instrument(skip(self, ids), fields(namespace = %kind, count = ids.len()))]
    pub async fn remove<T: Record>(&self, kind: Kind, ids: &[u64]) -> Result<Vec<u64>> {
        check_ids(ids)?;
        let namespace = kind.prefix();
        let mut conn = self.storage.acquire().await?;

        let mut slots: Vec<Option<T>> = ids.iter().map(|&id| Some(T::with_id(id))).collect();
        self.batch.load(&mut conn, namespace, &mut slots).await?;
        let removed = self.batch.delete(&mut conn, namespace, &slots).await?;

        // Links may name ids whose record was never stored
        let targets: Vec<&str> = kind.links().iter().map(Kind::prefix).collect();
        for &id in ids {
            link::purge(&mut conn, namespace, id, &targets).await?;
        }
        link::purge_inbound(&mut conn, namespace, ids, &targets, self.index.scan_count()).await?;
        let existing: Vec<T> = slots.into_iter().flatten().collect();
        self.index.deindex(&mut conn, kind, &existing).await?;

        info!(namespace, removed = removed.len(), "Removed records");
        Ok(removed)
    }

    fn check_link(kind: Kind, target: Kind) -> Result<()> {
        if !kind.may_link(target) {
            return Err(Error::InvalidArgument(format!("{} records cannot link to {}", kind, target)));
        }
        Ok(())
    }

    /// Link `id` to `targets` in the `target` namespace
    #[instrument(skip(self, targets), fields(count = targets.len()))]
    pub async fn link(&self, kind: Kind, id: u64, target: Kind, targets: &[u64], symmetric: bool) -> Result<()> {
        Self::check_link(kind, target)?;
        let mut conn = self.storage.acquire().await?;
        link::save(&mut conn, kind.prefix(), target.prefix(), symmetric, id, targets).await
    }

    #[instrument(skip(self, targets), fields(count = targets.len()))]
    pub async fn unlink(&self, kind: Kind, id: u64, target: Kind, targets: &[u64], symmetric: bool) -> Result<()> {
        Self::check_link(kind, target)?;
        let mut conn = self.storage.acquire().await?;
        link::free(&mut conn, kind.prefix(), target.prefix(), symmetric, id, targets).await
    }

    /// Ids `id` links to in the `target` namespace
    pub async fn links(&self, kind: Kind, id: u64, target: Kind) -> Result<Vec<u64>> {
        Self::check_link(kind, target)?;
        let mut conn = self.storage.acquire().await?;
        link::load(&mut conn, kind.prefix(), target.prefix(), id).await
    }

    /// Change feed poll, see [`sync::poll`]
    pub async fn changes(&self, kind: Kind, since: i64) -> Result<Vec<u64>> {
        let mut conn = self.storage.acquire().await?;
        sync::poll(&mut conn, kind.prefix(), since).await
    }

    /// Change feed entries with timestamps
    pub async fn change_log(&self, kind: Kind, since: i64) -> Result<Vec<Change>> {
        let mut conn = self.storage.acquire().await?;
        sync::changes(&mut conn, kind.prefix(), since).await
    }

    /// Search names in one namespace.
    ///
    /// With `all`, every word of `text` must occur somewhere in the name;
    /// otherwise `text` must occur as one substring.
    #[instrument(skip(self))]
    pub async fn search(&self, kind: Kind, lang: Lang, text: &str, all: bool) -> Result<Vec<Hit>> {
        if !kind.languages().contains(&lang) {
            return Ok(Vec::new());
        }
        let pattern = if all {
            substring_pattern(text)
        } else {
            match normalize(text) {
                t if t.is_empty() => String::new(),
                t => format!("*{}*", glob::escape(&t)),
            }
        };
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.storage.acquire().await?;
        self.index.query(&mut conn, kind.prefix(), lang, &pattern, all).await
    }

    pub async fn alphabet(&self, kind: Kind, lang: Lang) -> Result<Vec<Letter>> {
        let mut conn = self.storage.acquire().await?;
        self.index.alphabet(&mut conn, kind.prefix(), lang).await
    }

    pub async fn browse(&self, kind: Kind, lang: Lang, letter: char) -> Result<Vec<u64>> {
        let mut conn = self.storage.acquire().await?;
        self.index.browse(&mut conn, kind.prefix(), lang, letter).await
    }

    /// Suggestions across the namespaces planned for `lang`
    pub async fn suggest(&self, lang: Lang, text: &str) -> Vec<Suggestion> {
        self.suggester.suggest(lang, text).await
    }

    pub async fn rebuild(&self, request: &RebuildRequest) -> Result<RebuildReport> {
        self.rebuild.run(request).await
    }
}

fn check_ids(ids: &[u64]) -> Result<()> {
    if ids.contains(&0) {
        return Err(Error::InvalidArgument("ids must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Drug, Inn};
    use crate::storage::MemoryStore;

    fn catalog() -> Result<Catalog> {
        let storage = Arc::new(Storage::with_defaults(Arc::new(MemoryStore::new())));
        Catalog::new(storage, &AppConfig::default())
    }

    #[tokio::test]
    async fn test_put_reindexes_renamed_records() -> Result<()> {
        let catalog = catalog()?;
        let mut drug = Drug {
            id: 1,
            name_en: "Aspirin".into(),
            ..Drug::default()
        };
        catalog.put(Kind::Drug, vec![drug.clone()], SaveMode::Replace).await?;

        drug.name_en = "Citramon".into();
        catalog.put(Kind::Drug, vec![drug], SaveMode::Replace).await?;

        assert!(catalog.search(Kind::Drug, Lang::En, "asp", false).await?.is_empty());
        assert_eq!(catalog.search(Kind::Drug, Lang::En, "citra", false).await?.len(), 1);
        let letters = catalog.alphabet(Kind::Drug, Lang::En).await?;
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].letter, "c");
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_indexes_stored_names() -> Result<()> {
        let catalog = catalog()?;
        let drug = Drug {
            id: 2,
            name_en: "Nurofen".into(),
            dose: "200 mg".into(),
            ..Drug::default()
        };
        catalog.put(Kind::Drug, vec![drug], SaveMode::Replace).await?;

        let patch = Drug {
            id: 2,
            dose: "400 mg".into(),
            ..Drug::default()
        };
        catalog.put(Kind::Drug, vec![patch], SaveMode::Merge).await?;

        let hits = catalog.search(Kind::Drug, Lang::En, "nuro", false).await?;
        assert_eq!(hits.len(), 1);
        let stored: Drug = catalog.get_one(Kind::Drug, 2).await?;
        assert_eq!(stored.dose, "400 mg");
        assert_eq!(stored.name_en, "Nurofen");
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_purges_links_and_index() -> Result<()> {
        let catalog = catalog()?;
        catalog
            .put(
                Kind::Drug,
                vec![Drug {
                    id: 5,
                    name_en: "Panadol".into(),
                    ..Drug::default()
                }],
                SaveMode::Replace,
            )
            .await?;
        catalog
            .put(
                Kind::Inn,
                vec![Inn {
                    id: 7,
                    name_en: "Paracetamol".into(),
                    ..Inn::default()
                }],
                SaveMode::Replace,
            )
            .await?;
        catalog.link(Kind::Drug, 5, Kind::Inn, &[7], true).await?;
        assert_eq!(catalog.links(Kind::Inn, 7, Kind::Drug).await?, vec![5]);

        assert_eq!(catalog.remove::<Drug>(Kind::Drug, &[5, 6]).await?, vec![5]);
        assert!(catalog.links(Kind::Inn, 7, Kind::Drug).await?.is_empty());
        assert!(catalog.search(Kind::Drug, Lang::En, "panadol", false).await?.is_empty());
        assert!(matches!(
            catalog.get_one::<Drug>(Kind::Drug, 5).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(catalog.changes(Kind::Drug, -1).await?, vec![5]);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_clears_asymmetric_links_to_the_record() -> Result<()> {
        let catalog = catalog()?;
        catalog.link(Kind::Drug, 5, Kind::Inn, &[7], false).await?;
        catalog.link(Kind::Drug, 6, Kind::Inn, &[7], false).await?;
        assert_eq!(catalog.links(Kind::Inn, 7, Kind::Drug).await?, vec![5, 6]);

        catalog.remove::<Drug>(Kind::Drug, &[5]).await?;
        assert_eq!(catalog.links(Kind::Inn, 7, Kind::Drug).await?, vec![6]);
        Ok(())
    }

    #[tokio::test]
    async fn test_put_rejects_repeated_ids() -> Result<()> {
        let catalog = catalog()?;
        let aspirin = Drug {
            id: 1,
            name_en: "Aspirin".into(),
            ..Drug::default()
        };
        let result = catalog
            .put(Kind::Drug, vec![aspirin.clone(), aspirin], SaveMode::Replace)
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        assert_eq!(catalog.get::<Drug>(Kind::Drug, &[1]).await?, vec![None]);
        assert!(catalog.alphabet(Kind::Drug, Lang::En).await?.is_empty());
        assert!(catalog.changes(Kind::Drug, 0).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_link_matrix_is_enforced() -> Result<()> {
        let catalog = catalog()?;
        let result = catalog.link(Kind::Maker, 1, Kind::Inn, &[2], true).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_ids_are_rejected() -> Result<()> {
        let catalog = catalog()?;
        assert!(matches!(
            catalog.get::<Drug>(Kind::Drug, &[1, 0]).await,
            Err(Error::InvalidArgument(_))
        ));
        let result = catalog
            .put(Kind::Drug, vec![Drug::default()], SaveMode::Replace)
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        Ok(())
    }
}
