//! Suggestion fan-out
//!
//! A suggestion query runs one worker per namespace configured for the
//! requested language. Each worker borrows its own store connection, runs a
//! conjunctive token query and streams hits into a bounded channel. A worker
//! that fails or misses its deadline is logged and counted; the others keep
//! going, so a broken namespace only means fewer suggestions.

use super::normalize::substring_pattern;
use super::search::SearchIndex;
use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{Kind, Lang};
use crate::storage::Storage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Namespaces queried per language
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestPlan {
    plans: BTreeMap<Lang, Vec<Kind>>,
}

impl SuggestPlan {
    /// Parse and check the configured plans
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let mut plans = BTreeMap::new();
        for (lang, namespaces) in &config.suggest {
            let lang: Lang = lang
                .parse()
                .map_err(|_| Error::Config(format!("search.suggest: unknown language {:?}", lang)))?;
            let mut kinds = Vec::with_capacity(namespaces.len());
            for namespace in namespaces {
                let kind: Kind = namespace.parse().map_err(|_| {
                    Error::Config(format!("search.suggest.{}: unknown namespace {:?}", lang, namespace))
                })?;
                if !kind.languages().contains(&lang) {
                    return Err(Error::Config(format!(
                        "search.suggest.{}: {} has no {} content",
                        lang, kind, lang
                    )));
                }
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
            plans.insert(lang, kinds);
        }
        Ok(Self { plans })
    }

    pub fn namespaces(&self, lang: Lang) -> &[Kind] {
        self.plans.get(&lang).map(Vec::as_slice).unwrap_or_default()
    }
}

/// One suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub namespace: Kind,
    pub id: u64,
    pub name: String,
}

/// Incremental view of a running fan-out
///
/// Yields suggestions as workers produce them and ends once every worker
/// finished. Dropping the stream aborts workers still running.
pub struct SuggestStream {
    rx: mpsc::Receiver<Suggestion>,
    workers: JoinSet<()>,
}

impl SuggestStream {
    pub async fn next(&mut self) -> Option<Suggestion> {
        self.rx.recv().await
    }

    /// Workers not yet finished
    pub fn pending(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for SuggestStream {
    fn drop(&mut self) {
        self.workers.abort_all();
    }
}

/// Runs suggestion queries against the pooled store
#[derive(Clone)]
pub struct Suggester {
    storage: Arc<Storage>,
    index: SearchIndex,
    plan: Arc<SuggestPlan>,
    limit: usize,
    worker_timeout: Duration,
}

impl Suggester {
    pub fn new(storage: Arc<Storage>, plan: SuggestPlan, config: &SearchConfig) -> Self {
        Self {
            storage,
            index: SearchIndex::new(config.scan_count),
            plan: Arc::new(plan),
            limit: config.suggest_limit.max(1),
            worker_timeout: Duration::from_millis(config.worker_timeout_ms),
        }
    }

    pub fn plan(&self) -> &SuggestPlan {
        &self.plan
    }

    /// Start one worker per planned namespace for `text`
    pub fn stream(&self, lang: Lang, text: &str) -> SuggestStream {
        let (tx, rx) = mpsc::channel(self.limit);
        let mut workers = JoinSet::new();
        let pattern = substring_pattern(text);

        if !pattern.is_empty() {
            for &kind in self.plan.namespaces(lang) {
                let tx = tx.clone();
                let storage = self.storage.clone();
                let index = self.index;
                let pattern = pattern.clone();
                let deadline = self.worker_timeout;

                workers.spawn(async move {
                    let work = async {
                        let mut conn = storage.acquire().await?;
                        index.query(&mut conn, kind.prefix(), lang, &pattern, true).await
                    };
                    match tokio::time::timeout(deadline, work).await {
                        Ok(Ok(hits)) => {
                            for hit in hits {
                                let suggestion = Suggestion {
                                    namespace: kind,
                                    id: hit.id,
                                    name: hit.name,
                                };
                                if tx.send(suggestion).await.is_err() {
                                    // receiver gone
                                    return;
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            warn!(namespace = %kind, error = %e, "Suggestion worker failed");
                            metrics::suggest_failure(kind.prefix(), "error");
                        }
                        Err(_) => {
                            warn!(namespace = %kind, timeout_ms = deadline.as_millis() as u64, "Suggestion worker timed out");
                            metrics::suggest_failure(kind.prefix(), "timeout");
                        }
                    }
                });
            }
        }

        SuggestStream { rx, workers }
    }

    /// Collect up to the configured limit, sorted by name
    #[instrument(skip(self))]
    pub async fn suggest(&self, lang: Lang, text: &str) -> Vec<Suggestion> {
        let mut stream = self.stream(lang, text);
        let mut out = Vec::new();
        while let Some(suggestion) = stream.next().await {
            out.push(suggestion);
            if out.len() >= self.limit {
                break;
            }
        }
        out.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then(a.namespace.cmp(&b.namespace))
                .then(a.id.cmp(&b.id))
        });
        debug!(count = out.len(), "Collected suggestions");
        out
    }
}
