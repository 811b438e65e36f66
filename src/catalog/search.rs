//! Search index
//!
//! Per namespace and language three sorted sets:
//!
//! - `idx:{ns}:{lang}:tokens`: `"{name}|{id}"` entries scored by id, scanned
//!   with glob patterns for substring search
//! - `idx:{ns}:{lang}:facet`: ids scored by the first code point of their
//!   primary name, for browsing by letter
//! - `idx:{ns}:{lang}:runes`: leading rune histogram driving the alphabet
//!
//! Names are stored normalized (see [`normalize`](super::normalize)).

use super::normalize::{entry, leading_rune, normalize, split_entry, ENTRY_SEPARATOR};
use crate::error::Result;
use crate::model::{Identifiable, Kind, Lang, Searchable};
use crate::storage::{glob, Bound, Command, KvConnection, Pipeline, Reply};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

const INDEX_PREFIX: &str = "idx";

/// Which structure of a namespace index a key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPart {
    Tokens,
    Facet,
    Runes,
}

impl IndexPart {
    fn as_str(&self) -> &'static str {
        match self {
            IndexPart::Tokens => "tokens",
            IndexPart::Facet => "facet",
            IndexPart::Runes => "runes",
        }
    }
}

pub fn index_key(namespace: &str, lang: Lang, part: IndexPart) -> String {
    crate::key!(INDEX_PREFIX, namespace, lang.code(), part.as_str())
}

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub id: u64,
    pub name: String,
}

/// One alphabet letter with the number of records filed under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Letter {
    pub letter: String,
    pub count: u64,
}

/// Normalized names of a record in one indexed language
struct IndexNames {
    lang: Lang,
    /// Primary name feeding the facet and the histogram, may be empty
    primary: String,
    names: Vec<String>,
}

fn index_names<R: Searchable>(kind: Kind, record: &R) -> Vec<IndexNames> {
    kind.languages()
        .iter()
        .map(|&lang| {
            let mut names: Vec<String> = Vec::new();
            for name in record.search_names(lang) {
                let name = normalize(&name);
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            IndexNames {
                lang,
                primary: normalize(record.primary_name(lang)),
                names,
            }
        })
        .filter(|n| !n.names.is_empty())
        .collect()
}

/// Search index operations
#[derive(Debug, Clone, Copy)]
pub struct SearchIndex {
    scan_count: usize,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self { scan_count: 500 }
    }
}

impl SearchIndex {
    pub fn new(scan_count: usize) -> Self {
        Self {
            scan_count: scan_count.max(1),
        }
    }

    /// Page size for keyspace and index scans
    pub fn scan_count(&self) -> usize {
        self.scan_count
    }

    fn commands<R: Searchable + Identifiable>(&self, kind: Kind, records: &[R], add: bool) -> Pipeline {
        let namespace = kind.prefix();
        let mut pipeline = Pipeline::new();
        for record in records {
            let id = record.id();
            for IndexNames { lang, primary, names } in index_names(kind, record) {
                let entries: Vec<String> = names.iter().map(|n| entry(n, id)).collect();
                let tokens = index_key(namespace, lang, IndexPart::Tokens);
                let facet = index_key(namespace, lang, IndexPart::Facet);
                let runes = index_key(namespace, lang, IndexPart::Runes);

                if add {
                    pipeline.add(Command::ZAdd {
                        key: tokens,
                        entries: entries.into_iter().map(|e| (id as f64, e)).collect(),
                        changed: false,
                    });
                } else {
                    pipeline.add(Command::ZRem {
                        key: tokens,
                        members: entries,
                    });
                }

                if let Some(rune) = leading_rune(&primary) {
                    if add {
                        pipeline.add(Command::ZAdd {
                            key: facet,
                            entries: vec![(rune as u32 as f64, id.to_string())],
                            changed: false,
                        });
                    } else {
                        pipeline.add(Command::ZRem {
                            key: facet,
                            members: vec![id.to_string()],
                        });
                    }
                    pipeline.add(Command::ZIncrBy {
                        key: runes,
                        delta: if add { 1.0 } else { -1.0 },
                        member: rune.to_string(),
                    });
                }
            }
        }
        pipeline
    }

    /// Add records to the index in one round trip. Returns the number of
    /// records contributing at least one name.
    #[instrument(skip(self, conn, records), fields(namespace = %kind, count = records.len()))]
    pub async fn index<R: Searchable + Identifiable>(
        &self,
        conn: &mut dyn KvConnection,
        kind: Kind,
        records: &[R],
    ) -> Result<usize> {
        let indexed = records.iter().filter(|r| !index_names(kind, *r).is_empty()).count();
        let pipeline = self.commands(kind, records, true);
        if !pipeline.is_empty() {
            conn.execute(pipeline).await?;
        }
        debug!(indexed, "Indexed records");
        Ok(indexed)
    }

    /// Undo [`index`](Self::index) for records as they were indexed.
    /// Rune counts are decremented, never reset.
    #[instrument(skip(self, conn, records), fields(namespace = %kind, count = records.len()))]
    pub async fn deindex<R: Searchable + Identifiable>(
        &self,
        conn: &mut dyn KvConnection,
        kind: Kind,
        records: &[R],
    ) -> Result<()> {
        let pipeline = self.commands(kind, records, false);
        if !pipeline.is_empty() {
            conn.execute(pipeline).await?;
        }
        Ok(())
    }

    /// Scan the token index with a glob over normalized names.
    ///
    /// With `conjunctive`, the pattern is split on whitespace: the first part
    /// drives the scan and every other part must also match the name.
    /// Results are unique by id and sorted by name.
    #[instrument(skip(self, conn))]
    pub async fn query(
        &self,
        conn: &mut dyn KvConnection,
        namespace: &str,
        lang: Lang,
        pattern: &str,
        conjunctive: bool,
    ) -> Result<Vec<Hit>> {
        let (head, filters): (&str, Vec<&str>) = if conjunctive {
            let mut parts = pattern.split_whitespace();
            match parts.next() {
                Some(head) => (head, parts.collect()),
                None => return Ok(Vec::new()),
            }
        } else {
            (pattern.trim(), Vec::new())
        };
        if head.is_empty() {
            return Ok(Vec::new());
        }

        let key = index_key(namespace, lang, IndexPart::Tokens);
        let scan = format!("{}{}*", head, ENTRY_SEPARATOR);
        let mut best: HashMap<u64, String> = HashMap::new();
        let mut cursor = 0;

        loop {
            let (next, items) = conn
                .query(Command::ZScan {
                    key: key.clone(),
                    cursor,
                    pattern: Some(scan.clone()),
                    count: self.scan_count,
                })
                .await?
                .into_scan_page()?;

            for (member, _) in Reply::Array(items).into_scored()? {
                let Some((name, id)) = split_entry(&member) else {
                    continue;
                };
                if !filters.iter().all(|f| glob::matches(f, name)) {
                    continue;
                }
                // one hit per id, under its smallest matching name
                best.entry(id)
                    .and_modify(|current| {
                        if name < current.as_str() {
                            *current = name.to_string();
                        }
                    })
                    .or_insert_with(|| name.to_string());
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut hits: Vec<Hit> = best.into_iter().map(|(id, name)| Hit { id, name }).collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        debug!(hits = hits.len(), "Queried token index");
        Ok(hits)
    }

    /// Leading letters with a positive record count, in letter order
    pub async fn alphabet(&self, conn: &mut dyn KvConnection, namespace: &str, lang: Lang) -> Result<Vec<Letter>> {
        let scored = conn
            .query(Command::ZRangeByScore {
                key: index_key(namespace, lang, IndexPart::Runes),
                min: Bound::Exclusive(0.0),
                max: Bound::PosInf,
                with_scores: true,
            })
            .await?
            .into_scored()?;
        let mut letters: Vec<Letter> = scored
            .into_iter()
            .map(|(letter, count)| Letter {
                letter,
                count: count as u64,
            })
            .collect();
        letters.sort_by(|a, b| a.letter.cmp(&b.letter));
        Ok(letters)
    }

    /// Ids whose primary name starts with `letter`, ascending
    pub async fn browse(
        &self,
        conn: &mut dyn KvConnection,
        namespace: &str,
        lang: Lang,
        letter: char,
    ) -> Result<Vec<u64>> {
        let rune = normalize(&letter.to_string()).chars().next().unwrap_or(letter);
        let score = rune as u32 as f64;
        let members = conn
            .query(Command::ZRangeByScore {
                key: index_key(namespace, lang, IndexPart::Facet),
                min: Bound::Inclusive(score),
                max: Bound::Inclusive(score),
                with_scores: false,
            })
            .await?
            .into_strings()?;
        let mut ids: Vec<u64> = members.iter().filter_map(|m| m.parse().ok()).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Remove every index structure of a namespace. Returns the number of
    /// keys deleted.
    #[instrument(skip(self, conn))]
    pub async fn clear(&self, conn: &mut dyn KvConnection, namespace: &str) -> Result<usize> {
        let pattern = format!("{}:{}:*", INDEX_PREFIX, glob::escape(namespace));
        let keys = conn.scan_keys(&pattern, self.scan_count).await?;

        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = conn.query(Command::Del { keys }).await?.into_int()?;
        debug!(deleted, "Cleared index");
        Ok(deleted as usize)
    }
}
