//! In-process store backend
//!
//! Implements every [`Command`] over maps, sets and sorted sets held in
//! memory. A pipeline runs under one write lock, so it is applied atomically
//! with respect to other connections. The keyspace can be persisted to and
//! restored from a JSON snapshot.

use crate::error::{Error, Result};
use crate::storage::engine::{Bound, Command, KvConnection, KvStore, Pipeline, Reply};
use crate::storage::glob;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Value stored under one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
enum Entry {
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    Zset(BTreeMap<String, f64>),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::Zset(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Entry::Hash(m) => m.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::Zset(z) => z.is_empty(),
        }
    }
}

type Keyspace = BTreeMap<String, Entry>;

fn wrong_type(key: &str, found: &Entry, wanted: &str) -> Error {
    Error::Store(format!(
        "WRONGTYPE key {} holds a {}, not a {}",
        key,
        found.type_name(),
        wanted
    ))
}

/// In-memory key-value store
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Keyspace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store from a snapshot file; a missing file yields an empty store
    pub fn from_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self::new();
        store.load_snapshot(path)?;
        Ok(store)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Remove every key
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Write the whole keyspace to `path` as JSON
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = {
            let data = self.data.read();
            serde_json::to_vec(&*data)?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "Saved memory store snapshot");
        Ok(())
    }

    /// Replace the keyspace with the snapshot at `path`, if it exists
    pub fn load_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot to load");
            return Ok(());
        }
        let bytes = std::fs::read(path)?;
        let keyspace: Keyspace = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Store(format!("unreadable snapshot {}: {}", path.display(), e)))?;
        let keys = keyspace.len();
        *self.data.write() = keyspace;
        info!(path = %path.display(), keys, "Loaded memory store snapshot");
        Ok(())
    }

    fn apply_all(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        let mut data = self.data.write();
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            replies.push(apply(&mut data, command)?);
        }
        Ok(replies)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<Box<dyn KvConnection>> {
        Ok(Box::new(MemoryConnection {
            store: self.clone(),
        }))
    }
}

/// Connection handle onto a [`MemoryStore`]
pub struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl KvConnection for MemoryConnection {
    async fn execute(&mut self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        self.store.apply_all(pipeline.into_commands())
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

fn hash_mut<'a>(data: &'a mut Keyspace, key: &str) -> Result<&'a mut BTreeMap<String, String>> {
    match data
        .entry(key.to_string())
        .or_insert_with(|| Entry::Hash(BTreeMap::new()))
    {
        Entry::Hash(map) => Ok(map),
        other => Err(wrong_type(key, other, "hash")),
    }
}

fn set_mut<'a>(data: &'a mut Keyspace, key: &str) -> Result<&'a mut BTreeSet<String>> {
    match data
        .entry(key.to_string())
        .or_insert_with(|| Entry::Set(BTreeSet::new()))
    {
        Entry::Set(set) => Ok(set),
        other => Err(wrong_type(key, other, "set")),
    }
}

fn zset_mut<'a>(data: &'a mut Keyspace, key: &str) -> Result<&'a mut BTreeMap<String, f64>> {
    match data
        .entry(key.to_string())
        .or_insert_with(|| Entry::Zset(BTreeMap::new()))
    {
        Entry::Zset(z) => Ok(z),
        other => Err(wrong_type(key, other, "zset")),
    }
}

fn zset_ref<'a>(data: &'a Keyspace, key: &str) -> Result<Option<&'a BTreeMap<String, f64>>> {
    match data.get(key) {
        None => Ok(None),
        Some(Entry::Zset(z)) => Ok(Some(z)),
        Some(other) => Err(wrong_type(key, other, "zset")),
    }
}

/// Drop a key whose collection became empty
fn prune(data: &mut Keyspace, key: &str) {
    if data.get(key).map(Entry::is_empty).unwrap_or(false) {
        data.remove(key);
    }
}

fn scan_page<'a, I>(items: I, cursor: u64, count: usize, pattern: Option<&str>) -> (u64, Vec<&'a str>)
where
    I: ExactSizeIterator<Item = &'a str>,
{
    let total = items.len();
    let count = count.max(1);
    let start = cursor as usize;
    let page: Vec<&str> = items
        .skip(start)
        .take(count)
        .filter(|item| pattern.map(|p| glob::matches(p, item)).unwrap_or(true))
        .collect();
    let next = start + count;
    let next_cursor = if next >= total { 0 } else { next as u64 };
    (next_cursor, page)
}

fn apply(data: &mut Keyspace, command: Command) -> Result<Reply> {
    match command {
        Command::HSet { key, fields } => {
            let map = hash_mut(data, &key)?;
            let mut added = 0;
            for (field, value) in fields {
                if map.insert(field, value).is_none() {
                    added += 1;
                }
            }
            prune(data, &key);
            Ok(Reply::Int(added))
        }
        Command::HMGet { key, fields } => match data.get(&key) {
            None => Ok(Reply::Array(fields.iter().map(|_| Reply::Nil).collect())),
            Some(Entry::Hash(map)) => Ok(Reply::Array(
                fields
                    .iter()
                    .map(|f| map.get(f).cloned().map(Reply::Data).unwrap_or(Reply::Nil))
                    .collect(),
            )),
            Some(other) => Err(wrong_type(&key, other, "hash")),
        },
        Command::Del { keys } => {
            let removed = keys.iter().filter(|k| data.remove(k.as_str()).is_some()).count();
            Ok(Reply::Int(removed as i64))
        }
        Command::Exists { key } => Ok(Reply::Int(data.contains_key(&key) as i64)),
        Command::SAdd { key, members } => {
            let set = set_mut(data, &key)?;
            let added = members.into_iter().filter(|m| set.insert(m.clone())).count();
            prune(data, &key);
            Ok(Reply::Int(added as i64))
        }
        Command::SRem { key, members } => {
            let removed = match data.get_mut(&key) {
                None => 0,
                Some(Entry::Set(set)) => members.iter().filter(|m| set.remove(m.as_str())).count(),
                Some(other) => return Err(wrong_type(&key, other, "set")),
            };
            prune(data, &key);
            Ok(Reply::Int(removed as i64))
        }
        Command::SMembers { key } => match data.get(&key) {
            None => Ok(Reply::Array(Vec::new())),
            Some(Entry::Set(set)) => Ok(Reply::Array(set.iter().cloned().map(Reply::Data).collect())),
            Some(other) => Err(wrong_type(&key, other, "set")),
        },
        Command::ZAdd {
            key,
            entries,
            changed,
        } => {
            let z = zset_mut(data, &key)?;
            let mut count = 0;
            for (score, member) in entries {
                match z.insert(member, score) {
                    None => count += 1,
                    Some(old) if changed && old != score => count += 1,
                    Some(_) => {}
                }
            }
            prune(data, &key);
            Ok(Reply::Int(count))
        }
        Command::ZRem { key, members } => {
            let removed = match data.get_mut(&key) {
                None => 0,
                Some(Entry::Zset(z)) => members.iter().filter(|m| z.remove(m.as_str()).is_some()).count(),
                Some(other) => return Err(wrong_type(&key, other, "zset")),
            };
            prune(data, &key);
            Ok(Reply::Int(removed as i64))
        }
        Command::ZIncrBy { key, delta, member } => {
            let z = zset_mut(data, &key)?;
            let score = z.entry(member).or_insert(0.0);
            *score += delta;
            Ok(Reply::Data(format_score(*score)))
        }
        Command::ZRangeByScore {
            key,
            min,
            max,
            with_scores,
        } => {
            let Some(z) = zset_ref(data, &key)? else {
                return Ok(Reply::Array(Vec::new()));
            };
            let mut hits: Vec<(&String, f64)> = z
                .iter()
                .filter(|&(_, &s)| admits(min, max, s))
                .map(|(m, &s)| (m, s))
                .collect();
            hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
            let mut out = Vec::with_capacity(hits.len() * if with_scores { 2 } else { 1 });
            for (member, score) in hits {
                out.push(Reply::Data(member.clone()));
                if with_scores {
                    out.push(Reply::Data(format_score(score)));
                }
            }
            Ok(Reply::Array(out))
        }
        Command::ZScan {
            key,
            cursor,
            pattern,
            count,
        } => {
            let Some(z) = zset_ref(data, &key)? else {
                return Ok(Reply::Array(vec![Reply::Data("0".to_string()), Reply::Array(Vec::new())]));
            };
            let (next, page) = scan_page(z.keys().map(String::as_str), cursor, count, pattern.as_deref());
            let mut items = Vec::with_capacity(page.len() * 2);
            for member in page {
                items.push(Reply::Data(member.to_string()));
                items.push(Reply::Data(format_score(z[member])));
            }
            Ok(Reply::Array(vec![Reply::Data(next.to_string()), Reply::Array(items)]))
        }
        Command::Scan {
            cursor,
            pattern,
            count,
        } => {
            let (next, page) = scan_page(data.keys().map(String::as_str), cursor, count, pattern.as_deref());
            Ok(Reply::Array(vec![
                Reply::Data(next.to_string()),
                Reply::Array(page.into_iter().map(|k| Reply::Data(k.to_string())).collect()),
            ]))
        }
    }
}

fn admits(min: Bound, max: Bound, score: f64) -> bool {
    min.admits_min(score) && max.admits_max(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(store: &MemoryStore, commands: Vec<Command>) -> Result<Vec<Reply>> {
        let mut conn = store.connect().await?;
        conn.execute(Pipeline::from(commands)).await
    }

    #[tokio::test]
    async fn test_hash_roundtrip_and_absent_map() -> Result<()> {
        let store = MemoryStore::new();
        let replies = run(
            &store,
            vec![
                Command::HSet {
                    key: "drug:1".into(),
                    fields: vec![("id".into(), "1".into()), ("name_ru".into(), "Аспирин".into())],
                },
                Command::HMGet {
                    key: "drug:1".into(),
                    fields: vec!["id".into(), "name_en".into()],
                },
                Command::HMGet {
                    key: "drug:2".into(),
                    fields: vec!["id".into()],
                },
            ],
        )
        .await?;
        assert_eq!(replies[0], Reply::Int(2));
        assert_eq!(
            replies[1],
            Reply::Array(vec![Reply::Data("1".into()), Reply::Nil])
        );
        assert_eq!(replies[2], Reply::Array(vec![Reply::Nil]));
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_type_fails_pipeline() -> Result<()> {
        let store = MemoryStore::new();
        let result = run(
            &store,
            vec![
                Command::SAdd {
                    key: "k".into(),
                    members: vec!["a".into()],
                },
                Command::HMGet {
                    key: "k".into(),
                    fields: vec!["x".into()],
                },
            ],
        )
        .await;
        assert!(matches!(result, Err(Error::Store(msg)) if msg.starts_with("WRONGTYPE")));
        Ok(())
    }

    #[tokio::test]
    async fn test_sorted_set_ranges_and_changed_flag() -> Result<()> {
        let store = MemoryStore::new();
        let replies = run(
            &store,
            vec![
                Command::ZAdd {
                    key: "z".into(),
                    entries: vec![(10.0, "a".into()), (-5.0, "b".into()), (20.0, "c".into())],
                    changed: true,
                },
                Command::ZAdd {
                    key: "z".into(),
                    entries: vec![(11.0, "a".into())],
                    changed: true,
                },
                Command::ZAdd {
                    key: "z".into(),
                    entries: vec![(12.0, "a".into())],
                    changed: false,
                },
                Command::ZRangeByScore {
                    key: "z".into(),
                    min: Bound::Inclusive(0.0),
                    max: Bound::PosInf,
                    with_scores: false,
                },
                Command::ZRangeByScore {
                    key: "z".into(),
                    min: Bound::NegInf,
                    max: Bound::Inclusive(-1.0),
                    with_scores: true,
                },
            ],
        )
        .await?;
        assert_eq!(replies[0], Reply::Int(3));
        assert_eq!(replies[1], Reply::Int(1));
        assert_eq!(replies[2], Reply::Int(0));
        assert_eq!(replies[3].clone().into_strings()?, vec!["a", "c"]);
        assert_eq!(replies[4].clone().into_scored()?, vec![("b".to_string(), -5.0)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_zscan_pages_with_pattern() -> Result<()> {
        let store = MemoryStore::new();
        let entries = (0..5).map(|i| (i as f64, format!("name{}|{}", i, i))).collect();
        run(
            &store,
            vec![Command::ZAdd {
                key: "t".into(),
                entries,
                changed: false,
            }],
        )
        .await?;

        let mut conn = store.connect().await?;
        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = conn
                .query(Command::ZScan {
                    key: "t".into(),
                    cursor,
                    pattern: Some("*[13]|*".into()),
                    count: 2,
                })
                .await?;
            let (next, items) = page.into_scan_page()?;
            seen.extend(Reply::Array(items).into_scored()?);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        let members: Vec<&str> = seen.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["name1|1", "name3|3"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_collections_disappear() -> Result<()> {
        let store = MemoryStore::new();
        run(
            &store,
            vec![
                Command::SAdd {
                    key: "s".into(),
                    members: vec!["1".into()],
                },
                Command::SRem {
                    key: "s".into(),
                    members: vec!["1".into()],
                },
            ],
        )
        .await?;
        assert!(store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snap.json");
        let store = MemoryStore::new();
        run(
            &store,
            vec![Command::ZIncrBy {
                key: "r".into(),
                delta: 2.0,
                member: "а".into(),
            }],
        )
        .await?;
        store.save_snapshot(&path)?;

        let restored = MemoryStore::from_snapshot(&path)?;
        assert_eq!(restored.len(), 1);
        let replies = run(
            &restored,
            vec![Command::ZRangeByScore {
                key: "r".into(),
                min: Bound::NegInf,
                max: Bound::PosInf,
                with_scores: true,
            }],
        )
        .await?;
        assert_eq!(replies[0].clone().into_scored()?, vec![("а".to_string(), 2.0)]);
        Ok(())
    }
}
